use adq_multirecord::*;
use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::style::Stylize;
use log::{error, info, warn};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, TermLogger, TerminalMode, WriteLogger,
};
use std::{
    fs::{self, File},
    io::{self, BufRead},
    path::{Path, PathBuf},
    thread,
};
use time::{macros::format_description, OffsetDateTime};

/// Multi-record acquisition from two ADQ digitizers.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Run configuration
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Directory for the record files, overriding the configuration
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Use simulated digitizers instead of the ADQ library
    #[arg(long)]
    simulate: bool,

    /// Exit without waiting for confirmation
    #[arg(long)]
    no_prompt: bool,

    /// Print a configuration template and exit
    #[arg(long)]
    print_config: bool,
}

fn init_logging(settings: &RunSettings) -> Result<PathBuf> {
    fs::create_dir_all(&settings.trace_dir)
        .with_context(|| format!("creating trace directory {}", settings.trace_dir))?;

    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let format = format_description!("[year][month][day]_[hour][minute][second]");
    let stamp = now.format(format).context("formatting log timestamp")?;
    let path = Path::new(&settings.trace_dir).join(format!("acquisition_{stamp}.log"));
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;

    let config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build();
    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            config.clone(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(settings.trace_level.level_filter(), config, file),
    ])?;
    Ok(path)
}

fn control_unit(simulate: bool) -> Result<Box<dyn ControlUnit>> {
    #[cfg(feature = "adqapi")]
    if !simulate {
        let cu = AdqControlUnit::new().context("failed to create ADQ control unit")?;
        return Ok(Box::new(cu));
    }
    #[cfg(not(feature = "adqapi"))]
    if !simulate {
        warn!("Built without the `adqapi` feature, using simulated digitizers");
    }
    Ok(Box::new(SimulatedControlUnit::pair()))
}

/// Forwards console lines. A `q` line also cancels the wait for records.
fn spawn_console(cancel: Sender<()>) -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim() == "q" {
                let _ = cancel.send(());
            }
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.print_config {
        println!("{}", Conf::template());
        return Ok(());
    }

    let conf = Conf::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    let log_path = init_logging(&conf.run_settings)?;
    info!("Logging to {}", log_path.display());

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&conf.run_settings.output_dir));
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating output directory {}", output_dir.display()))?;

    let (cancel_tx, cancel_rx) = unbounded();
    let console = spawn_console(cancel_tx);

    let mut cu = control_unit(args.simulate)?;
    if !cu.enable_error_trace(
        conf.run_settings.trace_level.adq_level(),
        &conf.run_settings.trace_dir,
    ) {
        warn!("Could not enable the digitizer error trace");
    }

    info!("Type q and ENTER to abandon the wait for records");
    let acquisition = Acquisition::new(conf)
        .with_output_dir(output_dir)
        .with_cancel(cancel_rx);
    let report = acquisition.run(cu.as_mut());
    drop(cu);

    if report.is_success() {
        println!("{}", "All records were saved to file".green());
    } else {
        if let Some(failure) = report.first_failure() {
            if let StepStatus::Failed(e) = &failure.status {
                error!("First failure at {}: {e}", failure.step);
            }
        }
        println!(
            "\n{}",
            "An error occured, please view the trace logs for more information".red()
        );
    }

    if !args.no_prompt {
        println!("\nType 0 and ENTER to exit.");
        // Lines typed during the run do not count.
        console.try_iter().for_each(drop);
        while let Ok(line) = console.recv() {
            if line.trim() == "0" {
                break;
            }
        }
    }
    Ok(())
}
