use crate::{
    configure, poller::CompletionPoller, retriever, trigger, CaptureBuffers, Conf, ControlUnit,
    DeviceRegistry, RecordSerializer, RunReport, Step,
};
use crossbeam_channel::Receiver;
use log::info;
use std::path::PathBuf;

/// One complete dual-device multi-record run.
///
/// Both devices are configured and armed before either is waited on, so
/// their triggers start close together. Each device is then collected in
/// turn: wait for its records, size and fill its buffers, write its files.
#[derive(Debug, Clone)]
pub struct Acquisition {
    conf: Conf,
    poller: CompletionPoller,
    serializer: RecordSerializer,
}

impl Acquisition {
    pub fn new(conf: Conf) -> Self {
        let poller = CompletionPoller::from_settings(&conf.run_settings);
        let serializer = RecordSerializer::new(&conf.run_settings.output_dir);
        Self {
            conf,
            poller,
            serializer,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.serializer = RecordSerializer::new(dir);
        self
    }

    pub fn with_cancel(mut self, cancel: Receiver<()>) -> Self {
        self.poller = self.poller.with_cancel(cancel);
        self
    }

    pub fn serializer(&self) -> &RecordSerializer {
        &self.serializer
    }

    pub fn run(&self, cu: &mut dyn ControlUnit) -> RunReport {
        let mut report = RunReport::new();

        let registry = match DeviceRegistry::discover(cu) {
            Ok(registry) => registry,
            Err(e) => {
                report.fail(None, Step::Discover, e);
                return report;
            }
        };
        report.done(None, Step::Discover);
        let devices: Vec<_> = registry.ids().collect();

        for &device in &devices {
            registry.log_device(device);
            let config = self.conf.acquisition_config(device);
            configure(cu, device, &config, &mut report);
        }

        let sync = self.conf.timestamp_sync();
        for &device in &devices {
            if let Some(sync) = &sync {
                trigger::sync_timestamps(cu, device, sync, &mut report);
            }
            trigger::arm(cu, device, &mut report);
        }
        if report.is_success() {
            info!("Both devices armed");
        }

        let acq = &self.conf.acquisition;
        for &device in &devices {
            let mode = self.conf.acquisition_config(device).trigger.mode();
            self.poller.wait(cu, device, mode, &mut report);

            let mut buffers = CaptureBuffers::prepare(
                cu,
                device,
                acq.records,
                acq.samples_per_record,
                &mut report,
            );
            let landed = retriever::retrieve(cu, &mut buffers, &mut report);
            if self.conf.run_settings.disarm_after_collection {
                trigger::disarm(cu, device, &mut report);
            }

            if landed {
                self.serializer.write_records(&buffers, &mut report);
            } else {
                for record in 0..acq.records {
                    report.skip(Some(device), Step::Serialize { record });
                }
            }
        }

        if report.is_success() {
            info!(
                "All records were saved to {}",
                self.serializer.output_dir().display()
            );
        }
        report
    }
}
