use crate::{AcquisitionConfig, DeviceId, TriggerSetup};
use confique::Config;
use log::LevelFilter;
use serde_with::DeserializeFromStr;
use std::{fmt, path::Path, str::FromStr, time::Duration};
use strum::{Display, EnumString};

#[derive(Config, Debug, Clone)]
pub struct Conf {
    #[config(nested)]
    pub run_settings: RunSettings,
    #[config(nested)]
    pub acquisition: AcquisitionSettings,
    #[config(nested)]
    pub sync_settings: SyncSettings,
}

#[derive(Config, Debug, Clone)]
pub struct RunSettings {
    /// Directory receiving the `data_unit{N}_record{R}.asc` files.
    #[config(default = ".")]
    pub output_dir: String,
    /// Directory for the run log and the digitizer error trace.
    #[config(default = ".")]
    pub trace_dir: String,
    #[config(default = "info")]
    pub trace_level: TraceLevel,
    /// Upper bound in milliseconds on the wait for all records of one
    /// device. 0 waits until the device completes or the wait is cancelled.
    #[config(default = 0)]
    pub poll_timeout_ms: u64,
    /// Pause between completion queries. 0 spins.
    #[config(default = 0)]
    pub poll_interval_us: u64,
    #[config(default = true)]
    pub disarm_after_collection: bool,
}

#[derive(Config, Debug, Clone)]
pub struct AcquisitionSettings {
    #[config(default = 1000)]
    pub samples_per_record: u32,
    #[config(default = 4)]
    pub records: u32,
    #[config(default = "int_intref")]
    pub clock_source: ClockSource,
    /// software | external | level | internal | external_sync, or a raw mode code.
    #[config(default = "software")]
    pub trigger_mode: TriggerMode,
    #[config(nested)]
    pub level_trigger: LevelTriggerSettings,
    #[config(nested)]
    pub internal_trigger: InternalTriggerSettings,
}

#[derive(Config, Debug, Clone)]
pub struct LevelTriggerSettings {
    #[config(default = 10)]
    pub level: i32,
    #[config(default = "rising")]
    pub edge: TriggerEdge,
    /// "all" or a channel bit mask.
    #[config(default = "all")]
    pub channels: LevelTriggerChannels,
}

#[derive(Config, Debug, Clone)]
pub struct InternalTriggerSettings {
    #[config(default = 1000)]
    pub period: u32,
}

#[derive(Config, Debug, Clone)]
pub struct SyncSettings {
    /// Per-device clock source, first entry for unit 1. Falls back to
    /// `acquisition.clock_source`.
    pub clock_sources: Option<Vec<ClockSource>>,
    #[config(default = false)]
    pub timestamp_sync: bool,
    #[config(default = "all_triggers")]
    pub timestamp_sync_mode: TimestampSyncMode,
    #[config(default = "external")]
    pub timestamp_sync_source: TriggerMode,
}

impl Conf {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, confique::Error> {
        Conf::builder().file(path.as_ref()).load()
    }

    pub fn template() -> String {
        confique::toml::template::<Conf>(confique::toml::FormatOptions::default())
    }

    /// Builds the acquisition configuration applied to one device.
    pub fn acquisition_config(&self, device: DeviceId) -> AcquisitionConfig {
        let acq = &self.acquisition;
        let clock_source = self
            .sync_settings
            .clock_sources
            .as_ref()
            .and_then(|sources| sources.get(device.index()))
            .copied()
            .unwrap_or(acq.clock_source);

        let trigger = match acq.trigger_mode {
            TriggerMode::Level => TriggerSetup::Level {
                level: acq.level_trigger.level,
                edge: acq.level_trigger.edge,
                channels: acq.level_trigger.channels,
            },
            TriggerMode::Internal => TriggerSetup::Internal {
                period: acq.internal_trigger.period,
            },
            mode => TriggerSetup::Plain(mode),
        };

        AcquisitionConfig {
            clock_source,
            trigger,
            records: acq.records,
            samples_per_record: acq.samples_per_record,
        }
    }

    pub fn timestamp_sync(&self) -> Option<TimestampSync> {
        self.sync_settings.timestamp_sync.then_some(TimestampSync {
            mode: self.sync_settings.timestamp_sync_mode,
            source: self.sync_settings.timestamp_sync_source,
        })
    }
}

impl RunSettings {
    pub fn poll_timeout(&self) -> Option<Duration> {
        (self.poll_timeout_ms > 0).then(|| Duration::from_millis(self.poll_timeout_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, DeserializeFromStr)]
pub enum ClockSource {
    /// Internal clock, internal reference.
    #[strum(serialize = "int_intref")]
    IntIntRef,
    /// Internal clock, external 10 MHz reference.
    #[strum(serialize = "int_extref")]
    IntExtRef,
    #[strum(serialize = "ext")]
    Ext,
    #[strum(serialize = "int_pxiref")]
    IntPxiRef,
}

impl ClockSource {
    pub fn code(&self) -> u32 {
        match self {
            ClockSource::IntIntRef => 0,
            ClockSource::IntExtRef => 1,
            ClockSource::Ext => 2,
            ClockSource::IntPxiRef => 3,
        }
    }
}

/// Trigger mode of a digitizer. Codes without a named variant are passed
/// through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeFromStr)]
pub enum TriggerMode {
    Software,
    External,
    Level,
    Internal,
    ExternalSync,
    Code(u32),
}

impl TriggerMode {
    pub fn code(&self) -> u32 {
        match self {
            TriggerMode::Software => 1,
            TriggerMode::External => 2,
            TriggerMode::Level => 3,
            TriggerMode::Internal => 4,
            TriggerMode::ExternalSync => 9,
            TriggerMode::Code(code) => *code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            1 => TriggerMode::Software,
            2 => TriggerMode::External,
            3 => TriggerMode::Level,
            4 => TriggerMode::Internal,
            9 => TriggerMode::ExternalSync,
            other => TriggerMode::Code(other),
        }
    }

    pub fn is_software(&self) -> bool {
        *self == TriggerMode::Software
    }
}

impl FromStr for TriggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "software" => Ok(TriggerMode::Software),
            "external" => Ok(TriggerMode::External),
            "level" => Ok(TriggerMode::Level),
            "internal" => Ok(TriggerMode::Internal),
            "external_sync" => Ok(TriggerMode::ExternalSync),
            other => other
                .parse::<u32>()
                .map(TriggerMode::from_code)
                .map_err(|_| format!("unknown trigger mode `{other}`")),
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerMode::Software => f.write_str("software"),
            TriggerMode::External => f.write_str("external"),
            TriggerMode::Level => f.write_str("level"),
            TriggerMode::Internal => f.write_str("internal"),
            TriggerMode::ExternalSync => f.write_str("external_sync"),
            TriggerMode::Code(code) => write!(f, "{code}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, DeserializeFromStr)]
pub enum TriggerEdge {
    #[strum(serialize = "falling")]
    Falling,
    #[strum(serialize = "rising")]
    Rising,
}

impl TriggerEdge {
    pub fn code(&self) -> u32 {
        match self {
            TriggerEdge::Falling => 0,
            TriggerEdge::Rising => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeFromStr)]
pub enum LevelTriggerChannels {
    All,
    Mask(u32),
}

impl FromStr for LevelTriggerChannels {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(LevelTriggerChannels::All);
        }
        let mask = match s.strip_prefix("0x") {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => s.parse::<u32>(),
        };
        mask.map(LevelTriggerChannels::Mask)
            .map_err(|_| format!("invalid level trigger channels `{s}`"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, DeserializeFromStr)]
pub enum TimestampSyncMode {
    #[strum(serialize = "first_trigger")]
    FirstTrigger,
    #[strum(serialize = "all_triggers")]
    AllTriggers,
}

impl TimestampSyncMode {
    pub fn code(&self) -> u32 {
        match self {
            TimestampSyncMode::FirstTrigger => 0,
            TimestampSyncMode::AllTriggers => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampSync {
    pub mode: TimestampSyncMode,
    pub source: TriggerMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, DeserializeFromStr)]
pub enum TraceLevel {
    #[strum(serialize = "error")]
    Error,
    #[strum(serialize = "warning")]
    Warning,
    #[strum(serialize = "info")]
    Info,
    #[strum(serialize = "debug")]
    Debug,
}

impl TraceLevel {
    /// Level understood by the digitizer error trace, which stops at info.
    pub fn adq_level(&self) -> u32 {
        match self {
            TraceLevel::Error => 1,
            TraceLevel::Warning => 2,
            TraceLevel::Info | TraceLevel::Debug => 3,
        }
    }

    pub fn level_filter(&self) -> LevelFilter {
        match self {
            TraceLevel::Error => LevelFilter::Error,
            TraceLevel::Warning => LevelFilter::Warn,
            TraceLevel::Info => LevelFilter::Info,
            TraceLevel::Debug => LevelFilter::Debug,
        }
    }
}
