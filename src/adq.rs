use crate::{ClockSource, LevelTriggerChannels, TimestampSyncMode, TriggerEdge, TriggerMode};
use std::fmt;

/// Upper bound on the channels a single bulk transfer can fill.
pub const MAX_CHANNELS: usize = 8;

/// 1-based ordinal of a digitizer inside a control unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(u32);

impl DeviceId {
    pub fn new(ordinal: u32) -> Self {
        assert!(ordinal > 0, "device ordinals start at 1");
        Self(ordinal)
    }

    pub fn ordinal(&self) -> u32 {
        self.0
    }

    /// 0-based position, for per-device settings lists.
    pub fn index(&self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commands that change digitizer state. Names follow the vendor API so
/// failures can be matched against the digitizer's own error trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    SetClockSource,
    SetTriggerMode,
    SetLvlTrigLevel,
    SetLvlTrigEdge,
    SetLvlTrigChannel,
    SetInternalTriggerPeriod,
    MultiRecordSetup,
    DisarmTimestampSync,
    SetupTimestampSync,
    ArmTimestampSync,
    DisarmTrigger,
    ArmTrigger,
    SwTrig,
    GetNofBytesPerSample,
    GetData,
    MultiRecordClose,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::SetClockSource => "ADQ_SetClockSource",
            Command::SetTriggerMode => "ADQ_SetTriggerMode",
            Command::SetLvlTrigLevel => "ADQ_SetLvlTrigLevel",
            Command::SetLvlTrigEdge => "ADQ_SetLvlTrigEdge",
            Command::SetLvlTrigChannel => "ADQ_SetLvlTrigChannel",
            Command::SetInternalTriggerPeriod => "ADQ_SetInternalTriggerPeriod",
            Command::MultiRecordSetup => "ADQ_MultiRecordSetup",
            Command::DisarmTimestampSync => "ADQ_DisarmTimestampSync",
            Command::SetupTimestampSync => "ADQ_SetupTimestampSync",
            Command::ArmTimestampSync => "ADQ_ArmTimestampSync",
            Command::DisarmTrigger => "ADQ_DisarmTrigger",
            Command::ArmTrigger => "ADQ_ArmTrigger",
            Command::SwTrig => "ADQ_SWTrig",
            Command::GetNofBytesPerSample => "ADQ_GetNofBytesPerSample",
            Command::GetData => "ADQ_GetData",
            Command::MultiRecordClose => "ADQ_MultiRecordClose",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command the digitizer reported as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{command} failed on device {device}")]
pub struct ApiError {
    pub device: DeviceId,
    pub command: Command,
}

impl ApiError {
    pub fn new(device: DeviceId, command: Command) -> Self {
        Self { device, command }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FirmwareRevision {
    pub revision: i32,
    /// Built from a local working copy rather than a managed checkout.
    pub local_copy: bool,
    pub mixed: bool,
}

impl fmt::Display for FirmwareRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.revision)?;
        if self.local_copy {
            f.write_str(" (Local copy)")
        } else if self.mixed {
            f.write_str(" (SVN Managed, Mixed Revision)")
        } else {
            f.write_str(" (SVN Managed)")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    #[default]
    Normal,
}

/// Arguments of one bulk multi-record transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    /// Samples per target buffer, all records included.
    pub target_samples: usize,
    pub bytes_per_sample: u32,
    pub start_record: u32,
    pub records: u32,
    pub channel_mask: ChannelMask,
    pub start_sample: u32,
    pub samples_per_record: u32,
    pub mode: TransferMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMask {
    All,
    Mask(u8),
}

impl ChannelMask {
    pub fn contains(&self, channel: usize) -> bool {
        match self {
            ChannelMask::All => true,
            ChannelMask::Mask(mask) => channel < 8 && mask & (1 << channel) != 0,
        }
    }
}

/// Command/query surface of a digitizer control unit. Creating the
/// implementor opens the control-unit context and dropping it releases every
/// device the context discovered.
pub trait ControlUnit {
    fn enable_error_trace(&mut self, _level: u32, _directory: &str) -> bool {
        true
    }

    /// Enumerates connected digitizers and returns how many were found.
    fn find_devices(&mut self) -> u32;
    fn failed_device_count(&self) -> u32;

    fn api_revision(&self) -> i32;
    fn firmware_revision(&self, device: DeviceId) -> FirmwareRevision;
    fn serial_number(&self, device: DeviceId) -> String;
    fn product_name(&self, device: DeviceId) -> String;
    fn nof_channels(&self, device: DeviceId) -> u32;
    fn bytes_per_sample(&self, device: DeviceId) -> ApiResult<u32>;

    fn set_clock_source(&mut self, device: DeviceId, source: ClockSource) -> ApiResult<()>;
    fn set_trigger_mode(&mut self, device: DeviceId, mode: TriggerMode) -> ApiResult<()>;
    fn set_level_trigger_level(&mut self, device: DeviceId, level: i32) -> ApiResult<()>;
    fn set_level_trigger_edge(&mut self, device: DeviceId, edge: TriggerEdge) -> ApiResult<()>;
    fn set_level_trigger_channels(
        &mut self,
        device: DeviceId,
        channels: LevelTriggerChannels,
    ) -> ApiResult<()>;
    fn set_internal_trigger_period(&mut self, device: DeviceId, period: u32) -> ApiResult<()>;
    fn multi_record_setup(
        &mut self,
        device: DeviceId,
        records: u32,
        samples_per_record: u32,
    ) -> ApiResult<()>;

    fn disarm_timestamp_sync(&mut self, device: DeviceId) -> ApiResult<()>;
    fn setup_timestamp_sync(
        &mut self,
        device: DeviceId,
        mode: TimestampSyncMode,
        source: TriggerMode,
    ) -> ApiResult<()>;
    fn arm_timestamp_sync(&mut self, device: DeviceId) -> ApiResult<()>;

    fn disarm_trigger(&mut self, device: DeviceId) -> ApiResult<()>;
    fn arm_trigger(&mut self, device: DeviceId) -> ApiResult<()>;
    fn software_trigger(&mut self, device: DeviceId) -> ApiResult<()>;
    /// True once every configured record has been acquired.
    fn acquired_all(&mut self, device: DeviceId) -> bool;

    /// Moves acquired samples into `targets`, one slice per channel.
    fn get_data(
        &mut self,
        device: DeviceId,
        targets: &mut [&mut [u8]],
        request: &TransferRequest,
    ) -> ApiResult<()>;
    fn multi_record_close(&mut self, device: DeviceId) -> ApiResult<()>;
}
