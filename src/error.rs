use crate::{ApiError, DeviceId};
use std::{io, path::PathBuf, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcqError {
    #[error("found {found} device(s) but {required} are required ({failed} failed to initialize)")]
    NotEnoughDevices {
        found: u32,
        failed: u32,
        required: u32,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("device {device}: could not allocate {bytes} bytes for channel {channel}")]
    Allocation {
        device: DeviceId,
        channel: usize,
        bytes: usize,
    },

    #[error("device {device} reports {channels} channels, at most {max} can be transferred")]
    TooManyChannels {
        device: DeviceId,
        channels: usize,
        max: usize,
    },

    #[error("device {device}: capture buffers are incomplete")]
    BuffersUnavailable { device: DeviceId },

    #[error("device {device}: records not acquired within {timeout:?}")]
    PollTimeout { device: DeviceId, timeout: Duration },

    #[error("device {device}: wait for records cancelled")]
    Cancelled { device: DeviceId },

    #[error("device {device} record {record}: {values} value(s) of unsupported width {width}")]
    UnsupportedSampleWidth {
        device: DeviceId,
        record: u32,
        width: u32,
        values: usize,
    },

    #[error("device {device} record {record}: could not open {}: {source}", path.display())]
    OpenRecordFile {
        device: DeviceId,
        record: u32,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("device {device} record {record}: writing {} failed: {source}", path.display())]
    WriteRecordFile {
        device: DeviceId,
        record: u32,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
