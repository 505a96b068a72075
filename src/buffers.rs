use crate::{AcqError, ControlUnit, DeviceId, RunReport, Step, MAX_CHANNELS};
use log::debug;
use ndarray::Array3;
use std::collections::TryReserveError;

/// Shape of one device's capture: every channel holds
/// `records * samples_per_record` samples of `bytes_per_sample` bytes,
/// record-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureGeometry {
    pub samples_per_record: u32,
    pub records: u32,
    pub bytes_per_sample: u32,
}

impl CaptureGeometry {
    pub fn samples_per_channel(&self) -> usize {
        self.records as usize * self.samples_per_record as usize
    }

    pub fn bytes_per_channel(&self) -> usize {
        self.samples_per_channel() * self.bytes_per_sample as usize
    }

    /// Byte range of one sample inside a channel buffer.
    pub fn sample_offset(&self, record: u32, sample: u32) -> usize {
        (record as usize * self.samples_per_record as usize + sample as usize)
            * self.bytes_per_sample as usize
    }
}

/// Channel buffers owned by a single device pass. Dropping the value
/// releases every buffer.
#[derive(Debug)]
pub struct CaptureBuffers {
    device: DeviceId,
    geometry: CaptureGeometry,
    channels: Vec<Option<Vec<u8>>>,
}

impl CaptureBuffers {
    /// Queries the device's channel count and sample width, then allocates
    /// a zeroed buffer per channel.
    pub fn prepare(
        cu: &mut dyn ControlUnit,
        device: DeviceId,
        records: u32,
        samples_per_record: u32,
        report: &mut RunReport,
    ) -> Self {
        Self::prepare_with(cu, device, records, samples_per_record, report, reserve)
    }

    pub fn prepare_with(
        cu: &mut dyn ControlUnit,
        device: DeviceId,
        records: u32,
        samples_per_record: u32,
        report: &mut RunReport,
        alloc: impl FnMut(usize, usize) -> Result<Vec<u8>, TryReserveError>,
    ) -> Self {
        let channels = cu.nof_channels(device) as usize;
        let bytes_per_sample = report
            .gate(Some(device), Step::SampleFormat, || {
                cu.bytes_per_sample(device)
            })
            .unwrap_or(0);
        debug!("device {device}: {channels} channel(s), {bytes_per_sample} byte(s) per sample");

        let geometry = CaptureGeometry {
            samples_per_record,
            records,
            bytes_per_sample,
        };
        Self::allocate_with(device, geometry, channels, report, alloc)
    }

    /// Attempts every channel even after a failed one so the whole set is
    /// released the same way.
    pub fn allocate_with(
        device: DeviceId,
        geometry: CaptureGeometry,
        channels: usize,
        report: &mut RunReport,
        mut alloc: impl FnMut(usize, usize) -> Result<Vec<u8>, TryReserveError>,
    ) -> Self {
        let mut count = channels;
        if channels > MAX_CHANNELS {
            report.fail(
                Some(device),
                Step::Allocate {
                    channel: MAX_CHANNELS,
                },
                AcqError::TooManyChannels {
                    device,
                    channels,
                    max: MAX_CHANNELS,
                },
            );
            count = MAX_CHANNELS;
        }

        let bytes = geometry.bytes_per_channel();
        let channels = (0..count)
            .map(|channel| {
                let step = Step::Allocate { channel };
                match alloc(channel, bytes) {
                    Ok(buffer) => {
                        report.done(Some(device), step);
                        Some(buffer)
                    }
                    Err(_) => {
                        report.fail(
                            Some(device),
                            step,
                            AcqError::Allocation {
                                device,
                                channel,
                                bytes,
                            },
                        );
                        None
                    }
                }
            })
            .collect();

        Self {
            device,
            geometry,
            channels,
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn geometry(&self) -> CaptureGeometry {
        self.geometry
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, channel: usize) -> Option<&[u8]> {
        self.channels.get(channel)?.as_deref()
    }

    /// True when every channel has a buffer.
    pub fn is_complete(&self) -> bool {
        self.channels.iter().all(Option::is_some)
    }

    /// One writable slice per channel, or `None` if any allocation failed.
    pub fn targets_mut(&mut self) -> Option<Vec<&mut [u8]>> {
        self.channels
            .iter_mut()
            .map(|buffer| buffer.as_deref_mut())
            .collect()
    }

    /// Value of one sample in channel `channel`, if the sample width is one
    /// the device is known to produce.
    pub fn sample(&self, channel: usize, record: u32, sample: u32) -> Option<i32> {
        let buffer = self.channel(channel)?;
        let offset = self.geometry.sample_offset(record, sample);
        decode_sample(buffer.get(offset..)?, self.geometry.bytes_per_sample)
    }

    /// All samples as a (channel, record, sample) array.
    pub fn sample_matrix(&self) -> Option<Array3<i32>> {
        if !self.is_complete() || !matches!(self.geometry.bytes_per_sample, 1 | 2) {
            return None;
        }
        let shape = (
            self.channels.len(),
            self.geometry.records as usize,
            self.geometry.samples_per_record as usize,
        );
        let mut matrix = Array3::zeros(shape);
        for ((channel, record, sample), value) in matrix.indexed_iter_mut() {
            *value = self.sample(channel, record as u32, sample as u32)?;
        }
        Some(matrix)
    }
}

fn reserve(_channel: usize, bytes: usize) -> Result<Vec<u8>, TryReserveError> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(bytes)?;
    buffer.resize(bytes, 0);
    Ok(buffer)
}

/// Decodes the first sample in `bytes`: width 2 is `i16`, width 1 is `i8`,
/// both in native byte order.
pub fn decode_sample(bytes: &[u8], width: u32) -> Option<i32> {
    match width {
        1 => bytes.first().map(|b| i32::from(*b as i8)),
        2 => {
            let raw: [u8; 2] = bytes.get(..2)?.try_into().ok()?;
            Some(i32::from(i16::from_ne_bytes(raw)))
        }
        _ => None,
    }
}
