use crate::{AcqError, CaptureBuffers, DeviceId, RunReport, Step};
use log::{debug, info};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

/// Writes each record of a device as a tab-delimited text matrix, one row
/// per sample and one column per channel.
#[derive(Debug, Clone)]
pub struct RecordSerializer {
    output_dir: PathBuf,
}

impl RecordSerializer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn record_path(&self, device: DeviceId, record: u32) -> PathBuf {
        self.output_dir
            .join(format!("data_unit{}_record{record}.asc", device.ordinal()))
    }

    /// Serializes every record. A file that cannot be opened or written is
    /// skipped without touching the run outcome; values with an unsupported
    /// sample width fail the run but the rest of the file is still written.
    pub fn write_records(&self, buffers: &CaptureBuffers, report: &mut RunReport) -> Vec<PathBuf> {
        let device = buffers.device();
        let geometry = buffers.geometry();
        let mut written = Vec::new();

        for record in 0..geometry.records {
            let dev = Some(device);
            let step = Step::Serialize { record };
            let path = self.record_path(device, record);

            let file = match File::create(&path) {
                Ok(file) => file,
                Err(source) => {
                    report.degrade(
                        dev,
                        step,
                        AcqError::OpenRecordFile {
                            device,
                            record,
                            path,
                            source,
                        },
                    );
                    continue;
                }
            };

            let mut writer = BufWriter::new(file);
            let result = write_rows(&mut writer, buffers, record)
                .and_then(|unformatted| writer.flush().map(|()| unformatted));
            match result {
                Ok(0) => report.done(dev, step),
                Ok(values) => report.fail(
                    dev,
                    step,
                    AcqError::UnsupportedSampleWidth {
                        device,
                        record,
                        width: geometry.bytes_per_sample,
                        values,
                    },
                ),
                Err(source) => {
                    report.degrade(
                        dev,
                        step,
                        AcqError::WriteRecordFile {
                            device,
                            record,
                            path,
                            source,
                        },
                    );
                    continue;
                }
            }
            debug!("wrote {}", path.display());
            report.add_file(path.clone());
            written.push(path);
        }

        info!(
            "device {device}: {} of {} record file(s) written to {}",
            written.len(),
            geometry.records,
            self.output_dir.display()
        );
        written
    }
}

/// Writes the rows of one record and returns how many values could not be
/// formatted.
pub fn write_rows<W: Write>(
    out: &mut W,
    buffers: &CaptureBuffers,
    record: u32,
) -> io::Result<usize> {
    let geometry = buffers.geometry();
    let mut unformatted = 0;
    for sample in 0..geometry.samples_per_record {
        for channel in 0..buffers.channel_count() {
            match buffers.sample(channel, record, sample) {
                Some(value) => write!(out, "{value}\t")?,
                None => unformatted += 1,
            }
        }
        out.write_all(b"\n")?;
    }
    Ok(unformatted)
}

/// Bytes of one channel buffer, for callers comparing files against it.
pub fn record_slice(buffers: &CaptureBuffers, channel: usize, record: u32) -> Option<&[u8]> {
    let geometry = buffers.geometry();
    let start = geometry.sample_offset(record, 0);
    let end = geometry.sample_offset(record + 1, 0);
    buffers.channel(channel)?.get(start..end)
}
