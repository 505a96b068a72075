use crate::{AcqError, Command, DeviceId};
use log::{debug, error, warn};
use std::{fmt, path::PathBuf};

/// One stage of the acquisition sequence, as attributed in the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Discover,
    Configure(Command),
    TimestampSync(Command),
    Arm(Command),
    SoftwareTrigger,
    WaitForRecords,
    SampleFormat,
    Allocate { channel: usize },
    Transfer,
    CloseMultiRecord,
    Disarm,
    Serialize { record: u32 },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Discover => f.write_str("discover"),
            Step::Configure(cmd) => write!(f, "configure ({cmd})"),
            Step::TimestampSync(cmd) => write!(f, "timestamp sync ({cmd})"),
            Step::Arm(cmd) => write!(f, "arm ({cmd})"),
            Step::SoftwareTrigger => f.write_str("software trigger"),
            Step::WaitForRecords => f.write_str("wait for records"),
            Step::SampleFormat => f.write_str("sample format"),
            Step::Allocate { channel } => write!(f, "allocate channel {channel}"),
            Step::Transfer => f.write_str("transfer"),
            Step::CloseMultiRecord => f.write_str("close multi-record"),
            Step::Disarm => f.write_str("disarm"),
            Step::Serialize { record } => write!(f, "serialize record {record}"),
        }
    }
}

#[derive(Debug)]
pub enum StepStatus {
    Done,
    /// Not executed because an earlier step failed.
    Skipped,
    Failed(AcqError),
    /// Went wrong without affecting the run outcome.
    Degraded(AcqError),
}

#[derive(Debug)]
pub struct StepRecord {
    pub device: Option<DeviceId>,
    pub step: Step,
    pub status: StepStatus,
}

/// Outcome of one acquisition run. Failure is monotonic: after the first
/// failed step every gated step is skipped and `is_success` stays false.
#[derive(Debug, Default)]
pub struct RunReport {
    steps: Vec<StepRecord>,
    failed: bool,
    files: Vec<PathBuf>,
}

impl RunReport {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn is_success(&self) -> bool {
        !self.failed
    }

    /// Runs `op` only while the run is still successful. A failure is
    /// recorded and flips the outcome; `None` means skipped or failed.
    pub fn gate<T, E>(
        &mut self,
        device: Option<DeviceId>,
        step: Step,
        op: impl FnOnce() -> Result<T, E>,
    ) -> Option<T>
    where
        E: Into<AcqError>,
    {
        if self.failed {
            self.skip(device, step);
            return None;
        }
        match op() {
            Ok(value) => {
                self.done(device, step);
                Some(value)
            }
            Err(e) => {
                self.fail(device, step, e);
                None
            }
        }
    }

    pub fn done(&mut self, device: Option<DeviceId>, step: Step) {
        self.push(device, step, StepStatus::Done);
    }

    pub fn skip(&mut self, device: Option<DeviceId>, step: Step) {
        debug!("{}: {step} skipped", Self::label(device));
        self.push(device, step, StepStatus::Skipped);
    }

    pub fn fail(&mut self, device: Option<DeviceId>, step: Step, err: impl Into<AcqError>) {
        let err = err.into();
        error!("{}: {step} failed: {err}", Self::label(device));
        self.failed = true;
        self.push(device, step, StepStatus::Failed(err));
    }

    pub fn degrade(&mut self, device: Option<DeviceId>, step: Step, err: impl Into<AcqError>) {
        let err = err.into();
        warn!("{}: {step}: {err}", Self::label(device));
        self.push(device, step, StepStatus::Degraded(err));
    }

    pub fn add_file(&mut self, path: PathBuf) {
        self.files.push(path);
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps
            .iter()
            .filter(|record| matches!(record.status, StepStatus::Failed(_)))
    }

    pub fn first_failure(&self) -> Option<&StepRecord> {
        self.failures().next()
    }

    pub fn status_of(&self, device: Option<DeviceId>, step: Step) -> Option<&StepStatus> {
        self.steps
            .iter()
            .rev()
            .find(|record| record.device == device && record.step == step)
            .map(|record| &record.status)
    }

    fn push(&mut self, device: Option<DeviceId>, step: Step, status: StepStatus) {
        self.steps.push(StepRecord {
            device,
            step,
            status,
        });
    }

    fn label(device: Option<DeviceId>) -> String {
        match device {
            Some(device) => format!("device {device}"),
            None => "control unit".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ApiError;

    fn dev() -> Option<DeviceId> {
        Some(DeviceId::new(1))
    }

    #[test]
    fn gate_runs_while_successful() {
        let mut report = RunReport::new();
        let value = report.gate(dev(), Step::Transfer, || Ok::<_, AcqError>(5));
        assert_eq!(value, Some(5));
        assert!(report.is_success());
        assert!(matches!(
            report.status_of(dev(), Step::Transfer),
            Some(StepStatus::Done)
        ));
    }

    #[test]
    fn failure_is_monotonic() {
        let mut report = RunReport::new();
        let cmd = Command::ArmTrigger;
        report.gate(dev(), Step::Arm(cmd), || {
            Err::<(), _>(ApiError::new(DeviceId::new(1), cmd))
        });
        assert!(!report.is_success());

        let mut ran = false;
        let value = report.gate(dev(), Step::Transfer, || {
            ran = true;
            Ok::<_, AcqError>(())
        });
        assert!(value.is_none());
        assert!(!ran);
        assert!(matches!(
            report.status_of(dev(), Step::Transfer),
            Some(StepStatus::Skipped)
        ));

        report.done(dev(), Step::CloseMultiRecord);
        assert!(!report.is_success());
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.first_failure().map(|r| r.step), Some(Step::Arm(cmd)));
    }

    #[test]
    fn degraded_steps_keep_outcome() {
        let mut report = RunReport::new();
        report.degrade(
            dev(),
            Step::CloseMultiRecord,
            ApiError::new(DeviceId::new(1), Command::MultiRecordClose),
        );
        assert!(report.is_success());
        assert_eq!(report.failures().count(), 0);
    }
}
