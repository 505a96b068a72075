use crate::{AcqError, ControlUnit, DeviceId, RunReport, RunSettings, Step, TriggerMode};
use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, info};
use std::{
    thread,
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Waiting,
    AllAcquired,
}

/// Spins on a device's "all records acquired" query, pulsing the software
/// trigger on every iteration when the device is software triggered.
#[derive(Debug, Clone, Default)]
pub struct CompletionPoller {
    timeout: Option<Duration>,
    interval: Duration,
    cancel: Option<Receiver<()>>,
}

impl CompletionPoller {
    pub fn new(timeout: Option<Duration>, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            cancel: None,
        }
    }

    pub fn from_settings(settings: &RunSettings) -> Self {
        Self::new(settings.poll_timeout(), settings.poll_interval())
    }

    /// Any message on `cancel` abandons the current wait.
    pub fn with_cancel(mut self, cancel: Receiver<()>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        match &self.cancel {
            Some(rx) => match rx.try_recv() {
                Ok(()) => true,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => false,
            },
            None => false,
        }
    }

    /// Returns `AllAcquired` once the device has every record, or
    /// immediately when the run has already failed. A timeout or
    /// cancellation is recorded as a failure and leaves the state `Waiting`.
    pub fn wait(
        &self,
        cu: &mut dyn ControlUnit,
        device: DeviceId,
        mode: TriggerMode,
        report: &mut RunReport,
    ) -> PollState {
        let dev = Some(device);
        if !report.is_success() {
            report.skip(dev, Step::WaitForRecords);
            return PollState::AllAcquired;
        }

        let start = Instant::now();
        let mut state = PollState::Waiting;
        let mut pulses = 0u64;
        while state == PollState::Waiting {
            if cu.acquired_all(device) {
                state = PollState::AllAcquired;
                break;
            }
            if mode.is_software() && report.is_success() {
                match crate::trigger::software_trigger(cu, device) {
                    Ok(()) => pulses += 1,
                    Err(e) => report.fail(dev, Step::SoftwareTrigger, e),
                }
            }
            if let Some(timeout) = self.timeout {
                if start.elapsed() >= timeout {
                    report.fail(
                        dev,
                        Step::WaitForRecords,
                        AcqError::PollTimeout { device, timeout },
                    );
                    return state;
                }
            }
            if self.cancelled() {
                report.fail(dev, Step::WaitForRecords, AcqError::Cancelled { device });
                return state;
            }
            if !self.interval.is_zero() {
                thread::sleep(self.interval);
            }
        }

        if mode.is_software() {
            debug!("device {device}: {pulses} software trigger pulse(s)");
        }
        info!(
            "device {device}: all records acquired after {:.3} s",
            start.elapsed().as_secs_f64()
        );
        report.done(dev, Step::WaitForRecords);
        state
    }
}
