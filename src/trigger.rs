use crate::{ApiResult, Command, ControlUnit, DeviceId, RunReport, Step, TimestampSync};

/// Disarms and re-arms the trigger of one device. Safe to call for every
/// device back to back before any of them is polled.
pub fn arm(cu: &mut dyn ControlUnit, device: DeviceId, report: &mut RunReport) {
    report.gate(Some(device), Step::Arm(Command::DisarmTrigger), || {
        cu.disarm_trigger(device)
    });
    report.gate(Some(device), Step::Arm(Command::ArmTrigger), || {
        cu.arm_trigger(device)
    });
}

/// Resets the timestamp counter on the configured trigger so both devices
/// share a time base.
pub fn sync_timestamps(
    cu: &mut dyn ControlUnit,
    device: DeviceId,
    sync: &TimestampSync,
    report: &mut RunReport,
) {
    let dev = Some(device);
    let step = Step::TimestampSync;
    report.gate(dev, step(Command::DisarmTimestampSync), || {
        cu.disarm_timestamp_sync(device)
    });
    report.gate(dev, step(Command::SetupTimestampSync), || {
        cu.setup_timestamp_sync(device, sync.mode, sync.source)
    });
    report.gate(dev, step(Command::ArmTimestampSync), || {
        cu.arm_timestamp_sync(device)
    });
}

pub fn software_trigger(cu: &mut dyn ControlUnit, device: DeviceId) -> ApiResult<()> {
    cu.software_trigger(device)
}

/// Best-effort disarm once a device's data has been collected.
pub fn disarm(cu: &mut dyn ControlUnit, device: DeviceId, report: &mut RunReport) {
    match cu.disarm_trigger(device) {
        Ok(()) => report.done(Some(device), Step::Disarm),
        Err(e) => report.degrade(Some(device), Step::Disarm, e),
    }
}
