use crate::{
    AcqError, CaptureBuffers, ChannelMask, ControlUnit, RunReport, Step, TransferMode,
    TransferRequest,
};
use log::info;

/// The single bulk transfer covering every record and channel of `buffers`.
pub fn transfer_request(buffers: &CaptureBuffers) -> TransferRequest {
    let geometry = buffers.geometry();
    TransferRequest {
        target_samples: geometry.samples_per_channel(),
        bytes_per_sample: geometry.bytes_per_sample,
        start_record: 0,
        records: geometry.records,
        channel_mask: ChannelMask::All,
        start_sample: 0,
        samples_per_record: geometry.samples_per_record,
        mode: TransferMode::Normal,
    }
}

/// Moves the device's records into `buffers`, then closes multi-record mode
/// whatever the transfer did. Returns whether data landed in the buffers.
pub fn retrieve(
    cu: &mut dyn ControlUnit,
    buffers: &mut CaptureBuffers,
    report: &mut RunReport,
) -> bool {
    let device = buffers.device();
    let request = transfer_request(buffers);

    let landed = report
        .gate(Some(device), Step::Transfer, || {
            let mut targets = buffers
                .targets_mut()
                .ok_or(AcqError::BuffersUnavailable { device })?;
            cu.get_data(device, &mut targets, &request)?;
            Ok::<_, AcqError>(())
        })
        .is_some();
    if landed {
        info!(
            "device {device}: transferred {} record(s) of {} sample(s)",
            request.records, request.samples_per_record
        );
    }

    match cu.multi_record_close(device) {
        Ok(()) => report.done(Some(device), Step::CloseMultiRecord),
        Err(e) => report.degrade(Some(device), Step::CloseMultiRecord, e),
    }
    landed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CaptureGeometry, Command, DeviceId, SimulatedControlUnit, SimulatedDevice, StepStatus,
        TriggerMode,
    };

    fn acquired(cu: &mut SimulatedControlUnit, device: DeviceId, records: u32, samples: u32) {
        cu.set_trigger_mode(device, TriggerMode::Internal).unwrap();
        cu.multi_record_setup(device, records, samples).unwrap();
        cu.arm_trigger(device).unwrap();
        while !cu.acquired_all(device) {}
    }

    #[test]
    fn transfer_fills_every_channel_record_major() {
        let mut cu = SimulatedControlUnit::pair();
        cu.find_devices();
        let dev = DeviceId::new(1);
        acquired(&mut cu, dev, 3, 20);

        let mut report = RunReport::new();
        let mut buffers = CaptureBuffers::prepare(&mut cu, dev, 3, 20, &mut report);
        assert!(retrieve(&mut cu, &mut buffers, &mut report));
        assert!(report.is_success());

        let matrix = buffers.sample_matrix().unwrap();
        assert_eq!(matrix.dim(), (2, 3, 20));
        for channel in 0..2 {
            let expected = cu.waveform(dev, channel).unwrap().mapv(|v| v as i32);
            assert_eq!(matrix.index_axis(ndarray::Axis(0), channel), expected);
        }
        assert_eq!(cu.multi_record(dev), None);
    }

    #[test]
    fn request_covers_all_records() {
        let mut report = RunReport::new();
        let geometry = CaptureGeometry {
            samples_per_record: 1000,
            records: 4,
            bytes_per_sample: 2,
        };
        let buffers =
            CaptureBuffers::allocate_with(DeviceId::new(2), geometry, 2, &mut report, |_, b| {
                Ok(vec![0; b])
            });
        let request = transfer_request(&buffers);
        assert_eq!(request.target_samples, 4000);
        assert_eq!(request.start_record, 0);
        assert_eq!(request.records, 4);
        assert_eq!(request.start_sample, 0);
        assert_eq!(request.channel_mask, ChannelMask::All);
        assert_eq!(request.mode, TransferMode::Normal);
    }

    #[test]
    fn close_runs_after_failed_transfer() {
        let mut cu = SimulatedControlUnit::new(vec![
            SimulatedDevice::new(1).failing_on(Command::GetData),
            SimulatedDevice::new(2),
        ]);
        cu.find_devices();
        let dev = DeviceId::new(1);
        acquired(&mut cu, dev, 2, 8);

        let mut report = RunReport::new();
        let mut buffers = CaptureBuffers::prepare(&mut cu, dev, 2, 8, &mut report);
        assert!(!retrieve(&mut cu, &mut buffers, &mut report));
        assert!(!report.is_success());
        assert_eq!(
            cu.commands_for(dev),
            vec![
                Command::SetTriggerMode,
                Command::MultiRecordSetup,
                Command::ArmTrigger,
                Command::GetData,
                Command::MultiRecordClose,
            ]
        );
        assert!(matches!(
            report.status_of(Some(dev), Step::CloseMultiRecord),
            Some(StepStatus::Done)
        ));
    }

    #[test]
    fn transfer_is_skipped_over_missing_buffers() {
        let mut cu = SimulatedControlUnit::pair();
        cu.find_devices();
        let dev = DeviceId::new(2);
        acquired(&mut cu, dev, 1, 8);

        let mut report = RunReport::new();
        let geometry = CaptureGeometry {
            samples_per_record: 8,
            records: 1,
            bytes_per_sample: 2,
        };
        let mut buffers =
            CaptureBuffers::allocate_with(dev, geometry, 2, &mut report, |channel, b| {
                if channel == 0 {
                    Err(Vec::<u8>::new().try_reserve_exact(usize::MAX).unwrap_err())
                } else {
                    Ok(vec![0; b])
                }
            });
        assert!(!retrieve(&mut cu, &mut buffers, &mut report));
        assert!(!cu.commands_for(dev).contains(&Command::GetData));
        assert!(cu.commands_for(dev).contains(&Command::MultiRecordClose));
        assert!(matches!(
            report.status_of(Some(dev), Step::Transfer),
            Some(StepStatus::Skipped)
        ));
    }
}
