use adq_multirecord::*;
use std::{fs, io::Write};
use tempfile::{tempdir, Builder};

fn conf(toml: &str) -> Conf {
    let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(toml.as_bytes()).unwrap();
    Conf::load(file.path()).unwrap()
}

fn parse_rows(text: &str) -> Vec<Vec<i32>> {
    text.lines()
        .map(|line| {
            line.split('\t')
                .filter(|field| !field.is_empty())
                .map(|field| field.parse().unwrap())
                .collect()
        })
        .collect()
}

#[test]
fn two_devices_software_trigger_reference_run() {
    let dir = tempdir().unwrap();
    let acquisition = Acquisition::new(conf("")).with_output_dir(dir.path());
    let mut cu = SimulatedControlUnit::pair();
    let report = acquisition.run(&mut cu);

    assert!(report.is_success(), "{:?}", report.first_failure());
    assert_eq!(report.files().len(), 8);

    for ordinal in 1..=2 {
        let device = DeviceId::new(ordinal);
        let waveforms: Vec<_> = (0..2).map(|ch| cu.waveform(device, ch).unwrap()).collect();
        for record in 0..4u32 {
            let path = dir
                .path()
                .join(format!("data_unit{ordinal}_record{record}.asc"));
            let text = fs::read_to_string(&path).unwrap();
            assert!(text.lines().all(|line| line.ends_with('\t')));

            let rows = parse_rows(&text);
            assert_eq!(rows.len(), 1000);
            for (sample, row) in rows.iter().enumerate() {
                assert_eq!(row.len(), 2);
                for (channel, value) in row.iter().enumerate() {
                    let expected = waveforms[channel][[record as usize, sample]];
                    assert_eq!(i64::from(*value), expected);
                    assert!(i16::try_from(*value).is_ok());
                }
            }
        }
    }
}

#[test]
fn too_few_devices_issue_no_commands() {
    let dir = tempdir().unwrap();
    let acquisition = Acquisition::new(conf("")).with_output_dir(dir.path());
    let mut cu = SimulatedControlUnit::new(vec![SimulatedDevice::new(1)]);
    let report = acquisition.run(&mut cu);

    assert!(!report.is_success());
    assert!(cu.calls().is_empty());
    assert!(matches!(
        report.status_of(None, Step::Discover),
        Some(StepStatus::Failed(AcqError::NotEnoughDevices { found: 1, .. }))
    ));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn failed_arm_stops_all_later_commands() {
    let dir = tempdir().unwrap();
    let acquisition = Acquisition::new(conf("")).with_output_dir(dir.path());
    let mut cu = SimulatedControlUnit::new(vec![
        SimulatedDevice::new(1),
        SimulatedDevice::new(2).failing_on(Command::ArmTrigger),
    ]);
    let report = acquisition.run(&mut cu);
    assert!(!report.is_success());

    let failed_at = cu
        .calls()
        .iter()
        .position(|call| *call == (DeviceId::new(2), Command::ArmTrigger))
        .unwrap();
    // Only cleanup reaches the devices after the failure.
    let after = &cu.calls()[failed_at + 1..];
    assert!(after.iter().all(|(_, command)| matches!(
        command,
        Command::MultiRecordClose | Command::DisarmTrigger
    )));
    assert!(report.files().is_empty());
    assert_eq!(report.failures().count(), 1);
}

#[test]
fn level_trigger_run_with_one_byte_samples() {
    let dir = tempdir().unwrap();
    let acquisition = Acquisition::new(conf(
        r#"
[acquisition]
samples_per_record = 64
records = 2
trigger_mode = "level"

[acquisition.level_trigger]
level = -20
edge = "falling"
channels = "0x1"

[sync_settings]
clock_sources = ["int_extref", "ext"]
"#,
    ))
    .with_output_dir(dir.path());
    let mut cu = SimulatedControlUnit::new(vec![
        SimulatedDevice::new(1)
            .with_bytes_per_sample(1)
            .with_channels(4),
        SimulatedDevice::new(2)
            .with_bytes_per_sample(1)
            .with_channels(1),
    ]);
    let report = acquisition.run(&mut cu);
    assert!(report.is_success(), "{:?}", report.first_failure());

    let (dev1, dev2) = (DeviceId::new(1), DeviceId::new(2));
    assert_eq!(cu.clock_source(dev1), Some(ClockSource::IntExtRef));
    assert_eq!(cu.clock_source(dev2), Some(ClockSource::Ext));
    assert_eq!(
        cu.level_trigger(dev2),
        Some((
            Some(-20),
            Some(TriggerEdge::Falling),
            Some(LevelTriggerChannels::Mask(1))
        ))
    );

    let unit1 = fs::read_to_string(dir.path().join("data_unit1_record1.asc")).unwrap();
    let rows = parse_rows(&unit1);
    assert_eq!(rows.len(), 64);
    assert!(rows.iter().all(|row| row.len() == 4));
    assert!(rows.iter().flatten().all(|v| i8::try_from(*v).is_ok()));

    let unit2 = fs::read_to_string(dir.path().join("data_unit2_record0.asc")).unwrap();
    assert!(parse_rows(&unit2).iter().all(|row| row.len() == 1));
}

#[test]
fn stalled_device_times_out_and_skips_its_files() {
    let dir = tempdir().unwrap();
    let acquisition = Acquisition::new(conf(
        "[run_settings]\npoll_timeout_ms = 20\npoll_interval_us = 100\n",
    ))
    .with_output_dir(dir.path());
    let mut cu = SimulatedControlUnit::new(vec![
        SimulatedDevice::new(1).stalled(),
        SimulatedDevice::new(2),
    ]);
    let report = acquisition.run(&mut cu);

    assert!(!report.is_success());
    assert!(matches!(
        report.first_failure().map(|f| &f.status),
        Some(StepStatus::Failed(AcqError::PollTimeout { .. }))
    ));
    assert!(report.files().is_empty());
    let unit2 = DeviceId::new(2);
    assert!(!cu.commands_for(unit2).contains(&Command::GetData));
    assert!(matches!(
        report.status_of(Some(DeviceId::new(1)), Step::Serialize { record: 3 }),
        Some(StepStatus::Skipped)
    ));
}

#[test]
fn serialized_records_match_buffers_and_rewrite_identically() {
    let dir = tempdir().unwrap();
    let mut cu = SimulatedControlUnit::pair().with_seed(7);
    let device = DeviceId::new(1);
    cu.find_devices();
    cu.set_trigger_mode(device, TriggerMode::Internal).unwrap();
    cu.multi_record_setup(device, 3, 50).unwrap();
    cu.arm_trigger(device).unwrap();
    while !cu.acquired_all(device) {}

    let mut report = RunReport::new();
    let mut buffers = CaptureBuffers::prepare(&mut cu, device, 3, 50, &mut report);
    assert!(retriever::retrieve(&mut cu, &mut buffers, &mut report));

    let serializer = RecordSerializer::new(dir.path());
    let first = serializer.write_records(&buffers, &mut report);
    let before: Vec<_> = first.iter().map(|p| fs::read(p).unwrap()).collect();
    let second = serializer.write_records(&buffers, &mut report);
    let after: Vec<_> = second.iter().map(|p| fs::read(p).unwrap()).collect();
    assert_eq!(before, after);
    assert!(report.is_success());

    let rows = parse_rows(&String::from_utf8(before[2].clone()).unwrap());
    for channel in 0..2 {
        let bytes = record_slice(&buffers, channel, 2).unwrap();
        let expected: Vec<i32> = bytes
            .chunks_exact(2)
            .map(|b| decode_sample(b, 2).unwrap())
            .collect();
        let column: Vec<i32> = rows.iter().map(|row| row[channel]).collect();
        assert_eq!(column, expected);
    }
}
