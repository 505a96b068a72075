use crate::{
    ClockSource, Command, ControlUnit, DeviceId, LevelTriggerChannels, RunReport, Step,
    TriggerEdge, TriggerMode,
};

/// Trigger mode together with the parameters that only make sense for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSetup {
    Level {
        level: i32,
        edge: TriggerEdge,
        channels: LevelTriggerChannels,
    },
    Internal {
        period: u32,
    },
    /// Any mode without extra parameters, unknown codes included.
    Plain(TriggerMode),
}

impl TriggerSetup {
    pub fn mode(&self) -> TriggerMode {
        match self {
            TriggerSetup::Level { .. } => TriggerMode::Level,
            TriggerSetup::Internal { .. } => TriggerMode::Internal,
            TriggerSetup::Plain(mode) => *mode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionConfig {
    pub clock_source: ClockSource,
    pub trigger: TriggerSetup,
    pub records: u32,
    pub samples_per_record: u32,
}

/// Applies clock, trigger and multi-record geometry to one device. Each
/// command runs only if everything before it succeeded.
pub fn configure(
    cu: &mut dyn ControlUnit,
    device: DeviceId,
    config: &AcquisitionConfig,
    report: &mut RunReport,
) {
    let dev = Some(device);

    report.gate(dev, Step::Configure(Command::SetClockSource), || {
        cu.set_clock_source(device, config.clock_source)
    });
    report.gate(dev, Step::Configure(Command::SetTriggerMode), || {
        cu.set_trigger_mode(device, config.trigger.mode())
    });
    match config.trigger {
        TriggerSetup::Level {
            level,
            edge,
            channels,
        } => {
            report.gate(dev, Step::Configure(Command::SetLvlTrigLevel), || {
                cu.set_level_trigger_level(device, level)
            });
            report.gate(dev, Step::Configure(Command::SetLvlTrigEdge), || {
                cu.set_level_trigger_edge(device, edge)
            });
            report.gate(dev, Step::Configure(Command::SetLvlTrigChannel), || {
                cu.set_level_trigger_channels(device, channels)
            });
        }
        TriggerSetup::Internal { period } => {
            report.gate(
                dev,
                Step::Configure(Command::SetInternalTriggerPeriod),
                || cu.set_internal_trigger_period(device, period),
            );
        }
        TriggerSetup::Plain(_) => {}
    }
    report.gate(dev, Step::Configure(Command::MultiRecordSetup), || {
        cu.multi_record_setup(device, config.records, config.samples_per_record)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SimulatedControlUnit, SimulatedDevice, StepStatus};

    fn config(trigger: TriggerSetup) -> AcquisitionConfig {
        AcquisitionConfig {
            clock_source: ClockSource::IntExtRef,
            trigger,
            records: 4,
            samples_per_record: 1000,
        }
    }

    fn discovered(cu: SimulatedControlUnit) -> SimulatedControlUnit {
        let mut cu = cu;
        cu.find_devices();
        cu
    }

    #[test]
    fn level_mode_applies_level_parameters_only() {
        let mut cu = discovered(SimulatedControlUnit::pair());
        let mut report = RunReport::new();
        let dev = DeviceId::new(1);
        let setup = TriggerSetup::Level {
            level: 10,
            edge: TriggerEdge::Rising,
            channels: LevelTriggerChannels::All,
        };
        configure(&mut cu, dev, &config(setup), &mut report);

        assert!(report.is_success());
        assert_eq!(
            cu.commands_for(dev),
            vec![
                Command::SetClockSource,
                Command::SetTriggerMode,
                Command::SetLvlTrigLevel,
                Command::SetLvlTrigEdge,
                Command::SetLvlTrigChannel,
                Command::MultiRecordSetup,
            ]
        );
        assert_eq!(cu.trigger_mode(dev), Some(TriggerMode::Level));
        assert_eq!(
            cu.level_trigger(dev),
            Some((
                Some(10),
                Some(TriggerEdge::Rising),
                Some(LevelTriggerChannels::All)
            ))
        );
        assert_eq!(cu.clock_source(dev), Some(ClockSource::IntExtRef));
        assert_eq!(cu.multi_record(dev), Some((4, 1000)));
    }

    #[test]
    fn internal_mode_applies_period_only() {
        let mut cu = discovered(SimulatedControlUnit::pair());
        let mut report = RunReport::new();
        let dev = DeviceId::new(2);
        configure(
            &mut cu,
            dev,
            &config(TriggerSetup::Internal { period: 1000 }),
            &mut report,
        );
        assert_eq!(cu.internal_trigger_period(dev), Some(1000));
        assert_eq!(cu.level_trigger(dev), Some((None, None, None)));
        assert!(!cu.commands_for(dev).contains(&Command::SetLvlTrigLevel));
    }

    #[test]
    fn other_modes_apply_no_extra_parameters() {
        for mode in [
            TriggerMode::Software,
            TriggerMode::External,
            TriggerMode::Code(42),
        ] {
            let mut cu = discovered(SimulatedControlUnit::pair());
            let mut report = RunReport::new();
            let dev = DeviceId::new(1);
            let plain = config(TriggerSetup::Plain(mode));
            configure(&mut cu, dev, &plain, &mut report);
            assert_eq!(
                cu.commands_for(dev),
                vec![
                    Command::SetClockSource,
                    Command::SetTriggerMode,
                    Command::MultiRecordSetup,
                ]
            );
            assert_eq!(cu.trigger_mode(dev), Some(mode));
        }
    }

    #[test]
    fn failed_command_stops_the_chain() {
        let mut cu = discovered(SimulatedControlUnit::new(vec![
            SimulatedDevice::new(1).failing_on(Command::SetTriggerMode),
            SimulatedDevice::new(2),
        ]));
        let mut report = RunReport::new();
        let dev = DeviceId::new(1);
        configure(
            &mut cu,
            dev,
            &config(TriggerSetup::Internal { period: 50 }),
            &mut report,
        );

        assert!(!report.is_success());
        assert_eq!(
            cu.commands_for(dev),
            vec![Command::SetClockSource, Command::SetTriggerMode]
        );
        assert!(matches!(
            report.status_of(
                Some(dev),
                Step::Configure(Command::SetInternalTriggerPeriod)
            ),
            Some(StepStatus::Skipped)
        ));
        assert!(matches!(
            report.status_of(Some(dev), Step::Configure(Command::MultiRecordSetup)),
            Some(StepStatus::Skipped)
        ));

        // A failure on the first device keeps the second one untouched.
        configure(
            &mut cu,
            DeviceId::new(2),
            &config(TriggerSetup::Plain(TriggerMode::Software)),
            &mut report,
        );
        assert!(cu.commands_for(DeviceId::new(2)).is_empty());
    }
}
