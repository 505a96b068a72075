use crate::{AcqError, ControlUnit, DeviceId, FirmwareRevision};
use log::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub serial_number: String,
    pub product_name: String,
    pub firmware: FirmwareRevision,
}

/// Digitizers taking part in the run, addressed by ordinal.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    api_revision: i32,
    found: u32,
    failed: u32,
    devices: Vec<DeviceInfo>,
}

impl DeviceRegistry {
    pub const REQUIRED_DEVICES: u32 = 2;

    pub fn discover(cu: &mut dyn ControlUnit) -> Result<Self, AcqError> {
        let found = cu.find_devices();
        let failed = cu.failed_device_count();
        info!("Number of ADQ devices found: {found}");
        info!("Number of failed ADQ devices: {failed}");

        if found < Self::REQUIRED_DEVICES {
            return Err(AcqError::NotEnoughDevices {
                found,
                failed,
                required: Self::REQUIRED_DEVICES,
            });
        }
        if found > Self::REQUIRED_DEVICES {
            info!(
                "Using the first {} of {found} devices",
                Self::REQUIRED_DEVICES
            );
        }

        let devices = (1..=Self::REQUIRED_DEVICES)
            .map(DeviceId::new)
            .map(|id| DeviceInfo {
                id,
                serial_number: cu.serial_number(id),
                product_name: cu.product_name(id),
                firmware: cu.firmware_revision(id),
            })
            .collect();

        Ok(Self {
            api_revision: cu.api_revision(),
            found,
            failed,
            devices,
        })
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    pub fn ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.iter().map(|device| device.id)
    }

    pub fn get(&self, id: DeviceId) -> Option<&DeviceInfo> {
        self.devices.iter().find(|device| device.id == id)
    }

    pub fn found(&self) -> u32 {
        self.found
    }

    pub fn failed(&self) -> u32 {
        self.failed
    }

    pub fn log_device(&self, id: DeviceId) {
        let Some(device) = self.get(id) else {
            return;
        };
        info!(
            "Device {id}:\n\
             API revision:        {}\n\
             Firmware revision:   {}\n\
             Board serial number: {}\n\
             Board product name:  {}",
            self.api_revision, device.firmware, device.serial_number, device.product_name
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SimulatedControlUnit, SimulatedDevice};

    #[test]
    fn discovers_both_devices() {
        let mut cu = SimulatedControlUnit::pair().with_failed_devices(1);
        let registry = DeviceRegistry::discover(&mut cu).unwrap();
        assert_eq!(registry.found(), 2);
        assert_eq!(registry.failed(), 1);
        let ids: Vec<u32> = registry.ids().map(|id| id.ordinal()).collect();
        assert_eq!(ids, vec![1, 2]);
        let second = registry.get(DeviceId::new(2)).unwrap();
        assert_eq!(second.serial_number, "SPD-04002");
        assert_eq!(second.product_name, "ADQ14");
    }

    #[test]
    fn single_device_is_not_enough() {
        let mut cu = SimulatedControlUnit::new(vec![SimulatedDevice::new(1)]);
        match DeviceRegistry::discover(&mut cu) {
            Err(AcqError::NotEnoughDevices {
                found, required, ..
            }) => {
                assert_eq!(found, 1);
                assert_eq!(required, 2);
            }
            other => panic!("unexpected discovery result: {other:?}"),
        }
    }

    #[test]
    fn extra_devices_are_left_alone() {
        let mut cu = SimulatedControlUnit::new((1..=3).map(SimulatedDevice::new).collect());
        let registry = DeviceRegistry::discover(&mut cu).unwrap();
        assert_eq!(registry.found(), 3);
        assert_eq!(registry.devices().len(), 2);
        assert!(registry.get(DeviceId::new(3)).is_none());
    }
}
