//! Control unit backed by the vendor `libadq` through generated bindings.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(dead_code)]

mod ffi {
    include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
}

use crate::{
    ApiError, ApiResult, ChannelMask, ClockSource, Command, ControlUnit, DeviceId,
    FirmwareRevision, LevelTriggerChannels, TimestampSyncMode, TransferMode, TransferRequest,
    TriggerEdge, TriggerMode, MAX_CHANNELS,
};
use libc::{c_char, c_void};
use std::{
    ffi::{CStr, CString},
    ptr,
};

/// Owns one `ADQControlUnit` context. Dropping it releases every device the
/// context opened.
#[derive(Debug)]
pub struct AdqControlUnit {
    handle: *mut c_void,
}

impl AdqControlUnit {
    /// Returns `None` if the library could not create a context.
    pub fn new() -> Option<Self> {
        let handle = unsafe { ffi::CreateADQControlUnit() };
        if handle.is_null() {
            None
        } else {
            Some(Self { handle })
        }
    }

    fn run(&self, device: DeviceId, command: Command, ret: impl Into<i64>) -> ApiResult<()> {
        if ret.into() != 0 {
            Ok(())
        } else {
            Err(ApiError::new(device, command))
        }
    }

    fn string(ptr: *const c_char) -> String {
        if ptr.is_null() {
            return String::new();
        }
        let name = unsafe { CStr::from_ptr(ptr) };
        name.to_string_lossy().into_owned()
    }
}

impl Drop for AdqControlUnit {
    fn drop(&mut self) {
        unsafe { ffi::DeleteADQControlUnit(self.handle) };
    }
}

impl ControlUnit for AdqControlUnit {
    fn enable_error_trace(&mut self, level: u32, directory: &str) -> bool {
        let Ok(dir) = CString::new(directory) else {
            return false;
        };
        let ret = unsafe {
            ffi::ADQControlUnit_EnableErrorTrace(self.handle, level as _, dir.as_ptr())
        };
        ret != 0
    }

    fn find_devices(&mut self) -> u32 {
        unsafe { ffi::ADQControlUnit_FindDevices(self.handle) as u32 }
    }

    fn failed_device_count(&self) -> u32 {
        unsafe { ffi::ADQControlUnit_GetFailedDeviceCount(self.handle) as u32 }
    }

    fn api_revision(&self) -> i32 {
        unsafe { ffi::ADQAPI_GetRevision() as i32 }
    }

    fn firmware_revision(&self, device: DeviceId) -> FirmwareRevision {
        let rev = unsafe { ffi::ADQ_GetRevision(self.handle, device.ordinal() as _) };
        if rev.is_null() {
            return FirmwareRevision::default();
        }
        // [revision, local copy, mixed revision]
        let fields = unsafe { std::slice::from_raw_parts(rev as *const i32, 3) };
        FirmwareRevision {
            revision: fields[0],
            local_copy: fields[1] != 0,
            mixed: fields[2] != 0,
        }
    }

    fn serial_number(&self, device: DeviceId) -> String {
        let serial = unsafe { ffi::ADQ_GetBoardSerialNumber(self.handle, device.ordinal() as _) };
        Self::string(serial)
    }

    fn product_name(&self, device: DeviceId) -> String {
        let name = unsafe { ffi::ADQ_GetBoardProductName(self.handle, device.ordinal() as _) };
        Self::string(name)
    }

    fn nof_channels(&self, device: DeviceId) -> u32 {
        unsafe { ffi::ADQ_GetNofChannels(self.handle, device.ordinal() as _) as u32 }
    }

    fn bytes_per_sample(&self, device: DeviceId) -> ApiResult<u32> {
        let mut bytes: u32 = 0;
        let ret = unsafe {
            ffi::ADQ_GetNofBytesPerSample(
                self.handle,
                device.ordinal() as _,
                &mut bytes as *mut u32 as _,
            )
        };
        self.run(device, Command::GetNofBytesPerSample, ret)?;
        Ok(bytes)
    }

    fn set_clock_source(&mut self, device: DeviceId, source: ClockSource) -> ApiResult<()> {
        let ret = unsafe {
            ffi::ADQ_SetClockSource(self.handle, device.ordinal() as _, source.code() as _)
        };
        self.run(device, Command::SetClockSource, ret)
    }

    fn set_trigger_mode(&mut self, device: DeviceId, mode: TriggerMode) -> ApiResult<()> {
        let ret = unsafe {
            ffi::ADQ_SetTriggerMode(self.handle, device.ordinal() as _, mode.code() as _)
        };
        self.run(device, Command::SetTriggerMode, ret)
    }

    fn set_level_trigger_level(&mut self, device: DeviceId, level: i32) -> ApiResult<()> {
        let ret = unsafe {
            ffi::ADQ_SetLvlTrigLevel(self.handle, device.ordinal() as _, level as _)
        };
        self.run(device, Command::SetLvlTrigLevel, ret)
    }

    fn set_level_trigger_edge(&mut self, device: DeviceId, edge: TriggerEdge) -> ApiResult<()> {
        let ret = unsafe {
            ffi::ADQ_SetLvlTrigEdge(self.handle, device.ordinal() as _, edge.code() as _)
        };
        self.run(device, Command::SetLvlTrigEdge, ret)
    }

    fn set_level_trigger_channels(
        &mut self,
        device: DeviceId,
        channels: LevelTriggerChannels,
    ) -> ApiResult<()> {
        let mask = match channels {
            LevelTriggerChannels::All => ffi::ADQ_LEVEL_TRIGGER_ALL_CHANNELS as u32,
            LevelTriggerChannels::Mask(mask) => mask,
        };
        let ret = unsafe {
            ffi::ADQ_SetLvlTrigChannel(self.handle, device.ordinal() as _, mask as _)
        };
        self.run(device, Command::SetLvlTrigChannel, ret)
    }

    fn set_internal_trigger_period(&mut self, device: DeviceId, period: u32) -> ApiResult<()> {
        let ret = unsafe {
            ffi::ADQ_SetInternalTriggerPeriod(self.handle, device.ordinal() as _, period as _)
        };
        self.run(device, Command::SetInternalTriggerPeriod, ret)
    }

    fn multi_record_setup(
        &mut self,
        device: DeviceId,
        records: u32,
        samples_per_record: u32,
    ) -> ApiResult<()> {
        let ret = unsafe {
            ffi::ADQ_MultiRecordSetup(
                self.handle,
                device.ordinal() as _,
                records as _,
                samples_per_record as _,
            )
        };
        self.run(device, Command::MultiRecordSetup, ret)
    }

    fn disarm_timestamp_sync(&mut self, device: DeviceId) -> ApiResult<()> {
        let ret = unsafe { ffi::ADQ_DisarmTimestampSync(self.handle, device.ordinal() as _) };
        self.run(device, Command::DisarmTimestampSync, ret)
    }

    fn setup_timestamp_sync(
        &mut self,
        device: DeviceId,
        mode: TimestampSyncMode,
        source: TriggerMode,
    ) -> ApiResult<()> {
        let ret = unsafe {
            ffi::ADQ_SetupTimestampSync(
                self.handle,
                device.ordinal() as _,
                mode.code() as _,
                source.code() as _,
            )
        };
        self.run(device, Command::SetupTimestampSync, ret)
    }

    fn arm_timestamp_sync(&mut self, device: DeviceId) -> ApiResult<()> {
        let ret = unsafe { ffi::ADQ_ArmTimestampSync(self.handle, device.ordinal() as _) };
        self.run(device, Command::ArmTimestampSync, ret)
    }

    fn disarm_trigger(&mut self, device: DeviceId) -> ApiResult<()> {
        let ret = unsafe { ffi::ADQ_DisarmTrigger(self.handle, device.ordinal() as _) };
        self.run(device, Command::DisarmTrigger, ret)
    }

    fn arm_trigger(&mut self, device: DeviceId) -> ApiResult<()> {
        let ret = unsafe { ffi::ADQ_ArmTrigger(self.handle, device.ordinal() as _) };
        self.run(device, Command::ArmTrigger, ret)
    }

    fn software_trigger(&mut self, device: DeviceId) -> ApiResult<()> {
        let ret = unsafe { ffi::ADQ_SWTrig(self.handle, device.ordinal() as _) };
        self.run(device, Command::SwTrig, ret)
    }

    fn acquired_all(&mut self, device: DeviceId) -> bool {
        unsafe { ffi::ADQ_GetAcquiredAll(self.handle, device.ordinal() as _) != 0 }
    }

    fn get_data(
        &mut self,
        device: DeviceId,
        targets: &mut [&mut [u8]],
        request: &TransferRequest,
    ) -> ApiResult<()> {
        let bytes_needed = request.target_samples * request.bytes_per_sample as usize;
        if targets.len() > MAX_CHANNELS || targets.iter().any(|t| t.len() < bytes_needed) {
            return Err(ApiError::new(device, Command::GetData));
        }

        let mut pointers = [ptr::null_mut::<c_void>(); MAX_CHANNELS];
        for (slot, target) in pointers.iter_mut().zip(targets.iter_mut()) {
            *slot = target.as_mut_ptr() as *mut c_void;
        }
        let mask = match request.channel_mask {
            ChannelMask::All => ffi::ADQ_ALL_CHANNELS_MASK as u8,
            ChannelMask::Mask(mask) => mask,
        };
        let mode = match request.mode {
            TransferMode::Normal => ffi::ADQ_TRANSFER_MODE_NORMAL as u8,
        };

        let ret = unsafe {
            ffi::ADQ_GetData(
                self.handle,
                device.ordinal() as _,
                pointers.as_mut_ptr() as _,
                request.target_samples as _,
                request.bytes_per_sample as _,
                request.start_record as _,
                request.records as _,
                mask as _,
                request.start_sample as _,
                request.samples_per_record as _,
                mode as _,
            )
        };
        self.run(device, Command::GetData, ret)
    }

    fn multi_record_close(&mut self, device: DeviceId) -> ApiResult<()> {
        let ret = unsafe { ffi::ADQ_MultiRecordClose(self.handle, device.ordinal() as _) };
        self.run(device, Command::MultiRecordClose, ret)
    }
}
