use crate::{
    ApiError, ApiResult, ClockSource, Command, ControlUnit, DeviceId, FirmwareRevision,
    LevelTriggerChannels, TimestampSyncMode, TransferRequest, TriggerEdge, TriggerMode,
};
use log::trace;
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{collections::HashSet, f64::consts::PI};

/// A digitizer as seen by the simulated control unit.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    pub serial_number: String,
    pub product_name: String,
    pub firmware: FirmwareRevision,
    pub channels: u32,
    pub bytes_per_sample: u32,
    failing: HashSet<Command>,
    stalled: bool,
    noise: i64,
}

impl SimulatedDevice {
    pub fn new(ordinal: u32) -> Self {
        Self {
            serial_number: format!("SPD-{:05}", 4000 + ordinal),
            product_name: "ADQ14".to_string(),
            firmware: FirmwareRevision {
                revision: 38_000 + ordinal as i32,
                local_copy: false,
                mixed: false,
            },
            channels: 2,
            bytes_per_sample: 2,
            failing: HashSet::new(),
            stalled: false,
            noise: 4,
        }
    }

    pub fn with_channels(mut self, channels: u32) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_bytes_per_sample(mut self, bytes: u32) -> Self {
        self.bytes_per_sample = bytes;
        self
    }

    pub fn with_noise(mut self, noise: i64) -> Self {
        self.noise = noise.abs();
        self
    }

    /// Makes every invocation of `command` report failure.
    pub fn failing_on(mut self, command: Command) -> Self {
        self.failing.insert(command);
        self
    }

    /// The device never finishes acquiring its records.
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }
}

#[derive(Debug, Default, Clone)]
struct DeviceState {
    clock_source: Option<ClockSource>,
    trigger_mode: Option<TriggerMode>,
    level: Option<i32>,
    edge: Option<TriggerEdge>,
    level_channels: Option<LevelTriggerChannels>,
    internal_period: Option<u32>,
    records: u32,
    samples_per_record: u32,
    multi_record: bool,
    armed: bool,
    acquired: u32,
    timestamp_sync: Option<(TimestampSyncMode, TriggerMode)>,
    timestamp_sync_armed: bool,
}

/// In-process control unit producing deterministic waveforms. Every state
/// changing command is logged so tests can inspect the exact sequence.
#[derive(Debug)]
pub struct SimulatedControlUnit {
    devices: Vec<SimulatedDevice>,
    states: Vec<DeviceState>,
    found: u32,
    failed_devices: u32,
    seed: u64,
    calls: Vec<(DeviceId, Command)>,
}

impl SimulatedControlUnit {
    pub fn new(devices: Vec<SimulatedDevice>) -> Self {
        let states = vec![DeviceState::default(); devices.len()];
        Self {
            devices,
            states,
            found: 0,
            failed_devices: 0,
            seed: 0x5eed,
            calls: Vec::new(),
        }
    }

    /// Two default digitizers: 2 channels, 2 bytes per sample.
    pub fn pair() -> Self {
        Self::new(vec![SimulatedDevice::new(1), SimulatedDevice::new(2)])
    }

    pub fn with_failed_devices(mut self, failed: u32) -> Self {
        self.failed_devices = failed;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn calls(&self) -> &[(DeviceId, Command)] {
        &self.calls
    }

    pub fn commands_for(&self, device: DeviceId) -> Vec<Command> {
        self.calls
            .iter()
            .filter(|(d, _)| *d == device)
            .map(|(_, command)| *command)
            .collect()
    }

    pub fn clock_source(&self, device: DeviceId) -> Option<ClockSource> {
        self.states.get(device.index())?.clock_source
    }

    pub fn trigger_mode(&self, device: DeviceId) -> Option<TriggerMode> {
        self.states.get(device.index())?.trigger_mode
    }

    pub fn level_trigger(
        &self,
        device: DeviceId,
    ) -> Option<(Option<i32>, Option<TriggerEdge>, Option<LevelTriggerChannels>)> {
        let state = self.states.get(device.index())?;
        Some((state.level, state.edge, state.level_channels))
    }

    pub fn internal_trigger_period(&self, device: DeviceId) -> Option<u32> {
        self.states.get(device.index())?.internal_period
    }

    /// Record count and samples per record while multi-record mode is open.
    pub fn multi_record(&self, device: DeviceId) -> Option<(u32, u32)> {
        let state = self.states.get(device.index())?;
        state
            .multi_record
            .then_some((state.records, state.samples_per_record))
    }

    pub fn is_armed(&self, device: DeviceId) -> bool {
        self.states
            .get(device.index())
            .is_some_and(|state| state.armed)
    }

    pub fn timestamp_sync(&self, device: DeviceId) -> Option<(TimestampSyncMode, TriggerMode)> {
        let state = self.states.get(device.index())?;
        state.timestamp_sync_armed.then_some(state.timestamp_sync?)
    }

    /// Samples of one channel for the configured geometry, shaped
    /// (record, sample). Repeated calls give identical data.
    pub fn waveform(&self, device: DeviceId, channel: usize) -> Option<Array2<i64>> {
        let dev = self.devices.get(device.index())?;
        let state = self.states.get(device.index())?;
        let amplitude = match dev.bytes_per_sample {
            1 => 100.0,
            _ => 8000.0,
        };
        let period = 50.0 + 25.0 * channel as f64;
        let noise = dev.noise;
        let seed = self.seed ^ (u64::from(device.ordinal()) << 32) ^ channel as u64;
        let mut rng = StdRng::seed_from_u64(seed);

        let shape = (state.records as usize, state.samples_per_record as usize);
        Some(Array2::from_shape_fn(shape, |(record, sample)| {
            let phase = 2.0 * PI * sample as f64 / period + 0.5 * record as f64;
            (amplitude * phase.sin()).round() as i64 + rng.random_range(-noise..=noise)
        }))
    }

    fn live(&self, device: DeviceId) -> Option<&SimulatedDevice> {
        if device.index() < self.found as usize {
            self.devices.get(device.index())
        } else {
            None
        }
    }

    fn check(&mut self, device: DeviceId, command: Command) -> ApiResult<usize> {
        trace!("sim device {device}: {command}");
        self.calls.push((device, command));
        match self.live(device) {
            Some(dev) if !dev.failing.contains(&command) => Ok(device.index()),
            _ => Err(ApiError::new(device, command)),
        }
    }

    fn transfer_fits(
        &self,
        index: usize,
        targets: &[&mut [u8]],
        request: &TransferRequest,
    ) -> bool {
        let dev = &self.devices[index];
        let state = &self.states[index];
        let channels = dev.channels as usize;
        let bytes_needed = request.target_samples * dev.bytes_per_sample as usize;
        let samples_needed = request.records as usize * request.samples_per_record as usize;

        state.multi_record
            && state.acquired >= state.records
            && request.bytes_per_sample > 0
            && request.bytes_per_sample == dev.bytes_per_sample
            && request.samples_per_record == state.samples_per_record
            && request.start_sample == 0
            && request.start_record + request.records <= state.records
            && request.target_samples >= samples_needed
            && targets.len() >= channels
            && targets
                .iter()
                .take(channels)
                .enumerate()
                .filter(|(channel, _)| request.channel_mask.contains(*channel))
                .all(|(_, target)| target.len() >= bytes_needed)
    }
}

fn encode(value: i64, out: &mut [u8]) {
    match out.len() {
        1 => out[0] = (value as i8) as u8,
        2 => out.copy_from_slice(&(value as i16).to_ne_bytes()),
        _ => {
            let bytes = value.to_ne_bytes();
            for (i, byte) in out.iter_mut().enumerate() {
                *byte = bytes.get(i).copied().unwrap_or(0);
            }
        }
    }
}

impl ControlUnit for SimulatedControlUnit {
    fn find_devices(&mut self) -> u32 {
        self.found = self.devices.len() as u32;
        self.states = vec![DeviceState::default(); self.devices.len()];
        self.found
    }

    fn failed_device_count(&self) -> u32 {
        self.failed_devices
    }

    fn api_revision(&self) -> i32 {
        52_000
    }

    fn firmware_revision(&self, device: DeviceId) -> FirmwareRevision {
        self.live(device)
            .map(|dev| dev.firmware)
            .unwrap_or_default()
    }

    fn serial_number(&self, device: DeviceId) -> String {
        self.live(device)
            .map(|dev| dev.serial_number.clone())
            .unwrap_or_default()
    }

    fn product_name(&self, device: DeviceId) -> String {
        self.live(device)
            .map(|dev| dev.product_name.clone())
            .unwrap_or_default()
    }

    fn nof_channels(&self, device: DeviceId) -> u32 {
        self.live(device).map_or(0, |dev| dev.channels)
    }

    fn bytes_per_sample(&self, device: DeviceId) -> ApiResult<u32> {
        match self.live(device) {
            Some(dev) if !dev.failing.contains(&Command::GetNofBytesPerSample) => {
                Ok(dev.bytes_per_sample)
            }
            _ => Err(ApiError::new(device, Command::GetNofBytesPerSample)),
        }
    }

    fn set_clock_source(&mut self, device: DeviceId, source: ClockSource) -> ApiResult<()> {
        let index = self.check(device, Command::SetClockSource)?;
        self.states[index].clock_source = Some(source);
        Ok(())
    }

    fn set_trigger_mode(&mut self, device: DeviceId, mode: TriggerMode) -> ApiResult<()> {
        let index = self.check(device, Command::SetTriggerMode)?;
        self.states[index].trigger_mode = Some(mode);
        Ok(())
    }

    fn set_level_trigger_level(&mut self, device: DeviceId, level: i32) -> ApiResult<()> {
        let index = self.check(device, Command::SetLvlTrigLevel)?;
        self.states[index].level = Some(level);
        Ok(())
    }

    fn set_level_trigger_edge(&mut self, device: DeviceId, edge: TriggerEdge) -> ApiResult<()> {
        let index = self.check(device, Command::SetLvlTrigEdge)?;
        self.states[index].edge = Some(edge);
        Ok(())
    }

    fn set_level_trigger_channels(
        &mut self,
        device: DeviceId,
        channels: LevelTriggerChannels,
    ) -> ApiResult<()> {
        let index = self.check(device, Command::SetLvlTrigChannel)?;
        self.states[index].level_channels = Some(channels);
        Ok(())
    }

    fn set_internal_trigger_period(&mut self, device: DeviceId, period: u32) -> ApiResult<()> {
        let index = self.check(device, Command::SetInternalTriggerPeriod)?;
        self.states[index].internal_period = Some(period);
        Ok(())
    }

    fn multi_record_setup(
        &mut self,
        device: DeviceId,
        records: u32,
        samples_per_record: u32,
    ) -> ApiResult<()> {
        let index = self.check(device, Command::MultiRecordSetup)?;
        let state = &mut self.states[index];
        state.records = records;
        state.samples_per_record = samples_per_record;
        state.multi_record = true;
        state.acquired = 0;
        Ok(())
    }

    fn disarm_timestamp_sync(&mut self, device: DeviceId) -> ApiResult<()> {
        let index = self.check(device, Command::DisarmTimestampSync)?;
        self.states[index].timestamp_sync_armed = false;
        Ok(())
    }

    fn setup_timestamp_sync(
        &mut self,
        device: DeviceId,
        mode: TimestampSyncMode,
        source: TriggerMode,
    ) -> ApiResult<()> {
        let index = self.check(device, Command::SetupTimestampSync)?;
        self.states[index].timestamp_sync = Some((mode, source));
        Ok(())
    }

    fn arm_timestamp_sync(&mut self, device: DeviceId) -> ApiResult<()> {
        let index = self.check(device, Command::ArmTimestampSync)?;
        self.states[index].timestamp_sync_armed = true;
        Ok(())
    }

    fn disarm_trigger(&mut self, device: DeviceId) -> ApiResult<()> {
        let index = self.check(device, Command::DisarmTrigger)?;
        self.states[index].armed = false;
        Ok(())
    }

    fn arm_trigger(&mut self, device: DeviceId) -> ApiResult<()> {
        let index = self.check(device, Command::ArmTrigger)?;
        let state = &mut self.states[index];
        state.armed = true;
        state.acquired = 0;
        Ok(())
    }

    fn software_trigger(&mut self, device: DeviceId) -> ApiResult<()> {
        let index = self.check(device, Command::SwTrig)?;
        let stalled = self.devices[index].stalled;
        let state = &mut self.states[index];
        if state.armed
            && !stalled
            && state.trigger_mode == Some(TriggerMode::Software)
            && state.acquired < state.records
        {
            state.acquired += 1;
        }
        Ok(())
    }

    fn acquired_all(&mut self, device: DeviceId) -> bool {
        let Some(stalled) = self.live(device).map(|dev| dev.stalled) else {
            return false;
        };
        let state = &mut self.states[device.index()];
        if stalled || !state.armed || !state.multi_record {
            return false;
        }
        // Hardware triggers keep arriving without any help from the host.
        if state.trigger_mode != Some(TriggerMode::Software) && state.acquired < state.records {
            state.acquired += 1;
        }
        state.acquired >= state.records
    }

    fn get_data(
        &mut self,
        device: DeviceId,
        targets: &mut [&mut [u8]],
        request: &TransferRequest,
    ) -> ApiResult<()> {
        let index = self.check(device, Command::GetData)?;
        if !self.transfer_fits(index, targets, request) {
            return Err(ApiError::new(device, Command::GetData));
        }

        let width = request.bytes_per_sample as usize;
        let first = request.start_record as usize;
        let last = first + request.records as usize;
        let channels = self.devices[index].channels as usize;
        for (channel, target) in targets.iter_mut().take(channels).enumerate() {
            if !request.channel_mask.contains(channel) {
                continue;
            }
            let Some(waveform) = self.waveform(device, channel) else {
                return Err(ApiError::new(device, Command::GetData));
            };
            // Row-major iteration keeps each record's samples contiguous.
            let samples = waveform.slice(ndarray::s![first..last, ..]);
            for (value, out) in samples.iter().zip(target.chunks_exact_mut(width)) {
                encode(*value, out);
            }
        }
        Ok(())
    }

    fn multi_record_close(&mut self, device: DeviceId) -> ApiResult<()> {
        let index = self.check(device, Command::MultiRecordClose)?;
        self.states[index].multi_record = false;
        Ok(())
    }
}
