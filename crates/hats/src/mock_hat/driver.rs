use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use super::signal_generator::{voltage_to_code, SignalGenerator};
use crate::types::{
    AnalogInputHat, ChannelMask, HatError, HatId, HatInfo, HatLister, ReadRequest, ReadResult,
    ScanOptions, ScanStatus, TriggerMode, MAX_CHANNEL,
};

/// Aggregate sample rate limit of the MCC 118.
pub const MAX_AGGREGATE_RATE: f64 = 100_000.0;

/// Scan clock the rate divisor is applied to.
const SCAN_CLOCK_HZ: f64 = 16_000_000.0;

/// Sleep granularity while a realtime read waits for samples.
const READ_POLL: Duration = Duration::from_millis(5);

/// Compute the per-channel rate the MCC 118 scan clock can actually produce.
pub fn actual_scan_rate(channel_count: u8, sample_rate_per_channel: f64) -> Result<f64, HatError> {
    if channel_count == 0 || channel_count > MAX_CHANNEL + 1 {
        return Err(HatError::BadParameter(format!(
            "Invalid channel count: {}",
            channel_count
        )));
    }
    if !(sample_rate_per_channel > 0.0) {
        return Err(HatError::BadParameter(format!(
            "Invalid sample rate: {}",
            sample_rate_per_channel
        )));
    }

    let aggregate = sample_rate_per_channel * channel_count as f64;
    if aggregate > MAX_AGGREGATE_RATE {
        return Err(HatError::BadParameter(format!(
            "Aggregate rate {} exceeds {} S/s",
            aggregate, MAX_AGGREGATE_RATE
        )));
    }

    let divisor = (SCAN_CLOCK_HZ / aggregate).round().max(1.0);
    Ok(SCAN_CLOCK_HZ / divisor / channel_count as f64)
}

/// Settings for the simulated board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockHatConfig {
    /// Address the board pretends to sit at
    pub address: u8,
    /// Status polls before the external trigger fires; `None` waits for `fire_trigger`
    pub trigger_after_polls: Option<u32>,
    /// Peak noise added to every sample
    pub noise_volts: f64,
    /// Pace acquisition by the wall clock instead of producing samples on demand
    pub realtime: bool,
    pub seed: u64,
}

impl Default for MockHatConfig {
    fn default() -> Self {
        Self {
            address: 0,
            trigger_after_polls: Some(100),
            noise_volts: 0.005,
            realtime: false,
            seed: 0,
        }
    }
}

/// A simulated MCC 118 that does not access any hardware.
pub struct MockHat {
    inner: Arc<Mutex<MockInner>>,
}

/// Handle for poking a `MockHat` from outside the scan loop.
#[derive(Clone)]
pub struct MockHatHandle {
    inner: Arc<Mutex<MockInner>>,
}

/// Internal state for the MockHat.
struct MockInner {
    config: MockHatConfig,
    trigger_mode: TriggerMode,
    scan: Option<ActiveScan>,
    generator: SignalGenerator,
}

struct ActiveScan {
    channels: Vec<u8>,
    samples_per_channel: u32,
    rate: f64,
    options: ScanOptions,
    triggered_at: Option<Instant>,
    polls: u32,
    /// Samples per channel acquired into the buffer since the trigger
    acquired: u64,
    /// Samples per channel handed out by reads
    consumed: u64,
    stopped: bool,
    hardware_overrun: bool,
    buffer_overrun: bool,
}

impl ActiveScan {
    fn continuous(&self) -> bool {
        self.options.contains(ScanOptions::CONTINUOUS)
    }

    fn buffer_capacity(&self) -> u64 {
        if self.continuous() {
            (self.samples_per_channel as u64).max(self.rate.ceil() as u64)
        } else {
            self.samples_per_channel as u64
        }
    }

    fn acquisition_limit(&self) -> Option<u64> {
        if self.continuous() {
            None
        } else {
            Some(self.samples_per_channel as u64)
        }
    }

    fn acquiring(&self) -> bool {
        self.triggered_at.is_some() && !self.halted()
    }

    fn halted(&self) -> bool {
        self.stopped
            || self.hardware_overrun
            || self.buffer_overrun
            || self.acquisition_limit().map_or(false, |limit| self.acquired >= limit)
    }

    fn running(&self) -> bool {
        // waiting for the trigger counts as running
        (self.triggered_at.is_none() && !self.halted()) || self.acquiring()
    }

    fn fire_trigger(&mut self) {
        if self.triggered_at.is_none() {
            debug!("Simulated trigger fired after {} polls", self.polls);
            self.triggered_at = Some(Instant::now());
        }
    }

    /// Bring `acquired` up to date with the scan clock.
    fn advance_clock(&mut self) {
        let Some(start) = self.triggered_at else { return };
        if self.halted() {
            return;
        }
        let mut acquired = (start.elapsed().as_secs_f64() * self.rate) as u64;
        if let Some(limit) = self.acquisition_limit() {
            acquired = acquired.min(limit);
        }
        self.acquired = self.acquired.max(acquired);
        self.check_buffer();
    }

    /// Produce samples so that `wanted` more are available, as if they had arrived instantly.
    fn advance_on_demand(&mut self, wanted: u64) {
        if !self.acquiring() {
            return;
        }
        let mut target = self.consumed + wanted;
        if let Some(limit) = self.acquisition_limit() {
            target = target.min(limit);
        }
        self.acquired = self.acquired.max(target);
    }

    fn check_buffer(&mut self) {
        if self.acquired - self.consumed > self.buffer_capacity() {
            warn!("Simulated scan buffer overrun");
            self.buffer_overrun = true;
        }
    }

    fn available(&self) -> u64 {
        self.acquired - self.consumed
    }

    fn status(&self) -> ScanStatus {
        ScanStatus {
            running: self.running(),
            triggered: self.triggered_at.is_some(),
            hardware_overrun: self.hardware_overrun,
            buffer_overrun: self.buffer_overrun,
            samples_available: self.available().min(u32::MAX as u64) as u32,
        }
    }
}

impl MockHat {
    pub fn new(config: MockHatConfig) -> Result<Self, HatError> {
        if config.address > 7 {
            return Err(HatError::InvalidAddress(config.address));
        }

        let inner = MockInner {
            generator: SignalGenerator::new(1000.0, config.noise_volts, config.seed),
            config: config.clone(),
            trigger_mode: TriggerMode::default(),
            scan: None,
        };

        info!("MockHat created with config: {:?}", config);

        Ok(MockHat {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    pub fn handle(&self) -> MockHatHandle {
        MockHatHandle {
            inner: self.inner.clone(),
        }
    }

    pub fn current_trigger_mode(&self) -> Result<TriggerMode, HatError> {
        Ok(lock(&self.inner)?.trigger_mode)
    }

    fn read_realtime(
        inner: &Arc<Mutex<MockInner>>,
        wanted: Option<u64>,
        timeout: Option<Duration>,
    ) -> Result<(), HatError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            {
                let mut guard = lock(inner)?;
                let scan = guard.scan.as_mut().ok_or(HatError::ResourceUnavailable)?;
                scan.advance_clock();
                let satisfied = match wanted {
                    Some(wanted) => scan.available() >= wanted,
                    None => true,
                };
                let finished = scan.triggered_at.is_some() && scan.halted();
                if satisfied || finished {
                    return Ok(());
                }
            }
            match deadline {
                Some(deadline) if Instant::now() >= deadline => return Ok(()),
                Some(deadline) => thread::sleep(READ_POLL.min(deadline - Instant::now())),
                None => thread::sleep(READ_POLL),
            }
        }
    }
}

fn lock(inner: &Arc<Mutex<MockInner>>) -> Result<MutexGuard<'_, MockInner>, HatError> {
    inner
        .lock()
        .map_err(|_| HatError::Other("MockHat state lock poisoned".to_string()))
}

impl MockHatHandle {
    /// Fire the external trigger of the active scan.
    pub fn fire_trigger(&self) -> Result<(), HatError> {
        let mut inner = lock(&self.inner)?;
        let scan = inner.scan.as_mut().ok_or(HatError::ResourceUnavailable)?;
        scan.fire_trigger();
        Ok(())
    }

    /// Flag a hardware overrun, which also halts the scan.
    pub fn inject_hardware_overrun(&self) -> Result<(), HatError> {
        let mut inner = lock(&self.inner)?;
        let scan = inner.scan.as_mut().ok_or(HatError::ResourceUnavailable)?;
        scan.hardware_overrun = true;
        Ok(())
    }

    /// Flag a scan buffer overrun, which also halts the scan.
    pub fn inject_buffer_overrun(&self) -> Result<(), HatError> {
        let mut inner = lock(&self.inner)?;
        let scan = inner.scan.as_mut().ok_or(HatError::ResourceUnavailable)?;
        scan.buffer_overrun = true;
        Ok(())
    }

    /// Whether a scan is allocated (started and not yet cleaned up).
    pub fn scan_active(&self) -> Result<bool, HatError> {
        Ok(lock(&self.inner)?.scan.is_some())
    }
}

impl AnalogInputHat for MockHat {
    fn address(&self) -> u8 {
        lock(&self.inner).map(|inner| inner.config.address).unwrap_or_default()
    }

    fn trigger_mode(&mut self, mode: TriggerMode) -> Result<(), HatError> {
        debug!("Setting simulated trigger mode to {}", mode.name());
        lock(&self.inner)?.trigger_mode = mode;
        Ok(())
    }

    fn a_in_scan_actual_rate(
        &self,
        channel_count: u8,
        sample_rate_per_channel: f64,
    ) -> Result<f64, HatError> {
        actual_scan_rate(channel_count, sample_rate_per_channel)
    }

    fn a_in_scan_start(
        &mut self,
        channel_mask: ChannelMask,
        samples_per_channel: u32,
        sample_rate_per_channel: f64,
        options: ScanOptions,
    ) -> Result<(), HatError> {
        let channels = channel_mask.channels();
        if channels.is_empty() {
            return Err(HatError::BadParameter("Empty channel mask".to_string()));
        }
        if samples_per_channel == 0 && !options.contains(ScanOptions::CONTINUOUS) {
            return Err(HatError::BadParameter(
                "A finite scan needs at least one sample per channel".to_string(),
            ));
        }
        let rate = actual_scan_rate(channels.len() as u8, sample_rate_per_channel)?;

        let mut inner = lock(&self.inner)?;
        if inner.scan.as_ref().map_or(false, |scan| scan.running()) {
            return Err(HatError::Busy);
        }

        let mut scan = ActiveScan {
            channels,
            samples_per_channel,
            rate,
            options,
            triggered_at: None,
            polls: 0,
            acquired: 0,
            consumed: 0,
            stopped: false,
            hardware_overrun: false,
            buffer_overrun: false,
        };
        if !options.contains(ScanOptions::EXTTRIGGER) {
            scan.fire_trigger();
        }

        inner.generator = SignalGenerator::new(rate, inner.config.noise_volts, inner.config.seed);
        inner.scan = Some(scan);

        info!(
            "Simulated scan started: mask={:#04x} samples={} rate={} options={}",
            channel_mask.bits(),
            samples_per_channel,
            rate,
            options
        );
        Ok(())
    }

    fn a_in_scan_status(&mut self) -> Result<ScanStatus, HatError> {
        let mut inner = lock(&self.inner)?;
        let realtime = inner.config.realtime;
        let trigger_after = inner.config.trigger_after_polls;
        let scan = inner.scan.as_mut().ok_or(HatError::ResourceUnavailable)?;

        scan.polls = scan.polls.saturating_add(1);
        if scan.triggered_at.is_none() && !scan.stopped {
            if let Some(after) = trigger_after {
                if scan.polls > after {
                    scan.fire_trigger();
                }
            }
        }
        if realtime {
            scan.advance_clock();
        }

        let status = scan.status();
        trace!("a_in_scan_status() = {:?}", status);
        Ok(status)
    }

    fn a_in_scan_read(
        &mut self,
        request: ReadRequest,
        timeout: Option<Duration>,
    ) -> Result<ReadResult, HatError> {
        let realtime = lock(&self.inner)?.config.realtime;
        let wanted = match request {
            ReadRequest::Samples(n) => Some(n as u64),
            ReadRequest::AllAvailable => None,
        };

        if realtime {
            Self::read_realtime(&self.inner, wanted, timeout)?;
        }

        let mut inner = lock(&self.inner)?;
        let MockInner {
            scan, generator, ..
        } = &mut *inner;
        let scan = scan.as_mut().ok_or(HatError::ResourceUnavailable)?;

        if !realtime {
            // a tenth of a second worth of data when reading everything
            let chunk = wanted.unwrap_or_else(|| (scan.rate / 10.0).ceil().max(1.0) as u64);
            scan.advance_on_demand(chunk);
        }

        let available = scan.available();
        let take = match wanted {
            Some(wanted) => available.min(wanted),
            None => available,
        };

        let mut data = Vec::new();
        generator.fill(&scan.channels, take as usize, &mut data);
        if scan.options.contains(ScanOptions::NOSCALEDATA) {
            for value in data.iter_mut() {
                *value = voltage_to_code(*value);
            }
        }
        scan.consumed += take;

        let status = scan.status();
        let timed_out = match wanted {
            Some(wanted) => take < wanted && status.running,
            None => false,
        };

        trace!("a_in_scan_read({:?}) -> {} samples per channel", request, take);

        Ok(ReadResult {
            data,
            hardware_overrun: status.hardware_overrun,
            buffer_overrun: status.buffer_overrun,
            running: status.running,
            triggered: status.triggered,
            timeout: timed_out,
        })
    }

    fn a_in_scan_stop(&mut self) -> Result<(), HatError> {
        let mut inner = lock(&self.inner)?;
        if let Some(scan) = inner.scan.as_mut() {
            scan.stopped = true;
            debug!("Simulated scan stopped");
        }
        Ok(())
    }

    fn a_in_scan_cleanup(&mut self) -> Result<(), HatError> {
        let mut inner = lock(&self.inner)?;
        if inner.scan.take().is_some() {
            debug!("Simulated scan resources released");
        }
        Ok(())
    }

    fn a_in_read(&mut self, channel: u8, options: ScanOptions) -> Result<f64, HatError> {
        if channel > MAX_CHANNEL {
            return Err(HatError::BadParameter(format!(
                "Invalid channel index: {}",
                channel
            )));
        }
        let mut inner = lock(&self.inner)?;
        let value = inner.generator.instantaneous(channel);
        if options.contains(ScanOptions::NOSCALEDATA) {
            Ok(voltage_to_code(value))
        } else {
            Ok(value)
        }
    }
}

impl Drop for MockHat {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.lock() {
            if inner.scan.is_some() {
                warn!("MockHat dropped without cleaning up its scan.");
            }
        }
    }
}

/// Device list made of fixed entries.
#[derive(Debug, Clone, Default)]
pub struct MockLister {
    pub boards: Vec<HatInfo>,
}

impl MockLister {
    pub fn new(boards: Vec<HatInfo>) -> Self {
        Self { boards }
    }

    /// A single MCC 118 at `address`.
    pub fn single_mcc118(address: u8) -> Self {
        Self::new(vec![HatInfo {
            address,
            id: HatId::Mcc118.code(),
            version: 1,
            product_name: "MCC 118 Voltage HAT".to_string(),
        }])
    }
}

impl HatLister for MockLister {
    fn hat_list(&self, filter: HatId) -> Result<Vec<HatInfo>, HatError> {
        let mut boards: Vec<HatInfo> = self
            .boards
            .iter()
            .filter(|info| filter.matches(info.id))
            .cloned()
            .collect();
        boards.sort_by_key(|info| info.address);
        Ok(boards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on_demand(trigger_after_polls: Option<u32>) -> MockHat {
        MockHat::new(MockHatConfig {
            trigger_after_polls,
            noise_volts: 0.0,
            ..MockHatConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_actual_rate() {
        assert_eq!(actual_scan_rate(4, 1000.0).unwrap(), 1000.0);
        assert_eq!(actual_scan_rate(1, 100_000.0).unwrap(), 100_000.0);
        let rate = actual_scan_rate(3, 7000.0).unwrap();
        assert!((rate - 7000.0).abs() < 1.0);
        assert!(actual_scan_rate(8, 20_000.0).is_err());
        assert!(actual_scan_rate(0, 1000.0).is_err());
        assert!(actual_scan_rate(9, 1000.0).is_err());
    }

    #[test]
    fn test_trigger_fires_after_polls() {
        let mut hat = on_demand(Some(3));
        hat.a_in_scan_start(ChannelMask(0x0F), 100, 1000.0, ScanOptions::EXTTRIGGER)
            .unwrap();

        for _ in 0..3 {
            let status = hat.a_in_scan_status().unwrap();
            assert!(status.running);
            assert!(!status.triggered);
        }
        let status = hat.a_in_scan_status().unwrap();
        assert!(status.triggered);
        assert!(status.running);
        hat.a_in_scan_cleanup().unwrap();
    }

    #[test]
    fn test_untriggered_scan_waits_for_handle() {
        let mut hat = on_demand(None);
        let handle = hat.handle();
        hat.a_in_scan_start(ChannelMask(0x01), 10, 1000.0, ScanOptions::EXTTRIGGER)
            .unwrap();
        for _ in 0..50 {
            assert!(!hat.a_in_scan_status().unwrap().triggered);
        }
        handle.fire_trigger().unwrap();
        assert!(hat.a_in_scan_status().unwrap().triggered);
        hat.a_in_scan_cleanup().unwrap();
    }

    #[test]
    fn test_finite_scan_stops_at_sample_count() {
        let mut hat = on_demand(Some(0));
        hat.a_in_scan_start(ChannelMask(0x03), 700, 1000.0, ScanOptions::default())
            .unwrap();

        let first = hat.a_in_scan_read(ReadRequest::Samples(500), None).unwrap();
        assert_eq!(first.data.len(), 1000);
        assert!(first.running);

        let second = hat.a_in_scan_read(ReadRequest::Samples(500), None).unwrap();
        assert_eq!(second.data.len(), 400);
        assert!(!second.running);
        assert!(!second.timeout);

        assert!(!hat.a_in_scan_status().unwrap().running);
        hat.a_in_scan_cleanup().unwrap();
    }

    #[test]
    fn test_injected_overruns_are_reported() {
        let mut hat = on_demand(Some(0));
        let handle = hat.handle();
        hat.a_in_scan_start(ChannelMask(0x01), 1000, 1000.0, ScanOptions::default())
            .unwrap();
        handle.inject_buffer_overrun().unwrap();
        let result = hat.a_in_scan_read(ReadRequest::Samples(10), None).unwrap();
        assert!(result.buffer_overrun);
        assert!(!result.hardware_overrun);
        assert!(!result.running);

        hat.a_in_scan_cleanup().unwrap();
        hat.a_in_scan_start(ChannelMask(0x01), 1000, 1000.0, ScanOptions::default())
            .unwrap();
        handle.inject_hardware_overrun().unwrap();
        assert!(hat.a_in_scan_status().unwrap().hardware_overrun);
        hat.a_in_scan_cleanup().unwrap();
    }

    #[test]
    fn test_start_while_running_is_busy() {
        let mut hat = on_demand(None);
        hat.a_in_scan_start(ChannelMask(0x01), 10, 1000.0, ScanOptions::EXTTRIGGER)
            .unwrap();
        assert_eq!(
            hat.a_in_scan_start(ChannelMask(0x01), 10, 1000.0, ScanOptions::EXTTRIGGER),
            Err(HatError::Busy)
        );
        hat.a_in_scan_stop().unwrap();
        hat.a_in_scan_cleanup().unwrap();
        assert!(!hat.handle().scan_active().unwrap());
    }

    #[test]
    fn test_read_without_scan_fails() {
        let mut hat = on_demand(None);
        assert_eq!(
            hat.a_in_scan_read(ReadRequest::AllAvailable, Some(Duration::ZERO)),
            Err(HatError::ResourceUnavailable)
        );
    }

    #[test]
    fn test_realtime_read_times_out_before_trigger() {
        let mut hat = MockHat::new(MockHatConfig {
            trigger_after_polls: None,
            realtime: true,
            ..MockHatConfig::default()
        })
        .unwrap();
        hat.a_in_scan_start(ChannelMask(0x01), 10, 1000.0, ScanOptions::EXTTRIGGER)
            .unwrap();
        let result = hat
            .a_in_scan_read(ReadRequest::Samples(5), Some(Duration::from_millis(20)))
            .unwrap();
        assert!(result.data.is_empty());
        assert!(result.timeout);
        assert!(!result.triggered);
        hat.a_in_scan_cleanup().unwrap();
    }

    #[test]
    fn test_noscaledata_returns_codes() {
        let mut hat = on_demand(Some(0));
        hat.a_in_scan_start(ChannelMask(0x01), 10, 1000.0, ScanOptions::NOSCALEDATA)
            .unwrap();
        let result = hat.a_in_scan_read(ReadRequest::Samples(10), None).unwrap();
        assert_eq!(result.data.len(), 10);
        assert!(result.data.iter().all(|&code| (0.0..4096.0).contains(&code) && code.fract() == 0.0));
        hat.a_in_scan_cleanup().unwrap();
    }

    #[test]
    fn test_mock_lister_filters_and_sorts() {
        let lister = MockLister::new(vec![
            HatInfo { address: 3, id: HatId::Mcc118.code(), version: 1, product_name: "MCC 118".into() },
            HatInfo { address: 1, id: HatId::Mcc134.code(), version: 1, product_name: "MCC 134".into() },
            HatInfo { address: 0, id: HatId::Mcc118.code(), version: 1, product_name: "MCC 118".into() },
        ]);
        let found = lister.hat_list(HatId::Mcc118).unwrap();
        assert_eq!(found.iter().map(|info| info.address).collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(lister.hat_list(HatId::Any).unwrap().len(), 3);
    }
}
