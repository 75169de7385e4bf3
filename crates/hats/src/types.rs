//! Common types and traits for MCC DAQ HAT drivers

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest analog input channel on an MCC 118.
pub const MAX_CHANNEL: u8 = 7;

/// Number of per-channel samples requested on each read of a finite scan.
pub const READ_REQUEST_SIZE: u32 = 500;

/// Timeout applied to each read of a finite scan.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Board identifiers reported in the HAT EEPROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HatId {
    /// Matches every board
    Any,
    Mcc118,
    Mcc118Bootloader,
    Mcc128,
    Mcc134,
    Mcc152,
    Mcc172,
}

impl HatId {
    pub fn code(self) -> u16 {
        match self {
            HatId::Any => 0,
            HatId::Mcc118 => 0x0142,
            HatId::Mcc118Bootloader => 0x8142,
            HatId::Mcc128 => 0x0146,
            HatId::Mcc134 => 0x0143,
            HatId::Mcc152 => 0x0144,
            HatId::Mcc172 => 0x0145,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(HatId::Any),
            0x0142 => Some(HatId::Mcc118),
            0x8142 => Some(HatId::Mcc118Bootloader),
            0x0146 => Some(HatId::Mcc128),
            0x0143 => Some(HatId::Mcc134),
            0x0144 => Some(HatId::Mcc152),
            0x0145 => Some(HatId::Mcc172),
            _ => None,
        }
    }

    /// Whether a board with `id` passes this filter.
    pub fn matches(self, id: u16) -> bool {
        self == HatId::Any || self.code() == id
    }
}

/// One entry of the HAT device list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HatInfo {
    /// Board address (0-7), set with the address jumpers
    pub address: u8,
    /// Product ID code
    pub id: u16,
    /// Hardware version
    pub version: u16,
    pub product_name: String,
}

impl fmt::Display for HatInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address {}: {}", self.address, self.product_name)
    }
}

/// Trigger condition applied to the external trigger input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerMode {
    #[default]
    RisingEdge,
    FallingEdge,
    ActiveHigh,
    ActiveLow,
}

impl TriggerMode {
    pub fn code(self) -> u8 {
        match self {
            TriggerMode::RisingEdge => 0,
            TriggerMode::FallingEdge => 1,
            TriggerMode::ActiveHigh => 2,
            TriggerMode::ActiveLow => 3,
        }
    }

    /// Name in the vendor's spelling, used for the configuration banner.
    pub fn name(self) -> &'static str {
        match self {
            TriggerMode::RisingEdge => "RISING_EDGE",
            TriggerMode::FallingEdge => "FALLING_EDGE",
            TriggerMode::ActiveHigh => "ACTIVE_HIGH",
            TriggerMode::ActiveLow => "ACTIVE_LOW",
        }
    }
}

bitflags! {
    /// Scan and read option flags, bit-compatible with `OPTS_*` in libdaqhats.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ScanOptions: u32 {
        const NOSCALEDATA = 0x01;
        const NOCALIBRATEDATA = 0x02;
        const EXTCLOCK = 0x04;
        const EXTTRIGGER = 0x08;
        const CONTINUOUS = 0x10;
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions::empty()
    }
}

impl fmt::Display for ScanOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("DEFAULT");
        }
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        f.write_str(&names.join(", "))
    }
}

/// Bitmask of active analog input channels, bit n = channel n.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChannelMask(pub u8);

impl ChannelMask {
    pub fn from_channels(channels: &[u8]) -> Result<Self, HatError> {
        let mut mask = 0u8;
        for &channel in channels {
            if channel > MAX_CHANNEL {
                return Err(HatError::BadParameter(format!(
                    "Invalid channel index: {}. MCC 118 supports channels 0-{}",
                    channel, MAX_CHANNEL
                )));
            }
            mask |= 1 << channel;
        }
        Ok(ChannelMask(mask))
    }

    /// Active channels in ascending order, which is also the interleave order of scan data.
    pub fn channels(self) -> Vec<u8> {
        (0..=MAX_CHANNEL).filter(|&ch| self.0 & (1 << ch) != 0).collect()
    }

    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Configuration for an analog input scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Channels to scan (0-7)
    pub channels: Vec<u8>,
    /// Samples to acquire per channel; for continuous scans this sizes the host buffer
    pub samples_per_channel: u32,
    /// Requested sample rate per channel in Hz
    pub sample_rate: f64,
    #[serde(default)]
    pub options: ScanOptions,
    #[serde(default)]
    pub trigger_mode: TriggerMode,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            channels: vec![0, 1, 2, 3],
            samples_per_channel: 10_000,
            sample_rate: 1000.0,
            options: ScanOptions::EXTTRIGGER,
            trigger_mode: TriggerMode::RisingEdge,
        }
    }
}

impl ScanConfig {
    /// Check the configuration and build the channel mask for it.
    pub fn channel_mask(&self) -> Result<ChannelMask, HatError> {
        if self.channels.is_empty() {
            return Err(HatError::BadParameter(
                "At least one channel must be configured".to_string(),
            ));
        }

        let mut unique_channels = HashSet::new();
        for &channel in &self.channels {
            if !unique_channels.insert(channel) {
                return Err(HatError::BadParameter(format!(
                    "Duplicate channel detected: {}",
                    channel
                )));
            }
        }

        if !(self.sample_rate > 0.0) {
            return Err(HatError::BadParameter(format!(
                "Invalid sample rate: {}",
                self.sample_rate
            )));
        }

        if self.samples_per_channel == 0 && !self.options.contains(ScanOptions::CONTINUOUS) {
            return Err(HatError::BadParameter(
                "A finite scan needs at least one sample per channel".to_string(),
            ));
        }

        ChannelMask::from_channels(&self.channels)
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn is_continuous(&self) -> bool {
        self.options.contains(ScanOptions::CONTINUOUS)
    }
}

/// Snapshot of the scan state, re-fetched on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanStatus {
    pub running: bool,
    pub triggered: bool,
    pub hardware_overrun: bool,
    pub buffer_overrun: bool,
    /// Samples per channel waiting in the scan buffer
    pub samples_available: u32,
}

/// How many samples a scan read should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadRequest {
    /// Return whatever is in the buffer without waiting
    AllAvailable,
    /// Wait for this many samples per channel, or the timeout
    Samples(u32),
}

/// Result of one scan read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadResult {
    /// Samples interleaved by channel, lowest channel first
    pub data: Vec<f64>,
    pub hardware_overrun: bool,
    pub buffer_overrun: bool,
    pub running: bool,
    pub triggered: bool,
    /// The timeout expired before the requested samples arrived
    pub timeout: bool,
}

impl ReadResult {
    /// Number of complete channel groups in `data`.
    pub fn samples_per_channel(&self, num_channels: usize) -> usize {
        if num_channels == 0 {
            return 0;
        }
        self.data.len() / num_channels
    }
}

/// Errors that can occur while talking to a HAT
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HatError {
    /// No matching boards in the device list
    #[error("No HAT devices found")]
    NoDevices,
    /// The selected address has no matching board
    #[error("Invalid HAT address: {0}")]
    InvalidAddress(u8),
    /// Rejected by the driver or by local validation
    #[error("Invalid parameter: {0}")]
    BadParameter(String),
    #[error("The device is busy")]
    Busy,
    #[error("The operation timed out")]
    Timeout,
    #[error("Timed out waiting for the board lock")]
    LockTimeout,
    #[error("Invalid device, or the device is not open")]
    InvalidDevice,
    #[error("A required resource is not available")]
    ResourceUnavailable,
    #[error("Could not communicate with the device")]
    CommsFailure,
    #[error("Undefined error")]
    Undefined,
    /// Operation not available in this build or on this board
    #[error("Unsupported: {0}")]
    Unsupported(String),
    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),
    /// Generic error
    #[error("Error: {0}")]
    Other(String),
}

impl HatError {
    /// Map a libdaqhats result code; `None` for `RESULT_SUCCESS`.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => None,
            -1 => Some(HatError::BadParameter("rejected by the driver".to_string())),
            -2 => Some(HatError::Busy),
            -3 => Some(HatError::Timeout),
            -4 => Some(HatError::LockTimeout),
            -5 => Some(HatError::InvalidDevice),
            -6 => Some(HatError::ResourceUnavailable),
            -7 => Some(HatError::CommsFailure),
            -10 => Some(HatError::Undefined),
            other => Some(HatError::Other(format!("unknown result code {}", other))),
        }
    }
}

impl From<std::io::Error> for HatError {
    fn from(err: std::io::Error) -> Self {
        HatError::Io(err.to_string())
    }
}

/// Enumerates attached boards.
pub trait HatLister {
    /// List boards whose ID passes `filter`, ordered by address.
    fn hat_list(&self, filter: HatId) -> Result<Vec<HatInfo>, HatError>;
}

/// Operations an analog input HAT offers for scanning.
///
/// The calls mirror the vendor SDK one to one. Every call is synchronous and
/// a scan read blocks for at most its timeout.
pub trait AnalogInputHat: Send + 'static {
    /// Address the board was opened at.
    fn address(&self) -> u8;

    /// Set the trigger condition used by scans started with `EXTTRIGGER`.
    fn trigger_mode(&mut self, mode: TriggerMode) -> Result<(), HatError>;

    /// The rate the board will actually use for `channel_count` channels at the requested rate.
    fn a_in_scan_actual_rate(
        &self,
        channel_count: u8,
        sample_rate_per_channel: f64,
    ) -> Result<f64, HatError>;

    /// Start a hardware-paced scan. Returns once the scan is armed.
    fn a_in_scan_start(
        &mut self,
        channel_mask: ChannelMask,
        samples_per_channel: u32,
        sample_rate_per_channel: f64,
        options: ScanOptions,
    ) -> Result<(), HatError>;

    fn a_in_scan_status(&mut self) -> Result<ScanStatus, HatError>;

    /// Read scan data.
    ///
    /// # Arguments
    /// * `request` - samples per channel to wait for, or everything available
    /// * `timeout` - `None` waits indefinitely, `Some(Duration::ZERO)` returns immediately
    fn a_in_scan_read(
        &mut self,
        request: ReadRequest,
        timeout: Option<Duration>,
    ) -> Result<ReadResult, HatError>;

    fn a_in_scan_stop(&mut self) -> Result<(), HatError>;

    /// Free the scan buffer. Must follow a stop before a new scan can start.
    fn a_in_scan_cleanup(&mut self) -> Result<(), HatError>;

    /// Software-timed read of one channel.
    fn a_in_read(&mut self, channel: u8, options: ScanOptions) -> Result<f64, HatError>;
}
