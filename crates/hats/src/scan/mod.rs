//! Scan sequencing: configure, wait for the trigger, read and display.

pub mod display;
pub mod reader;
pub mod trigger;

pub use display::ScanDisplay;
pub use reader::{ReadLoop, ScanOutcome, StopReason};
pub use trigger::{wait_for_trigger, TriggerOutcome, TriggerWait};

use log::{info, warn};

use crate::types::{AnalogInputHat, HatError, ScanConfig, ScanOptions};

/// Apply the trigger mode (for triggered scans) and start the scan.
///
/// Returns the per-channel rate the board will actually use.
pub fn start_scan<H: AnalogInputHat + ?Sized>(
    hat: &mut H,
    config: &ScanConfig,
) -> Result<f64, HatError> {
    let channel_mask = config.channel_mask()?;
    let actual_rate = hat.a_in_scan_actual_rate(channel_mask.count() as u8, config.sample_rate)?;

    if config.options.contains(ScanOptions::EXTTRIGGER) {
        hat.trigger_mode(config.trigger_mode)?;
    }
    hat.a_in_scan_start(
        channel_mask,
        config.samples_per_channel,
        config.sample_rate,
        config.options,
    )?;

    info!(
        "Scan started on address {}: channels {:?} at {} Hz",
        hat.address(),
        config.channels,
        actual_rate
    );
    Ok(actual_rate)
}

/// Stop the scan and release its buffer. Both steps run even if the first fails.
pub fn finish_scan<H: AnalogInputHat + ?Sized>(hat: &mut H) -> Result<(), HatError> {
    let stopped = hat.a_in_scan_stop();
    if let Err(e) = &stopped {
        warn!("Failed to stop scan: {}", e);
    }
    hat.a_in_scan_cleanup()?;
    stopped
}

/// One software-timed reading per channel.
pub fn read_single_values<H: AnalogInputHat + ?Sized>(
    hat: &mut H,
    channels: &[u8],
    options: ScanOptions,
) -> Result<Vec<(u8, f64)>, HatError> {
    channels
        .iter()
        .map(|&channel| hat.a_in_read(channel, options).map(|value| (channel, value)))
        .collect()
}
