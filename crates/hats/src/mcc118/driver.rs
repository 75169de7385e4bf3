//! Main driver implementation for the MCC 118.

use std::ffi::CStr;
use std::ptr;
use std::time::Duration;

use libc::{c_double, c_int};
use log::{debug, info, trace, warn};

use super::ffi;
use crate::types::{
    AnalogInputHat, ChannelMask, HatError, HatId, HatInfo, HatLister, ReadRequest, ReadResult,
    ScanOptions, ScanStatus, TriggerMode,
};

fn error_message(code: c_int) -> String {
    // SAFETY: hat_error_message returns a pointer to a static string.
    unsafe {
        let msg = ffi::hat_error_message(code);
        if msg.is_null() {
            format!("result code {}", code)
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

fn check(code: c_int, call: &str) -> Result<(), HatError> {
    match HatError::from_code(code) {
        None => Ok(()),
        Some(HatError::BadParameter(_)) => Err(HatError::BadParameter(format!(
            "{}: {}",
            call,
            error_message(code)
        ))),
        Some(err) => {
            debug!("{} failed: {}", call, error_message(code));
            Err(err)
        }
    }
}

fn decode_status(status: u16) -> (bool, bool, bool, bool) {
    (
        status & ffi::STATUS_RUNNING != 0,
        status & ffi::STATUS_TRIGGERED != 0,
        status & ffi::STATUS_HW_OVERRUN != 0,
        status & ffi::STATUS_BUFFER_OVERRUN != 0,
    )
}

/// Timeout in the library's convention: seconds, negative waits forever.
fn timeout_seconds(timeout: Option<Duration>) -> c_double {
    timeout.map_or(-1.0, |t| t.as_secs_f64())
}

/// Lists boards through `hat_list`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DaqhatsLister;

impl HatLister for DaqhatsLister {
    fn hat_list(&self, filter: HatId) -> Result<Vec<HatInfo>, HatError> {
        // SAFETY: a null list asks for the count only; the second call gets a
        // buffer sized from that count.
        let raw = unsafe {
            let count = ffi::hat_list(filter.code(), ptr::null_mut());
            if count < 0 {
                return Err(HatError::from_code(count).unwrap_or(HatError::Undefined));
            }
            let mut raw = vec![
                ffi::HatInfo {
                    address: 0,
                    id: 0,
                    version: 0,
                    product_name: [0; 256],
                };
                count as usize
            ];
            let filled = ffi::hat_list(filter.code(), raw.as_mut_ptr());
            raw.truncate(filled.max(0) as usize);
            raw
        };

        Ok(raw
            .iter()
            .map(|info| HatInfo {
                address: info.address,
                id: info.id,
                version: info.version,
                // SAFETY: product_name is NUL terminated by the library.
                product_name: unsafe { CStr::from_ptr(info.product_name.as_ptr()) }
                    .to_string_lossy()
                    .into_owned(),
            })
            .collect())
    }
}

/// An opened MCC 118. The board is closed on drop.
#[derive(Debug)]
pub struct Mcc118 {
    address: u8,
}

impl Mcc118 {
    pub fn open(address: u8) -> Result<Self, HatError> {
        // SAFETY: plain value arguments.
        check(unsafe { ffi::mcc118_open(address) }, "mcc118_open")?;
        info!("Opened MCC 118 at address {}", address);
        Ok(Self { address })
    }

    fn scan_channel_count(&self) -> Result<usize, HatError> {
        // SAFETY: plain value arguments.
        let count = unsafe { ffi::mcc118_a_in_scan_channel_count(self.address) };
        if count <= 0 {
            return Err(HatError::ResourceUnavailable);
        }
        Ok(count as usize)
    }
}

impl AnalogInputHat for Mcc118 {
    fn address(&self) -> u8 {
        self.address
    }

    fn trigger_mode(&mut self, mode: TriggerMode) -> Result<(), HatError> {
        debug!("trigger_mode({})", mode.name());
        // SAFETY: plain value arguments.
        check(
            unsafe { ffi::mcc118_trigger_mode(self.address, mode.code()) },
            "mcc118_trigger_mode",
        )
    }

    fn a_in_scan_actual_rate(
        &self,
        channel_count: u8,
        sample_rate_per_channel: f64,
    ) -> Result<f64, HatError> {
        let mut actual: c_double = 0.0;
        // SAFETY: `actual` outlives the call.
        check(
            unsafe {
                ffi::mcc118_a_in_scan_actual_rate(channel_count, sample_rate_per_channel, &mut actual)
            },
            "mcc118_a_in_scan_actual_rate",
        )?;
        Ok(actual)
    }

    fn a_in_scan_start(
        &mut self,
        channel_mask: ChannelMask,
        samples_per_channel: u32,
        sample_rate_per_channel: f64,
        options: ScanOptions,
    ) -> Result<(), HatError> {
        debug!(
            "a_in_scan_start({:#04x}, {}, {}, {})",
            channel_mask.bits(),
            samples_per_channel,
            sample_rate_per_channel,
            options
        );
        // SAFETY: plain value arguments.
        check(
            unsafe {
                ffi::mcc118_a_in_scan_start(
                    self.address,
                    channel_mask.bits(),
                    samples_per_channel,
                    sample_rate_per_channel,
                    options.bits(),
                )
            },
            "mcc118_a_in_scan_start",
        )
    }

    fn a_in_scan_status(&mut self) -> Result<ScanStatus, HatError> {
        let mut status: u16 = 0;
        let mut available: u32 = 0;
        // SAFETY: both out-pointers outlive the call.
        check(
            unsafe { ffi::mcc118_a_in_scan_status(self.address, &mut status, &mut available) },
            "mcc118_a_in_scan_status",
        )?;
        let (running, triggered, hardware_overrun, buffer_overrun) = decode_status(status);
        let status = ScanStatus {
            running,
            triggered,
            hardware_overrun,
            buffer_overrun,
            samples_available: available,
        };
        trace!("a_in_scan_status() = {:?}", status);
        Ok(status)
    }

    fn a_in_scan_read(
        &mut self,
        request: ReadRequest,
        timeout: Option<Duration>,
    ) -> Result<ReadResult, HatError> {
        let num_channels = self.scan_channel_count()?;
        let (samples_per_channel, groups) = match request {
            ReadRequest::Samples(n) => (n.min(i32::MAX as u32) as i32, n as usize),
            ReadRequest::AllAvailable => (
                ffi::READ_ALL_AVAILABLE,
                self.a_in_scan_status()?.samples_available as usize,
            ),
        };

        let mut buffer = vec![0.0f64; groups * num_channels];
        let mut status: u16 = 0;
        let mut samples_read: u32 = 0;
        // SAFETY: `buffer` holds `buffer.len()` doubles and the out-pointers outlive the call.
        let code = unsafe {
            ffi::mcc118_a_in_scan_read(
                self.address,
                &mut status,
                samples_per_channel,
                timeout_seconds(timeout),
                buffer.as_mut_ptr(),
                buffer.len() as u32,
                &mut samples_read,
            )
        };

        let timed_out = code == ffi::RESULT_TIMEOUT;
        if !timed_out {
            check(code, "mcc118_a_in_scan_read")?;
        }

        buffer.truncate(samples_read as usize * num_channels);
        let (running, triggered, hardware_overrun, buffer_overrun) = decode_status(status);
        trace!("a_in_scan_read({:?}) -> {} samples per channel", request, samples_read);

        Ok(ReadResult {
            data: buffer,
            hardware_overrun,
            buffer_overrun,
            running,
            triggered,
            timeout: timed_out,
        })
    }

    fn a_in_scan_stop(&mut self) -> Result<(), HatError> {
        // SAFETY: plain value arguments.
        check(unsafe { ffi::mcc118_a_in_scan_stop(self.address) }, "mcc118_a_in_scan_stop")
    }

    fn a_in_scan_cleanup(&mut self) -> Result<(), HatError> {
        // SAFETY: plain value arguments.
        check(
            unsafe { ffi::mcc118_a_in_scan_cleanup(self.address) },
            "mcc118_a_in_scan_cleanup",
        )
    }

    fn a_in_read(&mut self, channel: u8, options: ScanOptions) -> Result<f64, HatError> {
        let mut value: c_double = 0.0;
        // SAFETY: `value` outlives the call.
        check(
            unsafe { ffi::mcc118_a_in_read(self.address, channel, options.bits(), &mut value) },
            "mcc118_a_in_read",
        )?;
        Ok(value)
    }
}

impl Drop for Mcc118 {
    fn drop(&mut self) {
        // SAFETY: plain value arguments; cleanup is a no-op without a scan.
        unsafe {
            if ffi::mcc118_a_in_scan_cleanup(self.address) != ffi::RESULT_SUCCESS {
                warn!("Scan cleanup failed while closing address {}", self.address);
            }
            let code = ffi::mcc118_close(self.address);
            if code != ffi::RESULT_SUCCESS {
                warn!("mcc118_close({}) failed: {}", self.address, error_message(code));
            }
        }
        debug!("Closed MCC 118 at address {}", self.address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_status_bits() {
        assert_eq!(decode_status(0x0000), (false, false, false, false));
        assert_eq!(decode_status(0x000C), (true, true, false, false));
        assert_eq!(decode_status(0x0003), (false, false, true, true));
    }

    #[test]
    fn test_timeout_convention() {
        assert_eq!(timeout_seconds(None), -1.0);
        assert_eq!(timeout_seconds(Some(Duration::ZERO)), 0.0);
        assert_eq!(timeout_seconds(Some(Duration::from_millis(5000))), 5.0);
    }
}
