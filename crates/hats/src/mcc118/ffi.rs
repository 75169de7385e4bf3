//! Raw bindings to the parts of libdaqhats used here.

use libc::{c_char, c_double, c_int};

pub const RESULT_SUCCESS: c_int = 0;
pub const RESULT_TIMEOUT: c_int = -3;

pub const STATUS_HW_OVERRUN: u16 = 0x0001;
pub const STATUS_BUFFER_OVERRUN: u16 = 0x0002;
pub const STATUS_TRIGGERED: u16 = 0x0004;
pub const STATUS_RUNNING: u16 = 0x0008;

/// `samples_per_channel` value asking a scan read for everything buffered.
pub const READ_ALL_AVAILABLE: i32 = -1;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct HatInfo {
    pub address: u8,
    pub id: u16,
    pub version: u16,
    pub product_name: [c_char; 256],
}

#[link(name = "daqhats")]
extern "C" {
    pub fn hat_list(filter_id: u16, list: *mut HatInfo) -> c_int;
    pub fn hat_error_message(result: c_int) -> *const c_char;

    pub fn mcc118_open(address: u8) -> c_int;
    pub fn mcc118_close(address: u8) -> c_int;

    pub fn mcc118_trigger_mode(address: u8, mode: u8) -> c_int;

    pub fn mcc118_a_in_scan_actual_rate(
        channel_count: u8,
        sample_rate_per_channel: c_double,
        actual_sample_rate_per_channel: *mut c_double,
    ) -> c_int;

    pub fn mcc118_a_in_scan_start(
        address: u8,
        channel_mask: u8,
        samples_per_channel: u32,
        sample_rate_per_channel: c_double,
        options: u32,
    ) -> c_int;

    pub fn mcc118_a_in_scan_status(
        address: u8,
        status: *mut u16,
        samples_per_channel: *mut u32,
    ) -> c_int;

    pub fn mcc118_a_in_scan_read(
        address: u8,
        status: *mut u16,
        samples_per_channel: i32,
        timeout: c_double,
        buffer: *mut c_double,
        buffer_size_samples: u32,
        samples_read_per_channel: *mut u32,
    ) -> c_int;

    pub fn mcc118_a_in_scan_channel_count(address: u8) -> c_int;
    pub fn mcc118_a_in_scan_stop(address: u8) -> c_int;
    pub fn mcc118_a_in_scan_cleanup(address: u8) -> c_int;

    pub fn mcc118_a_in_read(address: u8, channel: u8, options: u32, value: *mut c_double) -> c_int;
}
