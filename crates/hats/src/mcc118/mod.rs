//! MCC 118 access through the vendor's libdaqhats.

mod ffi;
pub mod driver;

pub use driver::{DaqhatsLister, Mcc118};
