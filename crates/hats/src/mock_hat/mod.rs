//! Simulated boards for running the tools without a HAT attached.

pub mod driver;
pub mod scripted;
pub mod signal_generator;

pub use driver::{actual_scan_rate, MockHat, MockHatConfig, MockHatHandle, MockLister};
pub use scripted::ScriptedHat;
