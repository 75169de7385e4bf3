pub mod types;
pub mod select;
pub mod scan;
pub mod mock_hat;
pub mod interrupt;
#[cfg(feature = "daqhats")]
pub mod mcc118;

// Re-export the main types that users need
pub use types::{
    AnalogInputHat, ChannelMask, HatError, HatId, HatInfo, HatLister, ReadRequest, ReadResult,
    ScanConfig, ScanOptions, ScanStatus, TriggerMode, READ_REQUEST_SIZE, READ_TIMEOUT,
};
pub use select::select_hat_device;
pub use scan::{ReadLoop, ScanDisplay, ScanOutcome, StopReason, TriggerOutcome, TriggerWait};
