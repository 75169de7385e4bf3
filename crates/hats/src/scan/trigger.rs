use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::types::{AnalogInputHat, HatError};

/// Polling policy for [`wait_for_trigger`].
///
/// The default polls back to back with no timeout, so a trigger that never
/// arrives blocks until the scan stops or the stop flag is raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerWait {
    /// Sleep between status polls
    pub poll_interval: Option<Duration>,
    /// Give up after this long
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Triggered,
    /// The scan stopped before the trigger arrived
    ScanStopped,
    TimedOut,
    Interrupted,
}

/// Poll scan status until the trigger fires or the scan stops running.
///
/// `triggered` wins over `running`: the wait returns as soon as the trigger
/// is seen even though the scan keeps running. At least one poll is made.
pub fn wait_for_trigger<H: AnalogInputHat + ?Sized>(
    hat: &mut H,
    policy: &TriggerWait,
    stop_flag: &AtomicBool,
) -> Result<TriggerOutcome, HatError> {
    let started = Instant::now();
    let mut polls: u64 = 0;

    let outcome = loop {
        let status = hat.a_in_scan_status()?;
        polls += 1;
        trace!("trigger poll {}: {:?}", polls, status);

        if status.triggered {
            break TriggerOutcome::Triggered;
        }
        if !status.running {
            break TriggerOutcome::ScanStopped;
        }
        if stop_flag.load(Ordering::Relaxed) {
            break TriggerOutcome::Interrupted;
        }
        if let Some(timeout) = policy.timeout {
            if started.elapsed() >= timeout {
                break TriggerOutcome::TimedOut;
            }
        }
        if let Some(interval) = policy.poll_interval {
            thread::sleep(interval);
        }
    };

    debug!(
        "Trigger wait finished with {:?} after {} polls in {:?}",
        outcome,
        polls,
        started.elapsed()
    );
    Ok(outcome)
}
