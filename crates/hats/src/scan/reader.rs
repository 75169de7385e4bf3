use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use super::display::ScanDisplay;
use crate::types::{AnalogInputHat, HatError, ReadRequest, READ_REQUEST_SIZE, READ_TIMEOUT};

/// Why the read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The requested number of samples per channel was read
    Completed,
    HardwareOverrun,
    BufferOverrun,
    /// The board stopped scanning and had nothing left to read
    ScanStopped,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    pub reason: StopReason,
    /// Samples per channel read before the loop ended
    pub total_samples_read: u64,
    /// Number of read calls made
    pub reads: usize,
}

/// Read loop settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadLoop {
    pub request: ReadRequest,
    pub timeout: Option<Duration>,
    /// Pause after each displayed line, throttling terminal output
    pub display_pause: Duration,
}

impl Default for ReadLoop {
    fn default() -> Self {
        Self {
            request: ReadRequest::Samples(READ_REQUEST_SIZE),
            timeout: Some(READ_TIMEOUT),
            display_pause: Duration::from_millis(100),
        }
    }
}

impl ReadLoop {
    /// Settings for continuous scans: drain whatever is buffered on each read.
    pub fn continuous() -> Self {
        Self {
            request: ReadRequest::AllAvailable,
            timeout: Some(Duration::from_millis(500)),
            display_pause: Duration::from_millis(100),
        }
    }

    pub fn with_display_pause(mut self, pause: Duration) -> Self {
        self.display_pause = pause;
        self
    }

    /// Read blocks until `target` samples per channel have been read, or
    /// forever when `target` is `None`, printing the newest sample of each
    /// channel after every read.
    ///
    /// An overrun ends the loop without looking at the data of that read.
    /// `stop_flag` is checked between reads; when it ends the loop the echoed
    /// `^C` is erased instead of closing the table.
    pub fn run<H, W>(
        &self,
        hat: &mut H,
        target: Option<u32>,
        num_channels: usize,
        display: &mut ScanDisplay<W>,
        stop_flag: &AtomicBool,
    ) -> Result<ScanOutcome, HatError>
    where
        H: AnalogInputHat + ?Sized,
        W: Write,
    {
        if num_channels == 0 {
            return Err(HatError::BadParameter("No channels to read".to_string()));
        }

        let mut total_samples_read: u64 = 0;
        let mut reads = 0;

        let reason = loop {
            if let Some(target) = target {
                if total_samples_read >= target as u64 {
                    break StopReason::Completed;
                }
            }
            if stop_flag.load(Ordering::Relaxed) {
                break StopReason::Interrupted;
            }

            let result = hat.a_in_scan_read(self.request, self.timeout)?;
            reads += 1;

            if result.hardware_overrun {
                display.hardware_overrun()?;
                break StopReason::HardwareOverrun;
            } else if result.buffer_overrun {
                display.buffer_overrun()?;
                break StopReason::BufferOverrun;
            }

            if result.data.len() % num_channels != 0 {
                warn!(
                    "Read returned {} values, not a multiple of {} channels",
                    result.data.len(),
                    num_channels
                );
            }
            let samples_read_per_channel = result.samples_per_channel(num_channels);
            total_samples_read += samples_read_per_channel as u64;
            debug!(
                "read {}: {} samples per channel, {} total",
                reads, samples_read_per_channel, total_samples_read
            );

            display.counts(samples_read_per_channel, total_samples_read)?;

            if samples_read_per_channel > 0 {
                let index = samples_read_per_channel * num_channels - num_channels;
                display.latest(&result.data[index..index + num_channels])?;

                if !self.display_pause.is_zero() {
                    thread::sleep(self.display_pause);
                }
            } else if !result.running && !result.timeout {
                display.flush()?;
                break StopReason::ScanStopped;
            }
        };

        // an interrupt leaves a ^C echoed on the table line
        if reason == StopReason::Interrupted {
            display.clear_interrupt()?;
        } else {
            display.finish()?;
        }
        info!(
            "Read loop ended with {:?} after {} reads, {} samples per channel",
            reason, reads, total_samples_read
        );

        Ok(ScanOutcome {
            reason,
            total_samples_read,
            reads,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::display::{CURSOR_BACK_2, ERASE_TO_END_OF_LINE};
    use crate::mock_hat::ScriptedHat;
    use crate::types::{ChannelMask, ReadResult, ScanOptions, ScanStatus, TriggerMode};
    use std::sync::Arc;

    /// Raises the stop flag during its first read, as Ctrl-C would mid-scan.
    struct InterruptingHat {
        inner: ScriptedHat,
        stop: Arc<AtomicBool>,
    }

    impl AnalogInputHat for InterruptingHat {
        fn address(&self) -> u8 {
            self.inner.address()
        }
        fn trigger_mode(&mut self, mode: TriggerMode) -> Result<(), HatError> {
            self.inner.trigger_mode(mode)
        }
        fn a_in_scan_actual_rate(&self, count: u8, rate: f64) -> Result<f64, HatError> {
            self.inner.a_in_scan_actual_rate(count, rate)
        }
        fn a_in_scan_start(
            &mut self,
            mask: ChannelMask,
            samples: u32,
            rate: f64,
            options: ScanOptions,
        ) -> Result<(), HatError> {
            self.inner.a_in_scan_start(mask, samples, rate, options)
        }
        fn a_in_scan_status(&mut self) -> Result<ScanStatus, HatError> {
            self.inner.a_in_scan_status()
        }
        fn a_in_scan_read(
            &mut self,
            request: ReadRequest,
            timeout: Option<Duration>,
        ) -> Result<ReadResult, HatError> {
            self.stop.store(true, Ordering::Relaxed);
            self.inner.a_in_scan_read(request, timeout)
        }
        fn a_in_scan_stop(&mut self) -> Result<(), HatError> {
            self.inner.a_in_scan_stop()
        }
        fn a_in_scan_cleanup(&mut self) -> Result<(), HatError> {
            self.inner.a_in_scan_cleanup()
        }
        fn a_in_read(&mut self, channel: u8, options: ScanOptions) -> Result<f64, HatError> {
            self.inner.a_in_read(channel, options)
        }
    }

    fn block(groups: usize, num_channels: usize) -> ReadResult {
        ReadResult {
            data: (0..groups * num_channels).map(|i| i as f64).collect(),
            running: true,
            triggered: true,
            ..Default::default()
        }
    }

    fn run(hat: &mut ScriptedHat, target: Option<u32>, num_channels: usize) -> (ScanOutcome, String) {
        let mut display = ScanDisplay::new(Vec::new());
        let stop = AtomicBool::new(false);
        let outcome = ReadLoop::default()
            .with_display_pause(Duration::ZERO)
            .run(hat, target, num_channels, &mut display, &stop)
            .unwrap();
        (outcome, String::from_utf8(display.into_inner()).unwrap())
    }

    #[test]
    fn test_hardware_overrun_stops_immediately() {
        let overrun = ReadResult {
            data: vec![],
            hardware_overrun: true,
            buffer_overrun: true,
            ..Default::default()
        };
        let mut hat = ScriptedHat::new().with_reads([overrun, block(500, 4)]);
        let (outcome, text) = run(&mut hat, Some(1000), 4);

        assert_eq!(outcome.reason, StopReason::HardwareOverrun);
        assert_eq!(outcome.reads, 1);
        assert_eq!(outcome.total_samples_read, 0);
        assert_eq!(hat.remaining_reads(), 1);
        assert!(text.starts_with("\n\nHardware overrun\n\n"));
        assert!(!text.contains("Buffer overrun"));
    }

    #[test]
    fn test_buffer_overrun_stops_immediately() {
        // data too short for a group; indexing it would panic
        let overrun = ReadResult {
            data: vec![1.0],
            buffer_overrun: true,
            ..Default::default()
        };
        let mut hat = ScriptedHat::new().with_reads([block(10, 4), overrun, block(10, 4)]);
        let (outcome, text) = run(&mut hat, Some(1000), 4);

        assert_eq!(outcome.reason, StopReason::BufferOverrun);
        assert_eq!(outcome.reads, 2);
        assert_eq!(outcome.total_samples_read, 10);
        assert!(text.contains("\n\nBuffer overrun\n\n"));
    }

    #[test]
    fn test_displays_last_group() {
        let mut hat = ScriptedHat::new().with_reads([block(500, 4)]);
        let (outcome, text) = run(&mut hat, Some(500), 4);

        assert_eq!(outcome.reason, StopReason::Completed);
        assert_eq!(outcome.total_samples_read, 500);
        // data[1996..2000] holds 1996.0..=1999.0
        let expected = format!(
            "\r{:12}  {:12} {:10.5} V {:10.5} V {:10.5} V {:10.5} V \n\n",
            500, 500, 1996.0, 1997.0, 1998.0, 1999.0
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_two_reads_reach_target() {
        let mut hat = ScriptedHat::new().with_reads([block(500, 4), block(500, 4), block(500, 4)]);
        let (outcome, text) = run(&mut hat, Some(1000), 4);

        assert_eq!(outcome.reason, StopReason::Completed);
        assert_eq!(outcome.reads, 2);
        assert_eq!(outcome.total_samples_read, 1000);
        assert_eq!(hat.remaining_reads(), 1);
        assert_eq!(text.matches('\r').count(), 2);
        assert!(hat
            .read_calls
            .iter()
            .all(|call| *call == (ReadRequest::Samples(500), Some(Duration::from_secs(5)))));
    }

    #[test]
    fn test_short_reads_overshoot_by_at_most_one_block() {
        let mut hat = ScriptedHat::new().with_reads([block(300, 2), block(300, 2), block(300, 2)]);
        let (outcome, _) = run(&mut hat, Some(500), 2);

        assert_eq!(outcome.reads, 2);
        assert_eq!(outcome.total_samples_read, 600);
    }

    #[test]
    fn test_empty_read_prints_counts_only() {
        let empty = ReadResult { running: true, timeout: true, ..Default::default() };
        let mut hat = ScriptedHat::new().with_reads([empty, block(4, 1)]);
        let (outcome, text) = run(&mut hat, Some(4), 1);

        assert_eq!(outcome.reads, 2);
        assert!(text.starts_with(&format!("\r{:12}  {:12} \r", 0, 0)));
    }

    #[test]
    fn test_stopped_scan_with_no_data_ends_loop() {
        let stopped = ReadResult { running: false, ..Default::default() };
        let mut hat = ScriptedHat::new().with_reads([block(5, 2), stopped]);
        let (outcome, _) = run(&mut hat, None, 2);

        assert_eq!(outcome.reason, StopReason::ScanStopped);
        assert_eq!(outcome.total_samples_read, 5);
    }

    #[test]
    fn test_stop_flag_checked_before_read() {
        let mut hat = ScriptedHat::new().with_reads([block(5, 2)]);
        let mut display = ScanDisplay::new(Vec::new());
        let stop = AtomicBool::new(true);
        let outcome = ReadLoop::default()
            .run(&mut hat, Some(10), 2, &mut display, &stop)
            .unwrap();

        assert_eq!(outcome.reason, StopReason::Interrupted);
        assert_eq!(outcome.reads, 0);
    }

    #[test]
    fn test_interrupt_erases_echo_after_last_line() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut hat = InterruptingHat {
            inner: ScriptedHat::new().with_reads([block(5, 2), block(5, 2)]),
            stop: stop.clone(),
        };
        let mut display = ScanDisplay::new(Vec::new());
        let outcome = ReadLoop::default()
            .with_display_pause(Duration::ZERO)
            .run(&mut hat, None, 2, &mut display, &stop)
            .unwrap();
        let text = String::from_utf8(display.into_inner()).unwrap();

        assert_eq!(outcome.reason, StopReason::Interrupted);
        assert_eq!(outcome.reads, 1);
        let erase = format!("{}{}\n\n", CURSOR_BACK_2, ERASE_TO_END_OF_LINE);
        assert!(text.ends_with(&erase));
        assert_eq!(text.matches(&erase).count(), 1);
        // the table line is complete before the erase and no extra blank lines follow it
        assert!(text.starts_with(&format!("\r{:12}  {:12} ", 5, 5)));
        assert!(!text.ends_with(&format!("\n\n{}", erase)));
    }

    #[test]
    fn test_read_errors_propagate() {
        let mut hat = ScriptedHat::new().with_read_error(HatError::Timeout);
        let mut display = ScanDisplay::new(Vec::new());
        let stop = AtomicBool::new(false);
        let result = ReadLoop::default().run(&mut hat, Some(10), 2, &mut display, &stop);
        assert_eq!(result, Err(HatError::Timeout));
    }
}
