use std::collections::VecDeque;
use std::time::Duration;

use crate::types::{
    AnalogInputHat, ChannelMask, HatError, ReadRequest, ReadResult, ScanOptions, ScanStatus,
    TriggerMode,
};

/// A board that replays canned status snapshots and read results, and records
/// every call made to it.
///
/// The last queued status repeats forever. Reading past the end of the read
/// script is an error, so tests notice an extra read.
#[derive(Debug, Default)]
pub struct ScriptedHat {
    pub address: u8,
    statuses: VecDeque<ScanStatus>,
    reads: VecDeque<Result<ReadResult, HatError>>,
    /// Number of `a_in_scan_status` calls
    pub status_polls: usize,
    /// Arguments of every `a_in_scan_read` call
    pub read_calls: Vec<(ReadRequest, Option<Duration>)>,
    pub started: Option<(ChannelMask, u32, f64, ScanOptions)>,
    pub trigger_mode_set: Option<TriggerMode>,
    pub stopped: bool,
    pub cleaned_up: bool,
}

impl ScriptedHat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = ScanStatus>) -> Self {
        self.statuses.extend(statuses);
        self
    }

    pub fn with_reads(mut self, reads: impl IntoIterator<Item = ReadResult>) -> Self {
        self.reads.extend(reads.into_iter().map(Ok));
        self
    }

    pub fn with_read_error(mut self, error: HatError) -> Self {
        self.reads.push_back(Err(error));
        self
    }

    /// Reads left in the script.
    pub fn remaining_reads(&self) -> usize {
        self.reads.len()
    }
}

impl AnalogInputHat for ScriptedHat {
    fn address(&self) -> u8 {
        self.address
    }

    fn trigger_mode(&mut self, mode: TriggerMode) -> Result<(), HatError> {
        self.trigger_mode_set = Some(mode);
        Ok(())
    }

    fn a_in_scan_actual_rate(
        &self,
        _channel_count: u8,
        sample_rate_per_channel: f64,
    ) -> Result<f64, HatError> {
        Ok(sample_rate_per_channel)
    }

    fn a_in_scan_start(
        &mut self,
        channel_mask: ChannelMask,
        samples_per_channel: u32,
        sample_rate_per_channel: f64,
        options: ScanOptions,
    ) -> Result<(), HatError> {
        self.started = Some((channel_mask, samples_per_channel, sample_rate_per_channel, options));
        Ok(())
    }

    fn a_in_scan_status(&mut self) -> Result<ScanStatus, HatError> {
        self.status_polls += 1;
        let status = if self.statuses.len() > 1 {
            self.statuses.pop_front()
        } else {
            self.statuses.front().copied()
        };
        Ok(status.unwrap_or_default())
    }

    fn a_in_scan_read(
        &mut self,
        request: ReadRequest,
        timeout: Option<Duration>,
    ) -> Result<ReadResult, HatError> {
        self.read_calls.push((request, timeout));
        self.reads
            .pop_front()
            .unwrap_or_else(|| Err(HatError::Other("read script exhausted".to_string())))
    }

    fn a_in_scan_stop(&mut self) -> Result<(), HatError> {
        self.stopped = true;
        Ok(())
    }

    fn a_in_scan_cleanup(&mut self) -> Result<(), HatError> {
        self.cleaned_up = true;
        Ok(())
    }

    fn a_in_read(&mut self, channel: u8, _options: ScanOptions) -> Result<f64, HatError> {
        Ok(channel as f64)
    }
}
