use std::f64::consts::PI;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// MCC 118 input range is ±10 V.
pub const FULL_SCALE_VOLTS: f64 = 10.0;

/// MCC 118 ADC resolution.
const ADC_CODES: f64 = 4096.0;

/// Convert a voltage to the 12-bit code the ADC would report, clamped to the input range.
pub fn voltage_to_code(volts: f64) -> f64 {
    let clamped = volts.clamp(-FULL_SCALE_VOLTS, FULL_SCALE_VOLTS);
    let code = ((clamped + FULL_SCALE_VOLTS) / (2.0 * FULL_SCALE_VOLTS) * ADC_CODES).round();
    code.min(ADC_CODES - 1.0)
}

/// Bench signal source for the simulated HAT.
///
/// Channel n carries a sine of (1 + n) Hz whose amplitude is 1 V + 0.5 V per
/// channel, plus uniform noise of `noise_volts` peak.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    sample_rate: f64,
    noise_volts: f64,
    phase: [f64; 8],
    rng: StdRng,
}

impl SignalGenerator {
    pub fn new(sample_rate: f64, noise_volts: f64, seed: u64) -> Self {
        debug!("Initializing signal generator with {} Hz sample rate", sample_rate);
        Self {
            sample_rate,
            noise_volts,
            phase: [0.0; 8],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn frequency(channel: u8) -> f64 {
        1.0 + channel as f64
    }

    fn amplitude(channel: u8) -> f64 {
        1.0 + 0.5 * channel as f64
    }

    /// Produce the next sample of `channel` and advance its phase by one sample period.
    pub fn next_sample(&mut self, channel: u8) -> f64 {
        let idx = channel as usize % self.phase.len();
        let value = self.phase[idx].sin() * Self::amplitude(channel);

        self.phase[idx] += 2.0 * PI * Self::frequency(channel) / self.sample_rate;
        if self.phase[idx] > 2.0 * PI {
            self.phase[idx] -= 2.0 * PI;
        }

        let noise = if self.noise_volts > 0.0 {
            (self.rng.gen::<f64>() - 0.5) * 2.0 * self.noise_volts
        } else {
            0.0
        };
        (value + noise).clamp(-FULL_SCALE_VOLTS, FULL_SCALE_VOLTS)
    }

    /// Append `groups` interleaved sample groups for `channels` to `out`.
    pub fn fill(&mut self, channels: &[u8], groups: usize, out: &mut Vec<f64>) {
        out.reserve(groups * channels.len());
        for _ in 0..groups {
            for &channel in channels {
                let sample = self.next_sample(channel);
                out.push(sample);
            }
        }
    }

    /// Instantaneous value for a software-timed read, independent of scan phase.
    pub fn instantaneous(&mut self, channel: u8) -> f64 {
        let noise = (self.rng.gen::<f64>() - 0.5) * 2.0 * self.noise_volts;
        (Self::amplitude(channel) * 0.5 + noise).clamp(-FULL_SCALE_VOLTS, FULL_SCALE_VOLTS)
    }
}
