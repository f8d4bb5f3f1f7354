//! Energy-based voice activity detection.
//!
//! Decides whether a speech utterance has just ended by comparing the mean
//! absolute amplitude of the trailing window against the whole buffer. The
//! detector is a pure function over its input; config is held by value.

use std::f32::consts::PI;

use tracing::debug;

/// Configuration for the energy-ratio detector.
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Trailing window compared against the whole buffer, in milliseconds.
    pub window_ms: u32,
    /// Speech is considered ended when
    /// `energy_last <= energy_threshold * energy_all`.
    pub energy_threshold: f32,
    /// One-pole high-pass cutoff in Hz (0 = filter disabled).
    pub hpf_cutoff_hz: f32,
    /// Sample rate of the analysed audio.
    pub sample_rate: u32,
    /// Log energy levels on every detection.
    pub verbose: bool,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            window_ms: 1000,
            energy_threshold: 0.6,
            hpf_cutoff_hz: 100.0,
            sample_rate: super::TARGET_RATE,
            verbose: false,
        }
    }
}

/// Detection outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VadResult {
    /// True when the trailing window has gone quiet relative to the buffer.
    pub speech_ended: bool,
    /// Mean absolute amplitude over the whole input.
    pub energy_all: f32,
    /// Mean absolute amplitude over the trailing window.
    pub energy_last: f32,
}

/// Mean-amplitude ratio detector.
#[derive(Debug, Clone, Default)]
pub struct EnergyVad {
    config: VadConfig,
}

impl EnergyVad {
    pub fn new(config: VadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: VadConfig) {
        self.config = config;
    }

    /// Analyse `samples` and report whether speech has ended.
    ///
    /// When the input is shorter than (or equal to) the trailing window there
    /// is not enough context to decide; the result reports
    /// `speech_ended = false`.
    pub fn detect(&self, samples: &[f32]) -> VadResult {
        let mut result = VadResult::default();

        let n_total = samples.len();
        let n_last =
            (self.config.sample_rate as u64 * self.config.window_ms as u64 / 1000) as usize;
        if n_last >= n_total {
            return result;
        }

        // Filter a copy; the caller's buffer is reused for the command window.
        let mut filtered;
        let data: &[f32] = if self.config.hpf_cutoff_hz > 0.0 {
            filtered = samples.to_vec();
            apply_high_pass(&mut filtered, self.config.hpf_cutoff_hz, self.config.sample_rate);
            &filtered
        } else {
            samples
        };

        let mut energy_all = 0.0f32;
        let mut energy_last = 0.0f32;
        for (i, sample) in data.iter().enumerate() {
            let amplitude = sample.abs();
            energy_all += amplitude;
            if i >= n_total - n_last {
                energy_last += amplitude;
            }
        }
        energy_all /= n_total as f32;
        energy_last /= n_last as f32;

        result.energy_all = energy_all;
        result.energy_last = energy_last;
        result.speech_ended = energy_last <= self.config.energy_threshold * energy_all;

        if self.config.verbose {
            debug!(
                energy_all,
                energy_last,
                threshold = self.config.energy_threshold,
                speech_ended = result.speech_ended,
                "vad"
            );
        }

        result
    }
}

/// In-place one-pole high-pass with `alpha = dt / (rc + dt)`,
/// `rc = 1 / (2π · cutoff)`.
fn apply_high_pass(data: &mut [f32], cutoff_hz: f32, sample_rate: u32) {
    if data.is_empty() {
        return;
    }
    let rc = 1.0 / (2.0 * PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f32;
    let alpha = dt / (rc + dt);

    let mut y = data[0];
    for i in 1..data.len() {
        y = alpha * (y + data[i] - data[i - 1]);
        data[i] = y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(window_ms: u32) -> VadConfig {
        VadConfig {
            window_ms,
            energy_threshold: 0.6,
            hpf_cutoff_hz: 0.0,
            sample_rate: 1000,
            verbose: false,
        }
    }

    #[test]
    fn quiet_tail_after_speech_ends_utterance() {
        let vad = EnergyVad::new(config(100));
        // 900 loud samples followed by 100 near-silent ones.
        let mut samples = vec![0.5f32; 900];
        samples.extend(vec![0.001f32; 100]);

        let result = vad.detect(&samples);
        assert!(result.speech_ended);
        assert!(result.energy_last < result.energy_all);
    }

    #[test]
    fn sustained_speech_does_not_end() {
        let vad = EnergyVad::new(config(100));
        let samples = vec![0.5f32; 1000];

        let result = vad.detect(&samples);
        assert!(!result.speech_ended);
    }

    #[test]
    fn insufficient_window_reports_no_end() {
        let vad = EnergyVad::new(config(1000));
        // Window needs 1000 samples but only 500 are available.
        let samples = vec![0.0f32; 500];

        let result = vad.detect(&samples);
        assert!(!result.speech_ended);
        assert_eq!(result.energy_all, 0.0);
    }

    #[test]
    fn empty_input_reports_no_end() {
        let vad = EnergyVad::new(config(100));
        assert!(!vad.detect(&[]).speech_ended);
    }

    #[test]
    fn high_pass_attenuates_dc_offset() {
        let mut cfg = config(100);
        cfg.hpf_cutoff_hz = 100.0;
        let vad = EnergyVad::new(cfg);

        // Constant DC signal: after the high-pass its energy collapses, so
        // both windows read near zero and the ratio test trips.
        let samples = vec![0.8f32; 1000];
        let result = vad.detect(&samples);
        assert!(result.energy_all < 0.1);
    }

    #[test]
    fn detector_does_not_mutate_input() {
        let mut cfg = config(100);
        cfg.hpf_cutoff_hz = 120.0;
        let vad = EnergyVad::new(cfg);

        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.05).sin() * 0.3).collect();
        let before = samples.clone();
        vad.detect(&samples);
        assert_eq!(samples, before);
    }
}
