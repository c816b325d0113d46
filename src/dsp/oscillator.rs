//! Oscillator Node
//!
//! Periodic generator. At sub-audio rates it serves as the LFO that swells
//! the ocean soundscape.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::dsp::node::{AudioNode, ParamInputs, ParamKind, SourceSchedule};
use crate::error::{Result, SomnusError};

/// Supported waveform shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// Band-limited oscillator with an automatable frequency
#[derive(Debug, Clone)]
pub struct OscillatorNode {
    waveform: Waveform,
    frequency: f32,
    phase: f64,
    sample_rate: u32,
    schedule: SourceSchedule,
}

impl OscillatorNode {
    pub fn new(waveform: Waveform, frequency: f32, sample_rate: u32) -> Self {
        Self {
            waveform,
            frequency,
            phase: 0.0,
            sample_rate,
            schedule: SourceSchedule::default(),
        }
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Generate the next sample and advance the phase.
    fn next_sample(&mut self, frequency: f32) -> f32 {
        let inc = frequency as f64 / self.sample_rate as f64;
        let sample = match self.waveform {
            Waveform::Sine => (2.0 * PI * self.phase).sin(),
            Waveform::Sawtooth => 2.0 * self.phase - 1.0 - poly_blep(self.phase, inc),
            Waveform::Square => {
                let naive = if self.phase < 0.5 { 1.0 } else { -1.0 };
                naive + poly_blep(self.phase, inc) - poly_blep((self.phase + 0.5) % 1.0, inc)
            }
            Waveform::Triangle => {
                if self.phase < 0.5 {
                    4.0 * self.phase - 1.0
                } else {
                    3.0 - 4.0 * self.phase
                }
            }
        };

        self.phase = (self.phase + inc).rem_euclid(1.0);
        sample as f32
    }
}

/// PolyBLEP (Polynomial Band-Limited Step) correction at waveform edges.
///
/// `t` is the phase [0, 1), `dt` the phase increment per sample.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        return 0.0;
    }
    if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

impl AudioNode for OscillatorNode {
    fn node_type(&self) -> &'static str {
        "oscillator"
    }

    fn process(&mut self, _input: &[f32], params: &ParamInputs, output: &mut [f32]) {
        if !self.schedule.is_playing() {
            output.fill(0.0);
            return;
        }
        for (i, out) in output.iter_mut().enumerate() {
            let frequency = params.value_at(ParamKind::Frequency, self.frequency, i);
            *out = self.next_sample(frequency);
        }
    }

    fn param(&self, kind: ParamKind) -> Option<f32> {
        match kind {
            ParamKind::Frequency => Some(self.frequency),
            _ => None,
        }
    }

    fn set_param(&mut self, kind: ParamKind, value: f32) -> Result<()> {
        match kind {
            ParamKind::Frequency if value.is_finite() => {
                self.frequency = value;
                Ok(())
            }
            ParamKind::Frequency => Err(SomnusError::InvalidField {
                field: "frequency",
                value: value.to_string(),
                reason: "frequency must be a finite number".to_string(),
            }),
            _ => Err(SomnusError::UnsupportedParam {
                node_type: self.node_type(),
                param: kind.name(),
            }),
        }
    }

    fn schedule(&self) -> Option<&SourceSchedule> {
        Some(&self.schedule)
    }

    fn schedule_mut(&mut self) -> Option<&mut SourceSchedule> {
        Some(&mut self.schedule)
    }

    fn get_params(&self) -> Value {
        json!({
            "waveform": self.waveform,
            "frequency": self.frequency,
            "state": self.schedule.state(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn render(osc: &mut OscillatorNode, num_samples: usize) -> Vec<f32> {
        let mut output = vec![0.0; num_samples];
        osc.process(&[], &ParamInputs::default(), &mut output);
        output
    }

    #[test]
    fn test_silent_until_started() {
        let mut osc = OscillatorNode::new(Waveform::Sine, 440.0, 48000);
        assert!(render(&mut osc, 64).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_sine_quarter_period_peaks() {
        // 1 Hz at 4 samples/s: 0, 1, 0, -1
        let mut osc = OscillatorNode::new(Waveform::Sine, 1.0, 4);
        osc.schedule_mut().unwrap().start().unwrap();
        let out = render(&mut osc, 4);
        assert_abs_diff_eq!(out[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out[1], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out[2], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out[3], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_waveforms_stay_bounded() {
        for waveform in [Waveform::Square, Waveform::Sawtooth, Waveform::Triangle] {
            let mut osc = OscillatorNode::new(waveform, 440.0, 48000);
            osc.schedule_mut().unwrap().start().unwrap();
            let out = render(&mut osc, 4800);
            assert!(out.iter().all(|s| s.abs() <= 1.01), "{:?} out of range", waveform);
        }
    }

    #[test]
    fn test_frequency_modulation() {
        // Intrinsic 0 Hz, modulated to 1 Hz: same as a plain 1 Hz sine
        let mut osc = OscillatorNode::new(Waveform::Sine, 0.0, 4);
        osc.schedule_mut().unwrap().start().unwrap();
        let mut params = ParamInputs::default();
        params.accumulate(ParamKind::Frequency, &[1.0; 4]);
        let mut out = [0.0; 4];
        osc.process(&[], &params, &mut out);
        assert_abs_diff_eq!(out[1], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_is_source() {
        let osc = OscillatorNode::new(Waveform::Sine, 0.15, 48000);
        assert!(osc.is_source());
        assert_eq!(osc.get_params()["state"], "unscheduled");
    }
}
