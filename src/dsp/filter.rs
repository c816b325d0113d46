//! Biquad Filter Node
//!
//! Second-order IIR filter using the Audio EQ Cookbook formulas. The rain
//! soundscape runs its noise through the low-pass variant.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::dsp::node::{AudioNode, ParamInputs, ParamKind};
use crate::error::{Result, SomnusError};

/// Butterworth quality factor (maximally flat pass band)
pub const DEFAULT_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Filter response shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// Remove above frequency
    #[default]
    LowPass,
    /// Remove below frequency
    HighPass,
    /// Keep a band around frequency (0 dB peak)
    BandPass,
}

/// Biquad filter coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (a0 + a1*z^-1 + a2*z^-2)
/// Normalized: all coefficients divided by a0
#[derive(Debug, Clone, Copy, Default)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// Reference: https://www.w3.org/2011/audio/audio-eq-cookbook.html
    fn calculate(filter_type: FilterType, sample_rate: f64, frequency: f64, q: f64) -> Self {
        // Keep the cutoff strictly below Nyquist
        let nyquist_limit = (sample_rate / 2.0 - 1.0).max(10.0);
        let freq = frequency.clamp(10.0, nyquist_limit);
        let q = q.clamp(0.1, 30.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::LowPass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::HighPass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::BandPass => (
                alpha,
                0.0,
                -alpha,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
        };

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Filter history (Direct Form I)
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    fn process(&mut self, input: f64, c: &BiquadCoeffs) -> f64 {
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

/// Biquad filter node with automatable cutoff and Q
///
/// Coefficients follow parameter modulation once per render block, using the
/// first sample of the block.
#[derive(Debug, Clone)]
pub struct BiquadFilterNode {
    filter_type: FilterType,
    frequency: f32,
    q: f32,
    sample_rate: u32,
    coeffs: BiquadCoeffs,
    /// (frequency, q) the cached coefficients were computed for
    coeffs_for: (f32, f32),
    state: BiquadState,
}

impl BiquadFilterNode {
    /// Create a filter at `sample_rate` with Butterworth Q
    pub fn new(filter_type: FilterType, frequency: f32, sample_rate: u32) -> Self {
        Self::with_q(filter_type, frequency, DEFAULT_Q, sample_rate)
    }

    /// Create a filter with an explicit quality factor
    pub fn with_q(filter_type: FilterType, frequency: f32, q: f32, sample_rate: u32) -> Self {
        let coeffs = BiquadCoeffs::calculate(filter_type, sample_rate as f64, frequency as f64, q as f64);
        Self {
            filter_type,
            frequency,
            q,
            sample_rate,
            coeffs,
            coeffs_for: (frequency, q),
            state: BiquadState::default(),
        }
    }

    /// Filter response shape
    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    fn update_coefficients(&mut self, frequency: f32, q: f32) {
        if (frequency, q) == self.coeffs_for {
            return;
        }
        self.coeffs = BiquadCoeffs::calculate(
            self.filter_type,
            self.sample_rate as f64,
            frequency as f64,
            q as f64,
        );
        self.coeffs_for = (frequency, q);
    }
}

impl AudioNode for BiquadFilterNode {
    fn node_type(&self) -> &'static str {
        "biquad"
    }

    fn process(&mut self, input: &[f32], params: &ParamInputs, output: &mut [f32]) {
        let frequency = params.value_at(ParamKind::Frequency, self.frequency, 0);
        let q = params.value_at(ParamKind::Q, self.q, 0);
        self.update_coefficients(frequency, q);

        for (out, &x) in output.iter_mut().zip(input) {
            *out = self.state.process(x as f64, &self.coeffs) as f32;
        }
    }

    fn param(&self, kind: ParamKind) -> Option<f32> {
        match kind {
            ParamKind::Frequency => Some(self.frequency),
            ParamKind::Q => Some(self.q),
            ParamKind::Gain => None,
        }
    }

    fn set_param(&mut self, kind: ParamKind, value: f32) -> Result<()> {
        if !value.is_finite() || value <= 0.0 {
            return Err(SomnusError::InvalidField {
                field: kind.name(),
                value: value.to_string(),
                reason: "filter parameters must be positive".to_string(),
            });
        }
        match kind {
            ParamKind::Frequency => self.frequency = value,
            ParamKind::Q => self.q = value,
            ParamKind::Gain => {
                return Err(SomnusError::UnsupportedParam {
                    node_type: self.node_type(),
                    param: kind.name(),
                })
            }
        }
        Ok(())
    }

    fn get_params(&self) -> Value {
        json!({
            "filter_type": self.filter_type,
            "frequency": self.frequency,
            "q": self.q,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
