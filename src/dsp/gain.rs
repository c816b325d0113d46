//! Gain Node
//!
//! Linear amplitude stage. Used as the shared master volume, as the ocean
//! wave envelope and as the LFO depth scaler.

use serde_json::{json, Value};

use crate::dsp::node::{AudioNode, ParamInputs, ParamKind};
use crate::error::{Result, SomnusError};

// ============================================================================
// Constants
// ============================================================================

/// Largest intrinsic gain accepted by `set_param`
const MAX_GAIN: f32 = 16.0;

// ============================================================================
// Gain Node
// ============================================================================

/// Multiplies its input by `gain`
///
/// Signals connected to the `gain` parameter are added to the intrinsic
/// value sample by sample, so an oscillator routed through a depth stage
/// produces tremolo around the intrinsic level.
#[derive(Debug, Clone)]
pub struct GainNode {
    gain: f32,
}

impl GainNode {
    /// Create a gain stage, clamping `gain` to [0, 16]
    pub fn new(gain: f32) -> Self {
        Self {
            gain: gain.clamp(0.0, MAX_GAIN),
        }
    }

    /// Current intrinsic gain
    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl Default for GainNode {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl AudioNode for GainNode {
    fn node_type(&self) -> &'static str {
        "gain"
    }

    fn process(&mut self, input: &[f32], params: &ParamInputs, output: &mut [f32]) {
        match params.get(ParamKind::Gain) {
            Some(modulation) => {
                for ((out, &x), &m) in output.iter_mut().zip(input).zip(modulation) {
                    *out = x * (self.gain + m);
                }
            }
            None => {
                for (out, &x) in output.iter_mut().zip(input) {
                    *out = x * self.gain;
                }
            }
        }
    }

    fn param(&self, kind: ParamKind) -> Option<f32> {
        match kind {
            ParamKind::Gain => Some(self.gain),
            _ => None,
        }
    }

    fn set_param(&mut self, kind: ParamKind, value: f32) -> Result<()> {
        match kind {
            ParamKind::Gain if value.is_finite() => {
                self.gain = value.clamp(0.0, MAX_GAIN);
                Ok(())
            }
            ParamKind::Gain => Err(SomnusError::InvalidField {
                field: "gain",
                value: value.to_string(),
                reason: "gain must be a finite number".to_string(),
            }),
            _ => Err(SomnusError::UnsupportedParam {
                node_type: self.node_type(),
                param: kind.name(),
            }),
        }
    }

    fn get_params(&self) -> Value {
        json!({ "gain": self.gain })
    }
}

// ============================================================================
// Tests
// ============================================================================
