//! Audio node trait definition
//!
//! Base trait for everything that can live in an audio graph: generators
//! (noise buffers, oscillators) and processors (gain stages, filters).

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, SomnusError};

// ============================================================================
// Audio Parameters
// ============================================================================

/// Automatable parameters a node may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Linear amplitude multiplier of a gain stage
    Gain,
    /// Frequency in Hz (oscillator pitch, filter cutoff)
    Frequency,
    /// Filter quality factor
    Q,
}

impl ParamKind {
    /// Stable lowercase name, used in errors and snapshots
    pub fn name(&self) -> &'static str {
        match self {
            ParamKind::Gain => "gain",
            ParamKind::Frequency => "frequency",
            ParamKind::Q => "q",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Signals connected to a node's parameters for one render quantum
///
/// The effective value of a parameter is its intrinsic value plus the sum of
/// every signal connected to it.
#[derive(Debug, Default)]
pub struct ParamInputs {
    blocks: Vec<(ParamKind, Vec<f32>)>,
}

impl ParamInputs {
    /// Mix a modulating signal into the block for `kind`
    pub fn accumulate(&mut self, kind: ParamKind, signal: &[f32]) {
        match self.blocks.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, block)) => {
                for (acc, &s) in block.iter_mut().zip(signal) {
                    *acc += s;
                }
            }
            None => self.blocks.push((kind, signal.to_vec())),
        }
    }

    /// Modulation block for `kind`, if anything is connected to it
    pub fn get(&self, kind: ParamKind) -> Option<&[f32]> {
        self.blocks
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, block)| block.as_slice())
    }

    /// Effective parameter value at sample `index`
    #[inline]
    pub fn value_at(&self, kind: ParamKind, base: f32, index: usize) -> f32 {
        base + self
            .get(kind)
            .and_then(|block| block.get(index).copied())
            .unwrap_or(0.0)
    }

    /// True when no signal modulates any parameter
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

// ============================================================================
// Source Scheduling
// ============================================================================

/// Lifecycle of a scheduled source node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Created but never started
    #[default]
    Unscheduled,
    /// Producing signal
    Playing,
    /// Stopped explicitly or ran out of data; cannot be restarted
    Stopped,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Unscheduled => write!(f, "Unscheduled"),
            PlaybackState::Playing => write!(f, "Playing"),
            PlaybackState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// One-shot start/stop bookkeeping shared by all generator nodes
///
/// A source can be started once and stopped once, mirroring the usual
/// real-time audio API contract.
#[derive(Debug, Clone, Default)]
pub struct SourceSchedule {
    state: PlaybackState,
}

impl SourceSchedule {
    /// Transition Unscheduled -> Playing
    pub fn start(&mut self) -> std::result::Result<(), &'static str> {
        match self.state {
            PlaybackState::Unscheduled => {
                self.state = PlaybackState::Playing;
                Ok(())
            }
            PlaybackState::Playing => Err("already started"),
            PlaybackState::Stopped => Err("cannot restart a stopped source"),
        }
    }

    /// Transition Playing -> Stopped
    pub fn stop(&mut self) -> std::result::Result<(), &'static str> {
        match self.state {
            PlaybackState::Playing => {
                self.state = PlaybackState::Stopped;
                Ok(())
            }
            PlaybackState::Unscheduled => Err("stop called before start"),
            PlaybackState::Stopped => Err("already stopped"),
        }
    }

    /// Mark a non-looping source that ran out of data
    pub fn finish(&mut self) {
        self.state = PlaybackState::Stopped;
    }

    /// Current lifecycle state
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Check if the source is producing signal
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }
}

// ============================================================================
// Audio Node Trait
// ============================================================================

/// Base trait for all audio graph nodes
///
/// Nodes render mono blocks. `input` holds the sum of every signal connected
/// to the node's input; `output` has the same length and must be fully
/// written.
pub trait AudioNode: Send {
    /// Get the node type identifier
    fn node_type(&self) -> &'static str;

    /// Render one block
    fn process(&mut self, input: &[f32], params: &ParamInputs, output: &mut [f32]);

    /// Current intrinsic value of a parameter
    fn param(&self, _kind: ParamKind) -> Option<f32> {
        None
    }

    /// Set the intrinsic value of a parameter
    fn set_param(&mut self, kind: ParamKind, _value: f32) -> Result<()> {
        Err(SomnusError::UnsupportedParam {
            node_type: self.node_type(),
            param: kind.name(),
        })
    }

    /// Start/stop bookkeeping; `None` for processors
    fn schedule(&self) -> Option<&SourceSchedule> {
        None
    }

    /// Mutable start/stop bookkeeping; `None` for processors
    fn schedule_mut(&mut self) -> Option<&mut SourceSchedule> {
        None
    }

    /// Get all parameters as JSON (for snapshots and the CLI)
    fn get_params(&self) -> Value;

    /// Check if this node is a scheduled source
    fn is_source(&self) -> bool {
        self.schedule().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_lifecycle() {
        let mut schedule = SourceSchedule::default();
        assert_eq!(schedule.state(), PlaybackState::Unscheduled);
        assert_eq!(schedule.stop(), Err("stop called before start"));

        assert!(schedule.start().is_ok());
        assert!(schedule.is_playing());
        assert_eq!(schedule.start(), Err("already started"));

        assert!(schedule.stop().is_ok());
        assert_eq!(schedule.stop(), Err("already stopped"));
        assert_eq!(schedule.start(), Err("cannot restart a stopped source"));
    }

    #[test]
    fn test_param_inputs_accumulate() {
        let mut params = ParamInputs::default();
        assert!(params.is_empty());

        params.accumulate(ParamKind::Gain, &[0.1, 0.2]);
        params.accumulate(ParamKind::Gain, &[0.1, 0.1]);

        let block = params.get(ParamKind::Gain).unwrap();
        assert!((block[0] - 0.2).abs() < 1e-6);
        assert!((block[1] - 0.3).abs() < 1e-6);
        assert!(params.get(ParamKind::Frequency).is_none());

        assert!((params.value_at(ParamKind::Gain, 0.4, 1) - 0.7).abs() < 1e-6);
        assert!((params.value_at(ParamKind::Q, 1.0, 0) - 1.0).abs() < 1e-6);
    }
}
