//! DSP Node Library
//!
//! Signal generators and processors that make up a soundscape graph.
//! All nodes implement the `AudioNode` trait for uniform processing.

mod filter;
mod gain;
mod node;
mod noise;
mod oscillator;

pub use filter::{BiquadFilterNode, FilterType, DEFAULT_Q};
pub use gain::GainNode;
pub use node::{AudioNode, ParamInputs, ParamKind, PlaybackState, SourceSchedule};
pub use noise::{generate_noise, BufferSourceNode};
pub use oscillator::{OscillatorNode, Waveform};
