//! Somnus - Sleep Tracking and Ambient Soundscapes
//!
//! Somnus provides three cooperating pieces:
//! 1. Session Timer - A stopwatch that measures a sleep session in `HH:MM:SS`
//! 2. Sleep History - A newest-first log of nights persisted in a key-value store
//! 3. Soundscape Engine - Procedural white, rain and ocean noise on an audio graph
//!
//! # Architecture
//!
//! The audio side is a small pull-based node graph:
//! - Sources: looped noise buffers and oscillators
//! - Processors: gains and biquad filters, with audio-rate parameter modulation
//! - Output: a shared master gain feeding the destination, rendered offline to WAV

pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod tracker;

pub use config::SomnusConfig;
pub use error::{Result, SomnusError};
