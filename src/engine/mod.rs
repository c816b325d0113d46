//! Audio Engine Module
//!
//! Core audio machinery:
//! - Audio buffer management
//! - The in-process audio graph (context, nodes, connections)
//! - The soundscape engine that builds graphs on demand
//! - WAV export

pub mod buffer;
pub mod graph;
pub mod io;
pub mod soundscape;

pub use buffer::{AudioBuffer, ChannelLayout};
pub use graph::{AudioGraph, ContextState, Edge, Endpoint, NodeId, RENDER_QUANTUM};
pub use io::{export_wav, ExportFormat};
pub use soundscape::{
    ActiveNode, ActiveSet, EngineState, NodeRole, SoundKind, SoundscapeEngine, TeardownReport,
};
