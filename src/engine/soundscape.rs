//! Soundscape Engine
//!
//! Builds and tears down the playback graph for the ambient soundscapes.
//! All soundscapes start from looped white noise and differ only in how the
//! noise is shaped before it reaches the shared master gain:
//!
//! - `white`: noise -> master
//! - `rain`: noise -> low-pass 1200 Hz -> master
//! - `ocean`: noise -> wave gain (0.4) -> master, with a 0.15 Hz sine LFO
//!   scaled by a depth gain (0.25) modulating the wave gain
//!
//! At most one soundscape plays at a time. Every node of the current graph is
//! registered in the [`ActiveSet`] so the whole graph can be torn down as a
//! unit before the next one is built.

use std::fmt;
use std::mem;
use std::str::FromStr;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::SomnusConfig;
use crate::dsp::{generate_noise, FilterType, ParamKind, Waveform};
use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::engine::graph::{AudioGraph, ContextState, NodeId};
use crate::error::{Result, SomnusError};

// ============================================================================
// Constants
// ============================================================================

/// Low-pass cutoff that turns white noise into rain
pub const RAIN_CUTOFF_HZ: f32 = 1200.0;

/// Resting amplitude of the ocean wave envelope
pub const OCEAN_WAVE_GAIN: f32 = 0.4;

/// Rate of the ocean swell (one wave every ~6.7s)
pub const OCEAN_LFO_HZ: f32 = 0.15;

/// How far the swell moves the wave envelope around its resting amplitude
pub const OCEAN_LFO_DEPTH: f32 = 0.25;

// ============================================================================
// Sound Kinds
// ============================================================================

/// Available ambient textures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundKind {
    White,
    Rain,
    Ocean,
}

impl SoundKind {
    pub fn name(&self) -> &'static str {
        match self {
            SoundKind::White => "white",
            SoundKind::Rain => "rain",
            SoundKind::Ocean => "ocean",
        }
    }
}

impl fmt::Display for SoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SoundKind {
    type Err = SomnusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" => Ok(SoundKind::White),
            "rain" => Ok(SoundKind::Rain),
            "ocean" => Ok(SoundKind::Ocean),
            _ => Err(SomnusError::UnknownSoundKind {
                name: s.trim().to_string(),
            }),
        }
    }
}

// ============================================================================
// Active Set
// ============================================================================

/// Whether a node produces signal on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Started source; must be stopped on teardown
    Generator,
    /// Shapes signal from upstream; only disconnected on teardown
    Processor,
}

/// A node owned by the current soundscape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveNode {
    pub id: NodeId,
    pub role: NodeRole,
}

/// Nodes that are torn down together, in registration order
#[derive(Debug, Default, Clone)]
pub struct ActiveSet {
    nodes: Vec<ActiveNode>,
}

impl ActiveSet {
    pub fn register(&mut self, id: NodeId, role: NodeRole) {
        self.nodes.push(ActiveNode { id, role });
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActiveNode> {
        self.nodes.iter()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id).collect()
    }

    pub fn generators(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.role == NodeRole::Generator)
            .map(|node| node.id)
            .collect()
    }

    /// Empty the set, handing its nodes to the caller
    pub fn take(&mut self) -> Vec<ActiveNode> {
        mem::take(&mut self.nodes)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Playback state of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Playing(SoundKind),
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "Idle"),
            EngineState::Playing(kind) => write!(f, "Playing {}", kind),
        }
    }
}

/// Outcome of a best-effort teardown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Nodes removed from the graph
    pub released: usize,
    /// Per-node errors that were collected and discarded
    pub errors_discarded: usize,
}

/// Audio context plus the master gain every soundscape routes through
#[derive(Debug)]
struct AudioOutput {
    graph: AudioGraph,
    master: NodeId,
}

impl AudioOutput {
    fn new(sample_rate: u32, volume: f32) -> Result<Self> {
        let mut graph = AudioGraph::new(sample_rate);
        let master = graph.create_gain(volume)?;
        let destination = graph.destination();
        graph.connect(master, destination)?;
        info!("Audio context created ({} Hz)", sample_rate);
        Ok(Self { graph, master })
    }
}

/// Owns the audio context and the currently playing soundscape
pub struct SoundscapeEngine {
    sample_rate: u32,
    noise_duration_secs: f32,
    output: Option<AudioOutput>,
    active: ActiveSet,
    state: EngineState,
    volume_percent: u8,
    rng: StdRng,
}

impl SoundscapeEngine {
    /// Create an idle engine; the audio context is created on first `play`
    pub fn new(config: &SomnusConfig) -> Self {
        let rng = match config.noise_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            sample_rate: config.sample_rate,
            noise_duration_secs: config.noise_duration_secs,
            output: None,
            active: ActiveSet::default(),
            state: EngineState::Idle,
            volume_percent: config.initial_volume.min(100),
            rng,
        }
    }

    // ------------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------------

    /// Replace whatever is playing with the soundscape `kind`
    ///
    /// On error the engine is left idle with nothing playing.
    pub fn play(&mut self, kind: SoundKind) -> Result<()> {
        if self.output.is_none() {
            self.output = Some(AudioOutput::new(self.sample_rate, self.volume())?);
        }
        if let Some(output) = self.output.as_mut() {
            if output.graph.state() == ContextState::Suspended {
                output.graph.resume()?;
            }
        }

        self.teardown();

        let noise = generate_noise(
            self.noise_duration_secs,
            self.sample_rate,
            ChannelLayout::Mono,
            &mut self.rng,
        );
        if let Err(e) = self.build(kind, noise) {
            self.teardown();
            self.state = EngineState::Idle;
            return Err(e);
        }

        self.state = EngineState::Playing(kind);
        info!("Playing {} soundscape ({} nodes)", kind, self.active.len());
        Ok(())
    }

    /// Construct and start the graph for `kind`, registering nodes as they
    /// are created so a partial build can still be torn down.
    fn build(&mut self, kind: SoundKind, noise: AudioBuffer) -> Result<()> {
        let output = self.output.as_mut().ok_or(SomnusError::ContextClosed)?;
        let graph = &mut output.graph;
        let master = output.master;
        let active = &mut self.active;

        let source = graph.create_buffer_source(noise, true)?;
        active.register(source, NodeRole::Generator);

        match kind {
            SoundKind::White => {
                graph.connect(source, master)?;
                graph.start(source)?;
            }
            SoundKind::Rain => {
                let filter = graph.create_biquad_filter(FilterType::LowPass, RAIN_CUTOFF_HZ)?;
                active.register(filter, NodeRole::Processor);

                graph.connect(source, filter)?;
                graph.connect(filter, master)?;
                graph.start(source)?;
            }
            SoundKind::Ocean => {
                let wave = graph.create_gain(OCEAN_WAVE_GAIN)?;
                active.register(wave, NodeRole::Processor);
                let lfo = graph.create_oscillator(Waveform::Sine, OCEAN_LFO_HZ)?;
                active.register(lfo, NodeRole::Generator);
                let depth = graph.create_gain(OCEAN_LFO_DEPTH)?;
                active.register(depth, NodeRole::Processor);

                graph.connect(lfo, depth)?;
                graph.connect_param(depth, wave, ParamKind::Gain)?;
                graph.connect(source, wave)?;
                graph.connect(wave, master)?;
                graph.start(source)?;
                graph.start(lfo)?;
            }
        }
        Ok(())
    }

    /// Stop whatever is playing; safe to call when idle
    pub fn stop(&mut self) -> TeardownReport {
        let report = self.teardown();
        if let EngineState::Playing(kind) = self.state {
            info!("Stopped {} soundscape", kind);
        }
        self.state = EngineState::Idle;
        report
    }

    /// Stop, disconnect and release every active node
    ///
    /// Each step is attempted for every node regardless of earlier failures.
    fn teardown(&mut self) -> TeardownReport {
        let nodes = self.active.take();
        let Some(output) = self.output.as_mut() else {
            return TeardownReport::default();
        };

        let mut errors: Vec<SomnusError> = Vec::new();
        let mut released = 0;
        for node in &nodes {
            if node.role == NodeRole::Generator {
                if let Err(e) = output.graph.stop(node.id) {
                    errors.push(e);
                }
            }
            if let Err(e) = output.graph.disconnect(node.id) {
                errors.push(e);
            }
            match output.graph.release(node.id) {
                Ok(()) => released += 1,
                Err(e) => errors.push(e),
            }
        }

        for e in &errors {
            debug!("[TEARDOWN] Ignored: {}", e);
        }

        TeardownReport {
            released,
            errors_discarded: errors.len(),
        }
    }

    // ------------------------------------------------------------------------
    // Volume
    // ------------------------------------------------------------------------

    /// Set the master volume from a 0-100 percentage
    ///
    /// Values above 100 are clamped. Before the audio context exists the
    /// value is kept and applied when the master gain is created.
    pub fn set_volume(&mut self, percent: u32) {
        self.volume_percent = percent.min(100) as u8;
        let volume = self.volume();
        if let Some(output) = self.output.as_mut() {
            if let Err(e) = output.graph.set_param(output.master, ParamKind::Gain, volume) {
                debug!("[VOLUME] Ignored: {}", e);
            }
        }
    }

    /// Master volume in [0, 1]
    pub fn volume(&self) -> f32 {
        self.volume_percent as f32 / 100.0
    }

    pub fn volume_percent(&self) -> u8 {
        self.volume_percent
    }

    /// Text shown next to the volume control
    pub fn volume_label(&self) -> String {
        format!("{}%", self.volume_percent)
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    /// Pull `frames` mono frames from the audio context
    ///
    /// Silence if no context has been created yet.
    pub fn render(&mut self, frames: usize) -> AudioBuffer {
        match self.output.as_mut() {
            Some(output) => output.graph.render(frames),
            None => AudioBuffer::from_mono(vec![0.0; frames], self.sample_rate),
        }
    }

    /// Pull `seconds` worth of audio
    pub fn render_seconds(&mut self, seconds: f32) -> AudioBuffer {
        let frames = (seconds.max(0.0) * self.sample_rate as f32).round() as usize;
        self.render(frames)
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Whether the stop-music control should be enabled
    pub fn is_stop_enabled(&self) -> bool {
        matches!(self.state, EngineState::Playing(_))
    }

    pub fn active_nodes(&self) -> &ActiveSet {
        &self.active
    }

    /// The audio context, once created
    pub fn context(&self) -> Option<&AudioGraph> {
        self.output.as_ref().map(|output| &output.graph)
    }

    /// The shared master gain node, once created
    pub fn master(&self) -> Option<NodeId> {
        self.output.as_ref().map(|output| output.master)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::PlaybackState;
    use crate::engine::buffer::rms;

    fn engine() -> SoundscapeEngine {
        let config = SomnusConfig {
            sample_rate: 8000,
            noise_seed: Some(42),
            ..SomnusConfig::default()
        };
        SoundscapeEngine::new(&config)
    }

    #[test]
    fn test_sound_kind_parsing() {
        assert_eq!("white".parse::<SoundKind>().unwrap(), SoundKind::White);
        assert_eq!(" Rain ".parse::<SoundKind>().unwrap(), SoundKind::Rain);
        assert_eq!("OCEAN".parse::<SoundKind>().unwrap(), SoundKind::Ocean);

        let err = "thunder".parse::<SoundKind>().unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_SOUND_KIND");
    }

    #[test]
    fn test_context_created_lazily() {
        let mut engine = engine();
        assert!(engine.context().is_none());
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(!engine.is_stop_enabled());

        engine.play(SoundKind::White).unwrap();
        let graph = engine.context().unwrap();
        assert_eq!(graph.state(), ContextState::Running);
        assert!(engine.is_stop_enabled());
    }

    #[test]
    fn test_white_topology() {
        let mut engine = engine();
        engine.play(SoundKind::White).unwrap();

        let active = engine.active_nodes();
        assert_eq!(active.len(), 1);
        let source = active.ids()[0];
        let graph = engine.context().unwrap();
        assert_eq!(graph.playback_state(source), Some(PlaybackState::Playing));
        // destination + master + noise
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn test_rain_topology() {
        let mut engine = engine();
        engine.play(SoundKind::Rain).unwrap();

        let active = engine.active_nodes();
        assert_eq!(active.len(), 2);
        assert_eq!(active.generators().len(), 1);

        let graph = engine.context().unwrap();
        let filter = active.ids()[1];
        assert_eq!(graph.node(filter).unwrap().node_type(), "biquad");
        assert_eq!(graph.param(filter, ParamKind::Frequency), Some(RAIN_CUTOFF_HZ));
    }

    #[test]
    fn test_ocean_registers_both_generators() {
        let mut engine = engine();
        engine.play(SoundKind::Ocean).unwrap();

        let active = engine.active_nodes();
        assert_eq!(active.len(), 4);
        let generators = active.generators();
        assert_eq!(generators.len(), 2);

        let graph = engine.context().unwrap();
        for id in generators {
            assert_eq!(graph.playback_state(id), Some(PlaybackState::Playing));
        }
    }

    #[test]
    fn test_replay_tears_down_previous_graph() {
        let mut engine = engine();
        engine.play(SoundKind::Ocean).unwrap();
        let previous = engine.active_nodes().ids();

        engine.play(SoundKind::Rain).unwrap();
        let graph = engine.context().unwrap();
        for id in previous {
            assert!(!graph.contains(id), "orphaned node {}", id);
        }
        // destination + master + noise + filter
        assert_eq!(graph.node_count(), 4);
        assert_eq!(engine.state(), EngineState::Playing(SoundKind::Rain));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut engine = engine();
        engine.play(SoundKind::Ocean).unwrap();

        let first = engine.stop();
        assert_eq!(first.released, 4);
        assert_eq!(first.errors_discarded, 0);
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(!engine.is_stop_enabled());

        let second = engine.stop();
        assert_eq!(second, TeardownReport::default());
        assert_eq!(engine.context().unwrap().node_count(), 2);
    }

    #[test]
    fn test_stop_before_play() {
        let mut engine = engine();
        assert_eq!(engine.stop(), TeardownReport::default());
        assert!(engine.context().is_none());
    }

    #[test]
    fn test_volume_applies_to_master() {
        let mut engine = engine();
        engine.play(SoundKind::White).unwrap();

        engine.set_volume(50);
        let master = engine.master().unwrap();
        assert_eq!(engine.context().unwrap().param(master, ParamKind::Gain), Some(0.5));
        assert_eq!(engine.volume_label(), "50%");

        engine.set_volume(250);
        assert_eq!(engine.volume_percent(), 100);
        assert_eq!(engine.context().unwrap().param(master, ParamKind::Gain), Some(1.0));
    }

    #[test]
    fn test_volume_before_context_is_kept() {
        let mut engine = engine();
        engine.set_volume(20);
        assert!(engine.context().is_none());

        engine.play(SoundKind::White).unwrap();
        let master = engine.master().unwrap();
        let gain = engine.context().unwrap().param(master, ParamKind::Gain).unwrap();
        assert!((gain - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_render_silence_without_context() {
        let mut engine = engine();
        let out = engine.render(100);
        assert_eq!(out.len(), 100);
        assert_eq!(rms(out.channel(0)), 0.0);
    }

    #[test]
    fn test_white_noise_level_follows_volume() {
        let mut engine = engine();
        engine.play(SoundKind::White).unwrap();
        engine.set_volume(100);
        let loud = rms(engine.render(8000).channel(0));

        engine.set_volume(25);
        let quiet = rms(engine.render(8000).channel(0));

        assert!((loud - 0.577).abs() < 0.02, "loud = {}", loud);
        assert!((quiet / loud - 0.25).abs() < 0.01);
    }

    #[test]
    fn test_rain_is_darker_than_white() {
        let mut engine = engine();
        engine.play(SoundKind::White).unwrap();
        let white = rms(engine.render(8000).channel(0));

        engine.play(SoundKind::Rain).unwrap();
        let rain = rms(engine.render(8000).channel(0));

        assert!(rain < white * 0.8, "rain {} vs white {}", rain, white);
    }

    #[test]
    fn test_silent_after_stop() {
        let mut engine = engine();
        engine.play(SoundKind::Rain).unwrap();
        engine.stop();
        assert_eq!(rms(engine.render(1000).channel(0)), 0.0);
    }
}
