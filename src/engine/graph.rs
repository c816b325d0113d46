//! Audio Graph
//!
//! In-process stand-in for a real-time audio context: an arena of
//! [`AudioNode`]s wired by directed edges, rendered on demand by pulling
//! blocks from the destination.
//!
//! The command set is deliberately small: create nodes, `connect`,
//! `connect_param`, `start`, `stop`, `disconnect`, `release`. Node handles
//! are plain [`NodeId`]s owned by whoever created the node.

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::debug;
use serde::Serialize;
use serde_json::{json, Value};

use crate::dsp::{
    AudioNode, BiquadFilterNode, BufferSourceNode, FilterType, GainNode, OscillatorNode,
    ParamInputs, ParamKind, PlaybackState, Waveform,
};
use crate::engine::buffer::AudioBuffer;
use crate::error::{Result, SomnusError};

/// Number of frames processed per internal render step
///
/// Filter coefficients follow parameter modulation at this granularity.
pub const RENDER_QUANTUM: usize = 128;

// ============================================================================
// Identifiers and Connections
// ============================================================================

/// Handle to a node inside an [`AudioGraph`]
///
/// Released slots are reused; the generation makes a handle to a released
/// node stay invalid after its slot is taken by a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

impl NodeId {
    pub const fn new(index: usize) -> Self {
        Self {
            index,
            generation: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "#{}", self.index)
        } else {
            write!(f, "#{}.{}", self.index, self.generation)
        }
    }
}

/// Where an edge delivers its signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// Summed into the node's audio input
    Input(NodeId),
    /// Added to one of the node's parameters
    Param(NodeId, ParamKind),
}

impl Endpoint {
    /// Node on the receiving side
    pub fn node(&self) -> NodeId {
        match self {
            Endpoint::Input(id) | Endpoint::Param(id, _) => *id,
        }
    }
}

/// Directed connection between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: Endpoint,
}

/// Lifecycle of the audio context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    /// Created but not rendering (renders silence)
    #[default]
    Suspended,
    /// Rendering audio
    Running,
    /// Shut down; no further nodes can be created
    Closed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextState::Suspended => write!(f, "Suspended"),
            ContextState::Running => write!(f, "Running"),
            ContextState::Closed => write!(f, "Closed"),
        }
    }
}

/// Final sink; passes its summed input through
#[derive(Debug, Default)]
struct DestinationNode;

impl AudioNode for DestinationNode {
    fn node_type(&self) -> &'static str {
        "destination"
    }

    fn process(&mut self, input: &[f32], _params: &ParamInputs, output: &mut [f32]) {
        output.copy_from_slice(input);
    }

    fn get_params(&self) -> Value {
        json!({})
    }
}

// ============================================================================
// Audio Graph
// ============================================================================

/// One arena slot; `node` is `None` once released
struct Slot {
    generation: u32,
    node: Option<Box<dyn AudioNode>>,
}

/// Directed acyclic graph of audio nodes rendering into one destination
pub struct AudioGraph {
    sample_rate: u32,
    state: ContextState,
    /// Arena indexed by `NodeId`; released slots are refilled before it grows
    nodes: Vec<Slot>,
    edges: Vec<Edge>,
    frames_rendered: u64,
}

impl AudioGraph {
    /// Create a suspended context with only the destination node
    pub fn new(sample_rate: u32) -> Self {
        let destination: Box<dyn AudioNode> = Box::new(DestinationNode);
        Self {
            sample_rate,
            state: ContextState::Suspended,
            nodes: vec![Slot {
                generation: 0,
                node: Some(destination),
            }],
            edges: Vec::new(),
            frames_rendered: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// The node everything audible must eventually reach
    pub fn destination(&self) -> NodeId {
        NodeId::new(0)
    }

    /// Seconds of audio rendered so far
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    // ------------------------------------------------------------------------
    // Context lifecycle
    // ------------------------------------------------------------------------

    /// Start (or continue) rendering
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            ContextState::Closed => Err(SomnusError::ContextClosed),
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                self.state = ContextState::Running;
                debug!("[CONTEXT] Resumed at {:.3}s", self.current_time());
                Ok(())
            }
        }
    }

    /// Pause rendering; `render` produces silence until resumed
    pub fn suspend(&mut self) -> Result<()> {
        match self.state {
            ContextState::Closed => Err(SomnusError::ContextClosed),
            _ => {
                self.state = ContextState::Suspended;
                debug!("[CONTEXT] Suspended at {:.3}s", self.current_time());
                Ok(())
            }
        }
    }

    /// Shut the context down and drop every node except the destination
    pub fn close(&mut self) {
        self.edges.clear();
        self.nodes.truncate(1);
        self.state = ContextState::Closed;
        debug!("[CONTEXT] Closed");
    }

    // ------------------------------------------------------------------------
    // Node creation
    // ------------------------------------------------------------------------

    /// Add an arbitrary node to the arena
    pub fn add_node(&mut self, node: Box<dyn AudioNode>) -> Result<NodeId> {
        if self.state == ContextState::Closed {
            return Err(SomnusError::ContextClosed);
        }
        let free = self.nodes.iter().position(|slot| slot.node.is_none());
        let id = match free {
            Some(index) => {
                let slot = &mut self.nodes[index];
                slot.generation = slot.generation.wrapping_add(1);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.nodes.push(Slot {
                    generation: 0,
                    node: None,
                });
                NodeId::new(self.nodes.len() - 1)
            }
        };
        debug!("[GRAPH] Created {} node {}", node.node_type(), id);
        self.nodes[id.index].node = Some(node);
        Ok(id)
    }

    pub fn create_gain(&mut self, gain: f32) -> Result<NodeId> {
        self.add_node(Box::new(GainNode::new(gain)))
    }

    pub fn create_biquad_filter(&mut self, filter_type: FilterType, frequency: f32) -> Result<NodeId> {
        let node = BiquadFilterNode::new(filter_type, frequency, self.sample_rate);
        self.add_node(Box::new(node))
    }

    pub fn create_oscillator(&mut self, waveform: Waveform, frequency: f32) -> Result<NodeId> {
        let node = OscillatorNode::new(waveform, frequency, self.sample_rate);
        self.add_node(Box::new(node))
    }

    pub fn create_buffer_source(&mut self, buffer: AudioBuffer, looping: bool) -> Result<NodeId> {
        self.add_node(Box::new(BufferSourceNode::new(buffer, looping)))
    }

    // ------------------------------------------------------------------------
    // Node access
    // ------------------------------------------------------------------------

    /// Check whether `id` refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    /// Number of live nodes, destination included
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.node.is_some()).count()
    }

    /// Arena slots allocated, live or released
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    fn slot(&self, id: NodeId) -> Option<&dyn AudioNode> {
        self.nodes
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_deref())
    }

    pub fn node(&self, id: NodeId) -> Result<&dyn AudioNode> {
        match self.slot(id) {
            Some(node) => Ok(node),
            None => Err(SomnusError::NodeNotFound { node: id }),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Box<dyn AudioNode>> {
        match self
            .nodes
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
        {
            Some(node) => Ok(node),
            None => Err(SomnusError::NodeNotFound { node: id }),
        }
    }

    pub fn param(&self, id: NodeId, kind: ParamKind) -> Option<f32> {
        self.node(id).ok().and_then(|node| node.param(kind))
    }

    pub fn set_param(&mut self, id: NodeId, kind: ParamKind, value: f32) -> Result<()> {
        self.node_mut(id)?.set_param(kind, value)
    }

    /// Lifecycle of a source node; `None` for processors and unknown ids
    pub fn playback_state(&self, id: NodeId) -> Option<PlaybackState> {
        self.node(id)
            .ok()
            .and_then(|node| node.schedule())
            .map(|schedule| schedule.state())
    }

    // ------------------------------------------------------------------------
    // Wiring
    // ------------------------------------------------------------------------

    /// Route `from`'s output into `to`'s input
    ///
    /// Duplicate connections are ignored.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.add_edge(Edge {
            from,
            to: Endpoint::Input(to),
        })
    }

    /// Route `from`'s output into one of `to`'s parameters
    pub fn connect_param(&mut self, from: NodeId, to: NodeId, kind: ParamKind) -> Result<()> {
        let target = self.node(to)?;
        if target.param(kind).is_none() {
            return Err(SomnusError::UnsupportedParam {
                node_type: target.node_type(),
                param: kind.name(),
            });
        }
        self.add_edge(Edge {
            from,
            to: Endpoint::Param(to, kind),
        })
    }

    fn add_edge(&mut self, edge: Edge) -> Result<()> {
        let to = edge.to.node();
        self.node(edge.from)?;
        self.node(to)?;

        if edge.from == self.destination() {
            return Err(SomnusError::InvalidNodeState {
                node: edge.from,
                reason: "the destination has no outputs",
            });
        }
        if edge.from == to || self.reaches(to, edge.from) {
            return Err(SomnusError::GraphCycle { from: edge.from, to });
        }
        if !self.edges.contains(&edge) {
            debug!("[GRAPH] Connected {} -> {:?}", edge.from, edge.to);
            self.edges.push(edge);
        }
        Ok(())
    }

    /// Depth-first search along outgoing edges
    fn reaches(&self, start: NodeId, target: NodeId) -> bool {
        let mut stack = vec![start];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if seen.insert(id) {
                stack.extend(
                    self.edges
                        .iter()
                        .filter(|edge| edge.from == id)
                        .map(|edge| edge.to.node()),
                );
            }
        }
        false
    }

    /// Remove every outgoing connection of `id`
    ///
    /// Disconnecting an already disconnected node is a no-op.
    pub fn disconnect(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        self.edges.retain(|edge| edge.from != id);
        Ok(())
    }

    /// Check whether `id` has any outgoing connection
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.edges.iter().any(|edge| edge.from == id)
    }

    /// Incoming and outgoing connections of `id`
    pub fn edges_of(&self, id: NodeId) -> Vec<Edge> {
        self.edges
            .iter()
            .filter(|edge| edge.from == id || edge.to.node() == id)
            .copied()
            .collect()
    }

    /// Drop a node and every connection touching it
    pub fn release(&mut self, id: NodeId) -> Result<()> {
        if id == self.destination() {
            return Err(SomnusError::InvalidNodeState {
                node: id,
                reason: "the destination cannot be released",
            });
        }
        self.node(id)?;
        self.edges.retain(|edge| edge.from != id && edge.to.node() != id);
        self.nodes[id.index].node = None;
        debug!("[GRAPH] Released node {}", id);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Source scheduling
    // ------------------------------------------------------------------------

    /// Begin producing signal from a source node
    pub fn start(&mut self, id: NodeId) -> Result<()> {
        let schedule = self
            .node_mut(id)?
            .schedule_mut()
            .ok_or(SomnusError::NotASource { node: id })?;
        schedule
            .start()
            .map_err(|reason| SomnusError::InvalidNodeState { node: id, reason })
    }

    /// Stop a source node; a stopped source cannot be restarted
    pub fn stop(&mut self, id: NodeId) -> Result<()> {
        let schedule = self
            .node_mut(id)?
            .schedule_mut()
            .ok_or(SomnusError::NotASource { node: id })?;
        schedule
            .stop()
            .map_err(|reason| SomnusError::InvalidNodeState { node: id, reason })
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    /// Render `frames` mono frames from the destination
    ///
    /// A suspended or closed context renders silence and does not advance.
    pub fn render(&mut self, frames: usize) -> AudioBuffer {
        if self.state != ContextState::Running {
            return AudioBuffer::from_mono(vec![0.0; frames], self.sample_rate);
        }

        let order = self.render_order();
        let mut samples = Vec::with_capacity(frames);
        let mut remaining = frames;
        while remaining > 0 {
            let block = remaining.min(RENDER_QUANTUM);
            samples.extend(self.render_quantum(&order, block));
            remaining -= block;
        }

        self.frames_rendered += frames as u64;
        AudioBuffer::from_mono(samples, self.sample_rate)
    }

    /// Nodes feeding the destination, upstream first
    fn render_order(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.visit(self.destination(), &mut visited, &mut order);
        order
    }

    fn visit(&self, id: NodeId, visited: &mut HashSet<NodeId>, order: &mut Vec<NodeId>) {
        if !visited.insert(id) {
            return;
        }
        for edge in self.edges.iter().filter(|edge| edge.to.node() == id) {
            self.visit(edge.from, visited, order);
        }
        order.push(id);
    }

    fn render_quantum(&mut self, order: &[NodeId], frames: usize) -> Vec<f32> {
        let mut blocks: HashMap<NodeId, Vec<f32>> = HashMap::with_capacity(order.len());

        for &id in order {
            let mut input = vec![0.0_f32; frames];
            let mut params = ParamInputs::default();
            for edge in self.edges.iter().filter(|edge| edge.to.node() == id) {
                let Some(signal) = blocks.get(&edge.from) else {
                    continue;
                };
                match edge.to {
                    Endpoint::Input(_) => {
                        for (acc, &s) in input.iter_mut().zip(signal) {
                            *acc += s;
                        }
                    }
                    Endpoint::Param(_, kind) => params.accumulate(kind, signal),
                }
            }

            let mut output = vec![0.0_f32; frames];
            if let Ok(node) = self.node_mut(id) {
                node.process(&input, &params, &mut output);
            }
            blocks.insert(id, output);
        }

        blocks
            .remove(&self.destination())
            .unwrap_or_else(|| vec![0.0; frames])
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// JSON description of the context, its nodes and connections
    pub fn snapshot(&self) -> Value {
        let nodes: Vec<Value> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.node.as_ref().map(|node| {
                    json!({
                        "id": index,
                        "generation": slot.generation,
                        "type": node.node_type(),
                        "params": node.get_params(),
                    })
                })
            })
            .collect();

        json!({
            "state": self.state,
            "sample_rate": self.sample_rate,
            "current_time": self.current_time(),
            "nodes": nodes,
            "edges": self.edges,
        })
    }
}

impl fmt::Debug for AudioGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioGraph")
            .field("sample_rate", &self.sample_rate)
            .field("state", &self.state)
            .field("nodes", &self.node_count())
            .field("edges", &self.edges.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
