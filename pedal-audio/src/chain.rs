//! Ordered effect chain with an explicit routing table
//!
//! The chain is a source, an ordered list of nodes and a sink. Signal flow
//! is described by [`Edge`]s between [`Port`]s and rebuilt from the node
//! order after every structural change:
//!
//! ```text
//! Source -> in(A)   out(A) -> in(B)   out(B) -> Sink
//! ```
//!
//! Processing walks the table and sums every edge into its destination, so
//! the table must never hold the same connection twice.

use std::fmt;

use crate::context::AudioGraphContext;
use crate::error::{PedalError, Result};
use crate::io::{Silence, SignalSource};
use crate::node::{EffectNode, NodeId};

/// Nodes the chain can hold without reallocating on the audio thread
pub const MAX_NODES: usize = 32;

/// Endpoint of a routing edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    Source,
    NodeInput(NodeId),
    NodeOutput(NodeId),
    Sink,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Source => write!(f, "source"),
            Port::NodeInput(id) => write!(f, "in({})", id),
            Port::NodeOutput(id) => write!(f, "out({})", id),
            Port::Sink => write!(f, "sink"),
        }
    }
}

/// A connection summed from one port into another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: Port,
    pub to: Port,
}

impl Edge {
    pub fn new(from: Port, to: Port) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

pub struct EffectChain {
    nodes: Vec<Box<EffectNode>>,
    source: Box<dyn SignalSource>,
    edges: Vec<Edge>,

    // Per-block scratch, preallocated
    rendered: Vec<bool>,
    source_port: Vec<f32>,
    sink_port: Vec<f32>,
    transfer: Vec<f32>,
}

impl EffectChain {
    /// Empty chain fed by silence
    pub fn new(ctx: &AudioGraphContext) -> Self {
        let block = ctx.block_size();
        let mut chain = Self {
            nodes: Vec::with_capacity(MAX_NODES),
            source: Box::new(Silence),
            edges: Vec::with_capacity(MAX_NODES + 1),
            rendered: Vec::with_capacity(MAX_NODES),
            source_port: vec![0.0; block],
            sink_port: vec![0.0; block],
            transfer: vec![0.0; block],
        };
        chain.rebuild_topology();
        chain
    }

    /// Append a node at the end of the chain
    ///
    /// Torn-down nodes and ids already present are rejected. Nodes stay boxed
    /// so moving them in and out never allocates.
    pub fn add_effect(&mut self, node: impl Into<Box<EffectNode>>) -> Result<()> {
        let node = node.into();
        if node.is_torn_down() {
            return Err(PedalError::DetachedNode(node.id()));
        }
        if self.index_of(node.id()).is_some() {
            return Err(PedalError::DuplicateNode(node.id()));
        }
        self.nodes.push(node);
        self.rebuild_topology();
        Ok(())
    }

    /// Detach and tear down a node, handing it back to the caller
    pub fn remove_effect(&mut self, id: NodeId) -> Result<Box<EffectNode>> {
        let index = self.index_of(id).ok_or(PedalError::UnknownNode(id))?;
        let mut node = self.nodes.remove(index);
        node.disconnect();
        self.rebuild_topology();
        Ok(node)
    }

    /// Move the node at position `from` to position `to`
    pub fn move_effect(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.nodes.len();
        if from >= len || to >= len {
            return Err(PedalError::InvalidMove { from, to, len });
        }
        if from != to {
            let node = self.nodes.remove(from);
            self.nodes.insert(to, node);
        }
        self.rebuild_topology();
        Ok(())
    }

    /// Swap the active source; the previous one is returned
    pub fn set_source(&mut self, mut source: Box<dyn SignalSource>) -> Box<dyn SignalSource> {
        source.start();
        let mut previous = std::mem::replace(&mut self.source, source);
        previous.stop();
        self.rebuild_topology();
        previous
    }

    /// Re-derive the external edges from the node order
    ///
    /// Idempotent: calling it twice yields the same table.
    pub fn rebuild_topology(&mut self) {
        self.edges.clear();
        let mut from = Port::Source;
        for node in &self.nodes {
            self.edges.push(Edge::new(from, Port::NodeInput(node.id())));
            from = Port::NodeOutput(node.id());
        }
        self.edges.push(Edge::new(from, Port::Sink));
        self.rendered.clear();
        self.rendered.resize(self.nodes.len(), false);
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Node ids in signal order
    pub fn order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|n| n.id())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &EffectNode> + '_ {
        self.nodes.iter().map(|n| n.as_ref())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn source(&self) -> &dyn SignalSource {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> &mut dyn SignalSource {
        self.source.as_mut()
    }

    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id() == id)
    }

    pub fn node(&self, id: NodeId) -> Option<&EffectNode> {
        self.nodes.iter().find(|n| n.id() == id).map(|n| n.as_ref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut EffectNode> {
        self.nodes.iter_mut().find(|n| n.id() == id).map(|n| n.as_mut())
    }

    /// Forward a knob change; returns whether the node knows the name
    pub fn update_parameter(
        &mut self,
        id: NodeId,
        name: &str,
        value: f32,
        ctx: &AudioGraphContext,
    ) -> Result<bool> {
        let node = self.node_mut(id).ok_or(PedalError::UnknownNode(id))?;
        Ok(node.update_parameter(name, value, ctx))
    }

    pub fn set_mix(&mut self, id: NodeId, mix: f32, ctx: &AudioGraphContext) -> Result<()> {
        let node = self.node_mut(id).ok_or(PedalError::UnknownNode(id))?;
        node.set_mix(mix, ctx);
        Ok(())
    }

    pub fn toggle_bypass(&mut self, id: NodeId, ctx: &AudioGraphContext) -> Result<bool> {
        let node = self.node_mut(id).ok_or(PedalError::UnknownNode(id))?;
        Ok(node.toggle_bypass(ctx))
    }

    /// Render `out.len()` samples through the routing table
    pub fn process(&mut self, ctx: &AudioGraphContext, out: &mut [f32]) {
        let block = self.source_port.len();
        for chunk in out.chunks_mut(block) {
            self.process_block(ctx, chunk);
        }
    }

    fn process_block(&mut self, ctx: &AudioGraphContext, out: &mut [f32]) {
        let n = out.len();
        self.source.fill(&mut self.source_port[..n], ctx);
        for node in &mut self.nodes {
            node.input_port_mut()[..n].fill(0.0);
        }
        self.sink_port[..n].fill(0.0);
        self.rendered.iter_mut().for_each(|r| *r = false);

        for e in 0..self.edges.len() {
            let edge = self.edges[e];

            // Edges are in signal order, so a node's inputs are complete
            // by the time its output is first read
            match edge.from {
                Port::Source => self.transfer[..n].copy_from_slice(&self.source_port[..n]),
                Port::NodeOutput(id) => {
                    let Some(index) = self.index_of(id) else {
                        continue;
                    };
                    if !self.rendered[index] {
                        self.nodes[index].render(n, ctx);
                        self.rendered[index] = true;
                    }
                    self.transfer[..n].copy_from_slice(&self.nodes[index].output_port()[..n]);
                }
                Port::NodeInput(_) | Port::Sink => continue,
            }

            let destination = match edge.to {
                Port::NodeInput(id) => match self.index_of(id) {
                    Some(index) => &mut self.nodes[index].input_port_mut()[..n],
                    None => continue,
                },
                Port::Sink => &mut self.sink_port[..n],
                Port::Source | Port::NodeOutput(_) => continue,
            };
            for (d, s) in destination.iter_mut().zip(&self.transfer[..n]) {
                *d += *s;
            }
        }

        out.copy_from_slice(&self.sink_port[..n]);
    }

    /// Tear down every node in place (engine shutdown)
    pub fn disconnect_all(&mut self) {
        for node in &mut self.nodes {
            node.disconnect();
        }
        self.source.stop();
    }
}

impl fmt::Debug for EffectChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectChain")
            .field("nodes", &self.nodes)
            .field("source", &self.source.label())
            .field("edges", &self.edges)
            .finish()
    }
}
