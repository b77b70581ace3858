//! Wiring edges between component accessors and input slots.
//!
//! An edge connects `(from node, from attribute)` to `(to node, to attribute)`.
//! The source attribute names an accessor on the source component; the
//! destination attribute names an input slot that the destination's
//! constructor reads. Edges are typed by the [`PortKind`] they carry and are
//! checked against both components' port tables when they are added.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bus::{BusMatrix, Slave};
use crate::component::{Port, PortKind};
use crate::components::clock::ClockSpec;
use crate::components::flag::SignalLine;
use crate::error::{GraphError, GraphResult};
use crate::executor::Master;
use crate::graph::Graph;
use crate::storage::fifo::FifoHandle;
use crate::storage::ram::RamPort;
use crate::types::{EdgeId, NodeId};

/// Keyword overrides carried by an edge and forwarded to the source accessor.
///
/// Accessors use `name` and `prefix` to label the signal or port they hand
/// out (`prefix + "led"`, or an explicit `name`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl EdgeParams {
    /// Params with an explicit signal name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            prefix: None,
        }
    }

    /// Params with a signal-name prefix.
    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            name: None,
            prefix: Some(prefix.into()),
        }
    }

    /// Merges `overrides` on top of `self`; fields set in `overrides` win.
    pub fn merged(&self, overrides: &EdgeParams) -> EdgeParams {
        EdgeParams {
            name: overrides.name.clone().or_else(|| self.name.clone()),
            prefix: overrides.prefix.clone().or_else(|| self.prefix.clone()),
        }
    }

    /// Resolves the label an accessor should use for its output.
    ///
    /// An explicit `name` wins; otherwise `prefix + default`.
    pub fn label(&self, default: &str) -> String {
        match (&self.name, &self.prefix) {
            (Some(name), _) => name.clone(),
            (None, Some(prefix)) => format!("{prefix}{default}"),
            (None, None) => default.to_string(),
        }
    }

    /// Returns true if no override is set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.prefix.is_none()
    }
}

/// A parsed `<path>#<attribute>` reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRef {
    pub path: String,
    pub attr: String,
}

impl NodeRef {
    /// Parses a `<path>#<attribute>` reference.
    pub fn parse(reference: &str) -> GraphResult<Self> {
        match reference.split_once('#') {
            Some((path, attr)) if !attr.is_empty() && !attr.contains('#') => Ok(Self {
                path: path.to_string(),
                attr: attr.to_string(),
            }),
            _ => Err(GraphError::MalformedReference(reference.to_string())),
        }
    }

    /// Formats a node path and attribute as a reference string.
    pub fn format(path: &str, attr: &str) -> String {
        format!("{path}#{attr}")
    }
}

/// A wire between two nodes, owned by the graph store's edge table.
#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub kind: PortKind,
    pub from: NodeId,
    pub from_attr: String,
    pub to: NodeId,
    pub to_attr: String,
    pub params: EdgeParams,
}

impl Edge {
    /// Returns the resolved, invocable form of this edge.
    pub fn wire(&self) -> Wire {
        Wire {
            edge: self.id,
            kind: self.kind,
            from: self.from,
            from_attr: self.from_attr.clone(),
            params: self.params.clone(),
        }
    }
}

/// The contents of one input or output slot.
///
/// A slot starts as a single edge and is promoted to an ordered list when a
/// second edge is attached. Edges are never dropped or reordered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EdgeSlot {
    One(EdgeId),
    Many(Vec<EdgeId>),
}

impl EdgeSlot {
    /// Attaches another edge, promoting a single edge to a list.
    pub fn attach(&mut self, id: EdgeId) {
        match self {
            EdgeSlot::One(first) => *self = EdgeSlot::Many(vec![*first, id]),
            EdgeSlot::Many(list) => list.push(id),
        }
    }

    /// Edge ids in attachment order.
    pub fn ids(&self) -> Vec<EdgeId> {
        match self {
            EdgeSlot::One(id) => vec![*id],
            EdgeSlot::Many(list) => list.clone(),
        }
    }

    /// Number of attached edges.
    pub fn len(&self) -> usize {
        match self {
            EdgeSlot::One(_) => 1,
            EdgeSlot::Many(list) => list.len(),
        }
    }

    /// Always false; a slot exists only once an edge is attached.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns true if the slot has been promoted to a list.
    pub fn is_list(&self) -> bool {
        matches!(self, EdgeSlot::Many(_))
    }
}

/// An edge resolved into a callable reference to the source accessor.
///
/// Invoking a wire instantiates the source node if needed and calls the
/// named accessor with the edge's params merged under the caller's.
#[derive(Clone, Debug, PartialEq)]
pub struct Wire {
    pub edge: EdgeId,
    pub kind: PortKind,
    pub from: NodeId,
    pub from_attr: String,
    pub params: EdgeParams,
}

impl Wire {
    /// Invokes the source accessor with caller `overrides` taking precedence.
    pub fn invoke(&self, graph: &Graph, overrides: &EdgeParams) -> GraphResult<Port> {
        let component = graph.instantiate(self.from)?;
        let port = component.accessor(&self.from_attr, &self.params.merged(overrides))?;
        if port.kind() != self.kind {
            return Err(GraphError::PortMismatch {
                path: graph.node(self.from).path().to_string(),
                attr: self.from_attr.clone(),
                expected: self.kind,
                actual: port.kind(),
            });
        }
        Ok(port)
    }

    /// Invokes the source accessor with the stored params only.
    pub fn call(&self, graph: &Graph) -> GraphResult<Port> {
        self.invoke(graph, &EdgeParams::default())
    }

    fn mismatch(&self, graph: &Graph, expected: PortKind, actual: PortKind) -> GraphError {
        GraphError::PortMismatch {
            path: graph.node(self.from).path().to_string(),
            attr: self.from_attr.clone(),
            expected,
            actual,
        }
    }

    pub fn clock(&self, graph: &Graph) -> GraphResult<ClockSpec> {
        match self.call(graph)? {
            Port::Clock(spec) => Ok(spec),
            other => Err(self.mismatch(graph, PortKind::Clock, other.kind())),
        }
    }

    pub fn signal(&self, graph: &Graph) -> GraphResult<SignalLine> {
        match self.call(graph)? {
            Port::Signal(line) => Ok(line),
            other => Err(self.mismatch(graph, PortKind::Signal, other.kind())),
        }
    }

    pub fn bus(&self, graph: &Graph) -> GraphResult<Arc<BusMatrix>> {
        match self.call(graph)? {
            Port::Bus(bus) => Ok(bus),
            other => Err(self.mismatch(graph, PortKind::Bus, other.kind())),
        }
    }

    pub fn slave(&self, graph: &Graph) -> GraphResult<Arc<dyn Slave>> {
        match self.call(graph)? {
            Port::Slave(slave) => Ok(slave),
            other => Err(self.mismatch(graph, PortKind::Slave, other.kind())),
        }
    }

    pub fn master(&self, graph: &Graph) -> GraphResult<Box<dyn Master>> {
        match self.call(graph)? {
            Port::Master(master) => Ok(master),
            other => Err(self.mismatch(graph, PortKind::Master, other.kind())),
        }
    }

    pub fn fifo(&self, graph: &Graph) -> GraphResult<FifoHandle> {
        match self.call(graph)? {
            Port::Fifo(fifo) => Ok(fifo),
            other => Err(self.mismatch(graph, PortKind::Fifo, other.kind())),
        }
    }

    pub fn ram_port(&self, graph: &Graph) -> GraphResult<RamPort> {
        match self.call(graph)? {
            Port::RamPort(port) => Ok(port),
            other => Err(self.mismatch(graph, PortKind::RamPort, other.kind())),
        }
    }
}
