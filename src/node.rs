//! Node records stored in the graph arena.
//!
//! A node is declared with a name, a parent, a component kind and an
//! immutable config. Its runtime instance is created lazily the first time it
//! is instantiated, after which the same instance is returned forever.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::component::{Component, ComponentKind, Config};
use crate::edge::EdgeSlot;
use crate::types::{EdgeId, NodeId};

/// Instantiation state of a node.
#[derive(Clone, Default)]
pub enum Lifecycle {
    /// Declared but never instantiated
    #[default]
    Declared,
    /// Constructor currently running; seeing this again means a cycle
    Constructing,
    /// Instance built and cached
    Constructed(Arc<dyn Component>),
}

impl Lifecycle {
    /// Short state name, used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Lifecycle::Declared => "declared",
            Lifecycle::Constructing => "constructing",
            Lifecycle::Constructed(_) => "constructed",
        }
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Named edge slots in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Slots {
    entries: Vec<(String, EdgeSlot)>,
}

impl Slots {
    /// Attaches an edge to `attr`, creating the slot or promoting it to a list.
    pub fn attach(&mut self, attr: &str, id: EdgeId) {
        match self.entries.iter_mut().find(|(name, _)| name == attr) {
            Some((_, slot)) => slot.attach(id),
            None => self.entries.push((attr.to_string(), EdgeSlot::One(id))),
        }
    }

    /// Returns the slot named `attr`.
    pub fn get(&self, attr: &str) -> Option<&EdgeSlot> {
        self.entries
            .iter()
            .find(|(name, _)| name == attr)
            .map(|(_, slot)| slot)
    }

    /// Iterates slots in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EdgeSlot)> {
        self.entries.iter().map(|(name, slot)| (name.as_str(), slot))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A node in the graph store.
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: ComponentKind,
    pub(crate) config: Config,
    pub(crate) children: Vec<NodeId>,
    pub(crate) child_index: HashMap<String, NodeId>,
    pub(crate) inputs: Slots,
    pub(crate) outputs: Slots,
    pub(crate) state: Mutex<Lifecycle>,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        name: impl Into<String>,
        path: impl Into<String>,
        parent: Option<NodeId>,
        kind: ComponentKind,
        config: Config,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            path: path.into(),
            parent,
            kind,
            config,
            children: Vec::new(),
            child_index: HashMap::new(),
            inputs: Slots::default(),
            outputs: Slots::default(),
            state: Mutex::new(Lifecycle::Declared),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path; `""` for the root.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Looks up a direct child by name.
    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.child_index.get(name).copied()
    }

    /// Edges arriving at this node, keyed by destination attribute.
    pub fn inputs(&self) -> &Slots {
        &self.inputs
    }

    /// Edges leaving this node, keyed by source attribute.
    pub fn outputs(&self) -> &Slots {
        &self.outputs
    }

    /// Returns true once the node has a cached instance.
    pub fn is_constructed(&self) -> bool {
        matches!(*self.state.lock(), Lifecycle::Constructed(_))
    }

    /// Returns a snapshot of the lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lock().clone()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("children", &self.children.len())
            .field("state", &*self.state.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_accessors() {
        let node = Node::new(
            NodeId(3),
            "pbus",
            "/soc/pbus",
            Some(NodeId(1)),
            ComponentKind::BusMatrix,
            Config::new(),
        );

        assert_eq!(node.id(), NodeId(3));
        assert_eq!(node.name(), "pbus");
        assert_eq!(node.path(), "/soc/pbus");
        assert_eq!(node.parent(), Some(NodeId(1)));
        assert_eq!(node.kind(), ComponentKind::BusMatrix);
        assert!(node.children().is_empty());
        assert!(!node.is_constructed());
        assert_eq!(node.lifecycle().label(), "declared");
    }

    #[test]
    fn test_slots_promote_in_place() {
        let mut slots = Slots::default();
        slots.attach("slaves", EdgeId(0));
        slots.attach("clk", EdgeId(1));
        slots.attach("slaves", EdgeId(2));

        let names: Vec<&str> = slots.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["slaves", "clk"]);
        assert_eq!(slots.get("slaves").unwrap().ids(), vec![EdgeId(0), EdgeId(2)]);
        assert!(!slots.get("clk").unwrap().is_list());
        assert!(slots.get("masters").is_none());
    }
}
