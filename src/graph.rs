//! The graph store: a rooted tree of component nodes plus wiring edges.
//!
//! Nodes live in an arena indexed by [`NodeId`]; the root is always
//! `NodeId(0)` with path `""`. Edges live in a separate table and refer to
//! nodes by id, so nothing in the store owns anything else.
//!
//! Construction is lazy. [`Graph::instantiate`] builds a node's component the
//! first time it is asked for and caches it, handing constructors the node's
//! input slots as [`Wire`](crate::edge::Wire)s they can invoke now or keep for later.
//!
//! ```
//! use socgraph::component::{ComponentKind, PortKind};
//! use socgraph::edge::EdgeParams;
//! use socgraph::graph::Graph;
//! use serde_json::json;
//!
//! let mut graph = Graph::new();
//! graph.add_node("", "clk", ComponentKind::Clock, json!({"freq": 10e6})).unwrap();
//! graph.add_node("", "bus", ComponentKind::BusMatrix, json!({"address_mask": 0xff})).unwrap();
//! graph
//!     .add_edge(PortKind::Clock, "/clk#out", "/bus#clk", EdgeParams::default())
//!     .unwrap();
//!
//! let a = graph.instance("/bus").unwrap();
//! let b = graph.instance("/bus").unwrap();
//! assert!(std::sync::Arc::ptr_eq(&a, &b));
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::component::{Component, ComponentKind, Config, ConstructParams, Input, Inputs, PortKind};
use crate::edge::{Edge, EdgeParams, EdgeSlot, NodeRef};
use crate::error::{GraphError, GraphResult};
use crate::node::{Lifecycle, Node};
use crate::registry::{create_default_registry, ComponentRegistry};
use crate::types::{EdgeId, NodeId};

/// The component graph store.
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    registry: ComponentRegistry,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Creates a graph with only the root node and the default registry.
    pub fn new() -> Self {
        Self::with_registry(create_default_registry())
    }

    /// Creates a graph that constructs components through `registry`.
    pub fn with_registry(registry: ComponentRegistry) -> Self {
        let root = Node::new(NodeId::ROOT, "", "", None, ComponentKind::Root, Config::new());
        Self {
            nodes: vec![root],
            edges: Vec::new(),
            registry,
        }
    }

    /// Returns the registry used by [`instantiate`](Self::instantiate).
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Returns the node with the given id.
    ///
    /// Ids are only handed out by this graph, so they are always in range.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Returns the edge with the given id.
    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.index()]
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root node exists from the start.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All edges in creation order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Absolute path of a node.
    pub fn path_of(&self, id: NodeId) -> &str {
        self.node(id).path()
    }

    /// Resolves a `/`-separated path to a node id.
    ///
    /// Empty and `.` segments are skipped, `..` moves to the parent. Paths are
    /// always resolved from the root.
    pub fn resolve_path(&self, path: &str) -> GraphResult<NodeId> {
        let mut current = NodeId::ROOT;
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    current = self.node(current).parent().ok_or_else(|| GraphError::Path {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    })?;
                }
                name => {
                    current = self.node(current).child(name).ok_or_else(|| GraphError::Path {
                        path: path.to_string(),
                        segment: name.to_string(),
                    })?;
                }
            }
        }
        Ok(current)
    }

    /// Resolves a path and returns the node.
    pub fn node_at(&self, path: &str) -> GraphResult<&Node> {
        self.resolve_path(path).map(|id| self.node(id))
    }

    /// Declares a node under `parent_path`.
    ///
    /// `config` must be a JSON object (or `null` for an empty config) that
    /// deserializes into the kind's config struct.
    pub fn add_node(
        &mut self,
        parent_path: &str,
        name: &str,
        kind: ComponentKind,
        config: serde_json::Value,
    ) -> GraphResult<NodeId> {
        let reserved = name.is_empty() || name == "." || name == "..";
        if reserved || name.contains(|c| c == '/' || c == '#') {
            return Err(GraphError::InvalidName(name.to_string()));
        }
        let parent = self.resolve_path(parent_path)?;
        let parent_node = self.node(parent);
        if parent_node.child(name).is_some() {
            return Err(GraphError::DuplicateName {
                parent: parent_node.path().to_string(),
                name: name.to_string(),
            });
        }
        let path = format!("{}/{}", parent_node.path(), name);

        let config = match config {
            serde_json::Value::Null => Config::new(),
            serde_json::Value::Object(map) => map,
            other => {
                return Err(GraphError::InvalidConfig {
                    path,
                    kind,
                    message: format!("expected an object, got {other}"),
                })
            }
        };
        kind.validate_config(&path, &config)?;

        let id = NodeId(self.nodes.len());
        debug!(node = %path, ?kind, "declared node");
        self.nodes
            .push(Node::new(id, name, path, Some(parent), kind, config));
        let parent_node = &mut self.nodes[parent.index()];
        parent_node.children.push(id);
        parent_node.child_index.insert(name.to_string(), id);
        Ok(id)
    }

    /// Wires `from` (`<path>#<accessor>`) into `to` (`<path>#<input>`).
    ///
    /// Both ends are checked against their kinds' port tables. A second edge
    /// into the same slot promotes the slot to an ordered list.
    pub fn add_edge(
        &mut self,
        kind: PortKind,
        from: &str,
        to: &str,
        params: EdgeParams,
    ) -> GraphResult<EdgeId> {
        let from_ref = NodeRef::parse(from)?;
        let to_ref = NodeRef::parse(to)?;
        let from_id = self.resolve_path(&from_ref.path)?;
        let to_id = self.resolve_path(&to_ref.path)?;

        let source = self.node(from_id);
        let produced = source.kind().output_port(&from_ref.attr).ok_or_else(|| {
            GraphError::UnknownPort {
                path: source.path().to_string(),
                kind: source.kind(),
                attr: from_ref.attr.clone(),
                direction: "output",
            }
        })?;
        if produced != kind {
            return Err(GraphError::PortMismatch {
                path: source.path().to_string(),
                attr: from_ref.attr,
                expected: kind,
                actual: produced,
            });
        }

        let dest = self.node(to_id);
        let accepted = dest.kind().input_port(&to_ref.attr).ok_or_else(|| {
            GraphError::UnknownPort {
                path: dest.path().to_string(),
                kind: dest.kind(),
                attr: to_ref.attr.clone(),
                direction: "input",
            }
        })?;
        if accepted.port != kind {
            return Err(GraphError::PortMismatch {
                path: dest.path().to_string(),
                attr: to_ref.attr,
                expected: accepted.port,
                actual: kind,
            });
        }

        let id = EdgeId(self.edges.len());
        debug!(from, to, ?kind, "added edge");
        self.nodes[from_id.index()].outputs.attach(&from_ref.attr, id);
        self.nodes[to_id.index()].inputs.attach(&to_ref.attr, id);
        self.edges.push(Edge {
            id,
            kind,
            from: from_id,
            from_attr: from_ref.attr,
            to: to_id,
            to_attr: to_ref.attr,
            params,
        });
        Ok(id)
    }

    /// Like [`add_edge`](Self::add_edge), taking the edge kind from the
    /// source accessor.
    pub fn connect(&mut self, from: &str, to: &str, params: EdgeParams) -> GraphResult<EdgeId> {
        let from_ref = NodeRef::parse(from)?;
        let source = self.node_at(&from_ref.path)?;
        let kind = source.kind().output_port(&from_ref.attr).ok_or_else(|| {
            GraphError::UnknownPort {
                path: source.path().to_string(),
                kind: source.kind(),
                attr: from_ref.attr.clone(),
                direction: "output",
            }
        })?;
        self.add_edge(kind, from, to, params)
    }

    /// Returns the node's component, constructing it on first use.
    ///
    /// Subsequent calls return the same `Arc`. A node that is reached again
    /// while its own constructor is running fails with `ConstructionCycle`;
    /// a failed construction leaves the node `Declared`.
    pub fn instantiate(&self, id: NodeId) -> GraphResult<Arc<dyn Component>> {
        let node = self.node(id);
        {
            let mut state = node.state.lock();
            match &*state {
                Lifecycle::Constructed(component) => return Ok(Arc::clone(component)),
                Lifecycle::Constructing => {
                    return Err(GraphError::ConstructionCycle(node.path().to_string()))
                }
                Lifecycle::Declared => {}
            }
            *state = Lifecycle::Constructing;
        }

        let result = self.construct(node);
        let mut state = node.state.lock();
        match result {
            Ok(component) => {
                *state = Lifecycle::Constructed(Arc::clone(&component));
                Ok(component)
            }
            Err(e) => {
                *state = Lifecycle::Declared;
                Err(e)
            }
        }
    }

    fn construct(&self, node: &Node) -> GraphResult<Arc<dyn Component>> {
        for spec in node.kind().inputs() {
            if spec.required && node.inputs().get(spec.name).is_none() {
                return Err(GraphError::MissingInput {
                    path: node.path().to_string(),
                    attr: spec.name.to_string(),
                });
            }
        }

        let mut inputs = Inputs::new(node.path());
        for (attr, slot) in node.inputs().iter() {
            let input = match slot {
                EdgeSlot::One(id) => Input::One(self.edge(*id).wire()),
                EdgeSlot::Many(ids) => {
                    Input::Many(ids.iter().map(|id| self.edge(*id).wire()).collect())
                }
            };
            inputs.insert(attr, input);
        }

        trace!(node = %node.path(), inputs = inputs.len(), "constructing");
        let params = ConstructParams {
            node: node.id(),
            path: node.path().to_string(),
            kind: node.kind(),
            config: node.config().clone(),
            inputs,
        };
        let component = self.registry.create(self, params)?;
        debug!(node = %node.path(), kind = ?node.kind(), "constructed");
        Ok(component)
    }

    /// Instantiates the node at `path`.
    pub fn instance(&self, path: &str) -> GraphResult<Arc<dyn Component>> {
        self.instantiate(self.resolve_path(path)?)
    }

    /// Instantiates the node at `path` and downcasts it to `T`.
    pub fn instance_as<T: Any + Send + Sync>(&self, path: &str) -> GraphResult<Arc<T>> {
        let component = self.instance(path)?;
        let resolved = component.path().to_string();
        component
            .into_any()
            .downcast::<T>()
            .map_err(|_| GraphError::WrongInstanceType {
                path: resolved,
                expected: std::any::type_name::<T>(),
            })
    }

    /// Visits the subtree at `root_path` depth-first, pre-order, children in
    /// insertion order.
    pub fn traverse<F>(&self, root_path: &str, mut visitor: F, include_root: bool) -> GraphResult<()>
    where
        F: FnMut(&Node),
    {
        let start = self.resolve_path(root_path)?;
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if id != start || include_root {
                visitor(node);
            }
            stack.extend(node.children().iter().rev().copied());
        }
        Ok(())
    }

    /// Node ids of the subtree at `root_path` in traversal order.
    pub fn descendants(&self, root_path: &str, include_root: bool) -> GraphResult<Vec<NodeId>> {
        let mut ids = Vec::new();
        self.traverse(root_path, |node| ids.push(node.id()), include_root)?;
        Ok(ids)
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn small_graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_node("", "soc", ComponentKind::Root, json!(null)).unwrap();
        graph
            .add_node("/soc", "clk", ComponentKind::Clock, json!({"freq": 10e6}))
            .unwrap();
        graph
            .add_node("/soc", "led", ComponentKind::Flag, json!({}))
            .unwrap();
        graph
    }

    #[test]
    fn test_paths_join_parent_and_name() {
        let graph = small_graph();
        assert_eq!(graph.node_at("/soc/clk").unwrap().path(), "/soc/clk");
        assert_eq!(graph.node(NodeId::ROOT).path(), "");
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn test_resolve_path_segments() {
        let graph = small_graph();
        let clk = graph.resolve_path("/soc/clk").unwrap();
        assert_eq!(graph.resolve_path("soc/./clk").unwrap(), clk);
        assert_eq!(graph.resolve_path("/soc//clk/").unwrap(), clk);
        assert_eq!(graph.resolve_path("/soc/led/../clk").unwrap(), clk);
        assert_eq!(graph.resolve_path("").unwrap(), NodeId::ROOT);

        assert!(matches!(graph.resolve_path(".."), Err(GraphError::Path { .. })));
        let err = graph.resolve_path("/soc/nope").unwrap_err();
        assert_eq!(
            err,
            GraphError::Path {
                path: "/soc/nope".into(),
                segment: "nope".into()
            }
        );
    }

    #[test]
    fn test_duplicate_and_invalid_names() {
        let mut graph = small_graph();
        let err = graph
            .add_node("/soc", "clk", ComponentKind::Clock, json!({"freq": 1e6}))
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateName { .. }));

        assert!(matches!(
            graph.add_node("/soc", "a/b", ComponentKind::Flag, json!({})),
            Err(GraphError::InvalidName(_))
        ));
        assert!(matches!(
            graph.add_node("/missing", "x", ComponentKind::Flag, json!({})),
            Err(GraphError::Path { .. })
        ));
        assert!(matches!(
            graph.add_node("/soc", "x", ComponentKind::Flag, json!(3)),
            Err(GraphError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_add_edge_checks_port_tables() {
        let mut graph = small_graph();
        graph
            .add_node("/soc", "bus", ComponentKind::BusMatrix, json!({"address_mask": 0xff}))
            .unwrap();

        let err = graph
            .add_edge(PortKind::Clock, "/soc/clk#nope", "/soc/bus#clk", EdgeParams::default())
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownPort { direction: "output", .. }));

        let err = graph
            .add_edge(PortKind::Signal, "/soc/led#signals", "/soc/bus#clk", EdgeParams::default())
            .unwrap_err();
        assert!(matches!(err, GraphError::PortMismatch { .. }));

        let err = graph
            .add_edge(PortKind::Clock, "/soc/clk", "/soc/bus#clk", EdgeParams::default())
            .unwrap_err();
        assert!(matches!(err, GraphError::MalformedReference(_)));

        let id = graph
            .connect("/soc/clk#out", "/soc/bus#clk", EdgeParams::default())
            .unwrap();
        assert_eq!(graph.edge(id).kind, PortKind::Clock);
        assert!(graph.node_at("/soc/bus").unwrap().inputs().get("clk").is_some());
        assert!(graph.node_at("/soc/clk").unwrap().outputs().get("out").is_some());
    }

    #[test]
    fn test_traverse_preorder() {
        let mut graph = small_graph();
        graph
            .add_node("/soc/clk", "inner", ComponentKind::Flag, json!({}))
            .unwrap();
        graph.add_node("", "tail", ComponentKind::Flag, json!({})).unwrap();

        let mut seen = Vec::new();
        graph
            .traverse("", |node| seen.push(node.path().to_string()), false)
            .unwrap();
        assert_eq!(seen, vec!["/soc", "/soc/clk", "/soc/clk/inner", "/soc/led", "/tail"]);

        let mut sub = Vec::new();
        graph
            .traverse("/soc", |node| sub.push(node.name().to_string()), true)
            .unwrap();
        assert_eq!(sub, vec!["soc", "clk", "inner", "led"]);
    }

    #[test]
    fn test_instantiate_is_memoized() {
        let graph = small_graph();
        let id = graph.resolve_path("/soc/clk").unwrap();
        let a = graph.instantiate(id).unwrap();
        let b = graph.instantiate(id).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(graph.node(id).is_constructed());
    }

    #[test]
    fn test_missing_required_input() {
        let mut graph = small_graph();
        graph
            .add_node("/soc", "cpu", ComponentKind::Cpu, json!({"program": []}))
            .unwrap();
        let err = graph.instance("/soc/cpu").err().unwrap();
        assert!(matches!(err, GraphError::MissingInput { .. }));
        assert!(!graph.node_at("/soc/cpu").unwrap().is_constructed());
    }
}
