//! Single boolean lines: the status LED, the DMA ready flag.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::component::{unknown_port, Component, ComponentKind, ConstructParams, Port};
use crate::edge::EdgeParams;
use crate::error::GraphResult;
use crate::graph::Graph;

/// Config of a `Flag` node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagConfig {
    #[serde(default)]
    pub default: bool,
}

/// A named handle on a shared boolean line.
///
/// Every handle to the same flag sees the same value; only the name differs
/// per consumer.
#[derive(Clone)]
pub struct SignalLine {
    name: String,
    value: Arc<AtomicBool>,
}

impl SignalLine {
    /// Creates a standalone line.
    pub fn new(name: impl Into<String>, value: bool) -> Self {
        Self {
            name: name.into(),
            value: Arc::new(AtomicBool::new(value)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> bool {
        self.value.load(Ordering::Relaxed)
    }

    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Another handle on the same line, under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Arc::clone(&self.value),
        }
    }

    /// Returns true if both handles drive the same line.
    pub fn same_line(&self, other: &SignalLine) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for SignalLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.get())
    }
}

impl PartialEq for SignalLine {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.same_line(other)
    }
}

/// The `Flag` component.
#[derive(Debug)]
pub struct Flag {
    path: String,
    default: bool,
    line: SignalLine,
}

impl Flag {
    pub fn construct(_graph: &Graph, params: ConstructParams) -> GraphResult<Arc<Self>> {
        let config: FlagConfig = params.config()?;
        let name = params.path.rsplit('/').next().unwrap_or_default().to_string();
        Ok(Arc::new(Self {
            line: SignalLine::new(name, config.default),
            default: config.default,
            path: params.path,
        }))
    }

    /// Declares a flag node. Returns its path.
    pub fn declare(graph: &mut Graph, parent: &str, name: &str, default: bool) -> GraphResult<String> {
        let id = graph.add_node(parent, name, ComponentKind::Flag, json!({ "default": default }))?;
        Ok(graph.path_of(id).to_string())
    }

    pub fn get(&self) -> bool {
        self.line.get()
    }

    pub fn set(&self, value: bool) {
        self.line.set(value);
    }

    /// Restores the configured default.
    pub fn reset(&self) {
        self.line.set(self.default);
    }
}

impl Component for Flag {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Flag
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn accessor(self: Arc<Self>, attr: &str, params: &EdgeParams) -> GraphResult<Port> {
        match attr {
            "signals" => Ok(Port::Signal(self.line.renamed(params.label(self.line.name())))),
            _ => Err(unknown_port(&self.path, ComponentKind::Flag, attr, "output")),
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
