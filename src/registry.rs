//! Component constructor registry.
//!
//! The registry maps each [`ComponentKind`] to the constructor
//! [`Graph::instantiate`](crate::graph::Graph::instantiate) calls the first
//! time a node of that kind is needed. Tests can swap in their own
//! constructors by building a registry by hand.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use socgraph::component::{ComponentKind, Root};
//! use socgraph::registry::ComponentRegistry;
//!
//! let mut registry = ComponentRegistry::new();
//! registry.register(ComponentKind::Root, |_graph, params| {
//!     Ok(Arc::new(Root::new(params.path)))
//! });
//! assert!(registry.contains(ComponentKind::Root));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::bus::BusMatrix;
use crate::component::{Component, ComponentKind, ConstructParams, Root};
use crate::components::clock::Clock;
use crate::components::cpu::Cpu;
use crate::components::dma::Dma;
use crate::components::fifo_sink::FifoSink;
use crate::components::flag::Flag;
use crate::components::memory::Memory;
use crate::components::peripheral::StatusPeripheral;
use crate::components::synchronize::Synchronize;
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::storage::fifo::FifoComponent;
use crate::storage::ram::Ram;

/// Type alias for component constructors.
pub type ComponentFactory =
    Arc<dyn Fn(&Graph, ConstructParams) -> GraphResult<Arc<dyn Component>> + Send + Sync>;

/// A registry of component constructors keyed by kind.
#[derive(Default)]
pub struct ComponentRegistry {
    factories: HashMap<ComponentKind, ComponentFactory>,
}

impl ComponentRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the constructor for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: ComponentKind, factory: F)
    where
        F: Fn(&Graph, ConstructParams) -> GraphResult<Arc<dyn Component>> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
    }

    /// Runs the constructor registered for `params.kind`.
    pub fn create(&self, graph: &Graph, params: ConstructParams) -> GraphResult<Arc<dyn Component>> {
        let factory = self
            .factories
            .get(&params.kind)
            .ok_or(GraphError::UnregisteredKind(params.kind))?;
        factory(graph, params)
    }

    /// Returns true if a constructor is registered for `kind`.
    pub fn contains(&self, kind: ComponentKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Returns the number of registered kinds.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if no kinds are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Unregisters a kind.
    pub fn unregister(&mut self, kind: ComponentKind) -> bool {
        self.factories.remove(&kind).is_some()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("ComponentRegistry")
            .field("registered_kinds", &kinds)
            .finish()
    }
}

/// Creates a registry with a constructor for every built-in kind.
pub fn create_default_registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();

    registry.register(ComponentKind::Root, |_, params| Ok(Arc::new(Root::new(params.path))));
    registry.register(ComponentKind::Clock, |graph, params| {
        Ok(Clock::construct(graph, params)?)
    });
    registry.register(ComponentKind::Flag, |graph, params| {
        Ok(Flag::construct(graph, params)?)
    });
    registry.register(ComponentKind::BusMatrix, |graph, params| {
        Ok(BusMatrix::construct(graph, params)?)
    });
    registry.register(ComponentKind::Memory, |graph, params| {
        Ok(Memory::construct(graph, params)?)
    });
    registry.register(ComponentKind::Ram, |graph, params| {
        Ok(Ram::construct(graph, params)?)
    });
    registry.register(ComponentKind::Fifo, |graph, params| {
        Ok(FifoComponent::construct(graph, params)?)
    });
    registry.register(ComponentKind::StatusPeripheral, |graph, params| {
        Ok(StatusPeripheral::construct(graph, params)?)
    });
    registry.register(ComponentKind::Dma, |graph, params| {
        Ok(Dma::construct(graph, params)?)
    });
    registry.register(ComponentKind::Cpu, |graph, params| {
        Ok(Cpu::construct(graph, params)?)
    });
    registry.register(ComponentKind::FifoSink, |graph, params| {
        Ok(FifoSink::construct(graph, params)?)
    });
    registry.register(ComponentKind::Synchronize, |graph, params| {
        Ok(Synchronize::construct(graph, params)?)
    });

    registry
}
