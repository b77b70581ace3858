//! # socgraph
//!
//! A component-graph simulator for small systems-on-chip: clocks, flags,
//! memories, FIFOs, a bus matrix with lock-based arbitration and a DMA
//! channel, wired together as a tree of named nodes.
//!
//! ## Design Principles
//!
//! - **Graph-Driven**: Components are declared as nodes in a path-addressed
//!   tree and wired by typed edges from accessors to input slots. The graph
//!   is the source of truth; instances are built lazily on first use.
//! - **Closed Component Set**: Every node has a [`ComponentKind`] whose port
//!   table and typed config are checked while the graph is declared.
//! - **Transaction-Level Bus**: Each bus transfer walks the
//!   setup/enable/wait/complete phases against the addressed slave and
//!   advances a single bus timeline.
//! - **Lock-Aware Arbitration**: Masters are stepped round-robin; a master
//!   holding the bus lock is stepped again until it releases it.
//!
//! ## Quick Start
//!
//! ```rust
//! use socgraph::components::{Dma, DmaRegisters, Memory};
//! use socgraph::{ComponentKind, Graph, Simulation};
//! use serde_json::json;
//!
//! let mut graph = Graph::new();
//! graph
//!     .add_node("", "bus", ComponentKind::BusMatrix, json!({"address_mask": 0xffff}))
//!     .unwrap();
//! Memory::declare(&mut graph, "", "mem", "/bus", Memory::config(32, 64)).unwrap();
//! Dma::declare(&mut graph, "", "dma", "/bus", None).unwrap();
//!
//! let mem = graph.instance_as::<Memory>("/mem").unwrap();
//! mem.load(0, &[1, 2, 3]);
//! graph.instance_as::<Dma>("/dma").unwrap().program(DmaRegisters {
//!     src_addr: 0x0,
//!     src_incr: 4,
//!     dest_addr: 0x80,
//!     dest_incr: 4,
//!     count: 3,
//! });
//!
//! let mut sim = Simulation::new(graph, "/bus").unwrap();
//! sim.run(10).unwrap();
//! assert_eq!(mem.peek(0x20), Some(1));
//! assert_eq!(mem.peek(0x22), Some(3));
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use socgraph::{Simulation, SystemConfig};
//!
//! let config = SystemConfig::from_file("soc.yaml")?;
//! let mut sim = Simulation::from_config(&config)?;
//! sim.run_configured()?;
//! ```

pub mod types;
pub mod error;
pub mod component;
pub mod node;
pub mod edge;
pub mod graph;
pub mod snapshot;
pub mod registry;
pub mod storage;
pub mod bus;
pub mod executor;
pub mod components;
pub mod event;
pub mod stats;
pub mod config;
pub mod engine;

// Re-export commonly used types
pub use types::{Address, EdgeId, NodeId, SimTime, Word};
pub use error::{BusError, BusResult, GraphError, GraphResult, SimError, SimResult};
pub use component::{Component, ComponentKind, ConstructParams, Port, PortKind};
pub use node::{Lifecycle, Node};
pub use edge::{Edge, EdgeParams, NodeRef, Wire};
pub use graph::Graph;
pub use snapshot::SnapshotRecord;
pub use registry::{create_default_registry, ComponentRegistry};
pub use storage::{DualPortRam, Fifo, FifoComponent, Ram, RamPort};
pub use bus::{BusMatrix, BusSignals, Direction, Phase, Slave, Transaction};
pub use executor::{Arbiter, ClockDomain, Clocked, Master, MasterStep};
pub use event::{BusEvent, BusEventKind};
pub use config::{ConfigError, ConfigResult, SystemConfig, SystemConfigBuilder};
pub use engine::Simulation;
pub use stats::{ArbiterStats, BusStats, SimulationStats, StatsCollector};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// overrides `level` when set. Does nothing if a global subscriber is
/// already installed.
///
/// # Example
///
/// ```rust,ignore
/// socgraph::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    try_init_logging(level);
}

/// Like [`init_logging`], but reports whether this call installed the
/// subscriber.
pub fn try_init_logging(level: &str) -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok()
}
