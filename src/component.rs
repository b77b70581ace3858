//! Component kinds, their port tables, and the `Component` trait.
//!
//! The set of component kinds is closed: every node declares one
//! [`ComponentKind`], and the kind fixes which accessors the node exposes
//! (outputs), which input slots its constructor reads, and which typed config
//! struct its `config` map must deserialize into. Edges and configs are
//! checked against these tables while the graph is being declared, so wiring
//! mistakes surface before any simulation runs.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::bus::{BusMatrix, BusMatrixConfig, Slave};
use crate::components::clock::{ClockConfig, ClockSpec};
use crate::components::cpu::CpuConfig;
use crate::components::dma::DmaConfig;
use crate::components::fifo_sink::FifoSinkConfig;
use crate::components::flag::{FlagConfig, SignalLine};
use crate::components::memory::MemoryConfig;
use crate::components::peripheral::PeripheralConfig;
use crate::components::synchronize::SynchronizeConfig;
use crate::edge::{EdgeParams, Wire};
use crate::error::{GraphError, GraphResult};
use crate::executor::{Clocked, Master};
use crate::storage::fifo::{FifoConfig, FifoHandle};
use crate::storage::ram::{RamConfig, RamPort};
use crate::types::NodeId;

/// Immutable construction parameters of a node.
pub type Config = serde_json::Map<String, serde_json::Value>;

/// The closed set of component types a node can instantiate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentKind {
    /// The root of every graph
    Root,
    /// A free-running clock source
    Clock,
    /// A single boolean line (LED, ready flag)
    Flag,
    /// Address router, bus clock and lock owner
    BusMatrix,
    /// Word-addressed memory slave
    Memory,
    /// Dual-port RAM backing a FIFO
    Ram,
    /// Circular FIFO over a dual-port RAM
    Fifo,
    /// Register block with the status LED and FIFO push port
    StatusPeripheral,
    /// DMA channel (master and register slave)
    Dma,
    /// Master running a fixed program of bus operations
    Cpu,
    /// Clocked reader draining a FIFO in its own clock domain
    FifoSink,
    /// Two-flop synchronizer into another clock domain
    Synchronize,
}

/// The kind of value an accessor hands out, and therefore the kind of an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    Clock,
    Signal,
    Bus,
    Slave,
    Master,
    Fifo,
    RamPort,
}

/// An input slot a component kind accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputSpec {
    pub name: &'static str,
    pub port: PortKind,
    pub required: bool,
}

const fn input(name: &'static str, port: PortKind, required: bool) -> InputSpec {
    InputSpec {
        name,
        port,
        required,
    }
}

impl ComponentKind {
    /// All kinds, in declaration order.
    pub const ALL: [ComponentKind; 12] = [
        ComponentKind::Root,
        ComponentKind::Clock,
        ComponentKind::Flag,
        ComponentKind::BusMatrix,
        ComponentKind::Memory,
        ComponentKind::Ram,
        ComponentKind::Fifo,
        ComponentKind::StatusPeripheral,
        ComponentKind::Dma,
        ComponentKind::Cpu,
        ComponentKind::FifoSink,
        ComponentKind::Synchronize,
    ];

    /// Accessors exposed by this kind.
    pub fn outputs(self) -> &'static [(&'static str, PortKind)] {
        match self {
            ComponentKind::Root | ComponentKind::FifoSink => &[],
            ComponentKind::Clock => &[("out", PortKind::Clock)],
            ComponentKind::Flag => &[("signals", PortKind::Signal)],
            ComponentKind::BusMatrix => &[("interface", PortKind::Bus)],
            ComponentKind::Memory | ComponentKind::StatusPeripheral => {
                &[("interface", PortKind::Slave)]
            }
            ComponentKind::Ram => &[("port_a", PortKind::RamPort), ("port_b", PortKind::RamPort)],
            ComponentKind::Fifo => &[("interface", PortKind::Fifo)],
            ComponentKind::Dma => &[("execute", PortKind::Master), ("interface", PortKind::Slave)],
            ComponentKind::Cpu => &[("execute", PortKind::Master)],
            ComponentKind::Synchronize => &[("out", PortKind::Signal)],
        }
    }

    /// Input slots accepted by this kind.
    pub fn inputs(self) -> &'static [InputSpec] {
        const BUS_MATRIX: &[InputSpec] = &[
            input("clk", PortKind::Clock, false),
            input("slaves", PortKind::Slave, false),
            input("masters", PortKind::Master, false),
        ];
        const FIFO: &[InputSpec] = &[
            input("write_port", PortKind::RamPort, true),
            input("read_port", PortKind::RamPort, true),
        ];
        const PERIPHERAL: &[InputSpec] = &[
            input("status_led", PortKind::Signal, true),
            input("fifo", PortKind::Fifo, false),
            input("dmaready", PortKind::Signal, false),
        ];
        const DMA: &[InputSpec] = &[
            input("bus", PortKind::Bus, true),
            input("ready", PortKind::Signal, false),
        ];
        const CPU: &[InputSpec] = &[input("bus", PortKind::Bus, true)];
        const FIFO_SINK: &[InputSpec] = &[
            input("fifo", PortKind::Fifo, true),
            input("clk", PortKind::Clock, true),
            input("enable", PortKind::Signal, false),
        ];
        const SYNCHRONIZE: &[InputSpec] = &[
            input("clk", PortKind::Clock, true),
            input("other_signal", PortKind::Signal, true),
        ];

        match self {
            ComponentKind::Root
            | ComponentKind::Clock
            | ComponentKind::Flag
            | ComponentKind::Memory
            | ComponentKind::Ram => &[],
            ComponentKind::BusMatrix => BUS_MATRIX,
            ComponentKind::Fifo => FIFO,
            ComponentKind::StatusPeripheral => PERIPHERAL,
            ComponentKind::Dma => DMA,
            ComponentKind::Cpu => CPU,
            ComponentKind::FifoSink => FIFO_SINK,
            ComponentKind::Synchronize => SYNCHRONIZE,
        }
    }

    /// Looks up the port kind produced by accessor `attr`.
    pub fn output_port(self, attr: &str) -> Option<PortKind> {
        self.outputs()
            .iter()
            .find(|(name, _)| *name == attr)
            .map(|(_, port)| *port)
    }

    /// Looks up the input slot `attr`.
    pub fn input_port(self, attr: &str) -> Option<&'static InputSpec> {
        self.inputs().iter().find(|spec| spec.name == attr)
    }

    /// Checks that `config` deserializes into this kind's config struct.
    pub fn validate_config(self, path: &str, config: &Config) -> GraphResult<()> {
        match self {
            ComponentKind::Root => Ok(()),
            ComponentKind::Clock => parse_config::<ClockConfig>(path, self, config).map(drop),
            ComponentKind::Flag => parse_config::<FlagConfig>(path, self, config).map(drop),
            ComponentKind::BusMatrix => {
                parse_config::<BusMatrixConfig>(path, self, config).map(drop)
            }
            ComponentKind::Memory => parse_config::<MemoryConfig>(path, self, config).map(drop),
            ComponentKind::Ram => parse_config::<RamConfig>(path, self, config).map(drop),
            ComponentKind::Fifo => parse_config::<FifoConfig>(path, self, config)?.validate(path),
            ComponentKind::StatusPeripheral => {
                parse_config::<PeripheralConfig>(path, self, config).map(drop)
            }
            ComponentKind::Dma => parse_config::<DmaConfig>(path, self, config).map(drop),
            ComponentKind::Cpu => parse_config::<CpuConfig>(path, self, config).map(drop),
            ComponentKind::FifoSink => parse_config::<FifoSinkConfig>(path, self, config).map(drop),
            ComponentKind::Synchronize => {
                parse_config::<SynchronizeConfig>(path, self, config).map(drop)
            }
        }
    }
}

/// Deserializes a node config map into a typed config struct.
pub fn parse_config<T: DeserializeOwned>(
    path: &str,
    kind: ComponentKind,
    config: &Config,
) -> GraphResult<T> {
    serde_json::from_value(serde_json::Value::Object(config.clone())).map_err(|e| {
        GraphError::InvalidConfig {
            path: path.to_string(),
            kind,
            message: e.to_string(),
        }
    })
}

/// A value handed out by a component accessor.
pub enum Port {
    Clock(ClockSpec),
    Signal(SignalLine),
    Bus(Arc<BusMatrix>),
    Slave(Arc<dyn Slave>),
    Master(Box<dyn Master>),
    Fifo(FifoHandle),
    RamPort(RamPort),
}

impl Port {
    /// The kind of this port value.
    pub fn kind(&self) -> PortKind {
        match self {
            Port::Clock(_) => PortKind::Clock,
            Port::Signal(_) => PortKind::Signal,
            Port::Bus(_) => PortKind::Bus,
            Port::Slave(_) => PortKind::Slave,
            Port::Master(_) => PortKind::Master,
            Port::Fifo(_) => PortKind::Fifo,
            Port::RamPort(_) => PortKind::RamPort,
        }
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Clock(spec) => f.debug_tuple("Clock").field(spec).finish(),
            Port::Signal(line) => f.debug_tuple("Signal").field(line).finish(),
            Port::Bus(bus) => f.debug_tuple("Bus").field(&bus.path()).finish(),
            Port::Slave(slave) => f.debug_tuple("Slave").field(&slave.name()).finish(),
            Port::Master(master) => f.debug_tuple("Master").field(&master.name()).finish(),
            Port::Fifo(_) => f.write_str("Fifo"),
            Port::RamPort(port) => f.debug_tuple("RamPort").field(&port.side()).finish(),
        }
    }
}

/// The wires feeding one input slot, in the shape the slot has in the graph.
#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    One(Wire),
    Many(Vec<Wire>),
}

impl Input {
    /// All wires in attachment order.
    pub fn wires(&self) -> &[Wire] {
        match self {
            Input::One(wire) => std::slice::from_ref(wire),
            Input::Many(wires) => wires,
        }
    }
}

/// Input slots collected for a constructor, in slot insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Inputs {
    path: String,
    slots: Vec<(String, Input)>,
}

impl Inputs {
    pub(crate) fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            slots: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, attr: impl Into<String>, input: Input) {
        self.slots.push((attr.into(), input));
    }

    /// Returns the raw slot, if any edge feeds it.
    pub fn get(&self, attr: &str) -> Option<&Input> {
        self.slots
            .iter()
            .find(|(name, _)| name == attr)
            .map(|(_, input)| input)
    }

    /// All wires feeding `attr`; empty if the slot is unwired.
    pub fn all(&self, attr: &str) -> Vec<Wire> {
        self.get(attr)
            .map(|input| input.wires().to_vec())
            .unwrap_or_default()
    }

    /// The single wire feeding `attr`, if wired.
    ///
    /// Fails with `InputArity` if the slot was promoted to a list.
    pub fn optional(&self, attr: &str) -> GraphResult<Option<Wire>> {
        match self.get(attr) {
            None => Ok(None),
            Some(Input::One(wire)) => Ok(Some(wire.clone())),
            Some(Input::Many(wires)) => Err(GraphError::InputArity {
                path: self.path.clone(),
                attr: attr.to_string(),
                count: wires.len(),
            }),
        }
    }

    /// The single wire feeding `attr`; fails with `MissingInput` if unwired.
    pub fn required(&self, attr: &str) -> GraphResult<Wire> {
        self.optional(attr)?.ok_or_else(|| GraphError::MissingInput {
            path: self.path.clone(),
            attr: attr.to_string(),
        })
    }

    /// Iterates slots in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Input)> {
        self.slots.iter().map(|(name, input)| (name.as_str(), input))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Everything a constructor receives: the node's identity, its config and its
/// collected inputs.
#[derive(Clone, Debug)]
pub struct ConstructParams {
    pub node: NodeId,
    pub path: String,
    pub kind: ComponentKind,
    pub config: Config,
    pub inputs: Inputs,
}

impl ConstructParams {
    /// Deserializes the node config into the kind's typed config.
    pub fn config<T: DeserializeOwned>(&self) -> GraphResult<T> {
        parse_config(&self.path, self.kind, &self.config)
    }

    /// Error for an accessor or input the kind does not declare.
    pub fn unknown_port(&self, attr: &str, direction: &'static str) -> GraphError {
        unknown_port(&self.path, self.kind, attr, direction)
    }
}

/// Builds an `UnknownPort` error.
pub fn unknown_port(
    path: &str,
    kind: ComponentKind,
    attr: &str,
    direction: &'static str,
) -> GraphError {
    GraphError::UnknownPort {
        path: path.to_string(),
        kind,
        attr: attr.to_string(),
        direction,
    }
}

/// The runtime instance behind a node.
///
/// Instances are created once per node by [`Graph::instantiate`] and shared as
/// `Arc<dyn Component>`. Accessors take the `Arc` so a component can hand out
/// handles to itself (a memory returns itself as its slave interface).
///
/// [`Graph::instantiate`]: crate::graph::Graph::instantiate
pub trait Component: Send + Sync + 'static {
    /// The kind this instance was constructed for.
    fn kind(&self) -> ComponentKind;

    /// The node path this instance belongs to.
    fn path(&self) -> &str;

    /// Calls the accessor named `attr`.
    fn accessor(self: Arc<Self>, attr: &str, params: &EdgeParams) -> GraphResult<Port>;

    /// A clocked process the arbiter should advance alongside the masters.
    fn process(self: Arc<Self>) -> Option<Box<dyn Clocked>> {
        None
    }

    /// Upcast used by [`Graph::instance_as`](crate::graph::Graph::instance_as).
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("kind", &self.kind())
            .field("path", &self.path())
            .finish()
    }
}

/// The component behind the root node and plain grouping nodes. It exposes
/// nothing.
#[derive(Debug, Default)]
pub struct Root {
    path: String,
}

impl Root {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Component for Root {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Root
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn accessor(self: Arc<Self>, attr: &str, _params: &EdgeParams) -> GraphResult<Port> {
        Err(unknown_port(&self.path, ComponentKind::Root, attr, "output"))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
