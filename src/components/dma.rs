//! DMA channel.
//!
//! The channel exposes two faces: a register slave on `interface` and a bus
//! master on `execute`. Registers are decoded on `address & 0x1f`:
//!
//! | offset | register    |
//! |--------|-------------|
//! | `0x00` | `src_addr`  |
//! | `0x04` | `src_incr`  |
//! | `0x08` | `dest_addr` |
//! | `0x0c` | `dest_incr` |
//! | `0x10` | `count`     |
//!
//! While `ready` is high and `count > 0`, the master moves one word per two
//! steps under the bus lock: the first step locks and reads `src_addr`, the
//! second writes `dest_addr`, unlocks and advances the registers. Otherwise it
//! idles the bus for one period.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, trace};

use crate::bus::{BusMatrix, Slave};
use crate::component::{unknown_port, Component, ComponentKind, ConstructParams, Port, PortKind};
use crate::components::flag::SignalLine;
use crate::edge::{EdgeParams, NodeRef};
use crate::error::{BusResult, GraphResult, SimResult};
use crate::executor::{Master, MasterStep};
use crate::graph::Graph;
use crate::types::{shared, Address, Shared, Word};

/// Config of a `Dma` node. The channel has no parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmaConfig {}

/// Programmable state of the channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmaRegisters {
    pub src_addr: Address,
    pub src_incr: Address,
    pub dest_addr: Address,
    pub dest_incr: Address,
    pub count: Word,
}

impl DmaRegisters {
    fn write(&mut self, offset: Address, data: Word) {
        match offset {
            0x00 => self.src_addr = data,
            0x04 => self.src_incr = data,
            0x08 => self.dest_addr = data,
            0x0c => self.dest_incr = data,
            0x10 => self.count = data,
            _ => {}
        }
    }

    fn read(&self, offset: Address) -> Word {
        match offset {
            0x00 => self.src_addr,
            0x04 => self.src_incr,
            0x08 => self.dest_addr,
            0x0c => self.dest_incr,
            0x10 => self.count,
            _ => 0,
        }
    }

    fn advance(&mut self) {
        self.src_addr = self.src_addr.wrapping_add(self.src_incr);
        self.dest_addr = self.dest_addr.wrapping_add(self.dest_incr);
        self.count = self.count.saturating_sub(1);
    }
}

/// The `Dma` component.
#[derive(Debug)]
pub struct Dma {
    path: String,
    bus: Arc<BusMatrix>,
    ready: Option<SignalLine>,
    registers: Shared<DmaRegisters>,
}

impl Dma {
    pub fn construct(graph: &Graph, params: ConstructParams) -> GraphResult<Arc<Self>> {
        let _config: DmaConfig = params.config()?;
        let bus = params.inputs.required("bus")?.bus(graph)?;
        let ready = params
            .inputs
            .optional("ready")?
            .map(|wire| wire.signal(graph))
            .transpose()?;
        debug!(dma = %params.path, bus = %bus.path(), gated = ready.is_some(), "dma built");
        Ok(Arc::new(Self {
            path: params.path,
            bus,
            ready,
            registers: shared(DmaRegisters::default()),
        }))
    }

    /// Declares a DMA channel on `bus`: its registers become the next slave,
    /// its engine the next master, and `ready` (a flag path) gates it.
    pub fn declare(
        graph: &mut Graph,
        parent: &str,
        name: &str,
        bus: &str,
        ready: Option<&str>,
    ) -> GraphResult<String> {
        let id = graph.add_node(parent, name, ComponentKind::Dma, json!({}))?;
        let path = graph.path_of(id).to_string();
        graph.add_edge(
            PortKind::Bus,
            &NodeRef::format(bus, "interface"),
            &NodeRef::format(&path, "bus"),
            EdgeParams::default(),
        )?;
        graph.add_edge(
            PortKind::Slave,
            &NodeRef::format(&path, "interface"),
            &NodeRef::format(bus, "slaves"),
            EdgeParams::default(),
        )?;
        graph.add_edge(
            PortKind::Master,
            &NodeRef::format(&path, "execute"),
            &NodeRef::format(bus, "masters"),
            EdgeParams::default(),
        )?;
        if let Some(ready) = ready {
            graph.add_edge(
                PortKind::Signal,
                &NodeRef::format(ready, "signals"),
                &NodeRef::format(&path, "ready"),
                EdgeParams::named("ready"),
            )?;
        }
        Ok(path)
    }

    /// Snapshot of the registers.
    pub fn registers(&self) -> DmaRegisters {
        *self.registers.lock()
    }

    /// Programs the registers directly, bypassing the bus.
    pub fn program(&self, registers: DmaRegisters) {
        *self.registers.lock() = registers;
    }
}

impl Slave for Dma {
    fn name(&self) -> &str {
        &self.path
    }

    fn write(&self, address: Address, data: Word) -> BusResult<()> {
        let offset = address & 0x1f;
        trace!(dma = %self.path, offset, data, "register write");
        self.registers.lock().write(offset, data);
        Ok(())
    }

    fn read(&self, address: Address) -> BusResult<Word> {
        Ok(self.registers.lock().read(address & 0x1f))
    }

    fn reset(&self) {
        *self.registers.lock() = DmaRegisters::default();
    }
}

/// The bus-master face of a [`Dma`].
pub struct DmaMaster {
    name: String,
    bus: Arc<BusMatrix>,
    ready: Option<SignalLine>,
    registers: Shared<DmaRegisters>,
    /// Word read under the lock, not yet written
    pending: Option<Word>,
}

impl DmaMaster {
    fn is_ready(&self) -> bool {
        self.ready.as_ref().map_or(true, SignalLine::get)
    }

    fn finish(&mut self, graph: &Graph, data: Word) -> SimResult<MasterStep> {
        let dest = self.registers.lock().dest_addr;
        let written = self.bus.write(graph, &self.name, dest, data);
        let unlocked = self.bus.unlock(&self.name);
        written?;
        unlocked?;
        self.registers.lock().advance();
        Ok(MasterStep::Transacted)
    }
}

impl Master for DmaMaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn step(&mut self, graph: &Graph) -> SimResult<MasterStep> {
        if let Some(data) = self.pending.take() {
            return self.finish(graph, data);
        }

        let DmaRegisters { src_addr, count, .. } = *self.registers.lock();
        if !self.is_ready() || count == 0 {
            self.bus.idle(1);
            return Ok(MasterStep::Idle);
        }

        self.bus.lock(&self.name)?;
        match self.bus.read(graph, &self.name, src_addr) {
            Ok(data) => {
                self.pending = Some(data);
                Ok(MasterStep::Transacted)
            }
            Err(e) => {
                self.bus.unlock(&self.name)?;
                Err(e.into())
            }
        }
    }
}

impl Component for Dma {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Dma
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn accessor(self: Arc<Self>, attr: &str, _params: &EdgeParams) -> GraphResult<Port> {
        match attr {
            "interface" => Ok(Port::Slave(self)),
            "execute" => Ok(Port::Master(Box::new(DmaMaster {
                name: self.path.clone(),
                bus: Arc::clone(&self.bus),
                ready: self.ready.clone(),
                registers: Arc::clone(&self.registers),
                pending: None,
            }))),
            _ => Err(unknown_port(&self.path, ComponentKind::Dma, attr, "output")),
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::flag::Flag;
    use crate::components::memory::Memory;
    use crate::event::BusEventKind;

    fn soc(ready: bool) -> (Graph, Arc<Dma>, Arc<Memory>) {
        let mut graph = Graph::new();
        graph
            .add_node("", "bus", ComponentKind::BusMatrix, json!({"address_mask": 0xffff}))
            .unwrap();
        Flag::declare(&mut graph, "", "ready", ready).unwrap();
        Memory::declare(&mut graph, "", "mem", "/bus", Memory::config(32, 64)).unwrap();
        Dma::declare(&mut graph, "", "dma", "/bus", Some("/ready")).unwrap();
        let dma = graph.instance_as::<Dma>("/dma").unwrap();
        let mem = graph.instance_as::<Memory>("/mem").unwrap();
        (graph, dma, mem)
    }

    fn master(dma: &Arc<Dma>) -> Box<dyn Master> {
        match Arc::clone(dma).accessor("execute", &EdgeParams::default()).unwrap() {
            Port::Master(master) => master,
            other => panic!("unexpected port {other:?}"),
        }
    }

    #[test]
    fn test_register_decode() {
        let (_graph, dma, _mem) = soc(true);
        dma.write(0x2_0000, 0x100).unwrap();
        dma.write(0x2_0004, 4).unwrap();
        dma.write(0x2_0010, 3).unwrap();
        dma.write(0x2_0014, 99).unwrap();
        assert_eq!(dma.read(0x2_0000).unwrap(), 0x100);
        assert_eq!(dma.read(0x2_0014).unwrap(), 0);
        assert_eq!(dma.registers().count, 3);

        dma.reset();
        assert_eq!(dma.registers(), DmaRegisters::default());
    }

    #[test]
    fn test_copies_under_lock() {
        let (graph, dma, mem) = soc(true);
        mem.load(0, &[11, 22]);
        dma.program(DmaRegisters {
            src_addr: 0x0,
            src_incr: 4,
            dest_addr: 0x20,
            dest_incr: 4,
            count: 2,
        });
        let mut master = master(&dma);

        assert_eq!(master.step(&graph).unwrap(), MasterStep::Transacted);
        assert_eq!(dma.bus.lock_holder().as_deref(), Some("/dma"));
        assert_eq!(master.step(&graph).unwrap(), MasterStep::Transacted);
        assert!(!dma.bus.is_locked());
        master.step(&graph).unwrap();
        master.step(&graph).unwrap();

        assert_eq!(mem.peek(8), Some(11));
        assert_eq!(mem.peek(9), Some(22));
        let regs = dma.registers();
        assert_eq!((regs.src_addr, regs.dest_addr, regs.count), (8, 0x28, 0));

        assert_eq!(master.step(&graph).unwrap(), MasterStep::Idle);
        let ops: Vec<_> = dma.bus.trace().into_iter().map(|e| e.kind).collect();
        assert!(matches!(ops[0], BusEventKind::Lock));
        assert!(matches!(ops[1], BusEventKind::Read { address: 0, data: 11, .. }));
        assert!(matches!(ops[2], BusEventKind::Write { address: 0x20, data: 11, .. }));
        assert!(matches!(ops[3], BusEventKind::Unlock));
    }

    #[test]
    fn test_not_ready_idles() {
        let (graph, dma, _mem) = soc(false);
        dma.program(DmaRegisters {
            count: 5,
            ..DmaRegisters::default()
        });
        let mut master = master(&dma);
        assert_eq!(master.step(&graph).unwrap(), MasterStep::Idle);
        assert_eq!(dma.bus.stats().idle_cycles, 1);
        assert_eq!(dma.registers().count, 5);
    }

    #[test]
    fn test_failed_read_releases_lock() {
        let (graph, dma, _mem) = soc(true);
        dma.program(DmaRegisters {
            src_addr: 0x400,
            count: 1,
            ..DmaRegisters::default()
        });
        let mut master = master(&dma);
        assert!(master.step(&graph).is_err());
        assert!(!dma.bus.is_locked());
    }
}
