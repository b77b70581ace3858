//! A bus master that runs a list of bus operations, one per step.
//!
//! Operations can be given in the node config or appended at run time with
//! [`Cpu::push`]. The master reports `Done` once it has run out of
//! operations; anything pushed after that is not picked up.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bus::BusMatrix;
use crate::component::{unknown_port, Component, ComponentKind, ConstructParams, Port, PortKind};
use crate::edge::{EdgeParams, NodeRef};
use crate::error::{GraphError, GraphResult, SimError, SimResult};
use crate::executor::{Master, MasterStep};
use crate::graph::Graph;
use crate::types::{shared, Address, Shared, Word};

/// One operation of a CPU program.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BusOp {
    Write {
        address: Address,
        data: Word,
    },
    Read {
        address: Address,
        /// Fail the run if the word read differs
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect: Option<Word>,
    },
    Idle {
        cycles: u32,
    },
    Lock,
    Unlock,
    Reset,
}

/// Config of a `Cpu` node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuConfig {
    #[serde(default)]
    pub program: Vec<BusOp>,
}

/// The `Cpu` component.
#[derive(Debug)]
pub struct Cpu {
    path: String,
    bus: Arc<BusMatrix>,
    program: Shared<Vec<BusOp>>,
    reads: Shared<Vec<(Address, Word)>>,
}

impl Cpu {
    pub fn construct(graph: &Graph, params: ConstructParams) -> GraphResult<Arc<Self>> {
        let config: CpuConfig = params.config()?;
        let bus = params.inputs.required("bus")?.bus(graph)?;
        Ok(Arc::new(Self {
            path: params.path,
            bus,
            program: shared(config.program),
            reads: shared(Vec::new()),
        }))
    }

    /// Declares a CPU as the next master of `bus`.
    pub fn declare(
        graph: &mut Graph,
        parent: &str,
        name: &str,
        bus: &str,
        program: Vec<BusOp>,
    ) -> GraphResult<String> {
        let config = serde_json::to_value(CpuConfig { program }).map_err(|e| {
            GraphError::InvalidConfig {
                path: format!("{parent}/{name}"),
                kind: ComponentKind::Cpu,
                message: e.to_string(),
            }
        })?;
        let id = graph.add_node(parent, name, ComponentKind::Cpu, config)?;
        let path = graph.path_of(id).to_string();
        graph.add_edge(
            PortKind::Bus,
            &NodeRef::format(bus, "interface"),
            &NodeRef::format(&path, "bus"),
            EdgeParams::default(),
        )?;
        graph.add_edge(
            PortKind::Master,
            &NodeRef::format(&path, "execute"),
            &NodeRef::format(bus, "masters"),
            EdgeParams::default(),
        )?;
        Ok(path)
    }

    /// Appends an operation to the program.
    pub fn push(&self, op: BusOp) {
        self.program.lock().push(op);
    }

    pub fn program(&self) -> Vec<BusOp> {
        self.program.lock().clone()
    }

    /// Every completed read as `(address, data)`, in order.
    pub fn reads(&self) -> Vec<(Address, Word)> {
        self.reads.lock().clone()
    }
}

/// The bus-master face of a [`Cpu`].
pub struct CpuMaster {
    name: String,
    bus: Arc<BusMatrix>,
    program: Shared<Vec<BusOp>>,
    reads: Shared<Vec<(Address, Word)>>,
    pc: usize,
}

impl CpuMaster {
    fn execute(&mut self, graph: &Graph, op: BusOp) -> SimResult<MasterStep> {
        let name = self.name.as_str();
        match op {
            BusOp::Write { address, data } => self.bus.write(graph, name, address, data)?,
            BusOp::Read { address, expect } => {
                let actual = self.bus.read(graph, name, address)?;
                self.reads.lock().push((address, actual));
                if let Some(expected) = expect {
                    if expected != actual {
                        return Err(SimError::ReadMismatch {
                            address,
                            expected,
                            actual,
                        });
                    }
                }
            }
            BusOp::Idle { cycles } => {
                self.bus.idle(cycles);
                return Ok(MasterStep::Idle);
            }
            BusOp::Lock => self.bus.lock(name)?,
            BusOp::Unlock => self.bus.unlock(name)?,
            BusOp::Reset => self.bus.reset(graph, name)?,
        }
        Ok(MasterStep::Transacted)
    }
}

impl Master for CpuMaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn step(&mut self, graph: &Graph) -> SimResult<MasterStep> {
        let op = self.program.lock().get(self.pc).cloned();
        let Some(op) = op else {
            return Ok(MasterStep::Done);
        };
        debug!(cpu = %self.name, pc = self.pc, ?op, "execute");
        self.pc += 1;
        self.execute(graph, op)
    }
}

impl Component for Cpu {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Cpu
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn accessor(self: Arc<Self>, attr: &str, _params: &EdgeParams) -> GraphResult<Port> {
        match attr {
            "execute" => Ok(Port::Master(Box::new(CpuMaster {
                name: self.path.clone(),
                bus: Arc::clone(&self.bus),
                program: Arc::clone(&self.program),
                reads: Arc::clone(&self.reads),
                pc: 0,
            }))),
            _ => Err(unknown_port(&self.path, ComponentKind::Cpu, attr, "output")),
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::memory::Memory;
    use serde_json::json;

    fn soc(program: Vec<BusOp>) -> (Graph, Arc<Cpu>, Box<dyn Master>) {
        let mut graph = Graph::new();
        graph
            .add_node("", "bus", ComponentKind::BusMatrix, json!({"address_mask": 0xffff}))
            .unwrap();
        Memory::declare(&mut graph, "", "mem", "/bus", Memory::config(32, 16)).unwrap();
        Cpu::declare(&mut graph, "", "cpu", "/bus", program).unwrap();
        let cpu = graph.instance_as::<Cpu>("/cpu").unwrap();
        let master = match Arc::clone(&cpu).accessor("execute", &EdgeParams::default()) {
            Ok(Port::Master(master)) => master,
            other => panic!("unexpected {other:?}"),
        };
        (graph, cpu, master)
    }

    #[test]
    fn test_program_runs_to_done() {
        let (graph, cpu, mut master) = soc(vec![
            BusOp::Write { address: 4, data: 7 },
            BusOp::Idle { cycles: 2 },
            BusOp::Read {
                address: 4,
                expect: Some(7),
            },
        ]);
        assert_eq!(master.step(&graph).unwrap(), MasterStep::Transacted);
        assert_eq!(master.step(&graph).unwrap(), MasterStep::Idle);
        assert_eq!(master.step(&graph).unwrap(), MasterStep::Transacted);
        assert_eq!(master.step(&graph).unwrap(), MasterStep::Done);
        assert_eq!(cpu.reads(), vec![(4, 7)]);
    }

    #[test]
    fn test_read_mismatch() {
        let (graph, _cpu, mut master) = soc(vec![BusOp::Read {
            address: 0,
            expect: Some(1),
        }]);
        assert_eq!(
            master.step(&graph).unwrap_err(),
            SimError::ReadMismatch {
                address: 0,
                expected: 1,
                actual: 0
            }
        );
    }

    #[test]
    fn test_pushed_ops_run() {
        let (graph, cpu, mut master) = soc(Vec::new());
        cpu.push(BusOp::Lock);
        cpu.push(BusOp::Unlock);
        assert_eq!(master.step(&graph).unwrap(), MasterStep::Transacted);
        assert_eq!(cpu.bus.lock_holder().as_deref(), Some("/cpu"));
        master.step(&graph).unwrap();
        assert!(!cpu.bus.is_locked());
    }

    #[test]
    fn test_program_from_yaml() {
        let yaml = "
program:
  - op: write
    address: 64
    data: 1
  - op: read
    address: 64
  - op: idle
    cycles: 3
  - op: lock
";
        let config: CpuConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.program.len(), 4);
        assert_eq!(
            config.program[1],
            BusOp::Read {
                address: 0x40,
                expect: None
            }
        );
    }
}
