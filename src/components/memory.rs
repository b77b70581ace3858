//! Word-addressed memory slave.
//!
//! The word index is `(address & 0xffff) >> log2(width / 8)`; the bus decodes
//! the upper bits. Accesses past `depth` words are slave errors.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::bus::Slave;
use crate::component::{unknown_port, Component, ComponentKind, ConstructParams, Port, PortKind};
use crate::edge::{EdgeParams, NodeRef};
use crate::error::{BusError, BusResult, GraphError, GraphResult};
use crate::graph::Graph;
use crate::storage::ram::{default_width, word_mask};
use crate::types::{Address, Word};

/// Config of a `Memory` node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    pub depth: usize,
    /// Wait cycles before the memory drives `pready`
    #[serde(default)]
    pub wait_states: u32,
    /// Initial contents, from word 0
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init: Vec<Word>,
}

/// The `Memory` component.
#[derive(Debug)]
pub struct Memory {
    path: String,
    width: u32,
    shift: u32,
    wait_states: u32,
    init: Vec<Word>,
    cells: Mutex<Vec<Word>>,
}

impl Memory {
    pub fn construct(_graph: &Graph, params: ConstructParams) -> GraphResult<Arc<Self>> {
        let config: MemoryConfig = params.config()?;
        let invalid = |message: String| GraphError::InvalidConfig {
            path: params.path.clone(),
            kind: ComponentKind::Memory,
            message,
        };
        if !matches!(config.width, 8 | 16 | 32) {
            return Err(invalid(format!("width must be 8, 16 or 32, got {}", config.width)));
        }
        if config.init.len() > config.depth {
            return Err(invalid(format!(
                "{} initial words do not fit in depth {}",
                config.init.len(),
                config.depth
            )));
        }

        let bytes = config.width / 8;
        let memory = Self {
            width: config.width,
            shift: bytes.trailing_zeros(),
            wait_states: config.wait_states,
            cells: Mutex::new(Self::initial(&config.init, config.depth, config.width)),
            init: config.init,
            path: params.path,
        };
        Ok(Arc::new(memory))
    }

    fn initial(init: &[Word], depth: usize, width: u32) -> Vec<Word> {
        let mut cells = vec![0; depth];
        for (cell, word) in cells.iter_mut().zip(init) {
            *cell = word & word_mask(width);
        }
        cells
    }

    /// Declares a memory node and wires it as the next slave of `bus`.
    pub fn declare(
        graph: &mut Graph,
        parent: &str,
        name: &str,
        bus: &str,
        config: MemoryConfig,
    ) -> GraphResult<String> {
        let config = serde_json::to_value(&config).map_err(|e| GraphError::InvalidConfig {
            path: format!("{parent}/{name}"),
            kind: ComponentKind::Memory,
            message: e.to_string(),
        })?;
        let id = graph.add_node(parent, name, ComponentKind::Memory, config)?;
        let path = graph.path_of(id).to_string();
        graph.add_edge(
            PortKind::Slave,
            &NodeRef::format(&path, "interface"),
            &NodeRef::format(bus, "slaves"),
            EdgeParams::default(),
        )?;
        Ok(path)
    }

    /// Convenience config for a plain zero-wait memory.
    pub fn config(width: u32, depth: usize) -> MemoryConfig {
        MemoryConfig {
            width,
            depth,
            wait_states: 0,
            init: Vec::new(),
        }
    }

    fn index(&self, address: Address) -> BusResult<usize> {
        let index = ((address & 0xffff) >> self.shift) as usize;
        let depth = self.cells.lock().len();
        if index >= depth {
            return Err(BusError::SlaveError {
                address,
                message: format!("{}: word {index} past depth {depth}", self.path),
            });
        }
        Ok(index)
    }

    /// Reads a word directly, bypassing the bus.
    pub fn peek(&self, index: usize) -> Option<Word> {
        self.cells.lock().get(index).copied()
    }

    /// Writes words directly from `index`, bypassing the bus.
    pub fn load(&self, index: usize, words: &[Word]) {
        let mut cells = self.cells.lock();
        for (cell, word) in cells.iter_mut().skip(index).zip(words) {
            *cell = word & word_mask(self.width);
        }
    }

    pub fn depth(&self) -> usize {
        self.cells.lock().len()
    }
}

impl Slave for Memory {
    fn name(&self) -> &str {
        &self.path
    }

    fn is_ready(&self, wait_cycles: u32) -> bool {
        wait_cycles >= self.wait_states
    }

    fn write(&self, address: Address, data: Word) -> BusResult<()> {
        let index = self.index(address)?;
        trace!(memory = %self.path, index, data, "write");
        self.cells.lock()[index] = data & word_mask(self.width);
        Ok(())
    }

    fn read(&self, address: Address) -> BusResult<Word> {
        let index = self.index(address)?;
        Ok(self.cells.lock()[index])
    }

    /// Restores the initial contents.
    fn reset(&self) {
        let mut cells = self.cells.lock();
        let depth = cells.len();
        *cells = Self::initial(&self.init, depth, self.width);
    }
}

impl Component for Memory {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Memory
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn accessor(self: Arc<Self>, attr: &str, _params: &EdgeParams) -> GraphResult<Port> {
        match attr {
            "interface" => Ok(Port::Slave(self)),
            _ => Err(unknown_port(&self.path, ComponentKind::Memory, attr, "output")),
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentKind;
    use serde_json::json;

    fn memory(config: serde_json::Value) -> Arc<Memory> {
        let mut graph = Graph::new();
        graph.add_node("", "mem", ComponentKind::Memory, config).unwrap();
        graph.instance_as::<Memory>("/mem").unwrap()
    }

    #[test]
    fn test_word_indexing() {
        let mem = memory(json!({"width": 32, "depth": 16}));
        mem.write(0x0001_0008, 0xcafe).unwrap();
        assert_eq!(mem.peek(2), Some(0xcafe));
        assert_eq!(mem.read(0x0000_0008).unwrap(), 0xcafe);
    }

    #[test]
    fn test_out_of_range_is_slave_error() {
        let mem = memory(json!({"width": 32, "depth": 4}));
        assert!(matches!(
            mem.read(0x10),
            Err(BusError::SlaveError { address: 0x10, .. })
        ));
    }

    #[test]
    fn test_wait_states_and_reset() {
        let mem = memory(json!({"depth": 4, "wait_states": 2, "init": [1, 2]}));
        assert!(!mem.is_ready(1));
        assert!(mem.is_ready(2));

        mem.write(0, 9).unwrap();
        mem.reset();
        assert_eq!(mem.peek(0), Some(1));
        assert_eq!(mem.peek(1), Some(2));
    }

    #[test]
    fn test_narrow_width() {
        let mem = memory(json!({"width": 16, "depth": 8}));
        mem.write(0x6, 0x1_2345).unwrap();
        assert_eq!(mem.peek(3), Some(0x2345));
    }
}
