//! Dual-port RAM.
//!
//! Two independent ports share one array of words. The FIFO writes through
//! port A from the write clock domain and reads through port B from the read
//! clock domain.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentKind, ConstructParams, Port};
use crate::edge::EdgeParams;
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::types::{shared, Shared, Word};

/// Returns the mask keeping the low `width` bits of a word.
pub fn word_mask(width: u32) -> Word {
    if width >= Word::BITS {
        Word::MAX
    } else {
        (1 << width) - 1
    }
}

/// A word array with two access ports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DualPortRam {
    width: u32,
    cells: Vec<Word>,
}

impl DualPortRam {
    /// Creates a zeroed RAM of `depth` words, each `width` bits wide.
    pub fn new(width: u32, depth: usize) -> Self {
        Self {
            width,
            cells: vec![0; depth],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.cells.len()
    }

    /// Stores `data`, masked to the RAM width. Addresses wrap at `depth`.
    pub fn write(&mut self, addr: usize, data: Word) {
        let depth = self.cells.len();
        if depth > 0 {
            self.cells[addr % depth] = data & word_mask(self.width);
        }
    }

    /// Reads the word at `addr`. Addresses wrap at `depth`.
    pub fn read(&self, addr: usize) -> Word {
        let depth = self.cells.len();
        if depth == 0 {
            return 0;
        }
        self.cells[addr % depth]
    }
}

/// Which side of the RAM a port drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RamSide {
    A,
    B,
}

/// One port of a shared dual-port RAM.
#[derive(Clone, Debug)]
pub struct RamPort {
    ram: Shared<DualPortRam>,
    side: RamSide,
    label: String,
}

impl RamPort {
    pub fn new(ram: Shared<DualPortRam>, side: RamSide, label: impl Into<String>) -> Self {
        Self {
            ram,
            side,
            label: label.into(),
        }
    }

    pub fn side(&self) -> RamSide {
        self.side
    }

    /// Signal prefix this port was handed out with (`write_`, `read_`).
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn depth(&self) -> usize {
        self.ram.lock().depth()
    }

    pub fn width(&self) -> u32 {
        self.ram.lock().width()
    }

    pub fn write(&self, addr: usize, data: Word) {
        self.ram.lock().write(addr, data);
    }

    pub fn read(&self, addr: usize) -> Word {
        self.ram.lock().read(addr)
    }

    /// Returns true if both ports front the same RAM.
    pub fn shares_ram_with(&self, other: &RamPort) -> bool {
        Arc::ptr_eq(&self.ram, &other.ram)
    }
}

/// Config of a `Ram` node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    pub depth: usize,
}

pub(crate) fn default_width() -> u32 {
    32
}

/// The `Ram` component.
#[derive(Debug)]
pub struct Ram {
    path: String,
    ram: Shared<DualPortRam>,
}

impl Ram {
    pub fn construct(_graph: &Graph, params: ConstructParams) -> GraphResult<Arc<Self>> {
        let config: RamConfig = params.config()?;
        if config.depth == 0 || config.width == 0 || config.width > Word::BITS {
            return Err(GraphError::InvalidConfig {
                path: params.path,
                kind: ComponentKind::Ram,
                message: format!(
                    "width must be 1..=32 and depth non-zero (got {}x{})",
                    config.width, config.depth
                ),
            });
        }
        Ok(Arc::new(Self {
            path: params.path,
            ram: shared(DualPortRam::new(config.width, config.depth)),
        }))
    }

    /// A handle on the backing array, for inspection.
    pub fn contents(&self) -> Shared<DualPortRam> {
        Arc::clone(&self.ram)
    }
}

impl Component for Ram {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Ram
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn accessor(self: Arc<Self>, attr: &str, params: &EdgeParams) -> GraphResult<Port> {
        let side = match attr {
            "port_a" => RamSide::A,
            "port_b" => RamSide::B,
            _ => {
                return Err(crate::component::unknown_port(
                    &self.path,
                    ComponentKind::Ram,
                    attr,
                    "output",
                ))
            }
        };
        Ok(Port::RamPort(RamPort::new(
            Arc::clone(&self.ram),
            side,
            params.label(""),
        )))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
