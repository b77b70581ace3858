//! Circular FIFO over a dual-port RAM.
//!
//! The write side and the read side each advance on their own clock edges:
//! [`Fifo::write_edge`] is one posedge of the write domain and
//! [`Fifo::read_edge`] one posedge of the read domain. One slot is always
//! left free, so a FIFO of depth `d` holds at most `d - 1` words:
//!
//! - `full  <=> wptr == (rptr - 1) mod depth`
//! - `empty <=> wptr == rptr`
//!
//! Overflow and underflow are status flags that hold until the next edge of
//! their domain, never errors.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::trace;

use crate::component::{Component, ComponentKind, ConstructParams, PortKind, Port};
use crate::edge::EdgeParams;
use crate::error::{GraphError, GraphResult, StorageError};
use crate::graph::Graph;
use crate::storage::ram::{default_width, word_mask, DualPortRam, RamPort, RamSide};
use crate::types::{shared, Shared, Word};

/// Shared handle on a FIFO, as handed out by the `interface` accessor.
pub type FifoHandle = Shared<Fifo>;

/// Snapshot of a FIFO's status outputs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FifoStatus {
    pub full: bool,
    pub empty: bool,
    pub wack: bool,
    pub dvld: bool,
    pub overflow: bool,
    pub underflow: bool,
    /// Words available to read
    pub rdcnt: usize,
    /// Free slots available to write
    pub wrcnt: usize,
    /// Last word read
    pub q: Word,
}

/// A FIFO of `depth` slots of `width` bits.
#[derive(Debug)]
pub struct Fifo {
    width: u32,
    depth: usize,
    wptr: usize,
    rptr: usize,
    write_port: RamPort,
    read_port: RamPort,
    wack: bool,
    dvld: bool,
    overflow: bool,
    underflow: bool,
    q: Word,
}

impl Fifo {
    /// Creates a FIFO with its own dual-port RAM.
    pub fn new(width: u32, depth: usize) -> Result<Self, StorageError> {
        check_shape(width, depth)?;
        let ram = shared(DualPortRam::new(width, depth));
        let write_port = RamPort::new(Arc::clone(&ram), RamSide::A, "write_");
        let read_port = RamPort::new(ram, RamSide::B, "read_");
        Self::with_ram(width, depth, write_port, read_port)
    }

    /// Creates a FIFO over existing RAM ports.
    pub fn with_ram(
        width: u32,
        depth: usize,
        write_port: RamPort,
        read_port: RamPort,
    ) -> Result<Self, StorageError> {
        check_shape(width, depth)?;
        Ok(Self {
            width,
            depth,
            wptr: 0,
            rptr: 0,
            write_port,
            read_port,
            wack: false,
            dvld: false,
            overflow: false,
            underflow: false,
            q: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn write_pointer(&self) -> usize {
        self.wptr
    }

    pub fn read_pointer(&self) -> usize {
        self.rptr
    }

    pub fn full(&self) -> bool {
        self.wptr == (self.rptr + self.depth - 1) % self.depth
    }

    pub fn empty(&self) -> bool {
        self.wptr == self.rptr
    }

    /// Number of words waiting to be read.
    pub fn len(&self) -> usize {
        (self.wptr + self.depth - self.rptr) % self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.empty()
    }

    /// Maximum number of words the FIFO holds at once.
    pub fn capacity(&self) -> usize {
        self.depth - 1
    }

    /// One posedge of the write domain.
    pub fn write_edge(&mut self, enable: bool, data: Word) {
        if !enable {
            self.wack = false;
            self.overflow = false;
            return;
        }
        if self.full() {
            self.overflow = true;
            self.wack = false;
            trace!(wptr = self.wptr, "fifo overflow");
            return;
        }
        self.write_port.write(self.wptr, data & word_mask(self.width));
        self.wptr = (self.wptr + 1) % self.depth;
        self.wack = true;
        self.overflow = false;
    }

    /// One posedge of the read domain. Returns the word read, if any.
    pub fn read_edge(&mut self, enable: bool) -> Option<Word> {
        if !enable {
            self.dvld = false;
            self.underflow = false;
            return None;
        }
        if self.empty() {
            self.underflow = true;
            self.dvld = false;
            trace!(rptr = self.rptr, "fifo underflow");
            return None;
        }
        self.q = self.read_port.read(self.rptr);
        self.rptr = (self.rptr + 1) % self.depth;
        self.dvld = true;
        self.underflow = false;
        Some(self.q)
    }

    /// Zeroes both pointers and every flag.
    pub fn reset(&mut self) {
        self.wptr = 0;
        self.rptr = 0;
        self.wack = false;
        self.dvld = false;
        self.overflow = false;
        self.underflow = false;
        self.q = 0;
    }

    pub fn wack(&self) -> bool {
        self.wack
    }

    pub fn dvld(&self) -> bool {
        self.dvld
    }

    pub fn overflow(&self) -> bool {
        self.overflow
    }

    pub fn underflow(&self) -> bool {
        self.underflow
    }

    pub fn q(&self) -> Word {
        self.q
    }

    pub fn status(&self) -> FifoStatus {
        let rdcnt = self.len();
        FifoStatus {
            full: self.full(),
            empty: self.empty(),
            wack: self.wack,
            dvld: self.dvld,
            overflow: self.overflow,
            underflow: self.underflow,
            rdcnt,
            wrcnt: self.capacity() - rdcnt,
            q: self.q,
        }
    }

    /// Status as a JSON object.
    pub fn export_stats(&self) -> serde_json::Value {
        json!({
            "width": self.width,
            "depth": self.depth,
            "status": self.status(),
        })
    }
}

/// Config of a `Fifo` node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FifoConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    pub depth: usize,
}

/// A FIFO needs one free slot to tell full from empty.
fn check_shape(width: u32, depth: usize) -> Result<(), StorageError> {
    if depth < 2 {
        return Err(StorageError::Depth(depth));
    }
    if width == 0 || width > Word::BITS {
        return Err(StorageError::Width(width));
    }
    Ok(())
}

impl FifoConfig {
    pub fn validate(&self, path: &str) -> GraphResult<()> {
        check_shape(self.width, self.depth).map_err(|e| GraphError::InvalidConfig {
            path: path.to_string(),
            kind: ComponentKind::Fifo,
            message: e.to_string(),
        })
    }
}

/// The `Fifo` component.
#[derive(Debug)]
pub struct FifoComponent {
    path: String,
    fifo: FifoHandle,
}

impl FifoComponent {
    pub fn construct(graph: &Graph, params: ConstructParams) -> GraphResult<Arc<Self>> {
        let config: FifoConfig = params.config()?;
        config.validate(&params.path)?;

        let write_port = params.inputs.required("write_port")?.ram_port(graph)?;
        let read_port = params.inputs.required("read_port")?.ram_port(graph)?;
        for port in [&write_port, &read_port] {
            if port.depth() < config.depth {
                return Err(GraphError::InvalidConfig {
                    path: params.path,
                    kind: ComponentKind::Fifo,
                    message: format!(
                        "backing RAM holds {} words, fifo needs {}",
                        port.depth(),
                        config.depth
                    ),
                });
            }
        }

        let fifo = Fifo::with_ram(config.width, config.depth, write_port, read_port).map_err(
            |e| GraphError::InvalidConfig {
                path: params.path.clone(),
                kind: ComponentKind::Fifo,
                message: e.to_string(),
            },
        )?;
        Ok(Arc::new(Self {
            path: params.path,
            fifo: shared(fifo),
        }))
    }

    /// Declares a FIFO node and its backing RAM as a child node named `ram`.
    ///
    /// Returns the FIFO's path.
    pub fn declare(
        graph: &mut Graph,
        parent: &str,
        name: &str,
        width: u32,
        depth: usize,
    ) -> GraphResult<String> {
        let config = json!({ "width": width, "depth": depth });
        let id = graph.add_node(parent, name, ComponentKind::Fifo, config.clone())?;
        let path = graph.path_of(id).to_string();
        graph.add_node(&path, "ram", ComponentKind::Ram, config)?;
        graph.add_edge(
            PortKind::RamPort,
            &format!("{path}/ram#port_a"),
            &format!("{path}#write_port"),
            EdgeParams::prefixed("write_"),
        )?;
        graph.add_edge(
            PortKind::RamPort,
            &format!("{path}/ram#port_b"),
            &format!("{path}#read_port"),
            EdgeParams::prefixed("read_"),
        )?;
        Ok(path)
    }

    pub fn handle(&self) -> FifoHandle {
        Arc::clone(&self.fifo)
    }
}

impl Component for FifoComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Fifo
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn accessor(self: Arc<Self>, attr: &str, _params: &EdgeParams) -> GraphResult<Port> {
        match attr {
            "interface" => Ok(Port::Fifo(self.handle())),
            _ => Err(crate::component::unknown_port(
                &self.path,
                ComponentKind::Fifo,
                attr,
                "output",
            )),
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_fifo_is_empty() {
        let fifo = Fifo::new(32, 4).unwrap();
        assert!(fifo.empty());
        assert!(!fifo.full());
        assert_eq!(fifo.capacity(), 3);
        let status = fifo.status();
        assert_eq!(status.rdcnt, 0);
        assert_eq!(status.wrcnt, 3);
    }

    #[test]
    fn test_fill_then_overflow() {
        let mut fifo = Fifo::new(32, 4).unwrap();
        for word in 1..=3 {
            fifo.write_edge(true, word);
            assert!(fifo.wack());
        }
        assert!(fifo.full());

        fifo.write_edge(true, 99);
        assert!(fifo.overflow());
        assert!(!fifo.wack());
        assert_eq!(fifo.write_pointer(), 3);

        // flags hold only until the next write edge
        fifo.write_edge(false, 0);
        assert!(!fifo.overflow());

        assert_eq!(fifo.read_edge(true), Some(1));
        assert_eq!(fifo.read_edge(true), Some(2));
        assert_eq!(fifo.read_edge(true), Some(3));
        assert!(fifo.dvld());
        assert_eq!(fifo.q(), 3);
    }

    #[test]
    fn test_underflow() {
        let mut fifo = Fifo::new(32, 4).unwrap();
        assert_eq!(fifo.read_edge(true), None);
        assert!(fifo.underflow());
        assert!(!fifo.dvld());
        assert_eq!(fifo.read_pointer(), 0);

        fifo.read_edge(false);
        assert!(!fifo.underflow());
    }

    #[test]
    fn test_wraparound_and_width_mask() {
        let mut fifo = Fifo::new(8, 3).unwrap();
        for round in 0..5u32 {
            fifo.write_edge(true, 0x100 + round);
            assert_eq!(fifo.read_edge(true), Some(round));
        }
        assert!(fifo.empty());
    }

    #[test]
    fn test_reset() {
        let mut fifo = Fifo::new(32, 4).unwrap();
        fifo.write_edge(true, 5);
        fifo.read_edge(true);
        fifo.read_edge(true);
        assert!(fifo.underflow());

        fifo.reset();
        assert_eq!(fifo.status(), Fifo::new(32, 4).unwrap().status());
        assert_eq!(fifo.write_pointer(), 0);
    }

    #[test]
    fn test_depth_one_is_rejected() {
        assert_eq!(Fifo::new(32, 1).unwrap_err(), StorageError::Depth(1));
        assert_eq!(Fifo::new(0, 4).unwrap_err(), StorageError::Width(0));

        let mut graph = Graph::new();
        let err = FifoComponent::declare(&mut graph, "", "fifo", 32, 1).unwrap_err();
        assert!(matches!(
            err,
            GraphError::InvalidConfig { kind: ComponentKind::Fifo, ref message, .. }
                if message == "fifo depth must be at least 2, got 1"
        ));
    }

    #[test]
    fn test_declare_wires_backing_ram() {
        let mut graph = Graph::new();
        let path = FifoComponent::declare(&mut graph, "", "fifo", 32, 8).unwrap();
        assert_eq!(path, "/fifo");

        let fifo = graph.instance_as::<FifoComponent>("/fifo").unwrap();
        let handle = fifo.handle();
        handle.lock().write_edge(true, 42);
        assert_eq!(handle.lock().read_edge(true), Some(42));

        let ram = graph.instance_as::<crate::storage::ram::Ram>("/fifo/ram").unwrap();
        assert_eq!(ram.contents().lock().read(0), 42);
    }
}
