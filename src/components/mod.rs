//! Concrete component kinds.
//!
//! Each module holds the config struct a node of that kind deserializes, the
//! component itself, and a `declare` helper that adds the node to a graph
//! together with its usual wiring.

pub mod clock;
pub mod cpu;
pub mod dma;
pub mod fifo_sink;
pub mod flag;
pub mod memory;
pub mod peripheral;
pub mod synchronize;

pub use clock::{Clock, ClockConfig, ClockSpec};
pub use cpu::{BusOp, Cpu, CpuConfig};
pub use dma::{Dma, DmaConfig, DmaRegisters};
pub use fifo_sink::{FifoSink, FifoSinkConfig};
pub use flag::{Flag, FlagConfig, SignalLine};
pub use memory::{Memory, MemoryConfig};
pub use peripheral::{PeripheralConfig, StatusPeripheral};
pub use synchronize::{Synchronize, SynchronizeConfig};
