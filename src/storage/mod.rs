//! Storage primitives: dual-port RAM and the FIFO built on top of it.

pub mod fifo;
pub mod ram;

pub use fifo::{Fifo, FifoComponent, FifoConfig, FifoHandle, FifoStatus};
pub use ram::{DualPortRam, Ram, RamConfig, RamPort, RamSide};
