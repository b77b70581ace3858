//! Core type definitions for the simulation framework.
//!
//! This module defines the fundamental types used throughout the graph store
//! and the bus model.

use std::sync::Arc;

use parking_lot::Mutex;

/// Simulation time unit (nanoseconds).
///
/// Bus clock periods, transaction timeouts and clock-domain edges all use the
/// same `SimTime` representation, so every component shares one timeline.
pub type SimTime = u64;

/// A 32-bit bus address.
pub type Address = u32;

/// A 32-bit bus data word.
pub type Word = u32;

/// Index of a node inside the graph store arena.
///
/// The root node is always `NodeId(0)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The root node of every graph.
    pub const ROOT: NodeId = NodeId(0);

    /// Returns the arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of an edge inside the graph store's edge table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub usize);

impl EdgeId {
    /// Returns the edge table index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Shared, lock-protected component state.
///
/// Components hand clones of these out through their accessors; a lock is only
/// ever held for the duration of a single method on the owning component.
pub type Shared<T> = Arc<Mutex<T>>;

/// Wraps a value in a [`Shared`] handle.
pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Nanoseconds per clock period for a frequency given in Hz.
///
/// Returns 0 for a zero frequency.
pub fn period_from_freq(freq: f64) -> SimTime {
    if freq <= 0.0 {
        return 0;
    }
    (1e9 / freq) as SimTime
}
