//! Execution of bus masters and clocked processes.
//!
//! The simulation is cooperative and single threaded. Masters implement
//! [`Master`] and are stepped one at a time by the [`Arbiter`]; everything
//! else that reacts to time (FIFO read domains, status lines) implements
//! [`Clocked`] and is advanced to the bus time after every master step.

pub mod arbiter;
pub mod tick;

use serde::{Deserialize, Serialize};

use crate::error::SimResult;
use crate::graph::Graph;

pub use arbiter::{Arbiter, DEFAULT_LOCK_STEP_LIMIT};
pub use tick::{ClockDomain, Clocked};

/// Outcome of one master step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasterStep {
    /// Issued at least one bus operation
    Transacted,
    /// Had nothing to do and let the bus idle
    Idle,
    /// Finished; the arbiter skips it from now on
    Done,
}

/// A bus master driven by the arbiter.
///
/// # Implementation Notes
///
/// A step should issue at most one logical operation. A master that needs
/// several transfers to happen atomically locks the bus in one step and
/// unlocks it in a later one; the arbiter keeps re-stepping it in between.
pub trait Master: Send {
    /// Name used as the lock owner and in the bus trace.
    fn name(&self) -> &str;

    /// Performs one step of work.
    fn step(&mut self, graph: &Graph) -> SimResult<MasterStep>;
}
