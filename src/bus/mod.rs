//! The shared peripheral bus.
//!
//! - [`transaction`]: one read or write sequenced through its clocked phases
//! - [`matrix`]: address routing, the bus clock, the lock and the trace
//!
//! Slaves implement [`Slave`]; masters drive the bus through a
//! [`BusMatrix`] handle obtained from a wire.

use serde::{Deserialize, Serialize};

use crate::error::BusResult;
use crate::types::{Address, Word};

pub mod matrix;
pub mod transaction;

pub use matrix::{BusMatrix, BusMatrixConfig, DEFAULT_DURATION};
pub use transaction::{Phase, Transaction};

/// A bus slave.
///
/// Slaves are shared (`Arc<dyn Slave>`) between the graph and the bus, so
/// every method takes `&self` and keeps its state behind a lock.
pub trait Slave: Send + Sync {
    /// Name used in traces and errors.
    fn name(&self) -> &str;

    /// Samples `pready` after `wait_cycles` completed wait cycles.
    fn is_ready(&self, _wait_cycles: u32) -> bool {
        true
    }

    /// Commits a write. Called once the slave is ready.
    fn write(&self, address: Address, data: Word) -> BusResult<()>;

    /// Performs a read. Called once the slave is ready.
    fn read(&self, address: Address) -> BusResult<Word>;

    /// Returns the slave to its power-on state.
    fn reset(&self) {}
}

/// Direction of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Read,
    Write,
}

/// The APB-style signal surface shared by every master and slave on a bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusSignals {
    pub pclk: bool,
    pub presetn: bool,
    pub paddr: Address,
    pub psel: bool,
    pub penable: bool,
    pub pwrite: bool,
    pub pwdata: Word,
    pub pready: bool,
    pub prdata: Word,
    pub pslverr: bool,
}

impl Default for BusSignals {
    fn default() -> Self {
        Self {
            pclk: false,
            presetn: true,
            paddr: 0,
            psel: false,
            penable: false,
            pwrite: false,
            pwdata: 0,
            pready: true,
            prdata: 0,
            pslverr: false,
        }
    }
}

impl BusSignals {
    /// Drops select, enable and write after a transfer ends.
    pub fn deassert(&mut self) {
        self.psel = false;
        self.penable = false;
        self.pwrite = false;
    }

    /// Returns true while a transfer is in progress.
    pub fn is_active(&self) -> bool {
        self.psel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signals_default_idle() {
        let signals = BusSignals::default();
        assert!(!signals.is_active());
        assert!(signals.presetn);
        assert!(signals.pready);
    }

    #[test]
    fn test_deassert() {
        let mut signals = BusSignals {
            psel: true,
            penable: true,
            pwrite: true,
            ..Default::default()
        };
        signals.deassert();
        assert!(!signals.psel && !signals.penable && !signals.pwrite);
    }
}
