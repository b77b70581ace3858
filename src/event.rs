//! Bus trace events.
//!
//! The bus matrix appends one [`BusEvent`] per completed (or failed)
//! transfer and per lock, unlock and reset. The trace is how tests check
//! that a locked window was never interleaved with another master's traffic.

use serde::{Deserialize, Serialize};

use crate::bus::Direction;
use crate::types::{Address, SimTime, Word};

/// One entry of the bus trace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEvent {
    /// Bus time the operation started
    pub start: SimTime,
    /// Bus time the operation ended
    pub end: SimTime,
    /// Name of the master that issued it
    pub master: String,
    pub kind: BusEventKind,
}

/// What happened on the bus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BusEventKind {
    Read {
        address: Address,
        data: Word,
        slave: usize,
        wait_cycles: u32,
    },
    Write {
        address: Address,
        data: Word,
        slave: usize,
        wait_cycles: u32,
    },
    Timeout {
        address: Address,
        direction: Direction,
    },
    SlaveError {
        address: Address,
        direction: Direction,
    },
    Lock,
    Unlock,
    Reset,
}

impl BusEvent {
    pub fn new(start: SimTime, end: SimTime, master: impl Into<String>, kind: BusEventKind) -> Self {
        Self {
            start,
            end,
            master: master.into(),
            kind,
        }
    }

    /// Returns true for completed reads and writes.
    pub fn is_transfer(&self) -> bool {
        matches!(
            self.kind,
            BusEventKind::Read { .. } | BusEventKind::Write { .. }
        )
    }

    /// Address of the transfer, if this event is one.
    pub fn address(&self) -> Option<Address> {
        match self.kind {
            BusEventKind::Read { address, .. }
            | BusEventKind::Write { address, .. }
            | BusEventKind::Timeout { address, .. }
            | BusEventKind::SlaveError { address, .. } => Some(address),
            _ => None,
        }
    }

    /// Bus time the operation took.
    pub fn duration(&self) -> SimTime {
        self.end.saturating_sub(self.start)
    }
}
