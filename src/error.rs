//! Error types for graph construction, bus transactions and simulation runs.
//!
//! Graph and routing errors are wiring bugs and abort the load phase.
//! Alignment errors are caller bugs. Timeouts mean an unresponsive slave and
//! propagate to the issuing master. FIFO overflow/underflow are *not* errors;
//! they are status flags on the storage primitives.

use thiserror::Error;

use crate::component::{ComponentKind, PortKind};
use crate::types::{Address, SimTime, Word};

/// Errors raised by the graph store while declaring, wiring or constructing nodes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("cannot resolve path '{path}': no segment '{segment}'")]
    Path { path: String, segment: String },

    #[error("node '{name}' already exists under '{parent}'")]
    DuplicateName { parent: String, name: String },

    #[error("malformed node reference '{0}' (expected '<path>#<attribute>')")]
    MalformedReference(String),

    #[error("{kind:?} at '{path}' has no {direction} port '{attr}'")]
    UnknownPort {
        path: String,
        kind: ComponentKind,
        attr: String,
        direction: &'static str,
    },

    #[error("port mismatch on '{path}#{attr}': expected {expected:?}, got {actual:?}")]
    PortMismatch {
        path: String,
        attr: String,
        expected: PortKind,
        actual: PortKind,
    },

    #[error("invalid config for {kind:?} at '{path}': {message}")]
    InvalidConfig {
        path: String,
        kind: ComponentKind,
        message: String,
    },

    #[error("'{path}' is missing required input '{attr}'")]
    MissingInput { path: String, attr: String },

    #[error("'{path}#{attr}' takes a single edge but has {count}")]
    InputArity {
        path: String,
        attr: String,
        count: usize,
    },

    #[error("construction cycle detected at '{0}'")]
    ConstructionCycle(String),

    #[error("no constructor registered for {0:?}")]
    UnregisteredKind(ComponentKind),

    #[error("invalid node name '{0}'")]
    InvalidName(String),

    #[error("instance at '{path}' is not a {expected}")]
    WrongInstanceType { path: String, expected: &'static str },

    #[error("cannot export '{path}': {message}")]
    Export { path: String, message: String },
}

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors raised while running a bus transaction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BusError {
    #[error("unaligned bus access at {0:#010x}")]
    Alignment(Address),

    #[error("bus timeout at {address:#010x} after {wait_cycles} wait cycles ({elapsed} ns > {timeout} ns)")]
    Timeout {
        address: Address,
        wait_cycles: u32,
        elapsed: SimTime,
        timeout: SimTime,
    },

    #[error("no slave routes address {address:#010x} (index {index}, {slaves} slaves)")]
    Route {
        address: Address,
        index: usize,
        slaves: usize,
    },

    #[error("slave error at {address:#010x}: {message}")]
    SlaveError { address: Address, message: String },

    #[error("bus lock requested by '{requester}' is held by '{holder}'")]
    LockHeld { holder: String, requester: String },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Shape errors of the storage primitives.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("fifo depth must be at least 2, got {0}")]
    Depth(usize),

    #[error("width must be 1..=32, got {0}")]
    Width(u32),
}

/// Errors that abort a simulation run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("master '{master}' held the bus lock for more than {limit} consecutive steps")]
    LockStarvation { master: String, limit: u64 },

    #[error("read from {address:#010x} returned {actual:#x}, expected {expected:#x}")]
    ReadMismatch {
        address: Address,
        expected: Word,
        actual: Word,
    },
}

/// Result type for simulation runs.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let err = GraphError::Path {
            path: "/soc/nope".into(),
            segment: "nope".into(),
        };
        assert!(err.to_string().contains("/soc/nope"));

        let err = BusError::Alignment(0x41);
        assert_eq!(err.to_string(), "unaligned bus access at 0x00000041");

        let err = BusError::Route {
            address: 0x0300,
            index: 3,
            slaves: 2,
        };
        assert!(err.to_string().contains("0x00000300"));
    }

    #[test]
    fn test_error_conversions() {
        let graph = GraphError::ConstructionCycle("/a".into());
        let bus: BusError = graph.clone().into();
        assert_eq!(bus, BusError::Graph(graph.clone()));

        let sim: SimError = bus.into();
        assert!(matches!(sim, SimError::Bus(BusError::Graph(_))));

        let sim: SimError = graph.into();
        assert!(matches!(sim, SimError::Graph(_)));
    }
}
