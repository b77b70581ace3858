//! The bus matrix: address routing, bus time, the lock and the trace.
//!
//! Slave index for an address is `(address & !mask) >> ceil(log2(mask + 1))`,
//! so with `address_mask = 0xffff` the first slave answers `0x0000_xxxx`,
//! the second `0x0001_xxxx`, and so on. A bus with a single slave routes
//! every address to it.
//!
//! The matrix keeps its slave and master wires unresolved until they are
//! needed, so a DMA can hold the bus while also being one of its slaves.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::bus::transaction::Transaction;
use crate::bus::{BusSignals, Direction, Slave};
use crate::component::{unknown_port, Component, ComponentKind, ConstructParams, Port};
use crate::edge::{EdgeParams, Wire};
use crate::error::{BusError, BusResult, GraphResult};
use crate::event::{BusEvent, BusEventKind};
use crate::executor::Master;
use crate::graph::Graph;
use crate::stats::BusStats;
use crate::types::{Address, SimTime, Word};

/// Bus period used when neither a clock nor a `duration` is configured (10 MHz).
pub const DEFAULT_DURATION: SimTime = 100;

/// Config of a `BusMatrix` node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMatrixConfig {
    pub address_mask: Address,
    /// Bus period in ns; ignored when a clock is wired to `clk`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<SimTime>,
    /// Transfer timeout in ns; defaults to five bus periods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<SimTime>,
    /// Record every operation in the bus trace
    #[serde(default = "default_trace")]
    pub trace: bool,
}

fn default_trace() -> bool {
    true
}

#[derive(Debug, Default)]
struct BusState {
    signals: BusSignals,
    now: SimTime,
    holder: Option<String>,
    trace: Vec<BusEvent>,
    stats: BusStats,
}

impl BusState {
    fn record(&mut self, enabled: bool, event: BusEvent) {
        if enabled {
            self.trace.push(event);
        }
    }
}

/// The bus matrix component.
pub struct BusMatrix {
    path: String,
    address_mask: Address,
    shift: u32,
    duration: SimTime,
    timeout: SimTime,
    trace_enabled: bool,
    slave_wires: Vec<Wire>,
    master_wires: Vec<Wire>,
    slaves: Mutex<Option<Vec<Arc<dyn Slave>>>>,
    state: Mutex<BusState>,
}

/// Number of address bits below the slave index: `ceil(log2(mask + 1))`.
fn index_shift(mask: Address) -> u32 {
    let span = u64::from(mask) + 1;
    if span <= 1 {
        0
    } else {
        u64::BITS - (span - 1).leading_zeros()
    }
}

impl BusMatrix {
    /// Creates an unwired matrix, mainly for tests and benches.
    pub fn new(path: impl Into<String>, address_mask: Address, duration: SimTime) -> Self {
        Self::with_wires(path, address_mask, duration, None, true, Vec::new(), Vec::new())
    }

    fn with_wires(
        path: impl Into<String>,
        address_mask: Address,
        duration: SimTime,
        timeout: Option<SimTime>,
        trace_enabled: bool,
        slave_wires: Vec<Wire>,
        master_wires: Vec<Wire>,
    ) -> Self {
        Self {
            path: path.into(),
            address_mask,
            shift: index_shift(address_mask),
            duration,
            timeout: timeout.unwrap_or(5 * duration),
            trace_enabled,
            slave_wires,
            master_wires,
            slaves: Mutex::new(None),
            state: Mutex::new(BusState::default()),
        }
    }

    /// Builds the matrix from its node config and `clk`/`slaves`/`masters` inputs.
    pub fn construct(graph: &Graph, params: ConstructParams) -> GraphResult<Arc<Self>> {
        let config: BusMatrixConfig = params.config()?;
        let duration = match params.inputs.optional("clk")? {
            Some(wire) => {
                let clock = wire.clock(graph)?;
                if config.duration.is_some() {
                    warn!(bus = %params.path, "duration ignored, bus follows {}", clock.name);
                }
                clock.duration
            }
            None => config.duration.unwrap_or(DEFAULT_DURATION),
        };

        let slave_wires = params.inputs.all("slaves");
        let master_wires = params.inputs.all("masters");
        debug!(
            bus = %params.path,
            duration,
            slaves = slave_wires.len(),
            masters = master_wires.len(),
            "bus matrix built"
        );
        Ok(Arc::new(Self::with_wires(
            params.path,
            config.address_mask,
            duration,
            config.timeout,
            config.trace,
            slave_wires,
            master_wires,
        )))
    }

    /// Attaches an already-resolved slave. Used by tests and benches.
    pub fn with_slave(self, slave: Arc<dyn Slave>) -> Self {
        self.slaves.lock().get_or_insert_with(Vec::new).push(slave);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn address_mask(&self) -> Address {
        self.address_mask
    }

    /// Bus clock period in ns.
    pub fn duration(&self) -> SimTime {
        self.duration
    }

    pub fn timeout(&self) -> SimTime {
        self.timeout
    }

    pub fn slave_count(&self) -> usize {
        match &*self.slaves.lock() {
            Some(slaves) => slaves.len(),
            None => self.slave_wires.len(),
        }
    }

    /// Maps an address to the index of the slave that answers it.
    pub fn route(&self, address: Address) -> BusResult<usize> {
        let slaves = self.slave_count();
        if slaves == 1 {
            return Ok(0);
        }
        let index = (u64::from(address & !self.address_mask) >> self.shift) as usize;
        if index >= slaves {
            return Err(BusError::Route {
                address,
                index,
                slaves,
            });
        }
        Ok(index)
    }

    fn resolve_slaves(&self, graph: &Graph) -> GraphResult<Vec<Arc<dyn Slave>>> {
        let mut cached = self.slaves.lock();
        if let Some(slaves) = &*cached {
            return Ok(slaves.clone());
        }
        // Resolving may construct slave nodes; none of them touch this lock.
        let slaves = self
            .slave_wires
            .iter()
            .map(|wire| wire.slave(graph))
            .collect::<GraphResult<Vec<_>>>()?;
        *cached = Some(slaves.clone());
        Ok(slaves)
    }

    fn slave_for(&self, graph: &Graph, address: Address) -> BusResult<(usize, Arc<dyn Slave>)> {
        let slaves = self.resolve_slaves(graph)?;
        let index = self.route(address)?;
        let slave = slaves.get(index).cloned().ok_or(BusError::Route {
            address,
            index,
            slaves: slaves.len(),
        })?;
        Ok((index, slave))
    }

    /// Resolves the master wires into runnable masters, in wiring order.
    pub fn masters(&self, graph: &Graph) -> GraphResult<Vec<Box<dyn Master>>> {
        self.master_wires.iter().map(|wire| wire.master(graph)).collect()
    }

    /// Reads a word on behalf of `master`.
    pub fn read(&self, graph: &Graph, master: &str, address: Address) -> BusResult<Word> {
        let tx = Transaction::read(address, self.duration, self.timeout)?;
        self.transfer(graph, master, tx).map(|data| data.unwrap_or_default())
    }

    /// Writes a word on behalf of `master`.
    pub fn write(&self, graph: &Graph, master: &str, address: Address, data: Word) -> BusResult<()> {
        let tx = Transaction::write(address, data, self.duration, self.timeout)?;
        self.transfer(graph, master, tx).map(drop)
    }

    fn transfer(&self, graph: &Graph, master: &str, mut tx: Transaction) -> BusResult<Option<Word>> {
        let address = tx.address();
        let direction = tx.direction();
        let routed = self.slave_for(graph, address);

        let mut state = self.state.lock();
        let (index, slave) = match routed {
            Ok(found) => found,
            Err(e) => {
                state.stats.errors += 1;
                return Err(e);
            }
        };

        let start = state.now;
        let outcome = tx.run_to_completion(&mut state.signals, slave.as_ref());
        state.now += tx.spent();
        let end = state.now;
        state.stats.wait_cycles += u64::from(tx.wait_cycles());

        match outcome {
            Ok(_) => {
                let data = match direction {
                    Direction::Read => tx.result().unwrap_or_default(),
                    Direction::Write => state.signals.pwdata,
                };
                let kind = match direction {
                    Direction::Read => {
                        state.stats.reads += 1;
                        BusEventKind::Read {
                            address,
                            data,
                            slave: index,
                            wait_cycles: tx.wait_cycles(),
                        }
                    }
                    Direction::Write => {
                        state.stats.writes += 1;
                        BusEventKind::Write {
                            address,
                            data,
                            slave: index,
                            wait_cycles: tx.wait_cycles(),
                        }
                    }
                };
                debug!(bus = %self.path, master, address, data, ?direction, "transfer done");
                state.record(self.trace_enabled, BusEvent::new(start, end, master, kind));
                Ok(tx.result())
            }
            Err(e) => {
                let kind = match e {
                    BusError::Timeout { .. } => {
                        state.stats.timeouts += 1;
                        BusEventKind::Timeout { address, direction }
                    }
                    _ => {
                        state.stats.errors += 1;
                        BusEventKind::SlaveError { address, direction }
                    }
                };
                warn!(bus = %self.path, master, slave = slave.name(), error = %e, "transfer failed");
                state.record(self.trace_enabled, BusEvent::new(start, end, master, kind));
                Err(e)
            }
        }
    }

    /// Lets the bus clock run for `cycles` periods with nothing selected.
    pub fn idle(&self, cycles: u32) {
        let mut state = self.state.lock();
        state.now += SimTime::from(cycles) * self.duration;
        state.signals.pclk = false;
        state.stats.idle_cycles += u64::from(cycles);
    }

    /// Resets every slave, then holds `presetn` low for two bus periods.
    ///
    /// The low window is recorded as one `Reset` event; once it ends every
    /// signal, `presetn` included, is back at its power-on value.
    pub fn reset(&self, graph: &Graph, master: &str) -> BusResult<()> {
        let slaves = self.resolve_slaves(graph)?;
        for slave in &slaves {
            slave.reset();
        }

        let mut state = self.state.lock();
        let start = state.now;
        state.signals = BusSignals::default();
        state.now += 2 * self.duration;
        state.stats.resets += 1;
        let end = state.now;
        info!(bus = %self.path, slaves = slaves.len(), "bus reset");
        state.record(
            self.trace_enabled,
            BusEvent::new(start, end, master, BusEventKind::Reset),
        );
        Ok(())
    }

    /// Takes the bus lock for `owner`. Re-locking by the holder is a no-op.
    pub fn lock(&self, owner: &str) -> BusResult<()> {
        let mut state = self.state.lock();
        match &state.holder {
            Some(holder) if holder == owner => Ok(()),
            Some(holder) => Err(BusError::LockHeld {
                holder: holder.clone(),
                requester: owner.to_string(),
            }),
            None => {
                state.holder = Some(owner.to_string());
                state.stats.lock_windows += 1;
                let now = state.now;
                state.record(
                    self.trace_enabled,
                    BusEvent::new(now, now, owner, BusEventKind::Lock),
                );
                Ok(())
            }
        }
    }

    /// Releases the bus lock held by `owner`. Unlocking a free bus is a no-op.
    pub fn unlock(&self, owner: &str) -> BusResult<()> {
        let mut state = self.state.lock();
        match &state.holder {
            None => Ok(()),
            Some(holder) if holder != owner => Err(BusError::LockHeld {
                holder: holder.clone(),
                requester: owner.to_string(),
            }),
            Some(_) => {
                state.holder = None;
                let now = state.now;
                state.record(
                    self.trace_enabled,
                    BusEvent::new(now, now, owner, BusEventKind::Unlock),
                );
                Ok(())
            }
        }
    }

    /// Releases the lock whoever holds it and returns the former holder.
    pub fn release_lock(&self) -> Option<String> {
        let mut state = self.state.lock();
        let holder = state.holder.take()?;
        let now = state.now;
        state.record(
            self.trace_enabled,
            BusEvent::new(now, now, holder.as_str(), BusEventKind::Unlock),
        );
        Some(holder)
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().holder.is_some()
    }

    /// Name of the master holding the lock, if any.
    pub fn lock_holder(&self) -> Option<String> {
        self.state.lock().holder.clone()
    }

    /// Current bus time.
    pub fn now(&self) -> SimTime {
        self.state.lock().now
    }

    pub fn signals(&self) -> BusSignals {
        self.state.lock().signals
    }

    pub fn trace(&self) -> Vec<BusEvent> {
        self.state.lock().trace.clone()
    }

    /// Empties the trace and returns what it held.
    pub fn take_trace(&self) -> Vec<BusEvent> {
        std::mem::take(&mut self.state.lock().trace)
    }

    pub fn stats(&self) -> BusStats {
        self.state.lock().stats.clone()
    }

    /// Exports bus state and counters as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        let state = self.state.lock();
        json!({
            "path": self.path,
            "now": state.now,
            "duration": self.duration,
            "timeout": self.timeout,
            "address_mask": self.address_mask,
            "locked_by": state.holder,
            "trace_len": state.trace.len(),
            "stats": state.stats,
        })
    }
}

impl std::fmt::Debug for BusMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusMatrix")
            .field("path", &self.path)
            .field("address_mask", &format_args!("{:#x}", self.address_mask))
            .field("duration", &self.duration)
            .field("timeout", &self.timeout)
            .field("slaves", &self.slave_wires.len())
            .field("masters", &self.master_wires.len())
            .finish()
    }
}

impl Component for BusMatrix {
    fn kind(&self) -> ComponentKind {
        ComponentKind::BusMatrix
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn accessor(self: Arc<Self>, attr: &str, _params: &EdgeParams) -> GraphResult<Port> {
        match attr {
            "interface" => Ok(Port::Bus(self)),
            _ => Err(unknown_port(&self.path, ComponentKind::BusMatrix, attr, "output")),
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
