//! Round-robin master scheduling with lock-aware re-stepping.
//!
//! Each pass visits the masters in registration order and steps each once.
//! If the bus is locked after a master's step, that master is stepped again,
//! and again, until it releases the lock; no other master runs in between.
//! After every step the clocked processes are advanced to the bus time.
//!
//! Lock acquisition between contending masters follows visit order only.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::bus::BusMatrix;
use crate::error::{SimError, SimResult};
use crate::executor::{Clocked, Master, MasterStep};
use crate::graph::Graph;
use crate::stats::ArbiterStats;

/// Consecutive locked steps allowed before a run is aborted.
pub const DEFAULT_LOCK_STEP_LIMIT: u64 = 1024;

struct Slot {
    master: Box<dyn Master>,
    done: bool,
}

/// Drives the masters of one bus.
pub struct Arbiter {
    bus: Arc<BusMatrix>,
    masters: Vec<Slot>,
    processes: Vec<Box<dyn Clocked>>,
    lock_step_limit: u64,
    stats: ArbiterStats,
}

impl Arbiter {
    /// Creates an arbiter with no masters.
    pub fn new(bus: Arc<BusMatrix>) -> Self {
        Self {
            bus,
            masters: Vec::new(),
            processes: Vec::new(),
            lock_step_limit: DEFAULT_LOCK_STEP_LIMIT,
            stats: ArbiterStats::default(),
        }
    }

    /// Builds an arbiter for the bus at `bus_path`.
    ///
    /// Masters come from the bus's `masters` input in wiring order. Every
    /// node in the graph is instantiated and each one that has a clocked
    /// process contributes it.
    pub fn from_graph(graph: &Graph, bus_path: &str) -> SimResult<Self> {
        let bus = graph.instance_as::<BusMatrix>(bus_path)?;
        let mut arbiter = Self::new(Arc::clone(&bus));
        for master in bus.masters(graph)? {
            arbiter.add_master(master);
        }
        for id in graph.descendants("", false)? {
            if let Some(process) = graph.instantiate(id)?.process() {
                arbiter.add_process(process);
            }
        }
        info!(
            bus = %bus.path(),
            masters = arbiter.masters.len(),
            processes = arbiter.processes.len(),
            "arbiter ready"
        );
        Ok(arbiter)
    }

    /// Sets the consecutive locked-step limit.
    pub fn with_lock_step_limit(mut self, limit: u64) -> Self {
        self.lock_step_limit = limit;
        self
    }

    pub fn add_master(&mut self, master: Box<dyn Master>) {
        self.masters.push(Slot {
            master,
            done: false,
        });
    }

    pub fn add_process(&mut self, process: Box<dyn Clocked>) {
        self.processes.push(process);
    }

    pub fn bus(&self) -> &Arc<BusMatrix> {
        &self.bus
    }

    /// Master names in visit order.
    pub fn master_names(&self) -> Vec<String> {
        self.masters
            .iter()
            .map(|slot| slot.master.name().to_string())
            .collect()
    }

    pub fn master_count(&self) -> usize {
        self.masters.len()
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    /// Returns true once every master reported `Done`.
    pub fn all_done(&self) -> bool {
        self.masters.iter().all(|slot| slot.done)
    }

    pub fn stats(&self) -> &ArbiterStats {
        &self.stats
    }

    fn active(&self) -> u64 {
        self.masters.iter().filter(|slot| !slot.done).count() as u64
    }

    fn advance_processes(&mut self) {
        let now = self.bus.now();
        for process in &mut self.processes {
            process.advance_to(now);
        }
    }

    fn step_master(&mut self, graph: &Graph, index: usize) -> SimResult<()> {
        let slot = &mut self.masters[index];
        let outcome = slot.master.step(graph)?;
        self.stats.master_steps += 1;
        if outcome == MasterStep::Done {
            debug!(master = slot.master.name(), "master done");
            slot.done = true;
        }
        self.advance_processes();
        Ok(())
    }

    /// Steps every active master once, re-stepping a lock holder until it
    /// releases the bus.
    pub fn pass(&mut self, graph: &Graph) -> SimResult<()> {
        for index in 0..self.masters.len() {
            if self.masters[index].done {
                continue;
            }
            self.step_master(graph, index)?;

            let mut held = 0u64;
            while self.bus.is_locked() {
                if self.masters[index].done {
                    let holder = self.bus.release_lock();
                    warn!(
                        master = self.masters[index].master.name(),
                        ?holder,
                        "master finished while holding the bus lock, lock released"
                    );
                    self.stats.forced_unlocks += 1;
                    self.advance_processes();
                    break;
                }
                held += 1;
                if held > self.lock_step_limit {
                    return Err(SimError::LockStarvation {
                        master: self.masters[index].master.name().to_string(),
                        limit: self.lock_step_limit,
                    });
                }
                self.stats.lock_resteps += 1;
                self.stats.skipped_by_lock += self.active().saturating_sub(1);
                self.step_master(graph, index)?;
            }
        }
        self.stats.passes += 1;
        Ok(())
    }

    /// Runs up to `passes` passes, stopping early once every master is done.
    ///
    /// Returns the number of passes run.
    pub fn run(&mut self, graph: &Graph, passes: u64) -> SimResult<u64> {
        let mut ran = 0;
        while ran < passes && !self.all_done() {
            self.pass(graph)?;
            ran += 1;
        }
        Ok(ran)
    }

    /// Runs passes until `done` returns true, at most `max_passes` times.
    ///
    /// Returns whether the condition was reached.
    pub fn run_until<F>(&mut self, graph: &Graph, mut done: F, max_passes: u64) -> SimResult<bool>
    where
        F: FnMut(&Graph, &Arbiter) -> bool,
    {
        for _ in 0..max_passes {
            if done(graph, self) {
                return Ok(true);
            }
            if self.all_done() {
                break;
            }
            self.pass(graph)?;
        }
        Ok(done(graph, self))
    }

    /// Resets the bus, every slave and every clocked process.
    pub fn reset(&mut self, graph: &Graph) -> SimResult<()> {
        self.bus.reset(graph, "arbiter")?;
        let now = self.bus.now();
        for process in &mut self.processes {
            process.reset(now);
        }
        self.advance_processes();
        Ok(())
    }

    pub fn export_stats(&self) -> serde_json::Value {
        json!({
            "passes": self.stats.passes,
            "master_steps": self.stats.master_steps,
            "lock_resteps": self.stats.lock_resteps,
            "skipped_by_lock": self.stats.skipped_by_lock,
            "forced_unlocks": self.stats.forced_unlocks,
            "masters": self.master_names(),
            "processes": self.processes.len(),
            "lock_step_limit": self.lock_step_limit,
        })
    }
}

impl std::fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arbiter")
            .field("bus", &self.bus.path())
            .field("masters", &self.master_names())
            .field("processes", &self.processes.len())
            .field("stats", &self.stats)
            .finish()
    }
}
