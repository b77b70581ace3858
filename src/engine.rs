//! Top-level simulation driver.
//!
//! A `Simulation` owns a [`Graph`] and the [`Arbiter`] of one of its bus
//! matrices, and is the usual entry point for running a system built from a
//! [`SystemConfig`].

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::bus::BusMatrix;
use crate::config::{ConfigResult, SimulationParams, SystemConfig};
use crate::error::{GraphResult, SimResult};
use crate::executor::Arbiter;
use crate::graph::Graph;
use crate::stats::{SimulationStats, StatsCollector};
use crate::types::SimTime;

/// A graph plus the arbiter driving its bus.
///
/// # Example
///
/// ```
/// use socgraph::components::{BusOp, Cpu, Flag, StatusPeripheral};
/// use socgraph::{ComponentKind, Graph, Simulation};
/// use serde_json::json;
///
/// let mut graph = Graph::new();
/// graph.add_node("", "bus", ComponentKind::BusMatrix, json!({"address_mask": 0xff})).unwrap();
/// Flag::declare(&mut graph, "", "led", false).unwrap();
/// StatusPeripheral::declare(&mut graph, "", "status", "/bus", "/led", None, None).unwrap();
/// Cpu::declare(&mut graph, "", "cpu", "/bus", vec![BusOp::Write { address: 0x40, data: 1 }]).unwrap();
///
/// let mut sim = Simulation::new(graph, "/bus").unwrap();
/// sim.run(10).unwrap();
/// assert!(sim.graph().instance_as::<Flag>("/led").unwrap().get());
/// ```
pub struct Simulation {
    graph: Graph,
    arbiter: Arbiter,
    params: SimulationParams,
}

impl Simulation {
    /// Builds the arbiter for the bus at `bus_path` with default parameters.
    pub fn new(graph: Graph, bus_path: &str) -> SimResult<Self> {
        let params = SimulationParams {
            bus: bus_path.to_string(),
            ..SimulationParams::default()
        };
        Self::with_params(graph, params)
    }

    /// Builds the arbiter described by `params`.
    pub fn with_params(graph: Graph, params: SimulationParams) -> SimResult<Self> {
        let arbiter = Arbiter::from_graph(&graph, &params.bus)?
            .with_lock_step_limit(params.lock_step_limit);
        Ok(Self {
            graph,
            arbiter,
            params,
        })
    }

    /// Builds the graph and arbiter described by `config`, and installs the global subscriber at
    /// `simulation.log_level` unless one is already installed.
    pub fn from_config(config: &SystemConfig) -> ConfigResult<Self> {
        let graph = config.build()?;
        let level = &config.simulation.log_level;
        if crate::try_init_logging(level) {
            debug!(%level, "logging initialized");
        }
        Ok(Self::with_params(graph, config.simulation.clone())?)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn bus(&self) -> &Arc<BusMatrix> {
        self.arbiter.bus()
    }

    /// Current bus time in ns.
    pub fn now(&self) -> SimTime {
        self.bus().now()
    }

    /// Resets the bus, its slaves and every clocked process.
    pub fn reset(&mut self) -> SimResult<()> {
        self.arbiter.reset(&self.graph)
    }

    /// Runs one arbiter pass.
    pub fn pass(&mut self) -> SimResult<()> {
        self.arbiter.pass(&self.graph)
    }

    /// Runs up to `passes` passes. Returns the number run.
    pub fn run(&mut self, passes: u64) -> SimResult<u64> {
        let ran = self.arbiter.run(&self.graph, passes)?;
        info!(
            name = %self.params.name,
            passes = ran,
            now = self.now(),
            "run finished"
        );
        Ok(ran)
    }

    /// Runs up to the configured `max_passes`.
    pub fn run_configured(&mut self) -> SimResult<u64> {
        self.run(self.params.max_passes)
    }

    /// Runs until `done` holds, at most `max_passes` passes.
    pub fn run_until<F>(&mut self, done: F, max_passes: u64) -> SimResult<bool>
    where
        F: FnMut(&Graph, &Arbiter) -> bool,
    {
        self.arbiter.run_until(&self.graph, done, max_passes)
    }

    /// Exports bus and arbiter state as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        json!({
            "name": self.params.name,
            "nodes": self.graph.len(),
            "edges": self.graph.edge_count(),
            "bus": self.bus().export_stats(),
            "arbiter": self.arbiter.export_stats(),
        })
    }

    /// Runs `passes` passes and returns timing and counters.
    pub fn collect_stats(&mut self, passes: u64) -> SimResult<SimulationStats> {
        let mut collector = StatsCollector::new(&self.params.name, &self.params.bus);
        collector.start();
        self.run(passes)?;
        Ok(collector.finish(
            self.now(),
            self.bus().stats(),
            self.arbiter.stats().clone(),
        ))
    }

    /// The graph as JSON lines.
    pub fn snapshot_jsonl(&self) -> GraphResult<String> {
        self.graph.snapshot_jsonl()
    }

    /// Gives the graph back.
    pub fn into_graph(self) -> Graph {
        self.graph
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("params", &self.params)
            .field("arbiter", &self.arbiter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::memory::Memory;
    use crate::components::{BusOp, Cpu};
    use crate::component::ComponentKind;

    fn graph() -> Graph {
        let mut graph = Graph::new();
        graph
            .add_node("", "bus", ComponentKind::BusMatrix, json!({"address_mask": 0xffff, "duration": 50}))
            .unwrap();
        Memory::declare(&mut graph, "", "mem", "/bus", Memory::config(32, 16)).unwrap();
        Cpu::declare(
            &mut graph,
            "",
            "cpu",
            "/bus",
            vec![
                BusOp::Write { address: 0, data: 5 },
                BusOp::Read {
                    address: 0,
                    expect: Some(5),
                },
            ],
        )
        .unwrap();
        graph
    }

    #[test]
    fn test_run_to_completion() {
        let mut sim = Simulation::new(graph(), "/bus").unwrap();
        assert_eq!(sim.arbiter().master_names(), vec!["/cpu"]);
        let passes = sim.run(100).unwrap();
        assert_eq!(passes, 3);
        assert!(sim.arbiter().all_done());
        assert_eq!(sim.now(), 2 * 150);
    }

    #[test]
    fn test_export_stats() {
        let mut sim = Simulation::new(graph(), "/bus").unwrap();
        sim.run(100).unwrap();
        let stats = sim.export_stats();
        assert_eq!(stats["bus"]["stats"]["writes"], 1);
        assert_eq!(stats["bus"]["stats"]["reads"], 1);
        assert_eq!(stats["arbiter"]["passes"], 3);
    }

    #[test]
    fn test_collect_stats() {
        let mut sim = Simulation::new(graph(), "/bus").unwrap();
        let stats = sim.collect_stats(100).unwrap();
        assert_eq!(stats.bus.transfers(), 2);
        assert_eq!(stats.final_time, 300);
        assert_eq!(stats.run.bus, "/bus");
    }

    #[test]
    fn test_reset_restores_memory() {
        let mut sim = Simulation::new(graph(), "/bus").unwrap();
        sim.run(100).unwrap();
        sim.reset().unwrap();
        let mem = sim.graph().instance_as::<Memory>("/mem").unwrap();
        assert_eq!(mem.peek(0), Some(0));
        assert_eq!(sim.bus().stats().resets, 1);
    }

    #[test]
    fn test_unknown_bus() {
        assert!(Simulation::new(graph(), "/nope").is_err());
    }
}
