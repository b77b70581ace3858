//! Statistics collection and export.
//!
//! The bus matrix keeps [`BusStats`], the arbiter keeps [`ArbiterStats`].
//! A [`StatsCollector`] wraps a run with wall-clock timing and folds both
//! into one [`SimulationStats`] record for JSON, CSV or text output.

use std::fmt;
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::types::SimTime;

/// Counters kept by a bus matrix.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    pub reads: u64,
    pub writes: u64,
    /// Cycles spent in `idle`
    pub idle_cycles: u64,
    /// Not-ready polls across all transfers
    pub wait_cycles: u64,
    pub timeouts: u64,
    /// Slave errors and routing failures
    pub errors: u64,
    /// Number of lock/unlock windows opened
    pub lock_windows: u64,
    pub resets: u64,
}

impl BusStats {
    /// Completed transfers.
    pub fn transfers(&self) -> u64 {
        self.reads + self.writes
    }
}

/// Counters kept by the arbiter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbiterStats {
    /// Full passes over the master list
    pub passes: u64,
    /// Total `Master::step` calls
    pub master_steps: u64,
    /// Extra steps given to the lock holder
    pub lock_resteps: u64,
    /// Turns other masters lost while the bus was locked
    pub skipped_by_lock: u64,
    /// Locks released because their holder finished without unlocking
    #[serde(default)]
    pub forced_unlocks: u64,
}

/// Identity of a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub name: String,
    /// Path of the bus matrix node
    pub bus: String,
    /// Crate version that produced the record
    pub version: String,
    /// Unix seconds
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
}

/// Wall-clock cost of a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    pub wall_time_ms: f64,
    /// Simulated ns per wall-clock second
    pub sim_ns_per_second: f64,
    pub transfers_per_second: f64,
}

/// Everything known about one run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub run: RunInfo,
    /// Bus time at the end of the run
    pub final_time: SimTime,
    pub bus: BusStats,
    pub arbiter: ArbiterStats,
    pub throughput: Throughput,
}

impl SimulationStats {
    pub fn new(name: impl Into<String>, bus: impl Into<String>) -> Self {
        Self {
            run: RunInfo {
                name: name.into(),
                bus: bus.into(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..RunInfo::default()
            },
            ..Self::default()
        }
    }

    fn measure(&mut self, wall_time_ms: f64) {
        self.throughput.wall_time_ms = wall_time_ms;
        if wall_time_ms > 0.0 {
            let seconds = wall_time_ms / 1000.0;
            self.throughput.sim_ns_per_second = self.final_time as f64 / seconds;
            self.throughput.transfers_per_second = self.bus.transfers() as f64 / seconds;
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// One `metric,value` row per counter.
    pub fn to_csv(&self) -> String {
        let rows: [(&str, u64); 13] = [
            ("final_time", self.final_time),
            ("reads", self.bus.reads),
            ("writes", self.bus.writes),
            ("idle_cycles", self.bus.idle_cycles),
            ("wait_cycles", self.bus.wait_cycles),
            ("timeouts", self.bus.timeouts),
            ("errors", self.bus.errors),
            ("lock_windows", self.bus.lock_windows),
            ("passes", self.arbiter.passes),
            ("master_steps", self.arbiter.master_steps),
            ("lock_resteps", self.arbiter.lock_resteps),
            ("skipped_by_lock", self.arbiter.skipped_by_lock),
            ("forced_unlocks", self.arbiter.forced_unlocks),
        ];
        rows.iter()
            .fold(String::from("metric,value\n"), |mut csv, (metric, value)| {
                csv.push_str(&format!("{metric},{value}\n"));
                csv
            })
    }

    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SimulationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run {} on {} (v{})", self.run.name, self.run.bus, self.run.version)?;
        writeln!(f, "  bus time    {} ns", self.final_time)?;
        writeln!(
            f,
            "  transfers   {} reads, {} writes, {} errors, {} timeouts",
            self.bus.reads, self.bus.writes, self.bus.errors, self.bus.timeouts
        )?;
        writeln!(
            f,
            "  cycles      {} idle, {} wait",
            self.bus.idle_cycles, self.bus.wait_cycles
        )?;
        writeln!(
            f,
            "  arbiter     {} passes, {} steps, {} locked windows, {} re-steps",
            self.arbiter.passes,
            self.arbiter.master_steps,
            self.bus.lock_windows,
            self.arbiter.lock_resteps
        )?;
        write!(
            f,
            "  wall        {:.2} ms ({:.0} ns/s simulated)",
            self.throughput.wall_time_ms, self.throughput.sim_ns_per_second
        )
    }
}

fn unix_seconds() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

/// Times a run and assembles its [`SimulationStats`].
#[derive(Debug)]
pub struct StatsCollector {
    stats: SimulationStats,
    started: Option<Instant>,
}

impl StatsCollector {
    pub fn new(name: impl Into<String>, bus: impl Into<String>) -> Self {
        Self {
            stats: SimulationStats::new(name, bus),
            started: None,
        }
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.stats.run.started_at = unix_seconds();
    }

    /// Records the final counters and stops the clock.
    pub fn finish(mut self, now: SimTime, bus: BusStats, arbiter: ArbiterStats) -> SimulationStats {
        self.stats.run.finished_at = unix_seconds();
        self.stats.final_time = now;
        self.stats.bus = bus;
        self.stats.arbiter = arbiter;
        let elapsed = self
            .started
            .map(|t| t.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or_default();
        self.stats.measure(elapsed);
        self.stats
    }
}
