//! Clock domains and clocked processes.
//!
//! A [`ClockDomain`] turns the shared bus timeline into a count of posedges
//! of its own clock, so a process running at 1 MHz next to a 10 MHz bus sees
//! exactly one edge every ten bus periods. Edges fall at `k * period` for
//! `k >= 1`.

use crate::types::SimTime;

/// Something advanced along the bus timeline.
pub trait Clocked: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Runs every clock edge up to and including `now`.
    fn advance_to(&mut self, now: SimTime);

    /// Returns to power-on state at bus time `now`.
    fn reset(&mut self, _now: SimTime) {}
}

/// Posedge counter for one clock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClockDomain {
    period: SimTime,
    current_time: SimTime,
    edges: u64,
}

impl ClockDomain {
    /// Creates a domain with the given period in ns. A zero period never ticks.
    pub fn new(period: SimTime) -> Self {
        Self {
            period,
            current_time: 0,
            edges: 0,
        }
    }

    pub fn period(&self) -> SimTime {
        self.period
    }

    /// Time of the last edge taken.
    pub fn current_time(&self) -> SimTime {
        self.current_time
    }

    /// Total edges taken since creation or reset.
    pub fn edges(&self) -> u64 {
        self.edges
    }

    /// Takes every edge up to `now` and returns how many were new.
    pub fn edges_until(&mut self, now: SimTime) -> u64 {
        if self.period == 0 {
            return 0;
        }
        let mut taken = 0;
        while self.current_time + self.period <= now {
            self.current_time += self.period;
            taken += 1;
        }
        self.edges += taken;
        taken
    }

    /// Restarts the edge count with the next edge one period after `now`.
    pub fn reset_at(&mut self, now: SimTime) {
        self.current_time = now;
        self.edges = 0;
    }
}
