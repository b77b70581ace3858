//! Two-flop synchronizer carrying a signal into another clock domain.
//!
//! Each edge of `clk` shifts the input into the first stage and the first
//! stage into the output, so a change on the input shows up on `out` two
//! edges later. Both stages power up and reset to the configured default.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::trace;

use crate::component::{unknown_port, Component, ComponentKind, ConstructParams, Port, PortKind};
use crate::components::flag::SignalLine;
use crate::edge::{EdgeParams, NodeRef};
use crate::error::GraphResult;
use crate::executor::{ClockDomain, Clocked};
use crate::graph::Graph;
use crate::types::SimTime;

/// Config of a `Synchronize` node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynchronizeConfig {
    #[serde(default)]
    pub default: bool,
}

/// The `Synchronize` component.
#[derive(Debug)]
pub struct Synchronize {
    path: String,
    default: bool,
    period: SimTime,
    input: SignalLine,
    stage: SignalLine,
    output: SignalLine,
}

impl Synchronize {
    pub fn construct(graph: &Graph, params: ConstructParams) -> GraphResult<Arc<Self>> {
        let config: SynchronizeConfig = params.config()?;
        let clk = params.inputs.required("clk")?.clock(graph)?;
        let input = params.inputs.required("other_signal")?.signal(graph)?;
        let name = params.path.rsplit('/').next().unwrap_or_default().to_string();
        Ok(Arc::new(Self {
            stage: SignalLine::new(format!("{name}_delay"), config.default),
            output: SignalLine::new(name, config.default),
            default: config.default,
            period: clk.duration,
            input,
            path: params.path,
        }))
    }

    /// Declares a synchronizer sampling `signal`'s line on the edges of `clk`.
    pub fn declare(
        graph: &mut Graph,
        parent: &str,
        name: &str,
        clk: &str,
        signal: &str,
        default: bool,
    ) -> GraphResult<String> {
        let id = graph.add_node(
            parent,
            name,
            ComponentKind::Synchronize,
            json!({ "default": default }),
        )?;
        let path = graph.path_of(id).to_string();
        graph.add_edge(
            PortKind::Clock,
            &NodeRef::format(clk, "out"),
            &NodeRef::format(&path, "clk"),
            EdgeParams::named("clk"),
        )?;
        graph.add_edge(
            PortKind::Signal,
            &NodeRef::format(signal, "signals"),
            &NodeRef::format(&path, "other_signal"),
            EdgeParams::named("other_signal"),
        )?;
        Ok(path)
    }

    /// Current synchronized value.
    pub fn get(&self) -> bool {
        self.output.get()
    }

    pub fn period(&self) -> SimTime {
        self.period
    }
}

struct SyncProcess {
    name: String,
    domain: ClockDomain,
    default: bool,
    input: SignalLine,
    stage: SignalLine,
    output: SignalLine,
}

impl Clocked for SyncProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn advance_to(&mut self, now: SimTime) {
        for _ in 0..self.domain.edges_until(now) {
            let settled = self.stage.get();
            if settled != self.output.get() {
                trace!(sync = %self.name, value = settled, "output changed");
            }
            self.output.set(settled);
            self.stage.set(self.input.get());
        }
    }

    fn reset(&mut self, now: SimTime) {
        self.domain.reset_at(now);
        self.stage.set(self.default);
        self.output.set(self.default);
    }
}

impl Component for Synchronize {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Synchronize
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn accessor(self: Arc<Self>, attr: &str, params: &EdgeParams) -> GraphResult<Port> {
        match attr {
            "out" => Ok(Port::Signal(self.output.renamed(params.label(self.output.name())))),
            _ => Err(unknown_port(&self.path, ComponentKind::Synchronize, attr, "output")),
        }
    }

    fn process(self: Arc<Self>) -> Option<Box<dyn Clocked>> {
        Some(Box::new(SyncProcess {
            name: self.path.clone(),
            domain: ClockDomain::new(self.period),
            default: self.default,
            input: self.input.clone(),
            stage: self.stage.clone(),
            output: self.output.clone(),
        }))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::clock::Clock;
    use crate::components::flag::Flag;

    fn synchronizer(default: bool, input_default: bool) -> (Arc<Synchronize>, Arc<Flag>) {
        let mut graph = Graph::new();
        Clock::declare(&mut graph, "", "conv_clk", 1e6).unwrap();
        Flag::declare(&mut graph, "", "src", input_default).unwrap();
        let path =
            Synchronize::declare(&mut graph, "", "sync", "/conv_clk", "/src", default).unwrap();
        let sync = graph.instance_as::<Synchronize>(&path).unwrap();
        let src = graph.instance_as::<Flag>("/src").unwrap();
        (sync, src)
    }

    #[test]
    fn test_output_lags_two_edges() {
        let (sync, src) = synchronizer(false, false);
        assert_eq!(sync.period(), 1000);
        let mut process = Arc::clone(&sync).process().unwrap();

        src.set(true);
        process.advance_to(999);
        assert!(!sync.get());
        process.advance_to(1000);
        assert!(!sync.get());
        process.advance_to(2000);
        assert!(sync.get());

        src.set(false);
        process.advance_to(3000);
        assert!(sync.get());
        process.advance_to(4000);
        assert!(!sync.get());
    }

    #[test]
    fn test_reset_restores_default() {
        let (sync, src) = synchronizer(false, false);
        let mut process = Arc::clone(&sync).process().unwrap();
        src.set(true);
        process.advance_to(2000);
        assert!(sync.get());

        process.reset(2500);
        assert!(!sync.get());
        process.advance_to(3499);
        assert!(!sync.get());
        process.advance_to(4500);
        assert!(sync.get());
    }

    #[test]
    fn test_resetn_into_conversion_domain() {
        let (sync, resetn) = synchronizer(true, true);
        let mut process = Arc::clone(&sync).process().unwrap();
        process.advance_to(5000);
        assert!(sync.get());

        resetn.set(false);
        process.advance_to(6000);
        assert!(sync.get());
        process.advance_to(7000);
        assert!(!sync.get());
    }

    #[test]
    fn test_out_shares_the_output_line() {
        let (sync, src) = synchronizer(false, false);
        let Port::Signal(line) = Arc::clone(&sync)
            .accessor("out", &EdgeParams::named("clearn"))
            .unwrap()
        else {
            panic!("expected a signal");
        };
        assert_eq!(line.name(), "clearn");

        let mut process = Arc::clone(&sync).process().unwrap();
        src.set(true);
        process.advance_to(2000);
        assert!(line.get());
    }
}
