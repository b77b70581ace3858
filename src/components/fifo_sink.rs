//! Clocked FIFO reader.
//!
//! Pops one word per edge of its own clock while `enable` is high (or
//! unwired), collecting what it reads. Stops reading once `max_samples`
//! words have been collected.

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
use crate::storage::fifo::FifoHandle;
use crate::types::{shared, Shared, SimTime, Word};

/// Config of a `FifoSink` node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FifoSinkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_samples: Option<usize>,
}

/// The `FifoSink` component.
#[derive(Debug)]
pub struct FifoSink {
    path: String,
    fifo: FifoHandle,
    period: SimTime,
    enable: Option<SignalLine>,
    max_samples: Option<usize>,
    samples: Shared<Vec<Word>>,
}

impl FifoSink {
    pub fn construct(graph: &Graph, params: ConstructParams) -> GraphResult<Arc<Self>> {
        let config: FifoSinkConfig = params.config()?;
        let fifo = params.inputs.required("fifo")?.fifo(graph)?;
        let clk = params.inputs.required("clk")?.clock(graph)?;
        let enable = params
            .inputs
            .optional("enable")?
            .map(|wire| wire.signal(graph))
            .transpose()?;
        Ok(Arc::new(Self {
            path: params.path,
            fifo,
            period: clk.duration,
            enable,
            max_samples: config.max_samples,
            samples: shared(Vec::new()),
        }))
    }

    /// Declares a sink reading `fifo` on the edges of `clk`.
    pub fn declare(
        graph: &mut Graph,
        parent: &str,
        name: &str,
        fifo: &str,
        clk: &str,
        max_samples: Option<usize>,
    ) -> GraphResult<String> {
        let id = graph.add_node(
            parent,
            name,
            ComponentKind::FifoSink,
            json!({ "max_samples": max_samples }),
        )?;
        let path = graph.path_of(id).to_string();
        graph.add_edge(
            PortKind::Fifo,
            &NodeRef::format(fifo, "interface"),
            &NodeRef::format(&path, "fifo"),
            EdgeParams::default(),
        )?;
        graph.add_edge(
            PortKind::Clock,
            &NodeRef::format(clk, "out"),
            &NodeRef::format(&path, "clk"),
            EdgeParams::named("rclk"),
        )?;
        Ok(path)
    }

    /// Words read so far.
    pub fn samples(&self) -> Vec<Word> {
        self.samples.lock().clone()
    }

    pub fn period(&self) -> SimTime {
        self.period
    }
}

struct SinkProcess {
    name: String,
    domain: ClockDomain,
    fifo: FifoHandle,
    enable: Option<SignalLine>,
    max_samples: Option<usize>,
    samples: Shared<Vec<Word>>,
}

impl SinkProcess {
    fn edge(&mut self) {
        let mut samples = self.samples.lock();
        let room = self.max_samples.map_or(true, |max| samples.len() < max);
        let enabled = room && self.enable.as_ref().map_or(true, SignalLine::get);
        if let Some(word) = self.fifo.lock().read_edge(enabled) {
            trace!(sink = %self.name, word, "sample");
            samples.push(word);
        }
    }
}

impl Clocked for SinkProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn advance_to(&mut self, now: SimTime) {
        for _ in 0..self.domain.edges_until(now) {
            self.edge();
        }
    }

    fn reset(&mut self, now: SimTime) {
        self.domain.reset_at(now);
        self.samples.lock().clear();
    }
}

impl Component for FifoSink {
    fn kind(&self) -> ComponentKind {
        ComponentKind::FifoSink
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn accessor(self: Arc<Self>, attr: &str, _params: &EdgeParams) -> GraphResult<Port> {
        Err(unknown_port(&self.path, ComponentKind::FifoSink, attr, "output"))
    }

    fn process(self: Arc<Self>) -> Option<Box<dyn Clocked>> {
        Some(Box::new(SinkProcess {
            name: self.path.clone(),
            domain: ClockDomain::new(self.period),
            fifo: Arc::clone(&self.fifo),
            enable: self.enable.clone(),
            max_samples: self.max_samples,
            samples: Arc::clone(&self.samples),
        }))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
