//! Free-running clock source.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::component::{unknown_port, Component, ComponentKind, ConstructParams, Port};
use crate::edge::EdgeParams;
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::types::{period_from_freq, SimTime};

/// Config of a `Clock` node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Frequency in Hz
    pub freq: f64,
}

/// What a clock hands out: its name as seen by the consumer, and its timing.
#[derive(Clone, Debug, PartialEq)]
pub struct ClockSpec {
    pub name: String,
    pub freq: f64,
    /// Period in ns
    pub duration: SimTime,
}

/// The `Clock` component.
#[derive(Debug)]
pub struct Clock {
    path: String,
    freq: f64,
    duration: SimTime,
}

impl Clock {
    pub fn construct(_graph: &Graph, params: ConstructParams) -> GraphResult<Arc<Self>> {
        let config: ClockConfig = params.config()?;
        let duration = period_from_freq(config.freq);
        if duration == 0 {
            return Err(GraphError::InvalidConfig {
                path: params.path,
                kind: ComponentKind::Clock,
                message: format!("frequency {} Hz gives a zero period", config.freq),
            });
        }
        Ok(Arc::new(Self {
            path: params.path,
            freq: config.freq,
            duration,
        }))
    }

    /// Declares a clock node. Returns its path.
    pub fn declare(graph: &mut Graph, parent: &str, name: &str, freq: f64) -> GraphResult<String> {
        let id = graph.add_node(parent, name, ComponentKind::Clock, json!({ "freq": freq }))?;
        Ok(graph.path_of(id).to_string())
    }

    pub fn duration(&self) -> SimTime {
        self.duration
    }

    pub fn freq(&self) -> f64 {
        self.freq
    }
}

impl Component for Clock {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Clock
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn accessor(self: Arc<Self>, attr: &str, params: &EdgeParams) -> GraphResult<Port> {
        match attr {
            "out" => Ok(Port::Clock(ClockSpec {
                name: params.label("clk"),
                freq: self.freq,
                duration: self.duration,
            })),
            _ => Err(unknown_port(&self.path, ComponentKind::Clock, attr, "output")),
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
