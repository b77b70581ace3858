//! Declarative system descriptions.
//!
//! A [`SystemConfig`] lists the nodes and edges of a graph plus the
//! parameters of the run. It loads from YAML or JSON and builds a [`Graph`].
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   name: led-blink
//!   bus: /soc/bus
//!   max_passes: 100
//!
//! nodes:
//!   - { parent: /, name: soc, kind: Root }
//!   - { parent: /soc, name: clk, kind: Clock, config: { freq: 10000000.0 } }
//!   - { parent: /soc, name: bus, kind: BusMatrix, config: { address_mask: 0xffff } }
//!   - { parent: /soc, name: led, kind: Flag }
//!   - { parent: /soc, name: status, kind: StatusPeripheral }
//!   - parent: /soc
//!     name: cpu
//!     kind: Cpu
//!     config:
//!       program:
//!         - { op: write, address: 0x40, data: 1 }
//!
//! edges:
//!   - { from: "/soc/clk#out", to: "/soc/bus#clk" }
//!   - { from: "/soc/status#interface", to: "/soc/bus#slaves" }
//!   - { from: "/soc/led#signals", to: "/soc/status#status_led", params: { name: status_led } }
//!   - { from: "/soc/bus#interface", to: "/soc/cpu#bus" }
//!   - { from: "/soc/cpu#execute", to: "/soc/bus#masters" }
//! ```
//!
//! Paths in a config are absolute. An edge without `kind` takes the kind of
//! its source accessor.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::component::{ComponentKind, PortKind};
use crate::edge::{EdgeParams, NodeRef};
use crate::error::{GraphError, SimError};
use crate::executor::DEFAULT_LOCK_STEP_LIMIT;
use crate::graph::Graph;

/// Errors that can occur while loading or building a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimError),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// On-disk configuration formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    /// Picks a format from the file extension.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Format::Yaml),
            "json" => Ok(Format::Json),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }
}

/// Run parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Name recorded in the statistics
    #[serde(default = "default_name")]
    pub name: String,

    /// Path of the bus matrix whose masters are arbitrated
    #[serde(default = "default_bus")]
    pub bus: String,

    /// Pass budget for `Simulation::run_configured`
    #[serde(default = "default_max_passes")]
    pub max_passes: u64,

    /// Consecutive locked steps before a run is aborted
    #[serde(default = "default_lock_step_limit")]
    pub lock_step_limit: u64,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_name() -> String {
    "soc".to_string()
}

fn default_bus() -> String {
    "/bus".to_string()
}

fn default_max_passes() -> u64 {
    1000
}

fn default_lock_step_limit() -> u64 {
    DEFAULT_LOCK_STEP_LIMIT
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            name: default_name(),
            bus: default_bus(),
            max_passes: default_max_passes(),
            lock_step_limit: default_lock_step_limit(),
            log_level: default_log_level(),
        }
    }
}

/// A node declaration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Parent path; empty or `/` for the root
    #[serde(default)]
    pub parent: String,

    pub name: String,

    pub kind: ComponentKind,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

impl NodeSpec {
    /// Absolute path this node will get.
    pub fn path(&self) -> String {
        join(&self.parent, &self.name)
    }
}

/// An edge declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Port kind; inferred from the source accessor when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PortKind>,

    /// `<path>#<accessor>`
    pub from: String,

    /// `<path>#<input>`
    pub to: String,

    #[serde(default, skip_serializing_if = "EdgeParams::is_empty")]
    pub params: EdgeParams,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn join(parent: &str, name: &str) -> String {
    format!("{}/{}", normalize(parent), name)
}

/// Complete system description.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub simulation: SimulationParams,

    #[serde(default)]
    pub nodes: Vec<NodeSpec>,

    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

impl SystemConfig {
    /// Creates a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a builder.
    pub fn builder() -> SystemConfigBuilder {
        SystemConfigBuilder::new()
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        Self::parse(yaml, Format::Yaml)
    }

    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Self::parse(json, Format::Json)
    }

    /// Reads a `.yaml`, `.yml` or `.json` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let format = Format::from_path(path)?;
        Self::parse(&std::fs::read_to_string(path)?, format)
    }

    fn parse(text: &str, format: Format) -> ConfigResult<Self> {
        let config: SystemConfig = match format {
            Format::Yaml => serde_yaml::from_str(text)?,
            Format::Json => serde_json::from_str(text)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that paths are unique, parents are declared before their
    /// children, and edges only touch declared nodes.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut declared: HashSet<String> = HashSet::new();
        declared.insert(String::new());

        for node in &self.nodes {
            let parent = normalize(&node.parent);
            if !declared.contains(&parent) {
                return Err(ConfigError::Validation(format!(
                    "node '{}' declared before its parent '{}'",
                    node.name, node.parent
                )));
            }
            let path = node.path();
            if !declared.insert(path.clone()) {
                return Err(ConfigError::Validation(format!("duplicate node path: {path}")));
            }
        }

        for edge in &self.edges {
            for reference in [&edge.from, &edge.to] {
                let parsed = NodeRef::parse(reference)
                    .map_err(|e| ConfigError::Validation(e.to_string()))?;
                if !declared.contains(&normalize(&parsed.path)) {
                    return Err(ConfigError::Validation(format!(
                        "edge references undeclared node: {reference}"
                    )));
                }
            }
        }

        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.simulation.log_level) {
            return Err(ConfigError::Validation(format!(
                "invalid log_level '{}': {e}",
                self.simulation.log_level
            )));
        }

        if !self.simulation.bus.is_empty() && !declared.contains(&normalize(&self.simulation.bus)) {
            return Err(ConfigError::Validation(format!(
                "bus '{}' is not declared",
                self.simulation.bus
            )));
        }

        Ok(())
    }

    /// Declares every node and edge into a fresh graph.
    pub fn build(&self) -> ConfigResult<Graph> {
        self.validate()?;
        let mut graph = Graph::new();
        for node in &self.nodes {
            graph.add_node(&node.parent, &node.name, node.kind, node.config.clone())?;
        }
        for edge in &self.edges {
            match edge.kind {
                Some(kind) => graph.add_edge(kind, &edge.from, &edge.to, edge.params.clone())?,
                None => graph.connect(&edge.from, &edge.to, edge.params.clone())?,
            };
        }
        info!(
            name = %self.simulation.name,
            nodes = graph.len(),
            edges = graph.edge_count(),
            "graph built from config"
        );
        Ok(graph)
    }

    /// Writes the configuration in the format named by the file extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let text = match Format::from_path(path)? {
            Format::Yaml => self.to_yaml()?,
            Format::Json => self.to_json()?,
        };
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Finds a node declaration by absolute path.
    pub fn find_node(&self, path: &str) -> Option<&NodeSpec> {
        let path = normalize(path);
        self.nodes.iter().find(|node| node.path() == path)
    }
}

/// Builder for creating a `SystemConfig` programmatically.
#[derive(Default)]
pub struct SystemConfigBuilder {
    config: SystemConfig,
}

impl SystemConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.simulation.name = name.into();
        self
    }

    /// Sets the arbitrated bus path.
    pub fn bus(mut self, path: impl Into<String>) -> Self {
        self.config.simulation.bus = path.into();
        self
    }

    pub fn max_passes(mut self, passes: u64) -> Self {
        self.config.simulation.max_passes = passes;
        self
    }

    pub fn lock_step_limit(mut self, limit: u64) -> Self {
        self.config.simulation.lock_step_limit = limit;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Adds a node declaration.
    pub fn node(
        mut self,
        parent: impl Into<String>,
        name: impl Into<String>,
        kind: ComponentKind,
        config: serde_json::Value,
    ) -> Self {
        self.config.nodes.push(NodeSpec {
            parent: parent.into(),
            name: name.into(),
            kind,
            config,
        });
        self
    }

    /// Adds an edge whose kind is inferred from its source.
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.config.edges.push(EdgeSpec {
            kind: None,
            from: from.into(),
            to: to.into(),
            params: EdgeParams::default(),
        });
        self
    }

    /// Adds an edge with accessor overrides.
    pub fn edge_with(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        params: EdgeParams,
    ) -> Self {
        self.config.edges.push(EdgeSpec {
            kind: None,
            from: from.into(),
            to: to.into(),
            params,
        });
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SystemConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LED_SYSTEM: &str = r#"
simulation:
  name: led
  bus: /soc/bus
  max_passes: 50

nodes:
  - { parent: /, name: soc, kind: Root }
  - { parent: /soc, name: clk, kind: Clock, config: { freq: 10000000.0 } }
  - { parent: /soc, name: bus, kind: BusMatrix, config: { address_mask: 65535 } }
  - { parent: /soc, name: led, kind: Flag }
  - { parent: /soc, name: status, kind: StatusPeripheral }

edges:
  - { from: "/soc/clk#out", to: "/soc/bus#clk" }
  - { from: "/soc/status#interface", to: "/soc/bus#slaves" }
  - { from: "/soc/led#signals", to: "/soc/status#status_led", params: { name: status_led } }
"#;

    #[test]
    fn test_default_config() {
        let config = SystemConfig::new();
        assert_eq!(config.simulation.bus, "/bus");
        assert_eq!(config.simulation.max_passes, 1000);
        assert_eq!(config.simulation.lock_step_limit, DEFAULT_LOCK_STEP_LIMIT);
        assert!(config.nodes.is_empty());
    }

    #[test]
    fn test_yaml_parsing() {
        let config = SystemConfig::from_yaml(LED_SYSTEM).unwrap();
        assert_eq!(config.simulation.name, "led");
        assert_eq!(config.node_count(), 5);
        assert_eq!(config.edge_count(), 3);
        assert_eq!(
            config.find_node("/soc/bus").map(|n| n.kind),
            Some(ComponentKind::BusMatrix)
        );
        assert_eq!(config.edges[2].params, EdgeParams::named("status_led"));
    }

    #[test]
    fn test_build_graph() {
        let graph = SystemConfig::from_yaml(LED_SYSTEM).unwrap().build().unwrap();
        assert_eq!(graph.len(), 6);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.edges()[0].kind, PortKind::Clock);
    }

    #[test]
    fn test_json_parsing() {
        let json = r#"{
            "simulation": {"bus": "/bus"},
            "nodes": [
                {"name": "bus", "kind": "BusMatrix", "config": {"address_mask": 255}}
            ]
        }"#;
        let config = SystemConfig::from_json(json).unwrap();
        assert_eq!(config.node_count(), 1);
        assert_eq!(config.nodes[0].path(), "/bus");
    }

    #[test]
    fn test_validation_duplicate_path() {
        let result = SystemConfig::builder()
            .node("", "bus", ComponentKind::BusMatrix, json!({"address_mask": 255}))
            .node("/", "bus", ComponentKind::Flag, json!(null))
            .build();
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_parent_order() {
        let result = SystemConfig::builder()
            .bus("")
            .node("/soc", "led", ComponentKind::Flag, json!(null))
            .build();
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_log_level() {
        let result = SystemConfig::builder()
            .node("", "bus", ComponentKind::BusMatrix, json!({"address_mask": 255}))
            .log_level("socgraph=loud")
            .build();
        assert!(matches!(result, Err(ConfigError::Validation(m)) if m.contains("socgraph=loud")));

        let config = SystemConfig::builder()
            .node("", "bus", ComponentKind::BusMatrix, json!({"address_mask": 255}))
            .log_level("socgraph=debug,warn")
            .build()
            .unwrap();
        assert_eq!(config.simulation.log_level, "socgraph=debug,warn");
    }

    #[test]
    fn test_validation_dangling_edge() {
        let result = SystemConfig::builder()
            .node("", "bus", ComponentKind::BusMatrix, json!({"address_mask": 255}))
            .edge("/mem#interface", "/bus#slaves")
            .build();
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_build_reports_graph_errors() {
        let config = SystemConfig::builder()
            .node("", "bus", ComponentKind::BusMatrix, json!({"address_mask": 255}))
            .node("", "led", ComponentKind::Flag, json!(null))
            .edge("/led#signals", "/bus#slaves")
            .build()
            .unwrap();
        assert!(matches!(
            config.build(),
            Err(ConfigError::Graph(GraphError::PortMismatch { .. }))
        ));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = SystemConfig::from_yaml(LED_SYSTEM).unwrap();
        let restored = SystemConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(config, restored);
        let restored = SystemConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(Format::from_path(Path::new("soc.YML")).unwrap(), Format::Yaml);
        assert_eq!(Format::from_path(Path::new("a/b.json")).unwrap(), Format::Json);
        assert!(matches!(
            Format::from_path(Path::new("soc.toml")),
            Err(ConfigError::UnknownFormat(ext)) if ext == "toml"
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let config = SystemConfig::from_yaml(LED_SYSTEM).unwrap();
        let path = std::env::temp_dir().join(format!("socgraph-{}.json", std::process::id()));
        config.save(&path).unwrap();
        let restored = SystemConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config, restored);
    }
}
