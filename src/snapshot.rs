//! JSON-lines export of a graph's declared structure.
//!
//! One `"n"` record per non-root node in traversal order, then one `"e"`
//! record per edge, grouped by destination node (traversal order) and within
//! a node by input slot and attachment order. Identical graphs always produce
//! identical output.

use std::io::Write;

use serde::Serialize;

use crate::component::{ComponentKind, Config, PortKind};
use crate::edge::{EdgeParams, NodeRef};
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;

/// One line of a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum SnapshotRecord {
    #[serde(rename = "n")]
    Node {
        class: ComponentKind,
        name: String,
        parent: String,
        #[serde(flatten)]
        config: Config,
    },
    #[serde(rename = "e")]
    Edge {
        class: PortKind,
        from: String,
        to: String,
        #[serde(flatten)]
        params: EdgeParams,
    },
}

impl SnapshotRecord {
    /// Path of the node a record describes; edges report their destination.
    pub fn path(&self) -> String {
        match self {
            Self::Node { name, parent, .. } => format!("{parent}/{name}"),
            Self::Edge { to, .. } => to.clone(),
        }
    }
}

fn export_error(path: String, err: serde_json::Error) -> GraphError {
    GraphError::Export {
        path,
        message: err.to_string(),
    }
}

impl Graph {
    /// Collects the snapshot records for the whole graph.
    pub fn snapshot(&self) -> GraphResult<Vec<SnapshotRecord>> {
        let order = self.descendants("", false)?;
        let mut records = Vec::with_capacity(order.len() + self.edge_count());

        for &id in &order {
            let node = self.node(id);
            let parent = node.parent().map(|p| self.path_of(p)).unwrap_or_default();
            records.push(SnapshotRecord::Node {
                class: node.kind(),
                name: node.name().to_string(),
                parent: parent.to_string(),
                config: node.config().clone(),
            });
        }

        for &id in &order {
            for (_, slot) in self.node(id).inputs().iter() {
                for edge_id in slot.ids() {
                    let edge = self.edge(edge_id);
                    records.push(SnapshotRecord::Edge {
                        class: edge.kind,
                        from: NodeRef::format(self.path_of(edge.from), &edge.from_attr),
                        to: NodeRef::format(self.path_of(edge.to), &edge.to_attr),
                        params: edge.params.clone(),
                    });
                }
            }
        }
        Ok(records)
    }

    /// Writes the snapshot as JSON lines.
    pub fn write_snapshot<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        let records = self
            .snapshot()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        for record in records {
            serde_json::to_writer(&mut out, &record)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Renders the snapshot as a JSON-lines string.
    pub fn snapshot_jsonl(&self) -> GraphResult<String> {
        let mut lines = String::new();
        for record in self.snapshot()? {
            let line =
                serde_json::to_string(&record).map_err(|e| export_error(record.path(), e))?;
            lines.push_str(&line);
            lines.push('\n');
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn build() -> Graph {
        let mut graph = Graph::new();
        graph.add_node("", "soc", ComponentKind::Root, json!(null)).unwrap();
        graph
            .add_node("/soc", "clk", ComponentKind::Clock, json!({"freq": 10e6}))
            .unwrap();
        graph
            .add_node("/soc", "pbus", ComponentKind::BusMatrix, json!({"address_mask": 0xffff}))
            .unwrap();
        graph
            .add_edge(PortKind::Clock, "/soc/clk#out", "/soc/pbus#clk", EdgeParams::named("pclk"))
            .unwrap();
        graph
    }

    #[test]
    fn test_snapshot_records() {
        let text = build().snapshot_jsonl().unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);

        assert_eq!(lines[0]["kind"], "n");
        assert_eq!(lines[0]["class"], "Root");
        assert_eq!(lines[0]["parent"], "");
        assert_eq!(lines[1]["name"], "clk");
        assert_eq!(lines[1]["parent"], "/soc");
        assert_eq!(lines[1]["freq"], 10e6);
        assert_eq!(lines[2]["address_mask"], 0xffff);

        assert_eq!(lines[3]["kind"], "e");
        assert_eq!(lines[3]["class"], "Clock");
        assert_eq!(lines[3]["from"], "/soc/clk#out");
        assert_eq!(lines[3]["to"], "/soc/pbus#clk");
        assert_eq!(lines[3]["name"], "pclk");
        assert!(lines[3].get("prefix").is_none());
    }

    #[test]
    fn test_export_error_names_record() {
        let records = build().snapshot().unwrap();
        assert_eq!(records[1].path(), "/soc/clk");
        assert_eq!(records[3].path(), "/soc/pbus#clk");

        let cause = serde_json::from_str::<Value>("{").unwrap_err();
        let err = export_error(records[1].path(), cause);
        assert!(matches!(&err, GraphError::Export { path, .. } if path == "/soc/clk"));
        assert!(err.to_string().starts_with("cannot export '/soc/clk'"));
    }

    #[test]
    fn test_snapshot_is_stable() {
        assert_eq!(
            build().snapshot_jsonl().unwrap(),
            build().snapshot_jsonl().unwrap()
        );

        let mut buf = Vec::new();
        build().write_snapshot(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), build().snapshot_jsonl().unwrap());
    }
}
