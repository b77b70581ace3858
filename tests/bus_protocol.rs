//! Bus transactions through a declared graph: alignment, routing, wait states
//! and timeouts.

use std::sync::Arc;

use serde_json::json;
use socgraph::components::{Memory, MemoryConfig};
use socgraph::event::BusEventKind;
use socgraph::{BusError, BusMatrix, ComponentKind, Direction, Graph};

const MASTER: &str = "test";

fn two_memories(wait_states: u32, timeout: Option<u64>) -> (Graph, Arc<BusMatrix>) {
    let mut graph = Graph::new();
    let mut config = json!({"address_mask": 0xff, "duration": 100});
    if let Some(timeout) = timeout {
        config["timeout"] = json!(timeout);
    }
    graph.add_node("", "bus", ComponentKind::BusMatrix, config).unwrap();
    Memory::declare(&mut graph, "", "mem0", "/bus", Memory::config(32, 128)).unwrap();
    Memory::declare(
        &mut graph,
        "",
        "mem1",
        "/bus",
        MemoryConfig {
            wait_states,
            ..Memory::config(32, 128)
        },
    )
    .unwrap();
    let bus = graph.instance_as::<BusMatrix>("/bus").unwrap();
    (graph, bus)
}

#[test]
fn test_alignment() {
    let (graph, bus) = two_memories(0, None);
    assert_eq!(
        bus.write(&graph, MASTER, 0x41, 1).unwrap_err(),
        BusError::Alignment(0x41)
    );
    assert_eq!(bus.now(), 0);
    assert!(bus.trace().is_empty());

    bus.write(&graph, MASTER, 0x40, 1).unwrap();
    assert_eq!(bus.now(), 300);
}

#[test]
fn test_routing_by_mask() {
    let (graph, bus) = two_memories(0, None);
    bus.write(&graph, MASTER, 0x0040, 0xaa).unwrap();
    bus.write(&graph, MASTER, 0x0140, 0xbb).unwrap();

    let mem0 = graph.instance_as::<Memory>("/mem0").unwrap();
    let mem1 = graph.instance_as::<Memory>("/mem1").unwrap();
    assert_eq!(mem0.peek(0x10), Some(0xaa));
    assert_eq!(mem1.peek(0x50), Some(0xbb));
    assert_eq!(mem0.peek(0x50), Some(0));

    let slaves: Vec<usize> = bus
        .trace()
        .iter()
        .filter_map(|event| match event.kind {
            BusEventKind::Write { slave, .. } => Some(slave),
            _ => None,
        })
        .collect();
    assert_eq!(slaves, vec![0, 1]);

    assert!(matches!(
        bus.read(&graph, MASTER, 0x0240),
        Err(BusError::Route { index: 2, slaves: 2, .. })
    ));
}

#[test]
fn test_wait_states_stretch_transfer() {
    let (graph, bus) = two_memories(2, None);
    bus.write(&graph, MASTER, 0x100, 7).unwrap();
    assert_eq!(bus.now(), 500);
    assert_eq!(bus.read(&graph, MASTER, 0x100).unwrap(), 7);
    assert_eq!(bus.now(), 1000);
    assert_eq!(bus.stats().wait_cycles, 4);

    let events = bus.trace();
    assert_eq!(events[1].start, 500);
    assert!(matches!(
        events[1].kind,
        BusEventKind::Read { data: 7, wait_cycles: 2, .. }
    ));
}

#[test]
fn test_timeout_after_three_wait_cycles() {
    let (graph, bus) = two_memories(u32::MAX, Some(300));
    let err = bus.write(&graph, MASTER, 0x140, 1).unwrap_err();
    assert_eq!(
        err,
        BusError::Timeout {
            address: 0x140,
            wait_cycles: 3,
            elapsed: 400,
            timeout: 300
        }
    );
    assert_eq!(bus.stats().timeouts, 1);
    assert!(matches!(
        bus.trace().last().map(|e| e.kind.clone()),
        Some(BusEventKind::Timeout {
            address: 0x140,
            direction: Direction::Write
        })
    ));
    assert!(!bus.signals().psel);

    // The other slave is unaffected.
    bus.write(&graph, MASTER, 0x40, 2).unwrap();
}

#[test]
fn test_slave_error_is_reported() {
    let mut graph = Graph::new();
    graph
        .add_node("", "bus", ComponentKind::BusMatrix, json!({"address_mask": 0xffff}))
        .unwrap();
    Memory::declare(&mut graph, "", "mem", "/bus", Memory::config(32, 4)).unwrap();
    let bus = graph.instance_as::<BusMatrix>("/bus").unwrap();

    assert!(matches!(
        bus.read(&graph, MASTER, 0x10),
        Err(BusError::SlaveError { address: 0x10, .. })
    ));
    assert_eq!(bus.stats().errors, 1);
}
