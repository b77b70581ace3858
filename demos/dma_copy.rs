//! DMA copy from memory into the status peripheral's FIFO.
//!
//! The CPU programs the DMA through its register window. The DMA then moves
//! eight words from memory to the FIFO push register, pausing whenever the
//! FIFO reports it is full, while a slow sink clocked at 1 MHz drains it.

use serde_json::json;
use socgraph::components::{BusOp, Clock, Cpu, Dma, FifoSink, Flag, Memory, StatusPeripheral};
use socgraph::storage::FifoComponent;
use socgraph::{init_logging, ComponentKind, EdgeParams, Graph, Simulation};

const MEM_BASE: u32 = 0x0001_0000;
const DMA_BASE: u32 = 0x0002_0000;
const WORDS: usize = 8;

fn build(program: Vec<BusOp>) -> Result<Graph, Box<dyn std::error::Error>> {
    let mut graph = Graph::new();
    graph.add_node("", "soc", ComponentKind::Root, json!(null))?;
    Clock::declare(&mut graph, "/soc", "clk", 10e6)?;
    Clock::declare(&mut graph, "/soc", "rclk", 1e6)?;
    graph.add_node("/soc", "bus", ComponentKind::BusMatrix, json!({"address_mask": 0xffff}))?;
    graph.connect("/soc/clk#out", "/soc/bus#clk", EdgeParams::named("pclk"))?;

    Flag::declare(&mut graph, "/soc", "led", false)?;
    Flag::declare(&mut graph, "/soc", "dmaready", false)?;
    FifoComponent::declare(&mut graph, "/soc", "fifo", 32, 4)?;
    StatusPeripheral::declare(
        &mut graph,
        "/soc",
        "status",
        "/soc/bus",
        "/soc/led",
        Some("/soc/fifo"),
        Some("/soc/dmaready"),
    )?;
    Memory::declare(&mut graph, "/soc", "mem", "/soc/bus", Memory::config(32, 64))?;
    Cpu::declare(&mut graph, "/soc", "cpu", "/soc/bus", program)?;
    Dma::declare(&mut graph, "/soc", "dma", "/soc/bus", Some("/soc/dmaready"))?;
    FifoSink::declare(&mut graph, "/soc", "sink", "/soc/fifo", "/soc/rclk", None)?;
    Ok(graph)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info");

    println!("==== DMA copy example ====");
    println!("Memory -> DMA -> FIFO -> sink, {WORDS} words\n");

    let graph = build(vec![
        BusOp::Write { address: DMA_BASE, data: MEM_BASE },
        BusOp::Write { address: DMA_BASE + 0x04, data: 4 },
        BusOp::Write { address: DMA_BASE + 0x08, data: 0x50 },
        BusOp::Write { address: DMA_BASE + 0x0c, data: 0 },
        BusOp::Write { address: DMA_BASE + 0x10, data: WORDS as u32 },
    ])?;

    let words: Vec<u32> = (0..WORDS as u32).map(|i| 0xcafe_0000 | i).collect();
    graph.instance_as::<Memory>("/soc/mem")?.load(0, &words);
    let sink = graph.instance_as::<FifoSink>("/soc/sink")?;

    let mut sim = Simulation::new(graph, "/soc/bus")?;
    let done = sim.run_until(|_, _| sink.samples().len() == WORDS, 2000)?;

    println!("Copy finished: {done}");
    for (i, word) in sink.samples().iter().enumerate() {
        println!("  sample {i}: {word:#010x}");
    }
    println!("\nBus time: {} ns", sim.now());
    println!("{}", serde_json::to_string_pretty(&sim.export_stats())?);
    Ok(())
}
