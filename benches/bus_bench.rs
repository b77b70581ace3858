//! Performance benchmarks for the bus, FIFO and arbiter.
//!
//! Run with: `cargo bench`
//! Or for specific bench: `cargo bench --bench bus_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use socgraph::components::{BusOp, Cpu, Dma, DmaRegisters, Memory};
use socgraph::storage::Fifo;
use socgraph::{BusMatrix, ComponentKind, Graph, Simulation};

fn memory_bus(depth: usize) -> Graph {
    let mut graph = Graph::new();
    graph
        .add_node("", "bus", ComponentKind::BusMatrix, json!({"address_mask": 0xffff}))
        .unwrap();
    Memory::declare(&mut graph, "", "mem", "/bus", Memory::config(32, depth)).unwrap();
    graph
}

// ============================================================================
// FIFO Benchmarks
// ============================================================================

fn bench_fifo_edges(c: &mut Criterion) {
    let mut group = c.benchmark_group("fifo_edges");

    for depth in [4usize, 64, 1024].iter() {
        group.throughput(Throughput::Elements(*depth as u64));
        group.bench_with_input(BenchmarkId::new("depth", depth), depth, |b, &depth| {
            let mut fifo = Fifo::new(32, depth).unwrap();
            b.iter(|| {
                for i in 0..depth as u32 {
                    fifo.write_edge(true, i);
                }
                while let Some(word) = fifo.read_edge(true) {
                    black_box(word);
                }
            });
        });
    }

    group.finish();
}

// ============================================================================
// Bus Transaction Benchmarks
// ============================================================================

fn bench_bus_transactions(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_transactions");

    for count in [16u32, 256].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("writes", count), count, |b, &count| {
            let graph = memory_bus(count as usize);
            let bus = graph.instance_as::<BusMatrix>("/bus").unwrap();
            b.iter(|| {
                for i in 0..count {
                    bus.write(&graph, "bench", 4 * i, i).unwrap();
                }
                black_box(bus.take_trace());
            });
        });
        group.bench_with_input(BenchmarkId::new("reads", count), count, |b, &count| {
            let graph = memory_bus(count as usize);
            let bus = graph.instance_as::<BusMatrix>("/bus").unwrap();
            b.iter(|| {
                for i in 0..count {
                    black_box(bus.read(&graph, "bench", 4 * i).unwrap());
                }
                black_box(bus.take_trace());
            });
        });
    }

    group.finish();
}

// ============================================================================
// Arbiter Benchmarks
// ============================================================================

fn bench_dma_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("dma_copy");

    for words in [8u32, 64].iter() {
        group.throughput(Throughput::Elements(*words as u64));
        group.bench_with_input(BenchmarkId::new("words", words), words, |b, &words| {
            b.iter(|| {
                let mut graph = memory_bus(2 * words as usize);
                Dma::declare(&mut graph, "", "dma", "/bus", None).unwrap();
                graph.instance_as::<Dma>("/dma").unwrap().program(DmaRegisters {
                    src_addr: 0,
                    src_incr: 4,
                    dest_addr: 4 * words,
                    dest_incr: 4,
                    count: words,
                });
                let mut sim = Simulation::new(graph, "/bus").unwrap();
                black_box(sim.run(2 * words as u64).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_contended_masters(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_masters");

    for masters in [2usize, 8].iter() {
        group.throughput(Throughput::Elements(*masters as u64));
        group.bench_with_input(
            BenchmarkId::new("cpus", masters),
            masters,
            |b, &masters| {
                b.iter(|| {
                    let mut graph = memory_bus(64);
                    for m in 0..masters {
                        let mut program = vec![BusOp::Lock];
                        program.extend((0..4).map(|i| BusOp::Write {
                            address: 4 * i,
                            data: m as u32,
                        }));
                        program.push(BusOp::Unlock);
                        Cpu::declare(&mut graph, "", &format!("cpu{m}"), "/bus", program).unwrap();
                    }
                    let mut sim = Simulation::new(graph, "/bus").unwrap();
                    black_box(sim.run(100).unwrap());
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Criterion Groups
// ============================================================================

criterion_group!(
    benches,
    bench_fifo_edges,
    bench_bus_transactions,
    bench_dma_copy,
    bench_contended_masters,
);

criterion_main!(benches);
