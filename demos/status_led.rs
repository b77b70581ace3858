//! Blinks the status LED from a YAML system description.

use std::sync::Arc;

use socgraph::components::{Cpu, Flag};
use socgraph::{Simulation, SystemConfig};

const SYSTEM: &str = r#"
simulation:
  name: status_led
  bus: /soc/bus
  max_passes: 64
  log_level: debug

nodes:
  - { parent: /, name: soc, kind: Root }
  - { parent: /soc, name: clk, kind: Clock, config: { freq: 50000000.0 } }
  - { parent: /soc, name: bus, kind: BusMatrix, config: { address_mask: 65535 } }
  - { parent: /soc, name: led, kind: Flag }
  - { parent: /soc, name: status, kind: StatusPeripheral, config: { led_readback: true } }
  - parent: /soc
    name: cpu
    kind: Cpu
    config:
      program:
        - { op: write, address: 64, data: 1 }
        - { op: idle, cycles: 10 }
        - { op: read, address: 64, expect: 1 }
        - { op: write, address: 64, data: 0 }
        - { op: idle, cycles: 10 }
        - { op: read, address: 64, expect: 0 }

edges:
  - { from: "/soc/clk#out", to: "/soc/bus#clk" }
  - { from: "/soc/status#interface", to: "/soc/bus#slaves" }
  - { from: "/soc/led#signals", to: "/soc/status#status_led", params: { name: status_led } }
  - { from: "/soc/bus#interface", to: "/soc/cpu#bus" }
  - { from: "/soc/cpu#execute", to: "/soc/bus#masters" }
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = SystemConfig::from_yaml(SYSTEM)?;

    let mut sim = Simulation::from_config(&config)?;
    let led: Arc<Flag> = sim.graph().instance_as("/soc/led")?;

    println!("==== Status LED example ====\n");
    let mut last = led.get();
    println!("t={:>6} ns  led={}", sim.now(), last);
    while !sim.arbiter().all_done() {
        sim.pass()?;
        if led.get() != last {
            last = led.get();
            println!("t={:>6} ns  led={}", sim.now(), last);
        }
    }

    let cpu: Arc<Cpu> = sim.graph().instance_as("/soc/cpu")?;
    println!("\nReads: {:?}", cpu.reads());
    println!("\n{}", sim.snapshot_jsonl()?);
    Ok(())
}
