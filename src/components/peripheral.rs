//! Status register block.
//!
//! | offset | write                      | read                 |
//! |--------|----------------------------|----------------------|
//! | `0x40` | LED <- `data & 1`          | 0, or the LED state  |
//! | `0x50` | push `data` into the FIFO  | 0                    |
//!
//! Offsets are decoded on `address & 0xff`; anything else is ignored. The
//! `dmaready` line follows `!fifo.full` and is refreshed after every write
//! and every arbiter step.
//!
//! The FIFO write side runs on the bus clock. A bus write to `0x50` is an
//! enabled write edge; any advance of bus time without a push is an idle
//! write edge, which clears `wack` and `overflow`.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::bus::Slave;
use crate::component::{unknown_port, Component, ComponentKind, ConstructParams, Port, PortKind};
use crate::components::flag::SignalLine;
use crate::edge::{EdgeParams, NodeRef};
use crate::error::{BusResult, GraphResult};
use crate::executor::Clocked;
use crate::graph::Graph;
use crate::storage::fifo::FifoHandle;
use crate::types::{Address, SimTime, Word};

pub const LED_OFFSET: Address = 0x40;
pub const FIFO_OFFSET: Address = 0x50;

/// Config of a `StatusPeripheral` node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralConfig {
    /// Reads of the LED register return the LED state instead of 0
    #[serde(default)]
    pub led_readback: bool,
}

/// The `StatusPeripheral` component.
#[derive(Debug)]
pub struct StatusPeripheral {
    path: String,
    led: SignalLine,
    fifo: Option<FifoHandle>,
    dmaready: Option<SignalLine>,
    led_readback: bool,
    pushes: Arc<AtomicU64>,
}

impl StatusPeripheral {
    pub fn construct(graph: &Graph, params: ConstructParams) -> GraphResult<Arc<Self>> {
        let config: PeripheralConfig = params.config()?;
        let led = params.inputs.required("status_led")?.signal(graph)?;
        let fifo = params
            .inputs
            .optional("fifo")?
            .map(|wire| wire.fifo(graph))
            .transpose()?;
        let dmaready = params
            .inputs
            .optional("dmaready")?
            .map(|wire| wire.signal(graph))
            .transpose()?;
        if dmaready.is_some() && fifo.is_none() {
            warn!(peripheral = %params.path, "dmaready wired without a fifo, it stays high");
        }

        let peripheral = Self {
            path: params.path,
            led,
            fifo,
            dmaready,
            led_readback: config.led_readback,
            pushes: Arc::new(AtomicU64::new(0)),
        };
        peripheral.refresh();
        Ok(Arc::new(peripheral))
    }

    /// Declares the peripheral, wires it as the next slave of `bus` and
    /// connects its LED, FIFO and ready lines.
    pub fn declare(
        graph: &mut Graph,
        parent: &str,
        name: &str,
        bus: &str,
        led: &str,
        fifo: Option<&str>,
        dmaready: Option<&str>,
    ) -> GraphResult<String> {
        let id = graph.add_node(parent, name, ComponentKind::StatusPeripheral, json!({}))?;
        let path = graph.path_of(id).to_string();
        graph.add_edge(
            PortKind::Slave,
            &NodeRef::format(&path, "interface"),
            &NodeRef::format(bus, "slaves"),
            EdgeParams::default(),
        )?;
        graph.add_edge(
            PortKind::Signal,
            &NodeRef::format(led, "signals"),
            &NodeRef::format(&path, "status_led"),
            EdgeParams::named("status_led"),
        )?;
        if let Some(fifo) = fifo {
            graph.add_edge(
                PortKind::Fifo,
                &NodeRef::format(fifo, "interface"),
                &NodeRef::format(&path, "fifo"),
                EdgeParams::default(),
            )?;
        }
        if let Some(ready) = dmaready {
            graph.add_edge(
                PortKind::Signal,
                &NodeRef::format(ready, "signals"),
                &NodeRef::format(&path, "dmaready"),
                EdgeParams::named("dmaready"),
            )?;
        }
        Ok(path)
    }

    pub fn led(&self) -> bool {
        self.led.get()
    }

    fn refresh(&self) {
        refresh_ready(self.fifo.as_ref(), self.dmaready.as_ref());
    }
}

fn refresh_ready(fifo: Option<&FifoHandle>, dmaready: Option<&SignalLine>) {
    if let (Some(fifo), Some(ready)) = (fifo, dmaready) {
        ready.set(!fifo.lock().full());
    }
}

impl Slave for StatusPeripheral {
    fn name(&self) -> &str {
        &self.path
    }

    fn write(&self, address: Address, data: Word) -> BusResult<()> {
        match address & 0xff {
            LED_OFFSET => {
                let on = data & 1 == 1;
                debug!(peripheral = %self.path, on, "status led");
                self.led.set(on);
            }
            FIFO_OFFSET => {
                if let Some(fifo) = &self.fifo {
                    let mut fifo = fifo.lock();
                    fifo.write_edge(true, data);
                    self.pushes.fetch_add(1, Ordering::Relaxed);
                    if fifo.overflow() {
                        warn!(peripheral = %self.path, data, "fifo full, word dropped");
                    }
                }
                self.refresh();
            }
            _ => {}
        }
        Ok(())
    }

    fn read(&self, address: Address) -> BusResult<Word> {
        match address & 0xff {
            LED_OFFSET if self.led_readback => Ok(Word::from(self.led.get())),
            _ => Ok(0),
        }
    }

    /// Turns the LED off and empties the FIFO.
    fn reset(&self) {
        self.led.set(false);
        if let Some(fifo) = &self.fifo {
            fifo.lock().reset();
        }
        self.refresh();
    }
}

/// The FIFO write domain: idle write edges between pushes, and `dmaready`
/// kept in step with the FIFO as its reader drains it.
struct PushPort {
    name: String,
    fifo: FifoHandle,
    dmaready: Option<SignalLine>,
    pushes: Arc<AtomicU64>,
    seen: u64,
    last: SimTime,
}

impl Clocked for PushPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn advance_to(&mut self, now: SimTime) {
        let pushes = self.pushes.load(Ordering::Relaxed);
        if now > self.last && pushes == self.seen {
            self.fifo.lock().write_edge(false, 0);
        }
        self.seen = pushes;
        self.last = self.last.max(now);
        refresh_ready(Some(&self.fifo), self.dmaready.as_ref());
    }

    fn reset(&mut self, now: SimTime) {
        self.seen = self.pushes.load(Ordering::Relaxed);
        self.last = now;
    }
}

impl Component for StatusPeripheral {
    fn kind(&self) -> ComponentKind {
        ComponentKind::StatusPeripheral
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn accessor(self: Arc<Self>, attr: &str, _params: &EdgeParams) -> GraphResult<Port> {
        match attr {
            "interface" => Ok(Port::Slave(self)),
            _ => Err(unknown_port(
                &self.path,
                ComponentKind::StatusPeripheral,
                attr,
                "output",
            )),
        }
    }

    fn process(self: Arc<Self>) -> Option<Box<dyn Clocked>> {
        let fifo = self.fifo.clone()?;
        Some(Box::new(PushPort {
            name: self.path.clone(),
            fifo,
            dmaready: self.dmaready.clone(),
            pushes: Arc::clone(&self.pushes),
            seen: self.pushes.load(Ordering::Relaxed),
            last: 0,
        }))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::flag::Flag;
    use crate::storage::fifo::FifoComponent;

    struct Fixture {
        graph: Graph,
        peripheral: Arc<StatusPeripheral>,
    }

    fn fixture(depth: usize) -> Fixture {
        let mut graph = Graph::new();
        graph
            .add_node("", "bus", ComponentKind::BusMatrix, json!({"address_mask": 0xff}))
            .unwrap();
        Flag::declare(&mut graph, "", "led", false).unwrap();
        Flag::declare(&mut graph, "", "dmaready", false).unwrap();
        FifoComponent::declare(&mut graph, "", "fifo", 32, depth).unwrap();
        let path = StatusPeripheral::declare(
            &mut graph,
            "",
            "status",
            "/bus",
            "/led",
            Some("/fifo"),
            Some("/dmaready"),
        )
        .unwrap();
        let peripheral = graph.instance_as::<StatusPeripheral>(&path).unwrap();
        Fixture { graph, peripheral }
    }

    #[test]
    fn test_led_register() {
        let fx = fixture(4);
        fx.peripheral.write(0x40, 3).unwrap();
        assert!(fx.peripheral.led());
        assert_eq!(fx.peripheral.read(0x40).unwrap(), 0);
        fx.peripheral.write(0x140, 2).unwrap();
        assert!(!fx.peripheral.led());
    }

    #[test]
    fn test_fifo_push_drives_dmaready() {
        let fx = fixture(4);
        let ready = fx.graph.instance_as::<Flag>("/dmaready").unwrap();
        assert!(ready.get());

        for word in 1..=3 {
            fx.peripheral.write(0x50, word).unwrap();
        }
        assert!(!ready.get());

        let fifo = fx.graph.instance_as::<FifoComponent>("/fifo").unwrap().handle();
        assert_eq!(fifo.lock().read_edge(true), Some(1));

        let mut tracker = Arc::clone(&fx.peripheral).process().unwrap();
        tracker.advance_to(0);
        assert!(ready.get());
    }

    #[test]
    fn test_write_flags_clear_on_next_bus_cycle() {
        let fx = fixture(4);
        let mut port = Arc::clone(&fx.peripheral).process().unwrap();
        let fifo = fx.graph.instance_as::<FifoComponent>("/fifo").unwrap().handle();

        for word in 1..=4 {
            fx.peripheral.write(0x50, word).unwrap();
        }
        port.advance_to(1200);
        assert!(fifo.lock().overflow());

        // LED write: time moves, nothing pushed
        fx.peripheral.write(0x40, 1).unwrap();
        port.advance_to(1500);
        let status = fifo.lock().status();
        assert!(!status.overflow && !status.wack);
        assert_eq!(status.rdcnt, 3);

        fx.peripheral.write(0x50, 9).unwrap();
        port.advance_to(1800);
        assert!(fifo.lock().overflow());
        port.advance_to(1800);
        assert!(fifo.lock().overflow());
    }

    #[test]
    fn test_unknown_offsets_ignored() {
        let fx = fixture(4);
        fx.peripheral.write(0x44, 1).unwrap();
        assert_eq!(fx.peripheral.read(0x44).unwrap(), 0);
        assert!(!fx.peripheral.led());
    }

    #[test]
    fn test_reset() {
        let fx = fixture(4);
        fx.peripheral.write(0x40, 1).unwrap();
        fx.peripheral.write(0x50, 7).unwrap();
        fx.peripheral.reset();
        assert!(!fx.peripheral.led());
        let fifo = fx.graph.instance_as::<FifoComponent>("/fifo").unwrap().handle();
        assert!(fifo.lock().is_empty());
    }
}
