//! A single bus transfer, advanced one half clock period at a time.
//!
//! ```text
//! SETUP    clk high: drive paddr/pwrite/psel/pwdata; clk low
//! ENABLE   clk high: assert penable
//! WAIT     poll pready; one full cycle per not-ready poll; clk low once ready
//! COMPLETE clk high: capture prdata, deassert; clk low
//! DONE
//! ```
//!
//! Every not-ready poll adds one bus period to `elapsed`; the transfer fails
//! with [`BusError::Timeout`] as soon as `elapsed` exceeds the timeout.

use tracing::{debug, trace};

use crate::bus::{BusSignals, Direction, Slave};
use crate::error::{BusError, BusResult};
use crate::types::{Address, SimTime, Word};

/// Protocol phase of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Enable,
    Wait,
    Complete,
    Done,
}

/// An in-flight read or write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    address: Address,
    data: Word,
    direction: Direction,
    phase: Phase,
    half: u8,
    duration: SimTime,
    timeout: SimTime,
    elapsed: SimTime,
    wait_cycles: u32,
    spent: SimTime,
    result: Option<Word>,
}

impl Transaction {
    fn new(
        direction: Direction,
        address: Address,
        data: Word,
        duration: SimTime,
        timeout: SimTime,
    ) -> BusResult<Self> {
        if address & 3 != 0 {
            return Err(BusError::Alignment(address));
        }
        Ok(Self {
            address,
            data,
            direction,
            phase: Phase::Setup,
            half: 0,
            duration,
            timeout,
            elapsed: 0,
            wait_cycles: 0,
            spent: 0,
            result: None,
        })
    }

    /// Starts a read of `address`. Fails on an unaligned address.
    pub fn read(address: Address, duration: SimTime, timeout: SimTime) -> BusResult<Self> {
        Self::new(Direction::Read, address, 0, duration, timeout)
    }

    /// Starts a write of `data` to `address`. Fails on an unaligned address.
    pub fn write(
        address: Address,
        data: Word,
        duration: SimTime,
        timeout: SimTime,
    ) -> BusResult<Self> {
        Self::new(Direction::Write, address, data, duration, timeout)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn wait_cycles(&self) -> u32 {
        self.wait_cycles
    }

    /// Bus time consumed so far.
    pub fn spent(&self) -> SimTime {
        self.spent
    }

    /// The captured read data, once the read completed.
    pub fn result(&self) -> Option<Word> {
        self.result
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    fn half_period(&self) -> SimTime {
        self.duration / 2
    }

    /// Advances the transaction by one step and returns the time it took.
    ///
    /// A step is one half period, except a not-ready poll in WAIT which
    /// spends a full period. Stepping a finished transaction is a no-op.
    pub fn step(&mut self, signals: &mut BusSignals, slave: &dyn Slave) -> BusResult<SimTime> {
        let half = self.half_period();
        let spent = match (self.phase, self.half) {
            (Phase::Setup, 0) => {
                signals.pclk = true;
                signals.paddr = self.address;
                signals.pwrite = self.direction == Direction::Write;
                signals.psel = true;
                if self.direction == Direction::Write {
                    signals.pwdata = self.data;
                }
                signals.pslverr = false;
                trace!(address = self.address, direction = ?self.direction, "setup");
                self.half = 1;
                half
            }
            (Phase::Setup, _) => {
                signals.pclk = false;
                self.enter(Phase::Enable);
                half
            }
            (Phase::Enable, _) => {
                signals.pclk = true;
                signals.penable = true;
                self.enter(Phase::Wait);
                half
            }
            (Phase::Wait, _) => self.poll(signals, slave)?,
            (Phase::Complete, 0) => {
                signals.pclk = true;
                if self.direction == Direction::Read {
                    self.result = Some(signals.prdata);
                }
                signals.deassert();
                self.half = 1;
                half
            }
            (Phase::Complete, _) => {
                signals.pclk = false;
                self.enter(Phase::Done);
                half
            }
            (Phase::Done, _) => 0,
        };
        self.spent += spent;
        Ok(spent)
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.half = 0;
    }

    fn poll(&mut self, signals: &mut BusSignals, slave: &dyn Slave) -> BusResult<SimTime> {
        let ready = slave.is_ready(self.wait_cycles);
        signals.pready = ready;

        if ready {
            let access = match self.direction {
                Direction::Write => slave.write(self.address, self.data).map(|_| signals.prdata),
                Direction::Read => slave.read(self.address),
            };
            match access {
                Ok(data) => signals.prdata = data,
                Err(e) => {
                    signals.pslverr = true;
                    signals.deassert();
                    return Err(match e {
                        BusError::SlaveError { .. } => e,
                        other => BusError::SlaveError {
                            address: self.address,
                            message: other.to_string(),
                        },
                    });
                }
            }
            signals.pclk = false;
            self.enter(Phase::Complete);
            return Ok(self.half_period());
        }

        self.elapsed += self.duration;
        if self.elapsed > self.timeout {
            debug!(
                address = self.address,
                wait_cycles = self.wait_cycles,
                elapsed = self.elapsed,
                "bus timeout"
            );
            signals.deassert();
            signals.pclk = false;
            return Err(BusError::Timeout {
                address: self.address,
                wait_cycles: self.wait_cycles,
                elapsed: self.elapsed,
                timeout: self.timeout,
            });
        }

        // clk low then high again: one full wait cycle
        signals.pclk = true;
        self.wait_cycles += 1;
        trace!(address = self.address, wait_cycles = self.wait_cycles, "wait");
        Ok(self.duration)
    }

    /// Steps until DONE or the first error.
    pub fn run_to_completion(
        &mut self,
        signals: &mut BusSignals,
        slave: &dyn Slave,
    ) -> BusResult<SimTime> {
        let mut total = 0;
        while !self.is_done() {
            total += self.step(signals, slave)?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Register {
        value: Mutex<Word>,
        wait_states: u32,
    }

    impl Slave for Register {
        fn name(&self) -> &str {
            "reg"
        }

        fn is_ready(&self, wait_cycles: u32) -> bool {
            wait_cycles >= self.wait_states
        }

        fn write(&self, _address: Address, data: Word) -> BusResult<()> {
            *self.value.lock() = data;
            Ok(())
        }

        fn read(&self, _address: Address) -> BusResult<Word> {
            Ok(*self.value.lock())
        }
    }

    fn register(wait_states: u32) -> Register {
        Register {
            value: Mutex::new(0),
            wait_states,
        }
    }

    #[test]
    fn test_alignment_checked_up_front() {
        assert_eq!(
            Transaction::read(0x41, 100, 500).unwrap_err(),
            BusError::Alignment(0x41)
        );
        assert!(Transaction::read(0x40, 100, 500).is_ok());
        assert!(Transaction::write(0x42, 1, 100, 500).is_err());
    }

    #[test]
    fn test_write_phases() {
        let slave = register(0);
        let mut signals = BusSignals::default();
        let mut tx = Transaction::write(0x40, 7, 100, 500).unwrap();

        tx.step(&mut signals, &slave).unwrap();
        assert_eq!(tx.phase(), Phase::Setup);
        assert!(signals.psel && signals.pwrite && signals.pclk);
        assert_eq!(signals.pwdata, 7);

        tx.step(&mut signals, &slave).unwrap();
        assert_eq!(tx.phase(), Phase::Enable);
        assert!(!signals.pclk);

        tx.step(&mut signals, &slave).unwrap();
        assert_eq!(tx.phase(), Phase::Wait);
        assert!(signals.penable);
        assert_eq!(*slave.value.lock(), 0);

        tx.step(&mut signals, &slave).unwrap();
        assert_eq!(tx.phase(), Phase::Complete);
        assert_eq!(*slave.value.lock(), 7);

        tx.run_to_completion(&mut signals, &slave).unwrap();
        assert!(tx.is_done());
        assert!(!signals.psel && !signals.penable);
        assert_eq!(tx.spent(), 300);
    }

    #[test]
    fn test_read_with_wait_states() {
        let slave = register(2);
        *slave.value.lock() = 0xabcd;
        let mut signals = BusSignals::default();
        let mut tx = Transaction::read(0x0, 100, 500).unwrap();

        let spent = tx.run_to_completion(&mut signals, &slave).unwrap();
        assert_eq!(tx.result(), Some(0xabcd));
        assert_eq!(tx.wait_cycles(), 2);
        assert_eq!(spent, 500);
    }

    #[test]
    fn test_timeout_after_three_wait_cycles() {
        let slave = register(u32::MAX);
        let mut signals = BusSignals::default();
        let mut tx = Transaction::write(0x0, 1, 100, 300).unwrap();

        let err = tx.run_to_completion(&mut signals, &slave).unwrap_err();
        assert_eq!(
            err,
            BusError::Timeout {
                address: 0,
                wait_cycles: 3,
                elapsed: 400,
                timeout: 300
            }
        );
        assert_eq!(*slave.value.lock(), 0);
        assert!(!signals.psel);
    }
}
