//! Si7021 humidity sensor on a blocking `embedded-hal` I²C bus.
//!
//! The acquisition pipeline expects an interrupt-driven controller:
//! `start_*` queues a transfer and completion arrives later as an external
//! signal.  [`Si7021Bus`] adapts a blocking bus to that shape by running
//! the transfer inside `start_*`, parking the result, and depositing the
//! completion signal straight away.  The loop observes it on its next
//! iteration, exactly as it would an ISR deposit.

use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use log::warn;

use crate::app::ports::I2cPort;
use crate::error::I2cError;
use crate::events::{ExternalSignal, SignalQueue};

fn map_error(kind: ErrorKind) -> I2cError {
    match kind {
        ErrorKind::NoAcknowledge(_) => I2cError::Nack,
        _ => I2cError::Bus,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parked {
    Idle,
    Write(Result<(), I2cError>),
    Read(Result<[u8; 2], I2cError>),
}

pub struct Si7021Bus<'q, I, P> {
    bus: I,
    enable: P,
    signals: &'q SignalQueue,
    parked: Parked,
}

impl<'q, I: I2c, P: OutputPin> Si7021Bus<'q, I, P> {
    pub fn new(bus: I, enable: P, signals: &'q SignalQueue) -> Self {
        Self {
            bus,
            enable,
            signals,
            parked: Parked::Idle,
        }
    }

    /// Give the bus and enable pin back.
    pub fn release(self) -> (I, P) {
        (self.bus, self.enable)
    }

    fn busy(&self) -> bool {
        self.parked != Parked::Idle
    }
}

impl<I: I2c, P: OutputPin> I2cPort for Si7021Bus<'_, I, P> {
    fn set_rails(&mut self, on: bool) {
        let result = if on {
            self.enable.set_high()
        } else {
            self.enable.set_low()
        };
        if result.is_err() {
            warn!("ACQ | sensor enable pin write failed");
        }
    }

    fn start_write(&mut self, addr: u8, data: &[u8]) -> Result<(), I2cError> {
        if self.busy() {
            return Err(I2cError::Busy);
        }
        let result = self.bus.write(addr, data).map_err(|e| map_error(e.kind()));
        self.parked = Parked::Write(result);
        self.signals.deposit(ExternalSignal::WriteDone);
        Ok(())
    }

    fn finish_write(&mut self) -> Result<(), I2cError> {
        match core::mem::replace(&mut self.parked, Parked::Idle) {
            Parked::Write(result) => result,
            other => {
                self.parked = other;
                Err(I2cError::Bus)
            }
        }
    }

    fn start_read(&mut self, addr: u8) -> Result<(), I2cError> {
        if self.busy() {
            return Err(I2cError::Busy);
        }
        let mut buf = [0u8; 2];
        let result = self
            .bus
            .read(addr, &mut buf)
            .map(|()| buf)
            .map_err(|e| map_error(e.kind()));
        self.parked = Parked::Read(result);
        self.signals.deposit(ExternalSignal::ReadDone);
        Ok(())
    }

    fn finish_read(&mut self) -> Result<[u8; 2], I2cError> {
        match core::mem::replace(&mut self.parked, Parked::Idle) {
            Parked::Read(result) => result,
            other => {
                self.parked = other;
                Err(I2cError::Bus)
            }
        }
    }
}
