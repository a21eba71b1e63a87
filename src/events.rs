//! Interrupt-driven external-signal system.
//!
//! Signals are produced by:
//! - GPIO ISRs (PB0 button edge, PIR motion edge)
//! - I²C controller completion IRQs (write done, read done)
//! - Soft-timer expiries owned by the acquisition pipeline
//!
//! Signals are consumed by the main event loop, one at a time, in the
//! order they were first deposited.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ GPIO ISR    │────▶│ pending bits │     │              │
//! │ I2C IRQ     │────▶│ + FIFO ring  │────▶│  Event Loop  │
//! │ Soft timers │────▶│ (lock-free)  │     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Each signal owns one bit of a 32-bit pending word.  A deposit ORs the
//! bit in; only the deposit that flips it from 0 to 1 enqueues the code,
//! so repeated deposits before the loop observes the signal coalesce.
//! The loop clears the bit when it takes the signal.

use core::sync::atomic::{AtomicU8, AtomicU32, Ordering};

/// Ring capacity.  Power of 2, and larger than the number of distinct
/// signals, so the ring can never overflow while coalescing holds.
const SIGNAL_QUEUE_CAP: usize = 16;

/// External-signal codes, as delivered by the interrupt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExternalSignal {
    // ── Acquisition pipeline ──────────────────────────────
    /// A humidity sample has been converted and is ready.
    SampleComplete = 0x01,
    /// Periodic acquisition wake (POWER_OFF → POWER_UP).
    AcquisitionWake = 0x02,
    /// Sensor rails have stabilised after power-up.
    RailsSettled = 0x03,
    /// I²C write transfer completed.
    WriteDone = 0x04,
    /// Conversion wait elapsed.
    ConversionDone = 0x05,
    /// I²C read transfer completed.
    ReadDone = 0x06,

    // ── User input ────────────────────────────────────────
    /// PB0 changed level.
    ButtonEdge = 0x40,
    /// PIR motion detected.
    MotionEdge = 0x50,
}

impl ExternalSignal {
    /// Every signal, in bit order.
    pub const ALL: [Self; 8] = [
        Self::SampleComplete,
        Self::AcquisitionWake,
        Self::RailsSettled,
        Self::WriteDone,
        Self::ConversionDone,
        Self::ReadDone,
        Self::ButtonEdge,
        Self::MotionEdge,
    ];

    /// Raw signal code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Bit owned by this signal in the pending word.
    pub const fn mask(self) -> u32 {
        let bit = match self {
            Self::SampleComplete => 0,
            Self::AcquisitionWake => 1,
            Self::RailsSettled => 2,
            Self::WriteDone => 3,
            Self::ConversionDone => 4,
            Self::ReadDone => 5,
            Self::ButtonEdge => 6,
            Self::MotionEdge => 7,
        };
        1 << bit
    }

    pub fn from_code(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::SampleComplete),
            0x02 => Some(Self::AcquisitionWake),
            0x03 => Some(Self::RailsSettled),
            0x04 => Some(Self::WriteDone),
            0x05 => Some(Self::ConversionDone),
            0x06 => Some(Self::ReadDone),
            0x40 => Some(Self::ButtonEdge),
            0x50 => Some(Self::MotionEdge),
            _ => None,
        }
    }

    /// Signals `0x02..=0x06` advance the acquisition state machine.
    pub const fn is_acquisition_step(self) -> bool {
        matches!(self.code(), 0x02..=0x06)
    }
}

// ── Lock-free SPSC signal queue ───────────────────────────────
//
// ISRs write (produce), the event loop reads (consume).  On the
// single-core target ISRs do not nest, so producers never race each
// other; the atomics order producer against consumer.

/// Coalescing FIFO of external signals.
pub struct SignalQueue {
    pending: AtomicU32,
    head: AtomicU8,
    tail: AtomicU8,
    buffer: [AtomicU8; SIGNAL_QUEUE_CAP],
}

impl SignalQueue {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
            buffer: [const { AtomicU8::new(0) }; SIGNAL_QUEUE_CAP],
        }
    }

    /// Deposit a signal.  Safe to call from ISR context (lock-free).
    ///
    /// Returns `false` if the signal coalesced with one already pending.
    pub fn deposit(&self, signal: ExternalSignal) -> bool {
        let prev = self.pending.fetch_or(signal.mask(), Ordering::AcqRel);
        if prev & signal.mask() != 0 {
            return false;
        }

        let head = self.head.load(Ordering::Relaxed);
        let next_head = (head + 1) % SIGNAL_QUEUE_CAP as u8;
        self.buffer[head as usize].store(signal.code(), Ordering::Relaxed);
        self.head.store(next_head, Ordering::Release);
        true
    }

    /// Take the oldest pending signal and clear its pending bit.
    /// Called from the event loop (single consumer).
    pub fn take(&self) -> Option<ExternalSignal> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        let raw = self.buffer[tail as usize].load(Ordering::Relaxed);
        self.tail
            .store((tail + 1) % SIGNAL_QUEUE_CAP as u8, Ordering::Release);

        let signal = ExternalSignal::from_code(raw)?;
        self.pending.fetch_and(!signal.mask(), Ordering::AcqRel);
        Some(signal)
    }

    /// Drain all pending signals into a callback, in FIFO order.
    pub fn drain(&self, mut handler: impl FnMut(ExternalSignal)) {
        while let Some(signal) = self.take() {
            handler(signal);
        }
    }

    pub fn is_empty(&self) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        tail == head
    }

    /// Number of pending signals.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed) as usize;
        let tail = self.tail.load(Ordering::Relaxed) as usize;
        (head + SIGNAL_QUEUE_CAP - tail) % SIGNAL_QUEUE_CAP
    }

    /// Snapshot of the pending bit word.
    pub fn pending_mask(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }
}

impl Default for SignalQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// The signal queue shared by the interrupt handlers and the event loop.
pub static SIGNALS: SignalQueue = SignalQueue::new();
