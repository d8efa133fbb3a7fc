//! # Watermark UART register core
//!
//! Cycle-accurate model of the CPU-facing register and flow-control core of
//! a watermark UART peripheral: a 5-bit-addressed register file backed by
//! two depth-8 FIFOs of 13-bit entries, sticky interrupt status with
//! write-1-to-clear semantics, and a bus handshake state machine that hides
//! the RX FIFO pop latency behind a one-tick `valid` delay.
//!
//! One call to [UartCore::advance] is one clock tick of the synchronous
//! core. Everything outside the register file is an external collaborator:
//!
//! - the framer delivers received frames through [UartCore::rx_deliver],
//! - the shifter drains outgoing entries through [UartCore::tx_take],
//! - flow-control and voter pin levels are supplied through the
//!   `set_*` inputs and read back with the force overrides applied.
//!
//! The [embedded_hal_nb::serial] traits are implemented as seen *from the
//! line*: `Write` feeds the RX FIFO, `Read` drains the TX FIFO. Bit
//! framing, baud generation and parity computation stay outside the model;
//! the core only stores their configuration.
#![no_std]

use core::convert::Infallible;

pub mod bus;
pub use bus::{BusRequest, BusResponse};

pub mod fifo;
pub use fifo::{Fifo, FifoEntry, FifoError};

pub mod irq;
pub use irq::{Event, InterruptFlags};

pub mod registers;
pub use registers::{Parity, Reg, RxControl, Status, TxControl};

use bus::BusState;
use irq::{IrqState, WatermarkLevels};
use registers::{RESET_BAUD_COUNT, RESET_CONTROL, RESET_WATERMARK_HIGH, RESET_WATERMARK_LOW};

pub const FIFO_DEPTH: usize = 8;

/// The register and flow-control core. Owns every piece of state the
/// peripheral exposes; all mutation goes through the accessors below or
/// through a bus tick.
pub struct UartCore {
    pub(crate) tx_control: TxControl,
    pub(crate) rx_control: RxControl,
    pub(crate) baud_count: u16,
    pub(crate) tx_fifo: Fifo,
    pub(crate) rx_fifo: Fifo,
    /// Byte written to TX_FIFO_DATA_LO, pending until the high-bits write
    /// triggers the push.
    pub(crate) tx_staged: u8,
    /// Entry most recently popped from the RX FIFO; feeds the RX data-port
    /// reads, including the stale byte returned on a read-on-empty.
    pub(crate) rx_hold: FifoEntry,
    pub(crate) irq: IrqState,
    pub(crate) state: BusState,
    pub(crate) levels: WatermarkLevels,
    pub(crate) cts_line: bool,
    pub(crate) rts_line: bool,
    pub(crate) vote_error: bool,
}

impl UartCore {
    /// Create a core in its reset state.
    pub fn new() -> Self {
        let tx_fifo = Fifo::new(RESET_WATERMARK_LOW, RESET_WATERMARK_HIGH);
        let rx_fifo = Fifo::new(RESET_WATERMARK_LOW, RESET_WATERMARK_HIGH);
        let mut core = Self {
            tx_control: TxControl::new_with_raw_value(RESET_CONTROL),
            rx_control: RxControl::new_with_raw_value(RESET_CONTROL),
            baud_count: RESET_BAUD_COUNT,
            tx_fifo,
            rx_fifo,
            tx_staged: 0,
            rx_hold: FifoEntry::new_with_raw_value(0),
            irq: IrqState::new(),
            state: BusState::Idle,
            levels: WatermarkLevels {
                tx_low: false,
                tx_high: false,
                rx_low: false,
                rx_high: false,
            },
            cts_line: false,
            rts_line: false,
            vote_error: false,
        };
        // Seed the edge detector with the reset-state levels so the empty
        // FIFOs do not fire watermark events on the first tick.
        core.levels = core.watermark_levels();
        core
    }

    /// Restore the reset state, clearing both FIFOs.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Deliver one received frame from the external framer.
    ///
    /// A set parity flag latches the parity-error status bit. A full FIFO
    /// drops the frame and latches rx-overflow instead; the return value
    /// tells the framer whether the frame was accepted.
    pub fn rx_deliver(&mut self, parity_error: bool, data: u8) -> bool {
        if parity_error {
            log::debug!("parity error latched for {:#04x}", data);
            self.irq.raise(Event::ParityError);
        }
        match self.rx_fifo.push(FifoEntry::received(parity_error, data)) {
            Ok(()) => true,
            Err(_) => {
                log::debug!("rx fifo full, dropped {:#04x}", data);
                self.irq.raise(Event::RxOverflow);
                false
            }
        }
    }

    /// Deliver clean frames until the data is consumed or the FIFO is
    /// full. Returns the number of accepted frames.
    pub fn rx_deliver_all(&mut self, data: &[u8]) -> usize {
        let mut accepted = 0;
        for &byte in data {
            if self.rx_fifo.is_full() {
                break;
            }
            self.rx_deliver(false, byte);
            accepted += 1;
        }
        accepted
    }

    /// Pop the next outgoing entry for the external shifter.
    ///
    /// Returns `None` while the transmitter is disabled or the FIFO is
    /// empty; the shifter polls again on its next bit clock.
    pub fn tx_take(&mut self) -> Option<FifoEntry> {
        if !self.tx_control.enable() {
            return None;
        }
        self.tx_fifo.pop().ok()
    }

    /// Drain outgoing data bytes into `buf`, returning how many were
    /// taken.
    pub fn tx_drain_into(&mut self, buf: &mut [u8]) -> usize {
        let mut taken = 0;
        for slot in buf.iter_mut() {
            match self.tx_take() {
                Some(entry) => {
                    *slot = entry.data();
                    taken += 1;
                }
                None => break,
            }
        }
        taken
    }

    /// Aggregate interrupt line, `(status & enable) != 0`.
    pub fn interrupt(&self) -> bool {
        self.irq.level()
    }

    pub fn set_cts_line(&mut self, level: bool) {
        self.cts_line = level;
    }

    pub fn set_rts_line(&mut self, level: bool) {
        self.rts_line = level;
    }

    /// Voter result reported by the external redundancy logic, surfaced in
    /// STATUS bit 7.
    pub fn set_vote_error(&mut self, level: bool) {
        self.vote_error = level;
    }

    /// Effective clear-to-send: the forced value when the override is set,
    /// otherwise the externally supplied pin level.
    pub fn cts(&self) -> bool {
        if self.rx_control.force_cts() {
            self.rx_control.force_cts_value()
        } else {
            self.cts_line
        }
    }

    /// Effective request-to-send, with the TX_CONTROL override applied.
    pub fn rts(&self) -> bool {
        if self.tx_control.force_rts() {
            self.tx_control.force_rts_value()
        } else {
            self.rts_line
        }
    }

    pub fn tx_enabled(&self) -> bool {
        self.tx_control.enable()
    }

    pub fn rx_enabled(&self) -> bool {
        self.rx_control.enable()
    }

    pub fn tx_parity(&self) -> Parity {
        self.tx_control.parity()
    }

    pub fn rx_parity(&self) -> Parity {
        self.rx_control.parity()
    }

    /// Configured baud terminal count, consumed by the external clock
    /// generator.
    pub fn baud_count(&self) -> u16 {
        self.baud_count
    }
}

impl Default for UartCore {
    fn default() -> Self {
        Self::new()
    }
}

impl embedded_hal_nb::serial::ErrorType for UartCore {
    type Error = Infallible;
}

/// Line side of the transmitter: reads what the peripheral sends.
impl embedded_hal_nb::serial::Read for UartCore {
    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        match self.tx_take() {
            Some(entry) => Ok(entry.data()),
            None => Err(nb::Error::WouldBlock),
        }
    }
}

/// Line side of the receiver: writes clean frames into the RX FIFO.
impl embedded_hal_nb::serial::Write for UartCore {
    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        if self.rx_fifo.is_full() {
            return Err(nb::Error::WouldBlock);
        }
        self.rx_deliver(false, word);
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        Ok(())
    }
}
