//! Register map, field layouts and the read/write dispatch.
//!
//! Addresses span 5 bits (0x00..=0x10). Unmapped addresses read as zero and
//! drop writes; a write to a read-only register is silently ignored. The two
//! threshold register pairs live at 0x4/0x5 and 0x8/0x9, the FIFO data ports
//! at 0xD..=0x10.

use arbitrary_int::{u3, u5};

use crate::UartCore;
use crate::fifo::FifoEntry;
use crate::irq::{Event, InterruptFlags};

/// Reset value of the baud terminal count (57600 baud at the reference clock).
pub const RESET_BAUD_COUNT: u16 = 248;
/// Reset value of both low watermark thresholds.
pub const RESET_WATERMARK_LOW: u3 = u3::new(2);
/// Reset value of both high watermark thresholds.
pub const RESET_WATERMARK_HIGH: u3 = u3::new(6);
/// Reset value of TX_CONTROL and RX_CONTROL: enabled, even parity, no force.
pub const RESET_CONTROL: u8 = 0x01;

#[bitbybit::bitenum(u1, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum Parity {
    Even = 0,
    Odd = 1,
}

/// STATUS (0x0), read-only live view of the core.
#[bitbybit::bitfield(u8)]
pub struct Status {
    /// Voter result supplied by the external redundancy logic.
    #[bit(7, rw)]
    pub vote_error: bool,
    /// Parity flag of the entry currently in the RX hold register.
    #[bit(6, rw)]
    pub parity_error: bool,
    #[bit(5, rw)]
    pub rx_empty: bool,
    #[bit(4, rw)]
    pub rx_high: bool,
    #[bit(3, rw)]
    pub rx_low: bool,
    #[bit(2, rw)]
    pub tx_full: bool,
    #[bit(1, rw)]
    pub tx_high: bool,
    #[bit(0, rw)]
    pub tx_low: bool,
}

/// TX_CONTROL (0x3).
#[bitbybit::bitfield(u8, default = 0x01)]
pub struct TxControl {
    #[bit(3, rw)]
    pub force_rts_value: bool,
    #[bit(2, rw)]
    pub force_rts: bool,
    #[bit(1, rw)]
    pub parity: Parity,
    #[bit(0, rw)]
    pub enable: bool,
}

/// RX_CONTROL (0x7).
#[bitbybit::bitfield(u8, default = 0x01)]
pub struct RxControl {
    #[bit(3, rw)]
    pub force_cts_value: bool,
    #[bit(2, rw)]
    pub force_cts: bool,
    #[bit(1, rw)]
    pub parity: Parity,
    #[bit(0, rw)]
    pub enable: bool,
}

/// Addressable registers of the core.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Reg {
    Status,
    IntEnable,
    IntStatus,
    TxControl,
    TxWatermarkLow,
    TxWatermarkHigh,
    TxFifoCount,
    RxControl,
    RxWatermarkLow,
    RxWatermarkHigh,
    RxFifoCount,
    BaudCountLow,
    BaudCountHigh,
    TxFifoDataLow,
    TxFifoDataHigh,
    RxFifoDataLow,
    RxFifoDataHigh,
}

impl Reg {
    /// Resolve an address for a read. Write-only and unmapped addresses
    /// return `None` and read as zero.
    pub const fn for_read(addr: u5) -> Option<Self> {
        match addr.value() {
            0x00 => Some(Self::Status),
            0x01 => Some(Self::IntEnable),
            0x02 => Some(Self::IntStatus),
            0x03 => Some(Self::TxControl),
            0x04 => Some(Self::TxWatermarkLow),
            0x05 => Some(Self::TxWatermarkHigh),
            0x06 => Some(Self::TxFifoCount),
            0x07 => Some(Self::RxControl),
            0x08 => Some(Self::RxWatermarkLow),
            0x09 => Some(Self::RxWatermarkHigh),
            0x0a => Some(Self::RxFifoCount),
            0x0b => Some(Self::BaudCountLow),
            0x0c => Some(Self::BaudCountHigh),
            0x0f => Some(Self::RxFifoDataLow),
            0x10 => Some(Self::RxFifoDataHigh),
            _ => None,
        }
    }

    /// Resolve an address for a write. Read-only and unmapped addresses
    /// return `None` and the write is dropped.
    pub const fn for_write(addr: u5) -> Option<Self> {
        match addr.value() {
            0x01 => Some(Self::IntEnable),
            0x02 => Some(Self::IntStatus),
            0x03 => Some(Self::TxControl),
            0x04 => Some(Self::TxWatermarkLow),
            0x05 => Some(Self::TxWatermarkHigh),
            0x07 => Some(Self::RxControl),
            0x08 => Some(Self::RxWatermarkLow),
            0x09 => Some(Self::RxWatermarkHigh),
            0x0b => Some(Self::BaudCountLow),
            0x0c => Some(Self::BaudCountHigh),
            0x0d => Some(Self::TxFifoDataLow),
            0x0e => Some(Self::TxFifoDataHigh),
            _ => None,
        }
    }
}

impl UartCore {
    /// Live STATUS view, rebuilt from current state on every read.
    pub fn status(&self) -> Status {
        Status::builder()
            .with_vote_error(self.vote_error)
            .with_parity_error(self.rx_hold.parity_error())
            .with_rx_empty(self.rx_fifo.is_empty())
            .with_rx_high(self.rx_fifo.high())
            .with_rx_low(self.rx_fifo.low())
            .with_tx_full(self.tx_fifo.is_full())
            .with_tx_high(self.tx_fifo.high())
            .with_tx_low(self.tx_fifo.low())
            .build()
    }

    pub(crate) fn read_register(&self, reg: Reg) -> u8 {
        match reg {
            Reg::Status => self.status().raw_value(),
            Reg::IntEnable => self.irq.enable.raw_value(),
            Reg::IntStatus => self.irq.status.raw_value(),
            Reg::TxControl => self.tx_control.raw_value(),
            Reg::TxWatermarkLow => self.tx_fifo.low_threshold().value(),
            Reg::TxWatermarkHigh => self.tx_fifo.high_threshold().value(),
            Reg::TxFifoCount => self.tx_fifo.count().value(),
            Reg::RxControl => self.rx_control.raw_value(),
            Reg::RxWatermarkLow => self.rx_fifo.low_threshold().value(),
            Reg::RxWatermarkHigh => self.rx_fifo.high_threshold().value(),
            Reg::RxFifoCount => self.rx_fifo.count().value(),
            Reg::BaudCountLow => (self.baud_count & 0x00ff) as u8,
            Reg::BaudCountHigh => (self.baud_count >> 8) as u8,
            // Write-only ports, never resolved by for_read.
            Reg::TxFifoDataLow | Reg::TxFifoDataHigh => 0,
            Reg::RxFifoDataLow => self.rx_hold.data(),
            Reg::RxFifoDataHigh => self.rx_hold.hi().value(),
        }
    }

    pub(crate) fn write_register(&mut self, reg: Reg, data: u8) {
        match reg {
            Reg::IntEnable => self.irq.enable = InterruptFlags::new_with_raw_value(data),
            Reg::IntStatus => self.irq.acknowledge(data),
            Reg::TxControl => self.tx_control = TxControl::new_with_raw_value(data & 0x0f),
            Reg::TxWatermarkLow => self.tx_fifo.set_low_threshold(u3::new(data & 0x07)),
            Reg::TxWatermarkHigh => self.tx_fifo.set_high_threshold(u3::new(data & 0x07)),
            Reg::RxControl => self.rx_control = RxControl::new_with_raw_value(data & 0x0f),
            Reg::RxWatermarkLow => self.rx_fifo.set_low_threshold(u3::new(data & 0x07)),
            Reg::RxWatermarkHigh => self.rx_fifo.set_high_threshold(u3::new(data & 0x07)),
            Reg::BaudCountLow => {
                self.baud_count = (self.baud_count & 0xff00) | u16::from(data);
            }
            Reg::BaudCountHigh => {
                self.baud_count = (self.baud_count & 0x00ff) | (u16::from(data) << 8);
            }
            Reg::TxFifoDataLow => self.tx_staged = data,
            Reg::TxFifoDataHigh => self.push_tx(data),
            // Read-only, never resolved by for_write.
            Reg::Status
            | Reg::TxFifoCount
            | Reg::RxFifoCount
            | Reg::RxFifoDataLow
            | Reg::RxFifoDataHigh => {}
        }
    }

    /// Assemble the staged entry with the written high bits and push it.
    /// A full queue refuses the entry; the attempt is latched as tx-overflow
    /// and the staged byte stays put for a retry.
    fn push_tx(&mut self, hi: u8) {
        let entry = FifoEntry::builder()
            .with_hi(u5::new(hi & 0x1f))
            .with_data(self.tx_staged)
            .build();
        if self.tx_fifo.push(entry).is_err() {
            log::debug!("tx push refused, fifo full, dropped {:#04x}", self.tx_staged);
            self.irq.raise(Event::TxOverflow);
        }
    }
}
