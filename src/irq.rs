//! Sticky interrupt status, enable mask and watermark event detection.
//!
//! Eight independent sticky bits, one per event source. A bit stays set
//! until software writes a 1 to it through INT_STATUS (write-1-to-clear,
//! applied as one masked-AND update). The aggregate interrupt line is the
//! OR of `status & enable`, recomputed every tick.

use crate::UartCore;

/// Layout shared by INT_STATUS and INT_ENABLE.
#[bitbybit::bitfield(u8, default = 0x0)]
pub struct InterruptFlags {
    #[bit(7, rw)]
    pub read_on_empty: bool,
    #[bit(6, rw)]
    pub parity_error: bool,
    #[bit(5, rw)]
    pub rx_overflow: bool,
    #[bit(4, rw)]
    pub rx_high: bool,
    #[bit(3, rw)]
    pub rx_low: bool,
    #[bit(2, rw)]
    pub tx_overflow: bool,
    #[bit(1, rw)]
    pub tx_high: bool,
    #[bit(0, rw)]
    pub tx_low: bool,
}

/// Event sources feeding the sticky status bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Event {
    TxLow,
    TxHigh,
    TxOverflow,
    RxLow,
    RxHigh,
    RxOverflow,
    ParityError,
    ReadOnEmpty,
}

impl Event {
    pub const fn mask(self) -> u8 {
        match self {
            Event::TxLow => 1 << 0,
            Event::TxHigh => 1 << 1,
            Event::TxOverflow => 1 << 2,
            Event::RxLow => 1 << 3,
            Event::RxHigh => 1 << 4,
            Event::RxOverflow => 1 << 5,
            Event::ParityError => 1 << 6,
            Event::ReadOnEmpty => 1 << 7,
        }
    }
}

pub(crate) struct IrqState {
    pub(crate) enable: InterruptFlags,
    pub(crate) status: InterruptFlags,
}

impl IrqState {
    /// Reset state: all enables clear, read-on-empty flagged pending.
    pub(crate) fn new() -> Self {
        Self {
            enable: InterruptFlags::new_with_raw_value(0),
            status: InterruptFlags::new_with_raw_value(Event::ReadOnEmpty.mask()),
        }
    }

    pub(crate) fn raise(&mut self, event: Event) {
        self.status =
            InterruptFlags::new_with_raw_value(self.status.raw_value() | event.mask());
    }

    /// Write-1-to-clear: drop exactly the written bits, leave the rest.
    pub(crate) fn acknowledge(&mut self, mask: u8) {
        self.status = InterruptFlags::new_with_raw_value(self.status.raw_value() & !mask);
    }

    pub(crate) fn level(&self) -> bool {
        self.status.raw_value() & self.enable.raw_value() != 0
    }
}

/// Watermark levels observed on the previous tick, for edge detection.
///
/// The sticky watermark bits latch on the rising edge of the condition;
/// latching the level itself would re-set a bit on the tick after software
/// cleared it and make write-1-to-clear unobservable while the condition
/// holds.
#[derive(Copy, Clone)]
pub(crate) struct WatermarkLevels {
    pub(crate) tx_low: bool,
    pub(crate) tx_high: bool,
    pub(crate) rx_low: bool,
    pub(crate) rx_high: bool,
}

impl UartCore {
    /// Scan the FIFO levels and latch rising edges. Runs once per tick,
    /// after any bus side effect, so same-tick push/pop nets are observed.
    pub(crate) fn scan_watermarks(&mut self) {
        let now = self.watermark_levels();
        if now.tx_low && !self.levels.tx_low {
            self.irq.raise(Event::TxLow);
        }
        if now.tx_high && !self.levels.tx_high {
            self.irq.raise(Event::TxHigh);
        }
        if now.rx_low && !self.levels.rx_low {
            self.irq.raise(Event::RxLow);
        }
        if now.rx_high && !self.levels.rx_high {
            log::debug!("rx watermark reached, occupancy {}", self.rx_fifo.len());
            self.irq.raise(Event::RxHigh);
        }
        self.levels = now;
    }

    pub(crate) fn watermark_levels(&self) -> WatermarkLevels {
        WatermarkLevels {
            tx_low: self.tx_fifo.low(),
            tx_high: self.tx_fifo.high(),
            rx_low: self.rx_fifo.low(),
            rx_high: self.rx_fifo.high(),
        }
    }
}
