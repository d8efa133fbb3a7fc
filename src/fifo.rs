//! Fixed-depth 13-bit FIFOs with programmable watermarks.
//!
//! Both queues of the core are instances of [Fifo]: eight entries of
//! [FifoEntry], an occupancy counter and two 3-bit thresholds. The low/high
//! watermark conditions are pure functions of the occupancy and are never
//! stored.

use arbitrary_int::{u3, u4, u5};

use crate::FIFO_DEPTH;

/// One 13-bit queue entry: a data byte plus five high bits.
///
/// For receive entries bit 8 carries the parity-error flag raised by the
/// external framer; bits 12:9 are reserved. Transmit entries carry whatever
/// the CPU wrote to the data-port high register.
#[bitbybit::bitfield(u16, default = 0x0)]
pub struct FifoEntry {
    #[bits(8..=12, rw)]
    pub hi: u5,
    #[bits(0..=7, rw)]
    pub data: u8,
}

impl FifoEntry {
    /// Build a receive entry as delivered by the framer.
    pub fn received(parity_error: bool, data: u8) -> Self {
        Self::builder()
            .with_hi(u5::new(parity_error as u8))
            .with_data(data)
            .build()
    }

    pub fn parity_error(&self) -> bool {
        self.hi().value() & 0x01 != 0
    }
}

/// Refused queue operation. The caller records the matching sticky status
/// bit; the queue itself never blocks or loses already-accepted entries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FifoError {
    #[error("push refused, fifo full")]
    Full,
    #[error("pop refused, fifo empty")]
    Empty,
}

/// Depth-8 ring buffer with watermark thresholds.
pub struct Fifo {
    slots: [FifoEntry; FIFO_DEPTH],
    head: usize,
    count: usize,
    low_threshold: u3,
    high_threshold: u3,
}

impl Fifo {
    pub fn new(low_threshold: u3, high_threshold: u3) -> Self {
        Self {
            slots: [FifoEntry::new_with_raw_value(0); FIFO_DEPTH],
            head: 0,
            count: 0,
            low_threshold,
            high_threshold,
        }
    }

    pub fn push(&mut self, entry: FifoEntry) -> Result<(), FifoError> {
        if self.count == FIFO_DEPTH {
            return Err(FifoError::Full);
        }
        self.slots[(self.head + self.count) % FIFO_DEPTH] = entry;
        self.count += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<FifoEntry, FifoError> {
        if self.count == 0 {
            return Err(FifoError::Empty);
        }
        let entry = self.slots[self.head];
        self.head = (self.head + 1) % FIFO_DEPTH;
        self.count -= 1;
        Ok(entry)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Occupancy as read through the count registers, 4 bits to include the
    /// full value of 8.
    pub fn count(&self) -> u4 {
        u4::new(self.count as u8)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == FIFO_DEPTH
    }

    pub fn low(&self) -> bool {
        self.count <= self.low_threshold.value() as usize
    }

    pub fn high(&self) -> bool {
        self.count >= self.high_threshold.value() as usize
    }

    pub fn low_threshold(&self) -> u3 {
        self.low_threshold
    }

    pub fn high_threshold(&self) -> u3 {
        self.high_threshold
    }

    pub fn set_low_threshold(&mut self, threshold: u3) {
        self.low_threshold = threshold;
    }

    pub fn set_high_threshold(&mut self, threshold: u3) {
        self.high_threshold = threshold;
    }
}
