//! Simulated register file.
//!
//! Stands in for the mapped hardware window in tests, the same way the
//! platform interrupt controller is stood in for by an in-crate test double.
//! Storage is flat except for the hardware-defined side effects: the
//! interrupt status register is write-1-to-clear, and the control register's
//! interrupt-pending bit deasserts once all status bits are cleared.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::scan::ScanPos;
use crate::{Ctrl, Irq, MmioSpace, COORD_VALID, MMIO_LEN, REG_COORD_CTRL, REG_COORD_DATA, REG_ISR};

#[derive(Debug)]
pub struct RegisterFile {
    regs: [AtomicU32; (MMIO_LEN / 4) as usize],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        Self {
            regs: std::array::from_fn(|_| AtomicU32::new(0)),
        }
    }

    fn slot(&self, offset: u32) -> &AtomicU32 {
        assert!(offset < MMIO_LEN && offset % 4 == 0, "raw register access out of window");
        &self.regs[(offset / 4) as usize]
    }

    /// Peek at a register without modeling any read side effect.
    pub fn peek(&self, offset: u32) -> u32 {
        self.slot(offset).load(Ordering::SeqCst)
    }

    /// Asserts the given status bits and raises the interrupt line, as the
    /// hardware does when an event fires.
    pub fn raise_status(&self, bits: u32) {
        self.slot(REG_ISR).fetch_or(bits, Ordering::SeqCst);
        self.slot(crate::REG_CTRL)
            .fetch_or(Ctrl::IRQ_PENDING.bits(), Ordering::SeqCst);
    }

    /// Fires the per-frame interrupt.
    pub fn raise_frame_irq(&self) {
        self.raise_status(Irq::FRAME.bits());
    }

    /// Latches a scan coordinate and asserts the coordinate-valid bit.
    pub fn latch_coordinate(&self, frame: u16, row: u16, column: u16) {
        let raw = ScanPos { frame, row, column }.to_raw();
        self.slot(REG_COORD_DATA).store(raw, Ordering::SeqCst);
        self.slot(REG_COORD_CTRL)
            .fetch_or(COORD_VALID, Ordering::SeqCst);
    }
}

impl MmioSpace for RegisterFile {
    fn read32(&self, offset: u32) -> u32 {
        self.slot(offset).load(Ordering::SeqCst)
    }

    fn write32(&self, offset: u32, value: u32) {
        if offset == REG_ISR {
            // Write-1-to-clear. The interrupt line follows the status bits.
            let prev = self.slot(REG_ISR).fetch_and(!value, Ordering::SeqCst);
            if prev & !value == 0 {
                self.slot(crate::REG_CTRL)
                    .fetch_and(!Ctrl::IRQ_PENDING.bits(), Ordering::SeqCst);
            }
        } else {
            self.slot(offset).store(value, Ordering::SeqCst);
        }
    }
}
