//! Register-level access to the display scan-out peripheral.
//!
//! The device exposes a 32-byte window of 32-bit little-endian registers.
//! [`RegisterBank`] provides bounds- and alignment-checked access over any
//! [`MmioSpace`] implementation; [`sim::RegisterFile`] is the in-repo
//! implementation used by tests.

#![forbid(unsafe_code)]

pub mod scan;
pub mod sim;

use std::sync::Arc;

use bitflags::bitflags;
use thiserror::Error;

/// Control register. Holds the run bits and the read-only interrupt-pending
/// flag.
pub const REG_CTRL: u32 = 0x00;
/// Global interrupt enable. Bit 0 gates all interrupt delivery.
pub const REG_GIE: u32 = 0x04;
/// Interrupt enable mask. One bit per interrupt source.
pub const REG_IER: u32 = 0x08;
/// Interrupt status. Write-1-to-clear.
pub const REG_ISR: u32 = 0x0c;
/// Frame buffer bus address, as seen by the device.
pub const REG_BUF: u32 = 0x10;
/// Latched scan coordinate (frame/row/column bit-fields).
pub const REG_COORD_DATA: u32 = 0x18;
/// Scan coordinate handshake. Bit 0 is the "coordinate valid" flag.
pub const REG_COORD_CTRL: u32 = 0x1c;

/// Length of the register window in bytes.
pub const MMIO_LEN: u32 = 0x20;

/// Value written to [`REG_GIE`] to enable interrupt delivery.
pub const GIE_ENABLE: u32 = 0x01;

/// Bit 0 of [`REG_COORD_CTRL`]: the latched coordinate is valid.
pub const COORD_VALID: u32 = 0x01;

bitflags! {
    /// Bits of the control register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ctrl: u32 {
        /// Start scanning out frames.
        const START = 0x001;
        /// Restart automatically at the end of each frame.
        const AUTO_RESTART = 0x080;
        /// Read-only: the device is asserting its interrupt line.
        const IRQ_PENDING = 0x200;
    }

    /// Bits shared by the interrupt enable and status registers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Irq: u32 {
        /// Fired once at the start of every frame.
        const FRAME = 0x02;
    }
}

impl Ctrl {
    /// Run value programmed when arming the device.
    pub const RUN: Ctrl = Ctrl::START.union(Ctrl::AUTO_RESTART);
}

/// Register access invariant violations.
///
/// These indicate a programming error in the caller or a broken hardware
/// contract, not a transient condition. They are fatal at the device level;
/// callers must not retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegError {
    #[error("register offset {offset:#x} outside the {MMIO_LEN:#x}-byte window")]
    OffsetOutOfRange { offset: u32 },

    #[error("register offset {offset:#x} is not 32-bit aligned")]
    OffsetMisaligned { offset: u32 },

    #[error("scan coordinate valid bit never asserted")]
    CoordNeverValid,
}

/// A 32-bit MMIO register space.
///
/// Register reads and writes can have device-side effects, but never mutate
/// driver-visible state through `&self`; implementations are shared between
/// the interrupt path and process-context callers.
pub trait MmioSpace: Send + Sync {
    fn read32(&self, offset: u32) -> u32;
    fn write32(&self, offset: u32, value: u32);
}

impl<M: MmioSpace + ?Sized> MmioSpace for &M {
    fn read32(&self, offset: u32) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&self, offset: u32, value: u32) {
        (**self).write32(offset, value)
    }
}

impl<M: MmioSpace + ?Sized> MmioSpace for Arc<M> {
    fn read32(&self, offset: u32) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&self, offset: u32, value: u32) {
        (**self).write32(offset, value)
    }
}

/// Bounds-checked view of the device register window.
///
/// A `RegisterBank` only exists once the window has been mapped, so holding
/// one is proof the device is at least in the registers-mapped state.
#[derive(Debug, Clone)]
pub struct RegisterBank<M: MmioSpace> {
    mmio: M,
}

impl<M: MmioSpace> RegisterBank<M> {
    pub fn new(mmio: M) -> Self {
        Self { mmio }
    }

    fn check(offset: u32) -> Result<(), RegError> {
        if offset >= MMIO_LEN {
            return Err(RegError::OffsetOutOfRange { offset });
        }
        if offset % 4 != 0 {
            return Err(RegError::OffsetMisaligned { offset });
        }
        Ok(())
    }

    pub fn read32(&self, offset: u32) -> Result<u32, RegError> {
        Self::check(offset)?;
        Ok(self.mmio.read32(offset))
    }

    pub fn write32(&self, offset: u32, value: u32) -> Result<(), RegError> {
        Self::check(offset)?;
        self.mmio.write32(offset, value);
        Ok(())
    }
}

/// Named accessors for the fixed registers. These cannot fail: the offsets
/// are compile-time members of the window.
impl<M: MmioSpace> RegisterBank<M> {
    pub fn ctrl(&self) -> u32 {
        self.mmio.read32(REG_CTRL)
    }

    pub fn set_ctrl(&self, value: u32) {
        self.mmio.write32(REG_CTRL, value);
    }

    pub fn set_gie(&self, value: u32) {
        self.mmio.write32(REG_GIE, value);
    }

    pub fn set_ier(&self, value: u32) {
        self.mmio.write32(REG_IER, value);
    }

    pub fn isr(&self) -> u32 {
        self.mmio.read32(REG_ISR)
    }

    /// Acknowledges status bits (write-1-to-clear).
    pub fn ack_isr(&self, bits: u32) {
        self.mmio.write32(REG_ISR, bits);
    }

    pub fn set_buf_addr(&self, bus_addr: u32) {
        self.mmio.write32(REG_BUF, bus_addr);
    }

    /// Reads the coordinate handshake register. Used both for the valid-bit
    /// poll and for discarding stale coordinate state.
    pub fn coord_ctrl(&self) -> u32 {
        self.mmio.read32(REG_COORD_CTRL)
    }
}
