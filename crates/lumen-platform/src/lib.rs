//! Platform seam for the display driver core.
//!
//! Resource discovery (register physical address, IRQ number, presentation
//! registration) lives outside this repository; [`Platform`] is the interface
//! the lifecycle controller drives, with paired acquire/release methods so
//! rollback and teardown can release exactly what was acquired. The
//! [`sim::SimPlatform`] implementation backs the test suite.

#![forbid(unsafe_code)]

pub mod mode;
pub mod sim;

use std::sync::{Arc, Mutex};

use bitflags::bitflags;
use lumen_regs::MmioSpace;
use thiserror::Error;

use crate::mode::DisplayMode;

/// Number of entries in the auxiliary palette table.
pub const PALETTE_LEN: usize = 16;

/// Why a platform resource could not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("resource unavailable: {0}")]
    Unavailable(&'static str),

    #[error("out of memory")]
    NoMemory,

    #[error("interrupt line busy")]
    IrqBusy,
}

bitflags! {
    /// Memory attributes requested for DMA allocations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaAttrs: u32 {
        /// Write-combining mapping, for write-mostly device buffers.
        const WRITE_COMBINE = 1 << 0;
    }
}

/// The DMA-backed pixel buffer.
///
/// Has two addresses: the program-visible side exposed through [`read`] and
/// [`write`] (modeling the consumer mapping), and the [`bus_addr`] the device
/// scans out from. The software side is write-mostly; no read-modify-write
/// coherency with the device is guaranteed or needed.
///
/// [`read`]: FrameBuffer::read
/// [`write`]: FrameBuffer::write
/// [`bus_addr`]: FrameBuffer::bus_addr
#[derive(Debug)]
pub struct FrameBuffer {
    bytes: Mutex<Box<[u8]>>,
    bus_addr: u32,
}

impl FrameBuffer {
    /// Allocates a zeroed buffer. Platform implementations call this from
    /// `alloc_frame_buffer`.
    pub fn new(len: usize, bus_addr: u32) -> Self {
        Self {
            bytes: Mutex::new(vec![0u8; len].into_boxed_slice()),
            bus_addr,
        }
    }

    pub fn bus_addr(&self) -> u32 {
        self.bus_addr
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().expect("frame buffer lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies `src` into the buffer at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the range falls outside the buffer.
    pub fn write(&self, offset: usize, src: &[u8]) {
        let mut bytes = self.bytes.lock().expect("frame buffer lock poisoned");
        bytes[offset..offset + src.len()].copy_from_slice(src);
    }

    /// Copies bytes at `offset` into `dst`.
    ///
    /// # Panics
    ///
    /// Panics if the range falls outside the buffer.
    pub fn read(&self, offset: usize, dst: &mut [u8]) {
        let bytes = self.bytes.lock().expect("frame buffer lock poisoned");
        dst.copy_from_slice(&bytes[offset..offset + dst.len()]);
    }
}

/// The 16-entry auxiliary palette table, zero-initialized on allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Palette {
    entries: [u32; PALETTE_LEN],
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if `index >= PALETTE_LEN`.
    pub fn get(&self, index: usize) -> u32 {
        self.entries[index]
    }

    /// # Panics
    ///
    /// Panics if `index >= PALETTE_LEN`.
    pub fn set(&mut self, index: usize, word: u32) {
        self.entries[index] = word;
    }
}

/// Handle to an installed interrupt handler.
#[derive(Debug)]
pub struct IrqLine {
    irq: u32,
}

impl IrqLine {
    pub fn new(irq: u32) -> Self {
        Self { irq }
    }

    pub fn irq(&self) -> u32 {
        self.irq
    }
}

/// Handle to a device registration with the presentation layer.
#[derive(Debug)]
pub struct Published {
    _private: (),
}

impl Published {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for Published {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one interrupt handler invocation, mirroring what the handler
/// reports back to the interrupt subsystem on a shared line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqDisposition {
    /// The interrupt was for this device and was acknowledged.
    Handled,
    /// The line was asserted by some other device sharing it.
    NotMine,
    /// A fatal invariant violation was detected; the device context is dead.
    Faulted,
}

/// An installed interrupt handler.
///
/// Runs in interrupt context: it must not block, must not allocate, and must
/// finish in bounded time.
pub trait IrqHandler: Send + Sync {
    fn handle_irq(&self) -> IrqDisposition;
}

/// Ordered resource acquisition and release, driven by the lifecycle
/// controller.
///
/// Every acquire has a matching release; the controller calls the releases in
/// exact reverse acquisition order on both rollback and teardown.
pub trait Platform {
    type Mmio: MmioSpace + Clone + Send + Sync + 'static;

    /// Maps the device register window into the program address space.
    fn map_registers(&mut self) -> Result<Self::Mmio, PlatformError>;
    fn unmap_registers(&mut self, mmio: Self::Mmio);

    /// Allocates the DMA pixel buffer with the given memory attributes.
    fn alloc_frame_buffer(
        &mut self,
        len: usize,
        attrs: DmaAttrs,
    ) -> Result<FrameBuffer, PlatformError>;
    fn free_frame_buffer(&mut self, fb: FrameBuffer);

    fn alloc_palette(&mut self) -> Result<Palette, PlatformError>;
    fn free_palette(&mut self, palette: Palette);

    /// Installs `handler` on the platform-assigned interrupt line.
    fn install_irq(&mut self, handler: Arc<dyn IrqHandler>) -> Result<IrqLine, PlatformError>;
    fn remove_irq(&mut self, line: IrqLine);

    /// Registers the device with the presentation layer, described by `mode`.
    fn publish(&mut self, mode: &DisplayMode) -> Result<Published, PlatformError>;
    fn unpublish(&mut self, published: Published);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_buffer_round_trips_pixel_writes() {
        let fb = FrameBuffer::new(64, 0x1000_0000);
        fb.write(8, &[1, 2, 3, 4]);
        let mut out = [0u8; 4];
        fb.read(8, &mut out);
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(fb.bus_addr(), 0x1000_0000);
    }

    #[test]
    fn palette_starts_zeroed() {
        let palette = Palette::new();
        for index in 0..PALETTE_LEN {
            assert_eq!(palette.get(index), 0);
        }
    }

    #[test]
    #[should_panic]
    fn palette_get_out_of_range_panics() {
        let palette = Palette::new();
        palette.get(PALETTE_LEN);
    }

    #[test]
    #[should_panic]
    fn palette_set_out_of_range_panics() {
        let mut palette = Palette::new();
        palette.set(PALETTE_LEN, 0xFF);
    }
}
