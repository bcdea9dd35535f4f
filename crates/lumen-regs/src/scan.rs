//! Scan coordinate decoding and blanking classification.
//!
//! The device latches its current raster position into [`REG_COORD_DATA`] as
//! packed bit-fields: frame id in bits 0..12, row in bits 12..22, column in
//! bits 22..32. The thresholds below are fixed by the 640x480 output timing
//! and are not runtime-configurable.

use crate::{MmioSpace, RegError, RegisterBank, COORD_VALID, REG_COORD_CTRL, REG_COORD_DATA};

/// Rows below this are inside the vertical blanking interval.
pub const VBLANK_ROWS: u16 = 45;
/// Columns below this are inside the horizontal blanking interval.
pub const HBLANK_COLUMNS: u16 = 160;
/// Rows in `VSYNC_ROW_FIRST..VSYNC_ROW_END` carry the vertical sync pulse.
pub const VSYNC_ROW_FIRST: u16 = 10;
pub const VSYNC_ROW_END: u16 = 12;

/// Iterations to spin on the coordinate-valid bit before declaring the
/// hardware handshake broken. The bit is expected within a few device clock
/// cycles, so this is orders of magnitude more than enough.
const COORD_SPIN_LIMIT: u32 = 10_000;

/// A decoded raster position. Ephemeral: valid only for the instant it was
/// latched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPos {
    /// Frame id, 12 bits.
    pub frame: u16,
    /// Scan row, 10 bits.
    pub row: u16,
    /// Scan column, 10 bits.
    pub column: u16,
}

impl ScanPos {
    /// Unpacks a raw coordinate register value. Pure; no side effects.
    pub fn decode(raw: u32) -> Self {
        Self {
            frame: (raw & 0xFFF) as u16,
            row: ((raw >> 12) & 0x3FF) as u16,
            column: ((raw >> 22) & 0x3FF) as u16,
        }
    }

    /// Packs this position back into the register encoding.
    pub fn to_raw(self) -> u32 {
        u32::from(self.frame & 0xFFF)
            | (u32::from(self.row & 0x3FF) << 12)
            | (u32::from(self.column & 0x3FF) << 22)
    }

    pub fn is_vblank(&self) -> bool {
        self.row < VBLANK_ROWS
    }

    pub fn is_hblank(&self) -> bool {
        self.column < HBLANK_COLUMNS
    }

    pub fn is_vsync(&self) -> bool {
        (VSYNC_ROW_FIRST..VSYNC_ROW_END).contains(&self.row)
    }
}

/// Reads the current scan position.
///
/// Spins briefly until the coordinate-valid handshake bit asserts, then reads
/// and decodes the data register. A valid bit that never asserts is a broken
/// hardware contract, reported as [`RegError::CoordNeverValid`].
pub fn read_scan_pos<M: MmioSpace>(bank: &RegisterBank<M>) -> Result<ScanPos, RegError> {
    let mut spins = 0;
    while bank.read32(REG_COORD_CTRL)? & COORD_VALID == 0 {
        spins += 1;
        if spins >= COORD_SPIN_LIMIT {
            return Err(RegError::CoordNeverValid);
        }
        std::hint::spin_loop();
    }
    Ok(ScanPos::decode(bank.read32(REG_COORD_DATA)?))
}
