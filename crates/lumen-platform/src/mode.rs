//! The fixed display mode record.
//!
//! Purely descriptive: published alongside the device so consumers know the
//! buffer geometry and pixel format. Nothing here is ever programmed back
//! into the hardware, which only knows the one timing it was synthesized for.

use std::time::Duration;

/// One color channel's position within a 32-bit pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelField {
    /// Bit offset of the field's LSB.
    pub offset: u8,
    /// Field width in bits. Zero means the channel is not stored.
    pub length: u8,
}

/// Descriptive record of the single supported output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    /// Bytes per scan line.
    pub line_length: u32,
    /// Pixel clock period in picoseconds.
    pub pixclock_ps: u32,
    pub left_margin: u32,
    pub right_margin: u32,
    pub upper_margin: u32,
    pub lower_margin: u32,
    pub hsync_len: u32,
    pub vsync_len: u32,
    pub red: ChannelField,
    pub green: ChannelField,
    pub blue: ChannelField,
    pub transp: ChannelField,
}

/// The 640x480 truecolor mode the scan-out hardware is synthesized for.
pub const FIXED_MODE: DisplayMode = DisplayMode {
    width: 640,
    height: 480,
    bits_per_pixel: 32,
    line_length: 640 * 4,
    pixclock_ps: 39_721,
    left_margin: 40,
    right_margin: 24,
    upper_margin: 32,
    lower_margin: 11,
    hsync_len: 96,
    vsync_len: 2,
    red: ChannelField { offset: 16, length: 8 },
    green: ChannelField { offset: 8, length: 8 },
    blue: ChannelField { offset: 0, length: 8 },
    // Transparency is not stored; see the palette packing in lumen-core.
    transp: ChannelField { offset: 24, length: 0 },
};

impl DisplayMode {
    /// Size of the pixel buffer in bytes.
    pub const fn buffer_len(&self) -> usize {
        (self.width * self.height * (self.bits_per_pixel / 8)) as usize
    }

    /// Duration of one full frame, including blanking, in nanoseconds.
    pub const fn frame_period_ns(&self) -> u64 {
        let total_columns = self.width + self.left_margin + self.right_margin + self.hsync_len;
        let total_rows = self.height + self.upper_margin + self.lower_margin + self.vsync_len;
        (total_columns as u64) * (total_rows as u64) * (self.pixclock_ps as u64) / 1000
    }

    /// Budget for waiting on the next vblank: one frame period plus 20%
    /// margin. Exceeding this means the interrupt never arrived.
    pub fn vsync_wait_budget(&self) -> Duration {
        let period = self.frame_period_ns();
        Duration::from_nanos(period + period / 5)
    }
}
