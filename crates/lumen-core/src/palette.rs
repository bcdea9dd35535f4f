//! Color-register conversion and packing.
//!
//! Callers hand us 16-bit channel values; the palette stores 8-bit channels
//! packed to match the bit-fields advertised in the fixed mode record
//! (red at 16, green at 8, blue at 0, no stored transparency).

/// Converts a 16-bit channel value to 8 bits with exact rounding:
/// `round(v * 255 / 65535)`. Plain truncation would map 0x8000 to 0x7F
/// instead of 0x80.
pub(crate) fn cvt_channel(value: u16) -> u8 {
    ((u32::from(value) * 0xFF + 0x7FFF) / 0xFFFF) as u8
}

/// Packs converted channels into a 0x00RRGGBB palette word.
pub(crate) fn pack_entry(red: u16, green: u16, blue: u16) -> u32 {
    (u32::from(cvt_channel(red)) << 16)
        | (u32::from(cvt_channel(green)) << 8)
        | u32::from(cvt_channel(blue))
}
