//! Rendering of raw property values for the status endpoint
//!
//! Numeric encodings are decoded here. Enumerated properties (white balance,
//! movie format and the like) have vendor display tables that are not
//! reproduced; they render as a label plus the raw value.

use crate::types::UNKNOWN_TEXT;

/// ISO sensitivity. Low 24 bits hold the value, bits 24..28 the auto mode.
pub fn format_iso(raw: u64) -> String {
    let raw = raw as u32;
    if raw == 0 || raw == 0x00FF_FFFF {
        return UNKNOWN_TEXT.into();
    }
    let value = raw & 0x00FF_FFFF;
    let mode = (raw >> 24) & 0x0F;
    match (mode, value) {
        (_, 0) => "ISO AUTO".into(),
        (0, v) => format!("ISO {}", v),
        (_, v) => format!("ISO AUTO {}", v),
    }
}

/// Aperture, stored as f-number x 100
pub fn format_f_number(raw: u64) -> String {
    let raw = raw as u16;
    if raw == 0 {
        return UNKNOWN_TEXT.into();
    }
    let whole = raw / 100;
    let frac = raw % 100;
    if frac == 0 {
        format!("F{}", whole)
    } else if frac % 10 == 0 {
        format!("F{}.{}", whole, frac / 10)
    } else {
        format!("F{}.{:02}", whole, frac)
    }
}

/// Shutter speed as numerator (high 16 bits) over denominator (low 16 bits)
pub fn format_shutter_speed(raw: u64) -> String {
    let raw = raw as u32;
    if raw == 0 {
        return UNKNOWN_TEXT.into();
    }
    let num = raw >> 16;
    let den = raw & 0xFFFF;
    match (num, den) {
        (0, d) | (1, d) => format!("1/{}", d),
        (n, 1) => format!("{}\"", n),
        (n, 10) => format!("{}.{}\"", n / 10, n % 10),
        (n, d) => format!("{}/{}", n, d),
    }
}

/// Enumerated value without a display table
pub fn format_labelled(label: &str, raw: u64) -> String {
    format!("{} {}", label, raw)
}
