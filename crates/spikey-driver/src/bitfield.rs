//! Bit-range codec for 64-bit link words.
//!
//! `insert` masks oversized values to the field width. The chip does the
//! same with oversized register writes, so truncation is preserved rather
//! than rejected; it is logged at `warn` level. Use [`insert_checked`] when
//! a caller wants overflow as an error.

use crate::error::{Result, SpikeyError};
use spikey_chip::fields::{mask, Field, WORD_BITS};
use tracing::warn;

fn check_range(pos: u32, width: u32) -> Result<()> {
    if width == 0 || pos.checked_add(width).map_or(true, |end| end > WORD_BITS) {
        return Err(SpikeyError::OutOfRange { pos, width });
    }
    Ok(())
}

/// Extract the `width`-bit field at `pos`.
///
/// # Errors
///
/// `OutOfRange` if `pos + width > 64` or `width == 0`.
pub fn extract(word: u64, pos: u32, width: u32) -> Result<u64> {
    check_range(pos, width)?;
    Ok((word >> pos) & mask(width))
}

/// Replace the `width`-bit field at `pos`, truncating `value` to `width` bits.
///
/// # Errors
///
/// `OutOfRange` if `pos + width > 64` or `width == 0`.
pub fn insert(word: u64, pos: u32, width: u32, value: u64) -> Result<u64> {
    check_range(pos, width)?;
    let m = mask(width);
    if value & !m != 0 {
        warn!(
            "{}",
            SpikeyError::field_overflow(format!("[{pos}+:{width}]"), value, width)
        );
    }
    Ok((word & !(m << pos)) | ((value & m) << pos))
}

/// Like [`insert`] but rejects values that do not fit.
///
/// # Errors
///
/// `OutOfRange` for a bad bit range, `FieldOverflow` for an oversized value.
pub fn insert_checked(word: u64, pos: u32, width: u32, value: u64) -> Result<u64> {
    check_range(pos, width)?;
    if value & !mask(width) != 0 {
        return Err(SpikeyError::field_overflow(
            format!("[{pos}+:{width}]"),
            value,
            width,
        ));
    }
    insert(word, pos, width, value)
}

/// Read a described field.
pub fn get(word: u64, field: &Field) -> u64 {
    field.get(word)
}

/// Write a described field, truncating and logging oversized values.
pub fn put(word: u64, field: &Field, value: u64) -> u64 {
    if !field.fits(value) {
        warn!(
            "{}",
            SpikeyError::field_overflow(field.name, value, field.width)
        );
    }
    field.set(word, value)
}

/// Write a boolean into a single-bit field.
pub fn put_flag(word: u64, field: &Field, flag: bool) -> u64 {
    field.set(word, u64::from(flag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_extract_returns_value_mod_width() {
        let words = [0, u64::MAX, 0xDEAD_BEEF_0123_4567];
        let values = [0, 1, 0x5A5A, u64::MAX, 1 << 63];
        for pos in 0..64 {
            for width in 1..=(64 - pos) {
                for &w in &words {
                    for &v in &values {
                        let out = insert(w, pos, width, v).unwrap();
                        assert_eq!(extract(out, pos, width).unwrap(), v & mask(width));
                        // bits outside the field are untouched
                        let outside = !(mask(width) << pos);
                        assert_eq!(out & outside, w & outside);
                    }
                }
            }
        }
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert!(matches!(
            extract(0, 60, 5),
            Err(SpikeyError::OutOfRange { pos: 60, width: 5 })
        ));
        assert!(matches!(
            insert(0, 64, 1, 1),
            Err(SpikeyError::OutOfRange { .. })
        ));
        assert!(matches!(
            extract(0, 0, 0),
            Err(SpikeyError::OutOfRange { .. })
        ));
        assert!(matches!(
            insert(0, u32::MAX, 2, 0),
            Err(SpikeyError::OutOfRange { .. })
        ));
    }

    #[test]
    fn full_word_field() {
        assert_eq!(extract(0x1234, 0, 64).unwrap(), 0x1234);
        assert_eq!(insert(7, 0, 64, u64::MAX).unwrap(), u64::MAX);
    }

    #[test]
    fn overflow_truncates_silently() {
        assert_eq!(insert(0, 4, 4, 0x1F).unwrap(), 0xF0);
    }

    #[test]
    fn checked_insert_rejects_overflow() {
        let err = insert_checked(0, 4, 4, 0x10).unwrap_err();
        assert!(matches!(err, SpikeyError::FieldOverflow { value: 0x10, width: 4, .. }));
        assert_eq!(insert_checked(0, 4, 4, 0xF).unwrap(), 0xF0);
    }

    #[test]
    fn descriptor_put_get() {
        let f = Field::new("cmd", 7, 4);
        let w = put(0, &f, 6);
        assert_eq!(w, 6 << 7);
        assert_eq!(get(w, &f), 6);
        assert_eq!(put_flag(w, &Field::bit("rwb", 6), true), w | 1 << 6);
    }
}
