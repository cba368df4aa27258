//! Bit-field descriptors.
//!
//! A [`Field`] names a contiguous run of bits inside a 64-bit word. All
//! layout tables in this crate are built from these descriptors so that no
//! other crate needs a bare shift or mask constant.

/// Width of one link word in bits. The protocol is fixed at 64.
pub const WORD_BITS: u32 = 64;

/// A named, contiguous bit range `[pos, pos + width)` of a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
    /// Short hardware name of the field.
    pub name: &'static str,
    /// Offset of the least significant bit.
    pub pos: u32,
    /// Number of bits.
    pub width: u32,
}

impl Field {
    /// Describe a field.
    #[must_use]
    pub const fn new(name: &'static str, pos: u32, width: u32) -> Self {
        Self { name, pos, width }
    }

    /// Single-bit field.
    #[must_use]
    pub const fn bit(name: &'static str, pos: u32) -> Self {
        Self::new(name, pos, 1)
    }

    /// Right-aligned mask of `width` ones.
    #[must_use]
    pub const fn mask(&self) -> u64 {
        mask(self.width)
    }

    /// Mask of the field in place.
    #[must_use]
    pub const fn shifted_mask(&self) -> u64 {
        self.mask() << self.pos
    }

    /// Most significant bit covered by the field.
    #[must_use]
    pub const fn msb(&self) -> u32 {
        self.pos + self.width - 1
    }

    /// First bit above the field.
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.pos + self.width
    }

    /// True when the field lies inside a 64-bit word.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.width > 0 && self.pos + self.width <= WORD_BITS
    }

    /// True when `value` is representable without truncation.
    #[must_use]
    pub const fn fits(&self, value: u64) -> bool {
        value & !self.mask() == 0
    }

    /// The same field moved up by `base` bits.
    ///
    /// Used to turn a `ci`-relative layout into absolute packet positions.
    #[must_use]
    pub const fn offset(&self, base: u32) -> Self {
        Self::new(self.name, self.pos + base, self.width)
    }

    /// Read the field. Descriptors are static, so this cannot fail.
    #[must_use]
    pub const fn get(&self, word: u64) -> u64 {
        (word >> self.pos) & self.mask()
    }

    /// Replace the field, silently truncating `value` to the field width.
    #[must_use]
    pub const fn set(&self, word: u64, value: u64) -> u64 {
        (word & !self.shifted_mask()) | ((value & self.mask()) << self.pos)
    }

    /// True when the two fields share at least one bit.
    #[must_use]
    pub const fn overlaps(&self, other: &Field) -> bool {
        self.shifted_mask() & other.shifted_mask() != 0
    }
}

/// Right-aligned mask of `width` ones (`width` is clamped to 64).
#[must_use]
pub const fn mask(width: u32) -> u64 {
    if width >= WORD_BITS {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_edges() {
        assert_eq!(mask(0), 0);
        assert_eq!(mask(1), 1);
        assert_eq!(mask(53), (1u64 << 53) - 1);
        assert_eq!(mask(64), u64::MAX);
    }

    #[test]
    fn get_set_truncates() {
        let f = Field::new("f", 4, 4);
        let w = f.set(0xFFFF_FFFF, 0x1A);
        assert_eq!(f.get(w), 0xA);
        assert_eq!(w & !f.shifted_mask(), 0xFFFF_FF0F);
    }

    #[test]
    fn offset_relocates() {
        let f = Field::new("x", 0, 6).offset(11);
        assert_eq!((f.pos, f.msb(), f.end()), (11, 16, 17));
    }

    #[test]
    fn full_width_field_is_valid() {
        assert!(Field::new("all", 0, 64).is_valid());
        assert!(!Field::new("over", 60, 5).is_valid());
        assert!(!Field::new("empty", 3, 0).is_valid());
    }
}
