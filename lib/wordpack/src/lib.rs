// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bit-exact packing of fields into sequences of 32-bit register words
//!
//! Many switch registers and table entries are wider than a single word, and
//! their fields are laid out without regard for word boundaries: a 12-bit VLAN
//! ID may start at bit 27, and a 48-bit MAC address may be smeared across
//! three consecutive words. This crate treats a `&[u32]` as one long bit
//! string, where word `n` holds bits `32 * n` through `32 * n + 31` and bit 0 of
//! each word is its least significant bit. A field is then just a
//! `(offset, width)` pair into that bit string.
//!
//! [`encode`] and [`decode`] do the raw bit shuffling. On top of that, the
//! [`layout!`] macro turns a table of field descriptors into a plain struct
//! implementing [`Layout`], which is how register definitions are written:
//!
//! ```
//! wordpack::layout! {
//!     pub struct Example[2] {
//!         pub low: u8 = bits(0, 5),
//!         pub straddle: u16 = bits(27, 12),
//!         pub flag: bool = bits(63, 1),
//!     }
//! }
//!
//! use wordpack::Layout;
//! let mut words = [0u32; 2];
//! let e = Example { low: 3, straddle: 0xabc, flag: true };
//! assert_eq!(e.pack(&mut words), 0);
//! assert_eq!(Example::unpack(&words), e);
//! ```

#![cfg_attr(not(test), no_std)]

/// Number of bits in one register word
pub const WORD_BITS: u32 = u32::BITS;

/// Returns a mask with the low `width` bits set.
pub const fn mask(width: u8) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1 << width) - 1
    }
}

/// Checks whether `value` can be represented in `width` bits.
pub const fn fits(value: u64, width: u8) -> bool {
    value & !mask(width) == 0
}

/// Writes the low `width` bits of `value` into `words`, starting at bit
/// `offset` of the concatenated word string.
///
/// Only the bits belonging to the field are modified; everything else in the
/// touched words is preserved. Bits of `value` above `width` are discarded, so
/// callers that care should check [`fits`] first.
///
/// # Panics
/// Panics if `width` is not in `1..=64`, or if `words` is too short to hold
/// the field.
pub fn encode(value: u64, width: u8, offset: u32, words: &mut [u32]) {
    assert!((1..=64).contains(&width), "bad field width {width}");
    let width = u32::from(width);
    let value = value & mask(width as u8);

    let mut done = 0;
    while done < width {
        let bit = offset + done;
        let index = (bit / WORD_BITS) as usize;
        let shift = bit % WORD_BITS;
        let chunk = (WORD_BITS - shift).min(width - done);

        let chunk_mask = (mask(chunk as u8) as u32) << shift;
        let fragment = ((value >> done) as u32) << shift;
        words[index] = (words[index] & !chunk_mask) | (fragment & chunk_mask);

        done += chunk;
    }
}

/// Reads a `width`-bit field starting at bit `offset` of the concatenated
/// word string.
///
/// # Panics
/// Panics if `width` is not in `1..=64`, or if `words` is too short to hold
/// the field.
pub fn decode(words: &[u32], width: u8, offset: u32) -> u64 {
    assert!((1..=64).contains(&width), "bad field width {width}");
    let width = u32::from(width);

    let mut value = 0;
    let mut done = 0;
    while done < width {
        let bit = offset + done;
        let index = (bit / WORD_BITS) as usize;
        let shift = bit % WORD_BITS;
        let chunk = (WORD_BITS - shift).min(width - done);

        let fragment = u64::from(words[index] >> shift) & mask(chunk as u8);
        value |= fragment << done;

        done += chunk;
    }
    value
}

/// Describes where a single field lives in a sequence of words.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Field {
    pub name: &'static str,
    /// Offset of the field's least significant bit in the word string
    pub offset: u32,
    pub width: u8,
}

impl Field {
    pub const fn new(name: &'static str, offset: u32, width: u8) -> Self {
        assert!(width >= 1 && width <= 64);
        Self {
            name,
            offset,
            width,
        }
    }

    /// Index of the word holding the field's least significant bit
    pub const fn word_offset(&self) -> usize {
        (self.offset / WORD_BITS) as usize
    }

    /// Position of the field's least significant bit within its first word
    pub const fn bit_offset(&self) -> u8 {
        (self.offset % WORD_BITS) as u8
    }

    /// Number of words touched by this field (1, 2, or 3)
    pub const fn words_spanned(&self) -> usize {
        let start = self.offset % WORD_BITS;
        ((start + self.width as u32).div_ceil(WORD_BITS)) as usize
    }

    /// Encodes `value` into `words`, returning `false` if it did not fit in
    /// the field (in which case the truncated value is still written).
    pub fn encode(&self, value: u64, words: &mut [u32]) -> bool {
        encode(value, self.width, self.offset, words);
        fits(value, self.width)
    }

    pub fn decode(&self, words: &[u32]) -> u64 {
        decode(words, self.width, self.offset)
    }
}

/// Conversion between a struct field's Rust type and its raw bits.
pub trait FieldValue: Copy {
    fn to_raw(self) -> u64;
    fn from_raw(raw: u64) -> Self;
}

impl FieldValue for bool {
    fn to_raw(self) -> u64 {
        u64::from(self)
    }
    fn from_raw(raw: u64) -> Self {
        raw != 0
    }
}

macro_rules! unsigned_field_value {
    ($($t:ty),*) => {
        $(
            impl FieldValue for $t {
                fn to_raw(self) -> u64 {
                    u64::from(self)
                }
                fn from_raw(raw: u64) -> Self {
                    raw as $t
                }
            }
        )*
    };
}
unsigned_field_value!(u8, u16, u32, u64);

/// A structure that is stored as a fixed number of words.
///
/// This is normally implemented with [`layout!`] rather than by hand.
pub trait Layout: Sized {
    /// Size of the packed representation, in words
    const WORDS: usize;

    /// Field descriptors, in declaration order
    const FIELDS: &'static [Field];

    /// Packs every field into `words`, returning the number of fields whose
    /// values were too wide for their declared width.
    ///
    /// Out-of-range fields are truncated rather than skipped, and packing
    /// continues through all fields so that the caller learns how many were
    /// bad in one pass.
    fn pack(&self, words: &mut [u32]) -> usize;

    fn unpack(words: &[u32]) -> Self;
}

/// Declares a struct backed by a fixed number of words, along with its
/// [`Layout`] implementation.
///
/// Each field is written as `name: type = bits(offset, width)`, where `offset`
/// is the bit position of the field's least significant bit counted from bit 0
/// of the first word. Field placement is checked at compile time against the
/// declared word count.
#[macro_export]
macro_rules! layout {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident[$words:literal] {
            $(
                $(#[$fattr:meta])*
                $fvis:vis $field:ident: $ty:ty = bits($offset:literal, $width:literal),
            )*
        }
    ) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
        $vis struct $name {
            $(
                $(#[$fattr])*
                $fvis $field: $ty,
            )*
        }

        const _: () = {
            $(
                assert!($width >= 1 && $width <= 64);
                assert!($offset + $width <= $words * $crate::WORD_BITS);
            )*
        };

        impl $crate::Layout for $name {
            const WORDS: usize = $words;
            const FIELDS: &'static [$crate::Field] = &[
                $( $crate::Field::new(stringify!($field), $offset, $width), )*
            ];

            fn pack(&self, words: &mut [u32]) -> usize {
                let mut violations = 0;
                $(
                    let raw = $crate::FieldValue::to_raw(self.$field);
                    if !$crate::Field::new(stringify!($field), $offset, $width)
                        .encode(raw, words)
                    {
                        violations += 1;
                    }
                )*
                violations
            }

            fn unpack(words: &[u32]) -> Self {
                Self {
                    $(
                        $field: <$ty as $crate::FieldValue>::from_raw(
                            $crate::decode(words, $width, $offset),
                        ),
                    )*
                }
            }
        }
    };
}
