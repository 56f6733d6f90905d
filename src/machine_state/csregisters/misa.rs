// SPDX-License-Identifier: MIT

//! The `misa` register: machine XLEN and the enabled-extensions bitset.

use std::fmt;

use crate::xlen::XValue;
use crate::xlen::Xlen;

/// Bitset of single-letter ISA extensions, one bit per letter as laid out
/// in the low 26 bits of `misa`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Extensions(u32);

impl Extensions {
    pub const A: Extensions = Extensions::letter('a');
    pub const C: Extensions = Extensions::letter('c');
    pub const D: Extensions = Extensions::letter('d');
    pub const F: Extensions = Extensions::letter('f');
    pub const I: Extensions = Extensions::letter('i');
    pub const M: Extensions = Extensions::letter('m');
    pub const S: Extensions = Extensions::letter('s');
    pub const U: Extensions = Extensions::letter('u');

    /// The empty set.
    pub const NONE: Extensions = Extensions(0);

    /// Mask of all letters this implementation knows about.
    pub const KNOWN: Extensions = Extensions(
        Self::A.0 | Self::C.0 | Self::D.0 | Self::F.0 | Self::I.0 | Self::M.0 | Self::S.0 | Self::U.0,
    );

    /// Extensions that software may toggle through `misa` writes. Disabling
    /// I, S or U would change the meaning of the running privilege modes,
    /// so those bits are read-only here.
    pub const TOGGLABLE: Extensions = Extensions(Self::A.0 | Self::C.0 | Self::M.0);

    const fn letter(c: char) -> Extensions {
        Extensions(1 << (c as u32 - 'a' as u32))
    }

    /// Parse a string of extension letters, e.g. `"imacsu"`.
    pub fn from_letters(letters: &str) -> Extensions {
        let mut bits = 0;
        for c in letters.chars() {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() {
                bits |= Extensions::letter(c).0;
            }
        }
        Extensions(bits)
    }

    pub const fn from_bits(bits: u32) -> Extensions {
        Extensions(bits & Self::KNOWN.0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Extensions) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Extensions) -> Extensions {
        Extensions(self.0 | other.0)
    }

    pub const fn intersection(self, other: Extensions) -> Extensions {
        Extensions(self.0 & other.0)
    }

    pub const fn without(self, other: Extensions) -> Extensions {
        Extensions(self.0 & !other.0)
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Extensions(")?;
        for i in 0..26 {
            if self.0 & (1 << i) != 0 {
                write!(f, "{}", (b'a' + i) as char)?;
            }
        }
        write!(f, ")")
    }
}

/// Compute the architectural `misa` value for width `X` and the given
/// extension set.
pub fn misa_value<X: Xlen>(extensions: Extensions) -> XValue<X> {
    let mxl = X::MODE.mxl() as u64;
    X::from_u64(extensions.bits() as u64) | (X::from_u64(mxl) << (X::BITS - 2))
}

/// Normalise a `misa` write: only the togglable letters within the
/// maximal set may change, and `MXL` is read-only.
pub fn normalise_write(maximal: Extensions, current: Extensions, requested: u32) -> Extensions {
    let requested = Extensions::from_bits(requested);
    let touched = Extensions::TOGGLABLE.intersection(maximal);
    current
        .without(touched)
        .union(requested.intersection(touched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xlen::Rv32;
    use crate::xlen::Rv64;

    #[test]
    fn letters_parse() {
        let exts = Extensions::from_letters("imacsu");
        assert!(exts.contains(Extensions::I));
        assert!(exts.contains(Extensions::M));
        assert!(exts.contains(Extensions::A));
        assert!(exts.contains(Extensions::C));
        assert!(exts.contains(Extensions::S));
        assert!(exts.contains(Extensions::U));
        assert!(!exts.contains(Extensions::F));
    }

    #[test]
    fn misa_encodes_mxl() {
        let exts = Extensions::from_letters("imacsu");
        let misa: u64 = misa_value::<Rv64>(exts);
        assert_eq!(misa >> 62, 2);
        assert_eq!(misa as u32 & Extensions::KNOWN.bits(), exts.bits());

        let misa: u32 = misa_value::<Rv32>(exts);
        assert_eq!(misa >> 30, 1);
    }

    #[test]
    fn writes_only_toggle_acm() {
        let maximal = Extensions::from_letters("imacsu");
        let current = maximal;

        // Dropping C is allowed
        let next = normalise_write(maximal, current, current.bits() & !Extensions::C.bits());
        assert!(!next.contains(Extensions::C));
        assert!(next.contains(Extensions::I));

        // Dropping I or U is ignored
        let next = normalise_write(maximal, current, 0);
        assert!(next.contains(Extensions::I));
        assert!(next.contains(Extensions::U));
        assert!(!next.contains(Extensions::C));

        // Enabling a letter outside the maximal set is ignored
        let narrow = Extensions::from_letters("iu");
        let next = normalise_write(narrow, narrow, Extensions::M.bits() | narrow.bits());
        assert_eq!(next, narrow);
    }
}
