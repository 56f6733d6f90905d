// SPDX-License-Identifier: MIT

//! Page-table entry accessors.
//!
//! Sv39/Sv48/Sv57 entries are 64 bits wide with 44 bits of PPN; Sv32
//! entries are 32 bits wide with 22 bits of PPN. Both share the low
//! permission-bit layout, so a single 64-bit accessor type covers all
//! modes and the PPN segmentation is resolved against the [`SvLength`].

#![allow(non_snake_case)]
#![allow(dead_code)]

use crate::bits::ConstantBits;
use crate::bits::FixedWidthBits;
use crate::csr;
use crate::machine_state::csregisters::satp::SvLength;

csr! {
    pub struct PageTableEntry {
        V: bool,
        R: bool,
        W: bool,
        X: bool,
        U: bool,
        G: bool,
        A: bool,
        D: bool,
        RSW: ConstantBits<2>,
        PPN: FixedWidthBits<44>,
        RESERVED: ConstantBits<7>,
        PBMT: ConstantBits<2>,
        N: ConstantBits<1>,
    }
}

impl PageTableEntry {
    /// Full physical page number for the given translation flavour.
    pub fn full_ppn(&self, sv_length: SvLength) -> u64 {
        use crate::bits::Bits64;
        match sv_length {
            // Sv32 entries are 32 bits; PPN occupies bits 31:10.
            SvLength::Sv32 => self.ppn().to_bits() & 0x3F_FFFF,
            _ => self.ppn().to_bits(),
        }
    }

    /// Bit range of PPN segment `idx` within the full PPN, as
    /// `(width, shift)`.
    pub(crate) const fn ppn_segment_range(sv_length: SvLength, idx: usize) -> Option<(usize, usize)> {
        match sv_length {
            SvLength::Sv32 => match idx {
                0 => Some((10, 0)),
                1 => Some((12, 10)),
                _ => None,
            },
            SvLength::Sv39 => match idx {
                0 | 1 => Some((9, idx * 9)),
                2 => Some((26, 18)),
                _ => None,
            },
            SvLength::Sv48 => match idx {
                0 | 1 | 2 => Some((9, idx * 9)),
                3 => Some((17, 27)),
                _ => None,
            },
            SvLength::Sv57 => match idx {
                0..=3 => Some((9, idx * 9)),
                4 => Some((8, 36)),
                _ => None,
            },
        }
    }

    /// PPN segment `idx`, or [`None`] when the index is out of range for
    /// the translation flavour.
    pub fn ppn_segment(&self, sv_length: SvLength, idx: usize) -> Option<u64> {
        let (width, shift) = Self::ppn_segment_range(sv_length, idx)?;
        Some((self.full_ppn(sv_length) >> shift) & crate::bits::ones(width as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::Bits64;

    #[test]
    fn permission_bits() {
        let pte = PageTableEntry::from_bits(0b1100_1111);
        assert!(pte.v());
        assert!(pte.r());
        assert!(pte.w());
        assert!(pte.x());
        assert!(!pte.u());
        assert!(!pte.g());
        assert!(pte.a());
        assert!(pte.d());
    }

    #[test]
    fn ppn_field_starts_at_bit_10() {
        let pte = PageTableEntry::from_bits(0x8000_1000u64 >> 2 << 10);
        assert_eq!(pte.full_ppn(SvLength::Sv39), 0x8000_1000 >> 2);
    }

    #[test]
    fn sv39_segments() {
        let ppn = (0x3FF_FFFFu64 << 18) | (0x1AA << 9) | 0x155;
        let pte = PageTableEntry::from_bits(ppn << 10);
        assert_eq!(pte.ppn_segment(SvLength::Sv39, 0), Some(0x155));
        assert_eq!(pte.ppn_segment(SvLength::Sv39, 1), Some(0x1AA));
        assert_eq!(pte.ppn_segment(SvLength::Sv39, 2), Some(0x3FF_FFFF));
        assert_eq!(pte.ppn_segment(SvLength::Sv39, 3), None);
    }

    #[test]
    fn sv32_segments() {
        let ppn = (0xABCu64 << 10) | 0x2AA;
        let pte = PageTableEntry::from_bits(ppn << 10);
        assert_eq!(pte.ppn_segment(SvLength::Sv32, 0), Some(0x2AA));
        assert_eq!(pte.ppn_segment(SvLength::Sv32, 1), Some(0xABC));
        assert_eq!(pte.ppn_segment(SvLength::Sv32, 2), None);
    }
}
