// SPDX-License-Identifier: MIT

//! The `satp` register: paging mode and root page-table PPN.
//!
//! The field layout depends on the register width — `MODE` is a single
//! bit at position 31 on a 32-bit hart and a 4-bit field at 63:60 on a
//! 64-bit hart. A 128-bit hart has no defined paging modes; its `satp`
//! is WARL and always reads back Bare.

use crate::bits::u64;
use crate::xlen::XValue;
use crate::xlen::Xlen;

const MODE_BARE: u64 = 0;
const MODE_SV39: u64 = 8;
const MODE_SV48: u64 = 9;
const MODE_SV57: u64 = 10;

/// `MODE` field of the `satp` register.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash, strum::Display)]
pub enum TranslationAlgorithm {
    Bare,
    Sv32,
    Sv39,
    Sv48,
    Sv57,
}

/// Which flavour of address virtualisation is in force; `SvXY` virtual
/// addresses are `XY` bits wide.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SvLength {
    Sv32,
    Sv39,
    Sv48,
    Sv57,
}

pub struct SvConstants {
    /// Number of page-table levels.
    pub levels: usize,
    /// Size of one page-table entry in bytes.
    pub pte_size: u64,
    /// Width of one virtual-page-number segment in bits.
    pub vpn_width: usize,
}

impl SvLength {
    /// LEVELS, PTESIZE and VPN-segment constants for each SvZZ variant.
    pub const fn algorithm_constants(&self) -> SvConstants {
        match self {
            SvLength::Sv32 => SvConstants {
                levels: 2,
                pte_size: 4,
                vpn_width: 10,
            },
            SvLength::Sv39 => SvConstants {
                levels: 3,
                pte_size: 8,
                vpn_width: 9,
            },
            SvLength::Sv48 => SvConstants {
                levels: 4,
                pte_size: 8,
                vpn_width: 9,
            },
            SvLength::Sv57 => SvConstants {
                levels: 5,
                pte_size: 8,
                vpn_width: 9,
            },
        }
    }
}

/// Decoded view of `satp`.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct Satp {
    pub mode: TranslationAlgorithm,
    pub asid: u64,
    pub ppn: u64,
}

impl Satp {
    /// Decode a raw `satp` value for the width `X`.
    pub fn from_raw<X: Xlen>(raw: XValue<X>) -> Self {
        match X::BITS {
            32 => {
                let raw = X::to_u64(raw) & u32::MAX as u64;
                let mode = if u64::bit(raw, 31) {
                    TranslationAlgorithm::Sv32
                } else {
                    TranslationAlgorithm::Bare
                };
                Satp {
                    mode,
                    asid: u64::bits_subset(raw, 30, 22),
                    ppn: u64::bits_subset(raw, 21, 0),
                }
            }
            64 => {
                let raw = X::to_u64(raw);
                let mode = match u64::bits_subset(raw, 63, 60) {
                    MODE_BARE => TranslationAlgorithm::Bare,
                    MODE_SV39 => TranslationAlgorithm::Sv39,
                    MODE_SV48 => TranslationAlgorithm::Sv48,
                    MODE_SV57 => TranslationAlgorithm::Sv57,
                    // satp.MODE is WARL; unsupported values read as Bare.
                    _ => TranslationAlgorithm::Bare,
                };
                Satp {
                    mode,
                    asid: u64::bits_subset(raw, 59, 44),
                    ppn: u64::bits_subset(raw, 43, 0),
                }
            }
            // No paging modes are defined at 128 bits.
            _ => Satp {
                mode: TranslationAlgorithm::Bare,
                asid: 0,
                ppn: 0,
            },
        }
    }

    /// Normalise a raw value before storing it: unsupported modes collapse
    /// to Bare, and a Bare `satp` clears the PPN and ASID fields.
    pub fn normalise_write<X: Xlen>(raw: XValue<X>) -> XValue<X> {
        let decoded = Self::from_raw::<X>(raw);
        match decoded.mode {
            TranslationAlgorithm::Bare => X::ZERO,
            _ => raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xlen::Rv128;
    use crate::xlen::Rv32;
    use crate::xlen::Rv64;

    #[test]
    fn sv39_fields() {
        let raw = (8u64 << 60) | (0xD07 << 44) | 0xABC_DEAD_0BAD;
        let satp = Satp::from_raw::<Rv64>(raw);
        assert_eq!(satp.mode, TranslationAlgorithm::Sv39);
        assert_eq!(satp.asid, 0xD07);
        assert_eq!(satp.ppn, 0xABC_DEAD_0BAD);
    }

    #[test]
    fn unsupported_mode_reads_bare() {
        for mode in [1u64, 2, 3, 7, 11, 15] {
            let satp = Satp::from_raw::<Rv64>(mode << 60);
            assert_eq!(satp.mode, TranslationAlgorithm::Bare);
        }
    }

    #[test]
    fn sv32_fields() {
        let raw: u32 = (1 << 31) | (0x1FF << 22) | 0x3_FFFF;
        let satp = Satp::from_raw::<Rv32>(raw);
        assert_eq!(satp.mode, TranslationAlgorithm::Sv32);
        assert_eq!(satp.asid, 0x1FF);
        assert_eq!(satp.ppn, 0x3_FFFF);
    }

    #[test]
    fn rv128_is_always_bare() {
        let satp = Satp::from_raw::<Rv128>(u128::MAX);
        assert_eq!(satp.mode, TranslationAlgorithm::Bare);
        assert_eq!(Satp::normalise_write::<Rv128>(u128::MAX), 0);
    }

    #[test]
    fn bare_write_clears_remaining_fields() {
        // Bare mode with a non-zero PPN: the whole value resets.
        let raw = 0xABCDu64;
        assert_eq!(Satp::normalise_write::<Rv64>(raw), 0);

        // A valid Sv48 configuration is kept as-is.
        let raw = (9u64 << 60) | 42;
        assert_eq!(Satp::normalise_write::<Rv64>(raw), raw);
    }
}
