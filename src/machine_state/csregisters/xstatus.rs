// SPDX-License-Identifier: MIT

//! Helpers for the `mstatus` and `sstatus` registers.
//!
//! The `sstatus` register is a subset of the `mstatus` register, described
//! as "shadow" CSRs in the RISC-V spec. The shadow value is kept in the
//! RV64 field layout internally; on a 32-bit hart the fields above bit 31
//! (UXL/SXL) simply never surface through CSR reads.

// Allow unused setters & getters
#![allow(dead_code)]
// Allow non snake case for setters & getters & constants
#![allow(non_snake_case)]

use crate::bits::Bits64;
use crate::bits::ConstantBits;
use crate::csr;
use crate::machine_state::mode::Mode;
use crate::xlen::XlenMode;

#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[repr(u8)]
pub enum MPPValue {
    #[default]
    User = 0b00,
    Supervisor = 0b01,
    Machine = 0b11,
}

impl From<MPPValue> for Mode {
    fn from(other: MPPValue) -> Mode {
        match other {
            MPPValue::User => Mode::User,
            MPPValue::Supervisor => Mode::Supervisor,
            MPPValue::Machine => Mode::Machine,
        }
    }
}

impl From<Mode> for MPPValue {
    fn from(other: Mode) -> MPPValue {
        match other {
            Mode::User => MPPValue::User,
            Mode::Supervisor => MPPValue::Supervisor,
            Mode::Machine => MPPValue::Machine,
        }
    }
}

impl Bits64 for MPPValue {
    const WIDTH: usize = 2;

    fn from_bits(value: u64) -> Self {
        match value & 0b11 {
            0b00 => MPPValue::User,
            0b01 => MPPValue::Supervisor,
            0b11 => MPPValue::Machine,
            // WARL field, invalid value is considered User
            _ => MPPValue::User,
        }
    }

    fn to_bits(&self) -> u64 {
        *self as u64
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[repr(u8)]
pub enum SPPValue {
    #[default]
    User = 0b0,
    Supervisor = 0b1,
}

impl From<SPPValue> for Mode {
    fn from(other: SPPValue) -> Mode {
        match other {
            SPPValue::User => Mode::User,
            SPPValue::Supervisor => Mode::Supervisor,
        }
    }
}

impl Bits64 for SPPValue {
    const WIDTH: usize = 1;

    fn from_bits(value: u64) -> Self {
        match value & 1 {
            0b0 => SPPValue::User,
            _ => SPPValue::Supervisor,
        }
    }

    fn to_bits(&self) -> u64 {
        *self as u64
    }
}

/// `MXL`-style two-bit width field as it appears in `UXL`/`SXL`.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[repr(u8)]
pub enum XLenValue {
    MXL32 = 0b01,
    #[default]
    MXL64 = 0b10,
    MXL128 = 0b11,
}

impl XLenValue {
    pub const fn mode(self) -> XlenMode {
        match self {
            XLenValue::MXL32 => XlenMode::X32,
            XLenValue::MXL64 => XlenMode::X64,
            XLenValue::MXL128 => XlenMode::X128,
        }
    }
}

impl From<XlenMode> for XLenValue {
    fn from(mode: XlenMode) -> Self {
        match mode {
            XlenMode::X32 => XLenValue::MXL32,
            XlenMode::X64 => XLenValue::MXL64,
            XlenMode::X128 => XLenValue::MXL128,
        }
    }
}

impl Bits64 for XLenValue {
    const WIDTH: usize = 2;

    fn from_bits(value: u64) -> Self {
        match value & 0b11 {
            0b01 => XLenValue::MXL32,
            0b10 => XLenValue::MXL64,
            0b11 => XLenValue::MXL128,
            // WARL field; 0 is reserved, fall back to 64-bit
            _ => XLenValue::MXL64,
        }
    }

    fn to_bits(&self) -> u64 {
        *self as u64
    }
}

csr! {
    pub struct MStatus {
        WPRI1: ConstantBits<1>,
        SIE: bool,
        WPRI2: ConstantBits<1>,
        MIE: bool,
        WPRI3: ConstantBits<1>,
        SPIE: bool,
        UBE: ConstantBits<1>,
        MPIE: bool,
        SPP: SPPValue,
        VS: ConstantBits<2>,
        MPP: MPPValue,
        FS: ConstantBits<2>,
        XS: ConstantBits<2>,
        MPRV: bool,
        SUM: bool,
        MXR: bool,
        TVM: bool,
        TW: bool,
        TSR: bool,
        WPRI4: ConstantBits<9>,
        UXL: XLenValue,
        SXL: XLenValue,
        SBE: ConstantBits<1>,
        MBE: ConstantBits<1>,
        WPRI5: ConstantBits<25>,
        SD: ConstantBits<1>,
    }
}

impl MStatus {
    /// The mask of `mstatus` bits that participate in address translation:
    /// a change to any of them must invalidate the translation cache.
    pub const TRANSLATION_BITS: u64 = (1 << Self::MPRV_OFFSET)
        | (0b11 << Self::MPP_OFFSET)
        | (1 << Self::MXR_OFFSET)
        | (1 << Self::SUM_OFFSET);

    pub fn to_sstatus(self) -> SStatus {
        SStatus::from_bits(self.to_bits())
    }
}

impl Default for MStatus {
    fn default() -> Self {
        MStatus::from_bits(0u64)
            // Interrupts are off, and were off before
            .with_sie(false)
            .with_mie(false)
            .with_spie(false)
            .with_mpie(false)
            // Previous privilege mode was User
            .with_spp(SPPValue::default())
            .with_mpp(MPPValue::default())
            // Loads and stores use the current effective privilege
            .with_mprv(false)
            // Supervisor mode has no access to user page mappings
            .with_sum(false)
            // Instruction loads from execute-only pages fail
            .with_mxr(false)
            // Allow virtual-memory management configuration
            .with_tvm(false)
            // WFI and SRET work normally
            .with_tw(false)
            .with_tsr(false)
    }
}

csr! {
    pub struct SStatus {
        WPRI1: ConstantBits<1>,
        SIE: bool,
        WPRI2: ConstantBits<3>,
        SPIE: bool,
        UBE: ConstantBits<1>,
        WPRI3: ConstantBits<1>,
        SPP: SPPValue,
        VS: ConstantBits<2>,
        WPRI4: ConstantBits<2>,
        FS: ConstantBits<2>,
        XS: ConstantBits<2>,
        WPRI5: ConstantBits<1>,
        SUM: bool,
        MXR: bool,
        WPRI6: ConstantBits<12>,
        UXL: XLenValue,
        WPRI7: ConstantBits<29>,
        SD: ConstantBits<1>,
    }
}

impl SStatus {
    /// Fold the writable `sstatus` fields back into a full `mstatus` value.
    pub fn to_mstatus(self, mstatus: MStatus) -> MStatus {
        mstatus
            .with_sie(self.sie())
            .with_spie(self.spie())
            .with_spp(self.spp())
            .with_sum(self.sum())
            .with_mxr(self.mxr())
    }
}

impl Default for SStatus {
    fn default() -> Self {
        MStatus::default().to_sstatus()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_positions_match_the_privileged_spec() {
        assert_eq!(MStatus::SIE_OFFSET, 1);
        assert_eq!(MStatus::MIE_OFFSET, 3);
        assert_eq!(MStatus::SPIE_OFFSET, 5);
        assert_eq!(MStatus::MPIE_OFFSET, 7);
        assert_eq!(MStatus::SPP_OFFSET, 8);
        assert_eq!(MStatus::MPP_OFFSET, 11);
        assert_eq!(MStatus::MPRV_OFFSET, 17);
        assert_eq!(MStatus::SUM_OFFSET, 18);
        assert_eq!(MStatus::MXR_OFFSET, 19);
        assert_eq!(MStatus::TVM_OFFSET, 20);
        assert_eq!(MStatus::UXL_OFFSET, 32);
        assert_eq!(MStatus::SXL_OFFSET, 34);
    }

    #[test]
    fn mpp_is_warl() {
        let mstatus = MStatus::from_bits(0b10 << MStatus::MPP_OFFSET);
        assert_eq!(mstatus.mpp(), MPPValue::User);

        let mstatus = MStatus::from_bits(0b11 << MStatus::MPP_OFFSET);
        assert_eq!(mstatus.mpp(), MPPValue::Machine);
    }

    #[test]
    fn sstatus_round_trip() {
        let mstatus = MStatus::default()
            .with_sie(true)
            .with_mie(true)
            .with_sum(true)
            .with_mprv(true);

        let sstatus = mstatus.to_sstatus();
        assert!(sstatus.sie());
        assert!(sstatus.sum());

        // Folding back keeps the machine-only fields of the original
        let merged = sstatus.with_sum(false).to_mstatus(mstatus);
        assert!(merged.mie());
        assert!(merged.mprv());
        assert!(!merged.sum());
    }

    #[test]
    fn translation_bits_cover_mprv_mpp_mxr_sum() {
        let mask = MStatus::TRANSLATION_BITS;
        assert_ne!(mask & (1 << MStatus::MPRV_OFFSET), 0);
        assert_ne!(mask & (0b11 << MStatus::MPP_OFFSET), 0);
        assert_ne!(mask & (1 << MStatus::MXR_OFFSET), 0);
        assert_ne!(mask & (1 << MStatus::SUM_OFFSET), 0);
        assert_eq!(mask & (1 << MStatus::SIE_OFFSET), 0);
    }
}
