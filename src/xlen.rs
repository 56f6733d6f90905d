// SPDX-License-Identifier: MIT

//! Register width types (XLEN).
//!
//! The core is monomorphised per register width through the [`Xlen`]
//! marker trait. All architectural arithmetic goes through the associated
//! [`Xlen::XValue`] type; the handful of operations that cannot be
//! expressed as operator bounds (sign extension, widening multiply, the
//! M-extension division semantics) are trait methods.

use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::LowerHex;
use std::fmt::UpperHex;
use std::hash::Hash;
use std::ops::BitAnd;
use std::ops::BitOr;
use std::ops::BitXor;
use std::ops::Not;
use std::ops::Shl;
use std::ops::Shr;

/// Current or maximal operating width of a hart, as used for decode-table
/// keys and the MISA `MXL` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
pub enum XlenMode {
    X32,
    X64,
    X128,
}

impl XlenMode {
    /// Encoding of this width in the MISA/MSTATUS `MXL`/`SXL`/`UXL` fields.
    pub const fn mxl(self) -> u8 {
        match self {
            XlenMode::X32 => 1,
            XlenMode::X64 => 2,
            XlenMode::X128 => 3,
        }
    }

    /// Decode an `MXL`-style field. Invalid values fall back to the given mode
    /// (the fields are WARL).
    pub const fn from_mxl(bits: u8, fallback: XlenMode) -> Self {
        match bits {
            1 => XlenMode::X32,
            2 => XlenMode::X64,
            3 => XlenMode::X128,
            _ => fallback,
        }
    }
}

/// Marker type for 32-bit register width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rv32;

/// Marker type for 64-bit register width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rv64;

/// Marker type for 128-bit register width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rv128;

/// Trait for register-width-dependent operations.
///
/// Marker types with an associated value type are used instead of const
/// generics because the register type itself depends on the width.
pub trait Xlen: Copy + Clone + Debug + Default + PartialEq + Eq + Send + Sync + 'static {
    /// Unsigned integer type holding one register (`u32`/`u64`/`u128`).
    type XValue: Copy
        + Clone
        + Default
        + PartialEq
        + Eq
        + PartialOrd
        + Ord
        + Hash
        + Debug
        + Display
        + LowerHex
        + UpperHex
        + Send
        + Sync
        + 'static
        + BitAnd<Output = Self::XValue>
        + BitOr<Output = Self::XValue>
        + BitXor<Output = Self::XValue>
        + Not<Output = Self::XValue>
        + Shl<u32, Output = Self::XValue>
        + Shr<u32, Output = Self::XValue>;

    /// Register width in bits.
    const BITS: u32;

    /// Mask applied to dynamic shift amounts (`BITS - 1`).
    const SHIFT_MASK: u32 = Self::BITS - 1;

    /// Operating width as an [`XlenMode`].
    const MODE: XlenMode;

    /// All-zeros value.
    const ZERO: Self::XValue;

    /// All-ones value.
    const MAX: Self::XValue;

    /// Truncate / zero-extend a [prim@u64].
    fn from_u64(v: u64) -> Self::XValue;

    /// Truncate to the low 64 bits.
    fn to_u64(v: Self::XValue) -> u64;

    /// Sign-extend / truncate an [prim@i64].
    fn from_i64(v: i64) -> Self::XValue;

    /// Sign-extend the low 32 bits to full width.
    fn sext32(v: Self::XValue) -> Self::XValue;

    fn wrapping_add(a: Self::XValue, b: Self::XValue) -> Self::XValue;

    fn wrapping_sub(a: Self::XValue, b: Self::XValue) -> Self::XValue;

    fn wrapping_mul(a: Self::XValue, b: Self::XValue) -> Self::XValue;

    /// Arithmetic right shift. `shamt` must be below [`Self::BITS`].
    fn sra(v: Self::XValue, shamt: u32) -> Self::XValue;

    /// Two's-complement signed `a < b`.
    fn signed_lt(a: Self::XValue, b: Self::XValue) -> bool;

    /// Upper half of the signed × signed product.
    fn mulh(a: Self::XValue, b: Self::XValue) -> Self::XValue;

    /// Upper half of the signed × unsigned product.
    fn mulhsu(a: Self::XValue, b: Self::XValue) -> Self::XValue;

    /// Upper half of the unsigned × unsigned product.
    fn mulhu(a: Self::XValue, b: Self::XValue) -> Self::XValue;

    /// Signed division with the M-extension edge cases: division by zero
    /// yields all ones, overflow yields the dividend.
    fn div_signed(a: Self::XValue, b: Self::XValue) -> Self::XValue;

    /// Unsigned division; division by zero yields all ones.
    fn div_unsigned(a: Self::XValue, b: Self::XValue) -> Self::XValue;

    /// Signed remainder; division by zero yields the dividend, overflow zero.
    fn rem_signed(a: Self::XValue, b: Self::XValue) -> Self::XValue;

    /// Unsigned remainder; division by zero yields the dividend.
    fn rem_unsigned(a: Self::XValue, b: Self::XValue) -> Self::XValue;
}

/// Register / address representation of the width `X`.
pub type XValue<X> = <X as Xlen>::XValue;

macro_rules! xlen_narrow {
    ($marker:ty, $value:ty, $signed:ty, $wide_u:ty, $wide_i:ty, $bits:expr, $mode:expr) => {
        impl Xlen for $marker {
            type XValue = $value;

            const BITS: u32 = $bits;
            const MODE: XlenMode = $mode;
            const ZERO: $value = 0;
            const MAX: $value = <$value>::MAX;

            #[inline(always)]
            fn from_u64(v: u64) -> $value {
                v as $value
            }

            #[inline(always)]
            fn to_u64(v: $value) -> u64 {
                v as u64
            }

            #[inline(always)]
            fn from_i64(v: i64) -> $value {
                v as $signed as $value
            }

            #[inline(always)]
            fn sext32(v: $value) -> $value {
                v as u32 as i32 as $signed as $value
            }

            #[inline(always)]
            fn wrapping_add(a: $value, b: $value) -> $value {
                a.wrapping_add(b)
            }

            #[inline(always)]
            fn wrapping_sub(a: $value, b: $value) -> $value {
                a.wrapping_sub(b)
            }

            #[inline(always)]
            fn wrapping_mul(a: $value, b: $value) -> $value {
                a.wrapping_mul(b)
            }

            #[inline(always)]
            fn sra(v: $value, shamt: u32) -> $value {
                ((v as $signed) >> shamt) as $value
            }

            #[inline(always)]
            fn signed_lt(a: $value, b: $value) -> bool {
                (a as $signed) < (b as $signed)
            }

            #[inline(always)]
            fn mulh(a: $value, b: $value) -> $value {
                (((a as $signed as $wide_i) * (b as $signed as $wide_i)) >> $bits) as $value
            }

            #[inline(always)]
            fn mulhsu(a: $value, b: $value) -> $value {
                (((a as $signed as $wide_i) * (b as $wide_u as $wide_i)) >> $bits) as $value
            }

            #[inline(always)]
            fn mulhu(a: $value, b: $value) -> $value {
                (((a as $wide_u) * (b as $wide_u)) >> $bits) as $value
            }

            #[inline(always)]
            fn div_signed(a: $value, b: $value) -> $value {
                let (a, b) = (a as $signed, b as $signed);
                if b == 0 {
                    <$value>::MAX
                } else if a == <$signed>::MIN && b == -1 {
                    a as $value
                } else {
                    (a / b) as $value
                }
            }

            #[inline(always)]
            fn div_unsigned(a: $value, b: $value) -> $value {
                if b == 0 {
                    <$value>::MAX
                } else {
                    a / b
                }
            }

            #[inline(always)]
            fn rem_signed(a: $value, b: $value) -> $value {
                let (a, b) = (a as $signed, b as $signed);
                if b == 0 {
                    a as $value
                } else if a == <$signed>::MIN && b == -1 {
                    0
                } else {
                    (a % b) as $value
                }
            }

            #[inline(always)]
            fn rem_unsigned(a: $value, b: $value) -> $value {
                if b == 0 {
                    a
                } else {
                    a % b
                }
            }
        }
    };
}

xlen_narrow!(Rv32, u32, i32, u64, i64, 32, XlenMode::X32);
xlen_narrow!(Rv64, u64, i64, u128, i128, 64, XlenMode::X64);

impl Xlen for Rv128 {
    type XValue = u128;

    const BITS: u32 = 128;
    const MODE: XlenMode = XlenMode::X128;
    const ZERO: u128 = 0;
    const MAX: u128 = u128::MAX;

    #[inline(always)]
    fn from_u64(v: u64) -> u128 {
        v as u128
    }

    #[inline(always)]
    fn to_u64(v: u128) -> u64 {
        v as u64
    }

    #[inline(always)]
    fn from_i64(v: i64) -> u128 {
        v as i128 as u128
    }

    #[inline(always)]
    fn sext32(v: u128) -> u128 {
        v as u32 as i32 as i128 as u128
    }

    #[inline(always)]
    fn wrapping_add(a: u128, b: u128) -> u128 {
        a.wrapping_add(b)
    }

    #[inline(always)]
    fn wrapping_sub(a: u128, b: u128) -> u128 {
        a.wrapping_sub(b)
    }

    #[inline(always)]
    fn wrapping_mul(a: u128, b: u128) -> u128 {
        a.wrapping_mul(b)
    }

    #[inline(always)]
    fn sra(v: u128, shamt: u32) -> u128 {
        ((v as i128) >> shamt) as u128
    }

    #[inline(always)]
    fn signed_lt(a: u128, b: u128) -> bool {
        (a as i128) < (b as i128)
    }

    fn mulh(a: u128, b: u128) -> u128 {
        // mulh(a, b) = mulhu(a, b) - (a < 0 ? b : 0) - (b < 0 ? a : 0)
        let mut high = Self::mulhu(a, b);
        if (a as i128) < 0 {
            high = high.wrapping_sub(b);
        }
        if (b as i128) < 0 {
            high = high.wrapping_sub(a);
        }
        high
    }

    fn mulhsu(a: u128, b: u128) -> u128 {
        let mut high = Self::mulhu(a, b);
        if (a as i128) < 0 {
            high = high.wrapping_sub(b);
        }
        high
    }

    fn mulhu(a: u128, b: u128) -> u128 {
        // 64-bit limb schoolbook; each partial product is exact in 128 bits.
        const LO: u128 = u64::MAX as u128;
        let (a_lo, a_hi) = (a & LO, a >> 64);
        let (b_lo, b_hi) = (b & LO, b >> 64);

        let ll = a_lo * b_lo;
        let lh = a_lo * b_hi;
        let hl = a_hi * b_lo;
        let hh = a_hi * b_hi;

        let mid = (ll >> 64) + (lh & LO) + (hl & LO);
        hh + (lh >> 64) + (hl >> 64) + (mid >> 64)
    }

    fn div_signed(a: u128, b: u128) -> u128 {
        let (a, b) = (a as i128, b as i128);
        if b == 0 {
            u128::MAX
        } else if a == i128::MIN && b == -1 {
            a as u128
        } else {
            (a / b) as u128
        }
    }

    fn div_unsigned(a: u128, b: u128) -> u128 {
        if b == 0 {
            u128::MAX
        } else {
            a / b
        }
    }

    fn rem_signed(a: u128, b: u128) -> u128 {
        let (a, b) = (a as i128, b as i128);
        if b == 0 {
            a as u128
        } else if a == i128::MIN && b == -1 {
            0
        } else {
            (a % b) as u128
        }
    }

    fn rem_unsigned(a: u128, b: u128) -> u128 {
        if b == 0 {
            a
        } else {
            a % b
        }
    }
}
