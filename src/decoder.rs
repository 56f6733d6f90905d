// SPDX-License-Identifier: MIT

//! The precomputed decoder.
//!
//! For a fixed (extensions, machine XLEN, current XLEN) triple, opcode
//! identification is a pure function of a 20-bit projection of the
//! 32-bit encoding — bits `[31:20]|[14:12]|[6:2]` — or of the whole
//! 16-bit halfword for compressed encodings. [`DecodeTables`] tabulates
//! that function densely: one `2^20`-entry table and one `2^16`-entry
//! table, about a megabyte per triple.
//!
//! Tables are built lazily on the first [`PrecomputedDecoder::configure`]
//! for a triple and retained for the decoder's lifetime, so oscillating
//! between privilege levels with different operating widths stays cheap.
//! They are shared behind [`Arc`] so the prefetch worker can decode with
//! the same tables the executor uses.

use std::collections::HashMap;
use std::sync::Arc;

use crate::log;
use crate::machine_state::csregisters::misa::Extensions;
use crate::parser::get_operands;
use crate::parser::identify_compressed;
use crate::parser::identify_uncompressed;
use crate::parser::instruction::Instr;
use crate::parser::instruction::OpCode;
use crate::parser::is_compressed;
use crate::parser::DecodeContext;
use crate::xlen::XlenMode;

const UNCOMPRESSED_TABLE_SIZE: usize = 1 << 20;
const COMPRESSED_TABLE_SIZE: usize = 1 << 16;

/// Project a 32-bit encoding onto the bits that determine its opcode:
/// `[31:20] | [14:12] | [6:2]`.
#[inline(always)]
pub const fn pack(encoded: u32) -> u32 {
    ((encoded >> 20) & 0xFFF) << 8 | ((encoded >> 12) & 0b111) << 5 | ((encoded >> 2) & 0x1F)
}

/// Expand a packed projection back into a representative 32-bit encoding
/// (the non-opcode fields read as zero, and the low two bits as `0b11`).
#[inline(always)]
pub const fn unpack(packed: u32) -> u32 {
    0b11 | ((packed & 0x1F) << 2) | ((packed & 0xE0) << 7) | ((packed & 0xF_FF00) << 12)
}

/// Key identifying one set of decode tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodeKey {
    pub extensions: Extensions,
    pub mxlen: XlenMode,
    pub xlen: XlenMode,
}

/// Dense opcode-identification tables for one [`DecodeKey`].
pub struct DecodeTables {
    uncompressed: Box<[OpCode]>,
    compressed: Box<[OpCode]>,
}

impl DecodeTables {
    fn build(key: DecodeKey) -> Self {
        let ctx = DecodeContext::new(key.extensions, key.xlen);

        let mut uncompressed = vec![OpCode::Unknown; UNCOMPRESSED_TABLE_SIZE].into_boxed_slice();
        for (packed, slot) in uncompressed.iter_mut().enumerate() {
            *slot = identify_uncompressed(unpack(packed as u32), &ctx);
        }

        // Entries whose low two bits are 0b11 stay Unknown; they are
        // never consulted because such halfwords are not compressed.
        let mut compressed =
            vec![OpCode::UnknownCompressed; COMPRESSED_TABLE_SIZE].into_boxed_slice();
        for (encoded, slot) in compressed.iter_mut().enumerate() {
            let encoded = encoded as u16;
            if is_compressed(encoded) {
                *slot = identify_compressed(encoded, &ctx);
            }
        }

        DecodeTables {
            uncompressed,
            compressed,
        }
    }

    /// Decode one encoding. Compressed encodings only consume the low
    /// halfword.
    #[inline(always)]
    pub fn decode(&self, encoded: u32) -> Instr {
        let opcode = if is_compressed(encoded as u16) {
            self.compressed[(encoded & 0xFFFF) as usize]
        } else {
            self.uncompressed[pack(encoded) as usize]
        };

        Instr {
            opcode,
            operands: get_operands(opcode, encoded),
        }
    }
}

/// Decoder that serves every lookup from precomputed tables.
pub struct PrecomputedDecoder {
    cache: HashMap<DecodeKey, Arc<DecodeTables>>,
    current: Arc<DecodeTables>,
    key: DecodeKey,
}

impl PrecomputedDecoder {
    /// Build a decoder bound to the given initial key.
    pub fn new(extensions: Extensions, mxlen: XlenMode, xlen: XlenMode) -> Self {
        let key = DecodeKey {
            extensions,
            mxlen,
            xlen,
        };
        let current = Arc::new(DecodeTables::build(key));
        let mut cache = HashMap::new();
        cache.insert(key, Arc::clone(&current));
        PrecomputedDecoder {
            cache,
            current,
            key,
        }
    }

    /// The key the decoder is currently bound to.
    pub fn key(&self) -> DecodeKey {
        self.key
    }

    /// Re-bind the decoder. Tables for previously used keys are reused;
    /// a new key triggers a table build.
    pub fn configure(&mut self, extensions: Extensions, mxlen: XlenMode, xlen: XlenMode) {
        let key = DecodeKey {
            extensions,
            mxlen,
            xlen,
        };
        if key == self.key {
            return;
        }

        log::debug!(?key, "reconfiguring precomputed decoder");
        self.current = Arc::clone(
            self.cache
                .entry(key)
                .or_insert_with(|| Arc::new(DecodeTables::build(key))),
        );
        self.key = key;
    }

    /// Decode one encoding with the currently configured tables.
    #[inline(always)]
    pub fn decode(&self, encoded: u32) -> Instr {
        self.current.decode(encoded)
    }

    /// Shared handle to the current tables, e.g. for the prefetch worker.
    pub fn tables(&self) -> Arc<DecodeTables> {
        Arc::clone(&self.current)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::parser::parse_compressed;
    use crate::parser::parse_uncompressed;

    #[test]
    fn pack_unpack_roundtrip() {
        proptest!(|(packed in 0u32..(1 << 20))| {
            prop_assert_eq!(pack(unpack(packed)), packed);
        });
    }

    #[test]
    fn unpack_clears_non_opcode_bits() {
        // The projection covers bits [31:20], [14:12] and [6:2].
        const PROJECTION_MASK: u32 = 0xFFF0_707C;

        proptest!(|(encoded: u32)| {
            // Unpacking keeps exactly the projected bits, plus the 0b11
            // uncompressed marker.
            prop_assert_eq!(unpack(pack(encoded)), (encoded & PROJECTION_MASK) | 0b11);
        });
    }

    fn contexts() -> Vec<DecodeKey> {
        let rv64imacsu = DecodeKey {
            extensions: Extensions::from_letters("imacsu"),
            mxlen: XlenMode::X64,
            xlen: XlenMode::X64,
        };
        let rv64iu_narrowed = DecodeKey {
            extensions: Extensions::from_letters("iu"),
            mxlen: XlenMode::X64,
            xlen: XlenMode::X32,
        };
        let rv32imacsu = DecodeKey {
            extensions: Extensions::from_letters("imacsu"),
            mxlen: XlenMode::X32,
            xlen: XlenMode::X32,
        };
        vec![rv64imacsu, rv64iu_narrowed, rv32imacsu]
    }

    #[test]
    fn precomputed_decode_equals_direct_decode() {
        for key in contexts() {
            let tables = DecodeTables::build(key);
            let ctx = DecodeContext::new(key.extensions, key.xlen);

            proptest!(|(encoded: u32)| {
                let expected = if is_compressed(encoded as u16) {
                    parse_compressed(encoded as u16, &ctx)
                } else {
                    parse_uncompressed(encoded, &ctx)
                };
                prop_assert_eq!(tables.decode(encoded), expected);
            });
        }
    }

    #[test]
    fn known_encodings() {
        let mut decoder =
            PrecomputedDecoder::new(Extensions::from_letters("imacsu"), XlenMode::X64, XlenMode::X64);

        // addi x1, x0, 5
        let instr = decoder.decode(0x0050_0093);
        assert_eq!(instr.opcode, OpCode::Addi);
        let args = instr.i();
        assert_eq!(args.imm, 5);

        // ecall with non-zero rd/rs1 still identifies as ecall: those
        // fields are outside the opcode projection.
        assert_eq!(decoder.decode(0x0000_0073).opcode, OpCode::Ecall);
        assert_eq!(decoder.decode(0x0000_80F3).opcode, OpCode::Ecall);

        // c.addi x1, 1
        assert_eq!(decoder.decode(0x0085).opcode, OpCode::CAddi);

        // Dropping C turns the halfword illegal.
        decoder.configure(Extensions::from_letters("imasu"), XlenMode::X64, XlenMode::X64);
        assert_eq!(decoder.decode(0x0085).opcode, OpCode::UnknownCompressed);
    }

    #[test]
    fn tables_are_retained_across_reconfiguration() {
        let imacsu = Extensions::from_letters("imacsu");
        let imasu = Extensions::from_letters("imasu");
        let mut decoder = PrecomputedDecoder::new(imacsu, XlenMode::X64, XlenMode::X64);
        let first = decoder.tables();

        decoder.configure(imasu, XlenMode::X64, XlenMode::X64);
        decoder.configure(imacsu, XlenMode::X64, XlenMode::X64);

        // Same underlying allocation as before the oscillation
        assert!(Arc::ptr_eq(&first, &decoder.tables()));
    }
}
