// SPDX-License-Identifier: MIT

//! The direct decoder.
//!
//! Decoding is split into two halves with different inputs:
//!
//! - [`identify_uncompressed`] determines the [`OpCode`] from the bits
//!   `[31:20]|[14:12]|[6:2]` of the encoding together with the
//!   [`DecodeContext`] — never from the `rd`/`rs1` fields. This is the
//!   projection the precomputed decoder tables are indexed by, so the
//!   two decoders agree on every possible word by construction.
//! - [`get_operands`] extracts register indices and sign-extended
//!   immediates from the full encoding.
//!
//! Compressed encodings are identified from the whole halfword.

pub mod instruction;

use arbitrary_int::u3;
use arbitrary_int::u5;
use instruction::*;

use crate::bits::u16;
use crate::machine_state::csregisters::misa::Extensions;
use crate::machine_state::csregisters::CSRegister;
use crate::machine_state::registers::{parse_xregister, x0, x2, XRegister};
use crate::xlen::XlenMode;

/// Static inputs that determine how an encoding decodes: the enabled
/// extensions and the current operating XLEN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodeContext {
    pub extensions: Extensions,
    pub xlen: XlenMode,
}

impl DecodeContext {
    pub fn new(extensions: Extensions, xlen: XlenMode) -> Self {
        DecodeContext { extensions, xlen }
    }

    #[inline(always)]
    fn has(&self, ext: Extensions) -> bool {
        self.extensions.contains(ext)
    }

    #[inline(always)]
    fn rv64(&self) -> bool {
        self.xlen >= XlenMode::X64
    }
}

/// An instruction is compressed if the lowest two bits of its first
/// halfword are not `0b11`.
#[inline(always)]
pub const fn is_compressed(halfword: u16) -> bool {
    halfword & 0b11 != 0b11
}

/// Given an instruction encoded as a little-endian `u32`, extract `n` bits
/// starting at `pos`.
#[inline(always)]
const fn bits(bytes: u32, pos: usize, n: usize) -> u32 {
    (bytes >> pos) & (!0 >> (32 - n))
}

#[inline(always)]
const fn bit(bytes: u32, pos: usize) -> bool {
    bytes & (1 << pos) != 0
}

#[inline(always)]
const fn opcode(instr: u32) -> u32 {
    bits(instr, 0, 7)
}

#[inline(always)]
const fn funct3(instr: u32) -> u32 {
    bits(instr, 12, 3)
}

#[inline(always)]
const fn funct5(instr: u32) -> u32 {
    bits(instr, 27, 5)
}

#[inline(always)]
const fn funct7(instr: u32) -> u32 {
    bits(instr, 25, 7)
}

#[inline(always)]
const fn rd(instr: u32) -> XRegister {
    parse_xregister(u5::extract_u32(instr, 7))
}

#[inline(always)]
const fn rs1(instr: u32) -> XRegister {
    parse_xregister(u5::extract_u32(instr, 15))
}

#[inline(always)]
const fn rs2_bits(instr: u32) -> u32 {
    bits(instr, 20, 5)
}

#[inline(always)]
const fn rs2(instr: u32) -> XRegister {
    parse_xregister(u5::extract_u32(instr, 20))
}

const fn csr(instr: u32) -> Option<CSRegister> {
    CSRegister::try_parse(bits(instr, 20, 12) as u64)
}

// Immediates are produced by extracting the relevant bits according to the
// instruction format, then shifting them into place. The sign bit is
// always bit 31 of the instruction. Sign extension is performed by first
// casting each segment to i32, then casting the produced immediate to i64.

const fn i_imm(instr: u32) -> i64 {
    // instr[31:20]
    (((instr & 0b1111_1111_1111_0000_0000_0000_0000_0000) as i32) >> 20) as i64
}

const fn s_imm(instr: u32) -> i64 {
    // instr[31:25] | instr[11:7]
    let instr_31_25 = (instr & 0b1111_1110_0000_0000_0000_0000_0000_0000) as i32;
    let instr_11_7 = (instr & 0b0000_0000_0000_0000_0000_1111_1000_0000) as i32;
    ((instr_31_25 >> 20) | (instr_11_7 >> 7)) as i64
}

const fn b_imm(instr: u32) -> i64 {
    // instr[31] | instr[7] | instr[30:25] | instr[11:8] | 0
    let instr_31 = (instr & 0b1000_0000_0000_0000_0000_0000_0000_0000) as i32;
    let instr_7 = (instr & 0b0000_0000_0000_0000_0000_0000_1000_0000) as i32;
    let instr_30_25 = (instr & 0b0111_1110_0000_0000_0000_0000_0000_0000) as i32;
    let instr_11_8 = (instr & 0b0000_0000_0000_0000_0000_1111_0000_0000) as i32;
    ((instr_31 >> 19) | (instr_7 << 4) | (instr_30_25 >> 20) | (instr_11_8 >> 7)) as i64
}

const fn u_imm(instr: u32) -> i64 {
    // instr[31:12] | 0000_0000_0000
    ((instr & 0b1111_1111_1111_1111_1111_0000_0000_0000) as i32) as i64
}

const fn j_imm(instr: u32) -> i64 {
    // instr[31] | instr[19:12] | instr[20] | instr[30:21] | 0
    let instr_31 = (instr & 0b1000_0000_0000_0000_0000_0000_0000_0000) as i32;
    let instr_19_12 = (instr & 0b0000_0000_0000_1111_1111_0000_0000_0000) as i32;
    let instr_20 = (instr & 0b0000_0000_0001_0000_0000_0000_0000_0000) as i32;
    let instr_30_21 = (instr & 0b0111_1111_1110_0000_0000_0000_0000_0000) as i32;
    ((instr_31 >> 11) | instr_19_12 | (instr_20 >> 9) | (instr_30_21 >> 20)) as i64
}

const OP_ARITH: u32 = 0b011_0011;
const OP_ARITH_W: u32 = 0b011_1011;
const OP_ARITH_I: u32 = 0b001_0011;
const OP_ARITH_IW: u32 = 0b001_1011;
const OP_LOAD: u32 = 0b000_0011;
const OP_SYNCH: u32 = 0b000_1111;
const OP_SYS: u32 = 0b111_0011;
const OP_STORE: u32 = 0b010_0011;
const OP_BRANCH: u32 = 0b110_0011;
const OP_LUI: u32 = 0b011_0111;
const OP_AUIPC: u32 = 0b001_0111;
const OP_JAL: u32 = 0b110_1111;
const OP_JALR: u32 = 0b110_0111;
const OP_AMO: u32 = 0b010_1111;

const F3_0: u32 = 0b000;
const F3_1: u32 = 0b001;
const F3_2: u32 = 0b010;
const F3_3: u32 = 0b011;
const F3_4: u32 = 0b100;
const F3_5: u32 = 0b101;
const F3_6: u32 = 0b110;
const F3_7: u32 = 0b111;

const F5_0: u32 = 0b0_0000;
const F5_1: u32 = 0b0_0001;
const F5_2: u32 = 0b0_0010;
const F5_3: u32 = 0b0_0011;
const F5_4: u32 = 0b0_0100;
const F5_8: u32 = 0b0_1000;
const F5_12: u32 = 0b0_1100;
const F5_16: u32 = 0b1_0000;
const F5_20: u32 = 0b1_0100;
const F5_24: u32 = 0b1_1000;
const F5_28: u32 = 0b1_1100;

const F7_0: u32 = 0b0;
const F7_1: u32 = 0b1;
const F7_8: u32 = 0b000_1000;
const F7_9: u32 = 0b000_1001;
const F7_20: u32 = 0b010_0000;
const F7_24: u32 = 0b001_1000;

const RS2_0: u32 = 0b0;
const RS2_1: u32 = 0b1;
const RS2_2: u32 = 0b10;
const RS2_5: u32 = 0b101;

/// Identify the opcode of a 32-bit encoding.
///
/// Opcode identity is a function of the packed projection bits and the
/// decode context only; `rd` and `rs1` never participate, so SYSTEM-class
/// encodings with non-zero `rd`/`rs1` still identify (the operands are
/// simply ignored by the executor).
pub fn identify_uncompressed(instr: u32, ctx: &DecodeContext) -> OpCode {
    use OpCode::*;

    let m = ctx.has(Extensions::M);

    match opcode(instr) {
        OP_ARITH => match funct3(instr) {
            F3_0 => match funct7(instr) {
                F7_0 => Add,
                F7_1 if m => Mul,
                F7_20 => Sub,
                _ => Unknown,
            },
            F3_1 => match funct7(instr) {
                F7_0 => Sll,
                F7_1 if m => Mulh,
                _ => Unknown,
            },
            F3_2 => match funct7(instr) {
                F7_0 => Slt,
                F7_1 if m => Mulhsu,
                _ => Unknown,
            },
            F3_3 => match funct7(instr) {
                F7_0 => Sltu,
                F7_1 if m => Mulhu,
                _ => Unknown,
            },
            F3_4 => match funct7(instr) {
                F7_0 => Xor,
                F7_1 if m => Div,
                _ => Unknown,
            },
            F3_5 => match funct7(instr) {
                F7_0 => Srl,
                F7_1 if m => Divu,
                F7_20 => Sra,
                _ => Unknown,
            },
            F3_6 => match funct7(instr) {
                F7_0 => Or,
                F7_1 if m => Rem,
                _ => Unknown,
            },
            F3_7 => match funct7(instr) {
                F7_0 => And,
                F7_1 if m => Remu,
                _ => Unknown,
            },
            _ => Unknown,
        },

        OP_ARITH_W if ctx.rv64() => match funct3(instr) {
            F3_0 => match funct7(instr) {
                F7_0 => Addw,
                F7_1 if m => Mulw,
                F7_20 => Subw,
                _ => Unknown,
            },
            F3_1 => match funct7(instr) {
                F7_0 => Sllw,
                _ => Unknown,
            },
            F3_4 => match funct7(instr) {
                F7_1 if m => Divw,
                _ => Unknown,
            },
            F3_5 => match funct7(instr) {
                F7_0 => Srlw,
                F7_1 if m => Divuw,
                F7_20 => Sraw,
                _ => Unknown,
            },
            F3_6 => match funct7(instr) {
                F7_1 if m => Remw,
                _ => Unknown,
            },
            F3_7 => match funct7(instr) {
                F7_1 if m => Remuw,
                _ => Unknown,
            },
            _ => Unknown,
        },

        OP_ARITH_I => match funct3(instr) {
            F3_0 => Addi,
            F3_1 if shift_funct_ok(instr, ctx, false, false) => Slli,
            F3_2 => Slti,
            F3_3 => Sltiu,
            F3_4 => Xori,
            F3_5 if shift_funct_ok(instr, ctx, false, true) => {
                if bit(instr, 30) {
                    Srai
                } else {
                    Srli
                }
            }
            F3_6 => Ori,
            F3_7 => Andi,
            _ => Unknown,
        },

        OP_ARITH_IW if ctx.rv64() => match funct3(instr) {
            F3_0 => Addiw,
            F3_1 if shift_funct_ok(instr, ctx, true, false) => Slliw,
            F3_5 if shift_funct_ok(instr, ctx, true, true) => {
                if bit(instr, 30) {
                    Sraiw
                } else {
                    Srliw
                }
            }
            _ => Unknown,
        },

        OP_LOAD => match funct3(instr) {
            F3_0 => Lb,
            F3_1 => Lh,
            F3_2 => Lw,
            F3_3 if ctx.rv64() => Ld,
            F3_4 => Lbu,
            F3_5 => Lhu,
            F3_6 if ctx.rv64() => Lwu,
            _ => Unknown,
        },

        OP_STORE => match funct3(instr) {
            F3_0 => Sb,
            F3_1 => Sh,
            F3_2 => Sw,
            F3_3 if ctx.rv64() => Sd,
            _ => Unknown,
        },

        OP_BRANCH => match funct3(instr) {
            F3_0 => Beq,
            F3_1 => Bne,
            F3_4 => Blt,
            F3_5 => Bge,
            F3_6 => Bltu,
            F3_7 => Bgeu,
            _ => Unknown,
        },

        OP_LUI => Lui,
        OP_AUIPC => Auipc,
        OP_JAL => Jal,
        OP_JALR => match funct3(instr) {
            F3_0 => Jalr,
            _ => Unknown,
        },

        OP_SYNCH => match funct3(instr) {
            // All fm/pred/succ combinations execute as a full fence.
            F3_0 => Fence,
            F3_1 => FenceI,
            _ => Unknown,
        },

        OP_SYS => match funct3(instr) {
            F3_0 => match funct7(instr) {
                F7_0 => match rs2_bits(instr) {
                    RS2_0 => Ecall,
                    RS2_1 => Ebreak,
                    _ => Unknown,
                },
                F7_8 => match rs2_bits(instr) {
                    RS2_2 if ctx.has(Extensions::S) => Sret,
                    RS2_5 => Wfi,
                    _ => Unknown,
                },
                F7_9 if ctx.has(Extensions::S) => SFenceVma,
                F7_24 => match rs2_bits(instr) {
                    RS2_2 => Mret,
                    _ => Unknown,
                },
                _ => Unknown,
            },
            F3_1 => csr_op(instr, Csrrw),
            F3_2 => csr_op(instr, Csrrs),
            F3_3 => csr_op(instr, Csrrc),
            F3_5 => csr_op(instr, Csrrwi),
            F3_6 => csr_op(instr, Csrrsi),
            F3_7 => csr_op(instr, Csrrci),
            _ => Unknown,
        },

        OP_AMO if ctx.has(Extensions::A) => match funct3(instr) {
            F3_2 => match funct5(instr) {
                F5_0 => AmoaddW,
                F5_1 => AmoswapW,
                F5_2 => match rs2_bits(instr) {
                    RS2_0 => LrW,
                    _ => Unknown,
                },
                F5_3 => ScW,
                F5_4 => AmoxorW,
                F5_8 => AmoorW,
                F5_12 => AmoandW,
                F5_16 => AmominW,
                F5_20 => AmomaxW,
                F5_24 => AmominuW,
                F5_28 => AmomaxuW,
                _ => Unknown,
            },
            F3_3 if ctx.rv64() => match funct5(instr) {
                F5_0 => AmoaddD,
                F5_1 => AmoswapD,
                F5_2 => match rs2_bits(instr) {
                    RS2_0 => LrD,
                    _ => Unknown,
                },
                F5_3 => ScD,
                F5_4 => AmoxorD,
                F5_8 => AmoorD,
                F5_12 => AmoandD,
                F5_16 => AmominD,
                F5_20 => AmomaxD,
                F5_24 => AmominuD,
                F5_28 => AmomaxuD,
                _ => Unknown,
            },
            _ => Unknown,
        },

        _ => Unknown,
    }
}

/// A CSR instruction identifies only when its CSR number names an
/// implemented register; anything else is an illegal encoding.
#[inline]
fn csr_op(instr: u32, op: OpCode) -> OpCode {
    match csr(instr) {
        Some(_) => op,
        None => OpCode::Unknown,
    }
}

/// Check the fixed upper bits of an immediate shift. Right shifts use
/// bit 30 to select the arithmetic variant; the legal shift-amount width
/// grows with the operating XLEN.
fn shift_funct_ok(instr: u32, ctx: &DecodeContext, word_op: bool, right: bool) -> bool {
    let mut variable: u32 = 0;
    if right {
        variable |= 0b010_0000;
    }
    if !word_op {
        variable |= match ctx.xlen {
            XlenMode::X32 => 0,
            XlenMode::X64 => 0b1,
            XlenMode::X128 => 0b11,
        };
    }
    bits(instr, 25, 7) & !variable == 0
}

/// Extract the operands of an identified instruction from its full
/// encoding. For compressed opcodes only the low halfword is read.
pub fn get_operands(op: OpCode, instr: u32) -> Operands {
    use OpCode::*;

    match op {
        Add | Sub | Sll | Slt | Sltu | Xor | Srl | Sra | Or | And | Addw | Subw | Sllw | Srlw
        | Sraw | Mul | Mulh | Mulhsu | Mulhu | Div | Divu | Rem | Remu | Mulw | Divw | Divuw
        | Remw | Remuw => Operands::R(RTypeArgs {
            rd: rd(instr),
            rs1: rs1(instr),
            rs2: rs2(instr),
        }),

        Addi | Slti | Sltiu | Xori | Ori | Andi | Slli | Srli | Srai | Jalr | Lb | Lh | Lw
        | Lbu | Lhu | Lwu | Ld | Addiw | Slliw | Srliw | Sraiw => Operands::I(ITypeArgs {
            rd: rd(instr),
            rs1: rs1(instr),
            imm: i_imm(instr),
        }),

        Sb | Sh | Sw | Sd => Operands::S(SBTypeArgs {
            rs1: rs1(instr),
            rs2: rs2(instr),
            imm: s_imm(instr),
        }),

        Beq | Bne | Blt | Bge | Bltu | Bgeu => Operands::B(SBTypeArgs {
            rs1: rs1(instr),
            rs2: rs2(instr),
            imm: b_imm(instr),
        }),

        Lui | Auipc => Operands::U(UJTypeArgs {
            rd: rd(instr),
            imm: u_imm(instr),
        }),

        Jal => Operands::J(UJTypeArgs {
            rd: rd(instr),
            imm: j_imm(instr),
        }),

        LrW | ScW | AmoswapW | AmoaddW | AmoxorW | AmoandW | AmoorW | AmominW | AmomaxW
        | AmominuW | AmomaxuW | LrD | ScD | AmoswapD | AmoaddD | AmoxorD | AmoandD | AmoorD
        | AmominD | AmomaxD | AmominuD | AmomaxuD => Operands::Amo(AmoArgs {
            rd: rd(instr),
            rs1: rs1(instr),
            rs2: rs2(instr),
            aq: bit(instr, 26),
            rl: bit(instr, 25),
        }),

        Fence => Operands::Fence(FenceArgs {
            pred: FenceSet {
                i: bit(instr, 27),
                o: bit(instr, 26),
                r: bit(instr, 25),
                w: bit(instr, 24),
            },
            succ: FenceSet {
                i: bit(instr, 23),
                o: bit(instr, 22),
                r: bit(instr, 21),
                w: bit(instr, 20),
            },
        }),

        Csrrw | Csrrs | Csrrc => Operands::Csr(CsrArgs {
            rd: rd(instr),
            rs1: rs1(instr),
            csr: match csr(instr) {
                Some(csr) => csr,
                None => unreachable!("CSR existence is checked during identification"),
            },
        }),

        Csrrwi | Csrrsi | Csrrci => Operands::Csri(CsriArgs {
            rd: rd(instr),
            imm: bits(instr, 15, 5) as i64,
            csr: match csr(instr) {
                Some(csr) => csr,
                None => unreachable!("CSR existence is checked during identification"),
            },
        }),

        SFenceVma => Operands::SFence(SFenceVmaArgs {
            vaddr: rs1(instr),
            asid: rs2(instr),
        }),

        FenceI | Ecall | Ebreak | Mret | Sret | Wfi | CNop | CEbreak => Operands::None,

        // Compressed operands read the low halfword only.
        CAddi4spn => Operands::Ciw(CIWTypeArgs {
            rd: c_rdp_rs2p(instr as u16),
            imm: ciw_imm(instr as u16),
        }),
        CLw => Operands::Cl(CLTypeArgs {
            rd: c_rdp_rs2p(instr as u16),
            rs1: c_rs1p(instr as u16),
            imm: clw_imm(instr as u16),
        }),
        CLd => Operands::Cl(CLTypeArgs {
            rd: c_rdp_rs2p(instr as u16),
            rs1: c_rs1p(instr as u16),
            imm: cld_imm(instr as u16),
        }),
        CSw => Operands::Cs(CSTypeArgs {
            rs1: c_rs1p(instr as u16),
            rs2: c_rdp_rs2p(instr as u16),
            imm: clw_imm(instr as u16),
        }),
        CSd => Operands::Cs(CSTypeArgs {
            rs1: c_rs1p(instr as u16),
            rs2: c_rdp_rs2p(instr as u16),
            imm: cld_imm(instr as u16),
        }),

        CAddi | CLi | CAddiw => Operands::Cib(CIBTypeArgs {
            rd_rs1: c_rd_rs1(instr as u16),
            imm: ci_imm(instr as u16),
        }),
        CAddi16sp => Operands::Cib(CIBTypeArgs {
            rd_rs1: x2,
            imm: ci_addi16sp_imm(instr as u16),
        }),
        CLui => Operands::Cib(CIBTypeArgs {
            rd_rs1: c_rd_rs1(instr as u16),
            imm: ci_imm(instr as u16) << 12,
        }),
        CSrli | CSrai => Operands::Cib(CIBTypeArgs {
            rd_rs1: c_rs1p(instr as u16),
            imm: cb_shamt_imm(instr as u16),
        }),
        CAndi => Operands::Cib(CIBTypeArgs {
            rd_rs1: c_rs1p(instr as u16),
            imm: cb_andi_imm(instr as u16),
        }),
        CSlli => Operands::Cib(CIBTypeArgs {
            rd_rs1: c_rd_rs1(instr as u16),
            imm: cslli_imm(instr as u16),
        }),
        CLwsp => Operands::Cib(CIBTypeArgs {
            rd_rs1: c_rd_rs1(instr as u16),
            imm: ci_lwsp_imm(instr as u16),
        }),
        CLdsp => Operands::Cib(CIBTypeArgs {
            rd_rs1: c_rd_rs1(instr as u16),
            imm: ci_ldsp_imm(instr as u16),
        }),
        CBeqz | CBnez => Operands::Cib(CIBTypeArgs {
            rd_rs1: c_rs1p(instr as u16),
            imm: cb_imm(instr as u16),
        }),

        CSub | CXor | COr | CAnd | CSubw | CAddw => Operands::Cr(CRTypeArgs {
            rd_rs1: c_rs1p(instr as u16),
            rs2: c_rdp_rs2p(instr as u16),
        }),
        CJr | CJalr => Operands::Cr(CRTypeArgs {
            rd_rs1: c_rd_rs1(instr as u16),
            rs2: x0,
        }),
        CMv | CAdd => Operands::Cr(CRTypeArgs {
            rd_rs1: c_rd_rs1(instr as u16),
            rs2: c_rs2(instr as u16),
        }),

        CJ | CJal => Operands::Cj(CJTypeArgs {
            imm: cj_imm(instr as u16),
        }),

        CSwsp => Operands::Css(CSSTypeArgs {
            rs2: c_rs2(instr as u16),
            imm: css_swsp_imm(instr as u16),
        }),
        CSdsp => Operands::Css(CSSTypeArgs {
            rs2: c_rs2(instr as u16),
            imm: css_sdsp_imm(instr as u16),
        }),

        Unknown => Operands::Unknown { instr },
        UnknownCompressed => Operands::Unknown {
            instr: instr & 0xFFFF,
        },
    }
}

/// Decode one encoding of either width.
pub fn parse(encoding: u32, ctx: &DecodeContext) -> Instr {
    if is_compressed(encoding as u16) {
        parse_compressed(encoding as u16, ctx)
    } else {
        parse_uncompressed(encoding, ctx)
    }
}

/// Decode one 32-bit encoding.
pub fn parse_uncompressed(instr: u32, ctx: &DecodeContext) -> Instr {
    let opcode = identify_uncompressed(instr, ctx);
    Instr {
        opcode,
        operands: get_operands(opcode, instr),
    }
}

/// Decode one 16-bit encoding.
pub fn parse_compressed(halfword: u16, ctx: &DecodeContext) -> Instr {
    let opcode = identify_compressed(halfword, ctx);
    Instr {
        opcode,
        operands: get_operands(opcode, halfword as u32),
    }
}

#[inline(always)]
const fn c_bits(bytes: u16, pos: usize, n: usize) -> u16 {
    (bytes >> pos) & (!0 >> (16 - n))
}

#[inline(always)]
const fn c_rd_rs1(instr: u16) -> XRegister {
    parse_xregister(u5::extract_u16(instr, 7))
}

#[inline(always)]
const fn c_rs2(instr: u16) -> XRegister {
    parse_xregister(u5::extract_u16(instr, 2))
}

/// Encodings for the most used registers (x8..x15) in certain compressed
/// instructions.
#[inline(always)]
const fn c_reg_prime(instr: u16, pos: usize) -> u5 {
    const EIGHT: u5 = u5::new(8);

    u3::extract_u16(instr, pos).widen::<5>().wrapping_add(EIGHT)
}

#[inline(always)]
const fn c_rs1p(instr: u16) -> XRegister {
    parse_xregister(c_reg_prime(instr, 7))
}

#[inline(always)]
const fn c_rdp_rs2p(instr: u16) -> XRegister {
    parse_xregister(c_reg_prime(instr, 2))
}

#[inline(always)]
const fn c_opcode(instr: u16) -> u16 {
    c_bits(instr, 0, 2)
}

#[inline(always)]
const fn c_funct3(instr: u16) -> u16 {
    c_bits(instr, 13, 3)
}

const fn sign_extend_u16(value: u16, size: usize) -> i64 {
    let shift = 16 - size;
    (((value as i16) << shift) >> shift) as i64
}

const fn clw_imm(instr: u16) -> i64 {
    // instr[5] | instr[12:10] | instr[6] | 00
    let res = u16::bits_subset(instr, 5, 5) << 6
        | u16::bits_subset(instr, 12, 10) << 3
        | u16::bits_subset(instr, 6, 6) << 2;
    res as i64
}

const fn cld_imm(instr: u16) -> i64 {
    // instr[6:5] | instr[12:10] | 000
    let res = u16::bits_subset(instr, 6, 5) << 6 | u16::bits_subset(instr, 12, 10) << 3;
    res as i64
}

const fn ci_imm(instr: u16) -> i64 {
    // instr[12] | instr[6:2]
    let res = u16::bits_subset(instr, 12, 12) << 5 | u16::bits_subset(instr, 6, 2);
    sign_extend_u16(res, 6)
}

const fn cslli_imm(instr: u16) -> i64 {
    // instr[12] | instr[6:2]
    let res = u16::bits_subset(instr, 12, 12) << 5 | u16::bits_subset(instr, 6, 2);
    res as i64
}

const fn ci_addi16sp_imm(instr: u16) -> i64 {
    // instr[12] | instr[4:3] | instr[5] | instr[2] | instr[6] | 0000
    let res = u16::bits_subset(instr, 12, 12) << 9
        | u16::bits_subset(instr, 4, 3) << 7
        | u16::bits_subset(instr, 5, 5) << 6
        | u16::bits_subset(instr, 2, 2) << 5
        | u16::bits_subset(instr, 6, 6) << 4;
    sign_extend_u16(res, 10)
}

const fn ci_lwsp_imm(instr: u16) -> i64 {
    // instr[3:2] | instr[12] | instr[6:4] | 00
    let res = u16::bits_subset(instr, 3, 2) << 6
        | u16::bits_subset(instr, 12, 12) << 5
        | u16::bits_subset(instr, 6, 4) << 2;
    res as i64
}

const fn ci_ldsp_imm(instr: u16) -> i64 {
    // instr[4:2] | instr[12] | instr[6:5] | 000
    let res = u16::bits_subset(instr, 4, 2) << 6
        | u16::bits_subset(instr, 12, 12) << 5
        | u16::bits_subset(instr, 6, 5) << 3;
    res as i64
}

const fn css_swsp_imm(instr: u16) -> i64 {
    // instr[8:7] | instr[12:9] | 00
    let res = u16::bits_subset(instr, 8, 7) << 6 | u16::bits_subset(instr, 12, 9) << 2;
    res as i64
}

const fn css_sdsp_imm(instr: u16) -> i64 {
    // instr[9:7] | instr[12:10] | 000
    let res = u16::bits_subset(instr, 9, 7) << 6 | u16::bits_subset(instr, 12, 10) << 3;
    res as i64
}

const fn ciw_imm(instr: u16) -> i64 {
    // instr[10:7] | instr[12:11] | instr[5] | instr[6] | 00
    let res = u16::bits_subset(instr, 10, 7) << 6
        | u16::bits_subset(instr, 12, 11) << 4
        | u16::bits_subset(instr, 5, 5) << 3
        | u16::bits_subset(instr, 6, 6) << 2;
    res as i64
}

const fn cb_imm(instr: u16) -> i64 {
    // instr[12] | instr[6:5] | instr[2] | instr[11:10] | instr[4:3] | 0
    let res = u16::bits_subset(instr, 12, 12) << 8
        | u16::bits_subset(instr, 6, 5) << 6
        | u16::bits_subset(instr, 2, 2) << 5
        | u16::bits_subset(instr, 11, 10) << 3
        | u16::bits_subset(instr, 4, 3) << 1;
    sign_extend_u16(res, 9)
}

const fn cb_shamt_imm(instr: u16) -> i64 {
    // instr[12] | instr[6:2]
    let res = u16::bits_subset(instr, 12, 12) << 5 | u16::bits_subset(instr, 6, 2);
    res as i64
}

const fn cb_andi_imm(instr: u16) -> i64 {
    // instr[12] | instr[6:2]
    let res = u16::bits_subset(instr, 12, 12) << 5 | u16::bits_subset(instr, 6, 2);
    sign_extend_u16(res, 6)
}

const fn cj_imm(instr: u16) -> i64 {
    // instr[12] | instr[8] | instr[10:9] | instr[6] | instr[7] | instr[2] | instr[11] | instr[5:3] | 0
    let res = u16::bits_subset(instr, 12, 12) << 11
        | u16::bits_subset(instr, 8, 8) << 10
        | u16::bits_subset(instr, 10, 9) << 8
        | u16::bits_subset(instr, 6, 6) << 7
        | u16::bits_subset(instr, 7, 7) << 6
        | u16::bits_subset(instr, 2, 2) << 5
        | u16::bits_subset(instr, 11, 11) << 4
        | u16::bits_subset(instr, 5, 3) << 1;
    sign_extend_u16(res, 12)
}

const OP_C0: u16 = 0b00;
const OP_C1: u16 = 0b01;
const OP_C2: u16 = 0b10;

const C_F3_0: u16 = 0b000;
const C_F3_1: u16 = 0b001;
const C_F3_2: u16 = 0b010;
const C_F3_3: u16 = 0b011;
const C_F3_4: u16 = 0b100;
const C_F3_5: u16 = 0b101;
const C_F3_6: u16 = 0b110;
const C_F3_7: u16 = 0b111;

const C_Q1_0: u16 = 0b00;
const C_Q1_1: u16 = 0b01;
const C_Q1_2: u16 = 0b10;
const C_Q1_3: u16 = 0b11;

/// Identify the opcode of a 16-bit encoding. Without the C extension
/// every compressed encoding is illegal.
pub fn identify_compressed(instr: u16, ctx: &DecodeContext) -> OpCode {
    use OpCode::*;

    if !ctx.has(Extensions::C) {
        return UnknownCompressed;
    }

    match c_opcode(instr) {
        OP_C0 => match c_funct3(instr) {
            C_F3_0 => {
                // The all-zero encoding and a zero nzuimm are reserved.
                if ciw_imm(instr) == 0 {
                    UnknownCompressed
                } else {
                    CAddi4spn
                }
            }
            C_F3_2 => CLw,
            // On RV32 this slot belongs to C.FLW, which is out of scope.
            C_F3_3 if ctx.rv64() => CLd,
            C_F3_6 => CSw,
            C_F3_7 if ctx.rv64() => CSd,
            _ => UnknownCompressed,
        },

        OP_C1 => match c_funct3(instr) {
            C_F3_0 => {
                if c_rd_rs1(instr) == x0 {
                    CNop
                } else {
                    CAddi
                }
            }
            C_F3_1 => {
                if ctx.rv64() {
                    CAddiw
                } else {
                    CJal
                }
            }
            C_F3_2 => CLi,
            C_F3_3 => {
                if c_rd_rs1(instr) == x2 {
                    CAddi16sp
                } else if ci_imm(instr) == 0 {
                    // C.LUI with a zero immediate is reserved.
                    UnknownCompressed
                } else {
                    CLui
                }
            }
            C_F3_4 => match c_bits(instr, 10, 2) {
                C_Q1_0 => {
                    if !ctx.rv64() && u16::bit(instr, 12) {
                        UnknownCompressed
                    } else {
                        CSrli
                    }
                }
                C_Q1_1 => {
                    if !ctx.rv64() && u16::bit(instr, 12) {
                        UnknownCompressed
                    } else {
                        CSrai
                    }
                }
                C_Q1_2 => CAndi,
                C_Q1_3 => match (u16::bit(instr, 12), c_bits(instr, 5, 2)) {
                    (false, C_Q1_0) => CSub,
                    (false, C_Q1_1) => CXor,
                    (false, C_Q1_2) => COr,
                    (false, C_Q1_3) => CAnd,
                    (true, C_Q1_0) if ctx.rv64() => CSubw,
                    (true, C_Q1_1) if ctx.rv64() => CAddw,
                    _ => UnknownCompressed,
                },
                _ => UnknownCompressed,
            },
            C_F3_5 => CJ,
            C_F3_6 => CBeqz,
            C_F3_7 => CBnez,
            _ => UnknownCompressed,
        },

        OP_C2 => match c_funct3(instr) {
            C_F3_0 => {
                if !ctx.rv64() && u16::bit(instr, 12) {
                    UnknownCompressed
                } else {
                    CSlli
                }
            }
            C_F3_2 => {
                // C.LWSP with rd = x0 is reserved.
                if c_rd_rs1(instr) == x0 {
                    UnknownCompressed
                } else {
                    CLwsp
                }
            }
            C_F3_3 if ctx.rv64() => {
                if c_rd_rs1(instr) == x0 {
                    UnknownCompressed
                } else {
                    CLdsp
                }
            }
            C_F3_4 => match (u16::bit(instr, 12), c_rs2(instr) == x0) {
                (false, true) => {
                    if c_rd_rs1(instr) != x0 {
                        CJr
                    } else {
                        UnknownCompressed
                    }
                }
                // C.MV/C.ADD with rd = x0 are hints; they execute normally
                // and the register write is discarded.
                (false, false) => CMv,
                (true, true) => {
                    if c_rd_rs1(instr) == x0 {
                        CEbreak
                    } else {
                        CJalr
                    }
                }
                (true, false) => CAdd,
            },
            C_F3_6 => CSwsp,
            C_F3_7 if ctx.rv64() => CSdsp,
            _ => UnknownCompressed,
        },

        // Low bits 0b11: not a compressed encoding.
        _ => UnknownCompressed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine_state::registers::{x1, x5, x6, x8, x10};

    fn rv64() -> DecodeContext {
        DecodeContext::new(Extensions::from_letters("imacsu"), XlenMode::X64)
    }

    fn rv32() -> DecodeContext {
        DecodeContext::new(Extensions::from_letters("imacsu"), XlenMode::X32)
    }

    #[test]
    fn base_encodings() {
        let ctx = rv64();

        // addi x1, x0, 5
        let instr = parse_uncompressed(0x0050_0093, &ctx);
        assert_eq!(instr.opcode, OpCode::Addi);
        let args = instr.i();
        assert_eq!(args.rd, x1);
        assert_eq!(args.imm, 5);

        // beq x5, x6, -4
        let instr = parse_uncompressed(0xFE62_8EE3, &ctx);
        assert_eq!(instr.opcode, OpCode::Beq);
        let args = instr.b();
        assert_eq!((args.rs1, args.rs2, args.imm), (x5, x6, -4));

        // lui x10, 0xFFFFF000 (negative after sign extension)
        let instr = parse_uncompressed(0xFFFF_F537, &ctx);
        assert_eq!(instr.opcode, OpCode::Lui);
        assert_eq!(instr.u().imm, -4096);

        // jal x1, 0x800 (imm bit 11)
        let instr = parse_uncompressed(0x0010_00EF, &ctx);
        assert_eq!(instr.opcode, OpCode::Jal);
        assert_eq!(instr.j().imm, 0x800);
    }

    #[test]
    fn system_encodings_ignore_rd_and_rs1() {
        let ctx = rv64();
        assert_eq!(parse_uncompressed(0x0000_0073, &ctx).opcode, OpCode::Ecall);
        // The same encoding with rd = x1 and rs1 = x2: the fields are
        // outside the opcode projection.
        assert_eq!(parse_uncompressed(0x0001_00F3, &ctx).opcode, OpCode::Ecall);
        assert_eq!(parse_uncompressed(0x0010_0073, &ctx).opcode, OpCode::Ebreak);
        assert_eq!(parse_uncompressed(0x3020_0073, &ctx).opcode, OpCode::Mret);
        assert_eq!(parse_uncompressed(0x1020_0073, &ctx).opcode, OpCode::Sret);
        assert_eq!(parse_uncompressed(0x1050_0073, &ctx).opcode, OpCode::Wfi);
        assert_eq!(parse_uncompressed(0x1200_0073, &ctx).opcode, OpCode::SFenceVma);
    }

    #[test]
    fn extension_gating() {
        let no_m = DecodeContext::new(Extensions::from_letters("iacsu"), XlenMode::X64);
        // mul x1, x1, x1
        assert_eq!(parse_uncompressed(0x0210_80B3, &rv64()).opcode, OpCode::Mul);
        assert_eq!(parse_uncompressed(0x0210_80B3, &no_m).opcode, OpCode::Unknown);

        let no_s = DecodeContext::new(Extensions::from_letters("imacu"), XlenMode::X64);
        assert_eq!(parse_uncompressed(0x1020_0073, &no_s).opcode, OpCode::Unknown);
        assert_eq!(parse_uncompressed(0x1200_0073, &no_s).opcode, OpCode::Unknown);

        let no_a = DecodeContext::new(Extensions::from_letters("imcsu"), XlenMode::X64);
        // amoadd.w x1, x1, (x1)
        assert_eq!(parse_uncompressed(0x0010_A0AF, &rv64()).opcode, OpCode::AmoaddW);
        assert_eq!(parse_uncompressed(0x0010_A0AF, &no_a).opcode, OpCode::Unknown);
    }

    #[test]
    fn xlen_gating() {
        // ld x1, 0(x1)
        assert_eq!(parse_uncompressed(0x0000_B083, &rv64()).opcode, OpCode::Ld);
        assert_eq!(parse_uncompressed(0x0000_B083, &rv32()).opcode, OpCode::Unknown);

        // addiw x1, x1, 0
        assert_eq!(parse_uncompressed(0x0000_809B, &rv64()).opcode, OpCode::Addiw);
        assert_eq!(parse_uncompressed(0x0000_809B, &rv32()).opcode, OpCode::Unknown);

        // slli x1, x1, 32: legal on RV64, reserved on RV32
        assert_eq!(parse_uncompressed(0x0200_9093, &rv64()).opcode, OpCode::Slli);
        assert_eq!(parse_uncompressed(0x0200_9093, &rv32()).opcode, OpCode::Unknown);
    }

    #[test]
    fn compressed_encodings() {
        let ctx = rv64();

        // c.addi x1, 1
        let instr = parse_compressed(0x0085, &ctx);
        assert_eq!(instr.opcode, OpCode::CAddi);
        let args = instr.cib();
        assert_eq!((args.rd_rs1, args.imm), (x1, 1));

        // c.lw x10, 0(x8)
        let instr = parse_compressed(0x4008, &ctx);
        assert_eq!(instr.opcode, OpCode::CLw);
        let args = instr.cl();
        assert_eq!((args.rd, args.rs1, args.imm), (x10, x8, 0));

        // c.jr x1
        let instr = parse_compressed(0x8082, &ctx);
        assert_eq!(instr.opcode, OpCode::CJr);
        assert_eq!(instr.cr().rd_rs1, x1);

        // c.ebreak
        assert_eq!(parse_compressed(0x9002, &ctx).opcode, OpCode::CEbreak);

        // The all-zero halfword is illegal
        assert_eq!(parse_compressed(0x0000, &ctx).opcode, OpCode::UnknownCompressed);
    }

    #[test]
    fn compressed_slots_differ_between_widths() {
        // The encoding occupied by c.addiw on RV64 is c.jal on RV32.
        let encoding = 0x2085;
        assert_eq!(parse_compressed(encoding, &rv64()).opcode, OpCode::CAddiw);
        assert_eq!(parse_compressed(encoding, &rv32()).opcode, OpCode::CJal);

        // c.ld only exists at 64 bits; the RV32 slot belongs to the
        // unimplemented c.flw.
        let encoding = 0x6008;
        assert_eq!(parse_compressed(encoding, &rv64()).opcode, OpCode::CLd);
        assert_eq!(
            parse_compressed(encoding, &rv32()).opcode,
            OpCode::UnknownCompressed
        );
    }

    #[test]
    fn without_c_every_halfword_is_illegal() {
        let ctx = DecodeContext::new(Extensions::from_letters("imasu"), XlenMode::X64);
        for encoding in [0x0085u16, 0x4008, 0x8082, 0x9002] {
            assert_eq!(parse_compressed(encoding, &ctx).opcode, OpCode::UnknownCompressed);
        }
    }
}
