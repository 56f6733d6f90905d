// SPDX-License-Identifier: MIT

//! RV32C compressed instructions, expanded onto their base-ISA
//! semantics. The operand decoding (prime registers, scrambled
//! immediates) has already happened in the parser.

use crate::machine_state::hart_state::HartState;
use crate::machine_state::registers::{x0, x1, x2, XRegister};
use crate::machine_state::registers::XRegisters;
use crate::machine_state::MachineCoreState;
use crate::machine_state::ProgramCounterUpdate;
use crate::parser::instruction::InstrWidth;
use crate::traps::Exception;
use crate::xlen::Xlen;

impl<X: Xlen> XRegisters<X> {
    /// `C.ADDI4SPN` expands to `addi rd', sp, imm`
    pub fn run_caddi4spn(&mut self, imm: i64, rd: XRegister) {
        self.run_addi(imm, x2, rd)
    }

    /// `C.ADDI` expands to `addi rd, rd, imm`
    pub fn run_caddi(&mut self, imm: i64, rd_rs1: XRegister) {
        self.run_addi(imm, rd_rs1, rd_rs1)
    }

    /// `C.ADDI16SP` expands to `addi sp, sp, imm`
    pub fn run_caddi16sp(&mut self, imm: i64) {
        self.run_addi(imm, x2, x2)
    }

    /// `C.LI` expands to `addi rd, x0, imm`
    pub fn run_cli(&mut self, imm: i64, rd: XRegister) {
        self.run_addi(imm, x0, rd)
    }

    /// `C.LUI` expands to `lui rd, imm`
    pub fn run_clui(&mut self, imm: i64, rd: XRegister) {
        self.run_lui(imm, rd)
    }

    /// `C.ANDI` expands to `andi rd', rd', imm`
    pub fn run_candi(&mut self, imm: i64, rd_rs1: XRegister) {
        self.run_andi(imm, rd_rs1, rd_rs1)
    }

    /// `C.SLLI` expands to `slli rd, rd, shamt`
    pub fn run_cslli(&mut self, imm: i64, rd_rs1: XRegister) {
        self.run_slli(imm, rd_rs1, rd_rs1)
    }

    /// `C.SRLI` expands to `srli rd', rd', shamt`
    pub fn run_csrli(&mut self, imm: i64, rd_rs1: XRegister) {
        self.run_srli(imm, rd_rs1, rd_rs1)
    }

    /// `C.SRAI` expands to `srai rd', rd', shamt`
    pub fn run_csrai(&mut self, imm: i64, rd_rs1: XRegister) {
        self.run_srai(imm, rd_rs1, rd_rs1)
    }

    /// `C.MV` expands to `add rd, x0, rs2`
    pub fn run_cmv(&mut self, rd: XRegister, rs2: XRegister) {
        self.run_add(x0, rs2, rd)
    }

    /// `C.ADD` expands to `add rd, rd, rs2`
    pub fn run_cadd(&mut self, rd_rs1: XRegister, rs2: XRegister) {
        self.run_add(rd_rs1, rs2, rd_rs1)
    }

    /// `C.SUB` expands to `sub rd', rd', rs2'`
    pub fn run_csub(&mut self, rd_rs1: XRegister, rs2: XRegister) {
        self.run_sub(rd_rs1, rs2, rd_rs1)
    }

    /// `C.XOR` expands to `xor rd', rd', rs2'`
    pub fn run_cxor(&mut self, rd_rs1: XRegister, rs2: XRegister) {
        self.run_xor(rd_rs1, rs2, rd_rs1)
    }

    /// `C.OR` expands to `or rd', rd', rs2'`
    pub fn run_cor(&mut self, rd_rs1: XRegister, rs2: XRegister) {
        self.run_or(rd_rs1, rs2, rd_rs1)
    }

    /// `C.AND` expands to `and rd', rd', rs2'`
    pub fn run_cand(&mut self, rd_rs1: XRegister, rs2: XRegister) {
        self.run_and(rd_rs1, rs2, rd_rs1)
    }
}

impl<X: Xlen> HartState<X> {
    /// `C.J` expands to `jal x0, imm`
    pub fn run_cj(&mut self, imm: i64) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        self.run_jal(imm, x0, InstrWidth::Compressed)
    }

    /// `C.JAL` expands to `jal ra, imm` (RV32 only)
    pub fn run_cjal(&mut self, imm: i64) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        self.run_jal(imm, x1, InstrWidth::Compressed)
    }

    /// `C.JR` expands to `jalr x0, rs1, 0`
    pub fn run_cjr(&mut self, rs1: XRegister) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        self.run_jalr(0, rs1, x0, InstrWidth::Compressed)
    }

    /// `C.JALR` expands to `jalr ra, rs1, 0`
    pub fn run_cjalr(&mut self, rs1: XRegister) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        self.run_jalr(0, rs1, x1, InstrWidth::Compressed)
    }

    /// `C.BEQZ` expands to `beq rs1', x0, imm`
    pub fn run_cbeqz(
        &mut self,
        imm: i64,
        rs1: XRegister,
    ) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        self.run_beq(imm, rs1, x0, InstrWidth::Compressed)
    }

    /// `C.BNEZ` expands to `bne rs1', x0, imm`
    pub fn run_cbnez(
        &mut self,
        imm: i64,
        rs1: XRegister,
    ) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        self.run_bne(imm, rs1, x0, InstrWidth::Compressed)
    }
}

impl<X: Xlen> MachineCoreState<X> {
    /// `C.LW` expands to `lw rd', rs1', imm`
    pub fn run_clw(&mut self, imm: i64, rs1: XRegister, rd: XRegister) -> Result<(), Exception<X>> {
        self.run_lw(imm, rs1, rd)
    }

    /// `C.LWSP` expands to `lw rd, sp, imm`
    pub fn run_clwsp(&mut self, imm: i64, rd: XRegister) -> Result<(), Exception<X>> {
        self.run_lw(imm, x2, rd)
    }

    /// `C.SW` expands to `sw rs2', rs1', imm`
    pub fn run_csw(&mut self, imm: i64, rs1: XRegister, rs2: XRegister) -> Result<(), Exception<X>> {
        self.run_sw(imm, rs1, rs2)
    }

    /// `C.SWSP` expands to `sw rs2, sp, imm`
    pub fn run_cswsp(&mut self, imm: i64, rs2: XRegister) -> Result<(), Exception<X>> {
        self.run_sw(imm, x2, rs2)
    }
}
