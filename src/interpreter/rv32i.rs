// SPDX-License-Identifier: MIT

//! Base integer instructions, generic over the register width.

use crate::machine_state::hart_state::HartState;
use crate::machine_state::registers::XRegister;
use crate::machine_state::registers::XRegisters;
use crate::machine_state::MachineCoreState;
use crate::machine_state::ProgramCounterUpdate;
use crate::parser::instruction::InstrWidth;
use crate::traps::Exception;
use crate::xlen::XValue;
use crate::xlen::Xlen;

impl<X: Xlen> XRegisters<X> {
    /// Add `imm` to val(rs1) and store the result in `rd`
    ///
    /// Relevant RISC-V opcodes:
    /// - `ADDI`
    /// - `C.ADDI`
    /// - `C.ADDI4SPN`
    /// - `C.ADDI16SP`
    /// - `C.LI`
    pub fn run_addi(&mut self, imm: i64, rs1: XRegister, rd: XRegister) {
        // Return the lower XLEN bits of the addition. The result is the
        // same regardless of sign, so the addition is done unsigned.
        let result = X::wrapping_add(self.read(rs1), X::from_i64(imm));
        self.write(rd, result)
    }

    /// Perform `val(rs1) + val(rs2)` and store the result in `rd`
    ///
    /// Relevant RISC-V opcodes:
    /// - `ADD`
    /// - `C.ADD`
    /// - `C.MV`
    pub fn run_add(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = X::wrapping_add(self.read(rs1), self.read(rs2));
        self.write(rd, result)
    }

    /// Perform `val(rs1) - val(rs2)` and store the result in `rd`
    ///
    /// Relevant RISC-V opcodes:
    /// - `SUB`
    /// - `C.SUB`
    pub fn run_sub(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = X::wrapping_sub(self.read(rs1), self.read(rs2));
        self.write(rd, result)
    }

    /// Store the bitwise AND of val(rs1) and `imm` in `rd`
    ///
    /// Relevant RISC-V opcodes: `ANDI`, `C.ANDI`
    pub fn run_andi(&mut self, imm: i64, rs1: XRegister, rd: XRegister) {
        let result = self.read(rs1) & X::from_i64(imm);
        self.write(rd, result)
    }

    /// Relevant RISC-V opcodes: `ORI`
    pub fn run_ori(&mut self, imm: i64, rs1: XRegister, rd: XRegister) {
        let result = self.read(rs1) | X::from_i64(imm);
        self.write(rd, result)
    }

    /// Relevant RISC-V opcodes: `XORI`
    pub fn run_xori(&mut self, imm: i64, rs1: XRegister, rd: XRegister) {
        let result = self.read(rs1) ^ X::from_i64(imm);
        self.write(rd, result)
    }

    /// Relevant RISC-V opcodes: `AND`, `C.AND`
    pub fn run_and(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = self.read(rs1) & self.read(rs2);
        self.write(rd, result)
    }

    /// Relevant RISC-V opcodes: `OR`, `C.OR`
    pub fn run_or(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = self.read(rs1) | self.read(rs2);
        self.write(rd, result)
    }

    /// Relevant RISC-V opcodes: `XOR`, `C.XOR`
    pub fn run_xor(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = self.read(rs1) ^ self.read(rs2);
        self.write(rd, result)
    }

    /// Place 1 in `rd` if val(rs1) is less than `imm` as signed integers
    ///
    /// Relevant RISC-V opcodes: `SLTI`
    pub fn run_slti(&mut self, imm: i64, rs1: XRegister, rd: XRegister) {
        let result = X::signed_lt(self.read(rs1), X::from_i64(imm));
        self.write(rd, X::from_u64(result as u64))
    }

    /// Relevant RISC-V opcodes: `SLTIU`
    pub fn run_sltiu(&mut self, imm: i64, rs1: XRegister, rd: XRegister) {
        let result = self.read(rs1) < X::from_i64(imm);
        self.write(rd, X::from_u64(result as u64))
    }

    /// Relevant RISC-V opcodes: `SLT`
    pub fn run_slt(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = X::signed_lt(self.read(rs1), self.read(rs2));
        self.write(rd, X::from_u64(result as u64))
    }

    /// Relevant RISC-V opcodes: `SLTU`
    pub fn run_sltu(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = self.read(rs1) < self.read(rs2);
        self.write(rd, X::from_u64(result as u64))
    }

    /// Shift left logically, `shift_amount = imm[SHIFT_MASK]`
    ///
    /// Relevant RISC-V opcodes: `SLLI`, `C.SLLI`
    pub fn run_slli(&mut self, imm: i64, rs1: XRegister, rd: XRegister) {
        let shamt = (imm as u64 as u32) & X::SHIFT_MASK;
        self.write(rd, self.read(rs1) << shamt)
    }

    /// Relevant RISC-V opcodes: `SRLI`, `C.SRLI`
    pub fn run_srli(&mut self, imm: i64, rs1: XRegister, rd: XRegister) {
        let shamt = (imm as u64 as u32) & X::SHIFT_MASK;
        self.write(rd, self.read(rs1) >> shamt)
    }

    /// Relevant RISC-V opcodes: `SRAI`, `C.SRAI`
    pub fn run_srai(&mut self, imm: i64, rs1: XRegister, rd: XRegister) {
        let shamt = (imm as u64 as u32) & X::SHIFT_MASK;
        self.write(rd, X::sra(self.read(rs1), shamt))
    }

    /// Shift left logically by `val(rs2) & SHIFT_MASK`
    ///
    /// Relevant RISC-V opcodes: `SLL`
    pub fn run_sll(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let shamt = X::to_u64(self.read(rs2)) as u32 & X::SHIFT_MASK;
        self.write(rd, self.read(rs1) << shamt)
    }

    /// Relevant RISC-V opcodes: `SRL`
    pub fn run_srl(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let shamt = X::to_u64(self.read(rs2)) as u32 & X::SHIFT_MASK;
        self.write(rd, self.read(rs1) >> shamt)
    }

    /// Relevant RISC-V opcodes: `SRA`
    pub fn run_sra(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let shamt = X::to_u64(self.read(rs2)) as u32 & X::SHIFT_MASK;
        self.write(rd, X::sra(self.read(rs1), shamt))
    }

    /// Set the upper 20 bits of `rd` from the `U-type` immediate
    ///
    /// Relevant RISC-V opcodes: `LUI`, `C.LUI`
    pub fn run_lui(&mut self, imm: i64, rd: XRegister) {
        // The immediate comes already shifted and sign-extended from the
        // parser.
        self.write(rd, X::from_i64(imm));
    }
}

impl<X: Xlen> HartState<X> {
    /// Store `pc + imm` in `rd`
    ///
    /// Relevant RISC-V opcodes: `AUIPC`
    pub fn run_auipc(&mut self, imm: i64, rd: XRegister) {
        let result = X::wrapping_add(self.pc, X::from_i64(imm));
        self.xregisters.write(rd, result)
    }

    /// Resolve a conditional branch: fall through when not taken, else
    /// jump to `pc + imm`, checking the target's alignment.
    fn branch(
        &self,
        taken: bool,
        imm: i64,
        width: InstrWidth,
    ) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        if !taken {
            return Ok(ProgramCounterUpdate::Next(width));
        }

        let target = X::wrapping_add(self.pc, X::from_i64(imm));
        if !self.pc_aligned(target) {
            return Err(Exception::InstructionAddressMisaligned(target));
        }
        Ok(ProgramCounterUpdate::Set(target))
    }

    /// Relevant RISC-V opcodes: `BEQ`
    pub fn run_beq(
        &mut self,
        imm: i64,
        rs1: XRegister,
        rs2: XRegister,
        width: InstrWidth,
    ) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        self.branch(self.xregisters.read(rs1) == self.xregisters.read(rs2), imm, width)
    }

    /// Relevant RISC-V opcodes: `BNE`
    pub fn run_bne(
        &mut self,
        imm: i64,
        rs1: XRegister,
        rs2: XRegister,
        width: InstrWidth,
    ) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        self.branch(self.xregisters.read(rs1) != self.xregisters.read(rs2), imm, width)
    }

    /// Relevant RISC-V opcodes: `BLT`
    pub fn run_blt(
        &mut self,
        imm: i64,
        rs1: XRegister,
        rs2: XRegister,
        width: InstrWidth,
    ) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        let taken = X::signed_lt(self.xregisters.read(rs1), self.xregisters.read(rs2));
        self.branch(taken, imm, width)
    }

    /// Relevant RISC-V opcodes: `BGE`
    pub fn run_bge(
        &mut self,
        imm: i64,
        rs1: XRegister,
        rs2: XRegister,
        width: InstrWidth,
    ) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        let taken = !X::signed_lt(self.xregisters.read(rs1), self.xregisters.read(rs2));
        self.branch(taken, imm, width)
    }

    /// Relevant RISC-V opcodes: `BLTU`
    pub fn run_bltu(
        &mut self,
        imm: i64,
        rs1: XRegister,
        rs2: XRegister,
        width: InstrWidth,
    ) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        self.branch(self.xregisters.read(rs1) < self.xregisters.read(rs2), imm, width)
    }

    /// Relevant RISC-V opcodes: `BGEU`
    pub fn run_bgeu(
        &mut self,
        imm: i64,
        rs1: XRegister,
        rs2: XRegister,
        width: InstrWidth,
    ) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        self.branch(self.xregisters.read(rs1) >= self.xregisters.read(rs2), imm, width)
    }

    /// Jump to `pc + imm`, linking `pc + width` into `rd`
    ///
    /// Relevant RISC-V opcodes: `JAL`, `C.J`, `C.JAL`
    pub fn run_jal(
        &mut self,
        imm: i64,
        rd: XRegister,
        width: InstrWidth,
    ) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        let target = X::wrapping_add(self.pc, X::from_i64(imm));
        if !self.pc_aligned(target) {
            return Err(Exception::InstructionAddressMisaligned(target));
        }

        let link = X::wrapping_add(self.pc, X::from_u64(width as u64));
        self.xregisters.write(rd, link);
        Ok(ProgramCounterUpdate::Set(target))
    }

    /// Jump to `(val(rs1) + imm) & !1`, linking `pc + width` into `rd`
    ///
    /// Relevant RISC-V opcodes: `JALR`, `C.JR`, `C.JALR`
    pub fn run_jalr(
        &mut self,
        imm: i64,
        rs1: XRegister,
        rd: XRegister,
        width: InstrWidth,
    ) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        // The target is computed before the link is written: rd and rs1
        // may name the same register.
        let target =
            X::wrapping_add(self.xregisters.read(rs1), X::from_i64(imm)) & !X::from_u64(1);
        if !self.pc_aligned(target) {
            return Err(Exception::InstructionAddressMisaligned(target));
        }

        let link = X::wrapping_add(self.pc, X::from_u64(width as u64));
        self.xregisters.write(rd, link);
        Ok(ProgramCounterUpdate::Set(target))
    }
}

impl<X: Xlen> MachineCoreState<X> {
    #[inline]
    fn effective_address(&self, imm: i64, rs1: XRegister) -> XValue<X> {
        X::wrapping_add(self.hart.xregisters.read(rs1), X::from_i64(imm))
    }

    /// Relevant RISC-V opcodes: `LB`
    pub fn run_lb(&mut self, imm: i64, rs1: XRegister, rd: XRegister) -> Result<(), Exception<X>> {
        let addr = self.effective_address(imm, rs1);
        let bytes: [u8; 1] = self.load_bytes(addr)?;
        self.hart.xregisters.write(rd, X::from_i64(bytes[0] as i8 as i64));
        Ok(())
    }

    /// Relevant RISC-V opcodes: `LH`
    pub fn run_lh(&mut self, imm: i64, rs1: XRegister, rd: XRegister) -> Result<(), Exception<X>> {
        let addr = self.effective_address(imm, rs1);
        let bytes: [u8; 2] = self.load_bytes(addr)?;
        let value = i16::from_le_bytes(bytes);
        self.hart.xregisters.write(rd, X::from_i64(value as i64));
        Ok(())
    }

    /// Relevant RISC-V opcodes: `LW`, `C.LW`, `C.LWSP`
    pub fn run_lw(&mut self, imm: i64, rs1: XRegister, rd: XRegister) -> Result<(), Exception<X>> {
        let addr = self.effective_address(imm, rs1);
        let bytes: [u8; 4] = self.load_bytes(addr)?;
        let value = i32::from_le_bytes(bytes);
        self.hart.xregisters.write(rd, X::from_i64(value as i64));
        Ok(())
    }

    /// Relevant RISC-V opcodes: `LBU`
    pub fn run_lbu(&mut self, imm: i64, rs1: XRegister, rd: XRegister) -> Result<(), Exception<X>> {
        let addr = self.effective_address(imm, rs1);
        let bytes: [u8; 1] = self.load_bytes(addr)?;
        self.hart.xregisters.write(rd, X::from_u64(bytes[0] as u64));
        Ok(())
    }

    /// Relevant RISC-V opcodes: `LHU`
    pub fn run_lhu(&mut self, imm: i64, rs1: XRegister, rd: XRegister) -> Result<(), Exception<X>> {
        let addr = self.effective_address(imm, rs1);
        let bytes: [u8; 2] = self.load_bytes(addr)?;
        let value = u16::from_le_bytes(bytes);
        self.hart.xregisters.write(rd, X::from_u64(value as u64));
        Ok(())
    }

    /// Relevant RISC-V opcodes: `SB`
    pub fn run_sb(&mut self, imm: i64, rs1: XRegister, rs2: XRegister) -> Result<(), Exception<X>> {
        let addr = self.effective_address(imm, rs1);
        let value = X::to_u64(self.hart.xregisters.read(rs2)) as u8;
        self.store_bytes(addr, value.to_le_bytes())
    }

    /// Relevant RISC-V opcodes: `SH`
    pub fn run_sh(&mut self, imm: i64, rs1: XRegister, rs2: XRegister) -> Result<(), Exception<X>> {
        let addr = self.effective_address(imm, rs1);
        let value = X::to_u64(self.hart.xregisters.read(rs2)) as u16;
        self.store_bytes(addr, value.to_le_bytes())
    }

    /// Relevant RISC-V opcodes: `SW`, `C.SW`, `C.SWSP`
    pub fn run_sw(&mut self, imm: i64, rs1: XRegister, rs2: XRegister) -> Result<(), Exception<X>> {
        let addr = self.effective_address(imm, rs1);
        let value = X::to_u64(self.hart.xregisters.read(rs2)) as u32;
        self.store_bytes(addr, value.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine_state::registers::{a0, t0, t1, t2};
    use crate::machine_state::csregisters::misa::Extensions;
    use crate::xlen::Rv32;
    use crate::xlen::Rv64;

    #[test]
    fn addi_wraps_at_register_width() {
        let mut xregs = XRegisters::<Rv32>::new();
        xregs.write(t0, u32::MAX);
        xregs.run_addi(3, t0, t1);
        assert_eq!(xregs.read(t1), 2);
    }

    #[test]
    fn slt_uses_two_complement() {
        let mut xregs = XRegisters::<Rv64>::new();
        xregs.write(t0, -5i64 as u64);
        xregs.write(t1, 3);
        xregs.run_slt(t0, t1, t2);
        assert_eq!(xregs.read(t2), 1);
        xregs.run_sltu(t0, t1, t2);
        assert_eq!(xregs.read(t2), 0);
    }

    #[test]
    fn shifts_mask_the_amount() {
        let mut xregs = XRegisters::<Rv32>::new();
        xregs.write(t0, 0b100);
        xregs.write(t1, 33);
        // 33 & 0x1F == 1
        xregs.run_sll(t0, t1, t2);
        assert_eq!(xregs.read(t2), 0b1000);

        xregs.write(t0, 0x8000_0000);
        xregs.run_srai(1, t0, t2);
        assert_eq!(xregs.read(t2), 0xC000_0000);
    }

    #[test]
    fn branch_to_misaligned_target_faults() {
        let mut hart = HartState::<Rv64>::new(Extensions::from_letters("imsu"));
        hart.reset(0x1000);
        hart.xregisters.write(t0, 1);

        // Taken branch to pc + 2 with C disabled
        let result = hart.run_bne(2, t0, a0, InstrWidth::Uncompressed);
        assert_eq!(result, Err(Exception::InstructionAddressMisaligned(0x1002)));

        // Not-taken branch just falls through
        let result = hart.run_beq(2, t0, a0, InstrWidth::Uncompressed);
        assert_eq!(result, Ok(ProgramCounterUpdate::Next(InstrWidth::Uncompressed)));
    }

    #[test]
    fn jalr_clears_bit_zero_and_links() {
        let mut hart = HartState::<Rv64>::new(Extensions::from_letters("imacsu"));
        hart.reset(0x1000);
        hart.xregisters.write(t0, 0x2005);

        let result = hart.run_jalr(2, t0, t0, InstrWidth::Uncompressed).unwrap();
        assert_eq!(result, ProgramCounterUpdate::Set(0x2006));
        assert_eq!(hart.xregisters.read(t0), 0x1004);
    }
}
