// SPDX-License-Identifier: MIT

//! Instructions that only decode at an operating XLEN of 64 or more:
//! the `*W` word operations and the 64-bit loads and stores.

use crate::machine_state::registers::XRegister;
use crate::machine_state::registers::XRegisters;
use crate::machine_state::MachineCoreState;
use crate::traps::Exception;
use crate::xlen::Xlen;

impl<X: Xlen> XRegisters<X> {
    /// Add `imm` to the lowest 32 bits of val(rs1) and store the
    /// sign-extended result in `rd`
    ///
    /// Relevant RISC-V opcodes: `ADDIW`, `C.ADDIW`
    pub fn run_addiw(&mut self, imm: i64, rs1: XRegister, rd: XRegister) {
        let result = X::wrapping_add(self.read(rs1), X::from_i64(imm));
        self.write(rd, X::sext32(result))
    }

    /// Relevant RISC-V opcodes: `ADDW`, `C.ADDW`
    pub fn run_addw(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = X::wrapping_add(self.read(rs1), self.read(rs2));
        self.write(rd, X::sext32(result))
    }

    /// Relevant RISC-V opcodes: `SUBW`, `C.SUBW`
    pub fn run_subw(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = X::wrapping_sub(self.read(rs1), self.read(rs2));
        self.write(rd, X::sext32(result))
    }

    /// Shift left the lowest 32 bits by `imm[4:0]`, sign-extending the
    /// 32-bit result
    ///
    /// Relevant RISC-V opcodes: `SLLIW`
    pub fn run_slliw(&mut self, imm: i64, rs1: XRegister, rd: XRegister) {
        let shamt = (imm as u32) & 0b11111;
        let low = X::to_u64(self.read(rs1)) as u32;
        self.write(rd, X::from_i64(((low << shamt) as i32) as i64))
    }

    /// Relevant RISC-V opcodes: `SRLIW`
    pub fn run_srliw(&mut self, imm: i64, rs1: XRegister, rd: XRegister) {
        let shamt = (imm as u32) & 0b11111;
        let low = X::to_u64(self.read(rs1)) as u32;
        self.write(rd, X::from_i64(((low >> shamt) as i32) as i64))
    }

    /// Relevant RISC-V opcodes: `SRAIW`
    pub fn run_sraiw(&mut self, imm: i64, rs1: XRegister, rd: XRegister) {
        let shamt = (imm as u32) & 0b11111;
        let low = X::to_u64(self.read(rs1)) as i32;
        self.write(rd, X::from_i64((low >> shamt) as i64))
    }

    /// Relevant RISC-V opcodes: `SLLW`
    pub fn run_sllw(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let shamt = X::to_u64(self.read(rs2)) as u32 & 0b11111;
        let low = X::to_u64(self.read(rs1)) as u32;
        self.write(rd, X::from_i64(((low << shamt) as i32) as i64))
    }

    /// Relevant RISC-V opcodes: `SRLW`
    pub fn run_srlw(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let shamt = X::to_u64(self.read(rs2)) as u32 & 0b11111;
        let low = X::to_u64(self.read(rs1)) as u32;
        self.write(rd, X::from_i64(((low >> shamt) as i32) as i64))
    }

    /// Relevant RISC-V opcodes: `SRAW`
    pub fn run_sraw(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let shamt = X::to_u64(self.read(rs2)) as u32 & 0b11111;
        let low = X::to_u64(self.read(rs1)) as i32;
        self.write(rd, X::from_i64((low >> shamt) as i64))
    }
}

impl<X: Xlen> MachineCoreState<X> {
    /// Relevant RISC-V opcodes: `LWU`
    pub fn run_lwu(&mut self, imm: i64, rs1: XRegister, rd: XRegister) -> Result<(), Exception<X>> {
        let addr = X::wrapping_add(self.hart.xregisters.read(rs1), X::from_i64(imm));
        let bytes: [u8; 4] = self.load_bytes(addr)?;
        let value = u32::from_le_bytes(bytes);
        self.hart.xregisters.write(rd, X::from_u64(value as u64));
        Ok(())
    }

    /// Relevant RISC-V opcodes: `LD`, `C.LD`, `C.LDSP`
    pub fn run_ld(&mut self, imm: i64, rs1: XRegister, rd: XRegister) -> Result<(), Exception<X>> {
        let addr = X::wrapping_add(self.hart.xregisters.read(rs1), X::from_i64(imm));
        let bytes: [u8; 8] = self.load_bytes(addr)?;
        let value = i64::from_le_bytes(bytes);
        self.hart.xregisters.write(rd, X::from_i64(value));
        Ok(())
    }

    /// Relevant RISC-V opcodes: `SD`, `C.SD`, `C.SDSP`
    pub fn run_sd(&mut self, imm: i64, rs1: XRegister, rs2: XRegister) -> Result<(), Exception<X>> {
        let addr = X::wrapping_add(self.hart.xregisters.read(rs1), X::from_i64(imm));
        let value = X::to_u64(self.hart.xregisters.read(rs2));
        self.store_bytes(addr, value.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine_state::registers::{t0, t1, t2};
    use crate::xlen::Rv64;

    #[test]
    fn addiw_sign_extends_the_low_word() {
        let mut xregs = XRegisters::<Rv64>::new();
        xregs.write(t0, 0x7FFF_FFFF);
        xregs.run_addiw(1, t0, t1);
        assert_eq!(xregs.read(t1), 0xFFFF_FFFF_8000_0000);
    }

    #[test]
    fn subw_ignores_the_upper_half() {
        let mut xregs = XRegisters::<Rv64>::new();
        xregs.write(t0, 0xAAAA_BBBB_0000_0005);
        xregs.write(t1, 0x1111_2222_0000_0007);
        xregs.run_subw(t0, t1, t2);
        assert_eq!(xregs.read(t2), -2i64 as u64);
    }

    #[test]
    fn sraw_shifts_the_low_word_arithmetically() {
        let mut xregs = XRegisters::<Rv64>::new();
        xregs.write(t0, 0x8000_0000u64);
        xregs.write(t1, 4);
        xregs.run_sraw(t0, t1, t2);
        assert_eq!(xregs.read(t2), 0xFFFF_FFFF_F800_0000);
    }
}
