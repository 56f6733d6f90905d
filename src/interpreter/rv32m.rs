// SPDX-License-Identifier: MIT

//! Integer multiplication and division, generic over the register width.

use crate::machine_state::registers::XRegister;
use crate::machine_state::registers::XRegisters;
use crate::xlen::Xlen;

impl<X: Xlen> XRegisters<X> {
    /// Store the lower half of `val(rs1) × val(rs2)` in `rd`
    ///
    /// Relevant RISC-V opcodes: `MUL`
    pub fn run_mul(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = X::wrapping_mul(self.read(rs1), self.read(rs2));
        self.write(rd, result)
    }

    /// Upper half of the signed × signed product
    ///
    /// Relevant RISC-V opcodes: `MULH`
    pub fn run_mulh(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = X::mulh(self.read(rs1), self.read(rs2));
        self.write(rd, result)
    }

    /// Relevant RISC-V opcodes: `MULHSU`
    pub fn run_mulhsu(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = X::mulhsu(self.read(rs1), self.read(rs2));
        self.write(rd, result)
    }

    /// Relevant RISC-V opcodes: `MULHU`
    pub fn run_mulhu(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = X::mulhu(self.read(rs1), self.read(rs2));
        self.write(rd, result)
    }

    /// Signed division. Division by zero yields all ones, overflow
    /// yields the dividend.
    ///
    /// Relevant RISC-V opcodes: `DIV`
    pub fn run_div(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = X::div_signed(self.read(rs1), self.read(rs2));
        self.write(rd, result)
    }

    /// Relevant RISC-V opcodes: `DIVU`
    pub fn run_divu(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = X::div_unsigned(self.read(rs1), self.read(rs2));
        self.write(rd, result)
    }

    /// Relevant RISC-V opcodes: `REM`
    pub fn run_rem(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = X::rem_signed(self.read(rs1), self.read(rs2));
        self.write(rd, result)
    }

    /// Relevant RISC-V opcodes: `REMU`
    pub fn run_remu(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = X::rem_unsigned(self.read(rs1), self.read(rs2));
        self.write(rd, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine_state::registers::{t0, t1, t2};
    use crate::xlen::Rv64;

    #[test]
    fn division_by_zero_yields_all_ones() {
        let mut xregs = XRegisters::<Rv64>::new();
        xregs.write(t0, 42);
        xregs.write(t1, 0);
        xregs.run_div(t0, t1, t2);
        assert_eq!(xregs.read(t2), u64::MAX);
        xregs.run_rem(t0, t1, t2);
        assert_eq!(xregs.read(t2), 42);
    }

    #[test]
    fn mulh_matches_the_wide_product() {
        let mut xregs = XRegisters::<Rv64>::new();
        xregs.write(t0, -3i64 as u64);
        xregs.write(t1, 7);
        xregs.run_mulh(t0, t1, t2);
        // -21 needs no upper bits beyond the sign extension
        assert_eq!(xregs.read(t2), u64::MAX);
        xregs.run_mul(t0, t1, t2);
        assert_eq!(xregs.read(t2), -21i64 as u64);
    }
}
