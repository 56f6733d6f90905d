// SPDX-License-Identifier: MIT

//! Word-sized multiplication and division of RV64M.

use crate::machine_state::registers::XRegister;
use crate::machine_state::registers::XRegisters;
use crate::xlen::Xlen;

impl<X: Xlen> XRegisters<X> {
    /// Multiply the lowest 32 bits and store the sign-extended low word
    ///
    /// Relevant RISC-V opcodes: `MULW`
    pub fn run_mulw(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let result = X::wrapping_mul(self.read(rs1), self.read(rs2));
        self.write(rd, X::sext32(result))
    }

    /// Relevant RISC-V opcodes: `DIVW`
    pub fn run_divw(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let a = X::to_u64(self.read(rs1)) as i32;
        let b = X::to_u64(self.read(rs2)) as i32;
        let result = if b == 0 {
            -1
        } else if a == i32::MIN && b == -1 {
            a
        } else {
            a / b
        };
        self.write(rd, X::from_i64(result as i64))
    }

    /// Relevant RISC-V opcodes: `DIVUW`
    pub fn run_divuw(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let a = X::to_u64(self.read(rs1)) as u32;
        let b = X::to_u64(self.read(rs2)) as u32;
        let result = if b == 0 { u32::MAX } else { a / b };
        self.write(rd, X::from_i64(result as i32 as i64))
    }

    /// Relevant RISC-V opcodes: `REMW`
    pub fn run_remw(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let a = X::to_u64(self.read(rs1)) as i32;
        let b = X::to_u64(self.read(rs2)) as i32;
        let result = if b == 0 {
            a
        } else if a == i32::MIN && b == -1 {
            0
        } else {
            a % b
        };
        self.write(rd, X::from_i64(result as i64))
    }

    /// Relevant RISC-V opcodes: `REMUW`
    pub fn run_remuw(&mut self, rs1: XRegister, rs2: XRegister, rd: XRegister) {
        let a = X::to_u64(self.read(rs1)) as u32;
        let b = X::to_u64(self.read(rs2)) as u32;
        let result = if b == 0 { a } else { a % b };
        self.write(rd, X::from_i64(result as i32 as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine_state::registers::{t0, t1, t2};
    use crate::xlen::Rv64;

    #[test]
    fn divw_overflow_returns_the_dividend() {
        let mut xregs = XRegisters::<Rv64>::new();
        xregs.write(t0, i32::MIN as u32 as u64);
        xregs.write(t1, -1i64 as u64);
        xregs.run_divw(t0, t1, t2);
        assert_eq!(xregs.read(t2), i32::MIN as i64 as u64);
        xregs.run_remw(t0, t1, t2);
        assert_eq!(xregs.read(t2), 0);
    }

    #[test]
    fn divuw_sign_extends_its_32_bit_result() {
        let mut xregs = XRegisters::<Rv64>::new();
        xregs.write(t0, 0xFFFF_FFFF);
        xregs.write(t1, 1);
        xregs.run_divuw(t0, t1, t2);
        assert_eq!(xregs.read(t2), 0xFFFF_FFFF_FFFF_FFFF);
    }
}
