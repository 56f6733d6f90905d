// SPDX-License-Identifier: MIT

//! RV64C compressed instructions.

use crate::machine_state::registers::{x2, XRegister};
use crate::machine_state::registers::XRegisters;
use crate::machine_state::MachineCoreState;
use crate::traps::Exception;
use crate::xlen::Xlen;

impl<X: Xlen> XRegisters<X> {
    /// `C.ADDIW` expands to `addiw rd, rd, imm`
    pub fn run_caddiw(&mut self, imm: i64, rd_rs1: XRegister) {
        self.run_addiw(imm, rd_rs1, rd_rs1)
    }

    /// `C.ADDW` expands to `addw rd', rd', rs2'`
    pub fn run_caddw(&mut self, rd_rs1: XRegister, rs2: XRegister) {
        self.run_addw(rd_rs1, rs2, rd_rs1)
    }

    /// `C.SUBW` expands to `subw rd', rd', rs2'`
    pub fn run_csubw(&mut self, rd_rs1: XRegister, rs2: XRegister) {
        self.run_subw(rd_rs1, rs2, rd_rs1)
    }
}

impl<X: Xlen> MachineCoreState<X> {
    /// `C.LD` expands to `ld rd', rs1', imm`
    pub fn run_cld(&mut self, imm: i64, rs1: XRegister, rd: XRegister) -> Result<(), Exception<X>> {
        self.run_ld(imm, rs1, rd)
    }

    /// `C.LDSP` expands to `ld rd, sp, imm`
    pub fn run_cldsp(&mut self, imm: i64, rd: XRegister) -> Result<(), Exception<X>> {
        self.run_ld(imm, x2, rd)
    }

    /// `C.SD` expands to `sd rs2', rs1', imm`
    pub fn run_csd(&mut self, imm: i64, rs1: XRegister, rs2: XRegister) -> Result<(), Exception<X>> {
        self.run_sd(imm, rs1, rs2)
    }

    /// `C.SDSP` expands to `sd rs2, sp, imm`
    pub fn run_csdsp(&mut self, imm: i64, rs2: XRegister) -> Result<(), Exception<X>> {
        self.run_sd(imm, x2, rs2)
    }
}
