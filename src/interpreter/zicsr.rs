// SPDX-License-Identifier: MIT

//! CSR read/write instructions.
//!
//! All six variants funnel through the same access check: the CSR's
//! address encodes both the minimum privilege and read-only-ness, and
//! `satp` accesses from S-mode are additionally gated by `mstatus.TVM`.
//! Side effects of a CSR write surface as hart events.

use crate::machine_state::csregisters::CSRegister;
use crate::machine_state::mode::Mode;
use crate::machine_state::registers::{x0, XRegister};
use crate::machine_state::MachineCoreState;
use crate::traps::Exception;
use crate::xlen::XValue;
use crate::xlen::Xlen;

impl<X: Xlen> MachineCoreState<X> {
    fn csr_access_check(&self, csr: CSRegister, is_write: bool) -> Result<(), Exception<X>> {
        if self.hart.mode.privilege() < csr.privilege() {
            return Err(Exception::IllegalInstruction(0));
        }

        if is_write && csr.is_read_only() {
            return Err(Exception::IllegalInstruction(0));
        }

        // With TVM set, supervisor accesses to satp trap so a hypervisor
        // can virtualise the translation configuration.
        if matches!(csr, CSRegister::satp)
            && self.hart.mode == Mode::Supervisor
            && self.hart.csregisters.mstatus().tvm()
        {
            return Err(Exception::IllegalInstruction(0));
        }

        Ok(())
    }

    fn csr_replace(
        &mut self,
        csr: CSRegister,
        value: XValue<X>,
        rd: XRegister,
    ) -> Result<(), Exception<X>> {
        self.csr_access_check(csr, true)?;
        let old = self.hart.csregisters.read(csr);
        let events = self.hart.csregisters.write(csr, value);
        self.hart.notify(events);
        self.hart.xregisters.write(rd, old);
        Ok(())
    }

    fn csr_set_bits(
        &mut self,
        csr: CSRegister,
        mask: XValue<X>,
        write: bool,
        rd: XRegister,
    ) -> Result<(), Exception<X>> {
        self.csr_access_check(csr, write)?;
        let old = self.hart.csregisters.read(csr);
        if write {
            let events = self.hart.csregisters.write(csr, old | mask);
            self.hart.notify(events);
        }
        self.hart.xregisters.write(rd, old);
        Ok(())
    }

    fn csr_clear_bits(
        &mut self,
        csr: CSRegister,
        mask: XValue<X>,
        write: bool,
        rd: XRegister,
    ) -> Result<(), Exception<X>> {
        self.csr_access_check(csr, write)?;
        let old = self.hart.csregisters.read(csr);
        if write {
            let events = self.hart.csregisters.write(csr, old & !mask);
            self.hart.notify(events);
        }
        self.hart.xregisters.write(rd, old);
        Ok(())
    }

    /// Relevant RISC-V opcodes: `CSRRW`
    pub fn run_csrrw(
        &mut self,
        rd: XRegister,
        rs1: XRegister,
        csr: CSRegister,
    ) -> Result<(), Exception<X>> {
        let value = self.hart.xregisters.read(rs1);
        self.csr_replace(csr, value, rd)
    }

    /// Relevant RISC-V opcodes: `CSRRS`. With `rs1 = x0` the CSR is read
    /// but not written, so read-only CSRs are accessible this way.
    pub fn run_csrrs(
        &mut self,
        rd: XRegister,
        rs1: XRegister,
        csr: CSRegister,
    ) -> Result<(), Exception<X>> {
        let mask = self.hart.xregisters.read(rs1);
        self.csr_set_bits(csr, mask, rs1 != x0, rd)
    }

    /// Relevant RISC-V opcodes: `CSRRC`
    pub fn run_csrrc(
        &mut self,
        rd: XRegister,
        rs1: XRegister,
        csr: CSRegister,
    ) -> Result<(), Exception<X>> {
        let mask = self.hart.xregisters.read(rs1);
        self.csr_clear_bits(csr, mask, rs1 != x0, rd)
    }

    /// Relevant RISC-V opcodes: `CSRRWI`
    pub fn run_csrrwi(
        &mut self,
        rd: XRegister,
        imm: i64,
        csr: CSRegister,
    ) -> Result<(), Exception<X>> {
        self.csr_replace(csr, X::from_u64(imm as u64), rd)
    }

    /// Relevant RISC-V opcodes: `CSRRSI`
    pub fn run_csrrsi(
        &mut self,
        rd: XRegister,
        imm: i64,
        csr: CSRegister,
    ) -> Result<(), Exception<X>> {
        self.csr_set_bits(csr, X::from_u64(imm as u64), imm != 0, rd)
    }

    /// Relevant RISC-V opcodes: `CSRRCI`
    pub fn run_csrrci(
        &mut self,
        rd: XRegister,
        imm: i64,
        csr: CSRegister,
    ) -> Result<(), Exception<X>> {
        self.csr_clear_bits(csr, X::from_u64(imm as u64), imm != 0, rd)
    }
}
