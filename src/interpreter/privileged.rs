// SPDX-License-Identifier: MIT

//! Privileged instructions: environment calls, trap returns, WFI and
//! the address-translation fence.

use crate::machine_state::csregisters::misa::Extensions;
use crate::machine_state::csregisters::xstatus::MPPValue;
use crate::machine_state::csregisters::xstatus::SPPValue;
use crate::machine_state::csregisters::CSRegister;
use crate::machine_state::hart_state::EventSet;
use crate::machine_state::hart_state::HartState;
use crate::machine_state::mode::Mode;
use crate::machine_state::registers::XRegister;
use crate::machine_state::MachineCoreState;
use crate::machine_state::ProgramCounterUpdate;
use crate::traps::Exception;
use crate::xlen::XValue;
use crate::xlen::Xlen;

impl<X: Xlen> MachineCoreState<X> {
    /// Relevant RISC-V opcodes: `ECALL`
    pub fn run_ecall(&mut self) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        Err(Exception::env_call(self.hart.mode))
    }

    /// Relevant RISC-V opcodes: `EBREAK`, `C.EBREAK`
    pub fn run_ebreak(&mut self) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        Err(Exception::Breakpoint(self.hart.pc))
    }

    /// `WFI` is a legal no-op: the hart simply proceeds, and pending
    /// interrupts are picked up at the end of the tick as usual.
    pub fn run_wfi(&mut self) {}

    /// Flush cached address translations.
    ///
    /// The `vaddr`/`asid` operands allow selective invalidation; this
    /// implementation always flushes everything.
    ///
    /// Relevant RISC-V opcodes: `SFENCE.VMA`
    pub fn run_sfence_vma(
        &mut self,
        _vaddr: XRegister,
        _asid: XRegister,
    ) -> Result<(), Exception<X>> {
        match self.hart.mode {
            Mode::User => return Err(Exception::IllegalInstruction(0)),
            Mode::Supervisor if self.hart.csregisters.mstatus().tvm() => {
                return Err(Exception::IllegalInstruction(0))
            }
            _ => {}
        }

        self.hart.notify(EventSet::REQUESTED_VMFENCE);
        Ok(())
    }
}

impl<X: Xlen> HartState<X> {
    /// Mask the saved exception pc to the current instruction alignment
    /// before jumping to it.
    fn align_return(&self, epc: XValue<X>) -> XValue<X> {
        if self.csregisters.extensions().contains(Extensions::C) {
            epc & !X::from_u64(1)
        } else {
            epc & !X::from_u64(0b11)
        }
    }

    /// Return from a machine-mode trap handler.
    ///
    /// Relevant RISC-V opcodes: `MRET`
    pub fn run_mret(&mut self) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        if self.mode != Mode::Machine {
            return Err(Exception::IllegalInstruction(0));
        }

        let mstatus = self.csregisters.mstatus();
        let previous: Mode = mstatus.mpp().into();

        // Restore the interrupt-enable we stacked on trap entry and
        // drop MPP to the least-privileged supported mode.
        let mstatus = mstatus
            .with_mie(mstatus.mpie())
            .with_mpie(true)
            .with_mpp(MPPValue::User);
        // An xRET to a less-privileged mode always clears MPRV.
        let mstatus = if previous != Mode::Machine {
            mstatus.with_mprv(false)
        } else {
            mstatus
        };
        self.csregisters.set_mstatus(mstatus);

        self.reservation_set.clear();
        self.set_mode(previous);

        let mepc = self.csregisters.read(CSRegister::mepc);
        Ok(ProgramCounterUpdate::Set(self.align_return(mepc)))
    }

    /// Return from a supervisor-mode trap handler.
    ///
    /// Relevant RISC-V opcodes: `SRET`
    pub fn run_sret(&mut self) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        match self.mode {
            Mode::User => return Err(Exception::IllegalInstruction(0)),
            // With TSR set, executing SRET in S-mode traps.
            Mode::Supervisor if self.csregisters.mstatus().tsr() => {
                return Err(Exception::IllegalInstruction(0))
            }
            _ => {}
        }

        let mstatus = self.csregisters.mstatus();
        let previous: Mode = mstatus.spp().into();

        let mstatus = mstatus
            .with_sie(mstatus.spie())
            .with_spie(true)
            .with_spp(SPPValue::User)
            .with_mprv(false);
        self.csregisters.set_mstatus(mstatus);

        self.reservation_set.clear();
        self.set_mode(previous);

        let sepc = self.csregisters.read(CSRegister::sepc);
        Ok(ProgramCounterUpdate::Set(self.align_return(sepc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine_state::csregisters::misa::Extensions;
    use crate::traps::TrapContext;
    use crate::xlen::Rv64;

    fn hart() -> HartState<Rv64> {
        let mut hart = HartState::<Rv64>::new(Extensions::from_letters("imacsu"));
        hart.reset(0x8000_0000);
        hart
    }

    #[test]
    fn mret_round_trips_a_trap() {
        let mut hart = hart();
        hart.csregisters.write(CSRegister::mtvec, 0x100u64);
        hart.set_mode(Mode::User);

        hart.take_trap(Exception::<Rv64>::EnvCallFromU, 0x8000_0004);
        assert_eq!(hart.mode, Mode::Machine);
        assert!(!hart.csregisters.mstatus().mie());

        let update = hart.run_mret().unwrap();
        assert_eq!(update, ProgramCounterUpdate::Set(0x8000_0004));
        assert_eq!(hart.mode, Mode::User);
        // MPP collapses to User after the return
        assert_eq!(hart.csregisters.mstatus().mpp(), MPPValue::User);
    }

    #[test]
    fn mret_outside_machine_mode_is_illegal() {
        let mut hart = hart();
        hart.set_mode(Mode::Supervisor);
        assert_eq!(hart.run_mret(), Err(Exception::IllegalInstruction(0)));
    }

    #[test]
    fn sret_honours_tsr() {
        let mut hart = hart();
        hart.set_mode(Mode::Supervisor);
        let mstatus = hart.csregisters.mstatus().with_tsr(true);
        hart.csregisters.set_mstatus(mstatus);
        assert_eq!(hart.run_sret(), Err(Exception::IllegalInstruction(0)));
    }

    #[test]
    fn trap_priority_encoding_for_env_calls() {
        // Each mode's environment call has its own cause
        assert_eq!(
            TrapContext::<Rv64>::exception_code(&Exception::<Rv64>::env_call(Mode::User)),
            8
        );
        assert_eq!(
            TrapContext::<Rv64>::exception_code(&Exception::<Rv64>::env_call(Mode::Supervisor)),
            9
        );
        assert_eq!(
            TrapContext::<Rv64>::exception_code(&Exception::<Rv64>::env_call(Mode::Machine)),
            11
        );
    }
}
