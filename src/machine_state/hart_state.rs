// SPDX-License-Identifier: MIT

//! Architectural state of one hart, and the trap-taking machinery.

use crate::log;
use crate::machine_state::csregisters;
use crate::machine_state::csregisters::misa::Extensions;
use crate::machine_state::csregisters::xstatus;
use crate::machine_state::csregisters::CSRegister;
use crate::machine_state::mode::Mode;
use crate::machine_state::mode::TrapMode;
use crate::machine_state::registers;
use crate::machine_state::reservation_set::ReservationSet;
use crate::parser::instruction::Instr;
use crate::parser::instruction::OpCode;
use crate::parser::instruction::Operands;
use crate::traps::Interrupt;
use crate::traps::TrapContext;
use crate::xlen::XValue;
use crate::xlen::Xlen;
use crate::xlen::XlenMode;

/// Events the architectural state announces to whichever driver is
/// attached. The state does not know what caches the driver keeps; the
/// driver drains the set at defined points and reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventSet(u8);

impl EventSet {
    /// A trap was taken; any block being replayed must stop.
    pub const TOOK_TRAP: EventSet = EventSet(1 << 0);
    /// FENCE.I: decoded-instruction caches are stale.
    pub const REQUESTED_IFENCE: EventSet = EventSet(1 << 1);
    /// SFENCE.VMA: translations and decoded blocks are stale.
    pub const REQUESTED_VMFENCE: EventSet = EventSet(1 << 2);
    /// The enabled-extension set changed.
    pub const CHANGED_MISA: EventSet = EventSet(1 << 3);
    /// A translation-relevant `mstatus` bit (or UXL/SXL) changed.
    pub const CHANGED_MSTATUS: EventSet = EventSet(1 << 4);
    /// `satp` was written.
    pub const CHANGED_SATP: EventSet = EventSet(1 << 5);
    /// The privilege mode changed.
    pub const PRIVILEGE_CHANGED: EventSet = EventSet(1 << 6);

    /// Events that must clear the translation cache.
    pub const INVALIDATES_TRANSLATION: EventSet = EventSet(
        Self::REQUESTED_VMFENCE.0
            | Self::CHANGED_SATP.0
            | Self::CHANGED_MSTATUS.0
            | Self::PRIVILEGE_CHANGED.0,
    );

    /// Events that must flush decoded-instruction/block caches and the
    /// prefetch pipeline.
    pub const INVALIDATES_DECODE: EventSet = EventSet(
        Self::REQUESTED_IFENCE.0
            | Self::REQUESTED_VMFENCE.0
            | Self::CHANGED_MISA.0
            | Self::PRIVILEGE_CHANGED.0,
    );

    pub const fn empty() -> EventSet {
        EventSet(0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: EventSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: EventSet) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for EventSet {
    type Output = EventSet;

    fn bitor(self, rhs: EventSet) -> EventSet {
        EventSet(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for EventSet {
    fn bitor_assign(&mut self, rhs: EventSet) {
        self.0 |= rhs.0;
    }
}

/// Workspace for the instruction currently being fetched/executed. The
/// driver fills it; the executor reads it.
#[derive(Clone, Debug)]
pub struct FetchSlot<X: Xlen> {
    pub virtual_pc: XValue<X>,
    pub encoding: u32,
    pub instr: Instr,
}

impl<X: Xlen> Default for FetchSlot<X> {
    fn default() -> Self {
        FetchSlot {
            virtual_pc: X::ZERO,
            encoding: 0,
            instr: Instr {
                opcode: OpCode::Unknown,
                operands: Operands::Unknown { instr: 0 },
            },
        }
    }
}

/// RISC-V hart state
#[derive(Clone)]
pub struct HartState<X: Xlen> {
    /// Integer registers
    pub xregisters: registers::XRegisters<X>,

    /// Control and state registers
    pub csregisters: csregisters::CSRegisters<X>,

    /// Current running mode of the hart
    pub mode: Mode,

    /// Address of the instruction currently executing
    pub pc: XValue<X>,

    /// Address of the next instruction to fetch
    pub next_pc: XValue<X>,

    /// Reservation set for LR/SC
    pub reservation_set: ReservationSet<X>,

    /// Current fetch workspace
    pub fetch: FetchSlot<X>,

    events: EventSet,
}

impl<X: Xlen> HartState<X> {
    pub fn new(maximal_extensions: Extensions) -> Self {
        HartState {
            xregisters: registers::XRegisters::new(),
            csregisters: csregisters::CSRegisters::new(maximal_extensions),
            mode: Mode::Machine,
            pc: X::ZERO,
            next_pc: X::ZERO,
            reservation_set: ReservationSet::new(),
            fetch: FetchSlot::default(),
            events: EventSet::empty(),
        }
    }

    /// Reset the hart state: registers zeroed, Machine mode, both program
    /// counters at the reset vector.
    pub fn reset(&mut self, pc: XValue<X>) {
        self.xregisters.reset();
        self.csregisters.reset();
        self.mode = Mode::Machine;
        self.pc = pc;
        self.next_pc = pc;
        self.reservation_set.clear();
        self.fetch = FetchSlot::default();
        self.events = EventSet::empty();
    }

    /// Announce events to the driver.
    #[inline]
    pub fn notify(&mut self, events: EventSet) {
        self.events |= events;
    }

    /// Drain the pending events.
    #[inline]
    pub fn take_events(&mut self) -> EventSet {
        std::mem::take(&mut self.events)
    }

    /// Change the privilege mode, announcing the switch when it actually
    /// changes anything.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            self.mode = mode;
            self.notify(EventSet::PRIVILEGE_CHANGED);
        }
    }

    /// The operating XLEN for the current privilege mode, derived from
    /// MISA.MXL and the MSTATUS.SXL/UXL fields.
    pub fn effective_xlen(&self) -> XlenMode {
        match self.mode {
            Mode::Machine => X::MODE,
            Mode::Supervisor => self.csregisters.mstatus().sxl().mode().min(X::MODE),
            Mode::User => self.csregisters.mstatus().uxl().mode().min(X::MODE),
        }
    }

    /// Whether `target` is a legal instruction address: 2-byte aligned
    /// with the C extension, 4-byte aligned without.
    #[inline]
    pub fn pc_aligned(&self, target: XValue<X>) -> bool {
        let mask = if self.csregisters.extensions().contains(Extensions::C) {
            0b01
        } else {
            0b11
        };
        X::to_u64(target) & mask == 0
    }

    /// Given a trap source and a return address, take a trap on the hart.
    /// Returns the address of the trap handler.
    pub fn take_trap<TC: TrapContext<X>>(&mut self, trap_source: TC, return_pc: XValue<X>) -> XValue<X> {
        let current_mode = self.mode;
        let trap_mode = self.csregisters.get_trap_mode(&trap_source, current_mode);
        let (xtvec_reg, xepc_reg, xcause_reg, xtval_reg) = match trap_mode {
            TrapMode::Supervisor => (
                CSRegister::stvec,
                CSRegister::sepc,
                CSRegister::scause,
                CSRegister::stval,
            ),
            TrapMode::Machine => (
                CSRegister::mtvec,
                CSRegister::mepc,
                CSRegister::mcause,
                CSRegister::mtval,
            ),
        };

        // Setting xepc allows the trap handler to resume the previous
        // computation; xcause/xtval tell it why it runs.
        self.csregisters.write(xepc_reg, return_pc);
        self.csregisters.write(xcause_reg, trap_source.xcause());
        self.csregisters.write(xtval_reg, trap_source.xtval());

        // Configure machine status for the trap handler: remember the
        // interrupt-enable and privilege we came from, then mask
        // interrupts for the handler.
        let mstatus = self.csregisters.mstatus();
        let mstatus = match trap_mode {
            TrapMode::Supervisor => {
                let interrupts_enabled = mstatus.sie();
                mstatus
                    .with_spie(interrupts_enabled)
                    .with_sie(false)
                    .with_spp(match current_mode {
                        Mode::User => xstatus::SPPValue::User,
                        _ => xstatus::SPPValue::Supervisor,
                    })
            }
            TrapMode::Machine => {
                let interrupts_enabled = mstatus.mie();
                mstatus
                    .with_mpie(interrupts_enabled)
                    .with_mie(false)
                    .with_mpp(current_mode.into())
            }
        };
        self.csregisters.set_mstatus(mstatus);

        // A trap drops any reservation.
        self.reservation_set.clear();

        self.set_mode(trap_mode.as_mode());
        self.notify(EventSet::TOOK_TRAP);

        log::debug!(
            cause = trap_source.exception_code(),
            "taking trap into {:?}",
            trap_mode
        );

        trap_source.trap_handler_address(self.csregisters.read(xtvec_reg))
    }

    /// Return the pending [`Interrupt`] with the highest priority, or
    /// [`None`]. Priority order: MEI, MSI, MTI, SEI, SSI, STI.
    pub fn get_pending_interrupt(&self) -> Option<Interrupt> {
        let active = self.csregisters.pending_interrupt_mask(self.mode);
        if active == 0 {
            return None;
        }

        let interrupt = if active & (1 << Interrupt::MACHINE_EXTERNAL_EXCEPTION_CODE) != 0 {
            Interrupt::MachineExternal
        } else if active & (1 << Interrupt::MACHINE_SOFTWARE_EXCEPTION_CODE) != 0 {
            Interrupt::MachineSoftware
        } else if active & (1 << Interrupt::MACHINE_TIMER_EXCEPTION_CODE) != 0 {
            Interrupt::MachineTimer
        } else if active & (1 << Interrupt::SUPERVISOR_EXTERNAL_EXCEPTION_CODE) != 0 {
            Interrupt::SupervisorExternal
        } else if active & (1 << Interrupt::SUPERVISOR_SOFTWARE_EXCEPTION_CODE) != 0 {
            Interrupt::SupervisorSoftware
        } else if active & (1 << Interrupt::SUPERVISOR_TIMER_EXCEPTION_CODE) != 0 {
            Interrupt::SupervisorTimer
        } else {
            return None;
        };

        Some(interrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traps::Exception;
    use crate::xlen::Rv64;

    fn hart() -> HartState<Rv64> {
        let mut hart = HartState::<Rv64>::new(Extensions::from_letters("imacsu"));
        hart.reset(0x8000_0000);
        hart
    }

    #[test]
    fn reset_state() {
        let hart = hart();
        assert_eq!(hart.mode, Mode::Machine);
        assert_eq!(hart.pc, 0x8000_0000);
        assert_eq!(hart.next_pc, 0x8000_0000);
    }

    #[test]
    fn trap_from_user_to_machine() {
        let mut hart = hart();
        hart.csregisters.write(CSRegister::mtvec, 0x100u64);
        hart.set_mode(Mode::User);
        hart.take_events();

        let handler = hart.take_trap(Exception::<Rv64>::EnvCallFromU, 0x8000_0008);

        assert_eq!(handler, 0x100);
        assert_eq!(hart.mode, Mode::Machine);
        assert_eq!(hart.csregisters.read(CSRegister::mepc), 0x8000_0008u64);
        assert_eq!(hart.csregisters.read(CSRegister::mcause), 8u64);
        assert_eq!(hart.csregisters.mstatus().mpp(), xstatus::MPPValue::User);
        assert!(!hart.csregisters.mstatus().mie());

        let events = hart.take_events();
        assert!(events.contains(EventSet::TOOK_TRAP));
        assert!(events.contains(EventSet::PRIVILEGE_CHANGED));
    }

    #[test]
    fn delegated_trap_lands_in_supervisor() {
        let mut hart = hart();
        hart.csregisters.write(CSRegister::stvec, 0x200u64);
        hart.csregisters
            .write(CSRegister::medeleg, 1u64 << 13 /* load page fault */);
        hart.set_mode(Mode::User);

        let handler = hart.take_trap(Exception::<Rv64>::LoadPageFault(0x42), 0x1000);

        assert_eq!(handler, 0x200);
        assert_eq!(hart.mode, Mode::Supervisor);
        assert_eq!(hart.csregisters.read(CSRegister::scause), 13u64);
        assert_eq!(hart.csregisters.read(CSRegister::stval), 0x42u64);
        assert_eq!(hart.csregisters.read(CSRegister::sepc), 0x1000u64);
    }

    #[test]
    fn interrupt_priority_order() {
        let mut hart = hart();
        hart.csregisters.write(CSRegister::mie, !0u64);
        hart.csregisters
            .set_mstatus(hart.csregisters.mstatus().with_mie(true));

        hart.csregisters.set_interrupt_pending(Interrupt::MachineTimer);
        hart.csregisters.set_interrupt_pending(Interrupt::MachineExternal);
        assert_eq!(hart.get_pending_interrupt(), Some(Interrupt::MachineExternal));

        hart.csregisters.clear_interrupt_pending(Interrupt::MachineExternal);
        assert_eq!(hart.get_pending_interrupt(), Some(Interrupt::MachineTimer));

        hart.csregisters.clear_interrupt_pending(Interrupt::MachineTimer);
        assert_eq!(hart.get_pending_interrupt(), None);
    }

    #[test]
    fn pc_alignment_follows_the_c_extension() {
        let mut hart = hart();
        assert!(hart.pc_aligned(0x1002));
        assert!(!hart.pc_aligned(0x1001));

        // Disable C: only 4-byte alignment remains legal
        let misa: u64 = hart.csregisters.read(CSRegister::misa);
        hart.csregisters
            .write(CSRegister::misa, misa & !(Extensions::C.bits() as u64));
        assert!(!hart.pc_aligned(0x1002));
        assert!(hart.pc_aligned(0x1004));
    }
}
