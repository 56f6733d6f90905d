// SPDX-License-Identifier: MIT

//! Control and state registers.
//!
//! Only the shadow state the execution core consumes is materialised:
//! status, trap setup/handling, interrupt, counter and translation
//! registers. Reads and writes go through [`CSRegisters::read`] and
//! [`CSRegisters::write`], which apply the WPRI/WARL rules and report
//! the side effects the drivers care about as an [`EventSet`].

pub mod bits;
pub mod misa;
pub mod satp;
pub mod xstatus;

use misa::Extensions;
use satp::Satp;
use xstatus::MStatus;
use xstatus::SStatus;
use xstatus::XLenValue;

use crate::bits::Bits64;
use crate::machine_state::hart_state::EventSet;
use crate::machine_state::mode::Mode;
use crate::machine_state::mode::TrapMode;
use crate::traps::Interrupt;
use crate::traps::TrapContext;
use crate::traps::TrapKind;
use crate::xlen::XValue;
use crate::xlen::Xlen;

/// Privilege required to access a CSR
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone)]
pub enum Privilege {
    Unprivileged,
    Supervisor,
    Machine,
}

impl Mode {
    /// Obtain the corresponding [`Privilege`] for this mode.
    pub fn privilege(&self) -> Privilege {
        match self {
            Mode::User => Privilege::Unprivileged,
            Mode::Supervisor => Privilege::Supervisor,
            Mode::Machine => Privilege::Machine,
        }
    }
}

/// CSR address-space entries implemented by the core
#[allow(non_camel_case_types)]
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash, strum::Display)]
#[repr(u16)]
pub enum CSRegister {
    // Supervisor trap setup & handling
    sstatus = 0x100,
    sie = 0x104,
    stvec = 0x105,
    sscratch = 0x140,
    sepc = 0x141,
    scause = 0x142,
    stval = 0x143,
    sip = 0x144,

    // Supervisor protection and translation
    satp = 0x180,

    // Machine information
    mvendorid = 0xF11,
    marchid = 0xF12,
    mimpid = 0xF13,
    mhartid = 0xF14,

    // Machine trap setup
    mstatus = 0x300,
    misa = 0x301,
    medeleg = 0x302,
    mideleg = 0x303,
    mie = 0x304,
    mtvec = 0x305,

    // Machine trap handling
    mscratch = 0x340,
    mepc = 0x341,
    mcause = 0x342,
    mtval = 0x343,
    mip = 0x344,

    // Machine counters
    mcycle = 0xB00,
    minstret = 0xB02,

    // Unprivileged counters
    cycle = 0xC00,
    instret = 0xC02,
}

impl CSRegister {
    /// Parse a 12-bit CSR address from an instruction's immediate field.
    pub const fn try_parse(address: u64) -> Option<CSRegister> {
        use CSRegister::*;
        let reg = match address {
            0x100 => sstatus,
            0x104 => sie,
            0x105 => stvec,
            0x140 => sscratch,
            0x141 => sepc,
            0x142 => scause,
            0x143 => stval,
            0x144 => sip,
            0x180 => satp,
            0xF11 => mvendorid,
            0xF12 => marchid,
            0xF13 => mimpid,
            0xF14 => mhartid,
            0x300 => mstatus,
            0x301 => misa,
            0x302 => medeleg,
            0x303 => mideleg,
            0x304 => mie,
            0x305 => mtvec,
            0x340 => mscratch,
            0x341 => mepc,
            0x342 => mcause,
            0x343 => mtval,
            0x344 => mip,
            0xB00 => mcycle,
            0xB02 => minstret,
            0xC00 => cycle,
            0xC02 => instret,
            _ => return None,
        };
        Some(reg)
    }

    /// Privilege required to access this register, given by address
    /// bits `[9:8]`.
    pub fn privilege(self) -> Privilege {
        match (self as u16 >> 8) & 0b11 {
            0b00 => Privilege::Unprivileged,
            0b01 => Privilege::Supervisor,
            _ => Privilege::Machine,
        }
    }

    /// Registers whose address bits `[11:10]` are `0b11` are read-only.
    pub fn is_read_only(self) -> bool {
        (self as u16 >> 10) & 0b11 == 0b11
    }
}

/// Exception codes that may be delegated to S-mode. Environment calls
/// from M-mode are always handled in M-mode.
const MEDELEG_MASK: u64 = (1 << 0)
    | (1 << 1)
    | (1 << 2)
    | (1 << 3)
    | (1 << 5)
    | (1 << 7)
    | (1 << 8)
    | (1 << 9)
    | (1 << 12)
    | (1 << 13)
    | (1 << 15);

/// Writable interrupt-pending bits, from M-mode.
const MIP_WRITE_MASK: u64 = (1 << Interrupt::SUPERVISOR_SOFTWARE_EXCEPTION_CODE)
    | (1 << Interrupt::SUPERVISOR_TIMER_EXCEPTION_CODE)
    | (1 << Interrupt::SUPERVISOR_EXTERNAL_EXCEPTION_CODE);

const MIE_WRITE_MASK: u64 = Interrupt::SUPERVISOR_BIT_MASK | Interrupt::MACHINE_BIT_MASK;

/// The control and state register file
#[derive(Clone, Debug)]
pub struct CSRegisters<X: Xlen> {
    maximal_extensions: Extensions,
    extensions: Extensions,

    mstatus: MStatus,
    medeleg: u64,
    mideleg: u64,
    mie: u64,
    mip: u64,
    mcycle: u64,
    minstret: u64,

    mtvec: XValue<X>,
    mscratch: XValue<X>,
    mepc: XValue<X>,
    mcause: XValue<X>,
    mtval: XValue<X>,

    stvec: XValue<X>,
    sscratch: XValue<X>,
    sepc: XValue<X>,
    scause: XValue<X>,
    stval: XValue<X>,

    satp: XValue<X>,
}

impl<X: Xlen> CSRegisters<X> {
    pub fn new(maximal_extensions: Extensions) -> Self {
        let mut csregisters = CSRegisters {
            maximal_extensions,
            extensions: maximal_extensions,
            mstatus: MStatus::default(),
            medeleg: 0,
            mideleg: 0,
            mie: 0,
            mip: 0,
            mcycle: 0,
            minstret: 0,
            mtvec: X::ZERO,
            mscratch: X::ZERO,
            mepc: X::ZERO,
            mcause: X::ZERO,
            mtval: X::ZERO,
            stvec: X::ZERO,
            sscratch: X::ZERO,
            sepc: X::ZERO,
            scause: X::ZERO,
            stval: X::ZERO,
            satp: X::ZERO,
        };
        csregisters.reset();
        csregisters
    }

    /// Reset the register file to its architectural reset state.
    pub fn reset(&mut self) {
        self.extensions = self.maximal_extensions;
        self.mstatus = MStatus::default()
            .with_uxl(XLenValue::from(X::MODE))
            .with_sxl(XLenValue::from(X::MODE));
        self.medeleg = 0;
        self.mideleg = 0;
        self.mie = 0;
        self.mip = 0;
        self.mcycle = 0;
        self.minstret = 0;
        self.mtvec = X::ZERO;
        self.mscratch = X::ZERO;
        self.mepc = X::ZERO;
        self.mcause = X::ZERO;
        self.mtval = X::ZERO;
        self.stvec = X::ZERO;
        self.sscratch = X::ZERO;
        self.sepc = X::ZERO;
        self.scause = X::ZERO;
        self.stval = X::ZERO;
        self.satp = X::ZERO;
    }

    /// Read a CSR.
    pub fn read(&self, reg: CSRegister) -> XValue<X> {
        use CSRegister::*;
        match reg {
            mstatus => X::from_u64(self.mstatus.to_bits()),
            sstatus => X::from_u64(self.mstatus.to_sstatus().to_bits()),
            misa => self::misa::misa_value::<X>(self.extensions),
            medeleg => X::from_u64(self.medeleg),
            mideleg => X::from_u64(self.mideleg),
            mie => X::from_u64(self.mie),
            mip => X::from_u64(self.mip),
            sie => X::from_u64(self.mie & self.mideleg),
            sip => X::from_u64(self.mip & self.mideleg),
            mtvec => self.mtvec,
            stvec => self.stvec,
            mscratch => self.mscratch,
            sscratch => self.sscratch,
            mepc => self.mepc,
            sepc => self.sepc,
            mcause => self.mcause,
            scause => self.scause,
            mtval => self.mtval,
            stval => self.stval,
            satp => self.satp,
            mcycle | cycle => X::from_u64(self.mcycle),
            minstret | instret => X::from_u64(self.minstret),
            mvendorid | marchid | mimpid | mhartid => X::ZERO,
        }
    }

    /// Write a CSR, applying the WARL rules, and report the side effects
    /// the caches need to observe.
    pub fn write(&mut self, reg: CSRegister, value: XValue<X>) -> EventSet {
        use CSRegister::*;

        let mut events = EventSet::empty();
        let value64 = X::to_u64(value);

        match reg {
            mstatus => {
                let old = self.mstatus;
                self.mstatus = self.normalise_mstatus(MStatus::from_bits(value64));
                events |= Self::mstatus_events(old, self.mstatus);
            }
            sstatus => {
                let old = self.mstatus;
                let folded = SStatus::from_bits(value64).to_mstatus(old);
                self.mstatus = self.normalise_mstatus(folded);
                events |= Self::mstatus_events(old, self.mstatus);
            }
            misa => {
                let next = self::misa::normalise_write(
                    self.maximal_extensions,
                    self.extensions,
                    value64 as u32,
                );
                if next != self.extensions {
                    self.extensions = next;
                    events |= EventSet::CHANGED_MISA;
                }
            }
            medeleg => self.medeleg = value64 & MEDELEG_MASK,
            mideleg => self.mideleg = value64 & Interrupt::SUPERVISOR_BIT_MASK,
            mie => self.mie = value64 & MIE_WRITE_MASK,
            mip => {
                self.mip = (self.mip & !MIP_WRITE_MASK) | (value64 & MIP_WRITE_MASK);
            }
            sie => {
                let mask = self.mideleg;
                self.mie = (self.mie & !mask) | (value64 & mask & MIE_WRITE_MASK);
            }
            sip => {
                let mask = self.mideleg & (1 << Interrupt::SUPERVISOR_SOFTWARE_EXCEPTION_CODE);
                self.mip = (self.mip & !mask) | (value64 & mask);
            }
            mtvec => self.mtvec = Self::normalise_xtvec(value),
            stvec => self.stvec = Self::normalise_xtvec(value),
            mscratch => self.mscratch = value,
            sscratch => self.sscratch = value,
            mepc => self.mepc = Self::normalise_xepc(value),
            sepc => self.sepc = Self::normalise_xepc(value),
            mcause => self.mcause = value,
            scause => self.scause = value,
            mtval => self.mtval = value,
            stval => self.stval = value,
            satp => {
                self.satp = Satp::normalise_write::<X>(value);
                // Any satp write invalidates cached translations.
                events |= EventSet::CHANGED_SATP;
            }
            mcycle => self.mcycle = value64,
            minstret => self.minstret = value64,
            // Read-only registers are rejected before this point.
            cycle | instret | mvendorid | marchid | mimpid | mhartid => {}
        }

        events
    }

    fn normalise_mstatus(&self, mstatus: MStatus) -> MStatus {
        // UXL/SXL are WARL and can never exceed the machine width.
        let clamp = |xl: XLenValue| {
            if xl.mode() > X::MODE {
                XLenValue::from(X::MODE)
            } else {
                xl
            }
        };
        let mstatus = mstatus
            .with_uxl(clamp(mstatus.uxl()))
            .with_sxl(clamp(mstatus.sxl()));

        // Without U-mode, MPRV and the U-related fields are hardwired.
        if !self.extensions.contains(Extensions::U) {
            mstatus.with_mprv(false)
        } else {
            mstatus
        }
    }

    fn mstatus_events(old: MStatus, new: MStatus) -> EventSet {
        let changed = old.to_bits() ^ new.to_bits();
        let xl_mask = (0b11 << MStatus::UXL_OFFSET) | (0b11 << MStatus::SXL_OFFSET);
        if changed & (MStatus::TRANSLATION_BITS | xl_mask) != 0 {
            EventSet::CHANGED_MSTATUS
        } else {
            EventSet::empty()
        }
    }

    fn normalise_xtvec(value: XValue<X>) -> XValue<X> {
        // MODE values >= 2 are reserved; fall back to direct.
        let mode = X::to_u64(value) & 0b11;
        let base = value & !X::from_u64(0b11);
        if mode < 2 {
            base | X::from_u64(mode)
        } else {
            base
        }
    }

    fn normalise_xepc(value: XValue<X>) -> XValue<X> {
        // xepc[0] is always zero; with the C extension the second bit is
        // masked on use, not on write.
        value & !X::from_u64(1)
    }

    /// Currently enabled extensions (the MISA letter bits).
    pub fn extensions(&self) -> Extensions {
        self.extensions
    }

    /// The maximal extension set fixed at construction.
    pub fn maximal_extensions(&self) -> Extensions {
        self.maximal_extensions
    }

    /// Typed view of `mstatus`.
    pub fn mstatus(&self) -> MStatus {
        self.mstatus
    }

    /// Replace `mstatus` without going through the WARL write path. Used
    /// by the trap machinery, which writes architecturally valid values.
    pub fn set_mstatus(&mut self, mstatus: MStatus) {
        self.mstatus = mstatus;
    }

    /// Decoded view of `satp`.
    pub fn satp(&self) -> Satp {
        Satp::from_raw::<X>(self.satp)
    }

    /// Raw `satp` bits.
    pub fn satp_raw(&self) -> XValue<X> {
        self.satp
    }

    /// Set an interrupt-pending bit on behalf of an external device.
    pub fn set_interrupt_pending(&mut self, interrupt: Interrupt) {
        self.mip |= 1 << interrupt.exception_code_const();
    }

    /// Clear an interrupt-pending bit on behalf of an external device.
    pub fn clear_interrupt_pending(&mut self, interrupt: Interrupt) {
        self.mip &= !(1 << interrupt.exception_code_const());
    }

    /// Account for `n` retired instructions.
    pub fn increment_counters(&mut self, n: u64) {
        self.mcycle = self.mcycle.wrapping_add(n);
        self.minstret = self.minstret.wrapping_add(n);
    }

    /// Determine which mode a trap is handled in: S-mode when the cause is
    /// delegated and we are not already in M-mode, M-mode otherwise.
    pub fn get_trap_mode<TC: TrapContext<X>>(&self, trap: &TC, current_mode: Mode) -> TrapMode {
        let deleg = match TC::kind() {
            TrapKind::Exception => self.medeleg,
            TrapKind::Interrupt => self.mideleg,
        };

        if current_mode < Mode::Machine && deleg & (1 << trap.exception_code()) != 0 {
            TrapMode::Supervisor
        } else {
            TrapMode::Machine
        }
    }

    /// Interrupt bits that are pending, enabled and would be taken from
    /// the given mode. Machine-level interrupts take precedence over
    /// supervisor-level ones.
    pub fn pending_interrupt_mask(&self, current_mode: Mode) -> u64 {
        let pending = self.mip & self.mie;
        if pending == 0 {
            return 0;
        }

        let m_enabled = match current_mode {
            Mode::Machine => self.mstatus.mie(),
            _ => true,
        };
        let m_pending = pending & !self.mideleg;
        if m_enabled && m_pending != 0 {
            return m_pending;
        }

        let s_enabled = match current_mode {
            Mode::Machine => false,
            Mode::Supervisor => self.mstatus.sie(),
            Mode::User => true,
        };
        if s_enabled {
            pending & self.mideleg
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xlen::Rv64;

    fn csrs() -> CSRegisters<Rv64> {
        CSRegisters::new(Extensions::from_letters("imacsu"))
    }

    #[test]
    fn csr_privileges_follow_address_bits() {
        assert_eq!(CSRegister::sstatus.privilege(), Privilege::Supervisor);
        assert_eq!(CSRegister::mstatus.privilege(), Privilege::Machine);
        assert_eq!(CSRegister::cycle.privilege(), Privilege::Unprivileged);
        assert!(CSRegister::mvendorid.is_read_only());
        assert!(CSRegister::cycle.is_read_only());
        assert!(!CSRegister::mstatus.is_read_only());
    }

    #[test]
    fn satp_write_reports_event() {
        let mut csrs = csrs();
        let events = csrs.write(CSRegister::satp, (8u64 << 60) | 0x1234);
        assert!(events.contains(EventSet::CHANGED_SATP));
        assert_eq!(csrs.satp().ppn, 0x1234);
    }

    #[test]
    fn mstatus_translation_bits_report_event() {
        let mut csrs = csrs();

        let mstatus = csrs.mstatus().with_sum(true);
        let events = csrs.write(CSRegister::mstatus, mstatus.to_bits());
        assert!(events.contains(EventSet::CHANGED_MSTATUS));

        // Toggling only an interrupt-enable bit is not a translation event
        let mstatus = csrs.mstatus().with_mie(true);
        let events = csrs.write(CSRegister::mstatus, mstatus.to_bits());
        assert!(!events.contains(EventSet::CHANGED_MSTATUS));
    }

    #[test]
    fn sstatus_writes_fold_into_mstatus() {
        let mut csrs = csrs();
        let sstatus = SStatus::default().with_sie(true).with_sum(true);
        csrs.write(CSRegister::sstatus, sstatus.to_bits());
        assert!(csrs.mstatus().sie());
        assert!(csrs.mstatus().sum());
        assert!(!csrs.mstatus().mie());
    }

    #[test]
    fn sie_sip_are_masked_by_mideleg() {
        let mut csrs = csrs();
        csrs.write(CSRegister::mideleg, Interrupt::SUPERVISOR_BIT_MASK);
        csrs.write(CSRegister::mie, !0u64);
        let sie: u64 = csrs.read(CSRegister::sie);
        assert_eq!(sie, Interrupt::SUPERVISOR_BIT_MASK);

        csrs.write(CSRegister::mideleg, 0);
        let sie: u64 = csrs.read(CSRegister::sie);
        assert_eq!(sie, 0);
    }

    #[test]
    fn delegation_controls_trap_mode() {
        use crate::traps::Exception;

        let mut csrs = csrs();
        let exc = Exception::<Rv64>::IllegalInstruction(0);

        assert_eq!(csrs.get_trap_mode(&exc, Mode::User), TrapMode::Machine);

        csrs.write(CSRegister::medeleg, 1 << 2);
        assert_eq!(csrs.get_trap_mode(&exc, Mode::User), TrapMode::Supervisor);
        assert_eq!(csrs.get_trap_mode(&exc, Mode::Supervisor), TrapMode::Supervisor);
        // M-mode never delegates downwards
        assert_eq!(csrs.get_trap_mode(&exc, Mode::Machine), TrapMode::Machine);
    }

    #[test]
    fn machine_interrupts_preempt_supervisor_ones() {
        let mut csrs = csrs();
        csrs.write(CSRegister::mie, MIE_WRITE_MASK);
        csrs.write(CSRegister::mideleg, Interrupt::SUPERVISOR_BIT_MASK);
        csrs.set_interrupt_pending(Interrupt::MachineTimer);
        csrs.set_interrupt_pending(Interrupt::SupervisorSoftware);

        // From U-mode both levels are enabled; the machine group wins.
        let mask = csrs.pending_interrupt_mask(Mode::User);
        assert_eq!(mask, 1 << Interrupt::MACHINE_TIMER_EXCEPTION_CODE);

        // In M-mode with MIE=0 nothing is deliverable.
        assert_eq!(csrs.pending_interrupt_mask(Mode::Machine), 0);
    }

    #[test]
    fn epc_is_two_byte_aligned() {
        let mut csrs = csrs();
        csrs.write(CSRegister::mepc, 0x1003u64);
        let mepc: u64 = csrs.read(CSRegister::mepc);
        assert_eq!(mepc, 0x1002);
    }
}
