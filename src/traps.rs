// SPDX-License-Identifier: MIT

//! Architectural traps.
//!
//! Exceptions (synchronous) and interrupts (asynchronous) are first-class
//! values threaded through the fetch/execute path as `Result` errors and
//! consumed by the trap-taking machinery on the hart state. They are never
//! surfaced to the host as errors.

use std::fmt;
use std::fmt::Formatter;

use crate::machine_state::mode::Mode;
use crate::xlen::XValue;
use crate::xlen::Xlen;

/// RISC-V exceptions (also known as synchronous exceptions)
#[derive(PartialEq, Eq, thiserror::Error, Clone, Copy)]
pub enum Exception<X: Xlen> {
    /// `InstructionAddressMisaligned(addr)` where `addr` is the misaligned target
    InstructionAddressMisaligned(XValue<X>),
    /// `InstructionAccessFault(addr)` where `addr` is the faulting instruction address
    InstructionAccessFault(XValue<X>),
    /// `IllegalInstruction(instr)` where `instr` is the offending encoding
    IllegalInstruction(u32),
    /// `Breakpoint(addr)` where `addr` is the address of the `EBREAK`
    Breakpoint(XValue<X>),
    /// `LoadAddressMisaligned(addr)`: misaligned LR
    LoadAddressMisaligned(XValue<X>),
    /// `LoadAccessFault(addr)` where `addr` is the faulting load address
    LoadAccessFault(XValue<X>),
    /// `StoreAMOAddressMisaligned(addr)`: misaligned SC or AMO
    StoreAMOAddressMisaligned(XValue<X>),
    /// `StoreAMOAccessFault(addr)` where `addr` is the faulting store address
    StoreAMOAccessFault(XValue<X>),
    EnvCallFromU,
    EnvCallFromS,
    EnvCallFromM,
    InstructionPageFault(XValue<X>),
    LoadPageFault(XValue<X>),
    StoreAMOPageFault(XValue<X>),
}

impl<X: Xlen> Exception<X> {
    /// Environment call from the given mode.
    pub fn env_call(mode: Mode) -> Self {
        match mode {
            Mode::User => Exception::EnvCallFromU,
            Mode::Supervisor => Exception::EnvCallFromS,
            Mode::Machine => Exception::EnvCallFromM,
        }
    }
}

impl<X: Xlen> fmt::Display for Exception<X> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl<X: Xlen> fmt::Debug for Exception<X> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::InstructionAddressMisaligned(adr) => {
                write!(f, "InstructionAddressMisaligned({adr:#X})")
            }
            Self::InstructionAccessFault(adr) => write!(f, "InstructionAccessFault({adr:#X})"),
            Self::IllegalInstruction(instr) => write!(f, "IllegalInstruction({instr:#010x})"),
            Self::Breakpoint(adr) => write!(f, "Breakpoint({adr:#X})"),
            Self::LoadAddressMisaligned(adr) => write!(f, "LoadAddressMisaligned({adr:#X})"),
            Self::LoadAccessFault(adr) => write!(f, "LoadAccessFault({adr:#X})"),
            Self::StoreAMOAddressMisaligned(adr) => {
                write!(f, "StoreAMOAddressMisaligned({adr:#X})")
            }
            Self::StoreAMOAccessFault(adr) => write!(f, "StoreAMOAccessFault({adr:#X})"),
            Self::EnvCallFromU => write!(f, "EnvCallFromU"),
            Self::EnvCallFromS => write!(f, "EnvCallFromS"),
            Self::EnvCallFromM => write!(f, "EnvCallFromM"),
            Self::InstructionPageFault(adr) => write!(f, "InstructionPageFault({adr:#X})"),
            Self::LoadPageFault(adr) => write!(f, "LoadPageFault({adr:#X})"),
            Self::StoreAMOPageFault(adr) => write!(f, "StoreAMOPageFault({adr:#X})"),
        }
    }
}

/// RISC-V interrupts (also known as asynchronous exceptions)
#[derive(PartialEq, Eq, thiserror::Error, strum::Display, Debug, Copy, Clone)]
pub enum Interrupt {
    SupervisorSoftware,
    MachineSoftware,
    SupervisorTimer,
    MachineTimer,
    SupervisorExternal,
    MachineExternal,
}

impl Interrupt {
    pub const SUPERVISOR_SOFTWARE_EXCEPTION_CODE: u64 = 1;
    pub const MACHINE_SOFTWARE_EXCEPTION_CODE: u64 = 3;
    pub const SUPERVISOR_TIMER_EXCEPTION_CODE: u64 = 5;
    pub const MACHINE_TIMER_EXCEPTION_CODE: u64 = 7;
    pub const SUPERVISOR_EXTERNAL_EXCEPTION_CODE: u64 = 9;
    pub const MACHINE_EXTERNAL_EXCEPTION_CODE: u64 = 11;

    /// Bitmask of all supervisor interrupts
    pub const SUPERVISOR_BIT_MASK: u64 = (1 << Self::SUPERVISOR_SOFTWARE_EXCEPTION_CODE)
        | (1 << Self::SUPERVISOR_TIMER_EXCEPTION_CODE)
        | (1 << Self::SUPERVISOR_EXTERNAL_EXCEPTION_CODE);

    /// Bitmask of all machine interrupts
    pub const MACHINE_BIT_MASK: u64 = (1 << Self::MACHINE_SOFTWARE_EXCEPTION_CODE)
        | (1 << Self::MACHINE_TIMER_EXCEPTION_CODE)
        | (1 << Self::MACHINE_EXTERNAL_EXCEPTION_CODE);

    /// Exception code of the interrupt
    pub const fn exception_code_const(&self) -> u64 {
        match self {
            Interrupt::SupervisorSoftware => Self::SUPERVISOR_SOFTWARE_EXCEPTION_CODE,
            Interrupt::MachineSoftware => Self::MACHINE_SOFTWARE_EXCEPTION_CODE,
            Interrupt::SupervisorTimer => Self::SUPERVISOR_TIMER_EXCEPTION_CODE,
            Interrupt::MachineTimer => Self::MACHINE_TIMER_EXCEPTION_CODE,
            Interrupt::SupervisorExternal => Self::SUPERVISOR_EXTERNAL_EXCEPTION_CODE,
            Interrupt::MachineExternal => Self::MACHINE_EXTERNAL_EXCEPTION_CODE,
        }
    }
}

/// Flavour of the trap cause
pub enum TrapKind {
    Interrupt,
    Exception,
}

/// Common trait for [`Exception`] & [`Interrupt`] traps used in the context of trap handling
pub trait TrapContext<X: Xlen> {
    /// Trap value to be stored in the `xtval` register when taking the trap.
    fn xtval(&self) -> XValue<X>;

    /// Code of the trap (exception / interrupt), also known as cause.
    /// NOTE: this value does NOT include the interrupt bit.
    fn exception_code(&self) -> u64;

    /// `xcause` value, i.e. what is written to the `xcause` register.
    /// NOTE: this value DOES include the interrupt bit.
    fn xcause(&self) -> XValue<X>;

    /// Computes the address the pc is set to when entering the trap.
    fn trap_handler_address(&self, xtvec_val: XValue<X>) -> XValue<X>;

    /// Obtain the kind that would cause this trap.
    fn kind() -> TrapKind;
}

impl<X: Xlen> TrapContext<X> for Exception<X> {
    fn exception_code(&self) -> u64 {
        match self {
            Exception::InstructionAddressMisaligned(_) => 0,
            Exception::InstructionAccessFault(_) => 1,
            Exception::IllegalInstruction(_) => 2,
            Exception::Breakpoint(_) => 3,
            Exception::LoadAddressMisaligned(_) => 4,
            Exception::LoadAccessFault(_) => 5,
            Exception::StoreAMOAddressMisaligned(_) => 6,
            Exception::StoreAMOAccessFault(_) => 7,
            Exception::EnvCallFromU => 8,
            Exception::EnvCallFromS => 9,
            Exception::EnvCallFromM => 11,
            Exception::InstructionPageFault(_) => 12,
            Exception::LoadPageFault(_) => 13,
            Exception::StoreAMOPageFault(_) => 15,
        }
    }

    fn xcause(&self) -> XValue<X> {
        X::from_u64(TrapContext::<X>::exception_code(self))
    }

    fn xtval(&self) -> XValue<X> {
        match self {
            Exception::EnvCallFromU | Exception::EnvCallFromS | Exception::EnvCallFromM => X::ZERO,
            Exception::IllegalInstruction(instr) => X::from_u64(*instr as u64),
            Exception::InstructionAddressMisaligned(addr)
            | Exception::InstructionAccessFault(addr)
            | Exception::Breakpoint(addr)
            | Exception::LoadAddressMisaligned(addr)
            | Exception::LoadAccessFault(addr)
            | Exception::StoreAMOAddressMisaligned(addr)
            | Exception::StoreAMOAccessFault(addr)
            | Exception::InstructionPageFault(addr)
            | Exception::LoadPageFault(addr)
            | Exception::StoreAMOPageFault(addr) => *addr,
        }
    }

    fn trap_handler_address(&self, xtvec_val: XValue<X>) -> XValue<X> {
        // MODE = xtvec[1:0], BASE[xLEN-1:2] = xtvec[xLEN-1:2].
        // Exceptions always dispatch to BASE, even in vectored mode.
        xtvec_val & !X::from_u64(0b11)
    }

    fn kind() -> TrapKind {
        TrapKind::Exception
    }
}

impl<X: Xlen> TrapContext<X> for Interrupt {
    fn xtval(&self) -> XValue<X> {
        X::ZERO
    }

    fn exception_code(&self) -> u64 {
        self.exception_code_const()
    }

    fn xcause(&self) -> XValue<X> {
        let interrupt_bit = X::from_u64(1) << (X::BITS - 1);
        interrupt_bit | X::from_u64(self.exception_code_const())
    }

    fn trap_handler_address(&self, xtvec_val: XValue<X>) -> XValue<X> {
        let xtvec_mode = X::to_u64(xtvec_val & X::from_u64(0b11));
        let xtvec_base = xtvec_val & !X::from_u64(0b11);
        let handler_offset = match xtvec_mode {
            // Vectored mode
            1 => 4 * self.exception_code_const(),
            // Direct or reserved mode
            _ => 0,
        };

        X::wrapping_add(xtvec_base, X::from_u64(handler_offset))
    }

    fn kind() -> TrapKind {
        TrapKind::Interrupt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xlen::Rv32;
    use crate::xlen::Rv64;

    #[test]
    fn exception_codes() {
        assert_eq!(
            TrapContext::<Rv64>::exception_code(&Exception::<Rv64>::EnvCallFromU),
            8
        );
        assert_eq!(
            TrapContext::<Rv64>::exception_code(&Exception::<Rv64>::StoreAMOPageFault(0)),
            15
        );
    }

    #[test]
    fn interrupt_cause_has_top_bit() {
        let cause: u64 = TrapContext::<Rv64>::xcause(&Interrupt::MachineTimer);
        assert_eq!(cause, (1 << 63) | 7);

        let cause: u32 = TrapContext::<Rv32>::xcause(&Interrupt::SupervisorExternal);
        assert_eq!(cause, (1 << 31) | 9);
    }

    #[test]
    fn vectored_dispatch_offsets_interrupts_only() {
        let base = 0x8000_0000u64;
        // Vectored mode: interrupts are offset by 4 * code
        let handler =
            TrapContext::<Rv64>::trap_handler_address(&Interrupt::MachineExternal, base | 1);
        assert_eq!(handler, base + 4 * 11);

        // Exceptions ignore the MODE bits
        let exc = Exception::<Rv64>::IllegalInstruction(0);
        assert_eq!(TrapContext::<Rv64>::trap_handler_address(&exc, base | 1), base);
    }
}
