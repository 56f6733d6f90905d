// SPDX-License-Identifier: MIT

use strum::EnumIter;

/// Modes the hart can be in when running code
#[derive(Debug, PartialEq, PartialOrd, Eq, Copy, Clone, Hash, EnumIter)]
#[repr(u8)]
pub enum Mode {
    User = 0b00,
    Supervisor = 0b01,
    Machine = 0b11,
}

impl From<u8> for Mode {
    #[inline]
    fn from(value: u8) -> Self {
        match value {
            0 => Mode::User,
            1 => Mode::Supervisor,
            _ => Mode::Machine,
        }
    }
}

impl Default for Mode {
    #[inline]
    fn default() -> Self {
        Self::Machine
    }
}

impl From<Mode> for u8 {
    #[inline]
    fn from(value: Mode) -> Self {
        value as u8
    }
}

/// Modes the hart can trap into, a sub-enum of [`Mode`]
#[derive(Debug, PartialEq, PartialOrd, Eq, Copy, Clone, EnumIter)]
#[repr(u8)]
pub enum TrapMode {
    Supervisor = Mode::Supervisor as u8,
    Machine = Mode::Machine as u8,
}

impl TrapMode {
    /// Construct the mode corresponding to the trap mode.
    pub fn as_mode(&self) -> Mode {
        match self {
            Self::Supervisor => Mode::Supervisor,
            Self::Machine => Mode::Machine,
        }
    }
}
