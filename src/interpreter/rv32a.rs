// SPDX-License-Identifier: MIT

//! Word-sized atomics: LR.W, SC.W and the AMO*.W family.
//!
//! AMOs require natural alignment and take their permissions from the
//! store path — an AMO to a read-only page is a store fault even though
//! it reads. LR takes load permissions, SC store permissions.

use crate::machine_state::address_translation::AccessType;
use crate::machine_state::MachineCoreState;
use crate::parser::instruction::AmoArgs;
use crate::traps::Exception;
use crate::xlen::XValue;
use crate::xlen::Xlen;

impl<X: Xlen> MachineCoreState<X> {
    fn amo_aligned(addr: XValue<X>, size: u64) -> bool {
        X::to_u64(addr) & (size - 1) == 0
    }

    /// Relevant RISC-V opcodes: `LR.W`
    pub fn run_lrw(&mut self, args: &AmoArgs) -> Result<(), Exception<X>> {
        let addr = self.hart.xregisters.read(args.rs1);
        if !Self::amo_aligned(addr, 4) {
            return Err(Exception::LoadAddressMisaligned(addr));
        }

        let bytes: [u8; 4] = self.load_bytes(addr)?;
        self.hart.reservation_set.begin(addr);
        let value = i32::from_le_bytes(bytes);
        self.hart.xregisters.write(args.rd, X::from_i64(value as i64));
        Ok(())
    }

    /// Relevant RISC-V opcodes: `SC.W`
    pub fn run_scw(&mut self, args: &AmoArgs) -> Result<(), Exception<X>> {
        let addr = self.hart.xregisters.read(args.rs1);
        if !Self::amo_aligned(addr, 4) {
            return Err(Exception::StoreAMOAddressMisaligned(addr));
        }

        if self.hart.reservation_set.take(addr) {
            let value = X::to_u64(self.hart.xregisters.read(args.rs2)) as u32;
            self.store_bytes(addr, value.to_le_bytes())?;
            self.hart.xregisters.write(args.rd, X::ZERO);
        } else {
            self.hart.xregisters.write(args.rd, X::from_u64(1));
        }
        Ok(())
    }

    /// Shared skeleton of the AMO*.W family: read-modify-write of one
    /// aligned word, with the old value landing in `rd`.
    pub fn run_amo_w(
        &mut self,
        args: &AmoArgs,
        f: fn(i32, i32) -> i32,
    ) -> Result<(), Exception<X>> {
        let addr = self.hart.xregisters.read(args.rs1);
        if !Self::amo_aligned(addr, 4) {
            return Err(Exception::StoreAMOAddressMisaligned(addr));
        }

        // One translation covers both halves of the read-modify-write:
        // an aligned word never crosses a page.
        let translation = self.translate(addr, AccessType::Store)?;

        let mut buf = [0u8; 4];
        if self.bus.read(translation.phys, &mut buf) != 4 {
            return Err(Exception::StoreAMOAccessFault(addr));
        }
        let old = i32::from_le_bytes(buf);

        let operand = X::to_u64(self.hart.xregisters.read(args.rs2)) as u32 as i32;
        let new = f(old, operand);
        if self.bus.write(translation.phys, &new.to_le_bytes()) != 4 {
            return Err(Exception::StoreAMOAccessFault(addr));
        }

        self.hart.xregisters.write(args.rd, X::from_i64(old as i64));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::bus::MainMemory;
    use crate::machine_state::csregisters::misa::Extensions;
    use crate::machine_state::registers::{t0, t1, t2};
    use crate::machine_state::MachineCoreState;
    use crate::parser::instruction::AmoArgs;
    use crate::traps::Exception;
    use crate::xlen::Rv64;

    fn core() -> MachineCoreState<Rv64> {
        let bus = Arc::new(MainMemory::<Rv64>::new(0, 0x1_0000));
        let mut core = MachineCoreState::new(
            Extensions::from_letters("imacsu"),
            bus,
            None,
            0,
            true,
        );
        core.reset(0);
        core
    }

    fn args() -> AmoArgs {
        AmoArgs {
            rd: t2,
            rs1: t0,
            rs2: t1,
            aq: false,
            rl: false,
        }
    }

    #[test]
    fn lr_sc_pair_succeeds() {
        let mut core = core();
        core.bus.write(0x100, &42u32.to_le_bytes());
        core.hart.xregisters.write(t0, 0x100);
        core.hart.xregisters.write(t1, 77);

        core.run_lrw(&args()).unwrap();
        assert_eq!(core.hart.xregisters.read(t2), 42);

        core.run_scw(&args()).unwrap();
        assert_eq!(core.hart.xregisters.read(t2), 0);

        let mut read_back = [0u8; 4];
        core.bus.read(0x100, &mut read_back);
        assert_eq!(u32::from_le_bytes(read_back), 77);
    }

    #[test]
    fn sc_without_reservation_fails() {
        let mut core = core();
        core.hart.xregisters.write(t0, 0x100);
        core.hart.xregisters.write(t1, 77);

        core.run_scw(&args()).unwrap();
        assert_eq!(core.hart.xregisters.read(t2), 1);

        let mut read_back = [0u8; 4];
        core.bus.read(0x100, &mut read_back);
        assert_eq!(u32::from_le_bytes(read_back), 0);
    }

    #[test]
    fn amoadd_returns_old_value() {
        let mut core = core();
        core.bus.write(0x200, &5u32.to_le_bytes());
        core.hart.xregisters.write(t0, 0x200);
        core.hart.xregisters.write(t1, 3);

        core.run_amo_w(&args(), |old, new| old.wrapping_add(new)).unwrap();
        assert_eq!(core.hart.xregisters.read(t2), 5);

        let mut read_back = [0u8; 4];
        core.bus.read(0x200, &mut read_back);
        assert_eq!(u32::from_le_bytes(read_back), 8);
    }

    #[test]
    fn misaligned_amo_faults() {
        let mut core = core();
        core.hart.xregisters.write(t0, 0x102);
        assert_eq!(
            core.run_amo_w(&args(), |old, _| old),
            Err(Exception::StoreAMOAddressMisaligned(0x102))
        );
        assert_eq!(
            core.run_lrw(&args()),
            Err(Exception::LoadAddressMisaligned(0x102))
        );
    }
}
