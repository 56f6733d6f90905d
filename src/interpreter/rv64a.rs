// SPDX-License-Identifier: MIT

//! Double-word atomics: LR.D, SC.D and the AMO*.D family.

use crate::machine_state::address_translation::AccessType;
use crate::machine_state::MachineCoreState;
use crate::parser::instruction::AmoArgs;
use crate::traps::Exception;
use crate::xlen::Xlen;

impl<X: Xlen> MachineCoreState<X> {
    /// Relevant RISC-V opcodes: `LR.D`
    pub fn run_lrd(&mut self, args: &AmoArgs) -> Result<(), Exception<X>> {
        let addr = self.hart.xregisters.read(args.rs1);
        if X::to_u64(addr) & 7 != 0 {
            return Err(Exception::LoadAddressMisaligned(addr));
        }

        let bytes: [u8; 8] = self.load_bytes(addr)?;
        self.hart.reservation_set.begin(addr);
        let value = i64::from_le_bytes(bytes);
        self.hart.xregisters.write(args.rd, X::from_i64(value));
        Ok(())
    }

    /// Relevant RISC-V opcodes: `SC.D`
    pub fn run_scd(&mut self, args: &AmoArgs) -> Result<(), Exception<X>> {
        let addr = self.hart.xregisters.read(args.rs1);
        if X::to_u64(addr) & 7 != 0 {
            return Err(Exception::StoreAMOAddressMisaligned(addr));
        }

        if self.hart.reservation_set.take(addr) {
            let value = X::to_u64(self.hart.xregisters.read(args.rs2));
            self.store_bytes(addr, value.to_le_bytes())?;
            self.hart.xregisters.write(args.rd, X::ZERO);
        } else {
            self.hart.xregisters.write(args.rd, X::from_u64(1));
        }
        Ok(())
    }

    /// Shared skeleton of the AMO*.D family.
    pub fn run_amo_d(
        &mut self,
        args: &AmoArgs,
        f: fn(i64, i64) -> i64,
    ) -> Result<(), Exception<X>> {
        let addr = self.hart.xregisters.read(args.rs1);
        if X::to_u64(addr) & 7 != 0 {
            return Err(Exception::StoreAMOAddressMisaligned(addr));
        }

        let translation = self.translate(addr, AccessType::Store)?;

        let mut buf = [0u8; 8];
        if self.bus.read(translation.phys, &mut buf) != 8 {
            return Err(Exception::StoreAMOAccessFault(addr));
        }
        let old = i64::from_le_bytes(buf);

        let operand = X::to_u64(self.hart.xregisters.read(args.rs2)) as i64;
        let new = f(old, operand);
        if self.bus.write(translation.phys, &new.to_le_bytes()) != 8 {
            return Err(Exception::StoreAMOAccessFault(addr));
        }

        self.hart.xregisters.write(args.rd, X::from_i64(old));
        Ok(())
    }
}
