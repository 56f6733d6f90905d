// SPDX-License-Identifier: MIT

//! The simplest driver: fetch, decode on demand, execute. No memoisation
//! beyond the translation cache in the core.

use crate::bus::SharedBus;
use crate::hart::execute_one;
use crate::hart::fetch_or_trap;
use crate::hart::finish_tick;
use crate::hart::ConfigError;
use crate::hart::HartConfig;
use crate::hart::Tickable;
use crate::machine_state::hart_state::FetchSlot;
use crate::machine_state::MachineCoreState;
use crate::parser::parse;
use crate::xlen::XValue;
use crate::xlen::Xlen;

pub struct SimpleHart<X: Xlen> {
    pub core: MachineCoreState<X>,
    reset_vector: XValue<X>,
}

impl<X: Xlen> SimpleHart<X> {
    pub fn new(
        bus: SharedBus<X>,
        mem: Option<SharedBus<X>>,
        config: &HartConfig,
        reset_vector: XValue<X>,
    ) -> Result<Self, ConfigError> {
        let mut core = config.build_core(bus, mem)?;
        core.reset(reset_vector);
        Ok(SimpleHart { core, reset_vector })
    }
}

impl<X: Xlen> Tickable for SimpleHart<X> {
    fn before_first_tick(&mut self) {
        self.reset();
    }

    fn tick(&mut self) -> usize {
        let core = &mut self.core;
        let pc = core.hart.next_pc;
        core.hart.pc = pc;

        let retired = match fetch_or_trap(core, pc) {
            Ok(encoding) => {
                let instr = parse(encoding, &core.decode_ctx());
                core.hart.fetch = FetchSlot {
                    virtual_pc: pc,
                    encoding,
                    instr,
                };

                usize::from(execute_one(core, pc, &instr))
            }
            Err(()) => 0,
        };

        finish_tick(core, retired);
        // The simple driver keeps no decoded state; only the translation
        // cache reacts to events, inside the core.
        let _ = core.service_events();

        retired
    }

    fn reset(&mut self) {
        self.core.reset(self.reset_vector);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bus::MainMemory;
    use crate::machine_state::csregisters::CSRegister;
    use crate::machine_state::mode::Mode;
    use crate::machine_state::registers::{x1, x2};
    use crate::xlen::Rv32;

    // addi x1, x0, 5; addi x2, x1, 7; ecall - the first seeded scenario:
    // a bare-paging 32-bit hart in U-mode.
    #[test]
    fn addi_addi_ecall() {
        let mem = Arc::new(MainMemory::<Rv32>::new(0, 0x1000));
        mem.write_u32(0, 0x0050_0093); // addi x1, x0, 5
        mem.write_u32(4, 0x0070_8113); // addi x2, x1, 7
        mem.write_u32(8, 0x0000_0073); // ecall

        let mut hart = SimpleHart::new(mem, None, &HartConfig::default(), 0u32).unwrap();
        hart.before_first_tick();
        hart.core.hart.set_mode(Mode::User);

        assert_eq!(hart.tick(), 1);
        assert_eq!(hart.tick(), 1);
        // The ecall tick takes a trap and retires nothing.
        assert_eq!(hart.tick(), 0);

        assert_eq!(hart.core.hart.xregisters.read(x1), 5);
        assert_eq!(hart.core.hart.xregisters.read(x2), 12);
        assert_eq!(hart.core.hart.mode, Mode::Machine);
        assert_eq!(hart.core.hart.csregisters.read(CSRegister::mcause), 8u32);
        assert_eq!(hart.core.hart.csregisters.read(CSRegister::mepc), 8u32);
    }
}
