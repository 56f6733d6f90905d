// SPDX-License-Identifier: MIT

//! Direct-mapped instruction-cache driver.
//!
//! A single table of `2^bits` entries maps `(pc >> 1) mod 2^bits` to a
//! decoded instruction, tagged by the full virtual PC. Entries are
//! validated against a fence counter so the whole cache invalidates in
//! constant time: each invalidation bumps the counter and spot-clears
//! one entry, which guarantees every slot is cleared at least once
//! before the counter could wrap.

use crate::bus::SharedBus;
use crate::decoder::PrecomputedDecoder;
use crate::hart::execute_one;
use crate::hart::fetch_or_trap;
use crate::hart::finish_tick;
use crate::hart::invalidates_decode;
use crate::hart::ConfigError;
use crate::hart::HartConfig;
use crate::hart::Tickable;
use crate::log;
use crate::machine_state::hart_state::FetchSlot;
use crate::machine_state::MachineCoreState;
use crate::parser::instruction::Instr;
use crate::parser::instruction::OpCode;
use crate::parser::instruction::Operands;
use crate::xlen::XValue;
use crate::xlen::Xlen;

#[derive(Clone)]
struct Cached<X: Xlen> {
    tag_pc: XValue<X>,
    fence: u32,
    encoding: u32,
    instr: Instr,
}

impl<X: Xlen> Cached<X> {
    fn vacant() -> Self {
        Cached {
            tag_pc: X::MAX,
            fence: u32::MAX,
            encoding: 0,
            instr: Instr {
                opcode: OpCode::Unknown,
                operands: Operands::Unknown { instr: 0 },
            },
        }
    }
}

pub struct ICacheHart<X: Xlen> {
    pub core: MachineCoreState<X>,
    decoder: PrecomputedDecoder,
    entries: Vec<Cached<X>>,
    fence: u32,
    reset_vector: XValue<X>,
}

impl<X: Xlen> ICacheHart<X> {
    pub fn new(
        bus: SharedBus<X>,
        mem: Option<SharedBus<X>>,
        config: &HartConfig,
        reset_vector: XValue<X>,
    ) -> Result<Self, ConfigError> {
        let mut core = config.build_core(bus, mem)?;
        core.reset(reset_vector);

        let key = core.decode_key();
        let decoder = PrecomputedDecoder::new(key.extensions, key.mxlen, key.xlen);

        Ok(ICacheHart {
            core,
            decoder,
            entries: vec![Cached::vacant(); 1 << config.icache_bits],
            fence: 0,
            reset_vector,
        })
    }

    #[inline]
    fn index(&self, pc: XValue<X>) -> usize {
        // Instruction addresses are u16-aligned, so the lowest bit never
        // discriminates.
        (X::to_u64(pc) >> 1) as usize & (self.entries.len() - 1)
    }

    /// Invalidate the cache by bumping the fence counter, spot-clearing
    /// one entry so a wrapped counter can never revalidate stale slots.
    fn invalidate(&mut self) {
        let index = self.fence as usize & (self.entries.len() - 1);
        self.entries[index] = Cached::vacant();
        self.fence = self.fence.wrapping_add(1);
        log::trace!("instruction cache invalidated");
    }

    fn reconfigure_decoder(&mut self) {
        let key = self.core.decode_key();
        if key != self.decoder.key() {
            self.decoder.configure(key.extensions, key.mxlen, key.xlen);
        }
    }
}

impl<X: Xlen> Tickable for ICacheHart<X> {
    fn before_first_tick(&mut self) {
        self.reset();
    }

    fn tick(&mut self) -> usize {
        let pc = self.core.hart.next_pc;
        self.core.hart.pc = pc;

        let index = self.index(pc);
        let cached = &self.entries[index];

        let retired = if cached.tag_pc == pc && cached.fence == self.fence {
            // Hit: one comparison, straight to execution.
            let instr = cached.instr;
            usize::from(execute_one(&mut self.core, pc, &instr))
        } else {
            match fetch_or_trap(&mut self.core, pc) {
                Ok(encoding) => {
                    let instr = self.decoder.decode(encoding);
                    self.entries[index] = Cached {
                        tag_pc: pc,
                        fence: self.fence,
                        encoding,
                        instr,
                    };
                    self.core.hart.fetch = FetchSlot {
                        virtual_pc: pc,
                        encoding,
                        instr,
                    };

                    usize::from(execute_one(&mut self.core, pc, &instr))
                }
                Err(()) => 0,
            }
        };

        finish_tick(&mut self.core, retired);

        let events = self.core.service_events();
        if invalidates_decode(events) {
            self.invalidate();
            self.reconfigure_decoder();
        }

        retired
    }

    fn reset(&mut self) {
        self.core.reset(self.reset_vector);
        self.entries.fill(Cached::vacant());
        self.fence = 0;
        self.reconfigure_decoder();
    }
}
