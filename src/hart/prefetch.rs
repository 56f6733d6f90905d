// SPDX-License-Identifier: MIT

//! Prefetch-thread driver.
//!
//! A producer thread runs ahead of the executor, translating, fetching
//! and decoding into a bounded ring of [`FetchFrame`]s. The producer
//! works from a snapshot of the translation state and a shared handle to
//! the decode tables; it reads MMU state but never mutates architectural
//! registers.
//!
//! When control flow diverges from the prefetched sequence — the next
//! frame's PC does not match the executor's next PC — the executor
//! pauses the producer, resets its cursor to the true next PC with fresh
//! snapshots, and resumes. Frames prefetched under the old cursor are
//! discarded, and their deferred traps are never delivered: they were
//! never architecturally reached.
//!
//! A ring depth of 1 disables the worker; fetch and decode then happen
//! inline.

use std::sync::Arc;

use crate::bus::SharedBus;
use crate::decoder::DecodeTables;
use crate::decoder::PrecomputedDecoder;
use crate::hart::execute_one;
use crate::hart::fetch_or_trap;
use crate::hart::finish_tick;
use crate::hart::ConfigError;
use crate::hart::HartConfig;
use crate::hart::Tickable;
use crate::log;
use crate::machine_state::address_translation::AccessType;
use crate::machine_state::hart_state::EventSet;
use crate::machine_state::hart_state::FetchSlot;
use crate::machine_state::MachineCoreState;
use crate::machine_state::address_translation::Translator;
use crate::parser::instruction::Instr;
use crate::parser::is_compressed;
use crate::spigot::Spigot;
use crate::traps::Exception;
use crate::xlen::XValue;
use crate::xlen::Xlen;

/// One prefetched slot: the fetched encoding, its decode, and any trap
/// the fetch raised, deferred until the frame is consumed.
pub struct FetchFrame<X: Xlen> {
    pub virtual_pc: XValue<X>,
    pub encoding: u32,
    pub instr: Instr,
    pub deferred_trap: Option<Exception<X>>,
}

/// Producer-side state: the fetch-ahead cursor plus everything needed to
/// translate, fetch and decode without touching the hart.
struct FetchCursor<X: Xlen> {
    pc: XValue<X>,
    translator: Translator<X>,
    tables: Arc<DecodeTables>,
    bus: SharedBus<X>,
    fetch_target: SharedBus<X>,
    compressed_enabled: bool,
}

impl<X: Xlen> FetchCursor<X> {
    fn fetch_halfword(&self, v_addr: XValue<X>) -> Result<u16, Exception<X>> {
        let translation = self
            .translator
            .translate(self.bus.as_ref(), v_addr, AccessType::Instruction)?;
        let mut buf = [0u8; 2];
        if self.fetch_target.fetch(translation.phys, &mut buf) != 2 {
            return Err(Exception::InstructionAccessFault(v_addr));
        }
        Ok(u16::from_le_bytes(buf))
    }

    fn fetch_encoding(&self) -> Result<u32, Exception<X>> {
        let pc = self.pc;
        let align_mask = if self.compressed_enabled { 0b01 } else { 0b11 };
        if X::to_u64(pc) & align_mask != 0 {
            return Err(Exception::InstructionAddressMisaligned(pc));
        }

        let first = self.fetch_halfword(pc)?;
        if is_compressed(first) {
            return Ok(first as u32);
        }

        let upper = self.fetch_halfword(X::wrapping_add(pc, X::from_u64(2)))?;
        Ok(((upper as u32) << 16) | first as u32)
    }

    /// Produce the next frame and advance the fetch-ahead cursor.
    fn fill(&mut self) -> FetchFrame<X> {
        let virtual_pc = self.pc;
        match self.fetch_encoding() {
            Ok(encoding) => {
                let instr = self.tables.decode(encoding);
                self.pc = X::wrapping_add(self.pc, X::from_u64(instr.width() as u64));
                FetchFrame {
                    virtual_pc,
                    encoding,
                    instr,
                    deferred_trap: None,
                }
            }
            Err(exception) => {
                // The cursor keeps moving; every frame after this one is
                // garbage until the executor resynchronises.
                self.pc = X::wrapping_add(self.pc, X::from_u64(4));
                FetchFrame {
                    virtual_pc,
                    encoding: 0,
                    instr: Instr {
                        opcode: crate::parser::instruction::OpCode::Unknown,
                        operands: crate::parser::instruction::Operands::Unknown { instr: 0 },
                    },
                    deferred_trap: Some(exception),
                }
            }
        }
    }
}

pub struct PrefetchHart<X: Xlen> {
    pub core: MachineCoreState<X>,
    decoder: PrecomputedDecoder,
    spigot: Option<Spigot<FetchFrame<X>, FetchCursor<X>>>,
    depth: usize,
    reset_vector: XValue<X>,
}

impl<X: Xlen> PrefetchHart<X> {
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

        let mut hart = PrefetchHart {
            core,
            decoder,
            spigot: None,
            depth: config.fetch_thread_depth,
            reset_vector,
        };

        if hart.depth > 1 {
            let cursor = hart.cursor();
            hart.spigot = Some(Spigot::new(hart.depth, cursor, FetchCursor::fill));
        }

        Ok(hart)
    }

    /// Snapshot a fresh fetch cursor at the executor's next PC.
    fn cursor(&self) -> FetchCursor<X> {
        FetchCursor {
            pc: self.core.hart.next_pc,
            translator: self.core.translator(),
            tables: self.decoder.tables(),
            bus: self.core.bus.clone(),
            fetch_target: self.core.fetch_target(),
            compressed_enabled: self
                .core
                .hart
                .csregisters
                .extensions()
                .contains(crate::machine_state::csregisters::misa::Extensions::C),
        }
    }

    /// Pause the producer, point it at the true next PC with fresh
    /// snapshots, and resume. Discards everything in flight.
    fn resync(&mut self) {
        let cursor = self.cursor();
        if let Some(spigot) = self.spigot.as_mut() {
            log::trace!("prefetch pipeline resynchronised");
            spigot.pause();
            spigot.resume(cursor);
        }
    }

    fn reconfigure_decoder(&mut self) {
        let key = self.core.decode_key();
        if key != self.decoder.key() {
            self.decoder.configure(key.extensions, key.mxlen, key.xlen);
        }
    }

    /// Inline path used when the worker is disabled.
    fn tick_inline(&mut self) -> usize {
        let pc = self.core.hart.next_pc;
        self.core.hart.pc = pc;

        match fetch_or_trap(&mut self.core, pc) {
            Ok(encoding) => {
                let instr = self.decoder.decode(encoding);
                self.core.hart.fetch = FetchSlot {
                    virtual_pc: pc,
                    encoding,
                    instr,
                };
                usize::from(execute_one(&mut self.core, pc, &instr))
            }
            Err(()) => 0,
        }
    }

    fn tick_prefetched(&mut self) -> usize {
        loop {
            let frame = self
                .spigot
                .as_mut()
                .expect("the worker is enabled on this path")
                .next();

            // Control flow diverged from the prefetched sequence.
            if frame.virtual_pc != self.core.hart.next_pc {
                self.resync();
                continue;
            }

            let pc = frame.virtual_pc;
            self.core.hart.pc = pc;

            if let Some(trap) = frame.deferred_trap {
                let handler = self.core.hart.take_trap(trap, pc);
                self.core.hart.next_pc = handler;
                return 0;
            }

            self.core.hart.fetch = FetchSlot {
                virtual_pc: pc,
                encoding: frame.encoding,
                instr: frame.instr,
            };

            return usize::from(execute_one(&mut self.core, pc, &frame.instr));
        }
    }
}

impl<X: Xlen> Tickable for PrefetchHart<X> {
    fn before_first_tick(&mut self) {
        self.reset();
    }

    fn tick(&mut self) -> usize {
        let retired = if self.spigot.is_some() {
            self.tick_prefetched()
        } else {
            self.tick_inline()
        };

        finish_tick(&mut self.core, retired);

        let events = self.core.service_events();
        // The producer holds snapshots of both the decode tables and the
        // translation state, so anything that invalidates either must
        // rebuild its cursor.
        if events.intersects(EventSet::INVALIDATES_DECODE)
            || events.intersects(EventSet::INVALIDATES_TRANSLATION)
        {
            self.reconfigure_decoder();
            self.resync();
        }

        retired
    }

    fn reset(&mut self) {
        self.core.reset(self.reset_vector);
        self.reconfigure_decoder();
        self.resync();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bus::MainMemory;
    use crate::machine_state::registers::{x5, x6};
    use crate::xlen::Rv64;

    fn hart(mem: Arc<MainMemory<Rv64>>, depth: usize) -> PrefetchHart<Rv64> {
        let config = HartConfig {
            fetch_thread_depth: depth,
            ..HartConfig::default()
        };
        let mut hart = PrefetchHart::new(mem, None, &config, 0u64).unwrap();
        hart.before_first_tick();
        hart
    }

    // The sixth seeded scenario: a jump discards the frames prefetched
    // behind it, and execution resumes at the jump target.
    #[test]
    fn jump_discards_prefetched_frames() {
        let mem = Arc::new(MainMemory::<Rv64>::new(0, 0x1000));
        // 0:   jal x0, +256
        // 4..: addi x5, x5, 1 (would be prefetched, must never execute)
        mem.write_u32(0, 0x1000_006F);
        for i in 1..64 {
            mem.write_u32((i * 4) as u64, 0x0012_8293);
        }
        // 256: addi x6, x6, 1
        mem.write_u32(256, 0x0013_0313);

        let mut hart = hart(mem, 8);

        assert_eq!(hart.tick(), 1); // the jump
        assert_eq!(hart.tick(), 1); // the instruction at +256

        assert_eq!(hart.core.hart.xregisters.read(x5), 0);
        assert_eq!(hart.core.hart.xregisters.read(x6), 1);
        assert_eq!(hart.core.hart.next_pc, 260);
    }

    #[test]
    fn straight_line_execution_streams_from_the_ring() {
        let mem = Arc::new(MainMemory::<Rv64>::new(0, 0x1000));
        for i in 0..32 {
            mem.write_u32((i * 4) as u64, 0x0012_8293); // addi x5, x5, 1
        }

        let mut hart = hart(mem, 4);
        for _ in 0..32 {
            assert_eq!(hart.tick(), 1);
        }
        assert_eq!(hart.core.hart.xregisters.read(x5), 32);
    }

    #[test]
    fn depth_one_runs_without_a_worker() {
        let mem = Arc::new(MainMemory::<Rv64>::new(0, 0x1000));
        mem.write_u32(0, 0x0012_8293);
        mem.write_u32(4, 0x0012_8293);

        let mut hart = hart(mem, 1);
        assert!(hart.spigot.is_none());
        assert_eq!(hart.tick(), 1);
        assert_eq!(hart.tick(), 1);
        assert_eq!(hart.core.hart.xregisters.read(x5), 2);
    }

    #[test]
    fn deferred_fetch_trap_is_raised_when_consumed() {
        // Only 16 bytes of memory: running off the end fetches from an
        // unmapped address, which must surface as an access fault when
        // that frame is actually consumed.
        let mem = Arc::new(MainMemory::<Rv64>::new(0, 16));
        for i in 0..4 {
            mem.write_u32((i * 4) as u64, 0x0012_8293);
        }

        let mut hart = hart(mem, 4);
        for _ in 0..4 {
            assert_eq!(hart.tick(), 1);
        }

        // The fetch at 16 faults; the trap retires nothing and vectors
        // to mtvec (0 here).
        assert_eq!(hart.tick(), 0);
        let mcause: u64 = hart
            .core
            .hart
            .csregisters
            .read(crate::machine_state::csregisters::CSRegister::mcause);
        assert_eq!(mcause, 1);
    }
}
