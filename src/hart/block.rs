// SPDX-License-Identifier: MIT

//! Basic-block driver.
//!
//! Decoded instructions are recorded into blocks: straight-line runs
//! ending at the first control-flow-relevant instruction (branch, jump,
//! environment call, trap return or fence) or at the length limit. A
//! direct-mapped root table finds a block for a virtual PC; in addition,
//! each block keeps a small list of chained successors so the common
//! block-to-block transition skips the root lookup entirely.
//!
//! Chain pointers are (slot, generation) pairs. Evicting or abandoning a
//! block bumps its generation, so stale chain pointers fail their tag
//! check without sweeping the cache for back-references.
//!
//! A replayed block stops early when an instruction traps or when an
//! event invalidates decoded state; the instructions after the stop
//! point do not retire, and the next tick re-enters at the trap handler
//! (or at the instruction after the stop).

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
use crate::machine_state::hart_state::EventSet;
use crate::machine_state::MachineCoreState;
use crate::parser::instruction::Instr;
use crate::xlen::XValue;
use crate::xlen::Xlen;

#[derive(Clone)]
struct BasicBlock<X: Xlen> {
    start_pc: XValue<X>,
    fence: u32,
    generation: u32,
    instrs: Vec<Instr>,
    /// Chained successors as (slot, generation) pairs.
    next: Vec<(usize, u32)>,
}

impl<X: Xlen> BasicBlock<X> {
    fn vacant(max_len: usize, fanout: usize) -> Self {
        BasicBlock {
            start_pc: X::MAX,
            fence: u32::MAX,
            generation: 0,
            instrs: Vec::with_capacity(max_len),
            next: Vec::with_capacity(fanout),
        }
    }
}

pub struct BlockHart<X: Xlen> {
    pub core: MachineCoreState<X>,
    decoder: PrecomputedDecoder,
    blocks: Vec<BasicBlock<X>>,
    /// Direct-mapped root table: `(pc >> 1) mod 2^bits` to a block slot.
    root: Vec<usize>,
    /// Ring cursor for block allocation; explicit modular arithmetic.
    write_cursor: usize,
    /// The block executed last, for chaining.
    last_block: Option<(usize, u32)>,
    fence: u32,
    max_block_length: usize,
    num_next_blocks: usize,
    reset_vector: XValue<X>,
}

impl<X: Xlen> BlockHart<X> {
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

        let size = 1usize << config.bb_cache_bits;
        Ok(BlockHart {
            core,
            decoder,
            blocks: vec![
                BasicBlock::vacant(config.max_block_length, config.num_next_blocks);
                size
            ],
            root: vec![0; size],
            write_cursor: 0,
            last_block: None,
            fence: 0,
            max_block_length: config.max_block_length,
            num_next_blocks: config.num_next_blocks,
            reset_vector,
        })
    }

    #[inline]
    fn index(&self, pc: XValue<X>) -> usize {
        (X::to_u64(pc) >> 1) as usize & (self.root.len() - 1)
    }

    #[inline]
    fn block_live(&self, slot: usize, generation: u32) -> bool {
        let block = &self.blocks[slot];
        block.generation == generation && block.fence == self.fence
    }

    /// Find a closed block starting at `pc`: chained successors of the
    /// previously executed block first, the root table second.
    fn find_block(&self, pc: XValue<X>) -> Option<usize> {
        if let Some((prev_slot, prev_gen)) = self.last_block {
            if self.block_live(prev_slot, prev_gen) {
                for &(slot, generation) in &self.blocks[prev_slot].next {
                    if self.block_live(slot, generation) && self.blocks[slot].start_pc == pc {
                        return Some(slot);
                    }
                }
            }
        }

        let slot = self.root[self.index(pc)];
        let block = &self.blocks[slot];
        if block.fence == self.fence && block.start_pc == pc && !block.instrs.is_empty() {
            return Some(slot);
        }

        None
    }

    /// Record a chain edge from the previously executed block.
    fn link_from_last(&mut self, slot: usize) {
        let Some((prev_slot, prev_gen)) = self.last_block else {
            return;
        };
        if !self.block_live(prev_slot, prev_gen) {
            return;
        }

        let edge = (slot, self.blocks[slot].generation);
        let fanout = self.num_next_blocks;
        let prev = &mut self.blocks[prev_slot];
        if !prev.next.contains(&edge) && prev.next.len() < fanout {
            prev.next.push(edge);
        }
    }

    /// Replay a closed block, stopping early on a trap or an event that
    /// invalidates decoded state.
    fn replay(&mut self, slot: usize, pc: XValue<X>) -> (usize, EventSet) {
        let mut retired = 0;
        let mut accumulated = EventSet::empty();
        let mut cur = pc;

        for position in 0..self.blocks[slot].instrs.len() {
            let instr = self.blocks[slot].instrs[position];
            self.core.hart.pc = cur;
            let ok = execute_one(&mut self.core, cur, &instr);
            let events = self.core.service_events();
            accumulated |= events;

            if ok {
                retired += 1;
            }

            if events.contains(EventSet::TOOK_TRAP) || invalidates_decode(events) {
                break;
            }

            cur = self.core.hart.next_pc;
        }

        self.link_from_last(slot);
        self.last_block = Some((slot, self.blocks[slot].generation));

        (retired, accumulated)
    }

    /// Record mode: allocate a block and fetch/decode/execute one
    /// instruction at a time, appending each, until a terminator, the
    /// length limit, or a trap.
    fn record(&mut self, pc: XValue<X>) -> (usize, EventSet) {
        let slot = self.write_cursor;
        self.write_cursor = (self.write_cursor + 1) & (self.blocks.len() - 1);

        // Evicting the occupant bumps its generation so chain pointers
        // at it die with it.
        let generation = {
            let block = &mut self.blocks[slot];
            block.generation = block.generation.wrapping_add(1);
            block.start_pc = pc;
            block.fence = self.fence;
            block.instrs.clear();
            block.next.clear();
            block.generation
        };
        let root_idx = self.index(pc);
        self.root[root_idx] = slot;

        let mut retired = 0;
        let mut accumulated = EventSet::empty();
        let mut abandoned = false;
        let mut cur = pc;

        loop {
            self.core.hart.pc = cur;
            let Ok(encoding) = fetch_or_trap(&mut self.core, cur) else {
                accumulated |= self.core.service_events();
                break;
            };

            let instr = self.decoder.decode(encoding);
            let ok = execute_one(&mut self.core, cur, &instr);
            let events = self.core.service_events();
            accumulated |= events;

            if !ok {
                // The trapping instruction neither retires nor records;
                // the prefix block stays valid and re-entry lands on the
                // trapping instruction again.
                break;
            }

            retired += 1;
            self.blocks[slot].instrs.push(instr);

            if invalidates_decode(events) {
                // Decoding rules changed mid-recording: the appended
                // prefix mixes decode contexts, drop it.
                abandoned = true;
                break;
            }

            if instr.is_block_terminator() || self.blocks[slot].instrs.len() == self.max_block_length
            {
                break;
            }

            cur = self.core.hart.next_pc;
        }

        if abandoned || self.blocks[slot].instrs.is_empty() {
            let block = &mut self.blocks[slot];
            block.generation = block.generation.wrapping_add(1);
            block.start_pc = X::MAX;
            block.instrs.clear();
            self.last_block = None;
        } else {
            self.link_from_last(slot);
            self.last_block = Some((slot, generation));
        }

        (retired, accumulated)
    }

    /// Invalidate every block in constant time via the fence counter,
    /// spot-clearing one slot against counter wrap-around.
    fn flush_blocks(&mut self) {
        let index = self.fence as usize & (self.blocks.len() - 1);
        let block = &mut self.blocks[index];
        block.generation = block.generation.wrapping_add(1);
        block.start_pc = X::MAX;
        block.instrs.clear();
        block.next.clear();

        self.fence = self.fence.wrapping_add(1);
        self.last_block = None;
        log::trace!("block cache flushed");
    }

    fn reconfigure_decoder(&mut self) {
        let key = self.core.decode_key();
        if key != self.decoder.key() {
            self.decoder.configure(key.extensions, key.mxlen, key.xlen);
        }
    }

    #[cfg(test)]
    fn lookup(&self, pc: XValue<X>) -> Option<&[Instr]> {
        self.find_block(pc).map(|slot| self.blocks[slot].instrs.as_slice())
    }
}

impl<X: Xlen> Tickable for BlockHart<X> {
    fn before_first_tick(&mut self) {
        self.reset();
    }

    fn tick(&mut self) -> usize {
        let pc = self.core.hart.next_pc;
        self.core.hart.pc = pc;

        let (retired, mut events) = match self.find_block(pc) {
            Some(slot) => self.replay(slot, pc),
            None => self.record(pc),
        };

        finish_tick(&mut self.core, retired);
        events |= self.core.service_events();

        if invalidates_decode(events) {
            self.flush_blocks();
            self.reconfigure_decoder();
        }

        retired
    }

    fn reset(&mut self) {
        self.core.reset(self.reset_vector);
        for block in &mut self.blocks {
            block.generation = block.generation.wrapping_add(1);
            block.start_pc = X::MAX;
            block.fence = u32::MAX;
            block.instrs.clear();
            block.next.clear();
        }
        self.fence = 0;
        self.write_cursor = 0;
        self.last_block = None;
        self.reconfigure_decoder();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bus::MainMemory;
    use crate::machine_state::registers::{x1, x2};
    use crate::parser::instruction::OpCode;
    use crate::xlen::Rv64;

    fn config() -> HartConfig {
        HartConfig {
            max_block_length: 4,
            ..HartConfig::default()
        }
    }

    // The third seeded scenario: a two-instruction loop recorded once,
    // then replayed through the self-chain.
    #[test]
    fn loop_records_one_block_and_chains_to_itself() {
        let mem = Arc::new(MainMemory::<Rv64>::new(0, 0x1000));
        // L: addi x1, x1, 1
        //    bne  x1, x2, L
        mem.write_u32(0, 0x0010_8093);
        mem.write_u32(4, 0xFE20_9EE3);

        let mut hart = BlockHart::new(mem, None, &config(), 0u64).unwrap();
        hart.before_first_tick();
        hart.core.hart.xregisters.write(x2, 3);

        let mut total = 0;
        let mut ticks = 0;
        while hart.core.hart.xregisters.read(x1) < 3 {
            total += hart.tick();
            ticks += 1;
            assert!(ticks < 10, "loop failed to converge");
        }

        assert_eq!(total, 6);
        assert_eq!(hart.core.hart.xregisters.read(x1), 3);
        assert_eq!(hart.core.hart.next_pc, 8);

        // One two-instruction block, reachable from the root table,
        // chained to itself.
        let block = hart.lookup(0).expect("the loop body must be cached");
        assert_eq!(block.len(), 2);
        assert_eq!(block[0].opcode, OpCode::Addi);
        assert_eq!(block[1].opcode, OpCode::Bne);

        let slot = hart.find_block(0).unwrap();
        let generation = hart.blocks[slot].generation;
        assert!(hart.blocks[slot].next.contains(&(slot, generation)));
    }

    #[test]
    fn blocks_end_at_the_length_limit() {
        let mem = Arc::new(MainMemory::<Rv64>::new(0, 0x1000));
        // Six addis in a row; with max_block_length = 4 the first block
        // must close after four instructions.
        for i in 0..6 {
            mem.write_u32((i * 4) as u64, 0x0010_8093);
        }

        let mut hart = BlockHart::new(mem, None, &config(), 0u64).unwrap();
        hart.before_first_tick();

        assert_eq!(hart.tick(), 4);
        assert_eq!(hart.lookup(0).unwrap().len(), 4);
        assert_eq!(hart.core.hart.next_pc, 16);
    }

    #[test]
    fn replaying_a_block_matches_single_stepping() {
        use crate::hart::simple::SimpleHart;

        let program: &[(u64, u32)] = &[
            (0, 0x0010_8093),  // addi x1, x1, 1
            (4, 0x0020_9113),  // slli x2, x1, 2
            (8, 0x0020_E1B3),  // or   x3, x1, x2
            (12, 0xFF5F_F06F), // jal  x0, -12
        ];

        let mem_block = Arc::new(MainMemory::<Rv64>::new(0, 0x1000));
        let mem_simple = Arc::new(MainMemory::<Rv64>::new(0, 0x1000));
        for &(addr, word) in program {
            mem_block.write_u32(addr, word);
            mem_simple.write_u32(addr, word);
        }

        let mut block_hart = BlockHart::new(mem_block, None, &config(), 0u64).unwrap();
        let mut simple_hart =
            SimpleHart::new(mem_simple, None, &HartConfig::default(), 0u64).unwrap();
        block_hart.before_first_tick();
        simple_hart.before_first_tick();

        // Two trips around the loop on each driver.
        let mut block_retired = 0;
        while block_retired < 8 {
            block_retired += block_hart.tick();
        }
        let mut simple_retired = 0;
        while simple_retired < 8 {
            simple_retired += simple_hart.tick();
        }

        for reg in [x1, x2, crate::machine_state::registers::x3] {
            assert_eq!(
                block_hart.core.hart.xregisters.read(reg),
                simple_hart.core.hart.xregisters.read(reg)
            );
        }
        assert_eq!(block_hart.core.hart.next_pc, simple_hart.core.hart.next_pc);
    }
}
