// SPDX-License-Identifier: MIT

//! Execution drivers.
//!
//! Every driver advances the same machine core through the per-tick
//! skeleton — resolve the next virtual PC, fetch, decode, execute,
//! update the next PC, poll interrupts — and differs only in what it
//! memoises between ticks.

pub mod block;
pub mod icache;
pub mod prefetch;
pub mod simple;

use crate::bus::SharedBus;
use crate::machine_state::csregisters::misa::Extensions;
use crate::machine_state::hart_state::EventSet;
use crate::machine_state::MachineCoreState;
use crate::xlen::XValue;
use crate::xlen::Xlen;

/// Unified stepping interface over all drivers.
pub trait Tickable {
    /// Prepare for the first tick. Idempotent; equivalent to a reset.
    fn before_first_tick(&mut self);

    /// Advance by one instruction (or, for the block driver, up to one
    /// basic block). Returns the number of retired instructions; a tick
    /// that only takes a trap retires none.
    fn tick(&mut self) -> usize;

    /// Restore the construction-time reset state.
    fn reset(&mut self);
}

/// Construction-time configuration errors. These are host errors, not
/// architectural traps.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("the base integer extension (I) cannot be disabled")]
    MissingBaseExtension,

    #[error("the S extension requires the U extension")]
    SupervisorRequiresUser,

    #[error("fetches are routed around the bus but no memory target was given")]
    MissingFetchTarget,

    #[error("basic blocks must hold at least one instruction")]
    ZeroBlockLength,

    #[error("the block cache needs a chain fanout of at least one")]
    ZeroChainFanout,

    #[error("cache index widths above {max} bits are unsupported, got {got}")]
    OversizedCache { max: u32, got: u32 },
}

/// Construction parameters shared by the drivers. The fields correspond
/// to the compile-time knobs of a hardware implementation; here they are
/// plain runtime values.
#[derive(Debug, Clone)]
pub struct HartConfig {
    /// Maximal extension set; MISA writes can only toggle within it.
    pub extensions: Extensions,
    /// Translation cache size in index bits; 0 disables the cache.
    pub translation_cache_bits: u32,
    /// Route fetches to a dedicated memory target, bypassing MMIO.
    pub skip_bus_for_fetches: bool,
    /// Allow loads/stores to stride across page boundaries.
    pub stride_across_pages: bool,
    /// Longest recorded basic block, in instructions.
    pub max_block_length: usize,
    /// Chain fanout: how many successors one block may link to.
    pub num_next_blocks: usize,
    /// Block cache size in index bits.
    pub bb_cache_bits: u32,
    /// Instruction cache size in index bits.
    pub icache_bits: u32,
    /// Prefetch ring size; 1 disables the worker thread.
    pub fetch_thread_depth: usize,
}

impl Default for HartConfig {
    fn default() -> Self {
        HartConfig {
            extensions: Extensions::from_letters("imacsu"),
            translation_cache_bits: 8,
            skip_bus_for_fetches: false,
            stride_across_pages: true,
            max_block_length: 16,
            num_next_blocks: 2,
            bb_cache_bits: 12,
            icache_bits: 16,
            fetch_thread_depth: 8,
        }
    }
}

impl HartConfig {
    const MAX_CACHE_BITS: u32 = 24;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.extensions.contains(Extensions::I) {
            return Err(ConfigError::MissingBaseExtension);
        }

        if self.extensions.contains(Extensions::S) && !self.extensions.contains(Extensions::U) {
            return Err(ConfigError::SupervisorRequiresUser);
        }

        if self.max_block_length == 0 {
            return Err(ConfigError::ZeroBlockLength);
        }

        if self.num_next_blocks == 0 {
            return Err(ConfigError::ZeroChainFanout);
        }

        for bits in [
            self.translation_cache_bits,
            self.bb_cache_bits,
            self.icache_bits,
        ] {
            if bits > Self::MAX_CACHE_BITS {
                return Err(ConfigError::OversizedCache {
                    max: Self::MAX_CACHE_BITS,
                    got: bits,
                });
            }
        }

        Ok(())
    }

    /// Build the machine core for this configuration.
    pub(crate) fn build_core<X: Xlen>(
        &self,
        bus: SharedBus<X>,
        mem: Option<SharedBus<X>>,
    ) -> Result<MachineCoreState<X>, ConfigError> {
        self.validate()?;

        let fetch_bus = if self.skip_bus_for_fetches {
            Some(mem.ok_or(ConfigError::MissingFetchTarget)?)
        } else {
            None
        };

        Ok(MachineCoreState::new(
            self.extensions,
            bus,
            fetch_bus,
            self.translation_cache_bits,
            self.stride_across_pages,
        ))
    }
}

/// Shared tail of every tick: deliver a pending interrupt (the `epc` of
/// an interrupt is the *next* instruction) and account retirement.
pub(crate) fn finish_tick<X: Xlen>(core: &mut MachineCoreState<X>, retired: usize) {
    core.retire(retired as u64);

    if let Some(interrupt) = core.hart.get_pending_interrupt() {
        let handler = core.hart.take_trap(interrupt, core.hart.next_pc);
        core.hart.next_pc = handler;
    }
}

/// Fetch-and-trap helper: on a fetch fault, the trap is taken
/// immediately and the tick retires nothing.
pub(crate) fn fetch_or_trap<X: Xlen>(
    core: &mut MachineCoreState<X>,
    pc: XValue<X>,
) -> Result<u32, ()> {
    match core.fetch_encoding(pc) {
        Ok(encoding) => Ok(encoding),
        Err(exception) => {
            let handler = core.hart.take_trap(exception, pc);
            core.hart.next_pc = handler;
            Err(())
        }
    }
}

/// Run one decoded instruction and resolve the next PC, reporting
/// whether the instruction retired.
pub(crate) fn execute_one<X: Xlen>(
    core: &mut MachineCoreState<X>,
    pc: XValue<X>,
    instr: &crate::parser::instruction::Instr,
) -> bool {
    let result = core.run_instr(instr);
    let retired = result.is_ok();
    core.handle_step_result(pc, result);
    retired
}

/// Events that require a driver to flush decoded state.
pub(crate) fn invalidates_decode(events: EventSet) -> bool {
    events.intersects(EventSet::INVALIDATES_DECODE)
}
