// SPDX-License-Identifier: MIT

//! The machine core: hart state, the physical bus targets, the
//! translation cache, and the virtual-memory access paths every driver
//! shares.

pub mod address_translation;
pub mod csregisters;
pub mod hart_state;
pub mod mode;
pub mod registers;
pub mod reservation_set;

use address_translation::translation_cache::TranslationCache;
use address_translation::AccessType;
use address_translation::Translation;
use address_translation::Translator;
use hart_state::EventSet;
use hart_state::HartState;

use crate::bus::SharedBus;
use crate::decoder::DecodeKey;
use crate::log;
use crate::machine_state::csregisters::misa::Extensions;
use crate::machine_state::csregisters::satp::TranslationAlgorithm;
use crate::parser::instruction::Instr;
use crate::parser::instruction::InstrWidth;
use crate::parser::instruction::OpCode;
use crate::parser::is_compressed;
use crate::parser::DecodeContext;
use crate::traps::Exception;
use crate::xlen::XValue;
use crate::xlen::Xlen;

/// How to modify the program counter after an instruction.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProgramCounterUpdate<X: Xlen> {
    /// Jump to a fixed address.
    Set(XValue<X>),
    /// Advance past the current instruction by its width.
    Next(InstrWidth),
}

/// The hart together with its memory system: everything required to
/// fetch, translate and run instructions.
pub struct MachineCoreState<X: Xlen> {
    pub hart: HartState<X>,
    /// The system bus. Loads, stores and page-table walks go here.
    pub bus: SharedBus<X>,
    /// Optional dedicated fetch target that bypasses MMIO devices.
    fetch_bus: Option<SharedBus<X>>,
    pub(crate) translation_cache: TranslationCache<X>,
    striding: bool,
}

impl<X: Xlen> MachineCoreState<X> {
    pub fn new(
        maximal_extensions: Extensions,
        bus: SharedBus<X>,
        fetch_bus: Option<SharedBus<X>>,
        translation_cache_bits: u32,
        striding: bool,
    ) -> Self {
        MachineCoreState {
            hart: HartState::new(maximal_extensions),
            bus,
            fetch_bus,
            translation_cache: TranslationCache::new(translation_cache_bits),
            striding,
        }
    }

    /// Reset the architectural state and drop all cached translations.
    pub fn reset(&mut self, pc: XValue<X>) {
        self.hart.reset(pc);
        self.translation_cache.clear();
    }

    /// The target instruction fetches go to: the dedicated memory target
    /// when one is configured, the bus otherwise.
    pub fn fetch_target(&self) -> SharedBus<X> {
        self.fetch_bus.clone().unwrap_or_else(|| self.bus.clone())
    }

    /// Snapshot the translation inputs.
    pub fn translator(&self) -> Translator<X> {
        Translator::new(
            self.hart.mode,
            self.hart.csregisters.mstatus(),
            self.hart.csregisters.satp(),
        )
    }

    /// The decode-table key for the current architectural state.
    pub fn decode_key(&self) -> DecodeKey {
        DecodeKey {
            extensions: self.hart.csregisters.extensions(),
            mxlen: X::MODE,
            xlen: self.hart.effective_xlen(),
        }
    }

    /// The decode context for on-demand parsing.
    pub fn decode_ctx(&self) -> DecodeContext {
        DecodeContext::new(
            self.hart.csregisters.extensions(),
            self.hart.effective_xlen(),
        )
    }

    /// Translate a virtual address, consulting the translation cache for
    /// paged accesses and installing the walk result on a miss.
    pub fn translate(
        &mut self,
        v_addr: XValue<X>,
        access_type: AccessType,
    ) -> Result<Translation<X>, Exception<X>> {
        let translator = self.translator();

        // Identity translations are not worth a cache slot, and caching
        // them would needlessly clip `valid_through` to a page.
        if let TranslationAlgorithm::Bare = translator.algorithm(access_type) {
            return Ok(Translation {
                phys: v_addr,
                valid_through: X::MAX,
            });
        }

        if let Some(translation) = self.translation_cache.translate(access_type, v_addr) {
            return Ok(translation);
        }

        let translation = translator.translate(self.bus.as_ref(), v_addr, access_type)?;
        self.translation_cache.install(access_type, v_addr, &translation);
        Ok(translation)
    }

    /// Translation-cache hit/miss counters, mostly for tests and
    /// diagnostics.
    pub fn translation_cache_counters(&self) -> (u64, u64) {
        (
            self.translation_cache.hits(),
            self.translation_cache.misses(),
        )
    }

    /// Drain pending events, clearing the translation cache when one of
    /// them invalidates it. The caller reacts to the rest.
    pub fn service_events(&mut self) -> EventSet {
        let events = self.hart.take_events();
        if events.intersects(EventSet::INVALIDATES_TRANSLATION) {
            self.translation_cache.clear();
            log::trace!("translation cache cleared");
        }
        events
    }

    /// Account for retired instructions.
    pub fn retire(&mut self, count: u64) {
        self.hart.csregisters.increment_counters(count);
    }

    /// Split `[addr, addr + len)` into per-page chunks, translating each
    /// before any byte moves. A failing translation aborts the whole
    /// access. The chunk plan is local to this call.
    fn plan_chunks(
        &mut self,
        addr: XValue<X>,
        len: usize,
        access_type: AccessType,
    ) -> Result<Vec<(XValue<X>, usize, usize)>, Exception<X>> {
        let mut chunks = Vec::new();
        let mut offset = 0usize;
        while offset < len {
            let va = X::wrapping_add(addr, X::from_u64(offset as u64));
            let translation = self.translate(va, access_type)?;
            let span = X::to_u64(X::wrapping_sub(translation.valid_through, va));
            let remaining = (len - offset) as u64;
            let chunk = remaining.min(span.saturating_add(1)) as usize;
            chunks.push((translation.phys, offset, chunk));
            offset += chunk;
        }
        Ok(chunks)
    }

    fn single_chunk(
        &mut self,
        addr: XValue<X>,
        len: usize,
        access_type: AccessType,
    ) -> Result<(XValue<X>, usize), Exception<X>> {
        let translation = self.translate(addr, access_type)?;
        let span = X::to_u64(X::wrapping_sub(translation.valid_through, addr));
        let len = (len as u64 - 1).min(span) as usize + 1;
        Ok((translation.phys, len))
    }

    /// Read `buf.len()` bytes starting at the virtual address `addr`.
    ///
    /// In striding mode the access crosses page boundaries: every chunk
    /// is translated before any byte is transferred, so a page fault in
    /// the middle transfers nothing. Otherwise the access is truncated at
    /// the page boundary and the transferred size says so.
    pub fn read_virtual(
        &mut self,
        addr: XValue<X>,
        buf: &mut [u8],
    ) -> Result<usize, Exception<X>> {
        if buf.is_empty() || wraps_around::<X>(addr, buf.len()) {
            return Ok(0);
        }

        if self.striding {
            let chunks = self.plan_chunks(addr, buf.len(), AccessType::Load)?;
            let mut transferred = 0;
            for (phys, offset, len) in chunks {
                let n = self.bus.read(phys, &mut buf[offset..offset + len]);
                transferred += n;
                if n != len {
                    break;
                }
            }
            Ok(transferred)
        } else {
            let (phys, len) = self.single_chunk(addr, buf.len(), AccessType::Load)?;
            Ok(self.bus.read(phys, &mut buf[..len]))
        }
    }

    /// Write `buf.len()` bytes starting at the virtual address `addr`.
    /// Same page-crossing policy as [`Self::read_virtual`].
    pub fn write_virtual(&mut self, addr: XValue<X>, buf: &[u8]) -> Result<usize, Exception<X>> {
        if buf.is_empty() || wraps_around::<X>(addr, buf.len()) {
            return Ok(0);
        }

        if self.striding {
            let chunks = self.plan_chunks(addr, buf.len(), AccessType::Store)?;
            let mut transferred = 0;
            for (phys, offset, len) in chunks {
                let n = self.bus.write(phys, &buf[offset..offset + len]);
                transferred += n;
                if n != len {
                    break;
                }
            }
            Ok(transferred)
        } else {
            let (phys, len) = self.single_chunk(addr, buf.len(), AccessType::Store)?;
            Ok(self.bus.write(phys, &buf[..len]))
        }
    }

    /// Load exactly `N` bytes or fault.
    pub(crate) fn load_bytes<const N: usize>(
        &mut self,
        addr: XValue<X>,
    ) -> Result<[u8; N], Exception<X>> {
        let mut buf = [0u8; N];
        let n = self.read_virtual(addr, &mut buf)?;
        if n != N {
            let faulting = X::wrapping_add(addr, X::from_u64(n as u64));
            return Err(AccessType::Load.access_fault(faulting));
        }
        Ok(buf)
    }

    /// Store exactly `N` bytes or fault.
    pub(crate) fn store_bytes<const N: usize>(
        &mut self,
        addr: XValue<X>,
        bytes: [u8; N],
    ) -> Result<(), Exception<X>> {
        let n = self.write_virtual(addr, &bytes)?;
        if n != N {
            let faulting = X::wrapping_add(addr, X::from_u64(n as u64));
            return Err(AccessType::Store.access_fault(faulting));
        }
        Ok(())
    }

    /// Fetch the halfword at `v_addr`, using the dedicated fetch target
    /// when one is configured.
    fn fetch_halfword(&mut self, v_addr: XValue<X>) -> Result<u16, Exception<X>> {
        let translation = self.translate(v_addr, AccessType::Instruction)?;
        let target = self.fetch_bus.as_ref().unwrap_or(&self.bus);
        let mut buf = [0u8; 2];
        if target.fetch(translation.phys, &mut buf) != 2 {
            return Err(Exception::InstructionAccessFault(v_addr));
        }
        Ok(u16::from_le_bytes(buf))
    }

    /// Fetch one encoding at `v_addr`.
    ///
    /// Each halfword is translated separately: a compressed instruction
    /// in the last halfword of a mapped page fetches successfully even
    /// when the following page is unmapped.
    pub fn fetch_encoding(&mut self, v_addr: XValue<X>) -> Result<u32, Exception<X>> {
        if !self.hart.pc_aligned(v_addr) {
            return Err(Exception::InstructionAddressMisaligned(v_addr));
        }

        let first = self.fetch_halfword(v_addr)?;
        if is_compressed(first) {
            return Ok(first as u32);
        }

        let upper = self.fetch_halfword(X::wrapping_add(v_addr, X::from_u64(2)))?;
        Ok(((upper as u32) << 16) | first as u32)
    }

    /// Resolve a step result into the next fetch address, taking a trap
    /// if the instruction raised one.
    pub fn handle_step_result(
        &mut self,
        instr_pc: XValue<X>,
        result: Result<ProgramCounterUpdate<X>, Exception<X>>,
    ) -> XValue<X> {
        let next = match result {
            Ok(ProgramCounterUpdate::Set(address)) => address,
            Ok(ProgramCounterUpdate::Next(width)) => {
                X::wrapping_add(instr_pc, X::from_u64(width as u64))
            }
            Err(exception) => self.hart.take_trap(exception, instr_pc),
        };

        self.hart.next_pc = next;
        next
    }

    /// Advance the state by executing one decoded instruction.
    pub fn run_instr(
        &mut self,
        instr: &Instr,
    ) -> Result<ProgramCounterUpdate<X>, Exception<X>> {
        use OpCode::*;
        use ProgramCounterUpdate::Next;

        let width = instr.width();
        let xregs = &mut self.hart.xregisters;

        match instr.opcode {
            // RV32I R-type
            Add => {
                let a = instr.r();
                xregs.run_add(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Sub => {
                let a = instr.r();
                xregs.run_sub(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Sll => {
                let a = instr.r();
                xregs.run_sll(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Slt => {
                let a = instr.r();
                xregs.run_slt(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Sltu => {
                let a = instr.r();
                xregs.run_sltu(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Xor => {
                let a = instr.r();
                xregs.run_xor(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Srl => {
                let a = instr.r();
                xregs.run_srl(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Sra => {
                let a = instr.r();
                xregs.run_sra(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Or => {
                let a = instr.r();
                xregs.run_or(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            And => {
                let a = instr.r();
                xregs.run_and(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }

            // RV32I I-type
            Addi => {
                let a = instr.i();
                xregs.run_addi(a.imm, a.rs1, a.rd);
                Ok(Next(width))
            }
            Slti => {
                let a = instr.i();
                xregs.run_slti(a.imm, a.rs1, a.rd);
                Ok(Next(width))
            }
            Sltiu => {
                let a = instr.i();
                xregs.run_sltiu(a.imm, a.rs1, a.rd);
                Ok(Next(width))
            }
            Xori => {
                let a = instr.i();
                xregs.run_xori(a.imm, a.rs1, a.rd);
                Ok(Next(width))
            }
            Ori => {
                let a = instr.i();
                xregs.run_ori(a.imm, a.rs1, a.rd);
                Ok(Next(width))
            }
            Andi => {
                let a = instr.i();
                xregs.run_andi(a.imm, a.rs1, a.rd);
                Ok(Next(width))
            }
            Slli => {
                let a = instr.i();
                xregs.run_slli(a.imm, a.rs1, a.rd);
                Ok(Next(width))
            }
            Srli => {
                let a = instr.i();
                xregs.run_srli(a.imm, a.rs1, a.rd);
                Ok(Next(width))
            }
            Srai => {
                let a = instr.i();
                xregs.run_srai(a.imm, a.rs1, a.rd);
                Ok(Next(width))
            }

            Lui => {
                let a = instr.u();
                xregs.run_lui(a.imm, a.rd);
                Ok(Next(width))
            }
            Auipc => {
                let a = instr.u();
                self.hart.run_auipc(a.imm, a.rd);
                Ok(Next(width))
            }

            // Control transfer
            Jal => {
                let a = instr.j();
                self.hart.run_jal(a.imm, a.rd, width)
            }
            Jalr => {
                let a = instr.i();
                self.hart.run_jalr(a.imm, a.rs1, a.rd, width)
            }
            Beq => {
                let a = instr.b();
                self.hart.run_beq(a.imm, a.rs1, a.rs2, width)
            }
            Bne => {
                let a = instr.b();
                self.hart.run_bne(a.imm, a.rs1, a.rs2, width)
            }
            Blt => {
                let a = instr.b();
                self.hart.run_blt(a.imm, a.rs1, a.rs2, width)
            }
            Bge => {
                let a = instr.b();
                self.hart.run_bge(a.imm, a.rs1, a.rs2, width)
            }
            Bltu => {
                let a = instr.b();
                self.hart.run_bltu(a.imm, a.rs1, a.rs2, width)
            }
            Bgeu => {
                let a = instr.b();
                self.hart.run_bgeu(a.imm, a.rs1, a.rs2, width)
            }

            // Loads & stores
            Lb => {
                let a = instr.i();
                self.run_lb(a.imm, a.rs1, a.rd)?;
                Ok(Next(width))
            }
            Lh => {
                let a = instr.i();
                self.run_lh(a.imm, a.rs1, a.rd)?;
                Ok(Next(width))
            }
            Lw => {
                let a = instr.i();
                self.run_lw(a.imm, a.rs1, a.rd)?;
                Ok(Next(width))
            }
            Lbu => {
                let a = instr.i();
                self.run_lbu(a.imm, a.rs1, a.rd)?;
                Ok(Next(width))
            }
            Lhu => {
                let a = instr.i();
                self.run_lhu(a.imm, a.rs1, a.rd)?;
                Ok(Next(width))
            }
            Sb => {
                let a = instr.s();
                self.run_sb(a.imm, a.rs1, a.rs2)?;
                Ok(Next(width))
            }
            Sh => {
                let a = instr.s();
                self.run_sh(a.imm, a.rs1, a.rs2)?;
                Ok(Next(width))
            }
            Sw => {
                let a = instr.s();
                self.run_sw(a.imm, a.rs1, a.rs2)?;
                Ok(Next(width))
            }

            // RV64I
            Lwu => {
                let a = instr.i();
                self.run_lwu(a.imm, a.rs1, a.rd)?;
                Ok(Next(width))
            }
            Ld => {
                let a = instr.i();
                self.run_ld(a.imm, a.rs1, a.rd)?;
                Ok(Next(width))
            }
            Sd => {
                let a = instr.s();
                self.run_sd(a.imm, a.rs1, a.rs2)?;
                Ok(Next(width))
            }
            Addiw => {
                let a = instr.i();
                xregs.run_addiw(a.imm, a.rs1, a.rd);
                Ok(Next(width))
            }
            Slliw => {
                let a = instr.i();
                xregs.run_slliw(a.imm, a.rs1, a.rd);
                Ok(Next(width))
            }
            Srliw => {
                let a = instr.i();
                xregs.run_srliw(a.imm, a.rs1, a.rd);
                Ok(Next(width))
            }
            Sraiw => {
                let a = instr.i();
                xregs.run_sraiw(a.imm, a.rs1, a.rd);
                Ok(Next(width))
            }
            Addw => {
                let a = instr.r();
                xregs.run_addw(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Subw => {
                let a = instr.r();
                xregs.run_subw(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Sllw => {
                let a = instr.r();
                xregs.run_sllw(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Srlw => {
                let a = instr.r();
                xregs.run_srlw(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Sraw => {
                let a = instr.r();
                xregs.run_sraw(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }

            // M extension
            Mul => {
                let a = instr.r();
                xregs.run_mul(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Mulh => {
                let a = instr.r();
                xregs.run_mulh(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Mulhsu => {
                let a = instr.r();
                xregs.run_mulhsu(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Mulhu => {
                let a = instr.r();
                xregs.run_mulhu(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Div => {
                let a = instr.r();
                xregs.run_div(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Divu => {
                let a = instr.r();
                xregs.run_divu(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Rem => {
                let a = instr.r();
                xregs.run_rem(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Remu => {
                let a = instr.r();
                xregs.run_remu(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Mulw => {
                let a = instr.r();
                xregs.run_mulw(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Divw => {
                let a = instr.r();
                xregs.run_divw(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Divuw => {
                let a = instr.r();
                xregs.run_divuw(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Remw => {
                let a = instr.r();
                xregs.run_remw(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }
            Remuw => {
                let a = instr.r();
                xregs.run_remuw(a.rs1, a.rs2, a.rd);
                Ok(Next(width))
            }

            // A extension
            LrW => {
                let a = instr.amo();
                self.run_lrw(&a)?;
                Ok(Next(width))
            }
            ScW => {
                let a = instr.amo();
                self.run_scw(&a)?;
                Ok(Next(width))
            }
            AmoswapW => {
                let a = instr.amo();
                self.run_amo_w(&a, |_, new| new)?;
                Ok(Next(width))
            }
            AmoaddW => {
                let a = instr.amo();
                self.run_amo_w(&a, |old, new| old.wrapping_add(new))?;
                Ok(Next(width))
            }
            AmoxorW => {
                let a = instr.amo();
                self.run_amo_w(&a, |old, new| old ^ new)?;
                Ok(Next(width))
            }
            AmoandW => {
                let a = instr.amo();
                self.run_amo_w(&a, |old, new| old & new)?;
                Ok(Next(width))
            }
            AmoorW => {
                let a = instr.amo();
                self.run_amo_w(&a, |old, new| old | new)?;
                Ok(Next(width))
            }
            AmominW => {
                let a = instr.amo();
                self.run_amo_w(&a, |old, new| old.min(new))?;
                Ok(Next(width))
            }
            AmomaxW => {
                let a = instr.amo();
                self.run_amo_w(&a, |old, new| old.max(new))?;
                Ok(Next(width))
            }
            AmominuW => {
                let a = instr.amo();
                self.run_amo_w(&a, |old, new| (old as u32).min(new as u32) as i32)?;
                Ok(Next(width))
            }
            AmomaxuW => {
                let a = instr.amo();
                self.run_amo_w(&a, |old, new| (old as u32).max(new as u32) as i32)?;
                Ok(Next(width))
            }
            LrD => {
                let a = instr.amo();
                self.run_lrd(&a)?;
                Ok(Next(width))
            }
            ScD => {
                let a = instr.amo();
                self.run_scd(&a)?;
                Ok(Next(width))
            }
            AmoswapD => {
                let a = instr.amo();
                self.run_amo_d(&a, |_, new| new)?;
                Ok(Next(width))
            }
            AmoaddD => {
                let a = instr.amo();
                self.run_amo_d(&a, |old, new| old.wrapping_add(new))?;
                Ok(Next(width))
            }
            AmoxorD => {
                let a = instr.amo();
                self.run_amo_d(&a, |old, new| old ^ new)?;
                Ok(Next(width))
            }
            AmoandD => {
                let a = instr.amo();
                self.run_amo_d(&a, |old, new| old & new)?;
                Ok(Next(width))
            }
            AmoorD => {
                let a = instr.amo();
                self.run_amo_d(&a, |old, new| old | new)?;
                Ok(Next(width))
            }
            AmominD => {
                let a = instr.amo();
                self.run_amo_d(&a, |old, new| old.min(new))?;
                Ok(Next(width))
            }
            AmomaxD => {
                let a = instr.amo();
                self.run_amo_d(&a, |old, new| old.max(new))?;
                Ok(Next(width))
            }
            AmominuD => {
                let a = instr.amo();
                self.run_amo_d(&a, |old, new| (old as u64).min(new as u64) as i64)?;
                Ok(Next(width))
            }
            AmomaxuD => {
                let a = instr.amo();
                self.run_amo_d(&a, |old, new| (old as u64).max(new as u64) as i64)?;
                Ok(Next(width))
            }

            // Fences
            Fence => {
                let a = instr.fence();
                self.run_fence(a.pred, a.succ);
                Ok(Next(width))
            }
            FenceI => {
                self.run_fencei();
                Ok(Next(width))
            }
            SFenceVma => {
                let a = instr.sfence();
                self.run_sfence_vma(a.vaddr, a.asid)?;
                Ok(Next(width))
            }

            // Zicsr
            Csrrw => {
                let a = instr.csr();
                self.run_csrrw(a.rd, a.rs1, a.csr)?;
                Ok(Next(width))
            }
            Csrrs => {
                let a = instr.csr();
                self.run_csrrs(a.rd, a.rs1, a.csr)?;
                Ok(Next(width))
            }
            Csrrc => {
                let a = instr.csr();
                self.run_csrrc(a.rd, a.rs1, a.csr)?;
                Ok(Next(width))
            }
            Csrrwi => {
                let a = instr.csri();
                self.run_csrrwi(a.rd, a.imm, a.csr)?;
                Ok(Next(width))
            }
            Csrrsi => {
                let a = instr.csri();
                self.run_csrrsi(a.rd, a.imm, a.csr)?;
                Ok(Next(width))
            }
            Csrrci => {
                let a = instr.csri();
                self.run_csrrci(a.rd, a.imm, a.csr)?;
                Ok(Next(width))
            }

            // Privileged
            Ecall => self.run_ecall(),
            Ebreak => self.run_ebreak(),
            Mret => self.hart.run_mret(),
            Sret => self.hart.run_sret(),
            Wfi => {
                self.run_wfi();
                Ok(Next(width))
            }

            // RV32C
            CAddi4spn => {
                let a = instr.ciw();
                xregs.run_caddi4spn(a.imm, a.rd);
                Ok(Next(width))
            }
            CLw => {
                let a = instr.cl();
                self.run_clw(a.imm, a.rs1, a.rd)?;
                Ok(Next(width))
            }
            CSw => {
                let a = instr.cs();
                self.run_csw(a.imm, a.rs1, a.rs2)?;
                Ok(Next(width))
            }
            CNop => Ok(Next(width)),
            CAddi => {
                let a = instr.cib();
                xregs.run_caddi(a.imm, a.rd_rs1);
                Ok(Next(width))
            }
            CJal => {
                let a = instr.cj();
                self.hart.run_cjal(a.imm)
            }
            CLi => {
                let a = instr.cib();
                xregs.run_cli(a.imm, a.rd_rs1);
                Ok(Next(width))
            }
            CAddi16sp => {
                let a = instr.cib();
                xregs.run_caddi16sp(a.imm);
                Ok(Next(width))
            }
            CLui => {
                let a = instr.cib();
                xregs.run_clui(a.imm, a.rd_rs1);
                Ok(Next(width))
            }
            CSrli => {
                let a = instr.cib();
                xregs.run_csrli(a.imm, a.rd_rs1);
                Ok(Next(width))
            }
            CSrai => {
                let a = instr.cib();
                xregs.run_csrai(a.imm, a.rd_rs1);
                Ok(Next(width))
            }
            CAndi => {
                let a = instr.cib();
                xregs.run_candi(a.imm, a.rd_rs1);
                Ok(Next(width))
            }
            CSub => {
                let a = instr.cr();
                xregs.run_csub(a.rd_rs1, a.rs2);
                Ok(Next(width))
            }
            CXor => {
                let a = instr.cr();
                xregs.run_cxor(a.rd_rs1, a.rs2);
                Ok(Next(width))
            }
            COr => {
                let a = instr.cr();
                xregs.run_cor(a.rd_rs1, a.rs2);
                Ok(Next(width))
            }
            CAnd => {
                let a = instr.cr();
                xregs.run_cand(a.rd_rs1, a.rs2);
                Ok(Next(width))
            }
            CJ => {
                let a = instr.cj();
                self.hart.run_cj(a.imm)
            }
            CBeqz => {
                let a = instr.cib();
                self.hart.run_cbeqz(a.imm, a.rd_rs1)
            }
            CBnez => {
                let a = instr.cib();
                self.hart.run_cbnez(a.imm, a.rd_rs1)
            }
            CSlli => {
                let a = instr.cib();
                xregs.run_cslli(a.imm, a.rd_rs1);
                Ok(Next(width))
            }
            CLwsp => {
                let a = instr.cib();
                self.run_clwsp(a.imm, a.rd_rs1)?;
                Ok(Next(width))
            }
            CJr => {
                let a = instr.cr();
                self.hart.run_cjr(a.rd_rs1)
            }
            CMv => {
                let a = instr.cr();
                xregs.run_cmv(a.rd_rs1, a.rs2);
                Ok(Next(width))
            }
            CEbreak => self.run_ebreak(),
            CJalr => {
                let a = instr.cr();
                self.hart.run_cjalr(a.rd_rs1)
            }
            CAdd => {
                let a = instr.cr();
                xregs.run_cadd(a.rd_rs1, a.rs2);
                Ok(Next(width))
            }
            CSwsp => {
                let a = instr.css();
                self.run_cswsp(a.imm, a.rs2)?;
                Ok(Next(width))
            }

            // RV64C
            CLd => {
                let a = instr.cl();
                self.run_cld(a.imm, a.rs1, a.rd)?;
                Ok(Next(width))
            }
            CSd => {
                let a = instr.cs();
                self.run_csd(a.imm, a.rs1, a.rs2)?;
                Ok(Next(width))
            }
            CAddiw => {
                let a = instr.cib();
                xregs.run_caddiw(a.imm, a.rd_rs1);
                Ok(Next(width))
            }
            CSubw => {
                let a = instr.cr();
                xregs.run_csubw(a.rd_rs1, a.rs2);
                Ok(Next(width))
            }
            CAddw => {
                let a = instr.cr();
                xregs.run_caddw(a.rd_rs1, a.rs2);
                Ok(Next(width))
            }
            CLdsp => {
                let a = instr.cib();
                self.run_cldsp(a.imm, a.rd_rs1)?;
                Ok(Next(width))
            }
            CSdsp => {
                let a = instr.css();
                self.run_csdsp(a.imm, a.rs2)?;
                Ok(Next(width))
            }

            // Illegal encodings trap; there is no decode-failure path.
            Unknown | UnknownCompressed => {
                Err(Exception::IllegalInstruction(instr.unknown_bits()))
            }
        }
    }
}

/// Whether `[addr, addr + len)` wraps past the top of the address space.
fn wraps_around<X: Xlen>(addr: XValue<X>, len: usize) -> bool {
    let end = X::wrapping_add(addr, X::from_u64(len as u64 - 1));
    end < addr
}
