// SPDX-License-Identifier: MIT

//! Virtual-address translation: the Sv32/Sv39/Sv48/Sv57 page-table walk.
//!
//! [`Translator`] is a snapshot of the architectural inputs that determine
//! translation (privilege mode, `mstatus`, `satp`). Given the same snapshot
//! and the same page tables, translation is deterministic — which is what
//! lets both the translation cache and the prefetch worker reuse results
//! until an invalidation event arrives.

pub mod pte;
pub mod translation_cache;

use pte::PageTableEntry;

use crate::bits::ones;
use crate::bits::Bits64;
use crate::bus::IoTarget;
use crate::machine_state::csregisters::satp::Satp;
use crate::machine_state::csregisters::satp::SvConstants;
use crate::machine_state::csregisters::satp::SvLength;
use crate::machine_state::csregisters::satp::TranslationAlgorithm;
use crate::machine_state::csregisters::xstatus::MStatus;
use crate::machine_state::mode::Mode;
use crate::traps::Exception;
use crate::xlen::XValue;
use crate::xlen::Xlen;

/// Offset of the `page offset` field in virtual and physical addresses.
pub const PAGE_OFFSET_WIDTH: usize = 12;
pub const PAGE_SIZE: u64 = 1 << PAGE_OFFSET_WIDTH;
pub const OFFSET_MASK: u64 = PAGE_SIZE - 1;

/// Access type that is used in the virtual address translation process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessType {
    Instruction,
    Load,
    Store,
}

impl AccessType {
    /// The page fault corresponding to this access type.
    pub fn page_fault<X: Xlen>(&self, addr: XValue<X>) -> Exception<X> {
        match self {
            AccessType::Instruction => Exception::InstructionPageFault(addr),
            AccessType::Load => Exception::LoadPageFault(addr),
            AccessType::Store => Exception::StoreAMOPageFault(addr),
        }
    }

    /// The access fault corresponding to this access type.
    pub fn access_fault<X: Xlen>(&self, addr: XValue<X>) -> Exception<X> {
        match self {
            AccessType::Instruction => Exception::InstructionAccessFault(addr),
            AccessType::Load => Exception::LoadAccessFault(addr),
            AccessType::Store => Exception::StoreAMOAccessFault(addr),
        }
    }
}

/// Result of translating one virtual address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Translation<X: Xlen> {
    /// Physical address the queried virtual address maps to.
    pub phys: XValue<X>,
    /// Last virtual address covered by the same leaf mapping. Multi-byte
    /// accesses up to and including this address can reuse `phys` plus an
    /// offset.
    pub valid_through: XValue<X>,
}

/// Snapshot of the architectural state driving address translation.
#[derive(Clone, Copy, Debug)]
pub struct Translator<X: Xlen> {
    pub mode: Mode,
    pub mstatus: MStatus,
    pub satp: Satp,
    _width: std::marker::PhantomData<X>,
}

impl<X: Xlen> Translator<X> {
    pub fn new(mode: Mode, mstatus: MStatus, satp: Satp) -> Self {
        Translator {
            mode,
            mstatus,
            satp,
            _width: std::marker::PhantomData,
        }
    }

    /// Get the effective hart mode when addressing memory.
    ///
    /// When MPRV=1, load and store addresses are translated and protected
    /// as though the current privilege mode were MPP. Instruction
    /// address-translation is unaffected by MPRV.
    #[inline]
    pub fn effective_mode(&self, access_type: AccessType) -> Mode {
        match access_type {
            AccessType::Load | AccessType::Store if self.mstatus.mprv() => {
                self.mstatus.mpp().into()
            }
            _ => self.mode,
        }
    }

    /// Get the effective translation algorithm for this access.
    /// Machine-mode accesses and Bare `satp` are identity-mapped.
    #[inline]
    pub fn algorithm(&self, access_type: AccessType) -> TranslationAlgorithm {
        if let Mode::Machine = self.effective_mode(access_type) {
            return TranslationAlgorithm::Bare;
        }

        self.satp.mode
    }

    /// Translate a virtual address, walking the page tables through `bus`.
    ///
    /// All failures are reported as the verb-appropriate trap cause; the
    /// translator itself never raises anything on the hart.
    pub fn translate(
        &self,
        bus: &dyn IoTarget<X>,
        v_addr: XValue<X>,
        access_type: AccessType,
    ) -> Result<Translation<X>, Exception<X>> {
        let sv_length = match self.algorithm(access_type) {
            TranslationAlgorithm::Bare => {
                return Ok(Translation {
                    phys: v_addr,
                    valid_through: X::MAX,
                })
            }
            TranslationAlgorithm::Sv32 => SvLength::Sv32,
            TranslationAlgorithm::Sv39 => SvLength::Sv39,
            TranslationAlgorithm::Sv48 => SvLength::Sv48,
            TranslationAlgorithm::Sv57 => SvLength::Sv57,
        };

        sv_translate(
            bus,
            v_addr,
            &self.satp,
            sv_length,
            access_type,
            self.mstatus,
            self.effective_mode(access_type),
        )
    }
}

/// Virtual page number segment `idx` of `v_addr`.
#[inline]
fn vpn_segment(v_addr: u64, sv_length: SvLength, idx: usize) -> u64 {
    let SvConstants { vpn_width, .. } = sv_length.algorithm_constants();
    (v_addr >> (PAGE_OFFSET_WIDTH + idx * vpn_width)) & ones(vpn_width as u64)
}

/// Check that the bits above the virtual-address width are the sign
/// extension of the top VA bit. Sv32 virtual addresses occupy the whole
/// register, so there is nothing to check.
fn is_canonical(v_addr: u64, sv_length: SvLength) -> bool {
    let SvConstants {
        levels, vpn_width, ..
    } = sv_length.algorithm_constants();
    let va_width = PAGE_OFFSET_WIDTH + levels * vpn_width;
    if va_width >= 64 {
        return true;
    }

    let shift = 64 - va_width;
    ((v_addr as i64) << shift >> shift) as u64 == v_addr
}

/// Implementation of the virtual address translation, following the
/// numbered steps of the privileged spec's walk.
fn sv_translate<X: Xlen>(
    bus: &dyn IoTarget<X>,
    v_addr: XValue<X>,
    satp: &Satp,
    sv_length: SvLength,
    access_type: AccessType,
    mstatus: MStatus,
    effective_mode: Mode,
) -> Result<Translation<X>, Exception<X>> {
    let SvConstants {
        levels,
        pte_size,
        vpn_width,
    } = sv_length.algorithm_constants();

    let va = X::to_u64(v_addr);
    let page_fault = || access_type.page_fault::<X>(v_addr);

    if sv_length != SvLength::Sv32 && !is_canonical(va, sv_length) {
        return Err(page_fault());
    }

    // 1. Let a be satp.ppn × PAGESIZE, and let i = LEVELS − 1.
    let mut i = levels - 1;
    let mut a = satp.ppn * PAGE_SIZE;

    let pte = loop {
        // 2. Let pte be the value of the PTE at address a + va.vpn[i] × PTESIZE.
        //    A short transfer from the bus during the walk is an access
        //    fault corresponding to the original access type.
        let pte_addr = a + vpn_segment(va, sv_length, i) * pte_size;
        let mut buf = [0u8; 8];
        let wanted = pte_size as usize;
        let read = bus.read(X::from_u64(pte_addr), &mut buf[..wanted]);
        if read != wanted {
            return Err(access_type.access_fault::<X>(v_addr));
        }
        let pte = PageTableEntry::from_bits(u64::from_le_bytes(buf));

        // 3. If pte.v = 0, or if pte.r = 0 and pte.w = 1, stop and raise a
        //    page-fault exception corresponding to the original access type.
        if !pte.v() || (!pte.r() && pte.w()) {
            return Err(page_fault());
        }

        // 4. Otherwise, the PTE is valid. If pte.r = 1 or pte.x = 1, a leaf
        //    has been found. Otherwise descend: i = i − 1; if i < 0 fault,
        //    else a = pte.ppn × PAGESIZE.
        if pte.r() || pte.x() {
            break pte;
        }

        if i == 0 {
            return Err(page_fault());
        }
        i -= 1;
        a = pte.full_ppn(sv_length) * PAGE_SIZE;
    };

    // 5. A leaf PTE has been found. Determine if the access is allowed by
    //    the pte.r/w/x/u bits, given the effective privilege mode and the
    //    SUM and MXR fields of mstatus.
    let allowed = match access_type {
        AccessType::Instruction => pte.x(),
        AccessType::Load => pte.r() || (mstatus.mxr() && pte.x()),
        AccessType::Store => pte.w(),
    };
    if !allowed {
        return Err(page_fault());
    }

    match effective_mode {
        Mode::User => {
            if !pte.u() {
                return Err(page_fault());
            }
        }
        Mode::Supervisor if pte.u() => {
            // Supervisor code never executes from user pages, and only
            // touches them for data when SUM is set.
            if access_type == AccessType::Instruction || !mstatus.sum() {
                return Err(page_fault());
            }
        }
        _ => {}
    }

    // 6. If i > 0 and pte.ppn[i−1:0] != 0, this is a misaligned superpage.
    for idx in 0..i {
        if pte.ppn_segment(sv_length, idx) != Some(0) {
            return Err(page_fault());
        }
    }

    // 7. If pte.a = 0, or the access is a store and pte.d = 0, raise a
    //    page-fault exception (Svade: no hardware A/D updating).
    if !pte.a() || (access_type == AccessType::Store && !pte.d()) {
        return Err(page_fault());
    }

    // 8. The translation is successful:
    //    pa.pgoff = va.pgoff;
    //    pa.ppn[i−1:0] = va.vpn[i−1:0] (superpage translation);
    //    pa.ppn[LEVELS−1:i] = pte.ppn[LEVELS−1:i].
    let pa_ppn = (|| {
        let mut pa_ppn = 0u64;
        for idx in 0..i {
            let (_, shift) = PageTableEntry::ppn_segment_range(sv_length, idx)?;
            pa_ppn |= vpn_segment(va, sv_length, idx) << shift;
        }
        for idx in i..levels {
            let (_, shift) = PageTableEntry::ppn_segment_range(sv_length, idx)?;
            pa_ppn |= pte.ppn_segment(sv_length, idx)? << shift;
        }
        Some(pa_ppn)
    })();
    let pa_ppn = match pa_ppn {
        Some(pa_ppn) => pa_ppn,
        None => return Err(page_fault()),
    };

    let phys = (pa_ppn << PAGE_OFFSET_WIDTH) | (va & OFFSET_MASK);

    // The leaf at level i spans 12 + i × vpn_width bits of the address.
    let span_mask = ones((PAGE_OFFSET_WIDTH + i * vpn_width) as u64);

    Ok(Translation {
        phys: X::from_u64(phys),
        valid_through: X::from_u64(va | span_mask),
    })
}
