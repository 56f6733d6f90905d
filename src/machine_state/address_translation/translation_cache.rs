// SPDX-License-Identifier: MIT

//! Software TLB over the page-table walk.
//!
//! Three direct-mapped ways, one per access type, each of `2^bits`
//! entries indexed by `(va >> 12) mod 2^bits`. An entry stores the whole
//! virtual page number, so the tag comparison covers index aliasing as
//! well. Entries are installed at 4 KiB granularity even for superpage
//! leaves; the reported `valid_through` is then the 4 KiB page end, which
//! is a sound narrowing of the walk's result.
//!
//! The cache trusts its invalidation events completely: `clear()` must be
//! called whenever `satp`, the translation-relevant `mstatus` bits, the
//! privilege mode or the page tables (SFENCE.VMA) change.

use super::Translation;
use super::AccessType;
use super::OFFSET_MASK;
use crate::xlen::XValue;
use crate::xlen::Xlen;

#[derive(Clone, Copy)]
struct Entry<X: Xlen> {
    valid: bool,
    virt_page: XValue<X>,
    phys_page: XValue<X>,
}

impl<X: Xlen> Entry<X> {
    const INVALID: Entry<X> = Entry {
        valid: false,
        virt_page: X::ZERO,
        phys_page: X::ZERO,
    };
}

/// Direct-mapped translation cache with one way per access type.
pub struct TranslationCache<X: Xlen> {
    bits: u32,
    ways: [Vec<Entry<X>>; 3],
    hits: u64,
    misses: u64,
}

impl<X: Xlen> TranslationCache<X> {
    /// A cache with `2^bits` entries per access type. `bits = 0` disables
    /// caching entirely.
    pub fn new(bits: u32) -> Self {
        let len = if bits == 0 { 0 } else { 1usize << bits };
        TranslationCache {
            bits,
            ways: [
                vec![Entry::INVALID; len],
                vec![Entry::INVALID; len],
                vec![Entry::INVALID; len],
            ],
            hits: 0,
            misses: 0,
        }
    }

    #[inline]
    fn entry_index(&self, v_addr: XValue<X>) -> usize {
        let page = X::to_u64(v_addr) >> super::PAGE_OFFSET_WIDTH;
        (page & ((1u64 << self.bits) - 1)) as usize
    }

    /// Look up a cached translation.
    #[inline]
    pub fn translate(
        &mut self,
        access_type: AccessType,
        v_addr: XValue<X>,
    ) -> Option<Translation<X>> {
        if self.bits == 0 {
            return None;
        }

        let page_mask = X::from_u64(OFFSET_MASK);
        let virt_page = v_addr & !page_mask;
        let index = self.entry_index(v_addr);
        let entry = &self.ways[access_type as usize][index];

        if entry.valid && entry.virt_page == virt_page {
            self.hits += 1;
            Some(Translation {
                phys: entry.phys_page | (v_addr & page_mask),
                valid_through: virt_page | page_mask,
            })
        } else {
            self.misses += 1;
            None
        }
    }

    /// Install a translation produced by the walker.
    #[inline]
    pub fn install(
        &mut self,
        access_type: AccessType,
        v_addr: XValue<X>,
        translation: &Translation<X>,
    ) {
        if self.bits == 0 {
            return;
        }

        let page_mask = X::from_u64(OFFSET_MASK);
        let index = self.entry_index(v_addr);
        self.ways[access_type as usize][index] = Entry {
            valid: true,
            virt_page: v_addr & !page_mask,
            phys_page: translation.phys & !page_mask,
        };
    }

    /// Invalidate every entry in all three ways.
    pub fn clear(&mut self) {
        for way in &mut self.ways {
            way.fill(Entry::INVALID);
        }
    }

    /// Number of lookups answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of lookups that required a fresh walk.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}
