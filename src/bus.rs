// SPDX-License-Identifier: MIT

//! The physical side of the memory system.
//!
//! [`IoTarget`] is the narrow interface the core consumes: byte-range
//! reads, writes and fetches at physical addresses. Devices report how
//! many bytes they actually transferred; a short transfer is converted
//! into the verb-appropriate access fault by the virtual-memory layer.
//!
//! Targets take `&self` and are shared behind [`Arc`] — the bus owns its
//! own concurrency (the prefetch worker reads through the same target as
//! the executor).

use std::sync::Arc;
use std::sync::RwLock;

use crate::xlen::XValue;
use crate::xlen::Xlen;

/// Byte-range transactions at physical addresses.
pub trait IoTarget<X: Xlen>: Send + Sync {
    /// Read into `buf`. Returns the number of bytes transferred.
    fn read(&self, addr: XValue<X>, buf: &mut [u8]) -> usize;

    /// Write from `buf`. Returns the number of bytes transferred.
    fn write(&self, addr: XValue<X>, buf: &[u8]) -> usize;

    /// Instruction fetch. Defaults to [`IoTarget::read`]; devices that
    /// distinguish instruction traffic can override.
    fn fetch(&self, addr: XValue<X>, buf: &mut [u8]) -> usize {
        self.read(addr, buf)
    }
}

/// Shared handle to a bus target.
pub type SharedBus<X> = Arc<dyn IoTarget<X>>;

/// A flat RAM device mapped at a base address.
///
/// Reads and writes are truncated to the mapped range; accesses entirely
/// outside it transfer zero bytes.
pub struct MainMemory<X: Xlen> {
    base: XValue<X>,
    data: RwLock<Box<[u8]>>,
}

impl<X: Xlen> MainMemory<X> {
    pub fn new(base: XValue<X>, size: usize) -> Self {
        MainMemory {
            base,
            data: RwLock::new(vec![0u8; size].into_boxed_slice()),
        }
    }

    /// Offset of `addr` into the backing buffer, if it is mapped.
    fn offset(&self, addr: XValue<X>, len: usize) -> Option<(usize, usize)> {
        if addr < self.base {
            return None;
        }

        let offset = X::to_u64(X::wrapping_sub(addr, self.base));
        let size = self.data.read().unwrap().len() as u64;
        if offset >= size {
            return None;
        }

        let available = (size - offset) as usize;
        Some((offset as usize, len.min(available)))
    }

    /// Write a little-endian value, e.g. an instruction or a page-table
    /// entry, panicking when out of range. Test and loader convenience.
    pub fn write_value<const N: usize>(&self, addr: XValue<X>, bytes: [u8; N]) {
        let written = self.write(addr, &bytes);
        assert_eq!(written, N, "write outside mapped memory");
    }

    pub fn write_u16(&self, addr: XValue<X>, value: u16) {
        self.write_value(addr, value.to_le_bytes())
    }

    pub fn write_u32(&self, addr: XValue<X>, value: u32) {
        self.write_value(addr, value.to_le_bytes())
    }

    pub fn write_u64(&self, addr: XValue<X>, value: u64) {
        self.write_value(addr, value.to_le_bytes())
    }

    pub fn read_u64(&self, addr: XValue<X>) -> u64 {
        let mut buf = [0u8; 8];
        let read = self.read(addr, &mut buf);
        assert_eq!(read, 8, "read outside mapped memory");
        u64::from_le_bytes(buf)
    }
}

impl<X: Xlen> IoTarget<X> for MainMemory<X> {
    fn read(&self, addr: XValue<X>, buf: &mut [u8]) -> usize {
        let Some((offset, len)) = self.offset(addr, buf.len()) else {
            return 0;
        };
        let data = self.data.read().unwrap();
        buf[..len].copy_from_slice(&data[offset..offset + len]);
        len
    }

    fn write(&self, addr: XValue<X>, buf: &[u8]) -> usize {
        let Some((offset, len)) = self.offset(addr, buf.len()) else {
            return 0;
        };
        let mut data = self.data.write().unwrap();
        data[offset..offset + len].copy_from_slice(&buf[..len]);
        len
    }
}
