use std::collections::HashMap;

use crate::runtime::error::{self, ErrorKind, ScriptError};

/// The set of live heap allocations owned by the evaluator.  Each allocation is a contiguous byte
/// buffer; the program sees its base address as an opaque 64-bit integer and reads and writes
/// through it with `@ ! c@ c!`.
///
/// The map is the authoritative record of which addresses are alive: an address is freeable iff
/// it is a key here.  Buffers are boxed so their storage never moves while the map is rehashed,
/// which keeps every handed-out address stable for the buffer's whole lifetime.
///
/// Reads and writes are raw and unchecked.  An address outside any live allocation is undefined
/// behavior the evaluator makes no attempt to detect, matching the language's manual memory
/// model.
#[derive(Default)]
pub struct Heap {
    allocs: HashMap<i64, Box<[u8]>>,
}

impl Heap {
    /// Create a new heap with no live allocations.
    pub fn new() -> Heap {
        Heap {
            allocs: HashMap::new(),
        }
    }

    /// Allocate a fresh buffer of the given size and return its address.  The size must be
    /// positive; buffer contents are unspecified.
    pub fn alloc(&mut self, size: i64) -> error::Result<i64> {
        if size <= 0 {
            return Err(ScriptError::new(ErrorKind::InvalidAlloc(size), None));
        }

        let buffer = vec![0u8; size as usize].into_boxed_slice();
        let address = buffer.as_ptr() as i64;

        let _ = self.allocs.insert(address, buffer);
        Ok(address)
    }

    /// Allocate a fresh buffer holding a copy of the given bytes and return its address.  Used
    /// for string literals.  An empty literal still occupies one byte so that every literal gets
    /// a unique live address.
    pub fn alloc_bytes(&mut self, bytes: &[u8]) -> error::Result<i64> {
        let size = bytes.len().max(1) as i64;
        let address = self.alloc(size)?;

        let buffer = self.allocs.get_mut(&address).unwrap();
        buffer[..bytes.len()].copy_from_slice(bytes);

        Ok(address)
    }

    /// Release the allocation at the given address.  Fails if the address is not a live
    /// allocation of this heap.
    pub fn free(&mut self, address: i64) -> error::Result<()> {
        match self.allocs.remove(&address) {
            Some(_) => Ok(()),
            None => Err(ScriptError::new(ErrorKind::InvalidFree(address), None)),
        }
    }

    /// Write a full cell at the address in host endianness.
    pub fn store(&mut self, address: i64, value: i64) {
        unsafe { (address as *mut i64).write_unaligned(value) };
    }

    /// Read a full cell from the address in host endianness.
    pub fn fetch(&self, address: i64) -> i64 {
        unsafe { (address as *const i64).read_unaligned() }
    }

    /// Write the low byte of the value at the address.
    pub fn store_byte(&mut self, address: i64, value: i64) {
        unsafe { (address as *mut u8).write(value as u8) };
    }

    /// Read one byte from the address, zero-extended to a cell.
    pub fn fetch_byte(&self, address: i64) -> i64 {
        unsafe { (address as *const u8).read() as i64 }
    }

    /// How many allocations are live?
    pub fn len(&self) -> usize {
        self.allocs.len()
    }

    /// Are there no live allocations?
    pub fn is_empty(&self) -> bool {
        self.allocs.is_empty()
    }
}
