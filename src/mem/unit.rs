//! The memory unit itself: mode state, the bump allocator over the 40-bit
//! space, the context table, and raw byte access.
//!
//! Raw `read_byte`/`write_byte` are crate-internal; everything user-visible
//! goes through the accessors in [`crate::mem::access`], which can only be
//! constructed in [`Mode::Protected`].

use derive_more::{Display, Error};
use log::debug;

use crate::common::{Addr32, Byte, ContextId, Map, Vaddr};

use super::access::{AccessMode, PagedAccessor, StackAccessor};
use super::context::Context;

/// Size of one physical memory block.
pub const BLOCK_SIZE: u32 = 4096;

/// One past the highest virtual address (the space is 40 bits wide).
pub const VADDR_LIMIT: Vaddr = 1 << 40;

/// The memory unit's privilege mode.  Contexts are created and destroyed in
/// `Unprotected`; accessors exist only in `Protected`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum Mode {
    #[display("UNPROTECTED")]
    Unprotected,
    #[display("PROTECTED")]
    Protected,
}

/// Failures raised by the memory unit, its accessors, and the managed stack.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
pub enum MemError {
    #[display("operation requires {required} mode")]
    ModeViolation { required: Mode },
    #[display("context {id} does not exist")]
    UnknownContext { id: ContextId },
    #[display("address {addr:#010x} exceeds context size {size:#010x}")]
    AddressOutOfBounds { addr: Addr32, size: Addr32 },
    #[display("attempt to write through a read-only accessor")]
    WriteToReadOnly,
    #[display("context size must be at least one byte")]
    EmptyContext,
    #[display("virtual address space exhausted")]
    AddressSpaceExhausted,
    #[display("stack overflow")]
    StackOverflow,
    #[display("stack underflow")]
    StackUnderflow,
}

/// The virtual memory unit.
///
/// Owns the context table and all physical blocks.  Accessors borrow the
/// unit mutably, so a live accessor statically excludes mode switches and
/// context destruction for its whole lifetime.
pub struct MemUnit {
    mode: Mode,
    next_context_id: ContextId,
    next_free: Vaddr,
    contexts: Map<ContextId, Context>,
}

impl Default for MemUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl MemUnit {
    /// A fresh unit in [`Mode::Unprotected`] with an empty address space.
    pub fn new() -> Self {
        MemUnit {
            mode: Mode::Unprotected,
            next_context_id: 0,
            next_free: 0,
            contexts: Map::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            debug!("memory unit entering {mode} mode");
        }
        self.mode = mode;
    }

    pub fn is_protected(&self) -> bool {
        self.mode == Mode::Protected
    }

    fn require(&self, required: Mode) -> Result<(), MemError> {
        if self.mode == required {
            Ok(())
        } else {
            Err(MemError::ModeViolation { required })
        }
    }

    /// Create a context of `size` bytes.  Unprotected only.
    ///
    /// The context's base is assigned by a bump allocator over the 40-bit
    /// space; bases are never reused, even after `destroy_context`.
    pub fn create_context(&mut self, size: Addr32) -> Result<ContextId, MemError> {
        self.require(Mode::Unprotected)?;
        if size == 0 {
            return Err(MemError::EmptyContext);
        }

        let base = self.next_free;
        let end = base + Vaddr::from(size);
        if end > VADDR_LIMIT {
            return Err(MemError::AddressSpaceExhausted);
        }

        let id = self.next_context_id;
        self.next_context_id = self.next_context_id.wrapping_add(1);
        self.next_free = end;
        self.contexts.insert(id, Context::new(id, base, size));
        debug!("created context {id}: base {base:#012x}, size {size:#010x}");
        Ok(id)
    }

    /// Remove a context and free its physical blocks.  Unprotected only.
    pub fn destroy_context(&mut self, id: ContextId) -> Result<(), MemError> {
        self.require(Mode::Unprotected)?;
        self.contexts
            .remove(&id)
            .map(|_| debug!("destroyed context {id}"))
            .ok_or(MemError::UnknownContext { id })
    }

    pub fn context(&self, id: ContextId) -> Result<&Context, MemError> {
        self.contexts.get(&id).ok_or(MemError::UnknownContext { id })
    }

    pub(crate) fn context_mut(&mut self, id: ContextId) -> Result<&mut Context, MemError> {
        self.contexts
            .get_mut(&id)
            .ok_or(MemError::UnknownContext { id })
    }

    /// Find the context whose virtual range contains `addr`, if any.
    pub fn find_context_for_address(&self, addr: Vaddr) -> Option<&Context> {
        self.contexts.values().find(|ctx| ctx.contains(addr))
    }

    /// Make sure the block covering `addr` is physically allocated, so a
    /// later write cannot trigger an allocation.  Used by the stack
    /// accessor to pre-allocate the whole stack context.
    pub fn ensure_physical(&mut self, id: ContextId, addr: Addr32) -> Result<(), MemError> {
        let ctx = self.context_mut(id)?;
        if addr >= ctx.size() {
            return Err(MemError::AddressOutOfBounds {
                addr,
                size: ctx.size(),
            });
        }
        ctx.ensure_block(addr / BLOCK_SIZE);
        Ok(())
    }

    /// Read one byte from a context.  Unallocated blocks read as zero and
    /// stay unallocated.
    pub(crate) fn read_byte(&self, id: ContextId, addr: Addr32) -> Result<Byte, MemError> {
        let ctx = self.context(id)?;
        if addr >= ctx.size() {
            return Err(MemError::AddressOutOfBounds {
                addr,
                size: ctx.size(),
            });
        }
        Ok(ctx.read_allocated(addr))
    }

    /// Write one byte, allocating the covering block (zero-filled) first if
    /// needed.
    pub(crate) fn write_byte(&mut self, id: ContextId, addr: Addr32, value: Byte) -> Result<(), MemError> {
        let ctx = self.context_mut(id)?;
        if addr >= ctx.size() {
            return Err(MemError::AddressOutOfBounds {
                addr,
                size: ctx.size(),
            });
        }
        ctx.ensure_block(addr / BLOCK_SIZE);
        ctx.write_allocated(addr, value);
        Ok(())
    }

    /// Create a paged accessor over a context.  Protected only.
    pub fn paged(&mut self, id: ContextId, mode: AccessMode) -> Result<PagedAccessor<'_>, MemError> {
        self.require(Mode::Protected)?;
        let size = self.context(id)?.size();
        Ok(PagedAccessor::new(self, id, size, mode))
    }

    /// Create a direct 32-bit accessor over a stack context, pre-allocating
    /// every block in the context.  Protected only.
    pub fn stack_accessor(&mut self, id: ContextId, mode: AccessMode) -> Result<StackAccessor<'_>, MemError> {
        self.require(Mode::Protected)?;
        let size = self.context(id)?.size();
        let mut addr = 0;
        while addr < size {
            self.ensure_physical(id, addr)?;
            match addr.checked_add(BLOCK_SIZE) {
                Some(next) => addr = next,
                None => break,
            }
        }
        Ok(StackAccessor::new(self, id, size, mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unprotected_and_empty() {
        let mem = MemUnit::new();
        assert_eq!(mem.mode(), Mode::Unprotected);
        assert!(!mem.is_protected());
        assert!(mem.context(0).is_err());
    }

    #[test]
    fn create_context_assigns_monotonic_ids_and_bases() {
        let mut mem = MemUnit::new();
        let a = mem.create_context(100).unwrap();
        let b = mem.create_context(4096).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(mem.context(a).unwrap().base(), 0);
        assert_eq!(mem.context(b).unwrap().base(), 100);
        assert_eq!(mem.context(b).unwrap().size(), 4096);
    }

    #[test]
    fn create_context_rejects_zero_size() {
        let mut mem = MemUnit::new();
        assert_eq!(mem.create_context(0), Err(MemError::EmptyContext));
    }

    #[test]
    fn create_context_fails_in_protected_mode() {
        let mut mem = MemUnit::new();
        mem.set_mode(Mode::Protected);
        assert_eq!(
            mem.create_context(64),
            Err(MemError::ModeViolation {
                required: Mode::Unprotected
            })
        );
    }

    #[test]
    fn address_space_exhaustion() {
        let mut mem = MemUnit::new();
        // 256 maximal contexts cover the full 2^40 space.
        for _ in 0..256 {
            mem.create_context(u32::MAX).unwrap();
            mem.create_context(1).unwrap();
        }
        // The space is exactly full after 256 * 2^32 bytes.
        assert_eq!(mem.create_context(2), Err(MemError::AddressSpaceExhausted));
        assert_eq!(mem.create_context(1), Err(MemError::AddressSpaceExhausted));
    }

    #[test]
    fn destroy_context_removes_it() {
        let mut mem = MemUnit::new();
        let id = mem.create_context(64).unwrap();
        mem.destroy_context(id).unwrap();
        assert_eq!(mem.context(id).err(), Some(MemError::UnknownContext { id }));
        assert_eq!(
            mem.destroy_context(id),
            Err(MemError::UnknownContext { id })
        );
    }

    #[test]
    fn destroy_context_fails_in_protected_mode() {
        let mut mem = MemUnit::new();
        let id = mem.create_context(64).unwrap();
        mem.set_mode(Mode::Protected);
        assert_eq!(
            mem.destroy_context(id),
            Err(MemError::ModeViolation {
                required: Mode::Unprotected
            })
        );
    }

    #[test]
    fn fresh_memory_reads_zero_without_allocating() {
        let mut mem = MemUnit::new();
        let id = mem.create_context(10_000).unwrap();
        for addr in [0, 1, 4095, 4096, 9999] {
            assert_eq!(mem.read_byte(id, addr).unwrap(), 0);
        }
        assert_eq!(mem.context(id).unwrap().allocated_blocks(), 0);
    }

    #[test]
    fn write_allocates_only_the_covering_block() {
        let mut mem = MemUnit::new();
        let id = mem.create_context(3 * BLOCK_SIZE).unwrap();
        mem.write_byte(id, BLOCK_SIZE + 7, 0xAB).unwrap();
        assert_eq!(mem.context(id).unwrap().allocated_blocks(), 1);
        assert_eq!(mem.read_byte(id, BLOCK_SIZE + 7).unwrap(), 0xAB);
        // Neighbouring blocks still read zero, unallocated.
        assert_eq!(mem.read_byte(id, 0).unwrap(), 0);
        assert_eq!(mem.read_byte(id, 2 * BLOCK_SIZE).unwrap(), 0);
        assert_eq!(mem.context(id).unwrap().allocated_blocks(), 1);
    }

    #[test]
    fn reads_and_writes_bounds_checked() {
        let mut mem = MemUnit::new();
        let id = mem.create_context(64).unwrap();
        assert_eq!(
            mem.read_byte(id, 64),
            Err(MemError::AddressOutOfBounds { addr: 64, size: 64 })
        );
        assert_eq!(
            mem.write_byte(id, 100, 1),
            Err(MemError::AddressOutOfBounds { addr: 100, size: 64 })
        );
        assert!(mem.read_byte(7, 0).is_err());
    }

    #[test]
    fn find_context_for_address() {
        let mut mem = MemUnit::new();
        let a = mem.create_context(100).unwrap();
        let b = mem.create_context(50).unwrap();
        assert_eq!(mem.find_context_for_address(0).map(|c| c.id()), Some(a));
        assert_eq!(mem.find_context_for_address(99).map(|c| c.id()), Some(a));
        assert_eq!(mem.find_context_for_address(100).map(|c| c.id()), Some(b));
        assert_eq!(mem.find_context_for_address(150), None);
    }

    #[test]
    fn accessor_creation_requires_protected_mode() {
        let mut mem = MemUnit::new();
        let id = mem.create_context(64).unwrap();
        assert!(matches!(
            mem.paged(id, AccessMode::ReadWrite),
            Err(MemError::ModeViolation {
                required: Mode::Protected
            })
        ));
        assert!(matches!(
            mem.stack_accessor(id, AccessMode::ReadWrite),
            Err(MemError::ModeViolation {
                required: Mode::Protected
            })
        ));
    }

    #[test]
    fn stack_accessor_preallocates_every_block() {
        let mut mem = MemUnit::new();
        let id = mem.create_context(2 * BLOCK_SIZE + 16).unwrap();
        mem.set_mode(Mode::Protected);
        mem.stack_accessor(id, AccessMode::ReadWrite).unwrap();
        assert_eq!(mem.context(id).unwrap().allocated_blocks(), 3);
    }
}
