//! The virtual memory unit: a two-mode manager of a 40-bit virtual address
//! space, carved into contexts with lazily allocated 4 KiB physical blocks,
//! plus the accessors that mediate all byte-level I/O.

pub mod access;
pub mod context;
pub mod stack;
pub mod unit;

pub use access::{AccessMode, PagedAccessor, StackAccessor};
pub use context::Context;
pub use stack::{Stack, StackView};
pub use unit::{MemError, MemUnit, Mode, BLOCK_SIZE};
