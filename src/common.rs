//! Common definitions that are shared between the machine and the assembler.

// Use sorted sets and maps for consistent output
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Interned symbol names in the assembler.
pub type SymId = internment::Intern<String>;

/// A byte of machine memory.
pub type Byte = u8;
/// A machine word (two bytes, little-endian in memory).
pub type Word = u16;
/// A 16-bit address or offset within a page.
pub type Addr = u16;
/// A 16-bit page number.
pub type Page = u16;
/// A 32-bit address within a context.
pub type Addr32 = u32;
/// A virtual address in the memory unit's 40-bit space.
pub type Vaddr = u64;
/// Identifier of a memory context.
pub type ContextId = u16;

/// An assembler diagnostic, anchored to a source position.  Passes
/// accumulate these and the pipeline gates on them.
#[derive(Clone, PartialEq, Eq, Debug, derive_more::Display)]
#[display("line {line}:{column}: {message}")]
pub struct SourceError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl SourceError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        SourceError {
            line,
            column,
            message: message.into(),
        }
    }
}
