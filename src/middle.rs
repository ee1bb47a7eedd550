//! The middle of the assembler: the symbol table and the code-graph IR,
//! plus the lowering pass that builds the graph from the AST.

pub mod graph;
pub mod lower;
pub mod symbols;

pub use graph::{CodeGraph, CodeNode, DataBlock, IrInstruction, IrOperand};
pub use lower::lower;
pub use symbols::{Symbol, SymbolKind, SymbolTable};
