//! Address resolution.
//!
//! Data and code live in separate address spaces, both starting at 0.
//! Data blocks are laid out in insertion order (each occupying its size
//! prefix plus payload); code nodes likewise, with labels pinning their
//! address while occupying no bytes.  Once every address is known, `DA`
//! blocks are back-patched and operand symbols are folded into their
//! encoded address fields.

use log::debug;

use crate::common::SourceError;
use crate::middle::graph::{CodeGraph, CodeNode, IrOperand};
use crate::middle::symbols::SymbolTable;

/// Run the pass, mutating the graph in place.
pub fn resolve(graph: &mut CodeGraph, symbols: &mut SymbolTable) -> Vec<SourceError> {
    let mut errors = Vec::new();

    // Data segment layout.
    let mut address: u32 = 0;
    for block in &mut graph.data_blocks {
        block.address = address;
        symbols.set_address(block.label, address);
        address += block.size();
    }
    let data_size = address;

    // Code segment layout: a separate space, also from 0.
    let mut address: u32 = 0;
    for node in &mut graph.code_nodes {
        match node {
            CodeNode::Label { name } => {
                symbols.set_address(*name, address);
            }
            CodeNode::Instruction(instruction) => {
                instruction.address = address;
                address += instruction.size();
            }
        }
    }
    debug!("resolved layout: {data_size} data bytes, {address} code bytes");

    // DA back-patch, now that every referent has an address.
    for block in &mut graph.data_blocks {
        if block.address_refs.is_empty() {
            continue;
        }
        // Slots sit behind the 2-byte size prefix, one word each.
        let mut at = 2;
        for referent in &block.address_refs {
            match symbols.get(*referent) {
                Some(symbol) if symbol.resolved => {
                    let word = (symbol.address & 0xFFFF) as u16;
                    block.bytes[at..at + 2].copy_from_slice(&word.to_le_bytes());
                }
                _ => {
                    errors.push(SourceError::new(
                        0,
                        0,
                        format!("address array '{}' refers to unresolved '{referent}'", block.label),
                    ));
                }
            }
            at += 2;
        }
    }

    // Fold symbol addresses into operand encodings.
    for node in &mut graph.code_nodes {
        let CodeNode::Instruction(instruction) = node else {
            continue;
        };
        let (line, column) = (instruction.line, instruction.column);
        for operand in &mut instruction.operands {
            match operand {
                IrOperand::Addr {
                    symbol: Some(name),
                    address,
                } => match symbols.get(*name) {
                    Some(symbol) if symbol.resolved => *address = symbol.address,
                    _ => errors.push(SourceError::new(
                        line,
                        column,
                        format!("symbol '{name}' has no resolved address"),
                    )),
                },
                IrOperand::Expr {
                    symbol,
                    offset,
                    address,
                    ..
                } => {
                    let base = match symbol {
                        Some(name) => match symbols.get(*name) {
                            Some(entry) if entry.resolved => entry.address,
                            _ => {
                                errors.push(SourceError::new(
                                    line,
                                    column,
                                    format!("symbol '{name}' has no resolved address"),
                                ));
                                continue;
                            }
                        },
                        None => 0,
                    };
                    *address = base.wrapping_add(*offset as u32);
                }
                _ => {}
            }
        }
    }

    errors
}
