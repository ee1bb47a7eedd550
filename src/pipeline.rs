//! The file-to-binary assembly pipeline: six passes, each gated on the
//! previous pass finishing without errors, so the user sees every
//! diagnostic one pass can produce before the next pass runs.

use log::info;

use crate::back;
use crate::common::SourceError;
use crate::front;
use crate::middle::{self, SymbolTable};

/// The result of a successful assembly.
#[derive(Debug)]
pub struct AssembleOutput {
    pub binary: Vec<u8>,
    pub data_size: u32,
    pub code_size: u32,
}

/// Assemble a source file into a binary image.  On failure, returns every
/// error the failing pass accumulated.
pub fn assemble(source: &str, program_name: &str) -> Result<AssembleOutput, Vec<SourceError>> {
    info!("pass 1: lexing");
    let tokens = front::tokenize(source)?;

    info!("pass 2: parsing");
    let (mut program, errors) = front::parse(tokens);
    if !errors.is_empty() {
        return Err(errors);
    }

    info!("pass 3: rewriting sugar");
    front::rewrite(&mut program);

    info!("pass 4: semantic analysis");
    let mut symbols = SymbolTable::new();
    let errors = front::analyze(&program, &mut symbols);
    if !errors.is_empty() {
        return Err(errors);
    }

    info!("pass 5: lowering to the code graph");
    let (mut graph, errors) = middle::lower(&program, &mut symbols);
    if !errors.is_empty() {
        return Err(errors);
    }

    info!("pass 6: resolving addresses and emitting");
    let errors = back::resolve(&mut graph, &mut symbols);
    if !errors.is_empty() {
        return Err(errors);
    }

    let binary = back::emit(&graph, program_name);
    Ok(AssembleOutput {
        binary,
        data_size: graph.data_segment_size(),
        code_size: graph.code_segment_size(),
    })
}
