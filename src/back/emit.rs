//! Binary emission: serialise a resolved code graph into the container
//! format the loader parses.  See [`crate::machine::loader`] for the
//! byte-exact layout.

use log::debug;

use crate::common::Byte;
use crate::isa::{HEADER_VERSION, MACHINE_NAME, MACHINE_VERSION, PROGRAM_NAME_MAX};
use crate::middle::graph::CodeGraph;

fn push_u16(out: &mut Vec<Byte>, value: u16) {
    out.extend(value.to_le_bytes());
}

fn push_u32(out: &mut Vec<Byte>, value: u32) {
    out.extend(value.to_le_bytes());
}

/// A version is four bytes: major, minor, then the revision written high
/// byte first.  Only revision 0 is ever written, which keeps the loader's
/// little-endian read in agreement.
fn push_version(out: &mut Vec<Byte>, (major, minor, revision): (u8, u8, u16)) {
    out.push(major);
    out.push(minor);
    out.push((revision >> 8) as Byte);
    out.push((revision & 0xFF) as Byte);
}

/// Serialise the graph into a complete binary image.
pub fn emit(graph: &CodeGraph, program_name: &str) -> Vec<Byte> {
    let machine_name = MACHINE_NAME.as_bytes();
    let program_name = &program_name.as_bytes()[..program_name.len().min(PROGRAM_NAME_MAX)];

    let header_size = 2 + 4 + 1 + machine_name.len() + 4 + 2 + program_name.len();

    let mut out = Vec::new();
    push_u16(&mut out, header_size as u16);
    push_version(&mut out, HEADER_VERSION);
    out.push(machine_name.len() as Byte);
    out.extend(machine_name);
    push_version(&mut out, MACHINE_VERSION);
    push_u16(&mut out, program_name.len() as u16);
    out.extend(program_name);

    let data = graph.data_bytes();
    push_u32(&mut out, data.len() as u32);
    out.extend(&data);

    let code = graph.code_bytes();
    push_u32(&mut out, code.len() as u32);
    out.extend(&code);

    debug!(
        "emitted {} bytes ({} data, {} code)",
        out.len(),
        data.len(),
        code.len()
    );
    out
}
