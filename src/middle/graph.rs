//! The code graph: the assembler's intermediate representation.
//!
//! Two ordered sequences — data blocks and code nodes — whose insertion
//! order *is* the segment byte order.  Data blocks carry their final
//! bytes (a little-endian u16 size prefix plus payload), with `DA` slots
//! zero until the back end patches them.  Code nodes are labels (size 0)
//! or instructions.

use crate::common::{Byte, SymId};
use crate::isa::{Opcode, RegCode};

/// One operand in the encoded instruction stream.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum IrOperand {
    /// One-byte immediate.
    ImmByte(Byte),
    /// Two-byte little-endian immediate.
    ImmWord(u16),
    /// One-byte register code.
    Reg(RegCode),
    /// Four-byte little-endian address.  `symbol` is `None` for numeric
    /// addresses, which are resolved from the start.
    Addr {
        symbol: Option<SymId>,
        address: u32,
    },
    /// Four-byte little-endian resolved `base + constant` address.  A
    /// register term, if present, rides along unencoded.
    Expr {
        symbol: Option<SymId>,
        offset: i32,
        register: Option<RegCode>,
        address: u32,
    },
}

impl IrOperand {
    /// Encoded width in bytes.
    pub fn width(&self) -> u32 {
        match self {
            IrOperand::ImmByte(_) | IrOperand::Reg(_) => 1,
            IrOperand::ImmWord(_) => 2,
            IrOperand::Addr { .. } | IrOperand::Expr { .. } => 4,
        }
    }

    pub fn encode_into(&self, out: &mut Vec<Byte>) {
        match self {
            IrOperand::ImmByte(value) => out.push(*value),
            IrOperand::ImmWord(value) => out.extend(value.to_le_bytes()),
            IrOperand::Reg(code) => out.push(code.encode()),
            IrOperand::Addr { address, .. } | IrOperand::Expr { address, .. } => {
                out.extend(address.to_le_bytes())
            }
        }
    }
}

/// An instruction in the graph.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct IrInstruction {
    pub mnemonic: String,
    pub opcode: Opcode,
    pub operands: Vec<IrOperand>,
    pub address: u32,
    pub line: usize,
    pub column: usize,
}

impl IrInstruction {
    /// Opcode byte plus operand widths.
    pub fn size(&self) -> u32 {
        1 + self.operands.iter().map(IrOperand::width).sum::<u32>()
    }

    pub fn encode(&self) -> Vec<Byte> {
        let mut out = Vec::with_capacity(self.size() as usize);
        out.push(self.opcode as Byte);
        for operand in &self.operands {
            operand.encode_into(&mut out);
        }
        out
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum CodeNode {
    /// A label: marks an address, occupies no bytes.
    Label { name: SymId },
    Instruction(IrInstruction),
}

impl CodeNode {
    pub fn size(&self) -> u32 {
        match self {
            CodeNode::Label { .. } => 0,
            CodeNode::Instruction(instruction) => instruction.size(),
        }
    }
}

/// A block in the data segment.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DataBlock {
    pub label: SymId,
    /// Size prefix plus payload; `DA` slots are zero until resolve.
    pub bytes: Vec<Byte>,
    /// For `DA` blocks: the labels whose addresses fill the slots.
    pub address_refs: Vec<SymId>,
    pub address: u32,
}

impl DataBlock {
    pub fn size(&self) -> u32 {
        self.bytes.len() as u32
    }
}

#[derive(Default)]
pub struct CodeGraph {
    pub data_blocks: Vec<DataBlock>,
    pub code_nodes: Vec<CodeNode>,
}

impl CodeGraph {
    pub fn data_segment_size(&self) -> u32 {
        self.data_blocks.iter().map(DataBlock::size).sum()
    }

    pub fn code_segment_size(&self) -> u32 {
        self.code_nodes.iter().map(CodeNode::size).sum()
    }

    pub fn data_bytes(&self) -> Vec<Byte> {
        let mut out = Vec::with_capacity(self.data_segment_size() as usize);
        for block in &self.data_blocks {
            out.extend(&block.bytes);
        }
        out
    }

    pub fn code_bytes(&self) -> Vec<Byte> {
        let mut out = Vec::with_capacity(self.code_segment_size() as usize);
        for node in &self.code_nodes {
            if let CodeNode::Instruction(instruction) = node {
                out.extend(instruction.encode());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::symbols::sym;

    #[test]
    fn operand_widths_match_the_encoding() {
        let operands = [
            IrOperand::ImmByte(7),
            IrOperand::ImmWord(0x1234),
            IrOperand::Reg(RegCode::Cx),
            IrOperand::Addr {
                symbol: None,
                address: 0x01020304,
            },
            IrOperand::Expr {
                symbol: Some(sym("t")),
                offset: 2,
                register: None,
                address: 0x10,
            },
        ];
        for operand in &operands {
            let mut bytes = Vec::new();
            operand.encode_into(&mut bytes);
            assert_eq!(bytes.len() as u32, operand.width());
        }
    }

    #[test]
    fn instruction_encoding_is_opcode_then_operands() {
        let instruction = IrInstruction {
            mnemonic: "LD".to_string(),
            opcode: Opcode::LdImm,
            operands: vec![IrOperand::Reg(RegCode::Ax), IrOperand::ImmWord(0x0007)],
            address: 0,
            line: 1,
            column: 1,
        };
        assert_eq!(instruction.size(), 4);
        assert_eq!(instruction.encode(), vec![0x02, 0x01, 0x07, 0x00]);
    }

    #[test]
    fn labels_take_no_space() {
        let mut graph = CodeGraph::default();
        graph.code_nodes.push(CodeNode::Label { name: sym("l") });
        graph
            .code_nodes
            .push(CodeNode::Instruction(IrInstruction {
                mnemonic: "HALT".to_string(),
                opcode: Opcode::Halt,
                operands: vec![],
                address: 0,
                line: 1,
                column: 1,
            }));
        assert_eq!(graph.code_segment_size(), 1);
        assert_eq!(graph.code_bytes(), vec![0x01]);
    }

    #[test]
    fn addresses_encode_little_endian() {
        let operand = IrOperand::Addr {
            symbol: None,
            address: 0x0A0B0C0D,
        };
        let mut bytes = Vec::new();
        operand.encode_into(&mut bytes);
        assert_eq!(bytes, vec![0x0D, 0x0C, 0x0B, 0x0A]);
    }
}
