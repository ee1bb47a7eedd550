//! Lowering: AST → code graph.
//!
//! Picks each instruction's opcode from its mnemonic and operand shapes,
//! encodes operands against the opcode's signature, serialises data
//! definitions into prefixed blocks, and hoists inline CODE data into
//! generated `__anon_N` blocks in the data segment.

use log::debug;

use crate::common::SourceError;
use crate::front::ast::*;
use crate::isa::{self, ArgShape, RegName};
use crate::middle::graph::*;
use crate::middle::symbols::{sym, SymbolKind, SymbolTable};

struct Lowerer<'t> {
    symbols: &'t mut SymbolTable,
    graph: CodeGraph,
    errors: Vec<SourceError>,
    anon_counter: usize,
}

/// Run the pass.  The graph is meaningful only if the error list is
/// empty.
pub fn lower(program: &Program, symbols: &mut SymbolTable) -> (CodeGraph, Vec<SourceError>) {
    let mut lowerer = Lowerer {
        symbols,
        graph: CodeGraph::default(),
        errors: Vec::new(),
        anon_counter: 0,
    };

    for section in &program.sections {
        match section {
            Section::Data(defs) => {
                for def in defs {
                    lowerer.data_definition(def);
                }
            }
            Section::Code(stmts) => {
                for stmt in stmts {
                    lowerer.statement(stmt);
                }
            }
        }
    }

    debug!(
        "lowered: {} data blocks, {} code nodes, {} errors",
        lowerer.graph.data_blocks.len(),
        lowerer.graph.code_nodes.len(),
        lowerer.errors.len()
    );
    (lowerer.graph, lowerer.errors)
}

/// Serialise a payload to bytes (no size prefix) plus any `DA` label refs.
fn payload_bytes(kind: DataKind, payload: &DataPayload) -> (Vec<u8>, Vec<crate::common::SymId>) {
    match payload {
        DataPayload::Str(text) => (text.as_bytes().to_vec(), Vec::new()),
        DataPayload::Numbers(values) => {
            let mut bytes = Vec::new();
            for value in values {
                if kind == DataKind::Byte {
                    bytes.push(*value as u8);
                } else {
                    bytes.extend((*value as u16).to_le_bytes());
                }
            }
            (bytes, Vec::new())
        }
        DataPayload::Labels(labels) => {
            // One zeroed little-endian word per referent; patched after
            // address resolution.
            let bytes = vec![0; labels.len() * 2];
            let refs = labels.iter().map(|l| sym(l)).collect();
            (bytes, refs)
        }
    }
}

/// Prefix payload bytes with their little-endian u16 size.
fn prefixed(bytes: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    out.extend((bytes.len() as u16).to_le_bytes());
    out.extend(bytes);
    out
}

impl Lowerer<'_> {
    fn error(&mut self, line: usize, column: usize, message: impl Into<String>) {
        self.errors.push(SourceError::new(line, column, message));
    }

    fn data_definition(&mut self, def: &DataDef) {
        let (bytes, refs) = payload_bytes(def.kind, &def.payload);
        self.graph.data_blocks.push(DataBlock {
            label: sym(&def.label),
            bytes: prefixed(bytes),
            address_refs: refs,
            address: 0,
        });
    }

    fn statement(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Label { name, .. } => {
                self.graph.code_nodes.push(CodeNode::Label { name: sym(name) });
            }
            Stmt::InlineData(inline) => {
                let label = sym(&format!("__anon_{}", self.anon_counter));
                self.anon_counter += 1;
                let (bytes, _) = payload_bytes(inline.kind, &inline.payload);
                self.symbols
                    .define(label, SymbolKind::InlineData, inline.line, inline.column);
                self.symbols.set_size(label, bytes.len() as u32);
                self.graph.data_blocks.push(DataBlock {
                    label,
                    bytes: prefixed(bytes),
                    address_refs: Vec::new(),
                    address: 0,
                });
            }
            Stmt::Instruction(instruction) => self.instruction(instruction),
        }
    }

    fn instruction(&mut self, instruction: &Instruction) {
        let shapes: Vec<ArgShape> = instruction.operands.iter().map(operand_shape).collect();

        // A numeric literal can also stand for an address (`JMP 0x10`,
        // `LDA AX, 0x0100`); retry with the first immediate read as one
        // before giving up.
        let selected = isa::select_opcode(&instruction.mnemonic, &shapes).or_else(|| {
            let first_imm = shapes.iter().position(|s| *s == ArgShape::Immediate)?;
            let mut coerced = shapes.clone();
            coerced[first_imm] = ArgShape::Address;
            isa::select_opcode(&instruction.mnemonic, &coerced)
        });

        let Some(opcode) = selected else {
            self.error(
                instruction.line,
                instruction.column,
                format!(
                    "unknown instruction or unsupported operands for '{}'",
                    instruction.mnemonic
                ),
            );
            return;
        };

        let signature = opcode.operands();

        // ALU families name the accumulator explicitly but never encode
        // it; drop the leading register when the signature is one short.
        let mut ast_operands: Vec<&Operand> = instruction.operands.iter().collect();
        if ast_operands.len() == signature.len() + 1
            && isa::is_accumulator_family(&instruction.mnemonic)
            && matches!(ast_operands.first(), Some(op) if op.kind == OperandKind::Register)
        {
            ast_operands.remove(0);
        }

        let mut operands = Vec::with_capacity(signature.len());
        for (slot, kind) in signature.iter().enumerate() {
            match ast_operands.get(slot).copied() {
                Some(operand) => {
                    if let Some(encoded) = self.encode_operand(kind, operand) {
                        operands.push(encoded);
                    } else {
                        return;
                    }
                }
                // A bare CALL takes the return-value protocol by default.
                None if opcode == isa::Opcode::Call => operands.push(IrOperand::ImmByte(1)),
                None => {
                    self.error(
                        instruction.line,
                        instruction.column,
                        format!("missing operand for '{}'", instruction.mnemonic),
                    );
                    return;
                }
            }
        }

        self.graph.code_nodes.push(CodeNode::Instruction(IrInstruction {
            mnemonic: instruction.mnemonic.to_ascii_uppercase(),
            opcode,
            operands,
            address: 0,
            line: instruction.line,
            column: instruction.column,
        }));
    }

    fn encode_operand(&mut self, kind: &isa::OperandKind, operand: &Operand) -> Option<IrOperand> {
        use isa::OperandKind::*;

        let encoded = match (kind, &operand.expr) {
            (Reg, Expr::Register(name)) => {
                let Some(reg) = RegName::parse(name) else {
                    self.error(
                        operand.line,
                        operand.column,
                        format!("invalid register '{name}'"),
                    );
                    return None;
                };
                IrOperand::Reg(reg.code)
            }
            (Imm8, Expr::Number(value)) => IrOperand::ImmByte(*value as u8),
            (Imm16, Expr::Number(value)) => IrOperand::ImmWord(*value as u16),
            (Addr32, Expr::Number(value)) => IrOperand::Addr {
                symbol: None,
                address: *value as u32,
            },
            (Addr32, Expr::Ident(name)) => IrOperand::Addr {
                symbol: Some(sym(name)),
                address: 0,
            },
            (Addr32, expr) => {
                let mut parts = ExprParts::default();
                parts.collect(expr, 1);
                IrOperand::Expr {
                    symbol: parts.symbol,
                    offset: parts.offset,
                    register: parts.register.and_then(|r| RegName::parse(&r)).map(|r| r.code),
                    address: 0,
                }
            }
            _ => {
                self.error(
                    operand.line,
                    operand.column,
                    format!("operand does not fit a '{kind}' slot"),
                );
                return None;
            }
        };
        Some(encoded)
    }
}

fn operand_shape(operand: &Operand) -> ArgShape {
    match operand.kind {
        OperandKind::Register => ArgShape::Register,
        OperandKind::Immediate => ArgShape::Immediate,
        OperandKind::Identifier | OperandKind::AddressExpr | OperandKind::MemoryAccess => {
            ArgShape::Address
        }
    }
}

/// Accumulator for flattening an address expression into
/// `symbol + constant (+ register)`.
#[derive(Default)]
struct ExprParts {
    symbol: Option<crate::common::SymId>,
    offset: i32,
    register: Option<String>,
}

impl ExprParts {
    fn collect(&mut self, expr: &Expr, sign: i32) {
        match expr {
            Expr::Number(value) => self.offset += sign * (*value as i64 as i32),
            Expr::Ident(name) => self.symbol = Some(sym(name)),
            Expr::Register(name) => self.register = Some(name.clone()),
            Expr::Binary { op, lhs, rhs } => {
                self.collect(lhs, sign);
                let rhs_sign = if *op == '-' { -sign } else { sign };
                self.collect(rhs, rhs_sign);
            }
        }
    }
}
