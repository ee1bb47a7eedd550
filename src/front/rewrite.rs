//! The sugar rewriter.
//!
//! `LD reg, [label + expr]` is surface syntax for an absolute load.  The
//! rewrite picks the real mnemonic from the register's width — `LDAB` for
//! the 8-bit names, `LDA` otherwise — and retypes the bracket operand as a
//! parenthesised address expression, so later passes never see an `LD`
//! with a memory operand.

use log::trace;

use crate::isa::RegName;

use super::ast::{Expr, OperandKind, Program, Section, Stmt};

pub fn rewrite(program: &mut Program) {
    for section in &mut program.sections {
        let Section::Code(stmts) = section else {
            continue;
        };
        for stmt in stmts {
            let Stmt::Instruction(instruction) = stmt else {
                continue;
            };
            if !instruction.mnemonic.eq_ignore_ascii_case("LD") {
                continue;
            }

            let Some(sugar_at) = instruction
                .operands
                .iter()
                .position(|op| op.kind == OperandKind::MemoryAccess && op.sugar)
            else {
                continue;
            };

            // The register operand decides between the word and byte load.
            let is_byte = instruction.operands.iter().find_map(|op| {
                if let Expr::Register(name) = &op.expr {
                    RegName::parse(name).map(|reg| reg.is_byte())
                } else {
                    None
                }
            });

            let mnemonic = match is_byte {
                Some(true) => "LDAB",
                _ => "LDA",
            };
            trace!(
                "line {}: LD sugar rewritten to {mnemonic}",
                instruction.line
            );
            instruction.mnemonic = mnemonic.to_string();
            instruction.operands[sugar_at].kind = OperandKind::AddressExpr;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::lex::tokenize;
    use crate::front::parse::parse;

    fn rewritten(source: &str) -> Program {
        let (mut program, errors) = parse(tokenize(source).unwrap());
        assert!(errors.is_empty());
        rewrite(&mut program);
        program
    }

    fn first_instruction(program: &Program) -> &crate::front::ast::Instruction {
        for section in &program.sections {
            if let Section::Code(stmts) = section {
                for stmt in stmts {
                    if let Stmt::Instruction(instruction) = stmt {
                        return instruction;
                    }
                }
            }
        }
        panic!("no instruction in program");
    }

    #[test]
    fn word_register_becomes_lda() {
        let program = rewritten("CODE\nLD AX, [table + 2]\n");
        let instruction = first_instruction(&program);
        assert_eq!(instruction.mnemonic, "LDA");
        assert_eq!(instruction.operands[1].kind, OperandKind::AddressExpr);
    }

    #[test]
    fn byte_register_becomes_ldab() {
        let program = rewritten("CODE\nLD AL, [table]\n");
        assert_eq!(first_instruction(&program).mnemonic, "LDAB");

        let program = rewritten("CODE\nLD EH, [table]\n");
        assert_eq!(first_instruction(&program).mnemonic, "LDAB");
    }

    #[test]
    fn non_sugar_brackets_are_left_alone() {
        let program = rewritten("CODE\nLD AX, [2 + 2]\n");
        let instruction = first_instruction(&program);
        assert_eq!(instruction.mnemonic, "LD");
        assert_eq!(instruction.operands[1].kind, OperandKind::MemoryAccess);
    }

    #[test]
    fn other_mnemonics_are_untouched() {
        let program = rewritten("CODE\nLDA AX, (table)\n");
        assert_eq!(first_instruction(&program).mnemonic, "LDA");
    }
}
