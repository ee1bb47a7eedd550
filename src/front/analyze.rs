//! Semantic analysis: symbol definition and reference collection, plus
//! operand validation.  Works over the rewritten AST, so an `LD` that
//! still carries a bracket-memory operand here is a genuine error.

use log::debug;

use crate::common::SourceError;
use crate::isa::{self, RegName};
use crate::middle::symbols::{sym, SymbolKind, SymbolTable};

use super::ast::*;

struct Analyzer<'t> {
    symbols: &'t mut SymbolTable,
    errors: Vec<SourceError>,
}

/// Run the pass.  Every label and data symbol ends up defined in
/// `symbols`; the returned list contains every semantic error found.
pub fn analyze(program: &Program, symbols: &mut SymbolTable) -> Vec<SourceError> {
    let mut analyzer = Analyzer {
        symbols,
        errors: Vec::new(),
    };

    for section in &program.sections {
        match section {
            Section::Data(defs) => {
                for def in defs {
                    analyzer.data_definition(def);
                }
            }
            Section::Code(stmts) => {
                for stmt in stmts {
                    analyzer.statement(stmt);
                }
            }
        }
    }

    analyzer.errors.extend(analyzer.symbols.undefined_errors());
    debug!("analysis: {} errors", analyzer.errors.len());
    analyzer.errors
}

impl Analyzer<'_> {
    fn error(&mut self, line: usize, column: usize, message: impl Into<String>) {
        self.errors.push(SourceError::new(line, column, message));
    }

    fn data_definition(&mut self, def: &DataDef) {
        let kind = match def.kind {
            DataKind::Byte => SymbolKind::DataByte,
            DataKind::Word | DataKind::Address => SymbolKind::DataWord,
        };
        if !self.symbols.define(sym(&def.label), kind, def.line, def.column) {
            self.error(
                def.line,
                def.column,
                format!("duplicate definition of '{}'", def.label),
            );
            return;
        }
        self.symbols.set_size(sym(&def.label), payload_size(def));

        // DA payloads reference labels (often forward, into CODE).
        if let DataPayload::Labels(labels) = &def.payload {
            for label in labels {
                self.symbols
                    .add_reference(sym(label), def.line, def.column, "address array");
            }
        }
    }

    fn statement(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Label { name, line, column } => {
                if !self.symbols.define(sym(name), SymbolKind::Label, *line, *column) {
                    self.error(*line, *column, format!("duplicate label '{name}'"));
                }
            }
            Stmt::Instruction(instruction) => self.instruction(instruction),
            Stmt::InlineData(_) => {
                // Hoisted during lowering; nothing to check here.
            }
        }
    }

    fn instruction(&mut self, instruction: &Instruction) {
        let mnemonic = instruction.mnemonic.to_ascii_uppercase();

        for operand in &instruction.operands {
            if mnemonic == "LD" && operand.kind == OperandKind::MemoryAccess {
                self.error(
                    operand.line,
                    operand.column,
                    "LD cannot use square brackets; use LDA for memory access \
                     or parentheses for address expressions",
                );
            }
            self.expression(&operand.expr, operand.line, operand.column);
        }

        // ALU mnemonics write the accumulator; the two-operand form names
        // it explicitly first.  (The single-operand byte forms name only
        // the source, which may be any register.)
        if isa::is_accumulator_family(&mnemonic) && instruction.operands.len() >= 2 {
            if let Some(first) = instruction.operands.first() {
                if let Expr::Register(name) = &first.expr {
                    match RegName::parse(name) {
                        Some(reg) if reg.code != isa::RegCode::Ax => {
                            self.error(
                                first.line,
                                first.column,
                                format!("{mnemonic} operates on AX, not {}", name.to_ascii_uppercase()),
                            );
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn expression(&mut self, expr: &Expr, line: usize, column: usize) {
        match expr {
            Expr::Number(_) => {}
            Expr::Ident(name) => {
                self.symbols.add_reference(sym(name), line, column, "expression");
            }
            Expr::Register(name) => {
                if RegName::parse(name).is_none() {
                    self.error(line, column, format!("invalid register '{name}'"));
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                if *op != '+' && *op != '-' {
                    self.error(line, column, "invalid operator in expression");
                }
                self.expression(lhs, line, column);
                self.expression(rhs, line, column);
            }
        }
    }
}

fn payload_size(def: &DataDef) -> u32 {
    match &def.payload {
        DataPayload::Str(s) => s.len() as u32,
        DataPayload::Numbers(values) => {
            let element = if def.kind == DataKind::Byte { 1 } else { 2 };
            (values.len() as u32) * element
        }
        DataPayload::Labels(labels) => (labels.len() as u32) * 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::lex::tokenize;
    use crate::front::parse::parse;
    use crate::front::rewrite::rewrite;

    fn analyzed(source: &str) -> (SymbolTable, Vec<SourceError>) {
        let (mut program, errors) = parse(tokenize(source).unwrap());
        assert!(errors.is_empty(), "parse errors: {errors:?}");
        rewrite(&mut program);
        let mut symbols = SymbolTable::new();
        let errors = analyze(&program, &mut symbols);
        (symbols, errors)
    }

    #[test]
    fn defines_data_symbols_with_sizes() {
        let (symbols, errors) = analyzed(
            "DATA\n\
             MSG: DB \"hey\"\n\
             NUMS: DW [1, 2]\n\
             VEC: DA [MAIN]\n\
             CODE\n\
             MAIN:\n\
             HALT\n",
        );
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(symbols.get(sym("MSG")).unwrap().kind, SymbolKind::DataByte);
        assert_eq!(symbols.get(sym("MSG")).unwrap().size, 3);
        assert_eq!(symbols.get(sym("NUMS")).unwrap().kind, SymbolKind::DataWord);
        assert_eq!(symbols.get(sym("NUMS")).unwrap().size, 4);
        assert_eq!(symbols.get(sym("VEC")).unwrap().size, 2);
        assert_eq!(symbols.get(sym("MAIN")).unwrap().kind, SymbolKind::Label);
    }

    #[test]
    fn forward_references_are_fine() {
        let (_, errors) = analyzed(
            "CODE\n\
             JMP END\n\
             END:\n\
             HALT\n",
        );
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn undefined_symbol_is_reported_at_reference() {
        let (_, errors) = analyzed("CODE\nJMP NOWHERE\n");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("undefined symbol 'NOWHERE'"));
        assert_eq!(errors[0].line, 2);
    }

    #[test]
    fn duplicate_symbols_are_reported() {
        let (_, errors) = analyzed(
            "DATA\n\
             X: DB [1]\n\
             X: DB [2]\n\
             CODE\n\
             Y:\n\
             Y:\n\
             HALT\n",
        );
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("duplicate definition of 'X'"));
        assert!(errors[1].message.contains("duplicate label 'Y'"));
    }

    #[test]
    fn ld_with_raw_brackets_is_an_error() {
        // A bracket operand not rooted at a label survives the rewrite and
        // must be rejected.
        let (_, errors) = analyzed("CODE\nLD AX, [2 + 2]\n");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("square brackets"));
    }

    #[test]
    fn alu_target_must_be_the_accumulator() {
        let (_, errors) = analyzed("CODE\nADD BX, 5\n");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("operates on AX"));

        let (_, errors) = analyzed("CODE\nADD AX, 5\n");
        assert!(errors.is_empty());
    }
}
