//! The parser: recursive descent over the token stream.
//!
//! Errors are accumulated, not fatal; after an error the parser
//! resynchronises to the next line (or the next section header) so one
//! bad statement does not drown out the rest of the diagnostics.

use crate::common::SourceError;

use super::ast::*;
use super::lex::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SourceError>,
    panicking: bool,
}

/// Parse a token stream into a program, accumulating errors.
pub fn parse(tokens: Vec<Token>) -> (Program, Vec<SourceError>) {
    let mut parser = Parser::new(tokens);
    let program = parser.program();
    (program, parser.errors)
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Parser {
        Parser {
            tokens,
            pos: 0,
            errors: Vec::new(),
            panicking: false,
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, ()> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            self.error_here(message);
            Err(())
        }
    }

    fn error_here(&mut self, message: &str) {
        if self.panicking {
            return;
        }
        self.panicking = true;
        let token = self.current();
        self.errors
            .push(SourceError::new(token.line, token.column, message));
    }

    /// Skip to the start of the next line or section header.
    fn synchronize(&mut self) {
        self.panicking = false;
        while !self.check(TokenKind::Eof) {
            if self.matches(TokenKind::Eol) {
                return;
            }
            if self.at_section_start() {
                return;
            }
            self.advance();
        }
    }

    fn skip_empty_lines(&mut self) {
        while self.matches(TokenKind::Eol) {}
    }

    fn at_section_start(&self) -> bool {
        self.check(TokenKind::Data) || self.check(TokenKind::Code)
    }

    fn program(&mut self) -> Program {
        let mut sections = Vec::new();
        self.skip_empty_lines();

        while !self.check(TokenKind::Eof) {
            if self.at_section_start() {
                if let Some(section) = self.section() {
                    sections.push(section);
                }
            } else if self.check(TokenKind::Eol) {
                self.advance();
            } else {
                self.error_here("expected section (DATA or CODE)");
                self.synchronize();
            }
        }

        Program { sections }
    }

    fn section(&mut self) -> Option<Section> {
        if self.matches(TokenKind::Data) {
            if self.consume(TokenKind::Eol, "expected newline after DATA").is_err() {
                self.synchronize();
            }
            Some(Section::Data(self.data_items()))
        } else if self.matches(TokenKind::Code) {
            if self.consume(TokenKind::Eol, "expected newline after CODE").is_err() {
                self.synchronize();
            }
            Some(Section::Code(self.code_items()))
        } else {
            None
        }
    }

    fn data_items(&mut self) -> Vec<DataDef> {
        let mut items = Vec::new();
        self.skip_empty_lines();
        while !self.check(TokenKind::Eof) && !self.at_section_start() {
            if self.matches(TokenKind::Eol) {
                continue;
            }
            match self.data_definition() {
                Ok(def) => items.push(def),
                Err(()) => self.synchronize(),
            }
        }
        items
    }

    fn data_definition(&mut self) -> Result<DataDef, ()> {
        let label = self.consume(TokenKind::Ident, "expected label")?;
        self.consume(TokenKind::Colon, "expected ':' after label")?;

        let kind = if self.matches(TokenKind::Db) {
            DataKind::Byte
        } else if self.matches(TokenKind::Dw) {
            DataKind::Word
        } else if self.matches(TokenKind::Da) {
            DataKind::Address
        } else {
            self.error_here("expected DB, DW, or DA");
            return Err(());
        };

        let payload = if kind == DataKind::Address {
            self.label_list()?
        } else {
            self.data_payload()?
        };

        self.consume(TokenKind::Eol, "expected newline after data definition")?;
        Ok(DataDef {
            label: label.text,
            kind,
            payload,
            line: label.line,
            column: label.column,
        })
    }

    /// `"string"` or `[n, n, ...]`.
    fn data_payload(&mut self) -> Result<DataPayload, ()> {
        if self.check(TokenKind::Str) {
            let token = self.advance();
            return Ok(DataPayload::Str(token.value));
        }
        if self.matches(TokenKind::LBracket) {
            let mut values = Vec::new();
            if !self.check(TokenKind::RBracket) {
                loop {
                    let number = self.consume(TokenKind::Number, "expected number")?;
                    values.push(number.number);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RBracket, "expected ']'")?;
            return Ok(DataPayload::Numbers(values));
        }
        self.error_here("expected string or array");
        Err(())
    }

    /// `[label, label, ...]` for `DA`.
    fn label_list(&mut self) -> Result<DataPayload, ()> {
        self.consume(TokenKind::LBracket, "expected '[' after DA")?;
        let mut labels = Vec::new();
        if !self.check(TokenKind::RBracket) {
            loop {
                let ident = self.consume(TokenKind::Ident, "expected label name")?;
                labels.push(ident.text);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RBracket, "expected ']'")?;
        Ok(DataPayload::Labels(labels))
    }

    fn code_items(&mut self) -> Vec<Stmt> {
        let mut items = Vec::new();
        self.skip_empty_lines();
        while !self.check(TokenKind::Eof) && !self.at_section_start() {
            if self.matches(TokenKind::Eol) {
                continue;
            }
            match self.code_statement(&mut items) {
                Ok(()) => {}
                Err(()) => self.synchronize(),
            }
        }
        items
    }

    fn code_statement(&mut self, items: &mut Vec<Stmt>) -> Result<(), ()> {
        // Inline data: a DB/DW directive directly inside CODE.
        if self.check(TokenKind::Db) || self.check(TokenKind::Dw) {
            items.push(Stmt::InlineData(self.inline_data()?));
            return Ok(());
        }

        let name = self.consume(TokenKind::Ident, "expected instruction or label")?;

        if self.matches(TokenKind::Colon) {
            items.push(Stmt::Label {
                name: name.text,
                line: name.line,
                column: name.column,
            });
            // A label may stand alone or prefix an instruction.
            if self.matches(TokenKind::Eol) {
                return Ok(());
            }
            let mnemonic = self.consume(TokenKind::Ident, "expected instruction after label")?;
            items.push(Stmt::Instruction(self.instruction(mnemonic)?));
            return Ok(());
        }

        items.push(Stmt::Instruction(self.instruction(name)?));
        Ok(())
    }

    fn inline_data(&mut self) -> Result<InlineData, ()> {
        let directive = self.advance();
        let kind = match directive.kind {
            TokenKind::Db => DataKind::Byte,
            _ => DataKind::Word,
        };
        let payload = self.data_payload()?;
        self.consume(TokenKind::Eol, "expected newline after inline data")?;
        Ok(InlineData {
            kind,
            payload,
            line: directive.line,
            column: directive.column,
        })
    }

    fn instruction(&mut self, name: Token) -> Result<Instruction, ()> {
        let mut operands = Vec::new();
        if !self.check(TokenKind::Eol) && !self.check(TokenKind::Eof) {
            loop {
                operands.push(self.operand()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::Eol, "expected newline after instruction")?;
        Ok(Instruction {
            mnemonic: name.text,
            operands,
            line: name.line,
            column: name.column,
        })
    }

    fn operand(&mut self) -> Result<Operand, ()> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Register => {
                self.advance();
                Ok(Operand {
                    kind: OperandKind::Register,
                    expr: Expr::Register(token.text),
                    sugar: false,
                    line: token.line,
                    column: token.column,
                })
            }
            TokenKind::Number => {
                self.advance();
                Ok(Operand {
                    kind: OperandKind::Immediate,
                    expr: Expr::Number(token.number),
                    sugar: false,
                    line: token.line,
                    column: token.column,
                })
            }
            TokenKind::Ident => {
                self.advance();
                Ok(Operand {
                    kind: OperandKind::Identifier,
                    expr: Expr::Ident(token.text),
                    sugar: false,
                    line: token.line,
                    column: token.column,
                })
            }
            TokenKind::LBracket | TokenKind::LParen => {
                let bracket = token.kind == TokenKind::LBracket;
                self.advance();
                let expr = self.expression()?;
                if bracket {
                    self.consume(TokenKind::RBracket, "expected ']'")?;
                } else {
                    self.consume(TokenKind::RParen, "expected ')'")?;
                }
                let kind = if bracket {
                    OperandKind::MemoryAccess
                } else {
                    OperandKind::AddressExpr
                };
                // A bracket expression rooted at a label is the LD sugar.
                let sugar = bracket && matches!(expr.base(), Expr::Ident(_));
                Ok(Operand {
                    kind,
                    expr,
                    sugar,
                    line: token.line,
                    column: token.column,
                })
            }
            _ => {
                self.error_here("expected operand");
                Err(())
            }
        }
    }

    fn expression(&mut self) -> Result<Expr, ()> {
        let mut left = self.term()?;
        while self.check(TokenKind::Plus) || self.check(TokenKind::Minus) {
            let op = if self.matches(TokenKind::Plus) {
                '+'
            } else {
                self.advance();
                '-'
            };
            let right = self.term()?;
            left = Expr::Binary {
                op,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ()> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Number => {
                self.advance();
                Ok(Expr::Number(token.number))
            }
            TokenKind::Register => {
                self.advance();
                Ok(Expr::Register(token.text))
            }
            TokenKind::Ident => {
                self.advance();
                Ok(Expr::Ident(token.text))
            }
            _ => {
                self.error_here("expected number, register, or identifier in expression");
                Err(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::lex::tokenize;

    fn parse_ok(source: &str) -> Program {
        let (program, errors) = parse(tokenize(source).unwrap());
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        program
    }

    fn parse_errors(source: &str) -> Vec<SourceError> {
        let (_, errors) = parse(tokenize(source).unwrap());
        errors
    }

    #[test]
    fn data_section_with_string_and_arrays() {
        let program = parse_ok(
            "DATA\n\
             GREETING: DB \"hello\"\n\
             TABLE: DW [1, 2, 0xFFFF]\n\
             VECTORS: DA [start, end]\n",
        );
        let Section::Data(defs) = &program.sections[0] else {
            panic!("expected data section");
        };
        assert_eq!(defs.len(), 3);
        assert_eq!(defs[0].label, "GREETING");
        assert!(matches!(&defs[0].payload, DataPayload::Str(s) if s == "hello"));
        assert_eq!(defs[1].kind, DataKind::Word);
        assert!(matches!(&defs[2].payload, DataPayload::Labels(l) if l.len() == 2));
    }

    #[test]
    fn code_section_with_labels_and_instructions() {
        let program = parse_ok(
            "CODE\n\
             START:\n\
             LD AX, 0x0007\n\
             JMP START\n\
             HALT\n",
        );
        let Section::Code(stmts) = &program.sections[0] else {
            panic!("expected code section");
        };
        assert_eq!(stmts.len(), 4);
        assert!(matches!(&stmts[0], Stmt::Label { name, .. } if name == "START"));
        let Stmt::Instruction(ld) = &stmts[1] else {
            panic!("expected instruction");
        };
        assert_eq!(ld.mnemonic, "LD");
        assert_eq!(ld.operands.len(), 2);
        assert_eq!(ld.operands[0].kind, OperandKind::Register);
        assert_eq!(ld.operands[1].kind, OperandKind::Immediate);
    }

    #[test]
    fn bracket_operand_rooted_at_label_is_sugar() {
        let program = parse_ok("CODE\nLD AX, [table + 2]\n");
        let Section::Code(stmts) = &program.sections[0] else {
            panic!()
        };
        let Stmt::Instruction(ld) = &stmts[0] else { panic!() };
        let operand = &ld.operands[1];
        assert_eq!(operand.kind, OperandKind::MemoryAccess);
        assert!(operand.sugar);
    }

    #[test]
    fn bracket_operand_rooted_at_number_is_not_sugar() {
        let program = parse_ok("CODE\nLD AX, [2 + 2]\n");
        let Section::Code(stmts) = &program.sections[0] else {
            panic!()
        };
        let Stmt::Instruction(ld) = &stmts[0] else { panic!() };
        assert!(!ld.operands[1].sugar);
    }

    #[test]
    fn paren_operand_is_an_address_expression() {
        let program = parse_ok("CODE\nLDA AX, (table + 4)\n");
        let Section::Code(stmts) = &program.sections[0] else {
            panic!()
        };
        let Stmt::Instruction(lda) = &stmts[0] else { panic!() };
        assert_eq!(lda.operands[1].kind, OperandKind::AddressExpr);
        let Expr::Binary { op, lhs, rhs } = &lda.operands[1].expr else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, '+');
        assert!(matches!(lhs.as_ref(), Expr::Ident(i) if i == "table"));
        assert!(matches!(rhs.as_ref(), Expr::Number(4)));
    }

    #[test]
    fn label_and_instruction_may_share_a_line() {
        let program = parse_ok(
            "CODE\n\
             START: LD CX, 0x0003\n\
             LOOP:  DEC CX\n\
             HALT\n",
        );
        let Section::Code(stmts) = &program.sections[0] else {
            panic!()
        };
        assert_eq!(stmts.len(), 5);
        assert!(matches!(&stmts[0], Stmt::Label { name, .. } if name == "START"));
        assert!(matches!(&stmts[1], Stmt::Instruction(i) if i.mnemonic == "LD"));
        assert!(matches!(&stmts[2], Stmt::Label { name, .. } if name == "LOOP"));
        assert!(matches!(&stmts[3], Stmt::Instruction(i) if i.mnemonic == "DEC"));
    }

    #[test]
    fn inline_data_in_code() {
        let program = parse_ok("CODE\nDB \"inline\"\nHALT\n");
        let Section::Code(stmts) = &program.sections[0] else {
            panic!()
        };
        assert!(matches!(&stmts[0], Stmt::InlineData(d) if d.kind == DataKind::Byte));
    }

    #[test]
    fn errors_resynchronise_per_line() {
        let errors = parse_errors(
            "CODE\n\
             LD AX 5\n\
             LD ,\n\
             HALT\n",
        );
        // One error per bad line, and HALT still parses afterwards.
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn statement_outside_section_is_an_error() {
        let errors = parse_errors("HALT\n");
        assert!(errors[0].message.contains("expected section"));
    }
}
