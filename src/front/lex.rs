//! The lexer.
//!
//! Token classes are matched with anchored regexes where a class has real
//! structure (identifiers, numbers, spacing); quotes, escapes, and the
//! single-character operators are handled directly.  End-of-line is a
//! token: the grammar is line-oriented.

use derive_more::Display;
use regex::Regex;

use crate::common::SourceError;
use crate::isa::RegName;

/// Token classes.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum TokenKind {
    #[display("DATA")]
    Data,
    #[display("CODE")]
    Code,
    #[display("DB")]
    Db,
    #[display("DW")]
    Dw,
    #[display("DA")]
    Da,
    #[display("PAGE")]
    Page,
    #[display("IN")]
    In,
    #[display("identifier")]
    Ident,
    #[display("register")]
    Register,
    #[display("number")]
    Number,
    #[display("string")]
    Str,
    #[display(":")]
    Colon,
    #[display(",")]
    Comma,
    #[display("[")]
    LBracket,
    #[display("]")]
    RBracket,
    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("end of line")]
    Eol,
    #[display("end of file")]
    Eof,
}

/// One token with its source position.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    /// The raw lexeme as written.
    pub text: String,
    /// Unescaped payload for string literals.
    pub value: String,
    /// Numeric value for number literals (negatives wrap two's-complement).
    pub number: u64,
    pub line: usize,
    pub column: usize,
}

impl Token {
    fn simple(kind: TokenKind, text: &str, line: usize, column: usize) -> Token {
        Token {
            kind,
            text: text.to_string(),
            value: String::new(),
            number: 0,
            line,
            column,
        }
    }
}

pub struct Lexer<'src> {
    src: &'src str,
    pos: usize,
    line: usize,
    column: usize,
    spacing: Regex,
    ident: Regex,
    number: Regex,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Self {
        Lexer {
            src,
            pos: 0,
            line: 1,
            column: 1,
            // Horizontal whitespace and `;` comments, never newlines.
            spacing: Regex::new(r"\A(?:[ \t\r]|;[^\n]*)+").unwrap(),
            ident: Regex::new(r"\A[A-Za-z_][A-Za-z0-9_]*").unwrap(),
            number: Regex::new(r"\A(?:0[xX][0-9a-fA-F]+|[0-9]+)").unwrap(),
        }
    }

    fn rest(&self) -> &'src str {
        &self.src[self.pos..]
    }

    fn advance_over(&mut self, text: &str) {
        self.pos += text.len();
        self.column += text.chars().count();
    }

    fn skip_spacing(&mut self) {
        if let Some(m) = self.spacing.find(self.rest()) {
            let text = m.as_str().to_string();
            self.advance_over(&text);
        }
    }

    fn identify_word(&self, text: &str) -> TokenKind {
        match text.to_ascii_uppercase().as_str() {
            "DATA" => TokenKind::Data,
            "CODE" => TokenKind::Code,
            "DB" => TokenKind::Db,
            "DW" => TokenKind::Dw,
            "DA" => TokenKind::Da,
            "PAGE" => TokenKind::Page,
            "IN" => TokenKind::In,
            _ if RegName::parse(text).is_some() => TokenKind::Register,
            _ => TokenKind::Ident,
        }
    }

    fn number_token(&mut self, negative: bool) -> Result<Token, SourceError> {
        let (line, column) = (self.line, self.column);
        let m = self
            .number
            .find(self.rest())
            .expect("caller checked for a digit");
        let text = m.as_str().to_string();
        self.advance_over(&text);

        let value = if let Some(hex) = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
        {
            u64::from_str_radix(hex, 16)
        } else {
            text.parse::<u64>()
        }
        .map_err(|_| SourceError::new(line, column, format!("number '{text}' out of range")))?;

        let number = if negative { value.wrapping_neg() } else { value };
        Ok(Token {
            kind: TokenKind::Number,
            text,
            value: String::new(),
            number,
            line,
            column,
        })
    }

    fn string_token(&mut self, quote: char) -> Result<Token, SourceError> {
        let (line, column) = (self.line, self.column);
        let mut chars = self.rest().chars();
        chars.next(); // opening quote
        self.pos += quote.len_utf8();
        self.column += 1;

        let mut value = String::new();
        let mut raw = String::from(quote);
        loop {
            let Some(c) = chars.next() else {
                return Err(SourceError::new(line, column, "unterminated string"));
            };
            self.pos += c.len_utf8();
            raw.push(c);
            if c == quote {
                self.column += 1;
                break;
            }
            if c == '\n' {
                self.line += 1;
                self.column = 1;
                value.push(c);
                continue;
            }
            self.column += 1;
            if c == '\\' {
                let Some(escaped) = chars.next() else {
                    return Err(SourceError::new(line, column, "unterminated string"));
                };
                self.pos += escaped.len_utf8();
                self.column += 1;
                raw.push(escaped);
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '\\' => '\\',
                    '"' => '"',
                    '\'' => '\'',
                    '0' => '\0',
                    other => other,
                });
            } else {
                value.push(c);
            }
        }

        Ok(Token {
            kind: TokenKind::Str,
            text: raw,
            value,
            number: 0,
            line,
            column,
        })
    }

    /// The next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, SourceError> {
        self.skip_spacing();

        let Some(c) = self.rest().chars().next() else {
            return Ok(None);
        };
        let (line, column) = (self.line, self.column);

        if c == '\n' {
            self.pos += 1;
            let token = Token::simple(TokenKind::Eol, "\n", line, column);
            self.line += 1;
            self.column = 1;
            return Ok(Some(token));
        }

        let single = |kind| Token::simple(kind, &c.to_string(), line, column);
        match c {
            ':' | ',' | '[' | ']' | '(' | ')' | '+' => {
                self.advance_over(&c.to_string());
                let kind = match c {
                    ':' => TokenKind::Colon,
                    ',' => TokenKind::Comma,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    _ => TokenKind::Plus,
                };
                return Ok(Some(single(kind)));
            }
            '-' => {
                // A minus immediately followed by a digit is a negative
                // number literal; otherwise it is the operator.
                let next_is_digit = self.rest()[1..]
                    .chars()
                    .next()
                    .map_or(false, |n| n.is_ascii_digit());
                self.advance_over("-");
                if next_is_digit {
                    let mut token = self.number_token(true)?;
                    token.line = line;
                    token.column = column;
                    return Ok(Some(token));
                }
                return Ok(Some(single(TokenKind::Minus)));
            }
            '"' | '\'' => return self.string_token(c).map(Some),
            _ => {}
        }

        if c.is_ascii_digit() {
            return self.number_token(false).map(Some);
        }

        if let Some(m) = self.ident.find(self.rest()) {
            let text = m.as_str().to_string();
            self.advance_over(&text);
            let kind = self.identify_word(&text);
            return Ok(Some(Token {
                kind,
                text,
                value: String::new(),
                number: 0,
                line,
                column,
            }));
        }

        Err(SourceError::new(
            line,
            column,
            format!("unexpected character {c:?}"),
        ))
    }
}

/// Tokenize a whole source file.  Lex errors accumulate; the offending
/// character is skipped so one bad byte does not hide the rest.
pub fn tokenize(source: &str) -> Result<Vec<Token>, Vec<SourceError>> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    loop {
        match lexer.next_token() {
            Ok(Some(token)) => tokens.push(token),
            Ok(None) => break,
            Err(err) => {
                errors.push(err);
                // Skip one char and resume.
                if let Some(c) = lexer.rest().chars().next() {
                    lexer.advance_over(&c.to_string());
                } else {
                    break;
                }
            }
        }
    }

    tokens.push(Token::simple(
        TokenKind::Eof,
        "",
        lexer.line,
        lexer.column,
    ));

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}
