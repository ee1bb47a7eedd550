//! The symbol table.
//!
//! Symbols are interned names.  A reference to a not-yet-defined name
//! creates an `Undefined` placeholder; defining it later upgrades the
//! entry in place, which is how forward references work.  Anything still
//! `Undefined` when analysis ends is an error at its first reference.

use derive_more::Display;

use crate::common::{Map, SourceError, SymId};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum SymbolKind {
    #[display("label")]
    Label,
    #[display("data (DB)")]
    DataByte,
    #[display("data (DW)")]
    DataWord,
    #[display("inline data")]
    InlineData,
    #[display("undefined")]
    Undefined,
}

/// Where a symbol was mentioned.
#[derive(Clone, Debug)]
pub struct Reference {
    pub line: usize,
    pub column: usize,
    pub context: String,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: SymId,
    pub kind: SymbolKind,
    pub defined_line: usize,
    pub defined_column: usize,
    pub resolved: bool,
    pub address: u32,
    pub size: u32,
    pub references: Vec<Reference>,
}

impl Symbol {
    fn undefined(name: SymId) -> Symbol {
        Symbol {
            name,
            kind: SymbolKind::Undefined,
            defined_line: 0,
            defined_column: 0,
            resolved: false,
            address: 0,
            size: 0,
            references: Vec::new(),
        }
    }
}

#[derive(Default)]
pub struct SymbolTable {
    symbols: Map<SymId, Symbol>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    /// Define a symbol.  Returns false if the name is already defined;
    /// defining over an `Undefined` placeholder resolves the forward
    /// reference instead.
    pub fn define(&mut self, name: SymId, kind: SymbolKind, line: usize, column: usize) -> bool {
        if let Some(existing) = self.symbols.get_mut(&name) {
            if existing.kind != SymbolKind::Undefined {
                return false;
            }
            existing.kind = kind;
            existing.defined_line = line;
            existing.defined_column = column;
            return true;
        }

        let mut symbol = Symbol::undefined(name);
        symbol.kind = kind;
        symbol.defined_line = line;
        symbol.defined_column = column;
        self.symbols.insert(name, symbol);
        true
    }

    /// Record a mention, creating an `Undefined` placeholder for forward
    /// references.
    pub fn add_reference(&mut self, name: SymId, line: usize, column: usize, context: &str) {
        let symbol = self
            .symbols
            .entry(name)
            .or_insert_with(|| Symbol::undefined(name));
        symbol.references.push(Reference {
            line,
            column,
            context: context.to_string(),
        });
    }

    pub fn exists(&self, name: SymId) -> bool {
        self.symbols.contains_key(&name)
    }

    pub fn get(&self, name: SymId) -> Option<&Symbol> {
        self.symbols.get(&name)
    }

    /// Attach a resolved address.  Unknown names are auto-created for the
    /// generated `__anon_N` labels of hoisted inline data.
    pub fn set_address(&mut self, name: SymId, address: u32) -> bool {
        match self.symbols.get_mut(&name) {
            Some(symbol) => {
                symbol.address = address;
                symbol.resolved = true;
                true
            }
            None if name.starts_with("__anon_") => {
                let mut symbol = Symbol::undefined(name);
                symbol.kind = SymbolKind::InlineData;
                symbol.address = address;
                symbol.resolved = true;
                self.symbols.insert(name, symbol);
                true
            }
            None => false,
        }
    }

    pub fn set_size(&mut self, name: SymId, size: u32) -> bool {
        match self.symbols.get_mut(&name) {
            Some(symbol) => {
                symbol.size = size;
                true
            }
            None => false,
        }
    }

    /// Errors for every symbol still undefined, anchored at the first
    /// reference.
    pub fn undefined_errors(&self) -> Vec<SourceError> {
        self.symbols
            .values()
            .filter(|s| s.kind == SymbolKind::Undefined)
            .map(|s| {
                let (line, column) = s
                    .references
                    .first()
                    .map(|r| (r.line, r.column))
                    .unwrap_or((0, 0));
                SourceError::new(line, column, format!("undefined symbol '{}'", s.name))
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }
}

/// Intern a symbol name.
pub fn sym(name: &str) -> SymId {
    SymId::from_ref(name)
}
