//! The parser-side definition table (spec.md §4.5): a stack of scopes
//! recording each declared identifier's *kind*. Used at exactly one
//! place — classifying `name(args)` as an ordinary call vs an external
//! call — and is never the authoritative symbol table; the binder
//! rebuilds that from scratch.

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefinitionKind {
    Variable,
    Function,
    External,
    Typename,
}

#[derive(Default)]
pub struct DefinitionTable {
    scopes: Vec<HashMap<String, DefinitionKind>>,
}

impl DefinitionTable {
    pub fn new() -> Self {
        DefinitionTable { scopes: vec![HashMap::new()] }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
        if self.scopes.is_empty() {
            self.scopes.push(HashMap::new());
        }
    }

    pub fn declare(&mut self, name: impl Into<String>, kind: DefinitionKind) {
        self.scopes.last_mut().unwrap().insert(name.into(), kind);
    }

    pub fn lookup(&self, name: &str) -> Option<DefinitionKind> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    pub fn is_external(&self, name: &str) -> bool {
        self.lookup(name) == Some(DefinitionKind::External)
    }
}
