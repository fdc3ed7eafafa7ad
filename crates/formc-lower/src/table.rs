//! Write-once symbol table.
//!
//! One slot per numbered symbol, holding the scalar expression that defines
//! it. Slots are write-once with an assert-equal escape hatch: value
//! numbering may route two component writes to the same symbol (symmetric
//! terminal mirrors), and those writes carry structurally identical
//! expressions. A second write with a *different* expression is a numbering
//! bug and is reported, never silently overwritten.

use formc_core::{Expr, Symbol};

use crate::error::LowerError;

/// Scalar definitions indexed by [`Symbol`].
#[derive(Debug)]
pub struct SymbolTable {
    slots: Vec<Option<Expr>>,
}

impl SymbolTable {
    /// An empty table with `symbol_count` undefined slots.
    pub fn new(symbol_count: usize) -> Self {
        SymbolTable {
            slots: vec![None; symbol_count],
        }
    }

    pub fn symbol_count(&self) -> usize {
        self.slots.len()
    }

    /// Defines a symbol. Redefinition with a structurally identical
    /// expression is a no-op; a differing redefinition is an error.
    pub fn define(&mut self, symbol: Symbol, value: Expr) -> Result<(), LowerError> {
        let slot = self
            .slots
            .get_mut(symbol.index())
            .ok_or(LowerError::UnknownSymbol { symbol })?;
        match slot {
            Some(existing) if *existing != value => Err(LowerError::SymbolConflict {
                symbol,
                existing: existing.to_string(),
                incoming: value.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                *slot = Some(value);
                Ok(())
            }
        }
    }

    /// The defining expression of a symbol, if written.
    pub fn get(&self, symbol: Symbol) -> Option<&Expr> {
        self.slots.get(symbol.index()).and_then(|s| s.as_ref())
    }

    pub fn is_defined(&self, symbol: Symbol) -> bool {
        self.get(symbol).is_some()
    }

    /// The definitions of a symbol list, or an error naming the first
    /// undefined symbol. Definitions are always written in dependency order,
    /// so a miss here means the caller visited vertices out of order.
    pub fn get_all(&self, symbols: &[Symbol]) -> Result<Vec<Expr>, LowerError> {
        symbols
            .iter()
            .map(|&s| {
                self.get(s)
                    .cloned()
                    .ok_or(LowerError::UnknownSymbol { symbol: s })
            })
            .collect()
    }
}
