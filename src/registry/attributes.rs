//! Attribute registry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Attribute, SymbolTable};
use crate::Result;

/// How many values one object may hold for an attribute. Drives merge:
/// multi-valued attributes are unioned, single-valued ones are overwritten
/// by the last source imported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    Single,
    #[default]
    Multi,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub cardinality: Cardinality,
}

/// Interns attribute names.
#[derive(Debug)]
pub struct AttributeRegistry {
    table: SymbolTable<AttributeDescriptor>,
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        Self { table: SymbolTable::new("attribute", u16::MAX as usize) }
    }
}

impl AttributeRegistry {
    /// Resolve or register with whatever cardinality is already known
    /// (multi-valued if new).
    pub fn register(&self, name: &str) -> Result<Attribute> {
        self.table
            .intern(name, None, AttributeDescriptor::default)
            .map(|i| Attribute(i as u16))
    }

    /// Register with an explicit cardinality; conflicts with an earlier
    /// registration are configuration errors.
    pub fn register_with(&self, name: &str, cardinality: Cardinality) -> Result<Attribute> {
        self.table
            .intern(name, Some(AttributeDescriptor { cardinality }), AttributeDescriptor::default)
            .map(|i| Attribute(i as u16))
    }

    pub fn register_single(&self, name: &str) -> Result<Attribute> {
        self.register_with(name, Cardinality::Single)
    }

    pub fn lookup(&self, name: &str) -> Option<Attribute> {
        self.table.lookup(name).map(|i| Attribute(i as u16))
    }

    /// Name of a handle. Unknown handles render as `#<index>`.
    pub fn name(&self, attr: Attribute) -> Arc<str> {
        self.table
            .name(attr.index())
            .unwrap_or_else(|| Arc::from(format!("#{}", attr.index())))
    }

    pub fn cardinality(&self, attr: Attribute) -> Cardinality {
        self.table.meta(attr.index()).map(|d| d.cardinality).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every registered `(handle, name, cardinality)`.
    pub fn all(&self) -> Vec<(Attribute, Arc<str>, Cardinality)> {
        self.table
            .snapshot()
            .into_iter()
            .enumerate()
            .map(|(i, (name, d))| (Attribute(i as u16), name, d.cardinality))
            .collect()
    }
}
