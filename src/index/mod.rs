//! Unique-value indexes.
//!
//! Each indexed attribute maps every value it holds to exactly one object.
//! Indexes are owned by [`Objects`](crate::Objects), which is the only
//! writer; they are how incoming objects find the object they merge into.

use hashbrown::HashMap;

use crate::model::{AttributeValue, ObjectId};
use crate::registry::Attribute;

/// One unique index: value → object.
#[derive(Debug, Clone, Default)]
pub struct UniqueIndex {
    entries: HashMap<AttributeValue, ObjectId>,
}

impl UniqueIndex {
    pub fn get(&self, value: &AttributeValue) -> Option<ObjectId> {
        self.entries.get(value).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Claim `value` for `id`. Returns the current owner if another object
    /// already holds it; the index is left untouched in that case.
    pub(crate) fn claim(&mut self, value: AttributeValue, id: ObjectId) -> Result<(), ObjectId> {
        match self.entries.get(&value) {
            Some(owner) if *owner != id => Err(*owner),
            Some(_) => Ok(()),
            None => {
                self.entries.insert(value, id);
                Ok(())
            }
        }
    }

    pub(crate) fn release(&mut self, value: &AttributeValue, id: ObjectId) {
        if self.entries.get(value) == Some(&id) {
            self.entries.remove(value);
        }
    }
}

/// All unique indexes of a container, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct Indexes {
    indexes: Vec<(Attribute, UniqueIndex)>,
}

impl Indexes {
    pub fn new(attributes: impl IntoIterator<Item = Attribute>) -> Self {
        let mut indexes: Vec<(Attribute, UniqueIndex)> = Vec::new();
        for attr in attributes {
            if !indexes.iter().any(|(a, _)| *a == attr) {
                indexes.push((attr, UniqueIndex::default()));
            }
        }
        Self { indexes }
    }

    pub fn is_indexed(&self, attr: Attribute) -> bool {
        self.indexes.iter().any(|(a, _)| *a == attr)
    }

    pub fn attributes(&self) -> impl Iterator<Item = Attribute> + '_ {
        self.indexes.iter().map(|(a, _)| *a)
    }

    pub fn get(&self, attr: Attribute) -> Option<&UniqueIndex> {
        self.indexes.iter().find(|(a, _)| *a == attr).map(|(_, i)| i)
    }

    pub(crate) fn get_mut(&mut self, attr: Attribute) -> Option<&mut UniqueIndex> {
        self.indexes.iter_mut().find(|(a, _)| *a == attr).map(|(_, i)| i)
    }

    pub fn find(&self, attr: Attribute, value: &AttributeValue) -> Option<ObjectId> {
        self.get(attr)?.get(value)
    }
}
