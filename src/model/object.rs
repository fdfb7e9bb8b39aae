//! Object (node) in the security graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{AttributeValue, AttributeValues, EdgeBitmap, Sid};
use crate::registry::Attribute;

/// Opaque object identifier, dense within one [`Objects`](crate::Objects)
/// container. When two objects turn out to be one and are folded together,
/// the last object moves into the freed id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Adjacency direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "out")]
    Outgoing,
    #[serde(alias = "in")]
    Incoming,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::Outgoing => Direction::Incoming,
            Direction::Incoming => Direction::Outgoing,
        }
    }
}

// ============================================================================
// Adjacency
// ============================================================================

/// One direction of an object's adjacency: neighbor → edge-kind bitmask.
///
/// A vector sorted by neighbor id. Enumeration order is therefore the
/// order neighbors were created in, identical across clones and across
/// rebuilds from the same input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Adjacency(Vec<(ObjectId, EdgeBitmap)>);

impl Adjacency {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, neighbor: ObjectId) -> EdgeBitmap {
        match self.0.binary_search_by_key(&neighbor, |(id, _)| *id) {
            Ok(pos) => self.0[pos].1,
            Err(_) => EdgeBitmap::EMPTY,
        }
    }

    /// OR `bits` into the entry for `neighbor`.
    pub(crate) fn merge(&mut self, neighbor: ObjectId, bits: EdgeBitmap) {
        match self.0.binary_search_by_key(&neighbor, |(id, _)| *id) {
            Ok(pos) => self.0[pos].1 = self.0[pos].1.union(&bits),
            Err(pos) => self.0.insert(pos, (neighbor, bits)),
        }
    }

    /// Drop the entry for `neighbor`, returning its bits.
    pub(crate) fn remove(&mut self, neighbor: ObjectId) -> EdgeBitmap {
        match self.0.binary_search_by_key(&neighbor, |(id, _)| *id) {
            Ok(pos) => self.0.remove(pos).1,
            Err(_) => EdgeBitmap::EMPTY,
        }
    }

    /// Move the entry for `from` onto `to`, OR-ing with any entry `to`
    /// already has.
    pub(crate) fn rename(&mut self, from: ObjectId, to: ObjectId) {
        let bits = self.remove(from);
        if !bits.is_empty() {
            self.merge(to, bits);
        }
    }

    pub fn neighbors(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.0.iter().map(|(id, _)| *id)
    }

    /// Lazy view filtered by `filter` (empty filter = all kinds).
    pub fn filtered(&self, filter: EdgeBitmap) -> Edges<'_> {
        Edges { inner: self.0.iter(), filter: filter.or_all() }
    }
}

/// Restartable iterator over `(neighbor, matched kinds)`.
///
/// Clone it to restart; an unmutated object always yields the same
/// sequence with no duplicates.
#[derive(Debug, Clone)]
pub struct Edges<'a> {
    inner: std::slice::Iter<'a, (ObjectId, EdgeBitmap)>,
    filter: EdgeBitmap,
}

impl Iterator for Edges<'_> {
    type Item = (ObjectId, EdgeBitmap);

    fn next(&mut self) -> Option<Self::Item> {
        for (id, bits) in self.inner.by_ref() {
            let matched = bits.intersect(&self.filter);
            if !matched.is_empty() {
                return Some((*id, matched));
            }
        }
        None
    }
}

// ============================================================================
// Merge provenance
// ============================================================================

/// What happened to an object while sources were merged into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "note", rename_all = "snake_case")]
pub enum MergeNote {
    /// A single-valued attribute was replaced (last writer wins).
    Overwritten {
        attribute: String,
        previous: AttributeValues,
        source: String,
    },
    /// An incoming object matched this object and `other` on different
    /// unique attributes, but the two disagree on their identities and
    /// cannot be folded. The value owned by `other` was dropped.
    AmbiguousMatch {
        attribute: String,
        value: AttributeValue,
        other: ObjectId,
        source: String,
    },
    /// Something in the incoming data could not be applied.
    Skipped { reason: String, source: String },
}

// ============================================================================
// Object
// ============================================================================

/// A node: attributes plus symmetric outbound/inbound adjacency.
///
/// Fields are private to the crate. Mutation goes through
/// [`Objects`](crate::Objects) so unique indexes and the paired adjacency
/// maps stay consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub(crate) id: ObjectId,
    pub(crate) attributes: BTreeMap<Attribute, AttributeValues>,
    pub(crate) outbound: Adjacency,
    pub(crate) inbound: Adjacency,
    pub(crate) notes: Vec<MergeNote>,
}

impl Object {
    pub(crate) fn new(id: ObjectId) -> Self {
        Self {
            id,
            attributes: BTreeMap::new(),
            outbound: Adjacency::default(),
            inbound: Adjacency::default(),
            notes: Vec::new(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn get(&self, attr: Attribute) -> Option<&AttributeValues> {
        self.attributes.get(&attr)
    }

    /// First value of an attribute.
    pub fn first(&self, attr: Attribute) -> Option<&AttributeValue> {
        self.attributes.get(&attr).and_then(|v| v.first())
    }

    pub fn has(&self, attr: Attribute, value: &AttributeValue) -> bool {
        self.attributes.get(&attr).is_some_and(|v| v.contains(value))
    }

    /// First SID-typed value of an attribute.
    pub fn sid(&self, attr: Attribute) -> Option<&Sid> {
        self.attributes.get(&attr)?.iter().find_map(|v| v.as_sid())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (Attribute, &AttributeValues)> {
        self.attributes.iter().map(|(a, v)| (*a, v))
    }

    pub fn adjacency(&self, dir: Direction) -> &Adjacency {
        match dir {
            Direction::Outgoing => &self.outbound,
            Direction::Incoming => &self.inbound,
        }
    }

    /// `(neighbor, matched kinds)` in one direction, filtered by `filter`
    /// (`EdgeBitmap::EMPTY` = all kinds).
    pub fn edges(&self, dir: Direction, filter: EdgeBitmap) -> Edges<'_> {
        self.adjacency(dir).filtered(filter)
    }

    /// Kinds on the edge from this object to `target`.
    pub fn edge_to(&self, target: ObjectId) -> EdgeBitmap {
        self.outbound.get(target)
    }

    pub fn notes(&self) -> &[MergeNote] {
        &self.notes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EdgeKind;

    #[test]
    fn test_adjacency_merge_is_union() {
        let mut adj = Adjacency::default();
        let k1 = EdgeKind::from_index(1);
        let k2 = EdgeKind::from_index(2);
        adj.merge(ObjectId(5), EdgeBitmap::single(k1));
        adj.merge(ObjectId(2), EdgeBitmap::single(k1));
        adj.merge(ObjectId(5), EdgeBitmap::single(k2));
        adj.merge(ObjectId(5), EdgeBitmap::single(k2));

        assert_eq!(adj.len(), 2);
        assert_eq!(adj.get(ObjectId(5)).count(), 2);
        assert_eq!(adj.get(ObjectId(9)), EdgeBitmap::EMPTY);
    }

    #[test]
    fn test_rename_keeps_order_and_unions() {
        let mut adj = Adjacency::default();
        let k1 = EdgeKind::from_index(1);
        let k2 = EdgeKind::from_index(2);
        adj.merge(ObjectId(1), EdgeBitmap::single(k1));
        adj.merge(ObjectId(4), EdgeBitmap::single(k2));
        adj.merge(ObjectId(7), EdgeBitmap::single(k1));

        adj.rename(ObjectId(7), ObjectId(4));
        adj.rename(ObjectId(9), ObjectId(2));

        assert_eq!(adj.neighbors().collect::<Vec<_>>(), vec![ObjectId(1), ObjectId(4)]);
        assert_eq!(adj.get(ObjectId(4)), EdgeBitmap::single(k1).with(k2));
        assert_eq!(adj.remove(ObjectId(1)), EdgeBitmap::single(k1));
        assert_eq!(adj.len(), 1);
    }

    #[test]
    fn test_edges_iterator_filters_and_restarts() {
        let mut adj = Adjacency::default();
        let k1 = EdgeKind::from_index(1);
        let k2 = EdgeKind::from_index(2);
        adj.merge(ObjectId(1), EdgeBitmap::single(k1));
        adj.merge(ObjectId(2), EdgeBitmap::single(k2));
        adj.merge(ObjectId(3), EdgeBitmap::single(k1).with(k2));

        let only_k1 = adj.filtered(EdgeBitmap::single(k1));
        let first: Vec<_> = only_k1.clone().collect();
        let second: Vec<_> = only_k1.collect();
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![(ObjectId(1), EdgeBitmap::single(k1)), (ObjectId(3), EdgeBitmap::single(k1))]
        );

        assert_eq!(adj.filtered(EdgeBitmap::EMPTY).count(), 3);
    }
}
