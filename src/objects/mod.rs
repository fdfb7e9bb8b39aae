//! # Objects container
//!
//! Owns every [`Object`] of one graph generation. All mutation goes through
//! here so that:
//!
//! - unique indexes always agree with the attributes they index, and
//! - outbound and inbound adjacency stay two views of one relationship
//!   set: if `A → B` carries bit `k`, `B`'s inbound entry for `A` carries
//!   `k` too.
//!
//! Objects are never deleted on their own. The only removal is a fold:
//! when one incoming object proves two existing objects are the same
//! thing, the second is folded into the first (see [`Objects::fold`]).

mod import;

use std::sync::Arc;

use crate::index::Indexes;
use crate::model::*;
use crate::registry::{defaults, Attribute, Cardinality, EdgeKind, Registry};
use crate::{Error, Result};

pub use import::ImportStats;

/// Id changes made by one [`Objects::fold`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Folded {
    gone: ObjectId,
    /// The surviving object's id after the fold.
    pub kept: ObjectId,
    /// The former last object, now living at `gone`'s id.
    moved: Option<ObjectId>,
}

impl Folded {
    /// Translate an id taken before the fold.
    pub fn map(&self, id: ObjectId) -> ObjectId {
        if id == self.gone {
            self.kept
        } else if Some(id) == self.moved {
            self.gone
        } else {
            id
        }
    }
}

/// The graph container.
#[derive(Debug, Clone)]
pub struct Objects {
    registry: Arc<Registry>,
    objects: Vec<Object>,
    indexes: Indexes,
    object_sid: Attribute,
    distinguished_name: Attribute,
}

impl Objects {
    /// Empty container indexing `unique` attributes.
    ///
    /// `objectSid` and `distinguishedName` are resolved (registered if
    /// needed) because edge targets are looked up through them.
    pub fn new(registry: Arc<Registry>, unique: &[Attribute]) -> Result<Self> {
        let object_sid = registry.attributes.register_single(defaults::OBJECT_SID)?;
        let distinguished_name = registry.attributes.register_single(defaults::DISTINGUISHED_NAME)?;
        Ok(Self {
            registry,
            objects: Vec::new(),
            indexes: Indexes::new(unique.iter().copied()),
            object_sid,
            distinguished_name,
        })
    }

    /// Container with the default unique indexes (SID, then DN).
    pub fn with_default_indexes(registry: Arc<Registry>) -> Result<Self> {
        let sid = registry.attributes.register_single(defaults::OBJECT_SID)?;
        let dn = registry.attributes.register_single(defaults::DISTINGUISHED_NAME)?;
        Self::new(registry, &[sid, dn])
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn indexes(&self) -> &Indexes {
        &self.indexes
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.objects.iter()
    }

    /// Number of (pair, kind) edges.
    pub fn edge_count(&self) -> usize {
        self.objects
            .iter()
            .flat_map(|o| o.outbound.filtered(EdgeBitmap::ALL))
            .map(|(_, bits)| bits.count() as usize)
            .sum()
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Lookup by value. Indexed attributes are O(1); others scan.
    pub fn find(&self, attr: Attribute, value: &AttributeValue) -> Option<ObjectId> {
        if self.indexes.is_indexed(attr) {
            return self.indexes.find(attr, value);
        }
        self.objects.iter().find(|o| o.has(attr, value)).map(|o| o.id)
    }

    /// Every object holding `value` under `attr`.
    pub fn find_all(&self, attr: Attribute, value: &AttributeValue) -> Vec<ObjectId> {
        if self.indexes.is_indexed(attr) {
            return self.indexes.find(attr, value).into_iter().collect();
        }
        self.objects.iter().filter(|o| o.has(attr, value)).map(|o| o.id).collect()
    }

    pub fn find_sid(&self, sid: &Sid) -> Option<ObjectId> {
        self.find(self.object_sid, &AttributeValue::Sid(sid.clone()))
    }

    pub fn find_dn(&self, dn: &str) -> Option<ObjectId> {
        self.find(self.distinguished_name, &AttributeValue::String(dn.to_string()))
    }

    /// Resolve a collector identifier: SID text first, then DN.
    pub fn resolve_identifier(&self, identifier: &str) -> Option<ObjectId> {
        match identifier.parse::<Sid>() {
            Ok(sid) => self.find_sid(&sid),
            Err(_) => self.find_dn(identifier),
        }
    }

    /// Objects that hold any value for `attr`.
    pub fn with_attribute(&self, attr: Attribute) -> impl Iterator<Item = &Object> {
        self.objects.iter().filter(move |o| o.get(attr).is_some_and(|v| !v.is_empty()))
    }

    pub fn sid_of(&self, id: ObjectId) -> Option<&Sid> {
        self.get(id)?.sid(self.object_sid)
    }

    /// Human label: name, DN, SID or `#id`.
    pub fn display_name(&self, id: ObjectId) -> String {
        let Some(obj) = self.get(id) else {
            return id.to_string();
        };
        let name = self.registry.attributes.lookup(defaults::NAME);
        name.and_then(|a| obj.first(a))
            .or_else(|| obj.first(self.distinguished_name))
            .or_else(|| obj.first(self.object_sid))
            .map(|v| v.to_string())
            .unwrap_or_else(|| id.to_string())
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Create an object. Fails without side effects if a unique value is
    /// already owned by another object.
    pub fn add_object(
        &mut self,
        attributes: impl IntoIterator<Item = (Attribute, AttributeValues)>,
    ) -> Result<ObjectId> {
        let attributes: Vec<_> = attributes.into_iter().collect();
        for (attr, values) in &attributes {
            for v in values {
                if let Some(owner) = self.indexes.find(*attr, v) {
                    return Err(self.conflict(*attr, v, owner));
                }
            }
        }

        let id = self.push_empty();
        for (attr, values) in attributes {
            self.set_attribute(id, attr, values)?;
        }
        Ok(id)
    }

    pub(crate) fn push_empty(&mut self) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(Object::new(id));
        id
    }

    /// Replace all values of `attr`, re-indexing if `attr` is indexed.
    /// Fails without side effects if a new value belongs to another object.
    pub fn set_attribute(&mut self, id: ObjectId, attr: Attribute, values: AttributeValues) -> Result<()> {
        let obj = self.objects.get(id.index()).ok_or_else(|| Error::NotFound(format!("object {id}")))?;

        if let Some(index) = self.indexes.get(attr) {
            for v in &values {
                if let Some(owner) = index.get(v).filter(|owner| *owner != id) {
                    return Err(self.conflict(attr, v, owner));
                }
            }
            let previous = obj.get(attr).cloned().unwrap_or_default();
            if let Some(index) = self.indexes.get_mut(attr) {
                for v in &previous {
                    index.release(v, id);
                }
                for v in &values {
                    // Ownership was checked above.
                    let _ = index.claim(v.clone(), id);
                }
            }
        }

        let obj = &mut self.objects[id.index()];
        if values.is_empty() {
            obj.attributes.remove(&attr);
        } else {
            obj.attributes.insert(attr, values);
        }
        Ok(())
    }

    /// Add one value following the attribute's cardinality: multi-valued
    /// attributes gain the value, single-valued ones are replaced.
    pub fn add_value(&mut self, id: ObjectId, attr: Attribute, value: AttributeValue) -> Result<()> {
        let mut values = match self.registry.attributes.cardinality(attr) {
            Cardinality::Multi => self.get(id).and_then(|o| o.get(attr)).cloned().unwrap_or_default(),
            Cardinality::Single => AttributeValues::new(),
        };
        values.insert(value);
        self.set_attribute(id, attr, values)
    }

    /// Set `kind` on `source → target` in both adjacency maps. Idempotent.
    pub fn add_edge(&mut self, source: ObjectId, target: ObjectId, kind: EdgeKind) -> Result<()> {
        self.add_edges(source, target, EdgeBitmap::single(kind))
    }

    /// OR `kinds` into `source → target` in both adjacency maps.
    pub fn add_edges(&mut self, source: ObjectId, target: ObjectId, kinds: EdgeBitmap) -> Result<()> {
        for id in [source, target] {
            if id.index() >= self.objects.len() {
                return Err(Error::NotFound(format!("object {id}")));
            }
        }
        if kinds.is_empty() {
            return Ok(());
        }
        self.objects[source.index()].outbound.merge(target, kinds);
        self.objects[target.index()].inbound.merge(source, kinds);
        Ok(())
    }

    /// `(neighbor, matched kinds)` for one object and direction.
    /// `EdgeBitmap::EMPTY` as filter means all kinds.
    pub fn edges(&self, id: ObjectId, dir: Direction, filter: EdgeBitmap) -> Option<Edges<'_>> {
        self.get(id).map(|o| o.edges(dir, filter))
    }

    // ========================================================================
    // Folding
    // ========================================================================

    /// Whether `a` and `b` could be one object: no single-valued unique
    /// attribute holds different values on the two.
    pub fn can_fold(&self, a: ObjectId, b: ObjectId) -> bool {
        let (Some(a), Some(b)) = (self.get(a), self.get(b)) else {
            return false;
        };
        self.indexes.attributes().all(|attr| {
            if self.registry.attributes.cardinality(attr) == Cardinality::Multi {
                return true;
            }
            match (a.get(attr), b.get(attr)) {
                (Some(x), Some(y)) => x.is_empty() || y.is_empty() || x == y,
                _ => true,
            }
        })
    }

    /// Fold `gone` into `keep`. `keep` gains its attributes, index claims,
    /// notes and edges in both directions; `gone` is removed and the last
    /// object moves into its id. Ids held across the call must go through
    /// [`Folded::map`].
    ///
    /// Multi-valued attributes are unioned. For single-valued ones `keep`'s
    /// value stays and a differing value from `gone` is kept as a
    /// [`MergeNote::Overwritten`].
    pub fn fold(&mut self, keep: ObjectId, gone: ObjectId, source: &str) -> Result<Folded> {
        for id in [keep, gone] {
            if id.index() >= self.objects.len() {
                return Err(Error::NotFound(format!("object {id}")));
            }
        }
        if keep == gone {
            return Err(Error::Config(format!("cannot fold {keep} into itself")));
        }

        let absorbed = std::mem::replace(&mut self.objects[gone.index()], Object::new(gone));

        for (target, bits) in absorbed.outbound.filtered(EdgeBitmap::ALL) {
            self.objects[target.index()].inbound.remove(gone);
            let target = if target == gone { keep } else { target };
            self.add_edges(keep, target, bits)?;
        }
        for (origin, bits) in absorbed.inbound.filtered(EdgeBitmap::ALL) {
            self.objects[origin.index()].outbound.remove(gone);
            let origin = if origin == gone { keep } else { origin };
            self.add_edges(origin, keep, bits)?;
        }

        for (attr, values) in absorbed.attributes {
            if let Some(index) = self.indexes.get_mut(attr) {
                for v in &values {
                    index.release(v, gone);
                }
            }
            let current = self.objects[keep.index()].attributes.get(&attr).cloned().unwrap_or_default();
            let merged = match self.registry.attributes.cardinality(attr) {
                Cardinality::Multi => {
                    let mut merged = current;
                    merged.union(&values);
                    merged
                }
                Cardinality::Single if current.is_empty() => values,
                Cardinality::Single => {
                    if current != values {
                        let attribute = self.registry.attributes.name(attr).to_string();
                        self.note(keep, MergeNote::Overwritten { attribute, previous: values, source: source.to_string() });
                    }
                    current
                }
            };
            self.set_attribute(keep, attr, merged)?;
        }
        let mut notes = absorbed.notes;
        self.objects[keep.index()].notes.append(&mut notes);

        let last = ObjectId((self.objects.len() - 1) as u32);
        self.objects.swap_remove(gone.index());
        let moved = if gone != last {
            self.renumber(last, gone);
            Some(last)
        } else {
            None
        };
        let kept = if keep == last { gone } else { keep };
        tracing::debug!(%kept, %gone, "objects folded");
        Ok(Folded { gone, kept, moved })
    }

    /// The object now stored at `to` used to be `from`: fix its id, its
    /// neighbors' adjacency and its index claims.
    fn renumber(&mut self, from: ObjectId, to: ObjectId) {
        let obj = &mut self.objects[to.index()];
        obj.id = to;
        obj.outbound.rename(from, to);
        obj.inbound.rename(from, to);
        let neighbors: Vec<ObjectId> = obj.outbound.neighbors().chain(obj.inbound.neighbors()).collect();
        let claims: Vec<(Attribute, AttributeValue)> = obj
            .attributes
            .iter()
            .filter(|(attr, _)| self.indexes.is_indexed(**attr))
            .flat_map(|(attr, values)| values.iter().map(move |v| (*attr, v.clone())))
            .collect();

        for n in neighbors {
            if n == to {
                continue;
            }
            let neighbor = &mut self.objects[n.index()];
            neighbor.outbound.rename(from, to);
            neighbor.inbound.rename(from, to);
        }
        for (attr, value) in claims {
            if let Some(index) = self.indexes.get_mut(attr) {
                index.release(&value, from);
                // The slot was just released by the same object.
                let _ = index.claim(value, to);
            }
        }
    }

    pub(crate) fn note(&mut self, id: ObjectId, note: MergeNote) {
        if let Some(obj) = self.objects.get_mut(id.index()) {
            obj.notes.push(note);
        }
    }

    fn conflict(&self, attr: Attribute, value: &AttributeValue, owner: ObjectId) -> Error {
        Error::IndexConflict {
            attribute: self.registry.attributes.name(attr).to_string(),
            value: value.to_string(),
            owner: owner.0,
        }
    }

    pub(crate) fn object_sid_attribute(&self) -> Attribute {
        self.object_sid
    }

    pub(crate) fn distinguished_name_attribute(&self) -> Attribute {
        self.distinguished_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Objects, Attribute, Attribute) {
        let registry = Arc::new(Registry::with_defaults().unwrap());
        let objs = Objects::with_default_indexes(registry.clone()).unwrap();
        let sid = registry.attributes.lookup("objectSid").unwrap();
        let name = registry.attributes.lookup("name").unwrap();
        (objs, sid, name)
    }

    fn sid(s: &str) -> AttributeValue {
        AttributeValue::Sid(s.parse().unwrap())
    }

    #[test]
    fn test_add_and_find() {
        let (mut objs, sid_attr, name) = setup();
        let id = objs
            .add_object([
                (sid_attr, AttributeValues::single(sid("S-1-5-21-1-2-3-500"))),
                (name, AttributeValues::single("Administrator")),
            ])
            .unwrap();
        assert_eq!(objs.find(sid_attr, &sid("S-1-5-21-1-2-3-500")), Some(id));
        assert_eq!(objs.find(name, &AttributeValue::from("Administrator")), Some(id));
        assert_eq!(objs.resolve_identifier("S-1-5-21-1-2-3-500"), Some(id));
        assert_eq!(objs.display_name(id), "Administrator");
    }

    #[test]
    fn test_duplicate_unique_value_is_rejected() {
        let (mut objs, sid_attr, _) = setup();
        objs.add_object([(sid_attr, AttributeValues::single(sid("S-1-5-18")))]).unwrap();
        let err = objs.add_object([(sid_attr, AttributeValues::single(sid("S-1-5-18")))]);
        assert!(matches!(err, Err(Error::IndexConflict { .. })));
        assert_eq!(objs.len(), 1);
    }

    #[test]
    fn test_reindex_on_change() {
        let (mut objs, sid_attr, _) = setup();
        let id = objs.add_object([(sid_attr, AttributeValues::single(sid("S-1-5-21-1-1")))]).unwrap();
        objs.set_attribute(id, sid_attr, AttributeValues::single(sid("S-1-5-21-1-2"))).unwrap();
        assert_eq!(objs.find(sid_attr, &sid("S-1-5-21-1-1")), None);
        assert_eq!(objs.find(sid_attr, &sid("S-1-5-21-1-2")), Some(id));
    }

    #[test]
    fn test_edges_are_symmetric_and_idempotent() {
        let (mut objs, _, _) = setup();
        let kind = objs.registry().edges.lookup("AdminRights").unwrap();
        let a = objs.add_object([]).unwrap();
        let b = objs.add_object([]).unwrap();

        objs.add_edge(a, b, kind).unwrap();
        objs.add_edge(a, b, kind).unwrap();

        assert!(objs.get(a).unwrap().edge_to(b).contains(kind));
        assert!(objs.get(b).unwrap().adjacency(Direction::Incoming).get(a).contains(kind));
        assert_eq!(objs.edge_count(), 1);
        assert!(objs.add_edge(a, ObjectId(99), kind).is_err());
    }

    #[test]
    fn test_fold_moves_attributes_edges_and_claims() {
        let (mut objs, sid_attr, name) = setup();
        let dn = objs.distinguished_name_attribute();
        let admin = objs.registry().edges.lookup("AdminRights").unwrap();
        let hosts = objs.registry().edges.lookup("Hosts").unwrap();

        let keep = objs.add_object([(sid_attr, AttributeValues::single(sid("S-1-5-21-1-2-3-1104")))]).unwrap();
        let gone = objs
            .add_object([
                (dn, AttributeValues::single("CN=Alice,DC=corp")),
                (name, AttributeValues::single("alice")),
            ])
            .unwrap();
        let t1 = objs.add_object([]).unwrap();
        let last = objs.add_object([(dn, AttributeValues::single("CN=T2,DC=corp"))]).unwrap();
        objs.add_edge(keep, t1, admin).unwrap();
        objs.add_edge(gone, last, hosts).unwrap();
        objs.add_edge(last, gone, admin).unwrap();

        let folded = objs.fold(keep, gone, "test").unwrap();
        assert_eq!(folded.kept, keep);
        assert_eq!(folded.map(gone), keep);
        assert_eq!(folded.map(last), gone);
        let moved = folded.map(last);

        assert_eq!(objs.len(), 3);
        assert_eq!(objs.find_dn("CN=Alice,DC=corp"), Some(keep));
        assert_eq!(objs.find_dn("CN=T2,DC=corp"), Some(moved));
        assert_eq!(objs.get(moved).unwrap().id(), moved);
        assert_eq!(objs.display_name(keep), "alice");

        let kept = objs.get(keep).unwrap();
        assert!(kept.edge_to(t1).contains(admin));
        assert!(kept.edge_to(moved).contains(hosts));
        assert!(kept.adjacency(Direction::Incoming).get(moved).contains(admin));
        assert!(objs.get(moved).unwrap().adjacency(Direction::Incoming).get(keep).contains(hosts));
        assert_eq!(objs.edge_count(), 3);
    }

    #[test]
    fn test_fold_when_keep_is_last() {
        let (mut objs, sid_attr, _) = setup();
        let gone = objs.add_object([(sid_attr, AttributeValues::single(sid("S-1-5-21-1-1")))]).unwrap();
        let keep = objs.add_object([]).unwrap();
        let folded = objs.fold(keep, gone, "test").unwrap();
        assert_eq!(folded.kept, gone);
        assert_eq!(folded.map(keep), gone);
        assert_eq!(objs.len(), 1);
        assert_eq!(objs.find(sid_attr, &sid("S-1-5-21-1-1")), Some(folded.kept));
        assert!(objs.fold(folded.kept, folded.kept, "test").is_err());
    }

    #[test]
    fn test_can_fold_requires_agreeing_identities() {
        let (mut objs, sid_attr, _) = setup();
        let dn = objs.distinguished_name_attribute();
        let a = objs.add_object([(sid_attr, AttributeValues::single(sid("S-1-5-21-1-1")))]).unwrap();
        let b = objs.add_object([(dn, AttributeValues::single("CN=B"))]).unwrap();
        let c = objs
            .add_object([
                (sid_attr, AttributeValues::single(sid("S-1-5-21-1-2"))),
                (dn, AttributeValues::single("CN=C")),
            ])
            .unwrap();
        assert!(objs.can_fold(a, b));
        assert!(!objs.can_fold(a, c));
        assert!(!objs.can_fold(b, c));
    }

    #[test]
    fn test_add_value_respects_cardinality() {
        let (mut objs, _, name) = setup();
        let wu = objs.registry().attributes.lookup("wuServer").unwrap();
        let id = objs.add_object([]).unwrap();

        objs.add_value(id, name, "first".into()).unwrap();
        objs.add_value(id, name, "second".into()).unwrap();
        objs.add_value(id, wu, "a".into()).unwrap();
        objs.add_value(id, wu, "b".into()).unwrap();

        let obj = objs.get(id).unwrap();
        assert_eq!(obj.get(name).unwrap().len(), 1);
        assert_eq!(obj.first(name), Some(&AttributeValue::from("second")));
        assert_eq!(obj.get(wu).unwrap().len(), 2);
    }
}
