//! Batch import and merge.
//!
//! Merge rules:
//!
//! - An incoming object merges into the existing object that owns one of
//!   its unique values (indexes consulted in configuration order);
//!   otherwise it becomes a new object.
//! - If its unique values are owned by several existing objects that agree
//!   on their identities, those objects are one thing seen from different
//!   sources: they are folded into the first before merging. Owners that
//!   disagree stay apart and the conflicting values are dropped with a
//!   [`MergeNote::AmbiguousMatch`].
//! - Multi-valued attributes are unioned and edges are OR-ed, so the
//!   resulting attribute sets and bitmasks do not depend on import order.
//! - Single-valued attributes are overwritten: the last value imported
//!   wins, and the replaced value is kept as a [`MergeNote::Overwritten`].
//!   This is the one order-sensitive rule.
//! - Bad data never aborts the batch; it becomes a [`MergeNote`].

use serde::{Deserialize, Serialize};

use super::Objects;
use crate::batch::{CollectedBatch, CollectedObject, RawValues};
use crate::model::*;
use crate::registry::{defaults, Attribute, Cardinality};

/// What one import did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub objects_created: usize,
    pub objects_merged: usize,
    /// Existing objects folded into another because an incoming object
    /// joined their identities.
    pub objects_folded: usize,
    pub stubs_created: usize,
    pub edges_added: usize,
    pub notes: usize,
}

impl std::ops::AddAssign for ImportStats {
    fn add_assign(&mut self, other: Self) {
        self.objects_created += other.objects_created;
        self.objects_merged += other.objects_merged;
        self.objects_folded += other.objects_folded;
        self.stubs_created += other.stubs_created;
        self.edges_added += other.edges_added;
        self.notes += other.notes;
    }
}

impl Objects {
    /// Import one collected batch.
    #[tracing::instrument(skip(self, batch), fields(source = %batch.source, objects = batch.objects.len()))]
    pub fn import(&mut self, batch: &CollectedBatch) -> ImportStats {
        let mut stats = ImportStats::default();

        // Pass 1: objects and attributes. Edges wait until every object of
        // the batch exists so intra-batch targets resolve to real objects.
        let mut resolved = Vec::with_capacity(batch.objects.len());
        for incoming in &batch.objects {
            let id = self.merge_object(incoming, &batch.source, &mut stats, &mut resolved);
            resolved.push(id);
        }

        // Pass 2: edges.
        for (incoming, id) in batch.objects.iter().zip(resolved) {
            for edge in &incoming.edges {
                let kind = match self.registry.edges.register_name(&edge.kind) {
                    Ok(kind) => kind,
                    Err(e) => {
                        self.skip(id, format!("edge kind '{}': {e}", edge.kind), &batch.source, &mut stats);
                        continue;
                    }
                };
                let Some(other) = self.resolve_or_stub(&edge.target, &mut stats) else {
                    self.skip(id, format!("edge '{}' has an empty target", edge.kind), &batch.source, &mut stats);
                    continue;
                };
                let (source, target) = match edge.direction {
                    Direction::Outgoing => (id, other),
                    Direction::Incoming => (other, id),
                };
                if self.add_edge(source, target, kind).is_ok() {
                    stats.edges_added += 1;
                }
            }
        }

        tracing::info!(
            created = stats.objects_created,
            merged = stats.objects_merged,
            folded = stats.objects_folded,
            stubs = stats.stubs_created,
            edges = stats.edges_added,
            notes = stats.notes,
            "batch imported"
        );
        stats
    }

    /// Merge one incoming object, returning its id. Ids in `resolved` are
    /// kept valid across any fold this causes.
    fn merge_object(
        &mut self,
        incoming: &CollectedObject,
        source: &str,
        stats: &mut ImportStats,
        resolved: &mut [ObjectId],
    ) -> ObjectId {
        let mut attributes: Vec<(Attribute, AttributeValues)> = Vec::with_capacity(incoming.attributes.len());
        let mut collapsed: Vec<(Attribute, AttributeValues)> = Vec::new();
        let mut rejected = Vec::new();
        for (name, raw) in &incoming.attributes {
            let attr = match self.registry.attributes.register(name) {
                Ok(attr) => attr,
                Err(e) => {
                    rejected.push(format!("attribute '{name}': {e}"));
                    continue;
                }
            };
            let values = match raw {
                RawValues::Many(values) if self.registry.attributes.cardinality(attr) == Cardinality::Single => {
                    let Some((last, earlier)) = values.split_last() else {
                        continue;
                    };
                    let earlier: AttributeValues = earlier.iter().filter(|v| *v != last).cloned().collect();
                    if !earlier.is_empty() {
                        collapsed.push((attr, self.normalize(attr, earlier)));
                    }
                    AttributeValues::single(last.clone())
                }
                raw => raw.clone().into_values(),
            };
            attributes.push((attr, self.normalize(attr, values)));
        }

        // Every existing object owning one of the incoming unique values,
        // in index configuration order.
        let mut owners: Vec<ObjectId> = Vec::new();
        let indexed: Vec<Attribute> = self.indexes.attributes().collect();
        for attr in indexed {
            let Some((_, values)) = attributes.iter().find(|(a, _)| *a == attr) else {
                continue;
            };
            for v in values {
                if let Some(owner) = self.indexes.find(attr, v)
                    && !owners.contains(&owner)
                {
                    owners.push(owner);
                }
            }
        }

        let id = match owners.first().copied() {
            Some(mut id) => {
                stats.objects_merged += 1;
                for i in 1..owners.len() {
                    let other = owners[i];
                    if other == id {
                        continue;
                    }
                    if !self.can_fold(id, other) {
                        // The values `other` owns are dropped and noted by
                        // merge_attribute.
                        tracing::warn!(%id, %other, source, "incoming object matches two unrelated objects");
                        continue;
                    }
                    match self.fold(id, other, source) {
                        Ok(folded) => {
                            for owner in owners.iter_mut().chain(resolved.iter_mut()) {
                                *owner = folded.map(*owner);
                            }
                            id = folded.kept;
                            stats.objects_folded += 1;
                            tracing::info!(%id, source, "objects joined by an incoming object folded");
                        }
                        Err(e) => self.skip(id, e.to_string(), source, stats),
                    }
                }
                id
            }
            None => {
                stats.objects_created += 1;
                self.push_empty()
            }
        };

        for reason in rejected {
            self.skip(id, reason, source, stats);
        }
        for (attr, earlier) in collapsed {
            let attribute = self.registry.attributes.name(attr).to_string();
            tracing::warn!(%id, source, %attribute, "single-valued attribute given several values, keeping the last");
            self.note(id, MergeNote::Overwritten { attribute, previous: earlier, source: source.to_string() });
            stats.notes += 1;
        }

        for (attr, values) in attributes {
            self.merge_attribute(id, attr, values, source, stats);
        }
        id
    }

    fn merge_attribute(
        &mut self,
        id: ObjectId,
        attr: Attribute,
        mut incoming: AttributeValues,
        source: &str,
        stats: &mut ImportStats,
    ) {
        // Drop values another object already owns; keep the rest.
        if let Some(index) = self.indexes.get(attr) {
            let taken: Vec<(AttributeValue, ObjectId)> = incoming
                .iter()
                .filter_map(|v| index.get(v).filter(|o| *o != id).map(|o| (v.clone(), o)))
                .collect();
            if !taken.is_empty() {
                let attribute = self.registry.attributes.name(attr).to_string();
                incoming = incoming.iter().filter(|v| !taken.iter().any(|(t, _)| t == *v)).cloned().collect();
                for (value, other) in taken {
                    self.note(id, MergeNote::AmbiguousMatch {
                        attribute: attribute.clone(),
                        value,
                        other,
                        source: source.to_string(),
                    });
                    stats.notes += 1;
                }
            }
        }
        if incoming.is_empty() {
            return;
        }

        let current = self.get(id).and_then(|o| o.get(attr)).cloned().unwrap_or_default();
        let merged = match self.registry.attributes.cardinality(attr) {
            Cardinality::Multi => {
                let mut merged = current.clone();
                merged.union(&incoming);
                merged
            }
            Cardinality::Single => {
                if !current.is_empty() && current != incoming {
                    let attribute = self.registry.attributes.name(attr).to_string();
                    self.note(id, MergeNote::Overwritten { attribute, previous: current.clone(), source: source.to_string() });
                    stats.notes += 1;
                }
                incoming
            }
        };
        if merged == current {
            return;
        }

        if let Err(e) = self.set_attribute(id, attr, merged) {
            self.skip(id, e.to_string(), source, stats);
        }
    }

    /// SIDs arriving as text under a SID attribute are stored as SIDs so
    /// index lookups by SID find them.
    fn normalize(&self, attr: Attribute, values: AttributeValues) -> AttributeValues {
        let name = self.registry.attributes.name(attr);
        if !defaults::SID_ATTRIBUTES.contains(&&*name) {
            return values;
        }
        values
            .iter()
            .map(|v| match v {
                AttributeValue::String(s) => s.parse::<Sid>().map(AttributeValue::Sid).unwrap_or_else(|_| v.clone()),
                _ => v.clone(),
            })
            .collect()
    }

    /// Resolve an edge target, creating a stub object holding only the
    /// identifier when nothing matches.
    fn resolve_or_stub(&mut self, identifier: &str, stats: &mut ImportStats) -> Option<ObjectId> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return None;
        }
        if let Some(id) = self.resolve_identifier(identifier) {
            return Some(id);
        }

        let (attr, value) = match identifier.parse::<Sid>() {
            Ok(sid) => (self.object_sid, AttributeValue::Sid(sid)),
            Err(_) => (self.distinguished_name, AttributeValue::String(identifier.to_string())),
        };
        let id = self.push_empty();
        // Unindexed identifier attributes cannot conflict; indexed ones were
        // just looked up and found free.
        let _ = self.set_attribute(id, attr, AttributeValues::single(value));
        stats.stubs_created += 1;
        tracing::debug!(%id, identifier, "created stub for unresolved edge target");
        Some(id)
    }

    fn skip(&mut self, id: ObjectId, reason: String, source: &str, stats: &mut ImportStats) {
        tracing::warn!(%id, source, %reason, "import data skipped");
        self.note(id, MergeNote::Skipped { reason, source: source.to_string() });
        stats.notes += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::registry::Registry;

    fn objects() -> Objects {
        Objects::with_default_indexes(Arc::new(Registry::with_defaults().unwrap())).unwrap()
    }

    #[test]
    fn test_import_creates_and_links() {
        let mut objs = objects();
        let batch = CollectedBatch::new("dir").with_object(
            CollectedObject::new()
                .with_sid("S-1-5-21-1-2-3-1105".parse().unwrap())
                .with("name", "alice")
                .edge("AdminRights", "S-1-5-21-1-2-3-2000"),
        );
        let stats = objs.import(&batch);
        assert_eq!(stats, ImportStats { objects_created: 1, stubs_created: 1, edges_added: 1, ..Default::default() });

        let alice = objs.resolve_identifier("S-1-5-21-1-2-3-1105").unwrap();
        let stub = objs.resolve_identifier("S-1-5-21-1-2-3-2000").unwrap();
        let admin = objs.registry().edges.lookup("AdminRights").unwrap();
        assert!(objs.get(alice).unwrap().edge_to(stub).contains(admin));
    }

    #[test]
    fn test_text_sid_is_normalized() {
        let mut objs = objects();
        let batch = CollectedBatch::new("dir")
            .with_object(CollectedObject::new().with("objectSid", "S-1-5-21-7-7-7-500"));
        objs.import(&batch);
        assert!(objs.find_sid(&"S-1-5-21-7-7-7-500".parse().unwrap()).is_some());
    }

    #[test]
    fn test_single_valued_overwrite_records_note() {
        let mut objs = objects();
        let sid: Sid = "S-1-5-21-1-2-3-500".parse().unwrap();
        objs.import(&CollectedBatch::new("first").with_object(CollectedObject::new().with_sid(sid.clone()).with("name", "old")));
        objs.import(&CollectedBatch::new("second").with_object(CollectedObject::new().with_sid(sid.clone()).with("name", "new")));

        let id = objs.find_sid(&sid).unwrap();
        let obj = objs.get(id).unwrap();
        let name = objs.registry().attributes.lookup("name").unwrap();
        assert_eq!(obj.first(name), Some(&AttributeValue::from("new")));
        assert_eq!(
            obj.notes(),
            &[MergeNote::Overwritten {
                attribute: "name".into(),
                previous: AttributeValues::single("old"),
                source: "second".into(),
            }]
        );
    }

    #[test]
    fn test_several_values_for_single_valued_attribute_keep_the_last() {
        let mut objs = objects();
        let batch = CollectedBatch::new("dir").with_object(
            CollectedObject::new()
                .with("distinguishedName", "CN=Alice,DC=corp")
                .with_many("name", ["first", "second", "third"]),
        );
        let stats = objs.import(&batch);
        assert_eq!(stats.notes, 1);

        let id = objs.find_dn("CN=Alice,DC=corp").unwrap();
        let name = objs.registry().attributes.lookup("name").unwrap();
        let obj = objs.get(id).unwrap();
        assert_eq!(obj.get(name), Some(&AttributeValues::single("third")));
        assert_eq!(
            obj.notes(),
            &[MergeNote::Overwritten {
                attribute: "name".into(),
                previous: ["first", "second"].into_iter().map(AttributeValue::from).collect(),
                source: "dir".into(),
            }]
        );
    }

    #[test]
    fn test_object_joining_two_owners_folds_them() {
        let mut objs = objects();
        let sid: Sid = "S-1-5-21-1-2-3-1104".parse().unwrap();
        objs.import(&CollectedBatch::new("a").with_object(CollectedObject::new().with_sid(sid.clone()).edge("AdminRights", "CN=T1")));
        objs.import(&CollectedBatch::new("b").with_object(CollectedObject::new().with("distinguishedName", "CN=Alice").edge("Hosts", "CN=T2")));
        assert_eq!(objs.len(), 4);

        let stats = objs.import(
            &CollectedBatch::new("c")
                .with_object(CollectedObject::new().with("distinguishedName", "CN=Alice").with_sid(sid.clone())),
        );
        assert_eq!(stats.objects_folded, 1);
        assert_eq!(stats.notes, 0);
        assert_eq!(objs.len(), 3);

        let alice = objs.find_sid(&sid).unwrap();
        assert_eq!(objs.find_dn("CN=Alice"), Some(alice));
        let t1 = objs.find_dn("CN=T1").unwrap();
        let t2 = objs.find_dn("CN=T2").unwrap();
        assert_eq!(objs.get(alice).unwrap().edges(Direction::Outgoing, EdgeBitmap::EMPTY).count(), 2);
        assert!(!objs.get(alice).unwrap().edge_to(t1).is_empty());
        assert!(!objs.get(alice).unwrap().edge_to(t2).is_empty());
    }

    #[test]
    fn test_owners_with_different_identities_stay_apart() {
        let mut objs = objects();
        let alice: Sid = "S-1-5-21-1-2-3-1104".parse().unwrap();
        let bob: Sid = "S-1-5-21-1-2-3-1105".parse().unwrap();
        objs.import(&CollectedBatch::new("a").with_object(CollectedObject::new().with_sid(alice.clone())));
        objs.import(
            &CollectedBatch::new("b")
                .with_object(CollectedObject::new().with_sid(bob.clone()).with("distinguishedName", "CN=Bob")),
        );

        let stats = objs.import(
            &CollectedBatch::new("c")
                .with_object(CollectedObject::new().with_sid(alice.clone()).with("distinguishedName", "CN=Bob")),
        );
        assert_eq!(stats.objects_folded, 0);
        assert_eq!(objs.len(), 2);
        let a = objs.find_sid(&alice).unwrap();
        assert_eq!(objs.find_dn("CN=Bob"), objs.find_sid(&bob));
        assert!(matches!(objs.get(a).unwrap().notes(), [MergeNote::AmbiguousMatch { .. }]));
    }

    #[test]
    fn test_incoming_edge_direction() {
        let mut objs = objects();
        let batch = CollectedBatch::new("local").with_object(
            CollectedObject::new()
                .with("distinguishedName", "CN=WS01")
                .edge_from("SessionLastDay", "S-1-5-21-1-2-3-1105"),
        );
        objs.import(&batch);
        let ws = objs.find_dn("CN=WS01").unwrap();
        let user = objs.resolve_identifier("S-1-5-21-1-2-3-1105").unwrap();
        assert!(!objs.get(user).unwrap().edge_to(ws).is_empty());
        assert!(objs.get(ws).unwrap().edge_to(user).is_empty());
    }

    #[test]
    fn test_bad_names_become_notes() {
        let mut objs = objects();
        let batch = CollectedBatch::new("broken").with_object(
            CollectedObject::new()
                .with("distinguishedName", "CN=X")
                .with("", "nameless")
                .edge("", "CN=Y")
                .edge("Hosts", "  "),
        );
        let stats = objs.import(&batch);
        assert_eq!(stats.notes, 3);
        let x = objs.find_dn("CN=X").unwrap();
        assert_eq!(objs.get(x).unwrap().notes().len(), 3);
    }
}
