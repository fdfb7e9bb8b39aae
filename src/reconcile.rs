//! # Identity reconciliation
//!
//! Local accounts are collected with SIDs under the machine's local prefix
//! (`S-1-5-21-<local>-<rid>`). The same machine seen through the directory
//! has a global SID. Before a local batch is imported, every local-prefix
//! SID in it is rewritten under the machine's global SID so that an account
//! seen from both angles lands on one object.
//!
//! After import, machines that were collected with the *same* local prefix
//! but are otherwise unrelated (cloned images that were never
//! re-generalized) get an informative `SIDCollision` edge in both
//! directions. Same local prefix means same local account SIDs, which
//! usually means shared local credentials.

use hashbrown::HashMap;

use crate::batch::{BatchKind, CollectedBatch, CollectedObject, RawValues};
use crate::model::{AttributeValue, AttributeValues, ObjectId, Sid};
use crate::objects::Objects;
use crate::registry::{defaults, Attribute, EdgeKind, EdgeKindSpec, EdgeTag, Registry};
use crate::probability::Calculator;
use crate::Result;

/// Translate `input` from the `original` prefix to the `new` prefix.
///
/// Only SIDs exactly one component longer than `original` and starting
/// with it are mapped; anything else is returned unchanged.
pub fn remap_sid(original: &Sid, new: &Sid, input: &Sid) -> Sid {
    if input.components() == original.components() + 1 && input.strip_rid() == *original {
        if let Some(rid) = input.rid() {
            return new.add_component(rid);
        }
    }
    input.clone()
}

/// Two machine SIDs are related if one equals or prefixes the other.
fn related(a: &Sid, b: &Sid) -> bool {
    a == b || a.is_prefix_of(b) || b.is_prefix_of(a)
}

/// Outcome of remapping one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapStats {
    pub machine: Option<Sid>,
    pub values_remapped: usize,
    pub edges_remapped: usize,
}

/// Reconciles local-machine identities.
#[derive(Debug, Clone)]
pub struct Reconciler {
    local_machine_sid: Attribute,
    local_machine_sid_original: Attribute,
    collision: EdgeKind,
}

impl Reconciler {
    /// Resolve (or register) the attributes and the collision edge kind.
    pub fn new(registry: &Registry) -> Result<Self> {
        Ok(Self {
            local_machine_sid: registry.attributes.register_single(defaults::LOCAL_MACHINE_SID)?,
            local_machine_sid_original: registry.attributes.register_single(defaults::LOCAL_MACHINE_SID_ORIGINAL)?,
            collision: registry.edges.register(
                EdgeKindSpec::new(defaults::EDGE_SID_COLLISION)
                    .tag(EdgeTag::Informative)
                    .calculator(Calculator::fixed(0)),
            )?,
        })
    }

    pub fn collision_kind(&self) -> EdgeKind {
        self.collision
    }

    /// Rewrite local-prefix SIDs of a local collection batch under the
    /// machine's global SID.
    ///
    /// The machine object is the one carrying both `localMachineSID` and
    /// `objectSid`. Snapshots, batches without a machine, and batches
    /// already remapped (the machine has `localMachineSIDOriginal`) are
    /// left alone.
    #[tracing::instrument(skip(self, batch), fields(source = %batch.source))]
    pub fn remap_batch(&self, batch: &mut CollectedBatch) -> RemapStats {
        let mut stats = RemapStats::default();
        if batch.kind == BatchKind::Snapshot {
            return stats;
        }

        let machines: Vec<usize> = batch
            .objects
            .iter()
            .enumerate()
            .filter(|(_, o)| o.attributes.contains_key(defaults::LOCAL_MACHINE_SID))
            .map(|(i, _)| i)
            .collect();
        let Some(&machine_idx) = machines.first() else {
            return stats;
        };
        if machines.len() > 1 {
            tracing::warn!(count = machines.len(), "several machine objects in one batch, using the first");
        }

        let machine = &batch.objects[machine_idx];
        if machine.attributes.contains_key(defaults::LOCAL_MACHINE_SID_ORIGINAL) {
            tracing::debug!("batch already remapped");
            return stats;
        }
        let (Some(original), Some(global)) = (
            machine.sid(defaults::LOCAL_MACHINE_SID),
            machine.sid(defaults::OBJECT_SID),
        ) else {
            tracing::debug!("machine has no global SID, keeping local identifiers");
            return stats;
        };
        if original == global {
            return stats;
        }

        for object in &mut batch.objects {
            stats.values_remapped += remap_object(object, &original, &global);
        }

        let machine = &mut batch.objects[machine_idx];
        machine.attributes.insert(
            defaults::LOCAL_MACHINE_SID_ORIGINAL.to_string(),
            RawValues::One(AttributeValue::Sid(original.clone())),
        );
        machine.attributes.insert(
            defaults::LOCAL_MACHINE_SID.to_string(),
            RawValues::One(AttributeValue::Sid(global.clone())),
        );

        for object in &mut batch.objects {
            for edge in &mut object.edges {
                if let Ok(sid) = edge.target.parse::<Sid>() {
                    let mapped = remap_sid(&original, &global, &sid);
                    if mapped != sid {
                        edge.target = mapped.to_string();
                        stats.edges_remapped += 1;
                    }
                }
            }
        }

        tracing::info!(
            local = %original,
            global = %global,
            values = stats.values_remapped,
            edges = stats.edges_remapped,
            "local identifiers remapped"
        );
        stats.machine = Some(global);
        stats
    }

    /// Link machines that share a local SID prefix but are otherwise
    /// unrelated. Returns the colliding pairs found (lower id first).
    #[tracing::instrument(skip(self, objects), fields(objects = objects.len()))]
    pub fn detect_collisions(&self, objects: &mut Objects) -> Vec<(ObjectId, ObjectId)> {
        let mut by_local: HashMap<Sid, Vec<ObjectId>> = HashMap::new();
        for obj in objects.with_attribute(self.local_machine_sid) {
            let local = obj
                .sid(self.local_machine_sid_original)
                .or_else(|| obj.sid(self.local_machine_sid));
            if let Some(local) = local {
                by_local.entry(local.clone()).or_default().push(obj.id());
            }
        }

        let mut pairs = Vec::new();
        for machines in by_local.values().filter(|m| m.len() > 1) {
            for (i, a) in machines.iter().enumerate() {
                for b in &machines[i + 1..] {
                    let linked = match (objects.sid_of(*a), objects.sid_of(*b)) {
                        (Some(sa), Some(sb)) => related(sa, sb),
                        _ => false,
                    };
                    if !linked {
                        pairs.push((*a, *b));
                    }
                }
            }
        }
        pairs.sort();

        for (a, b) in &pairs {
            // Both ids come from the container itself.
            let _ = objects.add_edge(*a, *b, self.collision);
            let _ = objects.add_edge(*b, *a, self.collision);
            tracing::warn!(
                a = %objects.display_name(*a),
                b = %objects.display_name(*b),
                "machines share a local SID"
            );
        }
        pairs
    }
}

/// Remap every SID value of one object. Returns how many changed.
fn remap_object(object: &mut CollectedObject, original: &Sid, global: &Sid) -> usize {
    let mut changed = 0;
    for (name, raw) in object.attributes.iter_mut() {
        if name == defaults::LOCAL_MACHINE_SID {
            continue;
        }
        let values = raw.clone().into_values();
        let mapped: AttributeValues = values
            .iter()
            .map(|v| match v {
                AttributeValue::Sid(sid) => {
                    let m = remap_sid(original, global, sid);
                    if m != *sid {
                        changed += 1;
                    }
                    AttributeValue::Sid(m)
                }
                AttributeValue::String(text) if name == defaults::OBJECT_SID => match text.parse::<Sid>() {
                    Ok(sid) => {
                        let m = remap_sid(original, global, &sid);
                        if m != sid {
                            changed += 1;
                        }
                        AttributeValue::Sid(m)
                    }
                    Err(_) => v.clone(),
                },
                other => other.clone(),
            })
            .collect();
        if mapped != values {
            *raw = RawValues::from(&mapped);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> Sid {
        s.parse().unwrap()
    }

    #[test]
    fn test_remap_matches_one_longer_prefix() {
        let p = sid("S-1-5-21-100-200-300");
        let q = sid("S-1-5-21-900-800-700-1105");
        assert_eq!(remap_sid(&p, &q, &sid("S-1-5-21-100-200-300-500")), sid("S-1-5-21-900-800-700-1105-500"));
    }

    #[test]
    fn test_remap_leaves_non_matches() {
        let p = sid("S-1-5-21-100-200-300");
        let q = sid("S-1-5-21-900");
        for untouched in [
            "S-1-5-21-101-200-300-500",
            "S-1-5-21-100-200-300",
            "S-1-5-21-100-200-300-500-1",
            "S-1-5-32-544",
        ] {
            assert_eq!(remap_sid(&p, &q, &sid(untouched)), sid(untouched));
        }
    }

    #[test]
    fn test_related() {
        assert!(related(&sid("S-1-5-21-1"), &sid("S-1-5-21-1-5")));
        assert!(related(&sid("S-1-5-21-1-5"), &sid("S-1-5-21-1-5")));
        assert!(!related(&sid("S-1-5-21-1-5"), &sid("S-1-5-21-2-5")));
    }
}
