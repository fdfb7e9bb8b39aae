//! Serializable renderings for the presentation layer: names instead of
//! handles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{PathOutcome, Selector};
use crate::model::{AttackPath, AttributeValues, Direction, EdgeBitmap, MergeNote, ObjectId};
use crate::objects::Objects;
use crate::registry::EdgeCatalog;

/// Enough to label an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub id: ObjectId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

impl ObjectSummary {
    pub fn of(objects: &Objects, id: ObjectId) -> Self {
        Self {
            id,
            name: objects.display_name(id),
            sid: objects.sid_of(id).map(|s| s.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopReport {
    pub object: ObjectSummary,
    pub kinds: Vec<String>,
    /// Percent, 0..=100.
    pub probability: u8,
}

/// One path as `(object, kinds, probability-to-next)` triples plus the
/// target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathReport {
    pub score: u8,
    pub hops: Vec<HopReport>,
    pub target: ObjectSummary,
}

impl PathReport {
    pub fn render(path: &AttackPath, objects: &Objects, catalog: &EdgeCatalog) -> Self {
        Self {
            score: path.score.value(),
            hops: path
                .hops
                .iter()
                .map(|h| HopReport {
                    object: ObjectSummary::of(objects, h.object),
                    kinds: catalog.names(h.kinds),
                    probability: h.probability.value(),
                })
                .collect(),
            target: ObjectSummary::of(objects, path.target),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeReport {
    pub other: ObjectSummary,
    pub kinds: Vec<String>,
}

impl EdgeReport {
    fn render(objects: &Objects, catalog: &EdgeCatalog, other: ObjectId, kinds: EdgeBitmap) -> Self {
        Self { other: ObjectSummary::of(objects, other), kinds: catalog.names(kinds) }
    }
}

/// Everything known about one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectReport {
    pub object: ObjectSummary,
    pub attributes: BTreeMap<String, AttributeValues>,
    pub outbound: Vec<EdgeReport>,
    pub inbound: Vec<EdgeReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<MergeNote>,
}

impl ObjectReport {
    pub fn render(objects: &Objects, catalog: &EdgeCatalog, id: ObjectId) -> Option<Self> {
        let obj = objects.get(id)?;
        let edges = |dir: Direction| -> Vec<EdgeReport> {
            obj.edges(dir, EdgeBitmap::EMPTY)
                .map(|(other, kinds)| EdgeReport::render(objects, catalog, other, kinds))
                .collect()
        };
        Some(Self {
            object: ObjectSummary::of(objects, id),
            attributes: obj
                .attributes()
                .map(|(attr, values)| (objects.registry().attributes.name(attr).to_string(), values.clone()))
                .collect(),
            outbound: edges(Direction::Outgoing),
            inbound: edges(Direction::Incoming),
            notes: obj.notes().to_vec(),
        })
    }
}

impl PathOutcome {
    /// Paths rendered with names, best first.
    pub fn reports(&self, objects: &Objects, catalog: &EdgeCatalog) -> Vec<PathReport> {
        self.paths.iter().map(|p| PathReport::render(p, objects, catalog)).collect()
    }
}

/// Lookup by identifier or attribute.
pub fn lookup(objects: &Objects, catalog: &EdgeCatalog, selector: &Selector) -> Vec<ObjectReport> {
    selector
        .resolve(objects)
        .into_iter()
        .filter_map(|id| ObjectReport::render(objects, catalog, id))
        .collect()
}
