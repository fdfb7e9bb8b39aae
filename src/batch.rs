//! Collected-object batch format.
//!
//! The one durable artifact: what collectors hand over and what
//! [`export_snapshot`](crate::export::export_snapshot) writes back.
//!
//! ```json
//! {
//!   "source": "localmachine:WS01",
//!   "objects": [
//!     {
//!       "attributes": {
//!         "objectSid": {"type": "Sid", "value": "S-1-5-21-1-2-3-500"},
//!         "name": {"type": "String", "value": "Administrator"}
//!       },
//!       "edges": [
//!         {"kind": "AdminRights", "target": "S-1-5-21-9-9-9-1105"}
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Snapshots carry `"kind": "snapshot"`; collector batches omit it.
//!
//! Unknown fields are ignored and unknown attribute/edge names are
//! registered when first imported, so collectors can add vocabulary
//! without breaking older readers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{AttributeValue, AttributeValues, Direction, Sid};
use crate::Result;

/// Where a batch came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    /// A collector run; local-machine batches get their SIDs remapped.
    #[default]
    Collected,
    /// A whole graph written by [`snapshot`](crate::export::snapshot).
    /// Imported as is, never remapped.
    Snapshot,
}

impl BatchKind {
    fn is_collected(&self) -> bool {
        *self == BatchKind::Collected
    }
}

/// One collection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedBatch {
    /// Free-form provenance label recorded in merge notes.
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "BatchKind::is_collected")]
    pub kind: BatchKind,
    #[serde(default)]
    pub objects: Vec<CollectedObject>,
}

impl CollectedBatch {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), kind: BatchKind::Collected, objects: Vec::new() }
    }

    pub fn with_object(mut self, object: CollectedObject) -> Self {
        self.objects.push(object);
        self
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One value or a list of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValues {
    One(AttributeValue),
    Many(Vec<AttributeValue>),
}

impl RawValues {
    pub fn into_values(self) -> AttributeValues {
        match self {
            RawValues::One(v) => AttributeValues::single(v),
            RawValues::Many(vs) => vs.into_iter().collect(),
        }
    }
}

impl From<&AttributeValues> for RawValues {
    fn from(values: &AttributeValues) -> Self {
        match (values.len(), values.first()) {
            (1, Some(v)) => RawValues::One(v.clone()),
            _ => RawValues::Many(values.iter().cloned().collect()),
        }
    }
}

/// A relationship as collected: kind name plus target identifier (SID text
/// or distinguished name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedEdge {
    pub kind: String,
    pub target: String,
    #[serde(default = "default_direction")]
    pub direction: Direction,
}

fn default_direction() -> Direction {
    Direction::Outgoing
}

/// One object as collected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedObject {
    #[serde(default)]
    pub attributes: BTreeMap<String, RawValues>,
    #[serde(default)]
    pub edges: Vec<CollectedEdge>,
}

impl CollectedObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single value (replacing whatever was set under that name).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), RawValues::One(value.into()));
        self
    }

    pub fn with_many(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<AttributeValue>>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.attributes.insert(name.into(), RawValues::Many(values));
        self
    }

    pub fn with_sid(self, sid: Sid) -> Self {
        self.with(crate::registry::defaults::OBJECT_SID, sid)
    }

    /// Outgoing edge to `target`.
    pub fn edge(mut self, kind: impl Into<String>, target: impl ToString) -> Self {
        self.edges.push(CollectedEdge {
            kind: kind.into(),
            target: target.to_string(),
            direction: Direction::Outgoing,
        });
        self
    }

    /// Incoming edge from `source`.
    pub fn edge_from(mut self, kind: impl Into<String>, source: impl ToString) -> Self {
        self.edges.push(CollectedEdge {
            kind: kind.into(),
            target: source.to_string(),
            direction: Direction::Incoming,
        });
        self
    }

    /// First value under `name`.
    pub fn first(&self, name: &str) -> Option<&AttributeValue> {
        match self.attributes.get(name)? {
            RawValues::One(v) => Some(v),
            RawValues::Many(vs) => vs.first(),
        }
    }

    pub fn sid(&self, name: &str) -> Option<Sid> {
        match self.first(name)? {
            AttributeValue::Sid(s) => Some(s.clone()),
            AttributeValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}
