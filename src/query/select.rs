//! Selectors: how callers name object sets.

use serde::{Deserialize, Serialize};

use crate::model::{AttributeValue, ObjectId, Sid};
use crate::objects::Objects;

/// One way of naming objects.
///
/// ```json
/// {"by": "sid", "sid": "S-1-5-21-1-2-3-512"}
/// {"by": "attribute", "name": "objectType", "value": {"type": "String", "value": "Machine"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Selector {
    Id { id: ObjectId },
    Sid { sid: Sid },
    /// SID text or distinguished name, as collectors write edge targets.
    Identifier { value: String },
    Attribute { name: String, value: AttributeValue },
    All,
}

impl Selector {
    pub fn id(id: ObjectId) -> Self {
        Selector::Id { id }
    }

    pub fn sid(sid: Sid) -> Self {
        Selector::Sid { sid }
    }

    pub fn identifier(value: impl Into<String>) -> Self {
        Selector::Identifier { value: value.into() }
    }

    pub fn attribute(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Selector::Attribute { name: name.into(), value: value.into() }
    }

    /// Objects this selector names. Unknown ids, identifiers and attribute
    /// names select nothing.
    pub fn resolve(&self, objects: &Objects) -> Vec<ObjectId> {
        match self {
            Selector::Id { id } => objects.get(*id).map(|o| o.id()).into_iter().collect(),
            Selector::Sid { sid } => objects.find_sid(sid).into_iter().collect(),
            Selector::Identifier { value } => objects.resolve_identifier(value.trim()).into_iter().collect(),
            Selector::Attribute { name, value } => {
                let Some(attr) = objects.registry().attributes.lookup(name) else {
                    return Vec::new();
                };
                let mut found = objects.find_all(attr, value);
                // SIDs are stored typed; accept their text form too.
                if let AttributeValue::String(text) = value
                    && let Ok(sid) = text.parse::<Sid>()
                {
                    found.extend(objects.find_all(attr, &AttributeValue::Sid(sid)));
                }
                found
            }
            Selector::All => objects.iter().map(|o| o.id()).collect(),
        }
    }
}

/// Union of several selectors, deduplicated, in id order.
pub fn resolve_all(selectors: &[Selector], objects: &Objects) -> Vec<ObjectId> {
    let mut ids: Vec<ObjectId> = selectors.iter().flat_map(|s| s.resolve(objects)).collect();
    ids.sort();
    ids.dedup();
    ids
}
