//! Attribute values.
//!
//! Attributes are typed at the value level, not at the handle level: the
//! same attribute may hold strings on one object and SIDs on another.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::Sid;

/// A single attribute value.
///
/// No floats: every value is `Eq + Hash + Ord`, which is what lets any
/// attribute serve as a unique index key and lets multi-valued
/// attributes be kept as sorted sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum AttributeValue {
    String(String),
    Bytes(Vec<u8>),
    Bool(bool),
    Int(i64),
    Timestamp(DateTime<Utc>),
    Sid(Sid),
}

impl AttributeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::String(_) => "STRING",
            AttributeValue::Bytes(_) => "BYTES",
            AttributeValue::Bool(_) => "BOOLEAN",
            AttributeValue::Int(_) => "INTEGER",
            AttributeValue::Timestamp(_) => "TIMESTAMP",
            AttributeValue::Sid(_) => "SID",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_sid(&self) -> Option<&Sid> {
        match self {
            AttributeValue::Sid(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            AttributeValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<bool> for AttributeValue { fn from(v: bool) -> Self { AttributeValue::Bool(v) } }
impl From<i32> for AttributeValue { fn from(v: i32) -> Self { AttributeValue::Int(v as i64) } }
impl From<i64> for AttributeValue { fn from(v: i64) -> Self { AttributeValue::Int(v) } }
impl From<String> for AttributeValue { fn from(v: String) -> Self { AttributeValue::String(v) } }
impl From<&str> for AttributeValue { fn from(v: &str) -> Self { AttributeValue::String(v.to_owned()) } }
impl From<Vec<u8>> for AttributeValue { fn from(v: Vec<u8>) -> Self { AttributeValue::Bytes(v) } }
impl From<Sid> for AttributeValue { fn from(v: Sid) -> Self { AttributeValue::Sid(v) } }
impl From<DateTime<Utc>> for AttributeValue {
    fn from(v: DateTime<Utc>) -> Self { AttributeValue::Timestamp(v) }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{s}"),
            AttributeValue::Bytes(b) => write!(f, "<bytes[{}]>", b.len()),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Int(i) => write!(f, "{i}"),
            AttributeValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            AttributeValue::Sid(s) => write!(f, "{s}"),
        }
    }
}

// ============================================================================
// One-or-many values
// ============================================================================

/// The values an object holds for one attribute.
///
/// Kept sorted and de-duplicated so that merging two value sets is a plain
/// set union, independent of the order the sources arrived in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeValues(SmallVec<[AttributeValue; 1]>);

impl AttributeValues {
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    pub fn single(value: impl Into<AttributeValue>) -> Self {
        let mut sv = SmallVec::new();
        sv.push(value.into());
        Self(sv)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&AttributeValue> {
        self.0.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AttributeValue> {
        self.0.iter()
    }

    pub fn contains(&self, value: &AttributeValue) -> bool {
        self.0.binary_search(value).is_ok()
    }

    /// Insert keeping the set sorted. Returns false if already present.
    pub fn insert(&mut self, value: AttributeValue) -> bool {
        match self.0.binary_search(&value) {
            Ok(_) => false,
            Err(pos) => {
                self.0.insert(pos, value);
                true
            }
        }
    }

    /// Set union.
    pub fn union(&mut self, other: &AttributeValues) {
        for v in other.iter() {
            self.insert(v.clone());
        }
    }
}

impl FromIterator<AttributeValue> for AttributeValues {
    fn from_iter<I: IntoIterator<Item = AttributeValue>>(iter: I) -> Self {
        let mut out = AttributeValues::new();
        for v in iter {
            out.insert(v);
        }
        out
    }
}

impl<'a> IntoIterator for &'a AttributeValues {
    type Item = &'a AttributeValue;
    type IntoIter = std::slice::Iter<'a, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for AttributeValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{single}"),
            many => {
                write!(f, "[")?;
                for (i, v) in many.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}
