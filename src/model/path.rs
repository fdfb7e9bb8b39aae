//! Attack path: objects joined by scored hops.

use serde::{Deserialize, Serialize};

use super::{EdgeBitmap, ObjectId};
use crate::probability::Probability;

/// One hop: `object` reaches the next object on the path through `kinds`,
/// with `probability` being the best non-informative kind's probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathHop {
    pub object: ObjectId,
    pub kinds: EdgeBitmap,
    pub probability: Probability,
}

/// A path: `start -[kinds, p]-> ... -> target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackPath {
    /// Hops in order. Always non-empty for a returned path.
    pub hops: Vec<PathHop>,
    /// The object the last hop leads to.
    pub target: ObjectId,
    /// Minimum hop probability (weakest link).
    pub score: Probability,
}

impl AttackPath {
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn start(&self) -> ObjectId {
        self.hops.first().map(|h| h.object).unwrap_or(self.target)
    }

    /// Every object on the path, start to target.
    pub fn objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.hops.iter().map(|h| h.object).chain(std::iter::once(self.target))
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects().any(|o| o == id)
    }
}
