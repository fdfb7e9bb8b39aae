//! Edge-kind bitmask.
//!
//! Adjacency between an ordered pair of objects is one `EdgeBitmap`: bit
//! `i` set means edge kind `i` is present. Three relationship kinds
//! between the same pair cost one bit pattern, not three adjacency
//! entries.
//!
//! The width is fixed at [`MAX_EDGE_KINDS`] bits. That is a hard ceiling
//! on the number of distinct edge kinds a registry can hold; it does not
//! limit the number of objects or edges.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registry::EdgeKind;

const WORDS: usize = 2;

/// Maximum number of distinct edge kinds (bits in an [`EdgeBitmap`]).
pub const MAX_EDGE_KINDS: usize = WORDS * 64;

/// Fixed-width set of edge kinds.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeBitmap([u64; WORDS]);

impl EdgeBitmap {
    /// No kinds.
    pub const EMPTY: EdgeBitmap = EdgeBitmap([0; WORDS]);

    /// Every representable kind. Used as the "0 = all kinds" filter.
    pub const ALL: EdgeBitmap = EdgeBitmap([u64::MAX; WORDS]);

    pub fn single(kind: EdgeKind) -> Self {
        let mut out = Self::EMPTY;
        out.set(kind);
        out
    }

    pub fn set(&mut self, kind: EdgeKind) {
        let i = kind.index();
        self.0[i / 64] |= 1u64 << (i % 64);
    }

    pub fn clear(&mut self, kind: EdgeKind) {
        let i = kind.index();
        self.0[i / 64] &= !(1u64 << (i % 64));
    }

    pub fn with(mut self, kind: EdgeKind) -> Self {
        self.set(kind);
        self
    }

    pub fn contains(&self, kind: EdgeKind) -> bool {
        let i = kind.index();
        self.0[i / 64] & (1u64 << (i % 64)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    pub fn count(&self) -> u32 {
        self.0.iter().map(|w| w.count_ones()).sum()
    }

    pub fn union(&self, other: &EdgeBitmap) -> EdgeBitmap {
        let mut out = *self;
        for (o, w) in out.0.iter_mut().zip(other.0.iter()) {
            *o |= *w;
        }
        out
    }

    pub fn intersect(&self, other: &EdgeBitmap) -> EdgeBitmap {
        let mut out = *self;
        for (o, w) in out.0.iter_mut().zip(other.0.iter()) {
            *o &= *w;
        }
        out
    }

    pub fn difference(&self, other: &EdgeBitmap) -> EdgeBitmap {
        let mut out = *self;
        for (o, w) in out.0.iter_mut().zip(other.0.iter()) {
            *o &= !*w;
        }
        out
    }

    /// Normalize a caller filter: an empty mask means "all kinds".
    pub fn or_all(self) -> EdgeBitmap {
        if self.is_empty() { Self::ALL } else { self }
    }

    /// Kinds present, in ascending handle order.
    pub fn iter(&self) -> impl Iterator<Item = EdgeKind> + '_ {
        self.0.iter().enumerate().flat_map(|(word_idx, word)| {
            let mut w = *word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros() as usize;
                w &= w - 1;
                Some(EdgeKind::from_index(word_idx * 64 + bit))
            })
        })
    }
}

impl FromIterator<EdgeKind> for EdgeBitmap {
    fn from_iter<I: IntoIterator<Item = EdgeKind>>(iter: I) -> Self {
        let mut out = EdgeBitmap::EMPTY;
        for kind in iter {
            out.set(kind);
        }
        out
    }
}

impl fmt::Debug for EdgeBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|k| k.index())).finish()
    }
}
