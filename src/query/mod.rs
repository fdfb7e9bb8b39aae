//! # Queries
//!
//! What the presentation layer asks: object lookup, attack paths and the
//! edge-kind catalog. Queries run against one immutable [`Objects`]
//! generation, so any number may run at once.
//!
//! Query-time problems (an unknown identifier, a filter that leaves nothing
//! traversable) come back as an empty [`PathOutcome`] with an
//! [`EmptyReason`]. Only bad bounds are errors.

mod paths;
mod report;
mod select;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::model::{AttackPath, EdgeBitmap, ObjectId};
use crate::{Error, Result};

pub use paths::find_paths;
pub use report::{lookup, EdgeReport, HopReport, ObjectReport, ObjectSummary, PathReport};
pub use select::{resolve_all, Selector};

// ============================================================================
// Request
// ============================================================================

/// A path query.
///
/// Unset bounds fall back to the [`EngineConfig`] defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathRequest {
    pub start: Vec<Selector>,
    pub target: Vec<Selector>,
    /// Traversable kinds by name. Empty means every kind.
    pub edge_kinds: Vec<String>,
    /// Traversable kinds as a mask; takes precedence over `edge_kinds`.
    /// `EdgeBitmap::EMPTY` means every kind.
    pub edge_mask: Option<EdgeBitmap>,
    pub max_depth: Option<usize>,
    pub max_paths: Option<usize>,
    pub min_probability: Option<u8>,
    pub deadline_ms: Option<u64>,
    /// Also report informative edges between objects on the returned paths.
    pub include_informative: bool,
}

impl PathRequest {
    pub fn new(start: Selector, target: Selector) -> Self {
        Self { start: vec![start], target: vec![target], ..Default::default() }
    }

    pub fn edges<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.edge_kinds = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn mask(mut self, mask: EdgeBitmap) -> Self {
        self.edge_mask = Some(mask);
        self
    }

    pub fn depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn limit(mut self, max_paths: usize) -> Self {
        self.max_paths = Some(max_paths);
        self
    }

    pub fn min_probability(mut self, percent: u8) -> Self {
        self.min_probability = Some(percent);
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(deadline.as_millis().min(u64::MAX as u128) as u64);
        self
    }

    pub fn with_informative(mut self) -> Self {
        self.include_informative = true;
        self
    }

    /// Effective bounds: request values over config defaults.
    pub fn bounds(&self, config: &EngineConfig) -> Result<Bounds> {
        if self.start.is_empty() {
            return Err(Error::Config("path query needs at least one start selector".into()));
        }
        if self.target.is_empty() {
            return Err(Error::Config("path query needs at least one target selector".into()));
        }
        let bounds = Bounds {
            max_depth: self.max_depth.unwrap_or(config.max_depth),
            max_paths: self.max_paths.unwrap_or(config.max_paths),
            min_probability: self.min_probability.unwrap_or(config.min_probability).min(100),
            budget: config.exploration_budget,
            deadline: self.deadline_ms.or(config.deadline_ms).map(Duration::from_millis),
        };
        if bounds.max_depth == 0 {
            return Err(Error::Config("max_depth must be at least 1".into()));
        }
        if bounds.max_paths == 0 {
            return Err(Error::Config("max_paths must be at least 1".into()));
        }
        if bounds.budget == 0 {
            return Err(Error::Config("exploration_budget must be at least 1".into()));
        }
        Ok(bounds)
    }
}

/// Resolved limits of one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub max_depth: usize,
    pub max_paths: usize,
    pub min_probability: u8,
    pub budget: usize,
    pub deadline: Option<Duration>,
}

// ============================================================================
// Outcome
// ============================================================================

/// Why a path query returned nothing without trying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EmptyReason {
    UnknownStart,
    UnknownTarget,
    UnknownEdgeKind { name: String },
    NoTraversableEdges,
}

/// Why a path query stopped before exploring everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    Deadline,
    Budget,
}

/// Informative edge between two objects of the returned paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InformativeEdge {
    pub source: ObjectId,
    pub target: ObjectId,
    pub kinds: EdgeBitmap,
}

/// Ranked paths plus diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathOutcome {
    /// Best first: score descending, then fewer hops, then discovery order.
    pub paths: Vec<AttackPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_reason: Option<EmptyReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<Truncation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub informative_edges: Vec<InformativeEdge>,
    /// Partial paths created while searching.
    pub explored: usize,
}

impl PathOutcome {
    pub fn empty(reason: EmptyReason) -> Self {
        Self { empty_reason: Some(reason), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
