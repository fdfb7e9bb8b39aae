//! Edge-kind registry and catalog.
//!
//! Registration mirrors how edge kinds are declared:
//!
//! ```rust
//! use secgraph::registry::{EdgeKindSpec, EdgeRegistry, EdgeTag};
//! use secgraph::probability::Calculator;
//!
//! let edges = EdgeRegistry::default();
//! let rdp = edges
//!     .register(
//!         EdgeKindSpec::new("RDPRights")
//!             .calculator(Calculator::fixed(30))
//!             .tag(EdgeTag::Granted)
//!             .tag(EdgeTag::Pivot),
//!     )
//!     .unwrap();
//! assert_eq!(edges.lookup("RDPRights"), Some(rdp));
//! ```

use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{EdgeKind, SymbolTable};
use crate::model::{EdgeBitmap, MAX_EDGE_KINDS};
use crate::probability::{Calculator, Probability};
use crate::Result;

/// Classification of an edge kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeTag {
    /// Explicit rights grant.
    Granted,
    /// Usable for lateral movement without an explicit grant.
    Pivot,
    /// Display/filtering only; never contributes to a path score.
    Informative,
    /// Source influences the target's configuration.
    Affects,
}

/// Metadata attached to an interned edge kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeKindDescriptor {
    pub description: Option<String>,
    pub tags: SmallVec<[EdgeTag; 2]>,
    pub calculator: Option<Calculator>,
}

impl EdgeKindDescriptor {
    pub fn has_tag(&self, tag: EdgeTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn is_informative(&self) -> bool {
        self.has_tag(EdgeTag::Informative)
    }
}

/// Builder for a registration.
#[derive(Debug, Clone)]
pub struct EdgeKindSpec {
    name: String,
    descriptor: EdgeKindDescriptor,
}

impl EdgeKindSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), descriptor: EdgeKindDescriptor::default() }
    }

    pub fn tag(mut self, tag: EdgeTag) -> Self {
        if !self.descriptor.tags.contains(&tag) {
            self.descriptor.tags.push(tag);
            self.descriptor.tags.sort();
        }
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = Some(description.into());
        self
    }

    pub fn calculator(mut self, calculator: Calculator) -> Self {
        self.descriptor.calculator = Some(calculator);
        self
    }
}

// ============================================================================
// EdgeRegistry
// ============================================================================

/// Interns edge-kind names. At most [`MAX_EDGE_KINDS`] kinds.
#[derive(Debug)]
pub struct EdgeRegistry {
    table: SymbolTable<EdgeKindDescriptor>,
}

impl Default for EdgeRegistry {
    fn default() -> Self {
        Self { table: SymbolTable::new("edge kind", MAX_EDGE_KINDS) }
    }
}

impl EdgeRegistry {
    /// Register with metadata. Re-registering the same name with the same
    /// metadata returns the same handle; different metadata is a
    /// configuration error.
    pub fn register(&self, spec: EdgeKindSpec) -> Result<EdgeKind> {
        self.table
            .intern(&spec.name, Some(spec.descriptor), EdgeKindDescriptor::default)
            .map(EdgeKind::from_index)
    }

    /// Resolve or register a bare name (no tags, no calculator if new).
    pub fn register_name(&self, name: &str) -> Result<EdgeKind> {
        self.table
            .intern(name, None, EdgeKindDescriptor::default)
            .map(EdgeKind::from_index)
    }

    pub fn lookup(&self, name: &str) -> Option<EdgeKind> {
        self.table.lookup(name).map(EdgeKind::from_index)
    }

    pub fn name(&self, kind: EdgeKind) -> Option<Arc<str>> {
        self.table.name(kind.index())
    }

    pub fn descriptor(&self, kind: EdgeKind) -> Option<Arc<EdgeKindDescriptor>> {
        self.table.meta(kind.index())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Freeze the current registrations into a lock-free catalog.
    pub fn catalog(&self) -> EdgeCatalog {
        EdgeCatalog::new(self.table.snapshot())
    }
}

// ============================================================================
// EdgeCatalog (frozen, lock-free)
// ============================================================================

/// Immutable snapshot of the edge registry, used on query paths.
#[derive(Debug, Clone, Default)]
pub struct EdgeCatalog {
    entries: Vec<(Arc<str>, Arc<EdgeKindDescriptor>)>,
    by_name: HashMap<Arc<str>, EdgeKind>,
    informative: EdgeBitmap,
}

/// Catalog entry as seen by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeKindInfo {
    pub index: usize,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<EdgeTag>,
    pub calculator: Option<String>,
    /// Probability when it does not depend on the endpoints.
    pub fixed_probability: Option<Probability>,
}

impl EdgeCatalog {
    fn new(entries: Vec<(Arc<str>, Arc<EdgeKindDescriptor>)>) -> Self {
        let by_name = entries
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), EdgeKind::from_index(i)))
            .collect();
        let informative = entries
            .iter()
            .enumerate()
            .filter(|(_, (_, d))| d.is_informative())
            .map(|(i, _)| EdgeKind::from_index(i))
            .collect();
        Self { entries, by_name, informative }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn descriptor(&self, kind: EdgeKind) -> Option<&EdgeKindDescriptor> {
        self.entries.get(kind.index()).map(|(_, d)| d.as_ref())
    }

    pub fn name(&self, kind: EdgeKind) -> &str {
        self.entries.get(kind.index()).map(|(n, _)| n.as_ref()).unwrap_or("?")
    }

    pub fn lookup(&self, name: &str) -> Option<EdgeKind> {
        self.by_name.get(name).copied()
    }

    /// Mask of the named kinds. Returns the first unknown name on failure.
    pub fn mask_of<S: AsRef<str>>(&self, names: &[S]) -> std::result::Result<EdgeBitmap, String> {
        names
            .iter()
            .map(|n| self.lookup(n.as_ref()).ok_or_else(|| n.as_ref().to_string()))
            .collect()
    }

    /// Every registered kind.
    pub fn all_mask(&self) -> EdgeBitmap {
        (0..self.entries.len()).map(EdgeKind::from_index).collect()
    }

    pub fn tagged(&self, tag: EdgeTag) -> EdgeBitmap {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, (_, d))| d.has_tag(tag))
            .map(|(i, _)| EdgeKind::from_index(i))
            .collect()
    }

    pub fn informative_mask(&self) -> EdgeBitmap {
        self.informative
    }

    /// Names of the kinds in a mask, in handle order.
    pub fn names(&self, kinds: EdgeBitmap) -> Vec<String> {
        kinds.iter().map(|k| self.name(k).to_string()).collect()
    }

    /// Full catalog for building filter controls.
    pub fn entries(&self) -> Vec<EdgeKindInfo> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, (name, d))| EdgeKindInfo {
                index,
                name: name.to_string(),
                description: d.description.clone(),
                tags: d.tags.to_vec(),
                calculator: d.calculator.as_ref().map(Calculator::describe),
                fixed_probability: match &d.calculator {
                    None if d.is_informative() => Some(Probability::ZERO),
                    None => Some(Probability::MAX),
                    Some(Calculator::Fixed(p)) => Some(*p),
                    Some(Calculator::Plugin { .. }) => None,
                },
            })
            .collect()
    }
}
