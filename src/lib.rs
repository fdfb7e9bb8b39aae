//! # secgraph: Security Relationship Graph Engine
//!
//! Models who can take over what in a directory/network environment as a
//! typed, attributed graph and ranks the attack paths through it.
//!
//! ## Design Principles
//!
//! 1. **Interned vocabulary**: attribute and edge-kind names become small
//!    handles in a [`Registry`] owned by the engine, not a global
//! 2. **Bitmask adjacency**: every kind between one ordered pair costs one
//!    bit of an [`EdgeBitmap`]
//! 3. **Non-recursive probabilities**: calculators see a read-only
//!    [`GraphView`], never the dispatcher
//! 4. **Immutable generations**: queries run on an `Arc<Objects>`; imports
//!    build the next generation and swap it in
//!
//! ## Quick Start
//!
//! ```rust
//! use secgraph::{CollectedBatch, CollectedObject, Engine, EngineConfig, PathRequest, Selector};
//!
//! # fn main() -> secgraph::Result<()> {
//! let engine = Engine::new(EngineConfig::default())?;
//!
//! let batch = CollectedBatch::new("directory")
//!     .with_object(
//!         CollectedObject::new()
//!             .with("distinguishedName", "CN=Alice")
//!             .edge("AdminRights", "CN=WS01"),
//!     )
//!     .with_object(
//!         CollectedObject::new()
//!             .with("distinguishedName", "CN=WS01")
//!             .edge("SessionLastDay", "CN=DomainAdmin"),
//!     );
//! engine.import_batch(batch)?;
//!
//! let outcome = engine.find_paths(&PathRequest::new(
//!     Selector::identifier("CN=Alice"),
//!     Selector::identifier("CN=DomainAdmin"),
//! ))?;
//! assert_eq!(outcome.paths[0].score.value(), 80);
//! # Ok(())
//! # }
//! ```
//!
//! ## Batch Sources
//!
//! | Source | Feature | Description |
//! |--------|---------|-------------|
//! | Memory | (default) | Queued batches for testing/embedding |
//! | JSON directory | `fs` | One collected batch per `*.json` file |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod registry;
pub mod index;
pub mod objects;
pub mod probability;
pub mod batch;
pub mod reconcile;
pub mod query;
pub mod source;
pub mod config;
pub mod export;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

// ============================================================================
// Re-exports
// ============================================================================

pub use model::{
    AttackPath, AttributeValue, AttributeValues, Direction, EdgeBitmap, MergeNote,
    Object, ObjectId, PathHop, Sid, MAX_EDGE_KINDS,
};
pub use registry::{
    Attribute, Cardinality, EdgeCatalog, EdgeKind, EdgeKindInfo, EdgeKindSpec, EdgeTag, Registry,
};
pub use objects::{Folded, ImportStats, Objects};
pub use probability::{Calculator, GraphView, Probability, ProbabilityCalculator};
pub use batch::{BatchKind, CollectedBatch, CollectedEdge, CollectedObject};
pub use reconcile::{remap_sid, Reconciler};
pub use query::{
    EmptyReason, ObjectReport, PathOutcome, PathReport, PathRequest, Selector, Truncation,
};
pub use source::{BatchSource, MemorySource};
pub use config::EngineConfig;

// ============================================================================
// Top-level Engine handle
// ============================================================================

/// What one ingestion did, summed over its batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub batches: usize,
    pub import: ImportStats,
    /// SID values and edge targets rewritten from local to global prefixes.
    pub remapped: usize,
    /// Machine pairs linked by `SIDCollision` in this generation.
    pub collisions: Vec<(ObjectId, ObjectId)>,
}

/// The primary entry point: registry, configuration and the current graph
/// generation.
///
/// Readers take the current `Arc<Objects>` and never block writers or each
/// other. Writers are serialized; each builds the next generation from a
/// copy of the current one and publishes it in one swap.
pub struct Engine {
    registry: Arc<Registry>,
    config: EngineConfig,
    unique: Vec<Attribute>,
    reconciler: Reconciler,
    current: RwLock<Arc<Objects>>,
    writer: Mutex<()>,
}

impl Engine {
    /// Engine with the default vocabulary.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_registry(Arc::new(Registry::with_defaults()?), config)
    }

    /// Engine over a caller-prepared registry (e.g. with plugin
    /// calculators attached).
    pub fn with_registry(registry: Arc<Registry>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let unique = config
            .unique_attributes
            .iter()
            .map(|name| registry.attributes.register(name))
            .collect::<Result<Vec<_>>>()?;
        let reconciler = Reconciler::new(&registry)?;
        let objects = Objects::new(registry.clone(), &unique)?;
        tracing::debug!(unique = ?config.unique_attributes, "engine created");
        Ok(Self {
            registry,
            config,
            unique,
            reconciler,
            current: RwLock::new(Arc::new(objects)),
            writer: Mutex::new(()),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The current generation.
    pub fn snapshot(&self) -> Arc<Objects> {
        self.current.read().clone()
    }

    /// Frozen view of the edge kinds registered so far.
    pub fn catalog(&self) -> EdgeCatalog {
        self.registry.edges.catalog()
    }

    /// Edge kinds with tags and probabilities, for filter controls.
    pub fn edge_catalog(&self) -> Vec<EdgeKindInfo> {
        self.catalog().entries()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub fn import_batch(&self, batch: CollectedBatch) -> Result<IngestReport> {
        self.import_batches([batch])
    }

    /// Reconcile and import batches into the next generation.
    pub fn import_batches(&self, batches: impl IntoIterator<Item = CollectedBatch>) -> Result<IngestReport> {
        self.update(|objects| Ok(self.apply(objects, batches)))
    }

    /// Replace the whole graph with one built from `batches`.
    pub fn reload(&self, batches: impl IntoIterator<Item = CollectedBatch>) -> Result<IngestReport> {
        let _guard = self.writer.lock();
        let mut next = Objects::new(self.registry.clone(), &self.unique)?;
        let report = self.apply(&mut next, batches);
        self.publish(next);
        Ok(report)
    }

    /// Drain a source, then import everything it produced as one
    /// generation.
    pub async fn ingest(&self, source: &mut dyn BatchSource) -> Result<IngestReport> {
        let label = source.describe();
        let mut batches = Vec::new();
        while let Some(batch) = source.next_batch().await? {
            batches.push(batch);
        }
        tracing::info!(source = %label, batches = batches.len(), "source drained");
        self.import_batches(batches)
    }

    /// Run `f` against a copy of the current generation and publish the
    /// copy if `f` succeeds. On error the current generation is untouched.
    pub fn update<T>(&self, f: impl FnOnce(&mut Objects) -> Result<T>) -> Result<T> {
        let _guard = self.writer.lock();
        let mut next = Objects::clone(&self.snapshot());
        let out = f(&mut next)?;
        self.publish(next);
        Ok(out)
    }

    fn apply(&self, objects: &mut Objects, batches: impl IntoIterator<Item = CollectedBatch>) -> IngestReport {
        let mut report = IngestReport::default();
        for mut batch in batches {
            let remap = self.reconciler.remap_batch(&mut batch);
            report.remapped += remap.values_remapped + remap.edges_remapped;
            report.import += objects.import(&batch);
            report.batches += 1;
        }
        report.collisions = self.reconciler.detect_collisions(objects);
        report
    }

    fn publish(&self, next: Objects) {
        let (objects, edges) = (next.len(), next.edge_count());
        *self.current.write() = Arc::new(next);
        tracing::debug!(objects, edges, "generation published");
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn find_paths(&self, request: &PathRequest) -> Result<PathOutcome> {
        let objects = self.snapshot();
        query::find_paths(&objects, &self.catalog(), &self.config, request)
    }

    /// Paths rendered with names.
    pub fn path_reports(&self, request: &PathRequest) -> Result<Vec<PathReport>> {
        let objects = self.snapshot();
        let catalog = self.catalog();
        let outcome = query::find_paths(&objects, &catalog, &self.config, request)?;
        Ok(outcome.reports(&objects, &catalog))
    }

    pub fn lookup(&self, selector: &Selector) -> Vec<ObjectReport> {
        query::lookup(&self.snapshot(), &self.catalog(), selector)
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry full: at most {capacity} {kind} can be registered")]
    RegistryFull { kind: &'static str, capacity: usize },

    #[error("Index conflict: {attribute} = {value} already belongs to object #{owner}")]
    IndexConflict { attribute: String, value: String, owner: u32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid SID: {0}")]
    InvalidSid(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
