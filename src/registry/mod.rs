//! # Symbol registries
//!
//! Attribute names and edge-kind names are interned to small, stable
//! handles on first registration. Handles compare by equality only; the
//! registration sequence implies nothing beyond stability.
//!
//! There is no global registry. A [`Registry`] is created once by the
//! owning [`Engine`](crate::Engine) (or per test) and handed to whatever
//! needs to intern or resolve names.
//!
//! ## Locking
//!
//! Only the name → handle map sits behind a `parking_lot::RwLock`.
//! Resolving an existing name takes the shared lock; the exclusive lock is
//! held just for the insert path and re-checks the name, so N racing first
//! registrations still produce exactly one handle.
//!
//! Everything keyed by a handle (its name, its metadata, the table length,
//! a frozen [`EdgeCatalog`]) is read without locking: entries live in
//! write-once slots filled before the handle is handed out.

pub mod attributes;
pub mod edges;
pub mod defaults;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::model::MAX_EDGE_KINDS;
use crate::{Error, Result};

pub use attributes::{AttributeDescriptor, AttributeRegistry, Cardinality};
pub use edges::{EdgeCatalog, EdgeKindDescriptor, EdgeKindInfo, EdgeKindSpec, EdgeRegistry, EdgeTag};

// ============================================================================
// Handles
// ============================================================================

/// Interned attribute name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Attribute(u16);

impl Attribute {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Interned edge kind. Its index is its bit position in an
/// [`EdgeBitmap`](crate::EdgeBitmap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKind(u8);

impl EdgeKind {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Rebuild a handle from a bit position. Only meaningful for positions a
    /// registry handed out.
    pub fn from_index(index: usize) -> Self {
        debug_assert!(index < MAX_EDGE_KINDS);
        EdgeKind(index as u8)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Both registries, owned together.
#[derive(Debug, Default)]
pub struct Registry {
    pub attributes: AttributeRegistry,
    pub edges: EdgeRegistry,
}

impl Registry {
    /// Empty registries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registries pre-populated with the local-machine vocabulary.
    pub fn with_defaults() -> Result<Self> {
        let registry = Self::new();
        defaults::register(&registry)?;
        Ok(registry)
    }

    /// Convenience: resolve or register an attribute by name.
    pub fn attribute(&self, name: &str) -> Result<Attribute> {
        self.attributes.register(name)
    }

    /// Convenience: resolve or register an edge kind by name.
    pub fn edge(&self, name: &str) -> Result<EdgeKind> {
        self.edges.register_name(name)
    }
}

// ============================================================================
// SymbolTable (shared interning core)
// ============================================================================

type Entry<M> = (Arc<str>, Arc<M>);

const SLOT_CHUNK: usize = 64;

/// Write-once entry storage, allocated a chunk at a time.
struct Slots<M> {
    chunks: Box<[OnceLock<Box<[OnceLock<Entry<M>>]>>]>,
}

impl<M> Slots<M> {
    fn new(capacity: usize) -> Self {
        Self { chunks: (0..capacity.div_ceil(SLOT_CHUNK)).map(|_| OnceLock::new()).collect() }
    }

    fn get(&self, idx: usize) -> Option<&Entry<M>> {
        self.chunks.get(idx / SLOT_CHUNK)?.get()?.get(idx % SLOT_CHUNK)?.get()
    }

    fn fill(&self, idx: usize, entry: Entry<M>) {
        let Some(chunk) = self.chunks.get(idx / SLOT_CHUNK) else {
            return;
        };
        let chunk = chunk.get_or_init(|| (0..SLOT_CHUNK).map(|_| OnceLock::new()).collect());
        // Only the holder of the write lock fills, each index once.
        let _ = chunk[idx % SLOT_CHUNK].set(entry);
    }
}

/// Name → dense index table with per-entry metadata.
pub(crate) struct SymbolTable<M> {
    what: &'static str,
    capacity: usize,
    by_name: RwLock<HashMap<Arc<str>, usize>>,
    slots: Slots<M>,
    len: AtomicUsize,
}

impl<M: PartialEq> SymbolTable<M> {
    pub(crate) fn new(what: &'static str, capacity: usize) -> Self {
        Self {
            what,
            capacity,
            by_name: RwLock::new(HashMap::new()),
            slots: Slots::new(capacity),
            len: AtomicUsize::new(0),
        }
    }

    /// Intern `name`.
    ///
    /// `meta = None` accepts whatever is already registered (or registers
    /// `default()`); `meta = Some(..)` must match an existing registration
    /// exactly.
    pub(crate) fn intern(
        &self,
        name: &str,
        meta: Option<M>,
        default: impl FnOnce() -> M,
    ) -> Result<usize> {
        if name.trim().is_empty() {
            return Err(Error::Config(format!("cannot register an empty {} name", self.what)));
        }

        if let Some(idx) = self.check_existing(&self.by_name.read(), name, meta.as_ref())? {
            return Ok(idx);
        }

        let mut by_name = self.by_name.write();
        // Another thread may have won the race between the two locks.
        if let Some(idx) = self.check_existing(&by_name, name, meta.as_ref())? {
            return Ok(idx);
        }
        let idx = self.len.load(Ordering::Acquire);
        if idx >= self.capacity {
            return Err(Error::RegistryFull { kind: self.what, capacity: self.capacity });
        }

        let key: Arc<str> = Arc::from(name);
        self.slots.fill(idx, (key.clone(), Arc::new(meta.unwrap_or_else(default))));
        self.len.store(idx + 1, Ordering::Release);
        by_name.insert(key, idx);
        tracing::debug!(kind = self.what, name, idx, "registered");
        Ok(idx)
    }

    fn check_existing(
        &self,
        by_name: &HashMap<Arc<str>, usize>,
        name: &str,
        meta: Option<&M>,
    ) -> Result<Option<usize>> {
        let Some(&idx) = by_name.get(name) else {
            return Ok(None);
        };
        match (meta, self.slots.get(idx)) {
            (Some(wanted), Some((_, existing))) if **existing != *wanted => Err(Error::Config(format!(
                "{} '{name}' is already registered with different metadata",
                self.what
            ))),
            _ => Ok(Some(idx)),
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<usize> {
        self.by_name.read().get(name).copied()
    }

    pub(crate) fn name(&self, idx: usize) -> Option<Arc<str>> {
        self.slots.get(idx).map(|(n, _)| n.clone())
    }

    pub(crate) fn meta(&self, idx: usize) -> Option<Arc<M>> {
        self.slots.get(idx).map(|(_, m)| m.clone())
    }

    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot(&self) -> Vec<Entry<M>> {
        (0..self.len()).filter_map(|idx| self.slots.get(idx).cloned()).collect()
    }
}

impl<M> std::fmt::Debug for SymbolTable<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTable")
            .field("what", &self.what)
            .field("len", &self.len.load(Ordering::Acquire))
            .finish()
    }
}
