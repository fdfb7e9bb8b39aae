//! # Batch sources
//!
//! The seam between collectors and the engine. A source hands over
//! [`CollectedBatch`]es one at a time; the engine drains it, reconciles
//! each batch and imports it into a new generation.
//!
//! ## Implementations
//!
//! | Source | Module | Description |
//! |--------|--------|-------------|
//! | `MemorySource` | `memory` | Queued batches, for tests and embedding |
//! | `JsonDirSource` | `file` | Every `*.json` batch file in a directory (`fs` feature) |

pub mod memory;
#[cfg(feature = "fs")]
pub mod file;

use async_trait::async_trait;

use crate::batch::CollectedBatch;
use crate::Result;

pub use memory::MemorySource;
#[cfg(feature = "fs")]
pub use file::JsonDirSource;

/// Something that yields collected batches.
#[async_trait]
pub trait BatchSource: Send {
    /// Next batch, or `None` once the source is exhausted.
    async fn next_batch(&mut self) -> Result<Option<CollectedBatch>>;

    /// Short label for logs.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().rsplit("::").next().unwrap_or("source").to_string()
    }
}
