//! Engine configuration.
//!
//! ```json
//! {
//!   "max_depth": 6,
//!   "max_paths": 100,
//!   "exploration_budget": 250000,
//!   "min_probability": 0,
//!   "deadline_ms": 2000,
//!   "unique_attributes": ["objectSid", "distinguishedName"]
//! }
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::defaults;
use crate::{Error, Result};

/// Limits and indexing choices for one [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default hop limit for path queries.
    pub max_depth: usize,
    /// Default number of paths returned.
    pub max_paths: usize,
    /// Partial paths a single query may create before it stops early.
    pub exploration_budget: usize,
    /// Hops below this probability are not traversed.
    pub min_probability: u8,
    /// Default wall-clock limit for a path query.
    pub deadline_ms: Option<u64>,
    /// Attributes carrying unique indexes, in merge-lookup order.
    pub unique_attributes: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            max_paths: 100,
            exploration_budget: 250_000,
            min_probability: 0,
            deadline_ms: None,
            unique_attributes: vec![defaults::OBJECT_SID.to_string(), defaults::DISTINGUISHED_NAME.to_string()],
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "loading engine config");
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(Error::Config("max_depth must be at least 1".into()));
        }
        if self.max_paths == 0 {
            return Err(Error::Config("max_paths must be at least 1".into()));
        }
        if self.exploration_budget == 0 {
            return Err(Error::Config("exploration_budget must be at least 1".into()));
        }
        if self.min_probability > 100 {
            return Err(Error::Config(format!("min_probability {} is above 100", self.min_probability)));
        }
        if self.unique_attributes.is_empty() {
            return Err(Error::Config("at least one unique attribute is required".into()));
        }
        if self.unique_attributes.iter().any(|a| a.trim().is_empty()) {
            return Err(Error::Config("unique attribute names must not be empty".into()));
        }
        Ok(())
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}
