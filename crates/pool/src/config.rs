//! Pool configuration file
//!
//! ```toml
//! name = "people"
//! pool_size = 4
//! index_field = "email"
//! ```
//!
//! Every key is optional. A missing or zero `pool_size` selects the default
//! of 10 workers; a missing `index_field` selects the record's first field.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pool options loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Pool name
    #[serde(default)]
    pub name: Option<String>,

    /// Number of workers (0 = default)
    #[serde(default)]
    pub pool_size: usize,

    /// Canonical name of the field to index
    #[serde(default)]
    pub index_field: Option<String>,
}

impl PoolConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config {
            reason: e.to_string(),
        })
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        tracing::debug!(path = %path.display(), "Loading pool config");
        Self::from_toml_str(&content)
    }
}
