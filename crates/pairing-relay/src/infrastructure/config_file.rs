//! TOML configuration file loader.
//!
//! The file is optional and only read when `--config` (or `RELAY_CONFIG`) names
//! it.  Its keys are the fields of [`ConfigLayer`]; unknown keys are rejected
//! so typos do not pass silently.
//!
//! ```toml
//! port = 8443
//! display_label = "tv"
//! teardown_policy = "role"
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::domain::ConfigLayer;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// A file system I/O error occurred.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Reads and parses the config file at `path`.
///
/// # Errors
///
/// Unlike the defaults-only startup path, a missing file is an error here:
/// the caller asked for it explicitly.
pub fn load_config_layer(path: &Path) -> Result<ConfigLayer, ConfigFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let layer = parse_config_layer(&content)?;
    debug!("loaded config layer from {}", path.display());
    Ok(layer)
}

/// Parses a config layer from TOML text.
pub fn parse_config_layer(content: &str) -> Result<ConfigLayer, ConfigFileError> {
    Ok(toml::from_str(content)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
