//! Runtime configuration.
//!
//! Names the attributes and tags the runtime looks for in the shared tree and
//! carries the global switches. Every field has a default, so a config file
//! only needs to list what it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{constants, diff::DEFAULT_MAX_COST};

/// Configuration shared by every fragment of a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Tag of elements that hold a fragment.
    pub fragment_tag: String,
    /// Attribute declaring a fragment's type id.
    pub type_attribute: String,
    /// Attribute holding the automation flag.
    pub auto_attribute: String,
    /// Attribute holding the class list.
    pub class_attribute: String,
    /// Tag of auto-DOM companion elements.
    pub companion_tag: String,
    /// Attribute tagging a companion (and `#id` selectors) with the fragment id.
    pub fragment_id_attribute: String,
    /// Global kill switch for auto-DOM rendering.
    pub autorun_disabled: bool,
    /// Hold load passes until [`FragmentRegistry::mark_types_installed`] is called.
    ///
    /// [`FragmentRegistry::mark_types_installed`]: crate::FragmentRegistry::mark_types_installed
    pub require_types_installed: bool,
    /// Buffered failures per subscriber before old ones are dropped.
    pub failure_channel_capacity: usize,
    /// Edit-cost cap handed to the diff engine.
    pub diff_max_cost: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fragment_tag: constants::FRAGMENT_TAG.to_string(),
            type_attribute: constants::TYPE_ATTRIBUTE.to_string(),
            auto_attribute: constants::AUTO_ATTRIBUTE.to_string(),
            class_attribute: constants::CLASS_ATTRIBUTE.to_string(),
            companion_tag: constants::COMPANION_TAG.to_string(),
            fragment_id_attribute: constants::FRAGMENT_ID_ATTRIBUTE.to_string(),
            autorun_disabled: false,
            require_types_installed: true,
            failure_channel_capacity: 64,
            diff_max_cost: DEFAULT_MAX_COST,
        }
    }
}

impl RuntimeConfig {
    /// Parse a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::Parse)
    }

    /// Read a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}

/// Errors loading a [`RuntimeConfig`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[source] serde_json::Error),
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err)
    }
}
