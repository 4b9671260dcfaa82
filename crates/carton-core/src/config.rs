use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use carton_util::errors::{CartonError, CartonResult};

/// Global user configuration loaded from `~/.carton/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,
}

/// Search settings from `[resolver]` in global config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Try previously resolved versions first when nothing is targeted for update.
    #[serde(default = "default_prefer_resolved", rename = "prefer-resolved")]
    pub prefer_resolved: bool,
    /// Upper bound on search-tree nodes visited before giving up.
    #[serde(default, rename = "max-nodes")]
    pub max_nodes: Option<usize>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            prefer_resolved: default_prefer_resolved(),
            max_nodes: None,
        }
    }
}

fn default_prefer_resolved() -> bool {
    true
}

impl GlobalConfig {
    /// Load the global configuration, or return defaults if the file doesn't exist.
    pub fn load() -> CartonResult<Self> {
        let path = Self::default_path();
        if path.is_file() {
            Self::from_path(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Read and parse a configuration file.
    pub fn from_path(path: &Path) -> CartonResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CartonError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::parse_toml(&content)
    }

    pub fn parse_toml(content: &str) -> CartonResult<Self> {
        toml::from_str(content).map_err(|e| CartonError::Config {
            message: format!("Failed to parse config: {e}"),
        })
    }

    /// Returns the default path to the global config file.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }
}

/// Returns the Carton data directory: `$CARTON_HOME`, else `~/.carton/`.
pub fn dirs_path() -> PathBuf {
    if let Ok(home) = std::env::var("CARTON_HOME") {
        return PathBuf::from(home);
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".carton")
}
