//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. built-in defaults
//! 2. the TOML config file (platform config dir, or `--config`)
//! 3. `DUPINDEX_*` environment variables (`__` separates nested keys)
//! 4. command-line flags
//!
//! ```toml
//! store = "sqlite"
//! min_size = 209715200
//! workers = 8
//! max_groups = 50
//! exclude_file = "/home/me/.config/dupindex/exclude.txt"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::actions::DeleteMode;
use crate::context::DEFAULT_MAX_OPEN_FILES;
use crate::duplicates::DEFAULT_MAX_GROUPS;
use crate::store::StoreKind;

/// Files smaller than this are not indexed by default (200 MiB).
pub const DEFAULT_MIN_SIZE: u64 = 200 * 1024 * 1024;

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "DUPINDEX_";

/// Fallback database file when no data directory can be determined.
const FALLBACK_DB: &str = "dupindex.db";

/// Effective application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Index backend
    pub store: StoreKind,
    /// SQLite database file; platform data dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    /// Files below this many bytes are skipped
    pub min_size: u64,
    /// Worker threads per pool
    pub workers: usize,
    /// Queue depth per pool; four per worker when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
    /// Files open at once across all workers
    pub max_open_files: usize,
    /// Memory-map large files when hashing
    pub use_mmap: bool,
    /// Duplicate groups per find/delete run, 0 for no limit
    pub max_groups: usize,
    /// One exclude pattern per line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_file: Option<PathBuf>,
    /// How duplicates are removed
    pub delete_mode: DeleteMode,
    /// Remove stale entries before each scan
    pub reclaim_on_scan: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreKind::default(),
            db_path: None,
            min_size: DEFAULT_MIN_SIZE,
            workers: std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get),
            queue_capacity: None,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            use_mmap: true,
            max_groups: DEFAULT_MAX_GROUPS,
            exclude_file: None,
            delete_mode: DeleteMode::default(),
            reclaim_on_scan: true,
        }
    }
}

/// Values given on the command line; unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_open_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_mmap: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_groups: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_mode: Option<DeleteMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reclaim_on_scan: Option<bool>,
}

impl Config {
    /// Load every layer.
    ///
    /// `explicit` replaces the default config file and must exist.
    ///
    /// # Errors
    ///
    /// Fails if an explicit file is missing or any layer does not parse.
    pub fn load(explicit: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let file = match explicit {
            Some(path) => {
                if !path.is_file() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => Self::default_path(),
        };
        Self::figment(file.as_deref())
            .merge(Serialized::defaults(overrides))
            .extract()
            .context("Invalid configuration")
    }

    /// Defaults, file and environment layers.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            log::debug!("Reading config from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Platform config file path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Database file to open.
    #[must_use]
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| {
            project_dirs().map_or_else(
                || PathBuf::from(FALLBACK_DB),
                |dirs| dirs.data_dir().join("index.db"),
            )
        })
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Fails if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "dupindex", "dupindex")
}
