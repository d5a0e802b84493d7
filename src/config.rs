//! Runtime configuration for embedding the index.
//!
//! Loaded from an optional TOML file with `BASIN_*` environment variable
//! overrides layered on top, e.g. `BASIN_DB_PATH` or
//! `BASIN_LOGGING__LEVEL`.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::{DEFAULT_BRANCH, DEFAULT_PARTIAL_COMMIT_RATIO};
use crate::logging::LoggingConfig;

const ENV_PREFIX: &str = "BASIN";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Filesystem path of the store database.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Branch created automatically for new repositories.
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Probability that a single write folds the workspace immediately.
    #[serde(default = "default_partial_commit_ratio")]
    pub partial_commit_ratio: f32,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("basin.db")
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_partial_commit_ratio() -> f32 {
    DEFAULT_PARTIAL_COMMIT_RATIO
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            default_branch: default_branch(),
            partial_commit_ratio: default_partial_commit_ratio(),
            logging: LoggingConfig::default(),
        }
    }
}

impl IndexConfig {
    /// Load configuration from `file` (when given) and the environment.
    /// Environment variables always win over file values.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(File::from(file));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
        let settings = builder.build()?;
        Ok(settings.try_deserialize()?)
    }
}
