//! Structured logging bootstrap over `tracing`.
//!
//! The library itself only emits `tracing` events; embedding binaries and
//! tests call [`init_logging`] to install a subscriber. Level, format and
//! destination come from [`LoggingConfig`], with `RUST_LOG` taking
//! precedence over the configured level when set.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{IndexError, Result};

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format: text, json
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr
    #[serde(default = "default_output")]
    pub output: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            output: default_output(),
        }
    }
}

/// Install a global subscriber according to `config`. Fails if one is
/// already installed or the configuration is invalid.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| IndexError::Config(format!("invalid log level: {}", e)))?;

    let to_stdout = match config.output.as_str() {
        "stdout" => true,
        "stderr" => false,
        other => {
            return Err(IndexError::Config(format!(
                "invalid log output: {}",
                other
            )))
        }
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match (config.format.as_str(), to_stdout) {
        ("json", true) => builder.json().with_writer(std::io::stdout).try_init(),
        ("json", false) => builder.json().with_writer(std::io::stderr).try_init(),
        ("text", true) => builder.with_writer(std::io::stdout).try_init(),
        ("text", false) => builder.with_writer(std::io::stderr).try_init(),
        (other, _) => {
            return Err(IndexError::Config(format!(
                "invalid log format: {}",
                other
            )))
        }
    };
    result.map_err(|e| IndexError::Config(e.to_string()))
}
