//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::eval::DEFAULT_CHECK_INTERVAL;
use crate::executor::FailurePolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Evaluation engine configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Evaluate independent nodes concurrently
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,

    /// What happens to the rest of the run when a node fails
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Whole-run deadline
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Rows processed between cancellation polls
    #[serde(default = "default_cancel_check_interval")]
    pub cancel_check_interval: usize,
}

fn default_parallel() -> bool {
    true
}

fn default_max_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_cancel_check_interval() -> usize {
    DEFAULT_CHECK_INTERVAL
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            max_parallelism: default_max_parallelism(),
            failure_policy: FailurePolicy::default(),
            timeout_ms: None,
            cancel_check_interval: default_cancel_check_interval(),
        }
    }
}

impl EngineConfig {
    /// Single-threaded, abort-on-failure configuration
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            max_parallelism: 1,
            ..Self::default()
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber
    ///
    /// `RUST_LOG` wins over `level`. Logs go to `file` when set, otherwise
    /// to stderr so stdout stays free for results.
    pub fn init_tracing(&self) -> Result<(), ConfigError> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("alertexpr={}", self.level)));

        let writer = match &self.file {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| ConfigError::Io {
                        path: PathBuf::from(path),
                        error: e.to_string(),
                    })?;
                BoxMakeWriter::new(Mutex::new(file))
            }
            None => BoxMakeWriter::new(std::io::stderr),
        };

        let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match self.format.as_str() {
            "json" => Box::new(tracing_subscriber::fmt::layer().json().with_writer(writer)),
            _ => Box::new(tracing_subscriber::fmt::layer().with_writer(writer)),
        };

        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(filter)
            .try_init()
            .map_err(|e| ConfigError::Logging(e.to_string()))
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("alertexpr").join("config.toml")),
            Some(PathBuf::from("/etc/alertexpr/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any `ALERTEXPR_*` lookup; unparsable values are ignored
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Engine overrides
        if let Some(parallel) = lookup("ALERTEXPR_PARALLEL") {
            if let Ok(p) = parallel.parse() {
                self.engine.parallel = p;
            }
        }
        if let Some(max) = lookup("ALERTEXPR_MAX_PARALLELISM") {
            if let Ok(m) = max.parse::<usize>() {
                self.engine.max_parallelism = m.max(1);
            }
        }
        if let Some(policy) = lookup("ALERTEXPR_FAILURE_POLICY") {
            match policy.parse() {
                Ok(p) => self.engine.failure_policy = p,
                Err(e) => tracing::warn!("Ignoring ALERTEXPR_FAILURE_POLICY: {}", e),
            }
        }
        if let Some(timeout) = lookup("ALERTEXPR_TIMEOUT_MS") {
            if let Ok(t) = timeout.parse() {
                self.engine.timeout_ms = Some(t);
            }
        }

        // Logging overrides
        if let Some(level) = lookup("ALERTEXPR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("ALERTEXPR_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# alertexpr Configuration
#
# Environment variables override these settings:
# - ALERTEXPR_PARALLEL
# - ALERTEXPR_MAX_PARALLELISM
# - ALERTEXPR_FAILURE_POLICY
# - ALERTEXPR_TIMEOUT_MS
# - ALERTEXPR_LOG_LEVEL
# - ALERTEXPR_LOG_FORMAT

[engine]
# Evaluate independent nodes on separate worker threads
parallel = true

# Maximum nodes evaluated at once (defaults to the number of cores)
# max_parallelism = 8

# On a node failure: "abort" the run, or "skip_dependents" and keep going
failure_policy = "abort"

# Cancel the whole run after this many milliseconds
# timeout_ms = 5000

# Rows processed between cancellation checks
cancel_check_interval = 1024

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/alertexpr/alertexpr.log"
"#
    .to_string()
}
