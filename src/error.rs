//! Error types for galeralog
//!
//! Only setup can fail: reading input, loading config, compiling patterns.
//! Classification itself never errors; problems found in the log are
//! recorded as events in the output instead.

use thiserror::Error;

/// Errors raised while setting up or feeding an analysis.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Reading the log input or writing a report failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Summary serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The config file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// A pattern failed to compile.
    #[error("invalid pattern {dialect}/{category}/{name}: {source}")]
    Pattern {
        dialect: String,
        category: String,
        name: String,
        #[source]
        source: regex::Error,
    },

    /// A dialect was referenced that has never been registered.
    #[error("unknown dialect: {0}")]
    UnknownDialect(String),

    /// A dialect variant was registered twice.
    #[error("dialect already registered: {0}")]
    DialectExists(String),

    /// A pattern category name did not match any known category.
    #[error("unknown pattern category: {0}")]
    UnknownCategory(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, AnalyzerError>;
