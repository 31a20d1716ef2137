//! Configuration file support for galeralog
//!
//! Reads from .galeralog/config.toml (or the file named by
//! `$GALERALOG_CONFIG`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::analyzer::{AnalyzerOptions, AUTO_DIALECT};
use crate::dialect::{PatternCategory, PatternRegistry, DEFAULT_DIALECT};
use crate::error::{AnalyzerError, Result};
use crate::software::SoftwareOverrides;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "GALERALOG_CONFIG";

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Analysis settings
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Software facts to use when the log does not state them
    #[serde(default)]
    pub software: SoftwareOverrides,

    /// Extra dialects, or pattern overrides for built-in ones
    #[serde(default)]
    pub dialects: BTreeMap<String, DialectConfig>,
}

/// Analysis-related configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Dialect name, or "auto" to detect from the first lines
    /// Default: "auto"
    #[serde(default = "default_dialect")]
    pub dialect: String,

    /// Keep samples of lines no pattern recognized
    /// Default: false
    #[serde(default)]
    pub report_unknown: bool,

    /// How many unrecognized lines to keep
    /// Default: 20
    #[serde(default = "default_sample_limit")]
    pub unknown_sample_limit: usize,
}

fn default_dialect() -> String {
    AUTO_DIALECT.to_string()
}

fn default_sample_limit() -> usize {
    20
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            dialect: default_dialect(),
            report_unknown: false,
            unknown_sample_limit: default_sample_limit(),
        }
    }
}

/// One `[dialects.<name>]` table
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DialectConfig {
    /// Dialect whose tables this one inherits
    /// Default: "default"
    #[serde(default = "default_extends")]
    pub extends: String,

    /// category -> pattern name -> regex
    #[serde(default)]
    pub patterns: BTreeMap<String, BTreeMap<String, String>>,
}

fn default_extends() -> String {
    DEFAULT_DIALECT.to_string()
}

/// Values given on the command line; set fields win over the file.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub dialect: Option<String>,
    pub report_unknown: bool,
    pub mariadb_version: Option<String>,
    pub mariadb_edition: Option<String>,
    pub galera_version: Option<String>,
}

impl Config {
    /// Load config from `$GALERALOG_CONFIG` or .galeralog/config.toml
    /// Returns default config if no file exists or it fails to parse
    pub fn load() -> Self {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(Self::find_config_path);
        if let Some(path) = path {
            match Self::load_from(&path) {
                Ok(config) => return config,
                Err(e) => debug!(path = %path.display(), error = %e, "ignoring config file"),
            }
        }
        Self::default()
    }

    /// Load an explicitly named config file. Unlike [`Config::load`], a
    /// missing or malformed file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Find config.toml by walking up directory tree
    fn find_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        find_config_from(&current_dir)
    }

    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(dialect) = &overrides.dialect {
            self.analysis.dialect = dialect.clone();
        }
        if overrides.report_unknown {
            self.analysis.report_unknown = true;
        }
        let software = &mut self.software;
        if overrides.mariadb_version.is_some() {
            software.mariadb_version = overrides.mariadb_version.clone();
        }
        if overrides.mariadb_edition.is_some() {
            software.mariadb_edition = overrides.mariadb_edition.clone();
        }
        if overrides.galera_version.is_some() {
            software.galera_version = overrides.galera_version.clone();
        }
        self
    }

    /// Built-in registry plus every configured dialect and pattern.
    pub fn build_registry(&self) -> Result<PatternRegistry> {
        let mut registry = PatternRegistry::new()?;

        // A dialect may extend another configured one, so register in
        // rounds until nothing new can be added.
        let mut pending: Vec<(&String, &DialectConfig)> = self
            .dialects
            .iter()
            .filter(|(name, _)| !registry.has_dialect(name))
            .collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut waiting = Vec::new();
            for (name, dialect) in pending {
                if registry.has_dialect(&dialect.extends) {
                    registry.add_dialect_variant(name, &dialect.extends)?;
                } else {
                    waiting.push((name, dialect));
                }
            }
            if waiting.len() == before {
                let (_, stuck) = waiting[0];
                return Err(AnalyzerError::UnknownDialect(stuck.extends.clone()));
            }
            pending = waiting;
        }

        for (name, dialect) in &self.dialects {
            for (category, patterns) in &dialect.patterns {
                let category: PatternCategory = category.parse()?;
                for (pattern_name, pattern) in patterns {
                    registry.update_pattern(name, category, pattern_name, pattern)?;
                }
            }
        }
        Ok(registry)
    }

    pub fn analyzer_options(&self) -> AnalyzerOptions {
        AnalyzerOptions {
            dialect: self.analysis.dialect.clone(),
            report_unknown: self.analysis.report_unknown,
            unknown_sample_limit: self.analysis.unknown_sample_limit,
            software: self.software.clone(),
        }
    }
}

fn find_config_from(start: &Path) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        let config_path = dir.join(".galeralog").join("config.toml");
        if config_path.exists() {
            return Some(config_path);
        }

        match dir.parent() {
            Some(parent) => dir = parent,
            None => return None,
        }
    }
}
