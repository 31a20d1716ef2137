//! Database and provider version detection
//!
//! Fed every input line alongside classification. Explicit overrides
//! from config or the command line always win over what the log says.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dialect::PatternSet;

lazy_static::lazy_static! {
    static ref NUMERIC_PREFIX: Regex = Regex::new(r"^([0-9]+(?:\.[0-9]+){1,3})").unwrap();
    static ref SERIES: Regex = Regex::new(r"^(\d+\.\d+)").unwrap();
}

/// Galera provider shipped with each MariaDB series, used when the log never
/// names the provider version.
const GALERA_BY_SERIES: &[(&str, &str)] = &[("10.6", "26.4.22"), ("11.4", "26.4.23")];

pub const EDITION_ENTERPRISE: &str = "enterprise";
pub const EDITION_COMMUNITY: &str = "community";

/// User-supplied values for facts the log may not state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftwareOverrides {
    pub mariadb_version: Option<String>,
    pub mariadb_edition: Option<String>,
    pub galera_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SoftwareInfo {
    pub mariadb_version: Option<String>,
    pub mariadb_edition: Option<String>,
    pub galera_version: Option<String>,
    pub galera_variant: Option<String>,
    pub galera_vendor: Option<String>,
    pub wsrep_provider_path: Option<String>,
    /// The Galera version came from the MariaDB series, not the log.
    pub galera_version_inferred: bool,
    /// `MariaDB <ver> (<edition>) + Galera <ver>`, or `unknown`.
    pub dialect_display: String,
}

fn numeric_prefix(raw: &str) -> Option<String> {
    NUMERIC_PREFIX
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Default)]
pub struct SoftwareDetector {
    info: SoftwareInfo,
    /// Edition (and with it the Galera variant) came from an override.
    edition_pinned: bool,
}

impl SoftwareDetector {
    pub fn new(overrides: &SoftwareOverrides) -> Self {
        let info = SoftwareInfo {
            mariadb_version: overrides.mariadb_version.clone(),
            mariadb_edition: overrides.mariadb_edition.clone(),
            galera_version: overrides.galera_version.clone(),
            galera_variant: overrides.mariadb_edition.clone(),
            ..SoftwareInfo::default()
        };
        Self {
            info,
            edition_pinned: overrides.mariadb_edition.is_some(),
        }
    }

    pub fn observe(&mut self, patterns: &PatternSet, line: &str) {
        let pinned = self.edition_pinned;
        let info = &mut self.info;
        let caps = |name: &str| patterns.get(name).and_then(|re| re.captures(line));

        if let Some(c) = caps("server_version") {
            let raw = c.get(1).map(|m| m.as_str()).unwrap_or_default();
            if info.mariadb_version.is_none() {
                info.mariadb_version = numeric_prefix(raw);
            }
            if raw.to_lowercase().contains("mariadb") && info.mariadb_edition.is_none() {
                info.mariadb_edition = Some(EDITION_COMMUNITY.to_string());
            }
        }

        if let Some(c) = caps("version_quoted") {
            let raw = c.get(1).map(|m| m.as_str()).unwrap_or_default();
            if info.mariadb_version.is_none() {
                info.mariadb_version = numeric_prefix(raw);
            }
            let lower = raw.to_lowercase();
            if pinned {
                // keep the override
            } else if lower.contains("mariadb-enterprise") {
                info.mariadb_edition = Some(EDITION_ENTERPRISE.to_string());
            } else if lower.contains("mariadb") && info.mariadb_edition.is_none() {
                info.mariadb_edition = Some(EDITION_COMMUNITY.to_string());
            }
        }

        if let Some(c) = caps("enterprise_path") {
            if info.mariadb_version.is_none() {
                info.mariadb_version = c
                    .get(1)
                    .map(|m| m.as_str().trim_end_matches(|ch: char| ch == '-' || ch == '.').to_string());
            }
            if !pinned {
                info.mariadb_edition = Some(EDITION_ENTERPRISE.to_string());
            }
        }

        if let Some(c) = caps("starting_banner") {
            if info.mariadb_version.is_none() {
                info.mariadb_version = c.get(1).and_then(|m| numeric_prefix(m.as_str()));
            }
        }

        if let Some(c) = caps("provider_path") {
            let path = c.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
            if pinned {
                // variant follows the edition override
            } else if path.to_lowercase().contains("enterprise") {
                info.galera_variant = Some(EDITION_ENTERPRISE.to_string());
            } else if info.galera_variant.is_none() {
                info.galera_variant = Some(EDITION_COMMUNITY.to_string());
            }
            info.wsrep_provider_path = Some(path);
        }

        if info.galera_version.is_none() {
            let found = caps("provider_version").or_else(|| caps("provider_version_generic"));
            if let Some(c) = found {
                info.galera_version = c.get(1).map(|m| m.as_str().to_string());
            }
        }

        if let Some(c) = caps("provider_load") {
            if info.galera_version.is_none() {
                info.galera_version = c.get(1).map(|m| m.as_str().to_string());
            }
            let vendor = c
                .get(2)
                .map(|m| m.as_str().trim().trim_end_matches(|ch: char| ch == '.' || ch == ' '))
                .unwrap_or_default();
            if !vendor.is_empty() {
                info.galera_vendor = Some(vendor.to_string());
            }
        }
    }

    /// Apply inference rules. Returns the info and, when the MariaDB
    /// version is still unknown, a warning for the summary.
    pub fn finish(self) -> (SoftwareInfo, Option<String>) {
        let mut info = self.info;
        if info.galera_version.is_none() {
            let series = info
                .mariadb_version
                .as_deref()
                .and_then(|v| SERIES.captures(v))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
            let inferred = series.and_then(|s| {
                GALERA_BY_SERIES
                    .iter()
                    .find(|(known, _)| *known == s)
                    .map(|(_, galera)| galera.to_string())
            });
            if let Some(galera) = inferred {
                info.galera_version = Some(galera);
                info.galera_version_inferred = true;
            }
        }
        if info.galera_variant.is_none() {
            info.galera_variant = info.mariadb_edition.clone();
        }

        let warning = match &info.mariadb_version {
            Some(version) => {
                let mut display = format!("MariaDB {version}");
                if let Some(edition) = &info.mariadb_edition {
                    display.push_str(&format!(" ({edition})"));
                }
                if let Some(galera) = &info.galera_version {
                    display.push_str(&format!(" + Galera {galera}"));
                }
                info.dialect_display = display;
                None
            }
            None => {
                info.dialect_display = "unknown".to_string();
                let message = "MariaDB version unknown: pass --mariadb-version (and optionally --mariadb-edition) or include version lines in the log".to_string();
                warn!("{message}");
                Some(message)
            }
        };
        (info, warning)
    }
}
