//! Pattern Registry
//!
//! Named, categorized regular-expression tables grouped by dialect (a log
//! wording variant of one MariaDB/Galera/PXC combination). Dialects form an
//! inheritance tree rooted at `default`: a dialect only stores the entries it
//! overrides or adds, and lookups merge the chain from the root down.
//! Resolved `(dialect, category)` tables are cached and invalidated per
//! category when an ancestor changes.
//!
//! Overrides must keep the capture-group layout of the entry they replace;
//! the classifier reads groups by position.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::error::{AnalyzerError, Result};

pub const DEFAULT_DIALECT: &str = "default";

/// Number of leading lines sampled by dialect auto-detection.
pub const DETECTION_SAMPLE_LINES: usize = 200;

/// Pattern categories, in no particular order. Classification order lives in
/// the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    View,
    StateTransition,
    Sst,
    Ist,
    Service,
    Communication,
    Error,
    Warning,
    ServerInfo,
    Identity,
    Software,
}

impl PatternCategory {
    pub const ALL: [PatternCategory; 11] = [
        PatternCategory::View,
        PatternCategory::StateTransition,
        PatternCategory::Sst,
        PatternCategory::Ist,
        PatternCategory::Service,
        PatternCategory::Communication,
        PatternCategory::Error,
        PatternCategory::Warning,
        PatternCategory::ServerInfo,
        PatternCategory::Identity,
        PatternCategory::Software,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternCategory::View => "view",
            PatternCategory::StateTransition => "state_transition",
            PatternCategory::Sst => "sst",
            PatternCategory::Ist => "ist",
            PatternCategory::Service => "service",
            PatternCategory::Communication => "communication",
            PatternCategory::Error => "error",
            PatternCategory::Warning => "warning",
            PatternCategory::ServerInfo => "server_info",
            PatternCategory::Identity => "identity",
            PatternCategory::Software => "software",
        }
    }
}

impl std::fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternCategory {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self> {
        PatternCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| AnalyzerError::UnknownCategory(s.to_string()))
    }
}

/// An ordered name -> pattern table. Order is the order entries are tried.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    entries: Vec<(String, Regex)>,
}

impl PatternSet {
    pub fn get(&self, name: &str) -> Option<&Regex> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, re)| re)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Regex)> {
        self.entries.iter().map(|(n, re)| (n.as_str(), re))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry matching the line, by table order.
    pub fn first_match(&self, line: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, re)| re.is_match(line))
            .map(|(n, _)| n.as_str())
    }

    /// First matching entry with its captures.
    pub fn first_captures<'l>(&self, line: &'l str) -> Option<(&str, Captures<'l>)> {
        self.entries
            .iter()
            .find_map(|(n, re)| re.captures(line).map(|caps| (n.as_str(), caps)))
    }

    /// Replace an entry in place, or append a new one.
    fn upsert(&mut self, name: &str, regex: Regex) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = regex,
            None => self.entries.push((name.to_string(), regex)),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct DialectDef {
    extends: Option<String>,
    overrides: BTreeMap<PatternCategory, PatternSet>,
}

/// Registry of dialect pattern tables with a per-category lookup cache.
#[derive(Debug)]
pub struct PatternRegistry {
    dialects: BTreeMap<String, DialectDef>,
    cache: RefCell<HashMap<(String, PatternCategory), Arc<PatternSet>>>,
}

impl PatternRegistry {
    /// Registry with the built-in `default` tables and the known dialects.
    pub fn new() -> Result<Self> {
        let mut registry = Self {
            dialects: BTreeMap::new(),
            cache: RefCell::new(HashMap::new()),
        };
        registry
            .dialects
            .insert(DEFAULT_DIALECT.to_string(), DialectDef::default());
        for (category, table) in default_tables() {
            for (name, pattern) in table {
                registry.update_pattern(DEFAULT_DIALECT, category, name, pattern)?;
            }
        }

        for name in ["galera", "galera-26", "mariadb-10", "pxc-8"] {
            registry.add_dialect_variant(name, DEFAULT_DIALECT)?;
        }
        // PXC prints its SST helper prefix with a dash.
        registry.update_pattern(
            "pxc-8",
            PatternCategory::Sst,
            "started",
            r"(?i)WSREP[-_]SST:?\s+\[INFO\]\s+(\w+)\s+SST\s+started\s+on\s+(donor|joiner)\s+\(([^)]+)\)",
        )?;
        registry.update_pattern(
            "pxc-8",
            PatternCategory::Sst,
            "completed",
            r"(?i)WSREP[-_]SST:?\s+\[INFO\]\s+(\w+)\s+SST\s+completed\s+on\s+(donor|joiner)\s+\(([^)]+)\)",
        )?;
        Ok(registry)
    }

    pub fn has_dialect(&self, name: &str) -> bool {
        self.dialects.contains_key(name)
    }

    pub fn dialect_names(&self) -> Vec<&str> {
        self.dialects.keys().map(String::as_str).collect()
    }

    /// Register `name` as a dialect inheriting every table of `base`.
    pub fn add_dialect_variant(&mut self, name: &str, base: &str) -> Result<()> {
        if !self.dialects.contains_key(base) {
            return Err(AnalyzerError::UnknownDialect(base.to_string()));
        }
        if self.dialects.contains_key(name) {
            return Err(AnalyzerError::DialectExists(name.to_string()));
        }
        self.dialects.insert(
            name.to_string(),
            DialectDef {
                extends: Some(base.to_string()),
                overrides: BTreeMap::new(),
            },
        );
        // A previously unknown name was cached as a fallback to `default`.
        self.cache.borrow_mut().retain(|(d, _), _| d != name);
        Ok(())
    }

    /// Override (or add) one named pattern in one dialect.
    pub fn update_pattern(
        &mut self,
        dialect: &str,
        category: PatternCategory,
        name: &str,
        pattern: &str,
    ) -> Result<()> {
        let regex = Regex::new(pattern).map_err(|source| AnalyzerError::Pattern {
            dialect: dialect.to_string(),
            category: category.to_string(),
            name: name.to_string(),
            source,
        })?;
        let def = self
            .dialects
            .get_mut(dialect)
            .ok_or_else(|| AnalyzerError::UnknownDialect(dialect.to_string()))?;
        def.overrides.entry(category).or_default().upsert(name, regex);

        // Invalidate every cached table whose resolution chain passes through
        // the updated dialect, for this category only.
        let stale: Vec<(String, PatternCategory)> = self
            .cache
            .borrow()
            .keys()
            .filter(|(d, c)| *c == category && self.chain(d).iter().any(|x| x == dialect))
            .cloned()
            .collect();
        let mut cache = self.cache.borrow_mut();
        for key in stale {
            cache.remove(&key);
        }
        Ok(())
    }

    /// Resolved table for `(dialect, category)`. Unknown dialects resolve to
    /// `default`; unknown categories resolve to an empty table.
    pub fn get_patterns(&self, dialect: &str, category: PatternCategory) -> Arc<PatternSet> {
        let key = (dialect.to_string(), category);
        if let Some(hit) = self.cache.borrow().get(&key) {
            return Arc::clone(hit);
        }

        let mut merged = PatternSet::default();
        for name in self.chain(dialect) {
            if let Some(set) = self.dialects.get(&name).and_then(|d| d.overrides.get(&category)) {
                for (entry, regex) in set.iter() {
                    merged.upsert(entry, regex.clone());
                }
            }
        }
        let merged = Arc::new(merged);
        self.cache.borrow_mut().insert(key, Arc::clone(&merged));
        merged
    }

    /// Snapshot of every category for one dialect.
    pub fn resolve(&self, dialect: &str) -> DialectPatterns {
        let name = if self.has_dialect(dialect) {
            dialect.to_string()
        } else {
            tracing::debug!(dialect, "unregistered dialect, using default patterns");
            DEFAULT_DIALECT.to_string()
        };
        let sets = PatternCategory::ALL
            .iter()
            .map(|c| (*c, self.get_patterns(&name, *c)))
            .collect();
        DialectPatterns { name, sets }
    }

    /// Dialect names from the root (`default`) down to `dialect`.
    fn chain(&self, dialect: &str) -> Vec<String> {
        if !self.dialects.contains_key(dialect) {
            return vec![DEFAULT_DIALECT.to_string()];
        }
        let mut chain = Vec::new();
        let mut current = Some(dialect.to_string());
        while let Some(name) = current {
            if chain.contains(&name) {
                break;
            }
            current = self.dialects.get(&name).and_then(|d| d.extends.clone());
            chain.push(name);
        }
        chain.reverse();
        chain
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.cache.borrow().len()
    }
}

/// Every category table of one dialect, resolved once for a run.
#[derive(Debug, Clone)]
pub struct DialectPatterns {
    name: String,
    sets: BTreeMap<PatternCategory, Arc<PatternSet>>,
}

impl DialectPatterns {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self, category: PatternCategory) -> &PatternSet {
        self.sets
            .get(&category)
            .map(|s| s.as_ref())
            .unwrap_or(&EMPTY_SET)
    }

    /// Shorthand for a single named pattern.
    pub fn pattern(&self, category: PatternCategory, name: &str) -> Option<&Regex> {
        self.category(category).get(name)
    }
}

static EMPTY_SET: PatternSet = PatternSet { entries: Vec::new() };

lazy_static::lazy_static! {
    static ref HINT_PXC: Regex = Regex::new(r"(?i)PXC|Percona XtraDB Cluster").unwrap();
    static ref HINT_GALERA_26: Regex = Regex::new(r"(?i)Galera\s+26\.").unwrap();
    static ref HINT_MARIADB_10: Regex = Regex::new(r"(?i)Maria(DB)?\s*-?\s*10\.|10\.\d+\.\d+-MariaDB").unwrap();
    static ref HINT_WSREP: Regex = Regex::new(r"WSREP").unwrap();
}

/// Guess the dialect from a sample of leading lines.
pub fn detect_dialect<S: AsRef<str>>(lines: &[S]) -> String {
    let sample: Vec<&str> = lines
        .iter()
        .take(DETECTION_SAMPLE_LINES)
        .map(|l| l.as_ref())
        .collect();
    let text = sample.join("\n");
    let detected = if HINT_PXC.is_match(&text) {
        "pxc-8"
    } else if HINT_GALERA_26.is_match(&text) {
        "galera-26"
    } else if HINT_MARIADB_10.is_match(&text) {
        "mariadb-10"
    } else if HINT_WSREP.is_match(&text) {
        "galera"
    } else {
        "unknown"
    };
    detected.to_string()
}

type Table = &'static [(&'static str, &'static str)];

fn default_tables() -> [(PatternCategory, Table); 11] {
    [
        (PatternCategory::View, VIEW),
        (PatternCategory::StateTransition, STATE_TRANSITION),
        (PatternCategory::Sst, SST),
        (PatternCategory::Ist, IST),
        (PatternCategory::Service, SERVICE),
        (PatternCategory::Communication, COMMUNICATION),
        (PatternCategory::Error, ERROR),
        (PatternCategory::Warning, WARNING),
        (PatternCategory::ServerInfo, SERVER_INFO),
        (PatternCategory::Identity, IDENTITY),
        (PatternCategory::Software, SOFTWARE),
    ]
}

const VIEW: Table = &[
    // Detailed "View:" block (wsrep API v26)
    ("block_open", r"(?:^|\s)View:\s*$"),
    ("block_id", r"^\s*id:\s*([0-9a-f-]+):(-?\d+)"),
    ("block_status", r"^\s*status:\s*([\w-]+)"),
    ("block_protocol", r"^\s*protocol_version:\s*(-?\d+)"),
    ("block_capabilities", r"^\s*capabilities:\s*(.*)$"),
    ("block_final", r"^\s*final:\s*(\w+)"),
    ("block_own_index", r"^\s*own_index:\s*(-?\d+)"),
    ("block_section", r"^\s*(members|joined|left|partitioned)\((\d+)\):"),
    ("block_member", r"^\s*(\d+):\s*([0-9a-f][0-9a-f-]+),\s*([^,\s]+)"),
    ("block_end", r"^\s*={10,}\s*$"),
    // gcomm view(view_id(...) memb { ... }) block
    ("gcomm_open", r"view\(view_id\((\w+),([0-9a-f-]+),(\d+)\)"),
    ("gcomm_member", r"^\s*([0-9a-f][0-9a-f-]{7,35}),(\d+)\s*$"),
    ("gcomm_section", r"^\s*\}\s*(joined|left|partitioned)\s*\{"),
    ("gcomm_end", r"^\s*\}\s*\)\s*$"),
];

const STATE_TRANSITION: Table = &[
    ("cluster_component", r"(?i)Node\s+([0-9a-f-]+)\s+state\s+(\w+)"),
    ("restored", r"(?i)Restored\s+state\s+([A-Z/\-]+)\s*->\s*([A-Z/\-]+)\s*\((-?\d+)\)"),
    ("shifting", r"(?i)Shifting\s+([A-Z/]+)\s*->\s*([A-Z/]+)\s*\(TO:\s*(-?\d+)\)"),
    ("server_status", r"(?i)Server\s+status\s+change\s+([a-z]+)\s*->\s*([a-z]+)"),
    ("changing_state", r"(?i)changing\s+state\s+(\w+)\s*->\s*(\w+)"),
];

const SST: Table = &[
    ("reject", r"(?i)Rejecting\s+State\s+Transfer\s+Request\s+in\s+state\s+'([^']+)'"),
    ("reject_wrong_state", r"(?i)Received\s+State\s+Transfer\s+Request\s+in\s+wrong\s+state\s+([A-Z/\-]+)\.\s+Rejecting"),
    ("requested", r#"(?i)Member\s+(\d+\.\d+)\s+\(([^)]+)\)\s+requested\s+state\s+transfer\s+from\s+['"]([^'"]+)['"]\.\s+Selected\s+(\d+\.\d+)\s+\(([^)]+)\)\(([^)]+)\)\s+as\s+donor"#),
    ("initiated", r"(?i)Initiating\s+SST/IST\s+transfer\s+on\s+(DONOR|JOINER)\s+side\s*\((wsrep_sst_[a-z0-9_]+)\s+.*?--role\s+'(donor|joiner)'.*?--address\s+'([^']+)'"),
    ("started", r"(?i)WSREP_SST:\s+\[INFO\]\s+(\w+)\s+SST\s+started\s+on\s+(donor|joiner)\s+\(([^)]+)\)"),
    ("completed", r"(?i)WSREP_SST:\s+\[INFO\]\s+(\w+)\s+SST\s+completed\s+on\s+(donor|joiner)\s+\(([^)]+)\)"),
    ("complete_notice", r"(?i)State\s+transfer\s+(to|from)\s+(\d+\.\d+)\s+\(([^)]+)\)\s+complete\."),
    ("failed_reason", r"(?i)State\s+transfer\s+(to|from)\s+(\d+\.\d+)\s+\(([^)]+)\)\s+failed:\s*(-?\d+)(?:\s+\(([^)]*)\))?"),
    ("proceeding", r"(?i)WSREP_SST:\s+\[INFO\]\s+Proceeding\s+with\s+SST"),
    ("datadir_cleanup", r"(?i)WSREP_SST:\s+\[INFO\]\s+\.*\s*Cleaning\s+the\s+existing\s+datadir"),
    ("stream_wait", r"(?i)WSREP_SST:\s+\[INFO\]\s+\.*\s*Waiting\s+for\s+SST\s+streaming\s+to\s+complete"),
    ("stream_addr", r"(?i)WSREP_SST:\s+\[INFO\]\s+Streaming\s+the\s+backup\s+to\s+joiner\s+at\s+(\S+)(?:\s+(\d+))?"),
    ("sent", r"(?i)SST\s+sent:\s+([0-9a-f-]+):(-?\d+)"),
    ("failed", r"(?i)SST\s+(sending|receiving)\s+failed:\s*(-?\d+)"),
    ("total_time", r"(?i)WSREP_SST:\s+\[INFO\]\s+Total\s+time\s+on\s+donor:\s+(\d+)\s+seconds"),
    ("donor_monitor", r"(?i)Donor\s+monitor\s+thread\s+ended\s+with\s+total\s+time\s+(\d+)\s+sec"),
    ("status_completed", r"(?i)SST\s+(completed|success)"),
    ("status_in_progress", r"(?i)SST.*?(requested|sending|receiving)"),
    ("status_general", r"(?i)(wsrep_sst_|WSREP_SST)"),
];

const IST: Table = &[
    ("recv_addr", r"(?i)IST\s+receiver\s+addr\s+using\s+(\S+)"),
    ("recv_bind", r"(?i)IST\s+receiver\s+bind\s+using\s+(\S+)"),
    ("receiver_prepared", r"(?i)Prepared\s+IST\s+receiver\s+for\s+(-?\d+)\s*-\s*(-?\d+),\s+listening\s+at:\s+(\S+)"),
    ("applying_start", r"(?i)IST\s+applying\s+starts\s+with\s+(-?\d+)"),
    ("current_initialized", r"(?i)IST\s+current\s+seqno\s+initialized\s+to\s+(-?\d+)"),
    ("preload_start", r"(?i)IST\s+preload\s+starting\s+at\s+(-?\d+)"),
    ("eof", r"(?i)eof\s+received,\s+closing\s+socket"),
    ("incomplete", r"(?i)IST\s+didn't\s+contain\s+all\s+write\s+sets,\s+expected\s+last:\s*(-?\d+)\s+last\s+received:\s*(-?\d+)"),
    ("send_failed", r"(?i)ist\s+send\s+failed:\s*"),
    ("sender_nothing", r"(?i)IST\s+sender\s+notifying\s+joiner,\s+not\s+sending\s+anything"),
    ("sender_range", r"(?i)IST\s+sender\s+(-?\d+)\s*->\s*(-?\d+)"),
    ("async_start", r"(?i)async\s+IST\s+sender\s+starting\s+to\s+serve\s+(\S+)\s+sending\s+(-?\d+)\s*-\s*(-?\d+),\s+preload\s+starts\s+from\s+(-?\d+)"),
    ("async_failed", r"(?i)async\s+IST\s+sender\s+failed\s+to\s+serve\s+(\S+):\s+(.+)"),
    ("async_served", r"(?i)async\s+IST\s+sender\s+served"),
    ("generic", r"(?i)(?:\bIST\b|incremental\s+state\s+transfer)"),
];

const SERVICE: Table = &[
    ("starting_version", r"(?i)Starting\s+MariaDB\s+(\S+)"),
    ("starting_process", r"(?i)\bstarting\s+as\s+process\s+(\d+)"),
    ("ready", r"(?i)ready\s+for\s+connections"),
    ("shutdown_initiated", r"(?i)(Normal\s+shutdown|Received\s+shutdown\s+signal|Received\s+SHUTDOWN\s+from\s+user)"),
    ("shutdown_complete", r"(?i)Shutdown\s+complete"),
    ("crash", r"(?i)(?:mysqld|mariadbd)\s+got\s+signal\s+(\d+)"),
];

const COMMUNICATION: Table = &[
    ("aborted_connection", r"(?i)Aborted\s+connection\s+(\d+)\s+to\s+db:\s+'([^']*)'\s+user:\s+'([^']*)'\s+host:\s+'([^']*)'"),
    ("channel_open_failed", r"Failed\s+to\s+open\s+channel\s+'([^']+)'\s+at\s+'([^']+)':\s*(-?\d+)\s*\(([^)]+)\)"),
    ("suspecting", r"(?i)suspecting\s+node:\s*([0-9a-f-]+)"),
    ("inactive", r"(?i)Declaring\s+inactive"),
    ("peer_timeout", r"(?i)connection\s+to\s+peer\s+([0-9a-f-]+)\s+with\s+addr\s+(?:tcp|ssl)://(\S+)\s+timed\s+out"),
    ("generic_network", r"(?i)(timeout|timed\s+out|failed\s+to\s+connect|connection.*lost|network.*error)"),
    ("generic_protocol", r"(?i)(gcomm.*(?:error|fail)|Protocol.*failed|handshake.*failed)"),
];

const ERROR: Table = &[
    ("identity_mismatch", r"(?i)Node\s+UUID\s+([0-9a-f-]+)\s+is\s+absent\s+from\s+the\s+view"),
    ("generic", r"(?i)\b(ERROR|FATAL)\b"),
];

const WARNING: Table = &[("generic", r"(?i)\b(WARN|WARNING)\b")];

const SERVER_INFO: Table = &[
    ("first_view", r"(?i)Process\s+first\s+view:\s+([0-9a-f-]+)\s+my\s+uuid:\s+([0-9a-f-]+)"),
    ("group_change", r"(?i)Process\s+group\s+change:\s+([0-9a-f-]+)\s*->\s*([0-9a-f-]+)"),
    ("group_state", r"(?i)Group\s+state:\s+([0-9a-f-]+):(-?\d+)"),
    ("local_state", r"(?i)Local\s+state:\s+([0-9a-f-]+):(-?\d+)"),
    ("provider_paused", r"(?i)Provider\s+paused\s+at\s+([0-9a-f-]+):(-?\d+)"),
    ("provider_resuming", r"(?i)resuming\s+provider\s+at\s+(-?\d+)"),
    ("provider_resumed", r"(?i)Provider\s+resumed\."),
    ("processing_cc", r"(?i)#+\s+processing\s+CC\s+(\d+).*(ordered|unordered)"),
    ("skipping_cc", r"(?i)#+\s+skipping\s+local\s+CC\s+(\d+),\s+keep\s+in\s+cache:\s+(true|false)"),
    ("state_exchange", r"(?i)STATE_EXCHANGE:\s+(sent|got)\s+state\s+(UUID|msg):\s+([0-9a-f-]+)"),
    ("flow_control_interval", r"(?i)Flow-control\s+interval:\s*\[(\d+),\s*(\d+)\]"),
    ("fc_message", r"(?i)SENDING\s+FC_(STOP|CONT)\s+\(local\s+seqno:\s*(-?\d+),\s*fc_offset:\s*(-?\d+)\):\s*(-?\d+)"),
    ("replication_paused", r"(?i)Replication\s+paused\s+until\s+state\s+transfer\s+is\s+complete"),
    ("sync_sending", r"(?i)\bSENDING\s+SYNC\b"),
    ("sync_not_sending", r"(?i)\bNot\s+sending\s+SYNC\b"),
    ("become_joined", r"(?i)Become\s+joined,\s+FC\s+offset\s+(-?\d+)"),
    ("become_synced", r"(?i)Become\s+synced,\s+FC\s+offset\s+(-?\d+)"),
    ("received_non_primary", r"(?i)Received\s+NON-PRIMARY\."),
    ("received_self_leave", r"(?i)Received\s+SELF-LEAVE\."),
    ("channel_opened", r"Opened\s+channel\s+'([^']+)'"),
    ("recv_thread_exit", r"(?i)RECV\s+thread\s+exiting\s+-?\d+:"),
    ("server_synced", r"(?i)Server\s+([A-Za-z0-9_.-]+)\s+synced\s+with\s+group"),
    ("member_status", r"Member\s+(\d+\.\d+)\s+\(([^)]+)\)\s+(synced|left|disconnected|desynced)\b"),
    ("quorum_results", r"(?i)Quorum\s+results:\s*version\s*=\s*(\d+),\s*component\s*=\s*(\w+),\s*conf_id\s*=\s*(-?\d+),\s*members\s*=\s*(\d+)/(\d+)"),
    ("version_banner", r"(?i)(?:Server\s+version:\s*(\S+)|Version:\s*'([^']+)')"),
    ("generic_startup", r"(?i)(version|started|initialized|ready)"),
    ("generic_provider", r"(?i)(galera|wsrep).*?(version|enabled)"),
];

const IDENTITY: Table = &[
    ("my_uuid", r"(?i)My\s+UUID:\s+([0-9a-f-]{36})"),
    ("uuid_name", r"([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}),\s*([A-Za-z0-9_.-]+)"),
    ("self_listening", r"(?i)\(([0-9a-f-]+),\s*'(?:tcp|ssl)://[^']*'\)\s+listening\s+at\s+(?:tcp|ssl)://([^\s,)]+)"),
    ("listening", r"(?i)listening\s+at\s+(?:tcp|ssl)://([^\s,)]+)"),
    ("connection_established", r"(?i)connection\s+established\s+to\s+([0-9a-f-]+)\s+(?:tcp|ssl)://([^\s,)]+)"),
    ("declaring_stable", r"(?i)declaring\s+([0-9a-f-]+)\s+at\s+(?:tcp|ssl)://([^\s,)]+)\s+stable"),
    ("forgetting", r"(?i)forgetting\s+([0-9a-f-]+)\s+\((?:tcp|ssl)://([^)\s]+)\)"),
    ("node_address_config", r"(?i)(?:wsrep_node_address\s*=\s*'?|\bbase_host\s*=\s*)([^'\s;]+)"),
    ("cluster_address_config", r"(?i)wsrep_cluster_address\s*=\s*'?gcomm://([^'\s;]*)"),
];

const SOFTWARE: Table = &[
    ("server_version", r"(?i)Server\s+version:\s*([^\s]+)"),
    ("version_quoted", r"(?i)Version:\s*'([^']+)'"),
    ("enterprise_path", r"(?i)mariadb-enterprise-([0-9][0-9.\-]+)"),
    ("starting_banner", r"(?i)Starting\s+MariaDB\s+([0-9][^\s]*)"),
    ("provider_path", r"(?:--wsrep_provider=|wsrep_provider\s*=\s*)('?)([^\s']+libgalera[^\s']*?\.so)"),
    ("provider_version", r"WSREP:\s+Provider:\s+Galera\s+([0-9][0-9.]+)"),
    ("provider_version_generic", r"(?i)wsrep[_\s-]*provider[_\s-]*version[^0-9]*([0-9]+(?:\.[0-9]+)+)"),
    ("provider_load", r"(?i)wsrep_load\(\):\s*Galera\s+([0-9][\w.\-]+)(?:\([^)]*\))?\s+by\s+([^\r\n]+)"),
];
