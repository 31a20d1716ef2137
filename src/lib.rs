//! galeralog - reconstruct Galera cluster history from server error logs
//!
//! Feed a MariaDB/Galera (or Percona XtraDB Cluster) error log line by line
//! and get back what the cluster went through: membership views, node state
//! transitions, state-transfer workflows, downtime, and a health score.
//!
//! # Overview
//!
//! Analysis is a single streaming pass. Each line is classified against a
//! dialect-specific [`PatternRegistry`]; recognized lines become typed
//! events, multi-line view blocks are accumulated into cluster views, and
//! identity evidence (UUIDs, names, addresses) is weighed as it arrives.
//! [`Analyzer::finish`] then resolves identities, correlates state-transfer
//! workflows and derives downtime.
//!
//! | Event type | Examples |
//! |------|---------|
//! | `server_info` | version banner, group change, member synced |
//! | `cluster_view` | a primary or non-primary membership view |
//! | `state_transition` | `JOINER -> JOINED`, `SYNCED -> DONOR/DESYNCED` |
//! | `sst_event` | donor selection, SST started/failed/completed |
//! | `ist_event` | receiver prepared, async sender started |
//! | `communication_issue` | suspected or timed-out peers |
//! | `error` | identity mismatch, conflicting name evidence |
//!
//! # Quick Start
//!
//! ```no_run
//! use galeralog::{analyze_reader, AnalysisSummary, AnalyzerOptions, PatternRegistry};
//!
//! let registry = PatternRegistry::new().unwrap();
//! let file = std::fs::File::open("mysqld.err").unwrap();
//! let analysis = analyze_reader(
//!     registry,
//!     AnalyzerOptions::default(),
//!     std::io::BufReader::new(file),
//! )
//! .unwrap();
//!
//! let summary = AnalysisSummary::from_analysis(&analysis);
//! println!("{}", summary.to_json().unwrap());
//! ```

pub mod analyzer;
pub mod classifier;
pub mod config;
pub mod dialect;
pub mod downtime;
pub mod error;
pub mod health;
pub mod identity;
pub mod model;
pub mod report;
pub mod software;
pub mod summary;
pub mod timestamp;
pub mod workflow;

pub use analyzer::{analyze_reader, collapse_views, Analysis, Analyzer, AnalyzerOptions, AUTO_DIALECT};
pub use classifier::{Classified, LineClassifier, ParserState};
pub use config::{Config, ConfigOverrides};
pub use dialect::{detect_dialect, DialectPatterns, PatternCategory, PatternRegistry, DEFAULT_DIALECT};
pub use downtime::{DowntimePeriod, DowntimeSummary, GapType};
pub use error::{AnalyzerError, Result};
pub use health::{HealthMetrics, HealthStatus, HealthSummary};
pub use identity::NodeTable;
pub use model::{
    Cluster, ClusterView, EventPayload, EventType, LogEvent, Node, NodeKey, Severity,
    StateTransition, ViewStatus,
};
pub use report::write_text;
pub use software::{SoftwareInfo, SoftwareOverrides};
pub use summary::AnalysisSummary;
pub use workflow::{correlate, Decision, Workflow};
