//! The reconstruction engine
//!
//! Lines are fed in file order. Each one is classified, its identity and
//! address evidence recorded, and any completed view block applied. When
//! the input ends, [`Analyzer::finish`] runs the finalization pass:
//!
//! 1. flush the open view block
//! 2. correlate state-transfer workflows
//! 3. resolve names, then fold name-only nodes into real ones
//! 4. resolve addresses (evidence may be keyed by name, hence after 3)
//! 5. collapse redundant consecutive views
//! 6. downtime, health and software detection
//!
//! With the dialect set to `auto`, the first lines are buffered until the
//! detection sample is full and then replayed through the chosen dialect.

use std::io::BufRead;

use tracing::{debug, info};

use crate::classifier::{Classified, Evidence, LineClassifier, ParserState, RawView, Subject};
use crate::dialect::{detect_dialect, PatternCategory, PatternRegistry, DEFAULT_DIALECT, DETECTION_SAMPLE_LINES};
use crate::downtime::{self, DowntimePeriod};
use crate::error::Result;
use crate::health::HealthMetrics;
use crate::identity::{
    is_full_uuid, AddressKey, AddressResolver, AddressSource, NameOutcome, NameResolver, NameSource, NodeTable,
};
use crate::model::{
    Cluster, ClusterView, ErrorEvent, EventPayload, GroupChange, IstEvent, LogEvent, NodeKey, ServerInfo, SstEvent,
    TransitionReason, ViewMember,
};
use crate::software::{SoftwareDetector, SoftwareInfo, SoftwareOverrides};
use crate::timestamp::Timestamp;
use crate::workflow::{self, Workflow};

pub const AUTO_DIALECT: &str = "auto";

/// Settings for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerOptions {
    /// A registered dialect name, or `auto`.
    pub dialect: String,
    pub report_unknown: bool,
    pub unknown_sample_limit: usize,
    pub software: SoftwareOverrides,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            dialect: AUTO_DIALECT.to_string(),
            report_unknown: false,
            unknown_sample_limit: 20,
            software: SoftwareOverrides::default(),
        }
    }
}

/// Everything the engine reconstructed from one log.
#[derive(Debug)]
pub struct Analysis {
    /// Dialect whose patterns were used.
    pub dialect: String,
    /// What auto-detection reported, when it ran.
    pub detected_dialect: Option<String>,
    pub cluster: Cluster,
    pub events: Vec<LogEvent>,
    pub workflows: Vec<Workflow>,
    pub downtime: Vec<DowntimePeriod>,
    pub health: HealthMetrics,
    pub software: SoftwareInfo,
    pub warnings: Vec<String>,
    pub report_unknown: bool,
    pub unknown_lines: Vec<String>,
    pub unknown_total: usize,
    /// Matched lines dropped for an unusable timestamp.
    pub dropped_events: usize,
}

pub struct Analyzer {
    registry: PatternRegistry,
    options: AnalyzerOptions,
    classifier: Option<LineClassifier>,
    detected_dialect: Option<String>,
    pending: Vec<String>,
    parser: ParserState,
    cluster: Cluster,
    events: Vec<LogEvent>,
    names: NameResolver,
    addresses: AddressResolver,
    software: SoftwareDetector,
    last_joiner: Option<String>,
}

impl Analyzer {
    pub fn new(registry: PatternRegistry, options: AnalyzerOptions) -> Self {
        let software = SoftwareDetector::new(&options.software);
        let mut analyzer = Self {
            registry,
            options,
            classifier: None,
            detected_dialect: None,
            pending: Vec::new(),
            parser: ParserState::default(),
            cluster: Cluster::default(),
            events: Vec::new(),
            names: NameResolver::default(),
            addresses: AddressResolver::default(),
            software,
            last_joiner: None,
        };
        if analyzer.options.dialect != AUTO_DIALECT {
            analyzer.start();
        }
        analyzer
    }

    /// Feed one line of log text.
    pub fn feed_line(&mut self, line: &str) {
        if self.classifier.is_none() {
            self.pending.push(line.to_string());
            if self.pending.len() >= DETECTION_SAMPLE_LINES {
                self.start();
            }
            return;
        }
        self.process_line(line);
    }

    /// Feed a whole reader. Invalid UTF-8 is replaced, not rejected.
    pub fn analyze_reader<R: BufRead>(&mut self, mut reader: R) -> Result<()> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            self.feed_line(&line);
        }
        Ok(())
    }

    /// Pick the dialect and replay anything buffered.
    fn start(&mut self) {
        let requested = if self.options.dialect == AUTO_DIALECT {
            let detected = detect_dialect(&self.pending);
            self.detected_dialect = Some(detected.clone());
            detected
        } else {
            self.options.dialect.clone()
        };
        let dialect = if self.registry.has_dialect(&requested) {
            requested
        } else {
            debug!(requested = %requested, "dialect not registered, using default patterns");
            DEFAULT_DIALECT.to_string()
        };
        info!(dialect = %dialect, "selected dialect");
        let classifier = LineClassifier::new(self.registry.resolve(&dialect))
            .with_unknown_sampling(self.options.report_unknown, self.options.unknown_sample_limit);
        self.classifier = Some(classifier);
        for line in std::mem::take(&mut self.pending) {
            self.process_line(&line);
        }
    }

    fn process_line(&mut self, line: &str) {
        let Some(classifier) = self.classifier.as_ref() else {
            return;
        };
        self.software
            .observe(classifier.patterns().category(PatternCategory::Software), line);
        let classified = classifier.classify(line, &mut self.parser);
        let evidence = classifier.extract_evidence(line);

        let at = self.parser.current_timestamp;
        for item in evidence {
            self.apply_evidence(item, at, line);
        }
        for view in std::mem::take(&mut self.parser.completed_views) {
            self.apply_view(view);
        }
        if let Some(event) = classified {
            self.apply_event(event);
        }
    }

    /// Record a name observation; a same-weight disagreement becomes a
    /// critical event.
    fn observe_name(&mut self, key: NodeKey, name: &str, source: NameSource, at: Timestamp, raw: &str) {
        let outcome = self.names.observe(&mut self.cluster.nodes, key, name, source, at);
        if let NameOutcome::Conflict { existing, candidate, weight } = outcome {
            let uuid = self.cluster.nodes.get(key).uuid.clone();
            debug!(uuid = %uuid, existing = %existing, candidate = %candidate, "conflicting node names");
            let mut event = LogEvent::new(
                at,
                raw.trim(),
                EventPayload::Error(ErrorEvent::IdentityConflict {
                    uuid,
                    existing,
                    candidate,
                    weight,
                }),
            );
            event.node = Some(key);
            self.events.push(event);
        }
    }

    fn apply_evidence(&mut self, evidence: Evidence, at: Option<Timestamp>, raw: &str) {
        let nodes = &mut self.cluster.nodes;
        match evidence {
            Evidence::LocalUuid(uuid) => {
                if is_full_uuid(&uuid) {
                    nodes.bind_local_uuid(&uuid);
                    self.cluster.node_instance_uuid = Some(uuid);
                }
            }
            Evidence::UuidName { uuid, name } => {
                if let Some(at) = at {
                    let key = nodes.ensure_reference(&uuid);
                    self.observe_name(key, &name, NameSource::Other, at, raw);
                }
            }
            Evidence::LocalAddress { endpoint, source } => {
                if let Some(at) = at {
                    let key = nodes.ensure_local();
                    self.addresses.observe(AddressKey::Node(key), &endpoint, source, at);
                }
            }
            Evidence::PeerAddress { uuid, endpoint, source } => {
                if let Some(at) = at {
                    let key = nodes.ensure_reference(&uuid);
                    self.addresses.observe(AddressKey::Node(key), &endpoint, source, at);
                }
            }
            Evidence::ClusterAddresses(peers) => {
                for peer in peers {
                    if !self.cluster.configured_addresses.contains(&peer) {
                        self.cluster.configured_addresses.push(peer);
                    }
                }
            }
        }
    }

    fn apply_view(&mut self, raw: RawView) {
        let mut members = Vec::with_capacity(raw.members.len());
        for m in &raw.members {
            let node = self.cluster.nodes.ensure_reference(&m.uuid);
            if let Some(name) = &m.name {
                let line = format!("view {} member {}: {}, {}", raw.view_id, m.index, m.uuid, name);
                self.observe_name(node, name, NameSource::ViewMember, raw.timestamp, &line);
            }
            members.push(ViewMember {
                index: m.index,
                observed_uuid: m.uuid.clone(),
                name: m.name.clone(),
                node,
            });
        }
        if let Some(group) = &raw.group_uuid {
            self.cluster.group_uuid = Some(group.clone());
        }

        let view = ClusterView {
            view_id: raw.view_id,
            status: raw.status,
            timestamp: raw.timestamp,
            protocol_version: raw.protocol_version,
            capabilities: raw.capabilities,
            members,
            joined: raw.joined,
            left: raw.left,
            partitioned: raw.partitioned,
            own_index: raw.own_index,
            format: raw.format,
        };
        if let Some(own) = view.own_member() {
            self.bind_own_member(own.node, &own.observed_uuid);
        }

        let mut event = LogEvent::new(
            view.timestamp,
            format!("view {} ({}) with {} members", view.view_id, status_label(&view), view.members.len()),
            EventPayload::ClusterView {
                view_id: view.view_id.clone(),
                status: view.status,
                member_count: view.members.len(),
            },
        );
        event.node = self.cluster.nodes.local();
        self.events.push(event);
        self.cluster.views_history.push(view);
    }

    /// The member at `own_index` is the node writing the log.
    fn bind_own_member(&mut self, member: NodeKey, observed_uuid: &str) {
        let nodes = &mut self.cluster.nodes;
        if is_full_uuid(observed_uuid) {
            nodes.bind_local_uuid(observed_uuid);
            return;
        }
        let local = nodes.ensure_local();
        if local != nodes.canonical(member) && nodes.is_synthetic(local) {
            nodes.merge(local, member);
        }
    }

    /// Node a "Member N.S (name)" reference points at.
    fn member_node(&mut self, member_id: &str, name: &str) -> NodeKey {
        let by_index = member_id
            .split('.')
            .next()
            .and_then(|idx| idx.parse::<usize>().ok())
            .and_then(|idx| self.cluster.member_at_index(idx));
        match by_index {
            Some(key) => key,
            None => self.cluster.nodes.ensure_named(name),
        }
    }

    fn subject_node(&mut self, subject: &Subject) -> Option<NodeKey> {
        let nodes = &mut self.cluster.nodes;
        match subject {
            Subject::Cluster => None,
            Subject::Local => Some(nodes.ensure_local()),
            Subject::Named(name) if !name.is_empty() => Some(nodes.ensure_named(name)),
            Subject::Named(_) => None,
            Subject::Uuid(uuid) => Some(nodes.ensure_reference(uuid)),
        }
    }

    fn apply_event(&mut self, classified: Classified) {
        let Classified {
            timestamp: at,
            raw,
            subject,
            mut payload,
        } = classified;
        let node = match &mut payload {
            EventPayload::StateTransition(t) => {
                let node = self.subject_node(&subject);
                if t.reason != TransitionReason::ClusterComponent {
                    t.node = node;
                    if let Some(key) = node {
                        self.cluster.nodes.get_mut(key).status = Some(t.to_state.clone());
                    }
                }
                node
            }
            EventPayload::ServerInfo(info) => match self.apply_server_info(info, at, &raw) {
                Some(key) => Some(key),
                None => self.subject_node(&subject),
            },
            EventPayload::Sst(sst) => match self.apply_sst(sst, at, &raw) {
                Some(key) => Some(key),
                None => self.subject_node(&subject),
            },
            EventPayload::Ist(IstEvent::AsyncStart { peer, .. }) => {
                if let Some(joiner) = self.last_joiner.clone() {
                    self.addresses
                        .observe(AddressKey::Name(joiner), peer, AddressSource::DonorObservedPeer, at);
                }
                self.subject_node(&subject)
            }
            _ => self.subject_node(&subject),
        };

        let mut event = LogEvent::new(at, raw, payload);
        event.node = node;
        self.events.push(event);
    }

    fn apply_server_info(&mut self, info: &ServerInfo, at: Timestamp, raw: &str) -> Option<NodeKey> {
        match info {
            ServerInfo::FirstView { group_uuid, my_uuid } => {
                self.cluster.group_uuid = Some(group_uuid.clone());
                if is_full_uuid(my_uuid) {
                    self.cluster.node_instance_uuid = Some(my_uuid.clone());
                    return Some(self.cluster.nodes.bind_local_uuid(my_uuid));
                }
                None
            }
            ServerInfo::GroupChange { from, to } => {
                self.cluster.group_changes.push(GroupChange {
                    timestamp: at,
                    from: from.clone(),
                    to: to.clone(),
                });
                self.cluster.group_uuid = Some(to.clone());
                None
            }
            ServerInfo::GroupState { uuid, seqno } => {
                self.cluster.group_uuid = Some(uuid.clone());
                self.cluster.group_seqno = Some(*seqno);
                None
            }
            ServerInfo::LocalState { uuid, seqno } => {
                self.cluster.local_state_uuid = Some(uuid.clone());
                self.cluster.local_seqno = Some(*seqno);
                None
            }
            ServerInfo::ServerSynced { name } => {
                let local = self.cluster.nodes.ensure_local();
                self.observe_name(local, name, NameSource::LocalServer, at, raw);
                self.cluster.local_node_name = Some(name.clone());
                self.cluster.nodes.get_mut(local).status = Some("SYNCED".to_string());
                Some(local)
            }
            ServerInfo::MemberStatus { member_id, name, status } => {
                let key = self.member_node(member_id, name);
                self.observe_name(key, name, NameSource::MemberSynced, at, raw);
                let node = self.cluster.nodes.get_mut(key);
                node.node_id = Some(member_id.clone());
                node.status = Some(status.to_uppercase());
                Some(key)
            }
            _ => None,
        }
    }

    fn apply_sst(&mut self, sst: &SstEvent, at: Timestamp, raw: &str) -> Option<NodeKey> {
        match sst {
            SstEvent::Requested {
                joiner_id,
                joiner_name,
                donor_id,
                donor_name,
                ..
            } => {
                let mut joiner = None;
                for (id, name, is_joiner) in [(joiner_id, joiner_name, true), (donor_id, donor_name, false)] {
                    if name.is_empty() {
                        continue;
                    }
                    let key = self.member_node(id, name);
                    self.observe_name(key, name, NameSource::SstSelection, at, raw);
                    self.cluster.nodes.get_mut(key).node_id = Some(id.clone());
                    if is_joiner {
                        joiner = Some(key);
                    }
                }
                self.last_joiner = Some(joiner_name.clone());
                joiner
            }
            SstEvent::Initiated { side, address, .. } => {
                if side == "joiner" {
                    let local = self.cluster.nodes.ensure_local();
                    self.addresses
                        .observe(AddressKey::Node(local), address, AddressSource::SstJoinerAddress, at);
                } else if let Some(joiner) = self.last_joiner.clone() {
                    self.addresses
                        .observe(AddressKey::Name(joiner), address, AddressSource::DonorObservedPeer, at);
                }
                None
            }
            _ => None,
        }
    }

    /// Run finalization and hand back the reconstruction.
    pub fn finish(mut self) -> Analysis {
        if self.classifier.is_none() {
            self.start();
        }
        if let Some(classifier) = self.classifier.as_ref() {
            classifier.flush(&mut self.parser);
        }
        for view in std::mem::take(&mut self.parser.completed_views) {
            self.apply_view(view);
        }
        let dialect = self
            .classifier
            .as_ref()
            .map(|c| c.dialect().to_string())
            .unwrap_or_else(|| DEFAULT_DIALECT.to_string());

        let workflows = workflow::correlate(&self.events);
        for wf in &workflows {
            let at = wf.requested_at;
            if let Some(addr) = &wf.joiner_addr {
                self.addresses
                    .observe(AddressKey::Name(wf.joiner.clone()), addr, AddressSource::IstAddress, at);
            }
        }

        let nodes = &mut self.cluster.nodes;
        self.names.finalize(nodes);
        let merged = nodes.merge_synthetic_by_name();
        if !merged.is_empty() {
            debug!(count = merged.len(), "folded name-only nodes");
            self.names.finalize(nodes);
        }
        self.addresses.finalize(nodes);
        if self.cluster.local_node_name.is_none() {
            if let Some(local) = nodes.local() {
                let node = nodes.get(local);
                if !node.placeholder {
                    self.cluster.local_node_name = Some(node.name.clone());
                }
            }
        }

        let views = std::mem::take(&mut self.cluster.views_history);
        let observed = views.len();
        self.cluster.views_history = collapse_views(views, &self.cluster.nodes);

        let downtime = downtime::analyze(&self.events, &self.cluster.views_history);
        let health = HealthMetrics::collect(&self.events, &self.cluster.views_history, &self.cluster.nodes);
        let (software, software_warning) = self.software.finish();

        let mut warnings = Vec::new();
        warnings.extend(software_warning);
        if self.parser.dropped_events > 0 {
            warnings.push(format!(
                "{} matching lines dropped for an invalid timestamp",
                self.parser.dropped_events
            ));
        }

        info!(
            events = self.events.len(),
            views = self.cluster.views_history.len(),
            views_collapsed = observed - self.cluster.views_history.len(),
            workflows = workflows.len(),
            "analysis finished"
        );

        Analysis {
            dialect,
            detected_dialect: self.detected_dialect,
            cluster: self.cluster,
            events: self.events,
            workflows,
            downtime,
            health,
            software,
            warnings,
            report_unknown: self.options.report_unknown,
            unknown_lines: self.parser.unknown_lines,
            unknown_total: self.parser.unknown_total,
            dropped_events: self.parser.dropped_events,
        }
    }
}

fn status_label(view: &ClusterView) -> &'static str {
    if view.status.is_primary() {
        "primary"
    } else {
        "non-primary"
    }
}

/// Protocol versions agree when equal or when either view did not print one.
fn same_protocol(a: Option<i64>, b: Option<i64>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

/// Drop views identical to their predecessor in status, member set and
/// protocol. A detailed block replaces an equal gcomm one but keeps its
/// earlier timestamp.
pub fn collapse_views(views: Vec<ClusterView>, nodes: &NodeTable) -> Vec<ClusterView> {
    let mut kept: Vec<ClusterView> = Vec::with_capacity(views.len());
    let mut kept_members: Vec<String> = Vec::new();
    for view in views {
        let members = view.member_uuids(nodes);
        let redundant = kept.last().is_some_and(|last| {
            last.status == view.status
                && kept_members == members
                && same_protocol(last.protocol_version, view.protocol_version)
        });
        if !redundant {
            kept_members = members;
            kept.push(view);
            continue;
        }
        if let Some(last) = kept.last_mut() {
            if last.protocol_version.is_none() && view.protocol_version.is_some() {
                let first_seen = last.timestamp;
                *last = view;
                last.timestamp = first_seen;
            }
        }
    }
    kept
}

/// Convenience: analyze a whole reader with a fresh engine.
pub fn analyze_reader<R: BufRead>(registry: PatternRegistry, options: AnalyzerOptions, reader: R) -> Result<Analysis> {
    let mut analyzer = Analyzer::new(registry, options);
    analyzer.analyze_reader(reader)?;
    Ok(analyzer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ViewFormat, ViewStatus};
    use crate::timestamp;
    use crate::workflow::Decision;
    use proptest::prelude::*;

    const LOG: &str = "\
2025-09-15 13:40:00 0 [Note] Server version: 10.6.16-MariaDB-log
2025-09-15 13:45:47 0 [Note] WSREP: My UUID: 378c0ec7-9221-11f0-a3db-8e2d5b0f3a12
2025-09-15 13:45:48 0 [Note] WSREP: (378c0ec7-a3db, 'tcp://0.0.0.0:4567') listening at tcp://10.0.0.1:4567
2025-09-15 13:45:49 0 [Note] WSREP: (378c0ec7-a3db, 'tcp://0.0.0.0:4567') connection established to 5b1c2d3e-b4ec tcp://10.0.0.2:4567
2025-09-15 13:45:50 0 [Note] WSREP: view(view_id(PRIM,378c0ec7-a3db,5) memb {
\t378c0ec7-a3db,0
\t5b1c2d3e-b4ec,0
} joined {
} left {
} partitioned {
})
2025-09-15 13:45:50 0 [Note] WSREP: ================================================
View:
  id: 9a4c1b2e-9221-11f0-8f3a-2b7c4d5e6f70:5
  status: primary
  protocol_version: 4
  capabilities: MULTI-MASTER, CERTIFICATION
  final: no
  own_index: 0
  members(2):
\t0: 378c0ec7-9221-11f0-a3db-8e2d5b0f3a12, db1
\t1: 5b1c2d3e-9221-11f0-b4ec-1a2b3c4d5e6f, db2
=================================================
2025-09-15 13:45:55 0 [Note] WSREP: Member 1.0 (db2) requested state transfer from '*any*'. Selected 0.0 (db1)(SYNCED) as donor.
2025-09-15 13:45:56 0 [Note] WSREP: Shifting SYNCED -> DONOR/DESYNCED (TO: 1625)
2025-09-15 13:46:10 0 [ERROR] WSREP: SST sending failed: -125
2025-09-15 13:46:11 0 [Note] WSREP: Shifting DONOR/DESYNCED -> JOINED (TO: 1625)
";

    fn run(log: &str, options: AnalyzerOptions) -> Analysis {
        let registry = PatternRegistry::new().unwrap();
        analyze_reader(registry, options, log.as_bytes()).unwrap()
    }

    #[test]
    fn test_end_to_end_reconstruction() {
        let analysis = run(LOG, AnalyzerOptions::default());
        assert_eq!(analysis.detected_dialect.as_deref(), Some("mariadb-10"));

        let nodes = &analysis.cluster.nodes;
        let local = nodes.local().unwrap();
        assert_eq!(nodes.get(local).name, "db1");
        assert_eq!(nodes.get(local).uuid, "378c0ec7-9221-11f0-a3db-8e2d5b0f3a12");
        assert_eq!(nodes.get(local).address.as_deref(), Some("10.0.0.1"));
        assert_eq!(nodes.get(local).status.as_deref(), Some("JOINED"));

        let db2 = nodes.lookup("5b1c2d3e-b4ec").unwrap();
        assert_eq!(nodes.get(db2).name, "db2");
        assert_eq!(nodes.get(db2).node_id.as_deref(), Some("1.0"));
        assert_eq!(nodes.get(db2).address.as_deref(), Some("10.0.0.2"));
        assert_eq!(nodes.live().count(), 2);

        // gcomm and detailed print of view 5 collapse into one
        assert_eq!(analysis.cluster.views_history.len(), 1);
        assert_eq!(analysis.cluster.views_history[0].format, ViewFormat::Detailed);
        assert_eq!(
            analysis.cluster.group_uuid.as_deref(),
            Some("9a4c1b2e-9221-11f0-8f3a-2b7c4d5e6f70")
        );

        assert_eq!(analysis.workflows.len(), 1);
        assert_eq!(analysis.workflows[0].decision, Decision::SstFailed);
        assert_eq!(analysis.workflows[0].full_resync.error_code, Some(-125));
        assert_eq!(analysis.software.mariadb_version.as_deref(), Some("10.6.16"));
    }

    #[test]
    fn test_explicit_dialect_skips_detection() {
        let options = AnalyzerOptions {
            dialect: "galera".into(),
            ..AnalyzerOptions::default()
        };
        let analysis = run(LOG, options);
        assert_eq!(analysis.dialect, "galera");
        assert!(analysis.detected_dialect.is_none());
    }

    #[test]
    fn test_unregistered_dialect_falls_back_to_default() {
        let options = AnalyzerOptions {
            dialect: "nope".into(),
            ..AnalyzerOptions::default()
        };
        assert_eq!(run("", options).dialect, "default");
    }

    #[test]
    fn test_same_weight_name_conflict_is_critical_event() {
        let log = "\
2025-09-15 13:45:50 0 [Note] WSREP: view(view_id(PRIM,378c0ec7-a3db,5) memb {
\t378c0ec7-a3db,0
\t5b1c2d3e-b4ec,0
} joined {
} left {
} partitioned {
})
2025-09-15 13:45:55 0 [Note] WSREP: Member 1.0 (db2) synced with group.
2025-09-15 13:45:56 0 [Note] WSREP: Member 1.0 (db9) synced with group.
";
        let analysis = run(log, AnalyzerOptions::default());
        let conflicts: Vec<_> = analysis
            .events
            .iter()
            .filter(|e| matches!(e.payload, EventPayload::Error(ErrorEvent::IdentityConflict { .. })))
            .collect();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].severity, crate::model::Severity::Critical);
        // first equal-weight name stays
        let node = analysis.cluster.nodes.lookup("5b1c2d3e-b4ec").unwrap();
        assert_eq!(analysis.cluster.nodes.get(node).name, "db2");
    }

    #[test]
    fn test_missing_version_warns_without_failing() {
        let analysis = run("2025-09-15 13:45:56 0 [Note] WSREP: Shifting SYNCED -> DONOR/DESYNCED (TO: 1)\n", AnalyzerOptions::default());
        assert_eq!(analysis.software.dialect_display, "unknown");
        assert!(analysis.warnings.iter().any(|w| w.contains("MariaDB version unknown")));
    }

    #[test]
    fn test_invalid_utf8_is_tolerated() {
        let mut bytes = b"2025-09-15 13:45:56 0 [Note] WSREP: Shifting SYNCED -> DONOR/DESYNCED (TO: 1) \xff\n".to_vec();
        bytes.extend_from_slice(b"2025-09-15 13:45:57 0 [Note] WSREP: Shifting DONOR/DESYNCED -> JOINED (TO: 1)\n");
        let registry = PatternRegistry::new().unwrap();
        let analysis = analyze_reader(registry, AnalyzerOptions::default(), bytes.as_slice()).unwrap();
        assert_eq!(analysis.health.total_state_transitions, 2);
    }

    fn raw_view(nodes: &mut NodeTable, second: u32, status: ViewStatus, members: &[&str], protocol: Option<i64>) -> ClusterView {
        ClusterView {
            view_id: second.to_string(),
            status,
            timestamp: timestamp::parse_canonical("2025-09-15 10:00:00").unwrap()
                + chrono::Duration::seconds(i64::from(second)),
            protocol_version: protocol,
            capabilities: Vec::new(),
            members: members
                .iter()
                .enumerate()
                .map(|(i, u)| ViewMember {
                    index: i,
                    observed_uuid: u.to_string(),
                    name: None,
                    node: nodes.ensure_reference(u),
                })
                .collect(),
            joined: Vec::new(),
            left: Vec::new(),
            partitioned: Vec::new(),
            own_index: None,
            format: if protocol.is_some() { ViewFormat::Detailed } else { ViewFormat::Gcomm },
        }
    }

    #[test]
    fn test_collapse_keeps_distinct_views() {
        let mut nodes = NodeTable::default();
        let views = vec![
            raw_view(&mut nodes, 0, ViewStatus::Primary, &["a", "b"], None),
            raw_view(&mut nodes, 1, ViewStatus::Primary, &["b", "a"], Some(4)),
            raw_view(&mut nodes, 2, ViewStatus::NonPrimary, &["a"], Some(4)),
            raw_view(&mut nodes, 3, ViewStatus::Primary, &["a", "b"], Some(4)),
        ];
        let kept = collapse_views(views, &nodes);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].protocol_version, Some(4));
        assert_eq!(kept[0].view_id, "1");
        assert_eq!(kept[0].timestamp, timestamp::parse_canonical("2025-09-15 10:00:00").unwrap());
    }

    fn arb_view() -> impl Strategy<Value = (bool, Vec<u8>, Option<i64>)> {
        (
            any::<bool>(),
            prop::collection::vec(0u8..4, 1..4),
            prop_oneof![Just(None), Just(Some(3)), Just(Some(4))],
        )
    }

    proptest! {
        #[test]
        fn prop_no_adjacent_redundant_views(specs in prop::collection::vec(arb_view(), 0..25)) {
            let mut nodes = NodeTable::default();
            let uuids = ["a", "b", "c", "d"];
            let views: Vec<ClusterView> = specs
                .iter()
                .enumerate()
                .map(|(i, (primary, members, protocol))| {
                    let names: Vec<&str> = members.iter().map(|m| uuids[*m as usize]).collect();
                    let status = if *primary { ViewStatus::Primary } else { ViewStatus::NonPrimary };
                    raw_view(&mut nodes, i as u32, status, &names, *protocol)
                })
                .collect();
            let kept = collapse_views(views, &nodes);
            for pair in kept.windows(2) {
                let same = pair[0].status == pair[1].status
                    && pair[0].member_uuids(&nodes) == pair[1].member_uuids(&nodes)
                    && same_protocol(pair[0].protocol_version, pair[1].protocol_version);
                prop_assert!(!same);
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_analysis_is_idempotent(drop_lines in prop::collection::vec(any::<bool>(), 30)) {
            let log: String = LOG
                .lines()
                .zip(drop_lines.iter().chain(std::iter::repeat(&false)))
                .filter(|(_, drop)| !**drop)
                .map(|(l, _)| format!("{l}\n"))
                .collect();
            let a = crate::summary::AnalysisSummary::from_analysis(&run(&log, AnalyzerOptions::default()));
            let b = crate::summary::AnalysisSummary::from_analysis(&run(&log, AnalyzerOptions::default()));
            prop_assert_eq!(
                serde_json::to_string(&a).unwrap(),
                serde_json::to_string(&b).unwrap()
            );
        }
    }
}
