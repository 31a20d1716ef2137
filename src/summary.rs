//! Structured summary of an analysis
//!
//! The one output contract: the text report, JSON output and any
//! cross-node tooling read this and never re-derive facts from events.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::analyzer::Analysis;
use crate::downtime::DowntimeSummary;
use crate::health::{HealthMetrics, HealthSummary};
use crate::identity::NodeTable;
use crate::model::{
    ClusterView, EventPayload, EventType, GroupChange, IstEvent, LogEvent, Node, NodeKey, Severity, ViewFormat,
    ViewStatus,
};
use crate::software::SoftwareInfo;
use crate::timestamp::{self, Timestamp};
use crate::workflow::Workflow;

const RECENT_GROUP_CHANGES: usize = 5;
const RECENT_SENDER_ENTRIES: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct MemberSummary {
    pub index: usize,
    pub uuid: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewSummary {
    pub view_id: String,
    pub status: ViewStatus,
    #[serde(with = "timestamp::canonical")]
    pub timestamp: Timestamp,
    pub protocol_version: Option<i64>,
    pub capabilities: Vec<String>,
    pub member_count: usize,
    pub members: Vec<MemberSummary>,
    pub joined: Vec<String>,
    pub left: Vec<String>,
    pub partitioned: Vec<String>,
    pub own_index: Option<i64>,
    pub format: ViewFormat,
}

impl ViewSummary {
    fn new(view: &ClusterView, nodes: &NodeTable) -> Self {
        let members = view
            .members
            .iter()
            .map(|m| {
                let node = nodes.get(m.node);
                MemberSummary {
                    index: m.index,
                    uuid: node.uuid.clone(),
                    name: node.name.clone(),
                }
            })
            .collect();
        Self {
            view_id: view.view_id.clone(),
            status: view.status,
            timestamp: view.timestamp,
            protocol_version: view.protocol_version,
            capabilities: view.capabilities.clone(),
            member_count: view.members.len(),
            members,
            joined: view.joined.clone(),
            left: view.left.clone(),
            partitioned: view.partitioned.clone(),
            own_index: view.own_index,
            format: view.format,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterInfo {
    pub dialect: String,
    pub detected_dialect: Option<String>,
    pub total_nodes: usize,
    /// Nodes last seen SYNCED or DONOR.
    pub active_nodes: usize,
    pub current_view: Option<ViewSummary>,
    pub total_views: usize,
    pub group_uuid: Option<String>,
    pub group_seqno: Option<i64>,
    pub local_state_uuid: Option<String>,
    pub local_seqno: Option<i64>,
    pub node_instance_uuid: Option<String>,
    pub local_node_name: Option<String>,
    pub group_changes: Vec<GroupChange>,
    pub uuid_aliases: BTreeMap<String, String>,
    pub configured_addresses: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreparedRange {
    pub first_seqno: i64,
    pub last_seqno: i64,
    pub listen_addr: String,
    #[serde(with = "timestamp::canonical")]
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyingStart {
    pub first_seqno: i64,
    #[serde(with = "timestamp::canonical")]
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncompleteIst {
    pub expected_last: i64,
    pub last_received: i64,
    #[serde(with = "timestamp::canonical")]
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IstReceiver {
    pub prepared_range: Option<PreparedRange>,
    pub applying_start: Option<ApplyingStart>,
    #[serde(with = "timestamp::canonical_opt")]
    pub completed_at: Option<Timestamp>,
    pub incomplete: Option<IncompleteIst>,
    pub recv_addr: Option<String>,
    pub recv_bind: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SenderRange {
    pub first_seqno: i64,
    pub last_seqno: i64,
    #[serde(with = "timestamp::canonical")]
    pub timestamp: Timestamp,
    pub node: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AsyncSenderStart {
    pub peer: String,
    pub first_seqno: i64,
    pub last_seqno: i64,
    pub preload_start: i64,
    #[serde(with = "timestamp::canonical")]
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize)]
pub struct SenderFailure {
    pub reason: String,
    #[serde(with = "timestamp::canonical")]
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IstSender {
    pub ranges: Vec<SenderRange>,
    #[serde(rename = "async")]
    pub async_starts: Vec<AsyncSenderStart>,
    pub failures: Vec<SenderFailure>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IstCounts {
    pub total: usize,
    pub sender_ranges: usize,
    pub async_starts: usize,
    pub failures: usize,
}

/// Receiver and sender view of incremental catch-up activity.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IstSummary {
    pub receiver: IstReceiver,
    pub sender: IstSender,
    pub counts: IstCounts,
}

fn last_n<T>(mut items: Vec<T>, n: usize) -> Vec<T> {
    let skip = items.len().saturating_sub(n);
    items.drain(..skip);
    items
}

impl IstSummary {
    /// `None` when the log has no IST events at all.
    pub fn build(events: &[LogEvent], nodes: &NodeTable) -> Option<Self> {
        let ist: Vec<(&LogEvent, &IstEvent)> = events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::Ist(ist) => Some((e, ist)),
                _ => None,
            })
            .collect();
        if ist.is_empty() {
            return None;
        }

        let mut summary = IstSummary::default();
        let mut ranges = Vec::new();
        let mut starts = Vec::new();
        let mut failures = Vec::new();
        for (event, payload) in &ist {
            let at = event.timestamp;
            let receiver = &mut summary.receiver;
            match payload {
                IstEvent::ReceiverPrepared { first_seqno, last_seqno, listen_address } => {
                    receiver.prepared_range = Some(PreparedRange {
                        first_seqno: *first_seqno,
                        last_seqno: *last_seqno,
                        listen_addr: listen_address.clone(),
                        timestamp: at,
                    });
                }
                IstEvent::ApplyingStart { seqno } => {
                    receiver.applying_start = Some(ApplyingStart { first_seqno: *seqno, timestamp: at });
                }
                IstEvent::Completed => receiver.completed_at = Some(at),
                IstEvent::Incomplete { expected_last, last_received } => {
                    receiver.incomplete = Some(IncompleteIst {
                        expected_last: *expected_last,
                        last_received: *last_received,
                        timestamp: at,
                    });
                }
                IstEvent::ReceiverAddr { address } => receiver.recv_addr = Some(address.clone()),
                IstEvent::ReceiverBind { address } => receiver.recv_bind = Some(address.clone()),
                IstEvent::SenderRange { first_seqno, last_seqno } => ranges.push(SenderRange {
                    first_seqno: *first_seqno,
                    last_seqno: *last_seqno,
                    timestamp: at,
                    node: event.node.map(|k| nodes.get(k).name.clone()),
                }),
                IstEvent::AsyncStart { peer, first_seqno, last_seqno, preload_from } => {
                    starts.push(AsyncSenderStart {
                        peer: peer.clone(),
                        first_seqno: *first_seqno,
                        last_seqno: *last_seqno,
                        preload_start: *preload_from,
                        timestamp: at,
                    })
                }
                IstEvent::SendFailed => failures.push(SenderFailure {
                    reason: "send failed".to_string(),
                    timestamp: at,
                }),
                IstEvent::AsyncFailed { reason, .. } => failures.push(SenderFailure {
                    reason: if reason.is_empty() { "send failed".to_string() } else { reason.clone() },
                    timestamp: at,
                }),
                _ => {}
            }
        }

        summary.counts = IstCounts {
            total: ist.len(),
            sender_ranges: ranges.len(),
            async_starts: starts.len(),
            failures: failures.len(),
        };
        summary.sender = IstSender {
            ranges: last_n(ranges, RECENT_SENDER_ENTRIES),
            async_starts: last_n(starts, RECENT_SENDER_ENTRIES),
            failures: last_n(failures, RECENT_SENDER_ENTRIES),
        };
        Some(summary)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    pub total_events: usize,
    pub events_by_type: BTreeMap<EventType, usize>,
    #[serde(with = "timestamp::canonical_opt")]
    pub first_event: Option<Timestamp>,
    #[serde(with = "timestamp::canonical_opt")]
    pub last_event: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub event_type: EventType,
    #[serde(with = "timestamp::canonical")]
    pub timestamp: Timestamp,
    pub node: Option<String>,
    pub severity: Severity,
    pub raw_message: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnknownLines {
    pub count: usize,
    pub samples: Vec<String>,
}

/// Everything the engine computed, in output form.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub cluster_info: ClusterInfo,
    pub software: SoftwareInfo,
    #[serde(serialize_with = "serialize_nodes")]
    pub nodes: BTreeMap<NodeKey, Node>,
    pub views: Vec<ViewSummary>,
    pub health_metrics: HealthMetrics,
    pub health_summary: HealthSummary,
    pub ist_summary: Option<IstSummary>,
    pub st_workflows: Vec<Workflow>,
    pub downtime: DowntimeSummary,
    pub timeline: Timeline,
    pub events: Vec<EventSummary>,
    pub unknown: Option<UnknownLines>,
    pub warnings: Vec<String>,
}

fn is_active(node: &Node) -> bool {
    node.status
        .as_deref()
        .map(|s| s.to_uppercase())
        .is_some_and(|s| s.starts_with("SYNCED") || s.starts_with("DONOR"))
}

/// Unique display labels in arena order. The first node holding a name
/// keeps it; later holders get `name (uuid)`, then a counter if even that
/// is taken.
pub fn node_labels(nodes: &BTreeMap<NodeKey, Node>) -> Vec<(String, &Node)> {
    let mut taken = BTreeSet::new();
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes.values() {
        let mut label = node.name.clone();
        if taken.contains(&label) {
            label = format!("{} ({})", node.name, node.uuid);
        }
        let base = label.clone();
        let mut n = 2;
        while taken.contains(&label) {
            label = format!("{base} #{n}");
            n += 1;
        }
        taken.insert(label.clone());
        out.push((label, node));
    }
    out
}

fn serialize_nodes<S: Serializer>(nodes: &BTreeMap<NodeKey, Node>, s: S) -> Result<S::Ok, S::Error> {
    s.collect_map(node_labels(nodes))
}

impl AnalysisSummary {
    pub fn from_analysis(analysis: &Analysis) -> Self {
        let cluster = &analysis.cluster;
        let nodes = &cluster.nodes;

        let recent_changes = last_n(cluster.group_changes.clone(), RECENT_GROUP_CHANGES);
        let cluster_info = ClusterInfo {
            dialect: analysis.dialect.clone(),
            detected_dialect: analysis.detected_dialect.clone(),
            total_nodes: nodes.live().count(),
            active_nodes: nodes.live().filter(|(_, n)| is_active(n)).count(),
            current_view: cluster.current_view().map(|v| ViewSummary::new(v, nodes)),
            total_views: cluster.views_history.len(),
            group_uuid: cluster.group_uuid.clone(),
            group_seqno: cluster.group_seqno,
            local_state_uuid: cluster.local_state_uuid.clone(),
            local_seqno: cluster.local_seqno,
            node_instance_uuid: cluster.node_instance_uuid.clone(),
            local_node_name: cluster.local_node_name.clone(),
            group_changes: recent_changes,
            uuid_aliases: nodes.aliases().clone(),
            configured_addresses: cluster.configured_addresses.clone(),
        };

        let mut events_by_type = BTreeMap::new();
        for event in &analysis.events {
            *events_by_type.entry(event.event_type()).or_insert(0) += 1;
        }
        let timeline = Timeline {
            total_events: analysis.events.len(),
            events_by_type,
            first_event: analysis.events.iter().map(|e| e.timestamp).min(),
            last_event: analysis.events.iter().map(|e| e.timestamp).max(),
        };

        let events = analysis
            .events
            .iter()
            .map(|e| EventSummary {
                event_type: e.event_type(),
                timestamp: e.timestamp,
                node: e.node.map(|k| nodes.get(k).name.clone()),
                severity: e.severity,
                raw_message: e.raw_message.clone(),
                metadata: serde_json::to_value(&e.payload).unwrap_or(Value::Null),
            })
            .collect();

        let unknown = analysis.report_unknown.then(|| UnknownLines {
            count: analysis.unknown_total,
            samples: analysis.unknown_lines.clone(),
        });

        Self {
            cluster_info,
            software: analysis.software.clone(),
            nodes: nodes.live().map(|(key, node)| (key, node.clone())).collect(),
            views: cluster.views_history.iter().map(|v| ViewSummary::new(v, nodes)).collect(),
            health_metrics: analysis.health.clone(),
            health_summary: HealthSummary::from(&analysis.health),
            ist_summary: IstSummary::build(&analysis.events, nodes),
            st_workflows: analysis.workflows.clone(),
            downtime: DowntimeSummary::from_periods(analysis.downtime.clone()),
            timeline,
            events,
            unknown,
            warnings: analysis.warnings.clone(),
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
