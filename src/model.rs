//! Entity model: nodes, views, transitions and typed log events
//!
//! Nodes live in a single arena (`identity::NodeTable`); views, transitions
//! and events refer to them by `NodeKey`, so a name or address resolved late
//! shows up everywhere the node is referenced.

use serde::Serialize;

use crate::identity::NodeTable;
use crate::timestamp::{self, Timestamp};

/// Stable index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeKey(pub usize);

/// One logical cluster member.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    /// Current best-known UUID (full, short, or synthetic).
    pub uuid: String,
    pub name: String,
    /// Cluster-assigned "index.segment" position.
    pub node_id: Option<String>,
    pub address: Option<String>,
    /// Last known replication state (SYNCED, DONOR, JOINER, ...).
    pub status: Option<String>,
    /// UUIDs this node held before its current one, oldest first.
    pub uuid_history: Vec<String>,
    /// True while the name is not backed by any evidence.
    pub placeholder: bool,
    #[serde(skip)]
    pub merged_into: Option<NodeKey>,
}

impl Node {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            node_id: None,
            address: None,
            status: None,
            uuid_history: Vec::new(),
            placeholder: true,
            merged_into: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ViewStatus {
    #[serde(rename = "primary")]
    Primary,
    #[serde(rename = "non-primary")]
    NonPrimary,
    #[serde(rename = "disconnected")]
    Disconnected,
}

impl ViewStatus {
    /// Parse both the detailed-block spelling and the gcomm one.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "primary" | "prim" => Some(ViewStatus::Primary),
            "non-primary" | "non_prim" | "nonprimary" => Some(ViewStatus::NonPrimary),
            "disconnected" => Some(ViewStatus::Disconnected),
            _ => None,
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, ViewStatus::Primary)
    }
}

/// Which log shape a view was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewFormat {
    Detailed,
    Gcomm,
}

#[derive(Debug, Clone)]
pub struct ViewMember {
    pub index: usize,
    /// UUID exactly as printed in the view (may be a short form).
    pub observed_uuid: String,
    pub name: Option<String>,
    pub node: NodeKey,
}

/// A membership snapshot.
#[derive(Debug, Clone)]
pub struct ClusterView {
    pub view_id: String,
    pub status: ViewStatus,
    pub timestamp: Timestamp,
    pub protocol_version: Option<i64>,
    pub capabilities: Vec<String>,
    pub members: Vec<ViewMember>,
    pub joined: Vec<String>,
    pub left: Vec<String>,
    pub partitioned: Vec<String>,
    pub own_index: Option<i64>,
    pub format: ViewFormat,
}

impl ClusterView {
    /// Sorted canonical member UUIDs, used for collapse comparison.
    pub fn member_uuids(&self, nodes: &NodeTable) -> Vec<String> {
        let mut uuids: Vec<String> = self
            .members
            .iter()
            .map(|m| nodes.get(m.node).uuid.clone())
            .collect();
        uuids.sort();
        uuids.dedup();
        uuids
    }

    /// The local node's entry, when `own_index` points at one.
    pub fn own_member(&self) -> Option<&ViewMember> {
        let idx = usize::try_from(self.own_index?).ok()?;
        self.members.iter().find(|m| m.index == idx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// Primary/non-primary component change, not tied to one member.
    ClusterComponent,
    ReplicationState,
    RestoredState,
    ServerStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    #[serde(skip)]
    pub node: Option<NodeKey>,
    pub from_state: String,
    pub to_state: String,
    #[serde(with = "timestamp::canonical")]
    pub timestamp: Timestamp,
    pub sequence_number: Option<i64>,
    pub reason: TransitionReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ServerInfo,
    ClusterView,
    StateTransition,
    SstEvent,
    IstEvent,
    CommunicationIssue,
    ServiceEvent,
    Warning,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ServerInfo => "server_info",
            EventType::ClusterView => "cluster_view",
            EventType::StateTransition => "state_transition",
            EventType::SstEvent => "sst_event",
            EventType::IstEvent => "ist_event",
            EventType::CommunicationIssue => "communication_issue",
            EventType::ServiceEvent => "service_event",
            EventType::Warning => "warning",
            EventType::Error => "error",
        }
    }
}

/// Server/provider bookkeeping lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ServerInfo {
    FirstView { group_uuid: String, my_uuid: String },
    GroupChange { from: String, to: String },
    GroupState { uuid: String, seqno: i64 },
    LocalState { uuid: String, seqno: i64 },
    ProviderPaused { uuid: String, seqno: i64 },
    ProviderResuming { seqno: i64 },
    ProviderResumed,
    ProcessingCc { conf_id: i64, ordering: String },
    SkippingCc { conf_id: i64, keep_in_cache: bool },
    StateExchange {
        direction: String,
        kind: String,
        uuid: String,
        from_index: Option<i64>,
        from_name: Option<String>,
    },
    FlowControlInterval { low: i64, high: i64 },
    FlowControl { message: String, local_seqno: i64, fc_offset: i64, result: i64 },
    ReplicationPaused,
    SyncSending,
    SyncNotSending,
    BecomeJoined { fc_offset: i64 },
    BecomeSynced { fc_offset: i64 },
    ReceivedNonPrimary,
    ReceivedSelfLeave,
    ChannelOpened { channel: String },
    RecvThreadExit,
    ServerSynced { name: String },
    MemberStatus { member_id: String, name: String, status: String },
    QuorumResults { version: i64, component: String, conf_id: i64, members: i64, total: i64 },
    VersionBanner { version: String },
    Generic,
}

/// Full-resync (SST) lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum SstEvent {
    Requested {
        joiner_id: String,
        joiner_name: String,
        requested_donor: String,
        donor_id: String,
        donor_name: String,
        donor_state: String,
    },
    Rejected { state: String, wrong_state: bool },
    Initiated { side: String, method: String, role: String, address: String },
    Started { method: String, role: String, detail: String },
    Completed { method: String, role: String, detail: String },
    CompleteNotice { direction: String, peer_id: String, peer_name: String },
    FailedReason {
        direction: String,
        peer_id: String,
        peer_name: String,
        error_code: i64,
        reason: Option<String>,
    },
    Proceeding,
    DatadirCleanup,
    StreamWait,
    StreamAddress { address: String, port: Option<u16> },
    Sent { uuid: String, seqno: i64 },
    Failed { operation: String, error_code: i64 },
    TotalTime { seconds: u64 },
    DonorMonitor { seconds: u64 },
    Status { status: String },
}

/// Incremental catch-up (IST) lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum IstEvent {
    ReceiverAddr { address: String },
    ReceiverBind { address: String },
    ReceiverPrepared { first_seqno: i64, last_seqno: i64, listen_address: String },
    ApplyingStart { seqno: i64 },
    CurrentInitialized { seqno: i64 },
    PreloadStart { seqno: i64 },
    Completed,
    Incomplete { expected_last: i64, last_received: i64 },
    SendFailed,
    SenderNothing,
    SenderRange { first_seqno: i64, last_seqno: i64 },
    AsyncStart { peer: String, first_seqno: i64, last_seqno: i64, preload_from: i64 },
    AsyncFailed { peer: String, reason: String },
    AsyncServed,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum CommunicationIssue {
    AbortedConnection { connection_id: u64, db: String, user: String, host: String },
    ChannelOpenFailed { channel: String, address: String, error_code: i64, reason: String },
    Suspecting { peer: String },
    Inactive,
    PeerTimeout { peer: String, address: String },
    Generic { kind: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ServiceEvent {
    Starting { version: Option<String>, pid: Option<u32> },
    Started,
    ShutdownInitiated,
    ShutdownComplete,
    Crash { signal: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ErrorEvent {
    /// The log says a node's UUID is missing from the view it should be in.
    IdentityMismatch { uuid: String },
    /// Two equally trusted sources disagree on a node's name.
    IdentityConflict { uuid: String, existing: String, candidate: String, weight: u8 },
    Generic { level: String },
}

/// Category payload of a log event.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    ServerInfo(ServerInfo),
    ClusterView {
        view_id: String,
        status: ViewStatus,
        member_count: usize,
    },
    StateTransition(StateTransition),
    Sst(SstEvent),
    Ist(IstEvent),
    Communication(CommunicationIssue),
    Service(ServiceEvent),
    Warning,
    Error(ErrorEvent),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::ServerInfo(_) => EventType::ServerInfo,
            EventPayload::ClusterView { .. } => EventType::ClusterView,
            EventPayload::StateTransition(_) => EventType::StateTransition,
            EventPayload::Sst(_) => EventType::SstEvent,
            EventPayload::Ist(_) => EventType::IstEvent,
            EventPayload::Communication(_) => EventType::CommunicationIssue,
            EventPayload::Service(_) => EventType::ServiceEvent,
            EventPayload::Warning => EventType::Warning,
            EventPayload::Error(_) => EventType::Error,
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            EventPayload::Error(ErrorEvent::IdentityMismatch { .. })
            | EventPayload::Error(ErrorEvent::IdentityConflict { .. }) => Severity::Critical,
            EventPayload::Error(_)
            | EventPayload::Service(ServiceEvent::Crash { .. })
            | EventPayload::Sst(SstEvent::Failed { .. })
            | EventPayload::Sst(SstEvent::FailedReason { .. }) => Severity::High,
            EventPayload::Warning
            | EventPayload::Communication(_)
            | EventPayload::Ist(IstEvent::Incomplete { .. })
            | EventPayload::Ist(IstEvent::SendFailed)
            | EventPayload::Ist(IstEvent::AsyncFailed { .. }) => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

/// The generic parsed unit. Events are kept in discovery order.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: Timestamp,
    pub raw_message: String,
    pub node: Option<NodeKey>,
    pub severity: Severity,
    pub payload: EventPayload,
}

impl LogEvent {
    pub fn new(timestamp: Timestamp, raw_message: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            timestamp,
            raw_message: raw_message.into(),
            node: None,
            severity: payload.default_severity(),
            payload,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupChange {
    #[serde(with = "timestamp::canonical")]
    pub timestamp: Timestamp,
    pub from: String,
    pub to: String,
}

/// Everything known about the cluster as seen from one node's log.
#[derive(Debug, Default)]
pub struct Cluster {
    pub nodes: NodeTable,
    /// Chronological, collapsed after finalization.
    pub views_history: Vec<ClusterView>,
    pub group_uuid: Option<String>,
    pub group_seqno: Option<i64>,
    pub local_state_uuid: Option<String>,
    pub local_seqno: Option<i64>,
    pub node_instance_uuid: Option<String>,
    pub local_node_name: Option<String>,
    pub group_changes: Vec<GroupChange>,
    /// Peer list from `wsrep_cluster_address`.
    pub configured_addresses: Vec<String>,
}

impl Cluster {
    pub fn current_view(&self) -> Option<&ClusterView> {
        self.views_history.last()
    }

    /// Latest view carrying member indices, for resolving "Member N.S" ids.
    pub fn member_at_index(&self, index: usize) -> Option<NodeKey> {
        self.views_history
            .iter()
            .rev()
            .find(|v| !v.members.is_empty())
            .and_then(|v| v.members.iter().find(|m| m.index == index))
            .map(|m| m.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_status_parses_both_spellings() {
        assert_eq!(ViewStatus::parse("primary"), Some(ViewStatus::Primary));
        assert_eq!(ViewStatus::parse("PRIM"), Some(ViewStatus::Primary));
        assert_eq!(ViewStatus::parse("NON_PRIM"), Some(ViewStatus::NonPrimary));
        assert_eq!(ViewStatus::parse("non-primary"), Some(ViewStatus::NonPrimary));
        assert_eq!(ViewStatus::parse("weird"), None);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(
            [Severity::Medium, Severity::Critical, Severity::Low].iter().max(),
            Some(&Severity::Critical)
        );
    }

    #[test]
    fn test_default_severity_by_payload() {
        let conflict = EventPayload::Error(ErrorEvent::IdentityConflict {
            uuid: "u".into(),
            existing: "a".into(),
            candidate: "b".into(),
            weight: 70,
        });
        assert_eq!(conflict.default_severity(), Severity::Critical);
        assert_eq!(EventPayload::Warning.default_severity(), Severity::Medium);
        assert_eq!(
            EventPayload::Error(ErrorEvent::Generic { level: "ERROR".into() }).default_severity(),
            Severity::High
        );
        assert_eq!(
            EventPayload::Ist(IstEvent::ApplyingStart { seqno: 3 }).default_severity(),
            Severity::Low
        );
    }

    #[test]
    fn test_payload_serializes_with_subtype_tag() {
        let payload = EventPayload::Sst(SstEvent::Failed {
            operation: "receiving".into(),
            error_code: -125,
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["subtype"], "failed");
        assert_eq!(json["error_code"], -125);
        assert_eq!(payload.event_type().as_str(), "sst_event");
    }

    #[test]
    fn test_own_member_lookup() {
        let view = ClusterView {
            view_id: "5".into(),
            status: ViewStatus::Primary,
            timestamp: timestamp::parse_canonical("2025-09-15 13:45:56").unwrap(),
            protocol_version: Some(4),
            capabilities: Vec::new(),
            members: vec![ViewMember {
                index: 1,
                observed_uuid: "abc".into(),
                name: Some("db2".into()),
                node: NodeKey(7),
            }],
            joined: Vec::new(),
            left: Vec::new(),
            partitioned: Vec::new(),
            own_index: Some(1),
            format: ViewFormat::Detailed,
        };
        assert_eq!(view.own_member().map(|m| m.node), Some(NodeKey(7)));
    }
}
