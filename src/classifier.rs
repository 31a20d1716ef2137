//! Line classifier
//!
//! One line in, at most one typed event out. Rolling context (sticky
//! timestamp, an in-progress view block) lives in an explicit
//! [`ParserState`] threaded through every call.
//!
//! Categories are tried in a fixed order and the first match wins:
//! view blocks, state transitions, SST, IST, service lifecycle,
//! communication, errors, warnings, server info.

use regex::{Captures, Regex};
use tracing::debug;

use crate::dialect::{DialectPatterns, PatternCategory, PatternSet};
use crate::identity::AddressSource;
use crate::model::{
    CommunicationIssue, ErrorEvent, EventPayload, IstEvent, ServerInfo, ServiceEvent, SstEvent,
    StateTransition, TransitionReason, ViewFormat, ViewStatus,
};
use crate::timestamp::{self, LineTimestamp, Timestamp};

const CLASSIFICATION_ORDER: [PatternCategory; 8] = [
    PatternCategory::StateTransition,
    PatternCategory::Sst,
    PatternCategory::Ist,
    PatternCategory::Service,
    PatternCategory::Communication,
    PatternCategory::Error,
    PatternCategory::Warning,
    PatternCategory::ServerInfo,
];

lazy_static::lazy_static! {
    static ref STATE_EXCHANGE_FROM: Regex = Regex::new(r"from\s+(\d+)\s+\(([^)]+)\)").unwrap();
    static ref UNKNOWN_FLAVOR: Regex = Regex::new(r"(?i)WSREP|\bIST\b").unwrap();
    static ref SEPARATOR: Regex = Regex::new(r"WSREP:\s*=+\s*$").unwrap();
}

/// Who an event is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// Cluster-level, not tied to one member.
    Cluster,
    /// The node writing the log.
    Local,
    /// A member named in the line.
    Named(String),
    /// A member referenced by (possibly short) UUID.
    Uuid(String),
}

/// A classified line, before node references are resolved.
#[derive(Debug, Clone)]
pub struct Classified {
    pub timestamp: Timestamp,
    pub raw: String,
    pub subject: Subject,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMember {
    pub index: usize,
    pub uuid: String,
    pub name: Option<String>,
}

/// A membership block as read from the log, UUIDs as printed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawView {
    pub view_id: String,
    pub status: ViewStatus,
    pub timestamp: Timestamp,
    pub group_uuid: Option<String>,
    pub protocol_version: Option<i64>,
    pub capabilities: Vec<String>,
    pub members: Vec<RawMember>,
    pub joined: Vec<String>,
    pub left: Vec<String>,
    pub partitioned: Vec<String>,
    pub own_index: Option<i64>,
    pub format: ViewFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Members,
    Joined,
    Left,
    Partitioned,
}

impl Section {
    fn parse(raw: &str) -> Self {
        match raw {
            "members" => Section::Members,
            "joined" => Section::Joined,
            "left" => Section::Left,
            "partitioned" => Section::Partitioned,
            _ => Section::Header,
        }
    }
}

#[derive(Debug, Clone)]
struct ViewAccumulator {
    format: ViewFormat,
    timestamp: Option<Timestamp>,
    view_id: String,
    status: Option<ViewStatus>,
    group_uuid: Option<String>,
    protocol_version: Option<i64>,
    capabilities: Vec<String>,
    members: Vec<RawMember>,
    joined: Vec<String>,
    left: Vec<String>,
    partitioned: Vec<String>,
    own_index: Option<i64>,
    section: Section,
}

impl ViewAccumulator {
    fn new(format: ViewFormat, timestamp: Option<Timestamp>) -> Self {
        Self {
            format,
            timestamp,
            view_id: String::new(),
            status: None,
            group_uuid: None,
            protocol_version: None,
            capabilities: Vec::new(),
            members: Vec::new(),
            joined: Vec::new(),
            left: Vec::new(),
            partitioned: Vec::new(),
            own_index: None,
            section: Section::Header,
        }
    }

    fn add_uuid(&mut self, index: Option<usize>, uuid: String, name: Option<String>) {
        match self.section {
            Section::Joined => self.joined.push(uuid),
            Section::Left => self.left.push(uuid),
            Section::Partitioned => self.partitioned.push(uuid),
            Section::Header | Section::Members => {
                let index = index.unwrap_or(self.members.len());
                self.members.push(RawMember { index, uuid, name });
            }
        }
    }

    fn finish(self) -> Option<RawView> {
        let Some(timestamp) = self.timestamp else {
            debug!(view_id = %self.view_id, "dropping view block without a timestamp");
            return None;
        };
        Some(RawView {
            view_id: self.view_id,
            status: self.status.unwrap_or(ViewStatus::NonPrimary),
            timestamp,
            group_uuid: self.group_uuid,
            protocol_version: self.protocol_version,
            capabilities: self.capabilities,
            members: self.members,
            joined: self.joined,
            left: self.left,
            partitioned: self.partitioned,
            own_index: self.own_index,
            format: self.format,
        })
    }
}

enum Absorb {
    Continue,
    End,
    NotPart,
}

/// Rolling context carried from line to line.
#[derive(Debug, Default)]
pub struct ParserState {
    /// Last valid timestamp seen; applies to lines without one.
    pub current_timestamp: Option<Timestamp>,
    timestamp_invalid: bool,
    last_component: Option<String>,
    view: Option<ViewAccumulator>,
    /// Views flushed since the caller last drained them.
    pub completed_views: Vec<RawView>,
    pub unknown_lines: Vec<String>,
    pub unknown_total: usize,
    /// Matched lines dropped for lack of a usable timestamp.
    pub dropped_events: usize,
}

impl ParserState {
    fn valid_timestamp(&self) -> Option<Timestamp> {
        if self.timestamp_invalid {
            None
        } else {
            self.current_timestamp
        }
    }

    pub fn in_view_block(&self) -> bool {
        self.view.is_some()
    }
}

/// Identity and address facts pulled from a line, independent of its
/// event classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    LocalUuid(String),
    UuidName { uuid: String, name: String },
    LocalAddress { endpoint: String, source: AddressSource },
    PeerAddress { uuid: String, endpoint: String, source: AddressSource },
    ClusterAddresses(Vec<String>),
}

pub struct LineClassifier {
    patterns: DialectPatterns,
    report_unknown: bool,
    unknown_limit: usize,
}

fn text(caps: &Captures<'_>, idx: usize) -> String {
    caps.get(idx)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn opt_text(caps: &Captures<'_>, idx: usize) -> Option<String> {
    caps.get(idx)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn int(caps: &Captures<'_>, idx: usize) -> i64 {
    opt_int(caps, idx).unwrap_or_default()
}

fn opt_int<T: std::str::FromStr>(caps: &Captures<'_>, idx: usize) -> Option<T> {
    caps.get(idx).and_then(|m| m.as_str().trim().parse().ok())
}

fn captures<'l>(set: &PatternSet, name: &str, line: &'l str) -> Option<Captures<'l>> {
    set.get(name).and_then(|re| re.captures(line))
}

impl LineClassifier {
    pub fn new(patterns: DialectPatterns) -> Self {
        Self {
            patterns,
            report_unknown: false,
            unknown_limit: 20,
        }
    }

    pub fn with_unknown_sampling(mut self, enabled: bool, limit: usize) -> Self {
        self.report_unknown = enabled;
        self.unknown_limit = limit;
        self
    }

    pub fn dialect(&self) -> &str {
        self.patterns.name()
    }

    pub fn patterns(&self) -> &DialectPatterns {
        &self.patterns
    }

    /// Classify one line, updating the rolling state.
    pub fn classify(&self, line: &str, state: &mut ParserState) -> Option<Classified> {
        let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
        match timestamp::extract(line) {
            LineTimestamp::Valid(ts) => {
                state.current_timestamp = Some(ts);
                state.timestamp_invalid = false;
            }
            LineTimestamp::Invalid => state.timestamp_invalid = true,
            LineTimestamp::Absent => state.timestamp_invalid = false,
        }
        if self.feed_view(line, state) {
            return None;
        }

        let Some((category, name, caps)) = self.first_match(line) else {
            self.sample_unknown(line, state);
            return None;
        };
        let Some(at) = state.valid_timestamp() else {
            state.dropped_events += 1;
            debug!(category = %category, pattern = name, "dropping event without valid timestamp");
            return None;
        };
        let (subject, payload) = match category {
            PatternCategory::StateTransition => self.transition(name, &caps, at, state),
            PatternCategory::Sst => {
                let event = Self::sst(name, &caps);
                (Self::sst_subject(&event), EventPayload::Sst(event))
            }
            PatternCategory::Ist => (Subject::Local, EventPayload::Ist(Self::ist(name, &caps))),
            PatternCategory::Service => (Subject::Local, EventPayload::Service(Self::service(name, &caps))),
            PatternCategory::Communication => Self::communication(name, &caps),
            PatternCategory::Error => Self::error(name, &caps),
            PatternCategory::Warning => (Subject::Local, EventPayload::Warning),
            _ => Self::server_info(name, &caps, line),
        };
        Some(Classified {
            timestamp: at,
            raw: line.trim().to_string(),
            subject,
            payload,
        })
    }

    /// Flush an open view block at end of input.
    pub fn flush(&self, state: &mut ParserState) {
        if let Some(view) = state.view.take().and_then(ViewAccumulator::finish) {
            state.completed_views.push(view);
        }
    }

    fn first_match<'l>(&self, line: &'l str) -> Option<(PatternCategory, &str, Captures<'l>)> {
        CLASSIFICATION_ORDER.iter().find_map(|category| {
            self.patterns
                .category(*category)
                .first_captures(line)
                .map(|(name, caps)| (*category, name, caps))
        })
    }

    fn sample_unknown(&self, line: &str, state: &mut ParserState) {
        if !self.report_unknown || !UNKNOWN_FLAVOR.is_match(line) || SEPARATOR.is_match(line) {
            return;
        }
        state.unknown_total += 1;
        if state.unknown_lines.len() < self.unknown_limit {
            state.unknown_lines.push(line.trim().to_string());
        }
    }

    /// Returns true when the line belonged to a view block.
    fn feed_view(&self, line: &str, state: &mut ParserState) -> bool {
        let view = self.patterns.category(PatternCategory::View);
        if let Some(mut acc) = state.view.take() {
            match Self::absorb(view, &mut acc, line) {
                Absorb::Continue => {
                    state.view = Some(acc);
                    return true;
                }
                Absorb::End => {
                    state.completed_views.extend(acc.finish());
                    return true;
                }
                Absorb::NotPart => state.completed_views.extend(acc.finish()),
            }
        }

        if view.get("block_open").is_some_and(|re| re.is_match(line)) {
            state.view = Some(ViewAccumulator::new(ViewFormat::Detailed, state.valid_timestamp()));
            return true;
        }
        if let Some(caps) = captures(view, "gcomm_open", line) {
            let mut acc = ViewAccumulator::new(ViewFormat::Gcomm, state.valid_timestamp());
            acc.status = ViewStatus::parse(&text(&caps, 1));
            acc.view_id = text(&caps, 3);
            acc.section = Section::Members;
            state.view = Some(acc);
            return true;
        }
        false
    }

    fn absorb(view: &PatternSet, acc: &mut ViewAccumulator, line: &str) -> Absorb {
        match acc.format {
            ViewFormat::Detailed => {
                if view.get("block_end").is_some_and(|re| re.is_match(line)) {
                    return Absorb::End;
                }
                let Some((name, caps)) = view.first_captures(line) else {
                    return Absorb::NotPart;
                };
                match name {
                    "block_id" => {
                        acc.group_uuid = opt_text(&caps, 1);
                        acc.view_id = text(&caps, 2);
                    }
                    "block_status" => acc.status = ViewStatus::parse(&text(&caps, 1)),
                    "block_protocol" => acc.protocol_version = opt_int(&caps, 1),
                    "block_capabilities" => {
                        acc.capabilities = text(&caps, 1)
                            .split(',')
                            .map(|c| c.trim().to_string())
                            .filter(|c| !c.is_empty())
                            .collect();
                    }
                    "block_final" => {}
                    "block_own_index" => acc.own_index = opt_int(&caps, 1),
                    "block_section" => acc.section = Section::parse(&text(&caps, 1)),
                    "block_member" => {
                        acc.add_uuid(opt_int(&caps, 1), text(&caps, 2), opt_text(&caps, 3))
                    }
                    _ => return Absorb::NotPart,
                }
                Absorb::Continue
            }
            ViewFormat::Gcomm => {
                if view.get("gcomm_end").is_some_and(|re| re.is_match(line)) {
                    return Absorb::End;
                }
                if let Some(caps) = captures(view, "gcomm_section", line) {
                    acc.section = Section::parse(&text(&caps, 1));
                    return Absorb::Continue;
                }
                if let Some(caps) = captures(view, "gcomm_member", line) {
                    acc.add_uuid(None, text(&caps, 1), None);
                    return Absorb::Continue;
                }
                Absorb::NotPart
            }
        }
    }

    fn transition(
        &self,
        name: &str,
        caps: &Captures<'_>,
        at: Timestamp,
        state: &mut ParserState,
    ) -> (Subject, EventPayload) {
        let upper = |idx| text(caps, idx).to_uppercase();
        let (subject, from_state, to_state, sequence_number, reason) = match name {
            "cluster_component" => {
                let to = upper(2);
                let from = state
                    .last_component
                    .replace(to.clone())
                    .unwrap_or_else(|| "UNKNOWN".to_string());
                (Subject::Cluster, from, to, None, TransitionReason::ClusterComponent)
            }
            "restored" => (Subject::Local, upper(1), upper(2), opt_int(caps, 3), TransitionReason::RestoredState),
            "shifting" => (Subject::Local, upper(1), upper(2), opt_int(caps, 3), TransitionReason::ReplicationState),
            "server_status" => (Subject::Local, upper(1), upper(2), None, TransitionReason::ServerStatus),
            _ => (Subject::Local, upper(1), upper(2), None, TransitionReason::ReplicationState),
        };
        let transition = StateTransition {
            node: None,
            from_state,
            to_state,
            timestamp: at,
            sequence_number,
            reason,
        };
        (subject, EventPayload::StateTransition(transition))
    }

    fn sst(name: &str, caps: &Captures<'_>) -> SstEvent {
        match name {
            "requested" => SstEvent::Requested {
                joiner_id: text(caps, 1),
                joiner_name: text(caps, 2),
                requested_donor: text(caps, 3),
                donor_id: text(caps, 4),
                donor_name: text(caps, 5),
                donor_state: text(caps, 6),
            },
            "reject" => SstEvent::Rejected { state: text(caps, 1), wrong_state: false },
            "reject_wrong_state" => SstEvent::Rejected { state: text(caps, 1), wrong_state: true },
            "initiated" => SstEvent::Initiated {
                side: text(caps, 1).to_lowercase(),
                method: text(caps, 2),
                role: text(caps, 3),
                address: text(caps, 4),
            },
            "started" => SstEvent::Started {
                method: text(caps, 1),
                role: text(caps, 2).to_lowercase(),
                detail: text(caps, 3),
            },
            "completed" => SstEvent::Completed {
                method: text(caps, 1),
                role: text(caps, 2).to_lowercase(),
                detail: text(caps, 3),
            },
            "complete_notice" => SstEvent::CompleteNotice {
                direction: text(caps, 1).to_lowercase(),
                peer_id: text(caps, 2),
                peer_name: text(caps, 3),
            },
            "failed_reason" => SstEvent::FailedReason {
                direction: text(caps, 1).to_lowercase(),
                peer_id: text(caps, 2),
                peer_name: text(caps, 3),
                error_code: int(caps, 4),
                reason: opt_text(caps, 5),
            },
            "proceeding" => SstEvent::Proceeding,
            "datadir_cleanup" => SstEvent::DatadirCleanup,
            "stream_wait" => SstEvent::StreamWait,
            "stream_addr" => SstEvent::StreamAddress {
                address: text(caps, 1),
                port: opt_int(caps, 2),
            },
            "sent" => SstEvent::Sent { uuid: text(caps, 1), seqno: int(caps, 2) },
            "failed" => SstEvent::Failed {
                operation: text(caps, 1).to_lowercase(),
                error_code: int(caps, 2),
            },
            "total_time" => SstEvent::TotalTime { seconds: opt_int(caps, 1).unwrap_or_default() },
            "donor_monitor" => SstEvent::DonorMonitor { seconds: opt_int(caps, 1).unwrap_or_default() },
            "status_completed" => SstEvent::Status { status: "completed".to_string() },
            "status_in_progress" => SstEvent::Status { status: "in_progress".to_string() },
            _ => SstEvent::Status { status: "general".to_string() },
        }
    }

    /// Requests and per-peer notices are about the named member.
    fn sst_subject(event: &SstEvent) -> Subject {
        match event {
            SstEvent::Requested { joiner_name, .. } => Subject::Named(joiner_name.clone()),
            SstEvent::CompleteNotice { peer_name, .. } | SstEvent::FailedReason { peer_name, .. } => {
                Subject::Named(peer_name.clone())
            }
            _ => Subject::Local,
        }
    }

    fn ist(name: &str, caps: &Captures<'_>) -> IstEvent {
        match name {
            "recv_addr" => IstEvent::ReceiverAddr { address: text(caps, 1) },
            "recv_bind" => IstEvent::ReceiverBind { address: text(caps, 1) },
            "receiver_prepared" => IstEvent::ReceiverPrepared {
                first_seqno: int(caps, 1),
                last_seqno: int(caps, 2),
                listen_address: text(caps, 3),
            },
            "applying_start" => IstEvent::ApplyingStart { seqno: int(caps, 1) },
            "current_initialized" => IstEvent::CurrentInitialized { seqno: int(caps, 1) },
            "preload_start" => IstEvent::PreloadStart { seqno: int(caps, 1) },
            "eof" => IstEvent::Completed,
            "incomplete" => IstEvent::Incomplete {
                expected_last: int(caps, 1),
                last_received: int(caps, 2),
            },
            "send_failed" => IstEvent::SendFailed,
            "sender_nothing" => IstEvent::SenderNothing,
            "sender_range" => IstEvent::SenderRange {
                first_seqno: int(caps, 1),
                last_seqno: int(caps, 2),
            },
            "async_start" => IstEvent::AsyncStart {
                peer: text(caps, 1),
                first_seqno: int(caps, 2),
                last_seqno: int(caps, 3),
                preload_from: int(caps, 4),
            },
            "async_failed" => IstEvent::AsyncFailed {
                peer: text(caps, 1),
                reason: text(caps, 2),
            },
            "async_served" => IstEvent::AsyncServed,
            _ => IstEvent::Generic,
        }
    }

    fn service(name: &str, caps: &Captures<'_>) -> ServiceEvent {
        match name {
            "starting_version" => ServiceEvent::Starting { version: opt_text(caps, 1), pid: None },
            "starting_process" => ServiceEvent::Starting { version: None, pid: opt_int(caps, 1) },
            "ready" => ServiceEvent::Started,
            "shutdown_initiated" => ServiceEvent::ShutdownInitiated,
            "shutdown_complete" => ServiceEvent::ShutdownComplete,
            "crash" => ServiceEvent::Crash { signal: opt_int(caps, 1).unwrap_or_default() },
            _ => ServiceEvent::Starting { version: None, pid: None },
        }
    }

    fn communication(name: &str, caps: &Captures<'_>) -> (Subject, EventPayload) {
        let (subject, issue) = match name {
            "aborted_connection" => (
                Subject::Local,
                CommunicationIssue::AbortedConnection {
                    connection_id: opt_int(caps, 1).unwrap_or_default(),
                    db: text(caps, 2),
                    user: text(caps, 3),
                    host: text(caps, 4),
                },
            ),
            "channel_open_failed" => (
                Subject::Local,
                CommunicationIssue::ChannelOpenFailed {
                    channel: text(caps, 1),
                    address: text(caps, 2),
                    error_code: int(caps, 3),
                    reason: text(caps, 4),
                },
            ),
            "suspecting" => (
                Subject::Uuid(text(caps, 1)),
                CommunicationIssue::Suspecting { peer: text(caps, 1) },
            ),
            "inactive" => (Subject::Cluster, CommunicationIssue::Inactive),
            "peer_timeout" => (
                Subject::Uuid(text(caps, 1)),
                CommunicationIssue::PeerTimeout {
                    peer: text(caps, 1),
                    address: text(caps, 2),
                },
            ),
            "generic_network" => (Subject::Cluster, CommunicationIssue::Generic { kind: "network".to_string() }),
            "generic_protocol" => (Subject::Cluster, CommunicationIssue::Generic { kind: "protocol".to_string() }),
            _ => (Subject::Cluster, CommunicationIssue::Generic { kind: "other".to_string() }),
        };
        (subject, EventPayload::Communication(issue))
    }

    fn error(name: &str, caps: &Captures<'_>) -> (Subject, EventPayload) {
        match name {
            "identity_mismatch" => (
                Subject::Uuid(text(caps, 1)),
                EventPayload::Error(ErrorEvent::IdentityMismatch { uuid: text(caps, 1) }),
            ),
            _ => {
                let level = opt_text(caps, 1)
                    .map(|l| l.to_uppercase())
                    .unwrap_or_else(|| "ERROR".to_string());
                (Subject::Local, EventPayload::Error(ErrorEvent::Generic { level }))
            }
        }
    }

    fn server_info(name: &str, caps: &Captures<'_>, line: &str) -> (Subject, EventPayload) {
        let mut subject = Subject::Cluster;
        let info = match name {
            "first_view" => ServerInfo::FirstView {
                group_uuid: text(caps, 1),
                my_uuid: text(caps, 2),
            },
            "group_change" => ServerInfo::GroupChange { from: text(caps, 1), to: text(caps, 2) },
            "group_state" => ServerInfo::GroupState { uuid: text(caps, 1), seqno: int(caps, 2) },
            "local_state" => ServerInfo::LocalState { uuid: text(caps, 1), seqno: int(caps, 2) },
            "provider_paused" => ServerInfo::ProviderPaused { uuid: text(caps, 1), seqno: int(caps, 2) },
            "provider_resuming" => ServerInfo::ProviderResuming { seqno: int(caps, 1) },
            "provider_resumed" => ServerInfo::ProviderResumed,
            "processing_cc" => ServerInfo::ProcessingCc {
                conf_id: int(caps, 1),
                ordering: text(caps, 2).to_lowercase(),
            },
            "skipping_cc" => ServerInfo::SkippingCc {
                conf_id: int(caps, 1),
                keep_in_cache: text(caps, 2).eq_ignore_ascii_case("true"),
            },
            "state_exchange" => {
                let from = STATE_EXCHANGE_FROM.captures(line);
                ServerInfo::StateExchange {
                    direction: text(caps, 1).to_lowercase(),
                    kind: text(caps, 2).to_lowercase(),
                    uuid: text(caps, 3),
                    from_index: from.as_ref().and_then(|c| opt_int(c, 1)),
                    from_name: from.as_ref().and_then(|c| opt_text(c, 2)),
                }
            }
            "flow_control_interval" => ServerInfo::FlowControlInterval { low: int(caps, 1), high: int(caps, 2) },
            "fc_message" => ServerInfo::FlowControl {
                message: text(caps, 1).to_uppercase(),
                local_seqno: int(caps, 2),
                fc_offset: int(caps, 3),
                result: int(caps, 4),
            },
            "replication_paused" => ServerInfo::ReplicationPaused,
            "sync_sending" => ServerInfo::SyncSending,
            "sync_not_sending" => ServerInfo::SyncNotSending,
            "become_joined" => ServerInfo::BecomeJoined { fc_offset: int(caps, 1) },
            "become_synced" => ServerInfo::BecomeSynced { fc_offset: int(caps, 1) },
            "received_non_primary" => ServerInfo::ReceivedNonPrimary,
            "received_self_leave" => ServerInfo::ReceivedSelfLeave,
            "channel_opened" => ServerInfo::ChannelOpened { channel: text(caps, 1) },
            "recv_thread_exit" => ServerInfo::RecvThreadExit,
            "server_synced" => {
                subject = Subject::Local;
                ServerInfo::ServerSynced { name: text(caps, 1) }
            }
            "member_status" => {
                subject = Subject::Named(text(caps, 2));
                ServerInfo::MemberStatus {
                    member_id: text(caps, 1),
                    name: text(caps, 2),
                    status: text(caps, 3).to_lowercase(),
                }
            }
            "quorum_results" => ServerInfo::QuorumResults {
                version: int(caps, 1),
                component: text(caps, 2).to_uppercase(),
                conf_id: int(caps, 3),
                members: int(caps, 4),
                total: int(caps, 5),
            },
            "version_banner" => ServerInfo::VersionBanner {
                version: opt_text(caps, 1).or_else(|| opt_text(caps, 2)).unwrap_or_default(),
            },
            _ => ServerInfo::Generic,
        };
        (subject, EventPayload::ServerInfo(info))
    }

    /// Identity and address evidence carried by a line.
    pub fn extract_evidence(&self, line: &str) -> Vec<Evidence> {
        let ids = self.patterns.category(PatternCategory::Identity);
        let view = self.patterns.category(PatternCategory::View);
        let mut out = Vec::new();

        if let Some(caps) = captures(ids, "my_uuid", line) {
            out.push(Evidence::LocalUuid(text(&caps, 1)));
        }
        let is_view_row = view.get("block_member").is_some_and(|re| re.is_match(line));
        if !is_view_row {
            if let Some(re) = ids.get("uuid_name") {
                for caps in re.captures_iter(line) {
                    out.push(Evidence::UuidName {
                        uuid: text(&caps, 1),
                        name: text(&caps, 2),
                    });
                }
            }
        }

        if let Some(caps) = captures(ids, "self_listening", line) {
            out.push(Evidence::LocalAddress {
                endpoint: text(&caps, 2),
                source: AddressSource::ListeningAt,
            });
        } else if let Some(caps) = captures(ids, "listening", line) {
            out.push(Evidence::LocalAddress {
                endpoint: text(&caps, 1),
                source: AddressSource::ListeningAt,
            });
        }
        for name in ["connection_established", "declaring_stable", "forgetting"] {
            if let Some(caps) = captures(ids, name, line) {
                out.push(Evidence::PeerAddress {
                    uuid: text(&caps, 1),
                    endpoint: text(&caps, 2),
                    source: AddressSource::PeerConnection,
                });
            }
        }
        if let Some(caps) = captures(ids, "node_address_config", line) {
            out.push(Evidence::LocalAddress {
                endpoint: text(&caps, 1),
                source: AddressSource::ClusterConfig,
            });
        }
        if let Some(caps) = captures(ids, "cluster_address_config", line) {
            let peers: Vec<String> = text(&caps, 1)
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            if !peers.is_empty() {
                out.push(Evidence::ClusterAddresses(peers));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PatternRegistry;

    fn classifier() -> LineClassifier {
        let registry = PatternRegistry::new().unwrap();
        LineClassifier::new(registry.resolve("galera"))
    }

    fn run(lines: &[&str]) -> (Vec<Classified>, ParserState) {
        let c = classifier();
        let mut state = ParserState::default();
        let events = lines.iter().filter_map(|l| c.classify(l, &mut state)).collect();
        c.flush(&mut state);
        (events, state)
    }

    #[test]
    fn test_sst_failure_wins_over_error_and_warning() {
        let (events, _) = run(&[
            "2025-09-15 13:46:10 0 [ERROR] WSREP: SST receiving failed: -125",
        ]);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].payload,
            EventPayload::Sst(SstEvent::Failed { error_code: -125, .. })
        ));
    }

    #[test]
    fn test_transition_attributed_to_local() {
        let (events, _) = run(&[
            "2025-09-15 13:45:56 0 [Note] WSREP: Shifting SYNCED -> DONOR/DESYNCED (TO: 1625)",
        ]);
        let EventPayload::StateTransition(t) = &events[0].payload else {
            panic!("expected transition");
        };
        assert_eq!(t.from_state, "SYNCED");
        assert_eq!(t.to_state, "DONOR/DESYNCED");
        assert_eq!(t.sequence_number, Some(1625));
        assert_eq!(events[0].subject, Subject::Local);
    }

    #[test]
    fn test_cluster_component_tracks_previous_state() {
        let (events, _) = run(&[
            "2025-09-15 13:45:50 0 [Note] WSREP: Node 378c0ec7-a3db state prim",
            "2025-09-15 13:50:50 0 [Note] WSREP: Node 378c0ec7-a3db state non_prim",
        ]);
        let EventPayload::StateTransition(t) = &events[1].payload else {
            panic!("expected transition");
        };
        assert_eq!(t.from_state, "PRIM");
        assert_eq!(t.to_state, "NON_PRIM");
        assert_eq!(t.reason, TransitionReason::ClusterComponent);
        assert_eq!(events[1].subject, Subject::Cluster);
    }

    #[test]
    fn test_detailed_view_block() {
        let (events, state) = run(&[
            "2025-09-15 13:45:50 0 [Note] WSREP: ================================================",
            "View:",
            "  id: 9a4c1b2e-9221-11f0-8f3a-2b7c4d5e6f70:5",
            "  status: primary",
            "  protocol_version: 4",
            "  capabilities: MULTI-MASTER, CERTIFICATION, PARALLEL_APPLYING",
            "  final: no",
            "  own_index: 0",
            "  members(2):",
            "\t0: 378c0ec7-9221-11f0-a3db-8e2d5b0f3a12, db1",
            "\t1: 5b1c2d3e-9221-11f0-b4ec-1a2b3c4d5e6f, db2",
            "=================================================",
            "2025-09-15 13:45:51 0 [Note] WSREP: Server status change connected -> joiner",
        ]);
        assert_eq!(state.completed_views.len(), 1);
        let view = &state.completed_views[0];
        assert_eq!(view.view_id, "5");
        assert_eq!(view.status, ViewStatus::Primary);
        assert_eq!(view.protocol_version, Some(4));
        assert_eq!(view.capabilities.len(), 3);
        assert_eq!(view.own_index, Some(0));
        assert_eq!(view.group_uuid.as_deref(), Some("9a4c1b2e-9221-11f0-8f3a-2b7c4d5e6f70"));
        assert_eq!(view.members[1].name.as_deref(), Some("db2"));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_gcomm_view_block_flushes_on_terminator() {
        let (_, state) = run(&[
            "2025-09-15 13:45:50 0 [Note] WSREP: view(view_id(NON_PRIM,378c0ec7-a3db,7) memb {",
            "\t378c0ec7-a3db,0",
            "} joined {",
            "} left {",
            "\t5b1c2d3e-b4ec,0",
            "} partitioned {",
            "})",
        ]);
        let view = &state.completed_views[0];
        assert_eq!(view.status, ViewStatus::NonPrimary);
        assert_eq!(view.view_id, "7");
        assert_eq!(view.members.len(), 1);
        assert_eq!(view.left, vec!["5b1c2d3e-b4ec".to_string()]);
        assert_eq!(view.format, ViewFormat::Gcomm);
    }

    #[test]
    fn test_unterminated_view_flushes_on_other_line_and_at_end() {
        let (events, state) = run(&[
            "2025-09-15 13:45:50 0 [Note] WSREP: view(view_id(PRIM,378c0ec7-a3db,3) memb {",
            "\t378c0ec7-a3db,0",
            "2025-09-15 13:45:52 0 [Note] WSREP: Shifting JOINED -> SYNCED (TO: 10)",
            "View:",
            "  status: non-primary",
        ]);
        assert_eq!(events.len(), 1);
        assert_eq!(state.completed_views.len(), 2);
        assert_eq!(state.completed_views[1].status, ViewStatus::NonPrimary);
    }

    #[test]
    fn test_sticky_and_invalid_timestamps() {
        let (events, state) = run(&[
            "2025-09-15 13:45:50 0 [Note] WSREP: Provider resumed.",
            "WSREP: Shifting JOINED -> SYNCED (TO: 10)",
            "2025-13-45 13:45:50 0 [Note] WSREP: Shifting SYNCED -> DONOR/DESYNCED (TO: 11)",
        ]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].timestamp, events[0].timestamp);
        assert_eq!(state.dropped_events, 1);
        assert_eq!(
            timestamp::format(&state.current_timestamp.unwrap()),
            "2025-09-15 13:45:50"
        );
    }

    #[test]
    fn test_unknown_lines_sampled_and_capped() {
        let registry = PatternRegistry::new().unwrap();
        let c = LineClassifier::new(registry.resolve("galera")).with_unknown_sampling(true, 2);
        let mut state = ParserState::default();
        for i in 0..5 {
            let line = format!("2025-09-15 13:45:5{i} 0 [Note] WSREP: gcs_core_open ok {i}");
            assert!(c.classify(&line, &mut state).is_none());
        }
        c.classify("2025-09-15 13:46:00 0 [Note] InnoDB: buffer pool", &mut state);
        assert_eq!(state.unknown_lines.len(), 2);
        assert_eq!(state.unknown_total, 5);
    }

    #[test]
    fn test_unknown_sampling_keeps_only_flavoured_lines() {
        let registry = PatternRegistry::new().unwrap();
        let lines = [
            "2025-09-15 13:45:50 0 [Note] IST handshake queued for joiner 3  ",
            "2025-09-15 13:45:51 0 [Note] InnoDB: buffer pool dump",
            "2025-09-15 13:45:52 0 [Note] WSREP: gcs_core_open ok",
            "2025-09-15 13:45:53 0 [Note] WSREP: ==========",
            "2025-09-15 13:45:54 0 [Note] WSREP: gcs_core_close ok",
        ];

        let c = LineClassifier::new(registry.resolve("galera")).with_unknown_sampling(true, 2);
        let mut state = ParserState::default();
        for line in lines {
            assert!(c.classify(line, &mut state).is_none());
        }
        assert_eq!(state.unknown_total, 3);
        assert_eq!(
            state.unknown_lines,
            vec![
                "2025-09-15 13:45:50 0 [Note] IST handshake queued for joiner 3".to_string(),
                "2025-09-15 13:45:52 0 [Note] WSREP: gcs_core_open ok".to_string(),
            ]
        );

        let off = LineClassifier::new(registry.resolve("galera"));
        let mut state = ParserState::default();
        for line in lines {
            off.classify(line, &mut state);
        }
        assert_eq!(state.unknown_total, 0);
        assert!(state.unknown_lines.is_empty());
    }

    #[test]
    fn test_shell_prompt_does_not_rename_local_events() {
        let (events, _) = run(&[
            "admin@db3:~$ tail -f /var/log/mysql/error.log",
            "2025-09-15 13:45:55 0 [Note] WSREP: Shifting JOINED -> SYNCED (TO: 10)",
        ]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject, Subject::Local);
    }

    #[test]
    fn test_requested_names_joiner() {
        let (events, _) = run(&[
            "2025-09-15 13:45:55 0 [Note] WSREP: Member 1.0 (db2) requested state transfer from '*any*'. Selected 0.0 (db1)(SYNCED) as donor.",
        ]);
        assert_eq!(events[0].subject, Subject::Named("db2".into()));
        let EventPayload::Sst(SstEvent::Requested { donor_name, donor_state, .. }) = &events[0].payload else {
            panic!("expected request");
        };
        assert_eq!(donor_name, "db1");
        assert_eq!(donor_state, "SYNCED");
    }

    #[test]
    fn test_server_info_state_exchange_from() {
        let (events, _) = run(&[
            "2025-09-15 13:45:50 0 [Note] WSREP: STATE EXCHANGE: got state msg: 9a4c1b2e-9221-11f0-8f3a-2b7c4d5e6f70 from 1 (db2)",
            "2025-09-15 13:45:50 0 [Note] WSREP: STATE_EXCHANGE: got state msg: 9a4c1b2e-9221-11f0-8f3a-2b7c4d5e6f70 from 1 (db2)",
        ]);
        let last = events.last().unwrap();
        let EventPayload::ServerInfo(ServerInfo::StateExchange { from_name, from_index, .. }) = &last.payload else {
            panic!("expected state exchange");
        };
        assert_eq!(from_name.as_deref(), Some("db2"));
        assert_eq!(*from_index, Some(1));
    }

    #[test]
    fn test_evidence_extraction() {
        let c = classifier();
        let ev = c.extract_evidence(
            "2025-09-15 13:45:49 0 [Note] WSREP: (378c0ec7-a3db, 'tcp://0.0.0.0:4567') connection established to 5b1c2d3e-b4ec tcp://10.0.0.2:4567",
        );
        assert!(ev.contains(&Evidence::PeerAddress {
            uuid: "5b1c2d3e-b4ec".into(),
            endpoint: "10.0.0.2:4567".into(),
            source: AddressSource::PeerConnection,
        }));

        let ev = c.extract_evidence("2025-09-15 13:45:48 0 [Note] WSREP: (378c0ec7-a3db, 'tcp://0.0.0.0:4567') listening at tcp://10.0.0.1:4567");
        assert_eq!(
            ev,
            vec![Evidence::LocalAddress {
                endpoint: "10.0.0.1:4567".into(),
                source: AddressSource::ListeningAt
            }]
        );

        let ev = c.extract_evidence("\t0: 378c0ec7-9221-11f0-a3db-8e2d5b0f3a12, db1");
        assert!(ev.is_empty());

        let ev = c.extract_evidence("2025-09-15 13:45:47 0 [Note] WSREP: My UUID: 378c0ec7-9221-11f0-a3db-8e2d5b0f3a12");
        assert_eq!(ev, vec![Evidence::LocalUuid("378c0ec7-9221-11f0-a3db-8e2d5b0f3a12".into())]);
    }
}
