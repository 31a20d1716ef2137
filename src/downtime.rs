//! Downtime analyzer
//!
//! Three detectors over the finalized timeline, then one merge pass:
//! - silence: gaps of at least five minutes between consecutive events,
//!   unless either side is recovery chatter (state transfer, reconnects)
//! - non-primary: from a view losing primary to the next primary view
//! - restart: a local shutdown or close paired with the next return to an
//!   operating state, at most an hour later
//!
//! Periods closer than a minute to each other are merged.

use std::collections::BTreeMap;

use chrono::Duration;
use regex::Regex;
use serde::Serialize;

use crate::model::{
    ClusterView, EventPayload, EventType, LogEvent, ServiceEvent, Severity, TransitionReason,
};
use crate::timestamp::{self, Timestamp};

pub const SILENCE_THRESHOLD: i64 = 300;
pub const RESTART_CEILING: i64 = 3600;
pub const MERGE_GAP: i64 = 60;

const DOWN_STATES: &[&str] = &["CLOSED", "DESTROYED", "DISCONNECTING", "DISCONNECTED"];
const OPERATING_STATES: &[&str] = &["CONNECTED", "JOINER", "JOINED", "SYNCED", "DONOR", "PRIMARY"];

lazy_static::lazy_static! {
    static ref RECOVERY: Regex = Regex::new(
        r"(?i)\b(sst|ist|state transfer|resync|catch[- ]?up|reconnect\w*|recover\w*|rejoin\w*)\b"
    ).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapType {
    NoActivity,
    NoPrimary,
    NodeRestart,
    Merged,
}

impl GapType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapType::NoActivity => "no_activity",
            GapType::NoPrimary => "no_primary",
            GapType::NodeRestart => "node_restart",
            GapType::Merged => "merged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DowntimePeriod {
    #[serde(with = "timestamp::canonical")]
    pub start_time: Timestamp,
    #[serde(with = "timestamp::canonical")]
    pub end_time: Timestamp,
    pub duration_seconds: i64,
    pub gap_type: GapType,
    pub description: String,
    pub severity: Severity,
}

impl DowntimePeriod {
    pub fn new(start_time: Timestamp, end_time: Timestamp, gap_type: GapType, description: impl Into<String>) -> Self {
        let duration_seconds = (end_time - start_time).num_seconds();
        Self {
            start_time,
            end_time,
            duration_seconds,
            gap_type,
            description: description.into(),
            severity: severity_for(duration_seconds),
        }
    }
}

/// Under 15 minutes low, under an hour medium, under four hours high.
pub fn severity_for(duration_seconds: i64) -> Severity {
    match duration_seconds {
        d if d < 15 * 60 => Severity::Low,
        d if d < 60 * 60 => Severity::Medium,
        d if d < 4 * 60 * 60 => Severity::High,
        _ => Severity::Critical,
    }
}

fn is_recovery(event: &LogEvent) -> bool {
    matches!(event.event_type(), EventType::SstEvent | EventType::IstEvent) || RECOVERY.is_match(&event.raw_message)
}

fn base_state(state: &str) -> &str {
    state.split('/').next().unwrap_or(state)
}

/// Gaps between consecutive events, in timestamp order.
pub fn silence_gaps(events: &[LogEvent]) -> Vec<DowntimePeriod> {
    let mut ordered: Vec<&LogEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.timestamp);
    ordered
        .windows(2)
        .filter_map(|pair| {
            let (before, after) = (pair[0], pair[1]);
            let gap = (after.timestamp - before.timestamp).num_seconds();
            if gap < SILENCE_THRESHOLD || is_recovery(before) || is_recovery(after) {
                return None;
            }
            Some(DowntimePeriod::new(
                before.timestamp,
                after.timestamp,
                GapType::NoActivity,
                format!("no log activity for {}", human_duration(gap)),
            ))
        })
        .collect()
}

/// Spans without a primary component. An interval never closed runs to
/// `last_seen`.
pub fn non_primary_intervals(views: &[ClusterView], last_seen: Option<Timestamp>) -> Vec<DowntimePeriod> {
    let mut periods = Vec::new();
    let mut open: Option<&ClusterView> = None;
    for view in views {
        match (open, view.status.is_primary()) {
            (None, false) => open = Some(view),
            (Some(lost), true) => {
                periods.push(DowntimePeriod::new(
                    lost.timestamp,
                    view.timestamp,
                    GapType::NoPrimary,
                    format!("non-primary from view {} until view {}", lost.view_id, view.view_id),
                ));
                open = None;
            }
            _ => {}
        }
    }
    if let (Some(lost), Some(end)) = (open, last_seen) {
        if end > lost.timestamp {
            periods.push(DowntimePeriod::new(
                lost.timestamp,
                end,
                GapType::NoPrimary,
                format!("non-primary from view {} until end of log", lost.view_id),
            ));
        }
    }
    periods
}

enum Phase {
    Down(&'static str),
    Up,
    Neither,
}

fn restart_phase(event: &LogEvent) -> Phase {
    match &event.payload {
        EventPayload::Service(ServiceEvent::ShutdownInitiated) => Phase::Down("shutdown"),
        EventPayload::Service(ServiceEvent::ShutdownComplete) => Phase::Down("shutdown"),
        EventPayload::Service(ServiceEvent::Crash { .. }) => Phase::Down("crash"),
        EventPayload::Service(ServiceEvent::Started) => Phase::Up,
        EventPayload::StateTransition(t) if t.reason != TransitionReason::ClusterComponent => {
            let to = base_state(&t.to_state);
            if DOWN_STATES.contains(&to) {
                Phase::Down("provider closed")
            } else if OPERATING_STATES.contains(&to) {
                Phase::Up
            } else {
                Phase::Neither
            }
        }
        _ => Phase::Neither,
    }
}

/// Down-then-up pairs within the restart ceiling.
pub fn restart_windows(events: &[LogEvent]) -> Vec<DowntimePeriod> {
    let mut ordered: Vec<&LogEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.timestamp);
    let mut periods = Vec::new();
    let mut down: Option<(Timestamp, &'static str)> = None;
    for event in ordered {
        match (restart_phase(event), down) {
            (Phase::Down(cause), None) => down = Some((event.timestamp, cause)),
            (Phase::Up, Some((since, cause))) => {
                let gap = (event.timestamp - since).num_seconds();
                if gap > 0 && gap <= RESTART_CEILING {
                    periods.push(DowntimePeriod::new(
                        since,
                        event.timestamp,
                        GapType::NodeRestart,
                        format!("node restart ({cause}), back after {}", human_duration(gap)),
                    ));
                }
                down = None;
            }
            _ => {}
        }
    }
    periods
}

/// Sort by start and fold periods closer than [`MERGE_GAP`] together.
pub fn merge_periods(mut periods: Vec<DowntimePeriod>) -> Vec<DowntimePeriod> {
    periods.sort_by(|a, b| (a.start_time, a.end_time).cmp(&(b.start_time, b.end_time)));
    let mut merged: Vec<DowntimePeriod> = Vec::with_capacity(periods.len());
    for period in periods {
        match merged.last_mut() {
            Some(last) if period.start_time - last.end_time <= Duration::seconds(MERGE_GAP) => {
                last.end_time = last.end_time.max(period.end_time);
                last.duration_seconds = (last.end_time - last.start_time).num_seconds();
                last.severity = last.severity.max(period.severity);
                last.gap_type = GapType::Merged;
                last.description = format!("{}; {}", last.description, period.description);
            }
            _ => merged.push(period),
        }
    }
    merged
}

/// Run all detectors and merge.
pub fn analyze(events: &[LogEvent], views: &[ClusterView]) -> Vec<DowntimePeriod> {
    let last_seen = events.iter().map(|e| e.timestamp).max();
    let mut periods = silence_gaps(events);
    periods.extend(non_primary_intervals(views, last_seen));
    periods.extend(restart_windows(events));
    let merged = merge_periods(periods);
    tracing::debug!(periods = merged.len(), "downtime analysis done");
    merged
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DowntimeSummary {
    pub total_periods: usize,
    pub total_downtime_seconds: i64,
    pub longest_period_seconds: i64,
    pub by_type: BTreeMap<String, usize>,
    pub periods: Vec<DowntimePeriod>,
}

impl DowntimeSummary {
    pub fn from_periods(periods: Vec<DowntimePeriod>) -> Self {
        let mut by_type = BTreeMap::new();
        for p in &periods {
            *by_type.entry(p.gap_type.as_str().to_string()).or_insert(0) += 1;
        }
        Self {
            total_periods: periods.len(),
            total_downtime_seconds: periods.iter().map(|p| p.duration_seconds).sum(),
            longest_period_seconds: periods.iter().map(|p| p.duration_seconds).max().unwrap_or(0),
            by_type,
            periods,
        }
    }
}

/// `2h 5m`, `7m 30s`, `45s`.
pub fn human_duration(seconds: i64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IstEvent, NodeKey, StateTransition, ViewFormat, ViewMember, ViewStatus};
    use crate::timestamp::parse_canonical;
    use proptest::prelude::*;

    fn ts(s: &str) -> Timestamp {
        parse_canonical(s).unwrap()
    }

    fn note(at: &str, raw: &str) -> LogEvent {
        LogEvent::new(ts(at), raw, EventPayload::Warning)
    }

    fn transition(at: &str, to: &str) -> LogEvent {
        LogEvent::new(
            ts(at),
            "",
            EventPayload::StateTransition(StateTransition {
                node: None,
                from_state: "SYNCED".into(),
                to_state: to.into(),
                timestamp: ts(at),
                sequence_number: None,
                reason: TransitionReason::ReplicationState,
            }),
        )
    }

    fn view(at: &str, id: &str, status: ViewStatus) -> ClusterView {
        ClusterView {
            view_id: id.into(),
            status,
            timestamp: ts(at),
            protocol_version: None,
            capabilities: Vec::new(),
            members: vec![ViewMember {
                index: 0,
                observed_uuid: "a".into(),
                name: None,
                node: NodeKey(0),
            }],
            joined: Vec::new(),
            left: Vec::new(),
            partitioned: Vec::new(),
            own_index: None,
            format: ViewFormat::Detailed,
        }
    }

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(severity_for(14 * 60), Severity::Low);
        assert_eq!(severity_for(15 * 60), Severity::Medium);
        assert_eq!(severity_for(3 * 3600), Severity::High);
        assert_eq!(severity_for(5 * 3600), Severity::Critical);
    }

    #[test]
    fn test_silence_gap_detected() {
        let events = vec![
            note("2025-09-15 10:00:00", "WSREP: something"),
            note("2025-09-15 10:10:00", "WSREP: something else"),
        ];
        let gaps = silence_gaps(&events);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].duration_seconds, 600);
        assert_eq!(gaps[0].gap_type, GapType::NoActivity);
    }

    #[test]
    fn test_silence_next_to_recovery_is_ignored() {
        let events = vec![
            note("2025-09-15 10:00:00", "WSREP: something"),
            LogEvent::new(ts("2025-09-15 10:10:00"), "", EventPayload::Ist(IstEvent::SenderNothing)),
            note("2025-09-15 10:30:00", "WSREP: reconnecting to peer"),
            note("2025-09-15 10:31:00", "plain"),
        ];
        assert!(silence_gaps(&events).is_empty());
    }

    #[test]
    fn test_short_gap_ignored() {
        let events = vec![note("2025-09-15 10:00:00", "a"), note("2025-09-15 10:04:59", "b")];
        assert!(silence_gaps(&events).is_empty());
    }

    #[test]
    fn test_non_primary_interval_closed_and_open() {
        let views = vec![
            view("2025-09-15 10:00:00", "1", ViewStatus::Primary),
            view("2025-09-15 10:05:00", "2", ViewStatus::NonPrimary),
            view("2025-09-15 10:06:00", "3", ViewStatus::NonPrimary),
            view("2025-09-15 10:20:00", "4", ViewStatus::Primary),
            view("2025-09-15 11:00:00", "5", ViewStatus::NonPrimary),
        ];
        let periods = non_primary_intervals(&views, Some(ts("2025-09-15 11:30:00")));
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].duration_seconds, 15 * 60);
        assert_eq!(periods[0].severity, Severity::Medium);
        assert_eq!(periods[1].end_time, ts("2025-09-15 11:30:00"));
    }

    #[test]
    fn test_restart_window_within_ceiling() {
        let events = vec![
            transition("2025-09-15 10:00:00", "CLOSED"),
            LogEvent::new(ts("2025-09-15 10:02:00"), "", EventPayload::Service(ServiceEvent::Started)),
            transition("2025-09-15 12:00:00", "DISCONNECTED"),
            transition("2025-09-15 14:00:00", "SYNCED"),
        ];
        let periods = restart_windows(&events);
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].duration_seconds, 120);
        assert_eq!(periods[0].gap_type, GapType::NodeRestart);
    }

    #[test]
    fn test_merge_takes_union_and_max_severity() {
        let a = DowntimePeriod::new(ts("2025-09-15 10:00:00"), ts("2025-09-15 10:20:00"), GapType::NoPrimary, "a");
        let b = DowntimePeriod::new(ts("2025-09-15 10:20:30"), ts("2025-09-15 10:22:00"), GapType::NodeRestart, "b");
        let merged = merge_periods(vec![b, a]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start_time, ts("2025-09-15 10:00:00"));
        assert_eq!(merged[0].end_time, ts("2025-09-15 10:22:00"));
        assert_eq!(merged[0].severity, Severity::Medium);
        assert_eq!(merged[0].gap_type, GapType::Merged);
        assert_eq!(merged[0].description, "a; b");
    }

    #[test]
    fn test_analyze_merges_lost_quorum_with_following_restart() {
        let views = vec![
            view("2025-09-15 10:00:00", "7", ViewStatus::NonPrimary),
            view("2025-09-15 10:10:00", "8", ViewStatus::Primary),
        ];
        let mut events: Vec<LogEvent> = (0..=9)
            .map(|m| note(&format!("2025-09-15 10:{m:02}:00"), "heartbeat"))
            .collect();
        events.push(LogEvent::new(
            ts("2025-09-15 10:10:30"),
            "",
            EventPayload::Service(ServiceEvent::ShutdownInitiated),
        ));
        events.push(LogEvent::new(ts("2025-09-15 10:12:00"), "", EventPayload::Service(ServiceEvent::Started)));
        events.push(note("2025-09-15 10:13:00", "heartbeat"));

        let periods = analyze(&events, &views);
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].gap_type, GapType::Merged);
        assert_eq!(periods[0].start_time, ts("2025-09-15 10:00:00"));
        assert_eq!(periods[0].end_time, ts("2025-09-15 10:12:00"));
        assert_eq!(periods[0].duration_seconds, 12 * 60);
    }

    #[test]
    fn test_summary_totals() {
        let periods = vec![
            DowntimePeriod::new(ts("2025-09-15 10:00:00"), ts("2025-09-15 10:10:00"), GapType::NoActivity, "x"),
            DowntimePeriod::new(ts("2025-09-15 11:00:00"), ts("2025-09-15 11:01:00"), GapType::NodeRestart, "y"),
        ];
        let summary = DowntimeSummary::from_periods(periods);
        assert_eq!(summary.total_periods, 2);
        assert_eq!(summary.total_downtime_seconds, 660);
        assert_eq!(summary.longest_period_seconds, 600);
        assert_eq!(summary.by_type.get("node_restart"), Some(&1));
    }

    #[test]
    fn test_human_duration() {
        assert_eq!(human_duration(45), "45s");
        assert_eq!(human_duration(450), "7m 30s");
        assert_eq!(human_duration(7500), "2h 5m");
    }

    fn arb_severity() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Low),
            Just(Severity::Medium),
            Just(Severity::High),
            Just(Severity::Critical),
        ]
    }

    proptest! {
        #[test]
        fn prop_close_periods_merge(
            len1 in 1i64..20_000,
            gap in 0i64..=MERGE_GAP,
            len2 in 1i64..20_000,
            s1 in arb_severity(),
            s2 in arb_severity(),
        ) {
            let t0 = ts("2025-09-15 00:00:00");
            let t1 = t0 + Duration::seconds(len1);
            let t2 = t1 + Duration::seconds(gap);
            let t3 = t2 + Duration::seconds(len2);
            let mut a = DowntimePeriod::new(t0, t1, GapType::NoActivity, "a");
            a.severity = s1;
            let mut b = DowntimePeriod::new(t2, t3, GapType::NoPrimary, "b");
            b.severity = s2;
            let merged = merge_periods(vec![a, b]);
            prop_assert_eq!(merged.len(), 1);
            prop_assert_eq!(merged[0].start_time, t0);
            prop_assert_eq!(merged[0].end_time, t3);
            prop_assert_eq!(merged[0].severity, s1.max(s2));
        }

        #[test]
        fn prop_merged_periods_are_separated(
            spans in prop::collection::vec((0i64..50_000, 1i64..3_000), 0..30)
        ) {
            let t0 = ts("2025-09-15 00:00:00");
            let periods = spans
                .iter()
                .map(|(start, len)| {
                    let s = t0 + Duration::seconds(*start);
                    DowntimePeriod::new(s, s + Duration::seconds(*len), GapType::NoActivity, "p")
                })
                .collect();
            let merged = merge_periods(periods);
            for pair in merged.windows(2) {
                prop_assert!(pair[1].start_time - pair[0].end_time > Duration::seconds(MERGE_GAP));
            }
        }
    }
}
