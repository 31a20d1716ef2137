//! State-transfer workflow correlator
//!
//! Groups independently logged SST and IST signals into one record per
//! state-transfer request. Requests are processed oldest-first; every
//! start, failure, completion and IST event a workflow takes is marked used
//! and never offered to a later request.
//!
//! Windows (seconds, relative to the request unless noted):
//! - pre-signals (IST "nothing to send" / "send failed"): -120..=+120
//! - SST start and failure: 0..=600, capped at the next request
//! - SST completion: 0..=900 after the start
//! - IST evidence without SST: -120..=+600
//! - post-SST IST episode: 0..=600 after the completion (or start)
//!
//! A failure counts only if no completion precedes it.

use std::collections::BTreeSet;

use chrono::Duration;
use serde::Serialize;

use crate::identity::port_of;
use crate::model::{EventPayload, IstEvent, LogEvent, SstEvent};
use crate::timestamp::{self, Timestamp};

pub const PRE_SIGNAL_WINDOW: i64 = 120;
pub const SST_START_WINDOW: i64 = 600;
pub const SST_COMPLETION_WINDOW: i64 = 900;
pub const IST_WINDOW: i64 = 600;
pub const POST_IST_COMPLETION_WINDOW: i64 = 900;
pub const JOINER_ADDR_WINDOW: i64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    #[serde(rename = "IST")]
    Ist,
    #[serde(rename = "SST")]
    Sst,
    #[serde(rename = "SST+IST")]
    SstThenIst,
    #[serde(rename = "SST-FAILED")]
    SstFailed,
    Unknown,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Ist => "IST",
            Decision::Sst => "SST",
            Decision::SstThenIst => "SST+IST",
            Decision::SstFailed => "SST-FAILED",
            Decision::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreSignal {
    #[serde(with = "timestamp::canonical")]
    pub timestamp: Timestamp,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FullResync {
    pub method: Option<String>,
    #[serde(with = "timestamp::canonical_opt")]
    pub start: Option<Timestamp>,
    #[serde(with = "timestamp::canonical_opt")]
    pub failed_at: Option<Timestamp>,
    pub error_code: Option<i64>,
    pub failure_reason: Option<String>,
    #[serde(with = "timestamp::canonical_opt")]
    pub completed_at: Option<Timestamp>,
    pub duration_seconds: Option<i64>,
    /// Strong SST lines seen for this request (proceeding, datadir cleanup, ...).
    pub indicators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsyncServe {
    #[serde(with = "timestamp::canonical")]
    pub timestamp: Timestamp,
    pub peer: String,
    pub first_seqno: i64,
    pub last_seqno: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeqnoRange {
    #[serde(with = "timestamp::canonical")]
    pub timestamp: Timestamp,
    pub first_seqno: i64,
    pub last_seqno: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostCatchup {
    pub async_start: Option<AsyncServe>,
    pub receiver_prepared: Option<SeqnoRange>,
    #[serde(with = "timestamp::canonical_opt")]
    pub applying_start: Option<Timestamp>,
    /// Whether the async serve went to the joiner's IST port.
    pub peer_matched: Option<bool>,
    #[serde(with = "timestamp::canonical_opt")]
    pub completed_at: Option<Timestamp>,
}

impl PostCatchup {
    fn is_empty(&self) -> bool {
        self.async_start.is_none()
            && self.receiver_prepared.is_none()
            && self.applying_start.is_none()
            && self.completed_at.is_none()
    }
}

/// One reconstructed state-transfer attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workflow {
    #[serde(with = "timestamp::canonical")]
    pub requested_at: Timestamp,
    pub joiner: String,
    pub joiner_id: String,
    pub donor: String,
    pub donor_id: String,
    pub joiner_addr: Option<String>,
    pub pre_signals: Vec<PreSignal>,
    pub full_resync: FullResync,
    pub post_catchup: PostCatchup,
    pub decision: Decision,
    /// Indices of the events this workflow took.
    #[serde(skip)]
    pub consumed: Vec<usize>,
}

fn is_start(e: &LogEvent) -> bool {
    matches!(e.payload, EventPayload::Sst(SstEvent::Started { .. }))
}

fn is_failure(e: &LogEvent) -> bool {
    matches!(
        e.payload,
        EventPayload::Sst(SstEvent::Failed { .. }) | EventPayload::Sst(SstEvent::FailedReason { .. })
    )
}

fn is_completion(e: &LogEvent) -> bool {
    matches!(e.payload, EventPayload::Sst(SstEvent::Completed { .. }))
}

fn is_complete_notice(e: &LogEvent) -> bool {
    matches!(e.payload, EventPayload::Sst(SstEvent::CompleteNotice { .. }))
}

/// Lines only a full resync produces.
fn strong_sst_indicator(e: &LogEvent) -> Option<&'static str> {
    match e.payload {
        EventPayload::Sst(SstEvent::Proceeding) => Some("proceeding"),
        EventPayload::Sst(SstEvent::DatadirCleanup) => Some("datadir_cleanup"),
        EventPayload::Sst(SstEvent::StreamWait) => Some("stream_wait"),
        EventPayload::Sst(SstEvent::StreamAddress { .. }) => Some("stream_address"),
        EventPayload::Sst(SstEvent::Sent { .. }) => Some("sent"),
        EventPayload::Sst(SstEvent::TotalTime { .. }) => Some("total_time"),
        EventPayload::Sst(SstEvent::DonorMonitor { .. }) => Some("donor_monitor"),
        _ => None,
    }
}

fn is_pre_signal(e: &LogEvent) -> Option<&'static str> {
    match e.payload {
        EventPayload::Ist(IstEvent::SenderNothing) => Some("sender_nothing"),
        EventPayload::Ist(IstEvent::SendFailed) => Some("send_failed"),
        _ => None,
    }
}

/// Receiver prepared with an explicit range.
fn is_prepared_range(e: &LogEvent) -> bool {
    matches!(
        e.payload,
        EventPayload::Ist(IstEvent::ReceiverPrepared { first_seqno, last_seqno, .. }) if first_seqno <= last_seqno
    )
}

fn is_applying(e: &LogEvent) -> bool {
    matches!(e.payload, EventPayload::Ist(IstEvent::ApplyingStart { .. }))
}

fn is_async_start(e: &LogEvent) -> bool {
    matches!(e.payload, EventPayload::Ist(IstEvent::AsyncStart { .. }))
}

fn is_ist_done(e: &LogEvent) -> bool {
    matches!(
        e.payload,
        EventPayload::Ist(IstEvent::Completed) | EventPayload::Ist(IstEvent::AsyncServed)
    )
}

fn strip_method(raw: &str) -> String {
    raw.trim_start_matches("wsrep_sst_").to_string()
}

struct Correlator<'a> {
    events: &'a [LogEvent],
    used: BTreeSet<usize>,
}

impl Correlator<'_> {
    /// Earliest unused event in `[lo, hi]` satisfying `pred`.
    fn nearest(&self, lo: Timestamp, hi: Timestamp, pred: impl Fn(&LogEvent) -> bool) -> Option<usize> {
        self.events
            .iter()
            .enumerate()
            .filter(|(i, e)| !self.used.contains(i) && e.timestamp >= lo && e.timestamp <= hi && pred(e))
            .min_by_key(|(i, e)| (e.timestamp, *i))
            .map(|(i, _)| i)
    }

    fn take(&mut self, idx: usize, consumed: &mut Vec<usize>) {
        self.used.insert(idx);
        consumed.push(idx);
    }

    fn at(&self, idx: usize) -> Timestamp {
        self.events[idx].timestamp
    }

    fn build(&mut self, req: usize, next_request: Option<Timestamp>) -> Option<Workflow> {
        let request = &self.events[req];
        let EventPayload::Sst(SstEvent::Requested {
            joiner_id,
            joiner_name,
            donor_id,
            donor_name,
            ..
        }) = &request.payload
        else {
            return None;
        };
        let t = request.timestamp;
        let capped = |secs: i64| {
            let end = t + Duration::seconds(secs);
            match next_request {
                Some(next) if next < end => next,
                _ => end,
            }
        };

        let mut consumed = vec![req];
        self.used.insert(req);
        let mut full = FullResync::default();

        // Symmetric: the fallback notice is often printed just after the
        // request line, not only before it.
        let mut pre_signals = Vec::new();
        let pre_lo = t - Duration::seconds(PRE_SIGNAL_WINDOW);
        let pre_hi = t + Duration::seconds(PRE_SIGNAL_WINDOW);
        while let Some(idx) = self.nearest(pre_lo, pre_hi, |e| is_pre_signal(e).is_some()) {
            let kind = is_pre_signal(&self.events[idx]).unwrap_or_default();
            pre_signals.push(PreSignal {
                timestamp: self.at(idx),
                kind: kind.to_string(),
            });
            self.take(idx, &mut consumed);
        }

        let joiner_addr = self.joiner_address(t);

        let start = self.nearest(t, capped(SST_START_WINDOW), is_start);
        let failure = self.nearest(t, capped(SST_START_WINDOW), is_failure);
        if let Some(idx) = start {
            self.take(idx, &mut consumed);
            full.start = Some(self.at(idx));
            if let EventPayload::Sst(SstEvent::Started { method, .. }) = &self.events[idx].payload {
                full.method = Some(strip_method(method));
            }
        }

        let completion = start.and_then(|s| {
            let lo = self.at(s);
            let hi = lo + Duration::seconds(SST_COMPLETION_WINDOW);
            self.nearest(lo, hi, is_completion)
                .or_else(|| self.nearest(lo, hi, is_complete_notice))
        });
        if let Some(idx) = completion {
            self.take(idx, &mut consumed);
            full.completed_at = Some(self.at(idx));
            if let (Some(s), Some(c)) = (full.start, full.completed_at) {
                full.duration_seconds = Some((c - s).num_seconds());
            }
            if let EventPayload::Sst(SstEvent::Completed { method, .. }) = &self.events[idx].payload {
                full.method.get_or_insert_with(|| strip_method(method));
            }
        }

        // A failure logged after a completion belongs to a later attempt.
        let failed = failure.filter(|f| match completion {
            Some(c) => self.at(*f) <= self.at(c),
            None => true,
        });
        if let Some(idx) = failed {
            self.take(idx, &mut consumed);
            full.failed_at = Some(self.at(idx));
            match &self.events[idx].payload {
                EventPayload::Sst(SstEvent::Failed { error_code, operation }) => {
                    full.error_code = Some(*error_code);
                    full.failure_reason = Some(format!("{operation} failed"));
                }
                EventPayload::Sst(SstEvent::FailedReason { error_code, reason, .. }) => {
                    full.error_code = Some(*error_code);
                    full.failure_reason = reason.clone();
                }
                _ => {}
            }
        }

        let indicator_hi = capped(SST_COMPLETION_WINDOW);
        let mut indicator_events = Vec::new();
        for (idx, e) in self.events.iter().enumerate() {
            if e.timestamp < t || e.timestamp > indicator_hi {
                continue;
            }
            if let Some(name) = strong_sst_indicator(e) {
                if self.used.contains(&idx) {
                    continue;
                }
                indicator_events.push(idx);
                if !full.indicators.iter().any(|i| i == name) {
                    full.indicators.push(name.to_string());
                }
            }
            if full.method.is_none() {
                if let EventPayload::Sst(SstEvent::Initiated { method, .. }) = &e.payload {
                    full.method = Some(strip_method(method));
                }
            }
        }
        for idx in indicator_events {
            self.take(idx, &mut consumed);
        }
        let strong_sst = start.is_some() || completion.is_some() || !full.indicators.is_empty();

        let mut post = PostCatchup::default();
        let decision = if failed.is_some() {
            Decision::SstFailed
        } else if strong_sst {
            let anchor = full.completed_at.or(full.start).unwrap_or(t);
            post = self.post_catchup(anchor, joiner_addr.as_deref(), &mut consumed);
            if post.is_empty() {
                Decision::Sst
            } else {
                Decision::SstThenIst
            }
        } else {
            post = self.plain_catchup(t, &capped, &mut consumed);
            if post.receiver_prepared.is_some() {
                Decision::Ist
            } else {
                Decision::Unknown
            }
        };

        Some(Workflow {
            requested_at: t,
            joiner: joiner_name.clone(),
            joiner_id: joiner_id.clone(),
            donor: donor_name.clone(),
            donor_id: donor_id.clone(),
            joiner_addr,
            pre_signals,
            full_resync: full,
            post_catchup: post,
            decision,
            consumed,
        })
    }

    /// Listen address of the IST receiver prepared closest to the request.
    fn joiner_address(&self, t: Timestamp) -> Option<String> {
        self.events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::Ist(IstEvent::ReceiverPrepared { listen_address, .. }) => {
                    let gap = (e.timestamp - t).num_seconds().abs();
                    (gap <= JOINER_ADDR_WINDOW).then_some((gap, e.timestamp, listen_address))
                }
                _ => None,
            })
            .min_by_key(|(gap, at, _)| (*gap, *at))
            .map(|(_, _, addr)| addr.clone())
    }

    /// IST episode following a full resync.
    fn post_catchup(&mut self, anchor: Timestamp, joiner_addr: Option<&str>, consumed: &mut Vec<usize>) -> PostCatchup {
        let mut post = PostCatchup::default();
        let hi = anchor + Duration::seconds(IST_WINDOW);
        let joiner_port = joiner_addr.and_then(port_of);

        let matching_port = |e: &LogEvent| match (&e.payload, joiner_port) {
            (EventPayload::Ist(IstEvent::AsyncStart { peer, .. }), Some(port)) => port_of(peer) == Some(port),
            _ => false,
        };
        let serve = self
            .nearest(anchor, hi, |e| is_async_start(e) && matching_port(e))
            .or_else(|| self.nearest(anchor, hi, is_async_start));
        if let Some(idx) = serve {
            if let EventPayload::Ist(IstEvent::AsyncStart { peer, first_seqno, last_seqno, .. }) = &self.events[idx].payload {
                post.async_start = Some(AsyncServe {
                    timestamp: self.at(idx),
                    peer: peer.clone(),
                    first_seqno: *first_seqno,
                    last_seqno: *last_seqno,
                });
                if let Some(port) = joiner_port {
                    post.peer_matched = Some(port_of(peer) == Some(port));
                }
            }
            self.take(idx, consumed);
        }

        self.take_receiver_side(anchor, hi, &mut post, consumed);
        let done_hi = anchor + Duration::seconds(POST_IST_COMPLETION_WINDOW);
        if let Some(idx) = self.nearest(anchor, done_hi, is_ist_done) {
            post.completed_at = Some(self.at(idx));
            self.take(idx, consumed);
        }
        post
    }

    /// IST evidence around a request that showed no SST activity.
    fn plain_catchup(
        &mut self,
        t: Timestamp,
        capped: &impl Fn(i64) -> Timestamp,
        consumed: &mut Vec<usize>,
    ) -> PostCatchup {
        let mut post = PostCatchup::default();
        let lo = t - Duration::seconds(PRE_SIGNAL_WINDOW);
        let hi = capped(IST_WINDOW);
        // Only a prepared receiver with a seqno range is strong enough on
        // its own; a bare applying line is left for a later request.
        if self.nearest(lo, hi, is_prepared_range).is_none() {
            return post;
        }
        self.take_receiver_side(lo, hi, &mut post, consumed);
        let done_hi = t + Duration::seconds(POST_IST_COMPLETION_WINDOW);
        if let Some(idx) = self.nearest(t, done_hi, is_ist_done) {
            post.completed_at = Some(self.at(idx));
            self.take(idx, consumed);
        }
        post
    }

    fn take_receiver_side(&mut self, lo: Timestamp, hi: Timestamp, post: &mut PostCatchup, consumed: &mut Vec<usize>) {
        if let Some(idx) = self.nearest(lo, hi, is_prepared_range) {
            if let EventPayload::Ist(IstEvent::ReceiverPrepared { first_seqno, last_seqno, .. }) = &self.events[idx].payload {
                post.receiver_prepared = Some(SeqnoRange {
                    timestamp: self.at(idx),
                    first_seqno: *first_seqno,
                    last_seqno: *last_seqno,
                });
            }
            self.take(idx, consumed);
        }
        if let Some(idx) = self.nearest(lo, hi, is_applying) {
            post.applying_start = Some(self.at(idx));
            self.take(idx, consumed);
        }
    }
}

/// Build one workflow per SST request, oldest request first.
pub fn correlate(events: &[LogEvent]) -> Vec<Workflow> {
    let mut requests: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e.payload, EventPayload::Sst(SstEvent::Requested { .. })))
        .map(|(i, _)| i)
        .collect();
    requests.sort_by_key(|&i| (events[i].timestamp, i));

    let mut correlator = Correlator {
        events,
        used: BTreeSet::new(),
    };
    let mut workflows = Vec::with_capacity(requests.len());
    for (n, &req) in requests.iter().enumerate() {
        let next = requests.get(n + 1).map(|&i| events[i].timestamp);
        if let Some(wf) = correlator.build(req, next) {
            tracing::debug!(
                requested_at = %timestamp::format(&wf.requested_at),
                joiner = %wf.joiner,
                decision = wf.decision.as_str(),
                "correlated state transfer"
            );
            workflows.push(wf);
        }
    }
    workflows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::parse_canonical;
    use proptest::prelude::*;

    fn ev(ts: &str, payload: EventPayload) -> LogEvent {
        LogEvent::new(parse_canonical(ts).unwrap(), "", payload)
    }

    fn request(ts: &str) -> LogEvent {
        ev(
            ts,
            EventPayload::Sst(SstEvent::Requested {
                joiner_id: "1.0".into(),
                joiner_name: "N2".into(),
                requested_donor: "*any*".into(),
                donor_id: "0.0".into(),
                donor_name: "N1".into(),
                donor_state: "SYNCED".into(),
            }),
        )
    }

    fn started(ts: &str) -> LogEvent {
        ev(
            ts,
            EventPayload::Sst(SstEvent::Started {
                method: "mariabackup".into(),
                role: "joiner".into(),
                detail: String::new(),
            }),
        )
    }

    fn completed(ts: &str) -> LogEvent {
        ev(
            ts,
            EventPayload::Sst(SstEvent::Completed {
                method: "mariabackup".into(),
                role: "joiner".into(),
                detail: String::new(),
            }),
        )
    }

    fn async_start(ts: &str, peer: &str) -> LogEvent {
        ev(
            ts,
            EventPayload::Ist(IstEvent::AsyncStart {
                peer: peer.into(),
                first_seqno: 1626,
                last_seqno: 1700,
                preload_from: 1626,
            }),
        )
    }

    #[test]
    fn test_plain_sst() {
        let events = vec![
            request("2025-09-15 10:00:00"),
            started("2025-09-15 10:00:05"),
            completed("2025-09-15 10:01:35"),
        ];
        let wf = correlate(&events);
        assert_eq!(wf.len(), 1);
        assert_eq!(wf[0].decision, Decision::Sst);
        assert!(wf[0].full_resync.start.is_some());
        assert!(wf[0].full_resync.completed_at.is_some());
        assert_eq!(wf[0].full_resync.duration_seconds, Some(90));
        assert_eq!(wf[0].full_resync.method.as_deref(), Some("mariabackup"));
        assert_eq!(wf[0].joiner, "N2");
        assert_eq!(wf[0].donor, "N1");
    }

    #[test]
    fn test_ist_only() {
        let events = vec![
            request("2025-09-15 10:00:00"),
            ev("2025-09-15 10:00:30", EventPayload::Ist(IstEvent::SenderNothing)),
            ev(
                "2025-09-15 10:00:31",
                EventPayload::Ist(IstEvent::ReceiverPrepared {
                    first_seqno: 1000,
                    last_seqno: 1625,
                    listen_address: "tcp://10.0.0.2:4568".into(),
                }),
            ),
            ev("2025-09-15 10:00:32", EventPayload::Ist(IstEvent::ApplyingStart { seqno: 1000 })),
        ];
        let wf = &correlate(&events)[0];
        assert_eq!(wf.decision, Decision::Ist);
        assert_eq!(wf.pre_signals.len(), 1);
        assert_eq!(wf.pre_signals[0].kind, "sender_nothing");
        assert_eq!(wf.joiner_addr.as_deref(), Some("tcp://10.0.0.2:4568"));
        assert!(wf.post_catchup.receiver_prepared.is_some());
    }

    #[test]
    fn test_applying_without_prepared_range_is_unknown() {
        let events = vec![
            request("2025-09-15 10:00:00"),
            ev("2025-09-15 10:00:32", EventPayload::Ist(IstEvent::ApplyingStart { seqno: 1000 })),
        ];
        let wf = &correlate(&events)[0];
        assert_eq!(wf.decision, Decision::Unknown);
        assert!(wf.post_catchup.applying_start.is_none());
        assert_eq!(wf.consumed, vec![0]);
    }

    #[test]
    fn test_sst_indicator_not_reused_by_next_request() {
        let events = vec![
            request("2025-09-15 10:00:00"),
            request("2025-09-15 10:00:20"),
            ev("2025-09-15 10:00:20", EventPayload::Sst(SstEvent::Proceeding)),
        ];
        let wf = correlate(&events);
        assert_eq!(wf.len(), 2);
        assert_eq!(wf[0].decision, Decision::Sst);
        assert_eq!(wf[0].full_resync.indicators, vec!["proceeding".to_string()]);
        assert_eq!(wf[1].decision, Decision::Unknown);
        assert!(wf[1].full_resync.indicators.is_empty());
    }

    #[test]
    fn test_sst_failed_keeps_error_code() {
        let events = vec![
            request("2025-09-15 10:00:00"),
            started("2025-09-15 10:00:05"),
            ev(
                "2025-09-15 10:02:00",
                EventPayload::Sst(SstEvent::Failed {
                    operation: "receiving".into(),
                    error_code: -125,
                }),
            ),
            async_start("2025-09-15 10:03:00", "tcp://10.0.0.2:4568"),
        ];
        let wf = &correlate(&events)[0];
        assert_eq!(wf.decision, Decision::SstFailed);
        assert_eq!(wf.full_resync.error_code, Some(-125));
        assert!(wf.post_catchup.async_start.is_none());
    }

    #[test]
    fn test_sst_then_ist() {
        let events = vec![
            request("2025-09-15 10:00:00"),
            started("2025-09-15 10:00:05"),
            completed("2025-09-15 10:05:00"),
            async_start("2025-09-15 10:06:00", "tcp://10.0.0.2:4568"),
        ];
        let wf = &correlate(&events)[0];
        assert_eq!(wf.decision, Decision::SstThenIst);
        assert_eq!(wf.post_catchup.async_start.as_ref().map(|a| a.first_seqno), Some(1626));
    }

    #[test]
    fn test_failure_after_completion_is_not_this_workflows() {
        let events = vec![
            request("2025-09-15 10:00:00"),
            started("2025-09-15 10:00:05"),
            completed("2025-09-15 10:01:00"),
            ev(
                "2025-09-15 10:04:00",
                EventPayload::Sst(SstEvent::FailedReason {
                    direction: "to".into(),
                    peer_id: "1.0".into(),
                    peer_name: "N2".into(),
                    error_code: -255,
                    reason: None,
                }),
            ),
        ];
        let wf = &correlate(&events)[0];
        assert_eq!(wf.decision, Decision::Sst);
        assert!(wf.full_resync.failed_at.is_none());
    }

    #[test]
    fn test_no_signal_is_unknown() {
        let events = vec![request("2025-09-15 10:00:00")];
        assert_eq!(correlate(&events)[0].decision, Decision::Unknown);
    }

    #[test]
    fn test_async_start_prefers_joiner_port() {
        let events = vec![
            ev(
                "2025-09-15 09:59:58",
                EventPayload::Ist(IstEvent::ReceiverPrepared {
                    first_seqno: 1,
                    last_seqno: 0,
                    listen_address: "tcp://10.0.0.2:4568".into(),
                }),
            ),
            request("2025-09-15 10:00:00"),
            started("2025-09-15 10:00:05"),
            completed("2025-09-15 10:05:00"),
            async_start("2025-09-15 10:05:10", "tcp://10.0.0.3:4999"),
            async_start("2025-09-15 10:05:20", "tcp://10.0.0.2:4568"),
        ];
        let wf = &correlate(&events)[0];
        let serve = wf.post_catchup.async_start.as_ref().unwrap();
        assert_eq!(serve.peer, "tcp://10.0.0.2:4568");
        assert_eq!(wf.post_catchup.peer_matched, Some(true));
    }

    #[test]
    fn test_ist_event_not_shared_between_requests() {
        let events = vec![
            request("2025-09-15 10:00:00"),
            started("2025-09-15 10:00:05"),
            completed("2025-09-15 10:01:00"),
            request("2025-09-15 10:02:00"),
            started("2025-09-15 10:02:05"),
            completed("2025-09-15 10:03:00"),
            async_start("2025-09-15 10:04:00", "tcp://10.0.0.2:4568"),
        ];
        let wf = correlate(&events);
        let with_serve = wf.iter().filter(|w| w.post_catchup.async_start.is_some()).count();
        assert_eq!(with_serve, 1);
        assert_eq!(wf[0].decision, Decision::SstThenIst);
        assert_eq!(wf[1].decision, Decision::Sst);
    }

    fn arb_event() -> impl Strategy<Value = (u32, u8)> {
        (0u32..3600, 0u8..9)
    }

    proptest! {
        #[test]
        fn prop_no_event_consumed_twice(specs in prop::collection::vec(arb_event(), 1..60)) {
            let base = parse_canonical("2025-09-15 10:00:00").unwrap();
            let events: Vec<LogEvent> = specs
                .iter()
                .map(|(offset, kind)| {
                    let payload = match kind {
                        0 | 1 => request("2025-01-01 00:00:00").payload,
                        2 => started("2025-01-01 00:00:00").payload,
                        3 => completed("2025-01-01 00:00:00").payload,
                        4 => EventPayload::Sst(SstEvent::Failed { operation: "sending".into(), error_code: -1 }),
                        5 => async_start("2025-01-01 00:00:00", "tcp://10.0.0.2:4568").payload,
                        6 => EventPayload::Ist(IstEvent::ApplyingStart { seqno: 5 }),
                        7 => EventPayload::Ist(IstEvent::SenderNothing),
                        _ => EventPayload::Ist(IstEvent::Completed),
                    };
                    LogEvent::new(base + Duration::seconds(*offset as i64), "", payload)
                })
                .collect();
            let workflows = correlate(&events);
            let mut seen = BTreeSet::new();
            for wf in &workflows {
                for idx in &wf.consumed {
                    prop_assert!(seen.insert(*idx), "event {} consumed twice", idx);
                }
            }
        }
    }
}
