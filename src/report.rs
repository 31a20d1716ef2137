//! Human-readable terminal report
//!
//! Renders an [`AnalysisSummary`] as sectioned text. Colors come from the
//! `colored` crate and switch off automatically when stdout is not a
//! terminal (or when `NO_COLOR` is set).

use std::io::{self, Write};

use colored::{ColoredString, Colorize};
use serde_json::Value;

use crate::downtime::human_duration;
use crate::health::HealthStatus;
use crate::model::{EventType, Severity, ViewStatus};
use crate::summary::{node_labels, AnalysisSummary, ViewSummary};
use crate::timestamp::{self, Timestamp};
use crate::workflow::{Decision, Workflow};

/// How many of the most recent views are listed individually.
const RECENT_VIEWS: usize = 10;
/// How many state transitions are listed before eliding.
const RECENT_TRANSITIONS: usize = 20;

fn heading(title: &str) -> ColoredString {
    title.cyan().bold()
}

fn ts(t: &Timestamp) -> String {
    timestamp::format(t)
}

fn or_unknown(value: Option<&str>) -> &str {
    value.unwrap_or("unknown")
}

fn status_label(status: ViewStatus) -> ColoredString {
    match status {
        ViewStatus::Primary => "primary".green(),
        ViewStatus::NonPrimary => "non-primary".yellow(),
        ViewStatus::Disconnected => "disconnected".red(),
    }
}

fn severity_label(severity: Severity) -> ColoredString {
    match severity {
        Severity::Low => "low".normal(),
        Severity::Medium => "medium".yellow(),
        Severity::High => "high".red(),
        Severity::Critical => "critical".red().bold(),
    }
}

fn health_label(status: HealthStatus) -> ColoredString {
    match status {
        HealthStatus::Excellent | HealthStatus::Good => status.as_str().green().bold(),
        HealthStatus::Fair => status.as_str().yellow().bold(),
        HealthStatus::Poor | HealthStatus::Critical => status.as_str().red().bold(),
    }
}

/// Write the full text report.
pub fn write_text<W: Write>(summary: &AnalysisSummary, out: &mut W) -> io::Result<()> {
    write_header(summary, out)?;
    write_cluster(summary, out)?;
    write_health(summary, out)?;
    write_nodes(summary, out)?;
    write_transitions(summary, out)?;
    write_views(summary, out)?;
    write_workflows(&summary.st_workflows, out)?;
    write_ist(summary, out)?;
    write_downtime(summary, out)?;
    write_event_counts(summary, out)?;
    write_unknown(summary, out)?;
    write_warnings(summary, out)
}

fn write_header<W: Write>(summary: &AnalysisSummary, out: &mut W) -> io::Result<()> {
    let info = &summary.cluster_info;
    writeln!(out, "{}", "Galera Cluster Log Analysis".bold())?;
    writeln!(out, "   Software: {}", summary.software.dialect_display)?;
    match &info.detected_dialect {
        Some(detected) => writeln!(out, "   Dialect:  {} (detected {})", info.dialect, detected)?,
        None => writeln!(out, "   Dialect:  {}", info.dialect)?,
    }
    if let (Some(first), Some(last)) = (summary.timeline.first_event, summary.timeline.last_event) {
        writeln!(out, "   Span:     {} .. {}", ts(&first), ts(&last))?;
    }
    writeln!(out)
}

fn write_cluster<W: Write>(summary: &AnalysisSummary, out: &mut W) -> io::Result<()> {
    let info = &summary.cluster_info;
    writeln!(out, "{}", heading("Cluster"))?;
    writeln!(
        out,
        "   Nodes: {} total, {} active",
        info.total_nodes, info.active_nodes
    )?;
    writeln!(out, "   Views: {}", info.total_views)?;
    if let Some(view) = &info.current_view {
        writeln!(
            out,
            "   Current view: {} {} ({} members)",
            view.view_id,
            status_label(view.status),
            view.member_count
        )?;
    }
    if let Some(name) = &info.local_node_name {
        writeln!(out, "   Local node: {name}")?;
    }
    if let Some(uuid) = &info.node_instance_uuid {
        writeln!(out, "   Local instance: {uuid}")?;
    }
    writeln!(
        out,
        "   Group state: {}:{}",
        or_unknown(info.group_uuid.as_deref()),
        info.group_seqno.map_or_else(|| "-".to_string(), |s| s.to_string())
    )?;
    if info.local_state_uuid.is_some() || info.local_seqno.is_some() {
        writeln!(
            out,
            "   Local state: {}:{}",
            or_unknown(info.local_state_uuid.as_deref()),
            info.local_seqno.map_or_else(|| "-".to_string(), |s| s.to_string())
        )?;
    }
    if !info.configured_addresses.is_empty() {
        writeln!(out, "   Configured: {}", info.configured_addresses.join(", "))?;
    }
    for change in &info.group_changes {
        writeln!(
            out,
            "   {} group change {} -> {}",
            ts(&change.timestamp).dimmed(),
            change.from,
            change.to
        )?;
    }
    writeln!(out)
}

fn write_health<W: Write>(summary: &AnalysisSummary, out: &mut W) -> io::Result<()> {
    let metrics = &summary.health_metrics;
    let health = &summary.health_summary;
    writeln!(out, "{}", heading("Health"))?;
    writeln!(
        out,
        "   Stability: {}/100 {}",
        health.stability_score,
        health_label(health.health_status)
    )?;
    writeln!(
        out,
        "   {} view changes, {} state transitions, {} SST, {} IST",
        metrics.total_view_changes,
        metrics.total_state_transitions,
        metrics.sst_events,
        metrics.ist_events
    )?;
    writeln!(
        out,
        "   {} communication issues, {} warnings, {} errors",
        metrics.communication_issues, metrics.warnings, metrics.errors
    )?;
    if !metrics.nodes_that_joined.is_empty() {
        let joined: Vec<&str> = metrics.nodes_that_joined.iter().map(String::as_str).collect();
        writeln!(out, "   Joined: {}", joined.join(", "))?;
    }
    if !metrics.nodes_that_left.is_empty() {
        let left: Vec<&str> = metrics.nodes_that_left.iter().map(String::as_str).collect();
        writeln!(out, "   Left: {}", left.join(", "))?;
    }
    writeln!(out)
}

fn write_nodes<W: Write>(summary: &AnalysisSummary, out: &mut W) -> io::Result<()> {
    writeln!(out, "{}", heading("Nodes"))?;
    if summary.nodes.is_empty() {
        writeln!(out, "   {}", "(none identified)".dimmed())?;
    }
    for (name, node) in node_labels(&summary.nodes) {
        let status = match node.status.as_deref() {
            Some(s) if s.starts_with("SYNCED") => s.green(),
            Some(s) => s.yellow(),
            None => "-".dimmed(),
        };
        writeln!(
            out,
            "   {:<16} {:<12} {}  id={} addr={}",
            name.bold(),
            status,
            node.uuid,
            node.node_id.as_deref().unwrap_or("-"),
            node.address.as_deref().unwrap_or("-")
        )?;
        if !node.uuid_history.is_empty() {
            writeln!(out, "   {:<16} previously {}", "", node.uuid_history.join(", "))?;
        }
    }
    for (alias, canonical) in &summary.cluster_info.uuid_aliases {
        writeln!(out, "   {} {} -> {}", "alias".dimmed(), alias, canonical)?;
    }
    writeln!(out)
}

fn metadata_str<'a>(metadata: &'a Value, key: &str) -> &'a str {
    metadata.get(key).and_then(Value::as_str).unwrap_or("?")
}

fn write_transitions<W: Write>(summary: &AnalysisSummary, out: &mut W) -> io::Result<()> {
    let transitions: Vec<_> = summary
        .events
        .iter()
        .filter(|e| e.event_type == EventType::StateTransition)
        .collect();
    if transitions.is_empty() {
        return Ok(());
    }
    writeln!(out, "{}", heading("State transitions"))?;
    let skipped = transitions.len().saturating_sub(RECENT_TRANSITIONS);
    if skipped > 0 {
        writeln!(out, "   {}", format!("... {skipped} earlier").dimmed())?;
    }
    for event in &transitions[skipped..] {
        writeln!(
            out,
            "   {} {:<12} {} -> {}",
            ts(&event.timestamp).dimmed(),
            event.node.as_deref().unwrap_or("cluster"),
            metadata_str(&event.metadata, "from_state"),
            metadata_str(&event.metadata, "to_state")
        )?;
    }
    writeln!(out)
}

fn view_line(view: &ViewSummary) -> String {
    let names: Vec<&str> = view.members.iter().map(|m| m.name.as_str()).collect();
    let mut line = format!(
        "{} {} {} [{}]",
        ts(&view.timestamp),
        view.view_id,
        status_label(view.status),
        names.join(", ")
    );
    if !view.joined.is_empty() {
        line.push_str(&format!(" +{}", view.joined.join(",")));
    }
    if !view.left.is_empty() {
        line.push_str(&format!(" -{}", view.left.join(",")));
    }
    if !view.partitioned.is_empty() {
        line.push_str(&format!(" partitioned:{}", view.partitioned.join(",")));
    }
    line
}

fn write_views<W: Write>(summary: &AnalysisSummary, out: &mut W) -> io::Result<()> {
    if summary.views.is_empty() {
        return Ok(());
    }
    writeln!(out, "{}", heading("Views"))?;
    let skipped = summary.views.len().saturating_sub(RECENT_VIEWS);
    if skipped > 0 {
        writeln!(out, "   {}", format!("... {skipped} earlier").dimmed())?;
    }
    for view in &summary.views[skipped..] {
        writeln!(out, "   {}", view_line(view))?;
    }
    writeln!(out)
}

fn write_workflows<W: Write>(workflows: &[Workflow], out: &mut W) -> io::Result<()> {
    if workflows.is_empty() {
        return Ok(());
    }
    writeln!(out, "{}", heading("State transfers"))?;
    for wf in workflows {
        let label = wf.decision.as_str();
        let decision = match wf.decision {
            Decision::SstFailed => label.red().bold(),
            Decision::Unknown => label.dimmed(),
            _ => label.green().bold(),
        };
        writeln!(
            out,
            "   {} {} <- {} {}",
            ts(&wf.requested_at).dimmed(),
            wf.joiner.bold(),
            wf.donor,
            decision
        )?;
        let resync = &wf.full_resync;
        if let Some(start) = &resync.start {
            writeln!(
                out,
                "      full resync via {} started {}",
                or_unknown(resync.method.as_deref()),
                ts(start)
            )?;
        }
        if let Some(failed) = &resync.failed_at {
            writeln!(
                out,
                "      {} at {} (code {}): {}",
                "failed".red(),
                ts(failed),
                resync.error_code.map_or_else(|| "?".to_string(), |c| c.to_string()),
                resync.failure_reason.as_deref().unwrap_or("no reason logged")
            )?;
        }
        if let Some(done) = &resync.completed_at {
            let took = resync
                .duration_seconds
                .map(|d| format!(" in {}", human_duration(d)))
                .unwrap_or_default();
            writeln!(out, "      completed {}{}", ts(done), took)?;
        }
        let catchup = &wf.post_catchup;
        if let Some(range) = &catchup.receiver_prepared {
            writeln!(
                out,
                "      incremental {}-{} prepared {}",
                range.first_seqno,
                range.last_seqno,
                ts(&range.timestamp)
            )?;
        }
        if let Some(done) = &catchup.completed_at {
            writeln!(out, "      incremental completed {}", ts(done))?;
        }
    }
    writeln!(out)
}

fn write_ist<W: Write>(summary: &AnalysisSummary, out: &mut W) -> io::Result<()> {
    let Some(ist) = &summary.ist_summary else {
        return Ok(());
    };
    writeln!(out, "{}", heading("Incremental state transfer"))?;
    writeln!(
        out,
        "   {} events, {} sender ranges, {} async starts, {} failures",
        ist.counts.total, ist.counts.sender_ranges, ist.counts.async_starts, ist.counts.failures
    )?;
    let receiver = &ist.receiver;
    if let Some(range) = &receiver.prepared_range {
        writeln!(
            out,
            "   receiver prepared {}-{} at {}",
            range.first_seqno, range.last_seqno, range.listen_addr
        )?;
    }
    if let Some(done) = &receiver.completed_at {
        writeln!(out, "   receiver completed {}", ts(done))?;
    }
    if let Some(incomplete) = &receiver.incomplete {
        writeln!(
            out,
            "   {} expected {} got {}",
            "incomplete:".red(),
            incomplete.expected_last,
            incomplete.last_received
        )?;
    }
    for start in &ist.sender.async_starts {
        writeln!(
            out,
            "   serving {} {}-{} (preload {})",
            start.peer, start.first_seqno, start.last_seqno, start.preload_start
        )?;
    }
    for failure in &ist.sender.failures {
        writeln!(out, "   {} {}", "sender failed:".red(), failure.reason)?;
    }
    writeln!(out)
}

fn write_downtime<W: Write>(summary: &AnalysisSummary, out: &mut W) -> io::Result<()> {
    let downtime = &summary.downtime;
    writeln!(out, "{}", heading("Downtime"))?;
    if downtime.periods.is_empty() {
        writeln!(out, "   {}", "no downtime detected".green())?;
        return writeln!(out);
    }
    writeln!(
        out,
        "   {} periods, {} total, longest {}",
        downtime.total_periods,
        human_duration(downtime.total_downtime_seconds),
        human_duration(downtime.longest_period_seconds)
    )?;
    for period in &downtime.periods {
        writeln!(
            out,
            "   {} .. {} {:>8} {:<11} {} {}",
            ts(&period.start_time),
            ts(&period.end_time),
            human_duration(period.duration_seconds),
            period.gap_type.as_str(),
            severity_label(period.severity),
            period.description.dimmed()
        )?;
    }
    writeln!(out)
}

fn write_event_counts<W: Write>(summary: &AnalysisSummary, out: &mut W) -> io::Result<()> {
    writeln!(out, "{}", heading("Events"))?;
    writeln!(out, "   {} total", summary.timeline.total_events)?;
    for (event_type, count) in &summary.timeline.events_by_type {
        writeln!(out, "   {:<20} {}", event_type.as_str(), count)?;
    }
    writeln!(out)
}

fn write_unknown<W: Write>(summary: &AnalysisSummary, out: &mut W) -> io::Result<()> {
    let Some(unknown) = &summary.unknown else {
        return Ok(());
    };
    writeln!(out, "{}", heading("Unrecognized lines"))?;
    writeln!(out, "   {} lines matched no pattern", unknown.count)?;
    for sample in &unknown.samples {
        writeln!(out, "   {}", sample.dimmed())?;
    }
    writeln!(out)
}

fn write_warnings<W: Write>(summary: &AnalysisSummary, out: &mut W) -> io::Result<()> {
    for warning in &summary.warnings {
        writeln!(out, "{} {}", "warning:".yellow().bold(), warning)?;
    }
    Ok(())
}
