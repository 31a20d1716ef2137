//! Health metrics and the derived stability score

use std::collections::BTreeSet;

use serde::Serialize;

use crate::identity::NodeTable;
use crate::model::{ClusterView, EventType, LogEvent, NodeKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthStatus {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 90 => HealthStatus::Excellent,
            s if s >= 75 => HealthStatus::Good,
            s if s >= 60 => HealthStatus::Fair,
            s if s >= 40 => HealthStatus::Poor,
            _ => HealthStatus::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Excellent => "Excellent",
            HealthStatus::Good => "Good",
            HealthStatus::Fair => "Fair",
            HealthStatus::Poor => "Poor",
            HealthStatus::Critical => "Critical",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthMetrics {
    pub total_state_transitions: usize,
    pub total_view_changes: usize,
    pub nodes_that_joined: BTreeSet<String>,
    pub nodes_that_left: BTreeSet<String>,
    pub sst_events: usize,
    pub ist_events: usize,
    pub communication_issues: usize,
    pub warnings: usize,
    pub errors: usize,
}

impl HealthMetrics {
    pub fn collect(events: &[LogEvent], views: &[ClusterView], nodes: &NodeTable) -> Self {
        let mut metrics = HealthMetrics {
            total_view_changes: views.len(),
            ..HealthMetrics::default()
        };
        for event in events {
            match event.event_type() {
                EventType::StateTransition => metrics.total_state_transitions += 1,
                EventType::SstEvent => metrics.sst_events += 1,
                EventType::IstEvent => metrics.ist_events += 1,
                EventType::CommunicationIssue => metrics.communication_issues += 1,
                EventType::Warning => metrics.warnings += 1,
                EventType::Error => metrics.errors += 1,
                _ => {}
            }
        }

        let members = |v: &ClusterView| -> BTreeSet<NodeKey> {
            v.members.iter().map(|m| nodes.canonical(m.node)).collect()
        };
        for pair in views.windows(2) {
            let (before, after) = (members(&pair[0]), members(&pair[1]));
            for key in after.difference(&before) {
                metrics.nodes_that_joined.insert(nodes.get(*key).name.clone());
            }
            for key in before.difference(&after) {
                metrics.nodes_that_left.insert(nodes.get(*key).name.clone());
            }
        }
        metrics
    }

    /// 100 minus capped penalties for views, transitions, communication
    /// issues and errors.
    pub fn stability_score(&self) -> u32 {
        let penalty = |count: usize, per: usize, cap: usize| count.saturating_mul(per).min(cap);
        let total = penalty(self.total_view_changes, 5, 30)
            + penalty(self.total_state_transitions, 2, 20)
            + penalty(self.communication_issues, 10, 25)
            + penalty(self.errors, 15, 25);
        100u32.saturating_sub(total as u32)
    }

    pub fn health_status(&self) -> HealthStatus {
        HealthStatus::from_score(self.stability_score())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub stability_score: u32,
    pub health_status: HealthStatus,
}

impl From<&HealthMetrics> for HealthSummary {
    fn from(metrics: &HealthMetrics) -> Self {
        Self {
            stability_score: metrics.stability_score(),
            health_status: metrics.health_status(),
        }
    }
}
