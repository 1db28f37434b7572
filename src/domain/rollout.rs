//! Rollout domain types
//!
//! Defines the rollout workflow as a state machine with explicit phases and
//! the `RolloutRun` record that accumulates per-phase outcomes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Phases of a rollout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RolloutPhase {
    Idle,
    GraphBuilt,
    Applying,
    AwaitingDependencies,
    Building,
    Restarting,
    AwaitingTarget,
    SmokeTesting,
    Done,
    Failed,
}

impl RolloutPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::GraphBuilt => "GraphBuilt",
            Self::Applying => "Applying",
            Self::AwaitingDependencies => "AwaitingDependencies",
            Self::Building => "Building",
            Self::Restarting => "Restarting",
            Self::AwaitingTarget => "AwaitingTarget",
            Self::SmokeTesting => "SmokeTesting",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Idle => "💤",
            Self::GraphBuilt => "🧭",
            Self::Applying => "📝",
            Self::AwaitingDependencies => "⏳",
            Self::Building => "🔨",
            Self::Restarting => "🔄",
            Self::AwaitingTarget => "👀",
            Self::SmokeTesting => "🧪",
            Self::Done => "✅",
            Self::Failed => "❌",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Legal transitions. Applying and AwaitingDependencies alternate once per tier.
    pub fn can_transition_to(&self, next: RolloutPhase) -> bool {
        use RolloutPhase::*;

        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (*self, next),
            (Idle, GraphBuilt)
                | (GraphBuilt, Applying)
                | (GraphBuilt, Building)
                | (Applying, Applying)
                | (Applying, AwaitingDependencies)
                | (Applying, Building)
                | (AwaitingDependencies, AwaitingDependencies)
                | (AwaitingDependencies, Applying)
                | (AwaitingDependencies, Building)
                | (Building, Restarting)
                | (Restarting, AwaitingTarget)
                | (AwaitingTarget, SmokeTesting)
                | (SmokeTesting, Done)
        )
    }
}

impl fmt::Display for RolloutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one executed phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseOutcome {
    Success,
    Failure,
    Timeout,
    Cancelled,
    Skipped,
    /// Completed with non-fatal problems (smoke test only)
    Degraded,
}

#[derive(Debug, Clone)]
pub struct PhaseRecord {
    pub phase: RolloutPhase,
    pub outcome: PhaseOutcome,
    pub duration: Duration,
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Why a run ended in `Failed`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub phase: RolloutPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub cause: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_state: Option<String>,
}

/// Resource counts accumulated across applied tiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyCounts {
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Record of one rollout invocation
#[derive(Debug, Clone)]
pub struct RolloutRun {
    pub id: Uuid,
    pub target: String,
    pub started_at: DateTime<Utc>,
    phase: RolloutPhase,
    records: Vec<PhaseRecord>,
    log: Vec<LogEntry>,
    applied: ApplyCounts,
    failure: Option<FailureReport>,
}

impl RolloutRun {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.into(),
            started_at: Utc::now(),
            phase: RolloutPhase::Idle,
            records: Vec::new(),
            log: Vec::new(),
            applied: ApplyCounts::default(),
            failure: None,
        }
    }

    pub fn phase(&self) -> RolloutPhase {
        self.phase
    }

    pub fn records(&self) -> &[PhaseRecord] {
        &self.records
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn applied(&self) -> ApplyCounts {
        self.applied
    }

    pub fn failure(&self) -> Option<&FailureReport> {
        self.failure.as_ref()
    }

    /// Phases visited, in order, without consecutive repeats
    pub fn visited(&self) -> Vec<RolloutPhase> {
        let mut phases: Vec<RolloutPhase> = Vec::new();
        for record in &self.records {
            if phases.last() != Some(&record.phase) {
                phases.push(record.phase);
            }
        }
        phases
    }

    pub fn has_visited(&self, phase: RolloutPhase) -> bool {
        self.records.iter().any(|r| r.phase == phase)
    }

    pub fn transition(&mut self, next: RolloutPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal rollout transition {} -> {}",
            self.phase,
            next
        );
        self.phase = next;
    }

    pub fn record(
        &mut self,
        outcome: PhaseOutcome,
        duration: Duration,
        detail: Option<String>,
    ) {
        self.records.push(PhaseRecord {
            phase: self.phase,
            outcome,
            duration,
            detail,
        });
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.log.push(LogEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }

    pub fn count_applied(&mut self, changed: usize, unchanged: usize, failed: usize) {
        self.applied.changed += changed;
        self.applied.unchanged += unchanged;
        self.applied.failed += failed;
    }

    pub fn complete(&mut self) {
        self.transition(RolloutPhase::Done);
        self.note("rollout complete");
    }

    pub fn fail(&mut self, report: FailureReport) {
        self.note(format!("rollout failed in {}: {}", report.phase, report.cause));
        self.failure = Some(report);
        self.transition(RolloutPhase::Failed);
    }

    pub fn total_duration(&self) -> Duration {
        self.records.iter().map(|r| r.duration).sum()
    }

    /// Serializable summary, one JSON object per run
    pub fn summary(&self) -> RolloutSummary {
        RolloutSummary {
            id: self.id,
            target: self.target.clone(),
            started_at: self.started_at,
            phases: self
                .records
                .iter()
                .map(|r| PhaseSummary {
                    name: r.phase,
                    outcome: r.outcome,
                    duration_ms: r.duration.as_millis() as u64,
                    detail: r.detail.clone(),
                })
                .collect(),
            resources: self.applied,
            final_state: self.phase,
            failure: self.failure.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSummary {
    pub name: RolloutPhase,
    pub outcome: PhaseOutcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutSummary {
    pub id: Uuid,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub phases: Vec<PhaseSummary>,
    pub resources: ApplyCounts,
    pub final_state: RolloutPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
}
