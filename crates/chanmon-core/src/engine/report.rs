use crate::types::{ArtefactStatus, BuildResult, RevisionDescriptor, TrackedTarget};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// Project outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProjectOutcome {
    /// A previous pass (or a human) already finished this project.
    AlreadyDone,
    /// The subtask or execution record could not be found or created.
    RecordUnavailable { reason: String },
    Passed { report: String },
    /// The build succeeded but no test report could be extracted.
    PassedNeedsReview,
    /// An earlier build finished but its subtask still waits for a human.
    AwaitingReview,
    Failed { result: BuildResult },
    TimedOut,
    TriggerFailed { reason: String },
    /// The supervisor task ended without producing an outcome.
    Aborted { reason: String },
}

impl ProjectOutcome {
    /// Whether this outcome lets the revision ticket move to review.
    pub fn is_ready(&self) -> bool {
        matches!(self, ProjectOutcome::AlreadyDone | ProjectOutcome::Passed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectOutcome::AlreadyDone => "already_done",
            ProjectOutcome::RecordUnavailable { .. } => "record_unavailable",
            ProjectOutcome::Passed { .. } => "passed",
            ProjectOutcome::PassedNeedsReview => "passed_needs_review",
            ProjectOutcome::AwaitingReview => "awaiting_review",
            ProjectOutcome::Failed { .. } => "failed",
            ProjectOutcome::TimedOut => "timed_out",
            ProjectOutcome::TriggerFailed { .. } => "trigger_failed",
            ProjectOutcome::Aborted { .. } => "aborted",
        }
    }
}

impl fmt::Display for ProjectOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectOutcome::Passed { report } => write!(f, "passed ({report})"),
            ProjectOutcome::Failed { result } => write!(f, "failed ({result})"),
            ProjectOutcome::RecordUnavailable { reason }
            | ProjectOutcome::TriggerFailed { reason }
            | ProjectOutcome::Aborted { reason } => write!(f, "{}: {reason}", self.as_str()),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectReport {
    pub project: String,
    pub subtask: Option<String>,
    pub execution_id: Option<u64>,
    pub build: Option<u64>,
    #[serde(flatten)]
    pub outcome: ProjectOutcome,
}

impl ProjectReport {
    pub fn new(project: impl Into<String>, outcome: ProjectOutcome) -> Self {
        Self {
            project: project.into(),
            subtask: None,
            execution_id: None,
            build: None,
            outcome,
        }
    }
}

// ---------------------------------------------------------------------------
// Target outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TargetOutcome {
    Unpublished,
    LedgerUnavailable { reason: String },
    /// The artefact already carries a review decision.
    ArtefactSettled { status: ArtefactStatus },
    /// No artefact exists and the engine is configured not to register one.
    ArtefactMissing,
    TrackerUnavailable { reason: String },
    TicketSettled { ticket: String, status: String },
    Reconciled { ticket: String, advanced: bool },
}

impl TargetOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetOutcome::Unpublished => "unpublished",
            TargetOutcome::LedgerUnavailable { .. } => "ledger_unavailable",
            TargetOutcome::ArtefactSettled { .. } => "artefact_settled",
            TargetOutcome::ArtefactMissing => "artefact_missing",
            TargetOutcome::TrackerUnavailable { .. } => "tracker_unavailable",
            TargetOutcome::TicketSettled { .. } => "ticket_settled",
            TargetOutcome::Reconciled { .. } => "reconciled",
        }
    }
}

impl fmt::Display for TargetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetOutcome::LedgerUnavailable { reason }
            | TargetOutcome::TrackerUnavailable { reason } => write!(f, "{}: {reason}", self.as_str()),
            TargetOutcome::ArtefactSettled { status } => write!(f, "artefact {status}"),
            TargetOutcome::TicketSettled { ticket, status } => write!(f, "{ticket} is {status}"),
            TargetOutcome::Reconciled { ticket, advanced: true } => {
                write!(f, "{ticket} moved to review")
            }
            TargetOutcome::Reconciled { ticket, advanced: false } => write!(f, "{ticket} in progress"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub key: String,
    pub name: String,
    pub track: String,
    pub channel: String,
    pub arch: String,
    pub revision: RevisionDescriptor,
    #[serde(flatten)]
    pub outcome: TargetOutcome,
    pub projects: Vec<ProjectReport>,
}

impl TargetReport {
    pub fn new(target: &TrackedTarget, revision: RevisionDescriptor, outcome: TargetOutcome) -> Self {
        Self {
            key: target.key.clone(),
            name: target.name.clone(),
            track: target.track.clone(),
            channel: target.channel.clone(),
            arch: target.arch.clone(),
            revision,
            outcome,
            projects: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// PassReport
// ---------------------------------------------------------------------------

/// Everything one reconciliation pass did, in catalog order.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub targets: Vec<TargetReport>,
}

impl PassReport {
    pub fn projects(&self) -> impl Iterator<Item = (&TargetReport, &ProjectReport)> {
        self.targets
            .iter()
            .flat_map(|t| t.projects.iter().map(move |p| (t, p)))
    }

    /// Projects that ended in a failure a human has to look at.
    pub fn failures(&self) -> usize {
        self.projects()
            .filter(|(_, p)| {
                matches!(
                    p.outcome,
                    ProjectOutcome::Failed { .. }
                        | ProjectOutcome::TimedOut
                        | ProjectOutcome::TriggerFailed { .. }
                        | ProjectOutcome::Aborted { .. }
                )
            })
            .count()
    }

    pub fn advanced(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| matches!(t.outcome, TargetOutcome::Reconciled { advanced: true, .. }))
            .count()
    }
}
