use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// TrackedTarget / ProjectSpec
// ---------------------------------------------------------------------------

/// A published release identity that must be validated on every new revision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedTarget {
    /// Key of the catalog entry this target was loaded from.
    pub key: String,
    pub name: String,
    pub track: String,
    pub channel: String,
    pub arch: String,
    /// Store the snap is published in (`Snap-Device-Store`).
    pub store: String,
    /// Tracker epic the revision tickets hang under.
    pub epic: Option<String>,
    /// Only resolve channel entries whose snap grade matches.
    pub grade: Option<String>,
    pub projects: Vec<ProjectSpec>,
}

impl TrackedTarget {
    /// `name track/channel arch`, used in logs and ticket summaries.
    pub fn display_name(&self) -> String {
        format!(
            "{} {}/{} {}",
            self.name, self.track, self.channel, self.arch
        )
    }
}

/// One required test environment under a target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSpec {
    pub name: String,
    pub job: String,
    #[serde(skip_serializing)]
    pub job_token: Option<String>,
    pub assignee: String,
    /// Upper bound on the polling phase of a supervised build.
    pub timeout: Duration,
}

pub const DEFAULT_PROJECT_TIMEOUT: Duration = Duration::from_secs(7200);

// ---------------------------------------------------------------------------
// RevisionDescriptor
// ---------------------------------------------------------------------------

/// Sentinel used for both version and revision when nothing is published.
pub const UNPUBLISHED_REVISION: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionDescriptor {
    pub version: String,
    pub revision: i64,
}

impl RevisionDescriptor {
    pub fn new(version: impl Into<String>, revision: i64) -> Self {
        Self {
            version: version.into(),
            revision,
        }
    }

    pub fn unpublished() -> Self {
        Self {
            version: UNPUBLISHED_REVISION.to_string(),
            revision: UNPUBLISHED_REVISION,
        }
    }

    pub fn is_published(&self) -> bool {
        self.revision != UNPUBLISHED_REVISION
    }
}

impl fmt::Display for RevisionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (rev {})", self.version, self.revision)
    }
}

/// Label identifying the revision ticket of a target revision.
pub fn revision_label(target_name: &str, revision: i64) -> String {
    format!("{target_name}-rev{revision}")
}

/// Label identifying the subtask of a project for one revision.
pub fn subtask_label(project_name: &str, revision: i64) -> String {
    format!("{project_name}-rev{revision}")
}

// ---------------------------------------------------------------------------
// ArtefactRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtefactStatus {
    /// No record exists yet.
    Empty,
    Undecided,
    Approved,
    Rejected,
    MarkedAsFailed,
    #[serde(other)]
    Unknown,
}

impl ArtefactStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtefactStatus::Empty => "EMPTY",
            ArtefactStatus::Undecided => "UNDECIDED",
            ArtefactStatus::Approved => "APPROVED",
            ArtefactStatus::Rejected => "REJECTED",
            ArtefactStatus::MarkedAsFailed => "MARKED_AS_FAILED",
            ArtefactStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ArtefactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtefactRecord {
    pub id: Option<u64>,
    pub status: ArtefactStatus,
}

impl ArtefactRecord {
    pub fn empty() -> Self {
        Self {
            id: None,
            status: ArtefactStatus::Empty,
        }
    }

    pub fn new(id: u64, status: ArtefactStatus) -> Self {
        Self {
            id: Some(id),
            status,
        }
    }
}

// ---------------------------------------------------------------------------
// TestExecution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    #[serde(rename = "NOT_STARTED", alias = "PENDING")]
    Pending,
    InProgress,
    Completed,
    Passed,
    Failed,
    EndedPrematurely,
    #[serde(other)]
    Unknown,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "NOT_STARTED",
            ExecutionStatus::InProgress => "IN_PROGRESS",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::Passed => "PASSED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::EndedPrematurely => "ENDED_PREMATURELY",
            ExecutionStatus::Unknown => "UNKNOWN",
        }
    }

    /// The project needs no further runs for this revision.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Passed | ExecutionStatus::EndedPrematurely
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger execution record of one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestExecution {
    pub id: u64,
    pub environment: String,
    pub status: ExecutionStatus,
}

/// One build of an artefact as reported by the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtefactBuild {
    pub test_executions: Vec<TestExecution>,
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Unstable,
    Failure,
    Aborted,
    NotBuilt,
    #[serde(other)]
    Unknown,
}

impl BuildResult {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildResult::Success => "SUCCESS",
            BuildResult::Unstable => "UNSTABLE",
            BuildResult::Failure => "FAILURE",
            BuildResult::Aborted => "ABORTED",
            BuildResult::NotBuilt => "NOT_BUILT",
            BuildResult::Unknown => "UNKNOWN",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, BuildResult::Success | BuildResult::Unstable)
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub number: u64,
    /// Absent while the build is running.
    pub result: Option<BuildResult>,
}

// ---------------------------------------------------------------------------
// Tracker issues
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    InReview,
    Done,
    Rejected,
    Archived,
    Other(String),
}

impl IssueStatus {
    /// Map a tracker workflow status name onto the states the engine cares about.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "to do" | "open" | "backlog" | "new" => IssueStatus::Open,
            "in progress" => IssueStatus::InProgress,
            "in review" | "review" => IssueStatus::InReview,
            "done" | "closed" | "resolved" => IssueStatus::Done,
            "rejected" | "won't do" => IssueStatus::Rejected,
            "archived" => IssueStatus::Archived,
            _ => IssueStatus::Other(name.to_string()),
        }
    }

    /// A human has the record, or it is finished: the engine must not touch it.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            IssueStatus::InReview | IssueStatus::Done | IssueStatus::Rejected | IssueStatus::Archived
        )
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueStatus::Open => f.write_str("open"),
            IssueStatus::InProgress => f.write_str("in progress"),
            IssueStatus::InReview => f.write_str("in review"),
            IssueStatus::Done => f.write_str("done"),
            IssueStatus::Rejected => f.write_str("rejected"),
            IssueStatus::Archived => f.write_str("archived"),
            IssueStatus::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub key: String,
    pub status: IssueStatus,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Per-revision ticket under the target's epic.
    Ticket,
    /// Per-project subtask under a revision ticket.
    Subtask,
}

/// Workflow states the engine moves issues into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    InProgress,
    InReview,
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueState::InProgress => f.write_str("in progress"),
            IssueState::InReview => f.write_str("in review"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueQuery {
    pub label: String,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub parent: Option<String>,
    pub summary: String,
    pub kind: IssueKind,
    pub label: String,
}
