//! Contracts of the external collaborators the engine drives.
//!
//! Every call is a network round trip in production and is treated as
//! fallible. Implementations live in `chanmon-clients`; the engine tests use
//! in-memory fakes.

use crate::error::ServiceResult;
use crate::types::{
    ArtefactBuild, ArtefactRecord, BuildInfo, ExecutionStatus, Issue, IssueQuery, IssueState,
    NewIssue,
};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Revision source
// ---------------------------------------------------------------------------

/// One published channel of a snap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMapEntry {
    pub track: String,
    pub risk: String,
    pub architecture: String,
    pub version: String,
    pub revision: i64,
    pub grade: Option<String>,
}

#[async_trait]
pub trait RevisionSource: Send + Sync {
    async fn channel_map(&self, name: &str, store: &str) -> ServiceResult<Vec<ChannelMapEntry>>;
}

// ---------------------------------------------------------------------------
// Artefact ledger
// ---------------------------------------------------------------------------

/// Registration of a new execution record for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRequest {
    pub name: String,
    pub version: String,
    pub revision: i64,
    pub arch: String,
    pub environment: String,
    pub ci_link: String,
    pub test_plan: String,
    pub initial_status: ExecutionStatus,
    pub family: String,
    pub track: String,
    pub store: String,
    pub execution_stage: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionUpdate {
    pub status: ExecutionStatus,
    pub ci_link: Option<String>,
    pub report_link: Option<String>,
}

impl ExecutionUpdate {
    pub fn status(status: ExecutionStatus) -> Self {
        Self {
            status,
            ci_link: None,
            report_link: None,
        }
    }
}

#[async_trait]
pub trait ArtefactLedger: Send + Sync {
    /// `Ok` with [`ArtefactStatus::Empty`](crate::types::ArtefactStatus::Empty)
    /// when no record matches; `Err` when the ledger could not be queried.
    async fn artefact_status(
        &self,
        name: &str,
        version: &str,
        family: &str,
    ) -> ServiceResult<ArtefactRecord>;

    async fn execution_results(&self, artefact_id: u64) -> ServiceResult<Vec<ArtefactBuild>>;

    /// Returns the new execution id.
    async fn start_execution(&self, request: &ExecutionRequest) -> ServiceResult<u64>;

    async fn update_execution(&self, id: u64, update: &ExecutionUpdate) -> ServiceResult<()>;
}

// ---------------------------------------------------------------------------
// Build trigger
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BuildTrigger: Send + Sync {
    /// Browser URL of `job`; build `n` lives at `{job_url}/{n}`.
    fn job_url(&self, job: &str) -> String;

    async fn next_build_number(&self, job: &str) -> ServiceResult<u64>;

    async fn trigger_build(
        &self,
        job: &str,
        token: Option<&str>,
        parameters: &BTreeMap<String, String>,
    ) -> ServiceResult<()>;

    /// `Err(NotReady)` while the build has not been materialized.
    async fn build_info(&self, job: &str, number: u64) -> ServiceResult<BuildInfo>;

    async fn build_log(&self, job: &str, number: u64) -> ServiceResult<String>;
}

// ---------------------------------------------------------------------------
// Issue tracker
// ---------------------------------------------------------------------------

#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn find_issue(&self, query: &IssueQuery) -> ServiceResult<Option<Issue>>;

    async fn create_issue(&self, issue: &NewIssue) -> ServiceResult<Issue>;

    async fn transition_issue(&self, key: &str, state: IssueState) -> ServiceResult<()>;

    async fn comment_issue(&self, key: &str, body: &str) -> ServiceResult<()>;

    async fn attach_to_issue(&self, key: &str, filename: &str, content: &[u8])
        -> ServiceResult<()>;

    async fn assign_issue(&self, key: &str, assignee: &str) -> ServiceResult<()>;
}

// ---------------------------------------------------------------------------
// Services bundle
// ---------------------------------------------------------------------------

/// The four collaborators, shared by the engine and its supervisors.
#[derive(Clone)]
pub struct Services {
    pub revisions: Arc<dyn RevisionSource>,
    pub ledger: Arc<dyn ArtefactLedger>,
    pub builds: Arc<dyn BuildTrigger>,
    pub tracker: Arc<dyn IssueTracker>,
}
