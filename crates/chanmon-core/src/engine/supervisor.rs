//! Supervised execution of one remote build for one project.
//!
//! ```text
//! TriggerRequested ──▶ AwaitingBuild ──▶ Polling ──▶ Terminal(verdict)
//!        │                   │
//!        └──── error ────────┴──────────────────────▶ Terminal(trigger error)
//! ```
//!
//! `AwaitingBuild` retries without bound, but only while the build service
//! reports the build as not materialized yet. `Polling` is bounded by the
//! project's timeout.

use super::report::{ProjectOutcome, ProjectReport};
use super::EngineSettings;
use crate::error::ServiceResult;
use crate::services::{ExecutionUpdate, Services};
use crate::types::{
    BuildInfo, BuildResult, ExecutionStatus, IssueState, ProjectSpec, RevisionDescriptor,
    TrackedTarget,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

#[derive(Debug)]
enum Phase {
    TriggerRequested,
    AwaitingBuild { number: u64 },
    Polling {
        number: u64,
        started: Instant,
        latest: BuildInfo,
    },
    Terminal(Verdict),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    Succeeded { number: u64, result: BuildResult },
    Failed { number: u64, result: BuildResult },
    TimedOut { number: u64 },
    TriggerError { number: Option<u64>, reason: String },
}

pub(crate) struct JobSupervisor {
    pub services: Services,
    pub settings: Arc<EngineSettings>,
    pub target: Arc<TrackedTarget>,
    pub revision: RevisionDescriptor,
    pub project: ProjectSpec,
    pub subtask: String,
    pub execution_id: u64,
}

impl JobSupervisor {
    /// Drive the build to a terminal state, record the outcome and hand the
    /// subtask over to the project's assignee.
    pub async fn run(self) -> ProjectReport {
        let mut phase = Phase::TriggerRequested;
        let verdict = loop {
            phase = match phase {
                Phase::TriggerRequested => self.trigger().await,
                Phase::AwaitingBuild { number } => self.await_build(number).await,
                Phase::Polling {
                    number,
                    started,
                    latest,
                } => self.poll(number, started, latest).await,
                Phase::Terminal(verdict) => break verdict,
            };
        };

        let mut report = ProjectReport::new(&self.project.name, ProjectOutcome::AlreadyDone);
        report.subtask = Some(self.subtask.clone());
        report.execution_id = Some(self.execution_id);
        report.build = match &verdict {
            Verdict::Succeeded { number, .. }
            | Verdict::Failed { number, .. }
            | Verdict::TimedOut { number } => Some(*number),
            Verdict::TriggerError { number, .. } => *number,
        };
        report.outcome = self.finish(verdict).await;

        self.bookkeep(
            "assign subtask",
            self.services
                .tracker
                .assign_issue(&self.subtask, &self.project.assignee)
                .await,
        );
        report
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    async fn trigger(&self) -> Phase {
        let job = &self.project.job;
        let number = match self.services.builds.next_build_number(job).await {
            Ok(n) => n,
            Err(e) => {
                return Phase::Terminal(Verdict::TriggerError {
                    number: None,
                    reason: format!("could not read the next build number: {e}"),
                })
            }
        };

        let update = ExecutionUpdate {
            status: ExecutionStatus::InProgress,
            ci_link: Some(self.build_url(number)),
            report_link: None,
        };
        self.bookkeep(
            "mark execution in progress",
            self.services
                .ledger
                .update_execution(self.execution_id, &update)
                .await,
        );
        self.bookkeep(
            "move subtask to in progress",
            self.services
                .tracker
                .transition_issue(&self.subtask, IssueState::InProgress)
                .await,
        );

        let parameters = self.build_parameters();
        match self
            .services
            .builds
            .trigger_build(job, self.project.job_token.as_deref(), &parameters)
            .await
        {
            Ok(()) => {
                info!(project = %self.project.name, job = %job, build = number, "build triggered");
                Phase::AwaitingBuild { number }
            }
            Err(e) => Phase::Terminal(Verdict::TriggerError {
                number: Some(number),
                reason: e.to_string(),
            }),
        }
    }

    async fn await_build(&self, number: u64) -> Phase {
        let job = &self.project.job;
        loop {
            match self.services.builds.build_info(job, number).await {
                Ok(info) => {
                    debug!(job = %job, build = number, "build materialized");
                    return Phase::Polling {
                        number,
                        started: Instant::now(),
                        latest: info,
                    };
                }
                Err(e) if e.is_transient() => {
                    debug!(job = %job, build = number, "build not materialized yet");
                    sleep(self.settings.materialize_backoff).await;
                }
                Err(e) => {
                    return Phase::Terminal(Verdict::TriggerError {
                        number: Some(number),
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    async fn poll(&self, number: u64, started: Instant, mut latest: BuildInfo) -> Phase {
        let job = &self.project.job;
        loop {
            if let Some(result) = latest.result {
                return Phase::Terminal(if result.is_success() {
                    Verdict::Succeeded { number, result }
                } else {
                    Verdict::Failed { number, result }
                });
            }
            if started.elapsed() >= self.project.timeout {
                return Phase::Terminal(Verdict::TimedOut { number });
            }
            sleep(self.settings.poll_interval).await;
            match self.services.builds.build_info(job, number).await {
                Ok(info) => latest = info,
                Err(e) => warn!(job = %job, build = number, error = %e, "poll failed"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Terminal bookkeeping
    // -----------------------------------------------------------------------

    async fn finish(&self, verdict: Verdict) -> ProjectOutcome {
        match verdict {
            Verdict::Succeeded { number, result } => self.record_success(number, result).await,
            Verdict::Failed { number, result } => {
                warn!(project = %self.project.name, build = number, %result, "build failed");
                let body = format!(
                    "Build {} finished with result {result}.",
                    self.build_url(number)
                );
                self.record_failure(&body).await;
                ProjectOutcome::Failed { result }
            }
            Verdict::TimedOut { number } => {
                warn!(project = %self.project.name, build = number, "build timed out");
                let body = format!(
                    "Build {} produced no result within {}s (timeout).",
                    self.build_url(number),
                    self.project.timeout.as_secs()
                );
                self.record_failure(&body).await;
                ProjectOutcome::TimedOut
            }
            Verdict::TriggerError { reason, .. } => {
                warn!(project = %self.project.name, job = %self.project.job, %reason, "could not start build");
                let body = format!("Could not start job {}: {reason}", self.project.job);
                self.record_failure(&body).await;
                ProjectOutcome::TriggerFailed { reason }
            }
        }
    }

    async fn record_success(&self, number: u64, result: BuildResult) -> ProjectOutcome {
        let job = &self.project.job;
        let build_url = self.build_url(number);

        let log = match self.services.builds.build_log(job, number).await {
            Ok(log) => Some(log),
            Err(e) => {
                warn!(job = %job, build = number, error = %e, "could not fetch build log");
                None
            }
        };
        let report = log.as_deref().and_then(|log| {
            self.settings
                .report_pattern
                .find(log)
                .map(|m| m.as_str().to_string())
        });
        if let Some(log) = &log {
            let filename = format!("{job}-{number}.log");
            self.bookkeep(
                "attach build log",
                self.services
                    .tracker
                    .attach_to_issue(&self.subtask, &filename, log.as_bytes())
                    .await,
            );
        }

        let update = ExecutionUpdate {
            status: ExecutionStatus::Completed,
            ci_link: Some(build_url.clone()),
            report_link: report.clone(),
        };
        self.bookkeep(
            "mark execution completed",
            self.services
                .ledger
                .update_execution(self.execution_id, &update)
                .await,
        );

        let body = match &report {
            Some(url) => format!("Build {build_url} finished with result {result}. Test report: {url}"),
            None => format!(
                "Build {build_url} finished with result {result}, but no test report was found \
                 in the log. Needs manual review: move this subtask to review once the results \
                 are checked."
            ),
        };
        self.bookkeep(
            "comment on subtask",
            self.services.tracker.comment_issue(&self.subtask, &body).await,
        );

        // An unreviewed subtask is what holds the ticket back on later passes.
        match report {
            Some(report) => {
                self.bookkeep(
                    "move subtask to review",
                    self.services
                        .tracker
                        .transition_issue(&self.subtask, IssueState::InReview)
                        .await,
                );
                info!(project = %self.project.name, build = number, %report, "build passed");
                ProjectOutcome::Passed { report }
            }
            None => {
                warn!(project = %self.project.name, build = number, "build passed without a test report");
                ProjectOutcome::PassedNeedsReview
            }
        }
    }

    async fn record_failure(&self, body: &str) {
        self.bookkeep(
            "mark execution failed",
            self.services
                .ledger
                .update_execution(self.execution_id, &ExecutionUpdate::status(ExecutionStatus::Failed))
                .await,
        );
        self.bookkeep(
            "comment on subtask",
            self.services.tracker.comment_issue(&self.subtask, body).await,
        );
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn build_url(&self, number: u64) -> String {
        format!("{}/{number}", self.services.builds.job_url(&self.project.job))
    }

    fn build_parameters(&self) -> BTreeMap<String, String> {
        let t = &self.target;
        let mut parameters = self.settings.build_parameters.clone();
        parameters.insert(
            "EXTRA_SNAPS".to_string(),
            format!("--snap={}={}/{}", t.name, t.track, t.channel),
        );
        let under_test = serde_json::json!({
            "name": t.name,
            "version": self.revision.version,
            "revision": self.revision.revision,
            "track": t.track,
            "channel": t.channel,
            "arch": t.arch,
            "store": t.store,
        });
        parameters.insert("UNDER_TEST".to_string(), under_test.to_string());
        parameters
    }

    fn bookkeep<T>(&self, what: &str, result: ServiceResult<T>) {
        if let Err(e) = result {
            warn!(project = %self.project.name, subtask = %self.subtask, error = %e, "could not {what}");
        }
    }
}
