use super::report::{ProjectOutcome, ProjectReport, TargetOutcome, TargetReport};
use super::supervisor::JobSupervisor;
use super::Engine;
use crate::config::MissingArtefactPolicy;
use crate::revision::RevisionIndex;
use crate::services::ExecutionRequest;
use crate::types::{
    revision_label, subtask_label, ArtefactStatus, ExecutionStatus, Issue, IssueKind, IssueQuery,
    IssueState, NewIssue, ProjectSpec, RevisionDescriptor, TestExecution, TrackedTarget,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

enum Ticket {
    Active(String),
    Settled(Issue),
}

/// Where a project stands before any build is dispatched.
enum Dispatch {
    Done(ProjectReport),
    Supervise(JobSupervisor),
}

impl Engine {
    /// Reconcile a single target against the current external state.
    pub async fn reconcile_target(&self, target: &TrackedTarget, index: &RevisionIndex) -> TargetReport {
        let revision = index.resolve(target);
        let name = target.display_name();
        if !revision.is_published() {
            info!(snap = %name, "no revision published, skipping");
            return TargetReport::new(target, revision, TargetOutcome::Unpublished);
        }
        info!(snap = %name, %revision, "reconciling");

        let mut report = TargetReport::new(target, revision.clone(), TargetOutcome::Unpublished);
        report.outcome = self.reconcile_published(target, &revision, &mut report.projects).await;
        report
    }

    async fn reconcile_published(
        &self,
        target: &TrackedTarget,
        revision: &RevisionDescriptor,
        projects: &mut Vec<ProjectReport>,
    ) -> TargetOutcome {
        let name = target.display_name();

        // Ledger state decides whether this revision still needs testing.
        let record = match self
            .services
            .ledger
            .artefact_status(&target.name, &revision.version, &self.settings.family)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                warn!(snap = %name, error = %e, "artefact lookup failed, skipping target");
                return TargetOutcome::LedgerUnavailable {
                    reason: e.to_string(),
                };
            }
        };
        let executions = match (record.status, record.id) {
            (ArtefactStatus::Empty, _) => match self.settings.missing_artefact {
                MissingArtefactPolicy::Register => Vec::new(),
                MissingArtefactPolicy::RequireExisting => {
                    info!(snap = %name, "no artefact registered yet, skipping target");
                    return TargetOutcome::ArtefactMissing;
                }
            },
            (ArtefactStatus::Undecided, Some(id)) => {
                match self.services.ledger.execution_results(id).await {
                    Ok(builds) => builds
                        .into_iter()
                        .next()
                        .map(|b| b.test_executions)
                        .unwrap_or_default(),
                    Err(e) => {
                        warn!(snap = %name, artefact = id, error = %e, "execution lookup failed, skipping target");
                        return TargetOutcome::LedgerUnavailable {
                            reason: e.to_string(),
                        };
                    }
                }
            }
            (ArtefactStatus::Undecided, None) => Vec::new(),
            (status, _) => {
                info!(snap = %name, %status, "artefact already reviewed, nothing to do");
                return TargetOutcome::ArtefactSettled { status };
            }
        };

        let ticket = match self.revision_ticket(target, revision).await {
            Ok(Ticket::Active(key)) => key,
            Ok(Ticket::Settled(settled)) => {
                info!(snap = %name, ticket = %settled.key, status = %settled.status, "revision ticket already settled");
                return TargetOutcome::TicketSettled {
                    ticket: settled.key,
                    status: settled.status.to_string(),
                };
            }
            Err(reason) => {
                warn!(snap = %name, %reason, "revision ticket unavailable, skipping target");
                return TargetOutcome::TrackerUnavailable { reason };
            }
        };

        let shared = Arc::new(target.clone());
        let mut handles: Vec<(String, JoinHandle<ProjectReport>)> = Vec::new();
        let mut slots: Vec<Option<ProjectReport>> = Vec::new();
        for project in &target.projects {
            match self
                .prepare_project(&shared, revision, project, &ticket, &executions)
                .await
            {
                Dispatch::Done(report) => slots.push(Some(report)),
                Dispatch::Supervise(supervisor) => {
                    let permits = self.permits.clone();
                    let project_name = project.name.clone();
                    let handle = tokio::spawn(async move {
                        let _permit = match permits.acquire().await {
                            Ok(p) => p,
                            Err(_) => {
                                return ProjectReport::new(
                                    project_name,
                                    ProjectOutcome::Aborted {
                                        reason: "dispatch closed".into(),
                                    },
                                )
                            }
                        };
                        supervisor.run().await
                    });
                    handles.push((project.name.clone(), handle));
                    slots.push(None);
                }
            }
        }

        // Every supervisor finishes before the ticket is considered.
        let mut joined = Vec::with_capacity(handles.len());
        for (project, handle) in handles {
            match handle.await {
                Ok(report) => joined.push(report),
                Err(e) => joined.push(ProjectReport::new(
                    project,
                    ProjectOutcome::Aborted {
                        reason: format!("supervisor task failed: {e}"),
                    },
                )),
            }
        }
        let mut joined = joined.into_iter();
        for slot in slots {
            if let Some(report) = slot.or_else(|| joined.next()) {
                projects.push(report);
            }
        }

        let ready = projects.iter().all(|p| p.outcome.is_ready());
        let advanced = ready
            && match self
                .services
                .tracker
                .transition_issue(&ticket, IssueState::InReview)
                .await
            {
                Ok(()) => {
                    info!(snap = %name, ticket = %ticket, "all projects done, ticket moved to review");
                    true
                }
                Err(e) => {
                    warn!(snap = %name, ticket = %ticket, error = %e, "could not move ticket to review");
                    false
                }
            };
        if !ready {
            info!(snap = %name, ticket = %ticket, "ticket stays in progress");
        }
        TargetOutcome::Reconciled { ticket, advanced }
    }

    /// Find the revision ticket or create it.
    async fn revision_ticket(
        &self,
        target: &TrackedTarget,
        revision: &RevisionDescriptor,
    ) -> Result<Ticket, String> {
        let label = revision_label(&target.name, revision.revision);
        let query = IssueQuery {
            label: label.clone(),
            parent: target.epic.clone(),
        };
        match self.services.tracker.find_issue(&query).await {
            Ok(Some(issue)) if issue.status.is_settled() => return Ok(Ticket::Settled(issue)),
            Ok(Some(issue)) => {
                info!(ticket = %issue.key, %label, "reusing revision ticket");
                return Ok(Ticket::Active(issue.key));
            }
            Ok(None) => {}
            Err(e) => return Err(e.to_string()),
        }

        let new = NewIssue {
            parent: target.epic.clone(),
            summary: format!("{} rev {} ({})", target.display_name(), revision.revision, revision.version),
            kind: IssueKind::Ticket,
            label,
        };
        let issue = self
            .services
            .tracker
            .create_issue(&new)
            .await
            .map_err(|e| e.to_string())?;
        info!(ticket = %issue.key, label = %new.label, "created revision ticket");
        if let Err(e) = self
            .services
            .tracker
            .transition_issue(&issue.key, IssueState::InProgress)
            .await
        {
            warn!(ticket = %issue.key, error = %e, "could not move new ticket to in progress");
        }
        Ok(Ticket::Active(issue.key))
    }

    /// Resolve the subtask and execution record of one project.
    async fn prepare_project(
        &self,
        target: &Arc<TrackedTarget>,
        revision: &RevisionDescriptor,
        project: &ProjectSpec,
        ticket: &str,
        executions: &[TestExecution],
    ) -> Dispatch {
        let existing = executions.iter().find(|e| e.environment == project.name);

        let unavailable = |reason: String| {
            warn!(project = %project.name, %reason, "project record unavailable, skipping project");
            Dispatch::Done(ProjectReport::new(
                &project.name,
                ProjectOutcome::RecordUnavailable { reason },
            ))
        };

        let label = subtask_label(&project.name, revision.revision);
        let query = IssueQuery {
            label: label.clone(),
            parent: Some(ticket.to_string()),
        };
        let found = match self.services.tracker.find_issue(&query).await {
            Ok(found) => found,
            Err(e) => return unavailable(e.to_string()),
        };

        if let Some(issue) = found.as_ref().filter(|i| i.status.is_settled()) {
            info!(project = %project.name, subtask = %issue.key, status = %issue.status, "subtask already settled");
            let mut report = ProjectReport::new(&project.name, ProjectOutcome::AlreadyDone);
            report.subtask = Some(issue.key.clone());
            report.execution_id = existing.map(|e| e.id);
            return Dispatch::Done(report);
        }

        if let Some(execution) = existing.filter(|e| e.status.is_settled()) {
            // A finished build whose subtask never reached review is held for a human.
            let mut report = match &found {
                Some(issue) => {
                    info!(project = %project.name, subtask = %issue.key, status = %execution.status, "build finished, subtask awaits review");
                    let mut report = ProjectReport::new(&project.name, ProjectOutcome::AwaitingReview);
                    report.subtask = Some(issue.key.clone());
                    report
                }
                None => {
                    info!(project = %project.name, status = %execution.status, "already done");
                    ProjectReport::new(&project.name, ProjectOutcome::AlreadyDone)
                }
            };
            report.execution_id = Some(execution.id);
            return Dispatch::Done(report);
        }

        let subtask = match found {
            Some(issue) => issue.key,
            None => {
                let new = NewIssue {
                    parent: Some(ticket.to_string()),
                    summary: format!("{} on {}", target.display_name(), project.name),
                    kind: IssueKind::Subtask,
                    label,
                };
                match self.services.tracker.create_issue(&new).await {
                    Ok(issue) => {
                        info!(project = %project.name, subtask = %issue.key, "created subtask");
                        issue.key
                    }
                    Err(e) => return unavailable(e.to_string()),
                }
            }
        };

        let execution_id = match existing {
            Some(execution) => execution.id,
            None => {
                let request = ExecutionRequest {
                    name: target.name.clone(),
                    version: revision.version.clone(),
                    revision: revision.revision,
                    arch: target.arch.clone(),
                    environment: project.name.clone(),
                    ci_link: self.services.builds.job_url(&project.job),
                    test_plan: format!("{}-auto", project.name),
                    initial_status: ExecutionStatus::InProgress,
                    family: self.settings.family.clone(),
                    track: target.track.clone(),
                    store: target.store.clone(),
                    execution_stage: target.channel.clone(),
                };
                match self.services.ledger.start_execution(&request).await {
                    Ok(id) => id,
                    Err(e) => {
                        let mut dispatch = unavailable(e.to_string());
                        if let Dispatch::Done(report) = &mut dispatch {
                            report.subtask = Some(subtask);
                        }
                        return dispatch;
                    }
                }
            }
        };

        Dispatch::Supervise(JobSupervisor {
            services: self.services.clone(),
            settings: self.settings.clone(),
            target: target.clone(),
            revision: revision.clone(),
            project: project.clone(),
            subtask,
            execution_id,
        })
    }
}
