//! The reconciliation engine.
//!
//! One pass walks the catalog target by target: resolve the published
//! revision, decide from ledger and tracker state whether anything is left to
//! do, dispatch a supervised build per outstanding project, then advance the
//! revision ticket once every project came back clean.
//!
//! Nothing is remembered between passes. Every decision is re-derived from the
//! external systems, so a pass interrupted at any point is resumed by simply
//! running the next one.

mod report;
mod supervisor;
mod target;


pub use report::{PassReport, ProjectOutcome, ProjectReport, TargetOutcome, TargetReport};

use crate::catalog::Catalog;
use crate::config::{Config, MissingArtefactPolicy};
use crate::error::Result;
use crate::revision::RevisionIndex;
use crate::services::Services;
use chrono::Utc;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::info;

/// Runtime knobs of the engine, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Upper bound on supervisors running at once across the whole pass.
    pub max_parallel: usize,
    pub materialize_backoff: Duration,
    pub poll_interval: Duration,
    pub missing_artefact: MissingArtefactPolicy,
    /// Ledger family artefacts are looked up in.
    pub family: String,
    pub report_pattern: Regex,
    pub build_parameters: BTreeMap<String, String>,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let engine = &config.engine;
        Ok(Self {
            max_parallel: engine.max_parallel.max(1),
            materialize_backoff: engine.materialize_backoff(),
            poll_interval: engine.poll_interval(),
            missing_artefact: engine.missing_artefact,
            family: config.test_observer.family.clone(),
            report_pattern: engine.compiled_report_pattern()?,
            build_parameters: engine.build_parameters.clone(),
        })
    }
}

pub struct Engine {
    services: Services,
    settings: Arc<EngineSettings>,
    permits: Arc<Semaphore>,
}

impl Engine {
    pub fn new(services: Services, settings: EngineSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_parallel.max(1)));
        Self {
            services,
            settings: Arc::new(settings),
            permits,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one reconciliation pass over every target of `catalog`.
    ///
    /// Failures are contained per target and per project and reported in the
    /// returned [`PassReport`]; the pass itself does not fail.
    pub async fn run(&self, catalog: &Catalog) -> PassReport {
        let started_at = Utc::now();
        info!(targets = catalog.len(), "starting reconciliation pass");

        let index = RevisionIndex::build(self.services.revisions.as_ref(), &catalog.targets).await;
        let mut targets = Vec::with_capacity(catalog.len());
        for target in &catalog.targets {
            targets.push(self.reconcile_target(target, &index).await);
        }

        let report = PassReport {
            started_at,
            finished_at: Utc::now(),
            targets,
        };
        info!(
            targets = report.targets.len(),
            advanced = report.advanced(),
            failures = report.failures(),
            "reconciliation pass finished"
        );
        report
    }
}
