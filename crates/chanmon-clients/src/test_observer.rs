//! Test Observer: the artefact ledger.

use crate::error::Result;
use crate::http;
use async_trait::async_trait;
use chanmon_core::config::TestObserverConfig;
use chanmon_core::types::{ArtefactBuild, ArtefactRecord, ArtefactStatus, ExecutionStatus, TestExecution};
use chanmon_core::{ArtefactLedger, ExecutionRequest, ExecutionUpdate, ServiceResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "test-observer";

pub struct TestObserverClient {
    client: Client,
    base_url: String,
}

impl TestObserverClient {
    pub fn new(config: &TestObserverConfig) -> Result<Self> {
        Ok(Self {
            client: http::client()?,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireArtefact {
    id: u64,
    name: String,
    version: String,
    status: ArtefactStatus,
}

#[derive(Debug, Deserialize)]
struct WireBuild {
    #[serde(default)]
    test_executions: Vec<WireExecution>,
}

#[derive(Debug, Deserialize)]
struct WireExecution {
    id: u64,
    environment: WireEnvironment,
    status: ExecutionStatus,
}

#[derive(Debug, Deserialize)]
struct WireEnvironment {
    name: String,
}

#[derive(Debug, Deserialize)]
struct StartedExecution {
    id: u64,
}

#[derive(Debug, Serialize)]
struct PatchExecution<'a> {
    status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    ci_link: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    c3_link: Option<&'a str>,
}

#[async_trait]
impl ArtefactLedger for TestObserverClient {
    async fn artefact_status(
        &self,
        name: &str,
        version: &str,
        family: &str,
    ) -> ServiceResult<ArtefactRecord> {
        let req = self
            .client
            .get(format!("{}/v1/artefacts", self.base_url))
            .query(&[("family", family)]);
        let artefacts: Vec<WireArtefact> = http::json(SERVICE, req).await?;

        Ok(artefacts
            .into_iter()
            .find(|a| a.name == name && a.version == version)
            .map(|a| ArtefactRecord::new(a.id, a.status))
            .unwrap_or_else(ArtefactRecord::empty))
    }

    async fn execution_results(&self, artefact_id: u64) -> ServiceResult<Vec<ArtefactBuild>> {
        let req = self
            .client
            .get(format!("{}/v1/artefacts/{artefact_id}/builds", self.base_url));
        let builds: Vec<WireBuild> = http::json(SERVICE, req).await?;

        Ok(builds
            .into_iter()
            .map(|b| ArtefactBuild {
                test_executions: b
                    .test_executions
                    .into_iter()
                    .map(|e| TestExecution {
                        id: e.id,
                        environment: e.environment.name,
                        status: e.status,
                    })
                    .collect(),
            })
            .collect())
    }

    async fn start_execution(&self, request: &ExecutionRequest) -> ServiceResult<u64> {
        let req = self
            .client
            .put(format!("{}/v1/test-executions/start-test", self.base_url))
            .json(request);
        let started: StartedExecution = http::json(SERVICE, req).await?;
        Ok(started.id)
    }

    async fn update_execution(&self, id: u64, update: &ExecutionUpdate) -> ServiceResult<()> {
        let body = PatchExecution {
            status: update.status,
            ci_link: update.ci_link.as_deref(),
            c3_link: update.report_link.as_deref(),
        };
        let req = self
            .client
            .patch(format!("{}/v1/test-executions/{id}", self.base_url))
            .json(&body);
        http::send(SERVICE, req).await?;
        Ok(())
    }
}
