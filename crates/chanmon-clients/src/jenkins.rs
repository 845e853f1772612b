use crate::error::{ClientError, Result};
use crate::http;
use async_trait::async_trait;
use chanmon_core::types::{BuildInfo, BuildResult};
use chanmon_core::{BuildTrigger, ServiceError, ServiceResult};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

const SERVICE: &str = "jenkins";

pub struct JenkinsClient {
    client: Client,
    base_url: String,
    username: Option<String>,
    token: Option<String>,
}

impl JenkinsClient {
    pub fn new(url: Option<&str>, username: Option<String>, token: Option<String>) -> Result<Self> {
        let url = url
            .filter(|u| !u.trim().is_empty())
            .ok_or(ClientError::MissingSetting("jenkins.url"))?;
        Ok(Self {
            client: http::client()?,
            base_url: url.trim_end_matches('/').to_string(),
            username,
            token,
        })
    }

    fn get(&self, url: String) -> RequestBuilder {
        http::with_auth(
            self.client.get(url),
            self.username.as_deref(),
            self.token.as_deref(),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobInfo {
    next_build_number: u64,
}

#[derive(Debug, Deserialize)]
struct WireBuildInfo {
    number: u64,
    result: Option<BuildResult>,
}

#[async_trait]
impl BuildTrigger for JenkinsClient {
    fn job_url(&self, job: &str) -> String {
        format!("{}/job/{job}", self.base_url)
    }

    async fn next_build_number(&self, job: &str) -> ServiceResult<u64> {
        let req = self
            .get(format!("{}/api/json", self.job_url(job)))
            .query(&[("tree", "nextBuildNumber")]);
        let info: JobInfo = http::json(SERVICE, req).await?;
        Ok(info.next_build_number)
    }

    async fn trigger_build(
        &self,
        job: &str,
        token: Option<&str>,
        parameters: &BTreeMap<String, String>,
    ) -> ServiceResult<()> {
        let mut req = http::with_auth(
            self.client
                .post(format!("{}/buildWithParameters", self.job_url(job))),
            self.username.as_deref(),
            self.token.as_deref(),
        )
        .query(parameters);
        if let Some(token) = token {
            req = req.query(&[("token", token)]);
        }
        http::send(SERVICE, req).await?;
        debug!(job, "build queued");
        Ok(())
    }

    async fn build_info(&self, job: &str, number: u64) -> ServiceResult<BuildInfo> {
        let req = self.get(format!("{}/{number}/api/json", self.job_url(job)));
        match http::json::<WireBuildInfo>(SERVICE, req).await {
            Ok(info) => Ok(BuildInfo {
                number: info.number,
                result: info.result,
            }),
            Err(e) if http::is_not_found(&e) => Err(ServiceError::not_ready(
                SERVICE,
                format!("{job} #{number} does not exist yet"),
            )),
            Err(e) => Err(e),
        }
    }

    async fn build_log(&self, job: &str, number: u64) -> ServiceResult<String> {
        let req = self.get(format!("{}/{number}/consoleText", self.job_url(job)));
        http::text(SERVICE, req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(url: String) -> JenkinsClient {
        JenkinsClient::new(Some(url.as_str()), Some("bot".into()), Some("secret".into())).unwrap()
    }

    #[test]
    fn url_is_required() {
        assert!(matches!(
            JenkinsClient::new(None, None, None),
            Err(ClientError::MissingSetting("jenkins.url"))
        ));
        assert!(JenkinsClient::new(Some("  "), None, None).is_err());
    }

    #[test]
    fn job_url_has_no_double_slash() {
        let c = JenkinsClient::new(Some("https://jenkins.example/"), None, None).unwrap();
        assert_eq!(c.job_url("core22-sanity"), "https://jenkins.example/job/core22-sanity");
    }

    #[tokio::test]
    async fn next_build_number_uses_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        // "bot:secret"
        let mock = server
            .mock("GET", "/job/core22-sanity/api/json")
            .match_query(Matcher::UrlEncoded("tree".into(), "nextBuildNumber".into()))
            .match_header("authorization", "Basic Ym90OnNlY3JldA==")
            .with_header("content-type", "application/json")
            .with_body(r#"{"_class": "hudson.model.FreeStyleProject", "nextBuildNumber": 42}"#)
            .create_async()
            .await;

        let n = client(server.url()).next_build_number("core22-sanity").await.unwrap();
        assert_eq!(n, 42);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn trigger_sends_token_and_parameters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/job/core22-sanity/buildWithParameters")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("token".into(), "job-tok".into()),
                Matcher::UrlEncoded("d_grade".into(), "true".into()),
                Matcher::UrlEncoded("EXTRA_SNAPS".into(), "--snap=core22=latest/stable".into()),
            ]))
            .with_status(201)
            .create_async()
            .await;

        let mut params = BTreeMap::new();
        params.insert("d_grade".to_string(), "true".to_string());
        params.insert("EXTRA_SNAPS".to_string(), "--snap=core22=latest/stable".to_string());
        client(server.url())
            .trigger_build("core22-sanity", Some("job-tok"), &params)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_trigger_is_not_transient() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/job/core22-sanity/buildWithParameters")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("No valid crumb")
            .create_async()
            .await;

        let err = client(server.url())
            .trigger_build("core22-sanity", None, &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn missing_build_is_not_ready() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/job/core22-sanity/7/api/json")
            .with_status(404)
            .create_async()
            .await;

        let err = client(server.url()).build_info("core22-sanity", 7).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn running_and_finished_builds() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/job/j/7/api/json")
            .with_header("content-type", "application/json")
            .with_body(r#"{"number": 7, "building": true, "result": null}"#)
            .create_async()
            .await;
        let _m = server
            .mock("GET", "/job/j/8/api/json")
            .with_header("content-type", "application/json")
            .with_body(r#"{"number": 8, "building": false, "result": "UNSTABLE"}"#)
            .create_async()
            .await;
        let _m = server
            .mock("GET", "/job/j/8/consoleText")
            .with_body("Started by remote host\nFinished: UNSTABLE\n")
            .create_async()
            .await;
        let jenkins = client(server.url());

        let running = jenkins.build_info("j", 7).await.unwrap();
        assert_eq!(running.result, None);
        let done = jenkins.build_info("j", 8).await.unwrap();
        assert_eq!(done.result, Some(BuildResult::Unstable));
        let log = jenkins.build_log("j", 8).await.unwrap();
        assert!(log.contains("Finished: UNSTABLE"));
    }
}
