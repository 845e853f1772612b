//! Jira REST v2: revision tickets and per-project subtasks.

use crate::error::{ClientError, Result};
use crate::http;
use async_trait::async_trait;
use chanmon_core::config::JiraConfig;
use chanmon_core::types::{Issue, IssueKind, IssueQuery, IssueState, IssueStatus, NewIssue};
use chanmon_core::{IssueTracker, ServiceError, ServiceResult};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const SERVICE: &str = "jira";

pub struct JiraClient {
    client: Client,
    base_url: String,
    username: Option<String>,
    token: Option<String>,
    config: JiraConfig,
}

impl JiraClient {
    pub fn new(config: &JiraConfig, token: Option<String>) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or(ClientError::MissingSetting("jira.url"))?;
        Ok(Self {
            client: http::client()?,
            base_url: url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            token,
            config: config.clone(),
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}/rest/api/2/{path}", self.base_url)
    }

    fn auth(&self, req: RequestBuilder) -> RequestBuilder {
        http::with_auth(req, self.username.as_deref(), self.token.as_deref())
    }

    fn jql(&self, query: &IssueQuery) -> String {
        let mut clauses = vec![format!("labels = \"{}\"", query.label)];
        if let Some(parent) = &query.parent {
            clauses.push(format!("parent = \"{parent}\""));
        }
        if let Some(project) = &self.config.project_key {
            clauses.push(format!("project = \"{project}\""));
        }
        clauses.join(" AND ")
    }

    fn state_name(&self, state: IssueState) -> &str {
        match state {
            IssueState::InProgress => &self.config.in_progress_state,
            IssueState::InReview => &self.config.in_review_state,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<WireIssue>,
}

#[derive(Debug, Deserialize)]
struct WireIssue {
    key: String,
    fields: WireFields,
}

#[derive(Debug, Deserialize)]
struct WireFields {
    status: WireName,
    parent: Option<WireKey>,
}

#[derive(Debug, Deserialize)]
struct WireName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireKey {
    key: String,
}

#[derive(Debug, Deserialize)]
struct TransitionsResponse {
    transitions: Vec<WireTransition>,
}

#[derive(Debug, Deserialize)]
struct WireTransition {
    id: String,
    name: String,
    to: Option<WireName>,
}

impl WireTransition {
    fn leads_to(&self, state: &str) -> bool {
        self.name.eq_ignore_ascii_case(state)
            || self
                .to
                .as_ref()
                .is_some_and(|to| to.name.eq_ignore_ascii_case(state))
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn find_issue(&self, query: &IssueQuery) -> ServiceResult<Option<Issue>> {
        let jql = self.jql(query);
        debug!(%jql, "searching issues");
        let req = self.auth(self.client.get(self.api("search"))).query(&[
            ("jql", jql.as_str()),
            ("fields", "status,parent"),
            ("maxResults", "1"),
        ]);
        let found: SearchResponse = http::json(SERVICE, req).await?;
        Ok(found.issues.into_iter().next().map(|i| Issue {
            key: i.key,
            status: IssueStatus::from_name(&i.fields.status.name),
            parent: i.fields.parent.map(|p| p.key),
        }))
    }

    async fn create_issue(&self, issue: &NewIssue) -> ServiceResult<Issue> {
        let project = self
            .config
            .project_key
            .as_deref()
            .or_else(|| issue.parent.as_deref().and_then(|p| p.split_once('-')).map(|(k, _)| k))
            .ok_or_else(|| ServiceError::other(SERVICE, "no project_key configured"))?;
        let issue_type = match issue.kind {
            IssueKind::Ticket => &self.config.ticket_type,
            IssueKind::Subtask => &self.config.subtask_type,
        };
        let mut fields = json!({
            "project": {"key": project},
            "summary": issue.summary,
            "issuetype": {"name": issue_type},
            "labels": [issue.label],
        });
        if let Some(parent) = &issue.parent {
            fields["parent"] = json!({"key": parent});
        }

        let req = self
            .auth(self.client.post(self.api("issue")))
            .json(&json!({ "fields": fields }));
        let created: WireKey = http::json(SERVICE, req).await?;
        Ok(Issue {
            key: created.key,
            status: IssueStatus::Open,
            parent: issue.parent.clone(),
        })
    }

    async fn transition_issue(&self, key: &str, state: IssueState) -> ServiceResult<()> {
        let url = self.api(&format!("issue/{key}/transitions"));
        let wanted = self.state_name(state);
        let available: TransitionsResponse =
            http::json(SERVICE, self.auth(self.client.get(&url))).await?;
        let Some(transition) = available.transitions.iter().find(|t| t.leads_to(wanted)) else {
            return Err(ServiceError::other(
                SERVICE,
                format!("{key} has no transition to '{wanted}'"),
            ));
        };

        let req = self
            .auth(self.client.post(&url))
            .json(&json!({"transition": {"id": transition.id}}));
        http::send(SERVICE, req).await?;
        Ok(())
    }

    async fn comment_issue(&self, key: &str, body: &str) -> ServiceResult<()> {
        let req = self
            .auth(self.client.post(self.api(&format!("issue/{key}/comment"))))
            .json(&json!({ "body": body }));
        http::send(SERVICE, req).await?;
        Ok(())
    }

    async fn attach_to_issue(
        &self,
        key: &str,
        filename: &str,
        content: &[u8],
    ) -> ServiceResult<()> {
        let form = Form::new().part(
            "file",
            Part::bytes(content.to_vec()).file_name(filename.to_string()),
        );
        let req = self
            .auth(self.client.post(self.api(&format!("issue/{key}/attachments"))))
            .header("X-Atlassian-Token", "no-check")
            .multipart(form);
        http::send(SERVICE, req).await?;
        Ok(())
    }

    async fn assign_issue(&self, key: &str, assignee: &str) -> ServiceResult<()> {
        let req = self
            .auth(self.client.put(self.api(&format!("issue/{key}/assignee"))))
            .json(&json!({ "name": assignee }));
        http::send(SERVICE, req).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(url: String) -> JiraClient {
        let config = JiraConfig {
            url: Some(url),
            username: Some("bot".into()),
            project_key: Some("CHAN".into()),
            ..JiraConfig::default()
        };
        JiraClient::new(&config, Some("secret".into())).unwrap()
    }

    #[test]
    fn url_is_required() {
        assert!(matches!(
            JiraClient::new(&JiraConfig::default(), None),
            Err(ClientError::MissingSetting("jira.url"))
        ));
    }

    #[test]
    fn jql_scopes_by_parent_and_project() {
        let jira = client("https://jira.example".into());
        let jql = jira.jql(&IssueQuery {
            label: "rpi4-rev150".into(),
            parent: Some("CHAN-7".into()),
        });
        assert_eq!(
            jql,
            r#"labels = "rpi4-rev150" AND parent = "CHAN-7" AND project = "CHAN""#
        );
    }

    #[tokio::test]
    async fn find_issue_maps_status_names() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/rest/api/2/search")
            .match_query(Matcher::UrlEncoded(
                "jql".into(),
                r#"labels = "core22-rev150" AND project = "CHAN""#.into(),
            ))
            .with_header("content-type", "application/json")
            .with_body(
                json!({"issues": [{
                    "key": "CHAN-9",
                    "fields": {"status": {"name": "In Review"}, "parent": {"key": "CHAN-1"}}
                }]})
                .to_string(),
            )
            .create_async()
            .await;

        let issue = client(server.url())
            .find_issue(&IssueQuery {
                label: "core22-rev150".into(),
                parent: None,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(issue.key, "CHAN-9");
        assert_eq!(issue.status, IssueStatus::InReview);
        assert_eq!(issue.parent.as_deref(), Some("CHAN-1"));
    }

    #[tokio::test]
    async fn no_hit_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/rest/api/2/search")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(r#"{"startAt": 0, "total": 0, "issues": []}"#)
            .create_async()
            .await;

        let found = client(server.url())
            .find_issue(&IssueQuery {
                label: "x".into(),
                parent: None,
            })
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn create_subtask_with_label_and_parent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/api/2/issue")
            .match_body(Matcher::PartialJson(json!({"fields": {
                "project": {"key": "CHAN"},
                "issuetype": {"name": "Sub-task"},
                "labels": ["rpi4-rev150"],
                "parent": {"key": "CHAN-9"}
            }})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "10001", "key": "CHAN-10", "self": "x"}"#)
            .create_async()
            .await;

        let issue = client(server.url())
            .create_issue(&NewIssue {
                parent: Some("CHAN-9".into()),
                summary: "core22 latest/stable amd64 on rpi4".into(),
                kind: IssueKind::Subtask,
                label: "rpi4-rev150".into(),
            })
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(issue.key, "CHAN-10");
        assert_eq!(issue.status, IssueStatus::Open);
    }

    #[tokio::test]
    async fn project_defaults_to_parent_prefix() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/api/2/issue")
            .match_body(Matcher::PartialJson(json!({"fields": {
                "project": {"key": "SNAPQA"},
                "issuetype": {"name": "Task"}
            }})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "10002", "key": "SNAPQA-44"}"#)
            .create_async()
            .await;
        let config = JiraConfig {
            url: Some(server.url()),
            ..JiraConfig::default()
        };

        let issue = JiraClient::new(&config, None)
            .unwrap()
            .create_issue(&NewIssue {
                parent: Some("SNAPQA-3".into()),
                summary: "core22 rev 150".into(),
                kind: IssueKind::Ticket,
                label: "core22-rev150".into(),
            })
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(issue.key, "SNAPQA-44");
    }

    #[tokio::test]
    async fn transition_is_resolved_by_name() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/rest/api/2/issue/CHAN-10/transitions")
            .with_header("content-type", "application/json")
            .with_body(
                json!({"transitions": [
                    {"id": "11", "name": "Start", "to": {"name": "In Progress"}},
                    {"id": "31", "name": "Review", "to": {"name": "In Review"}}
                ]})
                .to_string(),
            )
            .create_async()
            .await;
        let post = server
            .mock("POST", "/rest/api/2/issue/CHAN-10/transitions")
            .match_body(Matcher::Json(json!({"transition": {"id": "31"}})))
            .with_status(204)
            .create_async()
            .await;

        let jira = client(server.url());
        jira.transition_issue("CHAN-10", IssueState::InReview)
            .await
            .unwrap();
        post.assert_async().await;
    }

    #[tokio::test]
    async fn unknown_transition_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/rest/api/2/issue/CHAN-10/transitions")
            .with_header("content-type", "application/json")
            .with_body(r#"{"transitions": []}"#)
            .create_async()
            .await;

        let err = client(server.url())
            .transition_issue("CHAN-10", IssueState::InProgress)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("In Progress"));
    }

    #[tokio::test]
    async fn comment_attach_and_assign() {
        let mut server = mockito::Server::new_async().await;
        let comment = server
            .mock("POST", "/rest/api/2/issue/CHAN-10/comment")
            .match_body(Matcher::Json(json!({"body": "Build passed"})))
            .with_status(201)
            .create_async()
            .await;
        let attach = server
            .mock("POST", "/rest/api/2/issue/CHAN-10/attachments")
            .match_header("X-Atlassian-Token", "no-check")
            .match_body(Matcher::Regex(r#"filename="core22-rpi4-3\.log""#.into()))
            .with_status(200)
            .create_async()
            .await;
        let assign = server
            .mock("PUT", "/rest/api/2/issue/CHAN-10/assignee")
            .match_body(Matcher::Json(json!({"name": "jdoe"})))
            .with_status(204)
            .create_async()
            .await;

        let jira = client(server.url());
        jira.comment_issue("CHAN-10", "Build passed").await.unwrap();
        jira.attach_to_issue("CHAN-10", "core22-rpi4-3.log", b"Finished: SUCCESS\n")
            .await
            .unwrap();
        jira.assign_issue("CHAN-10", "jdoe").await.unwrap();

        comment.assert_async().await;
        attach.assert_async().await;
        assign.assert_async().await;
    }
}
