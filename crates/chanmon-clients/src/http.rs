//! Mapping of reqwest responses and errors onto [`ServiceError`].

use crate::error::Result;
use chanmon_core::{ServiceError, ServiceResult};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("chanmon/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Basic auth when both halves of the credentials are present.
pub(crate) fn with_auth(
    req: RequestBuilder,
    username: Option<&str>,
    password: Option<&str>,
) -> RequestBuilder {
    match (username, password) {
        (Some(user), Some(password)) => req.basic_auth(user, Some(password)),
        _ => req,
    }
}

pub(crate) async fn send(service: &'static str, req: RequestBuilder) -> ServiceResult<Response> {
    let response = req.send().await.map_err(|e| ServiceError::Transport {
        service,
        detail: e.to_string(),
    })?;
    if response.status().is_success() {
        return Ok(response);
    }
    Err(rejected(service, response).await)
}

pub(crate) async fn rejected(service: &'static str, response: Response) -> ServiceError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    ServiceError::Rejected {
        service,
        status: status.as_u16(),
        body: truncate(body.trim()),
    }
}

pub(crate) async fn json<T: DeserializeOwned>(
    service: &'static str,
    req: RequestBuilder,
) -> ServiceResult<T> {
    let response = send(service, req).await?;
    response
        .json()
        .await
        .map_err(|e| ServiceError::decode(service, e.to_string()))
}

pub(crate) async fn text(service: &'static str, req: RequestBuilder) -> ServiceResult<String> {
    let response = send(service, req).await?;
    response
        .text()
        .await
        .map_err(|e| ServiceError::decode(service, e.to_string()))
}

pub(crate) fn is_not_found(err: &ServiceError) -> bool {
    matches!(err, ServiceError::Rejected { status, .. } if *status == StatusCode::NOT_FOUND.as_u16())
}

fn truncate(body: &str) -> String {
    const MAX: usize = 512;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        let out = truncate(&body);
        assert_eq!(out.len(), 515);
        assert!(out.ends_with("..."));
        assert_eq!(truncate("short"), "short");
    }

    #[test]
    fn not_found_detection() {
        let err = ServiceError::Rejected {
            service: "jenkins",
            status: 404,
            body: String::new(),
        };
        assert!(is_not_found(&err));
        assert!(!is_not_found(&ServiceError::other("jenkins", "x")));
    }
}
