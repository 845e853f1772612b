//! HTTP implementations of the engine's collaborators.

pub mod error;
mod http;
pub mod jenkins;
pub mod jira;
pub mod snap_store;
pub mod test_observer;

pub use error::{ClientError, Result};
pub use jenkins::JenkinsClient;
pub use jira::JiraClient;
pub use snap_store::SnapStoreClient;
pub use test_observer::TestObserverClient;

use chanmon_core::{Config, Services};
use std::sync::Arc;

/// Secrets supplied through the environment, never through the config file.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub jenkins_token: Option<String>,
    pub jira_token: Option<String>,
}

/// Build the production service bundle.
pub fn connect(config: &Config, credentials: &Credentials) -> Result<Services> {
    Ok(Services {
        revisions: Arc::new(SnapStoreClient::new(&config.snap_store)?),
        ledger: Arc::new(TestObserverClient::new(&config.test_observer)?),
        builds: Arc::new(JenkinsClient::new(
            config.jenkins.url.as_deref(),
            config.jenkins.username.clone(),
            credentials.jenkins_token.clone(),
        )?),
        tracker: Arc::new(JiraClient::new(&config.jira, credentials.jira_token.clone())?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_requires_service_urls() {
        let mut config = Config::default();
        let err = connect(&config, &Credentials::default()).err().unwrap();
        assert!(matches!(err, ClientError::MissingSetting("jenkins.url")));

        config.jenkins.url = Some("https://jenkins.example".into());
        let err = connect(&config, &Credentials::default()).err().unwrap();
        assert!(matches!(err, ClientError::MissingSetting("jira.url")));

        config.jira.url = Some("https://jira.example".into());
        assert!(connect(&config, &Credentials::default()).is_ok());
    }
}
