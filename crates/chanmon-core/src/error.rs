use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("catalog not found: {0}")]
    CatalogNotFound(PathBuf),

    #[error("unsupported catalog format '{0}': expected .yaml, .yml or .json")]
    UnsupportedCatalogFormat(String),

    #[error("invalid catalog:\n  {}", .0.join("\n  "))]
    InvalidCatalog(Vec<String>),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid report pattern: {0}")]
    InvalidReportPattern(#[from] regex::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;

/// Failure of a call into one of the external collaborators.
///
/// `service` names the collaborator (`"jenkins"`, `"jira"`, ...) so log lines
/// and tracker comments stay readable without further context.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The requested object does not exist yet but is expected to appear.
    #[error("{service}: not available yet: {detail}")]
    NotReady {
        service: &'static str,
        detail: String,
    },

    #[error("{service} rejected the request (HTTP {status}): {body}")]
    Rejected {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} unreachable: {detail}")]
    Transport {
        service: &'static str,
        detail: String,
    },

    #[error("{service} returned a malformed response: {detail}")]
    Decode {
        service: &'static str,
        detail: String,
    },

    #[error("{service}: {detail}")]
    Other {
        service: &'static str,
        detail: String,
    },
}

impl ServiceError {
    pub fn not_ready(service: &'static str, detail: impl Into<String>) -> Self {
        Self::NotReady {
            service,
            detail: detail.into(),
        }
    }

    pub fn decode(service: &'static str, detail: impl Into<String>) -> Self {
        Self::Decode {
            service,
            detail: detail.into(),
        }
    }

    pub fn other(service: &'static str, detail: impl Into<String>) -> Self {
        Self::Other {
            service,
            detail: detail.into(),
        }
    }

    /// Only `NotReady` may be retried without bound.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }

    pub fn service(&self) -> &'static str {
        match self {
            Self::NotReady { service, .. }
            | Self::Rejected { service, .. }
            | Self::Transport { service, .. }
            | Self::Decode { service, .. }
            | Self::Other { service, .. } => service,
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
