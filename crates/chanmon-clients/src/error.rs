use thiserror::Error;

/// Failure to set up a client. Request-time failures are
/// [`chanmon_core::ServiceError`]s.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("missing setting '{0}'")]
    MissingSetting(&'static str),

    #[error("could not build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
