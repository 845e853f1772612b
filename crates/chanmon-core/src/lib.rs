pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod revision;
pub mod services;
pub mod types;

pub use catalog::{Catalog, CatalogFormat, CatalogIssue};
pub use config::{Config, ConfigWarning, MissingArtefactPolicy, WarnLevel};
pub use engine::{
    Engine, EngineSettings, PassReport, ProjectOutcome, ProjectReport, TargetOutcome, TargetReport,
};
pub use error::{MonitorError, Result, ServiceError, ServiceResult};
pub use revision::RevisionIndex;
pub use services::{
    ArtefactLedger, BuildTrigger, ChannelMapEntry, ExecutionRequest, ExecutionUpdate,
    IssueTracker, RevisionSource, Services,
};
