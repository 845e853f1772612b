use crate::error::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "chanmon.yaml";

/// Matches a certification submission link in a test job's console output.
pub const DEFAULT_REPORT_PATTERN: &str =
    r"https://certification\.canonical\.com/hardware/[\w.-]+/submission/[\w.-]+/?";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SnapStoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapStoreConfig {
    #[serde(default = "default_snap_store_url")]
    pub url: String,
    #[serde(default = "default_series")]
    pub series: String,
}

fn default_snap_store_url() -> String {
    "https://api.snapcraft.io".to_string()
}

fn default_series() -> String {
    "16".to_string()
}

impl Default for SnapStoreConfig {
    fn default() -> Self {
        Self {
            url: default_snap_store_url(),
            series: default_series(),
        }
    }
}

// ---------------------------------------------------------------------------
// TestObserverConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestObserverConfig {
    #[serde(default = "default_test_observer_url")]
    pub url: String,
    #[serde(default = "default_family")]
    pub family: String,
}

fn default_test_observer_url() -> String {
    "https://test-observer-api-staging.canonical.com".to_string()
}

fn default_family() -> String {
    "snap".to_string()
}

impl Default for TestObserverConfig {
    fn default() -> Self {
        Self {
            url: default_test_observer_url(),
            family: default_family(),
        }
    }
}

// ---------------------------------------------------------------------------
// JenkinsConfig
// ---------------------------------------------------------------------------

/// The API token is never read from the file; see `JENKINS_TOKEN`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JenkinsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

// ---------------------------------------------------------------------------
// JiraConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Project new tickets are filed in. Falls back to the parent key's prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_key: Option<String>,
    #[serde(default = "default_ticket_type")]
    pub ticket_type: String,
    #[serde(default = "default_subtask_type")]
    pub subtask_type: String,
    #[serde(default = "default_in_progress_state")]
    pub in_progress_state: String,
    #[serde(default = "default_in_review_state")]
    pub in_review_state: String,
}

fn default_ticket_type() -> String {
    "Task".to_string()
}

fn default_subtask_type() -> String {
    "Sub-task".to_string()
}

fn default_in_progress_state() -> String {
    "In Progress".to_string()
}

fn default_in_review_state() -> String {
    "In Review".to_string()
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            project_key: None,
            ticket_type: default_ticket_type(),
            subtask_type: default_subtask_type(),
            in_progress_state: default_in_progress_state(),
            in_review_state: default_in_review_state(),
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// What to do when the ledger has no artefact for a published revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingArtefactPolicy {
    /// Start fresh; registering the first execution creates the artefact.
    #[default]
    Register,
    /// Leave the target alone until the artefact exists.
    RequireExisting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_materialize_backoff")]
    pub materialize_backoff_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout")]
    pub default_timeout_secs: u64,
    #[serde(default)]
    pub missing_artefact: MissingArtefactPolicy,
    #[serde(default = "default_report_pattern")]
    pub report_pattern: String,
    #[serde(default = "default_build_parameters")]
    pub build_parameters: BTreeMap<String, String>,
}

fn default_max_parallel() -> usize {
    8
}

fn default_materialize_backoff() -> u64 {
    3
}

fn default_poll_interval() -> u64 {
    10
}

fn default_timeout() -> u64 {
    7200
}

fn default_report_pattern() -> String {
    DEFAULT_REPORT_PATTERN.to_string()
}

fn default_build_parameters() -> BTreeMap<String, String> {
    let mut m = BTreeMap::new();
    m.insert("d_grade".to_string(), "true".to_string());
    m
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            materialize_backoff_secs: default_materialize_backoff(),
            poll_interval_secs: default_poll_interval(),
            default_timeout_secs: default_timeout(),
            missing_artefact: MissingArtefactPolicy::default(),
            report_pattern: default_report_pattern(),
            build_parameters: default_build_parameters(),
        }
    }
}

impl EngineConfig {
    pub fn materialize_backoff(&self) -> Duration {
        Duration::from_secs(self.materialize_backoff_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn compiled_report_pattern(&self) -> Result<Regex> {
        Ok(Regex::new(&self.report_pattern)?)
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub snap_store: SnapStoreConfig,
    #[serde(default)]
    pub test_observer: TestObserverConfig,
    #[serde(default)]
    pub jenkins: JenkinsConfig,
    #[serde(default)]
    pub jira: JiraConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            snap_store: SnapStoreConfig::default(),
            test_observer: TestObserverConfig::default(),
            jenkins: JenkinsConfig::default(),
            jira: JiraConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Load `path`, or the defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a mapping.
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(data)?;
        Ok(cfg)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        if self.engine.max_parallel == 0 {
            error("engine.max_parallel must be at least 1".to_string());
        }
        if self.engine.poll_interval_secs == 0 {
            error("engine.poll_interval_secs must be at least 1".to_string());
        }
        if self.engine.default_timeout_secs == 0 {
            error("engine.default_timeout_secs must be at least 1".to_string());
        }
        if let Err(e) = self.engine.compiled_report_pattern() {
            error(format!("engine.report_pattern does not compile: {e}"));
        }

        if self.jira.project_key.is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "jira.project_key is not set; tickets are filed in their parent's project"
                    .to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(&dir.path().join("chanmon.yaml")).unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.engine.max_parallel, 8);
        assert_eq!(cfg.engine.poll_interval(), Duration::from_secs(10));
        assert_eq!(cfg.engine.materialize_backoff(), Duration::from_secs(3));
        assert_eq!(cfg.engine.default_timeout(), Duration::from_secs(7200));
        assert_eq!(cfg.test_observer.family, "snap");
    }

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = Config::from_yaml("\n").unwrap();
        assert_eq!(cfg.engine.missing_artefact, MissingArtefactPolicy::Register);
        assert_eq!(cfg.engine.build_parameters["d_grade"], "true");
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let yaml = r#"
jira:
  url: https://warthogs.atlassian.net
  project_key: CHAN
engine:
  max_parallel: 2
  missing_artefact: require_existing
"#;
        let cfg = Config::from_yaml(yaml).unwrap();
        assert_eq!(cfg.jira.project_key.as_deref(), Some("CHAN"));
        assert_eq!(cfg.jira.subtask_type, "Sub-task");
        assert_eq!(cfg.engine.max_parallel, 2);
        assert_eq!(
            cfg.engine.missing_artefact,
            MissingArtefactPolicy::RequireExisting
        );
        assert_eq!(cfg.engine.poll_interval_secs, 10);
        assert_eq!(cfg.snap_store.url, "https://api.snapcraft.io");
    }

    #[test]
    fn default_report_pattern_matches_submission_links() {
        let re = EngineConfig::default().compiled_report_pattern().unwrap();
        let log = "Submission status: https://certification.canonical.com/hardware/202301-12345/submission/abc123/ done";
        let found = re.find(log).unwrap().as_str();
        assert_eq!(
            found,
            "https://certification.canonical.com/hardware/202301-12345/submission/abc123/"
        );
        assert!(re.find("no link here").is_none());
    }

    #[test]
    fn validate_defaults_only_warns_about_project_key() {
        let warnings = Config::default().validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Warning);
        assert!(warnings[0].message.contains("project_key"));
    }

    #[test]
    fn validate_rejects_zero_parallelism_and_bad_pattern() {
        let mut cfg = Config::default();
        cfg.jira.project_key = Some("CHAN".into());
        cfg.engine.max_parallel = 0;
        cfg.engine.report_pattern = "([unclosed".into();
        let warnings = cfg.validate();
        assert!(warnings.iter().all(|w| w.level == WarnLevel::Error));
        assert!(warnings.iter().any(|w| w.message.contains("max_parallel")));
        assert!(warnings.iter().any(|w| w.message.contains("report_pattern")));
    }

    #[test]
    fn roundtrip_omits_unset_optionals() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        assert!(!yaml.contains("username"));
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.engine.report_pattern, DEFAULT_REPORT_PATTERN);
    }
}
