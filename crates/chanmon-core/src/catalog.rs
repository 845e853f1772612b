//! Target catalog: the list of tracked snaps and the test projects each needs.
//!
//! The file is an ordered sequence of single-key mappings. The key is a free
//! label; the value describes one target:
//!
//! ```yaml
//! - core22-pi:
//!     name: core22
//!     store: ubuntu
//!     track: latest
//!     channel: stable
//!     arch: arm64
//!     jira_id: CHAN-12
//!     projects:
//!       - name: rpi4b8g
//!         assignee: jdoe
//!         job: core22-rpi4b8g-sanity
//!         job_token: secret
//!         timeout: 5400
//! ```

use crate::config::WarnLevel;
use crate::error::{MonitorError, Result};
use crate::types::{ProjectSpec, TrackedTarget};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

const KNOWN_ARCHES: &[&str] = &[
    "amd64", "arm64", "armhf", "i386", "ppc64el", "riscv64", "s390x",
];

const DEFAULT_TRACK: &str = "latest";

// ---------------------------------------------------------------------------
// CatalogFormat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    Yaml,
    Json,
}

impl CatalogFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Ok(CatalogFormat::Yaml),
            "json" => Ok(CatalogFormat::Json),
            _ => Err(MonitorError::UnsupportedCatalogFormat(
                path.display().to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// CatalogIssue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogIssue {
    pub level: WarnLevel,
    /// Catalog key (or `#index` when the entry has no usable key).
    pub entry: String,
    pub message: String,
}

impl CatalogIssue {
    fn error(entry: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            entry: entry.into(),
            message: message.into(),
        }
    }

    fn warning(entry: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            entry: entry.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.entry, self.message)
    }
}

// ---------------------------------------------------------------------------
// Raw file shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawTarget {
    name: String,
    store: String,
    arch: String,
    channel: String,
    #[serde(default)]
    track: Option<String>,
    #[serde(default, alias = "epic")]
    jira_id: Option<String>,
    #[serde(default)]
    grade: Option<String>,
    projects: Vec<RawProject>,
}

#[derive(Debug, Deserialize)]
struct RawProject {
    name: String,
    assignee: String,
    job: String,
    #[serde(default)]
    job_token: Option<String>,
    /// Seconds.
    #[serde(default)]
    timeout: Option<u64>,
}

type RawCatalog = Vec<BTreeMap<String, RawTarget>>;

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Catalog {
    pub targets: Vec<TrackedTarget>,
    /// Non-fatal findings from validation.
    pub warnings: Vec<CatalogIssue>,
}

impl Catalog {
    /// Load and validate a catalog file. Error-level findings are fatal.
    ///
    /// `default_timeout` applies to projects that do not set `timeout`.
    pub fn load(path: &Path, default_timeout: Duration) -> Result<Self> {
        let format = CatalogFormat::from_path(path)?;
        if !path.exists() {
            return Err(MonitorError::CatalogNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        Self::parse(&data, format, default_timeout)
    }

    pub fn parse(data: &str, format: CatalogFormat, default_timeout: Duration) -> Result<Self> {
        let raw: RawCatalog = match format {
            CatalogFormat::Yaml => serde_yaml::from_str(data)?,
            CatalogFormat::Json => serde_json::from_str(data)?,
        };
        let (targets, issues) = build(raw, default_timeout);

        let (errors, warnings): (Vec<_>, Vec<_>) = issues
            .into_iter()
            .partition(|i| i.level == WarnLevel::Error);
        if !errors.is_empty() {
            return Err(MonitorError::InvalidCatalog(
                errors.iter().map(ToString::to_string).collect(),
            ));
        }

        Ok(Self { targets, warnings })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn build(raw: RawCatalog, default_timeout: Duration) -> (Vec<TrackedTarget>, Vec<CatalogIssue>) {
    let mut issues = Vec::new();
    let mut targets = Vec::new();

    if raw.is_empty() {
        issues.push(CatalogIssue::error("catalog", "no targets defined"));
    }

    for (index, entry) in raw.into_iter().enumerate() {
        if entry.len() != 1 {
            issues.push(CatalogIssue::error(
                format!("#{index}"),
                format!(
                    "each entry must be a single-key mapping, found {} keys",
                    entry.len()
                ),
            ));
            continue;
        }
        for (key, target) in entry {
            if let Some(t) = build_target(&key, target, default_timeout, &mut issues) {
                targets.push(t);
            }
        }
    }

    (targets, issues)
}

fn build_target(
    key: &str,
    raw: RawTarget,
    default_timeout: Duration,
    issues: &mut Vec<CatalogIssue>,
) -> Option<TrackedTarget> {
    let before = issues.len();

    for (field, value) in [
        ("name", &raw.name),
        ("store", &raw.store),
        ("arch", &raw.arch),
        ("channel", &raw.channel),
    ] {
        if value.trim().is_empty() {
            issues.push(CatalogIssue::error(key, format!("'{field}' must not be empty")));
        }
    }

    if !raw.arch.is_empty() && !KNOWN_ARCHES.contains(&raw.arch.as_str()) {
        issues.push(CatalogIssue::warning(
            key,
            format!("unrecognised architecture '{}'", raw.arch),
        ));
    }

    let epic = raw.jira_id.filter(|s| !s.trim().is_empty());
    if epic.is_none() {
        issues.push(CatalogIssue::warning(
            key,
            "no 'jira_id': revision tickets will be created without a parent epic",
        ));
    }

    if raw.projects.is_empty() {
        issues.push(CatalogIssue::error(key, "'projects' must list at least one project"));
    }

    let mut seen = HashSet::new();
    let mut projects = Vec::with_capacity(raw.projects.len());
    for p in raw.projects {
        for (field, value) in [("name", &p.name), ("assignee", &p.assignee), ("job", &p.job)] {
            if value.trim().is_empty() {
                issues.push(CatalogIssue::error(
                    key,
                    format!("project '{}': '{field}' must not be empty", p.name),
                ));
            }
        }
        if !seen.insert(p.name.clone()) {
            issues.push(CatalogIssue::error(
                key,
                format!("project '{}' is listed more than once", p.name),
            ));
        }
        if p.timeout == Some(0) {
            issues.push(CatalogIssue::error(
                key,
                format!("project '{}': timeout must be greater than zero", p.name),
            ));
        }
        if p.job_token.is_none() {
            issues.push(CatalogIssue::warning(
                key,
                format!("project '{}' has no job_token", p.name),
            ));
        }
        projects.push(ProjectSpec {
            timeout: p.timeout.map(Duration::from_secs).unwrap_or(default_timeout),
            name: p.name,
            job: p.job,
            job_token: p.job_token,
            assignee: p.assignee,
        });
    }

    let has_errors = issues[before..]
        .iter()
        .any(|i| i.level == WarnLevel::Error);
    if has_errors {
        return None;
    }

    Some(TrackedTarget {
        key: key.to_string(),
        name: raw.name,
        track: raw
            .track
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TRACK.to_string()),
        channel: raw.channel,
        arch: raw.arch,
        store: raw.store,
        epic,
        grade: raw.grade,
        projects,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(7200);

    const VALID: &str = r#"
- core22-pi:
    name: core22
    store: ubuntu
    track: latest
    channel: stable
    arch: arm64
    jira_id: CHAN-12
    projects:
      - name: rpi4b8g
        assignee: jdoe
        job: core22-rpi4b8g-sanity
        job_token: t0k3n
        timeout: 5400
      - name: rpi3b
        assignee: asmith
        job: core22-rpi3b-sanity
        job_token: t0k3n
- pi-kernel:
    name: pi-kernel
    store: ubuntu
    channel: beta
    arch: armhf
    jira_id: CHAN-13
    grade: stable
    projects:
      - name: rpi2
        assignee: jdoe
        job: pi-kernel-rpi2
        job_token: t0k3n
"#;

    #[test]
    fn parses_valid_yaml_in_order() {
        let catalog = Catalog::parse(VALID, CatalogFormat::Yaml, TIMEOUT).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.warnings.is_empty());

        let first = &catalog.targets[0];
        assert_eq!(first.key, "core22-pi");
        assert_eq!(first.epic.as_deref(), Some("CHAN-12"));
        assert_eq!(first.projects.len(), 2);
        assert_eq!(first.projects[0].timeout, Duration::from_secs(5400));
        assert_eq!(first.projects[1].timeout, TIMEOUT);

        let second = &catalog.targets[1];
        assert_eq!(second.track, "latest", "track defaults to latest");
        assert_eq!(second.grade.as_deref(), Some("stable"));
    }

    #[test]
    fn parses_json() {
        let json = r#"[{"x": {"name": "core20", "store": "ubuntu", "arch": "amd64",
            "channel": "edge", "jira_id": "CHAN-1",
            "projects": [{"name": "nuc", "assignee": "a", "job": "j", "job_token": "t"}]}}]"#;
        let catalog = Catalog::parse(json, CatalogFormat::Json, TIMEOUT).unwrap();
        assert_eq!(catalog.targets[0].name, "core20");
        assert_eq!(catalog.targets[0].channel, "edge");
    }

    #[test]
    fn missing_required_field_is_fatal() {
        let yaml = r#"
- x:
    name: core22
    arch: amd64
    channel: stable
    projects: []
"#;
        let err = Catalog::parse(yaml, CatalogFormat::Yaml, TIMEOUT).unwrap_err();
        assert!(err.to_string().contains("store"), "{err}");
    }

    #[test]
    fn empty_projects_and_duplicates_are_errors() {
        let yaml = r#"
- no-projects:
    name: a
    store: ubuntu
    arch: amd64
    channel: stable
    jira_id: CHAN-1
    projects: []
- dupes:
    name: b
    store: ubuntu
    arch: amd64
    channel: stable
    jira_id: CHAN-1
    projects:
      - {name: p, assignee: x, job: j, job_token: t}
      - {name: p, assignee: y, job: k, job_token: t}
"#;
        let err = Catalog::parse(yaml, CatalogFormat::Yaml, TIMEOUT).unwrap_err();
        let MonitorError::InvalidCatalog(problems) = err else {
            panic!("expected InvalidCatalog");
        };
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("no-projects"));
        assert!(problems[1].contains("more than once"));
    }

    #[test]
    fn multi_key_entry_is_an_error() {
        let yaml = r#"
- a:
    name: a
    store: ubuntu
    arch: amd64
    channel: stable
    projects: [{name: p, assignee: x, job: j}]
  b:
    name: b
    store: ubuntu
    arch: amd64
    channel: stable
    projects: [{name: p, assignee: x, job: j}]
"#;
        let err = Catalog::parse(yaml, CatalogFormat::Yaml, TIMEOUT).unwrap_err();
        assert!(err.to_string().contains("single-key mapping"));
    }

    #[test]
    fn zero_timeout_is_an_error() {
        let yaml = r#"
- a:
    name: a
    store: ubuntu
    arch: amd64
    channel: stable
    jira_id: CHAN-1
    projects: [{name: p, assignee: x, job: j, job_token: t, timeout: 0}]
"#;
        assert!(Catalog::parse(yaml, CatalogFormat::Yaml, TIMEOUT).is_err());
    }

    #[test]
    fn soft_problems_become_warnings() {
        let yaml = r#"
- a:
    name: a
    store: ubuntu
    arch: sparc
    channel: stable
    projects: [{name: p, assignee: x, job: j}]
"#;
        let catalog = Catalog::parse(yaml, CatalogFormat::Yaml, TIMEOUT).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.warnings.len(), 3);
        assert!(catalog.targets[0].epic.is_none());
        assert!(catalog
            .warnings
            .iter()
            .all(|w| w.level == WarnLevel::Warning));
    }

    #[test]
    fn empty_catalog_is_an_error() {
        assert!(Catalog::parse("[]", CatalogFormat::Yaml, TIMEOUT).is_err());
    }

    #[test]
    fn load_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("monitor.toml");
        std::fs::write(&path, VALID).unwrap();
        let err = Catalog::load(&path, TIMEOUT).unwrap_err();
        assert!(matches!(err, MonitorError::UnsupportedCatalogFormat(_)));
    }

    #[test]
    fn load_reads_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("monitor.yml");
        std::fs::write(&path, VALID).unwrap();
        let catalog = Catalog::load(&path, TIMEOUT).unwrap();
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Catalog::load(&dir.path().join("monitor.yaml"), TIMEOUT).unwrap_err();
        assert!(matches!(err, MonitorError::CatalogNotFound(_)));
    }
}
