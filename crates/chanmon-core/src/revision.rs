//! Published-revision lookup, built once per pass from the revision source.

use crate::services::{ChannelMapEntry, RevisionSource};
use crate::types::{RevisionDescriptor, TrackedTarget};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChannelKey {
    name: String,
    track: String,
    risk: String,
    arch: String,
}

#[derive(Debug, Clone)]
struct Published {
    version: String,
    revision: i64,
    grade: Option<String>,
}

/// Snapshot of `name → track → risk → arch → {version, revision}`.
#[derive(Debug, Clone, Default)]
pub struct RevisionIndex {
    entries: HashMap<ChannelKey, Published>,
}

impl RevisionIndex {
    /// Fetch the channel map of every distinct `(name, store)` in `targets`.
    ///
    /// A snap whose channel map cannot be fetched is left out of the index;
    /// its targets then resolve to the unpublished sentinel.
    pub async fn build(source: &dyn RevisionSource, targets: &[TrackedTarget]) -> Self {
        let snaps: BTreeSet<(&str, &str)> = targets
            .iter()
            .map(|t| (t.name.as_str(), t.store.as_str()))
            .collect();

        let mut index = Self::default();
        for (name, store) in snaps {
            match source.channel_map(name, store).await {
                Ok(entries) => {
                    debug!(snap = name, store, channels = entries.len(), "fetched channel map");
                    index.insert_all(name, entries);
                }
                Err(e) => warn!(snap = name, store, error = %e, "skipping snap: channel map unavailable"),
            }
        }
        index
    }

    pub fn insert_all(&mut self, name: &str, entries: impl IntoIterator<Item = ChannelMapEntry>) {
        for e in entries {
            self.entries.insert(
                ChannelKey {
                    name: name.to_string(),
                    track: e.track,
                    risk: e.risk,
                    arch: e.architecture,
                },
                Published {
                    version: e.version,
                    revision: e.revision,
                    grade: e.grade,
                },
            );
        }
    }

    /// Resolve the revision currently published for `target`.
    ///
    /// Any missing level (snap, track, channel, architecture) and any grade
    /// mismatch yields [`RevisionDescriptor::unpublished`].
    pub fn resolve(&self, target: &TrackedTarget) -> RevisionDescriptor {
        let key = ChannelKey {
            name: target.name.clone(),
            track: target.track.clone(),
            risk: target.channel.clone(),
            arch: target.arch.clone(),
        };
        let Some(published) = self.entries.get(&key) else {
            return RevisionDescriptor::unpublished();
        };
        if let Some(wanted) = &target.grade {
            if published.grade.as_deref() != Some(wanted.as_str()) {
                debug!(
                    snap = %target.display_name(),
                    wanted = %wanted,
                    found = ?published.grade,
                    "published grade does not match"
                );
                return RevisionDescriptor::unpublished();
            }
        }
        RevisionDescriptor::new(published.version.clone(), published.revision)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ServiceError, ServiceResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn entry(track: &str, risk: &str, arch: &str, version: &str, rev: i64) -> ChannelMapEntry {
        ChannelMapEntry {
            track: track.into(),
            risk: risk.into(),
            architecture: arch.into(),
            version: version.into(),
            revision: rev,
            grade: Some("stable".into()),
        }
    }

    fn target(name: &str, store: &str, channel: &str, arch: &str) -> TrackedTarget {
        TrackedTarget {
            key: name.into(),
            name: name.into(),
            track: "latest".into(),
            channel: channel.into(),
            arch: arch.into(),
            store: store.into(),
            epic: None,
            grade: None,
            projects: vec![],
        }
    }

    struct ScriptedSource {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl RevisionSource for ScriptedSource {
        async fn channel_map(&self, name: &str, store: &str) -> ServiceResult<Vec<ChannelMapEntry>> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), store.to_string()));
            match name {
                "core22" => Ok(vec![
                    entry("latest", "stable", "amd64", "20240111", 1122),
                    entry("latest", "edge", "amd64", "20240301", 1380),
                ]),
                _ => Err(ServiceError::other("snap-store", "boom")),
            }
        }
    }

    #[test]
    fn resolves_known_coordinates() {
        let mut index = RevisionIndex::default();
        index.insert_all("core22", vec![entry("latest", "stable", "amd64", "20240111", 1122)]);
        let rev = index.resolve(&target("core22", "ubuntu", "stable", "amd64"));
        assert_eq!(rev, RevisionDescriptor::new("20240111", 1122));
    }

    #[test]
    fn every_missing_level_is_unpublished() {
        let mut index = RevisionIndex::default();
        index.insert_all("core22", vec![entry("latest", "stable", "amd64", "1", 1)]);
        assert!(!index.resolve(&target("core24", "ubuntu", "stable", "amd64")).is_published());
        assert!(!index.resolve(&target("core22", "ubuntu", "beta", "amd64")).is_published());
        assert!(!index.resolve(&target("core22", "ubuntu", "stable", "arm64")).is_published());
        let mut other_track = target("core22", "ubuntu", "stable", "amd64");
        other_track.track = "22".into();
        assert!(!index.resolve(&other_track).is_published());
    }

    #[test]
    fn grade_filter() {
        let mut index = RevisionIndex::default();
        let mut devel = entry("latest", "stable", "amd64", "1", 7);
        devel.grade = Some("devel".into());
        index.insert_all("mir-kiosk", vec![devel]);

        let mut t = target("mir-kiosk", "ubuntu", "stable", "amd64");
        assert!(index.resolve(&t).is_published());
        t.grade = Some("stable".into());
        assert!(!index.resolve(&t).is_published());
    }

    #[tokio::test]
    async fn build_fetches_each_snap_once_and_skips_failures() {
        let source = ScriptedSource {
            calls: Mutex::new(vec![]),
        };
        let targets = vec![
            target("core22", "ubuntu", "stable", "amd64"),
            target("core22", "ubuntu", "edge", "amd64"),
            target("broken", "ubuntu", "stable", "amd64"),
        ];
        let index = RevisionIndex::build(&source, &targets).await;

        assert_eq!(source.calls.lock().unwrap().len(), 2);
        assert_eq!(index.len(), 2);
        assert_eq!(index.resolve(&targets[1]).revision, 1380);
        assert!(!index.resolve(&targets[2]).is_published());
    }
}
