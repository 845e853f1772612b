use crate::error::Result;
use crate::http;
use async_trait::async_trait;
use chanmon_core::config::SnapStoreConfig;
use chanmon_core::{ChannelMapEntry, RevisionSource, ServiceError, ServiceResult};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

const SERVICE: &str = "snap-store";

pub struct SnapStoreClient {
    client: Client,
    base_url: String,
    series: String,
}

impl SnapStoreClient {
    pub fn new(config: &SnapStoreConfig) -> Result<Self> {
        Ok(Self {
            client: http::client()?,
            base_url: config.url.trim_end_matches('/').to_string(),
            series: config.series.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct InfoResponse {
    #[serde(rename = "channel-map")]
    channel_map: Option<Vec<WireChannelEntry>>,
}

#[derive(Debug, Deserialize)]
struct WireChannelEntry {
    channel: WireChannel,
    version: String,
    revision: i64,
    #[serde(rename = "snap-yaml")]
    snap_yaml: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChannel {
    architecture: String,
    risk: String,
    track: String,
}

#[derive(Debug, Deserialize)]
struct SnapYaml {
    grade: Option<String>,
}

fn grade_of(snap: &str, snap_yaml: Option<&str>) -> Option<String> {
    let raw = snap_yaml?;
    match serde_yaml::from_str::<SnapYaml>(raw) {
        Ok(parsed) => parsed.grade,
        Err(e) => {
            debug!(snap, error = %e, "unreadable snap.yaml in channel map");
            None
        }
    }
}

#[async_trait]
impl RevisionSource for SnapStoreClient {
    async fn channel_map(&self, name: &str, store: &str) -> ServiceResult<Vec<ChannelMapEntry>> {
        let url = format!("{}/v2/snaps/info/{name}", self.base_url);
        let req = self
            .client
            .get(&url)
            .query(&[("fields", "version,revision,snap-yaml")])
            .header("Snap-Device-Series", &self.series)
            .header("Snap-Device-Store", store);
        let info: InfoResponse = http::json(SERVICE, req).await?;

        let Some(entries) = info.channel_map else {
            warn!(snap = name, store, "store response has no channel map");
            return Err(ServiceError::decode(SERVICE, format!("no channel-map for {name}")));
        };
        Ok(entries
            .into_iter()
            .map(|e| ChannelMapEntry {
                grade: grade_of(name, e.snap_yaml.as_deref()),
                track: e.channel.track,
                risk: e.channel.risk,
                architecture: e.channel.architecture,
                version: e.version,
                revision: e.revision,
            })
            .collect())
    }
}
