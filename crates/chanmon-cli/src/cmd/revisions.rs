use crate::output::{print_json, print_table};
use anyhow::Context;
use chanmon_clients::SnapStoreClient;
use chanmon_core::RevisionIndex;
use std::path::Path;

pub fn run(config_path: &Path, catalog_path: &Path, json: bool) -> anyhow::Result<()> {
    let (config, catalog) = super::load(config_path, catalog_path)?;
    let store = SnapStoreClient::new(&config.snap_store).context("failed to set up snap store client")?;

    let rt = tokio::runtime::Runtime::new()?;
    let index = rt.block_on(RevisionIndex::build(&store, &catalog.targets));

    let resolved: Vec<_> = catalog
        .targets
        .iter()
        .map(|t| (t, index.resolve(t)))
        .collect();

    if json {
        let value: Vec<_> = resolved
            .iter()
            .map(|(t, rev)| {
                serde_json::json!({
                    "key": t.key,
                    "name": t.name,
                    "track": t.track,
                    "channel": t.channel,
                    "arch": t.arch,
                    "published": rev.is_published(),
                    "version": rev.version,
                    "revision": rev.revision,
                })
            })
            .collect();
        print_json(&value)?;
        return Ok(());
    }

    let rows = resolved
        .iter()
        .map(|(t, rev)| {
            let (version, revision) = if rev.is_published() {
                (rev.version.clone(), rev.revision.to_string())
            } else {
                ("unpublished".to_string(), "-".to_string())
            };
            vec![
                t.key.clone(),
                format!("{}/{}", t.track, t.channel),
                t.arch.clone(),
                version,
                revision,
            ]
        })
        .collect();
    print_table(&["TARGET", "CHANNEL", "ARCH", "VERSION", "REVISION"], rows);
    Ok(())
}
