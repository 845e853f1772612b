pub mod check;
pub mod revisions;
pub mod run;

use anyhow::Context;
use chanmon_core::{Catalog, Config};
use std::path::Path;
use tracing::warn;

/// Load the config, then the catalog with the config's default timeout.
///
/// Catalog warnings are logged; error-level findings fail the load.
pub fn load(config_path: &Path, catalog_path: &Path) -> anyhow::Result<(Config, Catalog)> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    let catalog = Catalog::load(catalog_path, config.engine.default_timeout())
        .with_context(|| format!("failed to load catalog {}", catalog_path.display()))?;
    for issue in &catalog.warnings {
        warn!("{issue}");
    }
    Ok((config, catalog))
}
