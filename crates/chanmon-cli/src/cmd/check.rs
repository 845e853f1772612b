use crate::output::print_json;
use anyhow::Context;
use chanmon_core::{Catalog, Config, WarnLevel};
use std::path::Path;

pub fn run(config_path: &Path, catalog_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    let warnings = config.validate();
    let catalog = Catalog::load(catalog_path, config.engine.default_timeout())
        .with_context(|| format!("failed to load catalog {}", catalog_path.display()))?;

    if json {
        let value = serde_json::json!({
            "config": warnings,
            "catalog": {
                "targets": catalog.len(),
                "warnings": catalog.warnings,
            },
        });
        print_json(&value)?;
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
        for issue in &catalog.warnings {
            println!("[warning] {issue}");
        }
        let projects: usize = catalog.targets.iter().map(|t| t.projects.len()).sum();
        println!(
            "{} targets, {projects} projects in {}",
            catalog.len(),
            catalog_path.display()
        );
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
