use crate::output::{print_json, print_table};
use anyhow::Context;
use chanmon_clients::Credentials;
use chanmon_core::{Config, Engine, EngineSettings, PassReport, WarnLevel};
use clap::Args;
use std::path::Path;
use tracing::warn;

#[derive(Args)]
pub struct RunArgs {
    /// Jenkins base URL (overrides jenkins.url)
    #[arg(long, env = "JENKINS_SERVER")]
    jenkins_server: Option<String>,

    /// Jenkins user (overrides jenkins.username)
    #[arg(long, env = "JENKINS_USERNAME")]
    jenkins_username: Option<String>,

    /// Jenkins API token
    #[arg(long, env = "JENKINS_TOKEN", hide_env_values = true)]
    jenkins_token: Option<String>,

    /// Jira user (overrides jira.username)
    #[arg(long, env = "JIRA_USERNAME")]
    jira_username: Option<String>,

    /// Jira API token
    #[arg(long, env = "JIRA_TOKEN", hide_env_values = true)]
    jira_token: Option<String>,

    /// Maximum supervised builds running at once (overrides engine.max_parallel)
    #[arg(long)]
    max_parallel: Option<usize>,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.jenkins_server {
            config.jenkins.url = Some(url.clone());
        }
        if let Some(user) = &self.jenkins_username {
            config.jenkins.username = Some(user.clone());
        }
        if let Some(user) = &self.jira_username {
            config.jira.username = Some(user.clone());
        }
        if let Some(n) = self.max_parallel {
            config.engine.max_parallel = n;
        }
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            jenkins_token: self.jenkins_token.clone(),
            jira_token: self.jira_token.clone(),
        }
    }
}

pub fn run(config_path: &Path, catalog_path: &Path, args: RunArgs, json: bool) -> anyhow::Result<()> {
    let (mut config, catalog) = super::load(config_path, catalog_path)?;
    args.apply(&mut config);

    let mut invalid = false;
    for w in config.validate() {
        match w.level {
            WarnLevel::Warning => warn!("{}", w.message),
            WarnLevel::Error => {
                eprintln!("[error] {}", w.message);
                invalid = true;
            }
        }
    }
    if invalid {
        anyhow::bail!("config validation found errors");
    }

    let settings = EngineSettings::from_config(&config).context("invalid engine settings")?;
    let services = chanmon_clients::connect(&config, &args.credentials())
        .context("failed to set up service clients")?;

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async move { Engine::new(services, settings).run(&catalog).await });

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &PassReport) {
    let mut rows = Vec::new();
    for t in &report.targets {
        let revision = if t.revision.is_published() {
            t.revision.revision.to_string()
        } else {
            "-".to_string()
        };
        if t.projects.is_empty() {
            rows.push(vec![t.key.clone(), revision, "-".into(), t.outcome.to_string()]);
            continue;
        }
        for p in &t.projects {
            rows.push(vec![
                t.key.clone(),
                revision.clone(),
                p.project.clone(),
                p.outcome.to_string(),
            ]);
        }
    }
    print_table(&["TARGET", "REVISION", "PROJECT", "OUTCOME"], rows);
    println!(
        "\n{} targets, {} moved to review, {} failed projects",
        report.targets.len(),
        report.advanced(),
        report.failures()
    );
}
