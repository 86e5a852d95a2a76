//! Command implementations
//!
//! Each command returns its stdout text; `main` decides the exit status.

use anyhow::{bail, Context, Result};
use j2l_core::{Migration, MigrationConfig, MigrationReport, VERSION};
use j2l_model::{MemoryTarget, SnapshotSource, SourceSnapshot, TargetUser};
use std::path::Path;
use std::sync::Arc;

/// Text a command printed and whether the run counts as a success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub output: String,
    pub success: bool,
}

impl Outcome {
    #[must_use]
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }
}

/// `config new`: print the template, or write it to `output`
///
/// # Errors
/// `output` exists and `force` is not set, or the write fails.
pub fn config_new(output: Option<&Path>, force: bool) -> Result<Outcome> {
    let template = MigrationConfig::template();
    let Some(path) = output else {
        return Ok(Outcome::ok(template));
    };
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    std::fs::write(path, template).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), "config template written");
    Ok(Outcome::ok(format!("wrote {}\n", path.display())))
}

/// `config lint`: load and validate a config file
///
/// # Errors
/// The load or validation failure.
pub fn config_lint(path: &Path) -> Result<Outcome> {
    load_config(path)?;
    Ok(Outcome::ok("config is valid\n"))
}

/// `dry-run`: migrate a JSON snapshot into the in-memory target
///
/// Every configured target id is seeded as a member, so identity checks
/// pass exactly when the users table covers the snapshot.
///
/// # Errors
/// Unreadable inputs or a run-level migration failure.
pub async fn dry_run(config: &Path, snapshot: &Path, json: bool) -> Result<Outcome> {
    let config = load_config(config)?;
    let snapshot = load_snapshot(snapshot)?;
    tracing::info!(
        project = %config.source.project,
        issues = snapshot.issues.len(),
        "starting dry run"
    );

    let target = config
        .users
        .values()
        .fold(MemoryTarget::new(), |target, &id| {
            target.with_member(TargetUser::new(id, format!("user-{id}")))
        });
    let migration = Migration::new(config, Arc::new(SnapshotSource::new(snapshot)), Arc::new(target));
    let report = migration.run().await.context("migration aborted")?;

    Ok(Outcome {
        output: render(&report, json)?,
        success: report.is_success(),
    })
}

/// `version`
#[must_use]
pub fn version() -> Outcome {
    Outcome::ok(format!("j2lab {VERSION}\n"))
}

fn load_config(path: &Path) -> Result<MigrationConfig> {
    MigrationConfig::from_path(path).with_context(|| format!("loading config {}", path.display()))
}

fn load_snapshot(path: &Path) -> Result<SourceSnapshot> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading snapshot {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing snapshot {}", path.display()))
}

fn render(report: &MigrationReport, json: bool) -> Result<String> {
    if json {
        let mut text = serde_json::to_string_pretty(report).context("serializing report")?;
        text.push('\n');
        Ok(text)
    } else {
        Ok(report.to_string())
    }
}
