// src/core/engine.rs
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use super::{
    BatchOrchestrator, BatchReport, BindingRegistry, ChangeSet, CodeChangeOptions, SourceDocument,
};

/// Main orchestration engine: configuration plus the binding registry built once per process
pub struct Engine {
    config: Config,
    registry: BindingRegistry,
}

impl Engine {
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;

        debug!("Loaded configuration: {:?}", config);

        let registry = BindingRegistry::new(&config.binding)?;
        debug!("Binding registry: {} factory shape(s)", registry.factories().len());

        Ok(Self { config, registry })
    }

    /// Write a default configuration file
    pub async fn init(&self, path: Option<PathBuf>, force: bool) -> Result<()> {
        let target_dir = match path {
            Some(path) => path,
            None => std::env::current_dir().context("Failed to resolve current directory")?,
        };
        let config_path = target_dir.join("codegraft.toml");

        if config_path.exists() && !force {
            bail!("{} already exists (use --force to overwrite)", config_path.display());
        }

        info!("Initializing codegraft in: {}", target_dir.display());
        Config::default().save(&config_path)?;
        info!("Wrote {}", config_path.display());
        Ok(())
    }

    /// Apply a change-set file to the project
    pub async fn apply(
        &self,
        changes: &Path,
        root: Option<PathBuf>,
        options: Vec<String>,
        dry_run: bool,
        fail_on_changes: bool,
        json: bool,
    ) -> Result<()> {
        let change_set = ChangeSet::load(changes)
            .with_context(|| format!("Failed to load change-set {}", changes.display()))?;
        let root = root.unwrap_or_else(|| self.config.project.root.clone());
        let options = CodeChangeOptions::new(options);
        let dry_run = dry_run || self.config.output.dry_run;

        if let Some(identifier) = &change_set.identifier {
            info!("Applying change-set {}", identifier);
        }
        if dry_run {
            info!("Dry run mode - no file will be written");
        }

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after the current file");
                    cancel.cancel();
                }
            })
        };

        let orchestrator = BatchOrchestrator::new(&self.config, &self.registry);
        let result = orchestrator
            .run(&change_set, &options, &root, dry_run, &cancel)
            .await;
        watcher.abort();
        let report = result?;

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", render_report(&report, &root, self.config.output.show_diff));
            info!(
                "Done: {} change(s), {} file(s) modified, {} warning(s)",
                report.summary.len(),
                report.modified_files().count(),
                report.warning_count()
            );
        }

        if report.cancelled {
            bail!("Run cancelled");
        }
        if fail_on_changes && report.has_changes() {
            bail!(
                "{} file(s) are missing changes",
                report.modified_files().count()
            );
        }
        Ok(())
    }

    /// Check a change-set without touching any file
    pub async fn validate(&self, changes: &Path) -> Result<()> {
        let change_set = ChangeSet::load(changes)
            .with_context(|| format!("Invalid change-set {}", changes.display()))?;

        let fragments: usize = change_set
            .files
            .iter()
            .map(|f| {
                f.class_properties.len()
                    + f.class_attributes.len()
                    + f.methods.iter().map(|(_, m)| m.code_changes.len()).sum::<usize>()
            })
            .sum();

        info!(
            "Change-set is valid: {} file config(s), {} fragment(s)",
            change_set.files.len(),
            fragments
        );
        Ok(())
    }

    /// Answer structural questions about one C# file
    pub async fn probe(
        &self,
        file: &Path,
        type_name: Option<String>,
        invocation: Option<String>,
        contains: Option<String>,
    ) -> Result<()> {
        let doc = SourceDocument::load(file, &self.config.parsing)?;
        let mut answered = false;

        if let Some(name) = type_name {
            println!("type {}: {}", name, yes_no(doc.type_exists(&name)));
            answered = true;
        }

        if let Some(call) = invocation {
            let Some((ty, method)) = call.rsplit_once('.') else {
                bail!("--invocation expects Type.Method, got {}", call);
            };
            println!("invocation {}: {}", call, yes_no(doc.invocation_exists(ty, method)));
            answered = true;
        }

        if let Some(needle) = contains {
            println!("contains {:?}: {}", needle, yes_no(doc.contains_text(&needle)));
            answered = true;
        }

        if !answered {
            for using in doc.usings() {
                println!("{}", using.text);
            }
            if let Some(ty) = doc.find_type(None) {
                println!("main type: {} ({} member(s))", ty.name, ty.body.items.len());
            }
            let globals = doc.global_statements();
            if !globals.items.is_empty() {
                println!("top-level statements: {}", globals.items.len());
            }
        }

        Ok(())
    }
}

/// Human-readable report: one line per modified file, optional diffs, then
/// every change made in order
fn render_report(report: &BatchReport, root: &Path, show_diff: bool) -> String {
    let mut out = String::new();

    for file in &report.files {
        let label = file.path.strip_prefix(root).unwrap_or(&file.path);
        if file.modified {
            let verb = if file.written { "patched" } else { "would patch" };
            let _ = writeln!(out, "{} {} ({} change(s))", verb, label.display(), file.applied);
        }
        if show_diff {
            if let Some(diff) = &file.diff {
                out.push_str(diff);
            }
        }
    }

    if !report.summary.is_empty() {
        let _ = writeln!(out, "Changes:");
        for entry in report.summary.entries() {
            let _ = writeln!(out, "  - {}", entry);
        }
    }

    out
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
