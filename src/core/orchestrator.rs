use std::io::Write;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{GraftError, Result};
use super::applicator::PatchApplicator;
use super::binder::BindingRegistry;
use super::change_set::{is_glob, ChangeSet, CodeChangeOptions, FileChangeConfig};
use super::differ::ContentDiffer;
use super::source_document::SourceDocument;
use super::summary::{BatchReport, ChangeSummary, FileReport};

/// One resolved target file and the configs that apply to it, in change-set order
struct TargetFile<'c> {
    path: PathBuf,
    configs: Vec<&'c FileChangeConfig>,
}

/// Runs a change-set over a project: filter, resolve, patch, write back
pub struct BatchOrchestrator<'a> {
    config: &'a Config,
    applicator: PatchApplicator<'a>,
    differ: ContentDiffer,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(config: &'a Config, registry: &'a BindingRegistry) -> Self {
        Self {
            config,
            applicator: PatchApplicator::new(registry),
            differ: ContentDiffer::new(3),
        }
    }

    /// Apply `change_set` under `root`.
    ///
    /// A malformed change-set fails before any file is read. Any error from a
    /// single file lands in the report as a warning and the run continues. Cancellation is honored
    /// between files only.
    pub async fn run(
        &self,
        change_set: &ChangeSet,
        options: &CodeChangeOptions,
        root: &Path,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        change_set.validate()?;

        let mut report = BatchReport::default();

        let active: Vec<&FileChangeConfig> = change_set
            .files
            .iter()
            .filter(|file| {
                let keep = options.satisfies(&file.options);
                if !keep {
                    debug!("Skipping {}: options {:?} not satisfied", file.file_name, file.options);
                }
                keep
            })
            .collect();

        let targets = self.resolve_targets(&active, root, &mut report.warnings)?;
        info!("Patching {} file(s) under {}", targets.len(), root.display());

        for target in targets {
            if cancel.is_cancelled() {
                warn!("Run cancelled before {}", target.path.display());
                report.cancelled = true;
                break;
            }

            match self.process_file(&target, options, root, dry_run).await {
                Ok((file_report, summary)) => {
                    report.summary.extend(summary);
                    report.files.push(file_report);
                }
                Err(e) => {
                    let message = skipped_message(&target.path, &e);
                    warn!("{}", message);
                    report.warnings.push(message);
                }
            }
        }

        info!(
            "{} change(s) across {} modified file(s), {} warning(s)",
            report.summary.len(),
            report.modified_files().count(),
            report.warning_count()
        );

        Ok(report)
    }

    /// Load, patch and write back one file. `Unavailable` means the file was skipped.
    async fn process_file(
        &self,
        target: &TargetFile<'_>,
        options: &CodeChangeOptions,
        root: &Path,
        dry_run: bool,
    ) -> Result<(FileReport, ChangeSummary)> {
        let path = &target.path;
        let label = relative_label(root, path);

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GraftError::Unavailable {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        let original = text.clone();
        let mut doc = SourceDocument::from_source(path, text, &self.config.parsing)?;

        let mut file_report = FileReport {
            path: path.clone(),
            ..FileReport::default()
        };

        let outcome = match self.applicator.apply(&mut doc, &target.configs, options, &label) {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = format!("{}: patching failed, file left untouched: {}", label, e);
                warn!("{}", message);
                file_report.warnings.push(message);
                return Ok((file_report, ChangeSummary::default()));
            }
        };

        file_report.applied = outcome.applied;
        file_report.warnings = outcome.warnings;
        file_report.modified = doc.is_modified();

        if !file_report.modified {
            debug!("{}: already up to date", label);
            return Ok((file_report, outcome.summary));
        }

        if dry_run {
            let diff = self.differ.diff_content(&label, &original, doc.text());
            info!("{}: would apply {} change(s)", label, outcome.applied);
            file_report.diff = Some(diff);
            return Ok((file_report, outcome.summary));
        }

        match write_atomic(path, doc.text().to_string()).await {
            Ok(()) => {
                info!("{}: applied {} change(s)", label, outcome.applied);
                file_report.written = true;
            }
            Err(e) => {
                let message = format!("{}: write failed: {}", label, e);
                warn!("{}", message);
                file_report.warnings.push(message);
            }
        }

        Ok((file_report, outcome.summary))
    }

    /// Map each active config onto files, grouping by path in first-seen order
    fn resolve_targets<'c>(
        &self,
        configs: &[&'c FileChangeConfig],
        root: &Path,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<TargetFile<'c>>> {
        let mut targets: Vec<TargetFile<'c>> = Vec::new();
        let mut walked: Option<Vec<PathBuf>> = None;

        for &config in configs {
            let paths: Vec<PathBuf> = if is_glob(&config.file_name) {
                let files = self.walked(&mut walked, root)?;
                let globs = glob_set(&config.file_name)?;
                files
                    .iter()
                    .filter(|path| globs.is_match(relative_label(root, path)))
                    .cloned()
                    .collect()
            } else {
                let direct = root.join(&config.file_name);
                if direct.is_file() {
                    vec![direct]
                } else {
                    let files = self.walked(&mut walked, root)?;
                    files
                        .iter()
                        .find(|path| path.ends_with(&config.file_name))
                        .cloned()
                        .into_iter()
                        .collect()
                }
            };

            if paths.is_empty() {
                let message = format!("No file under {} matches {}", root.display(), config.file_name);
                warn!("{}", message);
                warnings.push(message);
                continue;
            }

            for path in paths {
                match targets.iter().position(|t| t.path == path) {
                    Some(index) => targets[index].configs.push(config),
                    None => targets.push(TargetFile {
                        path,
                        configs: vec![config],
                    }),
                }
            }
        }

        Ok(targets)
    }

    /// Walk `root` at most once per run
    fn walked<'w>(&self, cache: &'w mut Option<Vec<PathBuf>>, root: &Path) -> Result<&'w [PathBuf]> {
        if cache.is_none() {
            *cache = Some(self.walk(root)?);
        }
        Ok(cache.as_deref().unwrap_or_default())
    }

    /// Every file below `root`, sorted, skipping configured ignore patterns
    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let ignores = ignore_matcher(root, &self.config.project.ignore_patterns)?;
        let walk_root = root.to_path_buf();

        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .filter_entry(move |entry| {
                let relative = entry.path().strip_prefix(&walk_root).unwrap_or(entry.path());
                let is_dir = entry.file_type().map_or(false, |ft| ft.is_dir());
                !ignores.matched(relative, is_dir).is_ignore()
            })
            .build();

        let mut files: Vec<PathBuf> = walker
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Walk error: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().map_or(false, |ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        Ok(files)
    }
}

/// Replace `path` through a temp file in the same directory
async fn write_atomic(path: &Path, content: String) -> Result<()> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        if let Ok(metadata) = std::fs::metadata(&path) {
            tmp.as_file().set_permissions(metadata.permissions())?;
        }
        tmp.persist(&path)
            .map_err(|e| GraftError::FileSystem(format!("{}: {}", path.display(), e)))?;
        Ok(())
    })
    .await
    .map_err(|e| GraftError::FileSystem(e.to_string()))?
}

fn glob_set(pattern: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    builder.add(Glob::new(pattern).map_err(|e| GraftError::MalformedChangeSet(e.to_string()))?);
    builder
        .build()
        .map_err(|e| GraftError::MalformedChangeSet(e.to_string()))
}

/// Configured ignore patterns with gitignore semantics, rooted at `root`
fn ignore_matcher(root: &Path, patterns: &[String]) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
        builder
            .add_line(None, pattern)
            .map_err(|e| GraftError::Config(format!("Bad ignore pattern {:?}: {}", pattern, e)))?;
    }
    builder
        .build()
        .map_err(|e| GraftError::Config(format!("Bad ignore patterns: {}", e)))
}

fn skipped_message(path: &Path, error: &GraftError) -> String {
    match error {
        GraftError::Unavailable { reason, .. } => format!("Skipped {}: {}", path.display(), reason),
        other => format!("Skipped {}: {}", path.display(), other),
    }
}

/// Root-relative path with forward slashes, used for glob matching and messages
fn relative_label(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
