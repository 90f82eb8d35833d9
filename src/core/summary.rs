use std::path::PathBuf;

use serde::Serialize;

/// Ordered, append-only descriptions of changes actually made
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    entries: Vec<String>,
}

impl ChangeSummary {
    pub fn record(&mut self, entry: impl Into<String>) {
        self.entries.push(entry.into());
    }

    pub fn extend(&mut self, other: ChangeSummary) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome for one target file
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileReport {
    pub path: PathBuf,

    /// The patched tree differs from what was loaded
    pub modified: bool,

    /// The patched text reached disk
    pub written: bool,

    /// Number of fragments inserted
    pub applied: usize,

    pub warnings: Vec<String>,

    /// Unified diff of the patch (dry runs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

/// Everything a batch run produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub summary: ChangeSummary,
    pub files: Vec<FileReport>,

    /// Run-level warnings (unresolved targets, unavailable files, write failures)
    pub warnings: Vec<String>,

    /// Cancellation stopped the run before every file was processed
    pub cancelled: bool,
}

impl BatchReport {
    pub fn modified_files(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.modified)
    }

    pub fn has_changes(&self) -> bool {
        self.files.iter().any(|f| f.modified)
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len() + self.files.iter().map(|f| f.warnings.len()).sum::<usize>()
    }
}
