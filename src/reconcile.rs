// src/reconcile.rs
// Working set of files with incomplete tags: Pending -> Resolved | Skipped
use crate::catalog::{CatalogClient, MatchCandidate};
use crate::error::ReconcileError;
use crate::scanner::ScanOutcome;
use crate::tags::{self, TagStore, WriteOptions};
use indexmap::{IndexMap, IndexSet};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Pending,
    Resolved,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationItem {
    pub path: PathBuf,
    /// Best guess first.
    pub candidates: Vec<MatchCandidate>,
}

/// One entry of the per-file picker. `NoMatch` is always offered first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    NoMatch,
    Candidate(MatchCandidate),
}

impl Choice {
    pub fn label(&self) -> &str {
        match self {
            Choice::NoMatch => "No match",
            Choice::Candidate(candidate) => &candidate.display_label,
        }
    }
}

/// User-entered search terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualQuery {
    pub title: String,
    pub author: String,
    pub series: String,
}

#[derive(Debug, Default)]
pub struct ApplyAllReport {
    pub applied: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    /// Files still pending afterwards.
    pub residual: usize,
}

impl ApplyAllReport {
    pub fn message(&self) -> String {
        if self.residual == 0 {
            "All files matched or skipped".to_string()
        } else {
            format!("{} files could not be matched, please review", self.residual)
        }
    }
}

pub struct Reconciler {
    store: Arc<dyn TagStore>,
    catalog: Arc<CatalogClient>,
    options: WriteOptions,
    pending: IndexMap<PathBuf, ReconciliationItem>,
    resolved: IndexSet<PathBuf>,
    skipped: IndexSet<PathBuf>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn TagStore>, catalog: Arc<CatalogClient>, options: WriteOptions) -> Self {
        Self {
            store,
            catalog,
            options,
            pending: IndexMap::new(),
            resolved: IndexSet::new(),
            skipped: IndexSet::new(),
        }
    }

    pub fn options(&self) -> WriteOptions {
        self.options
    }

    pub fn set_options(&mut self, options: WriteOptions) {
        self.options = options;
    }

    /// Replace the working set with a finished scan's batch.
    pub fn load(&mut self, outcome: ScanOutcome) {
        self.pending = outcome
            .incomplete
            .into_iter()
            .map(|(path, candidates)| (path.clone(), ReconciliationItem { path, candidates }))
            .collect();
        self.resolved.clear();
        self.skipped.clear();
        info!("Found {} files with missing metadata", self.pending.len());
    }

    /// Put a single file into the working set (e.g. before a manual search).
    pub fn add_pending(&mut self, path: PathBuf, candidates: Vec<MatchCandidate>) {
        self.resolved.shift_remove(&path);
        self.skipped.shift_remove(&path);
        self.pending
            .insert(path.clone(), ReconciliationItem { path, candidates });
    }

    pub fn state(&self, path: &Path) -> Option<FileState> {
        if self.pending.contains_key(path) {
            Some(FileState::Pending)
        } else if self.resolved.contains(path) {
            Some(FileState::Resolved)
        } else if self.skipped.contains(path) {
            Some(FileState::Skipped)
        } else {
            None
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &ReconciliationItem> {
        self.pending.values()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn resolved(&self) -> impl Iterator<Item = &PathBuf> {
        self.resolved.iter()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &PathBuf> {
        self.skipped.iter()
    }

    fn item(&self, path: &Path) -> Result<&ReconciliationItem, ReconcileError> {
        match self.pending.get(path) {
            Some(item) => Ok(item),
            None => Err(self.not_pending(path)),
        }
    }

    fn not_pending(&self, path: &Path) -> ReconcileError {
        if self.resolved.contains(path) || self.skipped.contains(path) {
            ReconcileError::NotPending(path.to_path_buf())
        } else {
            ReconcileError::UnknownFile(path.to_path_buf())
        }
    }

    /// Picker entries for a pending file: "No match" followed by the candidates.
    pub fn choices(&self, path: &Path) -> Result<Vec<Choice>, ReconcileError> {
        let item = self.item(path)?;
        Ok(std::iter::once(Choice::NoMatch)
            .chain(item.candidates.iter().cloned().map(Choice::Candidate))
            .collect())
    }

    /// Pending file after `path` in working-set order.
    pub fn next_pending(&self, path: &Path) -> Option<&Path> {
        let idx = self.pending.get_index_of(path)?;
        self.pending.get_index(idx + 1).map(|(p, _)| p.as_path())
    }

    pub fn previous_pending(&self, path: &Path) -> Option<&Path> {
        let idx = self.pending.get_index_of(path)?;
        let prev = idx.checked_sub(1)?;
        self.pending.get_index(prev).map(|(p, _)| p.as_path())
    }

    /// Replace a file's candidates with results for user-entered terms.
    /// Returns the number of matches; zero leaves the previous list intact.
    pub async fn manual_search(&mut self, path: &Path, query: &ManualQuery) -> Result<usize, ReconcileError> {
        self.item(path)?;

        let matches = self
            .catalog
            .lookup_manual(&query.title, &query.author, &query.series)
            .await?;
        if matches.is_empty() {
            info!("No matches found for manual search on {}", path.display());
            return Ok(0);
        }

        let count = matches.len();
        if let Some(item) = self.pending.get_mut(path) {
            item.candidates = matches;
        }
        Ok(count)
    }

    /// Resolve `candidate` and write it into the file's tags.
    pub async fn apply_one(&mut self, path: &Path, candidate: &MatchCandidate) -> Result<(), ReconcileError> {
        self.item(path)?;

        let Some(book) = self.catalog.resolve(candidate).await else {
            warn!("Failed to fetch book metadata for {}", path.display());
            return Err(ReconcileError::ResolveFailed(path.to_path_buf()));
        };

        if !tags::update_metadata(self.store.as_ref(), path, &book, self.options) {
            return Err(ReconcileError::UpdateFailed(path.to_path_buf()));
        }

        if let Some((path, _)) = self.pending.shift_remove_entry(path) {
            info!("Updated metadata for {}", path.display());
            self.resolved.insert(path);
        }
        Ok(())
    }

    /// Apply the picker entry at `index` (0 is "No match").
    pub async fn apply_choice(&mut self, path: &Path, index: usize) -> Result<bool, ReconcileError> {
        let choice = self.choices(path)?.into_iter().nth(index);
        match choice {
            Some(Choice::Candidate(candidate)) => {
                self.apply_one(path, &candidate).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn skip(&mut self, path: &Path) -> Result<(), ReconcileError> {
        match self.pending.shift_remove_entry(path) {
            Some((path, _)) => {
                info!("Skipped {}", path.display());
                self.skipped.insert(path);
                Ok(())
            }
            None => Err(self.not_pending(path)),
        }
    }

    /// Apply every pending file's top candidate. Files without candidates,
    /// or whose update fails, stay pending.
    pub async fn apply_all_best(&mut self) -> ApplyAllReport {
        let mut report = ApplyAllReport::default();

        let work: Vec<(PathBuf, MatchCandidate)> = self
            .pending
            .values()
            .filter_map(|item| item.candidates.first().map(|c| (item.path.clone(), c.clone())))
            .collect();

        for (path, candidate) in work {
            match self.apply_one(&path, &candidate).await {
                Ok(()) => report.applied.push(path),
                Err(e) => {
                    warn!("{}", e);
                    report.failed.push((path, e.to_string()));
                }
            }
        }

        report.residual = self.pending.len();
        info!("{}", report.message());
        report
    }
}
