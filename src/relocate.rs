// src/relocate.rs
// Preview and execute moves into the templated output layout
use crate::error::TemplateError;
use crate::filename;
use crate::tags::{is_unknown, TagStore, TrackMetadata};
use crate::template::PathTemplate;
use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    pub success: bool,
    pub message: String,
}

/// Compute destinations for `files` without touching the filesystem.
/// The first template fault aborts the whole plan.
pub fn plan_moves(
    store: &dyn TagStore,
    files: &[PathBuf],
    template: &PathTemplate,
    output_dir: &Path,
) -> Result<Vec<PlannedMove>, TemplateError> {
    let mut plan = Vec::with_capacity(files.len());

    for source in files {
        let metadata = with_filename_title(store.read(source), source);
        let destination = template.render(output_dir, &metadata)?;
        plan.push(PlannedMove {
            source: source.clone(),
            destination,
        });
    }

    Ok(plan)
}

/// An untitled file keeps the title guessed from its filename in the new path.
fn with_filename_title(mut metadata: TrackMetadata, source: &Path) -> TrackMetadata {
    if is_unknown(&metadata.title) {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let (title, _) = filename::parse(&name);
        if !title.is_empty() {
            metadata.title = title;
        }
    }
    metadata
}

/// First free path among `dest`, `dest (1)`, `dest (2)`, ... keeping the extension.
pub fn resolve_collision(dest: &Path) -> PathBuf {
    if !dest.exists() {
        return dest.to_path_buf();
    }

    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = dest.extension().map(|e| e.to_string_lossy().to_string());

    let mut counter = 1;
    loop {
        let name = match &ext {
            Some(ext) => format!("{} ({}).{}", stem, counter, ext),
            None => format!("{} ({})", stem, counter),
        };
        let candidate = dest.with_file_name(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Run the plan in order. Failures are recorded per file and never stop the batch.
pub fn execute(plan: &[PlannedMove]) -> Vec<MoveOutcome> {
    let mut outcomes = Vec::with_capacity(plan.len());

    for entry in plan {
        let outcome = match move_one(entry) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("❌ Error moving {}: {:#}", entry.source.display(), e);
                MoveOutcome {
                    old_path: entry.source.clone(),
                    new_path: entry.destination.clone(),
                    success: false,
                    message: format!("Error moving {}: {:#}", display_name(&entry.source), e),
                }
            }
        };
        outcomes.push(outcome);
    }

    let moved = outcomes.iter().filter(|o| o.success).count();
    info!("✅ Operation completed: {}/{} files moved", moved, plan.len());
    outcomes
}

fn move_one(entry: &PlannedMove) -> Result<MoveOutcome> {
    let source = &entry.source;
    if !source.exists() {
        anyhow::bail!("File does not exist");
    }

    if source == &entry.destination {
        return Ok(MoveOutcome {
            old_path: source.clone(),
            new_path: source.clone(),
            success: true,
            message: format!("{} already in place", display_name(source)),
        });
    }

    let destination = resolve_collision(&entry.destination);
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).context("Failed to create directory structure")?;
    }

    move_file(source, &destination)?;
    info!("✅ Moved: {} -> {}", source.display(), destination.display());

    Ok(MoveOutcome {
        old_path: source.clone(),
        new_path: destination.clone(),
        success: true,
        message: format!("Moved {} to {}", display_name(source), display_name(&destination)),
    })
}

/// Rename, or copy and remove when the rename crosses filesystems.
fn move_file(source: &Path, destination: &Path) -> Result<()> {
    if let Err(rename_err) = fs::rename(source, destination) {
        log::debug!("Rename failed ({}), copying instead", rename_err);
        fs::copy(source, destination)
            .with_context(|| format!("Failed to move file: {}", rename_err))?;
        fs::remove_file(source).context("Copied file but failed to remove the original")?;
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
