use std::path::PathBuf;
use thiserror::Error;

/// Template authoring mistakes. Any of these aborts a whole preview batch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Please enter a path pattern")]
    EmptyPattern,
    #[error("Invalid placeholder {{{0}}} in pattern")]
    InvalidPlaceholder(String),
    #[error("Unclosed '{{' at position {0} in pattern")]
    UnclosedBrace(usize),
    #[error("Single '}}' at position {0} in pattern (use '}}}}' for a literal brace)")]
    StrayBrace(usize),
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{} is not part of the working set", .0.display())]
    UnknownFile(PathBuf),
    #[error("{} was already resolved or skipped", .0.display())]
    NotPending(PathBuf),
    #[error("Please enter at least one search term")]
    EmptyQuery,
    #[error("Google Books manual search requires an API key")]
    MissingApiKey,
    #[error("Failed to fetch book metadata for {}", .0.display())]
    ResolveFailed(PathBuf),
    #[error("Failed to update metadata for {}", .0.display())]
    UpdateFailed(PathBuf),
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("A scan is already running")]
    AlreadyRunning,
    #[error("Please select at least one file type")]
    NoExtensions,
    #[error("Scan task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
