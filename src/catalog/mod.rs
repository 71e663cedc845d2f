// src/catalog/mod.rs
// Book catalog lookups with ordered fallback between backends
pub mod google_books;
pub mod open_library;

pub use google_books::GoogleBooks;
pub use open_library::OpenLibrary;

use crate::config::Config;
use crate::error::ReconcileError;
use crate::tags::{is_unknown, UNKNOWN};
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Upstream results considered per query.
pub const MAX_CANDIDATES: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSource {
    #[default]
    OpenLibrary,
    GoogleBooks,
}

impl CatalogSource {
    pub fn label(self) -> &'static str {
        match self {
            CatalogSource::OpenLibrary => "Open Library",
            CatalogSource::GoogleBooks => "Google Books",
        }
    }
}

impl fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CatalogSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace([' ', '_'], "-").as_str() {
            "open-library" | "openlibrary" => Ok(CatalogSource::OpenLibrary),
            "google-books" | "googlebooks" | "google" => Ok(CatalogSource::GoogleBooks),
            other => Err(format!("unknown catalog '{}' (expected open-library or google-books)", other)),
        }
    }
}

/// Authoritative book identity used to fill in tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    /// Never empty, never contains the "Unknown" sentinel.
    pub authors: Vec<String>,
    pub published_date: String,
    pub series: String,
    pub source: CatalogSource,
}

impl BookMetadata {
    /// Builds a record only if the title and at least one author are usable.
    pub fn new(
        title: &str,
        authors: Vec<String>,
        published_date: Option<String>,
        series: Option<String>,
        source: CatalogSource,
    ) -> Option<Self> {
        let title = valid_title(Some(title))?;
        let authors = valid_authors(&authors);
        if authors.is_empty() {
            return None;
        }

        let series = series
            .map(|s| s.trim().to_string())
            .filter(|s| !is_unknown(s))
            .unwrap_or_else(|| title.clone());
        let published_date = published_date
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());

        Some(Self {
            title,
            authors,
            published_date,
            series,
            source,
        })
    }

    /// Value written to the artist tag.
    pub fn artist_value(&self) -> String {
        self.authors.join(", ")
    }

    /// Value written to the album tag.
    pub fn album_value(&self) -> &str {
        &self.series
    }
}

/// How to get from a candidate to full `BookMetadata`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateKey {
    /// Needs a work-record fetch. `author_hint` holds the names the search listed.
    OpenLibraryWork { work_id: String, author_hint: Vec<String> },
    Resolved(BookMetadata),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCandidate {
    pub display_label: String,
    pub source: CatalogSource,
    pub key: CandidateKey,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub title: String,
    pub author: String,
    /// Only honoured by backends that support it.
    pub series: String,
}

impl SearchQuery {
    pub fn new(title: &str, author: &str, series: &str) -> Self {
        Self {
            title: title.trim().to_string(),
            author: author.trim().to_string(),
            series: series.trim().to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.author.is_empty() && self.series.is_empty()
    }
}

/// One external read-only catalog.
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    fn source(&self) -> CatalogSource;

    fn supports_series(&self) -> bool {
        false
    }

    /// True when a manual search cannot be issued (e.g. no API key).
    fn missing_credentials(&self) -> bool {
        false
    }

    /// Filtered candidates, best first. Transport errors bubble up.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<MatchCandidate>>;

    /// Full metadata for a candidate this backend produced.
    async fn resolve(&self, key: &CandidateKey) -> Result<Option<BookMetadata>>;
}

pub struct CatalogClient {
    backends: Vec<Arc<dyn CatalogBackend>>,
    preferred: CatalogSource,
}

impl CatalogClient {
    pub fn new(backends: Vec<Arc<dyn CatalogBackend>>, preferred: CatalogSource) -> Self {
        Self { backends, preferred }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let http = http_client(Duration::from_secs(config.http_timeout_secs.max(1)))?;
        let backends: Vec<Arc<dyn CatalogBackend>> = vec![
            Arc::new(OpenLibrary::new(http.clone())),
            Arc::new(GoogleBooks::new(http, config.google_books_api_key.clone())),
        ];
        Ok(Self::new(backends, config.catalog))
    }

    pub fn preferred(&self) -> CatalogSource {
        self.preferred
    }

    pub fn backend(&self, source: CatalogSource) -> Option<&Arc<dyn CatalogBackend>> {
        self.backends.iter().find(|b| b.source() == source)
    }

    /// Preferred backend first, then the rest in registration order.
    fn ordered(&self) -> impl Iterator<Item = &Arc<dyn CatalogBackend>> {
        let preferred = self.backend(self.preferred);
        preferred.into_iter().chain(
            self.backends
                .iter()
                .filter(move |b| b.source() != self.preferred),
        )
    }

    /// Lookup from a filename-derived guess.
    pub async fn lookup_auto(&self, title: &str, author: &str) -> Vec<MatchCandidate> {
        let query = SearchQuery::new(title, author, "");
        self.lookup(&query, false).await
    }

    /// Lookup from user-entered terms.
    pub async fn lookup_manual(
        &self,
        title: &str,
        author: &str,
        series: &str,
    ) -> Result<Vec<MatchCandidate>, ReconcileError> {
        let query = SearchQuery::new(title, author, series);
        if query.is_empty() {
            return Err(ReconcileError::EmptyQuery);
        }
        if self
            .backend(self.preferred)
            .map(|b| b.missing_credentials())
            .unwrap_or(false)
        {
            return Err(ReconcileError::MissingApiKey);
        }
        Ok(self.lookup(&query, true).await)
    }

    async fn lookup(&self, query: &SearchQuery, manual: bool) -> Vec<MatchCandidate> {
        for backend in self.ordered() {
            if manual && backend.missing_credentials() {
                debug!("Skipping {} for manual search: no credentials", backend.source());
                continue;
            }
            if !query.series.is_empty() && !backend.supports_series() {
                debug!("{} has no series search, ignoring '{}'", backend.source(), query.series);
            }

            let found = match backend.search(query).await {
                Ok(found) => found,
                Err(e) => {
                    warn!("❌ Error searching {}: {:#}", backend.source(), e);
                    Vec::new()
                }
            };

            if !found.is_empty() {
                return found;
            }
            info!("   No valid metadata from {} for '{}', trying next catalog", backend.source(), query.title);
        }
        Vec::new()
    }

    /// Full metadata for a candidate; `None` when the detail fetch fails.
    pub async fn resolve(&self, candidate: &MatchCandidate) -> Option<BookMetadata> {
        if let CandidateKey::Resolved(book) = &candidate.key {
            return Some(book.clone());
        }

        let backend = self.backend(candidate.source)?;
        match backend.resolve(&candidate.key).await {
            Ok(book) => book,
            Err(e) => {
                warn!("❌ Error fetching metadata for '{}': {:#}", candidate.display_label, e);
                None
            }
        }
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("audiobook-organizer/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

pub(crate) fn valid_title(title: Option<&str>) -> Option<String> {
    title
        .map(str::trim)
        .filter(|t| !is_unknown(t))
        .map(str::to_string)
}

/// Trimmed authors with empty and "Unknown" entries removed.
pub(crate) fn valid_authors<S: AsRef<str>>(authors: &[S]) -> Vec<String> {
    authors
        .iter()
        .map(|a| a.as_ref().trim())
        .filter(|a| !is_unknown(a))
        .map(str::to_string)
        .collect()
}

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").unwrap());

/// First four-digit run in a free-form date.
pub(crate) fn extract_year(date: &str) -> Option<String> {
    YEAR.find(date).map(|m| m.as_str().to_string())
}

pub(crate) fn display_label(title: &str, authors: &[String], year: Option<&str>) -> String {
    let mut label = format!("{} by {}", title, authors.join(", "));
    if let Some(year) = year {
        label.push_str(&format!(" ({})", year));
    }
    label
}
