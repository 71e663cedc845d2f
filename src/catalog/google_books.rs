use super::{
    display_label, extract_year, valid_authors, valid_title, BookMetadata, CandidateKey, CatalogBackend,
    CatalogSource, MatchCandidate, SearchQuery, MAX_CANDIDATES,
};
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/books/v1";

/// Google Books: search results already carry everything a match needs.
pub struct GoogleBooks {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleBooksResponse {
    #[serde(default)]
    items: Vec<GoogleBookItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleBookItem {
    #[serde(rename = "volumeInfo", default)]
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
struct VolumeInfo {
    title: Option<String>,
    authors: Option<Vec<String>>,
    #[serde(rename = "publishedDate")]
    published_date: Option<String>,
}

impl GoogleBooks {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

/// `intitle:"..." inauthor:"..."`; series is not searchable here.
pub(crate) fn build_query(query: &SearchQuery) -> String {
    let mut parts = Vec::new();
    if !query.title.is_empty() {
        parts.push(format!("intitle:\"{}\"", query.title));
    }
    if !query.author.is_empty() {
        parts.push(format!("inauthor:\"{}\"", query.author));
    }
    parts.join(" ")
}

fn candidate_from_volume(info: VolumeInfo) -> Option<MatchCandidate> {
    let title = valid_title(info.title.as_deref())?;
    let authors = valid_authors(info.authors.as_deref().unwrap_or_default());
    if authors.is_empty() {
        debug!("Skipping match for {}: missing or invalid authors", title);
        return None;
    }

    let year = info.published_date.as_deref().and_then(extract_year);
    // Volumes have no series field; the title stands in for it.
    let book = BookMetadata::new(&title, authors, info.published_date, None, CatalogSource::GoogleBooks)?;

    Some(MatchCandidate {
        display_label: display_label(&book.title, &book.authors, year.as_deref()),
        source: CatalogSource::GoogleBooks,
        key: CandidateKey::Resolved(book),
    })
}

#[async_trait]
impl CatalogBackend for GoogleBooks {
    fn source(&self) -> CatalogSource {
        CatalogSource::GoogleBooks
    }

    fn missing_credentials(&self) -> bool {
        self.api_key.is_none()
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MatchCandidate>> {
        let q = build_query(query);
        if q.is_empty() {
            return Ok(Vec::new());
        }
        info!("          📚 Google Books query: {}", q);

        let url = format!("{}/volumes", self.base_url);
        let mut params = vec![("q", q.as_str())];
        if let Some(key) = &self.api_key {
            params.push(("key", key.as_str()));
        }

        let response: GoogleBooksResponse = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let matches: Vec<MatchCandidate> = response
            .items
            .into_iter()
            .take(MAX_CANDIDATES)
            .filter_map(|item| candidate_from_volume(item.volume_info))
            .collect();

        info!("             ✅ {} usable Google Books matches", matches.len());
        Ok(matches)
    }

    async fn resolve(&self, key: &CandidateKey) -> Result<Option<BookMetadata>> {
        match key {
            CandidateKey::Resolved(book) => Ok(Some(book.clone())),
            CandidateKey::OpenLibraryWork { .. } => Ok(None),
        }
    }
}
