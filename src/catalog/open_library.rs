use super::{
    display_label, valid_authors, valid_title, BookMetadata, CandidateKey, CatalogBackend, CatalogSource,
    MatchCandidate, SearchQuery, MAX_CANDIDATES,
};
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://openlibrary.org";

/// Open Library: search returns work keys, authors/series need the work record.
pub struct OpenLibrary {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    key: Option<String>,
    title: Option<String>,
    author_name: Option<Vec<String>>,
    first_publish_year: Option<i64>,
}

impl OpenLibrary {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_work(&self, work_id: &str, author_hint: &[String]) -> Result<Option<BookMetadata>> {
        let url = format!("{}/works/{}.json", self.base_url, urlencoding::encode(work_id));
        let data: Value = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Open Library work {}: {}", work_id, data);

        Ok(book_from_work(&data, author_hint))
    }
}

/// Open Library search syntax: `title:"..." author:"..." series:"..."`.
pub(crate) fn build_query(query: &SearchQuery) -> String {
    let mut parts = Vec::new();
    if !query.title.is_empty() {
        parts.push(format!("title:\"{}\"", query.title));
    }
    if !query.author.is_empty() {
        parts.push(format!("author:\"{}\"", query.author));
    }
    if !query.series.is_empty() {
        parts.push(format!("series:\"{}\"", query.series));
    }
    parts.join(" ")
}

/// Work id from a key like `/works/OL45883W`.
fn work_id(key: &str) -> Option<&str> {
    key.rsplit('/').next().filter(|id| !id.is_empty())
}

/// Book record from a `/works/{id}.json` body, or `None` when the work is
/// incomplete. A work counts as complete when it has a usable title and at
/// least one author entry; entries that are only references take their names
/// from `author_hint` (the search hit's `author_name`).
pub(crate) fn book_from_work(data: &Value, author_hint: &[String]) -> Option<BookMetadata> {
    let title = valid_title(data.get("title").and_then(Value::as_str))?;

    let author_entries = data.get("authors").and_then(Value::as_array)?;
    if author_entries.is_empty() {
        return None;
    }

    // Work records usually carry author references rather than names;
    // fall back to the names the search listed for this work.
    let named: Vec<String> = author_entries
        .iter()
        .filter_map(|a| {
            a.get("name")
                .or_else(|| a.get("author").and_then(|inner| inner.get("name")))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect();
    let authors = if named.is_empty() {
        valid_authors(author_hint)
    } else {
        valid_authors(&named)
    };

    let series = data
        .get("series")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
        .and_then(|first| first.as_str().or_else(|| first.get("name").and_then(Value::as_str)))
        .map(str::to_string);

    let published = data
        .get("first_publish_date")
        .and_then(Value::as_str)
        .map(str::to_string);

    BookMetadata::new(&title, authors, published, series, CatalogSource::OpenLibrary)
}

#[async_trait]
impl CatalogBackend for OpenLibrary {
    fn source(&self) -> CatalogSource {
        CatalogSource::OpenLibrary
    }

    fn supports_series(&self) -> bool {
        true
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MatchCandidate>> {
        let q = build_query(query);
        info!("          📚 Open Library query: {}", q);

        let url = format!("{}/search.json", self.base_url);
        let response: SearchResponse = self
            .client
            .get(&url)
            .query(&[("q", q.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut matches = Vec::new();
        for doc in response.docs.into_iter().take(MAX_CANDIDATES) {
            let Some(title) = valid_title(doc.title.as_deref()) else {
                debug!("Skipping match: missing or invalid title");
                continue;
            };
            let authors = valid_authors(doc.author_name.as_deref().unwrap_or_default());
            if authors.is_empty() {
                debug!("Skipping match for {}: missing or invalid authors", title);
                continue;
            }
            let Some(id) = doc.key.as_deref().and_then(work_id) else {
                debug!("Skipping match for {}: no work key", title);
                continue;
            };

            // Detail fetch failures only drop this candidate
            match self.fetch_work(id, &authors).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!("Skipping match for {}: incomplete work record", title);
                    continue;
                }
                Err(e) => {
                    debug!("Skipping match for {}: {:#}", title, e);
                    continue;
                }
            }

            let year = doc.first_publish_year.map(|y| y.to_string());
            matches.push(MatchCandidate {
                display_label: display_label(&title, &authors, year.as_deref()),
                source: CatalogSource::OpenLibrary,
                key: CandidateKey::OpenLibraryWork {
                    work_id: id.to_string(),
                    author_hint: authors,
                },
            });
        }

        info!("             ✅ {} usable Open Library matches", matches.len());
        Ok(matches)
    }

    async fn resolve(&self, key: &CandidateKey) -> Result<Option<BookMetadata>> {
        match key {
            CandidateKey::OpenLibraryWork { work_id, author_hint } => self.fetch_work(work_id, author_hint).await,
            CandidateKey::Resolved(book) => Ok(Some(book.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::{local_client, serve, Route};
    use serde_json::json;

    #[test]
    fn test_build_query() {
        assert_eq!(
            build_query(&SearchQuery::new("The Hobbit", "Tolkien", "")),
            r#"title:"The Hobbit" author:"Tolkien""#
        );
        assert_eq!(
            build_query(&SearchQuery::new("", "", "Discworld")),
            r#"series:"Discworld""#
        );
    }

    #[test]
    fn test_work_id() {
        assert_eq!(work_id("/works/OL45883W"), Some("OL45883W"));
        assert_eq!(work_id("/works/"), None);
    }

    #[test]
    fn test_book_from_work_with_named_authors() {
        let data = json!({
            "title": "Guards! Guards!",
            "authors": [{"name": "Terry Pratchett"}, {"name": "Unknown"}],
            "first_publish_date": "1989",
            "series": [{"name": "Discworld"}]
        });
        let book = book_from_work(&data, &[]).unwrap();
        assert_eq!(book.authors, vec!["Terry Pratchett"]);
        assert_eq!(book.series, "Discworld");
        assert_eq!(book.published_date, "1989");
    }

    #[test]
    fn test_book_from_work_uses_hint_for_references() {
        let data = json!({
            "title": "Mort",
            "authors": [{"author": {"key": "/authors/OL25712A"}, "type": {"key": "/type/author_role"}}],
            "series": ["Discworld #4"]
        });
        let book = book_from_work(&data, &["Terry Pratchett".to_string()]).unwrap();
        assert_eq!(book.authors, vec!["Terry Pratchett"]);
        assert_eq!(book.series, "Discworld #4");
        assert_eq!(book.published_date, "Unknown");
    }

    #[test]
    fn test_book_from_work_rejects_incomplete_records() {
        assert!(book_from_work(&json!({"title": "Mort"}), &["Terry Pratchett".to_string()]).is_none());
        assert!(book_from_work(&json!({"title": "Mort", "authors": []}), &["Terry Pratchett".to_string()]).is_none());
        assert!(book_from_work(&json!({"authors": [{"name": "Terry Pratchett"}]}), &[]).is_none());
        assert!(book_from_work(&json!({"title": "Mort", "authors": [{"name": "Unknown"}]}), &[]).is_none());
    }

    #[test]
    fn test_series_defaults_to_title() {
        let data = json!({"title": "Mort", "authors": [{"name": "Terry Pratchett"}]});
        assert_eq!(book_from_work(&data, &[]).unwrap().series, "Mort");
    }

    fn doc(key: &str, title: &str, author: &str, year: i64) -> serde_json::Value {
        json!({"key": key, "title": title, "author_name": [author], "first_publish_year": year})
    }

    fn referenced_work(title: &str) -> String {
        json!({"title": title, "authors": [{"author": {"key": "/authors/OL25712A"}}]}).to_string()
    }

    #[tokio::test]
    async fn test_search_drops_failed_and_incomplete_details() {
        let docs = json!({"docs": [
            doc("/works/OL1W", "Mort", "Terry Pratchett", 1987),
            doc("/works/OL2W", "Sourcery", "Terry Pratchett", 1988),
            doc("/works/OL3W", "Eric", "Unknown", 1990),
            doc("/works/OL4W", "Pyramids", "Terry Pratchett", 1989),
        ]});
        let base = serve(vec![
            Route::ok("/search.json", docs.to_string()),
            Route::ok("/works/OL1W.json", referenced_work("Mort")),
            // OL2W has no route: the detail fetch 404s
            Route::ok("/works/OL3W.json", referenced_work("Eric")),
            Route::ok("/works/OL4W.json", json!({"title": "Pyramids"}).to_string()),
        ])
        .await;

        let backend = OpenLibrary::with_base_url(local_client(), &base);
        let found = backend
            .search(&SearchQuery::new("Mort", "Terry Pratchett", ""))
            .await
            .unwrap();

        let labels: Vec<&str> = found.iter().map(|c| c.display_label.as_str()).collect();
        assert_eq!(labels, vec!["Mort by Terry Pratchett (1987)"]);

        let book = backend.resolve(&found[0].key).await.unwrap().unwrap();
        assert_eq!(book.authors, vec!["Terry Pratchett"]);
        assert_eq!(book.series, "Mort");
    }

    #[tokio::test]
    async fn test_search_considers_first_five_docs() {
        let docs: Vec<serde_json::Value> = (1..=7)
            .map(|i| doc(&format!("/works/OL{}W", i), &format!("Book {}", i), "Author", 2000))
            .collect();
        let mut routes = vec![Route::ok("/search.json", json!({ "docs": docs }).to_string())];
        for i in 1..=7 {
            routes.push(Route::ok(&format!("/works/OL{}W.json", i), referenced_work(&format!("Book {}", i))));
        }
        let base = serve(routes).await;

        let found = OpenLibrary::with_base_url(local_client(), &base)
            .search(&SearchQuery::new("Book", "", ""))
            .await
            .unwrap();
        assert_eq!(found.len(), 5);
        assert_eq!(found[4].display_label, "Book 5 by Author (2000)");
    }

    #[tokio::test]
    async fn test_server_errors_and_bad_json_fail_the_search() {
        let base = serve(vec![Route::status("/search.json", 500, "oops")]).await;
        let backend = OpenLibrary::with_base_url(local_client(), &base);
        assert!(backend.search(&SearchQuery::new("Mort", "", "")).await.is_err());

        let base = serve(vec![Route::ok("/search.json", "{\"docs\": [")]).await;
        let backend = OpenLibrary::with_base_url(local_client(), &base);
        assert!(backend.search(&SearchQuery::new("Mort", "", "")).await.is_err());

        // The client absorbs the failure into an empty result
        let backends: Vec<std::sync::Arc<dyn CatalogBackend>> = vec![std::sync::Arc::new(backend)];
        let client = crate::catalog::CatalogClient::new(backends, CatalogSource::OpenLibrary);
        assert!(client.lookup_auto("Mort", "Terry Pratchett").await.is_empty());
    }
}
