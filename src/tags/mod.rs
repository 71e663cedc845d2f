// src/tags/mod.rs
// Normalized tag set + the "fill what's missing" write path
pub mod file_store;
#[cfg(test)]
pub mod memory;

pub use file_store::FileTagStore;

use crate::catalog::BookMetadata;
use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Sentinel for an absent tag value.
pub const UNKNOWN: &str = "Unknown";

/// Placeholder names a path template may reference.
pub const FIELD_NAMES: &[&str] = &["artist", "title", "album", "tracknumber", "year", "genre", "ext"];

pub fn is_unknown(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == UNKNOWN
}

/// Lowercased extension without the leading dot ("" when the file has none).
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub artist: String,
    pub title: String,
    pub album: String,
    pub track_number: String,
    pub year: String,
    pub genre: String,
    pub extension: String,
}

impl TrackMetadata {
    /// Record with every tag field set to the sentinel.
    pub fn unknown(extension: impl Into<String>) -> Self {
        Self {
            artist: UNKNOWN.to_string(),
            title: UNKNOWN.to_string(),
            album: UNKNOWN.to_string(),
            track_number: UNKNOWN.to_string(),
            year: UNKNOWN.to_string(),
            genre: UNKNOWN.to_string(),
            extension: extension.into(),
        }
    }

    /// A file needs reconciliation when artist, title or album is missing.
    pub fn is_incomplete(&self) -> bool {
        is_unknown(&self.artist) || is_unknown(&self.title) || is_unknown(&self.album)
    }

    /// Value for a template placeholder name.
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "artist" => &self.artist,
            "title" => &self.title,
            "album" => &self.album,
            "tracknumber" => &self.track_number,
            "year" => &self.year,
            "genre" => &self.genre,
            "ext" => &self.extension,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Replaces empty values with the sentinel.
    pub(crate) fn normalized(mut self) -> Self {
        for value in [
            &mut self.artist,
            &mut self.title,
            &mut self.album,
            &mut self.track_number,
            &mut self.year,
            &mut self.genre,
        ] {
            if value.trim().is_empty() {
                *value = UNKNOWN.to_string();
            }
        }
        self
    }
}

/// Fields to persist. `None` leaves the tag as it is on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagUpdate {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub date: Option<String>,
}

impl TagUpdate {
    pub fn is_empty(&self) -> bool {
        self.artist.is_none() && self.album.is_none() && self.title.is_none() && self.date.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Replace the title tag with the book title.
    pub set_title: bool,
}

/// Per-file key-value tag storage, abstracted over container formats.
pub trait TagStore: Send + Sync {
    /// Raw read; may fail on unreadable or malformed files.
    fn read_tags(&self, path: &Path) -> Result<TrackMetadata>;

    fn write_tags(&self, path: &Path, update: &TagUpdate) -> Result<()>;

    /// Never fails: an unreadable file yields an all-"Unknown" record.
    fn read(&self, path: &Path) -> TrackMetadata {
        match self.read_tags(path) {
            Ok(metadata) => metadata.normalized(),
            Err(e) => {
                warn!("⚠️  Error reading metadata from {}: {:#}", path.display(), e);
                TrackMetadata::unknown(extension_of(path))
            }
        }
    }
}

/// Decide which tags a book match may fill in.
///
/// Present tags are never overwritten, except the title when `set_title`
/// is enabled. Returns `None` when the artist is missing and the book has
/// no usable author to put there.
pub fn plan_update(current: &TrackMetadata, book: &BookMetadata, options: WriteOptions) -> Option<TagUpdate> {
    let mut update = TagUpdate::default();

    if is_unknown(&current.artist) {
        if book.authors.is_empty() {
            return None;
        }
        update.artist = Some(book.artist_value());
    }

    if is_unknown(&current.album) {
        update.album = Some(book.album_value().to_string());
    }

    if options.set_title && current.title != book.title {
        update.title = Some(book.title.clone());
    }

    if !is_unknown(&book.published_date) && is_unknown(&current.year) {
        update.date = Some(book.published_date.clone());
    }

    Some(update)
}

/// Apply a resolved book to a file's tags, then re-read to verify the artist stuck.
pub fn update_metadata(store: &dyn TagStore, path: &Path, book: &BookMetadata, options: WriteOptions) -> bool {
    info!(
        "✏️  Updating {}: authors={:?}, series='{}', title='{}'",
        path.display(),
        book.authors,
        book.album_value(),
        book.title
    );

    let current = store.read(path);
    let Some(update) = plan_update(&current, book, options) else {
        warn!("No valid author for {}, skipping artist update", path.display());
        return false;
    };

    if !update.is_empty() {
        if let Err(e) = store.write_tags(path, &update) {
            warn!("❌ Error updating metadata for {}: {:#}", path.display(), e);
            return false;
        }
    }

    let updated = store.read(path);
    info!(
        "   Updated {}: artist='{}', album='{}', title='{}'",
        path.display(),
        updated.artist,
        updated.album,
        updated.title
    );

    let artist_ok = match &update.artist {
        Some(expected) => updated.artist == *expected,
        None => !is_unknown(&updated.artist),
    };
    if !artist_ok {
        warn!("⚠️  Artist still '{}' for {} despite update attempt", updated.artist, path.display());
        return false;
    }

    true
}
