// src/tags/file_store.rs
// Tag access on real files: lofty for reading, mp4ameta for iTunes atoms
use super::{extension_of, TagStore, TagUpdate, TrackMetadata, UNKNOWN};
use anyhow::{bail, Context, Result};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::ItemKey;
use std::borrow::Cow;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct FileTagStore;

impl FileTagStore {
    pub fn new() -> Self {
        Self
    }
}

impl TagStore for FileTagStore {
    fn read_tags(&self, path: &Path) -> Result<TrackMetadata> {
        let tagged_file = Probe::open(path)?.read()?;
        let mut metadata = TrackMetadata::unknown(extension_of(path));

        let Some(t) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            return Ok(metadata);
        };

        metadata.artist = text_or_unknown(t.artist());
        metadata.title = text_or_unknown(t.title());
        metadata.album = text_or_unknown(t.album());
        metadata.genre = text_or_unknown(t.genre());
        metadata.track_number = t
            .track()
            .filter(|n| *n > 0)
            .map(|n| n.to_string())
            .unwrap_or_else(|| UNKNOWN.to_string());
        metadata.year = t
            .get_string(&ItemKey::RecordingDate)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| t.year().map(|y| y.to_string()))
            .unwrap_or_else(|| UNKNOWN.to_string());

        Ok(metadata)
    }

    fn write_tags(&self, path: &Path, update: &TagUpdate) -> Result<()> {
        if !path.exists() {
            bail!("File does not exist: {}", path.display());
        }

        let metadata = std::fs::metadata(path)?;
        if metadata.len() == 0 {
            bail!("File is empty (0 bytes)");
        }

        let ext = extension_of(path);
        match ext.as_str() {
            "m4a" | "m4b" => write_m4a_tags(path, update),
            "mp3" | "aac" => write_standard_tags(path, update),
            _ => bail!("Unsupported format: {}", ext),
        }
    }
}

fn text_or_unknown(value: Option<Cow<'_, str>>) -> String {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

// iTunes M4A/M4B files
fn write_m4a_tags(path: &Path, update: &TagUpdate) -> Result<()> {
    let mut tag = mp4ameta::Tag::read_from_path(path)
        .with_context(|| format!("Failed to read MP4 atoms from {}", path.display()))?;

    if let Some(artist) = &update.artist {
        tag.set_artist(artist);
    }
    if let Some(album) = &update.album {
        tag.set_album(album);
    }
    if let Some(title) = &update.title {
        tag.set_title(title);
    }
    if let Some(date) = &update.date {
        tag.set_year(date.clone());
    }

    tag.write_to_path(path)
        .with_context(|| format!("Failed to save {}", path.display()))?;
    Ok(())
}

// MP3 and ADTS AAC via ID3v2
fn write_standard_tags(path: &Path, update: &TagUpdate) -> Result<()> {
    use lofty::config::WriteOptions;
    use lofty::tag::Tag;

    let mut tagged_file = Probe::open(path)?.read()?;

    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .primary_tag_mut()
        .context("File format has no writable tag")?;

    if let Some(artist) = &update.artist {
        tag.remove_key(&ItemKey::TrackArtist);
        tag.set_artist(artist.clone());
    }
    if let Some(album) = &update.album {
        tag.remove_key(&ItemKey::AlbumTitle);
        tag.set_album(album.clone());
    }
    if let Some(title) = &update.title {
        tag.remove_key(&ItemKey::TrackTitle);
        tag.set_title(title.clone());
    }
    if let Some(date) = &update.date {
        tag.remove_key(&ItemKey::RecordingDate);
        tag.insert_text(ItemKey::RecordingDate, date.clone());
    }

    tagged_file
        .save_to_path(path, WriteOptions::default())
        .with_context(|| format!("Failed to save {}", path.display()))?;
    Ok(())
}
