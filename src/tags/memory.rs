// In-memory tag store for tests
use super::{TagStore, TagUpdate, TrackMetadata};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryTagStore {
    files: Mutex<HashMap<PathBuf, TrackMetadata>>,
    ignore_artist: bool,
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a container that silently drops the artist frame on save.
    pub fn ignoring_artist_writes(mut self) -> Self {
        self.ignore_artist = true;
        self
    }

    pub fn insert(&self, path: &Path, metadata: TrackMetadata) {
        self.files.lock().unwrap().insert(path.to_path_buf(), metadata);
    }

    /// Follow a file to its new location after a move.
    pub fn rename(&self, from: &Path, to: &Path) {
        let mut files = self.files.lock().unwrap();
        if let Some(metadata) = files.remove(from) {
            files.insert(to.to_path_buf(), metadata);
        }
    }
}

impl TagStore for MemoryTagStore {
    fn read_tags(&self, path: &Path) -> Result<TrackMetadata> {
        match self.files.lock().unwrap().get(path) {
            Some(metadata) => Ok(metadata.clone()),
            None => bail!("no such file: {}", path.display()),
        }
    }

    fn write_tags(&self, path: &Path, update: &TagUpdate) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        let Some(metadata) = files.get_mut(path) else {
            bail!("cannot save {}", path.display());
        };
        if let Some(artist) = &update.artist {
            if !self.ignore_artist {
                metadata.artist = artist.clone();
            }
        }
        if let Some(album) = &update.album {
            metadata.album = album.clone();
        }
        if let Some(title) = &update.title {
            metadata.title = title.clone();
        }
        if let Some(date) = &update.date {
            metadata.year = date.clone();
        }
        Ok(())
    }
}
