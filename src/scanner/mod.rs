// src/scanner/mod.rs
// Background scan: find incomplete files and look up catalog candidates
pub mod collector;

use crate::catalog::{CatalogClient, MatchCandidate};
use crate::error::ScanError;
use crate::filename;
use crate::progress::ScanProgress;
use crate::tags::{extension_of, TagStore, TrackMetadata};
use indexmap::IndexMap;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub input_dir: PathBuf,
    /// Lowercase, without the dot.
    pub extensions: Vec<String>,
}

/// Terminal result of a scan, delivered once.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub total_files: usize,
    /// Files with missing artist/title/album, each with its ranked candidates.
    pub incomplete: IndexMap<PathBuf, Vec<MatchCandidate>>,
    pub cancelled: bool,
}

/// A running scan: progress stream plus the final batch.
pub struct ScanHandle {
    pub progress: mpsc::UnboundedReceiver<ScanProgress>,
    cancel: Arc<AtomicBool>,
    task: JoinHandle<ScanOutcome>,
}

impl ScanHandle {
    /// Stop after the file currently being looked up.
    pub fn cancel(&self) {
        info!("Cancel requested - setting flag");
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub async fn finish(self) -> Result<ScanOutcome, ScanError> {
        Ok(self.task.await?)
    }
}

/// Starts scans one at a time.
pub struct Scanner {
    store: Arc<dyn TagStore>,
    catalog: Arc<CatalogClient>,
    running: Arc<AtomicBool>,
}

/// Clears the running flag when the scan task ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Scanner {
    pub fn new(store: Arc<dyn TagStore>, catalog: Arc<CatalogClient>) -> Self {
        Self {
            store,
            catalog,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the scan on the tokio runtime. Fails if one is already running.
    pub fn start(&self, request: ScanRequest) -> Result<ScanHandle, ScanError> {
        if request.extensions.is_empty() {
            return Err(ScanError::NoExtensions);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ScanError::AlreadyRunning);
        }

        let guard = RunningGuard(self.running.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let store = self.store.clone();
        let catalog = self.catalog.clone();
        let cancel_flag = cancel.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            info!("🔍 Starting scan of {}", request.input_dir.display());

            let ScanRequest { input_dir, extensions } = request;
            let files = match tokio::task::spawn_blocking(move || {
                collector::collect_audio_files(&input_dir, &extensions)
            })
            .await
            {
                Ok(files) => files,
                Err(e) => {
                    warn!("⚠️  File collection failed: {}", e);
                    Vec::new()
                }
            };
            info!("📁 Collected {} audio files", files.len());

            find_candidates(&files, store, &catalog, &tx, &cancel_flag).await
        });

        Ok(ScanHandle {
            progress: rx,
            cancel,
            task,
        })
    }
}

/// Sequential per-file pass: read tags, guess from the filename, query catalogs.
pub async fn find_candidates(
    files: &[PathBuf],
    store: Arc<dyn TagStore>,
    catalog: &CatalogClient,
    progress: &mpsc::UnboundedSender<ScanProgress>,
    cancel: &AtomicBool,
) -> ScanOutcome {
    let mut outcome = ScanOutcome {
        total_files: files.len(),
        ..ScanOutcome::default()
    };
    let mut status = ScanProgress::new(files.len());

    for (idx, path) in files.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            info!("Scan cancelled after {} of {} files", idx, files.len());
            outcome.cancelled = true;
            break;
        }

        let metadata = read_blocking(&store, path).await;
        if metadata.is_incomplete() {
            let (title, author) = filename::parse(&file_name(path));
            info!("📖 Missing metadata: {} (guess: '{}' by '{}')", path.display(), title, author);
            let matches = catalog.lookup_auto(&title, &author).await;
            outcome.incomplete.insert(path.clone(), matches);
        }

        status.update(idx + 1, &path.to_string_lossy());
        // A dropped receiver just means nobody is watching
        let _ = progress.send(status.clone());
    }

    info!(
        "✅ Scan complete: {} files, {} with missing metadata",
        outcome.total_files,
        outcome.incomplete.len()
    );
    outcome
}

/// Tag reads hit the disk, so they run on the blocking pool.
async fn read_blocking(store: &Arc<dyn TagStore>, path: &Path) -> TrackMetadata {
    let store = store.clone();
    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || store.read(&owned)).await {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("⚠️  Tag read for {} did not finish: {}", path.display(), e);
            TrackMetadata::unknown(extension_of(path))
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::{resolved, FakeBackend};
    use crate::catalog::{CatalogBackend, CatalogSource};
    use crate::tags::memory::MemoryTagStore;
    use crate::tags::TrackMetadata;

    fn catalog(backend: FakeBackend) -> (Arc<CatalogClient>, Arc<FakeBackend>) {
        let backend = Arc::new(backend);
        let backends: Vec<Arc<dyn CatalogBackend>> = vec![backend.clone()];
        (Arc::new(CatalogClient::new(backends, CatalogSource::OpenLibrary)), backend)
    }

    fn complete() -> TrackMetadata {
        TrackMetadata {
            artist: "Frank Herbert".to_string(),
            title: "Dune".to_string(),
            album: "Dune".to_string(),
            ..TrackMetadata::unknown("mp3")
        }
    }

    #[tokio::test]
    async fn test_only_incomplete_files_are_looked_up() {
        let store = Arc::new(MemoryTagStore::new());
        let done = PathBuf::from("/in/Herbert - Dune.mp3");
        let todo = PathBuf::from("/in/Tolkien - The Hobbit.mp3");
        store.insert(&done, complete());
        store.insert(&todo, TrackMetadata::unknown("mp3"));

        let (client, backend) = catalog(FakeBackend::new(
            CatalogSource::OpenLibrary,
            vec![resolved("The Hobbit", "Tolkien", CatalogSource::OpenLibrary)],
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = AtomicBool::new(false);

        let outcome = find_candidates(&[done.clone(), todo.clone()], store, &client, &tx, &cancel).await;

        assert_eq!(outcome.total_files, 2);
        assert_eq!(outcome.incomplete.len(), 1);
        assert_eq!(outcome.incomplete[&todo].len(), 1);
        assert!(!outcome.cancelled);
        assert_eq!(backend.search_count(), 1);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.message(), "Processed 1/2 files");
        assert_eq!(second.message(), "Processed 2/2 files");
    }

    #[tokio::test]
    async fn test_unreadable_files_count_as_incomplete_even_without_matches() {
        let store = Arc::new(MemoryTagStore::new());
        let (client, _) = catalog(FakeBackend::new(CatalogSource::OpenLibrary, Vec::new()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let path = PathBuf::from("/in/randomfile_03.mp3");

        let outcome = find_candidates(&[path.clone()], store, &client, &tx, &AtomicBool::new(false)).await;
        assert!(outcome.incomplete[&path].is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_scan_returns_partial_batch() {
        let store = Arc::new(MemoryTagStore::new());
        let (client, backend) = catalog(FakeBackend::new(CatalogSource::OpenLibrary, Vec::new()));
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = find_candidates(
            &[PathBuf::from("/in/a.mp3")],
            store,
            &client,
            &tx,
            &AtomicBool::new(true),
        )
        .await;
        assert!(outcome.cancelled);
        assert!(outcome.incomplete.is_empty());
        assert_eq!(backend.search_count(), 0);
    }

    #[tokio::test]
    async fn test_scanner_runs_one_scan_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Tolkien - The Hobbit.mp3"), b"not audio").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();

        let (client, _) = catalog(FakeBackend::new(
            CatalogSource::OpenLibrary,
            vec![resolved("The Hobbit", "Tolkien", CatalogSource::OpenLibrary)],
        ));
        let scanner = Scanner::new(Arc::new(crate::tags::FileTagStore::new()), client);
        let request = ScanRequest {
            input_dir: dir.path().to_path_buf(),
            extensions: vec!["mp3".to_string()],
        };

        let handle = scanner.start(request.clone()).unwrap();
        assert!(matches!(scanner.start(request.clone()), Err(ScanError::AlreadyRunning)));

        let outcome = handle.finish().await.unwrap();
        assert_eq!(outcome.total_files, 1);
        assert_eq!(outcome.incomplete.len(), 1);
        assert!(!scanner.is_running());

        let again = scanner.start(request).unwrap();
        again.finish().await.unwrap();
    }

    /// Store whose reads blow up, as a corrupt container can in a tag parser.
    struct PanickingStore;

    impl TagStore for PanickingStore {
        fn read_tags(&self, _path: &Path) -> anyhow::Result<TrackMetadata> {
            panic!("tag parser crashed");
        }

        fn write_tags(&self, _path: &Path, _update: &crate::tags::TagUpdate) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_crashing_tag_read_does_not_stop_the_scan() {
        let (client, backend) = catalog(FakeBackend::new(CatalogSource::OpenLibrary, Vec::new()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let files = vec![PathBuf::from("/in/a.m4b"), PathBuf::from("/in/b.mp3")];

        let outcome = find_candidates(&files, Arc::new(PanickingStore), &client, &tx, &AtomicBool::new(false)).await;

        assert_eq!(outcome.incomplete.len(), 2);
        assert!(!outcome.cancelled);
        assert_eq!(backend.search_count(), 2);
    }

    #[test]
    fn test_no_extensions_rejected() {
        let (client, _) = catalog(FakeBackend::new(CatalogSource::OpenLibrary, Vec::new()));
        let scanner = Scanner::new(Arc::new(MemoryTagStore::new()), client);
        let request = ScanRequest {
            input_dir: PathBuf::from("/in"),
            extensions: Vec::new(),
        };
        assert!(matches!(scanner.start(request), Err(ScanError::NoExtensions)));
    }
}
