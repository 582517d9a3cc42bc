use crate::config::Config;
use crate::constants::LIST_PAGE_SIZE;
use crate::error::Result;
use crate::lister::KeyLister;
use crate::pipeline::{process_one, Outcome};
use crate::storage::ObjectStore;
use crate::{error, info};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Hands out keys from the shared lister, tagging each with a dispatch
/// sequence number. Pulls are serialized by the caller holding the lock, so
/// every key goes to exactly one worker, in listing order.
struct KeyDispatcher {
    lister: KeyLister,
    issued: u64,
}

impl KeyDispatcher {
    fn new(lister: KeyLister) -> Self {
        Self { lister, issued: 0 }
    }

    async fn next(&mut self) -> Result<Option<(u64, String)>> {
        match self.lister.next().await? {
            Some(key) => {
                let seq = self.issued;
                self.issued += 1;
                Ok(Some((seq, key)))
            }
            None => Ok(None),
        }
    }
}

struct JournalInner {
    log: File,
    /// Next sequence number the contiguous completed prefix is waiting for.
    watermark: u64,
    /// Completed keys that finished ahead of the watermark.
    completed: BTreeMap<u64, String>,
}

/// Durable sweep progress: an append-only processed-keys log, plus a marker
/// file used as the resume cursor.
///
/// Keys complete in arbitrary order across workers, but the marker only
/// advances past a contiguous prefix of completed dispatch sequence numbers.
/// A key that failed (or is still running) therefore pins the marker behind
/// it, and a resumed run can never skip work that was dispatched but not
/// recorded.
pub struct SweepJournal {
    marker_path: PathBuf,
    inner: Mutex<JournalInner>,
}

impl SweepJournal {
    pub fn open(marker_path: &Path, log_path: &Path) -> Result<Self> {
        let log = OpenOptions::new().create(true).append(true).open(log_path)?;
        Ok(Self {
            marker_path: marker_path.to_path_buf(),
            inner: Mutex::new(JournalInner {
                log,
                watermark: 0,
                completed: BTreeMap::new(),
            }),
        })
    }

    /// Reads the resume cursor left by a previous run, if any.
    pub fn load_marker(marker_path: &Path) -> Result<Option<String>> {
        if !marker_path.exists() {
            return Ok(None);
        }
        let marker = fs::read_to_string(marker_path)?;
        let marker = marker.trim();
        Ok((!marker.is_empty()).then(|| marker.to_string()))
    }

    /// Records a completed key: appends it to the log right away and, when
    /// it extends the contiguous completed prefix, advances the marker to
    /// the last key of that prefix.
    pub fn record_done(&self, seq: u64, key: &str) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;

        writeln!(&inner.log, "{key}")?;
        inner.completed.insert(seq, key.to_string());

        let mut marker = None;
        while let Some(done) = inner.completed.remove(&inner.watermark) {
            inner.watermark += 1;
            marker = Some(done);
        }
        if let Some(marker) = marker {
            fs::write(&self.marker_path, marker)?;
        }
        Ok(())
    }
}

/// Sweeps the configured bucket to completion: resumes from the marker,
/// fans keys out to one worker per available CPU, and records durable
/// progress as keys finish. Per-key failures are isolated and counted; a
/// listing failure ends only the worker that hit it.
pub async fn process_all(store: Arc<dyn ObjectStore>, config: &Config) -> Result<SweepSummary> {
    let start_time = Instant::now();

    let marker = SweepJournal::load_marker(&config.marker_file)?;
    match &marker {
        Some(marker) => info!("Resuming {} after {marker}", config.source_bucket),
        None => info!("Sweeping {} from the beginning", config.source_bucket),
    }

    let lister = KeyLister::new(
        store.clone(),
        config.source_bucket.clone(),
        config.prefix.clone(),
        marker,
        LIST_PAGE_SIZE,
    );
    let dispatcher = Arc::new(AsyncMutex::new(KeyDispatcher::new(lister)));
    let journal = Arc::new(SweepJournal::open(
        &config.marker_file,
        &config.processed_log,
    )?);

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {pos} objects swept {msg}")
            .expect("Invalid progress template"),
    );

    let processed_count = Arc::new(AtomicUsize::new(0));
    let skipped_count = Arc::new(AtomicUsize::new(0));
    let failed_count = Arc::new(AtomicUsize::new(0));

    let workers = num_cpus::get();
    info!("Using {workers} parallel workers");

    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let store = store.clone();
        let config = config.clone();
        let dispatcher = dispatcher.clone();
        let journal = journal.clone();
        let progress = progress.clone();
        let processed_count = processed_count.clone();
        let skipped_count = skipped_count.clone();
        let failed_count = failed_count.clone();

        handles.push(tokio::spawn(async move {
            loop {
                let pulled = dispatcher.lock().await.next().await;
                let (seq, key) = match pulled {
                    Ok(Some(dispatch)) => dispatch,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Worker {worker_id}: listing failed: {e}");
                        break;
                    }
                };

                progress.set_message(key.clone());
                match process_one(store.as_ref(), &config, &config.source_bucket, &key).await {
                    Ok(outcome) => {
                        match outcome {
                            Outcome::Optimized { .. } => {
                                processed_count.fetch_add(1, Ordering::Relaxed);
                            }
                            Outcome::Skipped(_) => {
                                skipped_count.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        if let Err(e) = journal.record_done(seq, &key) {
                            error!("Failed to record progress for {key}: {e}");
                        }
                    }
                    Err(e) => {
                        error!("Failed to process {key}: {e}");
                        failed_count.fetch_add(1, Ordering::Relaxed);
                    }
                }
                progress.inc(1);
            }
            info!("Worker {worker_id} has finished");
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Worker task aborted: {e}");
        }
    }
    progress.finish_and_clear();

    let summary = SweepSummary {
        processed: processed_count.load(Ordering::Relaxed),
        skipped: skipped_count.load(Ordering::Relaxed),
        failed: failed_count.load(Ordering::Relaxed),
    };

    info!("\n📊 Sweep Summary:");
    info!("  📁 Optimized: {}", summary.processed);
    info!("  📋 Skipped: {}", summary.skipped);
    if summary.failed > 0 {
        info!("  ⚠️  Failed: {}", summary.failed);
    }
    info!("  ⏱️  Total time: {:?}", start_time.elapsed());

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StoredObject};
    use image::{DynamicImage, ImageFormat, RgbaImage};
    use std::collections::HashMap;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn test_config(state_dir: &TempDir) -> Config {
        let vars = HashMap::from([("SOURCE_BUCKET".to_string(), "photos".to_string())]);
        let mut config = Config::from_vars(&vars).unwrap();
        config.marker_file = state_dir.path().join(".marker");
        config.processed_log = state_dir.path().join("processed.log");
        config
    }

    fn tiny_png() -> Vec<u8> {
        let img = RgbaImage::from_fn(16, 16, |x, y| {
            image::Rgba([(x * 13 % 256) as u8, (y * 17 % 256) as u8, 99, 255])
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    fn read_log(config: &Config) -> Vec<String> {
        fs::read_to_string(&config.processed_log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_journal_advances_only_contiguous_prefix() {
        let dir = TempDir::new().unwrap();
        let marker_path = dir.path().join(".marker");
        let log_path = dir.path().join("processed.log");
        let journal = SweepJournal::open(&marker_path, &log_path).unwrap();

        // Sequence 2 finishes first: logged, but no marker yet.
        journal.record_done(2, "c.png").unwrap();
        assert!(!marker_path.exists());

        // Sequence 0 closes the gap up to itself only.
        journal.record_done(0, "a.png").unwrap();
        assert_eq!(fs::read_to_string(&marker_path).unwrap(), "a.png");

        // Sequence 1 completes the prefix through 2.
        journal.record_done(1, "b.png").unwrap();
        assert_eq!(fs::read_to_string(&marker_path).unwrap(), "c.png");

        // The log is completion-ordered, not listing-ordered.
        let log = fs::read_to_string(&log_path).unwrap();
        assert_eq!(log, "c.png\na.png\nb.png\n");
    }

    #[test]
    fn test_journal_load_marker() {
        let dir = TempDir::new().unwrap();
        let marker_path = dir.path().join(".marker");

        assert_eq!(SweepJournal::load_marker(&marker_path).unwrap(), None);

        fs::write(&marker_path, "b.png\n").unwrap();
        assert_eq!(
            SweepJournal::load_marker(&marker_path).unwrap(),
            Some("b.png".to_string())
        );

        fs::write(&marker_path, "").unwrap();
        assert_eq!(SweepJournal::load_marker(&marker_path).unwrap(), None);
    }

    #[tokio::test]
    async fn test_process_all_sweeps_every_key() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let store = Arc::new(MemoryStore::new());
        for key in ["a.png", "b.png", "c.png", "d.png", "e.png"] {
            store.insert("photos", key, StoredObject::new(tiny_png(), Some("image/png")));
        }

        let summary = process_all(store.clone(), &config).await.unwrap();
        assert_eq!(summary.processed, 5);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed, 0);

        for key in store.keys("photos") {
            let object = store.object("photos", &key).unwrap();
            assert_eq!(object.metadata.get("optimized").map(String::as_str), Some("y"));
        }

        // All keys are in the log, and the marker ended on the last key.
        let mut logged = read_log(&config);
        logged.sort();
        assert_eq!(logged, vec!["a.png", "b.png", "c.png", "d.png", "e.png"]);
        assert_eq!(fs::read_to_string(&config.marker_file).unwrap(), "e.png");
    }

    #[tokio::test]
    async fn test_process_all_resumes_after_marker() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        fs::write(&config.marker_file, "b.png").unwrap();

        let store = Arc::new(MemoryStore::new());
        for key in ["a.png", "b.png", "c.png", "d.png"] {
            store.insert("photos", key, StoredObject::new(tiny_png(), Some("image/png")));
        }

        let summary = process_all(store.clone(), &config).await.unwrap();
        assert_eq!(summary.processed, 2);

        // Keys at or before the marker were not touched.
        assert!(store.object("photos", "a.png").unwrap().metadata.is_empty());
        assert!(store.object("photos", "b.png").unwrap().metadata.is_empty());
        assert!(store
            .object("photos", "c.png")
            .unwrap()
            .metadata
            .contains_key("optimized"));
        assert_eq!(fs::read_to_string(&config.marker_file).unwrap(), "d.png");
    }

    #[tokio::test]
    async fn test_process_all_counts_skips() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let store = Arc::new(MemoryStore::new());
        store.insert("photos", "a.png", StoredObject::new(tiny_png(), Some("image/png")));
        store.insert("photos", "readme.txt", StoredObject::new(b"text".to_vec(), None));

        let summary = process_all(store, &config).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn test_process_all_isolates_failures_and_pins_marker() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let store = Arc::new(MemoryStore::new());
        // First key in listing order is corrupt and will fail optimization.
        let mut corrupt = b"\x89PNG\r\n\x1a\n".to_vec();
        corrupt.extend_from_slice(&[0; 8]);
        store.insert("photos", "a.png", StoredObject::new(corrupt, Some("image/png")));
        store.insert("photos", "b.png", StoredObject::new(tiny_png(), Some("image/png")));
        store.insert("photos", "c.png", StoredObject::new(tiny_png(), Some("image/png")));

        let summary = process_all(store.clone(), &config).await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 1);

        // Later keys were still processed...
        assert!(store
            .object("photos", "c.png")
            .unwrap()
            .metadata
            .contains_key("optimized"));
        // ...but the failed key pins the marker, so a resumed run retries it.
        assert!(!config.marker_file.exists());
        let logged = read_log(&config);
        assert!(!logged.contains(&"a.png".to_string()));
    }
}
