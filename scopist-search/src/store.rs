//! Per-project persistence of the deduplicated article set.
//!
//! A project directory holds `articles.json` and, while a collection run is
//! in progress, an advisory `articles.lock` file. Writes go to a temporary
//! file first and are renamed into place.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::SearchError;
use crate::orchestrator::dedup::{DedupStats, Deduplicator};
use crate::types::Article;

/// Article set file name inside a project directory.
pub const STORE_FILE: &str = "articles.json";

/// Advisory lock file name inside a project directory.
pub const LOCK_FILE: &str = "articles.lock";

const STORE_VERSION: u32 = 1;

const LOCK_POLL: Duration = Duration::from_millis(50);

#[derive(Deserialize)]
struct StoreFile {
    version: u32,
    articles: Vec<Article>,
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    version: u32,
    articles: &'a [Article],
}

/// The persisted article set of one project.
#[derive(Debug, Clone)]
pub struct CollectionStore {
    dir: PathBuf,
    dedup: Deduplicator,
    lock_timeout: Duration,
    stale_after: Duration,
}

impl CollectionStore {
    /// Opens (creating if needed) the store in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Store`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> crate::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            SearchError::Store(format!("cannot create project directory {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir,
            dedup: Deduplicator::default(),
            lock_timeout: Duration::from_secs(10),
            stale_after: Duration::from_secs(600),
        })
    }

    /// Sets the title similarity threshold used when merging.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.dedup = Deduplicator::new(threshold);
        self
    }

    /// Sets how long [`lock`](Self::lock) waits for a held lock.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the age after which an abandoned lock file is evicted.
    #[must_use]
    pub fn with_stale_after(mut self, age: Duration) -> Self {
        self.stale_after = age;
        self
    }

    /// The project directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the article set file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    /// Load the stored articles ordered by (`first_seen_at`, title). A
    /// missing file is an empty set.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Store`] if the file cannot be read or parsed.
    pub fn load(&self) -> crate::Result<Vec<Article>> {
        let path = self.path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SearchError::Store(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        };
        let file: StoreFile = serde_json::from_str(&content)
            .map_err(|e| SearchError::Store(format!("corrupt store {}: {e}", path.display())))?;
        if file.version != STORE_VERSION {
            return Err(SearchError::Store(format!(
                "unsupported store version {} in {}",
                file.version,
                path.display()
            )));
        }
        let mut articles = file.articles;
        articles.sort_by(|a, b| {
            a.first_seen_at
                .cmp(&b.first_seen_at)
                .then_with(|| a.title.cmp(&b.title))
        });
        Ok(articles)
    }

    /// Merge `new_articles` into the stored set, persist it, and return the
    /// full updated set. Stored records stay canonical.
    ///
    /// Does not take the advisory lock; callers running a full collection
    /// hold it through [`lock`](Self::lock).
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Store`] if the set cannot be read or written.
    pub fn append_and_merge(&self, new_articles: Vec<Article>) -> crate::Result<Vec<Article>> {
        Ok(self.append_and_merge_with_stats(new_articles)?.0)
    }

    /// Like [`append_and_merge`](Self::append_and_merge), also returning
    /// the dedup counts.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Store`] if the set cannot be read or written.
    pub fn append_and_merge_with_stats(
        &self,
        new_articles: Vec<Article>,
    ) -> crate::Result<(Vec<Article>, DedupStats)> {
        let existing = self.load()?;
        let before = existing.len();
        let (articles, stats) = self.dedup.merge_into(existing, new_articles);
        self.save(&articles)?;
        tracing::info!(
            path = %self.path().display(),
            before,
            after = articles.len(),
            added = stats.added(),
            "collection store updated"
        );
        Ok((articles, stats))
    }

    fn save(&self, articles: &[Article]) -> crate::Result<()> {
        let path = self.path();
        let json = serde_json::to_string_pretty(&StoreFileRef {
            version: STORE_VERSION,
            articles,
        })
        .map_err(|e| SearchError::Store(format!("cannot serialize articles: {e}")))?;

        let tmp_path = self
            .dir
            .join(format!(".{STORE_FILE}.tmp-{}", std::process::id()));
        std::fs::write(&tmp_path, json)
            .and_then(|()| std::fs::rename(&tmp_path, &path))
            .map_err(|e| {
                if let Err(cleanup) = std::fs::remove_file(&tmp_path) {
                    tracing::debug!(path = %tmp_path.display(), "cannot remove temp store file: {cleanup}");
                }
                SearchError::Store(format!("cannot write {}: {e}", path.display()))
            })
    }

    /// Take the project's advisory lock, polling until the lock timeout.
    /// Lock files older than the stale age are evicted.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Store`] if the lock stays held past the
    /// timeout or cannot be created.
    pub async fn lock(&self) -> crate::Result<StoreLock> {
        let lock_path = self.dir.join(LOCK_FILE);
        let started = std::time::Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    let stamp = chrono::Utc::now().timestamp_millis().to_string();
                    if let Err(e) = file.write_all(stamp.as_bytes()) {
                        tracing::debug!("cannot stamp lock file: {e}");
                    }
                    return Ok(StoreLock { path: lock_path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    self.evict_stale_lock(&lock_path);
                    if started.elapsed() > self.lock_timeout {
                        return Err(SearchError::Store(format!(
                            "timed out waiting for project lock {}",
                            lock_path.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                }
                Err(e) => {
                    return Err(SearchError::Store(format!(
                        "cannot create project lock {}: {e}",
                        lock_path.display()
                    )));
                }
            }
        }
    }

    fn evict_stale_lock(&self, lock_path: &Path) {
        let Ok(modified) = std::fs::metadata(lock_path).and_then(|m| m.modified()) else {
            return;
        };
        let Ok(age) = SystemTime::now().duration_since(modified) else {
            return;
        };
        if age >= self.stale_after {
            tracing::warn!(path = %lock_path.display(), ?age, "evicting stale project lock");
            let _ = std::fs::remove_file(lock_path);
        }
    }
}

/// Held advisory lock; released on drop.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
