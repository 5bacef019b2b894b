//! Persistent content-addressed cache over model artifact blobs (§4.1).
//!
//! Metadata (url, blob path, byte length, fetched-at) lives in a `rusqlite`
//! database with separate reader/writer connections. Blob bytes are written
//! to a content-addressed path (sha256 of the url) beneath a resolved cache
//! root.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lru::LruCache;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;

use crate::registry::Registry;

const PRESENCE_CACHE_CAPACITY: usize = 512;
const ESTIMATION_THRESHOLD_ENTRIES: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),
    #[error("artifact fetch failed (retryable={retryable}): {message}")]
    FetchFailed { retryable: bool, message: String },
    #[error("local artifact cache unavailable: {0}")]
    CacheUnsupported(String),
    #[error("failed to persist artifact: {0}")]
    PersistenceFailed(String),
}

pub type Result<T> = std::result::Result<T, ArtifactError>;

/// Fetched bytes plus the server's reported content length, if any.
pub struct FetchedArtifact {
    pub bytes: Vec<u8>,
    pub content_length_hint: Option<u64>,
}

/// `{cached, hasConfig, hasWeights}` per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCachePresence {
    pub cached: bool,
    pub has_config: bool,
    pub has_weights: bool,
}

/// Whether `size()` reported an exact sum or a Registry-derived estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeReport {
    Exact(u64),
    Estimated(u64),
}

fn content_address(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolution order for the cache root: explicit override env var, then
/// `ProjectDirs`, then home-dir fallback, then a relative last resort.
pub fn resolve_cache_root() -> PathBuf {
    if let Ok(path) = std::env::var("LEXISCOPE_CACHE_PATH") {
        return PathBuf::from(path);
    }
    if let Some(dirs) = directories::ProjectDirs::from("io", "lexiscope", "core") {
        return dirs.cache_dir().to_path_buf();
    }
    if let Some(base) = directories::BaseDirs::new() {
        return base.home_dir().join(".lexiscope_cache");
    }
    PathBuf::from(".lexiscope_cache")
}

pub struct ArtifactStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    blob_root: PathBuf,
    presence_cache: Mutex<LruCache<String, bool>>,
}

impl ArtifactStore {
    /// Opens (creating if needed) the store rooted at `cache_root`.
    pub fn open(cache_root: impl Into<PathBuf>) -> Result<Self> {
        let blob_root = cache_root.into();
        std::fs::create_dir_all(&blob_root)
            .map_err(|e| ArtifactError::CacheUnsupported(e.to_string()))?;
        let db_path = blob_root.join("artifacts.sqlite3");

        let writer = Connection::open(&db_path)
            .map_err(|e| ArtifactError::CacheUnsupported(e.to_string()))?;
        writer
            .execute(
                "CREATE TABLE IF NOT EXISTS artifacts (
                    url TEXT PRIMARY KEY,
                    blob_path TEXT NOT NULL,
                    byte_length INTEGER NOT NULL,
                    fetched_at TEXT NOT NULL
                )",
                [],
            )
            .map_err(|e| ArtifactError::CacheUnsupported(e.to_string()))?;

        let reader = Connection::open(&db_path)
            .map_err(|e| ArtifactError::CacheUnsupported(e.to_string()))?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            blob_root,
            presence_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(PRESENCE_CACHE_CAPACITY).unwrap(),
            )),
        })
    }

    /// O(1) amortized presence check for a single url.
    pub fn has(&self, url: &str) -> Result<bool> {
        if let Some(&present) = self.presence_cache.lock().unwrap().peek(url) {
            return Ok(present);
        }
        let present = self.row_exists(url)?;
        self.presence_cache.lock().unwrap().put(url.to_string(), present);
        Ok(present)
    }

    fn row_exists(&self, url: &str) -> Result<bool> {
        let reader = self.reader.lock().unwrap();
        let exists: Option<i64> = reader
            .query_row("SELECT 1 FROM artifacts WHERE url = ?1", params![url], |row| row.get(0))
            .optional()
            .map_err(|e| ArtifactError::CacheUnsupported(e.to_string()))?;
        Ok(exists.is_some())
    }

    /// One store acquisition, O(|urls|), per §4.1's mobile-browser constraint.
    pub fn batch_presence(&self, urls: &[String]) -> Result<Vec<(String, bool)>> {
        let reader = self.reader.lock().unwrap();
        let mut cache = self.presence_cache.lock().unwrap();
        let mut results = Vec::with_capacity(urls.len());

        for url in urls {
            if let Some(&present) = cache.peek(url.as_str()) {
                results.push((url.clone(), present));
                continue;
            }
            let present: Option<i64> = reader
                .query_row("SELECT 1 FROM artifacts WHERE url = ?1", params![url], |row| row.get(0))
                .optional()
                .map_err(|e| ArtifactError::CacheUnsupported(e.to_string()))?;
            let present = present.is_some();
            cache.put(url.clone(), present);
            results.push((url.clone(), present));
        }

        Ok(results)
    }

    /// Returns cached bytes if present, else fetches, stores on success, and
    /// returns. 4xx responses become `NotFound`; network/5xx are
    /// `FetchFailed { retryable: true }`.
    pub async fn fetch(&self, url: &str) -> Result<FetchedArtifact> {
        if let Some(blob_path) = self.blob_path_for(url)? {
            let bytes = std::fs::read(&blob_path)
                .map_err(|e| ArtifactError::PersistenceFailed(e.to_string()))?;
            return Ok(FetchedArtifact {
                content_length_hint: Some(bytes.len() as u64),
                bytes,
            });
        }

        let response = reqwest::get(url)
            .await
            .map_err(|e| ArtifactError::FetchFailed {
                retryable: true,
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_client_error() {
            return Err(ArtifactError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ArtifactError::FetchFailed {
                retryable: true,
                message: format!("status {status}"),
            });
        }

        let content_length_hint = response.content_length();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ArtifactError::FetchFailed {
                retryable: true,
                message: e.to_string(),
            })?
            .to_vec();

        if bytes.is_empty() {
            return Err(ArtifactError::FetchFailed {
                retryable: true,
                message: "empty body".to_string(),
            });
        }

        self.store(url, &bytes)?;

        Ok(FetchedArtifact {
            bytes,
            content_length_hint,
        })
    }

    fn blob_path_for(&self, url: &str) -> Result<Option<PathBuf>> {
        let reader = self.reader.lock().unwrap();
        let blob_path: Option<String> = reader
            .query_row("SELECT blob_path FROM artifacts WHERE url = ?1", params![url], |row| row.get(0))
            .optional()
            .map_err(|e| ArtifactError::CacheUnsupported(e.to_string()))?;
        Ok(blob_path.map(PathBuf::from))
    }

    fn store(&self, url: &str, bytes: &[u8]) -> Result<()> {
        let blob_path = self.blob_root.join(content_address(url));
        std::fs::write(&blob_path, bytes)
            .map_err(|e| ArtifactError::PersistenceFailed(e.to_string()))?;

        let writer = self.writer.lock().unwrap();
        writer
            .execute(
                "INSERT OR REPLACE INTO artifacts (url, blob_path, byte_length, fetched_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    url,
                    blob_path.to_string_lossy(),
                    bytes.len() as i64,
                    chrono::Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| ArtifactError::PersistenceFailed(e.to_string()))?;

        self.presence_cache.lock().unwrap().put(url.to_string(), true);
        Ok(())
    }

    /// `modelCached`: a model is cached iff at least one config artifact and
    /// at least one weight artifact is present for the candidate filenames
    /// the layout profile derives from `artifact_ref`.
    pub fn model_cached(
        &self,
        remote_host: &str,
        artifact_ref: &str,
        layout: &crate::neural_loader::LayoutProfile,
    ) -> Result<ModelCachePresence> {
        let config_urls = layout.config_urls(remote_host, artifact_ref);
        let weight_urls = layout.weight_urls(remote_host, artifact_ref);

        let mut has_config = false;
        for url in &config_urls {
            if self.has(url)? {
                has_config = true;
                break;
            }
        }
        let mut has_weights = false;
        for url in &weight_urls {
            if self.has(url)? {
                has_weights = true;
                break;
            }
        }

        Ok(ModelCachePresence {
            cached: has_config && has_weights,
            has_config,
            has_weights,
        })
    }

    /// Exact sum of stored blob sizes, or a Registry-derived estimate when
    /// entry count exceeds the threshold and exact summation is expensive.
    pub fn size(&self, registry: &Registry) -> Result<SizeReport> {
        let reader = self.reader.lock().unwrap();
        let count: i64 = reader
            .query_row("SELECT COUNT(*) FROM artifacts", [], |row| row.get(0))
            .map_err(|e| ArtifactError::CacheUnsupported(e.to_string()))?;

        if (count as usize) > ESTIMATION_THRESHOLD_ENTRIES {
            let distinct_prefixes: i64 = reader
                .query_row(
                    "SELECT COUNT(DISTINCT substr(url, 1, instr(url, '/resolve/'))) FROM artifacts",
                    [],
                    |row| row.get(0),
                )
                .unwrap_or(count);
            let per_model_estimate: u64 = registry
                .list()
                .iter()
                .map(|d| d.estimated_artifact_bytes)
                .sum::<u64>()
                .checked_div(registry.list().len().max(1) as u64)
                .unwrap_or(0);
            return Ok(SizeReport::Estimated(per_model_estimate * distinct_prefixes.max(0) as u64));
        }

        let total: i64 = reader
            .query_row("SELECT COALESCE(SUM(byte_length), 0) FROM artifacts", [], |row| row.get(0))
            .map_err(|e| ArtifactError::CacheUnsupported(e.to_string()))?;
        Ok(SizeReport::Exact(total.max(0) as u64))
    }

    pub fn size_of(&self, artifact_prefix: &str) -> Result<u64> {
        let reader = self.reader.lock().unwrap();
        let pattern = format!("{artifact_prefix}%");
        let total: i64 = reader
            .query_row(
                "SELECT COALESCE(SUM(byte_length), 0) FROM artifacts WHERE url LIKE ?1",
                params![pattern],
                |row| row.get(0),
            )
            .map_err(|e| ArtifactError::CacheUnsupported(e.to_string()))?;
        Ok(total.max(0) as u64)
    }

    /// Deletes every cached entry whose url starts with `artifact_prefix`,
    /// unlinking the blob files too.
    pub fn evict(&self, artifact_prefix: &str) -> Result<()> {
        let pattern = format!("{artifact_prefix}%");
        let paths: Vec<String> = {
            let reader = self.reader.lock().unwrap();
            let mut stmt = reader
                .prepare("SELECT blob_path FROM artifacts WHERE url LIKE ?1")
                .map_err(|e| ArtifactError::CacheUnsupported(e.to_string()))?;
            let rows = stmt
                .query_map(params![pattern], |row| row.get::<_, String>(0))
                .map_err(|e| ArtifactError::CacheUnsupported(e.to_string()))?;
            rows.filter_map(|r| r.ok()).collect()
        };

        for path in &paths {
            let _ = std::fs::remove_file(path);
        }

        let writer = self.writer.lock().unwrap();
        writer
            .execute("DELETE FROM artifacts WHERE url LIKE ?1", params![pattern])
            .map_err(|e| ArtifactError::PersistenceFailed(e.to_string()))?;
        drop(writer);

        let mut cache = self.presence_cache.lock().unwrap();
        cache.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>().into_iter().for_each(|k| {
            if k.starts_with(artifact_prefix) {
                cache.pop(&k);
            }
        });

        Ok(())
    }

    /// Deletes every cached entry and unlinks every blob file.
    pub fn clear_all(&self) -> Result<()> {
        let paths: Vec<String> = {
            let reader = self.reader.lock().unwrap();
            let mut stmt = reader
                .prepare("SELECT blob_path FROM artifacts")
                .map_err(|e| ArtifactError::CacheUnsupported(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| ArtifactError::CacheUnsupported(e.to_string()))?;
            rows.filter_map(|r| r.ok()).collect()
        };
        for path in &paths {
            let _ = std::fs::remove_file(path);
        }

        let writer = self.writer.lock().unwrap();
        writer
            .execute("DELETE FROM artifacts", [])
            .map_err(|e| ArtifactError::PersistenceFailed(e.to_string()))?;
        drop(writer);

        self.presence_cache.lock().unwrap().clear();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn blob_root_for_test(&self) -> &Path {
        &self.blob_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (ArtifactStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn has_is_false_for_unknown_url() {
        let (store, _dir) = store();
        assert!(!store.has("https://example.com/missing").unwrap());
    }

    #[test]
    fn batch_presence_single_acquisition_all_false_then_true_after_store() {
        let (store, _dir) = store();
        let urls = vec!["urlA".to_string(), "urlB".to_string(), "urlC".to_string()];
        let result = store.batch_presence(&urls).unwrap();
        assert!(result.iter().all(|(_, present)| !present));

        store.store("urlA", b"bytes").unwrap();
        let result = store.batch_presence(&urls).unwrap();
        assert_eq!(result[0], ("urlA".to_string(), true));
        assert_eq!(result[1], ("urlB".to_string(), false));
        assert_eq!(result[2], ("urlC".to_string(), false));
    }

    #[test]
    fn evict_removes_prefix_matches_only() {
        let (store, _dir) = store();
        store.store("https://h/modelA/resolve/main/config.json", b"x").unwrap();
        store.store("https://h/modelB/resolve/main/config.json", b"y").unwrap();
        store.evict("https://h/modelA").unwrap();
        assert!(!store.has("https://h/modelA/resolve/main/config.json").unwrap());
        assert!(store.has("https://h/modelB/resolve/main/config.json").unwrap());
    }

    #[test]
    fn clear_all_removes_everything() {
        let (store, _dir) = store();
        store.store("urlA", b"x").unwrap();
        store.store("urlB", b"y").unwrap();
        store.clear_all().unwrap();
        assert!(!store.has("urlA").unwrap());
        assert!(!store.has("urlB").unwrap());
    }
}
