// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ResourceError, Response};

/// A durable store of responses keyed by exact URL. Entries are never evicted here.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Returns the stored response for the URL, if any.
    async fn get(&self, url: &str) -> Result<Option<Response>, ResourceError>;

    /// Stores a response under the URL, replacing any previous entry.
    async fn put(&self, url: &str, response: &Response) -> Result<(), ResourceError>;
}

/// An in-process cache. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Response>>,
}

impl MemoryCache {
    pub fn new() -> MemoryCache {
        MemoryCache::default()
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, url: &str) -> Result<Option<Response>, ResourceError> {
        Ok(self.entries.lock().get(url).cloned())
    }

    async fn put(&self, url: &str, response: &Response) -> Result<(), ResourceError> {
        self.entries.lock().insert(url.to_string(), response.clone());
        Ok(())
    }
}

/// Sidecar metadata stored next to each cached body.
#[derive(Serialize, Deserialize)]
struct EntryMetadata {
    url: String,
    status: u16,
}

/// Distinguishes temp files of concurrent writers within this process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A cache that stores each response as a body file plus a JSON metadata file. The
/// metadata is written last, so an entry without metadata is treated as a miss. Both
/// files are written under a temp name and renamed into place, so readers only ever
/// see complete files.
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Creates a disk cache rooted at the given directory. The directory is created lazily.
    pub fn new(root: &Path) -> DiskCache {
        DiskCache {
            root: root.to_path_buf(),
        }
    }

    /// Returns the root directory of the cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key(url: &str) -> String {
        urlencoding::encode(url).into_owned()
    }

    fn body_path(&self, url: &str) -> PathBuf {
        self.root.join(format!("{}.body", DiskCache::key(url)))
    }

    fn metadata_path(&self, url: &str) -> PathBuf {
        self.root.join(format!("{}.json", DiskCache::key(url)))
    }

    fn temp_path(path: &Path) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".{}-{}.tmp", process::id(), n));
        PathBuf::from(name)
    }

    async fn write_atomic(url: &str, path: &Path, contents: &[u8]) -> Result<(), ResourceError> {
        let temp = DiskCache::temp_path(path);
        if let Err(e) = tokio::fs::write(&temp, contents).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(DiskCache::cache_error(url, e));
        }
        if let Err(e) = tokio::fs::rename(&temp, path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(DiskCache::cache_error(url, e));
        }
        Ok(())
    }

    fn cache_error(url: &str, source: io::Error) -> ResourceError {
        ResourceError::Cache {
            url: url.to_string(),
            source,
        }
    }
}

#[async_trait]
impl ResponseCache for DiskCache {
    async fn get(&self, url: &str) -> Result<Option<Response>, ResourceError> {
        let metadata = match tokio::fs::read(self.metadata_path(url)).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DiskCache::cache_error(url, e)),
        };
        let metadata: EntryMetadata = match serde_json::from_slice(&metadata) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(url, err = %e, "Ignoring corrupt cache entry");
                return Ok(None);
            }
        };
        if metadata.url != url {
            warn!(url, stored = %metadata.url, "Cache key collision");
            return Ok(None);
        }

        match tokio::fs::read(self.body_path(url)).await {
            Ok(body) => Ok(Some(Response {
                status: metadata.status,
                body,
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DiskCache::cache_error(url, e)),
        }
    }

    async fn put(&self, url: &str, response: &Response) -> Result<(), ResourceError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| DiskCache::cache_error(url, e))?;
        DiskCache::write_atomic(url, &self.body_path(url), &response.body).await?;

        let metadata = EntryMetadata {
            url: url.to_string(),
            status: response.status,
        };
        let metadata = serde_json::to_vec(&metadata).map_err(|e| {
            DiskCache::cache_error(url, io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        DiskCache::write_atomic(url, &self.metadata_path(url), &metadata).await?;

        debug!(url, bytes = response.body.len(), "Stored response in cache");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const URL: &str = "https://resources.example.net/ab/abcdef";

    #[tokio::test]
    async fn test_disk_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(&dir.path().join("nested"));

        assert!(cache.get(URL).await.unwrap().is_none());
        cache.put(URL, &Response::ok(vec![1, 2, 3])).await.unwrap();

        let response = cache.get(URL).await.unwrap().unwrap();
        assert_eq!(200, response.status);
        assert_eq!(vec![1, 2, 3], response.body);
    }

    #[tokio::test]
    async fn test_disk_cache_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        DiskCache::new(dir.path())
            .put(
                URL,
                &Response {
                    status: 404,
                    body: b"missing".to_vec(),
                },
            )
            .await
            .unwrap();

        let response = DiskCache::new(dir.path()).get(URL).await.unwrap().unwrap();
        assert_eq!(404, response.status);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_disk_cache_body_without_metadata_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        std::fs::write(cache.body_path(URL), b"partial").unwrap();
        assert!(cache.get(URL).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disk_cache_corrupt_metadata_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        cache.put(URL, &Response::ok(vec![9])).await.unwrap();
        std::fs::write(cache.metadata_path(URL), b"garbage").unwrap();
        assert!(cache.get(URL).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disk_cache_concurrent_puts_leave_complete_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let body: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();
        let response = Response::ok(body.clone());

        let (a, b, c, d) = tokio::join!(
            cache.put(URL, &response),
            cache.put(URL, &response),
            cache.put(URL, &response),
            cache.put(URL, &response),
        );
        for result in [a, b, c, d] {
            result.unwrap();
        }

        let stored = cache.get(URL).await.unwrap().unwrap();
        assert_eq!(200, stored.status);
        assert_eq!(body, stored.body);

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(2, names.len(), "unexpected files: {:?}", names);
        assert!(names.iter().all(|name| !name.ends_with(".tmp")));
    }

    #[tokio::test]
    async fn test_disk_cache_overwrite_replaces_body() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        cache.put(URL, &Response::ok(vec![1; 64])).await.unwrap();
        cache.put(URL, &Response::ok(vec![2; 8])).await.unwrap();
        assert_eq!(
            Some(Response::ok(vec![2; 8])),
            cache.get(URL).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_memory_cache_replaces_entries() {
        let cache = MemoryCache::new();
        cache
            .put(
                URL,
                &Response {
                    status: 500,
                    body: Vec::new(),
                },
            )
            .await
            .unwrap();
        cache.put(URL, &Response::ok(vec![4])).await.unwrap();
        assert_eq!(Some(Response::ok(vec![4])), cache.get(URL).await.unwrap());
    }
}
