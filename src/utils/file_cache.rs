//! Bounded, process-lifetime-TTL cache of file-existence checks shared by
//! the Optimizer and the Executor (§5 "Shared resources").

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Entry {
    exists: bool,
    checked_at: Instant,
}

pub struct FileExistenceCache {
    cache: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
}

impl FileExistenceCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity must be nonzero");
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Returns whether `path` exists, consulting the cache first and
    /// falling back to a real `stat()` on miss or expiry (§4.D "consults
    /// the file-existence cache to avoid redundant stat() calls").
    pub async fn exists(&self, path: &str) -> bool {
        {
            let mut cache = self.cache.lock().await;
            if let Some(entry) = cache.get(path) {
                if entry.checked_at.elapsed() < self.ttl {
                    return entry.exists;
                }
            }
        }
        let exists = tokio::fs::try_exists(Path::new(path)).await.unwrap_or(false);
        self.cache.lock().await.put(
            path.to_string(),
            Entry {
                exists,
                checked_at: Instant::now(),
            },
        );
        exists
    }

    /// Invalidates a single path, e.g. once the Executor has just written
    /// it and a later read should observe the fresh state immediately.
    pub async fn invalidate(&self, path: &str) {
        self.cache.lock().await.pop(path);
    }
}
