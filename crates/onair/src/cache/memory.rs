use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use bytes::Bytes;

use super::{lru::LruIndex, CacheKey, CacheStore};
use crate::error::OnairResult;

struct Inner {
    data: HashMap<CacheKey, Bytes>,
    index: LruIndex<CacheKey>,
}

/// In-memory LRU cache.
///
/// Index and data sit behind one lock, so a reader never sees an entry that is
/// half evicted.
pub struct MemoryCacheStore {
    inner: Mutex<Inner>,
    max_bytes: u64,
}

impl MemoryCacheStore {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                data: HashMap::new(),
                index: LruIndex::new(max_bytes),
            }),
            max_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> OnairResult<Option<Bytes>> {
        let mut inner = self.lock();
        let data = inner.data.get(key).cloned();
        if data.is_some() {
            inner.index.touch(key);
        }
        Ok(data)
    }

    async fn put(&self, key: &CacheKey, data: Bytes) -> OnairResult<()> {
        let mut inner = self.lock();
        let Some(evicted) = inner.index.insert(key.clone(), data.len() as u64) else {
            log::warn!(
                "{key} ({} bytes) exceeds the cache budget, not caching.",
                data.len()
            );
            inner.data.remove(key);
            return Ok(());
        };
        for old in evicted {
            log::debug!("Evicting {old} from memory cache.");
            inner.data.remove(&old);
        }
        inner.data.insert(key.clone(), data);
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> OnairResult<()> {
        let mut inner = self.lock();
        inner.index.remove(key);
        inner.data.remove(key);
        Ok(())
    }

    async fn clear(&self) -> OnairResult<()> {
        let mut inner = self.lock();
        inner.index.clear();
        inner.data.clear();
        Ok(())
    }

    fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn used_bytes(&self) -> u64 {
        self.lock().index.used_bytes()
    }
}
