pub mod file;
pub mod lru;
pub mod memory;
pub mod source;

use std::{future::Future, path::PathBuf, sync::Arc};

use bytes::Bytes;

use crate::{config::CacheOptions, error::OnairResult, source::StreamRequest};

pub use source::CachingSource;

/// Identifies one cached response: the URL plus the requested byte range, if any.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    url: String,
    range: Option<String>,
}

impl CacheKey {
    pub fn new(url: impl Into<String>, range: Option<String>) -> Self {
        Self {
            url: url.into(),
            range,
        }
    }

    pub fn for_request(request: &StreamRequest) -> Self {
        let range = request
            .headers()
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("range"))
            .map(|(_, value)| value.clone());
        Self::new(request.url().as_str(), range)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn range(&self) -> Option<&str> {
        self.range.as_deref()
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.range {
            Some(range) => write!(f, "{} [{range}]", self.url),
            None => write!(f, "{}", self.url),
        }
    }
}

/// A bounded store of complete response bodies.
pub trait CacheStore: Send + Sync + 'static {
    /// Returns the cached body and marks it as recently used.
    fn get(&self, key: &CacheKey) -> impl Future<Output = OnairResult<Option<Bytes>>> + Send;

    /// Stores a body, evicting least recently used entries to stay in budget.
    /// Bodies larger than the whole budget are not stored.
    fn put(&self, key: &CacheKey, data: Bytes) -> impl Future<Output = OnairResult<()>> + Send;

    /// Invalidate the entry of the key from the cache store.
    fn invalidate(&self, key: &CacheKey) -> impl Future<Output = OnairResult<()>> + Send;

    /// Clear the cache store.
    fn clear(&self) -> impl Future<Output = OnairResult<()>> + Send;

    fn max_bytes(&self) -> u64;

    fn used_bytes(&self) -> u64;
}

impl<C> CacheStore for Arc<C>
where
    C: CacheStore,
{
    fn get(&self, key: &CacheKey) -> impl Future<Output = OnairResult<Option<Bytes>>> + Send {
        self.as_ref().get(key)
    }

    fn put(&self, key: &CacheKey, data: Bytes) -> impl Future<Output = OnairResult<()>> + Send {
        self.as_ref().put(key, data)
    }

    fn invalidate(&self, key: &CacheKey) -> impl Future<Output = OnairResult<()>> + Send {
        self.as_ref().invalidate(key)
    }

    fn clear(&self) -> impl Future<Output = OnairResult<()>> + Send {
        self.as_ref().clear()
    }

    fn max_bytes(&self) -> u64 {
        self.as_ref().max_bytes()
    }

    fn used_bytes(&self) -> u64 {
        self.as_ref().used_bytes()
    }
}

pub enum OnairCache {
    Memory(memory::MemoryCacheStore),
    File(file::FileCacheStore),
}

impl OnairCache {
    pub fn memory(max_bytes: u64) -> Self {
        Self::Memory(memory::MemoryCacheStore::new(max_bytes))
    }

    pub async fn file(dir: impl Into<PathBuf>, max_bytes: u64) -> OnairResult<Self> {
        Ok(Self::File(
            file::FileCacheStore::open(dir.into(), max_bytes).await?,
        ))
    }

    /// Builds the configured cache, or `None` when caching is disabled.
    pub async fn from_options(options: &CacheOptions) -> OnairResult<Option<Self>> {
        if !options.enabled {
            return Ok(None);
        }
        let cache = match &options.dir {
            Some(dir) => Self::file(dir, options.max_bytes).await?,
            None => Self::memory(options.max_bytes),
        };
        Ok(Some(cache))
    }
}

impl CacheStore for OnairCache {
    async fn get(&self, key: &CacheKey) -> OnairResult<Option<Bytes>> {
        match self {
            OnairCache::Memory(cache) => cache.get(key).await,
            OnairCache::File(cache) => cache.get(key).await,
        }
    }

    async fn put(&self, key: &CacheKey, data: Bytes) -> OnairResult<()> {
        match self {
            OnairCache::Memory(cache) => cache.put(key, data).await,
            OnairCache::File(cache) => cache.put(key, data).await,
        }
    }

    async fn invalidate(&self, key: &CacheKey) -> OnairResult<()> {
        match self {
            OnairCache::Memory(cache) => cache.invalidate(key).await,
            OnairCache::File(cache) => cache.invalidate(key).await,
        }
    }

    async fn clear(&self) -> OnairResult<()> {
        match self {
            OnairCache::Memory(cache) => cache.clear().await,
            OnairCache::File(cache) => cache.clear().await,
        }
    }

    fn max_bytes(&self) -> u64 {
        match self {
            OnairCache::Memory(cache) => cache.max_bytes(),
            OnairCache::File(cache) => cache.max_bytes(),
        }
    }

    fn used_bytes(&self) -> u64 {
        match self {
            OnairCache::Memory(cache) => cache.used_bytes(),
            OnairCache::File(cache) => cache.used_bytes(),
        }
    }
}
