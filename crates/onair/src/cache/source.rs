use bytes::Bytes;
use url::Url;

use super::{CacheKey, CacheStore};
use crate::{
    error::{OpenError, ReadError},
    source::{LengthHint, ResponseHeaders, StreamRequest, StreamSource, TransferStats},
};

/// Largest up-front allocation for a response being copied into the cache.
const TEE_PREALLOC: u64 = 1024 * 1024;

struct Tee {
    key: CacheKey,
    expected: u64,
    data: Vec<u8>,
}

enum Mode {
    Idle,
    Hit(Bytes),
    Tee(Tee),
    Bypass,
}

/// Serves complete responses from a [`CacheStore`] and fills it on the way.
///
/// Only responses of known length that fit the budget are stored, and only
/// once they were read to the end without error. Unknown-length requests go
/// straight to the inner source. Cache failures never fail the stream.
pub struct CachingSource<S, C> {
    inner: S,
    cache: C,
    mode: Mode,
    uri: Option<Url>,
    stats: TransferStats,
}

impl<S, C> CachingSource<S, C>
where
    S: StreamSource,
    C: CacheStore,
{
    pub fn new(inner: S, cache: C) -> Self {
        Self {
            inner,
            cache,
            mode: Mode::Idle,
            uri: None,
            stats: TransferStats::default(),
        }
    }

    /// Whether the current stream is served from the cache.
    pub fn is_cache_hit(&self) -> bool {
        matches!(self.mode, Mode::Hit(_))
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    async fn read_through(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        let result = self.inner.read(buf).await;
        let Mode::Tee(tee) = &mut self.mode else {
            return result;
        };

        match result {
            Ok(0) if !buf.is_empty() => {
                if let Mode::Tee(tee) = std::mem::replace(&mut self.mode, Mode::Bypass) {
                    store(&self.cache, tee).await;
                }
                Ok(0)
            }
            Ok(len) => {
                tee.data.extend_from_slice(&buf[..len]);
                if tee.data.len() as u64 > tee.expected {
                    tracing::debug!("{} is longer than advertised, not caching", tee.key);
                    self.mode = Mode::Bypass;
                }
                Ok(len)
            }
            Err(e) => {
                self.mode = Mode::Bypass;
                Err(e)
            }
        }
    }
}

impl<S, C> StreamSource for CachingSource<S, C>
where
    S: StreamSource,
    C: CacheStore,
{
    async fn open(&mut self, request: &StreamRequest) -> Result<LengthHint, OpenError> {
        self.close();
        self.stats = TransferStats::default();
        self.uri = Some(request.url().clone());

        let key = CacheKey::for_request(request);
        match self.cache.get(&key).await {
            Ok(Some(data)) if !data.is_empty() => {
                tracing::debug!("Serving {key} from cache");
                let len = data.len() as u64;
                self.mode = Mode::Hit(data);
                return Ok(LengthHint::Known(len));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Cache lookup for {key} failed, ignoring cache: {e}");
                if let Err(e) = self.cache.invalidate(&key).await {
                    tracing::warn!("Failed to drop cache entry for {key}: {e}");
                }
            }
        }

        let hint = self.inner.open(request).await?;
        self.mode = match hint {
            LengthHint::Known(len) if len <= self.cache.max_bytes() => Mode::Tee(Tee {
                key,
                expected: len,
                data: Vec::with_capacity(len.min(TEE_PREALLOC) as usize),
            }),
            _ => Mode::Bypass,
        };
        Ok(hint)
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        let len = match self.mode {
            Mode::Idle => return Err(ReadError::Closed),
            Mode::Hit(ref mut data) => {
                let len = buf.len().min(data.len());
                buf[..len].copy_from_slice(&data.split_to(len));
                len
            }
            Mode::Tee(_) => self.read_through(buf).await?,
            Mode::Bypass => self.inner.read(buf).await?,
        };
        self.stats.bytes_transferred += len as u64;
        Ok(len)
    }

    fn close(&mut self) {
        self.mode = Mode::Idle;
        self.inner.close();
    }

    fn uri(&self) -> Option<&Url> {
        match self.mode {
            Mode::Hit(_) | Mode::Idle => self.uri.as_ref(),
            _ => self.inner.uri().or(self.uri.as_ref()),
        }
    }

    fn response_headers(&self) -> Option<&ResponseHeaders> {
        match self.mode {
            Mode::Hit(_) => None,
            _ => self.inner.response_headers(),
        }
    }

    fn stats(&self) -> TransferStats {
        self.stats
    }
}

async fn store<C: CacheStore>(cache: &C, tee: Tee) {
    if tee.data.len() as u64 != tee.expected {
        tracing::debug!(
            "{} ended after {} of {} bytes, not caching",
            tee.key,
            tee.data.len(),
            tee.expected
        );
        return;
    }
    match cache.put(&tee.key, Bytes::from(tee.data)).await {
        Ok(()) => tracing::debug!("Cached {}", tee.key),
        Err(e) => tracing::warn!("Failed to cache {}: {e}", tee.key),
    }
}
