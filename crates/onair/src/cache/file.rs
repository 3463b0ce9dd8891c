use std::{
    path::PathBuf,
    sync::{Mutex, MutexGuard},
    time::SystemTime,
};

use bytes::Bytes;
use sha2::{Digest, Sha256};

use super::{lru::LruIndex, CacheKey, CacheStore};
use crate::error::OnairResult;

const EXTENSION: &str = "cache";

/// One file per entry in a directory, with an LRU byte budget.
///
/// Each file starts with a two line header (url, range) that must match the
/// requested key. Anything unreadable or mismatched is dropped and reported as
/// a miss.
pub struct FileCacheStore {
    cache_dir: PathBuf,
    index: Mutex<LruIndex<String>>,
    max_bytes: u64,
}

impl FileCacheStore {
    /// Opens the directory, creating it if needed, and indexes existing entries
    /// oldest first by modification time.
    pub async fn open(cache_dir: PathBuf, max_bytes: u64) -> OnairResult<Self> {
        tokio::fs::create_dir_all(&cache_dir).await?;

        let mut found = Vec::new();
        let mut entries = tokio::fs::read_dir(&cache_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                found.push((modified, name.to_string(), metadata.len()));
            }
        }
        found.sort();

        let mut index = LruIndex::new(max_bytes);
        for (_, name, size) in found {
            let evicted = index.insert(name.clone(), size).unwrap_or_else(|| vec![name]);
            for old in evicted {
                log::debug!("Dropping {old} to fit the cache budget.");
                _ = tokio::fs::remove_file(cache_dir.join(old)).await;
            }
        }
        log::info!(
            "Opened file cache at {} with {} entries ({} bytes).",
            cache_dir.display(),
            index.len(),
            index.used_bytes()
        );

        Ok(Self {
            cache_dir,
            index: Mutex::new(index),
            max_bytes,
        })
    }

    /// Location of the file backing `key`, whether or not it exists.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(file_name(key))
    }

    pub fn location_hint(&self) -> String {
        self.cache_dir.display().to_string()
    }

    fn lock(&self) -> MutexGuard<'_, LruIndex<String>> {
        match self.index.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn drop_entry(&self, name: &str) {
        self.lock().remove(&name.to_string());
        let path = self.cache_dir.join(name);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove {}: {e}", path.display());
            }
        }
    }
}

impl CacheStore for FileCacheStore {
    async fn get(&self, key: &CacheKey) -> OnairResult<Option<Bytes>> {
        let name = file_name(key);
        if !self.lock().contains(&name) {
            return Ok(None);
        }

        let data = match tokio::fs::read(self.cache_dir.join(&name)).await {
            Ok(data) => Bytes::from(data),
            Err(e) => {
                log::warn!("Failed to read cache entry for {key}: {e}");
                self.drop_entry(&name).await;
                return Ok(None);
            }
        };

        let header = header(key);
        if !data.starts_with(header.as_bytes()) {
            log::warn!("Cache entry for {key} is corrupted, dropping it.");
            self.drop_entry(&name).await;
            return Ok(None);
        }

        self.lock().touch(&name);
        Ok(Some(data.slice(header.len()..)))
    }

    async fn put(&self, key: &CacheKey, data: Bytes) -> OnairResult<()> {
        let name = file_name(key);
        let header = header(key);
        let size = (header.len() + data.len()) as u64;
        if size > self.max_bytes {
            log::warn!("{key} ({size} bytes) exceeds the cache budget, not caching.");
            return Ok(());
        }

        let path = self.cache_dir.join(&name);
        let tmp_path = path.with_extension("tmp");
        let mut contents = Vec::with_capacity(size as usize);
        contents.extend_from_slice(header.as_bytes());
        contents.extend_from_slice(&data);
        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        let evicted = self.lock().insert(name, size).unwrap_or_default();
        for old in evicted {
            log::debug!("Evicting {old} from file cache.");
            if let Err(e) = tokio::fs::remove_file(self.cache_dir.join(&old)).await {
                log::warn!("Failed to remove evicted entry {old}: {e}");
            }
        }
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> OnairResult<()> {
        self.drop_entry(&file_name(key)).await;
        Ok(())
    }

    async fn clear(&self) -> OnairResult<()> {
        self.lock().clear();
        if self.cache_dir.exists() {
            tokio::fs::remove_dir_all(&self.cache_dir).await?;
        }
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        Ok(())
    }

    fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn used_bytes(&self) -> u64 {
        self.lock().used_bytes()
    }
}

fn header(key: &CacheKey) -> String {
    format!("{}\n{}\n", key.url(), key.range().unwrap_or_default())
}

/// First 16 bytes of the SHA-256 of the key header, hex encoded.
fn file_name(key: &CacheKey) -> String {
    let digest = Sha256::digest(header(key).as_bytes());
    format!("{}.{EXTENSION}", hex::encode(&digest[..16]))
}
