//! Repeat-message suppression.
//!
//! A message is identified by a hash of its text. The sender checks for the key
//! before sending and adds it afterwards; entries only ever go away by expiring.
//! There is no atomic check-and-set, so two concurrent senders may both deliver
//! the same text once.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::{sync::Mutex, time::Instant};

use crate::Result;

const KEY_PREFIX: &str = "telegram_";

/// Dedup key for a message text: `telegram_<sha256 hex>`.
pub fn message_key(text: &str) -> String {
    use std::fmt::Write;

    let mut h = Sha256::new();
    h.update(text.as_bytes());
    let digest = h.finalize();

    let mut out = String::with_capacity(KEY_PREFIX.len() + digest.len() * 2);
    out.push_str(KEY_PREFIX);
    for b in digest.iter() {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// TTL key/value store used only for existence checks.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Whether the backing facility can be used at all (checked once at startup).
    async fn is_available(&self) -> bool;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Add `key` for `ttl`. An unexpired existing entry is left untouched.
    async fn add(&self, key: &str, ttl: Duration) -> Result<()>;
}

// ============== In-memory store ==============

/// Process-local store. Suppression does not cross process boundaries.
#[derive(Default)]
pub struct MemoryDedupStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn is_available(&self) -> bool {
        true
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, expires| *expires > now);
        Ok(entries.contains_key(key))
    }

    async fn add(&self, key: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(expires) if *expires > now => {}
            _ => {
                entries.insert(key.to_string(), now + ttl);
            }
        }
        Ok(())
    }
}

// ============== File-backed store ==============

/// One marker file per key holding the unix-milliseconds expiry.
///
/// Every process pointed at the same directory shares suppression state.
#[derive(Clone, Debug)]
pub struct FileDedupStore {
    dir: PathBuf,
}

impl FileDedupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    async fn read_expiry(path: &Path) -> Result<Option<u64>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(raw.trim().parse::<u64>().ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn unix_now_ms() -> u64 {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    u64::try_from(ms).unwrap_or(u64::MAX)
}

#[async_trait]
impl DedupStore for FileDedupStore {
    async fn is_available(&self) -> bool {
        if tokio::fs::create_dir_all(&self.dir).await.is_err() {
            return false;
        }
        let check = self.dir.join(format!(".writable-{}", std::process::id()));
        if tokio::fs::write(&check, b"1").await.is_err() {
            return false;
        }
        let _ = tokio::fs::remove_file(&check).await;
        true
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key);
        match Self::read_expiry(&path).await? {
            Some(expires) if expires > unix_now_ms() => Ok(true),
            Some(_) => {
                // Expired; reclaim the slot.
                let _ = tokio::fs::remove_file(&path).await;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn add(&self, key: &str, ttl: Duration) -> Result<()> {
        if self.exists(key).await? {
            return Ok(());
        }
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let expires = unix_now_ms().saturating_add(ttl_ms);
        tokio::fs::write(self.entry_path(key), expires.to_string()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_prefixed_sha256_hex() {
        let k = message_key("hello");
        assert!(k.starts_with("telegram_"));
        assert_eq!(k.len(), "telegram_".len() + 64);
        assert_eq!(
            &k["telegram_".len()..],
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_ne!(k, message_key("hello!"));
    }

    #[tokio::test(start_paused = true)]
    async fn memory_store_expires_entries() {
        let store = MemoryDedupStore::new();
        assert!(!store.exists("k").await.unwrap());

        store.add("k", Duration::from_secs(10)).await.unwrap();
        assert!(store.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn memory_store_add_keeps_live_entry() {
        let store = MemoryDedupStore::new();
        store.add("k", Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        // Re-adding must not extend the window.
        store.add("k", Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDedupStore::new(dir.path().join("dedup"));
        assert!(store.is_available().await);

        let key = message_key("disk full");
        assert!(!store.exists(&key).await.unwrap());
        store.add(&key, Duration::from_secs(60)).await.unwrap();
        assert!(store.exists(&key).await.unwrap());

        // A second handle on the same directory sees the entry.
        let other = FileDedupStore::new(store.dir());
        assert!(other.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn file_store_window_is_never_shorter_than_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDedupStore::new(dir.path());
        let key = message_key("cpu hot");

        let before = unix_now_ms();
        store.add(&key, Duration::from_secs(1)).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join(&key)).unwrap();
        let expires: u64 = raw.trim().parse().unwrap();
        assert!(expires >= before + 1_000);
        assert!(store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn file_store_treats_expired_marker_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDedupStore::new(dir.path());
        tokio::fs::write(dir.path().join("telegram_old"), "1")
            .await
            .unwrap();

        assert!(!store.exists("telegram_old").await.unwrap());
        assert!(!dir.path().join("telegram_old").exists());
    }

    #[tokio::test]
    async fn file_store_unavailable_when_dir_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let store = FileDedupStore::new(&blocker);
        assert!(!store.is_available().await);
    }
}
