//! Content cache for acquired archives, keyed by remote path.
//!
//! Every write also records a human-readable save name for the key. The
//! acquisition pipeline only writes that name; listing tools read it back.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::CacheError;

const NAMES_FILE: &str = "names.json";

/// Async key/value store for archive bytes.
#[allow(async_fn_in_trait)]
pub trait ContentCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn put(&self, key: &str, data: &[u8], save_name: &str) -> Result<(), CacheError>;

    /// Evict a key. Returns false if it was not cached.
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;
}

/// Process-local cache, mostly for tests and one-shot CLI runs.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save_name(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .await
            .get(key)
            .map(|(_, name)| name.clone())
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl ContentCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.lock().await.get(key).map(|(data, _)| data.clone()))
    }

    async fn put(&self, key: &str, data: &[u8], save_name: &str) -> Result<(), CacheError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (data.to_vec(), save_name.to_string()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }
}

/// Directory-backed cache: one `<sha256>.bin` file per key plus a
/// `names.json` side table of save names.
#[derive(Debug)]
pub struct DirCache {
    dir: PathBuf,
    index: Mutex<()>,
}

impl DirCache {
    /// Open (creating if needed) a cache rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            index: Mutex::new(()),
        })
    }

    /// Platform cache directory, e.g. `~/.cache/folio/archives`.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("folio").join("archives"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.dir.join(format!("{hex}.bin"))
    }

    async fn read_names(&self) -> Result<BTreeMap<String, String>, CacheError> {
        match tokio::fs::read(self.dir.join(NAMES_FILE)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_names(&self, names: &BTreeMap<String, String>) -> Result<(), CacheError> {
        let json = serde_json::to_vec_pretty(names)?;
        write_atomic(&self.dir.join(NAMES_FILE), &json).await
    }

    /// Names recorded for every cached key, a corrupt side table reads as empty.
    pub async fn entries(&self) -> Result<BTreeMap<String, String>, CacheError> {
        let _guard = self.index.lock().await;
        match self.read_names().await {
            Ok(names) => Ok(names),
            Err(CacheError::Index(e)) => {
                tracing::warn!("ignoring corrupt cache name table: {e}");
                Ok(BTreeMap::new())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn save_name(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries().await?.remove(key))
    }

    async fn update_names(
        &self,
        update: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), CacheError> {
        let _guard = self.index.lock().await;
        let mut names = match self.read_names().await {
            Ok(names) => names,
            Err(CacheError::Index(e)) => {
                tracing::warn!("rebuilding corrupt cache name table: {e}");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        update(&mut names);
        self.write_names(&names).await
    }
}

impl ContentCache for DirCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match tokio::fs::read(self.entry_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, data: &[u8], save_name: &str) -> Result<(), CacheError> {
        write_atomic(&self.entry_path(key), data).await?;
        self.update_names(|names| {
            names.insert(key.to_string(), save_name.to_string());
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let existed = match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        self.update_names(|names| {
            names.remove(key);
        })
        .await?;
        Ok(existed)
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let tmp = path.with_extension("part");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_roundtrip() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("a/b.zip").await.unwrap(), None);
        cache.put("a/b.zip", b"data", "Vol. 1").await.unwrap();
        assert_eq!(cache.get("a/b.zip").await.unwrap().as_deref(), Some(&b"data"[..]));
        assert_eq!(cache.save_name("a/b.zip").await.as_deref(), Some("Vol. 1"));
        assert!(cache.remove("a/b.zip").await.unwrap());
        assert!(!cache.remove("a/b.zip").await.unwrap());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_dir_cache_persists_blobs_and_names() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DirCache::open(tmp.path().join("archives")).await.unwrap();

        cache.put("/ranobe/1/vol1.fb2", b"<xml/>", "Volume 1").await.unwrap();
        cache.put("/manga/2/ch3.zip", b"PK", "Chapter 3").await.unwrap();

        let reopened = DirCache::open(tmp.path().join("archives")).await.unwrap();
        assert_eq!(
            reopened.get("/ranobe/1/vol1.fb2").await.unwrap().as_deref(),
            Some(&b"<xml/>"[..])
        );
        assert_eq!(
            reopened.save_name("/manga/2/ch3.zip").await.unwrap().as_deref(),
            Some("Chapter 3")
        );

        assert!(reopened.remove("/manga/2/ch3.zip").await.unwrap());
        assert_eq!(reopened.get("/manga/2/ch3.zip").await.unwrap(), None);
        let names = reopened.entries().await.unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names["/ranobe/1/vol1.fb2"], "Volume 1");
    }

    #[tokio::test]
    async fn test_dir_cache_recovers_from_corrupt_names() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DirCache::open(tmp.path()).await.unwrap();
        std::fs::write(tmp.path().join(NAMES_FILE), b"{not json").unwrap();
        assert!(cache.entries().await.unwrap().is_empty());
        cache.put("k", b"v", "name").await.unwrap();
        assert_eq!(cache.save_name("k").await.unwrap().as_deref(), Some("name"));
    }

    #[test]
    fn test_entry_paths_are_stable_hashes() {
        let cache = DirCache {
            dir: PathBuf::from("/tmp/x"),
            index: Mutex::new(()),
        };
        let a = cache.entry_path("same");
        assert_eq!(a, cache.entry_path("same"));
        assert_ne!(a, cache.entry_path("other"));
        let name = a.file_name().unwrap().to_str().unwrap();
        assert_eq!(name.len(), 64 + 4);
        assert!(name.ends_with(".bin"));
    }
}
