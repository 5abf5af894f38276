use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{IngestError, Result};

const ENTRY_SUFFIX: &str = "data";

/// Key-addressed store for expensive fetch results.
///
/// Entries never expire. A missing entry reads as `Ok(None)`; an entry that
/// exists but cannot be read or decoded is `CorruptEntry`, never a miss.
pub trait Cache: Send + Sync {
    fn try_read(&self, key: &str) -> Result<Option<Value>>;
    fn write(&self, key: &str, value: &Value) -> Result<()>;
}

/// One JSON file per key under a data directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{ENTRY_SUFFIX}", sanitize_key(key)))
    }
}

impl Cache for FileCache {
    fn try_read(&self, key: &str) -> Result<Option<Value>> {
        let path = self.entry_path(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(IngestError::CorruptEntry {
                    key: key.to_string(),
                    reason: format!("{}: {err}", path.display()),
                });
            }
        };
        let value =
            serde_json::from_slice::<Value>(&raw).map_err(|err| IngestError::CorruptEntry {
                key: key.to_string(),
                reason: format!("{}: {err}", path.display()),
            })?;
        Ok(Some(value))
    }

    fn write(&self, key: &str, value: &Value) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(key);
        let tmp = path.with_extension(format!("{ENTRY_SUFFIX}.tmp"));
        let json = serde_json::to_vec(value).map_err(|err| IngestError::Encode {
            key: key.to_string(),
            reason: err.to_string(),
        })?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Never stores anything; every read misses. Forces a refetch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl Cache for NoCache {
    fn try_read(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    fn write(&self, _key: &str, _value: &Value) -> Result<()> {
        Ok(())
    }
}

/// Strips path separators so a key always maps to a single file name.
pub fn sanitize_key(key: &str) -> String {
    key.chars().filter(|c| !matches!(c, '/' | '\\')).collect()
}

/// Returns the cached value for `key`, or runs `produce`, stores its result
/// and returns it. Failed productions are never stored.
pub fn memoize<T, F>(cache: &dyn Cache, key: &str, produce: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T>,
{
    if let Some(raw) = cache.try_read(key)? {
        debug!(key, "cache hit");
        return serde_json::from_value(raw).map_err(|err| IngestError::CorruptEntry {
            key: key.to_string(),
            reason: err.to_string(),
        });
    }

    debug!(key, "cache miss");
    let value = produce()?;
    let raw = serde_json::to_value(&value).map_err(|err| IngestError::Encode {
        key: key.to_string(),
        reason: err.to_string(),
    })?;
    cache.write(key, &raw)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn sanitize_drops_separators() {
        assert_eq!(sanitize_key("a/b\\c"), "abc");
        assert_eq!(sanitize_key("GAMES_FOR_DATE_20181004"), "GAMES_FOR_DATE_20181004");
    }

    #[test]
    fn entry_path_stays_inside_dir() {
        let cache = FileCache::new("/tmp/puck");
        assert_eq!(
            cache.entry_path("../../etc/passwd"),
            PathBuf::from("/tmp/puck/....etcpasswd.data")
        );
    }

    #[test]
    fn no_cache_always_misses() {
        let cache = NoCache;
        cache.write("k", &Value::from(3)).expect("discard");
        assert!(cache.try_read("k").expect("read").is_none());
    }

    #[test]
    fn memoize_runs_producer_on_every_call_without_cache() {
        let calls = Cell::new(0);
        for _ in 0..3 {
            let value: u32 = memoize(&NoCache, "k", || {
                calls.set(calls.get() + 1);
                Ok(7)
            })
            .expect("produce");
            assert_eq!(value, 7);
        }
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn unreadable_entry_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(dir.path());
        fs::create_dir(cache.entry_path("k")).expect("mkdir");
        assert!(matches!(
            cache.try_read("k"),
            Err(IngestError::CorruptEntry { .. })
        ));
    }

    #[test]
    fn unencodable_value_is_an_encode_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(dir.path());
        let mut bad = std::collections::HashMap::new();
        bad.insert((1u8, 2u8), 3u8);
        let result = memoize(&cache, "k", || Ok(bad));
        assert!(matches!(result, Err(IngestError::Encode { .. })));
        assert!(!cache.entry_path("k").exists());
    }

    #[test]
    fn memoize_does_not_store_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(dir.path());
        let failed: Result<u32> =
            memoize(&cache, "k", || Err(IngestError::ParseFailure("nope".into())));
        assert!(failed.is_err());
        assert!(cache.try_read("k").expect("read").is_none());
    }
}
