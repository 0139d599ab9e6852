use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::CoreError;
use crate::models::cache::{UserCache, CACHE_VERSION};

/// Directory of per-user JSON caches (`<encoded-user-id>.json`).
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `user_id`'s cache.
    pub fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_user_id(user_id)))
    }

    /// Load a user's cache. `Ok(None)` when nothing was saved yet.
    ///
    /// A file whose recorded `user_id` differs from the requested one is rejected.
    pub fn load(&self, user_id: &str) -> Result<Option<UserCache>, CoreError> {
        let path = self.path_for(user_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cache file yet");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let cache: UserCache = serde_json::from_str(&raw)?;
        if cache.version == 0 || cache.version > CACHE_VERSION {
            return Err(CoreError::UnsupportedVersion(cache.version));
        }
        if cache.user_id != user_id {
            return Err(CoreError::ValidationError(format!(
                "cache file {} belongs to another user",
                path.display()
            )));
        }
        debug!(
            path = %path.display(),
            transactions = cache.transactions.len(),
            points = cache.history.len(),
            "cache loaded"
        );
        Ok(Some(cache))
    }

    /// Persist a cache: written to a sibling temp file, then renamed over the old one.
    pub fn save(&self, cache: &UserCache) -> Result<PathBuf, CoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&cache.user_id);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(cache)
            .map_err(|e| CoreError::Serialization(e.to_string()))?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        info!(path = %path.display(), points = cache.history.len(), "cache saved");
        Ok(path)
    }
}

/// Map a user id to a file stem, one-to-one.
///
/// ASCII alphanumerics and `-` are kept; every other byte, including `_`,
/// becomes `_XX` (upper-case hex). The empty id maps to `_`.
pub fn encode_user_id(user_id: &str) -> String {
    if user_id.is_empty() {
        return "_".to_string();
    }
    let mut encoded = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("_{byte:02X}"));
        }
    }
    encoded
}
