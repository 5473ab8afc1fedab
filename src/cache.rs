//! On-disk cache of expanded tweets.
//!
//! Each tweet lives at `expanded/<first 4 digits>/<id>.json` so no single
//! directory ends up with hundreds of thousands of entries.

use crate::error::{Result, XpandError};
use crate::model::TweetRecord;
use serde_json::Value;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

/// Directory under the base directory that holds artifacts.
pub const CACHE_DIR: &str = "expanded";

const SHARD_LEN: usize = 4;

/// File-per-tweet JSON cache.
#[derive(Debug, Clone)]
pub struct TweetCache {
    root: PathBuf,
}

impl TweetCache {
    /// Cache rooted at `<base_dir>/expanded`.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            root: base_dir.as_ref().join(CACHE_DIR),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic artifact path for `id`.
    #[must_use]
    pub fn path_for(&self, id: u64) -> PathBuf {
        let id_str = id.to_string();
        let shard = &id_str[..id_str.len().min(SHARD_LEN)];
        self.root.join(shard).join(format!("{id_str}.json"))
    }

    #[must_use]
    pub fn exists(&self, id: u64) -> bool {
        self.path_for(id).is_file()
    }

    /// Load the cached contents for `id`, or `None` if nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact exists but cannot be read or is not JSON.
    pub fn load(&self, id: u64) -> Result<Option<Value>> {
        let path = self.path_for(id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(XpandError::path_error("read", path, e)),
        };
        let value = serde_json::from_str(&content)
            .map_err(|e| XpandError::with_context(format!("parsing {}", path.display()), e))?;
        Ok(Some(value))
    }

    /// Write the record's contents, replacing any existing artifact atomically.
    ///
    /// # Errors
    ///
    /// Returns `MissingContents` if the record has no contents, or an IO error
    /// if the directory, temp file, or rename fails.
    pub fn save(&self, record: &TweetRecord) -> Result<PathBuf> {
        let contents = record
            .contents
            .as_ref()
            .ok_or(XpandError::MissingContents { id: record.id })?;

        let path = self.path_for(record.id);
        let parent = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent)
            .map_err(|e| XpandError::path_error("create directory", parent, e))?;

        let tmp = NamedTempFile::new_in(parent)
            .map_err(|e| XpandError::path_error("create temp file in", parent, e))?;
        let mut writer = BufWriter::new(tmp);
        serde_json::to_writer_pretty(&mut writer, contents)?;
        writer
            .flush()
            .map_err(|e| XpandError::path_error("write", &path, e))?;
        let tmp = writer
            .into_inner()
            .map_err(|e| XpandError::path_error("write", &path, e.into_error()))?;
        tmp.persist(&path)
            .map_err(|e| XpandError::path_error("replace", &path, e.error))?;

        debug!(id = record.id, path = %path.display(), "Saved tweet");
        Ok(path)
    }

    /// Ids of every artifact currently on disk, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be walked.
    pub fn cached_ids(&self) -> Result<Vec<u64>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|e| {
                XpandError::path_error("read", &self.root, std::io::Error::other(e))
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(id: u64, contents: Option<Value>) -> TweetRecord {
        TweetRecord::new(id, "42", contents)
    }

    #[test]
    fn path_is_sharded_by_prefix() {
        let cache = TweetCache::new("/base");
        assert_eq!(
            cache.path_for(1_234_567_890),
            PathBuf::from("/base/expanded/1234/1234567890.json")
        );
        assert_eq!(cache.path_for(42), PathBuf::from("/base/expanded/42/42.json"));
    }

    #[test]
    fn load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let cache = TweetCache::new(dir.path());
        assert!(cache.load(12345).unwrap().is_none());
        assert!(!cache.exists(12345));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let cache = TweetCache::new(dir.path());
        let contents = json!({"id_str": "98765", "full_text": "héllo", "user": {"id_str": "42"}});
        let path = cache.save(&record(98765, Some(contents.clone()))).unwrap();
        assert_eq!(path, cache.path_for(98765));
        assert_eq!(cache.load(98765).unwrap(), Some(contents));
    }

    #[test]
    fn save_writes_pretty_json() {
        let dir = TempDir::new().unwrap();
        let cache = TweetCache::new(dir.path());
        let path = cache.save(&record(1, Some(json!({"a": 1})))).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("\n  \"a\": 1"));
    }

    #[test]
    fn save_overwrites() {
        let dir = TempDir::new().unwrap();
        let cache = TweetCache::new(dir.path());
        cache.save(&record(7, Some(json!({"v": 1})))).unwrap();
        cache.save(&record(7, Some(json!({"v": 2})))).unwrap();
        assert_eq!(cache.load(7).unwrap().unwrap()["v"], 2);
        let shard: Vec<_> = std::fs::read_dir(cache.path_for(7).parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(shard.len(), 1, "temp files must not be left behind");
    }

    #[test]
    fn save_without_contents_fails() {
        let dir = TempDir::new().unwrap();
        let cache = TweetCache::new(dir.path());
        let err = cache.save(&record(7, None)).unwrap_err();
        assert!(matches!(err, XpandError::MissingContents { id: 7 }));
        assert!(!cache.exists(7));
    }

    #[test]
    fn load_corrupt_artifact_is_error() {
        let dir = TempDir::new().unwrap();
        let cache = TweetCache::new(dir.path());
        let path = cache.path_for(55);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert!(cache.load(55).is_err());
    }

    #[test]
    fn cached_ids_lists_saved_artifacts() {
        let dir = TempDir::new().unwrap();
        let cache = TweetCache::new(dir.path());
        assert!(cache.cached_ids().unwrap().is_empty());
        for id in [300_000, 12, 299_999] {
            cache.save(&record(id, Some(json!({})))).unwrap();
        }
        std::fs::write(cache.root().join("12").join("notes.txt"), "").unwrap();
        assert_eq!(cache.cached_ids().unwrap(), vec![12, 299_999, 300_000]);
    }
}
