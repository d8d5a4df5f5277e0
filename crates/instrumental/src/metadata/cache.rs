//! Metadata caches keyed by source path and modification time.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ModuleMetadata;
use crate::result::{InstrumentalError, InstrumentalResult};

/// Directory holding cache records, relative to the cache root
pub const CACHE_DIR: &str = ".instrumental.cache";

/// Storage for gathered metadata
pub trait MetadataCache {
    /// Metadata for a source file, if a record exists and is still valid
    fn fetch(&self, path: &Path) -> InstrumentalResult<Option<ModuleMetadata>>;

    /// Remember metadata for a source file
    fn store(&self, path: &Path, metadata: &ModuleMetadata) -> InstrumentalResult<()>;
}

/// Cache that never remembers anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetadataCache;

impl MetadataCache for NullMetadataCache {
    fn fetch(&self, _path: &Path) -> InstrumentalResult<Option<ModuleMetadata>> {
        Ok(None)
    }

    fn store(&self, _path: &Path, _metadata: &ModuleMetadata) -> InstrumentalResult<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    timestamp: DateTime<Utc>,
    metadata: ModuleMetadata,
}

/// JSON records under `<root>/.instrumental.cache/`, mirroring the absolute
/// source path.
///
/// A record is valid only while the source file's modification time is
/// strictly older than the record's timestamp.
#[derive(Debug, Clone)]
pub struct FileBackedMetadataCache {
    directory: PathBuf,
}

impl FileBackedMetadataCache {
    /// Create a cache rooted at `root`
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            directory: root.as_ref().join(CACHE_DIR),
        }
    }

    /// Directory holding the records
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Record location for a source file
    pub fn record_path(&self, path: &Path) -> InstrumentalResult<PathBuf> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| InstrumentalError::io(path, e))?
                .join(path)
        };
        let mut record = self.directory.clone();
        for component in absolute.components() {
            if let Component::Normal(part) = component {
                record.push(part);
            }
        }
        Ok(record)
    }

    fn modified(path: &Path) -> InstrumentalResult<DateTime<Utc>> {
        let modified = std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(|e| InstrumentalError::io(path, e))?;
        Ok(DateTime::<Utc>::from(modified))
    }
}

impl MetadataCache for FileBackedMetadataCache {
    fn fetch(&self, path: &Path) -> InstrumentalResult<Option<ModuleMetadata>> {
        let record_path = self.record_path(path)?;
        if !record_path.exists() {
            return Ok(None);
        }
        let file_mtime = Self::modified(path)?;
        let text = std::fs::read_to_string(&record_path)
            .map_err(|e| InstrumentalError::io(&record_path, e))?;
        let record: CacheRecord = serde_json::from_str(&text)?;
        if file_mtime < record.timestamp {
            Ok(Some(record.metadata))
        } else {
            tracing::debug!(path = %path.display(), "stale metadata cache record");
            Ok(None)
        }
    }

    fn store(&self, path: &Path, metadata: &ModuleMetadata) -> InstrumentalResult<()> {
        let record_path = self.record_path(path)?;
        if let Some(parent) = record_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| InstrumentalError::io(parent, e))?;
        }
        let record = CacheRecord {
            timestamp: Utc::now(),
            metadata: metadata.clone(),
        };
        let text = serde_json::to_string(&record)?;
        std::fs::write(&record_path, text).map_err(|e| InstrumentalError::io(&record_path, e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::GatherConfig;
    use crate::metadata::gather_source;
    use std::time::{Duration, SystemTime};

    fn metadata() -> ModuleMetadata {
        gather_source(GatherConfig::default(), "app", "x = a and b\n").unwrap()
    }

    #[test]
    fn test_null_cache_never_hits() {
        let cache = NullMetadataCache;
        cache.store(Path::new("/a.src"), &metadata()).unwrap();
        assert!(cache.fetch(Path::new("/a.src")).unwrap().is_none());
    }

    #[test]
    fn test_record_path_mirrors_absolute_path() {
        let cache = FileBackedMetadataCache::new("/work");
        let record = cache.record_path(Path::new("/src/app/main.src")).unwrap();
        assert_eq!(
            record,
            PathBuf::from("/work/.instrumental.cache/src/app/main.src")
        );
    }

    #[test]
    fn test_store_then_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app.src");
        std::fs::write(&source, "x = a and b\n").unwrap();
        let past = SystemTime::now() - Duration::from_secs(60);
        std::fs::File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(past)
            .unwrap();

        let cache = FileBackedMetadataCache::new(dir.path());
        assert!(cache.fetch(&source).unwrap().is_none());
        cache.store(&source, &metadata()).unwrap();
        assert_eq!(cache.fetch(&source).unwrap(), Some(metadata()));
    }

    #[test]
    fn test_modified_source_invalidates_record() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app.src");
        std::fs::write(&source, "x = a and b\n").unwrap();
        let cache = FileBackedMetadataCache::new(dir.path());
        cache.store(&source, &metadata()).unwrap();

        let future = SystemTime::now() + Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(future)
            .unwrap();
        assert!(cache.fetch(&source).unwrap().is_none());
    }
}
