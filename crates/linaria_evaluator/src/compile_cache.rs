use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use linaria_filesystem::FileSystemRef;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::options::EvaluatorOptions;

/// Caches written by another version are discarded as a whole
pub const CACHE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Transform output of one file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileCacheEntry {
  pub code: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub map: Option<serde_json::Value>,
  pub opts_hash: String,
  /// Modification time of the file, in milliseconds
  pub mtime: u64,
  /// Digest of the transformed input. Shaken code differs between
  /// evaluations of the same unchanged file.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_hash: Option<String>,
}

impl CompileCacheEntry {
  pub fn is_fresh(&self, opts_hash: &str, mtime: u64, source_hash: &str) -> bool {
    self.opts_hash == opts_hash
      && self.mtime == mtime
      && self
        .source_hash
        .as_deref()
        .is_none_or(|hash| hash == source_hash)
  }

  /// The source map as text, for code frames
  pub fn map_string(&self) -> Option<String> {
    self.map.as_ref().map(|map| map.to_string())
  }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheBlob {
  version: String,
  data: IndexMap<PathBuf, CompileCacheEntry>,
}

#[derive(Debug, Default)]
struct CacheState {
  loaded: bool,
  dirty: bool,
  data: IndexMap<PathBuf, CompileCacheEntry>,
}

/// Transform outputs persisted as one JSON file, so unchanged files are not
/// transformed again by the next process.
///
/// The file is read lazily on first use and written back on [`save`] and on
/// drop. Without a path the cache only lives in memory. Concurrent processes
/// race on the file and the last writer wins; a stale entry only costs a
/// transform.
///
/// [`save`]: CompileCache::save
#[derive(Debug)]
pub struct CompileCache {
  fs: FileSystemRef,
  path: Option<PathBuf>,
  state: Mutex<CacheState>,
}

impl CompileCache {
  pub fn new(fs: FileSystemRef, path: Option<PathBuf>) -> Self {
    CompileCache {
      fs,
      path,
      state: Mutex::new(CacheState::default()),
    }
  }

  /// Cache at the location the options point to, or in memory only when
  /// caching is disabled
  pub fn from_options(fs: FileSystemRef, options: &EvaluatorOptions) -> Self {
    let path = (!options.cache_disabled()).then(|| options.cache_file());
    CompileCache::new(fs, path)
  }

  pub fn path(&self) -> Option<&Path> {
    self.path.as_deref()
  }

  /// Read the cache file, once. Missing or unreadable files and files from
  /// another version leave the cache empty.
  #[tracing::instrument(level = "debug", skip_all, fields(path = ?self.path))]
  pub fn load(&self) {
    let mut state = self.state.lock();
    self.load_locked(&mut state);
  }

  fn load_locked(&self, state: &mut CacheState) {
    if state.loaded {
      return;
    }
    state.loaded = true;

    let Some(path) = &self.path else {
      return;
    };
    if !self.fs.is_file(path) {
      return;
    }

    let blob = self
      .fs
      .read_to_string(path)
      .map_err(anyhow::Error::from)
      .and_then(|contents| Ok(serde_json::from_str::<CacheBlob>(&contents)?));
    match blob {
      Ok(blob) if blob.version == CACHE_VERSION => {
        tracing::debug!(entries = blob.data.len(), "Loaded compile cache");
        for (filename, entry) in blob.data {
          state.data.entry(filename).or_insert(entry);
        }
      }
      Ok(blob) => {
        tracing::debug!(version = %blob.version, "Discarding compile cache of another version");
      }
      Err(error) => {
        tracing::debug!("Ignoring unreadable compile cache: {error}");
      }
    }
  }

  pub fn get(&self, filename: &Path) -> Option<CompileCacheEntry> {
    let mut state = self.state.lock();
    self.load_locked(&mut state);
    state.data.get(filename).cloned()
  }

  pub fn insert(&self, filename: PathBuf, entry: CompileCacheEntry) {
    let mut state = self.state.lock();
    self.load_locked(&mut state);
    state.data.insert(filename, entry);
    state.dirty = true;
  }

  /// The live record map, loading it first if needed. Changes made through
  /// the guard are saved like inserts.
  pub fn data(&self) -> MappedMutexGuard<'_, IndexMap<PathBuf, CompileCacheEntry>> {
    let mut state = self.state.lock();
    self.load_locked(&mut state);
    state.dirty = true;
    MutexGuard::map(state, |state| &mut state.data)
  }

  pub fn len(&self) -> usize {
    let mut state = self.state.lock();
    self.load_locked(&mut state);
    state.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Write the whole cache to disk. When it can not be serialized the cache
  /// is cleared instead of failing the build.
  #[tracing::instrument(level = "debug", skip_all, fields(path = ?self.path))]
  pub fn save(&self) -> anyhow::Result<()> {
    let Some(path) = &self.path else {
      return Ok(());
    };
    let mut state = self.state.lock();

    let blob = CacheBlob {
      version: CACHE_VERSION.to_string(),
      data: std::mem::take(&mut state.data),
    };
    let serialized = serde_json::to_string_pretty(&blob);
    state.data = blob.data;
    let serialized = match serialized {
      Ok(serialized) => serialized,
      Err(error) => {
        tracing::warn!("Cache too large so it's been cleared. {error}");
        state.data.clear();
        serde_json::to_string(&CacheBlob {
          version: CACHE_VERSION.to_string(),
          data: IndexMap::new(),
        })?
      }
    };

    if let Some(parent) = path.parent() {
      if !self.fs.is_dir(parent) {
        self.fs.create_directory(parent)?;
      }
    }
    self.fs.write(path, serialized.as_bytes())?;
    state.dirty = false;
    Ok(())
  }

  /// Forget every entry. The emptied cache is written on the next save.
  pub fn clear(&self) {
    let mut state = self.state.lock();
    state.data.clear();
    state.loaded = true;
    state.dirty = true;
  }
}

impl Drop for CompileCache {
  fn drop(&mut self) {
    if !self.state.get_mut().dirty {
      return;
    }
    if let Err(error) = self.save() {
      tracing::warn!("Failed to write compile cache: {error}");
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use linaria_filesystem::in_memory_file_system::InMemoryFileSystem;
  use linaria_filesystem::FileSystem;
  use pretty_assertions::assert_eq;

  use super::*;

  fn entry(code: &str, mtime: u64) -> CompileCacheEntry {
    CompileCacheEntry {
      code: code.to_string(),
      map: None,
      opts_hash: "hash".into(),
      mtime,
      source_hash: Some("source".into()),
    }
  }

  fn cache_path() -> PathBuf {
    PathBuf::from("/cache/.linariaCompileCache.json")
  }

  #[test]
  fn test_freshness_requires_every_key_to_match() {
    let entry = entry("code", 10);
    assert!(entry.is_fresh("hash", 10, "source"));
    assert!(!entry.is_fresh("other", 10, "source"));
    assert!(!entry.is_fresh("hash", 11, "source"));
    assert!(!entry.is_fresh("hash", 10, "changed"));

    let legacy = CompileCacheEntry {
      source_hash: None,
      ..entry
    };
    assert!(legacy.is_fresh("hash", 10, "anything"));
  }

  #[test]
  fn test_save_and_load_round_trip() {
    let fs = Arc::new(InMemoryFileSystem::default());
    let cache = CompileCache::new(fs.clone(), Some(cache_path()));
    cache.insert("/src/a.js".into(), entry("exports.a = 1;", 1));
    cache.save().unwrap();

    let saved = fs.read_to_string(&cache_path()).unwrap();
    assert!(saved.starts_with("{\n  \"version\""), "{saved}");
    assert!(saved.contains("\"optsHash\": \"hash\""), "{saved}");

    let reloaded = CompileCache::new(fs, Some(cache_path()));
    assert_eq!(
      reloaded.get(Path::new("/src/a.js")),
      Some(entry("exports.a = 1;", 1))
    );
  }

  #[test]
  fn test_other_versions_are_discarded() {
    let fs = Arc::new(InMemoryFileSystem::default());
    fs.write(
      &cache_path(),
      br#"{ "version": "0.0.0-old", "data": { "/src/a.js": { "code": "", "optsHash": "hash", "mtime": 1 } } }"#,
    )
    .unwrap();

    let cache = CompileCache::new(fs, Some(cache_path()));
    assert!(cache.is_empty());
  }

  #[test]
  fn test_corrupt_files_are_ignored() {
    let fs = Arc::new(InMemoryFileSystem::default());
    fs.write(&cache_path(), b"{ not json").unwrap();

    let cache = CompileCache::new(fs, Some(cache_path()));
    assert!(cache.get(Path::new("/src/a.js")).is_none());
  }

  #[test]
  fn test_clear_writes_an_empty_cache_on_drop() {
    let fs = Arc::new(InMemoryFileSystem::default());
    {
      let cache = CompileCache::new(fs.clone(), Some(cache_path()));
      cache.insert("/src/a.js".into(), entry("", 1));
      cache.save().unwrap();
      cache.clear();
    }

    let saved: serde_json::Value =
      serde_json::from_str(&fs.read_to_string(&cache_path()).unwrap()).unwrap();
    assert_eq!(saved["version"], CACHE_VERSION);
    assert_eq!(saved["data"], serde_json::json!({}));
  }

  #[test]
  fn test_memory_only_cache_never_touches_the_file_system() {
    let fs = Arc::new(linaria_filesystem::MockFileSystem::new());
    let cache = CompileCache::new(fs, None);
    cache.insert("/src/a.js".into(), entry("", 1));
    assert_eq!(cache.len(), 1);
    cache.save().unwrap();
  }

  #[test]
  fn test_writes_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join(".linariaCompileCache.json");
    let fs = Arc::new(linaria_filesystem::os_file_system::OsFileSystem);

    let cache = CompileCache::new(fs.clone(), Some(path.clone()));
    cache
      .data()
      .insert("/src/a.js".into(), entry("exports.a = 1;", 2));
    cache.save().unwrap();

    let reloaded = CompileCache::new(fs, Some(path));
    assert_eq!(reloaded.len(), 1);
  }
}
