use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

/// In-memory file-system for testing
pub mod in_memory_file_system;

/// File-system implementation using std::fs
pub mod os_file_system;

/// FileSystem abstraction instance
///
/// This should be `OsFileSystem` for non-testing environments and `InMemoryFileSystem` for testing.
pub type FileSystemRef = Arc<dyn FileSystem + Send + Sync>;

/// Trait abstracting the file-system operations the evaluator needs.
///
/// Module loading reads sources and compares modification times, the compile
/// cache reads and writes a single JSON blob.
#[mockall::automock]
pub trait FileSystem: std::fmt::Debug {
  fn cwd(&self) -> std::io::Result<PathBuf> {
    Err(std::io::Error::new(
      std::io::ErrorKind::Other,
      "Not implemented: FileSystem::cwd",
    ))
  }

  fn canonicalize_base(&self, _path: &Path) -> std::io::Result<PathBuf> {
    Err(std::io::Error::new(
      std::io::ErrorKind::Other,
      "Not implemented: FileSystem::canonicalize_base",
    ))
  }

  /// Create a directory at the specified path
  fn create_directory(&self, _path: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
      std::io::ErrorKind::Other,
      "Not implemented",
    ))
  }

  fn write(&self, _path: &Path, _contents: &[u8]) -> std::io::Result<()> {
    Err(std::io::Error::new(
      std::io::ErrorKind::Other,
      "Not implemented: FileSystem::write",
    ))
  }

  /// Last modification time of a file
  fn modified(&self, path: &Path) -> std::io::Result<SystemTime>;

  fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;
  fn read_to_string(&self, path: &Path) -> std::io::Result<String>;
  fn is_file(&self, path: &Path) -> bool;
  fn is_dir(&self, path: &Path) -> bool;
}

/// Modification time in milliseconds since the unix epoch, or `0` when the
/// file has none (missing files, clocks before 1970).
pub fn mtime_millis(fs: &dyn FileSystem, path: &Path) -> u64 {
  fs.modified(path)
    .ok()
    .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
    .map(|duration| duration.as_millis() as u64)
    .unwrap_or(0)
}
