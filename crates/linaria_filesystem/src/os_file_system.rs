use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::FileSystem;

#[derive(Default, Debug)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
  fn cwd(&self) -> std::io::Result<PathBuf> {
    std::env::current_dir()
  }

  fn canonicalize_base(&self, path: &Path) -> std::io::Result<PathBuf> {
    std::fs::canonicalize(path)
  }

  fn create_directory(&self, path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
  }

  fn write(&self, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
  }

  fn modified(&self, path: &Path) -> std::io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
  }

  fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
    std::fs::read(path)
  }

  fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(path)
  }

  fn is_file(&self, path: &Path) -> bool {
    path.is_file()
  }

  fn is_dir(&self, path: &Path) -> bool {
    path.is_dir()
  }
}

#[cfg(test)]
mod tests {
  use assert_fs::prelude::*;

  use super::*;

  #[test]
  fn test_reads_and_stats_files() {
    let dir = assert_fs::TempDir::new().unwrap();
    let file = dir.child("index.js");
    file.write_str("module.exports = 1;").unwrap();

    let fs = OsFileSystem;
    assert!(fs.is_file(file.path()));
    assert!(fs.is_dir(dir.path()));
    assert_eq!(
      fs.read_to_string(file.path()).unwrap(),
      "module.exports = 1;"
    );
    assert!(crate::mtime_millis(&fs, file.path()) > 0);
  }

  #[test]
  fn test_missing_file_has_zero_mtime() {
    let dir = assert_fs::TempDir::new().unwrap();
    let fs = OsFileSystem;
    assert_eq!(crate::mtime_millis(&fs, &dir.path().join("missing.js")), 0);
  }
}
