use std::collections::HashMap;
use std::io;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::FileSystem;

#[cfg(not(target_os = "windows"))]
fn root_dir() -> PathBuf {
  PathBuf::from("/")
}

#[cfg(target_os = "windows")]
fn root_dir() -> PathBuf {
  PathBuf::from("C:/")
}

/// In memory implementation of a file-system entry
#[derive(Debug)]
enum InMemoryFileSystemEntry {
  File {
    contents: Vec<u8>,
    modified: SystemTime,
  },
  Directory,
}

/// In memory implementation of the `FileSystem` trait, for testing purposes.
///
/// Every write bumps a logical clock so that rewriting a file always changes
/// its modification time, which is what the module loader uses to detect
/// stale modules.
#[derive(Debug)]
pub struct InMemoryFileSystem {
  files: RwLock<HashMap<PathBuf, InMemoryFileSystemEntry>>,
  current_working_directory: RwLock<PathBuf>,
  clock: RwLock<u64>,
}

impl Default for InMemoryFileSystem {
  fn default() -> Self {
    Self {
      files: Default::default(),
      current_working_directory: RwLock::new(root_dir()),
      clock: RwLock::new(0),
    }
  }
}

impl InMemoryFileSystem {
  /// Change the current working directory. Used for resolving relative paths.
  pub fn set_current_working_directory(&self, cwd: &Path) {
    let cwd = self.canonicalize_impl(cwd);
    let mut state = self.current_working_directory.write();
    *state = cwd;
  }

  /// Overrides the modification time of a file
  pub fn set_modified(&self, path: &Path, modified: SystemTime) -> io::Result<()> {
    let path = self.canonicalize_impl(path);
    let mut files = self.files.write();
    match files.get_mut(&path) {
      Some(InMemoryFileSystemEntry::File { modified: time, .. }) => {
        *time = modified;
        Ok(())
      }
      _ => Err(io::Error::new(io::ErrorKind::NotFound, "File not found")),
    }
  }

  fn tick(&self) -> SystemTime {
    let mut clock = self.clock.write();
    *clock += 1;
    SystemTime::UNIX_EPOCH + Duration::from_millis(*clock)
  }

  fn canonicalize_impl(&self, path: &Path) -> PathBuf {
    let cwd = self.current_working_directory.read();
    let mut result = if path.is_absolute() {
      vec![]
    } else {
      cwd.components().collect()
    };

    for component in path.components() {
      match component {
        Component::Prefix(prefix) => {
          result = vec![Component::Prefix(prefix)];
        }
        Component::RootDir => {
          result.push(Component::RootDir);
        }
        Component::CurDir => {}
        Component::ParentDir => {
          result.pop();
        }
        Component::Normal(path) => {
          result.push(Component::Normal(path));
        }
      }
    }

    PathBuf::from_iter(result)
  }
}

impl FileSystem for InMemoryFileSystem {
  fn cwd(&self) -> io::Result<PathBuf> {
    Ok(self.current_working_directory.read().clone())
  }

  fn canonicalize_base(&self, path: &Path) -> io::Result<PathBuf> {
    Ok(self.canonicalize_impl(path))
  }

  fn create_directory(&self, path: &Path) -> io::Result<()> {
    let path = self.canonicalize_impl(path);
    let mut files = self.files.write();
    let mut dir = Some(path.as_path());
    while let Some(path) = dir {
      files.insert(path.to_path_buf(), InMemoryFileSystemEntry::Directory);
      dir = path.parent();
    }
    Ok(())
  }

  fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
    let path = self.canonicalize_impl(path);
    let modified = self.tick();
    let mut files = self.files.write();

    files.insert(
      path.clone(),
      InMemoryFileSystemEntry::File {
        contents: contents.to_vec(),
        modified,
      },
    );

    let mut dir = path.parent();
    while let Some(path) = dir {
      files.insert(path.to_path_buf(), InMemoryFileSystemEntry::Directory);
      dir = path.parent();
    }

    Ok(())
  }

  fn modified(&self, path: &Path) -> io::Result<SystemTime> {
    let path = self.canonicalize_impl(path);
    let files = self.files.read();
    match files.get(&path) {
      Some(InMemoryFileSystemEntry::File { modified, .. }) => Ok(*modified),
      Some(InMemoryFileSystemEntry::Directory) => Ok(SystemTime::UNIX_EPOCH),
      None => Err(io::Error::new(io::ErrorKind::NotFound, "File not found")),
    }
  }

  fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
    let path = self.canonicalize_impl(path);
    let files = self.files.read();
    match files.get(&path) {
      None => Err(io::Error::new(io::ErrorKind::NotFound, "File not found")),
      Some(InMemoryFileSystemEntry::File { contents, .. }) => Ok(contents.clone()),
      Some(InMemoryFileSystemEntry::Directory) => Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        "Path is a directory",
      )),
    }
  }

  fn read_to_string(&self, path: &Path) -> io::Result<String> {
    let bytes = self.read(path)?;
    String::from_utf8(bytes).map_err(|_| io::Error::other("Unable to read file as string"))
  }

  fn is_file(&self, path: &Path) -> bool {
    let path = self.canonicalize_impl(path);
    let files = self.files.read();
    matches!(files.get(&path), Some(InMemoryFileSystemEntry::File { .. }))
  }

  fn is_dir(&self, path: &Path) -> bool {
    let path = self.canonicalize_impl(path);
    let files = self.files.read();
    matches!(files.get(&path), Some(InMemoryFileSystemEntry::Directory))
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_canonicalize_noop() {
    let fs = InMemoryFileSystem::default();
    let path = root_dir().join("foo/bar");
    let result = fs.canonicalize_base(&path).unwrap();
    assert_eq!(result, path);
  }

  #[test]
  fn test_remove_relative_parent_dots() {
    let fs = InMemoryFileSystem::default();
    let result = fs
      .canonicalize_base(&root_dir().join("foo/./bar/../baz/"))
      .unwrap();
    assert_eq!(result, root_dir().join("foo/baz"));
  }

  #[test]
  fn test_with_cwd() {
    let fs = InMemoryFileSystem::default();
    fs.set_current_working_directory(Path::new("/other"));
    let result = fs.canonicalize_base(Path::new("./foo/./bar/../baz/")).unwrap();
    assert_eq!(result, root_dir().join("other/foo/baz"));
    assert!(result.is_absolute());
  }

  #[test]
  fn test_read_file() {
    let fs = InMemoryFileSystem::default();
    fs.write(Path::new("/foo/bar"), b"contents").unwrap();
    let result = fs.read_to_string(Path::new("/foo/bar")).unwrap();
    assert_eq!(result, "contents");
  }

  #[test]
  fn test_read_file_not_found() {
    let fs = InMemoryFileSystem::default();
    let result = fs.read_to_string(Path::new("/foo/bar"));
    assert!(result.is_err());
  }

  #[test]
  fn test_is_file_and_is_dir() {
    let fs = InMemoryFileSystem::default();
    fs.write(Path::new("/foo/bar"), b"").unwrap();

    assert!(fs.is_file(Path::new("/foo/bar")));
    assert!(!fs.is_file(Path::new("/foo")));
    assert!(fs.is_dir(Path::new("/foo")));
    assert!(!fs.is_dir(Path::new("/foo/bar")));

    fs.create_directory(Path::new("/baz/qux")).unwrap();
    assert!(fs.is_dir(Path::new("/baz")));
    assert!(fs.is_dir(Path::new("/baz/qux")));
  }

  #[test]
  fn test_rewriting_a_file_changes_its_mtime() {
    let fs = InMemoryFileSystem::default();
    fs.write(Path::new("/a.js"), b"1").unwrap();
    let first = fs.modified(Path::new("/a.js")).unwrap();
    fs.write(Path::new("/a.js"), b"2").unwrap();
    let second = fs.modified(Path::new("/a.js")).unwrap();
    assert!(second > first);
  }

  #[test]
  fn test_set_modified() {
    let fs = InMemoryFileSystem::default();
    fs.write(Path::new("/a.js"), b"1").unwrap();
    let time = SystemTime::UNIX_EPOCH + Duration::from_secs(42);
    fs.set_modified(Path::new("/a.js"), time).unwrap();
    assert_eq!(crate::mtime_millis(&fs, Path::new("/a.js")), 42_000);
    assert!(fs.set_modified(Path::new("/missing.js"), time).is_err());
  }
}
