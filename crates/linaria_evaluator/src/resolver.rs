use std::path::{Component, Path, PathBuf};

use anyhow::anyhow;
use linaria_filesystem::FileSystemRef;
use serde::Deserialize;

/// Resolution hook: `(specifier, importing file) -> absolute filename`.
///
/// Build tools install their own through
/// [`crate::EvaluationContext::set_resolver`] to apply aliases.
pub type Resolve = dyn Fn(&str, &Path) -> anyhow::Result<PathBuf>;

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
  main: Option<String>,
}

/// Node's CommonJS resolution over a [`linaria_filesystem::FileSystem`]
#[derive(Clone, Debug)]
pub struct NodeResolver {
  fs: FileSystemRef,
  extensions: Vec<String>,
}

impl NodeResolver {
  pub fn new(fs: FileSystemRef, extensions: Vec<String>) -> Self {
    NodeResolver { fs, extensions }
  }

  pub fn resolve(&self, specifier: &str, from: &Path) -> anyhow::Result<PathBuf> {
    let directory = from.parent().unwrap_or(Path::new("/"));
    let resolved = if is_path_like(specifier) {
      let path = normalize(&directory.join(specifier));
      self
        .load_as_file(&path)
        .or_else(|| self.load_as_directory(&path))
    } else {
      self.load_node_module(specifier, directory)
    };

    resolved.ok_or_else(|| {
      anyhow!(
        "Cannot find module '{specifier}' from '{}'",
        directory.display()
      )
    })
  }

  fn load_as_file(&self, path: &Path) -> Option<PathBuf> {
    if self.fs.is_file(path) {
      return Some(path.to_path_buf());
    }
    self.extensions.iter().find_map(|extension| {
      let mut candidate = path.as_os_str().to_os_string();
      candidate.push(extension);
      let candidate = PathBuf::from(candidate);
      self.fs.is_file(&candidate).then_some(candidate)
    })
  }

  fn load_index(&self, path: &Path) -> Option<PathBuf> {
    self.load_as_file(&path.join("index"))
  }

  fn load_as_directory(&self, path: &Path) -> Option<PathBuf> {
    let package_json = path.join("package.json");
    if self.fs.is_file(&package_json) {
      let main = self
        .fs
        .read_to_string(&package_json)
        .ok()
        .and_then(|contents| serde_json::from_str::<PackageJson>(&contents).ok())
        .and_then(|package| package.main);
      if let Some(main) = main {
        let main = normalize(&path.join(main));
        if let Some(found) = self.load_as_file(&main).or_else(|| self.load_index(&main)) {
          return Some(found);
        }
      }
    }
    self.load_index(path)
  }

  fn load_node_module(&self, specifier: &str, directory: &Path) -> Option<PathBuf> {
    directory
      .ancestors()
      .filter(|dir| dir.file_name().is_none_or(|name| name != "node_modules"))
      .find_map(|dir| {
        let path = dir.join("node_modules").join(specifier);
        self
          .load_as_file(&path)
          .or_else(|| self.load_as_directory(&path))
      })
  }
}

fn is_path_like(specifier: &str) -> bool {
  specifier == "."
    || specifier == ".."
    || specifier.starts_with("./")
    || specifier.starts_with("../")
    || specifier.starts_with('/')
}

/// Lexically remove `.` and `..` components
pub(crate) fn normalize(path: &Path) -> PathBuf {
  let mut normalized = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        normalized.pop();
      }
      other => normalized.push(other.as_os_str()),
    }
  }
  normalized
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use linaria_filesystem::in_memory_file_system::InMemoryFileSystem;
  use linaria_filesystem::FileSystem;
  use pretty_assertions::assert_eq;

  use super::*;

  fn resolver(files: &[(&str, &str)]) -> NodeResolver {
    let fs = InMemoryFileSystem::default();
    for (path, contents) in files {
      fs.write(Path::new(path), contents.as_bytes()).unwrap();
    }
    NodeResolver::new(
      Arc::new(fs),
      vec![".tsx".into(), ".ts".into(), ".js".into(), ".json".into()],
    )
  }

  #[test]
  fn test_relative_files_and_extensions() {
    let resolver = resolver(&[
      ("/src/theme.ts", ""),
      ("/src/colors/index.js", ""),
      ("/src/logo.svg", ""),
    ]);
    let from = Path::new("/src/components/button.js");

    assert_eq!(
      resolver.resolve("../theme", from).unwrap(),
      PathBuf::from("/src/theme.ts")
    );
    assert_eq!(
      resolver.resolve("../colors", from).unwrap(),
      PathBuf::from("/src/colors/index.js")
    );
    assert_eq!(
      resolver.resolve("./../logo.svg", from).unwrap(),
      PathBuf::from("/src/logo.svg")
    );
  }

  #[test]
  fn test_node_modules_walk_and_main_field() {
    let resolver = resolver(&[
      ("/node_modules/polished/package.json", r#"{ "main": "lib/index" }"#),
      ("/node_modules/polished/lib/index.js", ""),
      ("/app/node_modules/tokens/index.json", ""),
      ("/app/node_modules/tokens/colors.js", ""),
    ]);
    let from = Path::new("/app/src/index.js");

    assert_eq!(
      resolver.resolve("polished", from).unwrap(),
      PathBuf::from("/node_modules/polished/lib/index.js")
    );
    assert_eq!(
      resolver.resolve("tokens", from).unwrap(),
      PathBuf::from("/app/node_modules/tokens/index.json")
    );
    assert_eq!(
      resolver.resolve("tokens/colors", from).unwrap(),
      PathBuf::from("/app/node_modules/tokens/colors.js")
    );
  }

  #[test]
  fn test_missing_module() {
    let resolver = resolver(&[]);
    let error = resolver
      .resolve("./missing", Path::new("/src/index.js"))
      .unwrap_err();
    assert_eq!(error.to_string(), "Cannot find module './missing' from '/src'");
  }

  #[test]
  fn test_normalize() {
    assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
    assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
  }
}
