use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Name of the compile cache blob inside the cache directory
pub const COMPILE_CACHE_FILE: &str = ".linariaCompileCache.json";

/// Options of an [`crate::EvaluationContext`].
///
/// Deserializes from the same camelCase keys the JS tooling uses, with every
/// field optional.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluatorOptions {
  /// Directory of the compile cache, see [`EvaluatorOptions::cache_file`]
  pub cache_directory: Option<PathBuf>,
  pub disable_cache: bool,
  /// Regular expression over filenames whose code runs untransformed
  pub ignore: Option<String>,
  /// Extensions executed as code. Anything else is an asset.
  pub extensions: Vec<String>,
  pub display_name: bool,
  pub evaluate: bool,
  /// `process.env.NODE_ENV` inside the sandbox
  pub node_env: Option<String>,
}

impl Default for EvaluatorOptions {
  fn default() -> Self {
    EvaluatorOptions {
      cache_directory: None,
      disable_cache: false,
      ignore: None,
      extensions: [".tsx", ".ts", ".js", ".jsx", ".json"]
        .into_iter()
        .map(String::from)
        .collect(),
      display_name: false,
      evaluate: true,
      node_env: std::env::var("NODE_ENV").ok(),
    }
  }
}

fn env_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|value| !value.is_empty())
}

impl EvaluatorOptions {
  /// `true` when the options or `LINARIA_DISABLE_CACHE` turn the compile
  /// cache off
  pub fn cache_disabled(&self) -> bool {
    self.disable_cache || env_var("LINARIA_DISABLE_CACHE").is_some()
  }

  /// Location of the compile cache blob.
  ///
  /// The directory is the first of `cacheDirectory`, `LINARIA_CACHE_PATH`,
  /// the home directory and the temporary directory.
  pub fn cache_file(&self) -> PathBuf {
    let home = homedir::my_home().ok().flatten();
    self.cache_file_with(env_var("LINARIA_CACHE_PATH"), home)
  }

  fn cache_file_with(&self, cache_path: Option<String>, home: Option<PathBuf>) -> PathBuf {
    let directory = self
      .cache_directory
      .clone()
      .or_else(|| cache_path.map(PathBuf::from))
      .or(home)
      .unwrap_or_else(std::env::temp_dir);
    directory.join(COMPILE_CACHE_FILE)
  }

  /// Hex xxh3 digest of these options and the transformer's own key. Cached
  /// compilations with another hash are stale.
  pub fn opts_hash(&self, transformer_key: &str) -> String {
    let serialized = serde_json::to_string(self).unwrap_or_default();
    let digest = xxh3_64(format!("{serialized}\0{transformer_key}").as_bytes());
    format!("{digest:016x}")
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn test_deserializes_camel_case_with_defaults() {
    let options: EvaluatorOptions =
      serde_json::from_str(r#"{ "cacheDirectory": "/tmp/cache", "ignore": "node_modules" }"#)
        .unwrap();
    assert_eq!(options.cache_directory, Some(PathBuf::from("/tmp/cache")));
    assert_eq!(options.ignore.as_deref(), Some("node_modules"));
    assert_eq!(options.extensions, vec![".tsx", ".ts", ".js", ".jsx", ".json"]);
    assert!(options.evaluate);
  }

  #[test]
  fn test_cache_file_precedence() {
    let home = Some(PathBuf::from("/home/me"));
    let options = EvaluatorOptions {
      cache_directory: Some(PathBuf::from("/explicit")),
      ..Default::default()
    };
    assert_eq!(
      options.cache_file_with(Some("/env".into()), home.clone()),
      PathBuf::from("/explicit/.linariaCompileCache.json")
    );

    let options = EvaluatorOptions::default();
    assert_eq!(
      options.cache_file_with(Some("/env".into()), home.clone()),
      PathBuf::from("/env/.linariaCompileCache.json")
    );
    assert_eq!(
      options.cache_file_with(None, home),
      PathBuf::from("/home/me/.linariaCompileCache.json")
    );
    assert_eq!(
      options.cache_file_with(None, None),
      std::env::temp_dir().join(COMPILE_CACHE_FILE)
    );
  }

  #[test]
  fn test_opts_hash_depends_on_options_and_transformer() {
    let options = EvaluatorOptions::default();
    let other = EvaluatorOptions {
      display_name: true,
      ..Default::default()
    };
    assert_eq!(options.opts_hash("swc"), options.opts_hash("swc"));
    assert_ne!(options.opts_hash("swc"), other.opts_hash("swc"));
    assert_ne!(options.opts_hash("swc"), options.opts_hash("babel"));
    assert_eq!(options.opts_hash("swc").len(), 16);
  }
}
