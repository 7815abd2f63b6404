use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use linaria_sandbox::{Sandbox, Throw, Value};

use crate::code_frame::FrameSources;
use crate::transform::TransformOutput;

/// Lifecycle of a [`Module`].
///
/// A module is registered before its body runs, so a cyclic `require` sees
/// the exports populated so far instead of loading the file again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleState {
  /// In the registry with an empty `exports` object
  Registered,
  /// Transformed code is known, the body is running or about to
  Transformed,
  /// The body ran, successfully or not
  Executed,
}

/// One file loaded into the sandbox
#[derive(Debug)]
pub struct Module {
  filename: PathBuf,
  paths: Vec<PathBuf>,
  pub(crate) state: ModuleState,
  /// The JS `module` object handed to the module body
  pub(crate) object: Value,
  /// Files this module required, in order
  pub(crate) dependencies: IndexSet<PathBuf>,
  /// Files that required this module
  pub(crate) dependents: IndexSet<PathBuf>,
  pub(crate) mtime: u64,
  pub(crate) is_asset: bool,
  /// Code given to the transform
  pub(crate) source: Option<String>,
  /// Map from `source` back to the file as written
  pub(crate) input_map: Option<String>,
  pub(crate) transformed: Option<TransformOutput>,
}

impl Module {
  pub(crate) fn new(sandbox: &mut Sandbox, filename: &Path) -> Result<Module, Throw> {
    let paths = node_module_paths(filename.parent().unwrap_or(Path::new("/")));
    let object = module_object(sandbox, filename, &paths)?;
    Ok(Module {
      filename: filename.to_path_buf(),
      paths,
      state: ModuleState::Registered,
      object,
      dependencies: IndexSet::new(),
      dependents: IndexSet::new(),
      mtime: 0,
      is_asset: false,
      source: None,
      input_map: None,
      transformed: None,
    })
  }

  pub fn filename(&self) -> &Path {
    &self.filename
  }

  /// `node_modules` directories searched from this module, closest first
  pub fn paths(&self) -> &[PathBuf] {
    &self.paths
  }

  pub fn state(&self) -> ModuleState {
    self.state
  }

  pub fn dependencies(&self) -> impl Iterator<Item = &Path> {
    self.dependencies.iter().map(PathBuf::as_path)
  }

  pub fn dependents(&self) -> impl Iterator<Item = &Path> {
    self.dependents.iter().map(PathBuf::as_path)
  }

  pub fn is_asset(&self) -> bool {
    self.is_asset
  }

  /// The JS `module` object
  pub fn object(&self) -> &Value {
    &self.object
  }

  /// `module.exports`, which the module body may have replaced
  pub fn exports(&self, sandbox: &mut Sandbox) -> Result<Value, Throw> {
    sandbox.get(&self.object, "exports")
  }

  pub(crate) fn set_exports(&self, sandbox: &mut Sandbox, exports: Value) -> Result<(), Throw> {
    sandbox.set(&self.object, "exports", exports)
  }

  /// Return to [`ModuleState::Registered`] with fresh exports, so the next
  /// `require` reads and runs the file again. Dependents are kept since they
  /// still point at this file.
  pub fn load(&mut self, sandbox: &mut Sandbox) -> Result<(), Throw> {
    self.object = module_object(sandbox, &self.filename, &self.paths)?;
    self.state = ModuleState::Registered;
    self.dependencies.clear();
    self.mtime = 0;
    self.is_asset = false;
    self.source = None;
    self.input_map = None;
    self.transformed = None;
    Ok(())
  }

  pub(crate) fn mark_executed(&mut self, sandbox: &mut Sandbox) -> Result<(), Throw> {
    self.state = ModuleState::Executed;
    sandbox.set(&self.object, "loaded", Value::Bool(true))
  }

  /// What error reporting knows about the code of this module
  pub(crate) fn frame_sources(&self) -> Option<FrameSources<'_>> {
    let transformed = self.transformed.as_ref()?;
    Some(FrameSources {
      executed: &transformed.code,
      map: transformed.map.as_deref(),
      source: self.source.as_deref(),
      input_map: self.input_map.as_deref(),
    })
  }
}

/// `node_modules` lookup paths for files in `directory`
pub fn node_module_paths(directory: &Path) -> Vec<PathBuf> {
  directory
    .ancestors()
    .filter(|dir| dir.file_name().is_none_or(|name| name != "node_modules"))
    .map(|dir| dir.join("node_modules"))
    .collect()
}

fn module_object(sandbox: &mut Sandbox, filename: &Path, paths: &[PathBuf]) -> Result<Value, Throw> {
  let name = filename.to_string_lossy();
  let object = sandbox.new_object();
  let exports = sandbox.new_object();
  sandbox.set(&object, "exports", exports)?;
  sandbox.set(&object, "loaded", Value::Bool(false))?;
  sandbox.define_hidden(&object, "id", Value::from(&*name));
  sandbox.define_hidden(&object, "filename", Value::from(&*name));

  let paths = paths
    .iter()
    .map(|path| Value::from(path.to_string_lossy().as_ref()))
    .collect();
  let paths = sandbox.new_array(paths);
  sandbox.freeze(&paths);
  sandbox.define_hidden(&object, "paths", paths);
  Ok(object)
}

#[cfg(test)]
mod tests {
  use linaria_sandbox::SandboxOptions;
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn test_node_module_paths_skip_node_modules_directories() {
    assert_eq!(
      node_module_paths(Path::new("/app/node_modules/polished/lib")),
      vec![
        PathBuf::from("/app/node_modules/polished/lib/node_modules"),
        PathBuf::from("/app/node_modules/polished/node_modules"),
        PathBuf::from("/app/node_modules"),
        PathBuf::from("/node_modules"),
      ]
    );
  }

  #[test]
  fn test_load_replaces_the_exports_object() {
    let mut sandbox = Sandbox::new(SandboxOptions::default());
    let mut module = Module::new(&mut sandbox, Path::new("/src/a.js")).unwrap();
    let before = module.exports(&mut sandbox).unwrap();
    module.mark_executed(&mut sandbox).unwrap();
    module.dependencies.insert("/src/b.js".into());

    module.load(&mut sandbox).unwrap();
    let after = module.exports(&mut sandbox).unwrap();

    assert_eq!(module.state(), ModuleState::Registered);
    assert_eq!(module.dependencies().count(), 0);
    assert!(!before.strict_equals(&after));
  }

  #[test]
  fn test_module_object_shape() {
    let mut sandbox = Sandbox::new(SandboxOptions::default());
    let module = Module::new(&mut sandbox, Path::new("/src/a.js")).unwrap();
    let object = module.object().clone();

    let id = sandbox.get(&object, "id").unwrap();
    assert_eq!(id.as_str(), Some("/src/a.js"));
    assert_eq!(sandbox.keys(&object), vec!["exports", "loaded"]);

    let paths = sandbox.get(&object, "paths").unwrap();
    assert_eq!(sandbox.array_values(&paths).map(|paths| paths.len()), Some(2));
  }
}
