use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use linaria_filesystem::{mtime_millis, FileSystemRef};
use linaria_sandbox::{
  ConsoleLevel, ErrorType, Sandbox, SandboxError, SandboxOptions, Throw, Value,
};
use regex::Regex;
use xxhash_rust::xxh3::xxh3_64;

use crate::builtins::{node_builtin, NodeBuiltin};
use crate::code_frame::{prepare_stack, CodeFrame, Location};
use crate::compile_cache::{CompileCache, CompileCacheEntry};
use crate::error::{ErrorKind, EvaluationError};
use crate::error_queue::ErrorQueue;
use crate::module::{Module, ModuleState};
use crate::options::EvaluatorOptions;
use crate::resolver::{NodeResolver, Resolve};
use crate::transform::{DefaultTransformer, TransformOutput, Transformer};

/// Parameters of the function wrapping every module body
const MODULE_PARAMS: [&str; 5] = ["exports", "require", "module", "__filename", "__dirname"];

/// Everything one evaluation run needs: the sandbox, the module registry, the
/// error queue, the compile cache and the resolve and transform hooks.
///
/// Contexts are independent of each other. Modules, globals and timers never
/// leak from one context into another, or across [`invalidate_all`]. A
/// context is single threaded; concurrent builds use one context each and
/// may share a [`CompileCache`].
///
/// [`invalidate_all`]: EvaluationContext::invalidate_all
pub struct EvaluationContext {
  sandbox: Sandbox,
  loader: Rc<RefCell<Loader>>,
}

/// State shared between the context and the `require` functions living in
/// the sandbox. Borrows never outlive a call into the sandbox, since module
/// code may `require` again.
struct Loader {
  options: EvaluatorOptions,
  sandbox_options: SandboxOptions,
  fs: FileSystemRef,
  resolve: Rc<Resolve>,
  transformer: Rc<dyn Transformer>,
  compile_cache: Arc<CompileCache>,
  ignore: Option<Regex>,
  opts_hash: String,
  modules: IndexMap<PathBuf, Module>,
  error_queue: ErrorQueue,
  /// `require.cache`, created with the first `require` of a sandbox
  require_cache: Option<Value>,
  /// Fatal error on its way up through module code as a JS exception
  pending: Option<EvaluationError>,
}

impl EvaluationContext {
  pub fn new(options: EvaluatorOptions, fs: FileSystemRef) -> anyhow::Result<Self> {
    let ignore = options.ignore.as_deref().map(Regex::new).transpose()?;
    let sandbox_options = SandboxOptions {
      node_env: options.node_env.clone(),
      debug: std::env::var("DEBUG").ok(),
      ..SandboxOptions::default()
    };
    let compile_cache = Arc::new(CompileCache::from_options(fs.clone(), &options));
    let node_resolver = NodeResolver::new(fs.clone(), options.extensions.clone());
    let transformer: Rc<dyn Transformer> = Rc::new(DefaultTransformer);
    let opts_hash = options.opts_hash(&transformer.cache_key());

    let loader = Loader {
      sandbox_options: sandbox_options.clone(),
      fs,
      resolve: Rc::new(move |specifier: &str, from: &Path| node_resolver.resolve(specifier, from)),
      transformer,
      compile_cache,
      ignore,
      opts_hash,
      options,
      modules: IndexMap::new(),
      error_queue: ErrorQueue::default(),
      require_cache: None,
      pending: None,
    };

    Ok(EvaluationContext {
      sandbox: Sandbox::new(sandbox_options),
      loader: Rc::new(RefCell::new(loader)),
    })
  }

  /// Use `compile_cache` instead of the one configured by the options, to
  /// share it between contexts
  pub fn with_compile_cache(self, compile_cache: Arc<CompileCache>) -> Self {
    self.loader.borrow_mut().compile_cache = compile_cache;
    self
  }

  /// Replace Node's resolution, for example to apply bundler aliases
  pub fn set_resolver(
    &mut self,
    resolve: impl Fn(&str, &Path) -> anyhow::Result<PathBuf> + 'static,
  ) {
    self.loader.borrow_mut().resolve = Rc::new(resolve);
  }

  pub fn set_transformer(&mut self, transformer: impl Transformer + 'static) {
    let mut loader = self.loader.borrow_mut();
    loader.opts_hash = loader.options.opts_hash(&transformer.cache_key());
    loader.transformer = Rc::new(transformer);
  }

  pub fn sandbox(&mut self) -> &mut Sandbox {
    &mut self.sandbox
  }

  pub fn options(&self) -> EvaluatorOptions {
    self.loader.borrow().options.clone()
  }

  pub fn compile_cache(&self) -> Arc<CompileCache> {
    self.loader.borrow().compile_cache.clone()
  }

  /// The registered module of `filename`
  pub fn module(&self, filename: &Path) -> Option<Ref<'_, Module>> {
    Ref::filter_map(self.loader.borrow(), |loader| loader.modules.get(filename)).ok()
  }

  /// `module.exports` of a registered module
  pub fn exports(&mut self, filename: &Path) -> Option<Value> {
    let object = self.module(filename)?.object().clone();
    self.sandbox.get(&object, "exports").ok()
  }

  /// `require(id)` as executed by the module `parent`
  pub fn require_from(&mut self, parent: &Path, id: &str) -> Result<Value, EvaluationError> {
    require(&self.loader, &mut self.sandbox, parent, id)
  }

  /// `require.resolve(id)` as executed by the module `parent`
  pub fn resolve_from(&self, parent: &Path, id: &str) -> Result<PathBuf, EvaluationError> {
    resolve(&self.loader, parent, id)
  }

  /// Every module that required `filename`, directly or through other
  /// modules. These have to run again when `filename` changes.
  pub fn find_all_dependents(&self, filename: &Path) -> Vec<PathBuf> {
    let loader = self.loader.borrow();
    let mut found = IndexSet::new();
    let mut queue = VecDeque::from([filename.to_path_buf()]);

    while let Some(current) = queue.pop_front() {
      let Some(module) = loader.modules.get(&current) else {
        continue;
      };
      for dependent in module.dependents() {
        if dependent != filename && found.insert(dependent.to_path_buf()) {
          queue.push_back(dependent.to_path_buf());
        }
      }
    }
    found.into_iter().collect()
  }

  /// Reset a single module so the next `require` reads and runs its file
  /// again. Returns `false` when the module was never loaded.
  pub fn load(&mut self, filename: &Path) -> bool {
    match reset_module(&self.loader, &mut self.sandbox, filename) {
      Ok(found) => found,
      Err(error) => {
        tracing::warn!("Failed to reset {}: {}", filename.display(), error.message);
        false
      }
    }
  }

  /// Start over with an empty registry, a fresh sandbox and an empty compile
  /// cache
  pub fn invalidate_all(&mut self) {
    let sandbox_options = {
      let mut loader = self.loader.borrow_mut();
      loader.modules.clear();
      loader.require_cache = None;
      loader.pending = None;
      loader.compile_cache.clear();
      loader.sandbox_options.clone()
    };
    self.sandbox = Sandbox::new(sandbox_options);
  }

  pub fn queued_errors(&self) -> usize {
    self.loader.borrow().error_queue.len()
  }

  /// Text of every queued error, see [`ErrorQueue::print`]
  pub fn print_error_queue(&self) -> String {
    self.loader.borrow_mut().error_queue.print()
  }

  /// Drop every queued error
  pub fn flush_error_queue(&self) {
    self.loader.borrow_mut().error_queue.flush();
  }

  /// Run `code` as the module `filename`, replacing whatever ran under that
  /// name before. Any error is returned instead of queued.
  pub(crate) fn evaluate_module(
    &mut self,
    filename: &Path,
    code: String,
    input_map: Option<String>,
  ) -> Result<Value, EvaluationError> {
    let loader = self.loader.clone();
    let sandbox = &mut self.sandbox;

    if !reset_module(&loader, sandbox, filename)? {
      register_module(&loader, sandbox, filename)?;
    }
    let mtime = {
      let loader = loader.borrow();
      mtime_millis(&*loader.fs, filename)
    };
    if let Some(module) = loader.borrow_mut().modules.get_mut(filename) {
      module.mtime = mtime;
    }

    execute(&loader, sandbox, filename, code, input_map, true)?;
    exports_of(&loader, sandbox, filename)
  }

  /// Files `filename` required directly
  pub(crate) fn dependencies_of(&self, filename: &Path) -> Vec<PathBuf> {
    self
      .module(filename)
      .map(|module| module.dependencies().map(Path::to_path_buf).collect())
      .unwrap_or_default()
  }

  /// Error for an exception thrown by code of the module `filename`
  pub(crate) fn runtime_error(&self, filename: &Path, throw: &Throw) -> EvaluationError {
    runtime_error(&self.loader, filename, throw)
  }

  /// Forward buffered `console.*` output of evaluated code to `tracing`
  pub(crate) fn forward_console(&mut self) {
    for entry in self.sandbox.take_console_output() {
      let origin = entry.origin.as_deref().unwrap_or("");
      match entry.level {
        ConsoleLevel::Error => tracing::error!(origin, "{}", entry.message),
        ConsoleLevel::Warn => tracing::warn!(origin, "{}", entry.message),
        ConsoleLevel::Log | ConsoleLevel::Info => tracing::info!(origin, "{}", entry.message),
        ConsoleLevel::Debug => tracing::debug!(origin, "{}", entry.message),
        ConsoleLevel::Trace => tracing::trace!(origin, "{}", entry.message),
      }
    }
  }
}

impl Loader {
  /// Transform `code` of `filename`, or take the output from the compile
  /// cache when neither the file, the code nor the options changed
  fn transform(&self, filename: &Path, code: &str) -> Result<TransformOutput, EvaluationError> {
    let name = filename.to_string_lossy();
    let ignored = self.ignore.as_ref().is_some_and(|ignore| ignore.is_match(&name));
    if ignored || code.contains("__esModule") {
      tracing::debug!("Skipping transform for {name}");
      return Ok(TransformOutput {
        code: code.to_string(),
        map: None,
      });
    }

    let mtime = mtime_millis(&*self.fs, filename);
    let source_hash = format!("{:016x}", xxh3_64(code.as_bytes()));
    if let Some(entry) = self.compile_cache.get(filename) {
      if entry.is_fresh(&self.opts_hash, mtime, &source_hash) {
        tracing::trace!("Compile cache hit for {name}");
        let map = entry.map_string();
        return Ok(TransformOutput {
          code: entry.code,
          map,
        });
      }
    }

    let output = self
      .transformer
      .transform(code, filename)
      .map_err(|error| EvaluationError::transform(filename, &error))?;
    self.compile_cache.insert(
      filename.to_path_buf(),
      CompileCacheEntry {
        code: output.code.clone(),
        map: output
          .map
          .as_deref()
          .and_then(|map| serde_json::from_str(map).ok()),
        opts_hash: self.opts_hash.clone(),
        mtime,
        source_hash: Some(source_hash),
      },
    );
    Ok(output)
  }

  fn is_code(&self, filename: &Path) -> bool {
    let Some(extension) = filename.extension() else {
      return false;
    };
    let extension = format!(".{}", extension.to_string_lossy());
    self.options.extensions.contains(&extension)
  }
}

#[tracing::instrument(level = "debug", skip_all, fields(id = %id, parent = %parent.display()))]
fn require(
  loader: &Rc<RefCell<Loader>>,
  sandbox: &mut Sandbox,
  parent: &Path,
  id: &str,
) -> Result<Value, EvaluationError> {
  match node_builtin(id) {
    Some(NodeBuiltin::Polyfilled) => {
      return sandbox
        .node_module(id)
        .map_err(|throw| runtime_error(loader, parent, &throw));
    }
    Some(NodeBuiltin::Empty) => return Ok(Value::Null),
    Some(NodeBuiltin::Unsupported) => return Err(unsupported_builtin(id, parent)),
    None => {}
  }

  let filename = resolve(loader, parent, id)?;
  if let Some(module) = loader.borrow_mut().modules.get_mut(parent) {
    module.dependencies.insert(filename.clone());
  }

  load_module(loader, sandbox, &filename, id)?;

  let is_asset = loader
    .borrow()
    .modules
    .get(&filename)
    .is_some_and(Module::is_asset);
  if !is_asset {
    if let Some(module) = loader.borrow_mut().modules.get_mut(&filename) {
      module.dependents.insert(parent.to_path_buf());
    }
  }

  exports_of(loader, sandbox, &filename)
}

fn unsupported_builtin(id: &str, parent: &Path) -> EvaluationError {
  EvaluationError::new(
    ErrorKind::Require,
    format!("Unable to import \"{id}\". Importing Node builtins is not supported in the sandbox."),
  )
  .with_filename(parent)
}

fn resolve(
  loader: &Rc<RefCell<Loader>>,
  parent: &Path,
  id: &str,
) -> Result<PathBuf, EvaluationError> {
  let resolve = loader.borrow().resolve.clone();
  let filename = resolve(id, parent).map_err(|error| {
    EvaluationError::new(ErrorKind::Resolve, format!("{error:#}")).with_filename(parent)
  })?;

  // Resolvers hand back bare names for Node core modules
  if filename == Path::new(id) && !filename.is_absolute() {
    return Err(unsupported_builtin(id, parent));
  }
  Ok(filename)
}

/// Make sure `filename` is registered and loaded. Modules that are still
/// running are returned as they are, which is what breaks require cycles.
fn load_module(
  loader: &Rc<RefCell<Loader>>,
  sandbox: &mut Sandbox,
  filename: &Path,
  id: &str,
) -> Result<(), EvaluationError> {
  let existing = loader
    .borrow()
    .modules
    .get(filename)
    .map(|module| (module.state, module.mtime, module.is_asset));

  match existing {
    None => register_module(loader, sandbox, filename)?,
    Some((ModuleState::Registered, ..)) => {}
    Some((ModuleState::Executed, mtime, false)) if mtime != 0 => {
      let current = mtime_millis(&*loader.borrow().fs, filename);
      if current == mtime {
        return Ok(());
      }
      tracing::debug!("{} changed since it was loaded", filename.display());
      reset_module(loader, sandbox, filename)?;
    }
    Some(_) => return Ok(()),
  }

  let (is_code, fs) = {
    let loader = loader.borrow();
    (loader.is_code(filename), loader.fs.clone())
  };

  if !is_code {
    // Assets export their request, the way bundlers hand out asset URLs
    let object = {
      let mut loader = loader.borrow_mut();
      let Some(module) = loader.modules.get_mut(filename) else {
        return Ok(());
      };
      module.is_asset = true;
      module.object.clone()
    };
    sandbox
      .set(&object, "exports", Value::from(id))
      .map_err(|throw| runtime_error(loader, filename, &throw))?;
    return finish(loader, sandbox, filename);
  }

  let code = fs.read_to_string(filename).map_err(|error| {
    EvaluationError::new(
      ErrorKind::Require,
      format!("Unable to read \"{}\": {error}", filename.display()),
    )
    .with_filename(filename)
  })?;
  if let Some(module) = loader.borrow_mut().modules.get_mut(filename) {
    module.mtime = mtime_millis(&*fs, filename);
  }

  if filename.extension().is_some_and(|extension| extension == "json") {
    let json: serde_json::Value = match serde_json::from_str(&code) {
      Ok(json) => json,
      Err(error) => {
        finish(loader, sandbox, filename)?;
        return Err(EvaluationError::transform(filename, &anyhow::Error::from(error)));
      }
    };
    let exports = sandbox.json_to_value(&json);
    let object = module_object(loader, filename);
    sandbox
      .set(&object, "exports", exports)
      .map_err(|throw| runtime_error(loader, filename, &throw))?;
    return finish(loader, sandbox, filename);
  }

  execute(loader, sandbox, filename, code, None, false)
}

/// Transform and run the body of a registered module, once.
///
/// Resolve, require and transform errors are returned. Other errors are
/// queued unless `always_throw` is set.
#[tracing::instrument(level = "debug", skip_all, fields(filename = %filename.display()))]
fn execute(
  loader: &Rc<RefCell<Loader>>,
  sandbox: &mut Sandbox,
  filename: &Path,
  code: String,
  input_map: Option<String>,
  always_throw: bool,
) -> Result<(), EvaluationError> {
  let state = loader.borrow().modules.get(filename).map(Module::state);
  if state != Some(ModuleState::Registered) {
    return Ok(());
  }

  let transformed = loader.borrow().transform(filename, &code);
  let transformed = match transformed {
    Ok(transformed) => transformed,
    Err(error) => {
      finish(loader, sandbox, filename)?;
      return Err(error);
    }
  };

  let object = {
    let mut loader = loader.borrow_mut();
    let Some(module) = loader.modules.get_mut(filename) else {
      return Ok(());
    };
    module.source = Some(code);
    module.input_map = input_map;
    module.transformed = Some(transformed.clone());
    module.state = ModuleState::Transformed;
    module.object.clone()
  };

  tracing::debug!("Executing {}", filename.display());
  let result = run_body(loader, sandbox, filename, &transformed.code, &object);
  // a fatal error the body caught must not stick to a later failure
  loader.borrow_mut().pending = None;
  finish(loader, sandbox, filename)?;

  match result {
    Ok(()) => Ok(()),
    Err(error) if always_throw || error.kind.is_fatal() => Err(error),
    Err(error) => {
      loader.borrow_mut().error_queue.push(error);
      Ok(())
    }
  }
}

fn run_body(
  loader: &Rc<RefCell<Loader>>,
  sandbox: &mut Sandbox,
  filename: &Path,
  code: &str,
  object: &Value,
) -> Result<(), EvaluationError> {
  let name = filename.to_string_lossy();
  let func = sandbox
    .compile_function(code, &name, &MODULE_PARAMS)
    .map_err(|error| match error {
      SandboxError::Thrown(throw) => classify(loader, filename, &throw),
      SandboxError::Syntax {
        message,
        line,
        column,
        ..
      } => syntax_error(filename, code, &message, line, column),
    })?;

  let to_error = |throw: Throw| classify(loader, filename, &throw);
  let exports = sandbox.get(object, "exports").map_err(to_error)?;
  let require = require_function(loader, sandbox, filename).map_err(to_error)?;
  let dirname = filename
    .parent()
    .map(|dir| dir.to_string_lossy().to_string())
    .unwrap_or_default();

  sandbox
    .call(
      &func,
      exports.clone(),
      &[
        exports,
        require,
        object.clone(),
        Value::from(&*name),
        Value::from(dirname),
      ],
    )
    .map_err(to_error)?;
  Ok(())
}

fn syntax_error(
  filename: &Path,
  code: &str,
  message: &str,
  line: usize,
  column: usize,
) -> EvaluationError {
  let message = format!("SyntaxError: {message}");
  let frame = CodeFrame {
    code: code.to_string(),
    file_path: Some(filename.to_path_buf()),
    location: Location {
      line,
      column: column + 1,
    },
    message: Some(message.clone()),
  }
  .render();

  let mut error = EvaluationError::new(ErrorKind::Runtime, message).with_filename(filename);
  if let Some(frame) = frame {
    error.stack = Some(format!("\nLinaria Preval Error:\n{frame}"));
    error.frame = Some(frame);
  }
  error
}

/// The error a module body failed with. Fatal errors raised by a nested
/// `require` come back as they were raised.
fn classify(loader: &Rc<RefCell<Loader>>, filename: &Path, throw: &Throw) -> EvaluationError {
  let kind = throw
    .own_string("code")
    .as_deref()
    .and_then(ErrorKind::from_code);
  let Some(kind) = kind else {
    return runtime_error(loader, filename, throw);
  };

  let message = throw.message();
  let pending = loader.borrow_mut().pending.take();
  match pending {
    Some(error) if error.message == message => error,
    _ => {
      let mut error = EvaluationError::new(kind, message).with_filename(filename);
      error.stack = throw.stack();
      error
    }
  }
}

/// Error for an exception thrown by code of `filename`, with the stack
/// rewritten to start at that code
fn runtime_error(loader: &Rc<RefCell<Loader>>, filename: &Path, throw: &Throw) -> EvaluationError {
  let message = throw.message();
  let stack = throw.stack();
  let mut error = EvaluationError::new(ErrorKind::Runtime, message.clone()).with_filename(filename);

  let loader = loader.borrow();
  let sources = loader.modules.get(filename).and_then(Module::frame_sources);
  let prepared = match (&stack, sources) {
    (Some(stack), Some(sources)) => prepare_stack(stack, &message, filename, &sources),
    _ => None,
  };
  match prepared {
    Some((frame, stack)) => {
      error.frame = Some(frame);
      error.stack = Some(stack);
    }
    None => error.stack = stack,
  }
  error
}

/// Turn an error of a nested `require` into a JS exception. Fatal errors are
/// parked so that the module running `require` reports them unchanged.
fn into_throw(loader: &Rc<RefCell<Loader>>, sandbox: &mut Sandbox, error: EvaluationError) -> Throw {
  let value = sandbox.new_error(ErrorType::Error, error.message.clone());
  if let Some(code) = error.kind.code() {
    sandbox.define_hidden(&value, "code", Value::from(code));
  }
  if let Some(stack) = &error.stack {
    sandbox.define_hidden(&value, "stack", Value::from(stack.as_str()));
  }
  if error.kind.is_fatal() {
    loader.borrow_mut().pending = Some(error);
  }
  Throw(value)
}

fn upgrade(loader: &Weak<RefCell<Loader>>, sandbox: &mut Sandbox) -> Result<Rc<RefCell<Loader>>, Throw> {
  loader
    .upgrade()
    .ok_or_else(|| sandbox.throw_error(ErrorType::Error, "The evaluation context is gone"))
}

fn specifier(sandbox: &mut Sandbox, args: &[Value]) -> Result<String, Throw> {
  match args.first() {
    Some(Value::String(id)) => Ok(id.to_string()),
    _ => Err(sandbox.throw_error(
      ErrorType::TypeError,
      "The \"id\" argument must be of type string",
    )),
  }
}

/// The `require` function handed to the body of `filename`, with `resolve`,
/// `ensure` and `cache`
fn require_function(
  loader: &Rc<RefCell<Loader>>,
  sandbox: &mut Sandbox,
  filename: &Path,
) -> Result<Value, Throw> {
  let require_fn = {
    let loader = Rc::downgrade(loader);
    let parent = filename.to_path_buf();
    sandbox.new_native_function("require", 1, move |sandbox, _, args| {
      let loader = upgrade(&loader, sandbox)?;
      let id = specifier(sandbox, args)?;
      require(&loader, sandbox, &parent, &id).map_err(|error| into_throw(&loader, sandbox, error))
    })
  };

  let resolve_fn = {
    let loader = Rc::downgrade(loader);
    let parent = filename.to_path_buf();
    sandbox.new_native_function("resolve", 1, move |sandbox, _, args| {
      let loader = upgrade(&loader, sandbox)?;
      let id = specifier(sandbox, args)?;
      if node_builtin(&id).is_some() {
        return Ok(Value::from(id));
      }
      resolve(&loader, &parent, &id)
        .map(|filename| Value::from(filename.to_string_lossy().as_ref()))
        .map_err(|error| into_throw(&loader, sandbox, error))
    })
  };
  let ensure = sandbox.new_native_function("ensure", 0, |_, _, _| Ok(Value::Undefined));
  let cache = require_cache(loader, sandbox)?;

  sandbox.set(&require_fn, "resolve", resolve_fn)?;
  sandbox.set(&require_fn, "ensure", ensure)?;
  sandbox.set(&require_fn, "cache", cache)?;
  Ok(require_fn)
}

fn require_cache(loader: &Rc<RefCell<Loader>>, sandbox: &mut Sandbox) -> Result<Value, Throw> {
  if let Some(cache) = &loader.borrow().require_cache {
    return Ok(cache.clone());
  }
  let cache = sandbox.new_object();
  let modules: Vec<(String, Value)> = loader
    .borrow()
    .modules
    .iter()
    .map(|(filename, module)| (filename.to_string_lossy().to_string(), module.object().clone()))
    .collect();
  for (filename, object) in modules {
    sandbox.set(&cache, &filename, object)?;
  }
  loader.borrow_mut().require_cache = Some(cache.clone());
  Ok(cache)
}

/// Add a fresh module for `filename` to the registry
fn register_module(
  loader: &Rc<RefCell<Loader>>,
  sandbox: &mut Sandbox,
  filename: &Path,
) -> Result<(), EvaluationError> {
  tracing::trace!("Registering {}", filename.display());
  let module =
    Module::new(sandbox, filename).map_err(|throw| runtime_error(loader, filename, &throw))?;
  let object = module.object().clone();
  loader
    .borrow_mut()
    .modules
    .insert(filename.to_path_buf(), module);
  publish(loader, sandbox, filename, object)
}

/// Move a registered module back to [`ModuleState::Registered`]
fn reset_module(
  loader: &Rc<RefCell<Loader>>,
  sandbox: &mut Sandbox,
  filename: &Path,
) -> Result<bool, EvaluationError> {
  let object = {
    let mut loader_mut = loader.borrow_mut();
    let Some(module) = loader_mut.modules.get_mut(filename) else {
      return Ok(false);
    };
    module.load(sandbox).map_err(|throw| {
      EvaluationError::new(ErrorKind::Runtime, throw.message()).with_filename(filename)
    })?;
    module.object().clone()
  };
  publish(loader, sandbox, filename, object)?;
  Ok(true)
}

/// Keep `require.cache` in line with the registry
fn publish(
  loader: &Rc<RefCell<Loader>>,
  sandbox: &mut Sandbox,
  filename: &Path,
  object: Value,
) -> Result<(), EvaluationError> {
  let cache = loader.borrow().require_cache.clone();
  match cache {
    Some(cache) => sandbox
      .set(&cache, &filename.to_string_lossy(), object)
      .map_err(|throw| runtime_error(loader, filename, &throw)),
    None => Ok(()),
  }
}

fn finish(
  loader: &Rc<RefCell<Loader>>,
  sandbox: &mut Sandbox,
  filename: &Path,
) -> Result<(), EvaluationError> {
  let mut loader_mut = loader.borrow_mut();
  let Some(module) = loader_mut.modules.get_mut(filename) else {
    return Ok(());
  };
  module.mark_executed(sandbox).map_err(|throw| {
    EvaluationError::new(ErrorKind::Runtime, throw.message()).with_filename(filename)
  })
}

fn module_object(loader: &Rc<RefCell<Loader>>, filename: &Path) -> Value {
  loader
    .borrow()
    .modules
    .get(filename)
    .map(|module| module.object().clone())
    .unwrap_or_default()
}

fn exports_of(
  loader: &Rc<RefCell<Loader>>,
  sandbox: &mut Sandbox,
  filename: &Path,
) -> Result<Value, EvaluationError> {
  let object = module_object(loader, filename);
  if object.is_undefined() {
    return Ok(Value::Undefined);
  }
  sandbox
    .get(&object, "exports")
    .map_err(|throw| runtime_error(loader, filename, &throw))
}
