use std::collections::HashMap;
use std::rc::Rc;

use linaria_swc_runner::{parse_script, RunWithTransformationError};
use swc_core::common::sync::Lrc;
use swc_core::common::{SourceMap, Span};
use swc_core::ecma::atoms::Atom;

use crate::builtins;
use crate::builtins::timers::Timers;
use crate::env::{new_env, Env};
use crate::error::{ErrorType, SandboxError, Throw};
use crate::function::{
  Callable, ClassInfo, Closure, FunctionCode, NativeCtor, NativeFn, NativeFunction,
};
use crate::object::{Heap, ObjRef, Object, ObjectKind, Property};
use crate::value::Value;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 160;

#[derive(Debug, Clone)]
pub struct SandboxOptions {
  /// `process.env.NODE_ENV` inside the sandbox
  pub node_env: Option<String>,
  /// `process.env.DEBUG` inside the sandbox
  pub debug: Option<String>,
  pub max_call_depth: usize,
}

impl Default for SandboxOptions {
  fn default() -> Self {
    SandboxOptions {
      node_env: None,
      debug: None,
      max_call_depth: DEFAULT_MAX_CALL_DEPTH,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
  Log,
  Info,
  Warn,
  Error,
  Debug,
  Trace,
}

/// One buffered `console.*` call
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleEntry {
  pub level: ConsoleLevel,
  pub message: String,
  /// `file:line` of the calling code
  pub origin: Option<String>,
}

/// Intrinsic objects shared by every builtin of a realm
pub(crate) struct Realm {
  pub object_prototype: ObjRef,
  pub function_prototype: ObjRef,
  pub array_prototype: ObjRef,
  pub string_prototype: ObjRef,
  pub number_prototype: ObjRef,
  pub boolean_prototype: ObjRef,
  pub regexp_prototype: ObjRef,
  pub map_prototype: ObjRef,
  pub set_prototype: ObjRef,
  pub url_prototype: ObjRef,
  pub search_params_prototype: ObjRef,
  /// Indexed by [`ErrorType`]
  pub error_prototypes: Vec<ObjRef>,
}

/// Activation record of a JS function
pub(crate) struct Frame {
  pub name: Atom,
  pub filename: Rc<str>,
  /// Position of the code currently running in this frame
  pub span: Span,
  /// `None` inside derived constructors until `super()` returns
  pub this: Option<Value>,
  pub home_object: Option<ObjRef>,
  pub new_target: Option<Value>,
  pub func: Option<ObjRef>,
  pub class: Option<Rc<ClassInfo>>,
}

/// An isolated JavaScript realm.
///
/// Every sandbox has its own global object, intrinsics, timers and console
/// buffer. Values never cross between sandboxes. Dropping the sandbox empties
/// every object it created, so values must not be used after that.
pub struct Sandbox {
  pub(crate) options: SandboxOptions,
  pub(crate) source_map: Lrc<SourceMap>,
  pub(crate) realm: Realm,
  pub(crate) global: ObjRef,
  pub(crate) global_env: Env,
  pub(crate) env: Env,
  pub(crate) frames: Vec<Frame>,
  /// Function code by address of the AST node it was copied from
  pub(crate) code_cache: HashMap<(usize, u8, Atom), Rc<FunctionCode>>,
  /// Compiled scripts, kept alive so cached addresses stay unique
  pub(crate) scripts: Vec<Rc<FunctionCode>>,
  pub(crate) console: Vec<ConsoleEntry>,
  pub(crate) timers: Timers,
  pub(crate) node_modules: HashMap<String, Value>,
  /// Arrays being joined, so cycles print as empty strings
  pub(crate) join_stack: Vec<usize>,
  pub(crate) heap: Heap,
}

impl Sandbox {
  pub fn new(options: SandboxOptions) -> Self {
    let mut heap = Heap::default();
    let mut raw = |kind: ObjectKind, proto: Option<ObjRef>| {
      let obj = ObjRef::new(Object::new(kind, proto));
      heap.track(&obj);
      obj
    };

    let object_prototype = raw(ObjectKind::Ordinary, None);
    let noop = NativeFunction {
      name: Atom::default(),
      call: Box::new(|_: &mut Sandbox, _: &Value, _: &[Value]| Ok(Value::Undefined)),
      construct: None,
    };
    let function_prototype = raw(
      ObjectKind::Function(Callable::Native(Rc::new(noop))),
      Some(object_prototype.clone()),
    );
    let error_prototype = raw(ObjectKind::Ordinary, Some(object_prototype.clone()));
    let mut error_prototypes = vec![error_prototype.clone()];
    for _ in 1..ErrorType::ALL.len() {
      error_prototypes.push(raw(ObjectKind::Ordinary, Some(error_prototype.clone())));
    }

    let realm = Realm {
      array_prototype: raw(ObjectKind::Array(vec![]), Some(object_prototype.clone())),
      string_prototype: raw(ObjectKind::String("".into()), Some(object_prototype.clone())),
      number_prototype: raw(ObjectKind::Number(0.0), Some(object_prototype.clone())),
      boolean_prototype: raw(ObjectKind::Boolean(false), Some(object_prototype.clone())),
      regexp_prototype: raw(ObjectKind::Ordinary, Some(object_prototype.clone())),
      map_prototype: raw(ObjectKind::Ordinary, Some(object_prototype.clone())),
      set_prototype: raw(ObjectKind::Ordinary, Some(object_prototype.clone())),
      url_prototype: raw(ObjectKind::Ordinary, Some(object_prototype.clone())),
      search_params_prototype: raw(ObjectKind::Ordinary, Some(object_prototype.clone())),
      error_prototypes,
      object_prototype: object_prototype.clone(),
      function_prototype,
    };
    let global = raw(ObjectKind::Ordinary, Some(object_prototype));

    let global_env = new_env(None, true);
    let mut sandbox = Sandbox {
      options,
      source_map: Default::default(),
      realm,
      global,
      env: global_env.clone(),
      global_env,
      frames: Vec::new(),
      code_cache: HashMap::new(),
      scripts: Vec::new(),
      console: Vec::new(),
      timers: Timers::default(),
      node_modules: HashMap::new(),
      join_stack: Vec::new(),
      heap,
    };
    builtins::install(&mut sandbox);
    sandbox
  }

  pub(crate) fn alloc(&mut self, kind: ObjectKind, proto: Option<ObjRef>) -> ObjRef {
    let obj = ObjRef::new(Object::new(kind, proto));
    self.heap.track(&obj);
    obj
  }

  pub(crate) fn alloc_object(&mut self) -> ObjRef {
    let proto = self.realm.object_prototype.clone();
    self.alloc(ObjectKind::Ordinary, Some(proto))
  }

  pub(crate) fn alloc_array(&mut self, items: Vec<Value>) -> ObjRef {
    let proto = self.realm.array_prototype.clone();
    self.alloc(ObjectKind::Array(items), Some(proto))
  }

  /// Parse `code` as the body of a function taking `params`.
  ///
  /// The returned function runs in the global scope of this sandbox.
  #[tracing::instrument(level = "trace", skip(self, code, params))]
  pub fn compile_function(
    &mut self,
    code: &str,
    filename: &str,
    params: &[&str],
  ) -> Result<Value, SandboxError> {
    let script = parse_script(code, filename, &self.source_map).map_err(|error| match error {
      RunWithTransformationError::SwcParse {
        message,
        line,
        column,
      } => SandboxError::Syntax {
        filename: filename.to_string(),
        message,
        line,
        column,
      },
      other => SandboxError::Syntax {
        filename: filename.to_string(),
        message: other.to_string(),
        line: 0,
        column: 0,
      },
    })?;

    let code = Rc::new(FunctionCode::script(
      script.body,
      params,
      filename.into(),
      script.span,
    ));
    self.scripts.push(code.clone());

    let env = self.global_env.clone();
    let closure = Closure {
      code,
      env,
      lexical: None,
      home_object: None,
      class: None,
    };
    Ok(Value::Object(self.closure_object(closure, false)))
  }

  /// Call `func` with `this` and `args`
  pub fn call(&mut self, func: &Value, this: Value, args: &[Value]) -> Result<Value, Throw> {
    self.call_function(func, this, args)
  }

  /// `new func(...args)`
  pub fn construct(&mut self, func: &Value, args: &[Value]) -> Result<Value, Throw> {
    self.construct_value(func, args, None)
  }

  pub fn global(&self) -> Value {
    Value::Object(self.global.clone())
  }

  /// `target[key]`, running getters
  pub fn get(&mut self, target: &Value, key: &str) -> Result<Value, Throw> {
    self.get_property(target, &key.into())
  }

  /// `target[key] = value` with strict mode semantics
  pub fn set(&mut self, target: &Value, key: &str, value: Value) -> Result<(), Throw> {
    self.set_property(target, key.into(), value)
  }

  /// Non-enumerable data property, as used for builtin members
  pub fn define_hidden(&mut self, target: &Value, key: &str, value: Value) {
    if let Value::Object(obj) = target {
      obj
        .borrow_mut()
        .properties
        .insert(key.into(), Property::hidden(value));
    }
  }

  /// Whether `target` has an own property `key`
  pub fn has_own(&self, target: &Value, key: &str) -> bool {
    match target {
      Value::Object(obj) => Self::own_property(obj, &key.into()).is_some(),
      _ => false,
    }
  }

  pub fn new_object(&mut self) -> Value {
    Value::Object(self.alloc_object())
  }

  pub fn new_array(&mut self, items: Vec<Value>) -> Value {
    Value::Object(self.alloc_array(items))
  }

  /// Wrap a host closure as a JS function
  pub fn new_native_function(
    &mut self,
    name: &str,
    arity: usize,
    f: impl Fn(&mut Sandbox, &Value, &[Value]) -> Result<Value, Throw> + 'static,
  ) -> Value {
    Value::Object(self.native_object(name, arity, Box::new(f), None))
  }

  pub(crate) fn native_object(
    &mut self,
    name: &str,
    arity: usize,
    call: Box<NativeFn>,
    construct: Option<Box<NativeCtor>>,
  ) -> ObjRef {
    let native = NativeFunction {
      name: name.into(),
      call,
      construct,
    };
    let proto = self.realm.function_prototype.clone();
    let obj = self.alloc(
      ObjectKind::Function(Callable::Native(Rc::new(native))),
      Some(proto),
    );
    {
      let mut object = obj.borrow_mut();
      object.properties.insert(
        "length".into(),
        Property {
          configurable: true,
          ..Property::read_only((arity as f64).into())
        },
      );
      object.properties.insert(
        "name".into(),
        Property {
          enumerable: false,
          configurable: true,
          ..Property::read_only(name.into())
        },
      );
    }
    obj
  }

  /// Array elements of `value`, if it is an array
  pub fn array_values(&self, value: &Value) -> Option<Vec<Value>> {
    match &value.as_object()?.borrow().kind {
      ObjectKind::Array(items) => Some(items.clone()),
      _ => None,
    }
  }

  /// Own enumerable property names, in property order
  pub fn keys(&self, value: &Value) -> Vec<String> {
    match value {
      Value::Object(obj) => Self::own_keys(obj, true)
        .into_iter()
        .map(|key| key.to_string())
        .collect(),
      _ => vec![],
    }
  }

  /// `String(value)`
  pub fn to_display_string(&mut self, value: &Value) -> Result<String, Throw> {
    Ok(self.to_string(value)?.to_string())
  }

  /// Make `value` and its own properties read-only
  pub fn freeze(&mut self, value: &Value) {
    if let Value::Object(obj) = value {
      Self::set_integrity(obj, crate::object::Integrity::Frozen);
    }
  }

  /// Drain the buffered `console.*` output
  pub fn take_console_output(&mut self) -> Vec<ConsoleEntry> {
    std::mem::take(&mut self.console)
  }

  /// Number of objects currently tracked by this realm
  pub fn live_objects(&self) -> usize {
    self.heap.len()
  }
}

// Objects form reference cycles through prototypes and closures, so the heap
// is emptied by hand. Values still held outside, such as a `Throw`, are left
// as empty ordinary objects.
impl Drop for Sandbox {
  fn drop(&mut self) {
    self.frames.clear();
    self.global_env.borrow_mut().vars.clear();
    self.timers = Timers::default();
    self.node_modules.clear();
    self.heap.teardown();
  }
}
