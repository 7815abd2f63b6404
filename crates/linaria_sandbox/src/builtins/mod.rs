//! Global objects installed into every sandbox.

use crate::error::Throw;
use crate::object::{ObjRef, Property, PropertyKey};
use crate::sandbox::Sandbox;
use crate::value::Value;

mod array;
mod collections;
pub(crate) mod console;
mod document;
mod error;
mod function;
mod global;
pub(crate) mod json;
mod node;
mod number;
mod object;
mod process;
pub(crate) mod regexp;
mod string;
pub(crate) mod timers;
mod url;

pub(crate) fn install(sandbox: &mut Sandbox) {
  object::install(sandbox);
  function::install(sandbox);
  error::install(sandbox);
  array::install(sandbox);
  string::install(sandbox);
  number::install(sandbox);
  regexp::install(sandbox);
  json::install(sandbox);
  collections::install(sandbox);
  global::install(sandbox);
  url::install(sandbox);
  timers::install(sandbox);
  console::install(sandbox);
  process::install(sandbox);
  document::install(sandbox);
}

/// Argument `index`, `undefined` when missing
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
  args.get(index).cloned().unwrap_or_default()
}

impl Sandbox {
  /// Native method stored as a non-enumerable property of `target`
  pub(crate) fn define_method(
    &mut self,
    target: &ObjRef,
    name: &str,
    arity: usize,
    f: impl Fn(&mut Sandbox, &Value, &[Value]) -> Result<Value, Throw> + 'static,
  ) {
    let func = self.native_object(name, arity, Box::new(f), None);
    target
      .borrow_mut()
      .properties
      .insert(name.into(), Property::hidden(Value::Object(func)));
  }

  /// Native getter stored as a non-enumerable accessor of `target`
  pub(crate) fn define_getter(
    &mut self,
    target: &ObjRef,
    name: &str,
    f: impl Fn(&mut Sandbox, &Value, &[Value]) -> Result<Value, Throw> + 'static,
  ) {
    let func = self.native_object(&format!("get {name}"), 0, Box::new(f), None);
    self.merge_accessor(target, name.into(), Some(Value::Object(func)), None, false);
  }

  pub(crate) fn define_value(&mut self, target: &ObjRef, name: &str, value: Value) {
    target
      .borrow_mut()
      .properties
      .insert(name.into(), Property::hidden(value));
  }

  /// Enumerable data property, as an object literal would create it
  pub(crate) fn define_own_data(&mut self, target: &ObjRef, name: &str, value: Value) {
    target
      .borrow_mut()
      .properties
      .insert(name.into(), Property::data(value));
  }

  /// Constant such as `Math.PI`
  pub(crate) fn define_constant(&mut self, target: &ObjRef, name: &str, value: Value) {
    target.borrow_mut().properties.insert(
      name.into(),
      Property {
        enumerable: false,
        ..Property::read_only(value)
      },
    );
  }

  /// Global constructor wired to `prototype`
  pub(crate) fn define_constructor(
    &mut self,
    name: &str,
    arity: usize,
    prototype: &ObjRef,
    call: impl Fn(&mut Sandbox, &Value, &[Value]) -> Result<Value, Throw> + 'static,
    construct: impl Fn(&mut Sandbox, &[Value], &ObjRef) -> Result<Value, Throw> + 'static,
  ) -> ObjRef {
    let ctor = self.native_object(name, arity, Box::new(call), Some(Box::new(construct)));
    self.define_constant(&ctor, "prototype", Value::Object(prototype.clone()));
    self.define_value(prototype, "constructor", Value::Object(ctor.clone()));
    let global = self.global.clone();
    self.define_value(&global, name, Value::Object(ctor.clone()));
    ctor
  }

  /// Plain object installed as a global, such as `Math` or `JSON`
  pub(crate) fn define_namespace(&mut self, name: &str) -> ObjRef {
    let namespace = self.alloc_object();
    let global = self.global.clone();
    self.define_value(&global, name, Value::Object(namespace.clone()));
    namespace
  }

  /// Own data property read without running getters
  pub(crate) fn own_value(obj: &ObjRef, key: &str) -> Option<Value> {
    Self::own_property(obj, &PropertyKey::from(key)).and_then(|property| property.value().cloned())
  }

  /// Optional callback argument, with the `TypeError` host functions throw
  pub(crate) fn callback_arg(&mut self, args: &[Value], index: usize) -> Result<Value, Throw> {
    let callback = arg(args, index);
    if !callback.is_callable() {
      let text = self.describe_value(&callback);
      return Err(self.type_error(format!("{text} is not a function")));
    }
    Ok(callback)
  }
}
