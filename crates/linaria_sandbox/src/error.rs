use std::fmt;

use crate::object::{ObjectKind, Property, PropertyKey, Slot};
use crate::sandbox::Sandbox;
use crate::value::Value;

/// A JavaScript exception unwinding through host code.
///
/// The thrown value lives on the heap of the [`Sandbox`] that threw it, and
/// dropping that sandbox empties every object on it. Read the message and
/// stack before the sandbox goes away.
#[derive(Clone)]
pub struct Throw(pub Value);

impl Throw {
  pub fn value(&self) -> &Value {
    &self.0
  }

  pub fn into_value(self) -> Value {
    self.0
  }

  /// Own data property of the thrown object, without running getters
  pub fn own_string(&self, key: &str) -> Option<String> {
    let obj = self.0.as_object()?;
    let object = obj.borrow();
    let property = object.properties.get(&PropertyKey::from(key))?;
    match &property.slot {
      Slot::Data {
        value: Value::String(s),
        ..
      } => Some(s.to_string()),
      _ => None,
    }
  }

  pub fn message(&self) -> String {
    match &self.0 {
      Value::Object(..) => self
        .own_string("message")
        .unwrap_or_else(|| "[object Object]".into()),
      value => primitive_text(value),
    }
  }

  pub fn stack(&self) -> Option<String> {
    self.own_string("stack")
  }
}

fn primitive_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.to_string(),
    Value::Number(n) => crate::value::number_to_string(*n),
    other => format!("{other:?}"),
  }
}

impl fmt::Display for Throw {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.stack() {
      Some(stack) => write!(f, "{stack}"),
      None => write!(f, "Uncaught {}", self.message()),
    }
  }
}

impl fmt::Debug for Throw {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Throw").field(&self.message()).finish()
  }
}

impl std::error::Error for Throw {}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
  #[error("{0}")]
  Thrown(#[from] Throw),
  #[error("SyntaxError: {message} ({filename}:{line}:{column})")]
  Syntax {
    filename: String,
    message: String,
    line: usize,
    column: usize,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
  Error,
  TypeError,
  ReferenceError,
  RangeError,
  SyntaxError,
  URIError,
  EvalError,
}

impl ErrorType {
  pub const ALL: [ErrorType; 7] = [
    ErrorType::Error,
    ErrorType::TypeError,
    ErrorType::ReferenceError,
    ErrorType::RangeError,
    ErrorType::SyntaxError,
    ErrorType::URIError,
    ErrorType::EvalError,
  ];

  pub fn name(self) -> &'static str {
    match self {
      ErrorType::Error => "Error",
      ErrorType::TypeError => "TypeError",
      ErrorType::ReferenceError => "ReferenceError",
      ErrorType::RangeError => "RangeError",
      ErrorType::SyntaxError => "SyntaxError",
      ErrorType::URIError => "URIError",
      ErrorType::EvalError => "EvalError",
    }
  }

  pub(crate) fn index(self) -> usize {
    self as usize
  }
}

impl Sandbox {
  /// New error object with a stack captured from the current call stack
  pub fn new_error(&mut self, kind: ErrorType, message: impl Into<String>) -> Value {
    let proto = self.realm.error_prototypes[kind.index()].clone();
    let message: String = message.into();
    let stack = self.stack_string(kind.name(), &message);
    let obj = self.alloc(ObjectKind::Error, Some(proto));
    {
      let mut object = obj.borrow_mut();
      object
        .properties
        .insert("stack".into(), Property::hidden(stack.into()));
      object
        .properties
        .insert("message".into(), Property::hidden(message.into()));
    }
    Value::Object(obj)
  }

  pub fn throw_error(&mut self, kind: ErrorType, message: impl Into<String>) -> Throw {
    Throw(self.new_error(kind, message))
  }

  pub(crate) fn type_error(&mut self, message: impl Into<String>) -> Throw {
    self.throw_error(ErrorType::TypeError, message)
  }

  pub(crate) fn reference_error(&mut self, message: impl Into<String>) -> Throw {
    self.throw_error(ErrorType::ReferenceError, message)
  }

  pub(crate) fn range_error(&mut self, message: impl Into<String>) -> Throw {
    self.throw_error(ErrorType::RangeError, message)
  }

  pub(crate) fn syntax_error(&mut self, message: impl Into<String>) -> Throw {
    self.throw_error(ErrorType::SyntaxError, message)
  }

  /// `"<name>: <message>"` followed by one `    at` line per active frame
  pub(crate) fn stack_string(&self, name: &str, message: &str) -> String {
    let mut stack = if message.is_empty() {
      name.to_string()
    } else {
      format!("{name}: {message}")
    };
    for frame in self.frames.iter().rev() {
      let location = if frame.span.is_dummy() {
        format!("{}", frame.filename)
      } else {
        let loc = self.source_map.lookup_char_pos(frame.span.lo);
        format!("{}:{}:{}", frame.filename, loc.line, loc.col.0 + 1)
      };
      if frame.name.is_empty() {
        stack.push_str(&format!("\n    at {location}"));
      } else {
        stack.push_str(&format!("\n    at {} ({location})", frame.name));
      }
    }
    stack
  }
}
