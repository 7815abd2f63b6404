//! Buffered `console` and the `util.format`/`util.inspect` formatting it
//! shares with the `util` module.

use crate::error::Throw;
use crate::function::Callable;
use crate::object::{ObjRef, ObjectKind, PropertyKey};
use crate::sandbox::{ConsoleEntry, ConsoleLevel, Sandbox};
use crate::value::{number_to_string, Value};

/// Nesting below which objects print as `[Object]`
const INSPECT_DEPTH: usize = 2;

pub(super) fn install(sandbox: &mut Sandbox) {
  let console = sandbox.define_namespace("console");
  for (name, level) in [
    ("log", ConsoleLevel::Log),
    ("info", ConsoleLevel::Info),
    ("warn", ConsoleLevel::Warn),
    ("error", ConsoleLevel::Error),
    ("debug", ConsoleLevel::Debug),
    ("trace", ConsoleLevel::Trace),
    ("dir", ConsoleLevel::Log),
  ] {
    sandbox.define_method(&console, name, 0, move |sandbox, _, args| {
      let message = format(sandbox, args)?;
      let origin = sandbox.current_origin();
      sandbox.console.push(ConsoleEntry {
        level,
        message,
        origin,
      });
      Ok(Value::Undefined)
    });
  }
}

impl Sandbox {
  /// `file:line` of the innermost running JS code
  pub(crate) fn current_origin(&self) -> Option<String> {
    let frame = self.frames.last()?;
    if frame.span.is_dummy() {
      return Some(frame.filename.to_string());
    }
    let loc = self.source_map.lookup_char_pos(frame.span.lo);
    Some(format!("{}:{}", frame.filename, loc.line))
  }
}

/// `util.format(...args)`
pub(crate) fn format(sandbox: &mut Sandbox, args: &[Value]) -> Result<String, Throw> {
  let mut out = String::new();
  let mut rest = args;
  if let Some(Value::String(template)) = args.first() {
    rest = &args[1..];
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
      if c != '%' {
        out.push(c);
        continue;
      }
      let Some(&directive) = chars.peek() else {
        out.push('%');
        break;
      };
      if directive == '%' {
        chars.next();
        out.push('%');
        continue;
      }
      if !"sdifjoOc".contains(directive) || rest.is_empty() {
        out.push('%');
        continue;
      }
      chars.next();
      let value = rest[0].clone();
      rest = &rest[1..];
      match directive {
        's' => match &value {
          Value::String(s) => out.push_str(s),
          Value::Object(..) => out.push_str(&inspect(sandbox, &value)?),
          other => out.push_str(&sandbox.to_string(other)?),
        },
        'd' | 'i' => {
          let n = sandbox.to_number(&value)?;
          let n = if directive == 'i' { n.trunc() } else { n };
          out.push_str(&number_to_string(n));
        }
        'f' => out.push_str(&number_to_string(sandbox.to_number(&value)?)),
        'j' => match sandbox.value_to_json(&value) {
          Ok(Some(json)) => out.push_str(&json.to_string()),
          Ok(None) => out.push_str("undefined"),
          Err(_) => out.push_str("[Circular]"),
        },
        'c' => {}
        _ => out.push_str(&inspect(sandbox, &value)?),
      }
    }
  }

  let mut needs_space = rest.len() < args.len();
  for value in rest {
    if needs_space {
      out.push(' ');
    }
    needs_space = true;
    match value {
      Value::String(s) => out.push_str(s),
      other => out.push_str(&inspect(sandbox, other)?),
    }
  }
  Ok(out)
}

/// `util.inspect(value)`
pub(crate) fn inspect(sandbox: &mut Sandbox, value: &Value) -> Result<String, Throw> {
  let mut seen = Vec::new();
  inspect_value(sandbox, value, 0, &mut seen)
}

fn quote(text: &str) -> String {
  format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'").replace('\n', "\\n"))
}

fn is_identifier(key: &str) -> bool {
  let mut chars = key.chars();
  chars
    .next()
    .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
    && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn inspect_value(
  sandbox: &mut Sandbox,
  value: &Value,
  depth: usize,
  seen: &mut Vec<usize>,
) -> Result<String, Throw> {
  let obj = match value {
    Value::String(s) if depth > 0 => return Ok(quote(s)),
    Value::String(s) => return Ok(s.to_string()),
    Value::Number(n) if *n == 0.0 && n.is_sign_negative() => return Ok("-0".into()),
    Value::Object(obj) => obj,
    other => return Ok(sandbox.to_string(other)?.to_string()),
  };

  if let Some(text) = inspect_special(obj) {
    return Ok(text);
  }
  if seen.contains(&obj.id()) {
    return Ok("[Circular]".into());
  }

  enum Shape {
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    Object,
  }
  let shape = match &obj.borrow().kind {
    ObjectKind::Array(items) => Shape::Array(items.clone()),
    ObjectKind::Map(entries) => Shape::Map(entries.values().cloned().collect()),
    ObjectKind::Set(entries) => Shape::Set(entries.values().cloned().collect()),
    _ => Shape::Object,
  };
  let too_deep = depth > INSPECT_DEPTH;

  seen.push(obj.id());
  let mut parts = Vec::new();
  let prefix = match shape {
    Shape::Array(items) => {
      if too_deep {
        seen.pop();
        return Ok("[Array]".into());
      }
      for item in &items {
        parts.push(inspect_value(sandbox, item, depth + 1, seen)?);
      }
      "".to_string()
    }
    Shape::Map(entries) => {
      let prefix = format!("Map({}) ", entries.len());
      if too_deep {
        seen.pop();
        return Ok("[Map]".into());
      }
      for (key, value) in &entries {
        let key = inspect_value(sandbox, key, depth + 1, seen)?;
        let value = inspect_value(sandbox, value, depth + 1, seen)?;
        parts.push(format!("{key} => {value}"));
      }
      prefix
    }
    Shape::Set(values) => {
      let prefix = format!("Set({}) ", values.len());
      if too_deep {
        seen.pop();
        return Ok("[Set]".into());
      }
      for value in &values {
        parts.push(inspect_value(sandbox, value, depth + 1, seen)?);
      }
      prefix
    }
    Shape::Object => {
      if too_deep {
        seen.pop();
        return Ok("[Object]".into());
      }
      match constructor_name(sandbox, obj) {
        Some(name) if name != "Object" => format!("{name} "),
        _ => String::new(),
      }
    }
  };

  let is_array = obj.is_array();
  for key in Sandbox::own_keys(obj, true) {
    if is_array && crate::value::array_index(&key).is_some() {
      continue;
    }
    let member = sandbox.get_property(value, &key)?;
    let member = inspect_value(sandbox, &member, depth + 1, seen)?;
    let key = if is_identifier(&key) {
      key.to_string()
    } else {
      quote(&key)
    };
    parts.push(format!("{key}: {member}"));
  }
  seen.pop();

  let (open, close) = if is_array { ("[", "]") } else { ("{", "}") };
  if parts.is_empty() {
    return Ok(format!("{prefix}{open}{close}"));
  }
  Ok(format!("{prefix}{open} {} {close}", parts.join(", ")))
}

/// Name of the constructor on the prototype of `obj`
fn constructor_name(sandbox: &Sandbox, obj: &ObjRef) -> Option<String> {
  let proto = obj.prototype()?;
  if proto.ptr_eq(&sandbox.realm.object_prototype) {
    return None;
  }
  let ctor = Sandbox::own_value(&proto, "constructor")?;
  let name = Sandbox::own_value(ctor.as_object()?, "name")?;
  name.as_str().filter(|name| !name.is_empty()).map(str::to_string)
}

/// Functions, errors, regexes and boxed primitives
fn inspect_special(obj: &ObjRef) -> Option<String> {
  let object = obj.borrow();
  match &object.kind {
    ObjectKind::Function(callable) => Some(match callable {
      Callable::Closure(closure) if closure.code.kind == crate::function::CodeKind::ClassConstructor => {
        format!("[class {}]", closure.code.name)
      }
      Callable::Closure(closure) if closure.code.name.is_empty() => "[Function (anonymous)]".into(),
      Callable::Closure(closure) => format!("[Function: {}]", closure.code.name),
      Callable::Native(native) => format!("[Function: {}]", native.name),
      Callable::Bound(..) => "[Function: bound]".into(),
    }),
    ObjectKind::Error => object
      .properties
      .get(&PropertyKey::from("stack"))
      .and_then(|property| property.value())
      .and_then(|stack| stack.as_str().map(str::to_string)),
    ObjectKind::RegExp(data) => Some(format!("/{}/{}", data.source, data.flags)),
    ObjectKind::Number(n) => Some(format!("[Number: {}]", number_to_string(*n))),
    ObjectKind::String(s) => Some(format!("[String: {}]", quote(s))),
    ObjectKind::Boolean(b) => Some(format!("[Boolean: {b}]")),
    _ => None,
  }
}
