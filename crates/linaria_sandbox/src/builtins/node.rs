//! Polyfills handed out for Node core modules.

use crate::builtins::{arg, console};
use crate::error::{ErrorType, Throw};
use crate::object::ObjRef;
use crate::sandbox::Sandbox;
use crate::value::Value;

const EVENTS: &str = include_str!("events.js");

const TIMERS: [&str; 6] = [
  "setTimeout",
  "clearTimeout",
  "setInterval",
  "clearInterval",
  "setImmediate",
  "clearImmediate",
];

impl Sandbox {
  /// Module object returned by `require(name)` for a polyfillable Node
  /// module. Modules without a polyfill resolve to an empty object. Every
  /// call for the same name returns the same object.
  pub fn node_module(&mut self, name: &str) -> Result<Value, Throw> {
    let name = name.strip_prefix("node:").unwrap_or(name);
    if let Some(module) = self.node_modules.get(name) {
      return Ok(module.clone());
    }
    let module = match name {
      "path" => Value::Object(path_module(self)),
      "util" => Value::Object(util_module(self)),
      "events" => events_module(self)?,
      "url" => self.pick_globals(&["URL", "URLSearchParams"])?,
      "timers" => self.pick_globals(&TIMERS)?,
      "console" => {
        let global = self.global();
        self.get(&global, "console")?
      }
      _ => self.new_object(),
    };
    self.node_modules.insert(name.to_string(), module.clone());
    Ok(module)
  }

  fn pick_globals(&mut self, names: &[&str]) -> Result<Value, Throw> {
    let global = self.global();
    let module = self.new_object();
    for name in names {
      let value = self.get(&global, name)?;
      self.set(&module, name, value)?;
    }
    Ok(module)
  }
}

fn events_module(sandbox: &mut Sandbox) -> Result<Value, Throw> {
  let init = sandbox
    .compile_function(EVENTS, "linaria:events", &[])
    .map_err(|error| sandbox.throw_error(ErrorType::SyntaxError, error.to_string()))?;
  sandbox.call(&init, Value::Undefined, &[])
}

fn util_module(sandbox: &mut Sandbox) -> ObjRef {
  let util = sandbox.alloc_object();
  sandbox.define_method(&util, "format", 1, |sandbox, _, args| {
    Ok(Value::from(console::format(sandbox, args)?))
  });
  sandbox.define_method(&util, "inspect", 1, |sandbox, _, args| {
    Ok(Value::from(console::inspect(sandbox, &arg(args, 0))?))
  });
  sandbox.define_method(&util, "isArray", 1, |_, _, args| {
    Ok(Value::Bool(arg(args, 0).as_object().is_some_and(ObjRef::is_array)))
  });
  util
}

/// String arguments of a `path` call
fn path_args(sandbox: &mut Sandbox, args: &[Value], method: &str) -> Result<Vec<String>, Throw> {
  args
    .iter()
    .map(|value| match value {
      Value::String(s) => Ok(s.to_string()),
      other => {
        let shown = sandbox.describe_value(other);
        Err(sandbox.type_error(format!(
          "The \"path\" argument must be of type string. Received {shown} in path.{method}"
        )))
      }
    })
    .collect()
}

fn path_module(sandbox: &mut Sandbox) -> ObjRef {
  let path = sandbox.alloc_object();
  sandbox.define_own_data(&path, "sep", Value::from("/"));
  sandbox.define_own_data(&path, "delimiter", Value::from(":"));
  sandbox.define_own_data(&path, "posix", Value::Object(path.clone()));

  sandbox.define_method(&path, "join", 0, |sandbox, _, args| {
    let parts = path_args(sandbox, args, "join")?;
    Ok(Value::from(join(&parts)))
  });
  sandbox.define_method(&path, "resolve", 0, |sandbox, _, args| {
    let parts = path_args(sandbox, args, "resolve")?;
    Ok(Value::from(resolve(&parts)))
  });
  sandbox.define_method(&path, "relative", 2, |sandbox, _, args| {
    let parts = path_args(sandbox, args, "relative")?;
    let from = parts.first().map(String::as_str).unwrap_or_default();
    let to = parts.get(1).map(String::as_str).unwrap_or_default();
    Ok(Value::from(relative(from, to)))
  });

  let unary: [(&str, fn(&str) -> String); 3] = [
    ("normalize", normalize),
    ("dirname", dirname),
    ("extname", extname),
  ];
  for (name, f) in unary {
    sandbox.define_method(&path, name, 1, move |sandbox, _, args| {
      let parts = path_args(sandbox, &args[..args.len().min(1)], name)?;
      let input = parts.first().map(String::as_str).unwrap_or_default();
      Ok(Value::from(f(input)))
    });
  }
  sandbox.define_method(&path, "basename", 2, |sandbox, _, args| {
    let parts = path_args(sandbox, &args[..args.len().min(2)], "basename")?;
    let input = parts.first().map(String::as_str).unwrap_or_default();
    Ok(Value::from(basename(input, parts.get(1).map(String::as_str))))
  });
  sandbox.define_method(&path, "isAbsolute", 1, |sandbox, _, args| {
    let parts = path_args(sandbox, &args[..args.len().min(1)], "isAbsolute")?;
    Ok(Value::Bool(parts.first().is_some_and(|input| input.starts_with('/'))))
  });
  path
}

fn normalize(path: &str) -> String {
  if path.is_empty() {
    return ".".into();
  }
  let absolute = path.starts_with('/');
  let trailing = path.ends_with('/');

  let mut segments: Vec<&str> = Vec::new();
  for segment in path.split('/') {
    match segment {
      "" | "." => {}
      ".." => match segments.last() {
        Some(&last) if last != ".." => {
          segments.pop();
        }
        _ if absolute => {}
        _ => segments.push(".."),
      },
      segment => segments.push(segment),
    }
  }

  let mut out = segments.join("/");
  if out.is_empty() && !absolute {
    out.push('.');
  }
  if trailing && !out.is_empty() {
    out.push('/');
  }
  if absolute {
    out.insert(0, '/');
  }
  out
}

fn join(parts: &[String]) -> String {
  let joined = parts
    .iter()
    .filter(|part| !part.is_empty())
    .map(String::as_str)
    .collect::<Vec<_>>()
    .join("/");
  normalize(&joined)
}

fn resolve(parts: &[String]) -> String {
  let mut resolved = String::new();
  for part in parts.iter().rev().filter(|part| !part.is_empty()) {
    resolved = if resolved.is_empty() {
      part.clone()
    } else {
      format!("{part}/{resolved}")
    };
    if part.starts_with('/') {
      break;
    }
  }
  if !resolved.starts_with('/') {
    resolved.insert(0, '/');
  }
  let normalized = normalize(&resolved);
  match normalized.strip_suffix('/') {
    Some(stripped) if !stripped.is_empty() => stripped.to_string(),
    _ => normalized,
  }
}

fn relative(from: &str, to: &str) -> String {
  let from = resolve(&[from.to_string()]);
  let to = resolve(&[to.to_string()]);
  let from: Vec<&str> = from.split('/').filter(|s| !s.is_empty()).collect();
  let to: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();
  let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
  let mut out: Vec<&str> = vec![".."; from.len() - common];
  out.extend(&to[common..]);
  out.join("/")
}

fn trim_trailing(path: &str) -> &str {
  let trimmed = path.trim_end_matches('/');
  if trimmed.is_empty() && path.starts_with('/') {
    "/"
  } else {
    trimmed
  }
}

fn dirname(path: &str) -> String {
  let path = trim_trailing(path);
  match path.rfind('/') {
    None => ".".into(),
    Some(0) => "/".into(),
    Some(index) => trim_trailing(&path[..index]).to_string(),
  }
}

fn basename(path: &str, ext: Option<&str>) -> String {
  let path = trim_trailing(path);
  if path == "/" {
    return String::new();
  }
  let base = path.rsplit('/').next().unwrap_or(path);
  match ext {
    Some(ext) if base != ext => base.strip_suffix(ext).unwrap_or(base).to_string(),
    _ => base.to_string(),
  }
}

fn extname(path: &str) -> String {
  let base = basename(path, None);
  match base.rfind('.') {
    Some(index) if index > 0 && base != ".." => base[index..].to_string(),
    _ => String::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
  }

  #[test]
  fn test_normalize() {
    assert_eq!(normalize("/a/b/../c/./d"), "/a/c/d");
    assert_eq!(normalize("a/../../b/"), "../b/");
    assert_eq!(normalize("/../a"), "/a");
    assert_eq!(normalize(""), ".");
    assert_eq!(normalize("./"), "./");
  }

  #[test]
  fn test_join_and_resolve() {
    assert_eq!(join(&strings(&["/a", "b", "../c"])), "/a/c");
    assert_eq!(join(&strings(&["", ""])), ".");
    assert_eq!(resolve(&strings(&["/a/b", "c", "/d", "e/"])), "/d/e");
    assert_eq!(resolve(&strings(&["a"])), "/a");
    assert_eq!(resolve(&[]), "/");
  }

  #[test]
  fn test_file_name_parts() {
    assert_eq!(dirname("/a/b/c.js"), "/a/b");
    assert_eq!(dirname("/a"), "/");
    assert_eq!(dirname("a"), ".");
    assert_eq!(basename("/a/b/c.js", None), "c.js");
    assert_eq!(basename("/a/b/c.js", Some(".js")), "c");
    assert_eq!(basename("/a/b/", None), "b");
    assert_eq!(extname("/a/b.test.ts"), ".ts");
    assert_eq!(extname("/a/.eslintrc"), "");
    assert_eq!(extname("a."), ".");
  }

  #[test]
  fn test_relative() {
    assert_eq!(relative("/a/b/c", "/a/d"), "../../d");
    assert_eq!(relative("/a", "/a/b/c"), "b/c");
    assert_eq!(relative("/a", "/a"), "");
  }
}
