//! `RegExp` on top of the `regex` crate.
//!
//! Patterns are rewritten into `regex` syntax. Features that crate cannot
//! express (lookaround and backreferences) throw a `SyntaxError`.

use std::fmt::Write;

use crate::builtins::arg;
use crate::error::Throw;
use crate::object::{ObjRef, ObjectKind, Property, RegExpData};
use crate::sandbox::Sandbox;
use crate::value::Value;

pub(super) fn install(sandbox: &mut Sandbox) {
  let prototype = sandbox.realm.regexp_prototype.clone();
  sandbox.define_constructor(
    "RegExp",
    2,
    &prototype,
    |sandbox, _, args| {
      if let (Value::Object(obj), Value::Undefined) = (arg(args, 0), arg(args, 1)) {
        if matches!(obj.borrow().kind, ObjectKind::RegExp(..)) {
          return Ok(Value::Object(obj.clone()));
        }
      }
      regexp_from_args(sandbox, args)
    },
    |sandbox, args, _| regexp_from_args(sandbox, args),
  );

  for (name, flag) in [
    ("global", 'g'),
    ("ignoreCase", 'i'),
    ("multiline", 'm'),
    ("dotAll", 's'),
    ("unicode", 'u'),
    ("sticky", 'y'),
    ("hasIndices", 'd'),
  ] {
    sandbox.define_getter(&prototype, name, move |_, this, _| {
      Ok(match regexp_parts(this) {
        Some((_, flags)) => Value::Bool(flags.contains(flag)),
        None => Value::Undefined,
      })
    });
  }
  sandbox.define_getter(&prototype, "source", |_, this, _| {
    Ok(match this.as_object() {
      Some(obj) => match &obj.borrow().kind {
        ObjectKind::RegExp(data) => Value::from(data.source.as_str()),
        _ => Value::from("(?:)"),
      },
      None => Value::Undefined,
    })
  });
  sandbox.define_getter(&prototype, "flags", |_, this, _| {
    Ok(match regexp_parts(this) {
      Some((_, flags)) => Value::from(flags),
      None => Value::Undefined,
    })
  });

  sandbox.define_method(&prototype, "exec", 1, |sandbox, this, args| {
    let obj = this_regexp(sandbox, this)?;
    let text = sandbox.to_string(&arg(args, 0))?;
    exec(sandbox, &obj, &text)
  });
  sandbox.define_method(&prototype, "test", 1, |sandbox, this, args| {
    let obj = this_regexp(sandbox, this)?;
    let text = sandbox.to_string(&arg(args, 0))?;
    Ok(Value::Bool(!matches!(exec(sandbox, &obj, &text)?, Value::Null)))
  });
  sandbox.define_method(&prototype, "toString", 0, |sandbox, this, _| {
    let obj = this_regexp(sandbox, this)?;
    let text = match &obj.borrow().kind {
      ObjectKind::RegExp(data) => format!("/{}/{}", data.source, data.flags),
      _ => String::new(),
    };
    Ok(Value::from(text))
  });
}

fn regexp_from_args(sandbox: &mut Sandbox, args: &[Value]) -> Result<Value, Throw> {
  let (source, inherited_flags) = match regexp_source(&arg(args, 0)) {
    Some(parts) => parts,
    None => match arg(args, 0) {
      Value::Undefined => ("(?:)".to_string(), String::new()),
      value => (sandbox.to_string(&value)?.to_string(), String::new()),
    },
  };
  let flags = match arg(args, 1) {
    Value::Undefined => inherited_flags,
    value => sandbox.to_string(&value)?.to_string(),
  };
  new_regexp(sandbox, &source, &flags)
}

fn regexp_source(value: &Value) -> Option<(String, String)> {
  match &value.as_object()?.borrow().kind {
    ObjectKind::RegExp(data) => Some((data.source.clone(), data.flags.clone())),
    _ => None,
  }
}

/// Compiled regex and flags of a `RegExp` object
pub(crate) fn regexp_parts(value: &Value) -> Option<(regex::Regex, String)> {
  match &value.as_object()?.borrow().kind {
    ObjectKind::RegExp(data) => Some((data.regex.clone(), data.flags.clone())),
    _ => None,
  }
}

fn this_regexp(sandbox: &mut Sandbox, this: &Value) -> Result<ObjRef, Throw> {
  match this.as_object() {
    Some(obj) if matches!(obj.borrow().kind, ObjectKind::RegExp(..)) => Ok(obj.clone()),
    _ => Err(sandbox.type_error("RegExp method called on incompatible receiver")),
  }
}

/// `new RegExp(source, flags)` and regex literals
pub(crate) fn new_regexp(sandbox: &mut Sandbox, source: &str, flags: &str) -> Result<Value, Throw> {
  let mut seen = String::new();
  for flag in flags.chars() {
    if !"dgimsuy".contains(flag) || seen.contains(flag) {
      return Err(sandbox.syntax_error(format!(
        "Invalid flags supplied to RegExp constructor '{flags}'"
      )));
    }
    seen.push(flag);
  }

  let regex = translate(source, flags)
    .and_then(|pattern| regex::Regex::new(&pattern).map_err(|error| error.to_string()))
    .map_err(|reason| {
      sandbox.syntax_error(format!("Invalid regular expression: /{source}/{flags}: {reason}"))
    })?;

  let data = RegExpData {
    source: if source.is_empty() {
      "(?:)".to_string()
    } else {
      source.to_string()
    },
    flags: sorted_flags(flags),
    regex,
  };
  let proto = sandbox.realm.regexp_prototype.clone();
  let obj = sandbox.alloc(ObjectKind::RegExp(Box::new(data)), Some(proto));
  obj.borrow_mut().properties.insert(
    "lastIndex".into(),
    Property {
      enumerable: false,
      ..Property::data(Value::Number(0.0))
    },
  );
  Ok(Value::Object(obj))
}

fn sorted_flags(flags: &str) -> String {
  "dgimsuy".chars().filter(|flag| flags.contains(*flag)).collect()
}

/// Rewrite a JS pattern into `regex` syntax
fn translate(source: &str, flags: &str) -> Result<String, String> {
  let mut out = String::with_capacity(source.len() + 8);
  let inline: String = flags.chars().filter(|flag| "ims".contains(*flag)).collect();
  if !inline.is_empty() {
    let _ = write!(out, "(?{inline})");
  }

  let chars: Vec<char> = source.chars().collect();
  let mut in_class = false;
  let mut i = 0;
  while i < chars.len() {
    let c = chars[i];
    match c {
      '\\' => {
        let Some(&next) = chars.get(i + 1) else {
          return Err("\\ at end of pattern".into());
        };
        i += 2;
        match next {
          'd' if !in_class => out.push_str("[0-9]"),
          'D' if !in_class => out.push_str("[^0-9]"),
          'w' if !in_class => out.push_str("[A-Za-z0-9_]"),
          'W' if !in_class => out.push_str("[^A-Za-z0-9_]"),
          'd' => out.push_str("0-9"),
          'w' => out.push_str("A-Za-z0-9_"),
          '1'..='9' => return Err("backreferences are not supported".into()),
          'k' if chars.get(i) == Some(&'<') => {
            return Err("named backreferences are not supported".into());
          }
          '0' => out.push_str("\\x00"),
          'c' => match chars.get(i) {
            Some(letter) if letter.is_ascii_alphabetic() => {
              let _ = write!(out, "\\x{{{:x}}}", (*letter as u32) % 32);
              i += 1;
            }
            _ => out.push_str("\\\\c"),
          },
          'u' => {
            let (code, used) = unicode_escape(&chars[i..]).ok_or("invalid unicode escape")?;
            let _ = write!(out, "\\x{{{code:x}}}");
            i += used;
          }
          'x' | 'b' | 'B' | 's' | 'S' | 'D' | 'W' | 'n' | 'r' | 't' | 'f' | 'v' | 'p' | 'P' => {
            out.push('\\');
            out.push(next);
          }
          other if other.is_ascii_punctuation() => push_literal(&mut out, other, in_class),
          other => out.push(other),
        }
        continue;
      }
      '[' if !in_class => {
        if chars.get(i + 1) == Some(&'^') && chars.get(i + 2) == Some(&']') {
          out.push_str("(?s:.)");
          i += 3;
          continue;
        }
        in_class = true;
        out.push('[');
        if chars.get(i + 1) == Some(&'^') {
          out.push('^');
          i += 1;
        }
      }
      ']' if in_class => {
        in_class = false;
        out.push(']');
      }
      '[' | '&' | '~' if in_class => {
        out.push('\\');
        out.push(c);
      }
      '(' if !in_class && chars.get(i + 1) == Some(&'?') => {
        let rest: String = chars[i + 2..].iter().take(3).collect();
        if rest.starts_with('=') || rest.starts_with('!') || rest.starts_with("<=") || rest.starts_with("<!") {
          return Err("lookaround is not supported".into());
        }
        if rest.starts_with('<') {
          out.push_str("(?P<");
          i += 3;
          continue;
        }
        out.push('(');
      }
      '{' if !in_class => match quantifier_len(&chars[i..]) {
        Some(len) => {
          out.extend(&chars[i..i + len]);
          i += len;
          continue;
        }
        None => out.push_str("\\{"),
      },
      '}' if !in_class => out.push_str("\\}"),
      _ => out.push(c),
    }
    i += 1;
  }
  Ok(out)
}

fn push_literal(out: &mut String, c: char, in_class: bool) {
  if in_class && "[]\\-^&~".contains(c) {
    out.push('\\');
    out.push(c);
  } else {
    out.push_str(&regex::escape(&c.to_string()));
  }
}

/// Parses `XXXX` or `{X...}` after `\u`, returning the code point and the
/// number of chars used
fn unicode_escape(chars: &[char]) -> Option<(u32, usize)> {
  if chars.first() == Some(&'{') {
    let end = chars.iter().position(|c| *c == '}')?;
    let digits: String = chars[1..end].iter().collect();
    return Some((u32::from_str_radix(&digits, 16).ok()?, end + 1));
  }
  let digits: String = chars.iter().take(4).collect();
  if digits.len() != 4 {
    return None;
  }
  Some((u32::from_str_radix(&digits, 16).ok()?, 4))
}

/// Length of a `{n}`, `{n,}` or `{n,m}` quantifier at the start of `chars`
fn quantifier_len(chars: &[char]) -> Option<usize> {
  let end = chars.iter().position(|c| *c == '}')?;
  let body: String = chars[1..end].iter().collect();
  let mut parts = body.splitn(2, ',');
  let min = parts.next().unwrap_or_default();
  let max = parts.next();
  let valid = !min.is_empty()
    && min.chars().all(|c| c.is_ascii_digit())
    && max.map_or(true, |max| max.chars().all(|c| c.is_ascii_digit()));
  valid.then_some(end + 1)
}

/// One match, with positions in chars
pub(crate) struct RegexMatch {
  pub start: usize,
  pub end: usize,
  pub text: String,
  /// Numbered groups, excluding the whole match
  pub groups: Vec<Option<String>>,
  pub named: Vec<(String, Option<String>)>,
}

fn char_to_byte(text: &str, index: usize) -> usize {
  text
    .char_indices()
    .nth(index)
    .map(|(byte, _)| byte)
    .unwrap_or(text.len())
}

fn byte_to_char(text: &str, byte: usize) -> usize {
  text[..byte].chars().count()
}

/// First match starting at or after char `start`
pub(crate) fn find_at(regex: &regex::Regex, text: &str, start: usize) -> Option<RegexMatch> {
  let captures = regex.captures_at(text, char_to_byte(text, start))?;
  let whole = captures.get(0)?;
  let groups = (1..captures.len())
    .map(|index| captures.get(index).map(|m| m.as_str().to_string()))
    .collect();
  let named = regex
    .capture_names()
    .flatten()
    .map(|name| (name.to_string(), captures.name(name).map(|m| m.as_str().to_string())))
    .collect();
  Some(RegexMatch {
    start: byte_to_char(text, whole.start()),
    end: byte_to_char(text, whole.end()),
    text: whole.as_str().to_string(),
    groups,
    named,
  })
}

/// Every match, advancing past empty matches
pub(crate) fn find_all(regex: &regex::Regex, text: &str) -> Vec<RegexMatch> {
  let length = text.chars().count();
  let mut matches = Vec::new();
  let mut start = 0;
  while start <= length {
    let Some(found) = find_at(regex, text, start) else {
      break;
    };
    start = if found.end == found.start {
      found.end + 1
    } else {
      found.end
    };
    matches.push(found);
  }
  matches
}

/// `RegExp.prototype.exec`, honouring `lastIndex` for global and sticky
/// expressions
pub(crate) fn exec(sandbox: &mut Sandbox, obj: &ObjRef, text: &str) -> Result<Value, Throw> {
  let (regex, flags) = match &obj.borrow().kind {
    ObjectKind::RegExp(data) => (data.regex.clone(), data.flags.clone()),
    _ => return Ok(Value::Null),
  };
  let uses_last_index = flags.contains('g') || flags.contains('y');
  let this = Value::Object(obj.clone());

  let start = if uses_last_index {
    let last_index = sandbox.get_property(&this, &"lastIndex".into())?;
    sandbox.to_integer(&last_index)?.max(0.0) as usize
  } else {
    0
  };

  let found = if start > text.chars().count() {
    None
  } else {
    find_at(&regex, text, start).filter(|found| !flags.contains('y') || found.start == start)
  };

  let Some(found) = found else {
    if uses_last_index {
      sandbox.set_property(&this, "lastIndex".into(), Value::Number(0.0))?;
    }
    return Ok(Value::Null);
  };
  if uses_last_index {
    sandbox.set_property(&this, "lastIndex".into(), Value::from(found.end))?;
  }
  Ok(match_array(sandbox, found, text))
}

/// Result array of `exec` with `index`, `input` and `groups`
pub(crate) fn match_array(sandbox: &mut Sandbox, found: RegexMatch, text: &str) -> Value {
  let mut items = vec![Value::from(found.text)];
  items.extend(
    found
      .groups
      .into_iter()
      .map(|group| group.map(Value::from).unwrap_or_default()),
  );
  let groups = if found.named.is_empty() {
    Value::Undefined
  } else {
    let groups = sandbox.alloc(ObjectKind::Ordinary, None);
    {
      let mut object = groups.borrow_mut();
      for (name, value) in found.named {
        object
          .properties
          .insert(name.as_str().into(), Property::data(value.map(Value::from).unwrap_or_default()));
      }
    }
    Value::Object(groups)
  };

  let array = sandbox.alloc_array(items);
  {
    let mut object = array.borrow_mut();
    object
      .properties
      .insert("index".into(), Property::data(Value::from(found.start)));
    object
      .properties
      .insert("input".into(), Property::data(Value::from(text)));
    object.properties.insert("groups".into(), Property::data(groups));
  }
  Value::Object(array)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_translate_rewrites_js_syntax() {
    assert_eq!(translate(r"\d+px", "").unwrap(), "[0-9]+px");
    assert_eq!(translate(r"(?<unit>px|em)", "i").unwrap(), "(?i)(?P<unit>px|em)");
    assert_eq!(translate(r"a\/b", "").unwrap(), "a/b");
    assert_eq!(translate(r"[^]", "").unwrap(), "(?s:.)");
    assert_eq!(translate(r"a{", "").unwrap(), "a\\{");
    assert_eq!(translate(r"a{2,3}", "").unwrap(), "a{2,3}");
  }

  #[test]
  fn test_translate_rejects_unsupported_features() {
    assert!(translate(r"(?=a)", "").is_err());
    assert!(translate(r"(?<!a)b", "").is_err());
    assert!(translate(r"(a)\1", "").is_err());
  }

  #[test]
  fn test_find_all_reports_char_positions() {
    let regex = regex::Regex::new("b").unwrap();
    let matches = find_all(&regex, "äbäb");
    let positions: Vec<_> = matches.iter().map(|m| (m.start, m.end)).collect();
    assert_eq!(positions, vec![(1, 2), (3, 4)]);
  }
}
