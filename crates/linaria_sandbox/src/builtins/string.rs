use std::rc::Rc;

use crate::builtins::arg;
use crate::builtins::regexp::{find_all, find_at, match_array, regexp_parts, RegexMatch};
use crate::error::Throw;
use crate::object::{ObjRef, ObjectKind};
use crate::sandbox::Sandbox;
use crate::value::Value;

pub(super) fn install(sandbox: &mut Sandbox) {
  let prototype = sandbox.realm.string_prototype.clone();
  let ctor = sandbox.define_constructor(
    "String",
    1,
    &prototype,
    |sandbox, _, args| {
      if args.is_empty() {
        return Ok(Value::from(""));
      }
      Ok(Value::String(sandbox.to_string(&args[0])?))
    },
    |sandbox, args, new_target| {
      let text = match args.first() {
        Some(value) => sandbox.to_string(value)?,
        None => "".into(),
      };
      let proto = sandbox.prototype_from_constructor(new_target)?;
      Ok(Value::Object(sandbox.alloc(ObjectKind::String(text), Some(proto))))
    },
  );

  sandbox.define_method(&ctor, "fromCharCode", 1, |sandbox, _, args| {
    let mut units = Vec::with_capacity(args.len());
    for value in args {
      units.push(sandbox.to_uint32(value)? as u16);
    }
    Ok(Value::from(String::from_utf16_lossy(&units)))
  });
  sandbox.define_method(&ctor, "fromCodePoint", 1, |sandbox, _, args| {
    let mut text = String::new();
    for value in args {
      let code = sandbox.to_number(value)?;
      match char::from_u32(code as u32).filter(|_| code.fract() == 0.0 && code >= 0.0) {
        Some(c) => text.push(c),
        None => {
          let shown = sandbox.to_string(value)?;
          return Err(sandbox.range_error(format!("Invalid code point {shown}")));
        }
      }
    }
    Ok(Value::from(text))
  });
  sandbox.define_method(&ctor, "raw", 1, |sandbox, _, args| {
    let strings = sandbox.get_property(&arg(args, 0), &"raw".into())?;
    let strings = match sandbox.array_values(&strings) {
      Some(strings) => strings,
      None => return Ok(Value::from("")),
    };
    let mut text = String::new();
    for (index, part) in strings.iter().enumerate() {
      text.push_str(&sandbox.to_string(part)?);
      if index + 1 < strings.len() {
        if let Some(value) = args.get(index + 1) {
          text.push_str(&sandbox.to_string(value)?);
        }
      }
    }
    Ok(Value::from(text))
  });

  install_basic(sandbox, &prototype);
  install_search(sandbox, &prototype);
  install_regex(sandbox, &prototype);
}

/// `this` coerced to a string, throwing on `null` and `undefined`
fn this_string(sandbox: &mut Sandbox, this: &Value, method: &str) -> Result<Rc<str>, Throw> {
  if this.is_nullish() {
    return Err(sandbox.type_error(format!(
      "String.prototype.{method} called on null or undefined"
    )));
  }
  sandbox.to_string(this)
}

fn char_slice(chars: &[char], start: usize, end: usize) -> String {
  if start >= end {
    return String::new();
  }
  chars[start.min(chars.len())..end.min(chars.len())].iter().collect()
}

fn relative(sandbox: &mut Sandbox, value: &Value, len: usize, default: usize) -> Result<usize, Throw> {
  if value.is_undefined() {
    return Ok(default);
  }
  let n = sandbox.to_integer(value)?;
  let len = len as f64;
  Ok(if n < 0.0 { (len + n).max(0.0) } else { n.min(len) } as usize)
}

fn clamped(sandbox: &mut Sandbox, value: &Value, len: usize, default: usize) -> Result<usize, Throw> {
  if value.is_undefined() {
    return Ok(default);
  }
  Ok(sandbox.to_integer(value)?.clamp(0.0, len as f64) as usize)
}

fn install_basic(sandbox: &mut Sandbox, prototype: &ObjRef) {
  sandbox.define_method(prototype, "toString", 0, this_value);
  sandbox.define_method(prototype, "valueOf", 0, this_value);

  sandbox.define_method(prototype, "charAt", 1, |sandbox, this, args| {
    let text = this_string(sandbox, this, "charAt")?;
    let index = sandbox.to_integer(&arg(args, 0))?;
    let found = (index >= 0.0)
      .then(|| text.chars().nth(index as usize))
      .flatten();
    Ok(Value::from(found.map(String::from).unwrap_or_default()))
  });
  sandbox.define_method(prototype, "charCodeAt", 1, |sandbox, this, args| {
    let text = this_string(sandbox, this, "charCodeAt")?;
    let index = sandbox.to_integer(&arg(args, 0))?;
    let found = (index >= 0.0)
      .then(|| text.chars().nth(index as usize))
      .flatten();
    Ok(Value::Number(match found {
      Some(c) => {
        let mut units = [0; 2];
        c.encode_utf16(&mut units)[0] as f64
      }
      None => f64::NAN,
    }))
  });
  sandbox.define_method(prototype, "codePointAt", 1, |sandbox, this, args| {
    let text = this_string(sandbox, this, "codePointAt")?;
    let index = sandbox.to_integer(&arg(args, 0))?;
    let found = (index >= 0.0)
      .then(|| text.chars().nth(index as usize))
      .flatten();
    Ok(match found {
      Some(c) => Value::Number(c as u32 as f64),
      None => Value::Undefined,
    })
  });
  sandbox.define_method(prototype, "at", 1, |sandbox, this, args| {
    let text = this_string(sandbox, this, "at")?;
    let chars: Vec<char> = text.chars().collect();
    let index = sandbox.to_integer(&arg(args, 0))?;
    let index = if index < 0.0 {
      chars.len() as f64 + index
    } else {
      index
    };
    if index < 0.0 {
      return Ok(Value::Undefined);
    }
    Ok(match chars.get(index as usize) {
      Some(c) => Value::from(c.to_string()),
      None => Value::Undefined,
    })
  });
  sandbox.define_method(prototype, "slice", 2, |sandbox, this, args| {
    let text = this_string(sandbox, this, "slice")?;
    let chars: Vec<char> = text.chars().collect();
    let start = relative(sandbox, &arg(args, 0), chars.len(), 0)?;
    let end = relative(sandbox, &arg(args, 1), chars.len(), chars.len())?;
    Ok(Value::from(char_slice(&chars, start, end)))
  });
  sandbox.define_method(prototype, "substring", 2, |sandbox, this, args| {
    let text = this_string(sandbox, this, "substring")?;
    let chars: Vec<char> = text.chars().collect();
    let start = clamped(sandbox, &arg(args, 0), chars.len(), 0)?;
    let end = clamped(sandbox, &arg(args, 1), chars.len(), chars.len())?;
    Ok(Value::from(char_slice(&chars, start.min(end), start.max(end))))
  });
  sandbox.define_method(prototype, "substr", 2, |sandbox, this, args| {
    let text = this_string(sandbox, this, "substr")?;
    let chars: Vec<char> = text.chars().collect();
    let start = relative(sandbox, &arg(args, 0), chars.len(), 0)?;
    let length = clamped(sandbox, &arg(args, 1), chars.len(), chars.len())?;
    Ok(Value::from(char_slice(&chars, start, start + length)))
  });
  sandbox.define_method(prototype, "toUpperCase", 0, |sandbox, this, _| {
    Ok(Value::from(this_string(sandbox, this, "toUpperCase")?.to_uppercase()))
  });
  sandbox.define_method(prototype, "toLowerCase", 0, |sandbox, this, _| {
    Ok(Value::from(this_string(sandbox, this, "toLowerCase")?.to_lowercase()))
  });
  sandbox.define_method(prototype, "toLocaleUpperCase", 0, |sandbox, this, _| {
    Ok(Value::from(this_string(sandbox, this, "toLocaleUpperCase")?.to_uppercase()))
  });
  sandbox.define_method(prototype, "toLocaleLowerCase", 0, |sandbox, this, _| {
    Ok(Value::from(this_string(sandbox, this, "toLocaleLowerCase")?.to_lowercase()))
  });
  sandbox.define_method(prototype, "trim", 0, |sandbox, this, _| {
    Ok(Value::from(this_string(sandbox, this, "trim")?.trim()))
  });
  sandbox.define_method(prototype, "trimStart", 0, |sandbox, this, _| {
    Ok(Value::from(this_string(sandbox, this, "trimStart")?.trim_start()))
  });
  sandbox.define_method(prototype, "trimEnd", 0, |sandbox, this, _| {
    Ok(Value::from(this_string(sandbox, this, "trimEnd")?.trim_end()))
  });
  sandbox.define_method(prototype, "padStart", 2, |sandbox, this, args| {
    let text = this_string(sandbox, this, "padStart")?;
    let padding = padding(sandbox, &text, args)?;
    Ok(Value::from(format!("{padding}{text}")))
  });
  sandbox.define_method(prototype, "padEnd", 2, |sandbox, this, args| {
    let text = this_string(sandbox, this, "padEnd")?;
    let padding = padding(sandbox, &text, args)?;
    Ok(Value::from(format!("{text}{padding}")))
  });
  sandbox.define_method(prototype, "repeat", 1, |sandbox, this, args| {
    let text = this_string(sandbox, this, "repeat")?;
    let count = sandbox.to_integer(&arg(args, 0))?;
    if count < 0.0 || count.is_infinite() {
      let shown = sandbox.to_string(&arg(args, 0))?;
      return Err(sandbox.range_error(format!("Invalid count value: {shown}")));
    }
    Ok(Value::from(text.repeat(count as usize)))
  });
  sandbox.define_method(prototype, "concat", 1, |sandbox, this, args| {
    let mut text = this_string(sandbox, this, "concat")?.to_string();
    for value in args {
      text.push_str(&sandbox.to_string(value)?);
    }
    Ok(Value::from(text))
  });
  sandbox.define_method(prototype, "localeCompare", 1, |sandbox, this, args| {
    let text = this_string(sandbox, this, "localeCompare")?;
    let other = sandbox.to_string(&arg(args, 0))?;
    Ok(Value::Number(match text.cmp(&other) {
      std::cmp::Ordering::Less => -1.0,
      std::cmp::Ordering::Equal => 0.0,
      std::cmp::Ordering::Greater => 1.0,
    }))
  });
  sandbox.define_method(prototype, "normalize", 0, |sandbox, this, _| {
    Ok(Value::String(this_string(sandbox, this, "normalize")?))
  });
}

fn this_value(sandbox: &mut Sandbox, this: &Value, _: &[Value]) -> Result<Value, Throw> {
  match this {
    Value::String(..) => Ok(this.clone()),
    Value::Object(obj) => match &obj.borrow().kind {
      ObjectKind::String(text) => Ok(Value::String(text.clone())),
      _ => Err(sandbox.type_error("String.prototype.valueOf requires that 'this' be a String")),
    },
    _ => Err(sandbox.type_error("String.prototype.valueOf requires that 'this' be a String")),
  }
}

/// Filler for `padStart` and `padEnd`
fn padding(sandbox: &mut Sandbox, text: &str, args: &[Value]) -> Result<String, Throw> {
  let target = sandbox.to_integer(&arg(args, 0))?.max(0.0) as usize;
  let filler = match arg(args, 1) {
    Value::Undefined => " ".into(),
    value => sandbox.to_string(&value)?,
  };
  let length = text.chars().count();
  if target <= length || filler.is_empty() {
    return Ok(String::new());
  }
  Ok(filler.chars().cycle().take(target - length).collect())
}

/// Char index of `needle` in `text`, searching from char `from`
fn char_find(text: &str, needle: &str, from: usize) -> Option<usize> {
  let start = text.char_indices().nth(from).map(|(byte, _)| byte);
  let start = match start {
    Some(start) => start,
    None if from == text.chars().count() => text.len(),
    None => return None,
  };
  text[start..]
    .find(needle)
    .map(|byte| text[..start + byte].chars().count())
}

fn install_search(sandbox: &mut Sandbox, prototype: &ObjRef) {
  sandbox.define_method(prototype, "indexOf", 1, |sandbox, this, args| {
    let text = this_string(sandbox, this, "indexOf")?;
    let needle = sandbox.to_string(&arg(args, 0))?;
    let from = clamped(sandbox, &arg(args, 1), text.chars().count(), 0)?;
    Ok(Value::Number(
      char_find(&text, &needle, from).map_or(-1.0, |index| index as f64),
    ))
  });
  sandbox.define_method(prototype, "lastIndexOf", 1, |sandbox, this, args| {
    let text = this_string(sandbox, this, "lastIndexOf")?;
    let needle = sandbox.to_string(&arg(args, 0))?;
    Ok(Value::Number(match text.rfind(&*needle) {
      Some(byte) => text[..byte].chars().count() as f64,
      None => -1.0,
    }))
  });
  sandbox.define_method(prototype, "includes", 1, |sandbox, this, args| {
    let text = this_string(sandbox, this, "includes")?;
    let needle = search_string(sandbox, &arg(args, 0), "includes")?;
    let from = clamped(sandbox, &arg(args, 1), text.chars().count(), 0)?;
    Ok(Value::Bool(char_find(&text, &needle, from).is_some()))
  });
  sandbox.define_method(prototype, "startsWith", 1, |sandbox, this, args| {
    let text = this_string(sandbox, this, "startsWith")?;
    let needle = search_string(sandbox, &arg(args, 0), "startsWith")?;
    let chars: Vec<char> = text.chars().collect();
    let from = clamped(sandbox, &arg(args, 1), chars.len(), 0)?;
    Ok(Value::Bool(
      char_slice(&chars, from, chars.len()).starts_with(&*needle),
    ))
  });
  sandbox.define_method(prototype, "endsWith", 1, |sandbox, this, args| {
    let text = this_string(sandbox, this, "endsWith")?;
    let needle = search_string(sandbox, &arg(args, 0), "endsWith")?;
    let chars: Vec<char> = text.chars().collect();
    let end = clamped(sandbox, &arg(args, 1), chars.len(), chars.len())?;
    Ok(Value::Bool(char_slice(&chars, 0, end).ends_with(&*needle)))
  });
}

/// Argument of `includes`, `startsWith` and `endsWith`, which reject regexes
fn search_string(sandbox: &mut Sandbox, value: &Value, method: &str) -> Result<Rc<str>, Throw> {
  if regexp_parts(value).is_some() {
    return Err(sandbox.type_error(format!(
      "First argument to String.prototype.{method} must not be a regular expression"
    )));
  }
  sandbox.to_string(value)
}

fn install_regex(sandbox: &mut Sandbox, prototype: &ObjRef) {
  sandbox.define_method(prototype, "split", 2, |sandbox, this, args| {
    let text = this_string(sandbox, this, "split")?;
    let limit = match arg(args, 1) {
      Value::Undefined => usize::MAX,
      value => sandbox.to_uint32(&value)? as usize,
    };
    let separator = arg(args, 0);
    let mut parts: Vec<Value> = match regexp_parts(&separator) {
      Some((regex, _)) => split_regex(&regex, &text),
      None if separator.is_undefined() => vec![Value::String(text.clone())],
      None => {
        let separator = sandbox.to_string(&separator)?;
        if separator.is_empty() {
          text.chars().map(|c| Value::from(c.to_string())).collect()
        } else {
          text.split(&*separator).map(Value::from).collect()
        }
      }
    };
    parts.truncate(limit);
    Ok(sandbox.new_array(parts))
  });
  sandbox.define_method(prototype, "replace", 2, |sandbox, this, args| {
    let text = this_string(sandbox, this, "replace")?;
    replace(sandbox, &text, args, false)
  });
  sandbox.define_method(prototype, "replaceAll", 2, |sandbox, this, args| {
    let text = this_string(sandbox, this, "replaceAll")?;
    if let Some((_, flags)) = regexp_parts(&arg(args, 0)) {
      if !flags.contains('g') {
        return Err(sandbox.type_error("replaceAll must be called with a global RegExp"));
      }
    }
    replace(sandbox, &text, args, true)
  });
  sandbox.define_method(prototype, "match", 1, |sandbox, this, args| {
    let text = this_string(sandbox, this, "match")?;
    let matcher = to_regexp(sandbox, &arg(args, 0))?;
    let Some((regex, flags)) = regexp_parts(&matcher) else {
      return Ok(Value::Null);
    };
    if !flags.contains('g') {
      let Some(obj) = matcher.as_object() else {
        return Ok(Value::Null);
      };
      return super::regexp::exec(sandbox, obj, &text);
    }
    sandbox.set_property(&matcher, "lastIndex".into(), Value::Number(0.0))?;
    let found: Vec<Value> = find_all(&regex, &text)
      .into_iter()
      .map(|found| Value::from(found.text))
      .collect();
    if found.is_empty() {
      return Ok(Value::Null);
    }
    Ok(sandbox.new_array(found))
  });
  sandbox.define_method(prototype, "matchAll", 1, |sandbox, this, args| {
    let text = this_string(sandbox, this, "matchAll")?;
    let matcher = to_regexp(sandbox, &arg(args, 0))?;
    let Some((regex, flags)) = regexp_parts(&matcher) else {
      return Ok(sandbox.new_array(vec![]));
    };
    if !flags.contains('g') {
      return Err(sandbox.type_error(
        "String.prototype.matchAll called with a non-global RegExp argument",
      ));
    }
    let found = find_all(&regex, &text)
      .into_iter()
      .map(|found| match_array(sandbox, found, &text))
      .collect();
    Ok(sandbox.new_array(found))
  });
  sandbox.define_method(prototype, "search", 1, |sandbox, this, args| {
    let text = this_string(sandbox, this, "search")?;
    let matcher = to_regexp(sandbox, &arg(args, 0))?;
    let Some((regex, _)) = regexp_parts(&matcher) else {
      return Ok(Value::Number(-1.0));
    };
    Ok(Value::Number(
      find_at(&regex, &text, 0).map_or(-1.0, |found| found.start as f64),
    ))
  });
}

/// Regex arguments pass through, anything else becomes `new RegExp(value)`
fn to_regexp(sandbox: &mut Sandbox, value: &Value) -> Result<Value, Throw> {
  if regexp_parts(value).is_some() {
    return Ok(value.clone());
  }
  let source = match value {
    Value::Undefined => String::new(),
    value => sandbox.to_string(value)?.to_string(),
  };
  super::regexp::new_regexp(sandbox, &source, "")
}

fn split_regex(regex: &regex::Regex, text: &str) -> Vec<Value> {
  let chars: Vec<char> = text.chars().collect();
  if chars.is_empty() {
    return match find_at(regex, text, 0) {
      Some(_) => vec![],
      None => vec![Value::from("")],
    };
  }

  let mut parts = Vec::new();
  let mut last = 0;
  let mut position = 0;
  while position < chars.len() {
    let Some(found) = find_at(regex, text, position) else {
      break;
    };
    if found.end >= chars.len() && found.start == found.end {
      break;
    }
    if found.end == last {
      position = found.start + 1;
      continue;
    }
    parts.push(Value::from(char_slice(&chars, last, found.start)));
    parts.extend(
      found
        .groups
        .into_iter()
        .map(|group| group.map(Value::from).unwrap_or_default()),
    );
    last = found.end;
    position = if found.start == found.end {
      found.end + 1
    } else {
      found.end
    };
  }
  parts.push(Value::from(char_slice(&chars, last, chars.len())));
  parts
}

fn replace(sandbox: &mut Sandbox, text: &str, args: &[Value], all: bool) -> Result<Value, Throw> {
  let pattern = arg(args, 0);
  let replacement = arg(args, 1);

  let matches: Vec<RegexMatch> = match regexp_parts(&pattern) {
    Some((regex, flags)) => {
      if flags.contains('g') {
        sandbox.set_property(&pattern, "lastIndex".into(), Value::Number(0.0))?;
        find_all(&regex, text)
      } else {
        find_at(&regex, text, 0).into_iter().collect()
      }
    }
    None => {
      let needle = sandbox.to_string(&pattern)?;
      literal_matches(text, &needle, all)
    }
  };

  let replacement_text = if replacement.is_callable() {
    None
  } else {
    Some(sandbox.to_string(&replacement)?)
  };

  let chars: Vec<char> = text.chars().collect();
  let mut out = String::with_capacity(text.len());
  let mut last = 0;
  for found in matches {
    out.push_str(&char_slice(&chars, last, found.start));
    let start = found.start;
    let end = found.end;
    match &replacement_text {
      Some(template) => out.push_str(&expand_template(template, &found, &chars)),
      None => {
        let mut call_args = vec![Value::from(found.text.as_str())];
        call_args.extend(
          found
            .groups
            .iter()
            .map(|group| group.clone().map(Value::from).unwrap_or_default()),
        );
        call_args.push(Value::from(start));
        call_args.push(Value::from(text));
        let result = sandbox.call_function(&replacement, Value::Undefined, &call_args)?;
        out.push_str(&sandbox.to_string(&result)?);
      }
    }
    last = end;
  }
  out.push_str(&char_slice(&chars, last, chars.len()));
  Ok(Value::from(out))
}

fn literal_matches(text: &str, needle: &str, all: bool) -> Vec<RegexMatch> {
  let needle_len = needle.chars().count();
  let mut matches = Vec::new();
  let mut from = 0;
  let length = text.chars().count();
  while from <= length {
    let Some(start) = char_find(text, needle, from) else {
      break;
    };
    matches.push(RegexMatch {
      start,
      end: start + needle_len,
      text: needle.to_string(),
      groups: vec![],
      named: vec![],
    });
    if !all {
      break;
    }
    from = start + needle_len.max(1);
  }
  matches
}

/// Expand `$&`, `$1`, `$<name>`, `` $` ``, `$'` and `$$`
fn expand_template(template: &str, found: &RegexMatch, chars: &[char]) -> String {
  let mut out = String::new();
  let mut rest = template.chars().peekable();
  while let Some(c) = rest.next() {
    if c != '$' {
      out.push(c);
      continue;
    }
    match rest.peek().copied() {
      Some('$') => {
        rest.next();
        out.push('$');
      }
      Some('&') => {
        rest.next();
        out.push_str(&found.text);
      }
      Some('`') => {
        rest.next();
        out.push_str(&char_slice(chars, 0, found.start));
      }
      Some('\'') => {
        rest.next();
        out.push_str(&char_slice(chars, found.end, chars.len()));
      }
      Some(digit) if digit.is_ascii_digit() => {
        rest.next();
        let mut index = digit.to_digit(10).unwrap_or_default() as usize;
        if let Some(next) = rest.peek().and_then(|c| c.to_digit(10)) {
          let two = index * 10 + next as usize;
          if two >= 1 && two <= found.groups.len() {
            rest.next();
            index = two;
          }
        }
        match found.groups.get(index.wrapping_sub(1)) {
          Some(group) if index >= 1 => out.push_str(group.as_deref().unwrap_or("")),
          _ => {
            out.push('$');
            out.push(digit);
          }
        }
      }
      Some('<') if !found.named.is_empty() => {
        rest.next();
        let name: String = rest.by_ref().take_while(|c| *c != '>').collect();
        if let Some((_, Some(value))) = found.named.iter().find(|(n, _)| *n == name) {
          out.push_str(value);
        }
      }
      _ => out.push('$'),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_match() -> RegexMatch {
    RegexMatch {
      start: 2,
      end: 5,
      text: "cde".into(),
      groups: vec![Some("d".into()), None],
      named: vec![],
    }
  }

  #[test]
  fn test_expand_template_substitutions() {
    let chars: Vec<char> = "abcdefg".chars().collect();
    let found = sample_match();
    assert_eq!(expand_template("[$&]", &found, &chars), "[cde]");
    assert_eq!(expand_template("$1$2|$$", &found, &chars), "d|$");
    assert_eq!(expand_template("$`-$'", &found, &chars), "ab-fg");
    assert_eq!(expand_template("$9", &found, &chars), "$9");
  }

  #[test]
  fn test_char_find_counts_chars() {
    assert_eq!(char_find("äbcb", "b", 0), Some(1));
    assert_eq!(char_find("äbcb", "b", 2), Some(3));
    assert_eq!(char_find("abc", "", 3), Some(3));
    assert_eq!(char_find("abc", "x", 0), None);
  }

  #[test]
  fn test_split_regex_keeps_captures() {
    let regex = regex::Regex::new("(-)").unwrap();
    let parts: Vec<_> = split_regex(&regex, "a-b")
      .into_iter()
      .map(|value| value.as_str().map(str::to_string))
      .collect();
    assert_eq!(
      parts,
      vec![Some("a".into()), Some("-".into()), Some("b".into())]
    );
  }
}
