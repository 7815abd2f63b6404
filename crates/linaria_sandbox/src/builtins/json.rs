//! `JSON` and conversions between sandbox values and `serde_json` values.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::builtins::arg;
use crate::error::Throw;
use crate::object::{ObjRef, ObjectKind, PropertyKey};
use crate::sandbox::Sandbox;
use crate::value::Value;

pub(super) fn install(sandbox: &mut Sandbox) {
  let json = sandbox.define_namespace("JSON");

  sandbox.define_method(&json, "parse", 2, |sandbox, _, args| {
    let text = sandbox.to_string(&arg(args, 0))?;
    let parsed: serde_json::Value = serde_json::from_str(&text).map_err(|error| {
      sandbox.syntax_error(format!("Unexpected token in JSON: {error}"))
    })?;
    let value = sandbox.json_to_value(&parsed);
    let reviver = arg(args, 1);
    if !reviver.is_callable() {
      return Ok(value);
    }
    let holder = sandbox.new_object();
    sandbox.set(&holder, "", value)?;
    revive(sandbox, &holder, "".into(), &reviver)
  });

  sandbox.define_method(&json, "stringify", 3, |sandbox, _, args| {
    let replacer = arg(args, 1);
    let indent = match arg(args, 2) {
      Value::Number(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
      Value::String(s) => s.chars().take(10).collect(),
      _ => String::new(),
    };

    let mut state = Stringify {
      replacer: replacer.is_callable().then(|| replacer.clone()),
      allow: match sandbox.array_values(&replacer) {
        Some(keys) => {
          let mut allow = Vec::with_capacity(keys.len());
          for key in keys {
            allow.push(sandbox.to_property_key(&key)?);
          }
          Some(allow)
        }
        None => None,
      },
      stack: Vec::new(),
    };
    let holder = sandbox.new_object();
    sandbox.set(&holder, "", arg(args, 0))?;
    let Some(json) = state.serialize(sandbox, &holder, "".into(), arg(args, 0))? else {
      return Ok(Value::Undefined);
    };
    Ok(Value::from(to_json_text(&json, &indent)))
  });
}

fn revive(sandbox: &mut Sandbox, holder: &Value, key: PropertyKey, reviver: &Value) -> Result<Value, Throw> {
  let value = sandbox.get_property(holder, &key)?;
  if let Value::Object(obj) = &value {
    let keys = match &obj.borrow().kind {
      ObjectKind::Array(items) => (0..items.len()).map(|i| PropertyKey::from(i.to_string())).collect(),
      _ => Sandbox::own_keys(obj, true),
    };
    for child in keys {
      let revived = revive(sandbox, &value, child.clone(), reviver)?;
      if revived.is_undefined() {
        sandbox.delete_property(obj, &child)?;
      } else {
        sandbox.set_property(&value, child, revived)?;
      }
    }
  }
  sandbox.call_function(reviver, holder.clone(), &[Value::from(&*key), value])
}

/// Render `json` the way `JSON.stringify` does for the given indent
pub(crate) fn to_json_text(json: &serde_json::Value, indent: &str) -> String {
  if indent.is_empty() {
    return json.to_string();
  }
  let mut out = Vec::new();
  let mut serializer =
    serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
  if json.serialize(&mut serializer).is_err() {
    return json.to_string();
  }
  String::from_utf8(out).unwrap_or_default()
}

struct Stringify {
  replacer: Option<Value>,
  allow: Option<Vec<PropertyKey>>,
  /// Objects being serialized, for cycle detection
  stack: Vec<usize>,
}

impl Stringify {
  fn serialize(
    &mut self,
    sandbox: &mut Sandbox,
    holder: &Value,
    key: PropertyKey,
    value: Value,
  ) -> Result<Option<serde_json::Value>, Throw> {
    let mut value = value;
    if let Value::Object(..) = &value {
      let to_json = sandbox.get_property(&value, &"toJSON".into())?;
      if to_json.is_callable() {
        value = sandbox.call_function(&to_json, value, &[Value::from(&*key)])?;
      }
    }
    if let Some(replacer) = &self.replacer {
      value = sandbox.call_function(replacer, holder.clone(), &[Value::from(&*key), value])?;
    }

    Ok(Some(match &value {
      Value::Undefined => return Ok(None),
      Value::Null => serde_json::Value::Null,
      Value::Bool(b) => serde_json::Value::Bool(*b),
      Value::Number(n) => number_json(*n),
      Value::String(s) => serde_json::Value::String(s.to_string()),
      Value::Object(obj) if obj.is_callable() => return Ok(None),
      Value::Object(obj) => {
        let primitive = match &obj.borrow().kind {
          ObjectKind::Number(n) => Some(number_json(*n)),
          ObjectKind::String(s) => Some(serde_json::Value::String(s.to_string())),
          ObjectKind::Boolean(b) => Some(serde_json::Value::Bool(*b)),
          _ => None,
        };
        match primitive {
          Some(primitive) => primitive,
          None => self.serialize_object(sandbox, obj)?,
        }
      }
    }))
  }

  fn serialize_object(&mut self, sandbox: &mut Sandbox, obj: &ObjRef) -> Result<serde_json::Value, Throw> {
    if self.stack.contains(&obj.id()) {
      return Err(sandbox.type_error("Converting circular structure to JSON"));
    }
    self.stack.push(obj.id());
    let result = self.serialize_members(sandbox, obj);
    self.stack.pop();
    result
  }

  fn serialize_members(&mut self, sandbox: &mut Sandbox, obj: &ObjRef) -> Result<serde_json::Value, Throw> {
    let holder = Value::Object(obj.clone());
    if let Some(items) = sandbox.array_values(&holder) {
      let mut array = Vec::with_capacity(items.len());
      for (index, item) in items.into_iter().enumerate() {
        let json = self.serialize(sandbox, &holder, index.to_string().into(), item)?;
        array.push(json.unwrap_or(serde_json::Value::Null));
      }
      return Ok(serde_json::Value::Array(array));
    }

    let keys = match &self.allow {
      Some(allow) => allow.clone(),
      None => Sandbox::own_keys(obj, true),
    };
    let mut map = serde_json::Map::new();
    for key in keys {
      let member = sandbox.get_property(&holder, &key)?;
      if let Some(json) = self.serialize(sandbox, &holder, key.clone(), member)? {
        map.insert(key.to_string(), json);
      }
    }
    Ok(serde_json::Value::Object(map))
  }
}

/// Integral numbers serialize without a fraction, non-finite ones as `null`
fn number_json(n: f64) -> serde_json::Value {
  if !n.is_finite() {
    return serde_json::Value::Null;
  }
  if n.fract() == 0.0 && n.abs() < 9007199254740992.0 {
    return serde_json::Value::from(n as i64);
  }
  serde_json::Number::from_f64(n)
    .map(serde_json::Value::Number)
    .unwrap_or(serde_json::Value::Null)
}

impl Sandbox {
  /// Build a sandbox value from parsed JSON
  pub fn json_to_value(&mut self, json: &serde_json::Value) -> Value {
    match json {
      serde_json::Value::Null => Value::Null,
      serde_json::Value::Bool(b) => Value::Bool(*b),
      serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
      serde_json::Value::String(s) => Value::from(s.as_str()),
      serde_json::Value::Array(items) => {
        let items = items.iter().map(|item| self.json_to_value(item)).collect();
        self.new_array(items)
      }
      serde_json::Value::Object(map) => {
        let obj = self.alloc_object();
        for (key, value) in map {
          let value = self.json_to_value(value);
          obj
            .borrow_mut()
            .properties
            .insert(key.as_str().into(), crate::object::Property::data(value));
        }
        Value::Object(obj)
      }
    }
  }

  /// `JSON.stringify` semantics without indentation. `None` for values JSON
  /// cannot represent, such as `undefined` and functions.
  pub fn value_to_json(&mut self, value: &Value) -> Result<Option<serde_json::Value>, Throw> {
    let mut state = Stringify {
      replacer: None,
      allow: None,
      stack: Vec::new(),
    };
    state.serialize(self, &Value::Undefined, "".into(), value.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn test_number_json_drops_fraction_for_integers() {
    assert_eq!(number_json(3.0).to_string(), "3");
    assert_eq!(number_json(0.5).to_string(), "0.5");
    assert_eq!(number_json(f64::NAN), serde_json::Value::Null);
  }

  #[test]
  fn test_to_json_text_indents() {
    let json = serde_json::json!({ "a": [1, 2] });
    assert_eq!(to_json_text(&json, ""), r#"{"a":[1,2]}"#);
    assert_eq!(to_json_text(&json, "  "), "{\n  \"a\": [\n    1,\n    2\n  ]\n}");
  }
}
