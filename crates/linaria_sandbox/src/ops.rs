//! Abstract operations: property access, conversions and operators.

use std::rc::Rc;

use crate::error::Throw;
use crate::function::Callable;
use crate::object::{Integrity, ObjRef, ObjectKind, Property, PropertyKey, Slot};
use crate::sandbox::Sandbox;
use crate::value::{array_index, number_to_string, string_to_number, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hint {
  Number,
  String,
}

fn describe_target(obj: &ObjRef) -> &'static str {
  match obj.borrow().kind {
    ObjectKind::Array(..) => "[object Array]",
    ObjectKind::Function(..) => "[object Function]",
    _ => "#<Object>",
  }
}

impl Sandbox {
  /// Own property of `obj`, including the virtual indexed elements of arrays
  /// and string wrappers
  pub(crate) fn own_property(obj: &ObjRef, key: &PropertyKey) -> Option<Property> {
    let object = obj.borrow();
    let frozen = object.integrity == Integrity::Frozen;
    let configurable = object.integrity == Integrity::None;
    match &object.kind {
      ObjectKind::Array(items) => {
        if &**key == "length" {
          return Some(Property {
            slot: Slot::Data {
              value: Value::Number(items.len() as f64),
              writable: !frozen,
            },
            enumerable: false,
            configurable: false,
          });
        }
        if let Some(index) = array_index(key) {
          return items.get(index).map(|value| Property {
            slot: Slot::Data {
              value: value.clone(),
              writable: !frozen,
            },
            enumerable: true,
            configurable,
          });
        }
      }
      ObjectKind::String(s) => {
        if &**key == "length" {
          return Some(Property {
            enumerable: false,
            ..Property::read_only(Value::Number(s.chars().count() as f64))
          });
        }
        if let Some(index) = array_index(key) {
          return s
            .chars()
            .nth(index)
            .map(|c| Property::read_only(c.to_string().into()));
        }
      }
      _ => {}
    }
    object.properties.get(key).cloned()
  }

  pub(crate) fn has_property(&self, obj: &ObjRef, key: &PropertyKey) -> bool {
    let mut current = Some(obj.clone());
    while let Some(obj) = current {
      if Self::own_property(&obj, key).is_some() {
        return true;
      }
      current = obj.prototype();
    }
    false
  }

  /// Own keys in property order: indices ascending, then insertion order
  pub(crate) fn own_keys(obj: &ObjRef, only_enumerable: bool) -> Vec<PropertyKey> {
    let object = obj.borrow();
    let mut keys: Vec<PropertyKey> = Vec::new();
    match &object.kind {
      ObjectKind::Array(items) => {
        keys.extend((0..items.len()).map(|index| PropertyKey::from(index.to_string())));
        if !only_enumerable {
          keys.push("length".into());
        }
      }
      ObjectKind::String(s) => {
        keys.extend((0..s.chars().count()).map(|index| PropertyKey::from(index.to_string())));
        if !only_enumerable {
          keys.push("length".into());
        }
      }
      _ => {}
    }

    let mut indexed: Vec<(usize, PropertyKey)> = Vec::new();
    let mut named: Vec<PropertyKey> = Vec::new();
    for (key, property) in &object.properties {
      if only_enumerable && !property.enumerable {
        continue;
      }
      match array_index(key) {
        Some(index) => indexed.push((index, key.clone())),
        None => named.push(key.clone()),
      }
    }
    indexed.sort_by_key(|(index, _)| *index);
    keys.extend(indexed.into_iter().map(|(_, key)| key));
    keys.extend(named);
    keys
  }

  pub(crate) fn prototype_for(&self, value: &Value) -> Option<ObjRef> {
    match value {
      Value::Object(obj) => obj.prototype(),
      Value::String(_) => Some(self.realm.string_prototype.clone()),
      Value::Number(_) => Some(self.realm.number_prototype.clone()),
      Value::Bool(_) => Some(self.realm.boolean_prototype.clone()),
      Value::Undefined | Value::Null => None,
    }
  }

  /// `target[key]`
  pub(crate) fn get_property(&mut self, target: &Value, key: &PropertyKey) -> Result<Value, Throw> {
    let start = match target {
      Value::Object(obj) => obj.clone(),
      Value::Undefined | Value::Null => {
        return Err(self.type_error(format!(
          "Cannot read properties of {} (reading '{key}')",
          if target.is_undefined() {
            "undefined"
          } else {
            "null"
          }
        )));
      }
      Value::String(s) => {
        if &**key == "length" {
          return Ok(Value::Number(s.chars().count() as f64));
        }
        if let Some(index) = array_index(key) {
          return Ok(
            s.chars()
              .nth(index)
              .map(|c| Value::from(c.to_string()))
              .unwrap_or_default(),
          );
        }
        self.realm.string_prototype.clone()
      }
      Value::Number(_) => self.realm.number_prototype.clone(),
      Value::Bool(_) => self.realm.boolean_prototype.clone(),
    };
    self.get_from(&start, key, target)
  }

  /// Property lookup starting at `start`, calling getters with `receiver`
  pub(crate) fn get_from(
    &mut self,
    start: &ObjRef,
    key: &PropertyKey,
    receiver: &Value,
  ) -> Result<Value, Throw> {
    let mut current = Some(start.clone());
    while let Some(obj) = current {
      if let Some(property) = Self::own_property(&obj, key) {
        return match property.slot {
          Slot::Data { value, .. } => Ok(value),
          Slot::Accessor { get: Some(getter), .. } => {
            self.call_function(&getter, receiver.clone(), &[])
          }
          Slot::Accessor { get: None, .. } => Ok(Value::Undefined),
        };
      }
      current = obj.prototype();
    }
    Ok(Value::Undefined)
  }

  /// `target[key] = value` in strict mode
  pub(crate) fn set_property(
    &mut self,
    target: &Value,
    key: PropertyKey,
    value: Value,
  ) -> Result<(), Throw> {
    let obj = match target {
      Value::Object(obj) => obj.clone(),
      Value::Undefined | Value::Null => {
        return Err(self.type_error(format!(
          "Cannot set properties of {} (setting '{key}')",
          if target.is_undefined() {
            "undefined"
          } else {
            "null"
          }
        )));
      }
      primitive => {
        let text = self.to_string(primitive)?;
        return Err(self.type_error(format!(
          "Cannot create property '{key}' on {} '{text}'",
          primitive.type_of()
        )));
      }
    };
    self.set_on(&obj, key, value, target)
  }

  pub(crate) fn set_on(
    &mut self,
    obj: &ObjRef,
    key: PropertyKey,
    value: Value,
    receiver: &Value,
  ) -> Result<(), Throw> {
    let mut current = Some(obj.clone());
    while let Some(holder) = current {
      if let Some(property) = Self::own_property(&holder, &key) {
        match property.slot {
          Slot::Accessor { set: Some(setter), .. } => {
            self.call_function(&setter, receiver.clone(), &[value])?;
            return Ok(());
          }
          Slot::Accessor { set: None, .. } => {
            return Err(self.type_error(format!(
              "Cannot set property {key} of {} which has only a getter",
              describe_target(obj)
            )));
          }
          Slot::Data {
            writable: false, ..
          } => {
            return Err(self.type_error(format!(
              "Cannot assign to read only property '{key}' of object '{}'",
              describe_target(obj)
            )));
          }
          Slot::Data { .. } => {
            if holder.ptr_eq(obj) {
              return self.write_own(obj, key, value);
            }
            break;
          }
        }
      }
      current = holder.prototype();
    }
    self.add_own(obj, key, value)
  }

  /// Overwrite an existing writable own data property
  fn write_own(&mut self, obj: &ObjRef, key: PropertyKey, value: Value) -> Result<(), Throw> {
    {
      let mut object = obj.borrow_mut();
      if let ObjectKind::Array(items) = &mut object.kind {
        if let Some(index) = array_index(&key) {
          if let Some(slot) = items.get_mut(index) {
            *slot = value;
            return Ok(());
          }
        }
      }
    }
    if &*key == "length" && obj.is_array() {
      return self.set_array_length(obj, &value);
    }
    let mut object = obj.borrow_mut();
    if let Some(property) = object.properties.get_mut(&key) {
      if let Slot::Data { value: slot, .. } = &mut property.slot {
        *slot = value;
      }
    }
    Ok(())
  }

  fn add_own(&mut self, obj: &ObjRef, key: PropertyKey, value: Value) -> Result<(), Throw> {
    let (extensible, is_array, sealed) = {
      let object = obj.borrow();
      (
        object.extensible,
        matches!(object.kind, ObjectKind::Array(..)),
        object.integrity != Integrity::None,
      )
    };
    if !extensible || (is_array && sealed && array_index(&key).is_some()) {
      return Err(self.type_error(format!(
        "Cannot add property {key}, object is not extensible"
      )));
    }

    let mut object = obj.borrow_mut();
    if let ObjectKind::Array(items) = &mut object.kind {
      if let Some(index) = array_index(&key) {
        if index >= items.len() {
          items.resize(index + 1, Value::Undefined);
        }
        items[index] = value;
        return Ok(());
      }
    }
    object.properties.insert(key, Property::data(value));
    Ok(())
  }

  pub(crate) fn set_array_length(&mut self, obj: &ObjRef, value: &Value) -> Result<(), Throw> {
    let length = self.to_number(value)?;
    if length < 0.0 || length.fract() != 0.0 || length >= u32::MAX as f64 {
      return Err(self.range_error("Invalid array length"));
    }
    if let ObjectKind::Array(items) = &mut obj.borrow_mut().kind {
      items.resize(length as usize, Value::Undefined);
    }
    Ok(())
  }

  /// `Object.defineProperty` semantics
  pub(crate) fn define_own(
    &mut self,
    obj: &ObjRef,
    key: PropertyKey,
    property: Property,
  ) -> Result<(), Throw> {
    let existing = Self::own_property(obj, &key);
    if let Some(existing) = &existing {
      if !existing.configurable {
        let same_value = match (&existing.slot, &property.slot) {
          (Slot::Data { value: a, .. }, Slot::Data { value: b, .. }) => a.same_value(b),
          _ => false,
        };
        if !(existing.writable() || same_value) || property.configurable {
          return Err(self.type_error(format!("Cannot redefine property: {key}")));
        }
      }
    } else if !obj.borrow().extensible {
      return Err(self.type_error(format!(
        "Cannot define property {key}, object is not extensible"
      )));
    }

    if obj.is_array() {
      if &*key == "length" {
        if let Some(value) = property.value() {
          let value = value.clone();
          return self.set_array_length(obj, &value);
        }
        return Ok(());
      }
      if let Some(index) = array_index(&key) {
        if let Some(value) = property.value() {
          let mut object = obj.borrow_mut();
          if let ObjectKind::Array(items) = &mut object.kind {
            if index >= items.len() {
              items.resize(index + 1, Value::Undefined);
            }
            items[index] = value.clone();
          }
          return Ok(());
        }
      }
    }

    obj.borrow_mut().properties.insert(key, property);
    Ok(())
  }

  /// `delete target[key]`
  pub(crate) fn delete_property(&mut self, obj: &ObjRef, key: &PropertyKey) -> Result<bool, Throw> {
    let Some(property) = Self::own_property(obj, key) else {
      return Ok(true);
    };
    if !property.configurable {
      return Err(self.type_error(format!(
        "Cannot delete property '{key}' of {}",
        describe_target(obj)
      )));
    }
    let mut object = obj.borrow_mut();
    if let ObjectKind::Array(items) = &mut object.kind {
      if let Some(index) = array_index(key) {
        if let Some(slot) = items.get_mut(index) {
          *slot = Value::Undefined;
        }
        return Ok(true);
      }
    }
    object.properties.shift_remove(key);
    Ok(true)
  }

  pub(crate) fn set_integrity(obj: &ObjRef, level: Integrity) {
    let mut object = obj.borrow_mut();
    object.extensible = false;
    if object.integrity != Integrity::Frozen {
      object.integrity = level;
    }
    for property in object.properties.values_mut() {
      property.configurable = false;
      if level == Integrity::Frozen {
        if let Slot::Data { writable, .. } = &mut property.slot {
          *writable = false;
        }
      }
    }
  }

  pub(crate) fn test_integrity(obj: &ObjRef, level: Integrity) -> bool {
    let object = obj.borrow();
    if object.extensible {
      return false;
    }
    let elements_ok = match &object.kind {
      ObjectKind::Array(items) if !items.is_empty() => match level {
        Integrity::Frozen => object.integrity == Integrity::Frozen,
        _ => object.integrity != Integrity::None,
      },
      _ => true,
    };
    elements_ok
      && object.properties.values().all(|property| {
        !property.configurable && (level != Integrity::Frozen || !property.writable())
      })
  }

  // Conversions

  pub(crate) fn to_primitive(&mut self, value: &Value, hint: Hint) -> Result<Value, Throw> {
    let Value::Object(obj) = value else {
      return Ok(value.clone());
    };
    let order = match hint {
      Hint::Number => ["valueOf", "toString"],
      Hint::String => ["toString", "valueOf"],
    };
    for name in order {
      let method = self.get_from(obj, &name.into(), value)?;
      if method.is_callable() {
        let result = self.call_function(&method, value.clone(), &[])?;
        if !matches!(result, Value::Object(..)) {
          return Ok(result);
        }
      }
    }
    Err(self.type_error("Cannot convert object to primitive value"))
  }

  pub(crate) fn to_string(&mut self, value: &Value) -> Result<Rc<str>, Throw> {
    Ok(match value {
      Value::Undefined => "undefined".into(),
      Value::Null => "null".into(),
      Value::Bool(true) => "true".into(),
      Value::Bool(false) => "false".into(),
      Value::Number(n) => number_to_string(*n).into(),
      Value::String(s) => s.clone(),
      Value::Object(..) => {
        let primitive = self.to_primitive(value, Hint::String)?;
        return self.to_string(&primitive);
      }
    })
  }

  pub(crate) fn to_property_key(&mut self, value: &Value) -> Result<PropertyKey, Throw> {
    match value {
      Value::String(s) => Ok(PropertyKey::from(&**s)),
      other => Ok(PropertyKey::from(&*self.to_string(other)?)),
    }
  }

  pub(crate) fn to_number(&mut self, value: &Value) -> Result<f64, Throw> {
    Ok(match value {
      Value::Undefined => f64::NAN,
      Value::Null => 0.0,
      Value::Bool(b) => *b as u8 as f64,
      Value::Number(n) => *n,
      Value::String(s) => string_to_number(s),
      Value::Object(..) => {
        let primitive = self.to_primitive(value, Hint::Number)?;
        return self.to_number(&primitive);
      }
    })
  }

  pub(crate) fn to_int32(&mut self, value: &Value) -> Result<i32, Throw> {
    Ok(f64_to_int32(self.to_number(value)?))
  }

  pub(crate) fn to_uint32(&mut self, value: &Value) -> Result<u32, Throw> {
    Ok(f64_to_int32(self.to_number(value)?) as u32)
  }

  /// Integer used for lengths and positions, `NaN` is 0
  pub(crate) fn to_integer(&mut self, value: &Value) -> Result<f64, Throw> {
    let n = self.to_number(value)?;
    Ok(if n.is_nan() { 0.0 } else { n.trunc() })
  }

  /// Box primitives, reject `null` and `undefined`
  pub(crate) fn to_object(&mut self, value: &Value) -> Result<ObjRef, Throw> {
    Ok(match value {
      Value::Object(obj) => obj.clone(),
      Value::Undefined | Value::Null => {
        return Err(self.type_error("Cannot convert undefined or null to object"));
      }
      Value::Bool(b) => {
        let proto = self.realm.boolean_prototype.clone();
        self.alloc(ObjectKind::Boolean(*b), Some(proto))
      }
      Value::Number(n) => {
        let proto = self.realm.number_prototype.clone();
        self.alloc(ObjectKind::Number(*n), Some(proto))
      }
      Value::String(s) => {
        let proto = self.realm.string_prototype.clone();
        self.alloc(ObjectKind::String(s.clone()), Some(proto))
      }
    })
  }

  // Operators

  /// `==`
  pub(crate) fn loose_equals(&mut self, a: &Value, b: &Value) -> Result<bool, Throw> {
    Ok(match (a, b) {
      (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
      (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
      (Value::Number(x), Value::String(s)) | (Value::String(s), Value::Number(x)) => {
        *x == string_to_number(s)
      }
      (Value::Bool(x), other) | (other, Value::Bool(x)) => {
        let number = Value::Number(*x as u8 as f64);
        return self.loose_equals(&number, other);
      }
      (Value::Object(..), Value::Object(..)) => a.strict_equals(b),
      (Value::Object(..), _) => {
        let primitive = self.to_primitive(a, Hint::Number)?;
        return self.loose_equals(&primitive, b);
      }
      (_, Value::Object(..)) => {
        let primitive = self.to_primitive(b, Hint::Number)?;
        return self.loose_equals(a, &primitive);
      }
      _ => a.strict_equals(b),
    })
  }

  /// `a + b`
  pub(crate) fn add(&mut self, a: &Value, b: &Value) -> Result<Value, Throw> {
    if let (Value::Number(x), Value::Number(y)) = (a, b) {
      return Ok(Value::Number(x + y));
    }
    let a = self.to_primitive(a, Hint::Number)?;
    let b = self.to_primitive(b, Hint::Number)?;
    if matches!(a, Value::String(..)) || matches!(b, Value::String(..)) {
      let mut text = self.to_string(&a)?.to_string();
      text.push_str(&self.to_string(&b)?);
      return Ok(Value::from(text));
    }
    Ok(Value::Number(self.to_number(&a)? + self.to_number(&b)?))
  }

  /// `a < b`, `None` when either side is `NaN`
  pub(crate) fn less_than(&mut self, a: &Value, b: &Value) -> Result<Option<bool>, Throw> {
    let a = self.to_primitive(a, Hint::Number)?;
    let b = self.to_primitive(b, Hint::Number)?;
    if let (Value::String(x), Value::String(y)) = (&a, &b) {
      return Ok(Some(x < y));
    }
    let x = self.to_number(&a)?;
    let y = self.to_number(&b)?;
    if x.is_nan() || y.is_nan() {
      return Ok(None);
    }
    Ok(Some(x < y))
  }

  /// `value instanceof ctor`
  pub(crate) fn instance_of(&mut self, value: &Value, ctor: &Value) -> Result<bool, Throw> {
    let Some(ctor_obj) = ctor.as_object().filter(|obj| obj.is_callable()) else {
      return Err(self.type_error("Right-hand side of 'instanceof' is not callable"));
    };
    if let Some(Callable::Bound(bound)) = ctor_obj.callable() {
      let target = bound.target.clone();
      return self.instance_of(value, &target);
    }
    let Value::Object(obj) = value else {
      return Ok(false);
    };
    let prototype = self.get_from(ctor_obj, &"prototype".into(), ctor)?;
    let Value::Object(prototype) = prototype else {
      return Err(self.type_error("Function has non-object prototype in instanceof check"));
    };
    let mut current = obj.prototype();
    while let Some(proto) = current {
      if proto.ptr_eq(&prototype) {
        return Ok(true);
      }
      current = proto.prototype();
    }
    Ok(false)
  }

  /// Values produced by iterating `value` with `for...of` or spread
  pub(crate) fn iterate(&mut self, value: &Value) -> Result<Vec<Value>, Throw> {
    if let Value::String(s) = value {
      return Ok(s.chars().map(|c| Value::from(c.to_string())).collect());
    }
    if let Value::Object(obj) = value {
      enum Source {
        Values(Vec<Value>),
        Pairs(Vec<(Value, Value)>),
        None,
      }
      let source = match &obj.borrow().kind {
        ObjectKind::Array(items) => Source::Values(items.clone()),
        ObjectKind::String(s) => {
          Source::Values(s.chars().map(|c| Value::from(c.to_string())).collect())
        }
        ObjectKind::Set(entries) => Source::Values(entries.values().cloned().collect()),
        ObjectKind::Map(entries) => Source::Pairs(entries.values().cloned().collect()),
        ObjectKind::SearchParams(pairs) => Source::Pairs(
          pairs
            .iter()
            .map(|(k, v)| (Value::from(k.as_str()), Value::from(v.as_str())))
            .collect(),
        ),
        _ => Source::None,
      };
      return match source {
        Source::Values(items) => Ok(items),
        Source::Pairs(pairs) => Ok(
          pairs
            .into_iter()
            .map(|(k, v)| Value::Object(self.alloc_array(vec![k, v])))
            .collect(),
        ),
        Source::None => self.iterate_not_builtin(value),
      };
    }
    self.iterate_not_builtin(value)
  }

  fn iterate_not_builtin(&mut self, value: &Value) -> Result<Vec<Value>, Throw> {
    let text = match value {
      Value::Object(obj) if obj.is_callable() => "function".to_string(),
      Value::Object(..) => "object".to_string(),
      other => self.to_string(other)?.to_string(),
    };
    Err(self.type_error(format!("{text} is not iterable")))
  }
}

pub(crate) fn f64_to_int32(n: f64) -> i32 {
  if !n.is_finite() {
    return 0;
  }
  let int = n.trunc() % 4294967296.0;
  let int = if int < 0.0 { int + 4294967296.0 } else { int };
  int as u32 as i32
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_int32_wraps() {
    assert_eq!(f64_to_int32(4294967297.0), 1);
    assert_eq!(f64_to_int32(-1.0), -1);
    assert_eq!(f64_to_int32(f64::NAN), 0);
    assert_eq!(f64_to_int32(2147483648.0), -2147483648);
  }
}
