use std::fmt;
use std::rc::Rc;

use crate::object::{ObjRef, ObjectKind};

/// A JavaScript value.
///
/// Strings are sequences of unicode scalar values, lengths and indices count
/// `char`s.
#[derive(Clone, Default)]
pub enum Value {
  #[default]
  Undefined,
  Null,
  Bool(bool),
  Number(f64),
  String(Rc<str>),
  Object(ObjRef),
}

impl Value {
  pub fn is_undefined(&self) -> bool {
    matches!(self, Value::Undefined)
  }

  pub fn is_nullish(&self) -> bool {
    matches!(self, Value::Undefined | Value::Null)
  }

  pub fn as_object(&self) -> Option<&ObjRef> {
    match self {
      Value::Object(obj) => Some(obj),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_number(&self) -> Option<f64> {
    match self {
      Value::Number(n) => Some(*n),
      _ => None,
    }
  }

  pub fn is_callable(&self) -> bool {
    self.as_object().is_some_and(|obj| obj.is_callable())
  }

  pub fn truthy(&self) -> bool {
    match self {
      Value::Undefined | Value::Null => false,
      Value::Bool(b) => *b,
      Value::Number(n) => !(n.is_nan() || *n == 0.0),
      Value::String(s) => !s.is_empty(),
      Value::Object(_) => true,
    }
  }

  pub fn type_of(&self) -> &'static str {
    match self {
      Value::Undefined => "undefined",
      Value::Null => "object",
      Value::Bool(_) => "boolean",
      Value::Number(_) => "number",
      Value::String(_) => "string",
      Value::Object(obj) if obj.is_callable() => "function",
      Value::Object(_) => "object",
    }
  }

  /// `===`
  pub fn strict_equals(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Number(a), Value::Number(b)) => a == b,
      (Value::String(a), Value::String(b)) => a == b,
      (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
      _ => false,
    }
  }

  /// `Object.is`
  pub fn same_value(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Number(a), Value::Number(b)) => {
        (a.is_nan() && b.is_nan()) || (a == b && a.is_sign_negative() == b.is_sign_negative())
      }
      _ => self.strict_equals(other),
    }
  }

  /// Equality used by `includes`, `Map` and `Set`
  pub fn same_value_zero(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Number(a), Value::Number(b)) => (a.is_nan() && b.is_nan()) || a == b,
      _ => self.strict_equals(other),
    }
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::String(value.into())
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::String(value.into())
  }
}

impl From<Rc<str>> for Value {
  fn from(value: Rc<str>) -> Self {
    Value::String(value)
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Value::Number(value)
  }
}

impl From<usize> for Value {
  fn from(value: usize) -> Self {
    Value::Number(value as f64)
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Value::Bool(value)
  }
}

impl From<ObjRef> for Value {
  fn from(value: ObjRef) -> Self {
    Value::Object(value)
  }
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Undefined => write!(f, "undefined"),
      Value::Null => write!(f, "null"),
      Value::Bool(b) => write!(f, "{b}"),
      Value::Number(n) => write!(f, "{}", number_to_string(*n)),
      Value::String(s) => write!(f, "{s:?}"),
      Value::Object(obj) => {
        let kind = match &obj.borrow().kind {
          ObjectKind::Array(items) => format!("Array({})", items.len()),
          ObjectKind::Function(..) => "Function".into(),
          ObjectKind::Error => "Error".into(),
          _ => "Object".into(),
        };
        write!(f, "[{kind} #{:x}]", obj.id())
      }
    }
  }
}

/// `Number.prototype.toString()` without a radix
pub fn number_to_string(n: f64) -> String {
  if n.is_nan() {
    return "NaN".into();
  }
  if n == 0.0 {
    return "0".into();
  }
  if n.is_infinite() {
    return if n > 0.0 { "Infinity" } else { "-Infinity" }.into();
  }

  let abs = n.abs();
  if (1e-6..1e21).contains(&abs) {
    return format!("{n}");
  }

  // Rust prints `1e21`, JS prints `1e+21`
  let formatted = format!("{n:e}");
  match formatted.split_once('e') {
    Some((mantissa, exponent)) if !exponent.starts_with('-') => {
      format!("{mantissa}e+{exponent}")
    }
    _ => formatted,
  }
}

/// Integer part of `n` in `radix`, followed by up to 20 fractional digits
pub fn number_to_radix_string(n: f64, radix: u32) -> String {
  if radix == 10 || !n.is_finite() {
    return number_to_string(n);
  }

  let negative = n < 0.0;
  let abs = n.abs();
  let mut int_part = abs.trunc();
  let mut fraction = abs - int_part;

  let mut digits = Vec::new();
  if int_part == 0.0 {
    digits.push('0');
  }
  while int_part >= 1.0 {
    let digit = (int_part % radix as f64) as u32;
    digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
    int_part = (int_part / radix as f64).trunc();
  }
  digits.reverse();

  let mut result: String = digits.into_iter().collect();
  if fraction > 0.0 {
    result.push('.');
    for _ in 0..20 {
      fraction *= radix as f64;
      let digit = fraction.trunc() as u32;
      result.push(std::char::from_digit(digit, radix).unwrap_or('0'));
      fraction -= digit as f64;
      if fraction == 0.0 {
        break;
      }
    }
  }

  if negative {
    format!("-{result}")
  } else {
    result
  }
}

/// `StringToNumber`
pub fn string_to_number(s: &str) -> f64 {
  let trimmed = s.trim();
  if trimmed.is_empty() {
    return 0.0;
  }

  let radix_prefixed = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)];
  for (prefix, radix) in radix_prefixed {
    if let Some(digits) = trimmed.strip_prefix(prefix) {
      return u64::from_str_radix(digits, radix)
        .map(|n| n as f64)
        .unwrap_or(f64::NAN);
    }
  }

  match trimmed {
    "Infinity" | "+Infinity" => return f64::INFINITY,
    "-Infinity" => return f64::NEG_INFINITY,
    _ => {}
  }

  // Rust also accepts `inf` and `nan`
  if !trimmed
    .chars()
    .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
  {
    return f64::NAN;
  }
  trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Canonical array index of a property key
pub fn array_index(key: &str) -> Option<usize> {
  if key.is_empty() || key.len() > 10 || (key.len() > 1 && key.starts_with('0')) {
    return None;
  }
  if !key.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  key
    .parse::<u64>()
    .ok()
    .filter(|index| *index < u32::MAX as u64)
    .map(|index| index as usize)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_number_to_string() {
    assert_eq!(number_to_string(42.0), "42");
    assert_eq!(number_to_string(-0.0), "0");
    assert_eq!(number_to_string(1.5), "1.5");
    assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
    assert_eq!(number_to_string(1e21), "1e+21");
    assert_eq!(number_to_string(1e-7), "1e-7");
    assert_eq!(number_to_string(f64::NAN), "NaN");
    assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
  }

  #[test]
  fn test_radix_string() {
    assert_eq!(number_to_radix_string(255.0, 16), "ff");
    assert_eq!(number_to_radix_string(-5.0, 2), "-101");
    assert_eq!(number_to_radix_string(0.5, 2), "0.1");
  }

  #[test]
  fn test_string_to_number() {
    assert_eq!(string_to_number(" 12 "), 12.0);
    assert_eq!(string_to_number(""), 0.0);
    assert_eq!(string_to_number("0x1f"), 31.0);
    assert!(string_to_number("inf").is_nan());
    assert!(string_to_number("12px").is_nan());
    assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
  }

  #[test]
  fn test_array_index() {
    assert_eq!(array_index("0"), Some(0));
    assert_eq!(array_index("17"), Some(17));
    assert_eq!(array_index("01"), None);
    assert_eq!(array_index("-1"), None);
    assert_eq!(array_index("length"), None);
  }

  #[test]
  fn test_equality() {
    let nan = Value::Number(f64::NAN);
    assert!(!nan.strict_equals(&nan));
    assert!(nan.same_value_zero(&nan));
    assert!(!Value::Number(0.0).same_value(&Value::Number(-0.0)));
    assert!(Value::from("a").strict_equals(&Value::from("a")));
  }
}
