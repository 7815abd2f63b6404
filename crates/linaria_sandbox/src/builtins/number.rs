use crate::builtins::arg;
use crate::error::Throw;
use crate::eval::js_pow;
use crate::object::ObjectKind;
use crate::sandbox::Sandbox;
use crate::value::{number_to_radix_string, number_to_string, string_to_number, Value};

pub(super) fn install(sandbox: &mut Sandbox) {
  install_number(sandbox);
  install_boolean(sandbox);
  install_math(sandbox);
}

fn install_number(sandbox: &mut Sandbox) {
  let prototype = sandbox.realm.number_prototype.clone();
  let ctor = sandbox.define_constructor(
    "Number",
    1,
    &prototype,
    |sandbox, _, args| match args.first() {
      Some(value) => Ok(Value::Number(sandbox.to_number(value)?)),
      None => Ok(Value::Number(0.0)),
    },
    |sandbox, args, new_target| {
      let n = match args.first() {
        Some(value) => sandbox.to_number(value)?,
        None => 0.0,
      };
      let proto = sandbox.prototype_from_constructor(new_target)?;
      Ok(Value::Object(sandbox.alloc(ObjectKind::Number(n), Some(proto))))
    },
  );

  for (name, value) in [
    ("MAX_SAFE_INTEGER", 9007199254740991.0),
    ("MIN_SAFE_INTEGER", -9007199254740991.0),
    ("EPSILON", f64::EPSILON),
    ("MAX_VALUE", f64::MAX),
    ("MIN_VALUE", 5e-324),
    ("POSITIVE_INFINITY", f64::INFINITY),
    ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
    ("NaN", f64::NAN),
  ] {
    sandbox.define_constant(&ctor, name, Value::Number(value));
  }

  sandbox.define_method(&ctor, "isInteger", 1, |_, _, args| {
    Ok(Value::Bool(
      arg(args, 0)
        .as_number()
        .is_some_and(|n| n.is_finite() && n.trunc() == n),
    ))
  });
  sandbox.define_method(&ctor, "isSafeInteger", 1, |_, _, args| {
    Ok(Value::Bool(arg(args, 0).as_number().is_some_and(|n| {
      n.is_finite() && n.trunc() == n && n.abs() <= 9007199254740991.0
    })))
  });
  sandbox.define_method(&ctor, "isFinite", 1, |_, _, args| {
    Ok(Value::Bool(arg(args, 0).as_number().is_some_and(f64::is_finite)))
  });
  sandbox.define_method(&ctor, "isNaN", 1, |_, _, args| {
    Ok(Value::Bool(arg(args, 0).as_number().is_some_and(f64::is_nan)))
  });

  // `Number.parseInt === parseInt`
  let global = sandbox.global.clone();
  let parse_int_fn = sandbox.new_native_function("parseInt", 2, |sandbox, _, args| {
    let text = sandbox.to_string(&arg(args, 0))?;
    let radix = sandbox.to_int32(&arg(args, 1))?;
    Ok(Value::Number(parse_int(&text, radix)))
  });
  let parse_float_fn = sandbox.new_native_function("parseFloat", 1, |sandbox, _, args| {
    let text = sandbox.to_string(&arg(args, 0))?;
    Ok(Value::Number(parse_float(&text)))
  });
  for target in [&ctor, &global] {
    sandbox.define_value(target, "parseInt", parse_int_fn.clone());
    sandbox.define_value(target, "parseFloat", parse_float_fn.clone());
  }

  sandbox.define_method(&prototype, "valueOf", 0, |sandbox, this, _| {
    Ok(Value::Number(this_number(sandbox, this, "valueOf")?))
  });
  sandbox.define_method(&prototype, "toString", 1, |sandbox, this, args| {
    let n = this_number(sandbox, this, "toString")?;
    let radix = match arg(args, 0) {
      Value::Undefined => 10.0,
      value => sandbox.to_integer(&value)?,
    };
    if !(2.0..=36.0).contains(&radix) {
      return Err(sandbox.range_error("toString() radix must be between 2 and 36"));
    }
    Ok(Value::from(if radix == 10.0 {
      number_to_string(n)
    } else {
      number_to_radix_string(n, radix as u32)
    }))
  });
  sandbox.define_method(&prototype, "toLocaleString", 0, |sandbox, this, _| {
    let n = this_number(sandbox, this, "toLocaleString")?;
    Ok(Value::from(number_to_string(n)))
  });
  sandbox.define_method(&prototype, "toFixed", 1, |sandbox, this, args| {
    let n = this_number(sandbox, this, "toFixed")?;
    let digits = sandbox.to_integer(&arg(args, 0))?;
    if !(0.0..=100.0).contains(&digits) {
      return Err(sandbox.range_error("toFixed() digits argument must be between 0 and 100"));
    }
    Ok(Value::from(to_fixed(n, digits as usize)))
  });
  sandbox.define_method(&prototype, "toPrecision", 1, |sandbox, this, args| {
    let n = this_number(sandbox, this, "toPrecision")?;
    let precision = arg(args, 0);
    if precision.is_undefined() {
      return Ok(Value::from(number_to_string(n)));
    }
    let precision = sandbox.to_integer(&precision)?;
    if !(1.0..=100.0).contains(&precision) {
      return Err(sandbox.range_error("toPrecision() argument must be between 1 and 100"));
    }
    Ok(Value::from(to_precision(n, precision as usize)))
  });
}

fn this_number(sandbox: &mut Sandbox, this: &Value, method: &str) -> Result<f64, Throw> {
  match this {
    Value::Number(n) => return Ok(*n),
    Value::Object(obj) => {
      if let ObjectKind::Number(n) = obj.borrow().kind {
        return Ok(n);
      }
    }
    _ => {}
  }
  Err(sandbox.type_error(format!(
    "Number.prototype.{method} requires that 'this' be a Number"
  )))
}

fn to_fixed(n: f64, digits: usize) -> String {
  if !n.is_finite() || n.abs() >= 1e21 {
    return number_to_string(n);
  }
  let text = format!("{n:.digits$}");
  // -0.00 prints as 0.00
  match text.strip_prefix('-') {
    Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
    _ => text,
  }
}

fn to_precision(n: f64, precision: usize) -> String {
  if !n.is_finite() {
    return number_to_string(n);
  }
  if n == 0.0 {
    return to_fixed(0.0, precision - 1);
  }
  let scientific = format!("{:.*e}", precision - 1, n);
  let Some((mantissa, exponent)) = scientific.split_once('e') else {
    return scientific;
  };
  let exponent: i32 = exponent.parse().unwrap_or_default();
  if exponent < -6 || exponent >= precision as i32 {
    let sign = if exponent < 0 { '-' } else { '+' };
    return format!("{mantissa}e{sign}{}", exponent.abs());
  }
  to_fixed(n, (precision as i32 - 1 - exponent).max(0) as usize)
}

/// `parseInt(text, radix)`
pub(crate) fn parse_int(text: &str, radix: i32) -> f64 {
  let text = text.trim_start();
  let (sign, mut digits) = match text.strip_prefix('-') {
    Some(rest) => (-1.0, rest),
    None => (1.0, text.strip_prefix('+').unwrap_or(text)),
  };

  let mut radix = radix as u32;
  if radix == 0 || radix == 16 {
    if let Some(rest) = digits
      .strip_prefix("0x")
      .or_else(|| digits.strip_prefix("0X"))
    {
      digits = rest;
      radix = 16;
    }
  }
  if radix == 0 {
    radix = 10;
  }
  if !(2..=36).contains(&radix) {
    return f64::NAN;
  }

  let mut value = 0.0;
  let mut seen = false;
  for c in digits.chars() {
    let Some(digit) = c.to_digit(radix) else {
      break;
    };
    value = value * radix as f64 + digit as f64;
    seen = true;
  }
  if seen {
    sign * value
  } else {
    f64::NAN
  }
}

/// `parseFloat(text)`, using the longest numeric prefix
pub(crate) fn parse_float(text: &str) -> f64 {
  let text = text.trim_start();
  for prefix in ["Infinity", "+Infinity"] {
    if text.starts_with(prefix) {
      return f64::INFINITY;
    }
  }
  if text.starts_with("-Infinity") {
    return f64::NEG_INFINITY;
  }

  let bytes = text.as_bytes();
  let mut end = 0;
  if matches!(bytes.first(), Some(b'+' | b'-')) {
    end = 1;
  }
  let digits_start = end;
  while end < bytes.len() && bytes[end].is_ascii_digit() {
    end += 1;
  }
  if end < bytes.len() && bytes[end] == b'.' {
    end += 1;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
      end += 1;
    }
  }
  if end == digits_start || &text[digits_start..end] == "." {
    return f64::NAN;
  }
  if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
    let mut exponent_end = end + 1;
    if matches!(bytes.get(exponent_end), Some(b'+' | b'-')) {
      exponent_end += 1;
    }
    let digits = exponent_end;
    while exponent_end < bytes.len() && bytes[exponent_end].is_ascii_digit() {
      exponent_end += 1;
    }
    if exponent_end > digits {
      end = exponent_end;
    }
  }
  string_to_number(&text[..end])
}

fn install_boolean(sandbox: &mut Sandbox) {
  let prototype = sandbox.realm.boolean_prototype.clone();
  sandbox.define_constructor(
    "Boolean",
    1,
    &prototype,
    |_, _, args| Ok(Value::Bool(arg(args, 0).truthy())),
    |sandbox, args, new_target| {
      let proto = sandbox.prototype_from_constructor(new_target)?;
      let value = arg(args, 0).truthy();
      Ok(Value::Object(sandbox.alloc(ObjectKind::Boolean(value), Some(proto))))
    },
  );
  sandbox.define_method(&prototype, "valueOf", 0, |sandbox, this, _| {
    Ok(Value::Bool(this_boolean(sandbox, this)?))
  });
  sandbox.define_method(&prototype, "toString", 0, |sandbox, this, _| {
    Ok(Value::from(this_boolean(sandbox, this)?.to_string()))
  });
}

fn this_boolean(sandbox: &mut Sandbox, this: &Value) -> Result<bool, Throw> {
  match this {
    Value::Bool(b) => return Ok(*b),
    Value::Object(obj) => {
      if let ObjectKind::Boolean(b) = obj.borrow().kind {
        return Ok(b);
      }
    }
    _ => {}
  }
  Err(sandbox.type_error("Boolean.prototype.valueOf requires that 'this' be a Boolean"))
}

fn install_math(sandbox: &mut Sandbox) {
  let math = sandbox.define_namespace("Math");
  for (name, value) in [
    ("E", std::f64::consts::E),
    ("LN10", std::f64::consts::LN_10),
    ("LN2", std::f64::consts::LN_2),
    ("LOG10E", std::f64::consts::LOG10_E),
    ("LOG2E", std::f64::consts::LOG2_E),
    ("PI", std::f64::consts::PI),
    ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
    ("SQRT2", std::f64::consts::SQRT_2),
  ] {
    sandbox.define_constant(&math, name, Value::Number(value));
  }

  let unary: [(&str, fn(f64) -> f64); 27] = [
    ("abs", f64::abs),
    ("acos", f64::acos),
    ("acosh", f64::acosh),
    ("asin", f64::asin),
    ("asinh", f64::asinh),
    ("atan", f64::atan),
    ("atanh", f64::atanh),
    ("cbrt", f64::cbrt),
    ("ceil", f64::ceil),
    ("cos", f64::cos),
    ("cosh", f64::cosh),
    ("exp", f64::exp),
    ("expm1", f64::exp_m1),
    ("floor", f64::floor),
    ("fround", |n| n as f32 as f64),
    ("log", f64::ln),
    ("log1p", f64::ln_1p),
    ("log10", f64::log10),
    ("log2", f64::log2),
    ("round", js_round),
    ("sign", js_sign),
    ("sin", f64::sin),
    ("sinh", f64::sinh),
    ("sqrt", f64::sqrt),
    ("tan", f64::tan),
    ("tanh", f64::tanh),
    ("trunc", f64::trunc),
  ];
  for (name, op) in unary {
    sandbox.define_method(&math, name, 1, move |sandbox, _, args| {
      Ok(Value::Number(op(sandbox.to_number(&arg(args, 0))?)))
    });
  }

  sandbox.define_method(&math, "atan2", 2, |sandbox, _, args| {
    let y = sandbox.to_number(&arg(args, 0))?;
    let x = sandbox.to_number(&arg(args, 1))?;
    Ok(Value::Number(y.atan2(x)))
  });
  sandbox.define_method(&math, "pow", 2, |sandbox, _, args| {
    let base = sandbox.to_number(&arg(args, 0))?;
    let exponent = sandbox.to_number(&arg(args, 1))?;
    Ok(Value::Number(js_pow(base, exponent)))
  });
  sandbox.define_method(&math, "clz32", 1, |sandbox, _, args| {
    Ok(Value::Number(sandbox.to_uint32(&arg(args, 0))?.leading_zeros() as f64))
  });
  sandbox.define_method(&math, "imul", 2, |sandbox, _, args| {
    let a = sandbox.to_int32(&arg(args, 0))?;
    let b = sandbox.to_int32(&arg(args, 1))?;
    Ok(Value::Number(a.wrapping_mul(b) as f64))
  });
  sandbox.define_method(&math, "max", 2, |sandbox, _, args| {
    let mut result = f64::NEG_INFINITY;
    for value in args {
      let n = sandbox.to_number(value)?;
      if n.is_nan() || result.is_nan() {
        result = f64::NAN;
      } else if n > result || (n == 0.0 && result == 0.0 && result.is_sign_negative()) {
        result = n;
      }
    }
    Ok(Value::Number(result))
  });
  sandbox.define_method(&math, "min", 2, |sandbox, _, args| {
    let mut result = f64::INFINITY;
    for value in args {
      let n = sandbox.to_number(value)?;
      if n.is_nan() || result.is_nan() {
        result = f64::NAN;
      } else if n < result || (n == 0.0 && result == 0.0 && n.is_sign_negative()) {
        result = n;
      }
    }
    Ok(Value::Number(result))
  });
  sandbox.define_method(&math, "hypot", 2, |sandbox, _, args| {
    let mut sum = 0.0;
    for value in args {
      let n = sandbox.to_number(value)?;
      if n.is_infinite() {
        return Ok(Value::Number(f64::INFINITY));
      }
      sum += n * n;
    }
    Ok(Value::Number(sum.sqrt()))
  });
  sandbox.define_method(&math, "random", 0, |_, _, _| {
    Ok(Value::Number(rand::random::<f64>()))
  });
}

fn js_round(n: f64) -> f64 {
  if !n.is_finite() || n == 0.0 {
    return n;
  }
  if n > -0.5 && n < 0.0 {
    return -0.0;
  }
  (n + 0.5).floor()
}

fn js_sign(n: f64) -> f64 {
  if n.is_nan() || n == 0.0 {
    n
  } else {
    n.signum()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_int() {
    assert_eq!(parse_int("  42px", 0), 42.0);
    assert_eq!(parse_int("-0x1f", 0), -31.0);
    assert_eq!(parse_int("ff", 16), 255.0);
    assert_eq!(parse_int("101", 2), 5.0);
    assert!(parse_int("px", 10).is_nan());
    assert!(parse_int("1", 40).is_nan());
  }

  #[test]
  fn test_parse_float() {
    assert_eq!(parse_float("1.5em"), 1.5);
    assert_eq!(parse_float(".25"), 0.25);
    assert_eq!(parse_float("2e3x"), 2000.0);
    assert_eq!(parse_float("3e"), 3.0);
    assert_eq!(parse_float("-Infinityx"), f64::NEG_INFINITY);
    assert!(parse_float("abc").is_nan());
  }

  #[test]
  fn test_to_fixed_and_precision() {
    assert_eq!(to_fixed(1.005, 1), "1.0");
    assert_eq!(to_fixed(-0.0001, 2), "0.00");
    assert_eq!(to_precision(123.456, 4), "123.5");
    assert_eq!(to_precision(0.000001234, 2), "0.0000012");
    assert_eq!(to_precision(123456.0, 2), "1.2e+5");
  }

  #[test]
  fn test_round_matches_js() {
    assert_eq!(js_round(2.5), 3.0);
    assert_eq!(js_round(-2.5), -2.0);
    assert!(js_round(-0.2).is_sign_negative());
  }
}
