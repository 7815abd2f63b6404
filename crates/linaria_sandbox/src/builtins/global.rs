use std::time::{SystemTime, UNIX_EPOCH};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::builtins::arg;
use crate::error::{ErrorType, Throw};
use crate::object::ObjectKind;
use crate::sandbox::Sandbox;
use crate::value::Value;

/// Characters `encodeURIComponent` leaves alone
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
  .remove(b'-')
  .remove(b'_')
  .remove(b'.')
  .remove(b'!')
  .remove(b'~')
  .remove(b'*')
  .remove(b'\'')
  .remove(b'(')
  .remove(b')');

/// Characters `encodeURI` leaves alone
const URI: &AsciiSet = &COMPONENT
  .remove(b';')
  .remove(b',')
  .remove(b'/')
  .remove(b'?')
  .remove(b':')
  .remove(b'@')
  .remove(b'&')
  .remove(b'=')
  .remove(b'+')
  .remove(b'$')
  .remove(b'#');

/// Characters `decodeURI` keeps escaped
const RESERVED: &str = ";/?:@&=+$,#";

pub(super) fn install(sandbox: &mut Sandbox) {
  let global = sandbox.global.clone();
  let this = Value::Object(global.clone());
  for name in ["global", "globalThis", "window", "self"] {
    sandbox.define_value(&global, name, this.clone());
  }
  sandbox.define_constant(&global, "undefined", Value::Undefined);
  sandbox.define_constant(&global, "NaN", Value::Number(f64::NAN));
  sandbox.define_constant(&global, "Infinity", Value::Number(f64::INFINITY));
  sandbox.define_value(&global, "linariaVM", Value::Bool(true));

  sandbox.define_method(&global, "isNaN", 1, |sandbox, _, args| {
    Ok(Value::Bool(sandbox.to_number(&arg(args, 0))?.is_nan()))
  });
  sandbox.define_method(&global, "isFinite", 1, |sandbox, _, args| {
    Ok(Value::Bool(sandbox.to_number(&arg(args, 0))?.is_finite()))
  });

  sandbox.define_method(&global, "encodeURIComponent", 1, |sandbox, _, args| {
    let text = sandbox.to_string(&arg(args, 0))?;
    Ok(Value::from(utf8_percent_encode(&text, COMPONENT).to_string()))
  });
  sandbox.define_method(&global, "encodeURI", 1, |sandbox, _, args| {
    let text = sandbox.to_string(&arg(args, 0))?;
    Ok(Value::from(utf8_percent_encode(&text, URI).to_string()))
  });
  sandbox.define_method(&global, "decodeURIComponent", 1, |sandbox, _, args| {
    let text = sandbox.to_string(&arg(args, 0))?;
    decode(sandbox, &text, "")
  });
  sandbox.define_method(&global, "decodeURI", 1, |sandbox, _, args| {
    let text = sandbox.to_string(&arg(args, 0))?;
    decode(sandbox, &text, RESERVED)
  });

  install_date(sandbox);
}

/// Percent-decode `text`, leaving escapes of `keep` characters untouched
fn decode(sandbox: &mut Sandbox, text: &str, keep: &str) -> Result<Value, Throw> {
  match decode_uri(text, keep) {
    Some(decoded) => Ok(Value::from(decoded)),
    None => Err(sandbox.throw_error(ErrorType::URIError, "URI malformed")),
  }
}

fn decode_uri(text: &str, keep: &str) -> Option<String> {
  let bytes = text.as_bytes();
  for (index, byte) in bytes.iter().enumerate() {
    if *byte == b'%' {
      let valid = bytes
        .get(index + 1..index + 3)
        .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
      if !valid {
        return None;
      }
    }
  }

  let mut out = String::with_capacity(text.len());
  let mut rest = text;
  while let Some(start) = rest.find('%') {
    out.push_str(&rest[..start]);
    // A run of escapes decodes together so multi-byte sequences survive
    let mut end = start;
    while rest[end..].starts_with('%') && end + 3 <= rest.len() {
      end += 3;
    }
    let decoded = percent_decode_str(&rest[start..end]).decode_utf8().ok()?;
    if keep.is_empty() {
      out.push_str(&decoded);
    } else {
      let mut escapes = rest[start..end].as_bytes().chunks(3);
      for c in decoded.chars() {
        let width = c.len_utf8();
        let raw: Vec<&[u8]> = escapes.by_ref().take(width).collect();
        if width == 1 && keep.contains(c) {
          for chunk in raw {
            out.push_str(std::str::from_utf8(chunk).ok()?);
          }
        } else {
          out.push(c);
        }
      }
    }
    rest = &rest[end..];
  }
  out.push_str(rest);
  Some(out)
}

fn now_millis() -> f64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|elapsed| elapsed.as_millis() as f64)
    .unwrap_or_default()
}

fn install_date(sandbox: &mut Sandbox) {
  let prototype = sandbox.alloc_object();
  let ctor = sandbox.define_constructor(
    "Date",
    7,
    &prototype,
    |_, _, _| Ok(Value::from(iso_string(now_millis()))),
    |sandbox, args, new_target| {
      let time = match args {
        [] => now_millis(),
        [Value::String(text)] => parse_iso(text).unwrap_or(f64::NAN),
        [value] => sandbox.to_number(value)?,
        _ => {
          let mut parts = [0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
          for (part, value) in parts.iter_mut().zip(args) {
            *part = sandbox.to_number(value)?;
          }
          utc_millis(&parts)
        }
      };
      let proto = sandbox.prototype_from_constructor(new_target)?;
      Ok(Value::Object(sandbox.alloc(ObjectKind::Number(time), Some(proto))))
    },
  );
  sandbox.define_method(&ctor, "now", 0, |_, _, _| Ok(Value::Number(now_millis())));
  sandbox.define_method(&ctor, "UTC", 7, |sandbox, _, args| {
    let mut parts = [0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
    for (part, value) in parts.iter_mut().zip(args) {
      *part = sandbox.to_number(value)?;
    }
    Ok(Value::Number(utc_millis(&parts)))
  });

  for name in ["getTime", "valueOf"] {
    sandbox.define_method(&prototype, name, 0, |sandbox, this, _| {
      Ok(Value::Number(this_time(sandbox, this)?))
    });
  }
  for name in ["toISOString", "toJSON", "toString"] {
    sandbox.define_method(&prototype, name, 0, |sandbox, this, _| {
      let time = this_time(sandbox, this)?;
      if time.is_nan() {
        return Err(sandbox.range_error("Invalid time value"));
      }
      Ok(Value::from(iso_string(time)))
    });
  }
  let fields: [(&str, usize); 7] = [
    ("getUTCFullYear", 0),
    ("getUTCMonth", 1),
    ("getUTCDate", 2),
    ("getUTCHours", 3),
    ("getUTCMinutes", 4),
    ("getUTCSeconds", 5),
    ("getUTCMilliseconds", 6),
  ];
  for (name, field) in fields {
    sandbox.define_method(&prototype, name, 0, move |sandbox, this, _| {
      let time = this_time(sandbox, this)?;
      if time.is_nan() {
        return Ok(Value::Number(f64::NAN));
      }
      Ok(Value::Number(civil_parts(time)[field] as f64))
    });
  }
}

fn this_time(sandbox: &mut Sandbox, this: &Value) -> Result<f64, Throw> {
  if let Some(obj) = this.as_object() {
    if let ObjectKind::Number(time) = obj.borrow().kind {
      return Ok(time);
    }
  }
  Err(sandbox.type_error("this is not a Date object."))
}

/// Days since the epoch for a proleptic Gregorian date
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
  let year = if month <= 2 { year - 1 } else { year };
  let era = year.div_euclid(400);
  let year_of_era = year - era * 400;
  let month_index = (month + 9) % 12;
  let day_of_year = (153 * month_index + 2) / 5 + day - 1;
  let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
  era * 146097 + day_of_era - 719468
}

/// `[year, month (0-based), day, hours, minutes, seconds, millis]`
fn civil_parts(time: f64) -> [i64; 7] {
  let millis = time as i64;
  let days = millis.div_euclid(86_400_000);
  let in_day = millis.rem_euclid(86_400_000);

  let z = days + 719468;
  let era = z.div_euclid(146097);
  let day_of_era = z - era * 146097;
  let year_of_era = (day_of_era - day_of_era / 1460 + day_of_era / 36524 - day_of_era / 146096) / 365;
  let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
  let month_index = (5 * day_of_year + 2) / 153;
  let day = day_of_year - (153 * month_index + 2) / 5 + 1;
  let month = if month_index < 10 { month_index + 3 } else { month_index - 9 };
  let year = year_of_era + era * 400 + i64::from(month <= 2);

  [
    year,
    month - 1,
    day,
    in_day / 3_600_000,
    in_day / 60_000 % 60,
    in_day / 1000 % 60,
    in_day % 1000,
  ]
}

fn utc_millis(parts: &[f64; 7]) -> f64 {
  if parts.iter().any(|part| !part.is_finite()) {
    return f64::NAN;
  }
  let [year, month, day, hours, minutes, seconds, millis] = parts.map(|part| part.trunc() as i64);
  let year = year + month.div_euclid(12);
  let month = month.rem_euclid(12) + 1;
  let days = days_from_civil(year, month, 1) + day - 1;
  (days * 86_400_000 + hours * 3_600_000 + minutes * 60_000 + seconds * 1000 + millis) as f64
}

fn iso_string(time: f64) -> String {
  let [year, month, day, hours, minutes, seconds, millis] = civil_parts(time);
  format!(
    "{year:04}-{:02}-{day:02}T{hours:02}:{minutes:02}:{seconds:02}.{millis:03}Z",
    month + 1
  )
}

/// `YYYY-MM-DD` with an optional `THH:MM[:SS[.mmm]]` part, read as UTC
fn parse_iso(text: &str) -> Option<f64> {
  let (date, time) = match text.split_once('T') {
    Some((date, time)) => (date, Some(time.trim_end_matches('Z'))),
    None => (text, None),
  };
  let mut date_parts = date.split('-').map(|part| part.parse::<f64>().ok());
  let year = date_parts.next()??;
  let month = date_parts.next().unwrap_or(Some(1.0))?;
  let day = date_parts.next().unwrap_or(Some(1.0))?;

  let mut parts = [year, month - 1.0, day, 0.0, 0.0, 0.0, 0.0];
  if let Some(time) = time {
    let (clock, millis) = match time.split_once('.') {
      Some((clock, millis)) => (clock, millis.parse::<f64>().ok()?),
      None => (time, 0.0),
    };
    for (index, part) in clock.split(':').enumerate().take(3) {
      parts[3 + index] = part.parse().ok()?;
    }
    parts[6] = millis;
  }
  Some(utc_millis(&parts))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_decode_uri_keeps_reserved_escapes() {
    assert_eq!(decode_uri("a%20b%2Fc", "").as_deref(), Some("a b/c"));
    assert_eq!(decode_uri("a%20b%2Fc", RESERVED).as_deref(), Some("a b%2Fc"));
    assert_eq!(decode_uri("%E2%82%AC", "").as_deref(), Some("€"));
    assert_eq!(decode_uri("%E2%8", ""), None);
  }

  #[test]
  fn test_iso_round_trip() {
    assert_eq!(iso_string(0.0), "1970-01-01T00:00:00.000Z");
    assert_eq!(parse_iso("2020-02-29T12:30:00.250Z"), Some(1582979400250.0));
    assert_eq!(iso_string(1582979400250.0), "2020-02-29T12:30:00.250Z");
  }
}
