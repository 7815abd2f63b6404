//! WHATWG `URL` and `URLSearchParams` backed by the `url` crate.

use url::form_urlencoded;
use url::Url;

use crate::builtins::arg;
use crate::error::Throw;
use crate::object::{ObjRef, ObjectKind};
use crate::sandbox::Sandbox;
use crate::value::Value;

pub(super) fn install(sandbox: &mut Sandbox) {
  install_url(sandbox);
  install_search_params(sandbox);
}

fn this_url(sandbox: &mut Sandbox, this: &Value) -> Result<(ObjRef, Url), Throw> {
  if let Some(obj) = this.as_object() {
    if let ObjectKind::Url(url) = &obj.borrow().kind {
      return Ok((obj.clone(), (**url).clone()));
    }
  }
  Err(sandbox.type_error("Value of \"this\" must be of type URL"))
}

fn store_url(obj: &ObjRef, url: Url) {
  obj.borrow_mut().kind = ObjectKind::Url(Box::new(url));
}

/// Component of `url` exposed by the accessor `name`
fn url_part(url: &Url, name: &str) -> String {
  match name {
    "href" => url.to_string(),
    "origin" => url.origin().ascii_serialization(),
    "protocol" => format!("{}:", url.scheme()),
    "username" => url.username().to_string(),
    "password" => url.password().unwrap_or_default().to_string(),
    "host" => match (url.host_str(), url.port()) {
      (Some(host), Some(port)) => format!("{host}:{port}"),
      (Some(host), None) => host.to_string(),
      _ => String::new(),
    },
    "hostname" => url.host_str().unwrap_or_default().to_string(),
    "port" => url.port().map(|port| port.to_string()).unwrap_or_default(),
    "pathname" => url.path().to_string(),
    "search" => match url.query() {
      Some(query) if !query.is_empty() => format!("?{query}"),
      _ => String::new(),
    },
    "hash" => match url.fragment() {
      Some(fragment) if !fragment.is_empty() => format!("#{fragment}"),
      _ => String::new(),
    },
    _ => String::new(),
  }
}

/// Assign the component `name`. Invalid values leave `url` unchanged.
fn set_url_part(url: &mut Url, name: &str, value: &str) {
  match name {
    "href" => {
      if let Ok(parsed) = Url::parse(value) {
        *url = parsed;
      }
    }
    "protocol" => {
      let _ = url.set_scheme(value.trim_end_matches(':'));
    }
    "username" => {
      let _ = url.set_username(value);
    }
    "password" => {
      let _ = url.set_password(Some(value).filter(|value| !value.is_empty()));
    }
    "host" => {
      let (host, port) = match value.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().ok()),
        None => (value, None),
      };
      if url.set_host(Some(host)).is_ok() {
        let _ = url.set_port(port);
      }
    }
    "hostname" => {
      let _ = url.set_host(Some(value));
    }
    "port" => {
      let _ = url.set_port(value.parse().ok());
    }
    "pathname" => url.set_path(value),
    "search" => {
      let query = value.trim_start_matches('?');
      url.set_query(Some(query).filter(|query| !query.is_empty()));
    }
    "hash" => {
      let fragment = value.trim_start_matches('#');
      url.set_fragment(Some(fragment).filter(|fragment| !fragment.is_empty()));
    }
    _ => {}
  }
}

fn install_url(sandbox: &mut Sandbox) {
  let prototype = sandbox.realm.url_prototype.clone();
  let ctor = sandbox.define_constructor(
    "URL",
    1,
    &prototype,
    |sandbox, _, _| Err(sandbox.type_error("Class constructor URL cannot be invoked without 'new'")),
    |sandbox, args, new_target| {
      let input = sandbox.to_string(&arg(args, 0))?;
      let parsed = match arg(args, 1) {
        Value::Undefined => Url::parse(&input),
        base => {
          let base = sandbox.to_string(&base)?;
          Url::parse(&base).and_then(|base| base.join(&input))
        }
      };
      let Ok(url) = parsed else {
        return Err(sandbox.type_error(format!("Invalid URL: {input}")));
      };
      let proto = sandbox.prototype_from_constructor(new_target)?;
      Ok(Value::Object(sandbox.alloc(ObjectKind::Url(Box::new(url)), Some(proto))))
    },
  );
  sandbox.define_method(&ctor, "canParse", 1, |sandbox, _, args| {
    let input = sandbox.to_string(&arg(args, 0))?;
    Ok(Value::Bool(Url::parse(&input).is_ok()))
  });

  let accessors = [
    "href", "origin", "protocol", "username", "password", "host", "hostname", "port", "pathname",
    "search", "hash",
  ];
  for name in accessors {
    let getter = sandbox.new_native_function(&format!("get {name}"), 0, move |sandbox, this, _| {
      let (_, url) = this_url(sandbox, this)?;
      Ok(Value::from(url_part(&url, name)))
    });
    let setter = (name != "origin").then(|| {
      sandbox.new_native_function(&format!("set {name}"), 1, move |sandbox, this, args| {
        let (obj, mut url) = this_url(sandbox, this)?;
        let value = sandbox.to_string(&arg(args, 0))?;
        set_url_part(&mut url, name, &value);
        store_url(&obj, url);
        Ok(Value::Undefined)
      })
    });
    sandbox.merge_accessor(&prototype, name.into(), Some(getter), setter, false);
  }

  sandbox.define_getter(&prototype, "searchParams", |sandbox, this, _| {
    let (_, url) = this_url(sandbox, this)?;
    let pairs = url
      .query_pairs()
      .map(|(key, value)| (key.into_owned(), value.into_owned()))
      .collect();
    Ok(new_search_params(sandbox, pairs))
  });
  for name in ["toString", "toJSON"] {
    sandbox.define_method(&prototype, name, 0, |sandbox, this, _| {
      let (_, url) = this_url(sandbox, this)?;
      Ok(Value::from(url.to_string()))
    });
  }
}

fn new_search_params(sandbox: &mut Sandbox, pairs: Vec<(String, String)>) -> Value {
  let proto = sandbox.realm.search_params_prototype.clone();
  Value::Object(sandbox.alloc(ObjectKind::SearchParams(pairs), Some(proto)))
}

fn this_params(sandbox: &mut Sandbox, this: &Value) -> Result<ObjRef, Throw> {
  match this.as_object() {
    Some(obj) if matches!(obj.borrow().kind, ObjectKind::SearchParams(..)) => Ok(obj.clone()),
    _ => Err(sandbox.type_error("Value of \"this\" must be of type URLSearchParams")),
  }
}

fn with_pairs<R>(obj: &ObjRef, f: impl FnOnce(&mut Vec<(String, String)>) -> R) -> Option<R> {
  match &mut obj.borrow_mut().kind {
    ObjectKind::SearchParams(pairs) => Some(f(pairs)),
    _ => None,
  }
}

fn serialize(pairs: &[(String, String)]) -> String {
  form_urlencoded::Serializer::new(String::new())
    .extend_pairs(pairs)
    .finish()
}

fn install_search_params(sandbox: &mut Sandbox) {
  let prototype = sandbox.realm.search_params_prototype.clone();
  sandbox.define_constructor(
    "URLSearchParams",
    0,
    &prototype,
    |sandbox, _, _| {
      Err(sandbox.type_error("Class constructor URLSearchParams cannot be invoked without 'new'"))
    },
    |sandbox, args, new_target| {
      let pairs = initial_pairs(sandbox, &arg(args, 0))?;
      let proto = sandbox.prototype_from_constructor(new_target)?;
      Ok(Value::Object(sandbox.alloc(ObjectKind::SearchParams(pairs), Some(proto))))
    },
  );

  sandbox.define_method(&prototype, "append", 2, |sandbox, this, args| {
    let obj = this_params(sandbox, this)?;
    let key = sandbox.to_string(&arg(args, 0))?.to_string();
    let value = sandbox.to_string(&arg(args, 1))?.to_string();
    with_pairs(&obj, |pairs| pairs.push((key, value)));
    Ok(Value::Undefined)
  });
  sandbox.define_method(&prototype, "delete", 1, |sandbox, this, args| {
    let obj = this_params(sandbox, this)?;
    let key = sandbox.to_string(&arg(args, 0))?;
    with_pairs(&obj, |pairs| pairs.retain(|(name, _)| **name != *key));
    Ok(Value::Undefined)
  });
  sandbox.define_method(&prototype, "get", 1, |sandbox, this, args| {
    let obj = this_params(sandbox, this)?;
    let key = sandbox.to_string(&arg(args, 0))?;
    let found = with_pairs(&obj, |pairs| {
      pairs
        .iter()
        .find(|(name, _)| **name == *key)
        .map(|(_, value)| value.clone())
    })
    .flatten();
    Ok(found.map(Value::from).unwrap_or(Value::Null))
  });
  sandbox.define_method(&prototype, "getAll", 1, |sandbox, this, args| {
    let obj = this_params(sandbox, this)?;
    let key = sandbox.to_string(&arg(args, 0))?;
    let values = with_pairs(&obj, |pairs| {
      pairs
        .iter()
        .filter(|(name, _)| **name == *key)
        .map(|(_, value)| Value::from(value.as_str()))
        .collect()
    })
    .unwrap_or_default();
    Ok(sandbox.new_array(values))
  });
  sandbox.define_method(&prototype, "has", 1, |sandbox, this, args| {
    let obj = this_params(sandbox, this)?;
    let key = sandbox.to_string(&arg(args, 0))?;
    let found = with_pairs(&obj, |pairs| pairs.iter().any(|(name, _)| **name == *key));
    Ok(Value::Bool(found.unwrap_or(false)))
  });
  sandbox.define_method(&prototype, "set", 2, |sandbox, this, args| {
    let obj = this_params(sandbox, this)?;
    let key = sandbox.to_string(&arg(args, 0))?.to_string();
    let value = sandbox.to_string(&arg(args, 1))?.to_string();
    with_pairs(&obj, |pairs| {
      match pairs.iter().position(|(name, _)| *name == key) {
        Some(first) => {
          pairs[first].1 = value;
          let mut index = 0;
          pairs.retain(|(name, _)| {
            index += 1;
            index - 1 == first || *name != key
          });
        }
        None => pairs.push((key, value)),
      }
    });
    Ok(Value::Undefined)
  });
  sandbox.define_method(&prototype, "sort", 0, |sandbox, this, _| {
    let obj = this_params(sandbox, this)?;
    with_pairs(&obj, |pairs| {
      pairs.sort_by(|(a, _), (b, _)| a.encode_utf16().cmp(b.encode_utf16()))
    });
    Ok(Value::Undefined)
  });
  sandbox.define_method(&prototype, "toString", 0, |sandbox, this, _| {
    let obj = this_params(sandbox, this)?;
    let text = with_pairs(&obj, |pairs| serialize(pairs)).unwrap_or_default();
    Ok(Value::from(text))
  });
  sandbox.define_getter(&prototype, "size", |sandbox, this, _| {
    let obj = this_params(sandbox, this)?;
    Ok(Value::from(with_pairs(&obj, |pairs| pairs.len()).unwrap_or_default()))
  });
  sandbox.define_method(&prototype, "forEach", 1, |sandbox, this, args| {
    let obj = this_params(sandbox, this)?;
    let callback = sandbox.callback_arg(args, 0)?;
    let pairs = with_pairs(&obj, |pairs| pairs.clone()).unwrap_or_default();
    for (key, value) in pairs {
      sandbox.call_function(
        &callback,
        arg(args, 1),
        &[Value::from(value), Value::from(key), this.clone()],
      )?;
    }
    Ok(Value::Undefined)
  });
  for name in ["keys", "values", "entries"] {
    sandbox.define_method(&prototype, name, 0, move |sandbox, this, _| {
      let obj = this_params(sandbox, this)?;
      let pairs = with_pairs(&obj, |pairs| pairs.clone()).unwrap_or_default();
      let items = pairs
        .into_iter()
        .map(|(key, value)| match name {
          "keys" => Value::from(key),
          "values" => Value::from(value),
          _ => sandbox.new_array(vec![Value::from(key), Value::from(value)]),
        })
        .collect();
      Ok(sandbox.new_array(items))
    });
  }
}

/// Pairs from a query string, a record object or an iterable of pairs
fn initial_pairs(sandbox: &mut Sandbox, init: &Value) -> Result<Vec<(String, String)>, Throw> {
  match init {
    Value::Undefined | Value::Null => Ok(vec![]),
    Value::Object(obj) => {
      let iterable = matches!(
        obj.borrow().kind,
        ObjectKind::Array(..) | ObjectKind::Map(..) | ObjectKind::SearchParams(..)
      );
      let mut pairs = Vec::new();
      if iterable {
        for entry in sandbox.iterate(init)? {
          let Some(pair) = sandbox.array_values(&entry).filter(|pair| pair.len() == 2) else {
            return Err(sandbox.type_error("Each query pair must be an iterable [name, value] tuple"));
          };
          let key = sandbox.to_string(&pair[0])?.to_string();
          let value = sandbox.to_string(&pair[1])?.to_string();
          pairs.push((key, value));
        }
      } else {
        for key in Sandbox::own_keys(obj, true) {
          let value = sandbox.get_property(init, &key)?;
          pairs.push((key.to_string(), sandbox.to_string(&value)?.to_string()));
        }
      }
      Ok(pairs)
    }
    other => {
      let text = sandbox.to_string(other)?;
      Ok(
        form_urlencoded::parse(text.trim_start_matches('?').as_bytes())
          .map(|(key, value)| (key.into_owned(), value.into_owned()))
          .collect(),
      )
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_serialize_encodes_pairs() {
    let pairs = vec![("a b".to_string(), "1&2".to_string()), ("c".into(), "".into())];
    assert_eq!(serialize(&pairs), "a+b=1%262&c=");
  }
}
