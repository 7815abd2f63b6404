use indexmap::IndexMap;

use crate::builtins::arg;
use crate::error::Throw;
use crate::object::{MapKey, ObjRef, ObjectKind};
use crate::sandbox::Sandbox;
use crate::value::Value;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Flavor {
  Map,
  Set,
  WeakMap,
  WeakSet,
}

impl Flavor {
  fn name(self) -> &'static str {
    match self {
      Flavor::Map => "Map",
      Flavor::Set => "Set",
      Flavor::WeakMap => "WeakMap",
      Flavor::WeakSet => "WeakSet",
    }
  }

  fn weak(self) -> bool {
    matches!(self, Flavor::WeakMap | Flavor::WeakSet)
  }

  fn keyed(self) -> bool {
    matches!(self, Flavor::Map | Flavor::WeakMap)
  }
}

pub(super) fn install(sandbox: &mut Sandbox) {
  let map_prototype = sandbox.realm.map_prototype.clone();
  let set_prototype = sandbox.realm.set_prototype.clone();
  let weak_map_prototype = sandbox.alloc_object();
  let weak_set_prototype = sandbox.alloc_object();

  for (flavor, prototype) in [
    (Flavor::Map, &map_prototype),
    (Flavor::Set, &set_prototype),
    (Flavor::WeakMap, &weak_map_prototype),
    (Flavor::WeakSet, &weak_set_prototype),
  ] {
    sandbox.define_constructor(
      flavor.name(),
      0,
      prototype,
      move |sandbox, _, _| {
        Err(sandbox.type_error(format!(
          "Constructor {} requires 'new'",
          flavor.name()
        )))
      },
      move |sandbox, args, new_target| construct(sandbox, flavor, args, new_target),
    );
    install_common(sandbox, flavor, prototype);
  }

  install_map(sandbox, &map_prototype, Flavor::Map);
  install_map(sandbox, &weak_map_prototype, Flavor::WeakMap);
  install_set(sandbox, &set_prototype, Flavor::Set);
  install_set(sandbox, &weak_set_prototype, Flavor::WeakSet);
  install_iteration(sandbox, &map_prototype, Flavor::Map);
  install_iteration(sandbox, &set_prototype, Flavor::Set);
}

fn construct(
  sandbox: &mut Sandbox,
  flavor: Flavor,
  args: &[Value],
  new_target: &ObjRef,
) -> Result<Value, Throw> {
  let proto = sandbox.prototype_from_constructor(new_target)?;
  let kind = if flavor.keyed() {
    ObjectKind::Map(IndexMap::new())
  } else {
    ObjectKind::Set(IndexMap::new())
  };
  let obj = sandbox.alloc(kind, Some(proto));

  let source = arg(args, 0);
  if !source.is_nullish() {
    for item in sandbox.iterate(&source)? {
      if flavor.keyed() {
        let Some(pair) = sandbox.array_values(&item) else {
          let shown = sandbox.to_display_string(&item)?;
          return Err(sandbox.type_error(format!(
            "Iterator value {shown} is not an entry object"
          )));
        };
        let key = pair.first().cloned().unwrap_or_default();
        let value = pair.get(1).cloned().unwrap_or_default();
        insert(sandbox, &obj, flavor, key, value)?;
      } else {
        insert(sandbox, &obj, flavor, item.clone(), item)?;
      }
    }
  }
  Ok(Value::Object(obj))
}

/// The collection behind `this`, checking the receiver
fn this_collection(sandbox: &mut Sandbox, this: &Value, flavor: Flavor, method: &str) -> Result<ObjRef, Throw> {
  let matches = this.as_object().is_some_and(|obj| {
    matches!(
      (&obj.borrow().kind, flavor.keyed()),
      (ObjectKind::Map(..), true) | (ObjectKind::Set(..), false)
    )
  });
  match this.as_object() {
    Some(obj) if matches => Ok(obj.clone()),
    _ => Err(sandbox.type_error(format!(
      "Method {}.prototype.{method} called on incompatible receiver",
      flavor.name()
    ))),
  }
}

fn insert(sandbox: &mut Sandbox, obj: &ObjRef, flavor: Flavor, key: Value, value: Value) -> Result<(), Throw> {
  if flavor.weak() && !matches!(key, Value::Object(..)) {
    let noun = if flavor.keyed() { "weak map key" } else { "value in weak set" };
    return Err(sandbox.type_error(format!("Invalid {noun}")));
  }
  // -0 is stored as +0
  let key = match key {
    Value::Number(n) if n == 0.0 => Value::Number(0.0),
    key => key,
  };
  match &mut obj.borrow_mut().kind {
    ObjectKind::Map(entries) => {
      let slot = MapKey::of(&key);
      match entries.get_mut(&slot) {
        Some(entry) => entry.1 = value,
        None => {
          entries.insert(slot, (key, value));
        }
      }
    }
    ObjectKind::Set(entries) => {
      entries.entry(MapKey::of(&key)).or_insert(key);
    }
    _ => {}
  }
  Ok(())
}

fn install_common(sandbox: &mut Sandbox, flavor: Flavor, prototype: &ObjRef) {
  sandbox.define_method(prototype, "has", 1, move |sandbox, this, args| {
    let obj = this_collection(sandbox, this, flavor, "has")?;
    let key = MapKey::of(&arg(args, 0));
    let found = match &obj.borrow().kind {
      ObjectKind::Map(entries) => entries.contains_key(&key),
      ObjectKind::Set(entries) => entries.contains_key(&key),
      _ => false,
    };
    Ok(Value::Bool(found))
  });
  sandbox.define_method(prototype, "delete", 1, move |sandbox, this, args| {
    let obj = this_collection(sandbox, this, flavor, "delete")?;
    let key = MapKey::of(&arg(args, 0));
    let removed = match &mut obj.borrow_mut().kind {
      ObjectKind::Map(entries) => entries.shift_remove(&key).is_some(),
      ObjectKind::Set(entries) => entries.shift_remove(&key).is_some(),
      _ => false,
    };
    Ok(Value::Bool(removed))
  });
  if flavor.weak() {
    return;
  }
  sandbox.define_method(prototype, "clear", 0, move |sandbox, this, _| {
    let obj = this_collection(sandbox, this, flavor, "clear")?;
    match &mut obj.borrow_mut().kind {
      ObjectKind::Map(entries) => entries.clear(),
      ObjectKind::Set(entries) => entries.clear(),
      _ => {}
    }
    Ok(Value::Undefined)
  });
  sandbox.define_getter(prototype, "size", move |sandbox, this, _| {
    let obj = this_collection(sandbox, this, flavor, "size")?;
    let size = match &obj.borrow().kind {
      ObjectKind::Map(entries) => entries.len(),
      ObjectKind::Set(entries) => entries.len(),
      _ => 0,
    };
    Ok(Value::from(size))
  });
}

fn install_map(sandbox: &mut Sandbox, prototype: &ObjRef, flavor: Flavor) {
  sandbox.define_method(prototype, "get", 1, move |sandbox, this, args| {
    let obj = this_collection(sandbox, this, flavor, "get")?;
    let key = MapKey::of(&arg(args, 0));
    let found = match &obj.borrow().kind {
      ObjectKind::Map(entries) => entries.get(&key).map(|(_, value)| value.clone()),
      _ => None,
    };
    Ok(found.unwrap_or_default())
  });
  sandbox.define_method(prototype, "set", 2, move |sandbox, this, args| {
    let obj = this_collection(sandbox, this, flavor, "set")?;
    insert(sandbox, &obj, flavor, arg(args, 0), arg(args, 1))?;
    Ok(this.clone())
  });
}

fn install_set(sandbox: &mut Sandbox, prototype: &ObjRef, flavor: Flavor) {
  sandbox.define_method(prototype, "add", 1, move |sandbox, this, args| {
    let obj = this_collection(sandbox, this, flavor, "add")?;
    let value = arg(args, 0);
    insert(sandbox, &obj, flavor, value.clone(), value)?;
    Ok(this.clone())
  });
}

/// `(key, value)` pairs of a `Map`, or `(value, value)` for a `Set`
fn entries_of(obj: &ObjRef) -> Vec<(Value, Value)> {
  match &obj.borrow().kind {
    ObjectKind::Map(entries) => entries.values().cloned().collect(),
    ObjectKind::Set(entries) => entries.values().map(|value| (value.clone(), value.clone())).collect(),
    _ => vec![],
  }
}

fn install_iteration(sandbox: &mut Sandbox, prototype: &ObjRef, flavor: Flavor) {
  sandbox.define_method(prototype, "forEach", 1, move |sandbox, this, args| {
    let obj = this_collection(sandbox, this, flavor, "forEach")?;
    let callback = sandbox.callback_arg(args, 0)?;
    for (key, value) in entries_of(&obj) {
      sandbox.call_function(&callback, arg(args, 1), &[value, key, this.clone()])?;
    }
    Ok(Value::Undefined)
  });
  sandbox.define_method(prototype, "keys", 0, move |sandbox, this, _| {
    let obj = this_collection(sandbox, this, flavor, "keys")?;
    let keys = entries_of(&obj).into_iter().map(|(key, _)| key).collect();
    Ok(sandbox.new_array(keys))
  });
  sandbox.define_method(prototype, "values", 0, move |sandbox, this, _| {
    let obj = this_collection(sandbox, this, flavor, "values")?;
    let values = entries_of(&obj).into_iter().map(|(_, value)| value).collect();
    Ok(sandbox.new_array(values))
  });
  sandbox.define_method(prototype, "entries", 0, move |sandbox, this, _| {
    let obj = this_collection(sandbox, this, flavor, "entries")?;
    let entries = entries_of(&obj)
      .into_iter()
      .map(|(key, value)| sandbox.new_array(vec![key, value]))
      .collect();
    Ok(sandbox.new_array(entries))
  });
}
