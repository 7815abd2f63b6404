use crate::builtins::arg;
use crate::error::Throw;
use crate::object::{Integrity, ObjRef, ObjectKind, Property, PropertyKey, Slot};
use crate::sandbox::Sandbox;
use crate::value::Value;

pub(super) fn install(sandbox: &mut Sandbox) {
  let prototype = sandbox.realm.object_prototype.clone();
  let ctor = sandbox.define_constructor(
    "Object",
    1,
    &prototype,
    |sandbox, _, args| object_from(sandbox, &arg(args, 0)),
    |sandbox, args, _| object_from(sandbox, &arg(args, 0)),
  );

  sandbox.define_method(&ctor, "keys", 1, |sandbox, _, args| {
    let obj = sandbox.to_object(&arg(args, 0))?;
    let keys = Sandbox::own_keys(&obj, true)
      .into_iter()
      .map(|key| Value::from(&*key))
      .collect();
    Ok(sandbox.new_array(keys))
  });
  sandbox.define_method(&ctor, "values", 1, |sandbox, _, args| {
    let target = arg(args, 0);
    let obj = sandbox.to_object(&target)?;
    let mut values = Vec::new();
    for key in Sandbox::own_keys(&obj, true) {
      values.push(sandbox.get_from(&obj, &key, &target)?);
    }
    Ok(sandbox.new_array(values))
  });
  sandbox.define_method(&ctor, "entries", 1, |sandbox, _, args| {
    let target = arg(args, 0);
    let obj = sandbox.to_object(&target)?;
    let mut entries = Vec::new();
    for key in Sandbox::own_keys(&obj, true) {
      let value = sandbox.get_from(&obj, &key, &target)?;
      entries.push(sandbox.new_array(vec![Value::from(&*key), value]));
    }
    Ok(sandbox.new_array(entries))
  });
  sandbox.define_method(&ctor, "fromEntries", 1, |sandbox, _, args| {
    let entries = sandbox.iterate(&arg(args, 0))?;
    let target = sandbox.new_object();
    for entry in entries {
      let key = sandbox.get_property(&entry, &"0".into())?;
      let value = sandbox.get_property(&entry, &"1".into())?;
      let key = sandbox.to_property_key(&key)?;
      sandbox.set_property(&target, key, value)?;
    }
    Ok(target)
  });
  sandbox.define_method(&ctor, "assign", 2, |sandbox, _, args| {
    let target = Value::Object(sandbox.to_object(&arg(args, 0))?);
    for source in args.iter().skip(1) {
      sandbox.copy_data_properties(&target, source, false)?;
    }
    Ok(target)
  });

  sandbox.define_method(&ctor, "freeze", 1, |_, _, args| {
    let target = arg(args, 0);
    if let Value::Object(obj) = &target {
      Sandbox::set_integrity(obj, Integrity::Frozen);
    }
    Ok(target)
  });
  sandbox.define_method(&ctor, "isFrozen", 1, |_, _, args| {
    Ok(Value::Bool(match &arg(args, 0) {
      Value::Object(obj) => Sandbox::test_integrity(obj, Integrity::Frozen),
      _ => true,
    }))
  });
  sandbox.define_method(&ctor, "seal", 1, |_, _, args| {
    let target = arg(args, 0);
    if let Value::Object(obj) = &target {
      Sandbox::set_integrity(obj, Integrity::Sealed);
    }
    Ok(target)
  });
  sandbox.define_method(&ctor, "isSealed", 1, |_, _, args| {
    Ok(Value::Bool(match &arg(args, 0) {
      Value::Object(obj) => Sandbox::test_integrity(obj, Integrity::Sealed),
      _ => true,
    }))
  });
  sandbox.define_method(&ctor, "preventExtensions", 1, |_, _, args| {
    let target = arg(args, 0);
    if let Value::Object(obj) = &target {
      obj.borrow_mut().extensible = false;
    }
    Ok(target)
  });
  sandbox.define_method(&ctor, "isExtensible", 1, |_, _, args| {
    Ok(Value::Bool(match &arg(args, 0) {
      Value::Object(obj) => obj.borrow().extensible,
      _ => false,
    }))
  });

  sandbox.define_method(&ctor, "create", 2, |sandbox, _, args| {
    let proto = match arg(args, 0) {
      Value::Object(proto) => Some(proto),
      Value::Null => None,
      other => {
        let text = sandbox.describe_value(&other);
        return Err(sandbox.type_error(format!(
          "Object prototype may only be an Object or null: {text}"
        )));
      }
    };
    let obj = sandbox.alloc(ObjectKind::Ordinary, proto);
    if let Value::Object(properties) = arg(args, 1) {
      define_properties(sandbox, &obj, &properties)?;
    }
    Ok(Value::Object(obj))
  });
  sandbox.define_method(&ctor, "getPrototypeOf", 1, |sandbox, _, args| {
    let obj = sandbox.to_object(&arg(args, 0))?;
    Ok(obj.prototype().map(Value::Object).unwrap_or(Value::Null))
  });
  sandbox.define_method(&ctor, "setPrototypeOf", 2, |sandbox, _, args| {
    let target = arg(args, 0);
    let proto = match arg(args, 1) {
      Value::Object(proto) => Some(proto),
      Value::Null => None,
      _ => return Err(sandbox.type_error("Object prototype may only be an Object or null")),
    };
    if let Value::Object(obj) = &target {
      let mut current = proto.clone();
      while let Some(ancestor) = current {
        if ancestor.ptr_eq(obj) {
          return Err(sandbox.type_error("Cyclic __proto__ value"));
        }
        current = ancestor.prototype();
      }
      if !obj.borrow().extensible {
        return Err(sandbox.type_error("#<Object> is not extensible"));
      }
      obj.borrow_mut().proto = proto;
    }
    Ok(target)
  });

  sandbox.define_method(&ctor, "defineProperty", 3, |sandbox, _, args| {
    let target = arg(args, 0);
    let Value::Object(obj) = &target else {
      return Err(sandbox.type_error("Object.defineProperty called on non-object"));
    };
    let key = sandbox.to_property_key(&arg(args, 1))?;
    let descriptor = arg(args, 2);
    define_from_descriptor(sandbox, obj, key, &descriptor)?;
    Ok(target)
  });
  sandbox.define_method(&ctor, "defineProperties", 2, |sandbox, _, args| {
    let target = arg(args, 0);
    let Value::Object(obj) = &target else {
      return Err(sandbox.type_error("Object.defineProperties called on non-object"));
    };
    let properties = sandbox.to_object(&arg(args, 1))?;
    define_properties(sandbox, obj, &properties)?;
    Ok(target)
  });
  sandbox.define_method(&ctor, "getOwnPropertyNames", 1, |sandbox, _, args| {
    let obj = sandbox.to_object(&arg(args, 0))?;
    let keys = Sandbox::own_keys(&obj, false)
      .into_iter()
      .map(|key| Value::from(&*key))
      .collect();
    Ok(sandbox.new_array(keys))
  });
  sandbox.define_method(&ctor, "getOwnPropertyDescriptor", 2, |sandbox, _, args| {
    let obj = sandbox.to_object(&arg(args, 0))?;
    let key = sandbox.to_property_key(&arg(args, 1))?;
    match Sandbox::own_property(&obj, &key) {
      Some(property) => Ok(descriptor_object(sandbox, &property)),
      None => Ok(Value::Undefined),
    }
  });
  sandbox.define_method(&ctor, "getOwnPropertyDescriptors", 1, |sandbox, _, args| {
    let obj = sandbox.to_object(&arg(args, 0))?;
    let result = sandbox.alloc_object();
    for key in Sandbox::own_keys(&obj, false) {
      if let Some(property) = Sandbox::own_property(&obj, &key) {
        let descriptor = descriptor_object(sandbox, &property);
        result.borrow_mut().properties.insert(key, Property::data(descriptor));
      }
    }
    Ok(Value::Object(result))
  });
  sandbox.define_method(&ctor, "is", 2, |_, _, args| {
    Ok(Value::Bool(arg(args, 0).same_value(&arg(args, 1))))
  });

  sandbox.define_method(&prototype, "hasOwnProperty", 1, |sandbox, this, args| {
    let key = sandbox.to_property_key(&arg(args, 0))?;
    let obj = sandbox.to_object(this)?;
    Ok(Value::Bool(Sandbox::own_property(&obj, &key).is_some()))
  });
  sandbox.define_method(&prototype, "isPrototypeOf", 1, |_, this, args| {
    let target = arg(args, 0);
    let (Value::Object(proto), Value::Object(obj)) = (this, &target) else {
      return Ok(Value::Bool(false));
    };
    let mut current = obj.prototype();
    while let Some(ancestor) = current {
      if ancestor.ptr_eq(proto) {
        return Ok(Value::Bool(true));
      }
      current = ancestor.prototype();
    }
    Ok(Value::Bool(false))
  });
  sandbox.define_method(&prototype, "propertyIsEnumerable", 1, |sandbox, this, args| {
    let key = sandbox.to_property_key(&arg(args, 0))?;
    let obj = sandbox.to_object(this)?;
    Ok(Value::Bool(
      Sandbox::own_property(&obj, &key).is_some_and(|property| property.enumerable),
    ))
  });
  sandbox.define_method(&prototype, "toString", 0, |_, this, _| {
    Ok(Value::from(format!("[object {}]", class_name(this))))
  });
  sandbox.define_method(&prototype, "toLocaleString", 0, |sandbox, this, _| {
    let to_string = sandbox.get_property(this, &"toString".into())?;
    sandbox.call_function(&to_string, this.clone(), &[])
  });
  sandbox.define_method(&prototype, "valueOf", 0, |sandbox, this, _| {
    Ok(Value::Object(sandbox.to_object(this)?))
  });
}

fn object_from(sandbox: &mut Sandbox, value: &Value) -> Result<Value, Throw> {
  if value.is_nullish() {
    return Ok(sandbox.new_object());
  }
  Ok(Value::Object(sandbox.to_object(value)?))
}

/// Tag used by `Object.prototype.toString`
pub(crate) fn class_name(value: &Value) -> &'static str {
  match value {
    Value::Undefined => "Undefined",
    Value::Null => "Null",
    Value::Bool(..) => "Boolean",
    Value::Number(..) => "Number",
    Value::String(..) => "String",
    Value::Object(obj) => match &obj.borrow().kind {
      ObjectKind::Array(..) => "Array",
      ObjectKind::Function(..) => "Function",
      ObjectKind::Error => "Error",
      ObjectKind::Boolean(..) => "Boolean",
      ObjectKind::Number(..) => "Number",
      ObjectKind::String(..) => "String",
      ObjectKind::RegExp(..) => "RegExp",
      ObjectKind::Map(..) => "Map",
      ObjectKind::Set(..) => "Set",
      ObjectKind::SearchParams(..) => "URLSearchParams",
      ObjectKind::Url(..) => "URL",
      ObjectKind::Ordinary => "Object",
    },
  }
}

fn descriptor_object(sandbox: &mut Sandbox, property: &Property) -> Value {
  let descriptor = sandbox.alloc_object();
  {
    let mut object = descriptor.borrow_mut();
    match &property.slot {
      Slot::Data { value, writable } => {
        object.properties.insert("value".into(), Property::data(value.clone()));
        object
          .properties
          .insert("writable".into(), Property::data(Value::Bool(*writable)));
      }
      Slot::Accessor { get, set } => {
        object.properties.insert(
          "get".into(),
          Property::data(get.clone().unwrap_or_default()),
        );
        object.properties.insert(
          "set".into(),
          Property::data(set.clone().unwrap_or_default()),
        );
      }
    }
    object
      .properties
      .insert("enumerable".into(), Property::data(Value::Bool(property.enumerable)));
    object.properties.insert(
      "configurable".into(),
      Property::data(Value::Bool(property.configurable)),
    );
  }
  Value::Object(descriptor)
}

fn define_properties(sandbox: &mut Sandbox, obj: &ObjRef, properties: &ObjRef) -> Result<(), Throw> {
  let source = Value::Object(properties.clone());
  for key in Sandbox::own_keys(properties, true) {
    let descriptor = sandbox.get_from(properties, &key, &source)?;
    define_from_descriptor(sandbox, obj, key, &descriptor)?;
  }
  Ok(())
}

/// `Object.defineProperty` with a JS descriptor. Missing fields keep the
/// current attributes of an existing property.
fn define_from_descriptor(
  sandbox: &mut Sandbox,
  obj: &ObjRef,
  key: PropertyKey,
  descriptor: &Value,
) -> Result<(), Throw> {
  let Value::Object(desc) = descriptor else {
    let text = sandbox.describe_value(descriptor);
    return Err(sandbox.type_error(format!("Property description must be an object: {text}")));
  };

  let field = |sandbox: &mut Sandbox, name: &str| -> Result<Option<Value>, Throw> {
    let name = PropertyKey::from(name);
    if sandbox.has_property(desc, &name) {
      Ok(Some(sandbox.get_from(desc, &name, descriptor)?))
    } else {
      Ok(None)
    }
  };
  let value = field(sandbox, "value")?;
  let writable = field(sandbox, "writable")?.map(|v| v.truthy());
  let get = field(sandbox, "get")?;
  let set = field(sandbox, "set")?;
  let enumerable = field(sandbox, "enumerable")?.map(|v| v.truthy());
  let configurable = field(sandbox, "configurable")?.map(|v| v.truthy());

  for accessor in [&get, &set].into_iter().flatten() {
    if !accessor.is_undefined() && !accessor.is_callable() {
      let text = sandbox.describe_value(accessor);
      return Err(sandbox.type_error(format!("Getter must be a function: {text}")));
    }
  }
  if (get.is_some() || set.is_some()) && (value.is_some() || writable.is_some()) {
    return Err(sandbox.type_error(
      "Invalid property descriptor. Cannot both specify accessors and a value or writable attribute",
    ));
  }

  let existing = Sandbox::own_property(obj, &key);
  let enumerable = enumerable
    .or(existing.as_ref().map(|property| property.enumerable))
    .unwrap_or(false);
  let configurable = configurable
    .or(existing.as_ref().map(|property| property.configurable))
    .unwrap_or(false);

  let slot = if get.is_some() || set.is_some() {
    let (old_get, old_set) = match existing.as_ref().map(|property| &property.slot) {
      Some(Slot::Accessor { get, set }) => (get.clone(), set.clone()),
      _ => (None, None),
    };
    Slot::Accessor {
      get: get.filter(|v| !v.is_undefined()).or(old_get),
      set: set.filter(|v| !v.is_undefined()).or(old_set),
    }
  } else {
    let (old_value, old_writable) = match existing.as_ref().map(|property| &property.slot) {
      Some(Slot::Data { value, writable }) => (Some(value.clone()), Some(*writable)),
      _ => (None, None),
    };
    Slot::Data {
      value: value.or(old_value).unwrap_or_default(),
      writable: writable.or(old_writable).unwrap_or(false),
    }
  };

  sandbox.define_own(
    obj,
    key,
    Property {
      slot,
      enumerable,
      configurable,
    },
  )
}
