use crate::builtins::arg;
use crate::error::Throw;
use crate::object::{Integrity, ObjRef, ObjectKind};
use crate::sandbox::Sandbox;
use crate::value::Value;

pub(super) fn install(sandbox: &mut Sandbox) {
  let prototype = sandbox.realm.array_prototype.clone();
  let ctor = sandbox.define_constructor(
    "Array",
    1,
    &prototype,
    |sandbox, _, args| array_from_args(sandbox, args),
    |sandbox, args, _| array_from_args(sandbox, args),
  );

  sandbox.define_method(&ctor, "isArray", 1, |_, _, args| {
    Ok(Value::Bool(
      arg(args, 0).as_object().is_some_and(|obj| obj.is_array()),
    ))
  });
  sandbox.define_method(&ctor, "of", 0, |sandbox, _, args| {
    Ok(sandbox.new_array(args.to_vec()))
  });
  sandbox.define_method(&ctor, "from", 1, |sandbox, _, args| {
    let source = arg(args, 0);
    let items = match &source {
      Value::String(..) => sandbox.iterate(&source)?,
      Value::Object(obj) if is_iterable(obj) => sandbox.iterate(&source)?,
      Value::Object(..) => array_like(sandbox, &source)?,
      Value::Undefined | Value::Null => {
        return Err(sandbox.type_error("undefined is not iterable"));
      }
      _ => vec![],
    };
    let map = arg(args, 1);
    if map.is_undefined() {
      return Ok(sandbox.new_array(items));
    }
    let map = sandbox.callback_arg(args, 1)?;
    let this = arg(args, 2);
    let mut mapped = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
      mapped.push(sandbox.call_function(&map, this.clone(), &[item, Value::from(index)])?);
    }
    Ok(sandbox.new_array(mapped))
  });

  install_mutators(sandbox, &prototype);
  install_accessors(sandbox, &prototype);
  install_iteration(sandbox, &prototype);
}

fn array_from_args(sandbox: &mut Sandbox, args: &[Value]) -> Result<Value, Throw> {
  if let [Value::Number(length)] = args {
    if *length < 0.0 || length.fract() != 0.0 || *length >= u32::MAX as f64 {
      return Err(sandbox.range_error("Invalid array length"));
    }
    return Ok(sandbox.new_array(vec![Value::Undefined; *length as usize]));
  }
  Ok(sandbox.new_array(args.to_vec()))
}

fn is_iterable(obj: &ObjRef) -> bool {
  matches!(
    obj.borrow().kind,
    ObjectKind::Array(..)
      | ObjectKind::String(..)
      | ObjectKind::Map(..)
      | ObjectKind::Set(..)
      | ObjectKind::SearchParams(..)
  )
}

/// Elements of an array-like object (`length` plus indices)
fn array_like(sandbox: &mut Sandbox, value: &Value) -> Result<Vec<Value>, Throw> {
  let length = sandbox.get_property(value, &"length".into())?;
  let length = sandbox.to_integer(&length)?.max(0.0) as usize;
  let mut items = Vec::with_capacity(length);
  for index in 0..length {
    items.push(sandbox.get_property(value, &index.to_string().into())?);
  }
  Ok(items)
}

/// Elements of `this` for the non-mutating methods
fn this_items(sandbox: &mut Sandbox, this: &Value) -> Result<Vec<Value>, Throw> {
  if let Value::Object(obj) = this {
    if let ObjectKind::Array(items) = &obj.borrow().kind {
      return Ok(items.clone());
    }
  }
  if this.is_nullish() {
    return Err(sandbox.type_error("Array.prototype method called on null or undefined"));
  }
  array_like(sandbox, this)
}

/// The array behind `this` for the mutating methods
fn this_array(sandbox: &mut Sandbox, this: &Value, grows: bool) -> Result<ObjRef, Throw> {
  let Some(obj) = this.as_object().filter(|obj| obj.is_array()) else {
    return Err(sandbox.type_error("Array.prototype method called on incompatible receiver"));
  };
  let (integrity, extensible) = {
    let object = obj.borrow();
    (object.integrity, object.extensible)
  };
  if integrity == Integrity::Frozen {
    return Err(sandbox.type_error(
      "Cannot assign to read only property '0' of object '[object Array]'",
    ));
  }
  if grows && (!extensible || integrity == Integrity::Sealed) {
    let length = items_len(obj);
    return Err(sandbox.type_error(format!(
      "Cannot add property {length}, object is not extensible"
    )));
  }
  Ok(obj.clone())
}

fn items_len(obj: &ObjRef) -> usize {
  match &obj.borrow().kind {
    ObjectKind::Array(items) => items.len(),
    _ => 0,
  }
}

fn with_items<R>(obj: &ObjRef, f: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
  match &mut obj.borrow_mut().kind {
    ObjectKind::Array(items) => Some(f(items)),
    _ => None,
  }
}

/// Clamp a relative index argument into `0..=len`
fn relative_index(sandbox: &mut Sandbox, value: &Value, len: usize, default: usize) -> Result<usize, Throw> {
  if value.is_undefined() {
    return Ok(default);
  }
  let n = sandbox.to_integer(value)?;
  let len = len as f64;
  Ok(if n < 0.0 { (len + n).max(0.0) } else { n.min(len) } as usize)
}

fn install_mutators(sandbox: &mut Sandbox, prototype: &ObjRef) {
  sandbox.define_method(prototype, "push", 1, |sandbox, this, args| {
    let obj = this_array(sandbox, this, !args.is_empty())?;
    let length = with_items(&obj, |items| {
      items.extend_from_slice(args);
      items.len()
    });
    Ok(Value::from(length.unwrap_or_default()))
  });
  sandbox.define_method(prototype, "pop", 0, |sandbox, this, _| {
    let obj = this_array(sandbox, this, false)?;
    Ok(with_items(&obj, |items| items.pop()).flatten().unwrap_or_default())
  });
  sandbox.define_method(prototype, "shift", 0, |sandbox, this, _| {
    let obj = this_array(sandbox, this, false)?;
    Ok(
      with_items(&obj, |items| (!items.is_empty()).then(|| items.remove(0)))
        .flatten()
        .unwrap_or_default(),
    )
  });
  sandbox.define_method(prototype, "unshift", 1, |sandbox, this, args| {
    let obj = this_array(sandbox, this, !args.is_empty())?;
    let length = with_items(&obj, |items| {
      items.splice(0..0, args.iter().cloned());
      items.len()
    });
    Ok(Value::from(length.unwrap_or_default()))
  });
  sandbox.define_method(prototype, "splice", 2, |sandbox, this, args| {
    let obj = this_array(sandbox, this, args.len() > 2)?;
    let len = items_len(&obj);
    let start = relative_index(sandbox, &arg(args, 0), len, 0)?;
    let delete = match args.len() {
      0 => 0,
      1 => len - start,
      _ => {
        let count = sandbox.to_integer(&args[1])?;
        (count.max(0.0) as usize).min(len - start)
      }
    };
    let inserted = args.get(2..).unwrap_or_default().to_vec();
    let removed = with_items(&obj, |items| {
      items.splice(start..start + delete, inserted).collect::<Vec<_>>()
    });
    Ok(sandbox.new_array(removed.unwrap_or_default()))
  });
  sandbox.define_method(prototype, "reverse", 0, |sandbox, this, _| {
    let obj = this_array(sandbox, this, false)?;
    with_items(&obj, |items| items.reverse());
    Ok(this.clone())
  });
  sandbox.define_method(prototype, "fill", 1, |sandbox, this, args| {
    let obj = this_array(sandbox, this, false)?;
    let len = items_len(&obj);
    let start = relative_index(sandbox, &arg(args, 1), len, 0)?;
    let end = relative_index(sandbox, &arg(args, 2), len, len)?;
    let value = arg(args, 0);
    with_items(&obj, |items| {
      for item in items.iter_mut().take(end).skip(start) {
        *item = value.clone();
      }
    });
    Ok(this.clone())
  });
  sandbox.define_method(prototype, "sort", 1, |sandbox, this, args| {
    let obj = this_array(sandbox, this, false)?;
    let compare = arg(args, 0);
    if !compare.is_undefined() && !compare.is_callable() {
      return Err(sandbox.type_error(
        "The comparison function must be either a function or undefined",
      ));
    }
    let items = this_items(sandbox, this)?;
    let (mut defined, undefined): (Vec<Value>, Vec<Value>) =
      items.into_iter().partition(|item| !item.is_undefined());
    defined = merge_sort(sandbox, defined, &compare)?;
    defined.extend(undefined);
    with_items(&obj, |items| *items = defined);
    Ok(this.clone())
  });
}

fn merge_sort(sandbox: &mut Sandbox, items: Vec<Value>, compare: &Value) -> Result<Vec<Value>, Throw> {
  if items.len() <= 1 {
    return Ok(items);
  }
  let mut left = items;
  let right = left.split_off(left.len() / 2);
  let left = merge_sort(sandbox, left, compare)?;
  let right = merge_sort(sandbox, right, compare)?;

  let mut merged = Vec::with_capacity(left.len() + right.len());
  let mut left = left.into_iter().peekable();
  let mut right = right.into_iter().peekable();
  while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
    let take_right = if compare.is_undefined() {
      let a = sandbox.to_string(a)?;
      let b = sandbox.to_string(b)?;
      // UTF-16 code unit order
      b.encode_utf16().lt(a.encode_utf16())
    } else {
      let order = sandbox.call_function(compare, Value::Undefined, &[a.clone(), b.clone()])?;
      sandbox.to_number(&order)? > 0.0
    };
    let next = if take_right { right.next() } else { left.next() };
    merged.extend(next);
  }
  merged.extend(left);
  merged.extend(right);
  Ok(merged)
}

fn install_accessors(sandbox: &mut Sandbox, prototype: &ObjRef) {
  sandbox.define_method(prototype, "slice", 2, |sandbox, this, args| {
    let items = this_items(sandbox, this)?;
    let start = relative_index(sandbox, &arg(args, 0), items.len(), 0)?;
    let end = relative_index(sandbox, &arg(args, 1), items.len(), items.len())?;
    let slice = items.get(start..end.max(start)).unwrap_or_default().to_vec();
    Ok(sandbox.new_array(slice))
  });
  sandbox.define_method(prototype, "concat", 1, |sandbox, this, args| {
    let mut items = this_items(sandbox, this)?;
    for value in args {
      match value.as_object().filter(|obj| obj.is_array()) {
        Some(obj) => items.extend(with_items(obj, |other| other.clone()).unwrap_or_default()),
        None => items.push(value.clone()),
      }
    }
    Ok(sandbox.new_array(items))
  });
  sandbox.define_method(prototype, "join", 1, |sandbox, this, args| {
    let separator = match arg(args, 0) {
      Value::Undefined => ",".into(),
      value => sandbox.to_string(&value)?,
    };
    join(sandbox, this, &separator)
  });
  sandbox.define_method(prototype, "toString", 0, |sandbox, this, _| join(sandbox, this, ","));
  sandbox.define_method(prototype, "indexOf", 1, |sandbox, this, args| {
    let items = this_items(sandbox, this)?;
    let from = relative_index(sandbox, &arg(args, 1), items.len(), 0)?;
    let needle = arg(args, 0);
    Ok(Value::Number(
      items
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, item)| item.strict_equals(&needle))
        .map(|(index, _)| index as f64)
        .unwrap_or(-1.0),
    ))
  });
  sandbox.define_method(prototype, "lastIndexOf", 1, |sandbox, this, args| {
    let items = this_items(sandbox, this)?;
    let needle = arg(args, 0);
    Ok(Value::Number(
      items
        .iter()
        .rposition(|item| item.strict_equals(&needle))
        .map(|index| index as f64)
        .unwrap_or(-1.0),
    ))
  });
  sandbox.define_method(prototype, "includes", 1, |sandbox, this, args| {
    let items = this_items(sandbox, this)?;
    let from = relative_index(sandbox, &arg(args, 1), items.len(), 0)?;
    let needle = arg(args, 0);
    Ok(Value::Bool(
      items.iter().skip(from).any(|item| item.same_value_zero(&needle)),
    ))
  });
  sandbox.define_method(prototype, "at", 1, |sandbox, this, args| {
    let items = this_items(sandbox, this)?;
    let index = sandbox.to_integer(&arg(args, 0))?;
    let index = if index < 0.0 {
      items.len() as f64 + index
    } else {
      index
    };
    if index < 0.0 {
      return Ok(Value::Undefined);
    }
    Ok(items.get(index as usize).cloned().unwrap_or_default())
  });
  sandbox.define_method(prototype, "flat", 0, |sandbox, this, args| {
    let depth = match arg(args, 0) {
      Value::Undefined => 1.0,
      value => sandbox.to_integer(&value)?,
    };
    let items = this_items(sandbox, this)?;
    Ok(sandbox.new_array(flatten(items, depth)))
  });
  sandbox.define_method(prototype, "keys", 0, |sandbox, this, _| {
    let items = this_items(sandbox, this)?;
    let keys = (0..items.len()).map(Value::from).collect();
    Ok(sandbox.new_array(keys))
  });
  sandbox.define_method(prototype, "values", 0, |sandbox, this, _| {
    let items = this_items(sandbox, this)?;
    Ok(sandbox.new_array(items))
  });
  sandbox.define_method(prototype, "entries", 0, |sandbox, this, _| {
    let items = this_items(sandbox, this)?;
    let entries = items
      .into_iter()
      .enumerate()
      .map(|(index, item)| sandbox.new_array(vec![Value::from(index), item]))
      .collect();
    Ok(sandbox.new_array(entries))
  });
}

fn flatten(items: Vec<Value>, depth: f64) -> Vec<Value> {
  let mut result = Vec::new();
  for item in items {
    let nested = match &item {
      Value::Object(obj) if depth >= 1.0 => with_items(obj, |items| items.clone()),
      _ => None,
    };
    match nested {
      Some(nested) => result.extend(flatten(nested, depth - 1.0)),
      None => result.push(item),
    }
  }
  result
}

fn join(sandbox: &mut Sandbox, this: &Value, separator: &str) -> Result<Value, Throw> {
  let id = this.as_object().map(|obj| obj.id());
  if let Some(id) = id {
    if sandbox.join_stack.contains(&id) {
      return Ok(Value::from(""));
    }
    sandbox.join_stack.push(id);
  }
  let result = join_items(sandbox, this, separator);
  if id.is_some() {
    sandbox.join_stack.pop();
  }
  result
}

fn join_items(sandbox: &mut Sandbox, this: &Value, separator: &str) -> Result<Value, Throw> {
  let items = this_items(sandbox, this)?;
  let mut parts = Vec::with_capacity(items.len());
  for item in &items {
    parts.push(match item {
      Value::Undefined | Value::Null => String::new(),
      item => sandbox.to_string(item)?.to_string(),
    });
  }
  Ok(Value::from(parts.join(separator)))
}

fn install_iteration(sandbox: &mut Sandbox, prototype: &ObjRef) {
  sandbox.define_method(prototype, "forEach", 1, |sandbox, this, args| {
    for_each_item(sandbox, this, args, |_, _, _| Ok(true))?;
    Ok(Value::Undefined)
  });
  sandbox.define_method(prototype, "map", 1, |sandbox, this, args| {
    let mut mapped = Vec::new();
    for_each_item(sandbox, this, args, |_, _, result| {
      mapped.push(result);
      Ok(true)
    })?;
    Ok(sandbox.new_array(mapped))
  });
  sandbox.define_method(prototype, "filter", 1, |sandbox, this, args| {
    let mut kept = Vec::new();
    for_each_item(sandbox, this, args, |_, item, result| {
      if result.truthy() {
        kept.push(item);
      }
      Ok(true)
    })?;
    Ok(sandbox.new_array(kept))
  });
  sandbox.define_method(prototype, "some", 1, |sandbox, this, args| {
    let mut found = false;
    for_each_item(sandbox, this, args, |_, _, result| {
      found = result.truthy();
      Ok(!found)
    })?;
    Ok(Value::Bool(found))
  });
  sandbox.define_method(prototype, "every", 1, |sandbox, this, args| {
    let mut all = true;
    for_each_item(sandbox, this, args, |_, _, result| {
      all = result.truthy();
      Ok(all)
    })?;
    Ok(Value::Bool(all))
  });
  sandbox.define_method(prototype, "find", 1, |sandbox, this, args| {
    let mut found = Value::Undefined;
    for_each_item(sandbox, this, args, |_, item, result| {
      if result.truthy() {
        found = item;
        return Ok(false);
      }
      Ok(true)
    })?;
    Ok(found)
  });
  sandbox.define_method(prototype, "findIndex", 1, |sandbox, this, args| {
    let mut found = -1.0;
    for_each_item(sandbox, this, args, |index, _, result| {
      if result.truthy() {
        found = index as f64;
        return Ok(false);
      }
      Ok(true)
    })?;
    Ok(Value::Number(found))
  });
  sandbox.define_method(prototype, "findLast", 1, |sandbox, this, args| {
    let callback = sandbox.callback_arg(args, 0)?;
    let items = this_items(sandbox, this)?;
    for (index, item) in items.into_iter().enumerate().rev() {
      let result = sandbox.call_function(
        &callback,
        arg(args, 1),
        &[item.clone(), Value::from(index), this.clone()],
      )?;
      if result.truthy() {
        return Ok(item);
      }
    }
    Ok(Value::Undefined)
  });
  sandbox.define_method(prototype, "findLastIndex", 1, |sandbox, this, args| {
    let callback = sandbox.callback_arg(args, 0)?;
    let items = this_items(sandbox, this)?;
    for (index, item) in items.into_iter().enumerate().rev() {
      let result =
        sandbox.call_function(&callback, arg(args, 1), &[item, Value::from(index), this.clone()])?;
      if result.truthy() {
        return Ok(Value::from(index));
      }
    }
    Ok(Value::Number(-1.0))
  });
  sandbox.define_method(prototype, "flatMap", 1, |sandbox, this, args| {
    let mut mapped = Vec::new();
    for_each_item(sandbox, this, args, |_, _, result| {
      mapped.push(result);
      Ok(true)
    })?;
    Ok(sandbox.new_array(flatten(mapped, 1.0)))
  });
  sandbox.define_method(prototype, "reduce", 1, |sandbox, this, args| {
    let callback = sandbox.callback_arg(args, 0)?;
    let items = this_items(sandbox, this)?;
    reduce(sandbox, this, &callback, args, items.into_iter().enumerate().collect())
  });
  sandbox.define_method(prototype, "reduceRight", 1, |sandbox, this, args| {
    let callback = sandbox.callback_arg(args, 0)?;
    let items = this_items(sandbox, this)?;
    reduce(sandbox, this, &callback, args, items.into_iter().enumerate().rev().collect())
  });
}

/// Call the callback argument for each element. `visit` receives the index,
/// the element and the callback result, and returns whether to continue.
fn for_each_item(
  sandbox: &mut Sandbox,
  this: &Value,
  args: &[Value],
  mut visit: impl FnMut(usize, Value, Value) -> Result<bool, Throw>,
) -> Result<(), Throw> {
  let callback = sandbox.callback_arg(args, 0)?;
  let receiver = arg(args, 1);
  let items = this_items(sandbox, this)?;
  for (index, item) in items.into_iter().enumerate() {
    let result = sandbox.call_function(
      &callback,
      receiver.clone(),
      &[item.clone(), Value::from(index), this.clone()],
    )?;
    if !visit(index, item, result)? {
      break;
    }
  }
  Ok(())
}

fn reduce(
  sandbox: &mut Sandbox,
  this: &Value,
  callback: &Value,
  args: &[Value],
  items: Vec<(usize, Value)>,
) -> Result<Value, Throw> {
  let mut items = items.into_iter();
  let mut accumulator = if args.len() > 1 {
    args[1].clone()
  } else {
    match items.next() {
      Some((_, first)) => first,
      None => return Err(sandbox.type_error("Reduce of empty array with no initial value")),
    }
  };
  for (index, item) in items {
    accumulator = sandbox.call_function(
      callback,
      Value::Undefined,
      &[accumulator, item, Value::from(index), this.clone()],
    )?;
  }
  Ok(accumulator)
}
