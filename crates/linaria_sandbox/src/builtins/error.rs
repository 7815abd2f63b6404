use crate::builtins::arg;
use crate::error::{ErrorType, Throw};
use crate::object::{ObjRef, ObjectKind, Property};
use crate::sandbox::Sandbox;
use crate::value::Value;

pub(super) fn install(sandbox: &mut Sandbox) {
  let mut base = None;
  for kind in ErrorType::ALL {
    let prototype = sandbox.realm.error_prototypes[kind.index()].clone();
    let ctor = sandbox.define_constructor(
      kind.name(),
      1,
      &prototype,
      move |sandbox, _, args| {
        let proto = sandbox.realm.error_prototypes[kind.index()].clone();
        construct_error(sandbox, kind, args, proto)
      },
      move |sandbox, args, new_target| {
        let proto = sandbox.prototype_from_constructor(new_target)?;
        construct_error(sandbox, kind, args, proto)
      },
    );
    sandbox.define_value(&prototype, "name", Value::from(kind.name()));
    sandbox.define_value(&prototype, "message", Value::from(""));

    match &base {
      None => base = Some(ctor),
      Some(base) => ctor.borrow_mut().proto = Some(base.clone()),
    }
  }

  let Some(base) = base else {
    return;
  };
  let error_prototype = sandbox.realm.error_prototypes[ErrorType::Error.index()].clone();
  sandbox.define_method(&error_prototype, "toString", 0, |sandbox, this, _| {
    if !matches!(this, Value::Object(..)) {
      return Err(sandbox.type_error("Error.prototype.toString called on non-object"));
    }
    let name = sandbox.get_property(this, &"name".into())?;
    let name = if name.is_undefined() {
      "Error".into()
    } else {
      sandbox.to_string(&name)?
    };
    let message = sandbox.get_property(this, &"message".into())?;
    let message = if message.is_undefined() {
      "".into()
    } else {
      sandbox.to_string(&message)?
    };
    Ok(Value::from(match (name.is_empty(), message.is_empty()) {
      (_, true) => name.to_string(),
      (true, false) => message.to_string(),
      (false, false) => format!("{name}: {message}"),
    }))
  });
  sandbox.define_method(&base, "captureStackTrace", 1, |sandbox, _, args| {
    let target = arg(args, 0);
    let Value::Object(obj) = &target else {
      return Err(sandbox.type_error("Invalid argument"));
    };
    let name = sandbox.get_property(&target, &"name".into())?;
    let name = if name.is_undefined() {
      "Error".into()
    } else {
      sandbox.to_string(&name)?
    };
    let message = sandbox.get_property(&target, &"message".into())?;
    let message = if message.is_undefined() {
      "".into()
    } else {
      sandbox.to_string(&message)?
    };
    let stack = sandbox.stack_string(&name, &message);
    obj
      .borrow_mut()
      .properties
      .insert("stack".into(), Property::hidden(stack.into()));
    Ok(Value::Undefined)
  });
  sandbox.define_value(&base, "stackTraceLimit", Value::Number(10.0));
}

fn construct_error(
  sandbox: &mut Sandbox,
  kind: ErrorType,
  args: &[Value],
  proto: ObjRef,
) -> Result<Value, Throw> {
  let message = match arg(args, 0) {
    Value::Undefined => None,
    value => Some(sandbox.to_string(&value)?),
  };

  // `name` may come from a subclass prototype
  let name = {
    let receiver = Value::Object(proto.clone());
    match sandbox.get_from(&proto, &"name".into(), &receiver)? {
      Value::String(name) => name.to_string(),
      _ => kind.name().to_string(),
    }
  };
  let stack = sandbox.stack_string(&name, message.as_deref().unwrap_or(""));

  let error = sandbox.alloc(ObjectKind::Error, Some(proto));
  {
    let mut object = error.borrow_mut();
    object
      .properties
      .insert("stack".into(), Property::hidden(stack.into()));
    if let Some(message) = message {
      object
        .properties
        .insert("message".into(), Property::hidden(Value::String(message)));
    }
  }

  if let Value::Object(options) = arg(args, 1) {
    let receiver = Value::Object(options.clone());
    if sandbox.has_property(&options, &"cause".into()) {
      let cause = sandbox.get_from(&options, &"cause".into(), &receiver)?;
      error
        .borrow_mut()
        .properties
        .insert("cause".into(), Property::hidden(cause));
    }
  }
  Ok(Value::Object(error))
}
