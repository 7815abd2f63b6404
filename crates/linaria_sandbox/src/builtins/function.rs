use swc_core::common::SourceMapper;

use crate::builtins::arg;
use crate::error::ErrorType;
use crate::function::Callable;
use crate::sandbox::Sandbox;
use crate::value::Value;

pub(super) fn install(sandbox: &mut Sandbox) {
  let prototype = sandbox.realm.function_prototype.clone();
  sandbox.define_constructor(
    "Function",
    1,
    &prototype,
    |sandbox, _, _| Err(code_generation_error(sandbox)),
    |sandbox, _, _| Err(code_generation_error(sandbox)),
  );

  sandbox.define_method(&prototype, "call", 1, |sandbox, this, args| {
    let receiver = arg(args, 0);
    sandbox.call_function(this, receiver, args.get(1..).unwrap_or_default())
  });
  sandbox.define_method(&prototype, "apply", 2, |sandbox, this, args| {
    let receiver = arg(args, 0);
    let list = match arg(args, 1) {
      Value::Undefined | Value::Null => vec![],
      Value::Object(obj) => {
        let source = Value::Object(obj.clone());
        let length = sandbox.get_from(&obj, &"length".into(), &source)?;
        let length = sandbox.to_integer(&length)?.max(0.0) as usize;
        let mut list = Vec::with_capacity(length);
        for index in 0..length {
          list.push(sandbox.get_from(&obj, &index.to_string().into(), &source)?);
        }
        list
      }
      _ => return Err(sandbox.type_error("CreateListFromArrayLike called on non-object")),
    };
    sandbox.call_function(this, receiver, &list)
  });
  sandbox.define_method(&prototype, "bind", 1, |sandbox, this, args| {
    if !this.is_callable() {
      return Err(sandbox.type_error("Bind must be called on a function"));
    }
    let bound_this = arg(args, 0);
    let bound_args = args.get(1..).unwrap_or_default().to_vec();
    Ok(sandbox.bound_function(this.clone(), bound_this, bound_args))
  });
  sandbox.define_method(&prototype, "toString", 0, |sandbox, this, _| {
    let Some(callable) = this.as_object().and_then(|obj| obj.callable()) else {
      return Err(sandbox.type_error("Function.prototype.toString requires that 'this' be a Function"));
    };
    let source = match callable {
      Callable::Closure(closure) => sandbox
        .source_map
        .span_to_snippet(closure.code.span)
        .unwrap_or_else(|_| format!("function {}() {{ [native code] }}", closure.code.name)),
      Callable::Native(native) => format!("function {}() {{ [native code] }}", native.name),
      Callable::Bound(..) => "function () { [native code] }".to_string(),
    };
    Ok(Value::from(source))
  });
}

fn code_generation_error(sandbox: &mut Sandbox) -> crate::error::Throw {
  sandbox.throw_error(
    ErrorType::EvalError,
    "Code generation from strings disallowed for this context",
  )
}
