use std::collections::HashSet;

use linaria_sandbox::{Sandbox, Value};

use crate::context::EvaluationContext;
use crate::error::{ErrorKind, EvaluationError};
use crate::evaluate::EvaluatedValue;

/// Fail unless `value` can be inserted into CSS.
///
/// Strings, finite numbers, styled components, objects with a `cls` class
/// name and non-empty serializable objects are accepted, functions too when
/// `allow_fn` is set. `source` is the code of the expression, used in the
/// suggestion of the error. The queued errors of `ctx` are appended to the
/// stack and flushed.
pub fn throw_if_invalid(
  ctx: &mut EvaluationContext,
  value: &EvaluatedValue,
  source: &str,
  allow_fn: bool,
  circular_hint: bool,
) -> Result<(), EvaluationError> {
  let mut error = match value {
    EvaluatedValue::Value(value) => {
      let sandbox = ctx.sandbox();
      if is_valid(sandbox, value) || (allow_fn && value.is_callable()) {
        return Ok(());
      }
      invalid_value_error(sandbox, value, source, circular_hint)
    }
    EvaluatedValue::Error(cause) => {
      let message = format!(
        "Linaria: An error occurred when evaluating the expression: {}.\nMake sure you are not using a browser or Node specific API.",
        cause.message
      );
      EvaluationError {
        kind: ErrorKind::Validation,
        stack: Some(match &cause.frame {
          Some(frame) => format!("{message}\n{frame}"),
          None => message.clone(),
        }),
        message,
        filename: cause.filename.clone(),
        frame: cause.frame.clone(),
      }
    }
  };

  let queued = ctx.print_error_queue();
  let stack = error.stack.take().unwrap_or_else(|| error.message.clone());
  error.stack = Some(format!("{stack}{queued}"));
  Err(error)
}

fn invalid_value_error(
  sandbox: &mut Sandbox,
  value: &Value,
  source: &str,
  circular_hint: bool,
) -> EvaluationError {
  let stringified = match value {
    Value::Object(_) if !value.is_callable() => match sandbox.value_to_json(value) {
      Ok(Some(json)) => json.to_string(),
      Ok(None) => "undefined".to_string(),
      Err(_) => sandbox
        .to_display_string(value)
        .unwrap_or_else(|_| "[object Object]".into()),
    },
    _ => sandbox
      .to_display_string(value)
      .unwrap_or_else(|_| value.type_of().to_string()),
  };

  let hint = if circular_hint && value.is_undefined() {
    "This is likely the result of using a circular import.\n"
  } else {
    ""
  };
  let message = format!(
    "\nLinaria: The expression evaluated to '{stringified}', which is probably a mistake.\n{hint}If you want it to be inserted into CSS, explicitly cast or transform the value to a string, e.g. - 'String({source})'."
  );
  EvaluationError::new(ErrorKind::Validation, message)
}

fn is_valid(sandbox: &mut Sandbox, value: &Value) -> bool {
  match value {
    Value::String(_) => true,
    Value::Number(number) => number.is_finite(),
    Value::Object(_) => {
      is_styled(sandbox, value)
        || matches!(sandbox.get(value, "cls"), Ok(Value::String(_)))
        || (!sandbox.keys(value).is_empty() && is_serializable(sandbox, value, &mut HashSet::new()))
    }
    _ => false,
  }
}

/// Components created by `styled` carry a `__linaria` property
fn is_styled(sandbox: &mut Sandbox, value: &Value) -> bool {
  sandbox
    .get(value, "__linaria")
    .is_ok_and(|linaria| linaria.truthy())
}

/// Primitives, arrays and plain objects made of serializable values
fn is_serializable(sandbox: &mut Sandbox, value: &Value, seen: &mut HashSet<usize>) -> bool {
  let Value::Object(obj) = value else {
    return !value.is_undefined();
  };
  if obj.is_callable() || obj.is_error() || !seen.insert(obj.id()) {
    return false;
  }

  let children = match sandbox.array_values(value) {
    Some(items) => items,
    None => {
      let keys = sandbox.keys(value);
      let mut values = Vec::with_capacity(keys.len());
      for key in keys {
        match sandbox.get(value, &key) {
          Ok(child) => values.push(child),
          Err(_) => return false,
        }
      }
      values
    }
  };
  let serializable = children
    .iter()
    .all(|child| is_serializable(sandbox, child, seen));
  seen.remove(&obj.id());
  serializable
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use linaria_filesystem::in_memory_file_system::InMemoryFileSystem;
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::options::EvaluatorOptions;

  fn context() -> EvaluationContext {
    let options = EvaluatorOptions {
      disable_cache: true,
      ..Default::default()
    };
    EvaluationContext::new(options, Arc::new(InMemoryFileSystem::default())).unwrap()
  }

  fn value_of(ctx: &mut EvaluationContext, code: &str) -> EvaluatedValue {
    let sandbox = ctx.sandbox();
    let func = sandbox.compile_function(code, "/values.js", &[]).unwrap();
    EvaluatedValue::Value(sandbox.call(&func, Value::Undefined, &[]).unwrap())
  }

  fn check(code: &str) -> Result<(), EvaluationError> {
    let mut ctx = context();
    let value = value_of(&mut ctx, code);
    throw_if_invalid(&mut ctx, &value, "x", false, true)
  }

  #[test]
  fn test_accepts_css_values() {
    for code in [
      "return 'red';",
      "return 12;",
      "return { cls: 'a1b2c3' };",
      "return { color: 'red', sizes: [1, 2] };",
      "const c = () => null; c.__linaria = { className: 'x' }; return c;",
    ] {
      assert!(check(code).is_ok(), "{code}");
    }
  }

  #[test]
  fn test_rejects_values_that_are_likely_mistakes() {
    for code in [
      "return undefined;",
      "return null;",
      "return NaN;",
      "return {};",
      "return () => 1;",
      "return { fn() {} };",
    ] {
      assert!(check(code).is_err(), "{code}");
    }
  }

  #[test]
  fn test_functions_when_allowed() {
    let mut ctx = context();
    let value = value_of(&mut ctx, "return () => 1;");
    assert!(throw_if_invalid(&mut ctx, &value, "fn", true, false).is_ok());
  }

  #[test]
  fn test_undefined_message_with_circular_hint() {
    let error = check("return undefined;").unwrap_err();
    assert_eq!(error.kind, ErrorKind::Validation);
    assert_eq!(
      error.message,
      "\nLinaria: The expression evaluated to 'undefined', which is probably a mistake.\nThis is likely the result of using a circular import.\nIf you want it to be inserted into CSS, explicitly cast or transform the value to a string, e.g. - 'String(x)'."
    );
  }

  #[test]
  fn test_objects_are_shown_as_json() {
    let error = check("return { nested: { fn() {} } };").unwrap_err();
    assert!(
      error
        .message
        .contains("evaluated to '{\"nested\":{}}'"),
      "{}",
      error.message
    );
  }

  #[test]
  fn test_captured_errors_and_queue() {
    let mut ctx = context();
    let cause = EvaluationError::new(ErrorKind::Runtime, "window is not defined");
    let error = throw_if_invalid(&mut ctx, &EvaluatedValue::Error(cause), "x", false, false)
      .unwrap_err();

    assert_eq!(
      error.message,
      "Linaria: An error occurred when evaluating the expression: window is not defined.\nMake sure you are not using a browser or Node specific API."
    );
    assert!(error
      .stack
      .unwrap()
      .ends_with("\nErrors encoundered during Preval Evaluation. i.e. Side Effects\n"));
  }
}
