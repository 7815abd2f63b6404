use std::path::{Path, PathBuf};

use linaria_sandbox::Value;
use linaria_shaker::{shake, ExternalDep, ShakeTarget, PREVAL_EXPORT};
use linaria_swc_runner::{emit_module, EmitOutput};
use swc_core::common::sync::Lrc;
use swc_core::common::SourceMap;
use swc_core::ecma::ast::Module;

use crate::context::EvaluationContext;
use crate::error::{ErrorKind, EvaluationError};

/// Code to evaluate as the entry module
pub enum EvaluateSource {
  Code(String),
  /// A parsed module. Code frames of errors point into the file the spans
  /// of `module` come from.
  Program {
    module: Module,
    source_map: Lrc<SourceMap>,
  },
}

pub struct EvaluateOutput {
  /// `module.exports` of the entry module
  pub value: Value,
  /// Files the entry module required
  pub dependencies: Vec<PathBuf>,
}

/// Outcome of one target expression
#[derive(Clone, Debug)]
pub enum EvaluatedValue {
  Value(Value),
  Error(EvaluationError),
}

impl EvaluatedValue {
  pub fn value(&self) -> Option<&Value> {
    match self {
      EvaluatedValue::Value(value) => Some(value),
      EvaluatedValue::Error(_) => None,
    }
  }

  pub fn into_result(self) -> Result<Value, EvaluationError> {
    match self {
      EvaluatedValue::Value(value) => Ok(value),
      EvaluatedValue::Error(error) => Err(error),
    }
  }
}

pub struct ExpressionsOutput {
  /// One entry per target, in order
  pub values: Vec<EvaluatedValue>,
  pub dependencies: Vec<PathBuf>,
  /// Imports and requires that survived shaking
  pub external_deps: Vec<ExternalDep>,
}

/// Run `source` as the module `filename` in the sandbox of `ctx`.
///
/// Errors of the entry module are returned, errors of modules it requires
/// only when they are resolve, require or transform errors. Buffered console
/// output is forwarded to `tracing`.
#[tracing::instrument(level = "debug", skip_all, fields(filename = %filename.display()))]
pub fn evaluate(
  ctx: &mut EvaluationContext,
  source: EvaluateSource,
  filename: &Path,
) -> Result<EvaluateOutput, EvaluationError> {
  let (code, input_map) = match source {
    EvaluateSource::Code(code) => (code, None),
    EvaluateSource::Program { module, source_map } => {
      let EmitOutput { code, map } = emit_module(&module, &source_map, true)
        .map_err(|error| EvaluationError::transform(filename, &anyhow::Error::from(error)))?;
      (code, map)
    }
  };

  let result = ctx.evaluate_module(filename, code, input_map);
  ctx.forward_console();
  let value = result?;

  Ok(EvaluateOutput {
    value,
    dependencies: ctx.dependencies_of(filename),
  })
}

/// Shake `module` down to `targets`, run it and compute every target.
///
/// A target that throws does not stop the others: its failure is returned in
/// its slot as [`EvaluatedValue::Error`].
#[tracing::instrument(level = "debug", skip_all, fields(filename = %filename.display(), targets = targets.len()))]
pub fn evaluate_expressions(
  ctx: &mut EvaluationContext,
  module: &Module,
  source_map: &Lrc<SourceMap>,
  targets: &[ShakeTarget<'_>],
  filename: &Path,
) -> Result<ExpressionsOutput, EvaluationError> {
  let (shaken, external_deps) = shake(module, targets).map_err(|error| {
    EvaluationError::new(ErrorKind::Transform, error.to_string()).with_filename(filename)
  })?;

  let output = evaluate(
    ctx,
    EvaluateSource::Program {
      module: shaken,
      source_map: source_map.clone(),
    },
    filename,
  )?;

  let thunks = match ctx.sandbox().get(&output.value, PREVAL_EXPORT) {
    Ok(preval) => ctx.sandbox().array_values(&preval).unwrap_or_default(),
    Err(throw) => return Err(ctx.runtime_error(filename, &throw)),
  };

  let mut values = Vec::with_capacity(thunks.len());
  for thunk in thunks {
    let value = match ctx.sandbox().call(&thunk, Value::Undefined, &[]) {
      Ok(value) => EvaluatedValue::Value(value),
      Err(throw) => EvaluatedValue::Error(ctx.runtime_error(filename, &throw)),
    };
    values.push(value);
  }
  ctx.forward_console();

  Ok(ExpressionsOutput {
    values,
    dependencies: output.dependencies,
    external_deps,
  })
}
