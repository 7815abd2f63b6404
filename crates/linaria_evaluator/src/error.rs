use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Classification of an evaluation failure.
///
/// Resolve, require and transform failures mean the requested values can not
/// be computed at all and always reach the caller. Runtime failures inside
/// transitively required modules are queued instead, see
/// [`crate::ErrorQueue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
  Resolve,
  Require,
  Transform,
  Runtime,
  Validation,
}

impl ErrorKind {
  /// Value of the `code` property carried by errors of this kind inside the
  /// sandbox
  pub fn code(self) -> Option<&'static str> {
    match self {
      ErrorKind::Resolve => Some("RESOLVE"),
      ErrorKind::Require => Some("REQUIRE"),
      ErrorKind::Transform => Some("TRANSFORM"),
      ErrorKind::Runtime | ErrorKind::Validation => None,
    }
  }

  pub fn from_code(code: &str) -> Option<ErrorKind> {
    match code {
      "RESOLVE" => Some(ErrorKind::Resolve),
      "REQUIRE" => Some(ErrorKind::Require),
      "TRANSFORM" => Some(ErrorKind::Transform),
      _ => None,
    }
  }

  /// Whether the loader rethrows errors of this kind instead of queueing them
  pub fn is_fatal(self) -> bool {
    self.code().is_some()
  }
}

/// A user facing evaluation failure
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationError {
  pub kind: ErrorKind,
  pub message: String,
  /// The module the error is attributed to
  pub filename: Option<PathBuf>,
  /// Rendered source excerpt around the failing location
  pub frame: Option<String>,
  /// Stack text, cleaned to start at the evaluated code
  pub stack: Option<String>,
}

impl EvaluationError {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    EvaluationError {
      kind,
      message: message.into(),
      filename: None,
      frame: None,
      stack: None,
    }
  }

  pub fn with_filename(mut self, filename: &Path) -> Self {
    self.filename = Some(filename.to_path_buf());
    self
  }

  pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
    self.stack = Some(stack.into());
    self
  }

  /// Failure of the transform step, reported with the file being processed
  pub fn transform(filename: &Path, cause: &anyhow::Error) -> Self {
    let message = format!("{cause:#}");
    let stack = format!(
      "Linaria Preval Transform Error:\nError encountered while processing {}\n{message}",
      filename.display()
    );
    EvaluationError::new(ErrorKind::Transform, message)
      .with_filename(filename)
      .with_stack(stack)
  }

  /// The stack when there is one, the message otherwise
  pub fn stack_or_message(&self) -> &str {
    self.stack.as_deref().unwrap_or(&self.message)
  }
}

impl fmt::Display for EvaluationError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.stack {
      Some(stack) => match stack.strip_prefix(self.message.as_str()) {
        Some(rest) => write!(f, "{}{rest}", self.message),
        None => write!(f, "{}\n{stack}", self.message),
      },
      None => write!(f, "{}", self.message),
    }
  }
}

impl std::error::Error for EvaluationError {}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn test_codes_round_trip_for_fatal_kinds() {
    for kind in [ErrorKind::Resolve, ErrorKind::Require, ErrorKind::Transform] {
      assert!(kind.is_fatal());
      assert_eq!(kind.code().and_then(ErrorKind::from_code), Some(kind));
    }
    assert!(!ErrorKind::Runtime.is_fatal());
    assert_eq!(ErrorKind::from_code("ENOENT"), None);
  }

  #[test]
  fn test_transform_error_text() {
    let error = EvaluationError::transform(
      Path::new("/src/a.js"),
      &anyhow::anyhow!("Unexpected token (1:4)"),
    );
    assert_eq!(error.kind, ErrorKind::Transform);
    assert_eq!(
      error.stack.as_deref(),
      Some(
        "Linaria Preval Transform Error:\nError encountered while processing /src/a.js\nUnexpected token (1:4)"
      )
    );
    assert!(error.to_string().starts_with("Unexpected token (1:4)\nLinaria Preval"));
  }

  #[test]
  fn test_display_does_not_repeat_the_message() {
    let error = EvaluationError::new(ErrorKind::Runtime, "boom")
      .with_stack("boom\n    at /src/a.js:1:1");
    assert_eq!(error.to_string(), "boom\n    at /src/a.js:1:1");
  }
}
