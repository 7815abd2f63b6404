use crate::error::EvaluationError;

/// Errors swallowed while running transitively required modules.
///
/// They are only reported once a value turns out to be invalid, so that
/// modules touching browser globals for side effects do not abort an
/// evaluation that never needed them.
#[derive(Debug, Default)]
pub struct ErrorQueue {
  errors: Vec<EvaluationError>,
}

impl ErrorQueue {
  pub fn push(&mut self, error: EvaluationError) {
    tracing::debug!(filename = ?error.filename, "Queued evaluation error: {}", error.message);
    self.errors.push(error);
  }

  pub fn len(&self) -> usize {
    self.errors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.errors.is_empty()
  }

  /// Text listing every queued error. Empties the queue.
  pub fn print(&mut self) -> String {
    let stacks: Vec<&str> = self
      .errors
      .iter()
      .map(EvaluationError::stack_or_message)
      .collect();
    let text = format!(
      "\nErrors encoundered during Preval Evaluation. i.e. Side Effects\n{}",
      stacks.join("\n")
    );
    self.errors.clear();
    text
  }

  pub fn flush(&mut self) {
    self.errors.clear();
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::error::ErrorKind;

  #[test]
  fn test_print_lists_stacks_and_empties_the_queue() {
    let mut queue = ErrorQueue::default();
    queue.push(
      EvaluationError::new(ErrorKind::Runtime, "window is not defined")
        .with_stack("ReferenceError: window is not defined\n    at /a.js:1:1"),
    );
    queue.push(EvaluationError::new(ErrorKind::Runtime, "boom"));

    assert_eq!(
      queue.print(),
      "\nErrors encoundered during Preval Evaluation. i.e. Side Effects\nReferenceError: window is not defined\n    at /a.js:1:1\nboom"
    );
    assert!(queue.is_empty());
    assert_eq!(
      queue.print(),
      "\nErrors encoundered during Preval Evaluation. i.e. Side Effects\n"
    );
  }

  #[test]
  fn test_flush() {
    let mut queue = ErrorQueue::default();
    queue.push(EvaluationError::new(ErrorKind::Runtime, "boom"));
    assert_eq!(queue.len(), 1);
    queue.flush();
    assert!(queue.is_empty());
  }
}
