use regex::Regex;
use swc_core::common::sync::Lrc;
use swc_core::common::SourceMap;
use swc_core::ecma::ast::Module;
use swc_core::ecma::visit::VisitMut;

use crate::runner::{emit_module, parse_module, run_visit};
pub use crate::runner::{RunContext, RunVisitResult};

pub type RunTestContext = RunContext;

/// Helper to test SWC visitors.
///
/// * Parse `code` with SWC
/// * Run a visitor over it
/// * Return the result
///
pub fn run_test_visit<V: VisitMut>(
  code: &str,
  make_visit: impl FnOnce(RunTestContext) -> V,
) -> RunVisitResult<V> {
  run_visit(code, make_visit).unwrap()
}

/// Remove whitespace from line starts and ends
pub fn remove_code_whitespace(code: &str) -> String {
  let re = Regex::new(r"\s*\n\s*").unwrap();
  re.replace_all(code, "\n").trim().to_string()
}

/// Parse a test fixture, panicking on syntax errors
pub fn parse_test_module(code: &str) -> (Module, Lrc<SourceMap>) {
  let source_map = Lrc::new(SourceMap::default());
  let module = parse_module(code, "/app/test.js", &source_map).unwrap();
  (module, source_map)
}

/// Print a module without a source map
pub fn print_test_module(module: &Module, source_map: &Lrc<SourceMap>) -> String {
  emit_module(module, source_map, false).unwrap().code
}
