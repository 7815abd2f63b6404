use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};
use swc_core::quote;

/// Replaces `import(...)` with an object whose `then` and `catch` do nothing.
///
/// Lazily loaded modules never take part in an evaluation, but the code
/// referring to them still has to run.
pub struct DynamicImportNoop;

impl VisitMut for DynamicImportNoop {
  fn visit_mut_expr(&mut self, node: &mut Expr) {
    node.visit_mut_children_with(self);

    if let Expr::Call(CallExpr {
      callee: Callee::Import(_),
      ..
    }) = node
    {
      *node = quote!("({ then: () => undefined, catch: () => undefined })" as Expr);
    }
  }
}

#[cfg(test)]
mod tests {
  use linaria_swc_runner::test_utils::{remove_code_whitespace, run_test_visit};

  use super::*;

  #[test]
  fn test_replaces_dynamic_imports() {
    let result = run_test_visit(
      "const lazy = () => import('./heavy').then((m) => m.default);",
      |_| DynamicImportNoop,
    );
    let output = remove_code_whitespace(&result.output_code);
    assert!(!output.contains("import("), "{output}");
    assert!(output.contains("then: ()=>undefined,\ncatch: ()=>undefined"), "{output}");
    assert!(output.ends_with(".then((m)=>m.default);"), "{output}");
  }
}
