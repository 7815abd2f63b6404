use indoc::indoc;
use linaria_shaker::{
  locate_targets, shake, shake_in_place, ExternalDep, ShakeError, ShakeTarget, TargetId,
};
use linaria_swc_runner::test_utils::{parse_test_module, print_test_module};
use pretty_assertions::assert_eq;
use swc_core::ecma::ast::{Expr, ModuleItem, Stmt};

fn shake_names(code: &str, names: &[&str]) -> (String, Vec<ExternalDep>) {
  let (module, source_map) = parse_test_module(code);
  let targets: Vec<ShakeTarget<'_>> = names.iter().map(|name| ShakeTarget::Name(name)).collect();
  let (shaken, deps) = shake(&module, &targets).unwrap();
  (print_test_module(&shaken, &source_map), deps)
}

fn compact(code: &str) -> String {
  code.chars().filter(|c| !c.is_whitespace()).collect()
}

#[track_caller]
fn assert_contains(code: &str, expected: &str) {
  assert!(
    compact(code).contains(&compact(expected)),
    "expected\n{code}\nto contain\n{expected}"
  );
}

#[track_caller]
fn assert_not_contains(code: &str, unexpected: &str) {
  assert!(
    !compact(code).contains(&compact(unexpected)),
    "expected\n{code}\nnot to contain\n{unexpected}"
  );
}

fn summary(deps: &[ExternalDep]) -> Vec<(String, String, Option<String>)> {
  deps
    .iter()
    .map(|dep| {
      (
        dep.source.to_string(),
        dep.local.sym.to_string(),
        dep.imported.as_ref().map(|imported| imported.to_string()),
      )
    })
    .collect()
}

#[test]
fn removes_all() {
  let (shaken, deps) = shake_names(
    indoc! {r#"
      const { whiteColor: color, anotherColor } = require("x");
      const a = color || anotherColor;
      let fontSize = undefined;
      color.green = "lime";
    "#},
    &[],
  );

  assert_eq!(compact(&shaken), compact("module.exports.__linariaPreval = [];"));
  assert!(deps.is_empty());
}

#[test]
fn keeps_arrays() {
  let (shaken, _) = shake_names(
    indoc! {r#"
      const arr = [first, second];
      export const one = arr[0];
      let two = null;
      function five() {
        return 5;
      }
      export const another = [arr, two, 2 + 4 + five()];
    "#},
    &[],
  );

  assert_contains(&shaken, "const arr = [first, second];");
  assert_contains(&shaken, "export const one = arr[0];");
  assert_contains(&shaken, "let two = null;");
  assert_contains(&shaken, "function five() { return 5; }");
  assert_contains(&shaken, "export const another = [arr, two, 2 + 4 + five()];");
}

#[test]
fn keeps_function_declaration() {
  let (shaken, _) = shake_names(
    indoc! {r#"
      let two = null;
      function five() {
        return 5;
      }
      export const nine = 4 + five();
    "#},
    &[],
  );

  assert_not_contains(&shaken, "let two");
  assert_contains(&shaken, "function five() { return 5; }");
  assert_contains(&shaken, "export const nine = 4 + five();");
}

#[test]
fn keeps_only_code_related_to_color() {
  let (shaken, deps) = shake_names(
    indoc! {r#"
      const { whiteColor: color, anotherColor } = require("x");
      const wrap = "";
      const a = color || anotherColor;
      color.green = "lime";
      module.exports = { color, anotherColor };
    "#},
    &["color"],
  );

  assert_contains(&shaken, r#"const { whiteColor: color, anotherColor } = require("x");"#);
  assert_contains(&shaken, r#"color.green = "lime";"#);
  assert_contains(&shaken, "module.exports = { color, anotherColor };");
  assert_contains(&shaken, "module.exports.__linariaPreval = [() => color];");
  assert_not_contains(&shaken, "wrap");
  assert_not_contains(&shaken, "const a");

  assert_eq!(
    summary(&deps),
    vec![
      ("x".into(), "color".into(), Some("whiteColor".into())),
      ("x".into(), "anotherColor".into(), Some("anotherColor".into())),
    ]
  );
}

#[test]
fn keeps_only_code_related_to_another_color() {
  let (shaken, deps) = shake_names(
    indoc! {r#"
      const { whiteColor: color, anotherColor } = require("x");
      const a = color || anotherColor;
      color.green = "lime";
    "#},
    &["anotherColor"],
  );

  assert_eq!(
    compact(&shaken),
    compact(
      r#"
        const { anotherColor } = require("x");
        module.exports.__linariaPreval = [() => anotherColor];
      "#
    )
  );
  assert_eq!(summary(&deps).len(), 1);
}

#[test]
fn keeps_only_code_related_to_a() {
  let (shaken, _) = shake_names(
    indoc! {r#"
      const { whiteColor: color, anotherColor } = require("x");
      const a = color || anotherColor;
      color.green = "lime";
    "#},
    &["a"],
  );

  assert_contains(&shaken, r#"const { whiteColor: color, anotherColor } = require("x");"#);
  assert_contains(&shaken, "const a = color || anotherColor;");
  assert_contains(&shaken, r#"color.green = "lime";"#);
}

#[test]
fn shakes_imports() {
  let (shaken, deps) = shake_names(
    indoc! {r#"
      import { unrelatedImport } from "x";
      import { whiteColor as color, anotherColor } from "x";
      import defaultColor from "x";
      import anotherDefaultColor from "x";
      import "x";
      require("x");
      export default color;
    "#},
    &["color", "defaultColor"],
  );

  assert_contains(&shaken, r#"import { whiteColor as color } from "x";"#);
  assert_contains(&shaken, r#"import defaultColor from "x";"#);
  assert_contains(&shaken, "export default color;");
  assert_contains(
    &shaken,
    "module.exports.__linariaPreval = [() => color, () => defaultColor];",
  );
  assert_not_contains(&shaken, "unrelatedImport");
  assert_not_contains(&shaken, "anotherColor");
  assert_not_contains(&shaken, "anotherDefaultColor");
  assert_not_contains(&shaken, r#"require("x")"#);

  assert_eq!(
    summary(&deps),
    vec![
      ("x".into(), "color".into(), Some("whiteColor".into())),
      ("x".into(), "defaultColor".into(), Some("default".into())),
    ]
  );
}

#[test]
fn keeps_member_expression_key() {
  let (shaken, _) = shake_names(
    indoc! {r##"
      const key = "blue";
      const obj = { blue: "#00F" };
      const blue = obj[key];
    "##},
    &["blue"],
  );

  assert_contains(&shaken, r#"const key = "blue";"#);
  assert_contains(&shaken, r##"const obj = { blue: "#00F" };"##);
  assert_contains(&shaken, "const blue = obj[key];");
}

#[test]
fn shakes_exports() {
  let (shaken, deps) = shake_names(
    indoc! {r#"
      import { whiteColor as color, anotherColor } from "x";
      export const a = color;
      export { anotherColor };
    "#},
    &["a"],
  );

  assert_contains(&shaken, r#"import { whiteColor as color, anotherColor } from "x";"#);
  assert_contains(&shaken, "export const a = color;");
  assert_contains(&shaken, "export { anotherColor };");
  assert_eq!(deps.len(), 2);
}

#[test]
fn shakes_export_functions() {
  let (shaken, _) = shake_names(
    indoc! {r#"
      import { whiteColor as color, anotherColor } from "x";
      export const a = color;
      export { anotherColor as green };
      export default async function now() {}
      export function shakeMe(favorite) {
        console.log("hello");
        if (favorite) {
          return "the color is " + a;
        }
        return "no favorite color";
      }
    "#},
    &["a"],
  );

  assert_contains(&shaken, "export { anotherColor as green };");
  assert_contains(&shaken, "export default async function now() {}");
  assert_contains(
    &shaken,
    r#"
      export function shakeMe(favorite) {
        if (favorite) {
          return "the color is " + a;
        }
        return "no favorite color";
      }
    "#,
  );
  assert_not_contains(&shaken, "console.log");
}

#[test]
fn shakes_export_declaration() {
  let (shaken, deps) = shake_names(
    indoc! {r#"
      import { whiteColor as color, anotherColor } from "x";
      const a = 42;
      export function shakeMe(favorite) {
        console.log("hello");
        if (favorite) {
          return "the color is " + a;
        }
        return "no favorite color";
      }
    "#},
    &[],
  );

  assert_not_contains(&shaken, "import");
  assert_contains(&shaken, "const a = 42;");
  assert_not_contains(&shaken, "console.log");
  assert!(deps.is_empty());
}

#[test]
fn throws_away_side_effects() {
  let (shaken, _) = shake_names(
    indoc! {r#"
      const objects = { key: { fontSize: 12 } };
      const foo = (k) => {
        const obj = objects[k];
        console.log("side effect");
        return obj;
      };
    "#},
    &["foo"],
  );

  assert_contains(&shaken, "const objects = { key: { fontSize: 12 } };");
  assert_contains(&shaken, "const obj = objects[k]; return obj;");
  assert_not_contains(&shaken, "console.log");
}

#[test]
fn keeps_objects_as_is() {
  let fill1 = r#"
    const fill1 = (top = 0, left = 0, right = 0, bottom = 0) => ({
      position: "absolute",
      top,
      right,
      bottom,
      left
    });
  "#;
  let fill2 = r#"
    const fill2 = (top = 0, left = 0, right = 0, bottom = 0) => {
      return {
        position: "absolute",
        top,
        right,
        bottom,
        left
      };
    };
  "#;
  let (shaken, _) = shake_names(&format!("{fill1}\n{fill2}"), &["fill1", "fill2"]);

  assert_contains(&shaken, fill1);
  assert_contains(&shaken, fill2);
}

#[test]
fn shakes_sequence_expression() {
  let (shaken, deps) = shake_names(
    indoc! {r#"
      import { external } from "x";
      const color1 = (external, () => "blue");
      let local = "";
      const color2 = (local = color1(), () => local);
    "#},
    &["color2"],
  );

  assert_eq!(
    compact(&shaken),
    compact(
      r#"
        const color1 = (() => "blue");
        let local = "";
        const color2 = (local = color1(), () => local);
        module.exports.__linariaPreval = [() => color2];
      "#
    )
  );
  assert!(deps.is_empty());
}

#[test]
fn keeps_undefined_definitions() {
  let (shaken, deps) = shake_names(
    indoc! {r#"
      const { styled } = require("../react");
      let fontSize;
      export const Title = styled.h1`
        font-size: ${fontSize}px;
      `;
    "#},
    &["fontSize"],
  );

  assert_contains(&shaken, "let fontSize;");
  assert_contains(&shaken, "module.exports.__linariaPreval = [() => fontSize];");
  assert_eq!(
    summary(&deps),
    vec![("../react".into(), "styled".into(), Some("styled".into()))]
  );
}

#[test]
fn undeclared_name_still_gets_a_thunk() {
  let (shaken, _) = shake_names("const a = 1;", &["a", "missing"]);
  assert_contains(
    &shaken,
    "module.exports.__linariaPreval = [() => a, () => missing];",
  );
}

#[test]
fn expression_targets_are_pruned_copies() {
  let (module, source_map) = parse_test_module(indoc! {r#"
    const a = 1;
    const b = 2;
    use(a + 1);
  "#});
  let ModuleItem::Stmt(Stmt::Expr(stmt)) = &module.body[2] else {
    panic!("expected an expression statement");
  };
  let Expr::Call(call) = &*stmt.expr else {
    panic!("expected a call");
  };
  let target = &*call.args[0].expr;

  let (shaken, _) = shake(&module, &[ShakeTarget::Expr(target)]).unwrap();
  let shaken = print_test_module(&shaken, &source_map);

  assert_eq!(
    compact(&shaken),
    compact("const a = 1; module.exports.__linariaPreval = [() => a + 1];")
  );
}

#[test]
fn object_targets_are_wrapped_in_parens() {
  let (module, source_map) = parse_test_module("use({ color: 'red' });");
  let ModuleItem::Stmt(Stmt::Expr(stmt)) = &module.body[0] else {
    panic!("expected an expression statement");
  };
  let Expr::Call(call) = &*stmt.expr else {
    panic!("expected a call");
  };

  let (shaken, _) = shake(&module, &[ShakeTarget::Expr(&call.args[0].expr)]).unwrap();
  let shaken = print_test_module(&shaken, &source_map);
  assert_contains(&shaken, "[() => ({ color: 'red' })]");
}

#[test]
fn input_module_is_not_modified() {
  let code = "const a = 1; const b = 2; console.log(b);";
  let (module, source_map) = parse_test_module(code);
  let before = print_test_module(&module, &source_map);

  shake(&module, &[ShakeTarget::Name("a")]).unwrap();

  assert_eq!(print_test_module(&module, &source_map), before);
}

#[test]
fn shaking_is_idempotent() {
  let code = indoc! {r#"
    const { whiteColor: color, anotherColor } = require("x");
    const wrap = "";
    const a = color || anotherColor;
    color.green = "lime";
    export const b = a;
  "#};
  let (module, source_map) = parse_test_module(code);
  let targets = [ShakeTarget::Name("color")];

  let (once, _) = shake(&module, &targets).unwrap();
  let (twice, _) = shake(&once, &targets).unwrap();

  assert_eq!(
    print_test_module(&twice, &source_map),
    print_test_module(&once, &source_map)
  );
}

#[test]
fn exports_are_never_removed() {
  let (shaken, _) = shake_names(
    indoc! {r#"
      const unused = 1;
      export const unusedLooking = 2;
      exports.legacy = 3;
      Object.defineProperty(exports, "flag", { value: true });
    "#},
    &[],
  );

  assert_not_contains(&shaken, "const unused = 1;");
  assert_contains(&shaken, "export const unusedLooking = 2;");
  assert_contains(&shaken, "exports.legacy = 3;");
  assert_contains(&shaken, r#"Object.defineProperty(exports, "flag", { value: true });"#);
}

#[test]
fn keeps_rest_patterns_whole() {
  let (shaken, _) = shake_names(
    indoc! {r#"
      const { a, ...rest } = obj;
      const [first, second] = list;
      export const r = rest;
      export const s = second;
    "#},
    &[],
  );

  assert_contains(&shaken, "const { a, ...rest } = obj;");
  assert_contains(&shaken, "const [, second] = list;");
}

#[test]
fn keeps_class_bodies() {
  let (shaken, _) = shake_names(
    indoc! {r#"
      class Theme {
        constructor() {
          this.color = "red";
          track("theme");
        }
      }
      export const theme = new Theme();
    "#},
    &[],
  );

  assert_contains(&shaken, r#"this.color = "red";"#);
  assert_contains(&shaken, r#"track("theme");"#);
}

#[test]
fn keeps_mutations_inside_functions() {
  let (shaken, _) = shake_names(
    indoc! {r#"
      function build() {
        const result = {};
        result.color = "red";
        log(result);
        return result;
      }
      export const styles = build();
    "#},
    &[],
  );

  assert_contains(&shaken, r#"result.color = "red";"#);
  // an unknown function may change what it is given
  assert_contains(&shaken, "log(result);");
}

#[test]
fn keeps_calls_that_fill_an_argument() {
  let (shaken, _) = shake_names(
    indoc! {r#"
      function fill(o) {
        o.color = "red";
      }
      const theme = {};
      fill(theme);
      const t = theme.color;
      const unrelated = {};
      fill(unrelated);
    "#},
    &["t"],
  );

  assert_contains(&shaken, r#"function fill(o) { o.color = "red"; }"#);
  assert_contains(&shaken, "fill(theme);");
  assert_contains(&shaken, "const t = theme.color;");
  assert_not_contains(&shaken, "unrelated");
}

#[test]
fn keeps_calls_of_functions_writing_outer_bindings() {
  let (shaken, _) = shake_names(
    indoc! {r#"
      let count = 0;
      function inc() {
        count++;
      }
      inc();
      const c = count;
      function noop() {}
      noop();
    "#},
    &["c"],
  );

  assert_contains(&shaken, "let count = 0;");
  assert_contains(&shaken, "function inc() { count++; }");
  assert_contains(&shaken, "inc();");
  assert_contains(&shaken, "const c = count;");
  assert_not_contains(&shaken, "noop");
}

#[test]
fn keeps_calls_that_write_through_other_calls() {
  let (shaken, _) = shake_names(
    indoc! {r#"
      const registry = {};
      function register(name) {
        registry[name] = true;
      }
      function setup() {
        register("button");
      }
      setup();
      export const names = Object.keys(registry);
    "#},
    &[],
  );

  assert_contains(&shaken, r#"function setup() { register("button"); }"#);
  assert_contains(&shaken, "setup();");
}

#[test]
fn keeps_callbacks_writing_outer_bindings() {
  let (shaken, _) = shake_names(
    indoc! {r#"
      let s = 0;
      [1, 2].forEach(function(v) {
        s += v;
      });
      let other = 0;
      [3].forEach((v) => {
        other += v;
      });
      const total = s;
    "#},
    &["total"],
  );

  assert_contains(&shaken, "[1, 2].forEach(function(v) { s += v; });");
  assert_contains(&shaken, "const total = s;");
  assert_not_contains(&shaken, "other");
}

#[test]
fn shakes_export_assignments() {
  let (shaken, deps) = shake_names(
    indoc! {r#"
      const { styled } = require("../react");
      let fontSize;
      let unused;
      export const Title = styled.h1`
        font-size: ${fontSize};
      `;
    "#},
    &[],
  );

  assert_contains(&shaken, r#"const { styled } = require("../react");"#);
  assert_contains(&shaken, "let fontSize;");
  assert_contains(&shaken, "export const Title = styled.h1`");
  assert_not_contains(&shaken, "unused");
  assert_eq!(
    summary(&deps),
    vec![("../react".into(), "styled".into(), Some("styled".into()))]
  );
}

#[test]
fn keeps_only_live_parts_of_a_destructured_require() {
  let (shaken, deps) = shake_names(
    indoc! {r#"
      const { a, b } = require("x");
      const c = a;
      module.exports = b;
    "#},
    &[],
  );

  assert_eq!(
    compact(&shaken),
    compact(
      r#"
        const { b } = require("x");
        module.exports = b;
        module.exports.__linariaPreval = [];
      "#
    )
  );
  assert_eq!(
    summary(&deps),
    vec![("x".into(), "b".into(), Some("b".into()))]
  );
}

#[test]
fn shake_in_place_accepts_located_targets() {
  let (mut module, source_map) = parse_test_module("const a = 1; const b = a;");
  let targets = locate_targets(&module, &[ShakeTarget::Name("b")]).unwrap();
  assert_eq!(targets, vec![TargetId::Name("b".into())]);

  let deps = shake_in_place(&mut module, &targets).unwrap();
  assert!(deps.is_empty());
  assert_eq!(
    compact(&print_test_module(&module, &source_map)),
    compact("const a = 1; const b = a; module.exports.__linariaPreval = [() => b];")
  );
}

#[test]
fn foreign_expression_is_rejected() {
  let (module, _) = parse_test_module("const a = 1;");
  let (other, _) = parse_test_module("use(2);");
  let ModuleItem::Stmt(Stmt::Expr(stmt)) = &other.body[0] else {
    panic!("expected an expression statement");
  };

  let error = shake(&module, &[ShakeTarget::Expr(&stmt.expr)]).unwrap_err();
  assert!(matches!(error, ShakeError::TargetNotFound { index: 0 }));
}
