use std::path::{Path, PathBuf};
use std::sync::Arc;

use indoc::indoc;
use linaria_evaluator::{
  evaluate, evaluate_expressions, throw_if_invalid, ErrorKind, EvaluateSource, EvaluatedValue,
  EvaluationContext, EvaluatorOptions, MockTransformer, ModuleState, TransformOutput, COMPILE_CACHE_FILE,
};
use linaria_filesystem::in_memory_file_system::InMemoryFileSystem;
use linaria_filesystem::FileSystem;
use linaria_sandbox::Value;
use linaria_shaker::ShakeTarget;
use linaria_swc_runner::test_utils::parse_test_module;
use pretty_assertions::assert_eq;
use tracing_test::traced_test;
use swc_core::ecma::ast::{Decl, Expr, ModuleItem, Stmt};

fn context(files: &[(&str, &str)]) -> (EvaluationContext, Arc<InMemoryFileSystem>) {
  let fs = Arc::new(InMemoryFileSystem::default());
  for (path, contents) in files {
    fs.write(Path::new(path), contents.as_bytes()).unwrap();
  }
  let options = EvaluatorOptions {
    disable_cache: true,
    ..Default::default()
  };
  let ctx = EvaluationContext::new(options, fs.clone()).unwrap();
  (ctx, fs)
}

fn run(ctx: &mut EvaluationContext, code: &str) -> Value {
  evaluate(ctx, EvaluateSource::Code(code.to_string()), Path::new("/app/index.js"))
    .unwrap_or_else(|error| panic!("{error}"))
    .value
}

fn text(ctx: &mut EvaluationContext, value: &Value, key: &str) -> String {
  let property = ctx.sandbox().get(value, key).unwrap();
  ctx.sandbox().to_display_string(&property).unwrap()
}

fn display(ctx: &mut EvaluationContext, value: &Value) -> String {
  ctx.sandbox().to_display_string(value).unwrap()
}

#[test]
fn evaluates_imports_across_files() {
  let (mut ctx, _) = context(&[("/app/sample-script.js", "export default 42;")]);

  let output = evaluate(
    &mut ctx,
    EvaluateSource::Code(
      "import answer from './sample-script'; export const result = 'The answer is ' + answer;"
        .into(),
    ),
    Path::new("/app/index.js"),
  )
  .unwrap();

  assert_eq!(text(&mut ctx, &output.value, "result"), "The answer is 42");
  assert_eq!(output.dependencies, vec![PathBuf::from("/app/sample-script.js")]);
}

#[test]
fn cyclic_requires_see_partial_exports() {
  let (mut ctx, _) = context(&[
    (
      "/app/a.js",
      "exports.a = 'a'; const b = require('./b'); exports.fromB = b.b;",
    ),
    (
      "/app/b.js",
      "const a = require('./a'); exports.b = 'b'; exports.seenA = a.a;",
    ),
  ]);

  let value = run(
    &mut ctx,
    "const a = require('./a'); const b = require('./b'); module.exports = a.fromB + b.seenA;",
  );
  assert_eq!(display(&mut ctx, &value), "ba");
}

#[test]
fn unchanged_files_come_from_the_compile_cache() {
  let code = "module.exports = 'cached';";
  let (mut ctx, fs) = context(&[("/app/index.js", code)]);

  let mut transformer = MockTransformer::new();
  transformer
    .expect_cache_key()
    .return_const("mock".to_string());
  transformer
    .expect_transform()
    .times(2)
    .returning(|code: &str, _: &Path| {
      Ok(TransformOutput {
        code: code.to_string(),
        map: None,
      })
    });
  ctx.set_transformer(transformer);

  run(&mut ctx, code);
  run(&mut ctx, code);
  assert_eq!(ctx.compile_cache().len(), 1);

  // A new modification time forces another transform
  fs.write(Path::new("/app/index.js"), code.as_bytes()).unwrap();
  let value = run(&mut ctx, code);
  assert_eq!(display(&mut ctx, &value), "cached");
}

#[test]
fn changed_options_invalidate_cached_compilations() {
  let code = "module.exports = 1;";
  let (mut ctx, _) = context(&[("/app/index.js", code)]);

  for key in ["first", "second"] {
    let mut transformer = MockTransformer::new();
    transformer.expect_cache_key().return_const(key.to_string());
    transformer.expect_transform().times(1).returning(|code: &str, _: &Path| {
      Ok(TransformOutput {
        code: code.to_string(),
        map: None,
      })
    });
    ctx.set_transformer(transformer);
    run(&mut ctx, code);
    run(&mut ctx, code);
  }
}

#[test]
fn invalidate_all_rebuilds_modules() {
  let (mut ctx, _) = context(&[("/app/theme.js", "exports.color = 'red';")]);
  let parent = Path::new("/app/index.js");

  let first = ctx.require_from(parent, "./theme").unwrap();
  let again = ctx.require_from(parent, "./theme").unwrap();
  assert!(first.strict_equals(&again));

  ctx.invalidate_all();
  assert!(ctx.module(Path::new("/app/theme.js")).is_none());

  let fresh = ctx.require_from(parent, "./theme").unwrap();
  assert!(!fresh.as_object().unwrap().ptr_eq(first.as_object().unwrap()));
  assert_eq!(text(&mut ctx, &fresh, "color"), "red");
}

#[test]
fn globals_do_not_survive_invalidate_all() {
  let (mut ctx, _) = context(&[]);
  run(&mut ctx, "globalThis.leaked = 10;");
  ctx.invalidate_all();

  let value = run(&mut ctx, "module.exports = typeof leaked;");
  assert_eq!(display(&mut ctx, &value), "undefined");
}

#[test]
fn node_builtins() {
  let (mut ctx, _) = context(&[]);
  let value = run(
    &mut ctx,
    indoc! {r#"
      const path = require('path');
      const fs = require('fs');
      module.exports = { joined: path.join('/a', 'b', '../c'), fs: fs === null };
    "#},
  );
  assert_eq!(text(&mut ctx, &value, "joined"), "/a/c");
  assert_eq!(text(&mut ctx, &value, "fs"), "true");

  let error = evaluate(
    &mut ctx,
    EvaluateSource::Code("require('worker_threads');".into()),
    Path::new("/app/index.js"),
  )
  .err()
  .unwrap();
  assert_eq!(error.kind, ErrorKind::Require);
  assert_eq!(
    error.message,
    "Unable to import \"worker_threads\". Importing Node builtins is not supported in the sandbox."
  );
}

#[test]
fn assets_and_json() {
  let (mut ctx, _) = context(&[
    ("/app/logo.svg", "<svg />"),
    ("/app/tokens.json", r#"{ "color": "red", "space": [4, 8] }"#),
  ]);

  let value = run(
    &mut ctx,
    indoc! {r#"
      const tokens = require('./tokens.json');
      module.exports = { logo: require('./logo.svg'), color: tokens.color, space: tokens.space[1] };
    "#},
  );
  assert_eq!(text(&mut ctx, &value, "logo"), "./logo.svg");
  assert_eq!(text(&mut ctx, &value, "color"), "red");
  assert_eq!(text(&mut ctx, &value, "space"), "8");

  let logo = ctx.module(Path::new("/app/logo.svg")).unwrap();
  assert!(logo.is_asset());
  assert_eq!(logo.dependents().count(), 0);
}

#[test]
fn resolve_and_transform_errors_are_fatal() {
  let (mut ctx, _) = context(&[
    ("/app/nested.js", "require('./missing');"),
    ("/app/broken.js", "export const = 1;"),
  ]);

  let error = evaluate(
    &mut ctx,
    EvaluateSource::Code("try { require('./nested'); } catch (e) {} module.exports = 1;".into()),
    Path::new("/app/index.js"),
  );
  // Swallowed by the module itself, like any exception
  assert!(error.is_ok());

  let error = evaluate(
    &mut ctx,
    EvaluateSource::Code("require('./missing');".into()),
    Path::new("/app/index.js"),
  )
  .err()
  .unwrap();
  assert_eq!(error.kind, ErrorKind::Resolve);
  assert_eq!(error.filename.as_deref(), Some(Path::new("/app/index.js")));
  assert!(error.message.contains("Cannot find module './missing'"), "{}", error.message);

  let error = evaluate(
    &mut ctx,
    EvaluateSource::Code("module.exports = require('./broken');".into()),
    Path::new("/app/index.js"),
  )
  .err()
  .unwrap();
  assert_eq!(error.kind, ErrorKind::Transform);
  assert_eq!(error.filename.as_deref(), Some(Path::new("/app/broken.js")));
  assert!(error
    .stack_or_message()
    .starts_with("Linaria Preval Transform Error:\nError encountered while processing /app/broken.js"));
}

#[test]
fn caught_fatal_errors_do_not_outlive_their_module() {
  let (mut ctx, _) = context(&[("/app/nested.js", "require('./missing');")]);

  let value = run(
    &mut ctx,
    "try { require('./nested'); } catch (e) { globalThis.saved = e; } module.exports = 'ok';",
  );
  assert_eq!(display(&mut ctx, &value), "ok");
  let value = run(&mut ctx, "module.exports = typeof saved;");
  assert_eq!(display(&mut ctx, &value), "object");

  // rethrown later, the error belongs to the module that threw it
  let error = evaluate(
    &mut ctx,
    EvaluateSource::Code("throw saved;".into()),
    Path::new("/app/other.js"),
  )
  .err()
  .unwrap();
  assert_eq!(error.kind, ErrorKind::Resolve);
  assert_eq!(error.filename.as_deref(), Some(Path::new("/app/other.js")));
  assert!(error.message.contains("Cannot find module './missing'"), "{}", error.message);
}

#[test]
fn side_effect_errors_of_dependencies_are_queued() {
  let (mut ctx, _) = context(&[(
    "/app/side.js",
    indoc! {r#"
      exports.color = 'red';
      window.matchMedia('(max-width: 100px)');
    "#},
  )]);

  let value = run(&mut ctx, "module.exports = require('./side').color;");
  assert_eq!(display(&mut ctx, &value), "red");
  assert_eq!(ctx.queued_errors(), 1);

  let printed = ctx.print_error_queue();
  assert!(printed.starts_with("\nErrors encoundered during Preval Evaluation. i.e. Side Effects\n"));
  assert!(printed.contains("Linaria Preval Error:"), "{printed}");
  assert!(printed.contains("> 2 | window.matchMedia('(max-width: 100px)');"), "{printed}");
  assert_eq!(ctx.queued_errors(), 0);
}

#[test]
fn validation_errors_carry_the_queued_errors() {
  let (mut ctx, _) = context(&[(
    "/app/side.js",
    "window.matchMedia('(max-width: 100px)');",
  )]);

  let value = run(&mut ctx, "module.exports = require('./side').size;");
  assert_eq!(ctx.queued_errors(), 1);

  let error = throw_if_invalid(&mut ctx, &EvaluatedValue::Value(value), "side.size", false, false)
    .unwrap_err();
  assert_eq!(error.kind, ErrorKind::Validation);
  let stack = error.stack.unwrap();
  assert!(stack.starts_with(&error.message), "{stack}");
  assert!(stack.contains("Errors encoundered during Preval Evaluation"), "{stack}");
  assert_eq!(ctx.queued_errors(), 0);
}

#[test]
fn errors_of_the_entry_module_have_a_code_frame() {
  let (mut ctx, _) = context(&[]);
  let error = evaluate(
    &mut ctx,
    EvaluateSource::Code(
      indoc! {r#"
        const a = 1;
        const b = a + 1;
        const c = missing + b;
        module.exports = c;
      "#}
      .into(),
    ),
    Path::new("/app/index.js"),
  )
  .err()
  .unwrap();

  assert_eq!(error.kind, ErrorKind::Runtime);
  assert_eq!(error.message, "missing is not defined");
  let frame = error.frame.unwrap();
  assert!(frame.contains("> 3 | const c = missing + b;"), "{frame}");
  assert!(error.stack.unwrap().starts_with("\nLinaria Preval Error:\n"));
}

fn template_expressions(module: &swc_core::ecma::ast::Module, item: usize) -> Vec<&Expr> {
  let ModuleItem::Stmt(Stmt::Decl(Decl::Var(var))) = &module.body[item] else {
    panic!("expected a variable declaration");
  };
  let Some(Expr::TaggedTpl(tagged)) = var.decls[0].init.as_deref() else {
    panic!("expected a tagged template");
  };
  tagged.tpl.exprs.iter().map(|expr| &**expr).collect()
}

#[test]
fn targets_fail_independently() {
  let (mut ctx, _) = context(&[]);
  let (module, source_map) = parse_test_module(indoc! {r#"
    const theme = { color: 'red' };
    const title = css`
      color: ${theme.color};
      border: ${theme.missing.width};
    `;
  "#});
  let targets: Vec<ShakeTarget<'_>> = template_expressions(&module, 1)
    .into_iter()
    .map(ShakeTarget::Expr)
    .collect();

  let output = evaluate_expressions(
    &mut ctx,
    &module,
    &source_map,
    &targets,
    Path::new("/app/test.js"),
  )
  .unwrap();

  assert_eq!(output.values.len(), 2);
  let color = output.values[0].value().cloned().unwrap();
  assert_eq!(display(&mut ctx, &color), "red");

  let EvaluatedValue::Error(error) = &output.values[1] else {
    panic!("expected the second target to fail");
  };
  assert_eq!(error.kind, ErrorKind::Runtime);
  assert_eq!(error.filename.as_deref(), Some(Path::new("/app/test.js")));

  let invalid = throw_if_invalid(&mut ctx, &output.values[1], "theme.missing.width", false, false)
    .unwrap_err();
  assert!(invalid
    .message
    .starts_with("Linaria: An error occurred when evaluating the expression:"));
}

#[test]
fn undefined_values_are_reported_when_validated() {
  let (mut ctx, _) = context(&[(
    "/app/node_modules/@linaria/react/index.js",
    "exports.styled = { h1: () => ({ __linaria: { className: 'h1' } }) };",
  )]);
  let (module, source_map) = parse_test_module(indoc! {r#"
    import { styled } from '@linaria/react';
    let fontSize;
    export const Title = styled.h1`font-size: ${fontSize}px;`;
  "#});

  let output = evaluate_expressions(
    &mut ctx,
    &module,
    &source_map,
    &[ShakeTarget::Name("fontSize")],
    Path::new("/app/test.js"),
  )
  .unwrap();

  let value = output.values[0].value().unwrap();
  assert!(value.is_undefined());
  assert_eq!(
    output.dependencies,
    vec![PathBuf::from("/app/node_modules/@linaria/react/index.js")]
  );

  let error = throw_if_invalid(&mut ctx, &output.values[0], "fontSize", false, true).unwrap_err();
  assert_eq!(error.kind, ErrorKind::Validation);
  assert!(error.message.contains("evaluated to 'undefined'"));
  assert!(error.message.contains("circular import"));
}

#[test]
fn require_helpers() {
  let (mut ctx, _) = context(&[("/app/theme.js", "exports.color = 'red';")]);
  let value = run(
    &mut ctx,
    indoc! {r#"
      require('./theme');
      module.exports = {
        resolved: require.resolve('./theme'),
        cached: require.cache['/app/theme.js'].exports.color,
        ensure: typeof require.ensure,
      };
    "#},
  );
  assert_eq!(text(&mut ctx, &value, "resolved"), "/app/theme.js");
  assert_eq!(text(&mut ctx, &value, "cached"), "red");
  assert_eq!(text(&mut ctx, &value, "ensure"), "function");
}

#[test]
fn finds_transitive_dependents() {
  let (mut ctx, _) = context(&[
    ("/app/a.js", "module.exports = require('./b');"),
    ("/app/b.js", "module.exports = require('./c');"),
    ("/app/c.js", "module.exports = 'c';"),
  ]);
  run(&mut ctx, "module.exports = require('./a');");

  assert_eq!(
    ctx.find_all_dependents(Path::new("/app/c.js")),
    vec![
      PathBuf::from("/app/b.js"),
      PathBuf::from("/app/a.js"),
      PathBuf::from("/app/index.js"),
    ]
  );
  assert!(ctx.find_all_dependents(Path::new("/app/index.js")).is_empty());
}

#[test]
fn changed_files_are_loaded_again() {
  let (mut ctx, fs) = context(&[("/app/theme.js", "module.exports = 'red';")]);
  let code = "module.exports = require('./theme');";

  let value = run(&mut ctx, code);
  assert_eq!(display(&mut ctx, &value), "red");

  fs.write(Path::new("/app/theme.js"), b"module.exports = 'blue';")
    .unwrap();
  let value = run(&mut ctx, code);
  assert_eq!(display(&mut ctx, &value), "blue");

  assert!(ctx.load(Path::new("/app/theme.js")));
  assert_eq!(
    ctx.module(Path::new("/app/theme.js")).unwrap().state(),
    ModuleState::Registered
  );
  assert!(!ctx.load(Path::new("/app/unknown.js")));
}

#[test]
fn dynamic_imports_are_inert() {
  let (mut ctx, _) = context(&[]);
  let value = run(
    &mut ctx,
    "export const lazy = typeof import('./heavy').then; export const caught = import('./heavy').catch(() => 1);",
  );
  assert_eq!(text(&mut ctx, &value, "lazy"), "function");
  assert_eq!(text(&mut ctx, &value, "caught"), "undefined");
}

#[test]
fn ignored_files_run_untransformed() {
  let fs = Arc::new(InMemoryFileSystem::default());
  fs.write(
    Path::new("/app/node_modules/lib/index.js"),
    b"module.exports = 'lib';",
  )
  .unwrap();
  let options = EvaluatorOptions {
    disable_cache: true,
    ignore: Some("node_modules".into()),
    ..Default::default()
  };
  let mut ctx = EvaluationContext::new(options, fs).unwrap();

  let mut transformer = MockTransformer::new();
  transformer.expect_cache_key().return_const("mock".to_string());
  transformer.expect_transform().times(1).returning(|code: &str, _: &Path| {
    Ok(TransformOutput {
      code: code.to_string(),
      map: None,
    })
  });
  ctx.set_transformer(transformer);

  let value = run(&mut ctx, "module.exports = require('lib');");
  assert_eq!(display(&mut ctx, &value), "lib");
}

#[test]
#[traced_test]
fn console_output_is_forwarded_to_tracing() {
  let (mut ctx, _) = context(&[]);
  run(
    &mut ctx,
    "console.warn('deprecated token'); console.log('hello from the sandbox'); module.exports = 1;",
  );
  assert!(logs_contain("deprecated token"));
  assert!(logs_contain("hello from the sandbox"));
}

#[test]
fn custom_resolvers() {
  let (mut ctx, _) = context(&[("/app/src/theme.js", "module.exports = 'aliased';")]);
  ctx.set_resolver(|specifier, _| match specifier.strip_prefix("@theme") {
    Some(rest) => Ok(PathBuf::from(format!("/app/src/theme{rest}.js"))),
    None => anyhow::bail!("Unknown alias {specifier}"),
  });

  let value = run(&mut ctx, "module.exports = require('@theme');");
  assert_eq!(display(&mut ctx, &value), "aliased");

  let error = evaluate(
    &mut ctx,
    EvaluateSource::Code("require('./relative');".into()),
    Path::new("/app/index.js"),
  )
  .err()
  .unwrap();
  assert_eq!(error.kind, ErrorKind::Resolve);
  assert_eq!(error.message, "Unknown alias ./relative");
}

#[test]
fn writes_the_compile_cache_to_disk() {
  use assert_fs::prelude::*;

  let dir = assert_fs::TempDir::new().unwrap();
  let source = dir.child("index.js");
  source.write_str("export const color = 'red';").unwrap();

  let options = EvaluatorOptions {
    cache_directory: Some(dir.path().join("cache")),
    ..Default::default()
  };
  {
    let fs = Arc::new(linaria_filesystem::os_file_system::OsFileSystem);
    let mut ctx = EvaluationContext::new(options, fs).unwrap();
    evaluate(
      &mut ctx,
      EvaluateSource::Code("export const color = 'red';".into()),
      source.path(),
    )
    .unwrap();
  }

  let cache = std::fs::read_to_string(dir.path().join("cache").join(COMPILE_CACHE_FILE)).unwrap();
  assert!(cache.contains("\"optsHash\""), "{cache}");
  assert!(cache.contains("index.js"), "{cache}");
}
