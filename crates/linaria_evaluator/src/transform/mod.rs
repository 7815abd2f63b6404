use std::fmt::Debug;
use std::path::Path;

use anyhow::anyhow;
use linaria_swc_runner::{emit_module, parse_module, EmitOutput};
use swc_core::common::sync::Lrc;
use swc_core::common::{Globals, Mark, SourceMap, GLOBALS};
use swc_core::ecma::ast::Program;
use swc_core::ecma::transforms::base::fixer::fixer;
use swc_core::ecma::transforms::base::hygiene::hygiene;
use swc_core::ecma::transforms::base::resolver;
use swc_core::ecma::transforms::typescript::strip;
use swc_core::ecma::visit::VisitMutWith;

pub use dynamic_import::DynamicImportNoop;
pub use esm_to_cjs::EsmToCjsReplacer;

mod dynamic_import;
mod esm_to_cjs;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformOutput {
  pub code: String,
  /// Serialized source map back to the input, with `sourcesContent`
  pub map: Option<String>,
}

/// Turns module sources into CommonJS the sandbox can run.
///
/// Build tools plug in their own pipeline with
/// [`crate::EvaluationContext::set_transformer`].
#[mockall::automock]
pub trait Transformer: Debug {
  fn transform(&self, code: &str, filename: &Path) -> anyhow::Result<TransformOutput>;

  /// Part of the options hash of cached compilations. Must change whenever
  /// `transform` output would.
  fn cache_key(&self) -> String;
}

/// SWC pipeline: TypeScript stripping, dynamic imports made inert and ES
/// modules rewritten to CommonJS
#[derive(Clone, Debug, Default)]
pub struct DefaultTransformer;

impl Transformer for DefaultTransformer {
  #[tracing::instrument(level = "debug", skip_all, fields(filename = %filename.display()))]
  fn transform(&self, code: &str, filename: &Path) -> anyhow::Result<TransformOutput> {
    let name = filename.to_string_lossy();
    let source_map = Lrc::new(SourceMap::default());
    let module = parse_module(code, &name, &source_map)?;
    let is_typescript = name.ends_with(".ts") || name.ends_with(".tsx");

    GLOBALS.set(&Globals::new(), || {
      let unresolved_mark = Mark::new();
      let top_level_mark = Mark::new();

      let mut program = Program::Module(module);
      program.mutate(resolver(unresolved_mark, top_level_mark, is_typescript));
      if is_typescript {
        program.mutate(strip(unresolved_mark, top_level_mark));
      }
      program.visit_mut_with(&mut DynamicImportNoop);
      program.visit_mut_with(&mut EsmToCjsReplacer::new(unresolved_mark));
      program.mutate(hygiene());
      program.mutate(fixer(None));

      let Program::Module(module) = program else {
        return Err(anyhow!("Expected {name} to stay a module"));
      };
      let EmitOutput { code, map } = emit_module(&module, &source_map, true)?;
      Ok(TransformOutput { code, map })
    })
  }

  fn cache_key(&self) -> String {
    format!("swc-commonjs@{}", env!("CARGO_PKG_VERSION"))
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;
  use linaria_sandbox::{Sandbox, SandboxOptions, Value};

  use super::*;

  /// Run transformed code with a `require` that hands out `dependency` for
  /// every specifier, returning the module exports
  fn run(code: &str, filename: &str, dependency: &str) -> (Sandbox, Value) {
    let output = DefaultTransformer
      .transform(code, Path::new(filename))
      .unwrap();

    let mut sandbox = Sandbox::new(SandboxOptions::default());
    let dependency = sandbox
      .compile_function(dependency, "/dependency.js", &["exports", "module"])
      .unwrap();
    let dependency_exports = sandbox.new_object();
    let dependency_module = sandbox.new_object();
    sandbox
      .set(&dependency_module, "exports", dependency_exports.clone())
      .unwrap();
    sandbox
      .call(
        &dependency,
        Value::Undefined,
        &[dependency_exports, dependency_module.clone()],
      )
      .unwrap();
    let dependency_exports = sandbox.get(&dependency_module, "exports").unwrap();
    let require = sandbox.new_native_function("require", 1, move |_, _, _| {
      Ok(dependency_exports.clone())
    });

    let exports = sandbox.new_object();
    let func = sandbox
      .compile_function(&output.code, filename, &["exports", "require"])
      .unwrap_or_else(|error| panic!("{error}\n{}", output.code));
    sandbox
      .call(&func, Value::Undefined, &[exports.clone(), require])
      .unwrap_or_else(|error| panic!("{error}\n{}", output.code));
    (sandbox, exports)
  }

  fn read(sandbox: &mut Sandbox, exports: &Value, key: &str) -> String {
    let value = sandbox.get(exports, key).unwrap();
    sandbox.to_display_string(&value).unwrap()
  }

  #[test]
  fn test_default_and_named_imports() {
    let (mut sandbox, exports) = run(
      indoc! {r#"
        import answer, { unit } from './sample';
        export const result = 'The answer is ' + answer + unit;
      "#},
      "/src/index.js",
      "exports.__esModule = true; exports.default = 42; exports.unit = 'px';",
    );
    assert_eq!(read(&mut sandbox, &exports, "result"), "The answer is 42px");
    assert_eq!(read(&mut sandbox, &exports, "__esModule"), "true");
  }

  #[test]
  fn test_default_import_of_commonjs() {
    let (mut sandbox, exports) = run(
      "import theme from './theme'; export default theme.color;",
      "/src/index.js",
      "module.exports = { color: 'red' };",
    );
    assert_eq!(read(&mut sandbox, &exports, "default"), "red");
  }

  #[test]
  fn test_reexports_and_namespaces() {
    let (mut sandbox, exports) = run(
      indoc! {r#"
        import * as tokens from './tokens';
        export { small as space } from './tokens';
        export * from './tokens';
        export function size() {
          return tokens.small * 2;
        }
        export let doubled = size();
      "#},
      "/src/index.js",
      "exports.small = 4; exports.large = 16;",
    );
    assert_eq!(read(&mut sandbox, &exports, "space"), "4");
    assert_eq!(read(&mut sandbox, &exports, "large"), "16");
    assert_eq!(read(&mut sandbox, &exports, "doubled"), "8");
  }

  #[test]
  fn test_strips_typescript() {
    let (mut sandbox, exports) = run(
      indoc! {r#"
        import type { Theme } from './theme';
        interface Props { size: number }
        const props: Props = { size: 2 };
        export const width = (props.size as number) * 10 + 'px';
      "#},
      "/src/styles.ts",
      "",
    );
    assert_eq!(read(&mut sandbox, &exports, "width"), "20px");
  }

  #[test]
  fn test_syntax_errors_are_reported() {
    let error = DefaultTransformer
      .transform("export const = 1;", Path::new("/src/broken.js"))
      .unwrap_err();
    assert!(!error.to_string().is_empty());
  }

  #[test]
  fn test_source_map_embeds_the_input() {
    let code = "export const a = 1;\n";
    let output = DefaultTransformer
      .transform(code, Path::new("/src/a.js"))
      .unwrap();
    let map = sourcemap::SourceMap::from_slice(output.map.unwrap().as_bytes()).unwrap();
    assert_eq!(map.get_source_contents(0), Some(code));
  }
}
