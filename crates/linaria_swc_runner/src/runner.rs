use std::path::PathBuf;
use std::string::FromUtf8Error;

use swc_core::common::input::StringInput;
use swc_core::common::source_map::SourceMapGenConfig;
use swc_core::common::sync::Lrc;
use swc_core::common::{FileName, Globals, Mark, SourceMap, Spanned, GLOBALS};
use swc_core::ecma::ast::{Module, Script};
use swc_core::ecma::codegen::text_writer::JsWriter;
use swc_core::ecma::parser::lexer::Lexer;
use swc_core::ecma::parser::{EsSyntax, Parser, Syntax, TsSyntax};
use swc_core::ecma::transforms::base::resolver;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};

pub struct RunContext {
  /// Source-map in use
  pub source_map: Lrc<SourceMap>,
  /// Global mark from SWC resolver
  pub global_mark: Mark,
  /// Unresolved mark from SWC resolver
  pub unresolved_mark: Mark,
}

pub struct RunVisitResult<V> {
  pub output_code: String,
  #[allow(unused)]
  pub visitor: V,
  pub source_map: Vec<u8>,
}

/// Runner of SWC transformations
///
/// * Parse `code` with SWC
/// * Run a visitor over it
/// * Return the result
///
pub fn run_visit<V: VisitMut>(
  code: &str,
  make_visit: impl FnOnce(RunContext) -> V,
) -> Result<RunVisitResult<V>, RunWithTransformationError> {
  let (output_code, visitor, source_map) =
    run_with_transformation(code, |run_test_context: RunContext, module: &mut Module| {
      let mut visit = make_visit(run_test_context);
      module.visit_mut_with(&mut visit);
      visit
    })?;
  Ok(RunVisitResult {
    output_code,
    visitor,
    source_map,
  })
}

#[derive(Debug, thiserror::Error)]
pub enum RunWithTransformationError {
  #[error("{message} ({line}:{column})")]
  SwcParse {
    message: String,
    line: usize,
    column: usize,
  },
  #[error("IO Error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Invalid utf-8 output: {0}")]
  InvalidUtf8Output(#[from] FromUtf8Error),
  #[error("Failed to generate source map")]
  SourceMap(#[from] sourcemap::Error),
}

/// Picks the parser syntax from the file extension.
///
/// JSX is accepted in plain `.js` files too, as style modules are frequently
/// written next to components.
pub fn syntax_for_filename(name: &str) -> Syntax {
  if name.ends_with(".ts") || name.ends_with(".tsx") || name.ends_with(".cts") {
    Syntax::Typescript(TsSyntax {
      tsx: name.ends_with(".tsx"),
      decorators: true,
      ..Default::default()
    })
  } else {
    Syntax::Es(EsSyntax {
      jsx: !name.ends_with(".mjs") && !name.ends_with(".cjs"),
      decorators: true,
      export_default_from: true,
      import_attributes: true,
      ..Default::default()
    })
  }
}

fn file_name(filename: &str) -> FileName {
  if filename.is_empty() {
    FileName::Anon
  } else {
    FileName::Real(PathBuf::from(filename))
  }
}

fn parse_error(
  source_map: &SourceMap,
  error: swc_core::ecma::parser::error::Error,
) -> RunWithTransformationError {
  let loc = source_map.lookup_char_pos(error.span().lo);
  RunWithTransformationError::SwcParse {
    message: error.kind().msg().to_string(),
    line: loc.line,
    column: loc.col.0,
  }
}

/// Parse `code` as an ES module, registering it in `source_map` under `filename`.
pub fn parse_module(
  code: &str,
  filename: &str,
  source_map: &Lrc<SourceMap>,
) -> Result<Module, RunWithTransformationError> {
  let source_file = source_map.new_source_file(Lrc::new(file_name(filename)), code.into());
  let lexer = Lexer::new(
    syntax_for_filename(filename),
    Default::default(),
    StringInput::from(&*source_file),
    None,
  );

  let mut parser = Parser::new_from(lexer);
  let module = parser
    .parse_module()
    .map_err(|error| parse_error(source_map, error))?;

  if let Some(error) = parser.take_errors().into_iter().next() {
    return Err(parse_error(source_map, error));
  }

  Ok(module)
}

/// Parse `code` as a classic script. CommonJS sources go through here before
/// they are executed.
pub fn parse_script(
  code: &str,
  filename: &str,
  source_map: &Lrc<SourceMap>,
) -> Result<Script, RunWithTransformationError> {
  let source_file = source_map.new_source_file(Lrc::new(file_name(filename)), code.into());
  let lexer = Lexer::new(
    Syntax::Es(EsSyntax {
      allow_return_outside_function: true,
      ..Default::default()
    }),
    Default::default(),
    StringInput::from(&*source_file),
    None,
  );

  let mut parser = Parser::new_from(lexer);
  let script = parser
    .parse_script()
    .map_err(|error| parse_error(source_map, error))?;

  if let Some(error) = parser.take_errors().into_iter().next() {
    return Err(parse_error(source_map, error));
  }

  Ok(script)
}

// Embeds original sources so code frames can be rendered from the map alone.
struct SourceMapConfig;

impl SourceMapGenConfig for SourceMapConfig {
  fn file_name_to_source(&self, f: &FileName) -> String {
    f.to_string()
  }

  fn inline_sources_content(&self, _f: &FileName) -> bool {
    true
  }

  fn skip(&self, f: &FileName) -> bool {
    matches!(f, FileName::MacroExpansion | FileName::Internal(..))
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmitOutput {
  pub code: String,
  /// Serialized source map with `sourcesContent`
  pub map: Option<String>,
}

/// Generate code (and optionally a source map) for a module.
pub fn emit_module(
  module: &Module,
  source_map: &Lrc<SourceMap>,
  with_source_map: bool,
) -> Result<EmitOutput, RunWithTransformationError> {
  let mut line_pos_buffer = vec![];
  let mut output_buffer = vec![];
  {
    let writer = JsWriter::new(
      source_map.clone(),
      "\n",
      &mut output_buffer,
      if with_source_map {
        Some(&mut line_pos_buffer)
      } else {
        None
      },
    );
    let mut emitter = swc_core::ecma::codegen::Emitter {
      cfg: Default::default(),
      cm: source_map.clone(),
      comments: None,
      wr: writer,
    };
    emitter.emit_module(module)?;
  }

  let code = String::from_utf8(output_buffer)?;
  let map = if with_source_map {
    let mut output_map_buffer = vec![];
    source_map
      .build_source_map_with_config(&line_pos_buffer, None, SourceMapConfig)
      .to_writer(&mut output_map_buffer)?;
    Some(String::from_utf8(output_map_buffer)?)
  } else {
    None
  };

  Ok(EmitOutput { code, map })
}

type RunWithTransformationOutput<R> = (String, R, Vec<u8>);

/// Parse code, run resolver over it, then run the `tranform` function with the parsed module
/// codegen and return the results.
fn run_with_transformation<R>(
  code: &str,
  transform: impl FnOnce(RunContext, &mut Module) -> R,
) -> Result<RunWithTransformationOutput<R>, RunWithTransformationError> {
  let source_map = Lrc::new(SourceMap::default());
  let mut module = parse_module(code, "", &source_map)?;

  GLOBALS.set(
    &Globals::new(),
    || -> Result<RunWithTransformationOutput<R>, RunWithTransformationError> {
      let global_mark = Mark::new();
      let unresolved_mark = Mark::new();
      module.visit_mut_with(&mut resolver(unresolved_mark, global_mark, false));

      let context = RunContext {
        source_map: source_map.clone(),
        global_mark,
        unresolved_mark,
      };
      let result = transform(context, &mut module);

      let EmitOutput { code, map } = emit_module(&module, &source_map, true)?;
      Ok((code, result, map.unwrap_or_default().into_bytes()))
    },
  )
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use swc_core::ecma::ast::{Lit, Str};
  use swc_core::ecma::visit::VisitMut;

  use super::*;

  #[test]
  fn test_example() {
    struct Visitor;
    impl VisitMut for Visitor {
      fn visit_mut_lit(&mut self, n: &mut Lit) {
        *n = Lit::Str(Str::from("replacement"));
      }
    }

    let code = r#"console.log('test!')"#;
    let RunVisitResult { output_code, .. } = run_visit(code, |_: RunContext| Visitor).unwrap();
    assert_eq!(
      output_code,
      r#"console.log("replacement");
"#
    );
  }

  #[test]
  fn test_parse_error_has_location() {
    let source_map = Lrc::new(SourceMap::default());
    let error = parse_module("const a = ;", "/app/index.js", &source_map).unwrap_err();
    match error {
      RunWithTransformationError::SwcParse { line, .. } => assert_eq!(line, 1),
      other => panic!("unexpected error {other:?}"),
    }
  }

  #[test]
  fn test_typescript_is_parsed_by_extension() {
    let source_map = Lrc::new(SourceMap::default());
    assert!(parse_module("const a: number = 1;", "/app/index.ts", &source_map).is_ok());
    assert!(parse_module("const a: number = 1;", "/app/index.js", &source_map).is_err());
  }

  #[test]
  fn test_emit_embeds_sources_content() {
    let source_map = Lrc::new(SourceMap::default());
    let module = parse_module("export const a = 1;", "/app/index.js", &source_map).unwrap();
    let output = emit_module(&module, &source_map, true).unwrap();
    assert_eq!(output.code, "export const a = 1;\n");

    let map = sourcemap::SourceMap::from_slice(output.map.unwrap().as_bytes()).unwrap();
    assert_eq!(map.get_source_contents(0), Some("export const a = 1;"));
  }

  #[test]
  fn test_parse_script_allows_top_level_return() {
    let source_map = Lrc::new(SourceMap::default());
    let script = parse_script("module.exports = 1; return;", "/app/a.js", &source_map).unwrap();
    assert_eq!(script.body.len(), 2);
  }
}
