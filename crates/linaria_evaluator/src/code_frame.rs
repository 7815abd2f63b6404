use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const LINES_ABOVE: usize = 2;
const LINES_BELOW: usize = 2;

/// `[1]` file, `[2]` line, `[3]` column of a stack frame
static STACK_FRAME: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"([^ ():]+):(\d+)(?::(\d+))?").unwrap());

/// One based position in a source file
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct Location {
  pub line: usize,
  pub column: usize,
}

/// Source excerpt around a failing location
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFrame {
  pub code: String,
  pub file_path: Option<PathBuf>,
  pub location: Location,
  /// Printed next to the caret
  pub message: Option<String>,
}

impl CodeFrame {
  /// Lines around the location with a `>` gutter marker and a `^` under the
  /// column. `None` when the line is outside of the code.
  pub fn render(&self) -> Option<String> {
    let lines: Vec<&str> = self.code.lines().collect();
    let Location { line, column } = self.location;
    if line == 0 || line > lines.len() {
      return None;
    }

    let start = line.saturating_sub(LINES_ABOVE).max(1);
    let end = (line + LINES_BELOW).min(lines.len());
    let width = end.to_string().len();

    let mut out = Vec::new();
    for number in start..=end {
      let text = lines[number - 1];
      let marker = if number == line { '>' } else { ' ' };
      out.push(
        format!("{marker} {number:>width$} | {text}")
          .trim_end()
          .to_string(),
      );
      if number == line && column > 0 {
        let padding: String = text
          .chars()
          .take(column - 1)
          .map(|c| if c == '\t' { '\t' } else { ' ' })
          .collect();
        let mut caret = format!("  {:width$} | {padding}^", "");
        if let Some(message) = &self.message {
          caret.push(' ');
          caret.push_str(message);
        }
        out.push(caret);
      }
    }
    Some(out.join("\n"))
  }
}

/// Code of a module as the error reporting sees it
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameSources<'a> {
  /// The code that ran
  pub executed: &'a str,
  /// Serialized map from `executed` back to the code given to the transform
  pub map: Option<&'a str>,
  /// Code given to the transform
  pub source: Option<&'a str>,
  /// Serialized map from `source` back to the file as written
  pub input_map: Option<&'a str>,
}

/// Position and content one source map step further back
fn map_back(map: &str, location: Location) -> Option<(Location, Option<String>)> {
  if location.line == 0 {
    return None;
  }
  let map = sourcemap::SourceMap::from_slice(map.as_bytes()).ok()?;
  let token = map.lookup_token(
    (location.line - 1) as u32,
    location.column.saturating_sub(1) as u32,
  )?;
  let mapped = Location {
    line: token.get_src_line() as usize + 1,
    column: token.get_src_col() as usize + 1,
  };
  let content = map.get_source_contents(0).map(str::to_string);
  Some((mapped, content))
}

/// Best code and location to show for a location in the executed code,
/// preferring the file as written over the executed output
fn best_location(sources: &FrameSources<'_>, location: Location) -> (String, Location) {
  let Some((mapped, content)) = sources.map.and_then(|map| map_back(map, location)) else {
    return (sources.executed.to_string(), location);
  };
  let Some(code) = content.or_else(|| sources.source.map(str::to_string)) else {
    return (sources.executed.to_string(), location);
  };

  match sources.input_map.and_then(|map| map_back(map, mapped)) {
    Some((original, Some(original_code))) => (original_code, original),
    _ => (code, mapped),
  }
}

/// A rewritten stack for an error thrown while running `filename`.
///
/// Returns the rendered frame and the stack text
/// `"\nLinaria Preval Error:\n<frame>\n<frames>"`, where the frames start at
/// the first `    at` line and stop at the last one inside `filename`. `None`
/// when the stack never mentions the file.
pub fn prepare_stack(
  stack: &str,
  message: &str,
  filename: &Path,
  sources: &FrameSources<'_>,
) -> Option<(String, String)> {
  let basename = filename.file_name()?.to_string_lossy();
  let lines: Vec<&str> = stack.lines().collect();
  let last = lines.iter().rposition(|line| line.contains(&*basename))?;
  let lines = &lines[..=last];

  let file = STACK_FRAME.captures(lines[last])?.get(1)?.as_str();
  let first = lines.iter().position(|line| line.contains(file))?;
  let captures = STACK_FRAME.captures(lines[first])?;
  let location = Location {
    line: captures.get(2)?.as_str().parse().ok()?,
    column: captures
      .get(3)
      .and_then(|column| column.as_str().parse().ok())
      .unwrap_or(0),
  };

  let (code, location) = best_location(sources, location);
  let frame = CodeFrame {
    code,
    file_path: Some(filename.to_path_buf()),
    location,
    message: Some(message.to_string()),
  }
  .render()
  .unwrap_or_else(|| message.to_string());

  let first_trace = lines
    .iter()
    .position(|line| line.starts_with("    at "))
    .unwrap_or(lines.len());
  let stack = [
    "\nLinaria Preval Error:".to_string(),
    frame.clone(),
    lines[first_trace..].join("\n"),
  ]
  .join("\n");
  Some((frame, stack))
}

#[cfg(test)]
mod tests {
  use indoc::indoc;
  use pretty_assertions::assert_eq;

  use super::*;

  const CODE: &str = indoc! {r#"
    const a = 1;
    const b = 2;
    const c = missing;
    const d = 4;
    const e = 5;
    const f = 6;
  "#};

  #[test]
  fn test_render_two_lines_of_context() {
    let frame = CodeFrame {
      code: CODE.to_string(),
      file_path: None,
      location: Location { line: 3, column: 11 },
      message: Some("missing is not defined".into()),
    };
    assert_eq!(
      frame.render().unwrap(),
      indoc! {r#"
          1 | const a = 1;
          2 | const b = 2;
        > 3 | const c = missing;
            |           ^ missing is not defined
          4 | const d = 4;
          5 | const e = 5;"#}
    );
  }

  #[test]
  fn test_render_out_of_range() {
    let frame = CodeFrame {
      code: "a".into(),
      file_path: None,
      location: Location { line: 4, column: 1 },
      message: None,
    };
    assert_eq!(frame.render(), None);
  }

  #[test]
  fn test_prepare_stack_keeps_frames_up_to_the_module() {
    let stack = indoc! {r#"
      ReferenceError: missing is not defined
          at /src/theme.js:3:11
          at require (linaria:require)
          at /src/index.js:1:1"#};
    let (frame, cleaned) = prepare_stack(
      stack,
      "missing is not defined",
      Path::new("/src/theme.js"),
      &FrameSources {
        executed: CODE,
        ..Default::default()
      },
    )
    .unwrap();

    assert!(frame.contains("> 3 | const c = missing;"), "{frame}");
    assert_eq!(
      cleaned,
      format!("\nLinaria Preval Error:\n{frame}\n    at /src/theme.js:3:11")
    );
  }

  #[test]
  fn test_prepare_stack_without_the_module() {
    let stack = "Error: boom\n    at /src/other.js:1:1";
    let sources = FrameSources {
      executed: CODE,
      ..Default::default()
    };
    assert_eq!(
      prepare_stack(stack, "boom", Path::new("/src/theme.js"), &sources),
      None
    );
  }
}
