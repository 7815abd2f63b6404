//! Node core modules as seen from evaluated code.

/// How `require` treats a Node core module
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeBuiltin {
  /// Bundlers ship a browser polyfill, the sandbox hands out its own
  Polyfilled,
  /// Known to bundlers as an empty module, `require` returns `null`
  Empty,
  /// Anything else from Node's core, importing it is an error
  Unsupported,
}

const BUILTINS: [(&str, bool); 32] = [
  ("assert", true),
  ("buffer", true),
  ("child_process", false),
  ("cluster", false),
  ("console", true),
  ("constants", true),
  ("crypto", true),
  ("dgram", false),
  ("dns", false),
  ("domain", true),
  ("events", true),
  ("fs", false),
  ("http", true),
  ("https", true),
  ("module", false),
  ("net", false),
  ("os", true),
  ("path", true),
  ("punycode", true),
  ("process", true),
  ("querystring", true),
  ("readline", false),
  ("repl", false),
  ("stream", true),
  ("string_decoder", true),
  ("sys", true),
  ("timers", true),
  ("tls", false),
  ("tty", true),
  ("url", true),
  ("util", true),
  ("vm", true),
];

const POLYFILLED_EXTRA: [&str; 1] = ["zlib"];

const UNSUPPORTED: [&str; 11] = [
  "async_hooks",
  "diagnostics_channel",
  "http2",
  "inspector",
  "perf_hooks",
  "trace_events",
  "v8",
  "wasi",
  "worker_threads",
  "fs/promises",
  "stream/promises",
];

/// Classify `id` when it names a Node core module
pub fn node_builtin(id: &str) -> Option<NodeBuiltin> {
  let name = id.strip_prefix("node:").unwrap_or(id);
  if let Some((_, polyfilled)) = BUILTINS.iter().find(|(builtin, _)| *builtin == name) {
    return Some(if *polyfilled {
      NodeBuiltin::Polyfilled
    } else {
      NodeBuiltin::Empty
    });
  }
  if POLYFILLED_EXTRA.contains(&name) {
    return Some(NodeBuiltin::Polyfilled);
  }
  if UNSUPPORTED.contains(&name) || id.starts_with("node:") {
    return Some(NodeBuiltin::Unsupported);
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_classifies_core_modules() {
    assert_eq!(node_builtin("path"), Some(NodeBuiltin::Polyfilled));
    assert_eq!(node_builtin("node:events"), Some(NodeBuiltin::Polyfilled));
    assert_eq!(node_builtin("zlib"), Some(NodeBuiltin::Polyfilled));
    assert_eq!(node_builtin("fs"), Some(NodeBuiltin::Empty));
    assert_eq!(node_builtin("child_process"), Some(NodeBuiltin::Empty));
    assert_eq!(node_builtin("worker_threads"), Some(NodeBuiltin::Unsupported));
    assert_eq!(node_builtin("node:sqlite"), Some(NodeBuiltin::Unsupported));
    assert_eq!(node_builtin("./path"), None);
    assert_eq!(node_builtin("polished"), None);
  }
}
