//! A detached `document` for code that inspects the DOM at import time.

use crate::sandbox::Sandbox;

const PRELUDE: &str = include_str!("document.js");

pub(super) fn install(sandbox: &mut Sandbox) {
  let init = match sandbox.compile_function(PRELUDE, "linaria:document", &["window"]) {
    Ok(init) => init,
    Err(error) => {
      tracing::error!(%error, "Failed to compile the sandbox document");
      return;
    }
  };
  let window = sandbox.global();
  if let Err(error) = sandbox.call(&init, window.clone(), &[window]) {
    tracing::error!(%error, "Failed to install the sandbox document");
  }
}
