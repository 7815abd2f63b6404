//! A small JavaScript interpreter that runs shaken style modules in an
//! isolated realm.
//!
//! Each [`Sandbox`] owns its global object, intrinsics, timers and console
//! buffer. Code is compiled from CommonJS source with
//! [`Sandbox::compile_function`] and runs in strict mode: it cannot reach the
//! host process, the file system or another sandbox.

pub use error::{ErrorType, SandboxError, Throw};
pub use object::ObjRef;
pub use sandbox::{ConsoleEntry, ConsoleLevel, Sandbox, SandboxOptions, DEFAULT_MAX_CALL_DEPTH};
pub use value::Value;

mod builtins;
mod call;
mod class;
mod env;
mod error;
mod eval;
mod exec;
mod function;
mod object;
mod ops;
mod sandbox;
mod value;
