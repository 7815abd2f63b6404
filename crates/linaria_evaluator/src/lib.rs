//! Build-time evaluation of style expressions.
//!
//! [`evaluate_expressions`] shakes a module down to the expressions a caller
//! needs, runs what is left in the sandbox of an [`EvaluationContext`] and
//! returns one value or error per expression. Modules required along the
//! way are resolved, transformed to CommonJS and executed by the context's
//! loader, with transform output kept in a [`CompileCache`].

pub use builtins::{node_builtin, NodeBuiltin};
pub use code_frame::{prepare_stack, CodeFrame, FrameSources, Location};
pub use compile_cache::{CompileCache, CompileCacheEntry, CACHE_VERSION};
pub use context::EvaluationContext;
pub use error::{ErrorKind, EvaluationError};
pub use error_queue::ErrorQueue;
pub use evaluate::{
  evaluate, evaluate_expressions, EvaluateOutput, EvaluateSource, EvaluatedValue,
  ExpressionsOutput,
};
pub use module::{node_module_paths, Module, ModuleState};
pub use options::{EvaluatorOptions, COMPILE_CACHE_FILE};
pub use resolver::{NodeResolver, Resolve};
pub use transform::{DefaultTransformer, MockTransformer, TransformOutput, Transformer};
pub use validate::throw_if_invalid;

mod builtins;
mod code_frame;
mod compile_cache;
mod context;
mod error;
mod error_queue;
mod evaluate;
mod module;
mod options;
mod resolver;
pub mod transform;
mod validate;
