//! Reduces a module to the code needed to compute a set of target
//! expressions.
//!
//! The module is indexed into a [`NodeArena`], scopes are resolved by the
//! [`ScopeManager`], the [`DependencyGraph`] records which nodes keep which
//! other nodes alive, and [`shake`] prunes everything that is not reachable
//! from the targets or from the module's exports.

pub use arena::{NodeArena, NodeEntry, NodeId, NodeKey, NodeKind};
pub use deps_graph::{DependencyGraph, ExternalDep};
pub use graph_builder::build_graph;
pub use scope::{BindingKey, ScopeId, ScopeKind, ScopeManager};
pub use shaker::{locate_targets, shake, shake_in_place, ShakeError, ShakeTarget, TargetId};

mod arena;
mod deps_graph;
mod graph_builder;
mod prune;
mod scope;
mod shaker;

/// Name of the export that carries the evaluation thunks
pub const PREVAL_EXPORT: &str = "__linariaPreval";
