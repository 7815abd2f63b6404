use std::collections::{HashMap, HashSet};

use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::*;
use swc_core::ecma::atoms::Atom;
use swc_core::ecma::visit::{Visit, VisitMutWith, VisitWith};

use crate::arena::{NodeArena, NodeId, NodeKey, NodeKind};
use crate::deps_graph::ExternalDep;
use crate::graph_builder::build_graph;
use crate::prune::Pruner;
use crate::PREVAL_EXPORT;

/// Something the caller wants the value of
#[derive(Debug, Clone, Copy)]
pub enum ShakeTarget<'a> {
  /// An expression inside the module being shaken
  Expr(&'a Expr),
  /// A top-level binding
  Name(&'a str),
}

/// A [`ShakeTarget`] resolved against the arena of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetId {
  Node(NodeId),
  Name(Atom),
}

#[derive(Debug, thiserror::Error)]
pub enum ShakeError {
  #[error("Target expression at position {index} is not part of the module")]
  TargetNotFound { index: usize },
  #[error("Node {node} is not an expression of the module")]
  InvalidTarget { node: NodeId },
}

/// Map targets to arena ids of `module`. The ids are valid for any clone of
/// `module` as well.
pub fn locate_targets(
  module: &Module,
  targets: &[ShakeTarget<'_>],
) -> Result<Vec<TargetId>, ShakeError> {
  let arena = NodeArena::build(module);
  targets
    .iter()
    .enumerate()
    .map(|(index, target)| match target {
      ShakeTarget::Expr(expr) => arena
        .id_of(NodeKind::Expr, *expr)
        .map(TargetId::Node)
        .ok_or(ShakeError::TargetNotFound { index }),
      ShakeTarget::Name(name) => Ok(TargetId::Name(Atom::from(*name))),
    })
    .collect()
}

/// Reduce a copy of `module` to the code needed by `targets` and by its
/// exports.
///
/// The result ends with
/// `module.exports.__linariaPreval = [() => target, ...]`, one thunk per
/// target in the given order. The second element lists the imports and
/// requires that survived.
pub fn shake(
  module: &Module,
  targets: &[ShakeTarget<'_>],
) -> Result<(Module, Vec<ExternalDep>), ShakeError> {
  let targets = locate_targets(module, targets)?;
  let mut shaken = module.clone();
  let external_deps = shake_in_place(&mut shaken, &targets)?;
  Ok((shaken, external_deps))
}

/// Same as [`shake`] but modifies `module`
#[tracing::instrument(level = "debug", skip_all, fields(targets = targets.len()))]
pub fn shake_in_place(
  module: &mut Module,
  targets: &[TargetId],
) -> Result<Vec<ExternalDep>, ShakeError> {
  let (alive, thunks, external_deps) = {
    let arena = NodeArena::build(module);
    let graph = build_graph(module, &arena);

    let mut roots = Vec::new();
    for target in targets {
      match target {
        TargetId::Node(node) => {
          if node.index() >= arena.len() || arena.kind(*node) != NodeKind::Expr {
            return Err(ShakeError::InvalidTarget { node: *node });
          }
          roots.push(*node);
        }
        TargetId::Name(name) => roots.extend(graph.get_leafs(&[name.as_ref()])[0]),
      }
    }

    let alive = graph.get_alive(&roots);
    if tracing::enabled!(tracing::Level::TRACE) {
      let mut ids: Vec<NodeId> = alive.iter().copied().collect();
      ids.sort();
      tracing::trace!(alive = ?ids, total = arena.len(), "Alive nodes");
    }

    let thunks = target_bodies(module, &arena, &alive, targets)?;
    let external_deps = graph.alive_external_deps(&alive);
    let alive: HashSet<NodeKey> = alive.iter().map(|id| arena.key(*id)).collect();
    (alive, thunks, external_deps)
  };

  module.visit_mut_with(&mut Pruner::new(&alive));
  module.body.push(preval_export(thunks));

  tracing::debug!(
    external_deps = external_deps.len(),
    "Shaken module down to {} items",
    module.body.len()
  );
  Ok(external_deps)
}

/// Pruned copies of the target expressions
fn target_bodies(
  module: &Module,
  arena: &NodeArena,
  alive: &HashSet<NodeId>,
  targets: &[TargetId],
) -> Result<Vec<Expr>, ShakeError> {
  let mut collector = ExprCollector {
    wanted: targets
      .iter()
      .filter_map(|target| match target {
        TargetId::Node(node) => Some(arena.key(*node)),
        TargetId::Name(..) => None,
      })
      .collect(),
    found: HashMap::new(),
  };
  module.visit_with(&mut collector);

  targets
    .iter()
    .map(|target| match target {
      TargetId::Node(node) => {
        let mut expr = collector
          .found
          .get(&arena.key(*node))
          .cloned()
          .ok_or(ShakeError::InvalidTarget { node: *node })?;

        let keys: HashSet<NodeKey> = {
          let local = NodeArena::build_expr(&expr);
          local
            .ids()
            .filter(|id| alive.contains(&node.offset(id.index())))
            .map(|id| local.key(id))
            .collect()
        };
        expr.visit_mut_with(&mut Pruner::new(&keys));
        Ok(expr)
      }
      TargetId::Name(name) => Ok(Expr::Ident(Ident::new_no_ctxt(name.clone(), DUMMY_SP))),
    })
    .collect()
}

struct ExprCollector {
  wanted: HashSet<NodeKey>,
  found: HashMap<NodeKey, Expr>,
}

impl Visit for ExprCollector {
  fn visit_expr(&mut self, node: &Expr) {
    let key = NodeKey::of(NodeKind::Expr, node);
    if self.wanted.contains(&key) {
      self.found.insert(key, node.clone());
    }
    node.visit_children_with(self);
  }
}

/// `module.exports.__linariaPreval = [() => a, () => b]`
fn preval_export(bodies: Vec<Expr>) -> ModuleItem {
  let elems = bodies
    .into_iter()
    .map(|body| {
      let body = match body {
        Expr::Object(..) | Expr::Seq(..) => Expr::Paren(ParenExpr {
          span: DUMMY_SP,
          expr: Box::new(body),
        }),
        body => body,
      };
      Some(ExprOrSpread {
        spread: None,
        expr: Box::new(Expr::Arrow(ArrowExpr {
          span: DUMMY_SP,
          ctxt: Default::default(),
          params: vec![],
          body: Box::new(BlockStmtOrExpr::Expr(Box::new(body))),
          is_async: false,
          is_generator: false,
          type_params: None,
          return_type: None,
        })),
      })
    })
    .collect();

  let module_exports = Expr::Member(MemberExpr {
    span: DUMMY_SP,
    obj: Box::new(Expr::Ident(Ident::new_no_ctxt("module".into(), DUMMY_SP))),
    prop: MemberProp::Ident(IdentName::new("exports".into(), DUMMY_SP)),
  });
  let target = MemberExpr {
    span: DUMMY_SP,
    obj: Box::new(module_exports),
    prop: MemberProp::Ident(IdentName::new(PREVAL_EXPORT.into(), DUMMY_SP)),
  };

  ModuleItem::Stmt(Stmt::Expr(ExprStmt {
    span: DUMMY_SP,
    expr: Box::new(Expr::Assign(AssignExpr {
      span: DUMMY_SP,
      op: AssignOp::Assign,
      left: AssignTarget::Simple(SimpleAssignTarget::Member(target)),
      right: Box::new(Expr::Array(ArrayLit {
        span: DUMMY_SP,
        elems,
      })),
    })),
  }))
}
