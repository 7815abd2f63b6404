use std::collections::HashMap;

use indexmap::IndexSet;
use swc_core::ecma::ast::*;
use swc_core::ecma::atoms::Atom;
use swc_core::ecma::visit::{Visit, VisitWith};

use crate::arena::{skip_types, NodeArena, NodeId, NodeKind};
use crate::deps_graph::{DependencyGraph, ExternalDep};
use crate::scope::ScopeManager;
use crate::PREVAL_EXPORT;

/// Build the dependency graph of `module`.
///
/// Edges point from a node to what it needs. Most nodes need all of their
/// children. Statement lists, declarator lists and destructuring patterns
/// are the exception: there the children need the container instead, so a
/// block can stay while some of its statements go.
pub fn build_graph(module: &Module, arena: &NodeArena) -> DependencyGraph {
  let scope = ScopeManager::build(module, arena);
  let mut builder = GraphBuilder {
    arena,
    graph: DependencyGraph::new(scope),
    closure_writes: HashMap::new(),
    function_bindings: HashMap::new(),
    calls: Vec::new(),
  };
  module.visit_with(&mut builder);
  // functions may be declared after the calls that run them
  builder.link_calls();
  builder.graph
}

/// A function a call may run
#[derive(Clone, Copy)]
enum Called {
  /// A binding that may hold a function
  Binding(NodeId),
  /// A function or arrow written at the call
  Function(NodeId),
}

struct GraphBuilder<'a> {
  arena: &'a NodeArena,
  graph: DependencyGraph,
  /// Declarations outside of a function that its body writes to
  closure_writes: HashMap<NodeId, IndexSet<NodeId>>,
  /// Declaration of a name bound to a function, and that function
  function_bindings: HashMap<NodeId, NodeId>,
  calls: Vec<(NodeId, Vec<Called>)>,
}

impl GraphBuilder<'_> {
  fn id<T>(&self, kind: NodeKind, node: &T) -> Option<NodeId> {
    self.arena.id_of(kind, node)
  }

  fn edge(&mut self, dependent: Option<NodeId>, dependency: Option<NodeId>) {
    if let (Some(dependent), Some(dependency)) = (dependent, dependency) {
      self.graph.add_edge(dependent, dependency);
    }
  }

  fn tie(&mut self, a: Option<NodeId>, b: Option<NodeId>) {
    self.edge(a, b);
    self.edge(b, a);
  }

  fn depend_on_children(&mut self, id: NodeId) {
    let arena = self.arena;
    for child in arena.children(id) {
      self.graph.add_edge(id, child);
    }
  }

  fn children_depend_on(&mut self, id: NodeId) {
    let arena = self.arena;
    for child in arena.children(id) {
      self.graph.add_edge(child, id);
    }
  }

  fn depend_on_parent(&mut self, id: NodeId) {
    if let Some(parent) = self.arena.parent(id) {
      self.graph.add_edge(id, parent);
    }
  }

  fn reference(&mut self, id: NodeId) {
    let scope = self.graph.scope();
    let declaration = scope
      .resolve(id)
      .and_then(|key| scope.get_declaration(&key));
    if let Some(declaration) = declaration {
      self.graph.add_edge(id, declaration);
    }
  }

  fn closest_function(&self, id: NodeId) -> Option<NodeId> {
    self
      .arena
      .ancestors(id)
      .find(|ancestor| self.arena.flags(*ancestor).function_like)
  }

  /// Loop or switch a `break`/`continue` leaves
  fn jump_target(&self, id: NodeId) -> Option<NodeId> {
    self
      .arena
      .ancestors(id)
      .take_while(|ancestor| !self.arena.flags(*ancestor).function_like)
      .find(|ancestor| {
        let flags = self.arena.flags(*ancestor);
        flags.is_loop || flags.is_switch
      })
  }

  /// Whether a pattern node declares bindings, as opposed to being the
  /// target of an assignment.
  fn is_binding_pattern(&self, id: NodeId) -> bool {
    for ancestor in self.arena.ancestors(id) {
      match self.arena.kind(ancestor) {
        NodeKind::Pat | NodeKind::ObjectPatProp => continue,
        NodeKind::VarDeclarator | NodeKind::CatchClause => return true,
        _ => return self.arena.flags(ancestor).function_like,
      }
    }
    false
  }

  fn depend_on_binding_parent(&mut self, id: NodeId) {
    let Some(parent) = self.arena.parent(id) else {
      return;
    };
    if matches!(
      self.arena.kind(parent),
      NodeKind::Pat | NodeKind::ObjectPatProp | NodeKind::VarDeclarator | NodeKind::CatchClause
    ) {
      self.graph.add_edge(id, parent);
    }
  }

  /// `node` changes the value of `targets`. Whenever one of the mutated
  /// bindings is alive, so is the mutation and the statement around it.
  fn mark_mutation(&mut self, node: NodeId, targets: &MutationTargets<'_>) {
    let scope = self.graph.scope();
    let from = scope.scope_of(node);
    let mut mutated: Vec<NodeId> = targets
      .idents
      .iter()
      .filter_map(|ident| scope.lookup_declaration(from, &ident.sym))
      .collect();
    self.record_closure_writes(node, &mutated);
    if targets.this {
      mutated.extend(self.closest_function(node));
    }
    self.link_mutation(node, &mutated);
  }

  /// Edges between `node` and the declarations it changes
  fn link_mutation(&mut self, node: NodeId, mutated: &[NodeId]) {
    if mutated.is_empty() {
      return;
    }

    for declaration in mutated {
      self.graph.add_edge(*declaration, node);
      self.graph.add_edge(node, *declaration);
    }

    let arena = self.arena;
    for ancestor in arena.ancestors(node) {
      if arena.flags(ancestor).function_like {
        break;
      }
      self.graph.add_edge(node, ancestor);
      if matches!(
        arena.kind(ancestor),
        NodeKind::Stmt | NodeKind::ModuleDecl | NodeKind::VarDeclarator
      ) {
        break;
      }
    }
  }

  /// Remember which of `declarations` live outside of the functions around
  /// `node`, so that calls of those functions count as mutations too.
  /// Returns whether anything new was recorded.
  fn record_closure_writes(&mut self, node: NodeId, declarations: &[NodeId]) -> bool {
    let arena = self.arena;
    let mut changed = false;
    for ancestor in arena.ancestors(node) {
      if !arena.flags(ancestor).function_like {
        continue;
      }
      let inside = arena.subtree(ancestor);
      let outer: Vec<NodeId> = declarations
        .iter()
        .filter(|declaration| !inside.contains(&declaration.index()))
        .copied()
        .collect();
      if outer.is_empty() {
        break;
      }
      let writes = self.closure_writes.entry(ancestor).or_default();
      for declaration in outer {
        changed |= writes.insert(declaration);
      }
    }
    changed
  }

  /// Function node of an arrow or function expression
  fn function_node(&self, expr: &Expr) -> Option<NodeId> {
    match unwrap_parens(expr) {
      arrow @ Expr::Arrow(..) => self.id(NodeKind::Expr, arrow),
      Expr::Fn(f) => self.id(NodeKind::Function, &*f.function),
      _ => None,
    }
  }

  fn called(&self, expr: &Expr) -> Option<Called> {
    if let Some(function) = self.function_node(expr) {
      return Some(Called::Function(function));
    }
    let ident @ Expr::Ident(..) = unwrap_parens(expr) else {
      return None;
    };
    let id = self.id(NodeKind::Expr, ident)?;
    let scope = self.graph.scope();
    let declaration = scope.resolve(id).and_then(|key| scope.get_declaration(&key))?;
    Some(Called::Binding(declaration))
  }

  /// Outer bindings written by whatever `called` may run
  fn writes_of(&self, called: &[Called]) -> Vec<NodeId> {
    let mut writes = IndexSet::new();
    for called in called {
      let function = match called {
        Called::Function(function) => Some(*function),
        Called::Binding(declaration) => self.function_bindings.get(declaration).copied(),
      };
      if let Some(outer) = function.and_then(|function| self.closure_writes.get(&function)) {
        writes.extend(outer.iter().copied());
      }
    }
    writes.into_iter().collect()
  }

  /// A call runs its callee and any function passed to it. Whatever those
  /// write outside of themselves is written by the call, and so by the
  /// functions the call sits in.
  fn link_calls(&mut self) {
    let calls = std::mem::take(&mut self.calls);
    loop {
      let mut changed = false;
      for (call, called) in &calls {
        let writes = self.writes_of(called);
        changed |= self.record_closure_writes(*call, &writes);
      }
      if !changed {
        break;
      }
    }
    for (call, called) in &calls {
      let writes = self.writes_of(called);
      self.link_mutation(*call, &writes);
    }
  }

  fn require_declarator(&mut self, id: NodeId, declarator: &VarDeclarator) {
    let Some(init) = &declarator.init else {
      return;
    };
    let (source, member) = match unwrap_parens(init) {
      Expr::Member(member) => match required_source(&member.obj) {
        Some(source) => (source, prop_name(&member.prop)),
        None => return,
      },
      expr => match required_source(expr) {
        Some(source) => (source, None),
        None => return,
      },
    };
    let scope = self.graph.scope();
    if scope.lookup(scope.scope_of(id), "require").is_some() {
      return;
    }

    match &declarator.name {
      Pat::Ident(binding) => {
        if let Some(node) = self.id(NodeKind::Pat, &declarator.name) {
          self.graph.add_external_dep(
            ExternalDep {
              source,
              local: binding.id.clone(),
              imported: member,
            },
            node,
          );
        }
      }
      Pat::Object(object) if member.is_none() => {
        for prop in &object.props {
          match prop {
            ObjectPatProp::KeyValue(kv) => {
              let (Some(imported), Pat::Ident(binding)) = (prop_name_of_key(&kv.key), &*kv.value) else {
                continue;
              };
              if let Some(node) = self.id(NodeKind::Pat, &*kv.value) {
                self.graph.add_external_dep(
                  ExternalDep {
                    source: source.clone(),
                    local: binding.id.clone(),
                    imported: Some(imported),
                  },
                  node,
                );
              }
            }
            ObjectPatProp::Assign(assign) => {
              if let Some(node) = self.id(NodeKind::ObjectPatProp, prop) {
                self.graph.add_external_dep(
                  ExternalDep {
                    source: source.clone(),
                    local: assign.key.id.clone(),
                    imported: Some(assign.key.id.sym.clone()),
                  },
                  node,
                );
              }
            }
            ObjectPatProp::Rest(..) => {}
          }
        }
      }
      _ => {}
    }
  }
}

/// Bindings written by an assignment-like expression
#[derive(Default)]
struct MutationTargets<'a> {
  idents: Vec<&'a Ident>,
  this: bool,
}

impl<'a> MutationTargets<'a> {
  fn add_root(&mut self, expr: &'a Expr) {
    match expr {
      Expr::Ident(ident) => self.idents.push(ident),
      Expr::This(..) => self.this = true,
      Expr::Member(member) => self.add_root(&member.obj),
      Expr::Paren(paren) => self.add_root(&paren.expr),
      Expr::TsAs(e) => self.add_root(&e.expr),
      Expr::TsNonNull(e) => self.add_root(&e.expr),
      Expr::TsSatisfies(e) => self.add_root(&e.expr),
      Expr::OptChain(chain) => {
        if let OptChainBase::Member(member) = &*chain.base {
          self.add_root(&member.obj);
        }
      }
      _ => {}
    }
  }

  fn add_pattern(&mut self, pat: &'a Pat) {
    match pat {
      Pat::Ident(binding) => self.idents.push(&binding.id),
      Pat::Array(array) => {
        for elem in array.elems.iter().flatten() {
          self.add_pattern(elem);
        }
      }
      Pat::Object(object) => self.add_object_pattern(&object.props),
      Pat::Rest(rest) => self.add_pattern(&rest.arg),
      Pat::Assign(assign) => self.add_pattern(&assign.left),
      Pat::Expr(expr) => self.add_root(expr),
      Pat::Invalid(..) => {}
    }
  }

  fn add_object_pattern(&mut self, props: &'a [ObjectPatProp]) {
    for prop in props {
      match prop {
        ObjectPatProp::KeyValue(kv) => self.add_pattern(&kv.value),
        ObjectPatProp::Assign(assign) => self.idents.push(&assign.key.id),
        ObjectPatProp::Rest(rest) => self.add_pattern(&rest.arg),
      }
    }
  }

  fn add_assign_target(&mut self, target: &'a AssignTarget) {
    match target {
      AssignTarget::Simple(simple) => match simple {
        SimpleAssignTarget::Ident(binding) => self.idents.push(&binding.id),
        SimpleAssignTarget::Member(member) => self.add_root(&member.obj),
        SimpleAssignTarget::Paren(paren) => self.add_root(&paren.expr),
        SimpleAssignTarget::SuperProp(..) => self.this = true,
        SimpleAssignTarget::OptChain(chain) => {
          if let OptChainBase::Member(member) = &*chain.base {
            self.add_root(&member.obj);
          }
        }
        SimpleAssignTarget::TsAs(e) => self.add_root(&e.expr),
        SimpleAssignTarget::TsNonNull(e) => self.add_root(&e.expr),
        SimpleAssignTarget::TsSatisfies(e) => self.add_root(&e.expr),
        _ => {}
      },
      AssignTarget::Pat(pat) => match pat {
        AssignTargetPat::Array(array) => {
          for elem in array.elems.iter().flatten() {
            self.add_pattern(elem);
          }
        }
        AssignTargetPat::Object(object) => self.add_object_pattern(&object.props),
        AssignTargetPat::Invalid(..) => {}
      },
    }
  }
}

fn unwrap_parens(expr: &Expr) -> &Expr {
  match expr {
    Expr::Paren(paren) => unwrap_parens(&paren.expr),
    _ => expr,
  }
}

fn is_ident(expr: &Expr, name: &str) -> bool {
  matches!(unwrap_parens(expr), Expr::Ident(ident) if ident.sym == *name)
}

fn prop_name(prop: &MemberProp) -> Option<Atom> {
  match prop {
    MemberProp::Ident(ident) => Some(ident.sym.clone()),
    MemberProp::Computed(computed) => match &*computed.expr {
      Expr::Lit(Lit::Str(s)) => Some(s.value.clone()),
      _ => None,
    },
    MemberProp::PrivateName(..) => None,
  }
}

fn prop_name_of_key(key: &PropName) -> Option<Atom> {
  match key {
    PropName::Ident(ident) => Some(ident.sym.clone()),
    PropName::Str(s) => Some(s.value.clone()),
    _ => None,
  }
}

fn is_member(expr: &Expr, object: &str, property: &str) -> bool {
  match unwrap_parens(expr) {
    Expr::Member(member) => {
      is_ident(&member.obj, object) && prop_name(&member.prop).is_some_and(|p| p == *property)
    }
    _ => false,
  }
}

/// `console.log(...)` and friends only read their arguments
fn is_console_call(call: &CallExpr) -> bool {
  match &call.callee {
    Callee::Expr(callee) => {
      matches!(unwrap_parens(callee), Expr::Member(member) if is_ident(&member.obj, "console"))
    }
    _ => false,
  }
}

/// `exports` or `module.exports`
fn is_exports_object(expr: &Expr) -> bool {
  is_ident(expr, "exports") || is_member(expr, "module", "exports")
}

/// `module.exports = ...`, `exports.name = ...` and `module.exports.name = ...`
fn is_export_assignment(assign: &AssignExpr) -> bool {
  let AssignTarget::Simple(SimpleAssignTarget::Member(member)) = &assign.left else {
    return false;
  };
  let name = prop_name(&member.prop);
  if is_ident(&member.obj, "module") && name.as_ref().is_some_and(|n| n == "exports") {
    return true;
  }
  is_exports_object(&member.obj) && name.as_ref().map_or(true, |n| n != PREVAL_EXPORT)
}

/// `Object.defineProperty(exports, ...)`
fn is_export_definition(call: &CallExpr) -> bool {
  let Callee::Expr(callee) = &call.callee else {
    return false;
  };
  is_member(callee, "Object", "defineProperty")
    && call
      .args
      .first()
      .is_some_and(|arg| arg.spread.is_none() && is_exports_object(&arg.expr))
}

/// Source of a `require("source")` call
fn required_source(expr: &Expr) -> Option<Atom> {
  let Expr::Call(call) = unwrap_parens(expr) else {
    return None;
  };
  let Callee::Expr(callee) = &call.callee else {
    return None;
  };
  if !is_ident(callee, "require") || call.args.len() != 1 {
    return None;
  }
  match &*call.args[0].expr {
    Expr::Lit(Lit::Str(s)) => Some(s.value.clone()),
    Expr::Tpl(tpl) if tpl.exprs.is_empty() => tpl
      .quasis
      .first()
      .and_then(|quasi| quasi.cooked.clone()),
    _ => None,
  }
}

impl Visit for GraphBuilder<'_> {
  skip_types!();

  fn visit_module_decl(&mut self, node: &ModuleDecl) {
    let Some(id) = self.id(NodeKind::ModuleDecl, node) else {
      return node.visit_children_with(self);
    };

    match node {
      ModuleDecl::Import(import) => {
        self.children_depend_on(id);
        for specifier in &import.specifiers {
          let (local, imported) = match specifier {
            ImportSpecifier::Named(named) => {
              let imported = match &named.imported {
                Some(ModuleExportName::Ident(ident)) => ident.sym.clone(),
                Some(ModuleExportName::Str(s)) => s.value.clone(),
                None => named.local.sym.clone(),
              };
              (&named.local, Some(imported))
            }
            ImportSpecifier::Default(default) => (&default.local, Some(Atom::from("default"))),
            ImportSpecifier::Namespace(namespace) => (&namespace.local, None),
          };
          if let Some(node) = self.id(NodeKind::ImportSpecifier, specifier) {
            self.graph.add_external_dep(
              ExternalDep {
                source: import.src.value.clone(),
                local: local.clone(),
                imported,
              },
              node,
            );
          }
        }
      }
      ModuleDecl::ExportDecl(export) => {
        self.graph.add_export(id);
        let decl = self.id(NodeKind::Decl, &export.decl);
        self.tie(Some(id), decl);
        if let Decl::Var(var) = &export.decl {
          for declarator in &var.decls {
            let declarator = self.id(NodeKind::VarDeclarator, declarator);
            self.edge(Some(id), declarator);
          }
        }
      }
      ModuleDecl::ExportDefaultExpr(export) => {
        self.graph.add_export(id);
        if let Some(expr) = self.id(NodeKind::Expr, &*export.expr) {
          self.graph.add_export(expr);
        }
        self.depend_on_children(id);
      }
      ModuleDecl::ExportNamed(..)
      | ModuleDecl::ExportDefaultDecl(..)
      | ModuleDecl::ExportAll(..)
      | ModuleDecl::TsExportAssignment(..)
      | ModuleDecl::TsNamespaceExport(..) => {
        self.graph.add_export(id);
        self.depend_on_children(id);
      }
      ModuleDecl::TsImportEquals(..) => self.depend_on_children(id),
    }

    node.visit_children_with(self);
  }

  fn visit_stmt(&mut self, node: &Stmt) {
    let Some(id) = self.id(NodeKind::Stmt, node) else {
      return node.visit_children_with(self);
    };
    let stmt = Some(id);

    match node {
      Stmt::Block(block) => {
        let block = self.id(NodeKind::BlockStmt, block);
        self.tie(stmt, block);
      }
      Stmt::Expr(expr_stmt) => {
        let expr = self.id(NodeKind::Expr, &*expr_stmt.expr);
        self.tie(stmt, expr);
        match unwrap_parens(&expr_stmt.expr) {
          Expr::Assign(assign) if is_export_assignment(assign) => {
            self.graph.add_export(id);
            if let Some(right) = self.id(NodeKind::Expr, &*assign.right) {
              self.graph.add_export(right);
            }
          }
          Expr::Call(call) if is_export_definition(call) => self.graph.add_export(id),
          // the result is dropped, so the call is there for what it changes
          Expr::Call(call) if !is_console_call(call) => {
            let mut targets = MutationTargets::default();
            for arg in &call.args {
              targets.add_root(&arg.expr);
            }
            if let Some(call) = self.id(NodeKind::Expr, unwrap_parens(&expr_stmt.expr)) {
              self.mark_mutation(call, &targets);
            }
          }
          _ => {}
        }
      }
      Stmt::If(if_stmt) => {
        let test = self.id(NodeKind::Expr, &*if_stmt.test);
        self.edge(stmt, test);
        let cons = self.id(NodeKind::Stmt, &*if_stmt.cons);
        self.edge(cons, stmt);
        if let Some(alt) = &if_stmt.alt {
          let alt = self.id(NodeKind::Stmt, &**alt);
          self.edge(alt, stmt);
        }
      }
      Stmt::While(WhileStmt { test, body, .. }) | Stmt::DoWhile(DoWhileStmt { test, body, .. }) => {
        let test = self.id(NodeKind::Expr, &**test);
        self.edge(stmt, test);
        let body = self.id(NodeKind::Stmt, &**body);
        self.tie(stmt, body);
      }
      Stmt::For(for_stmt) => {
        match &for_stmt.init {
          Some(VarDeclOrExpr::VarDecl(var)) => {
            let decl = self.id(NodeKind::VarDecl, &**var);
            self.edge(stmt, decl);
            for declarator in &var.decls {
              let declarator = self.id(NodeKind::VarDeclarator, declarator);
              self.edge(stmt, declarator);
            }
          }
          Some(VarDeclOrExpr::Expr(expr)) => {
            let expr = self.id(NodeKind::Expr, &**expr);
            self.edge(stmt, expr);
          }
          None => {}
        }
        for expr in [&for_stmt.test, &for_stmt.update].into_iter().flatten() {
          let expr = self.id(NodeKind::Expr, &**expr);
          self.edge(stmt, expr);
        }
        let body = self.id(NodeKind::Stmt, &*for_stmt.body);
        self.tie(stmt, body);
      }
      Stmt::ForIn(ForInStmt {
        left, right, body, ..
      })
      | Stmt::ForOf(ForOfStmt {
        left, right, body, ..
      }) => {
        match left {
          ForHead::VarDecl(var) => {
            let decl = self.id(NodeKind::VarDecl, &**var);
            self.edge(stmt, decl);
            for declarator in &var.decls {
              let declarator = self.id(NodeKind::VarDeclarator, declarator);
              self.edge(stmt, declarator);
            }
          }
          ForHead::Pat(pat) => {
            let pat_id = self.id(NodeKind::Pat, &**pat);
            self.edge(stmt, pat_id);
            let mut targets = MutationTargets::default();
            targets.add_pattern(pat);
            self.mark_mutation(id, &targets);
          }
          ForHead::UsingDecl(..) => {}
        }
        let right = self.id(NodeKind::Expr, &**right);
        self.edge(stmt, right);
        let body = self.id(NodeKind::Stmt, &**body);
        self.tie(stmt, body);
      }
      Stmt::Labeled(labeled) => {
        let body = self.id(NodeKind::Stmt, &*labeled.body);
        self.tie(stmt, body);
      }
      Stmt::Return(..) | Stmt::Throw(..) => {
        self.depend_on_children(id);
        let function = self.closest_function(id);
        self.edge(function, stmt);
      }
      Stmt::Break(..) | Stmt::Continue(..) => {
        let target = self.jump_target(id);
        self.edge(target, stmt);
      }
      // cases stay so that fall-through is unchanged
      Stmt::Switch(..) => self.depend_on_children(id),
      Stmt::Decl(decl) => {
        let decl = self.id(NodeKind::Decl, decl);
        self.tie(stmt, decl);
      }
      Stmt::Empty(..) | Stmt::Debugger(..) => {}
      Stmt::Try(..) | Stmt::With(..) => self.depend_on_children(id),
    }

    node.visit_children_with(self);
  }

  fn visit_decl(&mut self, node: &Decl) {
    let Some(id) = self.id(NodeKind::Decl, node) else {
      return node.visit_children_with(self);
    };
    match node {
      Decl::Var(var) => {
        let var = self.id(NodeKind::VarDecl, &**var);
        self.tie(Some(id), var);
      }
      Decl::Fn(f) => {
        self.depend_on_children(id);
        if let Some(function) = self.id(NodeKind::Function, &*f.function) {
          self.function_bindings.insert(id, function);
        }
      }
      _ => self.depend_on_children(id),
    }
    node.visit_children_with(self);
  }

  fn visit_var_decl(&mut self, node: &VarDecl) {
    if let Some(id) = self.id(NodeKind::VarDecl, node) {
      self.children_depend_on(id);
    }
    node.visit_children_with(self);
  }

  fn visit_var_declarator(&mut self, node: &VarDeclarator) {
    if let Some(id) = self.id(NodeKind::VarDeclarator, node) {
      self.depend_on_children(id);
      self.require_declarator(id, node);
      if let (Pat::Ident(..), Some(init)) = (&node.name, &node.init) {
        let binding = self.id(NodeKind::Pat, &node.name);
        if let (Some(binding), Some(function)) = (binding, self.function_node(init)) {
          self.function_bindings.insert(binding, function);
        }
      }
    }
    node.visit_children_with(self);
  }

  fn visit_expr(&mut self, node: &Expr) {
    let Some(id) = self.id(NodeKind::Expr, node) else {
      return node.visit_children_with(self);
    };

    match node {
      Expr::Ident(..) => self.reference(id),
      Expr::Seq(seq) => {
        // only the last expression makes up the value
        let last = seq.exprs.last().and_then(|last| self.id(NodeKind::Expr, &**last));
        self.edge(Some(id), last);
      }
      Expr::Assign(assign) => {
        self.depend_on_children(id);
        let mut targets = MutationTargets::default();
        targets.add_assign_target(&assign.left);
        self.mark_mutation(id, &targets);
      }
      Expr::Update(update) => {
        self.depend_on_children(id);
        let mut targets = MutationTargets::default();
        targets.add_root(&update.arg);
        self.mark_mutation(id, &targets);
      }
      Expr::Unary(unary) if unary.op == UnaryOp::Delete => {
        self.depend_on_children(id);
        let mut targets = MutationTargets::default();
        targets.add_root(&unary.arg);
        self.mark_mutation(id, &targets);
      }
      Expr::Call(call) => {
        self.depend_on_children(id);
        let mut targets = MutationTargets::default();
        if let Callee::Expr(callee) = &call.callee {
          match unwrap_parens(callee) {
            Expr::Member(member) if is_ident(&member.obj, "Object") => {
              if let Some(first) = call.args.first() {
                targets.add_root(&first.expr);
              }
            }
            // method calls may change the object they are called on
            Expr::Member(member) => targets.add_root(&member.obj),
            _ => {}
          }
        }
        self.mark_mutation(id, &targets);

        let callee = match &call.callee {
          Callee::Expr(callee) => self.called(callee),
          _ => None,
        };
        let called: Vec<Called> = callee
          .into_iter()
          .chain(call.args.iter().filter_map(|arg| self.called(&arg.expr)))
          .collect();
        if !called.is_empty() {
          self.calls.push((id, called));
        }
      }
      _ => self.depend_on_children(id),
    }

    node.visit_children_with(self);
  }

  fn visit_pat(&mut self, node: &Pat) {
    if let Some(id) = self.id(NodeKind::Pat, node) {
      if self.is_binding_pattern(id) {
        self.depend_on_binding_parent(id);
        match node {
          // without a rest element, unused parts of a pattern can go
          Pat::Object(object)
            if !object
              .props
              .iter()
              .any(|prop| matches!(prop, ObjectPatProp::Rest(..))) => {}
          Pat::Array(array)
            if !array
              .elems
              .iter()
              .any(|elem| matches!(elem, Some(Pat::Rest(..)))) => {}
          _ => self.depend_on_children(id),
        }
      } else {
        self.depend_on_children(id);
      }
    }
    node.visit_children_with(self);
  }

  fn visit_object_pat_prop(&mut self, node: &ObjectPatProp) {
    if let Some(id) = self.id(NodeKind::ObjectPatProp, node) {
      if self.is_binding_pattern(id) {
        self.depend_on_binding_parent(id);
      }
      self.depend_on_children(id);
    }
    node.visit_children_with(self);
  }

  fn visit_prop_or_spread(&mut self, node: &PropOrSpread) {
    if let Some(id) = self.id(NodeKind::Prop, node) {
      if let PropOrSpread::Prop(prop) = node {
        if let Prop::Shorthand(..) = &**prop {
          self.reference(id);
        }
      }
      self.depend_on_children(id);
    }
    node.visit_children_with(self);
  }

  fn visit_function(&mut self, node: &Function) {
    if let Some(id) = self.id(NodeKind::Function, node) {
      self.depend_on_children(id);
    }
    node.visit_children_with(self);
  }

  fn visit_block_stmt(&mut self, node: &BlockStmt) {
    if let Some(id) = self.id(NodeKind::BlockStmt, node) {
      self.children_depend_on(id);
      let parent = self.arena.parent(id);
      let class_body = parent.is_some_and(|parent| {
        self.arena.flags(parent).class_body
          || (self.arena.kind(parent) == NodeKind::Function
            && self
              .arena
              .parent(parent)
              .is_some_and(|member| self.arena.flags(member).class_body))
      });
      if class_body {
        // class members are kept whole, they initialise instances
        self.depend_on_children(id);
      }
      if !parent.is_some_and(|parent| self.arena.flags(parent).function_like) {
        self.depend_on_parent(id);
      }
    }
    node.visit_children_with(self);
  }

  fn visit_export_specifier(&mut self, node: &ExportSpecifier) {
    if let Some(id) = self.id(NodeKind::ExportSpecifier, node) {
      self.reference(id);
    }
    node.visit_children_with(self);
  }

  fn visit_switch_case(&mut self, node: &SwitchCase) {
    if let Some(id) = self.id(NodeKind::SwitchCase, node) {
      if let Some(test) = &node.test {
        let test = self.id(NodeKind::Expr, &**test);
        self.edge(Some(id), test);
      }
      for stmt in &node.cons {
        let stmt = self.id(NodeKind::Stmt, stmt);
        self.edge(stmt, Some(id));
      }
      self.depend_on_parent(id);
    }
    node.visit_children_with(self);
  }

  fn visit_catch_clause(&mut self, node: &CatchClause) {
    if let Some(id) = self.id(NodeKind::CatchClause, node) {
      self.depend_on_children(id);
    }
    node.visit_children_with(self);
  }

  fn visit_class(&mut self, node: &Class) {
    if let Some(id) = self.id(NodeKind::Class, node) {
      self.depend_on_children(id);
    }
    node.visit_children_with(self);
  }

  fn visit_class_member(&mut self, node: &ClassMember) {
    if let Some(id) = self.id(NodeKind::ClassMember, node) {
      self.depend_on_children(id);
    }
    node.visit_children_with(self);
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use linaria_swc_runner::test_utils::parse_test_module;
  use pretty_assertions::assert_eq;

  use super::*;

  fn graph(code: &str) -> (NodeArena, DependencyGraph) {
    let (module, _) = parse_test_module(code);
    let arena = NodeArena::build(&module);
    let graph = build_graph(&module, &arena);
    (arena, graph)
  }

  #[test]
  fn test_reference_depends_on_declaration() {
    let (arena, graph) = graph("const a = 1; const b = a;");
    let a = graph.get_leafs(&["a"])[0].unwrap();
    let dependents: HashSet<NodeKind> = graph
      .dependents(a)
      .iter()
      .map(|id| arena.kind(*id))
      .collect();
    assert!(dependents.contains(&NodeKind::Expr));
  }

  #[test]
  fn test_declarator_depends_on_initializer() {
    let (arena, graph) = graph("const a = foo();");
    let a = graph.get_leafs(&["a"])[0].unwrap();
    let alive = graph.get_alive(&[a]);
    let kinds: HashSet<NodeKind> = alive.iter().map(|id| arena.kind(*id)).collect();
    assert!(kinds.contains(&NodeKind::VarDeclarator));
    assert!(kinds.contains(&NodeKind::Expr));
    assert!(kinds.contains(&NodeKind::Stmt));
  }

  #[test]
  fn test_unused_code_is_not_alive() {
    let (arena, graph) = graph("const a = 1; const b = 2;");
    let a = graph.get_leafs(&["a"])[0].unwrap();
    let alive = graph.get_alive(&[a]);
    let statements = alive
      .iter()
      .filter(|id| arena.kind(**id) == NodeKind::Stmt)
      .count();
    assert_eq!(statements, 1);
  }

  #[test]
  fn test_exports_are_collected() {
    let (_, graph) = graph(
      "export const a = 1; export default 2; module.exports.b = 3; exports.__linariaPreval = [];",
    );
    // the declaration, the default export with its expression, the assignment with its value
    assert_eq!(graph.exports().count(), 5);
  }

  #[test]
  fn test_import_and_require_are_external_deps() {
    let (_, graph) = graph(
      r#"
        import a, { b as c } from "one";
        import * as d from "two";
        const e = require("three");
        const { f, g: h } = require("four");
        const i = require("five").j;
      "#,
    );
    let deps: Vec<(String, String, Option<String>)> = graph
      .external_deps()
      .map(|dep| {
        (
          dep.source.to_string(),
          dep.local.sym.to_string(),
          dep.imported.as_ref().map(|i| i.to_string()),
        )
      })
      .collect();

    let expected = [
      ("one", "a", Some("default")),
      ("one", "c", Some("b")),
      ("two", "d", None),
      ("three", "e", None),
      ("four", "f", Some("f")),
      ("four", "h", Some("g")),
      ("five", "i", Some("j")),
    ]
    .map(|(s, l, i)| (s.to_string(), l.to_string(), i.map(str::to_string)))
    .to_vec();
    assert_eq!(deps, expected);
  }

  #[test]
  fn test_binding_index() {
    let (_, graph) = graph("const a = 1; const b = a + a;");
    let key = crate::BindingKey::new(crate::ScopeId::MODULE, "a");
    // the declarator, both uses and the binary expression twice
    assert_eq!(graph.binding_dependents(&key).len(), 5);
    // the declaration needs its declarator, each use needs the declaration
    assert_eq!(graph.binding_dependencies(&key).len(), 3);
  }

  #[test]
  fn test_computed_member_keeps_object_and_key() {
    let (arena, graph) = graph("const key = 'blue'; const obj = {}; const blue = obj[key];");
    let blue = graph.get_leafs(&["blue"])[0].unwrap();
    let alive = graph.get_alive(&[blue]);
    let statements = alive
      .iter()
      .filter(|id| arena.kind(**id) == NodeKind::Stmt)
      .count();
    assert_eq!(statements, 3);
  }
}
