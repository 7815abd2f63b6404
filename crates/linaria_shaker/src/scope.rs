use std::collections::HashMap;
use std::fmt;

use swc_core::ecma::ast::*;
use swc_core::ecma::atoms::Atom;
use swc_core::ecma::visit::{Visit, VisitWith};

use crate::arena::{skip_types, NodeArena, NodeId, NodeKey, NodeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl ScopeId {
  pub const MODULE: ScopeId = ScopeId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
  Module,
  Function,
  Block,
}

/// A declared name, identified as `scope:name`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingKey {
  pub scope: ScopeId,
  pub name: Atom,
}

impl BindingKey {
  pub fn new(scope: ScopeId, name: impl Into<Atom>) -> Self {
    BindingKey {
      scope,
      name: name.into(),
    }
  }
}

impl fmt::Display for BindingKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.scope.0, self.name)
  }
}

#[derive(Debug)]
pub struct Scope {
  pub kind: ScopeKind,
  pub parent: Option<ScopeId>,
  pub node: NodeId,
  bindings: HashMap<Atom, NodeId>,
}

/// Lexical scopes of a module.
///
/// Built once from a [`NodeArena`] and read-only afterwards. Every indexed
/// node knows the scope it appears in; declarations map to the node that
/// introduces them and references resolve through the scope chain, so an
/// inner binding hides an outer one of the same name.
#[derive(Debug)]
pub struct ScopeManager {
  scopes: Vec<Scope>,
  enclosing: Vec<ScopeId>,
  declarations: HashMap<NodeId, BindingKey>,
  references: HashMap<NodeId, Atom>,
}

impl ScopeManager {
  pub fn build(module: &Module, arena: &NodeArena) -> Self {
    let mut builder = ScopeBuilder {
      arena,
      manager: ScopeManager {
        scopes: Vec::new(),
        enclosing: vec![ScopeId::MODULE; arena.len()],
        declarations: HashMap::new(),
        references: HashMap::new(),
      },
      stack: Vec::new(),
      nodes: Vec::new(),
    };
    module.visit_with(&mut builder);
    builder.manager
  }

  pub fn scope(&self, id: ScopeId) -> &Scope {
    &self.scopes[id.0 as usize]
  }

  /// Scope a node appears in
  pub fn scope_of(&self, node: NodeId) -> ScopeId {
    self.enclosing[node.index()]
  }

  /// Scope that declares the identifier at `node`, for declarations and
  /// references alike. `None` for globals.
  pub fn where_is_declared(&self, node: NodeId) -> Option<ScopeId> {
    if let Some(key) = self.declarations.get(&node) {
      return Some(key.scope);
    }
    self.resolve(node).map(|key| key.scope)
  }

  pub fn is_declared(&self, key: &BindingKey) -> bool {
    self.get_declaration(key).is_some()
  }

  pub fn get_declaration(&self, key: &BindingKey) -> Option<NodeId> {
    self
      .scopes
      .get(key.scope.0 as usize)
      .and_then(|scope| scope.bindings.get(&key.name))
      .copied()
  }

  /// Binding a reference or declaration node stands for
  pub fn resolve(&self, node: NodeId) -> Option<BindingKey> {
    if let Some(key) = self.declarations.get(&node) {
      return Some(key.clone());
    }
    let name = self.references.get(&node)?;
    self.lookup(self.scope_of(node), name)
  }

  /// Find `name` starting at `scope` and walking outwards
  pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<BindingKey> {
    let mut current = Some(scope);
    while let Some(id) = current {
      let scope = self.scope(id);
      if scope.bindings.contains_key(&Atom::from(name)) {
        return Some(BindingKey::new(id, name));
      }
      current = scope.parent;
    }
    None
  }

  /// Declaration node a name resolves to from `scope`
  pub fn lookup_declaration(&self, scope: ScopeId, name: &str) -> Option<NodeId> {
    self
      .lookup(scope, name)
      .and_then(|key| self.get_declaration(&key))
  }

  /// Binding declared by `node`, if it is a declaration
  pub fn declared_by(&self, node: NodeId) -> Option<&BindingKey> {
    self.declarations.get(&node)
  }

  pub fn is_reference(&self, node: NodeId) -> bool {
    self.references.contains_key(&node)
  }
}

struct ScopeBuilder<'a> {
  arena: &'a NodeArena,
  manager: ScopeManager,
  stack: Vec<ScopeId>,
  /// Indexed nodes currently being visited and whether each opened a scope
  nodes: Vec<(NodeId, bool)>,
}

impl ScopeBuilder<'_> {
  fn current(&self) -> ScopeId {
    self.stack.last().copied().unwrap_or(ScopeId::MODULE)
  }

  fn parent_node(&self) -> Option<NodeId> {
    self.nodes.last().map(|(id, _)| *id)
  }

  /// Nearest scope where `var` declarations land
  fn function_scope(&self) -> ScopeId {
    for id in self.stack.iter().rev() {
      if self.manager.scope(*id).kind != ScopeKind::Block {
        return *id;
      }
    }
    ScopeId::MODULE
  }

  fn enter<T>(&mut self, kind: NodeKind, node: &T, creates: Option<ScopeKind>) -> Option<NodeId> {
    let id = self.arena.id_of(kind, node)?;
    self.manager.enclosing[id.index()] = self.current();
    if let Some(scope_kind) = creates {
      let scope = ScopeId(self.manager.scopes.len() as u32);
      self.manager.scopes.push(Scope {
        kind: scope_kind,
        parent: self.stack.last().copied(),
        node: id,
        bindings: HashMap::new(),
      });
      self.stack.push(scope);
    }
    self.nodes.push((id, creates.is_some()));
    Some(id)
  }

  fn exit(&mut self, id: Option<NodeId>) {
    if id.is_none() {
      return;
    }
    if let Some((_, opened)) = self.nodes.pop() {
      if opened {
        self.stack.pop();
      }
    }
  }

  fn declare(&mut self, scope: ScopeId, name: &Atom, key: NodeKey) {
    let Some(node) = self.arena.id_of_key(&key) else {
      return;
    };
    let bindings = &mut self.manager.scopes[scope.0 as usize].bindings;
    // function declarations win over `var` re-declarations of the same name
    if bindings.contains_key(name) && key.kind == NodeKind::Pat {
      self
        .manager
        .declarations
        .insert(node, BindingKey::new(scope, name.clone()));
      return;
    }
    bindings.insert(name.clone(), node);
    self
      .manager
      .declarations
      .insert(node, BindingKey::new(scope, name.clone()));
  }

  fn declare_pattern(&mut self, scope: ScopeId, pat: &Pat) {
    let mut found = Vec::new();
    pattern_bindings(pat, &mut found);
    for (name, key) in found {
      self.declare(scope, &name, key);
    }
  }

  fn reference<T>(&mut self, kind: NodeKind, node: &T, name: &Atom) {
    if let Some(id) = self.arena.id_of(kind, node) {
      self.manager.references.insert(id, name.clone());
    }
  }
}

/// Names bound by a pattern, each with the node that introduces it
pub(crate) fn pattern_bindings(pat: &Pat, out: &mut Vec<(Atom, NodeKey)>) {
  match pat {
    Pat::Ident(binding) => out.push((binding.id.sym.clone(), NodeKey::of(NodeKind::Pat, pat))),
    Pat::Array(array) => {
      for elem in array.elems.iter().flatten() {
        pattern_bindings(elem, out);
      }
    }
    Pat::Rest(rest) => pattern_bindings(&rest.arg, out),
    Pat::Object(object) => {
      for prop in &object.props {
        match prop {
          ObjectPatProp::KeyValue(kv) => pattern_bindings(&kv.value, out),
          ObjectPatProp::Assign(assign) => out.push((
            assign.key.id.sym.clone(),
            NodeKey::of(NodeKind::ObjectPatProp, prop),
          )),
          ObjectPatProp::Rest(rest) => pattern_bindings(&rest.arg, out),
        }
      }
    }
    Pat::Assign(assign) => pattern_bindings(&assign.left, out),
    Pat::Expr(..) | Pat::Invalid(..) => {}
  }
}

fn is_function_body(arena: &NodeArena, parent: Option<NodeId>) -> bool {
  parent.is_some_and(|id| arena.flags(id).function_like)
}

impl Visit for ScopeBuilder<'_> {
  skip_types!();

  fn visit_module(&mut self, node: &Module) {
    let id = self.enter(NodeKind::Module, node, Some(ScopeKind::Module));
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_module_decl(&mut self, node: &ModuleDecl) {
    let id = self.enter(NodeKind::ModuleDecl, node, None);
    match node {
      ModuleDecl::Import(import) => {
        for specifier in &import.specifiers {
          let local = match specifier {
            ImportSpecifier::Named(named) => &named.local,
            ImportSpecifier::Default(default) => &default.local,
            ImportSpecifier::Namespace(namespace) => &namespace.local,
          };
          self.declare(
            ScopeId::MODULE,
            &local.sym,
            NodeKey::of(NodeKind::ImportSpecifier, specifier),
          );
        }
      }
      ModuleDecl::ExportNamed(export) if export.src.is_none() => {
        for specifier in &export.specifiers {
          if let ExportSpecifier::Named(ExportNamedSpecifier {
            orig: ModuleExportName::Ident(orig),
            ..
          }) = specifier
          {
            self.reference(NodeKind::ExportSpecifier, specifier, &orig.sym);
          }
        }
      }
      ModuleDecl::ExportDefaultDecl(export) => {
        let ident = match &export.decl {
          DefaultDecl::Fn(f) => f.ident.as_ref(),
          DefaultDecl::Class(c) => c.ident.as_ref(),
          DefaultDecl::TsInterfaceDecl(..) => None,
        };
        if let Some(ident) = ident {
          self.declare(
            ScopeId::MODULE,
            &ident.sym,
            NodeKey::of(NodeKind::ModuleDecl, node),
          );
        }
      }
      _ => {}
    }
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_stmt(&mut self, node: &Stmt) {
    let creates = match node {
      Stmt::For(..) | Stmt::ForIn(..) | Stmt::ForOf(..) | Stmt::Switch(..) => {
        Some(ScopeKind::Block)
      }
      _ => None,
    };
    let id = self.enter(NodeKind::Stmt, node, creates);
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_decl(&mut self, node: &Decl) {
    let id = self.enter(NodeKind::Decl, node, None);
    let scope = self.current();
    let key = NodeKey::of(NodeKind::Decl, node);
    match node {
      Decl::Fn(f) => self.declare(scope, &f.ident.sym, key),
      Decl::Class(c) => self.declare(scope, &c.ident.sym, key),
      Decl::TsEnum(e) => self.declare(scope, &e.id.sym, key),
      Decl::TsModule(m) => {
        if let TsModuleName::Ident(ident) = &m.id {
          self.declare(scope, &ident.sym, key);
        }
      }
      _ => {}
    }
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_var_decl(&mut self, node: &VarDecl) {
    let id = self.enter(NodeKind::VarDecl, node, None);
    let scope = match node.kind {
      VarDeclKind::Var => self.function_scope(),
      VarDeclKind::Let | VarDeclKind::Const => self.current(),
    };
    for declarator in &node.decls {
      self.declare_pattern(scope, &declarator.name);
    }
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_var_declarator(&mut self, node: &VarDeclarator) {
    let id = self.enter(NodeKind::VarDeclarator, node, None);
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_expr(&mut self, node: &Expr) {
    let creates = match node {
      Expr::Arrow(..) => Some(ScopeKind::Function),
      Expr::Fn(FnExpr { ident: Some(..), .. }) | Expr::Class(ClassExpr { ident: Some(..), .. }) => {
        Some(ScopeKind::Block)
      }
      _ => None,
    };
    let id = self.enter(NodeKind::Expr, node, creates);
    let scope = self.current();
    match node {
      Expr::Ident(ident) => self.reference(NodeKind::Expr, node, &ident.sym),
      Expr::Arrow(arrow) => {
        for param in &arrow.params {
          self.declare_pattern(scope, param);
        }
      }
      Expr::Fn(FnExpr {
        ident: Some(ident), ..
      })
      | Expr::Class(ClassExpr {
        ident: Some(ident), ..
      }) => self.declare(scope, &ident.sym, NodeKey::of(NodeKind::Expr, node)),
      _ => {}
    }
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_pat(&mut self, node: &Pat) {
    let id = self.enter(NodeKind::Pat, node, None);
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_object_pat_prop(&mut self, node: &ObjectPatProp) {
    let id = self.enter(NodeKind::ObjectPatProp, node, None);
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_prop_or_spread(&mut self, node: &PropOrSpread) {
    let accessor = matches!(node, PropOrSpread::Prop(prop) if matches!(&**prop, Prop::Getter(..) | Prop::Setter(..)));
    let id = self.enter(
      NodeKind::Prop,
      node,
      accessor.then_some(ScopeKind::Function),
    );
    if let PropOrSpread::Prop(prop) = node {
      match &**prop {
        Prop::Shorthand(ident) => self.reference(NodeKind::Prop, node, &ident.sym),
        Prop::Setter(setter) => {
          let scope = self.current();
          self.declare_pattern(scope, &setter.param);
        }
        _ => {}
      }
    }
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_function(&mut self, node: &Function) {
    let id = self.enter(NodeKind::Function, node, Some(ScopeKind::Function));
    let scope = self.current();
    for param in &node.params {
      self.declare_pattern(scope, &param.pat);
    }
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_block_stmt(&mut self, node: &BlockStmt) {
    let creates = (!is_function_body(self.arena, self.parent_node())).then_some(ScopeKind::Block);
    let id = self.enter(NodeKind::BlockStmt, node, creates);
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_import_specifier(&mut self, node: &ImportSpecifier) {
    let id = self.enter(NodeKind::ImportSpecifier, node, None);
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_export_specifier(&mut self, node: &ExportSpecifier) {
    let id = self.enter(NodeKind::ExportSpecifier, node, None);
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_switch_case(&mut self, node: &SwitchCase) {
    let id = self.enter(NodeKind::SwitchCase, node, None);
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_catch_clause(&mut self, node: &CatchClause) {
    let id = self.enter(NodeKind::CatchClause, node, Some(ScopeKind::Block));
    if let Some(param) = &node.param {
      let scope = self.current();
      self.declare_pattern(scope, param);
    }
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_class(&mut self, node: &Class) {
    let id = self.enter(NodeKind::Class, node, Some(ScopeKind::Block));
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_class_member(&mut self, node: &ClassMember) {
    let creates = match node {
      ClassMember::Constructor(..) | ClassMember::StaticBlock(..) => Some(ScopeKind::Function),
      _ => None,
    };
    let id = self.enter(NodeKind::ClassMember, node, creates);
    if let ClassMember::Constructor(constructor) = node {
      let scope = self.current();
      for param in &constructor.params {
        match param {
          ParamOrTsParamProp::Param(param) => self.declare_pattern(scope, &param.pat),
          ParamOrTsParamProp::TsParamProp(prop) => match &prop.param {
            TsParamPropParam::Ident(ident) => self.declare(
              scope,
              &ident.id.sym,
              NodeKey::of(NodeKind::ClassMember, node),
            ),
            TsParamPropParam::Assign(assign) => self.declare_pattern(scope, &assign.left),
          },
        }
      }
    }
    node.visit_children_with(self);
    self.exit(id);
  }
}

#[cfg(test)]
mod tests {
  use linaria_swc_runner::test_utils::parse_test_module;
  use pretty_assertions::assert_eq;

  use super::*;

  fn build(code: &str) -> (Module, NodeArena, ScopeManager) {
    let (module, _) = parse_test_module(code);
    let arena = NodeArena::build(&module);
    let scopes = ScopeManager::build(&module, &arena);
    (module, arena, scopes)
  }

  fn references_to<'a>(
    arena: &'a NodeArena,
    scopes: &'a ScopeManager,
    name: &'a str,
  ) -> impl Iterator<Item = NodeId> + 'a {
    arena
      .ids()
      .filter(move |id| scopes.references.get(id).is_some_and(|n| n == name))
  }

  #[test]
  fn test_module_bindings() {
    let (_, _, scopes) = build("import a from 'a'; const b = 1; function c() {} class D {}");
    for name in ["a", "b", "c", "D"] {
      assert!(
        scopes.is_declared(&BindingKey::new(ScopeId::MODULE, name)),
        "{name} should be declared"
      );
    }
    assert!(!scopes.is_declared(&BindingKey::new(ScopeId::MODULE, "e")));
  }

  #[test]
  fn test_inner_binding_shadows_outer() {
    let (_, arena, scopes) = build("const a = 1; function f() { const a = 2; return a; } a;");
    let resolved: Vec<ScopeId> = references_to(&arena, &scopes, "a")
      .map(|id| scopes.where_is_declared(id).unwrap())
      .collect();

    assert_eq!(resolved.len(), 2);
    assert_ne!(resolved[0], ScopeId::MODULE);
    assert_eq!(resolved[1], ScopeId::MODULE);
  }

  #[test]
  fn test_var_is_function_scoped() {
    let (_, arena, scopes) = build("function f() { if (x) { var a = 1; let b = 2; } return [a, b]; }");
    let a = references_to(&arena, &scopes, "a").next().unwrap();
    let b = references_to(&arena, &scopes, "b").next().unwrap();

    let a_scope = scopes.where_is_declared(a).unwrap();
    assert_eq!(scopes.scope(a_scope).kind, ScopeKind::Function);
    assert_eq!(scopes.where_is_declared(b), None);
  }

  #[test]
  fn test_params_and_catch_bindings() {
    let (_, arena, scopes) =
      build("const f = ({ x }, [y], ...z) => x + y + z; try {} catch (e) { e; }");
    for name in ["x", "y", "z", "e"] {
      let reference = references_to(&arena, &scopes, name).next().unwrap();
      let scope = scopes.where_is_declared(reference).unwrap();
      assert_ne!(scope, ScopeId::MODULE, "{name} should be local");
    }
  }

  #[test]
  fn test_globals_are_unresolved() {
    let (_, arena, scopes) = build("console.log(window);");
    let window = references_to(&arena, &scopes, "window").next().unwrap();
    assert_eq!(scopes.where_is_declared(window), None);
    assert_eq!(scopes.resolve(window), None);
  }

  #[test]
  fn test_named_function_expression_binds_its_own_name() {
    let (_, arena, scopes) = build("const g = function f() { return f; }; f;");
    let mut refs = references_to(&arena, &scopes, "f");
    let inner = refs.next().unwrap();
    let outer = refs.next().unwrap();
    assert!(scopes.where_is_declared(inner).is_some());
    assert_eq!(scopes.where_is_declared(outer), None);
  }

  #[test]
  fn test_binding_key_display() {
    assert_eq!(BindingKey::new(ScopeId(3), "color").to_string(), "3:color");
  }

  #[test]
  fn test_declaration_nodes() {
    let (_, arena, scopes) = build("const { a, b: c } = obj;");
    let a = scopes
      .get_declaration(&BindingKey::new(ScopeId::MODULE, "a"))
      .unwrap();
    let c = scopes
      .get_declaration(&BindingKey::new(ScopeId::MODULE, "c"))
      .unwrap();
    assert_eq!(arena.kind(a), NodeKind::ObjectPatProp);
    assert_eq!(arena.kind(c), NodeKind::Pat);
    assert_eq!(scopes.where_is_declared(a), Some(ScopeId::MODULE));
  }
}
