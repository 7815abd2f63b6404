use std::collections::HashMap;
use std::ops::Range;

use swc_core::common::{Span, Spanned};
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{Visit, VisitWith};

/// Index of a node in a [`NodeArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
  pub fn new(index: usize) -> Self {
    NodeId(index as u32)
  }

  pub fn index(self) -> usize {
    self.0 as usize
  }

  /// The id `offset` positions after this one. Used to map the nodes of an
  /// independently indexed sub-tree back into the arena it was taken from.
  pub fn offset(self, offset: usize) -> Self {
    NodeId::new(self.index() + offset)
  }
}

impl std::fmt::Display for NodeId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// The AST types the shaker tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
  Module,
  ModuleDecl,
  Stmt,
  Decl,
  VarDecl,
  VarDeclarator,
  Expr,
  Pat,
  ObjectPatProp,
  Prop,
  Function,
  BlockStmt,
  ImportSpecifier,
  ExportSpecifier,
  SwitchCase,
  CatchClause,
  Class,
  ClassMember,
}

/// Identity of an AST node: its type and address.
///
/// Two keys are equal only while the tree they were taken from is neither
/// moved nor mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey {
  pub kind: NodeKind,
  addr: usize,
}

impl NodeKey {
  pub fn of<T>(kind: NodeKind, node: &T) -> Self {
    NodeKey {
      kind,
      addr: node as *const T as usize,
    }
  }
}

/// Extra facts about a node that the graph builder needs without looking at
/// the node itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeFlags {
  /// Functions, arrows, constructors, static blocks, object getters and setters
  pub function_like: bool,
  /// `for`, `for in`, `for of`, `while`, `do while`
  pub is_loop: bool,
  pub is_switch: bool,
  /// Methods and accessors of a class
  pub class_body: bool,
}

#[derive(Debug, Clone)]
pub struct NodeEntry {
  pub kind: NodeKind,
  pub parent: Option<NodeId>,
  pub span: Span,
  pub flags: NodeFlags,
  end: u32,
}

/// Flat pre-order index of a module.
///
/// Ids are assigned in visiting order, so the descendants of a node occupy
/// the contiguous range returned by [`NodeArena::subtree`].
#[derive(Debug, Default)]
pub struct NodeArena {
  entries: Vec<NodeEntry>,
  keys: Vec<NodeKey>,
  ids: HashMap<NodeKey, NodeId>,
}

impl NodeArena {
  pub fn build(module: &Module) -> Self {
    let mut indexer = Indexer::default();
    module.visit_with(&mut indexer);
    indexer.arena
  }

  /// Index a single expression. Its ids line up with the ids of the same
  /// expression inside a module arena, shifted by the id of its root there.
  pub fn build_expr(expr: &Expr) -> Self {
    let mut indexer = Indexer::default();
    expr.visit_with(&mut indexer);
    indexer.arena
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn ids(&self) -> impl Iterator<Item = NodeId> {
    (0..self.entries.len()).map(NodeId::new)
  }

  pub fn get(&self, id: NodeId) -> &NodeEntry {
    &self.entries[id.index()]
  }

  pub fn kind(&self, id: NodeId) -> NodeKind {
    self.get(id).kind
  }

  pub fn flags(&self, id: NodeId) -> NodeFlags {
    self.get(id).flags
  }

  pub fn parent(&self, id: NodeId) -> Option<NodeId> {
    self.get(id).parent
  }

  pub fn key(&self, id: NodeId) -> NodeKey {
    self.keys[id.index()]
  }

  pub fn id_of_key(&self, key: &NodeKey) -> Option<NodeId> {
    self.ids.get(key).copied()
  }

  pub fn id_of<T>(&self, kind: NodeKind, node: &T) -> Option<NodeId> {
    self.id_of_key(&NodeKey::of(kind, node))
  }

  /// Ids of `id` and all of its descendants
  pub fn subtree(&self, id: NodeId) -> Range<usize> {
    id.index()..self.get(id).end as usize
  }

  pub fn children(&self, id: NodeId) -> Children<'_> {
    Children {
      arena: self,
      next: id.index() + 1,
      end: self.get(id).end as usize,
    }
  }

  /// Parent chain of `id`, closest first
  pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
    Ancestors {
      arena: self,
      next: self.parent(id),
    }
  }

  fn push(&mut self, kind: NodeKind, key: NodeKey, span: Span, parent: Option<NodeId>) -> NodeId {
    let id = NodeId::new(self.entries.len());
    self.entries.push(NodeEntry {
      kind,
      parent,
      span,
      flags: NodeFlags::default(),
      end: id.0 + 1,
    });
    self.keys.push(key);
    self.ids.insert(key, id);
    id
  }
}

pub struct Children<'a> {
  arena: &'a NodeArena,
  next: usize,
  end: usize,
}

impl Iterator for Children<'_> {
  type Item = NodeId;

  fn next(&mut self) -> Option<NodeId> {
    if self.next >= self.end {
      return None;
    }
    let id = NodeId::new(self.next);
    self.next = self.arena.get(id).end as usize;
    Some(id)
  }
}

pub struct Ancestors<'a> {
  arena: &'a NodeArena,
  next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
  type Item = NodeId;

  fn next(&mut self) -> Option<NodeId> {
    let id = self.next?;
    self.next = self.arena.parent(id);
    Some(id)
  }
}

#[derive(Default)]
struct Indexer {
  arena: NodeArena,
  stack: Vec<NodeId>,
}

impl Indexer {
  fn enter<T: Spanned>(&mut self, kind: NodeKind, node: &T) -> NodeId {
    let parent = self.stack.last().copied();
    let id = self
      .arena
      .push(kind, NodeKey::of(kind, node), node.span(), parent);
    self.stack.push(id);
    id
  }

  fn exit(&mut self, id: NodeId) {
    self.stack.pop();
    let end = self.arena.entries.len() as u32;
    self.arena.entries[id.index()].end = end;
  }

  fn flags(&mut self, id: NodeId) -> &mut NodeFlags {
    &mut self.arena.entries[id.index()].flags
  }
}

macro_rules! index_node {
  ($name:ident, $ty:ty, $kind:expr) => {
    fn $name(&mut self, node: &$ty) {
      let id = self.enter($kind, node);
      node.visit_children_with(self);
      self.exit(id);
    }
  };
}

/// Type positions never contain runtime code, so every walker over the
/// arena skips them the same way.
macro_rules! skip_types {
  () => {
    fn visit_ts_type(&mut self, _: &TsType) {}
    fn visit_ts_type_ann(&mut self, _: &TsTypeAnn) {}
    fn visit_ts_type_param_decl(&mut self, _: &TsTypeParamDecl) {}
    fn visit_ts_type_param_instantiation(&mut self, _: &TsTypeParamInstantiation) {}
    fn visit_ts_interface_decl(&mut self, _: &TsInterfaceDecl) {}
    fn visit_ts_type_alias_decl(&mut self, _: &TsTypeAliasDecl) {}
  };
}

pub(crate) use skip_types;

impl Visit for Indexer {
  skip_types!();

  index_node!(visit_module, Module, NodeKind::Module);
  index_node!(visit_module_decl, ModuleDecl, NodeKind::ModuleDecl);
  index_node!(visit_decl, Decl, NodeKind::Decl);
  index_node!(visit_var_decl, VarDecl, NodeKind::VarDecl);
  index_node!(visit_var_declarator, VarDeclarator, NodeKind::VarDeclarator);
  index_node!(visit_pat, Pat, NodeKind::Pat);
  index_node!(visit_object_pat_prop, ObjectPatProp, NodeKind::ObjectPatProp);
  index_node!(visit_block_stmt, BlockStmt, NodeKind::BlockStmt);
  index_node!(visit_import_specifier, ImportSpecifier, NodeKind::ImportSpecifier);
  index_node!(visit_export_specifier, ExportSpecifier, NodeKind::ExportSpecifier);
  index_node!(visit_switch_case, SwitchCase, NodeKind::SwitchCase);
  index_node!(visit_catch_clause, CatchClause, NodeKind::CatchClause);
  index_node!(visit_class, Class, NodeKind::Class);

  fn visit_stmt(&mut self, node: &Stmt) {
    let id = self.enter(NodeKind::Stmt, node);
    match node {
      Stmt::For(..) | Stmt::ForIn(..) | Stmt::ForOf(..) | Stmt::While(..) | Stmt::DoWhile(..) => {
        self.flags(id).is_loop = true;
      }
      Stmt::Switch(..) => self.flags(id).is_switch = true,
      _ => {}
    }
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_expr(&mut self, node: &Expr) {
    let id = self.enter(NodeKind::Expr, node);
    if let Expr::Arrow(..) = node {
      self.flags(id).function_like = true;
    }
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_function(&mut self, node: &Function) {
    let id = self.enter(NodeKind::Function, node);
    self.flags(id).function_like = true;
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_prop_or_spread(&mut self, node: &PropOrSpread) {
    let id = self.enter(NodeKind::Prop, node);
    if let PropOrSpread::Prop(prop) = node {
      if matches!(&**prop, Prop::Getter(..) | Prop::Setter(..)) {
        self.flags(id).function_like = true;
      }
    }
    node.visit_children_with(self);
    self.exit(id);
  }

  fn visit_class_member(&mut self, node: &ClassMember) {
    let id = self.enter(NodeKind::ClassMember, node);
    match node {
      ClassMember::Constructor(..) | ClassMember::StaticBlock(..) => {
        let flags = self.flags(id);
        flags.function_like = true;
        flags.class_body = true;
      }
      ClassMember::Method(..) | ClassMember::PrivateMethod(..) => {
        self.flags(id).class_body = true;
      }
      _ => {}
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

  #[test]
  fn test_ids_are_preorder() {
    let (module, _) = parse_test_module("const a = 1;");
    let arena = NodeArena::build(&module);

    let kinds: Vec<NodeKind> = arena.ids().map(|id| arena.kind(id)).collect();
    assert_eq!(
      kinds,
      vec![
        NodeKind::Module,
        NodeKind::Stmt,
        NodeKind::Decl,
        NodeKind::VarDecl,
        NodeKind::VarDeclarator,
        NodeKind::Pat,
        NodeKind::Expr,
      ]
    );
    assert_eq!(arena.subtree(NodeId::new(0)), 0..7);
    assert_eq!(arena.subtree(NodeId::new(4)), 4..7);
  }

  #[test]
  fn test_children_and_ancestors() {
    let (module, _) = parse_test_module("a; b;");
    let arena = NodeArena::build(&module);

    let statements: Vec<NodeId> = arena.children(NodeId::new(0)).collect();
    assert_eq!(statements, vec![NodeId::new(1), NodeId::new(3)]);

    let ancestors: Vec<NodeId> = arena.ancestors(NodeId::new(4)).collect();
    assert_eq!(ancestors, vec![NodeId::new(3), NodeId::new(0)]);
  }

  #[test]
  fn test_lookup_by_address() {
    let (module, _) = parse_test_module("foo(bar);");
    let arena = NodeArena::build(&module);

    let ModuleItem::Stmt(Stmt::Expr(stmt)) = &module.body[0] else {
      panic!("expected an expression statement");
    };
    let id = arena.id_of(NodeKind::Expr, &*stmt.expr).unwrap();
    assert_eq!(arena.kind(id), NodeKind::Expr);
    assert_eq!(arena.parent(id), Some(NodeId::new(1)));
  }

  #[test]
  fn test_clone_is_indexed_identically() {
    let (module, _) = parse_test_module("function f(a) { return a + 1; } const b = f(2);");
    let copy = module.clone();
    let left = NodeArena::build(&module);
    let right = NodeArena::build(&copy);

    assert_eq!(left.len(), right.len());
    for id in left.ids() {
      assert_eq!(left.kind(id), right.kind(id));
      assert_eq!(left.parent(id), right.parent(id));
      assert_ne!(left.key(id), right.key(id));
    }
  }

  #[test]
  fn test_function_like_flags() {
    let (module, _) = parse_test_module("const f = () => 1; class A { constructor() {} m() {} }");
    let arena = NodeArena::build(&module);

    let function_like = arena.ids().filter(|id| arena.flags(*id).function_like).count();
    // the arrow, the constructor member and the method's function
    assert_eq!(function_like, 3);
  }

  #[test]
  fn test_type_annotations_are_not_indexed() {
    use swc_core::common::sync::Lrc;
    use swc_core::common::SourceMap;

    let source_map = Lrc::new(SourceMap::default());
    let module = linaria_swc_runner::parse_module(
      "const f: ({ x }: { x: number }) => void = g;",
      "/app/test.ts",
      &source_map,
    )
    .unwrap();
    let arena = NodeArena::build(&module);
    let patterns = arena
      .ids()
      .filter(|id| arena.kind(*id) == NodeKind::Pat)
      .count();
    assert_eq!(patterns, 1);
  }
}
