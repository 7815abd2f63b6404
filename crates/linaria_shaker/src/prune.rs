use std::collections::HashSet;

use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};

use crate::arena::{NodeKey, NodeKind};

/// Removes dead entries from the lists of a tree.
///
/// Works bottom-up: children are pruned first, then the list they live in,
/// so the addresses recorded in `alive` stay valid for every check. Dead
/// nodes that are not list entries are left as they are.
pub(crate) struct Pruner<'a> {
  alive: &'a HashSet<NodeKey>,
}

impl<'a> Pruner<'a> {
  pub fn new(alive: &'a HashSet<NodeKey>) -> Self {
    Pruner { alive }
  }

  fn is_alive<T>(&self, kind: NodeKind, node: &T) -> bool {
    self.alive.contains(&NodeKey::of(kind, node))
  }

  fn stmt_alive(&self, stmt: &Stmt) -> bool {
    self.is_alive(NodeKind::Stmt, stmt) && !is_empty_declaration(stmt)
  }
}

fn is_empty_declaration(stmt: &Stmt) -> bool {
  matches!(stmt, Stmt::Decl(Decl::Var(var)) if var.decls.is_empty())
}

fn retain_alive<T>(items: &mut Vec<T>, alive: impl Fn(&T) -> bool) {
  let keep: Vec<bool> = items.iter().map(alive).collect();
  let mut keep = keep.into_iter();
  items.retain(|_| keep.next().unwrap_or(true));
}

macro_rules! prune_node {
  ($name:ident, $ty:ty, $kind:expr) => {
    fn $name(&mut self, node: &mut $ty) {
      if self.is_alive($kind, node) {
        node.visit_mut_children_with(self);
      }
    }
  };
}

impl VisitMut for Pruner<'_> {
  fn visit_mut_ts_type(&mut self, _: &mut TsType) {}
  fn visit_mut_ts_type_ann(&mut self, _: &mut TsTypeAnn) {}
  fn visit_mut_ts_type_param_decl(&mut self, _: &mut TsTypeParamDecl) {}
  fn visit_mut_ts_type_param_instantiation(&mut self, _: &mut TsTypeParamInstantiation) {}
  fn visit_mut_ts_interface_decl(&mut self, _: &mut TsInterfaceDecl) {}
  fn visit_mut_ts_type_alias_decl(&mut self, _: &mut TsTypeAliasDecl) {}

  prune_node!(visit_mut_decl, Decl, NodeKind::Decl);
  prune_node!(visit_mut_var_declarator, VarDeclarator, NodeKind::VarDeclarator);
  prune_node!(visit_mut_object_pat_prop, ObjectPatProp, NodeKind::ObjectPatProp);
  prune_node!(visit_mut_prop_or_spread, PropOrSpread, NodeKind::Prop);
  prune_node!(visit_mut_function, Function, NodeKind::Function);
  prune_node!(visit_mut_import_specifier, ImportSpecifier, NodeKind::ImportSpecifier);
  prune_node!(visit_mut_export_specifier, ExportSpecifier, NodeKind::ExportSpecifier);
  prune_node!(visit_mut_catch_clause, CatchClause, NodeKind::CatchClause);
  prune_node!(visit_mut_class, Class, NodeKind::Class);
  prune_node!(visit_mut_class_member, ClassMember, NodeKind::ClassMember);

  fn visit_mut_module(&mut self, node: &mut Module) {
    node.visit_mut_children_with(self);
    retain_alive(&mut node.body, |item| match item {
      ModuleItem::Stmt(stmt) => self.stmt_alive(stmt),
      ModuleItem::ModuleDecl(decl) => self.is_alive(NodeKind::ModuleDecl, decl),
    });
  }

  fn visit_mut_module_decl(&mut self, node: &mut ModuleDecl) {
    if !self.is_alive(NodeKind::ModuleDecl, node) {
      return;
    }
    node.visit_mut_children_with(self);
    if let ModuleDecl::Import(import) = node {
      retain_alive(&mut import.specifiers, |specifier| {
        self.is_alive(NodeKind::ImportSpecifier, specifier)
      });
    }
  }

  fn visit_mut_stmt(&mut self, node: &mut Stmt) {
    if !self.is_alive(NodeKind::Stmt, node) {
      return;
    }
    node.visit_mut_children_with(self);
    if let Stmt::If(if_stmt) = node {
      if !self.is_alive(NodeKind::Stmt, &*if_stmt.cons) {
        *if_stmt.cons = Stmt::Empty(EmptyStmt { span: DUMMY_SP });
      }
      if let Some(alt) = &if_stmt.alt {
        if !self.is_alive(NodeKind::Stmt, &**alt) {
          if_stmt.alt = None;
        }
      }
    }
  }

  fn visit_mut_block_stmt(&mut self, node: &mut BlockStmt) {
    if !self.is_alive(NodeKind::BlockStmt, node) {
      return;
    }
    node.visit_mut_children_with(self);
    retain_alive(&mut node.stmts, |stmt| self.stmt_alive(stmt));
  }

  fn visit_mut_switch_case(&mut self, node: &mut SwitchCase) {
    if !self.is_alive(NodeKind::SwitchCase, node) {
      return;
    }
    node.visit_mut_children_with(self);
    retain_alive(&mut node.cons, |stmt| self.stmt_alive(stmt));
  }

  fn visit_mut_var_decl(&mut self, node: &mut VarDecl) {
    if !self.is_alive(NodeKind::VarDecl, node) {
      return;
    }
    node.visit_mut_children_with(self);
    retain_alive(&mut node.decls, |declarator| {
      self.is_alive(NodeKind::VarDeclarator, declarator)
    });
  }

  fn visit_mut_pat(&mut self, node: &mut Pat) {
    if !self.is_alive(NodeKind::Pat, node) {
      return;
    }
    node.visit_mut_children_with(self);
    match node {
      Pat::Object(object) => {
        retain_alive(&mut object.props, |prop| {
          self.is_alive(NodeKind::ObjectPatProp, prop)
        });
      }
      Pat::Array(array) => {
        for elem in array.elems.iter_mut() {
          if elem
            .as_ref()
            .is_some_and(|pat| !self.is_alive(NodeKind::Pat, pat))
          {
            *elem = None;
          }
        }
      }
      _ => {}
    }
  }

  fn visit_mut_expr(&mut self, node: &mut Expr) {
    if !self.is_alive(NodeKind::Expr, node) {
      return;
    }
    node.visit_mut_children_with(self);
    if let Expr::Seq(seq) = node {
      retain_alive(&mut seq.exprs, |expr| self.is_alive(NodeKind::Expr, &**expr));
    }
  }
}
