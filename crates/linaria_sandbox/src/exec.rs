//! Statements, declarations and destructuring.

use swc_core::ecma::ast::*;
use swc_core::ecma::atoms::Atom;
use swc_core::ecma::visit::{Visit, VisitWith};

use crate::env::{copy_env, new_env};
use crate::error::Throw;
use crate::object::Property;
use crate::sandbox::Sandbox;
use crate::value::Value;

/// Result of running a statement
pub(crate) enum Completion {
  Normal,
  Return(Value),
  Break(Option<Atom>),
  Continue(Option<Atom>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindMode {
  Var,
  Let,
  Const,
  /// Plain assignment to existing references
  Assign,
}

impl BindMode {
  fn of(kind: VarDeclKind) -> Self {
    match kind {
      VarDeclKind::Var => BindMode::Var,
      VarDeclKind::Let => BindMode::Let,
      VarDeclKind::Const => BindMode::Const,
    }
  }
}

enum LoopFlow {
  Next,
  Exit(Completion),
}

fn loop_flow(completion: Completion, labels: &[Atom]) -> LoopFlow {
  match completion {
    Completion::Normal | Completion::Continue(None) => LoopFlow::Next,
    Completion::Continue(Some(label)) if labels.contains(&label) => LoopFlow::Next,
    Completion::Break(None) => LoopFlow::Exit(Completion::Normal),
    Completion::Break(Some(label)) if labels.contains(&label) => LoopFlow::Exit(Completion::Normal),
    other => LoopFlow::Exit(other),
  }
}

/// Names bound by a pattern
pub(crate) fn pat_names(pat: &Pat, names: &mut Vec<Atom>) {
  match pat {
    Pat::Ident(ident) => names.push(ident.id.sym.clone()),
    Pat::Array(array) => {
      for elem in array.elems.iter().flatten() {
        pat_names(elem, names);
      }
    }
    Pat::Rest(rest) => pat_names(&rest.arg, names),
    Pat::Object(object) => {
      for prop in &object.props {
        match prop {
          ObjectPatProp::KeyValue(kv) => pat_names(&kv.value, names),
          ObjectPatProp::Assign(assign) => names.push(assign.key.id.sym.clone()),
          ObjectPatProp::Rest(rest) => pat_names(&rest.arg, names),
        }
      }
    }
    Pat::Assign(assign) => pat_names(&assign.left, names),
    Pat::Expr(..) | Pat::Invalid(..) => {}
  }
}

/// Collects `var` declared names of a function body, without entering nested
/// functions and classes
#[derive(Default)]
struct VarCollector {
  names: Vec<Atom>,
}

impl Visit for VarCollector {
  fn visit_function(&mut self, _: &Function) {}
  fn visit_arrow_expr(&mut self, _: &ArrowExpr) {}
  fn visit_class(&mut self, _: &Class) {}
  fn visit_constructor(&mut self, _: &Constructor) {}
  fn visit_getter_prop(&mut self, _: &GetterProp) {}
  fn visit_setter_prop(&mut self, _: &SetterProp) {}
  fn visit_expr(&mut self, _: &Expr) {}

  fn visit_var_decl(&mut self, decl: &VarDecl) {
    if decl.kind == VarDeclKind::Var {
      for declarator in &decl.decls {
        pat_names(&declarator.name, &mut self.names);
      }
    }
  }
}

impl Sandbox {
  /// Declare the `var`s, lexical bindings and functions of a function body
  pub(crate) fn hoist_function_body(&mut self, stmts: &[Stmt]) -> Result<(), Throw> {
    let mut collector = VarCollector::default();
    for stmt in stmts {
      stmt.visit_with(&mut collector);
    }
    for name in &collector.names {
      self.declare_var(name);
    }
    self.hoist_block(stmts)
  }

  /// Lexical declarations of a block start uninitialized, functions are
  /// created up front
  pub(crate) fn hoist_block(&mut self, stmts: &[Stmt]) -> Result<(), Throw> {
    for stmt in stmts {
      let Stmt::Decl(decl) = stmt else {
        continue;
      };
      match decl {
        Decl::Var(var) if var.kind != VarDeclKind::Var => {
          let mut names = Vec::new();
          for declarator in &var.decls {
            pat_names(&declarator.name, &mut names);
          }
          for name in names {
            self.declare(name, None, var.kind == VarDeclKind::Let);
          }
        }
        Decl::Class(class) => self.declare(class.ident.sym.clone(), None, true),
        Decl::Fn(function) if !function.declare => {
          let value = self.function_value(&function.function, function.ident.sym.clone())?;
          self.declare(function.ident.sym.clone(), Some(value), true);
        }
        _ => {}
      }
    }
    Ok(())
  }

  pub(crate) fn exec_stmts(&mut self, stmts: &[Stmt]) -> Result<Completion, Throw> {
    for stmt in stmts {
      match self.exec_stmt(stmt)? {
        Completion::Normal => {}
        abrupt => return Ok(abrupt),
      }
    }
    Ok(Completion::Normal)
  }

  fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Completion, Throw> {
    let env = new_env(Some(self.env.clone()), false);
    self.with_env(env, |sandbox| {
      sandbox.hoist_block(stmts)?;
      sandbox.exec_stmts(stmts)
    })
  }

  pub(crate) fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Completion, Throw> {
    self.exec_labelled(stmt, &[])
  }

  fn exec_labelled(&mut self, stmt: &Stmt, labels: &[Atom]) -> Result<Completion, Throw> {
    match stmt {
      Stmt::Block(block) => self.exec_block(&block.stmts),
      Stmt::Empty(..) | Stmt::Debugger(..) => Ok(Completion::Normal),
      Stmt::With(with) => {
        self.set_position(with.span);
        Err(self.syntax_error("Strict mode code may not include a with statement"))
      }
      Stmt::Return(ret) => {
        let value = match &ret.arg {
          Some(arg) => self.eval_expr(arg)?,
          None => Value::Undefined,
        };
        Ok(Completion::Return(value))
      }
      Stmt::Labeled(labeled) => {
        let mut labels = labels.to_vec();
        labels.push(labeled.label.sym.clone());
        match self.exec_labelled(&labeled.body, &labels)? {
          Completion::Break(Some(label)) if label == labeled.label.sym => Ok(Completion::Normal),
          other => Ok(other),
        }
      }
      Stmt::Break(brk) => Ok(Completion::Break(
        brk.label.as_ref().map(|label| label.sym.clone()),
      )),
      Stmt::Continue(cont) => Ok(Completion::Continue(
        cont.label.as_ref().map(|label| label.sym.clone()),
      )),
      Stmt::If(if_stmt) => {
        if self.eval_expr(&if_stmt.test)?.truthy() {
          self.exec_stmt(&if_stmt.cons)
        } else if let Some(alt) = &if_stmt.alt {
          self.exec_stmt(alt)
        } else {
          Ok(Completion::Normal)
        }
      }
      Stmt::Switch(switch) => self.exec_switch(switch),
      Stmt::Throw(throw) => {
        let value = self.eval_expr(&throw.arg)?;
        Err(Throw(value))
      }
      Stmt::Try(try_stmt) => self.exec_try(try_stmt),
      Stmt::While(while_stmt) => {
        loop {
          if !self.eval_expr(&while_stmt.test)?.truthy() {
            break;
          }
          if let LoopFlow::Exit(completion) = loop_flow(self.exec_stmt(&while_stmt.body)?, labels) {
            return Ok(completion);
          }
        }
        Ok(Completion::Normal)
      }
      Stmt::DoWhile(do_while) => {
        loop {
          if let LoopFlow::Exit(completion) = loop_flow(self.exec_stmt(&do_while.body)?, labels) {
            return Ok(completion);
          }
          if !self.eval_expr(&do_while.test)?.truthy() {
            break;
          }
        }
        Ok(Completion::Normal)
      }
      Stmt::For(for_stmt) => self.exec_for(for_stmt, labels),
      Stmt::ForIn(for_in) => {
        let object = self.eval_expr(&for_in.right)?;
        let keys = self.for_in_keys(&object)?;
        self.exec_for_each(&for_in.left, keys, &for_in.body, labels)
      }
      Stmt::ForOf(for_of) => {
        if for_of.is_await {
          return Err(self.syntax_error("for await is not supported"));
        }
        let iterable = self.eval_expr(&for_of.right)?;
        self.set_position(for_of.span);
        let values = self.iterate(&iterable)?;
        self.exec_for_each(&for_of.left, values, &for_of.body, labels)
      }
      Stmt::Decl(decl) => self.exec_decl(decl),
      Stmt::Expr(expr) => {
        self.eval_expr(&expr.expr)?;
        Ok(Completion::Normal)
      }
    }
  }

  fn exec_decl(&mut self, decl: &Decl) -> Result<Completion, Throw> {
    match decl {
      Decl::Var(var) => self.exec_var_decl(var)?,
      Decl::Class(class) => {
        let value = self.eval_class(&class.class, class.ident.sym.clone())?;
        self.initialize(&class.ident.sym, value);
      }
      Decl::Using(using) => {
        self.set_position(using.span);
        return Err(self.syntax_error("using declarations are not supported"));
      }
      Decl::Fn(..)
      | Decl::TsInterface(..)
      | Decl::TsTypeAlias(..)
      | Decl::TsEnum(..)
      | Decl::TsModule(..) => {}
    }
    Ok(Completion::Normal)
  }

  pub(crate) fn exec_var_decl(&mut self, var: &VarDecl) -> Result<(), Throw> {
    let mode = BindMode::of(var.kind);
    for declarator in &var.decls {
      match &declarator.init {
        Some(init) => {
          let value = match &declarator.name {
            Pat::Ident(ident) => self.eval_named_expr(init, &ident.id.sym)?,
            _ => self.eval_expr(init)?,
          };
          self.bind_pattern(&declarator.name, value, mode)?;
        }
        None if mode != BindMode::Var => {
          self.bind_pattern(&declarator.name, Value::Undefined, mode)?;
        }
        None => {}
      }
    }
    Ok(())
  }

  fn exec_switch(&mut self, switch: &SwitchStmt) -> Result<Completion, Throw> {
    let discriminant = self.eval_expr(&switch.discriminant)?;
    let env = new_env(Some(self.env.clone()), false);
    self.with_env(env, |sandbox| {
      for case in &switch.cases {
        sandbox.hoist_block(&case.cons)?;
      }

      let mut start = None;
      for (index, case) in switch.cases.iter().enumerate() {
        if let Some(test) = &case.test {
          if sandbox.eval_expr(test)?.strict_equals(&discriminant) {
            start = Some(index);
            break;
          }
        }
      }
      let start = start.or_else(|| switch.cases.iter().position(|case| case.test.is_none()));
      let Some(start) = start else {
        return Ok(Completion::Normal);
      };

      for case in &switch.cases[start..] {
        match sandbox.exec_stmts(&case.cons)? {
          Completion::Normal => {}
          Completion::Break(None) => return Ok(Completion::Normal),
          abrupt => return Ok(abrupt),
        }
      }
      Ok(Completion::Normal)
    })
  }

  fn exec_try(&mut self, try_stmt: &TryStmt) -> Result<Completion, Throw> {
    let mut result = self.exec_block(&try_stmt.block.stmts);

    if let (Err(thrown), Some(handler)) = (&result, &try_stmt.handler) {
      let thrown = thrown.0.clone();
      let env = new_env(Some(self.env.clone()), false);
      result = self.with_env(env, |sandbox| {
        if let Some(param) = &handler.param {
          sandbox.bind_pattern(param, thrown, BindMode::Let)?;
        }
        sandbox.exec_block(&handler.body.stmts)
      });
    }

    if let Some(finalizer) = &try_stmt.finalizer {
      match self.exec_block(&finalizer.stmts)? {
        Completion::Normal => {}
        abrupt => return Ok(abrupt),
      }
    }
    result
  }

  fn exec_for(&mut self, for_stmt: &ForStmt, labels: &[Atom]) -> Result<Completion, Throw> {
    let loop_env = new_env(Some(self.env.clone()), false);
    self.with_env(loop_env.clone(), |sandbox| {
      let mut per_iteration = Vec::new();
      match &for_stmt.init {
        Some(VarDeclOrExpr::VarDecl(var)) => {
          if var.kind != VarDeclKind::Var {
            for declarator in &var.decls {
              pat_names(&declarator.name, &mut per_iteration);
            }
            for name in &per_iteration {
              sandbox.declare(name.clone(), None, var.kind == VarDeclKind::Let);
            }
          }
          sandbox.exec_var_decl(var)?;
        }
        Some(VarDeclOrExpr::Expr(expr)) => {
          sandbox.eval_expr(expr)?;
        }
        None => {}
      }

      let mut env = if per_iteration.is_empty() {
        loop_env.clone()
      } else {
        copy_env(&loop_env, &per_iteration)
      };
      loop {
        let completion = sandbox.with_env(env.clone(), |sandbox| {
          if let Some(test) = &for_stmt.test {
            if !sandbox.eval_expr(test)?.truthy() {
              return Ok(None);
            }
          }
          sandbox.exec_stmt(&for_stmt.body).map(Some)
        })?;
        let Some(completion) = completion else {
          break;
        };
        if let LoopFlow::Exit(completion) = loop_flow(completion, labels) {
          return Ok(completion);
        }

        if !per_iteration.is_empty() {
          env = copy_env(&env, &per_iteration);
        }
        if let Some(update) = &for_stmt.update {
          sandbox.with_env(env.clone(), |sandbox| sandbox.eval_expr(update))?;
        }
      }
      Ok(Completion::Normal)
    })
  }

  /// Enumerable string keys of `object` and its prototypes, for `for...in`
  fn for_in_keys(&mut self, object: &Value) -> Result<Vec<Value>, Throw> {
    if object.is_nullish() {
      return Ok(vec![]);
    }
    let obj = self.to_object(object)?;
    let mut keys: Vec<Atom> = Vec::new();
    let mut shadowed: Vec<Atom> = Vec::new();
    let mut current = Some(obj);
    while let Some(obj) = current {
      for key in Self::own_keys(&obj, false) {
        if shadowed.contains(&key) {
          continue;
        }
        if Self::own_property(&obj, &key).is_some_and(|property| property.enumerable) {
          keys.push(key.clone());
        }
        shadowed.push(key);
      }
      current = obj.prototype();
    }
    Ok(keys.into_iter().map(|key| Value::from(&*key)).collect())
  }

  fn exec_for_each(
    &mut self,
    head: &ForHead,
    values: Vec<Value>,
    body: &Stmt,
    labels: &[Atom],
  ) -> Result<Completion, Throw> {
    for value in values {
      let env = new_env(Some(self.env.clone()), false);
      let completion = self.with_env(env, |sandbox| {
        match head {
          ForHead::VarDecl(var) => {
            let Some(declarator) = var.decls.first() else {
              return Err(sandbox.syntax_error("Invalid left-hand side in for loop"));
            };
            sandbox.bind_pattern(&declarator.name, value, BindMode::of(var.kind))?;
          }
          ForHead::Pat(pat) => sandbox.bind_pattern(pat, value, BindMode::Assign)?,
          ForHead::UsingDecl(..) => {
            return Err(sandbox.syntax_error("using declarations are not supported"));
          }
        }
        sandbox.exec_stmt(body)
      })?;
      if let LoopFlow::Exit(completion) = loop_flow(completion, labels) {
        return Ok(completion);
      }
    }
    Ok(Completion::Normal)
  }

  // Destructuring

  pub(crate) fn bind_pattern(&mut self, pat: &Pat, value: Value, mode: BindMode) -> Result<(), Throw> {
    match pat {
      Pat::Ident(ident) => self.bind_name(&ident.id.sym, value, mode),
      Pat::Array(array) => self.bind_array_pattern(array, value, mode),
      Pat::Object(object) => self.bind_object_pattern(object, value, mode),
      Pat::Assign(assign) => {
        let value = if value.is_undefined() {
          match &*assign.left {
            Pat::Ident(ident) => self.eval_named_expr(&assign.right, &ident.id.sym)?,
            _ => self.eval_expr(&assign.right)?,
          }
        } else {
          value
        };
        self.bind_pattern(&assign.left, value, mode)
      }
      Pat::Rest(rest) => self.bind_pattern(&rest.arg, value, mode),
      Pat::Expr(expr) => self.assign_to_expr(expr, value),
      Pat::Invalid(..) => Err(self.syntax_error("Invalid destructuring assignment target")),
    }
  }

  fn bind_name(&mut self, name: &Atom, value: Value, mode: BindMode) -> Result<(), Throw> {
    match mode {
      BindMode::Var => self.set_var(name, value),
      BindMode::Let => {
        self.declare(name.clone(), Some(value), true);
        Ok(())
      }
      BindMode::Const => {
        self.declare(name.clone(), Some(value), false);
        Ok(())
      }
      BindMode::Assign => self.assign_binding(name, value),
    }
  }

  pub(crate) fn bind_array_pattern(
    &mut self,
    array: &ArrayPat,
    value: Value,
    mode: BindMode,
  ) -> Result<(), Throw> {
    self.set_position(array.span);
    let items = self.iterate(&value)?;
    let mut items = items.into_iter();
    for elem in &array.elems {
      match elem {
        None => {
          items.next();
        }
        Some(Pat::Rest(rest)) => {
          let rest_items: Vec<Value> = items.by_ref().collect();
          let rest_array = Value::Object(self.alloc_array(rest_items));
          self.bind_pattern(&rest.arg, rest_array, mode)?;
        }
        Some(pat) => {
          let item = items.next().unwrap_or_default();
          self.bind_pattern(pat, item, mode)?;
        }
      }
    }
    Ok(())
  }

  pub(crate) fn bind_object_pattern(
    &mut self,
    object: &ObjectPat,
    value: Value,
    mode: BindMode,
  ) -> Result<(), Throw> {
    if value.is_nullish() {
      self.set_position(object.span);
      return Err(self.type_error(format!(
        "Cannot destructure '{}' as it is {}.",
        self.describe_value(&value),
        if value.is_undefined() {
          "undefined"
        } else {
          "null"
        }
      )));
    }

    let mut used: Vec<Atom> = Vec::new();
    for prop in &object.props {
      match prop {
        ObjectPatProp::KeyValue(kv) => {
          let key = self.prop_name_key(&kv.key)?;
          let item = self.get_property(&value, &key)?;
          used.push(key);
          self.bind_pattern(&kv.value, item, mode)?;
        }
        ObjectPatProp::Assign(assign) => {
          let key = assign.key.id.sym.clone();
          let mut item = self.get_property(&value, &key)?;
          if item.is_undefined() {
            if let Some(default) = &assign.value {
              item = self.eval_named_expr(default, &key)?;
            }
          }
          used.push(key.clone());
          self.bind_name(&key, item, mode)?;
        }
        ObjectPatProp::Rest(rest) => {
          let source = self.to_object(&value)?;
          let target = self.alloc_object();
          for key in Self::own_keys(&source, true) {
            if used.contains(&key) {
              continue;
            }
            let item = self.get_from(&source, &key, &value)?;
            target.borrow_mut().properties.insert(key, Property::data(item));
          }
          self.bind_pattern(&rest.arg, Value::Object(target), mode)?;
        }
      }
    }
    Ok(())
  }

  /// Copy own enumerable properties of `source` onto `target`, as done by
  /// object spread and `Object.assign`
  pub(crate) fn copy_data_properties(
    &mut self,
    target: &Value,
    source: &Value,
    define: bool,
  ) -> Result<(), Throw> {
    if source.is_nullish() {
      return Ok(());
    }
    let Value::Object(target_obj) = target else {
      return Ok(());
    };
    let source_obj = self.to_object(source)?;
    let source_value = Value::Object(source_obj.clone());
    for key in Self::own_keys(&source_obj, true) {
      let item = self.get_from(&source_obj, &key, &source_value)?;
      if define {
        self.define_own(target_obj, key, Property::data(item))?;
      } else {
        self.set_property(target, key, item)?;
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use swc_core::common::sync::Lrc;
  use swc_core::common::SourceMap;

  use super::*;

  fn names_of(code: &str) -> Vec<String> {
    let source_map = Lrc::new(SourceMap::default());
    let script = linaria_swc_runner::parse_script(code, "/a.js", &source_map).unwrap();
    let mut collector = VarCollector::default();
    for stmt in &script.body {
      stmt.visit_with(&mut collector);
    }
    collector.names.iter().map(|name| name.to_string()).collect()
  }

  #[test]
  fn test_var_collector_skips_nested_functions() {
    let names = names_of(
      "var a = 1; if (a) { var b; } for (var c of []) {} function f() { var d; } let e; (() => { var g; })();",
    );
    assert_eq!(names, vec!["a", "b", "c"]);
  }

  #[test]
  fn test_pat_names_walks_nested_patterns() {
    let names = names_of("var { a, b: [c, ...d], ...e } = {}, [f = 1] = [];");
    assert_eq!(names, vec!["a", "c", "d", "e", "f"]);
  }
}
