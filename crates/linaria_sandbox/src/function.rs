use std::rc::Rc;

use swc_core::common::{Span, DUMMY_SP};
use swc_core::ecma::ast::*;
use swc_core::ecma::atoms::Atom;
use swc_core::ecma::visit::{Visit, VisitWith};

use crate::env::Env;
use crate::error::Throw;
use crate::object::{ObjRef, PropertyKey};
use crate::sandbox::Sandbox;
use crate::value::Value;

/// Host function callable from JS. Receives `this` and the arguments.
pub type NativeFn = dyn Fn(&mut Sandbox, &Value, &[Value]) -> Result<Value, Throw>;

/// Host constructor. Receives the arguments and `new.target`.
pub type NativeCtor = dyn Fn(&mut Sandbox, &[Value], &ObjRef) -> Result<Value, Throw>;

#[derive(Clone)]
pub(crate) enum Callable {
  Closure(Rc<Closure>),
  Native(Rc<NativeFunction>),
  Bound(Rc<BoundFunction>),
}

pub(crate) struct NativeFunction {
  pub name: Atom,
  pub call: Box<NativeFn>,
  pub construct: Option<Box<NativeCtor>>,
}

pub(crate) struct BoundFunction {
  pub target: Value,
  pub this: Value,
  pub args: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CodeKind {
  /// `function` declarations and expressions
  Normal,
  Arrow,
  /// Object and class methods, accessors
  Method,
  ClassConstructor,
  /// Class field initializer, evaluated with `this` bound to the instance
  Field,
}

pub(crate) enum FunctionBody {
  Block(Vec<Stmt>),
  Expr(Box<Expr>),
  /// Implicit constructor of a class without one
  DefaultConstructor,
}

/// Owned copy of a function's parameters and body.
///
/// Copies are made once per AST node and shared by every closure created from
/// that node.
pub(crate) struct FunctionCode {
  pub name: Atom,
  pub params: Vec<Pat>,
  pub body: FunctionBody,
  pub kind: CodeKind,
  pub is_async: bool,
  pub is_generator: bool,
  pub uses_arguments: bool,
  pub filename: Rc<str>,
  pub span: Span,
}

impl FunctionCode {
  pub fn from_function(function: &Function, name: Atom, kind: CodeKind, filename: Rc<str>) -> Self {
    let params: Vec<Pat> = function.params.iter().map(|param| param.pat.clone()).collect();
    let stmts = function
      .body
      .as_ref()
      .map(|body| body.stmts.clone())
      .unwrap_or_default();
    let uses_arguments = uses_arguments(&params, &stmts);
    FunctionCode {
      name,
      params,
      body: FunctionBody::Block(stmts),
      kind,
      is_async: function.is_async,
      is_generator: function.is_generator,
      uses_arguments,
      filename,
      span: function.span,
    }
  }

  pub fn from_arrow(arrow: &ArrowExpr, name: Atom, filename: Rc<str>) -> Self {
    let body = match &*arrow.body {
      BlockStmtOrExpr::BlockStmt(block) => FunctionBody::Block(block.stmts.clone()),
      BlockStmtOrExpr::Expr(expr) => FunctionBody::Expr(expr.clone()),
    };
    FunctionCode {
      name,
      params: arrow.params.clone(),
      body,
      kind: CodeKind::Arrow,
      is_async: arrow.is_async,
      is_generator: arrow.is_generator,
      uses_arguments: false,
      filename,
      span: arrow.span,
    }
  }

  pub fn from_constructor(constructor: &Constructor, name: Atom, filename: Rc<str>) -> Self {
    let params: Vec<Pat> = constructor
      .params
      .iter()
      .filter_map(|param| match param {
        ParamOrTsParamProp::Param(param) => Some(param.pat.clone()),
        ParamOrTsParamProp::TsParamProp(prop) => match &prop.param {
          TsParamPropParam::Ident(ident) => Some(Pat::Ident(ident.clone())),
          TsParamPropParam::Assign(assign) => Some(Pat::Assign(assign.clone())),
        },
      })
      .collect();
    let stmts = constructor
      .body
      .as_ref()
      .map(|body| body.stmts.clone())
      .unwrap_or_default();
    let uses_arguments = uses_arguments(&params, &stmts);
    FunctionCode {
      name,
      params,
      body: FunctionBody::Block(stmts),
      kind: CodeKind::ClassConstructor,
      is_async: false,
      is_generator: false,
      uses_arguments,
      filename,
      span: constructor.span,
    }
  }

  pub fn default_constructor(name: Atom, filename: Rc<str>, span: Span) -> Self {
    FunctionCode {
      name,
      params: vec![],
      body: FunctionBody::DefaultConstructor,
      kind: CodeKind::ClassConstructor,
      is_async: false,
      is_generator: false,
      uses_arguments: false,
      filename,
      span,
    }
  }

  pub fn getter(body: &Option<BlockStmt>, name: Atom, filename: Rc<str>, span: Span) -> Self {
    let stmts = body.as_ref().map(|body| body.stmts.clone()).unwrap_or_default();
    FunctionCode {
      name,
      params: vec![],
      uses_arguments: uses_arguments(&[], &stmts),
      body: FunctionBody::Block(stmts),
      kind: CodeKind::Method,
      is_async: false,
      is_generator: false,
      filename,
      span,
    }
  }

  pub fn setter(
    param: &Pat,
    body: &Option<BlockStmt>,
    name: Atom,
    filename: Rc<str>,
    span: Span,
  ) -> Self {
    let params = vec![param.clone()];
    let stmts = body.as_ref().map(|body| body.stmts.clone()).unwrap_or_default();
    FunctionCode {
      name,
      uses_arguments: uses_arguments(&params, &stmts),
      params,
      body: FunctionBody::Block(stmts),
      kind: CodeKind::Method,
      is_async: false,
      is_generator: false,
      filename,
      span,
    }
  }

  pub fn field(value: &Expr, name: Atom, filename: Rc<str>) -> Self {
    FunctionCode {
      name,
      params: vec![],
      body: FunctionBody::Expr(Box::new(value.clone())),
      kind: CodeKind::Field,
      is_async: false,
      is_generator: false,
      uses_arguments: false,
      filename,
      span: DUMMY_SP,
    }
  }

  /// Top-level code of a compiled script, run as a function body
  pub fn script(stmts: Vec<Stmt>, params: &[&str], filename: Rc<str>, span: Span) -> Self {
    let params: Vec<Pat> = params
      .iter()
      .map(|name| Pat::Ident(BindingIdent::from(Ident::new_no_ctxt((*name).into(), DUMMY_SP))))
      .collect();
    FunctionCode {
      name: Atom::default(),
      uses_arguments: uses_arguments(&params, &stmts),
      params,
      body: FunctionBody::Block(stmts),
      kind: CodeKind::Normal,
      is_async: false,
      is_generator: false,
      filename,
      span,
    }
  }

  pub fn is_constructor(&self) -> bool {
    matches!(self.kind, CodeKind::Normal | CodeKind::ClassConstructor)
      && !self.is_async
      && !self.is_generator
  }

  /// Number of parameters before the first default or rest
  pub fn arity(&self) -> usize {
    self
      .params
      .iter()
      .take_while(|pat| !matches!(pat, Pat::Assign(..) | Pat::Rest(..)))
      .count()
  }
}

/// `this`, `super` and `new.target` as seen by an arrow function
#[derive(Clone, Default)]
pub(crate) struct Lexical {
  pub this: Option<Value>,
  pub home_object: Option<ObjRef>,
  pub new_target: Option<Value>,
  pub func: Option<ObjRef>,
  pub class: Option<Rc<ClassInfo>>,
}

pub(crate) struct Closure {
  pub code: Rc<FunctionCode>,
  pub env: Env,
  /// Captured at creation for arrow functions
  pub lexical: Option<Lexical>,
  pub home_object: Option<ObjRef>,
  pub class: Option<Rc<ClassInfo>>,
}

pub(crate) struct FieldDef {
  pub key: PropertyKey,
  /// Initializer closure, called with the instance as `this`
  pub init: Option<Value>,
}

pub(crate) struct ClassInfo {
  pub derived: bool,
  pub fields: Vec<FieldDef>,
}

fn uses_arguments(params: &[Pat], stmts: &[Stmt]) -> bool {
  let mut finder = ArgumentsFinder { found: false };
  for pat in params {
    pat.visit_with(&mut finder);
  }
  for stmt in stmts {
    stmt.visit_with(&mut finder);
  }
  finder.found
}

/// Looks for `arguments` outside of nested non-arrow functions
struct ArgumentsFinder {
  found: bool,
}

impl Visit for ArgumentsFinder {
  fn visit_function(&mut self, _: &Function) {}
  fn visit_constructor(&mut self, _: &Constructor) {}
  fn visit_getter_prop(&mut self, _: &GetterProp) {}
  fn visit_setter_prop(&mut self, _: &SetterProp) {}
  fn visit_class(&mut self, _: &Class) {}

  fn visit_ident(&mut self, ident: &Ident) {
    if &*ident.sym == "arguments" {
      self.found = true;
    }
  }
}
