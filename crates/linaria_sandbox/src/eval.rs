//! Expression evaluation.

use std::rc::Rc;

use swc_core::common::Span;
use swc_core::ecma::ast::*;
use swc_core::ecma::atoms::Atom;
use swc_core::ecma::utils::stack_size::maybe_grow_default;

use crate::env::new_env;
use crate::error::Throw;
use crate::exec::BindMode;
use crate::function::{Closure, CodeKind, FunctionCode, Lexical};
use crate::object::{ObjRef, Property, PropertyKey, Slot};
use crate::sandbox::Sandbox;
use crate::value::{number_to_string, Value};

const TAG_FUNCTION: u8 = 0;
const TAG_ARROW: u8 = 1;
const TAG_GETTER: u8 = 2;
const TAG_SETTER: u8 = 3;
const TAG_METHOD: u8 = 4;

/// Assignable place
pub(crate) enum Reference {
  Binding(Atom),
  Property(Value, PropertyKey),
  Super(PropertyKey),
}

impl Sandbox {
  pub(crate) fn set_position(&mut self, span: Span) {
    if let Some(frame) = self.frames.last_mut() {
      frame.span = span;
    }
  }

  pub(crate) fn current_filename(&self) -> Rc<str> {
    match self.frames.last() {
      Some(frame) => frame.filename.clone(),
      None => "<anonymous>".into(),
    }
  }

  /// Shared copy of a function node, built once per node and name
  pub(crate) fn cached_code(
    &mut self,
    node: usize,
    tag: u8,
    name: &Atom,
    build: impl FnOnce(Rc<str>) -> FunctionCode,
  ) -> Rc<FunctionCode> {
    let key = (node, tag, name.clone());
    if let Some(code) = self.code_cache.get(&key) {
      return code.clone();
    }
    let code = Rc::new(build(self.current_filename()));
    self.code_cache.insert(key, code.clone());
    code
  }

  pub(crate) fn lexical(&self) -> Lexical {
    match self.frames.last() {
      Some(frame) => Lexical {
        this: frame.this.clone(),
        home_object: frame.home_object.clone(),
        new_target: frame.new_target.clone(),
        func: frame.func.clone(),
        class: frame.class.clone(),
      },
      None => Lexical {
        this: Some(Value::Undefined),
        ..Default::default()
      },
    }
  }

  /// Closure over the current scope for a `function` node
  pub(crate) fn function_value(&mut self, function: &Function, name: Atom) -> Result<Value, Throw> {
    let code = self.cached_code(function as *const Function as usize, TAG_FUNCTION, &name, |filename| {
      FunctionCode::from_function(function, name.clone(), CodeKind::Normal, filename)
    });
    let constructor = code.is_constructor();
    let closure = Closure {
      code,
      env: self.env.clone(),
      lexical: None,
      home_object: None,
      class: None,
    };
    Ok(Value::Object(self.closure_object(closure, constructor)))
  }

  pub(crate) fn method_value(
    &mut self,
    function: &Function,
    name: Atom,
    home_object: &ObjRef,
  ) -> Value {
    let code = self.cached_code(function as *const Function as usize, TAG_METHOD, &name, |filename| {
      FunctionCode::from_function(function, name.clone(), CodeKind::Method, filename)
    });
    let closure = Closure {
      code,
      env: self.env.clone(),
      lexical: None,
      home_object: Some(home_object.clone()),
      class: None,
    };
    Value::Object(self.closure_object(closure, false))
  }

  pub(crate) fn getter_value(
    &mut self,
    node: usize,
    body: &Option<BlockStmt>,
    name: Atom,
    span: Span,
    home_object: &ObjRef,
  ) -> Value {
    let display = Atom::from(format!("get {name}"));
    let code = self.cached_code(node, TAG_GETTER, &display, |filename| {
      FunctionCode::getter(body, display.clone(), filename, span)
    });
    let closure = Closure {
      code,
      env: self.env.clone(),
      lexical: None,
      home_object: Some(home_object.clone()),
      class: None,
    };
    Value::Object(self.closure_object(closure, false))
  }

  pub(crate) fn setter_value(
    &mut self,
    node: usize,
    param: &Pat,
    body: &Option<BlockStmt>,
    name: Atom,
    span: Span,
    home_object: &ObjRef,
  ) -> Value {
    let display = Atom::from(format!("set {name}"));
    let code = self.cached_code(node, TAG_SETTER, &display, |filename| {
      FunctionCode::setter(param, body, display.clone(), filename, span)
    });
    let closure = Closure {
      code,
      env: self.env.clone(),
      lexical: None,
      home_object: Some(home_object.clone()),
      class: None,
    };
    Value::Object(self.closure_object(closure, false))
  }

  fn arrow_value(&mut self, arrow: &ArrowExpr, name: Atom) -> Value {
    let code = self.cached_code(arrow as *const ArrowExpr as usize, TAG_ARROW, &name, |filename| {
      FunctionCode::from_arrow(arrow, name.clone(), filename)
    });
    let closure = Closure {
      code,
      env: self.env.clone(),
      lexical: Some(self.lexical()),
      home_object: None,
      class: None,
    };
    Value::Object(self.closure_object(closure, false))
  }

  /// Evaluate `expr`, naming anonymous functions and classes after `name`
  pub(crate) fn eval_named_expr(&mut self, expr: &Expr, name: &Atom) -> Result<Value, Throw> {
    match expr {
      Expr::Arrow(arrow) => Ok(self.arrow_value(arrow, name.clone())),
      Expr::Fn(FnExpr {
        ident: None,
        function,
      }) => self.function_value(function, name.clone()),
      Expr::Class(ClassExpr { ident: None, class }) => self.eval_class(class, name.clone()),
      Expr::Paren(paren) => self.eval_named_expr(&paren.expr, name),
      _ => self.eval_expr(expr),
    }
  }

  pub(crate) fn eval_expr(&mut self, expr: &Expr) -> Result<Value, Throw> {
    maybe_grow_default(|| self.eval_expr_inner(expr))
  }

  fn eval_expr_inner(&mut self, expr: &Expr) -> Result<Value, Throw> {
    match expr {
      Expr::This(this) => {
        self.set_position(this.span);
        self.this_value()
      }
      Expr::Array(array) => {
        let mut items = Vec::with_capacity(array.elems.len());
        for elem in &array.elems {
          match elem {
            None => items.push(Value::Undefined),
            Some(ExprOrSpread {
              spread: Some(..),
              expr,
            }) => {
              let iterable = self.eval_expr(expr)?;
              items.extend(self.iterate(&iterable)?);
            }
            Some(ExprOrSpread { expr, .. }) => items.push(self.eval_expr(expr)?),
          }
        }
        Ok(Value::Object(self.alloc_array(items)))
      }
      Expr::Object(object) => self.eval_object_lit(object),
      Expr::Fn(FnExpr {
        ident: Some(ident),
        function,
      }) => {
        let env = new_env(Some(self.env.clone()), false);
        self.with_env(env, |sandbox| {
          let value = sandbox.function_value(function, ident.sym.clone())?;
          sandbox.declare(ident.sym.clone(), Some(value.clone()), false);
          Ok(value)
        })
      }
      Expr::Fn(FnExpr {
        ident: None,
        function,
      }) => self.function_value(function, Atom::default()),
      Expr::Arrow(arrow) => Ok(self.arrow_value(arrow, Atom::default())),
      Expr::Class(ClassExpr { ident, class }) => match ident {
        Some(ident) => {
          let env = new_env(Some(self.env.clone()), false);
          self.with_env(env, |sandbox| {
            sandbox.declare(ident.sym.clone(), None, false);
            let value = sandbox.eval_class(class, ident.sym.clone())?;
            sandbox.initialize(&ident.sym, value.clone());
            Ok(value)
          })
        }
        None => self.eval_class(class, Atom::default()),
      },
      Expr::Unary(unary) => self.eval_unary(unary),
      Expr::Update(update) => {
        let reference = self.resolve_reference(&update.arg)?;
        let old = self.get_reference(&reference)?;
        let old = self.to_number(&old)?;
        let new = match update.op {
          UpdateOp::PlusPlus => old + 1.0,
          UpdateOp::MinusMinus => old - 1.0,
        };
        self.put_reference(reference, Value::Number(new))?;
        Ok(Value::Number(if update.prefix { new } else { old }))
      }
      Expr::Bin(bin) => self.eval_binary(bin),
      Expr::Assign(assign) => self.eval_assign(assign),
      Expr::Member(member) => {
        let object = self.eval_expr(&member.obj)?;
        let key = self.member_key(&member.prop)?;
        self.set_position(member.span);
        self.get_property(&object, &key)
      }
      Expr::SuperProp(super_prop) => {
        let key = self.super_key(&super_prop.prop)?;
        self.get_reference(&Reference::Super(key))
      }
      Expr::Cond(cond) => {
        if self.eval_expr(&cond.test)?.truthy() {
          self.eval_expr(&cond.cons)
        } else {
          self.eval_expr(&cond.alt)
        }
      }
      Expr::Call(call) => self.eval_call(call),
      Expr::New(new) => {
        let callee = self.eval_expr(&new.callee)?;
        let args = match &new.args {
          Some(args) => self.eval_args(args)?,
          None => vec![],
        };
        self.set_position(new.span);
        if !callee.as_object().is_some_and(|obj| obj.is_callable()) {
          let text = expr_text(&new.callee);
          return Err(self.type_error(format!("{text} is not a constructor")));
        }
        self.construct_value(&callee, &args, None)
      }
      Expr::Seq(seq) => {
        let mut value = Value::Undefined;
        for expr in &seq.exprs {
          value = self.eval_expr(expr)?;
        }
        Ok(value)
      }
      Expr::Ident(ident) => {
        self.set_position(ident.span);
        self.lookup_binding(&ident.sym)
      }
      Expr::Lit(lit) => self.eval_lit(lit),
      Expr::Tpl(tpl) => {
        let mut text = String::new();
        for (index, quasi) in tpl.quasis.iter().enumerate() {
          text.push_str(quasi.cooked.as_deref().unwrap_or(&quasi.raw));
          if let Some(expr) = tpl.exprs.get(index) {
            let value = self.eval_expr(expr)?;
            text.push_str(&self.to_string(&value)?);
          }
        }
        Ok(Value::from(text))
      }
      Expr::TaggedTpl(tagged) => self.eval_tagged_template(tagged),
      Expr::MetaProp(meta) => match meta.kind {
        MetaPropKind::NewTarget => Ok(
          self
            .frames
            .last()
            .and_then(|frame| frame.new_target.clone())
            .unwrap_or_default(),
        ),
        MetaPropKind::ImportMeta => {
          self.set_position(meta.span);
          Err(self.syntax_error("Cannot use 'import.meta' outside a module"))
        }
      },
      Expr::Yield(yield_expr) => {
        self.set_position(yield_expr.span);
        Err(self.syntax_error("Generators are not supported"))
      }
      Expr::Await(await_expr) => {
        self.set_position(await_expr.span);
        Err(self.syntax_error("await is only valid in async functions"))
      }
      Expr::Paren(paren) => self.eval_expr(&paren.expr),
      Expr::TsTypeAssertion(ts) => self.eval_expr(&ts.expr),
      Expr::TsConstAssertion(ts) => self.eval_expr(&ts.expr),
      Expr::TsNonNull(ts) => self.eval_expr(&ts.expr),
      Expr::TsAs(ts) => self.eval_expr(&ts.expr),
      Expr::TsInstantiation(ts) => self.eval_expr(&ts.expr),
      Expr::TsSatisfies(ts) => self.eval_expr(&ts.expr),
      Expr::OptChain(..) => Ok(
        self
          .eval_chain(expr)?
          .map(|(value, _)| value)
          .unwrap_or_default(),
      ),
      Expr::PrivateName(private) => {
        self.set_position(private.span);
        Err(self.syntax_error("Private fields are not supported"))
      }
      _ => Err(self.syntax_error("Unexpected token")),
    }
  }

  pub(crate) fn this_value(&mut self) -> Result<Value, Throw> {
    match self.frames.last() {
      None => Ok(Value::Undefined),
      Some(frame) => match &frame.this {
        Some(this) => Ok(this.clone()),
        None => Err(self.reference_error(
          "Must call super constructor in derived class before accessing 'this' or returning from derived constructor",
        )),
      },
    }
  }

  fn eval_lit(&mut self, lit: &Lit) -> Result<Value, Throw> {
    Ok(match lit {
      Lit::Str(s) => Value::from(&*s.value),
      Lit::Bool(b) => Value::Bool(b.value),
      Lit::Null(..) => Value::Null,
      Lit::Num(n) => Value::Number(n.value),
      Lit::BigInt(big) => {
        self.set_position(big.span);
        return Err(self.syntax_error("BigInt literals are not supported"));
      }
      Lit::Regex(regex) => {
        self.set_position(regex.span);
        return crate::builtins::regexp::new_regexp(self, &regex.exp, &regex.flags);
      }
      Lit::JSXText(text) => Value::from(&*text.value),
    })
  }

  pub(crate) fn eval_args(&mut self, args: &[ExprOrSpread]) -> Result<Vec<Value>, Throw> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
      let value = self.eval_expr(&arg.expr)?;
      if arg.spread.is_some() {
        values.extend(self.iterate(&value)?);
      } else {
        values.push(value);
      }
    }
    Ok(values)
  }

  pub(crate) fn prop_name_key(&mut self, name: &PropName) -> Result<PropertyKey, Throw> {
    match name {
      PropName::Ident(ident) => Ok(ident.sym.clone()),
      PropName::Str(s) => Ok(s.value.clone()),
      PropName::Num(n) => Ok(number_to_string(n.value).into()),
      PropName::Computed(computed) => {
        let value = self.eval_expr(&computed.expr)?;
        self.to_property_key(&value)
      }
      PropName::BigInt(big) => Ok(big.value.to_string().into()),
    }
  }

  fn member_key(&mut self, prop: &MemberProp) -> Result<PropertyKey, Throw> {
    match prop {
      MemberProp::Ident(ident) => Ok(ident.sym.clone()),
      MemberProp::Computed(computed) => {
        let value = self.eval_expr(&computed.expr)?;
        self.to_property_key(&value)
      }
      MemberProp::PrivateName(private) => {
        self.set_position(private.span);
        Err(self.syntax_error("Private fields are not supported"))
      }
    }
  }

  fn super_key(&mut self, prop: &SuperProp) -> Result<PropertyKey, Throw> {
    match prop {
      SuperProp::Ident(ident) => Ok(ident.sym.clone()),
      SuperProp::Computed(computed) => {
        let value = self.eval_expr(&computed.expr)?;
        self.to_property_key(&value)
      }
    }
  }

  fn eval_object_lit(&mut self, object: &ObjectLit) -> Result<Value, Throw> {
    let obj = self.alloc_object();
    let target = Value::Object(obj.clone());
    for prop in &object.props {
      let prop = match prop {
        PropOrSpread::Spread(spread) => {
          let source = self.eval_expr(&spread.expr)?;
          self.copy_data_properties(&target, &source, true)?;
          continue;
        }
        PropOrSpread::Prop(prop) => prop,
      };
      match &**prop {
        Prop::Shorthand(ident) => {
          let value = self.lookup_binding(&ident.sym)?;
          obj
            .borrow_mut()
            .properties
            .insert(ident.sym.clone(), Property::data(value));
        }
        Prop::KeyValue(kv) => {
          let is_proto = matches!(
            &kv.key,
            PropName::Ident(IdentName { sym, .. }) | PropName::Str(Str { value: sym, .. })
              if &**sym == "__proto__"
          );
          let key = self.prop_name_key(&kv.key)?;
          let value = self.eval_named_expr(&kv.value, &key)?;
          if is_proto {
            match value {
              Value::Object(proto) => obj.borrow_mut().proto = Some(proto),
              Value::Null => obj.borrow_mut().proto = None,
              _ => {}
            }
            continue;
          }
          self.define_own(&obj, key, Property::data(value))?;
        }
        Prop::Assign(assign) => {
          self.set_position(assign.span);
          return Err(self.syntax_error("Invalid shorthand property initializer"));
        }
        Prop::Getter(getter) => {
          let key = self.prop_name_key(&getter.key)?;
          let get = self.getter_value(
            getter as *const GetterProp as usize,
            &getter.body,
            key.clone(),
            getter.span,
            &obj,
          );
          self.merge_accessor(&obj, key, Some(get), None, true);
        }
        Prop::Setter(setter) => {
          let key = self.prop_name_key(&setter.key)?;
          let set = self.setter_value(
            setter as *const SetterProp as usize,
            &setter.param,
            &setter.body,
            key.clone(),
            setter.span,
            &obj,
          );
          self.merge_accessor(&obj, key, None, Some(set), true);
        }
        Prop::Method(method) => {
          let key = self.prop_name_key(&method.key)?;
          let value = self.method_value(&method.function, key.clone(), &obj);
          self.define_own(&obj, key, Property::data(value))?;
        }
      }
    }
    Ok(target)
  }

  /// Add a getter or setter, keeping the other half of an existing accessor
  pub(crate) fn merge_accessor(
    &mut self,
    obj: &ObjRef,
    key: PropertyKey,
    get: Option<Value>,
    set: Option<Value>,
    enumerable: bool,
  ) {
    let mut object = obj.borrow_mut();
    let (old_get, old_set) = match object.properties.get(&key).map(|property| &property.slot) {
      Some(Slot::Accessor { get, set }) => (get.clone(), set.clone()),
      _ => (None, None),
    };
    object.properties.insert(
      key,
      Property::accessor(get.or(old_get), set.or(old_set), enumerable),
    );
  }

  fn eval_unary(&mut self, unary: &UnaryExpr) -> Result<Value, Throw> {
    match unary.op {
      UnaryOp::TypeOf => {
        let value = match &*unary.arg {
          Expr::Ident(ident) => self.lookup_binding_for_typeof(&ident.sym)?,
          arg => self.eval_expr(arg)?,
        };
        Ok(Value::from(value.type_of()))
      }
      UnaryOp::Delete => match &*unary.arg {
        Expr::Member(member) => {
          let object = self.eval_expr(&member.obj)?;
          let key = self.member_key(&member.prop)?;
          self.set_position(unary.span);
          let obj = self.to_object(&object)?;
          Ok(Value::Bool(self.delete_property(&obj, &key)?))
        }
        Expr::Ident(..) => Err(self.syntax_error("Delete of an unqualified identifier in strict mode.")),
        arg => {
          self.eval_expr(arg)?;
          Ok(Value::Bool(true))
        }
      },
      UnaryOp::Void => {
        self.eval_expr(&unary.arg)?;
        Ok(Value::Undefined)
      }
      UnaryOp::Bang => Ok(Value::Bool(!self.eval_expr(&unary.arg)?.truthy())),
      UnaryOp::Minus => {
        let value = self.eval_expr(&unary.arg)?;
        Ok(Value::Number(-self.to_number(&value)?))
      }
      UnaryOp::Plus => {
        let value = self.eval_expr(&unary.arg)?;
        Ok(Value::Number(self.to_number(&value)?))
      }
      UnaryOp::Tilde => {
        let value = self.eval_expr(&unary.arg)?;
        Ok(Value::Number(!self.to_int32(&value)? as f64))
      }
    }
  }

  fn eval_binary(&mut self, bin: &BinExpr) -> Result<Value, Throw> {
    match bin.op {
      BinaryOp::LogicalAnd => {
        let left = self.eval_expr(&bin.left)?;
        if !left.truthy() {
          return Ok(left);
        }
        return self.eval_expr(&bin.right);
      }
      BinaryOp::LogicalOr => {
        let left = self.eval_expr(&bin.left)?;
        if left.truthy() {
          return Ok(left);
        }
        return self.eval_expr(&bin.right);
      }
      BinaryOp::NullishCoalescing => {
        let left = self.eval_expr(&bin.left)?;
        if !left.is_nullish() {
          return Ok(left);
        }
        return self.eval_expr(&bin.right);
      }
      _ => {}
    }
    let left = self.eval_expr(&bin.left)?;
    let right = self.eval_expr(&bin.right)?;
    self.set_position(bin.span);
    self.binary_op(bin.op, &left, &right)
  }

  pub(crate) fn binary_op(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Throw> {
    Ok(match op {
      BinaryOp::EqEq => Value::Bool(self.loose_equals(left, right)?),
      BinaryOp::NotEq => Value::Bool(!self.loose_equals(left, right)?),
      BinaryOp::EqEqEq => Value::Bool(left.strict_equals(right)),
      BinaryOp::NotEqEq => Value::Bool(!left.strict_equals(right)),
      BinaryOp::Lt => Value::Bool(self.less_than(left, right)? == Some(true)),
      BinaryOp::Gt => Value::Bool(self.less_than(right, left)? == Some(true)),
      BinaryOp::LtEq => Value::Bool(self.less_than(right, left)? == Some(false)),
      BinaryOp::GtEq => Value::Bool(self.less_than(left, right)? == Some(false)),
      BinaryOp::Add => self.add(left, right)?,
      BinaryOp::Sub => Value::Number(self.to_number(left)? - self.to_number(right)?),
      BinaryOp::Mul => Value::Number(self.to_number(left)? * self.to_number(right)?),
      BinaryOp::Div => Value::Number(self.to_number(left)? / self.to_number(right)?),
      BinaryOp::Mod => Value::Number(self.to_number(left)? % self.to_number(right)?),
      BinaryOp::Exp => Value::Number(js_pow(self.to_number(left)?, self.to_number(right)?)),
      BinaryOp::BitAnd => Value::Number((self.to_int32(left)? & self.to_int32(right)?) as f64),
      BinaryOp::BitOr => Value::Number((self.to_int32(left)? | self.to_int32(right)?) as f64),
      BinaryOp::BitXor => Value::Number((self.to_int32(left)? ^ self.to_int32(right)?) as f64),
      BinaryOp::LShift => {
        let shift = self.to_uint32(right)? & 31;
        Value::Number(self.to_int32(left)?.wrapping_shl(shift) as f64)
      }
      BinaryOp::RShift => {
        let shift = self.to_uint32(right)? & 31;
        Value::Number((self.to_int32(left)? >> shift) as f64)
      }
      BinaryOp::ZeroFillRShift => {
        let shift = self.to_uint32(right)? & 31;
        Value::Number((self.to_uint32(left)? >> shift) as f64)
      }
      BinaryOp::In => {
        let Value::Object(obj) = right else {
          let key = self.to_string(left)?;
          let target = self.describe_value(right);
          return Err(self.type_error(format!(
            "Cannot use 'in' operator to search for '{key}' in {target}"
          )));
        };
        let key = self.to_property_key(left)?;
        Value::Bool(self.has_property(obj, &key))
      }
      BinaryOp::InstanceOf => Value::Bool(self.instance_of(left, right)?),
      BinaryOp::LogicalAnd if left.truthy() => right.clone(),
      BinaryOp::LogicalOr if !left.truthy() => right.clone(),
      BinaryOp::NullishCoalescing if left.is_nullish() => right.clone(),
      BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::NullishCoalescing => left.clone(),
    })
  }

  fn eval_assign(&mut self, assign: &AssignExpr) -> Result<Value, Throw> {
    let simple = match &assign.left {
      AssignTarget::Pat(pat) => {
        let value = self.eval_expr(&assign.right)?;
        match pat {
          AssignTargetPat::Array(array) => {
            self.bind_array_pattern(array, value.clone(), BindMode::Assign)?
          }
          AssignTargetPat::Object(object) => {
            self.bind_object_pattern(object, value.clone(), BindMode::Assign)?
          }
          AssignTargetPat::Invalid(..) => {
            return Err(self.syntax_error("Invalid left-hand side in assignment"));
          }
        }
        return Ok(value);
      }
      AssignTarget::Simple(simple) => simple,
    };

    let reference = self.resolve_simple_target(simple)?;
    let value = match assign.op {
      AssignOp::Assign => match &reference {
        Reference::Binding(name) => self.eval_named_expr(&assign.right, name)?,
        _ => self.eval_expr(&assign.right)?,
      },
      AssignOp::AndAssign | AssignOp::OrAssign | AssignOp::NullishAssign => {
        let current = self.get_reference(&reference)?;
        let keep = match assign.op {
          AssignOp::AndAssign => !current.truthy(),
          AssignOp::OrAssign => current.truthy(),
          _ => !current.is_nullish(),
        };
        if keep {
          return Ok(current);
        }
        self.eval_expr(&assign.right)?
      }
      op => {
        let current = self.get_reference(&reference)?;
        let right = self.eval_expr(&assign.right)?;
        self.set_position(assign.span);
        let Some(op) = op.to_update() else {
          return Err(self.syntax_error("Invalid assignment operator"));
        };
        self.binary_op(op, &current, &right)?
      }
    };
    self.set_position(assign.span);
    self.put_reference(reference, value.clone())?;
    Ok(value)
  }

  /// Assignment to an arbitrary target expression inside a pattern
  pub(crate) fn assign_to_expr(&mut self, expr: &Expr, value: Value) -> Result<(), Throw> {
    let reference = self.resolve_reference(expr)?;
    self.put_reference(reference, value)
  }

  fn resolve_simple_target(&mut self, target: &SimpleAssignTarget) -> Result<Reference, Throw> {
    match target {
      SimpleAssignTarget::Ident(ident) => Ok(Reference::Binding(ident.id.sym.clone())),
      SimpleAssignTarget::Member(member) => {
        let object = self.eval_expr(&member.obj)?;
        let key = self.member_key(&member.prop)?;
        Ok(Reference::Property(object, key))
      }
      SimpleAssignTarget::SuperProp(super_prop) => {
        Ok(Reference::Super(self.super_key(&super_prop.prop)?))
      }
      SimpleAssignTarget::Paren(paren) => self.resolve_reference(&paren.expr),
      SimpleAssignTarget::TsAs(ts) => self.resolve_reference(&ts.expr),
      SimpleAssignTarget::TsSatisfies(ts) => self.resolve_reference(&ts.expr),
      SimpleAssignTarget::TsNonNull(ts) => self.resolve_reference(&ts.expr),
      SimpleAssignTarget::TsTypeAssertion(ts) => self.resolve_reference(&ts.expr),
      SimpleAssignTarget::TsInstantiation(ts) => self.resolve_reference(&ts.expr),
      SimpleAssignTarget::OptChain(..) | SimpleAssignTarget::Invalid(..) => {
        Err(self.syntax_error("Invalid left-hand side in assignment"))
      }
    }
  }

  fn resolve_reference(&mut self, expr: &Expr) -> Result<Reference, Throw> {
    match expr {
      Expr::Ident(ident) => Ok(Reference::Binding(ident.sym.clone())),
      Expr::Member(member) => {
        let object = self.eval_expr(&member.obj)?;
        let key = self.member_key(&member.prop)?;
        Ok(Reference::Property(object, key))
      }
      Expr::SuperProp(super_prop) => Ok(Reference::Super(self.super_key(&super_prop.prop)?)),
      Expr::Paren(paren) => self.resolve_reference(&paren.expr),
      Expr::TsAs(ts) => self.resolve_reference(&ts.expr),
      Expr::TsNonNull(ts) => self.resolve_reference(&ts.expr),
      _ => Err(self.syntax_error("Invalid left-hand side in assignment")),
    }
  }

  fn get_reference(&mut self, reference: &Reference) -> Result<Value, Throw> {
    match reference {
      Reference::Binding(name) => self.lookup_binding(name),
      Reference::Property(object, key) => self.get_property(object, key),
      Reference::Super(key) => {
        let this = self.this_value()?;
        match self.super_base() {
          Some(base) => self.get_from(&base, key, &this),
          None => Ok(Value::Undefined),
        }
      }
    }
  }

  fn put_reference(&mut self, reference: Reference, value: Value) -> Result<(), Throw> {
    match reference {
      Reference::Binding(name) => self.assign_binding(&name, value),
      Reference::Property(object, key) => self.set_property(&object, key, value),
      Reference::Super(key) => {
        let this = self.this_value()?;
        match (self.super_base(), &this) {
          (Some(base), _) => self.set_on(&base, key, value, &this),
          (None, Value::Object(obj)) => {
            let obj = obj.clone();
            self.set_on(&obj, key, value, &this)
          }
          _ => Ok(()),
        }
      }
    }
  }

  /// Prototype of the home object of the running method
  fn super_base(&self) -> Option<ObjRef> {
    self
      .frames
      .last()
      .and_then(|frame| frame.home_object.as_ref())
      .and_then(|home| home.prototype())
  }

  fn eval_call(&mut self, call: &CallExpr) -> Result<Value, Throw> {
    let callee = match &call.callee {
      Callee::Super(..) => {
        let args = self.eval_args(&call.args)?;
        self.set_position(call.span);
        return self.super_call(&args);
      }
      Callee::Import(..) => {
        self.set_position(call.span);
        return Err(self.type_error("Dynamic imports are not supported at build time"));
      }
      Callee::Expr(callee) => callee,
    };

    let (func, this) = self.eval_callee(callee)?;
    let args = self.eval_args(&call.args)?;
    self.set_position(call.span);
    if !func.is_callable() {
      let text = expr_text(callee);
      return Err(self.type_error(format!("{text} is not a function")));
    }
    self.call_function(&func, this, &args)
  }

  /// Function value and `this` for a call
  fn eval_callee(&mut self, callee: &Expr) -> Result<(Value, Value), Throw> {
    match callee {
      Expr::Member(member) => {
        let object = self.eval_expr(&member.obj)?;
        let key = self.member_key(&member.prop)?;
        self.set_position(member.span);
        let func = self.get_property(&object, &key)?;
        Ok((func, object))
      }
      Expr::SuperProp(super_prop) => {
        let key = self.super_key(&super_prop.prop)?;
        let func = self.get_reference(&Reference::Super(key))?;
        let this = self.this_value()?;
        Ok((func, this))
      }
      Expr::Paren(paren) if matches!(&*paren.expr, Expr::Member(..)) => {
        self.eval_callee(&paren.expr)
      }
      Expr::OptChain(..) => Ok(self.eval_chain(callee)?.unwrap_or_default()),
      other => Ok((self.eval_expr(other)?, Value::Undefined)),
    }
  }

  /// Evaluate an optional chain. `None` when the chain short-circuits,
  /// otherwise the value and the object it was read from.
  fn eval_chain(&mut self, expr: &Expr) -> Result<Option<(Value, Value)>, Throw> {
    match expr {
      Expr::OptChain(chain) => match &*chain.base {
        OptChainBase::Member(member) => {
          let Some((object, _)) = self.eval_chain(&member.obj)? else {
            return Ok(None);
          };
          if chain.optional && object.is_nullish() {
            return Ok(None);
          }
          let key = self.member_key(&member.prop)?;
          self.set_position(member.span);
          let value = self.get_property(&object, &key)?;
          Ok(Some((value, object)))
        }
        OptChainBase::Call(call) => {
          let Some((func, this)) = self.eval_chain(&call.callee)? else {
            return Ok(None);
          };
          if chain.optional && func.is_nullish() {
            return Ok(None);
          }
          let args = self.eval_args(&call.args)?;
          self.set_position(call.span);
          if !func.is_callable() {
            let text = expr_text(&call.callee);
            return Err(self.type_error(format!("{text} is not a function")));
          }
          let value = self.call_function(&func, this, &args)?;
          Ok(Some((value, Value::Undefined)))
        }
      },
      Expr::Member(member) => {
        let Some((object, _)) = self.eval_chain(&member.obj)? else {
          return Ok(None);
        };
        let key = self.member_key(&member.prop)?;
        self.set_position(member.span);
        let value = self.get_property(&object, &key)?;
        Ok(Some((value, object)))
      }
      other => Ok(Some(self.eval_callee(other)?)),
    }
  }

  fn eval_tagged_template(&mut self, tagged: &TaggedTpl) -> Result<Value, Throw> {
    let (tag, this) = self.eval_callee(&tagged.tag)?;

    let cooked: Vec<Value> = tagged
      .tpl
      .quasis
      .iter()
      .map(|quasi| match &quasi.cooked {
        Some(cooked) => Value::from(&**cooked),
        None => Value::Undefined,
      })
      .collect();
    let raw: Vec<Value> = tagged
      .tpl
      .quasis
      .iter()
      .map(|quasi| Value::from(&*quasi.raw))
      .collect();
    let strings = self.alloc_array(cooked);
    let raw = Value::Object(self.alloc_array(raw));
    strings
      .borrow_mut()
      .properties
      .insert("raw".into(), Property::hidden(raw));

    let mut args = vec![Value::Object(strings)];
    for expr in &tagged.tpl.exprs {
      args.push(self.eval_expr(expr)?);
    }
    self.set_position(tagged.span);
    if !tag.is_callable() {
      let text = expr_text(&tagged.tag);
      return Err(self.type_error(format!("{text} is not a function")));
    }
    self.call_function(&tag, this, &args)
  }
}

/// `**` follows IEEE pow except that `1 ** NaN` and `(-1) ** Infinity` are NaN
pub(crate) fn js_pow(base: f64, exponent: f64) -> f64 {
  if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
    return f64::NAN;
  }
  base.powf(exponent)
}

/// Source-like rendering of a callee for error messages
fn expr_text(expr: &Expr) -> String {
  match expr {
    Expr::Ident(ident) => ident.sym.to_string(),
    Expr::This(..) => "this".into(),
    Expr::Member(member) => {
      let object = expr_text(&member.obj);
      match &member.prop {
        MemberProp::Ident(ident) => format!("{object}.{}", ident.sym),
        MemberProp::PrivateName(private) => format!("{object}.#{}", private.name),
        MemberProp::Computed(..) => format!("{object}[...]"),
      }
    }
    Expr::SuperProp(super_prop) => match &super_prop.prop {
      SuperProp::Ident(ident) => format!("(intermediate value).{}", ident.sym),
      SuperProp::Computed(..) => "(intermediate value)".into(),
    },
    Expr::OptChain(chain) => match &*chain.base {
      OptChainBase::Member(member) => {
        let object = expr_text(&member.obj);
        match &member.prop {
          MemberProp::Ident(ident) => format!("{object}?.{}", ident.sym),
          _ => format!("{object}?.[...]"),
        }
      }
      OptChainBase::Call(call) => format!("{}(...)", expr_text(&call.callee)),
    },
    Expr::Call(call) => match &call.callee {
      Callee::Expr(callee) => format!("{}(...)", expr_text(callee)),
      _ => "(intermediate value)".into(),
    },
    Expr::Paren(paren) => expr_text(&paren.expr),
    _ => "(intermediate value)".into(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_js_pow_edge_cases() {
    assert!(js_pow(1.0, f64::NAN).is_nan());
    assert!(js_pow(-1.0, f64::INFINITY).is_nan());
    assert_eq!(js_pow(2.0, 10.0), 1024.0);
    assert_eq!(js_pow(f64::NAN, 0.0), 1.0);
  }
}
