//! Function objects, calls and construction.

use std::rc::Rc;

use swc_core::ecma::ast::Pat;
use swc_core::ecma::utils::stack_size::maybe_grow_default;

use crate::env::new_env;
use crate::error::Throw;
use crate::exec::Completion;
use crate::function::{BoundFunction, Callable, ClassInfo, Closure, CodeKind, FunctionBody};
use crate::object::{ObjRef, ObjectKind, Property};
use crate::sandbox::{Frame, Sandbox};
use crate::value::Value;

impl Sandbox {
  /// Function object for `closure`. Plain functions also get a fresh
  /// `prototype` object when `constructor` is set.
  pub(crate) fn closure_object(&mut self, closure: Closure, constructor: bool) -> ObjRef {
    let name = closure.code.name.clone();
    let arity = closure.code.arity();
    let proto = self.realm.function_prototype.clone();
    let obj = self.alloc(
      ObjectKind::Function(Callable::Closure(Rc::new(closure))),
      Some(proto),
    );
    {
      let mut object = obj.borrow_mut();
      object.properties.insert(
        "length".into(),
        Property {
          enumerable: false,
          configurable: true,
          ..Property::read_only(Value::Number(arity as f64))
        },
      );
      object.properties.insert(
        "name".into(),
        Property {
          enumerable: false,
          configurable: true,
          ..Property::read_only(Value::from(&*name))
        },
      );
    }
    if constructor {
      let prototype = self.alloc_object();
      prototype
        .borrow_mut()
        .properties
        .insert("constructor".into(), Property::hidden(Value::Object(obj.clone())));
      obj.borrow_mut().properties.insert(
        "prototype".into(),
        Property {
          enumerable: false,
          configurable: false,
          ..Property::data(Value::Object(prototype))
        },
      );
    }
    obj
  }

  pub(crate) fn bound_function(&mut self, target: Value, this: Value, args: Vec<Value>) -> Value {
    let name = match &target {
      Value::Object(obj) => match Self::own_property(obj, &"name".into()) {
        Some(property) => match property.value() {
          Some(Value::String(s)) => format!("bound {s}"),
          _ => "bound ".to_string(),
        },
        None => "bound ".to_string(),
      },
      _ => "bound ".to_string(),
    };
    let proto = self.realm.function_prototype.clone();
    let obj = self.alloc(
      ObjectKind::Function(Callable::Bound(Rc::new(BoundFunction { target, this, args }))),
      Some(proto),
    );
    obj.borrow_mut().properties.insert(
      "name".into(),
      Property {
        enumerable: false,
        configurable: true,
        ..Property::read_only(name.into())
      },
    );
    Value::Object(obj)
  }

  /// `func.call(this, ...args)`
  pub(crate) fn call_function(
    &mut self,
    func: &Value,
    this: Value,
    args: &[Value],
  ) -> Result<Value, Throw> {
    let Some(obj) = func.as_object() else {
      return Err(self.not_a_function(func));
    };
    let Some(callable) = obj.callable() else {
      return Err(self.not_a_function(func));
    };
    match callable {
      Callable::Native(native) => (native.call)(self, &this, args),
      Callable::Bound(bound) => {
        let mut all = bound.args.clone();
        all.extend_from_slice(args);
        self.call_function(&bound.target, bound.this.clone(), &all)
      }
      Callable::Closure(closure) => {
        if closure.code.kind == CodeKind::ClassConstructor {
          return Err(self.type_error(format!(
            "Class constructor {} cannot be invoked without 'new'",
            closure.code.name
          )));
        }
        let (result, _) = self.run_closure(obj, &closure, Some(this), args, None)?;
        Ok(result)
      }
    }
  }

  /// `new func(...args)`. `new_target` defaults to `func`.
  pub(crate) fn construct_value(
    &mut self,
    func: &Value,
    args: &[Value],
    new_target: Option<&ObjRef>,
  ) -> Result<Value, Throw> {
    let callable = func.as_object().and_then(|obj| obj.callable());
    let (Some(obj), Some(callable)) = (func.as_object(), callable) else {
      return Err(self.not_a_constructor(func));
    };
    let new_target = new_target.unwrap_or(obj).clone();

    match callable {
      Callable::Native(native) => match &native.construct {
        Some(construct) => construct(self, args, &new_target),
        None => Err(self.not_a_constructor(func)),
      },
      Callable::Bound(bound) => {
        let mut all = bound.args.clone();
        all.extend_from_slice(args);
        let target = if new_target.ptr_eq(obj) {
          match &bound.target {
            Value::Object(target) => target.clone(),
            _ => return Err(self.not_a_constructor(func)),
          }
        } else {
          new_target
        };
        self.construct_value(&bound.target, &all, Some(&target))
      }
      Callable::Closure(closure) => {
        if !closure.code.is_constructor() {
          return Err(self.not_a_constructor(func));
        }
        let derived = closure
          .class
          .as_ref()
          .map(|class| class.derived)
          .unwrap_or(false);

        let this = if derived {
          None
        } else {
          let proto = self.prototype_from_constructor(&new_target)?;
          let instance = Value::Object(self.alloc(ObjectKind::Ordinary, Some(proto)));
          if let Some(class) = &closure.class {
            self.init_fields(&instance, class)?;
          }
          Some(instance)
        };

        let (result, this) =
          self.run_closure(obj, &closure, this, args, Some(Value::Object(new_target)))?;
        if let Value::Object(..) = result {
          return Ok(result);
        }
        match this {
          Some(this) => Ok(this),
          None => Err(self.reference_error(
            "Must call super constructor in derived class before accessing 'this' or returning from derived constructor",
          )),
        }
      }
    }
  }

  /// `prototype` of a constructor, falling back to `Object.prototype`
  pub(crate) fn prototype_from_constructor(&mut self, ctor: &ObjRef) -> Result<ObjRef, Throw> {
    let prototype = self.get_from(ctor, &"prototype".into(), &Value::Object(ctor.clone()))?;
    Ok(match prototype {
      Value::Object(proto) => proto,
      _ => self.realm.object_prototype.clone(),
    })
  }

  /// Run the field initializers of `class` against `instance`
  pub(crate) fn init_fields(&mut self, instance: &Value, class: &ClassInfo) -> Result<(), Throw> {
    let Value::Object(obj) = instance else {
      return Ok(());
    };
    for field in &class.fields {
      let value = match &field.init {
        Some(init) => self.call_function(init, instance.clone(), &[])?,
        None => Value::Undefined,
      };
      self.define_own(obj, field.key.clone(), Property::data(value))?;
    }
    Ok(())
  }

  /// `super(...args)` inside a derived constructor
  pub(crate) fn super_call(&mut self, args: &[Value]) -> Result<Value, Throw> {
    let Some(index) = self.constructor_frame() else {
      return Err(self.syntax_error("'super' keyword unexpected here"));
    };
    let frame = &self.frames[index];
    if frame.this.is_some() {
      return Err(self.reference_error("Super constructor may only be called once"));
    }
    let (Some(func), Some(Value::Object(new_target))) = (frame.func.clone(), frame.new_target.clone())
    else {
      return Err(self.syntax_error("'super' keyword unexpected here"));
    };
    let class = frame.class.clone();

    let parent = match func.prototype() {
      Some(parent) if parent.is_callable() => Value::Object(parent),
      _ => return Err(self.type_error("Super constructor null of anonymous class is not a constructor")),
    };
    let this = self.construct_value(&parent, args, Some(&new_target))?;
    self.frames[index].this = Some(this.clone());
    if let Some(class) = class {
      self.init_fields(&this, &class)?;
    }
    Ok(this)
  }

  /// Closest frame of a class constructor, looking through arrow functions
  fn constructor_frame(&self) -> Option<usize> {
    self
      .frames
      .iter()
      .rposition(|frame| frame.new_target.is_some() && frame.class.is_some())
  }

  /// Run a closure body. Returns the completion value and the final `this`.
  fn run_closure(
    &mut self,
    func: &ObjRef,
    closure: &Rc<Closure>,
    this: Option<Value>,
    args: &[Value],
    new_target: Option<Value>,
  ) -> Result<(Value, Option<Value>), Throw> {
    if self.frames.len() >= self.options.max_call_depth {
      return Err(self.range_error("Maximum call stack size exceeded"));
    }
    let code = closure.code.clone();
    if code.is_async || code.is_generator {
      return Err(self.type_error(format!(
        "{} functions are not supported at build time",
        if code.is_async { "Async" } else { "Generator" }
      )));
    }

    let frame = match &closure.lexical {
      Some(lexical) => Frame {
        name: code.name.clone(),
        filename: code.filename.clone(),
        span: code.span,
        this: lexical.this.clone(),
        home_object: lexical.home_object.clone(),
        new_target: lexical.new_target.clone(),
        func: lexical.func.clone(),
        class: lexical.class.clone(),
      },
      None => Frame {
        name: code.name.clone(),
        filename: code.filename.clone(),
        span: code.span,
        this,
        home_object: closure.home_object.clone(),
        new_target,
        func: Some(func.clone()),
        class: closure.class.clone(),
      },
    };
    self.frames.push(frame);

    let env = new_env(Some(closure.env.clone()), true);
    let result = self.with_env(env, |sandbox| {
      maybe_grow_default(|| sandbox.run_body(closure, args))
    });

    let frame = self.frames.pop();
    let this = frame.and_then(|frame| frame.this);
    Ok((result?, this))
  }

  fn run_body(&mut self, closure: &Closure, args: &[Value]) -> Result<Value, Throw> {
    let code = &closure.code;
    if code.uses_arguments && code.kind != CodeKind::Arrow {
      let proto = self.realm.object_prototype.clone();
      let arguments = self.alloc(ObjectKind::Array(args.to_vec()), Some(proto));
      self.declare("arguments".into(), Some(Value::Object(arguments)), true);
    }
    self.bind_params(&code.params, args)?;

    match &code.body {
      FunctionBody::Block(stmts) => {
        self.hoist_function_body(stmts)?;
        match self.exec_stmts(stmts)? {
          Completion::Return(value) => Ok(value),
          _ => Ok(Value::Undefined),
        }
      }
      FunctionBody::Expr(expr) => self.eval_expr(expr),
      FunctionBody::DefaultConstructor => {
        let derived = closure
          .class
          .as_ref()
          .map(|class| class.derived)
          .unwrap_or(false);
        if derived {
          self.super_call(args)?;
        }
        Ok(Value::Undefined)
      }
    }
  }

  fn bind_params(&mut self, params: &[Pat], args: &[Value]) -> Result<(), Throw> {
    for (index, pat) in params.iter().enumerate() {
      match pat {
        Pat::Rest(rest) => {
          let rest_args = args.get(index..).unwrap_or_default().to_vec();
          let array = Value::Object(self.alloc_array(rest_args));
          self.bind_pattern(&rest.arg, array, crate::exec::BindMode::Let)?;
          break;
        }
        pat => {
          let value = args.get(index).cloned().unwrap_or_default();
          self.bind_pattern(pat, value, crate::exec::BindMode::Let)?;
        }
      }
    }
    Ok(())
  }

  pub(crate) fn not_a_function(&mut self, value: &Value) -> Throw {
    let text = self.describe_value(value);
    self.type_error(format!("{text} is not a function"))
  }

  fn not_a_constructor(&mut self, value: &Value) -> Throw {
    let text = self.describe_value(value);
    self.type_error(format!("{text} is not a constructor"))
  }

  /// Short description of a value for error messages
  pub(crate) fn describe_value(&self, value: &Value) -> String {
    match value {
      Value::String(s) => format!("\"{s}\""),
      Value::Object(obj) => match Self::own_property(obj, &"name".into()) {
        Some(property) if obj.is_callable() => match property.value() {
          Some(Value::String(name)) if !name.is_empty() => name.to_string(),
          _ => "function".to_string(),
        },
        _ if obj.is_array() => "object".to_string(),
        _ => "#<Object>".to_string(),
      },
      Value::Number(n) => crate::value::number_to_string(*n),
      other => format!("{other:?}"),
    }
  }
}
