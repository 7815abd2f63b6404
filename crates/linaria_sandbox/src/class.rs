use std::rc::Rc;

use swc_core::ecma::ast::*;
use swc_core::ecma::atoms::Atom;

use crate::env::new_env;
use crate::error::Throw;
use crate::function::{ClassInfo, Closure, FieldDef, FunctionCode};
use crate::object::{ObjRef, ObjectKind, Property, PropertyKey};
use crate::sandbox::Sandbox;
use crate::value::Value;

const TAG_CONSTRUCTOR: u8 = 5;
const TAG_FIELD: u8 = 6;
const TAG_STATIC_BLOCK: u8 = 7;

enum StaticMember<'a> {
  Field(PropertyKey, Option<&'a Expr>),
  Block(&'a StaticBlock),
}

impl Sandbox {
  /// Evaluate a class definition to its constructor
  pub(crate) fn eval_class(&mut self, class: &Class, name: Atom) -> Result<Value, Throw> {
    self.set_position(class.span);

    let (proto_parent, ctor_parent) = match &class.super_class {
      None => (Some(self.realm.object_prototype.clone()), None),
      Some(super_class) => {
        let parent = self.eval_expr(super_class)?;
        match &parent {
          Value::Null => (None, None),
          Value::Object(ctor) if ctor.is_callable() => {
            let prototype = self.get_property(&parent, &"prototype".into())?;
            match prototype {
              Value::Object(proto) => (Some(proto), Some(ctor.clone())),
              Value::Null => (None, Some(ctor.clone())),
              _ => {
                return Err(self.type_error(
                  "Class extends value does not have valid prototype property",
                ));
              }
            }
          }
          other => {
            let text = self.describe_value(other);
            return Err(self.type_error(format!(
              "Class extends value {text} is not a constructor or null"
            )));
          }
        }
      }
    };

    let env = new_env(Some(self.env.clone()), false);
    self.with_env(env, |sandbox| {
      sandbox.build_class(class, name, proto_parent, ctor_parent)
    })
  }

  fn build_class(
    &mut self,
    class: &Class,
    name: Atom,
    proto_parent: Option<ObjRef>,
    ctor_parent: Option<ObjRef>,
  ) -> Result<Value, Throw> {
    let prototype = self.alloc(ObjectKind::Ordinary, proto_parent);

    let mut fields = Vec::new();
    let mut statics = Vec::new();
    for member in &class.body {
      match member {
        ClassMember::ClassProp(prop) => {
          let key = self.prop_name_key(&prop.key)?;
          if prop.is_static {
            statics.push(StaticMember::Field(key, prop.value.as_deref()));
          } else {
            let init = prop
              .value
              .as_deref()
              .map(|value| self.field_initializer(value, &key, &prototype));
            fields.push(FieldDef { key, init });
          }
        }
        ClassMember::StaticBlock(block) => statics.push(StaticMember::Block(block)),
        ClassMember::PrivateMethod(..) | ClassMember::PrivateProp(..) => {
          return Err(self.syntax_error("Private class members are not supported"));
        }
        ClassMember::AutoAccessor(..) => {
          return Err(self.syntax_error("Class accessors are not supported"));
        }
        _ => {}
      }
    }

    let info = Rc::new(ClassInfo {
      derived: class.super_class.is_some(),
      fields,
    });
    let constructor = class.body.iter().find_map(|member| match member {
      ClassMember::Constructor(constructor) if constructor.body.is_some() => Some(constructor),
      _ => None,
    });
    let code = match constructor {
      Some(constructor) => self.cached_code(
        constructor as *const Constructor as usize,
        TAG_CONSTRUCTOR,
        &name,
        |filename| FunctionCode::from_constructor(constructor, name.clone(), filename),
      ),
      None => self.cached_code(class as *const Class as usize, TAG_CONSTRUCTOR, &name, |filename| {
        FunctionCode::default_constructor(name.clone(), filename, class.span)
      }),
    };
    let ctor = self.closure_object(
      Closure {
        code,
        env: self.env.clone(),
        lexical: None,
        home_object: Some(prototype.clone()),
        class: Some(info),
      },
      false,
    );
    if let Some(parent) = ctor_parent {
      ctor.borrow_mut().proto = Some(parent);
    }
    ctor.borrow_mut().properties.insert(
      "prototype".into(),
      Property {
        enumerable: false,
        ..Property::read_only(Value::Object(prototype.clone()))
      },
    );
    prototype
      .borrow_mut()
      .properties
      .insert("constructor".into(), Property::hidden(Value::Object(ctor.clone())));

    for member in &class.body {
      let ClassMember::Method(method) = member else {
        continue;
      };
      let target = if method.is_static { &ctor } else { &prototype };
      let key = self.prop_name_key(&method.key)?;
      match method.kind {
        MethodKind::Method => {
          let value = self.method_value(&method.function, key.clone(), target);
          self.define_own(target, key, Property::hidden(value))?;
        }
        MethodKind::Getter => {
          let get = self.getter_value(
            &*method.function as *const Function as usize,
            &method.function.body,
            key.clone(),
            method.span,
            target,
          );
          self.merge_accessor(target, key, Some(get), None, false);
        }
        MethodKind::Setter => {
          let Some(param) = method.function.params.first() else {
            return Err(self.syntax_error("Setter must have exactly one formal parameter."));
          };
          let set = self.setter_value(
            &*method.function as *const Function as usize,
            &param.pat,
            &method.function.body,
            key.clone(),
            method.span,
            target,
          );
          self.merge_accessor(target, key, None, Some(set), false);
        }
      }
    }

    let ctor_value = Value::Object(ctor.clone());
    for member in statics {
      match member {
        StaticMember::Field(key, value) => {
          let value = match value {
            Some(value) => {
              let init = self.field_initializer(value, &key, &ctor);
              self.call_function(&init, ctor_value.clone(), &[])?
            }
            None => Value::Undefined,
          };
          self.define_own(&ctor, key, Property::data(value))?;
        }
        StaticMember::Block(block) => {
          let code = self.cached_code(
            block as *const StaticBlock as usize,
            TAG_STATIC_BLOCK,
            &name,
            |filename| {
              let body = Some(block.body.clone());
              FunctionCode::getter(&body, Atom::default(), filename, block.span)
            },
          );
          let closure = Closure {
            code,
            env: self.env.clone(),
            lexical: None,
            home_object: Some(ctor.clone()),
            class: None,
          };
          let func = Value::Object(self.closure_object(closure, false));
          self.call_function(&func, ctor_value.clone(), &[])?;
        }
      }
    }

    Ok(ctor_value)
  }

  fn field_initializer(&mut self, value: &Expr, key: &PropertyKey, home_object: &ObjRef) -> Value {
    let code = self.cached_code(value as *const Expr as usize, TAG_FIELD, key, |filename| {
      FunctionCode::field(value, key.clone(), filename)
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
}
