use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use swc_core::ecma::atoms::Atom;

use crate::error::Throw;
use crate::sandbox::Sandbox;
use crate::value::Value;

pub(crate) type Env = Rc<RefCell<Scope>>;

/// One lexical environment record
pub(crate) struct Scope {
  pub vars: HashMap<Atom, Binding>,
  pub parent: Option<Env>,
  /// Function scopes receive `var` declarations
  pub function: bool,
}

pub(crate) struct Binding {
  /// `None` until a `let`/`const`/`class` declaration is evaluated
  pub value: Option<Value>,
  pub mutable: bool,
}

pub(crate) fn new_env(parent: Option<Env>, function: bool) -> Env {
  Rc::new(RefCell::new(Scope {
    vars: HashMap::new(),
    parent,
    function,
  }))
}

/// Fresh environment holding copies of `names` from `env`, used for the
/// per-iteration bindings of `for (let ...)` loops.
pub(crate) fn copy_env(env: &Env, names: &[Atom]) -> Env {
  let scope = env.borrow();
  let copy = new_env(scope.parent.clone(), false);
  {
    let mut target = copy.borrow_mut();
    for name in names {
      if let Some(binding) = scope.vars.get(name) {
        target.vars.insert(
          name.clone(),
          Binding {
            value: binding.value.clone(),
            mutable: binding.mutable,
          },
        );
      }
    }
  }
  copy
}

enum Found {
  Value(Value),
  Uninitialized,
  Missing,
}

fn find(env: &Env, name: &Atom) -> Found {
  let mut current = Some(env.clone());
  while let Some(env) = current {
    let scope = env.borrow();
    if let Some(binding) = scope.vars.get(name) {
      return match &binding.value {
        Some(value) => Found::Value(value.clone()),
        None => Found::Uninitialized,
      };
    }
    current = scope.parent.clone();
  }
  Found::Missing
}

impl Sandbox {
  /// Value of an identifier. Falls back to the global object.
  pub(crate) fn lookup_binding(&mut self, name: &Atom) -> Result<Value, Throw> {
    match find(&self.env, name) {
      Found::Value(value) => Ok(value),
      Found::Uninitialized => Err(self.reference_error(format!(
        "Cannot access '{name}' before initialization"
      ))),
      Found::Missing => {
        let global = self.global.clone();
        if self.has_property(&global, name) {
          self.get_from(&global, name, &Value::Object(global.clone()))
        } else {
          Err(self.reference_error(format!("{name} is not defined")))
        }
      }
    }
  }

  /// `typeof name` does not throw for undeclared names
  pub(crate) fn lookup_binding_for_typeof(&mut self, name: &Atom) -> Result<Value, Throw> {
    if let Found::Missing = find(&self.env, name) {
      let global = self.global.clone();
      if !self.has_property(&global, name) {
        return Ok(Value::Undefined);
      }
    }
    self.lookup_binding(name)
  }

  pub(crate) fn assign_binding(&mut self, name: &Atom, value: Value) -> Result<(), Throw> {
    enum Outcome {
      Done,
      Constant,
      Uninitialized,
      Missing,
    }

    let outcome = {
      let mut outcome = Outcome::Missing;
      let mut current = Some(self.env.clone());
      while let Some(env) = current {
        let mut scope = env.borrow_mut();
        if let Some(binding) = scope.vars.get_mut(name) {
          outcome = if binding.value.is_none() {
            Outcome::Uninitialized
          } else if !binding.mutable {
            Outcome::Constant
          } else {
            binding.value = Some(value.clone());
            Outcome::Done
          };
          break;
        }
        current = scope.parent.clone();
      }
      outcome
    };

    match outcome {
      Outcome::Done => Ok(()),
      Outcome::Constant => Err(self.type_error("Assignment to constant variable.")),
      Outcome::Uninitialized => Err(self.reference_error(format!(
        "Cannot access '{name}' before initialization"
      ))),
      Outcome::Missing => {
        let global = self.global.clone();
        if self.has_property(&global, name) {
          self.set_property(&Value::Object(global), name.clone(), value)
        } else {
          Err(self.reference_error(format!("{name} is not defined")))
        }
      }
    }
  }

  /// Create or overwrite a binding in the current scope
  pub(crate) fn declare(&mut self, name: Atom, value: Option<Value>, mutable: bool) {
    self
      .env
      .borrow_mut()
      .vars
      .insert(name, Binding { value, mutable });
  }

  /// Initialize a binding created by [`Sandbox::declare`] with no value
  pub(crate) fn initialize(&mut self, name: &Atom, value: Value) {
    let mut scope = self.env.borrow_mut();
    match scope.vars.get_mut(name) {
      Some(binding) => binding.value = Some(value),
      None => {
        scope.vars.insert(
          name.clone(),
          Binding {
            value: Some(value),
            mutable: true,
          },
        );
      }
    }
  }

  /// `var` binding in the closest function scope. Existing bindings keep
  /// their value.
  pub(crate) fn declare_var(&mut self, name: &Atom) {
    let mut current = self.env.clone();
    loop {
      let parent = {
        let scope = current.borrow();
        if scope.function || scope.parent.is_none() {
          None
        } else {
          scope.parent.clone()
        }
      };
      match parent {
        Some(parent) => current = parent,
        None => break,
      }
    }
    current
      .borrow_mut()
      .vars
      .entry(name.clone())
      .or_insert(Binding {
        value: Some(Value::Undefined),
        mutable: true,
      });
  }

  /// Assign a `var` binding, wherever it was hoisted to
  pub(crate) fn set_var(&mut self, name: &Atom, value: Value) -> Result<(), Throw> {
    self.declare_var(name);
    self.assign_binding(name, value)
  }

  /// Run `f` with `env` as the current scope
  pub(crate) fn with_env<R>(&mut self, env: Env, f: impl FnOnce(&mut Self) -> R) -> R {
    let previous = std::mem::replace(&mut self.env, env);
    let result = f(self);
    self.env = previous;
    result
  }
}
