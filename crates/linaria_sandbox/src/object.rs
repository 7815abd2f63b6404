use std::cell::{Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use swc_core::ecma::atoms::Atom;

use crate::function::Callable;
use crate::value::Value;

pub type PropertyKey = Atom;

/// Shared handle to a heap object. Equality is identity.
#[derive(Clone)]
pub struct ObjRef(Rc<RefCell<Object>>);

impl ObjRef {
  pub(crate) fn new(object: Object) -> Self {
    ObjRef(Rc::new(RefCell::new(object)))
  }

  pub(crate) fn borrow(&self) -> Ref<'_, Object> {
    self.0.borrow()
  }

  pub(crate) fn borrow_mut(&self) -> RefMut<'_, Object> {
    self.0.borrow_mut()
  }

  pub(crate) fn downgrade(&self) -> Weak<RefCell<Object>> {
    Rc::downgrade(&self.0)
  }

  pub fn ptr_eq(&self, other: &ObjRef) -> bool {
    Rc::ptr_eq(&self.0, &other.0)
  }

  pub fn id(&self) -> usize {
    Rc::as_ptr(&self.0) as *const () as usize
  }

  pub fn is_callable(&self) -> bool {
    matches!(self.borrow().kind, ObjectKind::Function(..))
  }

  pub fn is_array(&self) -> bool {
    matches!(self.borrow().kind, ObjectKind::Array(..))
  }

  pub fn is_error(&self) -> bool {
    matches!(self.borrow().kind, ObjectKind::Error)
  }

  pub(crate) fn prototype(&self) -> Option<ObjRef> {
    self.borrow().proto.clone()
  }

  pub(crate) fn callable(&self) -> Option<Callable> {
    match &self.borrow().kind {
      ObjectKind::Function(callable) => Some(callable.clone()),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Integrity {
  None,
  Sealed,
  Frozen,
}

pub(crate) struct Object {
  pub kind: ObjectKind,
  pub proto: Option<ObjRef>,
  pub properties: IndexMap<PropertyKey, Property>,
  pub extensible: bool,
  /// Integrity level of indexed elements (arrays and string wrappers)
  pub integrity: Integrity,
}

impl Object {
  pub fn new(kind: ObjectKind, proto: Option<ObjRef>) -> Self {
    Object {
      kind,
      proto,
      properties: IndexMap::new(),
      extensible: true,
      integrity: Integrity::None,
    }
  }
}

pub(crate) enum ObjectKind {
  Ordinary,
  Array(Vec<Value>),
  Function(Callable),
  Error,
  Boolean(bool),
  Number(f64),
  String(Rc<str>),
  RegExp(Box<RegExpData>),
  Map(IndexMap<MapKey, (Value, Value)>),
  Set(IndexMap<MapKey, Value>),
  SearchParams(Vec<(String, String)>),
  Url(Box<url::Url>),
}

pub(crate) struct RegExpData {
  pub source: String,
  pub flags: String,
  pub regex: regex::Regex,
}

impl RegExpData {
  pub fn global(&self) -> bool {
    self.flags.contains('g')
  }

  pub fn sticky(&self) -> bool {
    self.flags.contains('y')
  }
}

/// Hashable identity of a value, following `SameValueZero`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum MapKey {
  Undefined,
  Null,
  Bool(bool),
  Number(u64),
  String(Rc<str>),
  Object(usize),
}

impl MapKey {
  pub fn of(value: &Value) -> MapKey {
    match value {
      Value::Undefined => MapKey::Undefined,
      Value::Null => MapKey::Null,
      Value::Bool(b) => MapKey::Bool(*b),
      Value::Number(n) if n.is_nan() => MapKey::Number(f64::NAN.to_bits()),
      Value::Number(n) if *n == 0.0 => MapKey::Number(0f64.to_bits()),
      Value::Number(n) => MapKey::Number(n.to_bits()),
      Value::String(s) => MapKey::String(s.clone()),
      Value::Object(obj) => MapKey::Object(obj.id()),
    }
  }
}

#[derive(Clone)]
pub(crate) enum Slot {
  Data { value: Value, writable: bool },
  Accessor { get: Option<Value>, set: Option<Value> },
}

#[derive(Clone)]
pub(crate) struct Property {
  pub slot: Slot,
  pub enumerable: bool,
  pub configurable: bool,
}

impl Property {
  /// Plain assignment
  pub fn data(value: Value) -> Self {
    Property {
      slot: Slot::Data {
        value,
        writable: true,
      },
      enumerable: true,
      configurable: true,
    }
  }

  /// Methods and other built-in members
  pub fn hidden(value: Value) -> Self {
    Property {
      slot: Slot::Data {
        value,
        writable: true,
      },
      enumerable: false,
      configurable: true,
    }
  }

  pub fn read_only(value: Value) -> Self {
    Property {
      slot: Slot::Data {
        value,
        writable: false,
      },
      enumerable: true,
      configurable: false,
    }
  }

  pub fn accessor(get: Option<Value>, set: Option<Value>, enumerable: bool) -> Self {
    Property {
      slot: Slot::Accessor { get, set },
      enumerable,
      configurable: true,
    }
  }

  pub fn value(&self) -> Option<&Value> {
    match &self.slot {
      Slot::Data { value, .. } => Some(value),
      Slot::Accessor { .. } => None,
    }
  }

  pub fn writable(&self) -> bool {
    matches!(self.slot, Slot::Data { writable: true, .. })
  }
}

/// Every object allocated by a sandbox, so teardown can break reference
/// cycles between closures, environments and prototypes.
#[derive(Default)]
pub(crate) struct Heap {
  objects: Vec<Weak<RefCell<Object>>>,
  next_sweep: usize,
}

const MIN_SWEEP: usize = 4096;

impl Heap {
  pub fn track(&mut self, obj: &ObjRef) {
    self.objects.push(obj.downgrade());
    if self.objects.len() > self.next_sweep {
      self.objects.retain(|weak| weak.strong_count() > 0);
      self.next_sweep = (self.objects.len() * 2).max(MIN_SWEEP);
    }
  }

  pub fn len(&self) -> usize {
    self.objects.len()
  }

  pub fn teardown(&mut self) {
    let objects = std::mem::take(&mut self.objects);
    for weak in objects {
      let Some(object) = weak.upgrade() else {
        continue;
      };
      // Detach the contents first so their destructors run after the borrow
      let (kind, properties, proto) = match object.try_borrow_mut() {
        Ok(mut object) => (
          std::mem::replace(&mut object.kind, ObjectKind::Ordinary),
          std::mem::take(&mut object.properties),
          object.proto.take(),
        ),
        Err(_) => continue,
      };
      drop((kind, properties, proto));
    }
  }
}
