//! Type-erased live instances and the values that cross the property
//! boundary.
//!
//! Identity is reference identity: two [`ObjectHandle`]s denote the same
//! instance exactly when they share the same cell, compared by `Arc`
//! pointer. The engine's expression-identity cache and event bindings key
//! on [`ObjectId`] for that reason.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use formloom_codemodel::Value;
use parking_lot::RwLock;

use crate::typeinfo::TypeInfo;

/// The shared cell holding a live instance.
pub type AnyCell = Arc<RwLock<dyn Any + Send + Sync>>;

/// Wrap a concrete value into a shareable instance cell.
pub fn new_cell<T: Any + Send + Sync>(value: T) -> AnyCell {
    Arc::new(RwLock::new(value))
}

/// Stable identity of a live instance within its lifetime, derived from the
/// cell's pointer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({:#x})", self.0)
    }
}

/// A type-erased live instance together with its registered metadata.
///
/// Handles are cheap to clone; cloning never copies the instance. The
/// container owns instances for their whole lifetime — the engine only
/// reads and constructs, it never drops components.
#[derive(Clone)]
pub struct ObjectHandle {
    info: Arc<TypeInfo>,
    cell: AnyCell,
}

impl ObjectHandle {
    /// Wrap a concrete value.
    ///
    /// Debug builds assert the value's type matches the metadata; in
    /// release a mismatch simply makes every typed accessor return `None`.
    pub fn new<T: Any + Send + Sync>(info: Arc<TypeInfo>, value: T) -> Self {
        debug_assert_eq!(TypeInfo::type_id(&info), TypeId::of::<T>());
        Self {
            info,
            cell: new_cell(value),
        }
    }

    /// Wrap an already-allocated cell (used by constructor tables).
    pub fn from_cell(info: Arc<TypeInfo>, cell: AnyCell) -> Self {
        Self { info, cell }
    }

    pub fn id(&self) -> ObjectId {
        ObjectId(Arc::as_ptr(&self.cell) as *const () as usize)
    }

    pub fn info(&self) -> &Arc<TypeInfo> {
        &self.info
    }

    pub fn type_name(&self) -> &str {
        self.info.name()
    }

    pub fn is_component(&self) -> bool {
        self.info.is_component()
    }

    pub fn same_instance(&self, other: &ObjectHandle) -> bool {
        self.id() == other.id()
    }

    /// Borrow the instance immutably for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&(dyn Any + Send + Sync)) -> R) -> R {
        f(&*self.cell.read())
    }

    /// Borrow the instance mutably for the duration of `f`.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut (dyn Any + Send + Sync)) -> R) -> R {
        f(&mut *self.cell.write())
    }

    /// Borrow the instance downcast to `T`, if it is one.
    pub fn downcast_with<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.cell.read();
        (*guard).downcast_ref::<T>().map(f)
    }

    /// Mutably borrow the instance downcast to `T`, if it is one.
    pub fn downcast_with_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.cell.write();
        (*guard).downcast_mut::<T>().map(f)
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHandle({} @ {:?})", self.type_name(), self.id())
    }
}

/// A value crossing the property boundary.
#[derive(Clone)]
pub enum PropertyValue {
    /// No value was produced (failed lookup, missing serializer).
    Missing,
    /// A primitive literal value.
    Primitive(Value),
    /// A live object, compared by identity.
    Object(ObjectHandle),
    /// A flags-enum value: registered type name plus its bit pattern.
    Flags { type_name: String, bits: u64 },
}

impl PropertyValue {
    /// The runtime type name, as matched by overload resolution.
    pub fn type_name(&self) -> &str {
        match self {
            PropertyValue::Missing => "missing",
            PropertyValue::Primitive(v) => v.type_name(),
            PropertyValue::Object(h) => h.type_name(),
            PropertyValue::Flags { type_name, .. } => type_name,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, PropertyValue::Missing)
    }

    pub fn as_primitive(&self) -> Option<&Value> {
        match self {
            PropertyValue::Primitive(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            PropertyValue::Object(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_flag_bits(&self) -> Option<u64> {
        match self {
            PropertyValue::Flags { bits, .. } => Some(*bits),
            PropertyValue::Primitive(v) => v.as_bits(),
            _ => None,
        }
    }

    /// Value equality: primitives by value, objects by identity, flags by
    /// type and bit pattern.
    pub fn value_eq(&self, other: &PropertyValue) -> bool {
        match (self, other) {
            (PropertyValue::Missing, PropertyValue::Missing) => true,
            (PropertyValue::Primitive(a), PropertyValue::Primitive(b)) => a == b,
            (PropertyValue::Object(a), PropertyValue::Object(b)) => a.same_instance(b),
            (
                PropertyValue::Flags {
                    type_name: ta,
                    bits: ba,
                },
                PropertyValue::Flags {
                    type_name: tb,
                    bits: bb,
                },
            ) => ta == tb && ba == bb,
            _ => false,
        }
    }
}

impl From<Value> for PropertyValue {
    fn from(v: Value) -> Self {
        PropertyValue::Primitive(v)
    }
}

impl From<ObjectHandle> for PropertyValue {
    fn from(h: ObjectHandle) -> Self {
        PropertyValue::Object(h)
    }
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Missing => write!(f, "Missing"),
            PropertyValue::Primitive(v) => write!(f, "Primitive({v:?})"),
            PropertyValue::Object(h) => write!(f, "Object({} @ {:?})", h.type_name(), h.id()),
            PropertyValue::Flags { type_name, bits } => {
                write!(f, "Flags({type_name}: {bits:#b})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typeinfo::TypeInfo;

    struct Sample {
        n: i32,
    }

    fn sample_info() -> Arc<TypeInfo> {
        Arc::new(TypeInfo::builder::<Sample>("Sample").build())
    }

    #[test]
    fn identity_follows_the_cell() {
        let info = sample_info();
        let a = ObjectHandle::new(info.clone(), Sample { n: 1 });
        let b = a.clone();
        let c = ObjectHandle::new(info, Sample { n: 1 });
        assert!(a.same_instance(&b));
        assert!(!a.same_instance(&c));
    }

    #[test]
    fn downcast_access() {
        let h = ObjectHandle::new(sample_info(), Sample { n: 7 });
        assert_eq!(h.downcast_with(|s: &Sample| s.n), Some(7));
        h.downcast_with_mut(|s: &mut Sample| s.n = 9);
        assert_eq!(h.downcast_with(|s: &Sample| s.n), Some(9));
        assert!(h.downcast_with(|_: &String| ()).is_none());
    }

    #[test]
    fn value_equality() {
        let a = PropertyValue::Primitive(Value::I64(3));
        let b = PropertyValue::Primitive(Value::I64(3));
        assert!(a.value_eq(&b));

        let f1 = PropertyValue::Flags {
            type_name: "Anchors".into(),
            bits: 3,
        };
        let f2 = PropertyValue::Flags {
            type_name: "Anchors".into(),
            bits: 1,
        };
        assert!(!f1.value_eq(&f2));
    }
}
