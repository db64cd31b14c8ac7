#![forbid(unsafe_code)]

//! Field values stored in observable objects.
//!
//! [`Value`] is the tagged variant every field holds. Plain data (`Null`
//! through `List`) is copied on write and compared structurally. Two variants
//! carry identity instead:
//!
//! - [`Value::Object`] holds a nested [`Observable`]; its mutations are
//!   forwarded to the containing object.
//! - [`Value::Opaque`] holds a non-reactive reference. It is never
//!   instrumented, and snapshots pass it through unchanged.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::error::ReactiveError;
use crate::observable::Observable;
use crate::snapshot::Snapshot;

/// A reference stored by identity and never tracked for changes.
///
/// Cloning an `Opaque` clones the handle, not the referenced value.
#[derive(Clone)]
pub struct Opaque(Rc<dyn Any>);

impl Opaque {
    /// Wrap an owned value.
    #[must_use]
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    /// Wrap an existing shared value without copying it.
    #[must_use]
    pub fn from_rc<T: Any>(value: Rc<T>) -> Self {
        Self(value)
    }

    /// Recover the typed shared handle, if the value is a `T`.
    #[must_use]
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.0).downcast::<T>().ok()
    }

    /// Borrow the value as a `T`, if it is one.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether two handles refer to the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Opaque(..)")
    }
}

/// A field value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// A nested observable object.
    Object(Observable),
    /// An immutable snapshot.
    Frozen(Snapshot),
    /// A non-reactive reference.
    Opaque(Opaque),
}

impl Value {
    /// Short name of the variant, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Object(_) => "object",
            Self::Frozen(_) => "snapshot",
            Self::Opaque(_) => "opaque",
        }
    }

    /// Clone with fresh copies of every nested object.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        match self {
            Self::Object(obj) => Self::Object(obj.deep_clone()),
            Self::List(items) => Self::List(items.iter().map(Self::deep_clone).collect()),
            other => other.clone(),
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_object(&self) -> Option<&Observable> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_snapshot(&self) -> Option<&Snapshot> {
        match self {
            Self::Frozen(snap) => Some(snap),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_opaque(&self) -> Option<&Opaque> {
        match self {
            Self::Opaque(o) => Some(o),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Frozen(a), Self::Frozen(b)) => a == b,
            (Self::Opaque(a), Self::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Self::Int(i64::from(n))
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Self::Float(f64::from(x))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<Observable> for Value {
    fn from(obj: Observable) -> Self {
        Self::Object(obj)
    }
}

impl From<Snapshot> for Value {
    fn from(snap: Snapshot) -> Self {
        Self::Frozen(snap)
    }
}

impl From<Opaque> for Value {
    fn from(o: Opaque) -> Self {
        Self::Opaque(o)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl TryFrom<Value> for i64 {
    type Error = ReactiveError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        v.as_i64()
            .ok_or_else(|| ReactiveError::mismatch("int", v.type_name()))
    }
}

impl TryFrom<Value> for f64 {
    type Error = ReactiveError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        v.as_f64()
            .ok_or_else(|| ReactiveError::mismatch("float", v.type_name()))
    }
}

impl TryFrom<Value> for bool {
    type Error = ReactiveError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        v.as_bool()
            .ok_or_else(|| ReactiveError::mismatch("bool", v.type_name()))
    }
}

impl TryFrom<Value> for String {
    type Error = ReactiveError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Str(s) => Ok(s),
            other => Err(ReactiveError::mismatch("string", other.type_name())),
        }
    }
}

impl TryFrom<Value> for Observable {
    type Error = ReactiveError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Object(obj) => Ok(obj),
            other => Err(ReactiveError::mismatch("object", other.type_name())),
        }
    }
}

impl TryFrom<Value> for Snapshot {
    type Error = ReactiveError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Frozen(snap) => Ok(snap),
            other => Err(ReactiveError::mismatch("snapshot", other.type_name())),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null | Self::Opaque(_) => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::Str(s) => serializer.serialize_str(s),
            Self::List(items) => serializer.collect_seq(items),
            Self::Object(obj) => obj.snapshot().serialize(serializer),
            Self::Frozen(snap) => snap.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_round_trip_through_try_from() {
        assert_eq!(i64::try_from(Value::from(7)), Ok(7));
        assert_eq!(String::try_from(Value::from("hi")), Ok("hi".to_owned()));
        assert_eq!(bool::try_from(Value::from(true)), Ok(true));
        assert_eq!(f64::try_from(Value::from(2)), Ok(2.0));
    }

    #[test]
    fn try_from_reports_mismatch() {
        let err = i64::try_from(Value::from("nope")).unwrap_err();
        assert_eq!(err, ReactiveError::mismatch("int", "string"));
    }

    #[test]
    fn option_maps_none_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3)), Value::Int(3));
    }

    #[test]
    fn opaque_compares_by_identity() {
        let a = Opaque::new(vec![1, 2, 3]);
        let b = Opaque::new(vec![1, 2, 3]);
        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a), Value::from(b));
    }

    #[test]
    fn opaque_downcast() {
        let shared = Rc::new(String::from("ctx"));
        let o = Opaque::from_rc(Rc::clone(&shared));
        let back = o.downcast::<String>().expect("downcast to String");
        assert!(Rc::ptr_eq(&shared, &back));
        assert!(o.downcast::<i32>().is_none());
        assert_eq!(o.downcast_ref::<String>().map(String::as_str), Some("ctx"));
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = Observable::new();
        let b = Observable::new();
        assert_eq!(Value::from(a.clone()), Value::from(a));
        assert_ne!(Value::from(b), Value::from(Observable::new()));
    }
}
