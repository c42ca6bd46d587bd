//! Dynamic Values
//!
//! `Value` is the element type of reactive containers. It is a closed sum
//! type, so "is this a ref", "is this reactive" and "is this a container"
//! are pattern matches rather than probes.
//!
//! # Containers
//!
//! An [`Object`] is a raw, shared container: either map-like (string keys,
//! insertion-ordered) or list-like (dense indices plus a `length`
//! meta-property). Raw containers never track or trigger on their own; wrap
//! them with [`Reactive`] for that.
//!
//! # Equality
//!
//! `PartialEq` for `Value` is the change predicate used by every write:
//!
//! - Numbers compare by value, except that `NaN` equals `NaN` and `0.0`
//!   differs from `-0.0`. An `Int` and a `Float` are equal only when the
//!   float holds exactly that integer.
//! - Strings compare by content.
//! - Containers, cells and reactive handles compare by identity.

use std::cell::{Ref as Borrowed, RefCell};
use std::collections::{HashSet, TryReserveError};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as Json};

use super::computed::Computed;
use super::context::untracked;
use super::dep;
use super::reactive::Reactive;
use super::ref_cell::Ref;
use crate::error::{ReactiveError, Result};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a raw container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Property key of a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropKey {
    Index(usize),
    Name(Rc<str>),
}

const LENGTH: &str = "length";

/// Upper bound on a list's length, `2^32 - 1`. Indices run below it.
pub const MAX_LIST_LENGTH: usize = u32::MAX as usize;

impl PropKey {
    /// The `length` meta-property of list containers.
    pub fn length() -> Self {
        PropKey::Name(Rc::from(LENGTH))
    }

    pub fn is_length(&self) -> bool {
        matches!(self, PropKey::Name(name) if &**name == LENGTH)
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            PropKey::Index(index) => Some(*index),
            PropKey::Name(_) => None,
        }
    }

    fn parse_index(name: &str) -> Option<usize> {
        // Canonical decimal only: "01" and "+1" stay names.
        let canonical = name == "0" || (!name.starts_with('0') && !name.is_empty());
        if canonical && name.bytes().all(|b| b.is_ascii_digit()) {
            name.parse().ok().filter(|index| *index < MAX_LIST_LENGTH)
        } else {
            None
        }
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Index(index) => write!(f, "{index}"),
            PropKey::Name(name) => f.write_str(name),
        }
    }
}

impl From<usize> for PropKey {
    fn from(index: usize) -> Self {
        PropKey::Index(index)
    }
}

// Negative integers are ordinary names, as in `obj[-1]`.
impl From<i32> for PropKey {
    fn from(index: i32) -> Self {
        match usize::try_from(index) {
            Ok(index) => PropKey::Index(index),
            Err(_) => PropKey::Name(Rc::from(index.to_string())),
        }
    }
}

impl From<&str> for PropKey {
    fn from(name: &str) -> Self {
        PropKey::Name(Rc::from(name))
    }
}

impl From<String> for PropKey {
    fn from(name: String) -> Self {
        PropKey::Name(Rc::from(name))
    }
}

impl From<Rc<str>> for PropKey {
    fn from(name: Rc<str>) -> Self {
        PropKey::Name(name)
    }
}

impl From<&PropKey> for PropKey {
    fn from(key: &PropKey) -> Self {
        key.clone()
    }
}

enum Container {
    Map(IndexMap<Rc<str>, Value>),
    List(Vec<Value>),
}

struct ObjectInner {
    id: ObjectId,
    data: RefCell<Container>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        dep::forget_target(self.id);
    }
}

/// A raw shared container. Clones share storage.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Object {
    fn with_container(container: Container) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: ObjectId::next(),
                data: RefCell::new(container),
            }),
        }
    }

    /// Create an empty map-like container.
    pub fn map() -> Self {
        Self::with_container(Container::Map(IndexMap::new()))
    }

    /// Create an empty list-like container.
    pub fn list() -> Self {
        Self::with_container(Container::List(Vec::new()))
    }

    pub fn from_entries<K, V, I>(entries: I) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::with_container(Container::Map(map))
    }

    pub fn from_values<V, I>(values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let list = values.into_iter().map(Into::into).collect();
        Self::with_container(Container::List(list))
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub fn is_list(&self) -> bool {
        matches!(*self.data(), Container::List(_))
    }

    /// Number of entries (maps) or elements (lists).
    pub fn len(&self) -> usize {
        match &*self.data() {
            Container::Map(map) => map.len(),
            Container::List(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn data(&self) -> Borrowed<'_, Container> {
        self.inner.data.borrow()
    }

    /// Bring a key into the canonical form for this container.
    ///
    /// On lists, decimal names become indices; on maps, indices become
    /// names.
    pub fn normalize(&self, key: PropKey) -> PropKey {
        match (&*self.data(), key) {
            (Container::List(_), PropKey::Name(name)) => match PropKey::parse_index(&name) {
                Some(index) => PropKey::Index(index),
                None => PropKey::Name(name),
            },
            (Container::Map(_), PropKey::Index(index)) => PropKey::Name(Rc::from(index.to_string())),
            (_, key) => key,
        }
    }

    /// Read a property without tracking. `key` must be normalized.
    pub fn get_raw(&self, key: &PropKey) -> Option<Value> {
        match (&*self.data(), key) {
            (Container::Map(map), PropKey::Name(name)) => map.get(name).cloned(),
            (Container::List(list), PropKey::Index(index)) => list.get(*index).cloned(),
            (Container::List(list), key) if key.is_length() => Some(Value::from(list.len())),
            _ => None,
        }
    }

    /// Write a property without triggering. `key` must be normalized.
    ///
    /// Writing past the end of a list pads it with `Null`. Writing `length`
    /// truncates or pads. Neither may grow a list past [`MAX_LIST_LENGTH`].
    pub fn put_raw(&self, key: &PropKey, value: Value) -> Result<()> {
        let mut data = self.inner.data.borrow_mut();
        let displaced: Vec<Value> = match (&mut *data, key) {
            (Container::Map(map), PropKey::Name(name)) => {
                map.insert(name.clone(), value).into_iter().collect()
            }
            (Container::List(list), PropKey::Index(index)) => {
                let invalid = || ReactiveError::InvalidKey { key: key.to_string() };
                let length = index
                    .checked_add(1)
                    .filter(|length| *length <= MAX_LIST_LENGTH)
                    .ok_or_else(invalid)?;
                if length > list.len() {
                    pad_list(list, length).map_err(|_| invalid())?;
                }
                vec![std::mem::replace(&mut list[*index], value)]
            }
            (Container::List(list), key) if key.is_length() => {
                let invalid = || ReactiveError::InvalidLength {
                    value: value.to_string(),
                };
                let length = value.as_length().ok_or_else(invalid)?;
                if length > list.len() {
                    pad_list(list, length).map_err(|_| invalid())?;
                    Vec::new()
                } else {
                    list.split_off(length)
                }
            }
            (_, key) => return Err(ReactiveError::InvalidKey { key: key.to_string() }),
        };
        // Displaced values may own containers; release them after the borrow.
        drop(data);
        drop(displaced);
        Ok(())
    }

    /// Remove a map entry without triggering, keeping the order of the
    /// others. Lists have no removable keys.
    pub fn remove_raw(&self, key: &PropKey) -> Option<Value> {
        let removed = match (&mut *self.inner.data.borrow_mut(), key) {
            (Container::Map(map), PropKey::Name(name)) => map.shift_remove(name),
            _ => None,
        };
        removed
    }

    /// Keys in iteration order. Lists yield their indices.
    pub fn keys(&self) -> Vec<PropKey> {
        match &*self.data() {
            Container::Map(map) => map.keys().cloned().map(PropKey::Name).collect(),
            Container::List(list) => (0..list.len()).map(PropKey::Index).collect(),
        }
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

fn pad_list(list: &mut Vec<Value>, length: usize) -> std::result::Result<(), TryReserveError> {
    list.try_reserve(length.saturating_sub(list.len()))?;
    list.resize(length, Value::Null);
    Ok(())
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Object");
        out.field("id", &self.inner.id);
        match self.inner.data.try_borrow() {
            Ok(data) => match &*data {
                Container::Map(map) => out.field("map", &map.len()),
                Container::List(list) => out.field("list", &list.len()),
            },
            Err(_) => out.field("data", &"<borrowed>"),
        };
        out.finish()
    }
}

/// A dynamically typed value stored in reactive containers.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    /// A raw container.
    Object(Object),
    /// A single-value cell; reads through a reactive container unwrap it.
    Ref(Ref<Value>),
    Computed(Computed<Value>),
    /// A reactive handle over a container.
    Reactive(Reactive),
}

fn same_float(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
}

// 2^63; `i64::MAX as f64` rounds up to it.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn int_equals_float(a: i64, b: f64) -> bool {
    let integral = b.fract() == 0.0 && b >= -I64_BOUND && b < I64_BOUND;
    integral && !(b == 0.0 && b.is_sign_negative()) && b as i64 == a
}

impl Value {
    /// The change predicate. See the module docs.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => same_float(*a, *b),
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                int_equals_float(*a, *b)
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            (Value::Computed(a), Value::Computed(b)) => a.ptr_eq(b),
            (Value::Reactive(a), Value::Reactive(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// A list-of-values container.
    pub fn list<V, I>(values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::Object(Object::from_values(values))
    }

    /// A map container.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Object(Object::from_entries(entries))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Ref(_) => "ref",
            Value::Computed(_) => "computed",
            Value::Reactive(_) => "reactive",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Value::Reactive(handle) => Some(handle),
            _ => None,
        }
    }

    /// A valid list length: an integer in `0..=MAX_LIST_LENGTH`.
    fn as_length(&self) -> Option<usize> {
        match self {
            Value::Int(i) => usize::try_from(*i)
                .ok()
                .filter(|length| *length <= MAX_LIST_LENGTH),
            Value::Float(f) if f.fract() == 0.0 && *f >= 0.0 && *f <= MAX_LIST_LENGTH as f64 => {
                Some(*f as usize)
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // JSON
    // ------------------------------------------------------------------

    /// Build raw containers from JSON.
    pub fn from_json(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::Str(Rc::from(s)),
            Json::Array(items) => Value::list(items.into_iter().map(Value::from_json)),
            Json::Object(entries) => Value::map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Value::from_json(value))),
            ),
        }
    }

    /// Parse JSON text into raw containers.
    pub fn parse_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map(Value::from_json)
            .map_err(|err| ReactiveError::Unsupported(err.to_string()))
    }

    /// Snapshot as JSON without tracking.
    ///
    /// Cells are read through; non-finite floats become `null`. A container
    /// that contains itself fails with `CyclicValue`.
    pub fn to_json(&self) -> Result<Json> {
        untracked(|| self.to_json_inner(&mut HashSet::new()))
    }

    fn to_json_inner(&self, path: &mut HashSet<ObjectId>) -> Result<Json> {
        Ok(match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::Number((*i).into()),
            Value::Float(f) => JsonNumber::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::Str(s) => Json::String(s.to_string()),
            Value::Ref(cell) => cell.get_untracked().to_json_inner(path)?,
            Value::Computed(computed) => computed.try_get()?.to_json_inner(path)?,
            Value::Reactive(handle) => return object_to_json(&handle.to_raw(), path),
            Value::Object(object) => return object_to_json(object, path),
        })
    }
}

fn object_to_json(object: &Object, path: &mut HashSet<ObjectId>) -> Result<Json> {
    if !path.insert(object.id()) {
        return Err(ReactiveError::CyclicValue);
    }

    let keys = object.keys();
    let json = if object.is_list() {
        let mut items = Vec::with_capacity(keys.len());
        for key in &keys {
            let value = object.get_raw(key).unwrap_or_default();
            items.push(value.to_json_inner(path)?);
        }
        Json::Array(items)
    } else {
        let mut entries = JsonMap::new();
        for key in keys {
            let value = object.get_raw(&key).unwrap_or_default();
            entries.insert(key.to_string(), value.to_json_inner(path)?);
        }
        Json::Object(entries)
    };

    path.remove(&object.id());
    Ok(json)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(object) => write!(f, "<object #{}>", object.id().as_u64()),
            Value::Ref(_) => f.write_str("<ref>"),
            Value::Computed(_) => f.write_str("<computed>"),
            Value::Reactive(handle) => write!(f, "<reactive #{}>", handle.id().as_u64()),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i.into())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        i64::try_from(n).map_or(Value::Float(n as f64), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<Ref<Value>> for Value {
    fn from(cell: Ref<Value>) -> Self {
        Value::Ref(cell)
    }
}

impl From<Computed<Value>> for Value {
    fn from(computed: Computed<Value>) -> Self {
        Value::Computed(computed)
    }
}

impl From<Reactive> for Value {
    fn from(handle: Reactive) -> Self {
        Value::Reactive(handle)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_value_follows_identity_semantics() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(0), Value::Float(-0.0));
        assert_ne!(Value::Int(2), Value::Float(2.5));
        assert_ne!(Value::Int(0), Value::Float(f64::NAN));
        assert_eq!(Value::from("a"), Value::from(String::from("a")));
        assert_ne!(Value::Null, Value::Bool(false));

        let a = Object::map();
        let b = Object::map();
        assert_eq!(Value::Object(a.clone()), Value::Object(a));
        assert_ne!(Value::Object(b), Value::Object(Object::map()));
    }

    #[test]
    fn int_and_float_compare_exactly() {
        // 2^53 + 1 has no f64 representation and rounds to 2^53
        let big = 9_007_199_254_740_992_i64;
        assert_eq!(Value::Int(big), Value::Float(big as f64));
        assert_ne!(Value::Int(big + 1), Value::Float(big as f64));
        assert_ne!(Value::Float(big as f64), Value::Int(big + 1));

        assert_eq!(Value::Int(i64::MIN), Value::Float(i64::MIN as f64));
        assert_ne!(Value::Int(i64::MAX), Value::Float(i64::MAX as f64));
        assert_ne!(Value::Int(i64::MAX), Value::Float(f64::INFINITY));
    }

    #[test]
    fn list_keys_normalize() {
        let list = Object::list();
        assert_eq!(list.normalize("3".into()), PropKey::Index(3));
        assert_eq!(list.normalize("0".into()), PropKey::Index(0));
        assert_eq!(list.normalize("03".into()), PropKey::from("03"));
        assert!(list.normalize("length".into()).is_length());

        let map = Object::map();
        assert_eq!(map.normalize(PropKey::Index(7)), PropKey::from("7"));
    }

    #[test]
    fn list_bounds_are_enforced() {
        let list = Object::list();
        assert_eq!(list.normalize("4294967294".into()), PropKey::Index(MAX_LIST_LENGTH - 1));
        assert_eq!(list.normalize("4294967295".into()), PropKey::from("4294967295"));
        assert_eq!(list.normalize("99999999999".into()), PropKey::from("99999999999"));

        assert_eq!(
            list.put_raw(&PropKey::Index(usize::MAX), Value::Int(1)),
            Err(ReactiveError::InvalidKey { key: usize::MAX.to_string() })
        );
        assert_eq!(
            list.put_raw(&PropKey::Index(MAX_LIST_LENGTH), Value::Int(1)),
            Err(ReactiveError::InvalidKey { key: MAX_LIST_LENGTH.to_string() })
        );
        assert_eq!(
            list.put_raw(&PropKey::length(), Value::Int(i64::MAX)),
            Err(ReactiveError::InvalidLength { value: i64::MAX.to_string() })
        );
        assert!(matches!(
            list.put_raw(&PropKey::length(), Value::Float(MAX_LIST_LENGTH as f64 + 1.0)),
            Err(ReactiveError::InvalidLength { .. })
        ));
        assert!(list.is_empty());
    }

    #[test]
    fn list_writes_pad_and_truncate() {
        let list = Object::from_values([1, 2]);
        list.put_raw(&PropKey::Index(4), Value::Int(5)).unwrap();
        assert_eq!(list.len(), 5);
        assert_eq!(list.get_raw(&PropKey::Index(3)), Some(Value::Null));

        list.put_raw(&PropKey::length(), Value::Int(1)).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.get_raw(&PropKey::length()), Some(Value::Int(1)));
    }

    #[test]
    fn map_removal_keeps_order() {
        let map = Object::from_entries([("a", 1), ("b", 2), ("c", 3)]);
        assert_eq!(map.remove_raw(&PropKey::from("b")), Some(Value::Int(2)));
        assert_eq!(map.remove_raw(&PropKey::from("b")), None);
        assert_eq!(map.keys(), vec![PropKey::from("a"), PropKey::from("c")]);

        let list = Object::from_values([1]);
        assert_eq!(list.remove_raw(&PropKey::Index(0)), None);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn invalid_writes_are_rejected() {
        let list = Object::list();
        assert_eq!(
            list.put_raw(&PropKey::length(), Value::Int(-1)),
            Err(ReactiveError::InvalidLength { value: "-1".into() })
        );
        assert_eq!(
            list.put_raw(&PropKey::from("name"), Value::Null),
            Err(ReactiveError::InvalidKey { key: "name".into() })
        );
    }

    #[test]
    fn map_preserves_insertion_order() {
        let map = Object::from_entries([("b", 1), ("a", 2)]);
        map.put_raw(&PropKey::from("c"), Value::Int(3)).unwrap();
        assert_eq!(
            map.keys(),
            vec![PropKey::from("b"), PropKey::from("a"), PropKey::from("c")]
        );
    }

    #[test]
    fn json_round_trip_keeps_structure() {
        let source = json!({"name": "tendril", "tags": ["a", "b"], "size": 1.5, "count": 3});
        let value = Value::from_json(source.clone());
        assert_eq!(value.to_json().unwrap(), source);
    }

    #[test]
    fn json_reads_through_cells() {
        let cell = Ref::new(Value::from(41));
        let value = Value::map([("answer", Value::Ref(cell.clone()))]);
        cell.set(Value::from(42));

        assert_eq!(value.to_json().unwrap(), json!({"answer": 42}));
        assert_eq!(Value::Float(f64::INFINITY).to_json().unwrap(), Json::Null);
    }

    #[test]
    fn cyclic_value_fails_to_serialize() {
        let outer = Object::list();
        outer
            .put_raw(&PropKey::Index(0), Value::Object(outer.clone()))
            .unwrap();

        assert_eq!(
            Value::Object(outer.clone()).to_json(),
            Err(ReactiveError::CyclicValue)
        );

        // Break the cycle
        outer.put_raw(&PropKey::length(), Value::Int(0)).unwrap();
    }

    #[test]
    fn shared_subtree_is_not_a_cycle() {
        let leaf = Object::from_values([1]);
        let value = Value::list([Value::Object(leaf.clone()), Value::Object(leaf)]);
        assert_eq!(value.to_json().unwrap(), json!([[1], [1]]));
    }

    #[test]
    fn parse_json_reports_errors() {
        assert!(matches!(
            Value::parse_json("{not json"),
            Err(ReactiveError::Unsupported(_))
        ));
        assert_eq!(Value::parse_json("[1]").unwrap().as_object().map(Object::len), Some(1));
    }
}
