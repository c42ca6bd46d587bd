//! Reactive Containers
//!
//! A [`Reactive`] handle wraps a raw [`Object`] so that property reads are
//! tracked and property writes notify.
//!
//! # How Reads Work
//!
//! 1. The property is tracked for the active subscriber.
//! 2. A stored `Ref` or `Computed` is read through, so callers see the
//!    inner value.
//! 3. A stored container comes back wrapped in its own reactive handle.
//!    Nested containers are wrapped on the way out, not up front.
//!
//! # How Writes Work
//!
//! 1. If the old value is a `Ref` and the new one is not, the ref's inner
//!    value is written instead. References held elsewhere to that ref stay
//!    valid and observe the write.
//! 2. Otherwise the raw container is written. Readers of the property are
//!    notified only if the new value differs from the old one.
//! 3. A list write that changes the length (appending past the end)
//!    also notifies readers of `length`. A map write that adds a key, and
//!    every map removal, notifies readers of the key set.
//!
//! Wrapping the same container twice yields the same handle.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use super::context::untracked;
use super::dep;
use super::runtime::Runtime;
use super::value::{Object, ObjectId, PropKey, Value};
use crate::error::{ReactiveError, Result};

thread_local! {
    static HANDLES: RefCell<HashMap<ObjectId, Weak<ReactiveInner>>> = RefCell::new(HashMap::new());
}

struct ReactiveInner {
    target: Object,
}

impl Drop for ReactiveInner {
    fn drop(&mut self) {
        let id = self.target.id();
        let _ = HANDLES.try_with(|handles| {
            if let Ok(mut handles) = handles.try_borrow_mut() {
                // A newer handle may already have replaced ours.
                if handles.get(&id).is_some_and(|weak| weak.strong_count() == 0) {
                    handles.remove(&id);
                }
            }
        });
    }
}

/// A tracked view of a raw container.
///
/// # Example
///
/// ```rust
/// use tendril_core::reactive::{Reactive, Value};
///
/// let state = Reactive::map([("count", 0)]);
/// state.set("count", 1);
/// assert_eq!(state.get("count"), Value::Int(1));
/// ```
#[derive(Clone)]
pub struct Reactive {
    inner: Rc<ReactiveInner>,
}

impl Reactive {
    /// Wrap `target`, reusing the existing handle if there is one.
    pub fn new(target: Object) -> Self {
        let id = target.id();
        if let Some(inner) = HANDLES.with(|handles| handles.borrow().get(&id).and_then(Weak::upgrade)) {
            return Self { inner };
        }

        let inner = Rc::new(ReactiveInner { target });
        HANDLES.with(|handles| {
            handles.borrow_mut().insert(id, Rc::downgrade(&inner));
        });
        Self { inner }
    }

    /// A new reactive map.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::new(Object::from_entries(entries))
    }

    /// A new reactive list.
    pub fn list<V, I>(values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Self::new(Object::from_values(values))
    }

    fn target(&self) -> &Object {
        &self.inner.target
    }

    pub fn id(&self) -> ObjectId {
        self.target().id()
    }

    pub fn is_list(&self) -> bool {
        self.target().is_list()
    }

    /// Read a property, tracking it.
    ///
    /// Missing properties read as `Null`.
    pub fn get(&self, key: impl Into<PropKey>) -> Value {
        let target = self.target();
        let key = target.normalize(key.into());

        dep::track(target, &key);
        let raw = target.get_raw(&key).unwrap_or_default();
        unwrap_read(raw)
    }

    /// Write a property. Invalid writes are logged and dropped.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) {
        let key = key.into();
        if let Err(err) = self.try_set(key.clone(), value) {
            warn!(object = self.id().as_u64(), %key, "{err}; write ignored");
        }
    }

    /// Write a property.
    ///
    /// Fails with `InvalidKey` for a non-index name on a list and with
    /// `InvalidLength` for a bad `length`.
    pub fn try_set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> Result<()> {
        let target = self.target();
        let key = target.normalize(key.into());
        let value = match value.into() {
            // Containers store raw objects, never handles.
            Value::Reactive(handle) => Value::Object(handle.to_raw()),
            value => value,
        };

        let old = target.get_raw(&key);
        if let (Some(Value::Ref(cell)), false) = (&old, matches!(value, Value::Ref(_))) {
            cell.set(value);
            return Ok(());
        }

        let old_len = target.len();
        let added = old.is_none();
        let changed = old.as_ref().map_or(true, |old| !old.same_value(&value));
        target.put_raw(&key, value)?;
        drop(old);

        Runtime::batch(|| {
            if changed {
                dep::trigger(target, &key);
            }
            if target.is_list() {
                if !key.is_length() && target.len() != old_len {
                    dep::trigger(target, &PropKey::length());
                }
            } else if added {
                dep::trigger_keys(target);
            }
        });
        Ok(())
    }

    /// Remove a map entry, returning its value.
    ///
    /// Lists shrink through [`pop`](Self::pop) and
    /// [`set_len`](Self::set_len) instead.
    pub fn remove(&self, key: impl Into<PropKey>) -> Result<Option<Value>> {
        let target = self.target();
        if target.is_list() {
            return Err(ReactiveError::Unsupported("`remove` on a list".to_string()));
        }
        let key = target.normalize(key.into());

        let Some(removed) = target.remove_raw(&key) else {
            return Ok(None);
        };
        Runtime::batch(|| {
            dep::trigger(target, &key);
            dep::trigger_keys(target);
        });
        Ok(Some(removed))
    }

    /// Number of elements or entries.
    ///
    /// Tracks `length` on lists and the key set on maps.
    pub fn len(&self) -> usize {
        self.track_shape();
        self.target().len()
    }

    fn track_shape(&self) {
        let target = self.target();
        if target.is_list() {
            dep::track(target, &PropKey::length());
        } else {
            dep::track_keys(target);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append to a list.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        self.require_list("push")?;
        let end = self.target().len();
        self.try_set(end, value)
    }

    /// Remove and return the last element of a list.
    pub fn pop(&self) -> Result<Option<Value>> {
        self.require_list("pop")?;
        let target = self.target();
        let Some(last) = target.len().checked_sub(1) else {
            return Ok(None);
        };

        let value = target.get_raw(&PropKey::Index(last)).unwrap_or_default();
        self.set_len(last)?;
        Ok(Some(untracked(|| unwrap_read(value))))
    }

    /// Truncate or pad a list.
    pub fn set_len(&self, length: usize) -> Result<()> {
        self.require_list("set_len")?;
        self.try_set(PropKey::length(), length)
    }

    fn require_list(&self, operation: &str) -> Result<()> {
        if self.is_list() {
            Ok(())
        } else {
            Err(ReactiveError::Unsupported(format!("`{operation}` on a map")))
        }
    }

    /// Keys in iteration order.
    ///
    /// Tracks `length` on lists and the key set on maps.
    pub fn keys(&self) -> Vec<PropKey> {
        self.track_shape();
        self.target().keys()
    }

    /// The wrapped container.
    pub fn to_raw(&self) -> Object {
        self.target().clone()
    }

    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Reactive {}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reactive").field(self.target()).finish()
    }
}

fn unwrap_read(raw: Value) -> Value {
    let value = match raw {
        Value::Ref(cell) => cell.get(),
        Value::Computed(computed) => computed.try_get().unwrap_or_default(),
        other => other,
    };
    match value {
        Value::Object(object) => Value::Reactive(Reactive::new(object)),
        other => other,
    }
}

/// Wrap a container value in a reactive handle.
///
/// Anything that is not a raw container comes back unchanged.
pub fn reactive(value: Value) -> Value {
    match value {
        Value::Object(object) => Value::Reactive(Reactive::new(object)),
        other => other,
    }
}

pub fn is_reactive(value: &Value) -> bool {
    matches!(value, Value::Reactive(_))
}

pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}

/// The raw container behind a reactive handle; anything else unchanged.
pub fn to_raw(value: Value) -> Value {
    match value {
        Value::Reactive(handle) => Value::Object(handle.to_raw()),
        other => other,
    }
}

/// Read through a `Ref` or `Computed`; anything else unchanged.
///
/// A computed with no value yet, read from inside its own getter, reads as
/// `Null`.
pub fn unref(value: Value) -> Value {
    match value {
        Value::Ref(cell) => cell.get(),
        Value::Computed(computed) => computed.try_get().unwrap_or_default(),
        other => other,
    }
}
