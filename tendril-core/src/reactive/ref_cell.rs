//! Ref Implementation
//!
//! A `Ref` is the single-value reactive cell. It holds a value and a
//! dependency node.
//!
//! # How Refs Work
//!
//! 1. Reading a ref while a subscriber is active links the ref's dependency
//!    node to that subscriber.
//!
//! 2. Writing a ref compares the new value against the old one. Only a real
//!    change bumps the dependency version and notifies subscribers; writing
//!    an equal value is silent.
//!
//! # Memory Layout
//!
//! Each ref consists of:
//! - A dependency id (8 bytes)
//! - The value, behind `Rc<RefCell<_>>` so clones share it

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::runtime::Runtime;
use crate::graph::DepId;

struct RefInner<T> {
    dep: DepId,
    value: RefCell<T>,
}

impl<T> Drop for RefInner<T> {
    fn drop(&mut self) {
        Runtime::dispose_dep(self.dep);
    }
}

/// A reactive cell holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The stored value. `PartialEq` is the change predicate: a write
///   that compares equal to the current value notifies nobody.
///
/// # Example
///
/// ```rust
/// use tendril_core::reactive::Ref;
///
/// let count = Ref::new(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Ref<T>
where
    T: Clone + PartialEq + 'static,
{
    inner: Rc<RefInner<T>>,
}

impl<T> Ref<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new ref with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefInner {
                dep: Runtime::create_dep(),
                value: RefCell::new(value),
            }),
        }
    }

    /// The ref's dependency node.
    pub fn dep_id(&self) -> DepId {
        self.inner.dep
    }

    /// Get the current value, tracking the read.
    pub fn get(&self) -> T {
        Runtime::track(self.inner.dep);
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track(self.inner.dep);
        f(&self.inner.value.borrow())
    }

    /// Set a new value. Returns whether it differed from the old one.
    ///
    /// Subscribers are notified only if it did.
    pub fn set(&self, value: T) -> bool {
        let previous = {
            let mut slot = self.inner.value.borrow_mut();
            if *slot == value {
                return false;
            }
            std::mem::replace(&mut *slot, value)
        };
        // The old value may own containers; drop it outside the borrow.
        drop(previous);

        Runtime::trigger(self.inner.dep);
        true
    }

    /// Update the value using a function of the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = f(&self.inner.value.borrow());
        self.set(next)
    }

    /// Notify subscribers even though the value did not change.
    pub fn trigger(&self) {
        Runtime::trigger(self.inner.dep);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscribers_of(self.inner.dep).len()
    }

    /// Whether two handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Ref<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Ref<T>
where
    T: Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Ref<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ref")
            .field("dep", &self.inner.dep)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::cell::Cell;

    #[test]
    fn ref_get_and_set() {
        let cell = Ref::new(0);
        assert_eq!(cell.get(), 0);

        assert!(cell.set(42));
        assert_eq!(cell.get(), 42);
    }

    #[test]
    fn ref_update() {
        let cell = Ref::new(10);
        cell.update(|v| v + 5);
        assert_eq!(cell.get(), 15);
    }

    #[test]
    fn ref_clone_shares_state() {
        let cell1 = Ref::new(0);
        let cell2 = cell1.clone();

        cell1.set(42);
        assert_eq!(cell2.get(), 42);
        assert!(cell1.ptr_eq(&cell2));
        assert_eq!(cell1.dep_id(), cell2.dep_id());
    }

    #[test]
    fn equal_write_does_not_notify() {
        let cell = Ref::new(String::from("a"));
        let runs = Rc::new(Cell::new(0));

        let _effect = {
            let cell = cell.clone();
            let runs = runs.clone();
            Effect::new(move || {
                cell.get();
                runs.set(runs.get() + 1);
            })
        };
        assert_eq!(runs.get(), 1);

        assert!(!cell.set(String::from("a")));
        assert_eq!(runs.get(), 1);

        assert!(cell.set(String::from("b")));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn forced_trigger_notifies() {
        let cell = Ref::new(1);
        let runs = Rc::new(Cell::new(0));

        let _effect = {
            let cell = cell.clone();
            let runs = runs.clone();
            Effect::new(move || {
                cell.get();
                runs.set(runs.get() + 1);
            })
        };

        cell.trigger();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn untracked_read_does_not_subscribe() {
        let cell = Ref::new(1);

        let _effect = {
            let cell = cell.clone();
            Effect::new(move || {
                cell.get_untracked();
            })
        };

        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn dropping_ref_releases_dependency() {
        let cell = Ref::new(1);
        let dep = cell.dep_id();
        assert!(Runtime::with_graph(|graph| graph.contains_dep(dep)));

        drop(cell);
        assert!(!Runtime::with_graph(|graph| graph.contains_dep(dep)));
    }
}
