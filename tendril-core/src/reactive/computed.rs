//! Computed Implementation
//!
//! A `Computed` is a cached derived value. It is a subscriber (it tracks
//! what its getter reads) and a dependency (others can track it) at once.
//!
//! # How Computeds Work
//!
//! 1. Nothing runs at creation. The getter runs on first read and the
//!    result is cached.
//!
//! 2. When a source the getter read changes, the computed is marked
//!    `Dirty`. When an upstream computed may have changed, it is marked
//!    `MaybeDirty`. Either way it tells its own subscribers they are
//!    `MaybeDirty` (once, on leaving `Clean`) and does not recompute.
//!
//! 3. On the next read, a `Dirty` computed recomputes. A `MaybeDirty` one
//!    first refreshes its upstream computeds and recomputes only if one of
//!    them actually produced a new value.
//!
//! 4. A recompute that yields an equal value does not bump the version, so
//!    downstream "maybe dirty" checks see no change.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use tracing::{debug, warn};

use super::runtime::{Runtime, TrackingScope};
use super::subscriber::{Derived, Subscriber};
use crate::error::{ReactiveError, Result};
use crate::graph::{DepId, DirtyState, SubId};

struct ComputedInner<T> {
    dep: DepId,
    sub: SubId,
    getter: Box<dyn Fn() -> T>,
    setter: Option<Box<dyn Fn(T)>>,
    value: RefCell<Option<T>>,
    state: Cell<DirtyState>,
}

impl<T> ComputedInner<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Run the getter under tracking. Returns whether the value changed.
    fn update(&self) -> bool {
        let next = {
            let _scope = TrackingScope::enter(self.sub);
            (self.getter)()
        };

        let previous = {
            let mut slot = self.value.borrow_mut();
            if slot.as_ref() == Some(&next) {
                None
            } else {
                Some(slot.replace(next))
            }
        };
        self.state.set(DirtyState::Clean);

        let changed = previous.is_some();
        if changed {
            Runtime::mark_changed(self.dep);
        }
        debug!(sub = ?self.sub, changed, "recomputed");
        changed
    }

    fn refresh_if_stale(&self) {
        // A read from inside our own getter sees the cached value.
        if Runtime::is_running(self.sub) {
            return;
        }

        match self.state.get() {
            DirtyState::Clean => {}
            DirtyState::Dirty => {
                self.update();
            }
            DirtyState::MaybeDirty => {
                if Runtime::dependencies_changed(self.sub) {
                    self.update();
                } else {
                    self.state.set(DirtyState::Clean);
                }
            }
        }
    }
}

impl<T> Subscriber for ComputedInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn subscriber_id(&self) -> SubId {
        self.sub
    }

    fn is_eager(&self) -> bool {
        false
    }

    fn mark_dirty(&self, state: DirtyState) {
        let current = self.state.get();
        if current == DirtyState::Clean {
            self.state.set(state);
            Runtime::propagate(self.dep, DirtyState::MaybeDirty);
        } else if state > current {
            self.state.set(state);
        }
    }

    fn notify(&self) {
        self.mark_dirty(DirtyState::Dirty);
    }
}

impl<T> Derived for ComputedInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn refresh(&self) {
        self.refresh_if_stale();
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Runtime::dispose_sub(self.sub);
        Runtime::dispose_dep(self.dep);
    }
}

/// A cached derived value that recomputes only when its inputs change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. `PartialEq` decides whether a
///   recompute produced something new.
///
/// # Example
///
/// ```rust
/// use tendril_core::reactive::{Computed, Ref};
///
/// let count = Ref::new(2);
/// let doubled = {
///     let count = count.clone();
///     Computed::new(move || count.get() * 2)
/// };
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    inner: Rc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a read-only computed. The getter runs on first access.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(getter), None)
    }

    /// Create a computed whose writes are forwarded to `setter`.
    pub fn with_setter<F, S>(getter: F, setter: S) -> Self
    where
        F: Fn() -> T + 'static,
        S: Fn(T) + 'static,
    {
        Self::build(Box::new(getter), Some(Box::new(setter)))
    }

    fn build(getter: Box<dyn Fn() -> T>, setter: Option<Box<dyn Fn(T)>>) -> Self {
        let inner = Rc::new(ComputedInner {
            dep: Runtime::create_dep(),
            sub: Runtime::create_sub(),
            getter,
            setter,
            value: RefCell::new(None),
            state: Cell::new(DirtyState::Dirty),
        });

        let as_sub: Rc<dyn Subscriber> = inner.clone();
        Runtime::register(&as_sub);
        let as_derived: Rc<dyn Derived> = inner.clone();
        Runtime::register_derived(inner.dep, &as_derived);

        Self { inner }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Panics if called from inside this computed's own getter before the
    /// first value exists; see [`Computed::try_get`].
    pub fn get(&self) -> T {
        self.try_get()
            .expect("computed read from inside its own getter before its first evaluation")
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Reading a computed from inside its own getter returns the cached
    /// value rather than recursing, or `CircularRead` if there is none yet.
    pub fn try_get(&self) -> Result<T> {
        self.inner.refresh_if_stale();

        if Runtime::current_subscriber() != Some(self.inner.sub) {
            Runtime::track(self.inner.dep);
        }

        self.inner
            .value
            .borrow()
            .clone()
            .ok_or(ReactiveError::CircularRead)
    }

    /// Write through the setter.
    ///
    /// A computed without a setter logs a warning and drops the write.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            warn!(dep = ?self.inner.dep, "{err}; write ignored");
        }
    }

    /// Write through the setter, or fail with `ReadOnly`.
    pub fn try_set(&self, value: T) -> Result<()> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => Err(ReactiveError::ReadOnly),
        }
    }

    /// Whether a setter was supplied.
    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Get the current dirty state.
    pub fn state(&self) -> DirtyState {
        self.inner.state.get()
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// The computed's dependency node (what readers link to).
    pub fn dep_id(&self) -> DepId {
        self.inner.dep
    }

    /// The computed's subscriber node (what its getter links from).
    pub fn sub_id(&self) -> SubId {
        self.inner.sub
    }

    /// Get the number of dependents.
    pub fn dependent_count(&self) -> usize {
        Runtime::subscribers_of(self.inner.dep).len()
    }

    /// Whether two handles refer to the same computed.
    pub fn ptr_eq(&self, other: &Computed<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("dep", &self.inner.dep)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Ref};

    fn counted<T: Clone + PartialEq + 'static>(
        f: impl Fn() -> T + 'static,
    ) -> (Computed<T>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let computed = {
            let calls = calls.clone();
            Computed::new(move || {
                calls.set(calls.get() + 1);
                f()
            })
        };
        (computed, calls)
    }

    #[test]
    fn computed_computes_on_first_access() {
        let (computed, calls) = counted(|| 42);

        // Not computed yet
        assert!(!computed.has_value());
        assert_eq!(calls.get(), 0);

        // First access triggers computation
        assert_eq!(computed.get(), 42);
        assert_eq!(calls.get(), 1);
        assert!(computed.has_value());
    }

    #[test]
    fn computed_caches_value_when_clean() {
        let (computed, calls) = counted(|| 42);

        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn computed_recomputes_after_source_change() {
        let source = Ref::new(1);
        let (computed, calls) = {
            let source = source.clone();
            counted(move || source.get() * 10)
        };

        assert_eq!(computed.get(), 10);
        source.set(2);

        // Marked dirty, but lazy
        assert_eq!(computed.state(), DirtyState::Dirty);
        assert_eq!(calls.get(), 1);

        assert_eq!(computed.get(), 20);
        assert_eq!(calls.get(), 2);
        assert_eq!(computed.state(), DirtyState::Clean);
    }

    #[test]
    fn computed_state_transitions() {
        let source = Ref::new(1);
        let first = {
            let source = source.clone();
            Computed::new(move || source.get() + 1)
        };
        let second = {
            let first = first.clone();
            Computed::new(move || first.get() * 2)
        };

        // Starts dirty
        assert_eq!(second.state(), DirtyState::Dirty);

        // After get, becomes clean
        assert_eq!(second.get(), 4);
        assert_eq!(first.state(), DirtyState::Clean);
        assert_eq!(second.state(), DirtyState::Clean);

        source.set(5);
        assert_eq!(first.state(), DirtyState::Dirty);
        assert_eq!(second.state(), DirtyState::MaybeDirty);

        assert_eq!(second.get(), 12);
        assert_eq!(second.state(), DirtyState::Clean);
    }

    #[test]
    fn unchanged_upstream_skips_downstream_recompute() {
        let source = Ref::new(2);
        let parity = {
            let source = source.clone();
            Computed::new(move || source.get() % 2)
        };
        let (label, calls) = {
            let parity = parity.clone();
            counted(move || if parity.get() == 0 { "even" } else { "odd" })
        };

        assert_eq!(label.get(), "even");
        source.set(4);

        assert_eq!(label.get(), "even");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn readonly_write_is_dropped() {
        let computed = Computed::new(|| 1);

        assert_eq!(computed.try_set(5), Err(ReactiveError::ReadOnly));
        computed.set(5);
        assert_eq!(computed.get(), 1);
        assert!(!computed.is_writable());
    }

    #[test]
    fn setter_receives_writes() {
        let source = Ref::new(1);
        let doubled = {
            let read = source.clone();
            let write = source.clone();
            Computed::with_setter(move || read.get() * 2, move |v: i32| {
                write.set(v / 2);
            })
        };

        doubled.set(10);
        assert_eq!(source.get(), 5);
        assert_eq!(doubled.get(), 10);
    }

    #[test]
    fn effect_tracks_computed() {
        let source = Ref::new(1);
        let doubled = {
            let source = source.clone();
            Computed::new(move || source.get() * 2)
        };
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _effect = {
            let doubled = doubled.clone();
            let seen = seen.clone();
            Effect::new(move || seen.borrow_mut().push(doubled.get()))
        };

        source.set(3);
        assert_eq!(*seen.borrow(), vec![2, 6]);
        assert_eq!(doubled.dependent_count(), 1);
    }

    #[test]
    fn self_read_does_not_recurse() {
        let source = Ref::new(1);
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));

        let computed = {
            let source = source.clone();
            let slot = slot.clone();
            Computed::new(move || {
                let previous = slot
                    .borrow()
                    .as_ref()
                    .and_then(|me| me.try_get().ok())
                    .unwrap_or(0);
                previous + source.get()
            })
        };
        *slot.borrow_mut() = Some(computed.clone());

        // First evaluation: circular read has no value yet
        assert_eq!(computed.get(), 1);
        source.set(2);
        // Second evaluation sees its own cached value
        assert_eq!(computed.get(), 3);

        // Break the Rc cycle so the computed is released
        slot.borrow_mut().take();
    }

    #[test]
    fn dropping_computed_releases_nodes() {
        let source = Ref::new(1);
        let computed = {
            let source = source.clone();
            Computed::new(move || source.get())
        };
        computed.get();
        assert_eq!(source.subscriber_count(), 1);

        drop(computed);
        assert_eq!(source.subscriber_count(), 0);
    }
}
