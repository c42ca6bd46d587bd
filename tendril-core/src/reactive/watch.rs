//! Watch Implementation
//!
//! A watch observes a source and calls back with the new and previous
//! values whenever the source changes.
//!
//! # How Watches Work
//!
//! 1. The source becomes a getter. Refs and computeds read their value, a
//!    reactive container yields itself, and a function is used as is.
//!
//! 2. With `deep`, the getter also walks the value it returns, reading every
//!    property so the whole subtree is tracked. A visited set keyed by
//!    container identity stops cycles; an optional depth bounds the walk.
//!
//! 3. The getter runs inside a lazy effect whose scheduler is the watch job.
//!    When notified, the job re-runs the getter, runs the cleanup the
//!    previous callback registered, then calls back with
//!    `(new, old, on_cleanup)`. Unless the watch is deep, the callback only
//!    fires if the value actually changed.
//!
//! 4. Stopping the watch detaches the effect and runs any pending cleanup.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Deserialize;
use tracing::debug;

use super::computed::Computed;
use super::effect::{Effect, EffectOptions, EffectScheduler};
use super::reactive::Reactive;
use super::ref_cell::Ref;
use super::value::{Object, ObjectId, Value};

/// How deep a watch traverses its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Deep {
    /// `true` walks the whole subtree; `false` disables traversal.
    Bool(bool),
    /// Walk this many levels.
    Levels(usize),
}

impl Deep {
    /// `None` when traversal is off; otherwise the depth bound, if any.
    pub fn levels(self) -> Option<Option<usize>> {
        match self {
            Deep::Bool(false) => None,
            Deep::Bool(true) => Some(None),
            Deep::Levels(levels) => Some(Some(levels)),
        }
    }
}

impl From<bool> for Deep {
    fn from(deep: bool) -> Self {
        Deep::Bool(deep)
    }
}

impl From<usize> for Deep {
    fn from(levels: usize) -> Self {
        Deep::Levels(levels)
    }
}

/// Registration options for [`watch`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Call back once at registration, with no old value.
    pub immediate: bool,
    /// Stop after the first callback.
    pub once: bool,
    /// Traverse the watched value. Reactive sources default to unbounded.
    pub deep: Option<Deep>,
}

impl WatchOptions {
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn deep(mut self, deep: impl Into<Deep>) -> Self {
        self.deep = Some(deep.into());
        self
    }
}

/// What a watch observes.
pub enum WatchSource<T>
where
    T: Clone + PartialEq + 'static,
{
    Ref(Ref<T>),
    Computed(Computed<T>),
    /// A reactive container; the getter yields the handle itself.
    Reactive {
        handle: Reactive,
        project: fn(&Reactive) -> T,
    },
    Getter(Box<dyn Fn() -> T>),
}

impl<T> WatchSource<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Watch the result of a function.
    pub fn getter(f: impl Fn() -> T + 'static) -> Self {
        WatchSource::Getter(Box::new(f))
    }
}

impl<T> From<Ref<T>> for WatchSource<T>
where
    T: Clone + PartialEq + 'static,
{
    fn from(cell: Ref<T>) -> Self {
        WatchSource::Ref(cell)
    }
}

impl<T> From<Computed<T>> for WatchSource<T>
where
    T: Clone + PartialEq + 'static,
{
    fn from(computed: Computed<T>) -> Self {
        WatchSource::Computed(computed)
    }
}

impl From<Reactive> for WatchSource<Reactive> {
    fn from(handle: Reactive) -> Self {
        WatchSource::Reactive {
            handle,
            project: Reactive::clone,
        }
    }
}

impl From<Reactive> for WatchSource<Value> {
    fn from(handle: Reactive) -> Self {
        WatchSource::Reactive {
            handle,
            project: |handle| Value::Reactive(handle.clone()),
        }
    }
}

/// Reads every reactive property reachable from a value.
pub trait Traverse {
    /// Walk up to `depth` levels (`None` for no bound), skipping containers
    /// already in `seen`.
    fn traverse(&self, depth: Option<usize>, seen: &mut HashSet<ObjectId>);
}

macro_rules! impl_traverse_leaf {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Traverse for $ty {
                fn traverse(&self, _depth: Option<usize>, _seen: &mut HashSet<ObjectId>) {}
            }
        )*
    };
}

impl_traverse_leaf!(
    (), bool, char, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String,
    &'static str, Rc<str>,
);

impl Traverse for Reactive {
    fn traverse(&self, depth: Option<usize>, seen: &mut HashSet<ObjectId>) {
        if depth == Some(0) || !seen.insert(self.id()) {
            return;
        }
        let next = depth.map(|depth| depth - 1);

        // `keys` tracks the key set, so additions are seen too.
        for key in self.keys() {
            self.get(key).traverse(next, seen);
        }
    }
}

impl Traverse for Object {
    fn traverse(&self, depth: Option<usize>, seen: &mut HashSet<ObjectId>) {
        Reactive::new(self.clone()).traverse(depth, seen);
    }
}

impl Traverse for Value {
    fn traverse(&self, depth: Option<usize>, seen: &mut HashSet<ObjectId>) {
        match self {
            Value::Reactive(handle) => handle.traverse(depth, seen),
            Value::Object(object) => object.traverse(depth, seen),
            Value::Ref(cell) => cell.get().traverse(depth, seen),
            Value::Computed(computed) => computed.get().traverse(depth, seen),
            _ => {}
        }
    }
}

impl<T: Traverse> Traverse for Vec<T> {
    fn traverse(&self, depth: Option<usize>, seen: &mut HashSet<ObjectId>) {
        for item in self {
            item.traverse(depth, seen);
        }
    }
}

impl<T: Traverse> Traverse for Option<T> {
    fn traverse(&self, depth: Option<usize>, seen: &mut HashSet<ObjectId>) {
        if let Some(value) = self {
            value.traverse(depth, seen);
        }
    }
}

impl<A: Traverse, B: Traverse> Traverse for (A, B) {
    fn traverse(&self, depth: Option<usize>, seen: &mut HashSet<ObjectId>) {
        self.0.traverse(depth, seen);
        self.1.traverse(depth, seen);
    }
}

impl<A: Traverse, B: Traverse, C: Traverse> Traverse for (A, B, C) {
    fn traverse(&self, depth: Option<usize>, seen: &mut HashSet<ObjectId>) {
        self.0.traverse(depth, seen);
        self.1.traverse(depth, seen);
        self.2.traverse(depth, seen);
    }
}

/// Registers the cleanup for the current callback invocation.
///
/// The cleanup runs before the next callback, or when the watch stops.
/// Registering twice replaces the earlier cleanup.
#[derive(Default)]
pub struct OnCleanup {
    slot: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl OnCleanup {
    pub fn register(&self, cleanup: impl FnOnce() + 'static) {
        *self.slot.borrow_mut() = Some(Box::new(cleanup));
    }

    fn run(&self) {
        let cleanup = self.slot.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }
}

type Callback<T> = Box<dyn Fn(T, Option<T>, &OnCleanup)>;

struct Watcher<T: 'static> {
    effect: Effect<T>,
    callback: Callback<T>,
    old: RefCell<Option<T>>,
    cleanup: OnCleanup,
    deep: bool,
    once: bool,
}

impl<T> Watcher<T>
where
    T: Clone + PartialEq + 'static,
{
    fn job(&self) {
        if !self.effect.is_active() {
            return;
        }

        let new = self.effect.run();
        let changed = self.deep || self.old.borrow().as_ref() != Some(&new);
        if !changed {
            return;
        }

        self.cleanup.run();
        let old = self.old.replace(Some(new.clone()));
        (self.callback)(new, old, &self.cleanup);

        if self.once {
            self.stop();
        }
    }
}

trait Stoppable {
    fn stop(&self);
    fn is_active(&self) -> bool;
}

impl<T> Stoppable for Watcher<T>
where
    T: Clone + PartialEq + 'static,
{
    fn stop(&self) {
        if self.effect.is_active() {
            self.effect.stop();
            debug!(sub = ?self.effect.sub_id(), "watch stopped");
        }
        self.cleanup.run();
    }

    fn is_active(&self) -> bool {
        self.effect.is_active()
    }
}

/// Handle returned by [`watch`]. Dropping it stops the watch.
#[must_use = "the watch stops as soon as the handle is dropped"]
pub struct WatchHandle {
    watcher: Rc<dyn Stoppable>,
}

impl WatchHandle {
    /// Stop watching and run the pending cleanup.
    pub fn stop(&self) {
        self.watcher.stop();
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_active()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.watcher.stop();
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Call `callback` with `(new, old, on_cleanup)` whenever `source` changes.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use tendril_core::reactive::{watch, Ref, WatchOptions};
///
/// let count = Ref::new(0);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let _handle = {
///     let seen = seen.clone();
///     watch(
///         count.clone(),
///         move |new, old, _| seen.borrow_mut().push((new, old)),
///         WatchOptions::default(),
///     )
/// };
///
/// count.set(1);
/// assert_eq!(*seen.borrow(), vec![(1, Some(0))]);
/// ```
pub fn watch<T, S, F>(source: S, callback: F, options: WatchOptions) -> WatchHandle
where
    T: Clone + PartialEq + Traverse + 'static,
    S: Into<WatchSource<T>>,
    F: Fn(T, Option<T>, &OnCleanup) + 'static,
{
    let (base, reactive_source): (Box<dyn Fn() -> T>, bool) = match source.into() {
        WatchSource::Ref(cell) => (Box::new(move || cell.get()), false),
        WatchSource::Computed(computed) => (Box::new(move || computed.get()), false),
        WatchSource::Reactive { handle, project } => (Box::new(move || project(&handle)), true),
        WatchSource::Getter(getter) => (getter, false),
    };

    let levels = match options.deep {
        Some(deep) => deep.levels(),
        None if reactive_source => Some(None),
        None => None,
    };

    let getter: Box<dyn Fn() -> T> = match levels {
        Some(depth) => Box::new(move || {
            let value = base();
            value.traverse(depth, &mut HashSet::new());
            value
        }),
        None => base,
    };

    let watcher = Rc::new_cyclic(|this: &Weak<Watcher<T>>| {
        let this = this.clone();
        let job = move || {
            if let Some(watcher) = this.upgrade() {
                watcher.job();
            }
        };
        Watcher {
            effect: Effect::with_options(
                getter,
                EffectOptions::default()
                    .lazy()
                    .scheduler(EffectScheduler::Custom(Rc::new(job))),
            ),
            callback: Box::new(callback),
            old: RefCell::new(None),
            cleanup: OnCleanup::default(),
            deep: levels.is_some(),
            once: options.once,
        }
    });

    if options.immediate {
        watcher.job();
    } else {
        let initial = watcher.effect.run();
        *watcher.old.borrow_mut() = Some(initial);
    }

    WatchHandle { watcher }
}
