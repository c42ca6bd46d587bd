//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless created lazily).
//!
//! 2. When any dependency changes, the runtime notifies the effect once per
//!    propagation batch. The effect hands the re-run to its scheduler.
//!
//! 3. Each run rewinds the effect's dependency chain, re-links whatever the
//!    function reads, and prunes edges the run did not confirm.
//!
//! # Schedulers
//!
//! - `Sync` re-runs inside the notification.
//! - `Queued` puts a job on the thread's job queue; the host drains it
//!   with [`flush_jobs`](crate::graph::flush_jobs).
//! - `Custom` calls a user hook instead. Watches are built on this.
//!
//! # Stopping
//!
//! A stopped effect detaches every edge and is never notified again.
//! Calling [`Effect::run`] on it still runs the function, untracked.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Deserialize;
use tracing::debug;

use super::runtime::{Runtime, TrackingScope};
use super::subscriber::Subscriber;
use crate::graph::{self, DirtyState, SubId};

/// How a notified effect re-runs.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectScheduler {
    /// Re-run synchronously when notified.
    #[default]
    Sync,
    /// Defer to the job queue. Repeated notifications before a flush
    /// coalesce into one run.
    Queued,
    /// Call the hook instead of re-running.
    #[serde(skip)]
    Custom(Rc<dyn Fn()>),
}

impl fmt::Debug for EffectScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectScheduler::Sync => f.write_str("Sync"),
            EffectScheduler::Queued => f.write_str("Queued"),
            EffectScheduler::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Registration options for [`Effect::with_options`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EffectOptions {
    /// Skip the initial run.
    pub lazy: bool,
    pub scheduler: EffectScheduler,
}

impl EffectOptions {
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn scheduler(mut self, scheduler: EffectScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }
}

pub(crate) struct EffectInner<T> {
    sub: SubId,
    run: Box<dyn Fn() -> T>,
    active: Cell<bool>,
    scheduler: RefCell<EffectScheduler>,
    run_count: Cell<usize>,
    this: Weak<EffectInner<T>>,
}

impl<T: 'static> EffectInner<T> {
    pub(crate) fn run(&self) -> T {
        // Stopped: a plain call, reads go to whoever is active.
        if !self.active.get() {
            return (self.run)();
        }

        let value = {
            let _scope = TrackingScope::enter(self.sub);
            (self.run)()
        };
        self.run_count.set(self.run_count.get() + 1);

        // Stopped from inside its own run: drop what this run linked.
        if !self.active.get() {
            Runtime::detach(self.sub);
        }
        value
    }

    pub(crate) fn stop(&self) {
        if self.active.replace(false) {
            Runtime::detach(self.sub);
            debug!(sub = ?self.sub, "effect stopped");
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl<T: 'static> Subscriber for EffectInner<T> {
    fn subscriber_id(&self) -> SubId {
        self.sub
    }

    fn is_eager(&self) -> bool {
        true
    }

    fn mark_dirty(&self, _state: DirtyState) {}

    fn notify(&self) {
        if !self.active.get() {
            return;
        }

        let scheduler = self.scheduler.borrow().clone();
        match scheduler {
            EffectScheduler::Sync => {
                self.run();
            }
            EffectScheduler::Queued => {
                let this = self.this.clone();
                graph::queue_job(self.sub, move || {
                    if let Some(effect) = this.upgrade() {
                        if effect.is_active() {
                            effect.run();
                        }
                    }
                });
            }
            EffectScheduler::Custom(hook) => hook(),
        }
    }
}

impl<T> Drop for EffectInner<T> {
    fn drop(&mut self) {
        Runtime::dispose_sub(self.sub);
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The function's return value is handed back by [`Effect::run`]; for plain
/// side effects it is `()`.
///
/// Dropping the last handle stops the effect.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use tendril_core::reactive::{Effect, Ref};
///
/// let count = Ref::new(0);
/// let seen = Rc::new(Cell::new(0));
///
/// let _effect = {
///     let count = count.clone();
///     let seen = seen.clone();
///     Effect::new(move || seen.set(count.get()))
/// };
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
/// ```
pub struct Effect<T: 'static = ()> {
    inner: Rc<EffectInner<T>>,
}

impl<T: 'static> Effect<T> {
    /// Create an effect and run it once to establish its dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_options(run, EffectOptions::default())
    }

    /// Create an effect without running it.
    ///
    /// It has no dependencies until the first [`Effect::run`].
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_options(run, EffectOptions::default().lazy())
    }

    pub fn with_options<F>(run: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let inner = Rc::new_cyclic(|this| EffectInner {
            sub: Runtime::create_sub(),
            run: Box::new(run),
            active: Cell::new(true),
            scheduler: RefCell::new(options.scheduler),
            run_count: Cell::new(0),
            this: this.clone(),
        });

        let as_sub: Rc<dyn Subscriber> = inner.clone();
        Runtime::register(&as_sub);

        let effect = Self { inner };
        if !options.lazy {
            effect.run();
        }
        effect
    }

    /// Run the function now, re-tracking its dependencies.
    pub fn run(&self) -> T {
        self.inner.run()
    }

    /// Detach every dependency edge; the effect is never notified again.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Replace the scheduler used for future notifications.
    pub fn set_scheduler(&self, scheduler: EffectScheduler) {
        *self.inner.scheduler.borrow_mut() = scheduler;
    }

    /// Check if the effect is still subscribed.
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Get the number of tracked runs.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of dependencies from the last run.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependencies_of(self.inner.sub).len()
    }

    /// The effect's subscriber node.
    pub fn sub_id(&self) -> SubId {
        self.inner.sub
    }
}

impl<T: 'static> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("sub", &self.inner.sub)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
