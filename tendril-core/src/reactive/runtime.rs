//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects refs, computeds,
//! effects and watches. It owns the link graph and decides who re-runs when
//! something changes.
//!
//! # How It Works
//!
//! 1. Every ref, property cell and computed owns a dependency node; every
//!    effect, computed and watch owns a subscriber node.
//!
//! 2. When a dependency is read while a subscriber is active, the runtime
//!    links the two.
//!
//! 3. When a dependency changes, the runtime:
//!    a. Bumps its version and collects its idle subscribers
//!    b. Marks lazy subscribers (computeds) dirty; they pass "maybe dirty"
//!       on to their own subscribers
//!    c. Queues eager subscribers (effects, watches) in a pending set
//!    d. When the outermost batch closes, notifies each pending subscriber
//!       once. A "maybe dirty" subscriber first refreshes its derived
//!       dependencies and is skipped if none of them actually changed.
//!
//! # Threading
//!
//! All state is thread-local. The engine assumes tracked reads and writes
//! happen on one thread; nothing here is `Send`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::trace;

use super::context::ReactiveContext;
use super::subscriber::{Derived, Subscriber};
use crate::graph::{self, DepId, DirtyState, LinkGraph, LinkStats, SubId};

#[derive(Default)]
struct RuntimeState {
    graph: RefCell<LinkGraph>,
    subscribers: RefCell<HashMap<SubId, Weak<dyn Subscriber>>>,
    derived: RefCell<HashMap<DepId, Weak<dyn Derived>>>,
    pending: RefCell<IndexMap<SubId, DirtyState>>,
    batch_depth: Cell<usize>,
    flushing: Cell<bool>,
}

thread_local! {
    static RUNTIME: RuntimeState = RuntimeState::default();
}

/// The thread-local reactive runtime.
///
/// All methods are associated functions operating on the current thread's
/// runtime state.
pub struct Runtime;

impl Runtime {
    pub(crate) fn with_graph<R>(f: impl FnOnce(&mut LinkGraph) -> R) -> R {
        RUNTIME.with(|rt| f(&mut rt.graph.borrow_mut()))
    }

    /// Graph access from `Drop` impls, which may run during thread teardown.
    fn try_with_graph(f: impl FnOnce(&mut LinkGraph)) {
        let _ = RUNTIME.try_with(|rt| {
            if let Ok(mut graph) = rt.graph.try_borrow_mut() {
                f(&mut graph);
            }
        });
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Allocate a dependency node.
    pub fn create_dep() -> DepId {
        Self::with_graph(LinkGraph::add_dep)
    }

    /// Allocate a subscriber node.
    pub fn create_sub() -> SubId {
        Self::with_graph(LinkGraph::add_sub)
    }

    /// Make `subscriber` reachable from propagation.
    ///
    /// The runtime holds it weakly; dropping the last strong handle
    /// unregisters it.
    pub fn register(subscriber: &Rc<dyn Subscriber>) {
        let id = subscriber.subscriber_id();
        RUNTIME.with(|rt| {
            rt.subscribers
                .borrow_mut()
                .insert(id, Rc::downgrade(subscriber));
        });
    }

    /// Make a derived dependency refreshable from "maybe dirty" checks.
    pub fn register_derived(dep: DepId, derived: &Rc<dyn Derived>) {
        RUNTIME.with(|rt| {
            rt.derived.borrow_mut().insert(dep, Rc::downgrade(derived));
        });
    }

    /// Release a dependency node.
    pub fn dispose_dep(dep: DepId) {
        Self::try_with_graph(|graph| graph.remove_dep(dep));
        let _ = RUNTIME.try_with(|rt| {
            if let Ok(mut derived) = rt.derived.try_borrow_mut() {
                derived.remove(&dep);
            }
        });
    }

    /// Release a subscriber node and every edge it holds.
    pub fn dispose_sub(sub: SubId) {
        Self::try_with_graph(|graph| graph.remove_sub(sub));
        let _ = RUNTIME.try_with(|rt| {
            if let Ok(mut subscribers) = rt.subscribers.try_borrow_mut() {
                subscribers.remove(&sub);
            }
            if let Ok(mut pending) = rt.pending.try_borrow_mut() {
                pending.shift_remove(&sub);
            }
        });
        graph::cancel_job(sub);
    }

    /// Detach every edge of `sub` and forget any pending notification.
    pub fn detach(sub: SubId) {
        let pruned = Self::with_graph(|graph| graph.detach_all(sub));
        RUNTIME.with(|rt| {
            rt.pending.borrow_mut().shift_remove(&sub);
        });
        graph::cancel_job(sub);
        trace!(?sub, pruned, "detached subscriber");
    }

    fn subscriber(id: SubId) -> Option<Rc<dyn Subscriber>> {
        RUNTIME.with(|rt| rt.subscribers.borrow().get(&id).and_then(|weak| weak.upgrade()))
    }

    fn derived(dep: DepId) -> Option<Rc<dyn Derived>> {
        RUNTIME.with(|rt| rt.derived.borrow().get(&dep).and_then(|weak| weak.upgrade()))
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if a subscriber is currently collecting dependencies.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Link `dep` to the active subscriber, if there is one.
    pub fn track(dep: DepId) {
        if let Some(sub) = Self::current_subscriber() {
            Self::with_graph(|graph| graph.link(dep, sub));
        }
    }

    /// Whether `sub` is in the middle of a tracked run.
    pub fn is_running(sub: SubId) -> bool {
        Self::with_graph(|graph| graph.is_tracking(sub))
    }

    /// Whether any dependency of `sub` changed since `sub` last read it.
    ///
    /// Derived dependencies are refreshed first, so a computed whose inputs
    /// changed but whose value did not counts as unchanged.
    pub fn dependencies_changed(sub: SubId) -> bool {
        let observed = Self::with_graph(|graph| graph.observed_versions(sub));

        for (dep, seen) in observed {
            if let Some(derived) = Self::derived(dep) {
                derived.refresh();
            }
            if Self::with_graph(|graph| graph.dep_version(dep)) != Some(seen) {
                return true;
            }
        }
        false
    }

    /// Bump the version of `dep` without notifying anyone.
    pub fn mark_changed(dep: DepId) {
        Self::with_graph(|graph| graph.bump_version(dep));
    }

    // ------------------------------------------------------------------
    // Triggering
    // ------------------------------------------------------------------

    /// A source dependency changed: notify everything reading it.
    pub fn trigger(dep: DepId) {
        Self::mark_changed(dep);
        Self::propagate(dep, DirtyState::Dirty);
    }

    /// Notify the idle subscribers of `dep`.
    ///
    /// Lazy subscribers are marked inline. Eager subscribers are queued and
    /// notified when the outermost batch closes.
    pub fn propagate(dep: DepId, state: DirtyState) {
        let worklist = Self::with_graph(|graph| graph.collect_subscribers(dep));
        if worklist.is_empty() {
            return;
        }

        let _batch = BatchGuard::open();
        for id in worklist {
            let Some(subscriber) = Self::subscriber(id) else {
                continue;
            };

            if subscriber.is_eager() {
                RUNTIME.with(|rt| {
                    rt.pending
                        .borrow_mut()
                        .entry(id)
                        .and_modify(|queued| *queued = queued.merge(state))
                        .or_insert(state);
                });
            } else {
                subscriber.mark_dirty(state);
            }
        }
    }

    /// Run `f` with the propagation batch held open.
    ///
    /// Effects triggered by writes inside `f` run once, after `f` returns.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        let _batch = BatchGuard::open();
        f()
    }

    /// Number of eager subscribers waiting for the current batch to close.
    pub fn pending_count() -> usize {
        RUNTIME.with(|rt| rt.pending.borrow().len())
    }

    fn flush_pending() {
        let already = RUNTIME.with(|rt| rt.flushing.replace(true));
        if already {
            return;
        }
        let _guard = FlushGuard;

        let mut notified = 0usize;
        loop {
            let next = RUNTIME.with(|rt| rt.pending.borrow_mut().shift_remove_index(0));
            let Some((id, state)) = next else {
                break;
            };
            let Some(subscriber) = Self::subscriber(id) else {
                continue;
            };

            if state == DirtyState::MaybeDirty && !Self::dependencies_changed(id) {
                trace!(sub = ?id, "skipping subscriber, derived inputs unchanged");
                continue;
            }
            subscriber.notify();
            notified += 1;
        }

        if notified > 0 {
            trace!(notified, "flushed propagation batch");
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Allocation counters of the link slab.
    pub fn link_stats() -> LinkStats {
        Self::with_graph(|graph| graph.stats())
    }

    /// Dependencies of `sub`, in read order.
    pub fn dependencies_of(sub: SubId) -> Vec<DepId> {
        Self::with_graph(|graph| graph.dependencies_of(sub))
    }

    /// Subscribers of `dep`, in subscription order.
    pub fn subscribers_of(dep: DepId) -> Vec<SubId> {
        Self::with_graph(|graph| graph.subscribers_of(dep))
    }
}

/// Holds the propagation batch open; the outermost guard flushes on drop.
struct BatchGuard;

impl BatchGuard {
    fn open() -> Self {
        RUNTIME.with(|rt| rt.batch_depth.set(rt.batch_depth.get() + 1));
        BatchGuard
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let depth = RUNTIME
            .try_with(|rt| {
                let depth = rt.batch_depth.get().saturating_sub(1);
                rt.batch_depth.set(depth);
                depth
            })
            .unwrap_or(1);

        // Never run user code while unwinding.
        if depth == 0 && !std::thread::panicking() {
            Runtime::flush_pending();
        }
    }
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = RUNTIME.try_with(|rt| rt.flushing.set(false));
    }
}

/// Runs a subscriber's body: starts tracking and installs it as the active
/// subscriber; on drop ends tracking (pruning stale edges) and restores the
/// previous subscriber.
pub(crate) struct TrackingScope {
    sub: SubId,
    _context: ReactiveContext,
}

impl TrackingScope {
    pub(crate) fn enter(sub: SubId) -> Self {
        Runtime::with_graph(|graph| graph.start_track(sub));
        Self {
            sub,
            _context: ReactiveContext::enter(sub),
        }
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        let sub = self.sub;
        Runtime::try_with_graph(|graph| {
            graph.end_track(sub);
        });
    }
}

/// Hold the propagation batch open across several writes.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::batch(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct MockSubscriber {
        id: SubId,
        eager: bool,
        marks: RefCell<Vec<DirtyState>>,
        notified: Cell<usize>,
    }

    impl MockSubscriber {
        fn new(eager: bool) -> Rc<Self> {
            let mock = Rc::new(Self {
                id: Runtime::create_sub(),
                eager,
                marks: RefCell::new(Vec::new()),
                notified: Cell::new(0),
            });
            let as_sub: Rc<dyn Subscriber> = mock.clone();
            Runtime::register(&as_sub);
            mock
        }

        fn read(&self, deps: &[DepId]) {
            let _scope = TrackingScope::enter(self.id);
            for &dep in deps {
                Runtime::track(dep);
            }
        }
    }

    impl Subscriber for MockSubscriber {
        fn subscriber_id(&self) -> SubId {
            self.id
        }

        fn is_eager(&self) -> bool {
            self.eager
        }

        fn mark_dirty(&self, state: DirtyState) {
            self.marks.borrow_mut().push(state);
        }

        fn notify(&self) {
            self.notified.set(self.notified.get() + 1);
        }
    }

    #[test]
    fn track_is_noop_without_active_subscriber() {
        let dep = Runtime::create_dep();
        Runtime::track(dep);
        assert!(Runtime::subscribers_of(dep).is_empty());
    }

    #[test]
    fn runtime_notifies_subscribers() {
        let dep = Runtime::create_dep();
        let lazy = MockSubscriber::new(false);
        let eager = MockSubscriber::new(true);

        lazy.read(&[dep]);
        eager.read(&[dep]);

        Runtime::trigger(dep);

        // Lazy subscriber is marked, eager one is notified
        assert_eq!(*lazy.marks.borrow(), vec![DirtyState::Dirty]);
        assert_eq!(lazy.notified.get(), 0);
        assert_eq!(eager.notified.get(), 1);
        assert!(eager.marks.borrow().is_empty());
    }

    #[test]
    fn batch_coalesces_notifications() {
        let a = Runtime::create_dep();
        let b = Runtime::create_dep();
        let eager = MockSubscriber::new(true);
        eager.read(&[a, b]);

        batch(|| {
            Runtime::trigger(a);
            Runtime::trigger(b);
            Runtime::trigger(a);
            assert_eq!(Runtime::pending_count(), 1);
            assert_eq!(eager.notified.get(), 0);
        });

        assert_eq!(eager.notified.get(), 1);
        assert_eq!(Runtime::pending_count(), 0);
    }

    #[test]
    fn running_subscriber_is_not_notified() {
        let dep = Runtime::create_dep();
        let eager = MockSubscriber::new(true);

        {
            let _scope = TrackingScope::enter(eager.id);
            Runtime::track(dep);
            Runtime::trigger(dep);
        }

        assert_eq!(eager.notified.get(), 0);
    }

    #[test]
    fn dropped_subscriber_is_skipped() {
        let dep = Runtime::create_dep();
        let eager = MockSubscriber::new(true);
        eager.read(&[dep]);
        let id = eager.id;

        drop(eager);
        Runtime::trigger(dep);

        // The edge is still there, but nobody is home
        assert_eq!(Runtime::subscribers_of(dep), vec![id]);
    }

    #[test]
    fn maybe_dirty_without_changes_is_skipped() {
        let dep = Runtime::create_dep();
        let eager = MockSubscriber::new(true);
        eager.read(&[dep]);

        // Nothing bumped the version: the subscriber is skipped
        Runtime::propagate(dep, DirtyState::MaybeDirty);
        assert_eq!(eager.notified.get(), 0);

        Runtime::mark_changed(dep);
        Runtime::propagate(dep, DirtyState::MaybeDirty);
        assert_eq!(eager.notified.get(), 1);
    }

    #[test]
    fn tracking_scope_restores_on_panic() {
        let dep = Runtime::create_dep();
        let sub = MockSubscriber::new(true);
        let id = sub.id;

        let result = std::panic::catch_unwind(|| {
            let _scope = TrackingScope::enter(id);
            Runtime::track(dep);
            panic!("user function failed");
        });

        assert!(result.is_err());
        assert!(Runtime::current_subscriber().is_none());
        assert!(!Runtime::is_running(id));
        assert_eq!(Runtime::dependencies_of(id), vec![dep]);
    }
}
