//! Reactive Context
//!
//! The reactive context records which computation is currently running.
//! This enables automatic dependency tracking: when a ref or property is
//! read, the current computation is linked to it.
//!
//! # Implementation
//!
//! A single thread-local slot holds the active subscriber. Entering a
//! context saves the previous occupant in the returned guard and installs
//! the new one; dropping the guard puts the previous occupant back. Nested
//! computations (a computed read from inside an effect) therefore restore
//! the outer subscriber when they finish, including when they panic.

use std::cell::Cell;

use crate::graph::SubId;

thread_local! {
    static ACTIVE_SUB: Cell<Option<SubId>> = const { Cell::new(None) };
}

/// Guard that restores the previously active subscriber when dropped.
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ReactiveContext {
    previous: Option<SubId>,
}

impl ReactiveContext {
    /// Make `subscriber` the active subscriber until the guard drops.
    pub fn enter(subscriber: SubId) -> Self {
        Self::install(Some(subscriber))
    }

    /// Clear the active subscriber until the guard drops.
    pub fn untracked() -> Self {
        Self::install(None)
    }

    fn install(subscriber: Option<SubId>) -> Self {
        let previous = ACTIVE_SUB.with(|slot| slot.replace(subscriber));
        Self { previous }
    }

    /// Check if there is an active subscriber.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the active subscriber, if any.
    pub fn current_subscriber() -> Option<SubId> {
        ACTIVE_SUB.with(Cell::get)
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let _ = ACTIVE_SUB.try_with(|slot| slot.set(self.previous));
    }
}

/// Run `f` without an active subscriber, so nothing it reads is tracked.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LinkGraph;

    fn sub_ids() -> (SubId, SubId) {
        let mut graph = LinkGraph::new();
        (graph.add_sub(), graph.add_sub())
    }

    #[test]
    fn context_tracks_subscriber() {
        let (id, _) = sub_ids();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(id);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn nested_contexts() {
        let (id1, id2) = sub_ids();

        {
            let _ctx1 = ReactiveContext::enter(id1);
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(id2);
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn untracked_hides_active_subscriber() {
        let (id, _) = sub_ids();
        let _ctx = ReactiveContext::enter(id);

        let inside = untracked(ReactiveContext::current_subscriber);
        assert_eq!(inside, None);
        assert_eq!(ReactiveContext::current_subscriber(), Some(id));
    }

    #[test]
    fn context_restored_after_panic() {
        let (id, _) = sub_ids();

        let result = std::panic::catch_unwind(|| {
            let _ctx = ReactiveContext::enter(id);
            panic!("boom");
        });

        assert!(result.is_err());
        assert!(ReactiveContext::current_subscriber().is_none());
    }
}
