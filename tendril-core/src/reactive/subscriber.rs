//! Subscriber traits for the reactive system.
//!
//! A subscriber is any computation that depends on reactive values: effects,
//! computeds and watches. The runtime keeps weak references to them, keyed
//! by [`SubId`], and talks to them only through these traits.

use crate::graph::{DirtyState, SubId};

/// A computation that can be notified when its dependencies change.
pub trait Subscriber {
    /// The graph node this subscriber tracks its dependencies on.
    fn subscriber_id(&self) -> SubId;

    /// Whether this subscriber re-runs on notification (effects) or only
    /// marks itself stale and waits to be read (computeds).
    fn is_eager(&self) -> bool;

    /// Record that a dependency changed. Lazy subscribers pass the
    /// notification on to their own subscribers from here.
    fn mark_dirty(&self, state: DirtyState);

    /// Re-run, or hand the re-run to a scheduler. Called once per
    /// propagation batch for eager subscribers.
    fn notify(&self);
}

/// A dependency whose value is itself computed and can be brought
/// up-to-date on demand.
pub trait Derived {
    /// Recompute if stale. Bumps the dependency version if the value changed.
    fn refresh(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LinkGraph;
    use std::cell::{Cell, RefCell};

    struct Recorder {
        id: SubId,
        marks: RefCell<Vec<DirtyState>>,
        notified: Cell<usize>,
    }

    impl Subscriber for Recorder {
        fn subscriber_id(&self) -> SubId {
            self.id
        }

        fn is_eager(&self) -> bool {
            true
        }

        fn mark_dirty(&self, state: DirtyState) {
            self.marks.borrow_mut().push(state);
        }

        fn notify(&self) {
            self.notified.set(self.notified.get() + 1);
        }
    }

    #[test]
    fn subscriber_is_object_safe() {
        let mut graph = LinkGraph::new();
        let recorder = Recorder {
            id: graph.add_sub(),
            marks: RefCell::new(Vec::new()),
            notified: Cell::new(0),
        };

        let sub: &dyn Subscriber = &recorder;
        sub.mark_dirty(DirtyState::MaybeDirty);
        sub.notify();

        assert_eq!(*recorder.marks.borrow(), vec![DirtyState::MaybeDirty]);
        assert_eq!(recorder.notified.get(), 1);
        assert_eq!(sub.subscriber_id(), recorder.id);
    }
}
