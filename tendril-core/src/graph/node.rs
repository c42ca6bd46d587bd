//! Graph Nodes
//!
//! This module defines the records that live in the link graph: dependency
//! nodes, subscriber nodes, and the edges ("links") between them.

use super::arena::Key;

/// Identifier of a dependency node (a property cell, a ref, or a computed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(pub(crate) Key);

/// Identifier of a subscriber node (an effect, a computed, or a watch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubId(pub(crate) Key);

/// Index of a link record in the link slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(u32);

impl LinkId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get the raw slab index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Dirty state of a subscriber.
///
/// Ordered so that merging two notifications keeps the stronger one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirtyState {
    /// The subscriber's last run is up-to-date.
    Clean,

    /// A derived dependency might have changed. Its value has to be
    /// refreshed before we know whether a re-run is needed.
    MaybeDirty,

    /// A source dependency changed. The subscriber must re-run.
    Dirty,
}

impl DirtyState {
    /// Combine two notifications, keeping the stronger.
    pub fn merge(self, other: DirtyState) -> DirtyState {
        self.max(other)
    }
}

/// An edge between one dependency and one subscriber.
///
/// A link sits in two chains at once: the dependency's doubly linked
/// subscriber chain (`prev_sub`/`next_sub`) and the subscriber's singly
/// linked dependency chain (`next_dep`).
#[derive(Debug, Clone)]
pub(crate) struct Link {
    pub(crate) sub: Option<SubId>,
    pub(crate) dep: Option<DepId>,
    pub(crate) prev_sub: Option<LinkId>,
    pub(crate) next_sub: Option<LinkId>,
    pub(crate) next_dep: Option<LinkId>,
    /// Dependency version observed when this edge was last confirmed.
    pub(crate) version: u64,
}

impl Link {
    /// A link with every field cleared, as it sits in the pool.
    pub(crate) fn vacant() -> Self {
        Self {
            sub: None,
            dep: None,
            prev_sub: None,
            next_sub: None,
            next_dep: None,
            version: 0,
        }
    }
}

/// Head and tail of a dependency's subscriber chain.
#[derive(Debug, Default)]
pub(crate) struct DepNode {
    pub(crate) subs: Option<LinkId>,
    pub(crate) subs_tail: Option<LinkId>,
    /// Bumped on every trigger (sources) or value change (computeds).
    pub(crate) version: u64,
}

/// Head and tail of a subscriber's dependency chain.
#[derive(Debug, Default)]
pub(crate) struct SubNode {
    pub(crate) deps: Option<LinkId>,
    pub(crate) deps_tail: Option<LinkId>,
    /// True only while the subscriber's function body is executing.
    pub(crate) tracking: bool,
    /// Set once the current run has inserted a link out of the previous
    /// run's order. Until then the confirmed prefix cannot hold duplicates.
    pub(crate) spliced: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_state_merge_keeps_stronger() {
        assert_eq!(DirtyState::Clean.merge(DirtyState::MaybeDirty), DirtyState::MaybeDirty);
        assert_eq!(DirtyState::Dirty.merge(DirtyState::MaybeDirty), DirtyState::Dirty);
        assert_eq!(DirtyState::MaybeDirty.merge(DirtyState::Clean), DirtyState::MaybeDirty);
    }

    #[test]
    fn vacant_link_is_fully_cleared() {
        let link = Link::vacant();
        assert!(link.sub.is_none());
        assert!(link.dep.is_none());
        assert!(link.prev_sub.is_none());
        assert!(link.next_sub.is_none());
        assert!(link.next_dep.is_none());
    }
}
