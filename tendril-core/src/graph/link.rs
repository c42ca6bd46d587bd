//! Link Graph
//!
//! The bipartite adjacency structure connecting dependencies to subscribers.
//!
//! # Algorithm
//!
//! A subscriber's dependency chain is rebuilt on every run without being
//! thrown away first:
//!
//! 1. `start_track` rewinds `deps_tail` to "nothing confirmed yet".
//! 2. Each read calls `link`. If the edge right after `deps_tail` already
//!    points at the dependency, the tail just advances over it. This is the
//!    common case when reads happen in a stable order and costs nothing.
//! 3. Otherwise a link is taken from the pool (or allocated) and spliced in
//!    right after `deps_tail`. A dependency already in the confirmed prefix
//!    is not linked again, so a run never holds two edges to one dependency.
//! 4. `end_track` cuts the chain after `deps_tail`. Everything past the cut
//!    was read last run but not this run; those links are removed from their
//!    dependency's chain, cleared, and pushed on the pool.
//!
//! Links are stored in a slab and referenced by index; the pool is a stack
//! of free indices.

use smallvec::SmallVec;
use tracing::trace;

use super::arena::Arena;
use super::node::{DepId, DepNode, Link, LinkId, SubId, SubNode};

/// Allocation counters for the link slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStats {
    /// Link records ever allocated (pool reuse does not count).
    pub allocated: usize,
    /// Link records currently sitting in the pool.
    pub pooled: usize,
    /// Link records currently in use.
    pub live: usize,
}

/// The dependency/subscriber graph.
#[derive(Debug, Default)]
pub struct LinkGraph {
    links: Vec<Link>,
    pool: Vec<LinkId>,
    deps: Arena<DepNode>,
    subs: Arena<SubNode>,
    allocated: usize,
}

impl LinkGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    pub fn add_dep(&mut self) -> DepId {
        DepId(self.deps.insert(DepNode::default()))
    }

    /// Remove a dependency node.
    ///
    /// Its links stay in their subscribers' chains with `dep` cleared; they
    /// are pruned on the subscriber's next run or stop.
    pub fn remove_dep(&mut self, dep: DepId) {
        let Some(node) = self.deps.remove(dep.0) else {
            return;
        };

        let mut current = node.subs;
        while let Some(id) = current {
            let link = &mut self.links[id.index()];
            current = link.next_sub;
            link.dep = None;
            link.prev_sub = None;
            link.next_sub = None;
        }
    }

    pub fn add_sub(&mut self) -> SubId {
        SubId(self.subs.insert(SubNode::default()))
    }

    /// Detach every edge of a subscriber and remove its node.
    pub fn remove_sub(&mut self, sub: SubId) {
        self.detach_all(sub);
        self.subs.remove(sub.0);
    }

    pub fn contains_dep(&self, dep: DepId) -> bool {
        self.deps.contains(dep.0)
    }

    pub fn contains_sub(&self, sub: SubId) -> bool {
        self.subs.contains(sub.0)
    }

    /// Current version of a dependency.
    pub fn dep_version(&self, dep: DepId) -> Option<u64> {
        self.deps.get(dep.0).map(|node| node.version)
    }

    /// Record that a dependency's value changed.
    pub fn bump_version(&mut self, dep: DepId) {
        if let Some(node) = self.deps.get_mut(dep.0) {
            node.version = node.version.wrapping_add(1);
        }
    }

    /// Whether the subscriber's function body is currently executing.
    pub fn is_tracking(&self, sub: SubId) -> bool {
        self.subs.get(sub.0).is_some_and(|node| node.tracking)
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Begin a run of `sub`: rewind its dependency chain.
    pub fn start_track(&mut self, sub: SubId) {
        if let Some(node) = self.subs.get_mut(sub.0) {
            node.tracking = true;
            node.spliced = false;
            node.deps_tail = None;
        }
    }

    /// Finish a run of `sub`, pruning edges the run did not confirm.
    ///
    /// Returns the number of links returned to the pool.
    pub fn end_track(&mut self, sub: SubId) -> usize {
        let Some(node) = self.subs.get_mut(sub.0) else {
            return 0;
        };
        node.tracking = false;

        let stale = match node.deps_tail {
            Some(tail) => self.links[tail.index()].next_dep.take(),
            None => node.deps.take(),
        };

        let pruned = self.free_chain(stale);
        if pruned > 0 {
            trace!(?sub, pruned, "pruned stale links");
        }
        pruned
    }

    /// Drop every edge of `sub` without running it.
    pub fn detach_all(&mut self, sub: SubId) -> usize {
        self.start_track(sub);
        self.end_track(sub)
    }

    /// Ensure an edge between `dep` and `sub` for the current run of `sub`.
    pub fn link(&mut self, dep: DepId, sub: SubId) {
        let Some(version) = self.dep_version(dep) else {
            return;
        };
        let Some(sub_node) = self.subs.get(sub.0) else {
            return;
        };

        let tail = sub_node.deps_tail;
        let spliced = sub_node.spliced;
        let candidate = match tail {
            Some(tail) => self.links[tail.index()].next_dep,
            None => sub_node.deps,
        };

        // Repeated read of the dependency just linked.
        if tail.is_some_and(|tail| self.links[tail.index()].dep == Some(dep)) {
            return;
        }

        // Same read order as last run: step over the existing edge. Once the
        // run has spliced in a new link, the same dependency may already sit
        // in the confirmed prefix.
        let candidate_matches =
            candidate.is_some_and(|next| self.links[next.index()].dep == Some(dep));
        if candidate_matches && !spliced {
            if let Some(next) = candidate {
                self.confirm(sub, next, version);
            }
            return;
        }

        // Repeated read within this run.
        if self.confirmed_contains(sub, dep) {
            return;
        }
        if candidate_matches {
            if let Some(next) = candidate {
                self.confirm(sub, next, version);
            }
            return;
        }

        let dep_tail = self.deps.get(dep.0).and_then(|node| node.subs_tail);
        let id = self.alloc(Link {
            sub: Some(sub),
            dep: Some(dep),
            prev_sub: dep_tail,
            next_sub: None,
            next_dep: candidate,
            version,
        });

        // Append to the dependency's subscriber chain
        match dep_tail {
            Some(prev) => self.links[prev.index()].next_sub = Some(id),
            None => {
                if let Some(node) = self.deps.get_mut(dep.0) {
                    node.subs = Some(id);
                }
            }
        }
        if let Some(node) = self.deps.get_mut(dep.0) {
            node.subs_tail = Some(id);
        }

        // Splice after the subscriber's confirmed tail
        match tail {
            Some(prev) => self.links[prev.index()].next_dep = Some(id),
            None => {
                if let Some(node) = self.subs.get_mut(sub.0) {
                    node.deps = Some(id);
                }
            }
        }
        if let Some(node) = self.subs.get_mut(sub.0) {
            node.deps_tail = Some(id);
            node.spliced = true;
        }
    }

    /// Advance `sub`'s confirmed tail onto an existing link.
    fn confirm(&mut self, sub: SubId, link: LinkId, version: u64) {
        self.links[link.index()].version = version;
        if let Some(node) = self.subs.get_mut(sub.0) {
            node.deps_tail = Some(link);
        }
    }

    /// Whether `dep` is already in the confirmed prefix of `sub`'s chain.
    fn confirmed_contains(&self, sub: SubId, dep: DepId) -> bool {
        let Some(node) = self.subs.get(sub.0) else {
            return false;
        };
        let Some(tail) = node.deps_tail else {
            return false;
        };

        let mut current = node.deps;
        while let Some(id) = current {
            let link = &self.links[id.index()];
            if link.dep == Some(dep) {
                return true;
            }
            if id == tail {
                break;
            }
            current = link.next_dep;
        }
        false
    }

    // ------------------------------------------------------------------
    // Propagation support
    // ------------------------------------------------------------------

    /// Subscribers of `dep` that are not mid-run.
    ///
    /// Collection is kept apart from notification so that side effects of
    /// notifying one subscriber cannot disturb the walk.
    pub fn collect_subscribers(&self, dep: DepId) -> SmallVec<[SubId; 8]> {
        let mut worklist = SmallVec::new();
        let mut current = self.deps.get(dep.0).and_then(|node| node.subs);

        while let Some(id) = current {
            let link = &self.links[id.index()];
            if let Some(sub) = link.sub {
                if !self.is_tracking(sub) {
                    worklist.push(sub);
                }
            }
            current = link.next_sub;
        }
        worklist
    }

    /// Each dependency of `sub` paired with the version its edge observed.
    pub fn observed_versions(&self, sub: SubId) -> SmallVec<[(DepId, u64); 8]> {
        let mut observed = SmallVec::new();
        let mut current = self.subs.get(sub.0).and_then(|node| node.deps);

        while let Some(id) = current {
            let link = &self.links[id.index()];
            if let Some(dep) = link.dep {
                observed.push((dep, link.version));
            }
            current = link.next_dep;
        }
        observed
    }

    /// Dependencies of `sub` in read order.
    pub fn dependencies_of(&self, sub: SubId) -> Vec<DepId> {
        self.observed_versions(sub)
            .into_iter()
            .map(|(dep, _)| dep)
            .collect()
    }

    /// Subscribers of `dep` in subscription order.
    pub fn subscribers_of(&self, dep: DepId) -> Vec<SubId> {
        let mut subs = Vec::new();
        let mut current = self.deps.get(dep.0).and_then(|node| node.subs);

        while let Some(id) = current {
            let link = &self.links[id.index()];
            subs.extend(link.sub);
            current = link.next_sub;
        }
        subs
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            allocated: self.allocated,
            pooled: self.pool.len(),
            live: self.links.len() - self.pool.len(),
        }
    }

    // ------------------------------------------------------------------
    // Link storage
    // ------------------------------------------------------------------

    fn alloc(&mut self, link: Link) -> LinkId {
        if let Some(id) = self.pool.pop() {
            trace!(link = id.index(), "reusing pooled link");
            self.links[id.index()] = link;
            return id;
        }

        let id = LinkId::new(self.links.len());
        self.links.push(link);
        self.allocated += 1;
        trace!(link = id.index(), "allocated link");
        id
    }

    /// Unlink every link from `head` onward and return them to the pool.
    fn free_chain(&mut self, head: Option<LinkId>) -> usize {
        let mut freed = 0;
        let mut current = head;

        while let Some(id) = current {
            current = self.links[id.index()].next_dep;
            self.unlink_from_dep(id);
            self.links[id.index()] = Link::vacant();
            self.pool.push(id);
            freed += 1;
        }
        freed
    }

    /// Remove a link from its dependency's subscriber chain.
    fn unlink_from_dep(&mut self, id: LinkId) {
        let (dep, prev, next) = {
            let link = &self.links[id.index()];
            (link.dep, link.prev_sub, link.next_sub)
        };
        let Some(dep) = dep else {
            return;
        };

        match prev {
            Some(prev) => self.links[prev.index()].next_sub = next,
            None => {
                if let Some(node) = self.deps.get_mut(dep.0) {
                    node.subs = next;
                }
            }
        }
        match next {
            Some(next) => self.links[next.index()].prev_sub = prev,
            None => {
                if let Some(node) = self.deps.get_mut(dep.0) {
                    node.subs_tail = prev;
                }
            }
        }
    }
}
