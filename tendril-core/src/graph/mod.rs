//! Dependency Graph
//!
//! This module implements the link graph that records which subscribers
//! read which dependencies, plus the job queue used for deferred re-runs.
//!
//! # Overview
//!
//! The graph is bipartite:
//!
//! - Dependency nodes are observable units (a property cell, a ref, a computed)
//! - Subscriber nodes are computations (an effect, a computed, a watch)
//! - Each edge is a pooled link record owned jointly by one of each
//!
//! # Design Decisions
//!
//! 1. Dependency and subscriber nodes live in generational arenas, links in
//!    a slab. Everything refers to everything else by index, so the cyclic
//!    dependency/subscriber structure needs no reference counting.
//!
//! 2. A subscriber's dependency chain is reconciled in place on every run
//!    instead of being cleared and rebuilt.
//!
//! 3. Unused links go back on a free stack and are overwritten on reuse.

mod arena;
mod link;
mod node;
pub mod scheduler;

pub use arena::{Arena, Key};
pub use link::{LinkGraph, LinkStats};
pub use node::{DepId, DirtyState, LinkId, SubId};
pub use scheduler::{
    cancel_job, flush_jobs, has_pending_jobs, is_job_pending, next_tick, queue_job, Job,
    JobQueue,
};
