//! Reactive Primitives
//!
//! This module implements the reactive system on top of the link graph:
//! refs, computeds, effects, reactive containers and watches.
//!
//! # Concepts
//!
//! ## Refs
//!
//! A [`Ref`] is a single mutable value. Reading it inside a tracked
//! computation links the two; writing a different value notifies every
//! linked computation.
//!
//! ## Computeds
//!
//! A [`Computed`] is a cached derived value. It is marked stale when an
//! input changes and recomputes on the next read.
//!
//! ## Effects
//!
//! An [`Effect`] re-runs whenever something it read changes. Effects are
//! how reactive state reaches the outside world.
//!
//! ## Reactive Containers
//!
//! A [`Reactive`] handle gives a map or list of [`Value`]s tracked property
//! access. Nested containers become reactive when read.
//!
//! ## Watches
//!
//! [`watch`] calls back with the new and previous value of a source.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic. While a computation runs, it is the
//! active subscriber in a thread-local register, and every tracked read links
//! the dependency to it. Writes propagate through the graph in batches: an
//! effect affected several times by one batch runs once.

mod computed;
mod context;
pub mod dep;
mod effect;
mod reactive;
mod ref_cell;
mod runtime;
mod subscriber;
mod value;
mod watch;

pub use computed::Computed;
pub use context::{untracked, ReactiveContext};
pub use effect::{Effect, EffectOptions, EffectScheduler};
pub use reactive::{is_reactive, is_ref, reactive, to_raw, unref, Reactive};
pub use ref_cell::Ref;
pub use runtime::{batch, Runtime};
pub use subscriber::{Derived, Subscriber};
pub use value::{Object, ObjectId, PropKey, Value};
pub use watch::{watch, Deep, OnCleanup, Traverse, WatchHandle, WatchOptions, WatchSource};
