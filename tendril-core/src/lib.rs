//! Tendril Core
//!
//! This crate provides a fine-grained reactive dependency-tracking engine.
//! It implements:
//!
//! - Reactive primitives (refs, computeds, effects)
//! - Reactive map and list containers with lazy deep wrapping
//! - Watches with cleanup, `once`, `immediate` and deep traversal
//! - A pooled link graph recording who read what
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Link graph, node arenas and the deferred job queue
//! - `reactive`: Tracking runtime and the primitives built on it
//! - `error`: Error type shared by the fallible operations
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use tendril_core::reactive::{Computed, Effect, Ref};
//!
//! // Create a ref
//! let count = Ref::new(0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     Computed::new(move || count.get() * 2)
//! };
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let _effect = {
//!     let (count, doubled, log) = (count.clone(), doubled.clone(), log.clone());
//!     Effect::new(move || log.borrow_mut().push((count.get(), doubled.get())))
//! };
//!
//! // Update the ref; the effect re-runs once
//! count.set(5);
//! assert_eq!(*log.borrow(), vec![(0, 0), (5, 10)]);
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{ReactiveError, Result};
