//! Property-keyed dependencies.
//!
//! A two-level map from container identity to property key to dependency
//! node. Entries are created on the first tracked read of a (container, key)
//! pair and released when the container itself is dropped.
//!
//! Each container also has a key-set dependency, read by iteration over a
//! map and notified when a map gains or loses a key. Lists use `length`
//! for the same purpose.

use std::cell::RefCell;
use std::collections::HashMap;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use super::runtime::Runtime;
use super::value::{Object, ObjectId, PropKey};
use crate::graph::DepId;

#[derive(Default)]
struct TargetDeps {
    props: IndexMap<PropKey, DepId>,
    keys: Option<DepId>,
}

thread_local! {
    static TARGETS: RefCell<HashMap<ObjectId, TargetDeps>> = RefCell::new(HashMap::new());
}

/// Link the property `key` of `target` to the active subscriber.
///
/// A no-op when nothing is being tracked.
pub fn track(target: &Object, key: &PropKey) {
    if !Runtime::is_tracking() {
        return;
    }

    let dep = TARGETS.with(|targets| {
        *targets
            .borrow_mut()
            .entry(target.id())
            .or_default()
            .props
            .entry(key.clone())
            .or_insert_with(Runtime::create_dep)
    });
    Runtime::track(dep);
}

/// Link the key set of `target` to the active subscriber.
pub fn track_keys(target: &Object) {
    if !Runtime::is_tracking() {
        return;
    }

    let dep = TARGETS.with(|targets| {
        *targets
            .borrow_mut()
            .entry(target.id())
            .or_default()
            .keys
            .get_or_insert_with(Runtime::create_dep)
    });
    Runtime::track(dep);
}

/// Notify the readers of the key set of `target`.
pub fn trigger_keys(target: &Object) {
    let dep = TARGETS.with(|targets| {
        targets
            .borrow()
            .get(&target.id())
            .and_then(|deps| deps.keys)
    });

    if let Some(dep) = dep {
        trace!(object = target.id().as_u64(), "key set trigger");
        Runtime::trigger(dep);
    }
}

/// Notify the readers of property `key` of `target`.
///
/// Writing `length` on a list also notifies every index at or beyond the
/// new length.
pub fn trigger(target: &Object, key: &PropKey) {
    let deps: SmallVec<[DepId; 4]> = TARGETS.with(|targets| {
        let targets = targets.borrow();
        let Some(keys) = targets.get(&target.id()).map(|deps| &deps.props) else {
            return SmallVec::new();
        };

        if key.is_length() && target.is_list() {
            let length = target.len();
            keys.iter()
                .filter(|(candidate, _)| {
                    candidate.is_length() || candidate.as_index().is_some_and(|i| i >= length)
                })
                .map(|(_, dep)| *dep)
                .collect()
        } else {
            keys.get(key).copied().into_iter().collect()
        }
    });

    if deps.is_empty() {
        return;
    }
    trace!(object = target.id().as_u64(), %key, deps = deps.len(), "property trigger");

    Runtime::batch(|| {
        for dep in deps {
            Runtime::trigger(dep);
        }
    });
}

/// The dependency node of a property, if it has ever been tracked.
pub fn dep_for(target: &Object, key: &PropKey) -> Option<DepId> {
    TARGETS.with(|targets| {
        targets
            .borrow()
            .get(&target.id())
            .and_then(|deps| deps.props.get(key).copied())
    })
}

/// Release every dependency of a dropped container.
pub(crate) fn forget_target(id: ObjectId) {
    let removed = TARGETS
        .try_with(|targets| {
            targets
                .try_borrow_mut()
                .ok()
                .and_then(|mut targets| targets.remove(&id))
        })
        .ok()
        .flatten();

    if let Some(deps) = removed {
        for dep in deps.props.into_values().chain(deps.keys) {
            Runtime::dispose_dep(dep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn track_without_subscriber_creates_nothing() {
        let target = Object::map();
        let key = PropKey::from("a");

        track(&target, &key);
        assert_eq!(dep_for(&target, &key), None);
    }

    #[test]
    fn trigger_unobserved_key_is_noop() {
        let target = Object::map();
        trigger(&target, &PropKey::from("a"));
        assert_eq!(Runtime::pending_count(), 0);
    }

    #[test]
    fn trigger_notifies_property_readers() {
        let target = Object::map();
        let runs = Rc::new(Cell::new(0));

        let _effect = {
            let target = target.clone();
            let runs = runs.clone();
            Effect::new(move || {
                track(&target, &PropKey::from("a"));
                runs.set(runs.get() + 1);
            })
        };

        trigger(&target, &PropKey::from("b"));
        assert_eq!(runs.get(), 1);

        trigger(&target, &PropKey::from("a"));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn key_set_readers_are_notified() {
        let target = Object::map();
        let runs = Rc::new(Cell::new(0));

        let _effect = {
            let target = target.clone();
            let runs = runs.clone();
            Effect::new(move || {
                track_keys(&target);
                runs.set(runs.get() + 1);
            })
        };

        trigger(&target, &PropKey::from("a"));
        assert_eq!(runs.get(), 1);

        trigger_keys(&target);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn dropping_target_releases_deps() {
        let target = Object::map();
        let key = PropKey::from("a");

        let effect = {
            let target = target.clone();
            let key = key.clone();
            Effect::new(move || track(&target, &key))
        };
        let dep = dep_for(&target, &key).unwrap();
        drop(effect);
        drop(target);

        assert!(!Runtime::with_graph(|graph| graph.contains_dep(dep)));
    }
}
