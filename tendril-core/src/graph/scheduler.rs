//! Job Scheduler
//!
//! Deferred, synchronous re-execution. Effects created with
//! [`EffectScheduler::Queued`](crate::reactive::EffectScheduler) do not re-run
//! when notified; they put a job here instead. The host drains the queue at
//! its own tick boundary with [`flush_jobs`].
//!
//! # Algorithm
//!
//! 1. `queue_job` inserts into a pending set keyed by subscriber. A second
//!    notification of the same subscriber before the flush is a no-op, so
//!    the subscriber runs exactly once, against the latest state.
//! 2. `flush_jobs` pops jobs in insertion order. Jobs queued while flushing
//!    join the same flush.
//! 3. Once the job set is empty, `next_tick` callbacks run. If they queue
//!    more jobs, the loop continues.

use std::cell::RefCell;

use indexmap::IndexMap;
use tracing::debug;

use super::node::SubId;

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce()>;

/// Pending jobs and post-flush callbacks.
#[derive(Default)]
pub struct JobQueue {
    jobs: IndexMap<SubId, Job>,
    post_flush: Vec<Job>,
    flushing: bool,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a job for `id`. Returns false if one is already pending.
    pub fn push(&mut self, id: SubId, job: Job) -> bool {
        if self.jobs.contains_key(&id) {
            return false;
        }
        self.jobs.insert(id, job);
        true
    }

    /// Drop the pending job for `id`, if any.
    pub fn cancel(&mut self, id: SubId) -> bool {
        self.jobs.shift_remove(&id).is_some()
    }

    fn pop(&mut self) -> Option<Job> {
        self.jobs.shift_remove_index(0).map(|(_, job)| job)
    }

    pub fn is_pending(&self, id: SubId) -> bool {
        self.jobs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.post_flush.is_empty()
    }
}

thread_local! {
    static QUEUE: RefCell<JobQueue> = RefCell::new(JobQueue::new());
}

/// Queue `job` under the identity of subscriber `id`.
///
/// Returns false if a job for `id` is already pending.
pub fn queue_job(id: SubId, job: impl FnOnce() + 'static) -> bool {
    QUEUE.with(|queue| queue.borrow_mut().push(id, Box::new(job)))
}

/// Remove a pending job, e.g. because its subscriber stopped.
pub fn cancel_job(id: SubId) -> bool {
    QUEUE
        .try_with(|queue| queue.borrow_mut().cancel(id))
        .unwrap_or(false)
}

/// Run `callback` after the pending jobs have been flushed.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    QUEUE.with(|queue| queue.borrow_mut().post_flush.push(Box::new(callback)));
}

/// Whether any job or post-flush callback is waiting.
pub fn has_pending_jobs() -> bool {
    QUEUE.with(|queue| !queue.borrow().is_empty())
}

/// Whether a job for `id` is waiting.
pub fn is_job_pending(id: SubId) -> bool {
    QUEUE.with(|queue| queue.borrow().is_pending(id))
}

/// Resets the flushing flag even if a job panics.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = QUEUE.try_with(|queue| queue.borrow_mut().flushing = false);
    }
}

/// Run every pending job, then every post-flush callback.
///
/// Returns the number of jobs run. A nested call from inside a job returns
/// 0 immediately; the outer flush picks up anything queued meanwhile.
pub fn flush_jobs() -> usize {
    let already_flushing = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        std::mem::replace(&mut queue.flushing, true)
    });
    if already_flushing {
        return 0;
    }
    let _guard = FlushGuard;

    let mut ran = 0;
    loop {
        // Pop under a short borrow: jobs may queue more jobs.
        while let Some(job) = QUEUE.with(|queue| queue.borrow_mut().pop()) {
            job();
            ran += 1;
        }

        let callbacks = QUEUE.with(|queue| std::mem::take(&mut queue.borrow_mut().post_flush));
        if callbacks.is_empty() {
            break;
        }
        for callback in callbacks {
            callback();
        }
    }

    if ran > 0 {
        debug!(jobs = ran, "flushed job queue");
    }
    ran
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LinkGraph;
    use std::rc::Rc;
    use std::cell::Cell;

    fn ids(count: usize) -> Vec<SubId> {
        let mut graph = LinkGraph::new();
        (0..count).map(|_| graph.add_sub()).collect()
    }

    #[test]
    fn job_queued_twice_runs_once() {
        let id = ids(1)[0];
        let runs = Rc::new(Cell::new(0));

        for _ in 0..3 {
            let runs = runs.clone();
            queue_job(id, move || runs.set(runs.get() + 1));
        }

        assert!(is_job_pending(id));
        assert_eq!(flush_jobs(), 1);
        assert_eq!(runs.get(), 1);
        assert!(!has_pending_jobs());
    }

    #[test]
    fn jobs_run_in_queue_order() {
        let ids = ids(3);
        let order = Rc::new(RefCell::new(Vec::new()));

        for (n, &id) in ids.iter().enumerate().rev() {
            let order = order.clone();
            queue_job(id, move || order.borrow_mut().push(n));
        }

        flush_jobs();
        assert_eq!(*order.borrow(), vec![2, 1, 0]);
    }

    #[test]
    fn next_tick_runs_after_jobs() {
        let id = ids(1)[0];
        let log = Rc::new(RefCell::new(Vec::new()));

        {
            let log = log.clone();
            next_tick(move || log.borrow_mut().push("tick"));
        }
        {
            let log = log.clone();
            queue_job(id, move || log.borrow_mut().push("job"));
        }

        flush_jobs();
        assert_eq!(*log.borrow(), vec!["job", "tick"]);
    }

    #[test]
    fn jobs_queued_during_flush_join_it() {
        let ids = ids(2);
        let second = ids[1];
        let runs = Rc::new(Cell::new(0));

        {
            let runs = runs.clone();
            queue_job(ids[0], move || {
                runs.set(runs.get() + 1);
                let runs = runs.clone();
                queue_job(second, move || runs.set(runs.get() + 1));
            });
        }

        assert_eq!(flush_jobs(), 2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn cancelled_job_does_not_run() {
        let id = ids(1)[0];
        let ran = Rc::new(Cell::new(false));
        {
            let ran = ran.clone();
            queue_job(id, move || ran.set(true));
        }

        assert!(cancel_job(id));
        assert_eq!(flush_jobs(), 0);
        assert!(!ran.get());
    }
}
