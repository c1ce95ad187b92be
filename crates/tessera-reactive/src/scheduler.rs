//! Batching scheduler for effect re-runs
//!
//! Jobs queued during one synchronous task are run together on the next
//! microtask turn. A job that is still waiting to run is not queued again. A
//! job that already ran (or is running) in the current flush is queued again
//! and runs later in the same flush, up to [`RECURSION_LIMIT`] times.

use crate::engine::Job;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tessera_dom::Microtasks;
use tracing::{trace, warn};

/// How often one job may be queued within a single flush
pub const RECURSION_LIMIT: usize = 100;

/// Receives re-run requests from the adapter
pub trait Scheduler {
    fn schedule(&self, job: Job);
}

#[derive(Default)]
struct Inner {
    microtasks: Microtasks,
    queue: RefCell<Vec<Job>>,
    flush_pending: Cell<bool>,
    flushing: Cell<bool>,
    /// Index of the job running (or last run) in the current flush
    last_flushed: Cell<Option<usize>>,
}

/// Coalesces jobs and runs them once per microtask turn
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Rc<Inner>,
}

impl BatchScheduler {
    pub fn new(microtasks: &Microtasks) -> Self {
        Self {
            inner: Rc::new(Inner {
                microtasks: microtasks.clone(),
                ..Inner::default()
            }),
        }
    }

    /// Queue a job unless it is already waiting to run
    pub fn queue_job(&self, job: Job) {
        {
            let mut queue = self.inner.queue.borrow_mut();
            let first_waiting = self.first_waiting();
            let waiting = queue[first_waiting.min(queue.len())..]
                .iter()
                .any(|queued| Rc::ptr_eq(queued, &job));
            if waiting {
                return;
            }
            let queued = queue.iter().filter(|q| Rc::ptr_eq(q, &job)).count();
            if queued >= RECURSION_LIMIT {
                warn!(
                    limit = RECURSION_LIMIT,
                    "job re-queued itself too often in one flush, dropping it"
                );
                return;
            }
            queue.push(job);
        }
        self.queue_flush();
    }

    /// Drop a job that has not run yet; returns whether it was removed
    pub fn dequeue_job(&self, job: &Job) -> bool {
        let mut queue = self.inner.queue.borrow_mut();
        let first_waiting = self.first_waiting();
        let Some(index) = queue
            .iter()
            .skip(first_waiting)
            .position(|queued| Rc::ptr_eq(queued, job))
        else {
            return false;
        };
        queue.remove(first_waiting + index);
        true
    }

    /// Index of the first job that has not started in the current flush
    fn first_waiting(&self) -> usize {
        self.inner.last_flushed.get().map_or(0, |last| last + 1)
    }

    /// Jobs waiting (or, during a flush, still in this flush's queue)
    pub fn len(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn queue_flush(&self) {
        if self.inner.flushing.get() || self.inner.flush_pending.get() {
            return;
        }
        self.inner.flush_pending.set(true);
        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        self.inner.microtasks.queue(move || {
            if let Some(inner) = weak.upgrade() {
                BatchScheduler { inner }.flush_jobs();
            }
        });
    }

    /// Run every queued job, including ones queued while flushing
    pub fn flush_jobs(&self) {
        let inner = &self.inner;
        inner.flush_pending.set(false);
        inner.flushing.set(true);

        let mut index = 0;
        loop {
            let job = inner.queue.borrow().get(index).cloned();
            let Some(job) = job else { break };
            inner.last_flushed.set(Some(index));
            job();
            index += 1;
        }
        trace!(jobs = index, "flushed scheduled effects");

        inner.queue.borrow_mut().clear();
        inner.last_flushed.set(None);
        inner.flushing.set(false);
    }
}

impl Scheduler for BatchScheduler {
    fn schedule(&self, job: Job) {
        self.queue_job(job);
    }
}

impl fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("queued", &self.len())
            .field("flush_pending", &self.inner.flush_pending.get())
            .field("flushing", &self.inner.flushing.get())
            .finish()
    }
}
