//! Cooperative microtask queue
//!
//! Everything in tessera runs on one thread. Work that must happen "after the
//! current synchronous task but before the next one" (observer delivery, the
//! pipeline's deferred flush, batched effect re-runs) is pushed here and run
//! when the host calls [`Microtasks::run_until_idle`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

type Task = Box<dyn FnOnce()>;

/// A FIFO of deferred tasks shared by every component of one runtime
#[derive(Clone, Default)]
pub struct Microtasks {
    queue: Rc<RefCell<VecDeque<Task>>>,
}

impl Microtasks {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task to run on the next drain
    pub fn queue(&self, task: impl FnOnce() + 'static) {
        self.queue.borrow_mut().push_back(Box::new(task));
    }

    /// Number of tasks waiting to run
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Run tasks until the queue is empty
    ///
    /// Tasks queued by a running task are run in the same drain, after the
    /// tasks that were already waiting. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            // The borrow must end before the task runs; tasks queue more tasks.
            let next = self.queue.borrow_mut().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }
}

impl fmt::Debug for Microtasks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Microtasks")
            .field("pending", &self.pending())
            .finish()
    }
}
