//! Deferred task submission.
//!
//! Promises never run reactions inline. They hand each one to a [`Scheduler`]
//! as a [`Task`] and rely on it to run tasks later, one at a time, in
//! submission order. [`MicrotaskQueue`] is the in-process implementation; see
//! [`crate::channel`] for one that crosses threads.
use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, trace};

use crate::lock;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted tasks after the submitting code returns, in FIFO order.
///
/// Implementations must not run `task` from inside `schedule`; doing so
/// breaks the guarantee that `then` returns before its reactions run.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: Task);
}

/// A cloneable reference to the scheduler promises dispatch through.
#[derive(Clone)]
pub struct Handle {
    scheduler: Arc<dyn Scheduler>,
}

impl Handle {
    pub fn new(scheduler: impl Scheduler + 'static) -> Self {
        Handle {
            scheduler: Arc::new(scheduler),
        }
    }

    pub fn schedule(&self, task: Task) {
        self.scheduler.schedule(task)
    }
}

impl Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").finish_non_exhaustive()
    }
}

/// A FIFO task queue driven by its owner.
///
/// # Examples
///
/// ```
/// use promise_aplus::{MicrotaskQueue, Scheduler};
/// use std::sync::{Arc, Mutex};
///
/// let queue = MicrotaskQueue::new();
/// let log = Arc::new(Mutex::new(Vec::new()));
/// for i in 0..3 {
///     let log = log.clone();
///     queue.schedule(Box::new(move || log.lock().unwrap().push(i)));
/// }
/// assert_eq!(queue.run_until_idle(), 3);
/// assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
/// ```
#[derive(Clone, Default)]
pub struct MicrotaskQueue {
    tasks: Arc<Mutex<VecDeque<Task>>>,
}

impl MicrotaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        MicrotaskQueue {
            tasks: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// A [`Handle`] submitting into this queue.
    ///
    /// The handle holds the queue weakly. Once every `MicrotaskQueue` clone
    /// is dropped, undrained tasks are freed and later submissions are
    /// discarded.
    pub fn handle(&self) -> Handle {
        Handle::new(QueueSender {
            tasks: Arc::downgrade(&self.tasks),
        })
    }

    pub fn len(&self) -> usize {
        lock(&self.tasks).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.tasks).is_empty()
    }

    /// Runs the oldest task, if any. Returns whether a task ran.
    pub fn run_once(&self) -> bool {
        // Released before running: the task may schedule more work.
        let task = lock(&self.tasks).pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is empty, including tasks scheduled by the
    /// tasks it runs. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_once() {
            ran += 1;
        }
        trace!(ran, "microtask queue idle");
        ran
    }
}

impl Scheduler for MicrotaskQueue {
    fn schedule(&self, task: Task) {
        lock(&self.tasks).push_back(task);
    }
}

struct QueueSender {
    tasks: Weak<Mutex<VecDeque<Task>>>,
}

impl Scheduler for QueueSender {
    fn schedule(&self, task: Task) {
        match self.tasks.upgrade() {
            Some(tasks) => {
                lock(&tasks).push_back(task);
            }
            None => debug!("microtask queue dropped; discarding task"),
        }
    }
}

impl Debug for MicrotaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicrotaskQueue")
            .field("len", &self.len())
            .finish()
    }
}
