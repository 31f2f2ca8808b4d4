//! A channel scheduler uses a multi-producer, single-consumer channel as its
//! backend. Promises may be settled from any thread holding a [`TaskSender`];
//! the reactions all run on whichever thread drives the [`TaskLoop`].
//!
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use tracing::debug;

use crate::scheduler::{Handle, Scheduler, Task};

#[derive(Debug, Clone)]
pub struct TaskSender {
    sender: Sender<Task>,
}

#[derive(Debug)]
pub struct TaskLoop {
    receiver: Receiver<Task>,
}

/// Creates a connected sender and loop.
///
/// # Examples
///
/// ```
/// use promise_aplus::{channel, Promise, Value};
/// use std::thread;
///
/// let (sender, tasks) = channel::channel();
/// let deferred = Promise::deferred(&sender.handle());
/// let echoed = deferred.promise.then(Ok);
///
/// let resolver = deferred.resolver;
/// thread::spawn(move || resolver.resolve("🍓")).join().unwrap();
///
/// tasks.run_until_idle();
/// assert_eq!(echoed.state().value(), Some(&Value::from("🍓")));
/// ```
pub fn channel() -> (TaskSender, TaskLoop) {
    let (sender, receiver) = mpsc::channel();
    (TaskSender { sender }, TaskLoop { receiver })
}

impl TaskSender {
    pub fn handle(&self) -> Handle {
        Handle::new(self.clone())
    }
}

impl Scheduler for TaskSender {
    fn schedule(&self, task: Task) {
        if self.sender.send(task).is_err() {
            debug!("task loop dropped; discarding task");
        }
    }
}

impl TaskLoop {
    /// Blocks until a task arrives and runs it. Returns `false` once every
    /// sender is gone and the channel is drained.
    pub fn run_next(&self) -> bool {
        match self.receiver.recv() {
            Ok(task) => {
                task();
                true
            }
            Err(_) => false,
        }
    }

    /// Runs every task already queued, and any they queue, without blocking.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(task) => {
                    task();
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return ran,
            }
        }
    }
}
