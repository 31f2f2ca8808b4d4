//! Promise/A+ deferred values.
//!
//! A [`Promise`] settles exactly once, either fulfilled with a [`Value`] or
//! rejected with one. Reactions registered through [`Promise::then`] and
//! friends never run on the caller's stack: they are handed to the
//! [`Scheduler`] the promise was created with.
//!
//! ```
//! use promise_aplus::{MicrotaskQueue, Promise, Value};
//!
//! let queue = MicrotaskQueue::new();
//! let handle = queue.handle();
//!
//! let doubled = Promise::resolve(&handle, 21).then(|v| {
//!     Ok(Value::from(v.as_number().unwrap_or_default() * 2.0))
//! });
//! assert!(doubled.is_pending());
//!
//! queue.run_until_idle();
//! assert_eq!(doubled.state().value(), Some(&Value::from(42)));
//! ```
pub mod channel;
mod combinators;
mod future;
pub mod promise;
mod resolution;
pub mod scheduler;
pub mod value;

use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

pub use promise::{Deferred, Handler, Promise, Rejecter, Resolver, State};
pub use scheduler::{Handle, MicrotaskQueue, Scheduler, Task};
pub use value::{Callback, Object, Settlement, ThenMethod, Thenable, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A promise was resolved with itself.
    #[error("TypeError: chaining cycle detected for promise")]
    ChainingCycle,
    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Message(message.into())
    }
}

/// Locks `mutex`, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
