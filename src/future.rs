use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::{Promise, Value};

/// A `Promise` can be awaited from async code. Any number of clones may be
/// awaited at once; each sees `Ok(value)` or `Err(error)`.
///
/// Awaiting does not drive the promise's scheduler. Whatever settles the
/// promise, a scheduler loop or a capability on another thread, has to run
/// independently.
///
/// # Examples
///
/// ```
/// use promise_aplus::{MicrotaskQueue, Promise, Value};
/// use futures::executor::block_on;
/// use std::thread;
///
/// let queue = MicrotaskQueue::new();
/// let deferred = Promise::deferred(&queue.handle());
/// let (promise, resolver) = (deferred.promise, deferred.resolver);
/// let task1 = thread::spawn(move || block_on(async {
///     println!("Received {:?}", promise.await);
/// }));
/// resolver.resolve("Hi");
/// task1.join().expect("The task1 thread has panicked.");
/// ```
impl Future for Promise {
    type Output = Result<Value, Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.shared.poll_outcome(cx.waker()) {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{MicrotaskQueue, Promise, Value};
    use futures::executor::block_on;
    use std::thread;

    #[test]
    fn test_promise_resolve() {
        let queue = MicrotaskQueue::new();
        let deferred = Promise::deferred(&queue.handle());
        let (op, op_a) = (deferred.resolver, deferred.promise);
        let task1 = thread::spawn(move || block_on(op_a));
        let task2 = thread::spawn(move || op.resolve(String::from("🍓")));
        task2.join().expect("The task2 thread has panicked");
        let received = task1.join().expect("The task1 thread has panicked");
        assert_eq!(received, Ok(Value::from("🍓")));
    }

    #[test]
    fn test_two_consumers_resolve() {
        let queue = MicrotaskQueue::new();
        let deferred = Promise::deferred(&queue.handle());
        let (op_a, op_b) = (deferred.promise.clone(), deferred.promise);
        let task1 = thread::spawn(move || block_on(op_a));
        let task2 = thread::spawn(move || block_on(op_b));
        let resolver = deferred.resolver;
        let task3 = thread::spawn(move || resolver.resolve("🍓"));
        task3.join().expect("The task3 thread has panicked");
        assert_eq!(task1.join().expect("The task1 thread has panicked"), Ok(Value::from("🍓")));
        assert_eq!(task2.join().expect("The task2 thread has panicked"), Ok(Value::from("🍓")));
    }

    #[test]
    fn test_promise_reject() {
        let queue = MicrotaskQueue::new();
        let deferred = Promise::deferred(&queue.handle());
        let rejecter = deferred.rejecter;
        let task1 = thread::spawn(move || rejecter.reject("reject!!"));
        task1.join().expect("The task1 thread has panicked");
        assert_eq!(block_on(deferred.promise), Err(Value::from("reject!!")));
    }

    #[test]
    fn test_await_chained_promise() {
        let queue = MicrotaskQueue::new();
        let chained = Promise::resolve(&queue.handle(), 1)
            .then(|v| Ok(Value::from(v.as_number().unwrap_or_default() + 1.0)));
        queue.run_until_idle();
        assert_eq!(block_on(chained), Ok(Value::from(2)));
    }
}
