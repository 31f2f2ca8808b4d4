//! The promise state machine and reaction registration.
//!
//! A [`Promise`] is shared state behind an `Arc<Mutex<_>>`. The two settlement
//! capabilities, [`Resolver`] and [`Rejecter`], hold their own reference to
//! that state so they can be passed around, cloned and sent to other threads
//! independently of the promise they settle.
use std::fmt::{self, Debug};
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::Waker;

use tracing::{debug, trace};

use crate::lock;
use crate::resolution::resolve_with;
use crate::scheduler::Handle;
use crate::value::Value;

/// Where a promise is in its lifecycle. Once it leaves `Pending` it never
/// changes again.
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

impl State {
    pub fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }

    /// The fulfillment value, if fulfilled.
    pub fn value(&self) -> Option<&Value> {
        match self {
            State::Fulfilled(value) => Some(value),
            _ => None,
        }
    }

    /// The rejection reason, if rejected.
    pub fn reason(&self) -> Option<&Value> {
        match self {
            State::Rejected(reason) => Some(reason),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            State::Pending => "pending",
            State::Fulfilled(_) => "fulfilled",
            State::Rejected(_) => "rejected",
        }
    }
}

type Reaction = Box<dyn FnOnce(Value) + Send>;

struct Inner {
    state: State,
    // Only non-empty while pending. Emptied by the settling call.
    fulfill_reactions: Vec<Reaction>,
    reject_reactions: Vec<Reaction>,
    wakers: Vec<Waker>,
}

pub(crate) struct Shared {
    handle: Handle,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    /// Moves out of `Pending`, or does nothing if already settled. The guard,
    /// the transition and the scheduling of drained reactions happen under
    /// one lock, so concurrent settlement attempts settle exactly once and a
    /// `then` racing in from another thread is scheduled after them.
    fn settle(&self, outcome: Result<Value, Value>) {
        let mut guard = self.lock();
        if !guard.state.is_pending() {
            trace!(state = guard.state.name(), "promise already settled; ignoring");
            return;
        }
        let inner = &mut *guard;
        let fulfill_reactions = mem::take(&mut inner.fulfill_reactions);
        let reject_reactions = mem::take(&mut inner.reject_reactions);
        let (reactions, value) = match outcome {
            Ok(value) => {
                inner.state = State::Fulfilled(value.clone());
                (fulfill_reactions, value)
            }
            Err(error) => {
                inner.state = State::Rejected(error.clone());
                (reject_reactions, error)
            }
        };
        let wakers = mem::take(&mut inner.wakers);
        debug!(
            state = inner.state.name(),
            reactions = reactions.len(),
            "promise settled"
        );
        for reaction in reactions {
            self.dispatch(reaction, value.clone());
        }
        drop(guard);

        for waker in wakers {
            waker.wake();
        }
    }

    fn subscribe(&self, on_fulfilled: Reaction, on_rejected: Reaction) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let (reaction, value) = match &inner.state {
            State::Pending => {
                inner.fulfill_reactions.push(on_fulfilled);
                inner.reject_reactions.push(on_rejected);
                return;
            }
            State::Fulfilled(value) => (on_fulfilled, value.clone()),
            State::Rejected(error) => (on_rejected, error.clone()),
        };
        self.dispatch(reaction, value);
    }

    /// Called with the lock held. Schedulers only enqueue, never run.
    fn dispatch(&self, reaction: Reaction, value: Value) {
        trace!("scheduling reaction");
        self.handle.schedule(Box::new(move || reaction(value)));
    }

    /// The outcome if settled; otherwise remembers `waker` for settlement.
    pub(crate) fn poll_outcome(&self, waker: &Waker) -> Option<Result<Value, Value>> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match &inner.state {
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(error) => Some(Err(error.clone())),
            State::Pending => {
                if !inner.wakers.iter().any(|w| w.will_wake(waker)) {
                    inner.wakers.push(waker.clone());
                }
                None
            }
        }
    }
}

/// A value that settles exactly once.
///
/// Cloning a `Promise` yields another reference to the same state.
#[derive(Clone)]
pub struct Promise {
    pub(crate) shared: Arc<Shared>,
}

/// Fulfills the promise it was created with. Calls after the promise has
/// settled, through either capability, are ignored.
#[derive(Clone)]
pub struct Resolver {
    shared: Arc<Shared>,
}

/// Rejects the promise it was created with. Calls after the promise has
/// settled, through either capability, are ignored.
#[derive(Clone)]
pub struct Rejecter {
    shared: Arc<Shared>,
}

impl Resolver {
    /// Fulfills with `value` as given. Thenables are stored, not adopted.
    ///
    /// Resolving a promise with a clone of itself makes its state own a
    /// reference to itself, so it is never freed.
    pub fn resolve(&self, value: impl Into<Value>) {
        self.shared.settle(Ok(value.into()))
    }
}

impl Rejecter {
    pub fn reject(&self, error: impl Into<Value>) {
        self.shared.settle(Err(error.into()))
    }
}

/// A promise together with its settlement capabilities, for code that settles
/// from outside an initializer.
#[derive(Debug, Clone)]
pub struct Deferred {
    pub promise: Promise,
    pub resolver: Resolver,
    pub rejecter: Rejecter,
}

/// A reaction callback. Returning `Err` is how a reaction raises.
pub struct Handler(Box<dyn FnOnce(Value) -> Result<Value, Value> + Send>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Value) -> Result<Value, Value> + Send + 'static,
    {
        Handler(Box::new(f))
    }

    fn identity() -> Self {
        Handler::new(Ok)
    }

    fn rethrow() -> Self {
        Handler::new(Err)
    }

    fn call(self, value: Value) -> Result<Value, Value> {
        (self.0)(value)
    }
}

impl Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

impl Promise {
    /// A pending promise plus the capabilities that settle it.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_aplus::{MicrotaskQueue, Promise, Value};
    ///
    /// let queue = MicrotaskQueue::new();
    /// let deferred = Promise::deferred(&queue.handle());
    /// deferred.resolver.resolve(1);
    /// deferred.resolver.resolve(2);
    /// deferred.rejecter.reject("too late");
    /// assert_eq!(deferred.promise.state().value(), Some(&Value::from(1)));
    /// ```
    pub fn deferred(handle: &Handle) -> Deferred {
        let shared = Arc::new(Shared {
            handle: handle.clone(),
            inner: Mutex::new(Inner {
                state: State::Pending,
                fulfill_reactions: Vec::new(),
                reject_reactions: Vec::new(),
                wakers: Vec::new(),
            }),
        });
        Deferred {
            promise: Promise {
                shared: Arc::clone(&shared),
            },
            resolver: Resolver {
                shared: Arc::clone(&shared),
            },
            rejecter: Rejecter { shared },
        }
    }

    /// Creates a promise and runs `initializer` synchronously with its
    /// capabilities. An `Err` from the initializer rejects the promise, unless
    /// the initializer already settled it.
    pub fn new<F>(handle: &Handle, initializer: F) -> Promise
    where
        F: FnOnce(Resolver, Rejecter) -> Result<(), Value>,
    {
        let Deferred {
            promise,
            resolver,
            rejecter,
        } = Promise::deferred(handle);
        if let Err(error) = initializer(resolver, rejecter.clone()) {
            debug!("promise initializer raised");
            rejecter.reject(error);
        }
        promise
    }

    /// `value` itself if it is already a promise; otherwise a promise
    /// fulfilled with it.
    pub fn resolve(handle: &Handle, value: impl Into<Value>) -> Promise {
        match value.into() {
            Value::Promise(promise) => promise,
            value => Promise::new(handle, |resolver, _| {
                resolver.resolve(value);
                Ok(())
            }),
        }
    }

    /// A promise rejected with `error`.
    pub fn reject(handle: &Handle, error: impl Into<Value>) -> Promise {
        Promise::new(handle, |_, rejecter| {
            rejecter.reject(error);
            Ok(())
        })
    }

    /// The scheduler this promise, and everything chained from it, reacts on.
    pub fn handle(&self) -> &Handle {
        &self.shared.handle
    }

    pub fn state(&self) -> State {
        self.shared.lock().state.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.shared.lock().state.is_pending()
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self.shared.lock().state, State::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.shared.lock().state, State::Rejected(_))
    }

    /// Whether both refer to the same promise.
    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Registers reactions and returns the promise they settle.
    ///
    /// The returned promise is created before this call returns; the
    /// reactions run later through the scheduler, even if `self` has already
    /// settled. A missing `on_fulfilled` passes the value through and a
    /// missing `on_rejected` passes the error through. Whatever the reaction
    /// returns goes through thenable resolution, so returning another promise
    /// or a foreign thenable adopts its outcome.
    pub fn then_with(
        &self,
        on_fulfilled: Option<Handler>,
        on_rejected: Option<Handler>,
    ) -> Promise {
        let Deferred {
            promise: next,
            resolver,
            rejecter,
        } = Promise::deferred(&self.shared.handle);
        let on_fulfilled = on_fulfilled.unwrap_or_else(Handler::identity);
        let on_rejected = on_rejected.unwrap_or_else(Handler::rethrow);
        self.shared.subscribe(
            react(on_fulfilled, next.clone(), resolver.clone(), rejecter.clone()),
            react(on_rejected, next.clone(), resolver, rejecter),
        );
        next
    }

    /// Reacts to fulfillment; rejections pass through.
    pub fn then<F>(&self, on_fulfilled: F) -> Promise
    where
        F: FnOnce(Value) -> Result<Value, Value> + Send + 'static,
    {
        self.then_with(Some(Handler::new(on_fulfilled)), None)
    }

    /// Reacts to rejection; fulfillments pass through.
    pub fn catch<F>(&self, on_rejected: F) -> Promise
    where
        F: FnOnce(Value) -> Result<Value, Value> + Send + 'static,
    {
        self.then_with(None, Some(Handler::new(on_rejected)))
    }

    /// Runs `on_finally` once `self` settles either way, then passes the
    /// original outcome through. If `on_finally` raises, the returned promise
    /// rejects with that error instead.
    pub fn finally<F>(&self, on_finally: F) -> Promise
    where
        F: FnOnce() -> Result<(), Value> + Send + 'static,
    {
        let on_finally = Arc::new(Mutex::new(Some(on_finally)));
        let on_fulfilled = {
            let on_finally = Arc::clone(&on_finally);
            Handler::new(move |value| {
                run_once(&on_finally)?;
                Ok(value)
            })
        };
        let on_rejected = Handler::new(move |error| {
            run_once(&on_finally)?;
            Err(error)
        });
        self.then_with(Some(on_fulfilled), Some(on_rejected))
    }
}

fn react(handler: Handler, target: Promise, resolver: Resolver, rejecter: Rejecter) -> Reaction {
    Box::new(move |value| match handler.call(value) {
        Ok(result) => resolve_with(&target, result, resolver, rejecter),
        Err(error) => rejecter.reject(error),
    })
}

fn run_once<F>(slot: &Mutex<Option<F>>) -> Result<(), Value>
where
    F: FnOnce() -> Result<(), Value>,
{
    let on_finally = lock(slot).take();
    on_finally.map_or(Ok(()), |f| f())
}

impl Debug for Promise {
    // Only the state name: a promise may hold itself as its value.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock().state.name();
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

impl Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

impl Debug for Rejecter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejecter").finish_non_exhaustive()
    }
}
