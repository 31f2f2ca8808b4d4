//! Payloads carried by promises.
//!
//! A promise does not care what it settles with, so values are dynamic. The
//! only shape the resolution procedure inspects is whether a value exposes a
//! callable `then`, which foreign types advertise through [`Object`].
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::{Error, Promise};

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    /// One entry of an `all_settled` result.
    Settled(Box<Settlement>),
    Error(Error),
    Object(Arc<dyn Object>),
    Promise(Promise),
}

/// The recorded outcome of one input to [`Promise::all_settled`].
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Fulfilled(Value),
    Rejected(Value),
}

impl Settlement {
    /// `"fulfilled"` or `"rejected"`.
    pub fn status(&self) -> &'static str {
        match self {
            Settlement::Fulfilled(_) => "fulfilled",
            Settlement::Rejected(_) => "rejected",
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Settlement::Fulfilled(value) => Some(value),
            Settlement::Rejected(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&Value> {
        match self {
            Settlement::Fulfilled(_) => None,
            Settlement::Rejected(reason) => Some(reason),
        }
    }
}

/// A capability handed to a foreign `then` method.
///
/// Cloning shares the underlying function; it may be called any number of
/// times, from any thread.
#[derive(Clone)]
pub struct Callback(Arc<dyn Fn(Value) + Send + Sync>);

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        Callback(Arc::new(f))
    }

    pub fn call(&self, value: impl Into<Value>) {
        (self.0)(value.into())
    }
}

impl Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback")
    }
}

/// A bound `then` member: receives the object it was read from and the
/// resolve/reject callbacks. Returning `Err` means the method raised.
pub type ThenMethod = Box<dyn FnOnce(&Value, Callback, Callback) -> Result<(), Value> + Send>;

/// A value owned by foreign code.
///
/// Objects take part in promise resolution purely by capability: whoever
/// returns `Ok(Some(_))` from [`Object::get_then`] is treated as a thenable,
/// whatever its concrete type.
pub trait Object: Debug + Send + Sync {
    /// Reads the `then` member.
    ///
    /// `Err` models an accessor that raises. `Ok(None)` means the member is
    /// absent or not callable, in which case the object is used as a plain
    /// value.
    fn get_then(&self) -> Result<Option<ThenMethod>, Value> {
        Ok(None)
    }
}

type ThenFn = dyn Fn(Callback, Callback) -> Result<(), Value> + Send + Sync;

/// An [`Object`] whose `then` is the given closure.
///
/// # Examples
///
/// ```
/// use promise_aplus::{MicrotaskQueue, Promise, Thenable, Value};
///
/// let queue = MicrotaskQueue::new();
/// let chained = Promise::resolve(&queue.handle(), ()).then(|_| {
///     Ok(Thenable::new(|resolve, _reject| {
///         resolve.call(5);
///         Ok(())
///     })
///     .into())
/// });
/// queue.run_until_idle();
/// assert_eq!(chained.state().value(), Some(&Value::from(5)));
/// ```
#[derive(Clone)]
pub struct Thenable {
    then: Arc<ThenFn>,
}

impl Thenable {
    pub fn new<F>(then: F) -> Self
    where
        F: Fn(Callback, Callback) -> Result<(), Value> + Send + Sync + 'static,
    {
        Thenable {
            then: Arc::new(then),
        }
    }
}

impl Debug for Thenable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thenable").finish_non_exhaustive()
    }
}

impl Object for Thenable {
    fn get_then(&self) -> Result<Option<ThenMethod>, Value> {
        let then = Arc::clone(&self.then);
        Ok(Some(Box::new(move |_receiver, on_resolve, on_reject| {
            then(on_resolve, on_reject)
        })))
    }
}

impl Value {
    pub fn object(object: impl Object + 'static) -> Self {
        Value::Object(Arc::new(object))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_settled(&self) -> Option<&Settlement> {
        match self {
            Value::Settled(settlement) => Some(settlement),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Value::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&Promise> {
        match self {
            Value::Promise(promise) => Some(promise),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    /// Data compares structurally; objects and promises by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Settled(a), Value::Settled(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
            }
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! number_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

number_from!(i32, i64, u32, u64, usize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Settlement> for Value {
    fn from(settlement: Settlement) -> Self {
        Value::Settled(Box::new(settlement))
    }
}

impl From<Error> for Value {
    fn from(error: Error) -> Self {
        Value::Error(error)
    }
}

impl From<Promise> for Value {
    fn from(promise: Promise) -> Self {
        Value::Promise(promise)
    }
}

impl From<Thenable> for Value {
    fn from(thenable: Thenable) -> Self {
        Value::object(thenable)
    }
}
