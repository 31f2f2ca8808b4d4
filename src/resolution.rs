//! Resolving a promise with whatever a reaction returned.
//!
//! A plain value fulfills the promise. Anything exposing a callable `then`,
//! native promise or foreign [`Object`](crate::Object), is followed instead:
//! the promise takes on that thenable's eventual outcome, unwrapping nested
//! thenables as they come.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::promise::{Handler, Promise, Rejecter, Resolver};
use crate::value::{Callback, ThenMethod, Value};
use crate::Error;

enum Step {
    Fulfill,
    Reject(Value),
    Follow(ThenMethod),
}

pub(crate) fn resolve_with(
    target: &Promise,
    result: Value,
    resolver: Resolver,
    rejecter: Rejecter,
) {
    let step = match &result {
        Value::Promise(promise) if promise.ptr_eq(target) => {
            warn!("promise resolved with itself");
            Step::Reject(Error::ChainingCycle.into())
        }
        Value::Promise(promise) => Step::Follow(native_then(promise.clone())),
        Value::Object(object) => match object.get_then() {
            Ok(Some(then)) => Step::Follow(then),
            Ok(None) => Step::Fulfill,
            Err(error) => {
                debug!("reading then raised");
                Step::Reject(error)
            }
        },
        _ => Step::Fulfill,
    };

    let then = match step {
        Step::Fulfill => return resolver.resolve(result),
        Step::Reject(error) => return rejecter.reject(error),
        Step::Follow(then) => then,
    };

    // Only the first of resolve, reject or a raise from `then` counts.
    let called = Arc::new(AtomicBool::new(false));
    let on_resolve = {
        let called = Arc::clone(&called);
        let target = target.clone();
        let rejecter = rejecter.clone();
        Callback::new(move |value| {
            if !called.swap(true, Ordering::SeqCst) {
                resolve_with(&target, value, resolver.clone(), rejecter.clone());
            }
        })
    };
    let on_reject = {
        let called = Arc::clone(&called);
        let rejecter = rejecter.clone();
        Callback::new(move |error| {
            if !called.swap(true, Ordering::SeqCst) {
                rejecter.reject(error);
            }
        })
    };

    if let Err(error) = then(&result, on_resolve, on_reject) {
        if called.swap(true, Ordering::SeqCst) {
            debug!("then raised after settling; ignoring");
        } else {
            debug!("then raised");
            rejecter.reject(error);
        }
    }
}

/// A native promise's `then`, in the shape foreign ones take.
fn native_then(promise: Promise) -> ThenMethod {
    Box::new(move |_receiver, on_resolve, on_reject| {
        promise.then_with(
            Some(Handler::new(move |value| {
                on_resolve.call(value);
                Ok(Value::Undefined)
            })),
            Some(Handler::new(move |error| {
                on_reject.call(error);
                Ok(Value::Undefined)
            })),
        );
        Ok(())
    })
}
