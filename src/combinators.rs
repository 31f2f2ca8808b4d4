//! Promises derived from many inputs.
//!
//! Every combinator goes through the public surface only: inputs are wrapped
//! with [`Promise::resolve`] and observed with [`Promise::then_with`].
use std::mem;
use std::sync::{Arc, Mutex};

use crate::lock;
use crate::promise::{Handler, Promise, Resolver};
use crate::scheduler::Handle;
use crate::value::{Settlement, Value};

/// Index-aligned results collected as inputs complete.
struct Tally {
    results: Vec<Value>,
    remaining: usize,
}

impl Tally {
    fn new(len: usize) -> Arc<Mutex<Tally>> {
        Arc::new(Mutex::new(Tally {
            results: vec![Value::Undefined; len],
            remaining: len,
        }))
    }

    /// Stores `value` at `index`; hands back every result once the last one
    /// arrives.
    fn record(tally: &Mutex<Tally>, index: usize, value: Value) -> Option<Vec<Value>> {
        let mut tally = lock(tally);
        tally.results[index] = value;
        tally.remaining -= 1;
        (tally.remaining == 0).then(|| mem::take(&mut tally.results))
    }
}

fn collect<I>(inputs: I) -> Vec<Value>
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    inputs.into_iter().map(Into::into).collect()
}

/// Completes the tally for one input, fulfilling the aggregate when it was
/// the last.
fn finish(
    tally: &Mutex<Tally>,
    index: usize,
    value: Value,
    resolver: &Resolver,
) -> Result<Value, Value> {
    if let Some(results) = Tally::record(tally, index, value) {
        resolver.resolve(results);
    }
    Ok(Value::Undefined)
}

fn observe(handle: &Handle, input: Value, on_fulfilled: Handler, on_rejected: Handler) {
    Promise::resolve(handle, input).then_with(Some(on_fulfilled), Some(on_rejected));
}

impl Promise {
    /// Fulfills with every input's value, in input order, once all have
    /// fulfilled. Rejects with the first rejection.
    ///
    /// Inputs may be promises, thenables or plain values. No inputs fulfill
    /// immediately with an empty list.
    pub fn all<I>(handle: &Handle, inputs: I) -> Promise
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let inputs = collect(inputs);
        Promise::new(handle, |resolver, rejecter| {
            if inputs.is_empty() {
                resolver.resolve(Value::List(Vec::new()));
                return Ok(());
            }
            let tally = Tally::new(inputs.len());
            for (index, input) in inputs.into_iter().enumerate() {
                let tally = Arc::clone(&tally);
                let resolver = resolver.clone();
                let rejecter = rejecter.clone();
                observe(
                    handle,
                    input,
                    Handler::new(move |value| finish(&tally, index, value, &resolver)),
                    Handler::new(move |error| {
                        rejecter.reject(error);
                        Ok(Value::Undefined)
                    }),
                );
            }
            Ok(())
        })
    }

    /// Fulfills with a [`Settlement`] per input, in input order, once every
    /// input has settled. Never rejects.
    pub fn all_settled<I>(handle: &Handle, inputs: I) -> Promise
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let inputs = collect(inputs);
        Promise::new(handle, |resolver, _| {
            if inputs.is_empty() {
                resolver.resolve(Value::List(Vec::new()));
                return Ok(());
            }
            let tally = Tally::new(inputs.len());
            for (index, input) in inputs.into_iter().enumerate() {
                let (fulfilled_tally, rejected_tally) = (Arc::clone(&tally), Arc::clone(&tally));
                let (fulfilled_resolver, rejected_resolver) = (resolver.clone(), resolver.clone());
                observe(
                    handle,
                    input,
                    Handler::new(move |value| {
                        let record = Settlement::Fulfilled(value).into();
                        finish(&fulfilled_tally, index, record, &fulfilled_resolver)
                    }),
                    Handler::new(move |error| {
                        let record = Settlement::Rejected(error).into();
                        finish(&rejected_tally, index, record, &rejected_resolver)
                    }),
                );
            }
            Ok(())
        })
    }

    /// Settles like whichever input settles first. No inputs never settle.
    pub fn race<I>(handle: &Handle, inputs: I) -> Promise
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let inputs = collect(inputs);
        Promise::new(handle, |resolver, rejecter| {
            for input in inputs {
                let (resolver, rejecter) = (resolver.clone(), rejecter.clone());
                observe(
                    handle,
                    input,
                    Handler::new(move |value| {
                        resolver.resolve(value);
                        Ok(Value::Undefined)
                    }),
                    Handler::new(move |error| {
                        rejecter.reject(error);
                        Ok(Value::Undefined)
                    }),
                );
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{MicrotaskQueue, Promise, Settlement, Value};

    #[test]
    fn test_all_keeps_input_order() {
        let queue = MicrotaskQueue::new();
        let handle = queue.handle();
        let slow = Promise::deferred(&handle);
        let fast = Promise::deferred(&handle);
        let all = Promise::all(
            &handle,
            vec![Value::from(slow.promise.clone()), fast.promise.clone().into(), 3.into()],
        );

        fast.resolver.resolve("fast");
        queue.run_until_idle();
        assert!(all.is_pending());

        slow.resolver.resolve("slow");
        queue.run_until_idle();
        assert_eq!(
            all.state().value(),
            Some(&Value::List(vec!["slow".into(), "fast".into(), 3.into()]))
        );
    }

    #[test]
    fn test_all_rejects_without_waiting() {
        let queue = MicrotaskQueue::new();
        let handle = queue.handle();
        let never = Promise::deferred(&handle);
        let all = Promise::all(
            &handle,
            vec![
                Value::from(Promise::resolve(&handle, 1)),
                Promise::reject(&handle, "e").into(),
                never.promise.into(),
            ],
        );
        queue.run_until_idle();
        assert_eq!(all.state().reason(), Some(&Value::from("e")));
    }

    #[test]
    fn test_empty_inputs() {
        let queue = MicrotaskQueue::new();
        let handle = queue.handle();
        let all = Promise::all(&handle, Vec::<Value>::new());
        let settled = Promise::all_settled(&handle, Vec::<Value>::new());
        let race = Promise::race(&handle, Vec::<Value>::new());
        assert_eq!(all.state().value(), Some(&Value::List(vec![])));
        assert_eq!(settled.state().value(), Some(&Value::List(vec![])));
        queue.run_until_idle();
        assert!(race.is_pending());
    }

    #[test]
    fn test_all_settled_records_every_outcome() {
        let queue = MicrotaskQueue::new();
        let handle = queue.handle();
        let settled = Promise::all_settled(
            &handle,
            vec![
                Value::from(Promise::resolve(&handle, 1)),
                Promise::reject(&handle, "e").into(),
                Promise::resolve(&handle, 3).into(),
            ],
        );
        queue.run_until_idle();
        assert_eq!(
            settled.state().value(),
            Some(&Value::List(vec![
                Settlement::Fulfilled(1.into()).into(),
                Settlement::Rejected("e".into()).into(),
                Settlement::Fulfilled(3.into()).into(),
            ]))
        );
    }

    #[test]
    fn test_race_takes_first_settlement() {
        let queue = MicrotaskQueue::new();
        let handle = queue.handle();
        let slow = Promise::deferred(&handle);
        let race = Promise::race(
            &handle,
            vec![Value::from(slow.promise.clone()), Promise::resolve(&handle, "fast").into()],
        );
        queue.run_until_idle();
        slow.rejecter.reject("slow");
        queue.run_until_idle();
        assert_eq!(race.state().value(), Some(&Value::from("fast")));
    }

    #[test]
    fn test_plain_values_are_wrapped() {
        let queue = MicrotaskQueue::new();
        let all = Promise::all(&queue.handle(), [1, 2]);
        queue.run_until_idle();
        assert_eq!(all.state().value(), Some(&Value::List(vec![1.into(), 2.into()])));
    }
}
