//! Joining several promises into one.
use crate::{
    promise::{resolve, Deferred, Eventual, Promise, Reason, Value},
    scheduler,
};
use std::{cell::RefCell, rc::Rc};

/// Values gathered so far, by input position.
struct Gathered<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

/// Collects every value, in input order.
///
/// Every input is observed at once. The first rejection to arrive rejects the
/// result, even while inputs before it are still pending. Inputs that are
/// already rejected report in input order, so the earliest of them wins.
///
/// # Examples
///
/// ```
/// use eventual::{all, defer, reject, scheduler};
///
/// let never = defer::<i32, String>();
/// let values = all::<i32, String, _>(vec![never.promise.clone(), reject("boom".into())]);
/// scheduler::turns().run_until_idle().unwrap();
/// assert_eq!(values.state().rejected().as_deref(), Some("boom"));
/// ```
pub fn all<T, E, I>(items: I) -> Promise<Vec<T>, E>
where
    T: Value,
    E: Reason,
    I: IntoIterator,
    I::Item: Into<Eventual<T, E>>,
{
    let items: Vec<Promise<T, E>> = items.into_iter().map(|item| resolve(item)).collect();
    let Deferred { promise, resolver } = Deferred::in_scheduler(scheduler::current());
    if items.is_empty() {
        resolver.resolve(Eventual::Value(Vec::new()));
        return promise;
    }

    let gathered = Rc::new(RefCell::new(Gathered {
        values: items.iter().map(|_| None).collect(),
        remaining: items.len(),
    }));
    for (index, item) in items.into_iter().enumerate() {
        let (gathered, resolver) = (gathered.clone(), resolver.clone());
        item.observe(Box::new(move |settled| match settled {
            Ok(value) => {
                let mut gathered = gathered.borrow_mut();
                gathered.values[index] = Some(value);
                gathered.remaining -= 1;
                if gathered.remaining == 0 {
                    let values: Vec<T> =
                        std::mem::take(&mut gathered.values).into_iter().flatten().collect();
                    drop(gathered);
                    resolver.resolve(Eventual::Value(values));
                }
            }
            Err(reason) => resolver.reject(reason),
        }));
    }
    promise
}

/// Settles like whichever input settles first.
///
/// Racing work against a promise that a timer settles is how callers bound
/// the time they wait; the losing input keeps running.
///
/// # Examples
///
/// ```
/// use eventual::{defer, race, scheduler, Error};
///
/// let (work, work_promise) = defer::<i32, Error>().split();
/// let (timer, timer_promise) = defer::<i32, Error>().split();
/// let bounded = race::<i32, Error, _>(vec![work_promise, timer_promise]);
/// timer.reject(Error::Raised("timed out".into()));
/// work.resolve(1);
/// scheduler::turns().run_until_idle().unwrap();
/// assert_eq!(bounded.state().rejected(), Some(Error::Raised("timed out".into())));
/// ```
pub fn race<T, E, I>(items: I) -> Promise<T, E>
where
    T: Value,
    E: Reason,
    I: IntoIterator,
    I::Item: Into<Eventual<T, E>>,
{
    let Deferred { promise, resolver } = Deferred::in_scheduler(scheduler::current());
    for item in items {
        let resolver = resolver.clone();
        resolve(item).observe(Box::new(move |settled| {
            resolver.settle(settled.map(Eventual::Value))
        }));
    }
    promise
}
