//! Promises for single-threaded, turn-based programs.
//!
//! A [`Promise`] is a read-only handle to a value that becomes available, or
//! fails, later. Its [`Resolver`] is the write-once capability that settles
//! it. Observers attached with [`Promise::when`] and friends run in a later
//! turn of a [`Scheduler`], never inside the call that registered them or
//! settled the promise.
//!
//! On top of that core the crate offers:
//!
//! - message dispatch to promise-like objects ([`make_promise`], [`send`]),
//! - ordered and opportunistic folds ([`reduce_left`], [`reduce_right`],
//!   [`reduce`], [`step`]),
//! - resolution of promises nested in containers ([`shallow`], [`deep`]),
//! - an unbounded producer/consumer [`Queue`],
//! - [`all`] and [`race`].
//!
//! # Examples
//!
//! ```
//! use eventual::{defer, scheduler, Eventual};
//!
//! let (resolver, promise) = defer::<i32, String>().split();
//! let answer = promise
//!     .then(|x| Ok(Eventual::Value(x * 2)))
//!     .fail(|reason| Err(format!("while doubling: {reason}")));
//!
//! resolver.resolve(21);
//! assert!(answer.is_pending());
//!
//! scheduler::turns().run_until_idle().unwrap();
//! assert_eq!(answer.state().fulfilled(), Some(42));
//! ```
mod config;
mod dispatch;
mod join;
mod promise;
mod queue;
mod reduce;
pub mod scheduler;
mod structure;

pub use config::Config;
pub use dispatch::{make_promise, send, Descriptor, Fallback, Handler, Inspector, Operator};
pub use join::{all, race};
pub use promise::{
    defer, error, fulfilled, is_promise, is_rejected, is_resolved, reject, resolve, when,
    Deferred, Eventual, Outcome, Promise, PromiseState, Reason, Resolver, Value,
};
pub use queue::Queue;
pub use reduce::{reduce, reduce_left, reduce_right, step, Step};
pub use scheduler::{Scheduler, Task, TurnQueue};
pub use structure::{deep, shallow, Resolved, Structure};

use thiserror::Error;

/// Reasons the crate itself rejects with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("operator not supported: {0}")]
    UnsupportedOperator(String),
    #[error("promise resolved with itself")]
    SelfResolution,
    #[error("queue closed")]
    QueueClosed,
    #[error("turn limit of {0} exceeded")]
    TurnLimit(usize),
    #[error("{0}")]
    Raised(String),
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}
