//! The resolution core: [`Promise`], [`Resolver`] and observation.
//!
//! A promise starts pending and is settled at most once through its
//! [`Resolver`]. Settling with another promise makes it forward to that
//! promise; observers registered on a forwarding promise are handed to the
//! end of the chain, so chains collapse without extra hops.
//!
//! Observers never run inline. Settlement and registration only enqueue work
//! on the [`Scheduler`] the promise captured when it was created.
use crate::{
    dispatch::{Descriptor, Operator},
    scheduler::{self, Scheduler, Task},
    Config, Error,
};
use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

/// Payloads carried by fulfilled promises. Every observer gets its own clone.
pub trait Value: Clone + 'static {}
impl<T: Clone + 'static> Value for T {}

/// Rejection reasons. `From<Error>` lets the core reject with its own reasons,
/// such as an unsupported operator.
pub trait Reason: Clone + From<Error> + 'static {}
impl<E: Clone + From<Error> + 'static> Reason for E {}

/// Either a plain value or a promise for one.
pub enum Eventual<T, E> {
    Value(T),
    Promise(Promise<T, E>),
}

impl<T, E> From<T> for Eventual<T, E> {
    fn from(value: T) -> Self {
        Eventual::Value(value)
    }
}

impl<T, E> From<Promise<T, E>> for Eventual<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Eventual::Promise(promise)
    }
}

impl<T: Clone, E> Clone for Eventual<T, E> {
    fn clone(&self) -> Self {
        match self {
            Eventual::Value(value) => Eventual::Value(value.clone()),
            Eventual::Promise(promise) => Eventual::Promise(promise.clone()),
        }
    }
}

impl<T: Debug, E> Debug for Eventual<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eventual::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Eventual::Promise(promise) => f.debug_tuple("Promise").field(promise).finish(),
        }
    }
}

impl<T: Value, E: Reason> Eventual<T, E> {
    pub fn is_promise(&self) -> bool {
        matches!(self, Eventual::Promise(_))
    }

    /// True for plain values and fulfilled promises.
    pub fn is_resolved(&self) -> bool {
        match self {
            Eventual::Value(_) => true,
            Eventual::Promise(promise) => promise.is_resolved(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        match self {
            Eventual::Value(_) => false,
            Eventual::Promise(promise) => promise.is_rejected(),
        }
    }

    pub fn into_promise(self) -> Promise<T, E> {
        resolve(self)
    }
}

/// What an observer callback produces: a value or promise to continue with, or
/// a fault that rejects the promise the callback was settling.
pub type Outcome<T, E> = Result<Eventual<T, E>, E>;

/// A synchronous snapshot of a promise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromiseState<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> PromiseState<T, E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, PromiseState::Pending)
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, PromiseState::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, PromiseState::Rejected(_))
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    pub fn fulfilled(self) -> Option<T> {
        match self {
            PromiseState::Fulfilled(value) => Some(value),
            _ => None,
        }
    }

    pub fn rejected(self) -> Option<E> {
        match self {
            PromiseState::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}

type Observer<T, E> = Box<dyn FnOnce(Result<T, E>)>;

enum State<T, E> {
    Pending {
        observers: Vec<Observer<T, E>>,
        wakers: Vec<Waker>,
    },
    Forwarding(Promise<T, E>),
    Fulfilled(T),
    Rejected(E),
    /// Made by [`crate::make_promise`]; answers messages through its descriptor.
    Remote {
        descriptor: Rc<Descriptor<T, E>>,
        awaited: Option<Promise<T, E>>,
    },
}

impl<T, E> State<T, E> {
    /// Takes the target out of a forwarding state, leaving an empty one.
    fn take_target(&mut self) -> Option<Promise<T, E>> {
        if !matches!(self, State::Forwarding(_)) {
            return None;
        }
        let empty = State::Pending {
            observers: Vec::new(),
            wakers: Vec::new(),
        };
        match std::mem::replace(self, empty) {
            State::Forwarding(target) => Some(target),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            State::Pending { .. } => "pending",
            State::Forwarding(_) => "forwarding",
            State::Fulfilled(_) => "fulfilled",
            State::Rejected(_) => "rejected",
            State::Remote { .. } => "remote",
        }
    }
}

struct Inner<T, E> {
    state: RefCell<State<T, E>>,
    scheduler: Rc<dyn Scheduler>,
    observed: Cell<bool>,
}

impl<T, E> Drop for Inner<T, E> {
    fn drop(&mut self) {
        // Unlinks forwarding chains iteratively so long ones cannot overflow.
        let mut next = self.state.get_mut().take_target();
        while let Some(promise) = next {
            next = match Rc::try_unwrap(promise.inner) {
                Ok(mut inner) => inner.state.get_mut().take_target(),
                Err(_) => None,
            };
        }
        if let State::Rejected(_) = self.state.get_mut() {
            if !self.observed.get() && self.scheduler.config().report_unhandled {
                tracing::warn!("rejected promise dropped without a rejection handler");
            }
        }
    }
}

/// Read-only handle to an eventual value.
///
/// Cloning is cheap and every clone observes the same outcome.
pub struct Promise<T, E> {
    inner: Rc<Inner<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Debug for Promise<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self
            .inner
            .state
            .try_borrow()
            .map(|state| state.name())
            .unwrap_or("busy");
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

/// Internal view of the end of a chain with the borrow already released.
enum Peek<T, E> {
    Pending,
    Settled(Result<T, E>),
    Remote(Rc<Descriptor<T, E>>),
}

impl<T, E> Promise<T, E> {
    fn with_state(state: State<T, E>, scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(state),
                scheduler,
                observed: Cell::new(false),
            }),
        }
    }

    /// True when both handles refer to the same promise.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn scheduler(&self) -> Rc<dyn Scheduler> {
        self.inner.scheduler.clone()
    }

    fn config(&self) -> &Config {
        self.inner.scheduler.config()
    }

    pub(crate) fn schedule(&self, task: Task) {
        self.inner.scheduler.enqueue(task)
    }
}

impl<T: Value, E: Reason> Promise<T, E> {
    pub(crate) fn settled_in(scheduler: Rc<dyn Scheduler>, result: Result<T, E>) -> Self {
        let state = match result {
            Ok(value) => State::Fulfilled(value),
            Err(reason) => State::Rejected(reason),
        };
        Self::with_state(state, scheduler)
    }

    pub(crate) fn remote(descriptor: Descriptor<T, E>, scheduler: Rc<dyn Scheduler>) -> Self {
        Self::with_state(
            State::Remote {
                descriptor: Rc::new(descriptor),
                awaited: None,
            },
            scheduler,
        )
    }

    /// Walks to the end of the forwarding chain and peeks at it.
    ///
    /// Links passed on the way are pointed straight at the end, so a chain is
    /// walked in full at most once.
    fn follow(&self) -> (Promise<T, E>, Peek<T, E>) {
        let mut current = self.clone();
        loop {
            let peek = match &*current.inner.state.borrow() {
                State::Forwarding(next) => Err(next.clone()),
                State::Pending { .. } => Ok(Peek::Pending),
                State::Fulfilled(value) => Ok(Peek::Settled(Ok(value.clone()))),
                State::Rejected(reason) => Ok(Peek::Settled(Err(reason.clone()))),
                State::Remote { descriptor, .. } => Ok(Peek::Remote(descriptor.clone())),
            };
            match peek {
                Ok(peek) => {
                    self.shorten(&current);
                    return (current, peek);
                }
                Err(next) => current = next,
            }
        }
    }

    fn shorten(&self, end: &Promise<T, E>) {
        let mut current = self.clone();
        loop {
            let next = match &mut *current.inner.state.borrow_mut() {
                State::Forwarding(target) if !target.ptr_eq(end) => {
                    std::mem::replace(target, end.clone())
                }
                _ => return,
            };
            current = next;
        }
    }

    /// The current outcome, without blocking. A forwarding promise reports the
    /// state of the promise at the end of its chain.
    pub fn state(&self) -> PromiseState<T, E> {
        match self.follow().1 {
            Peek::Pending => PromiseState::Pending,
            Peek::Settled(Ok(value)) => PromiseState::Fulfilled(value),
            Peek::Settled(Err(reason)) => PromiseState::Rejected(reason),
            Peek::Remote(descriptor) => descriptor.inspect(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state().is_pending()
    }

    pub fn is_resolved(&self) -> bool {
        self.state().is_fulfilled()
    }

    pub fn is_rejected(&self) -> bool {
        self.state().is_rejected()
    }

    fn push_observer(&self, observer: Observer<T, E>) {
        if let State::Pending { observers, .. } = &mut *self.inner.state.borrow_mut() {
            observers.push(observer);
        }
    }

    /// Registers `observer` to receive the outcome in a later turn.
    pub(crate) fn observe(&self, observer: Observer<T, E>) {
        self.inner.observed.set(true);
        let (end, peek) = self.follow();
        end.inner.observed.set(true);
        match peek {
            Peek::Pending => end.push_observer(observer),
            Peek::Settled(result) => end.schedule(Box::new(move || observer(result))),
            Peek::Remote(_) => end.dispatch(Operator::When, Vec::new()).observe(observer),
        }
    }

    /// Counts an eventual rejection as handled without reacting to it.
    pub(crate) fn mark_handled(&self) {
        self.observe(Box::new(|_: Result<T, E>| {}));
    }

    /// Settles a pending promise. Later calls are ignored.
    pub(crate) fn settle(&self, outcome: Outcome<T, E>) {
        if !matches!(*self.inner.state.borrow(), State::Pending { .. }) {
            if self.config().report_resettle {
                tracing::debug!(promise = ?self, "ignoring settle of an already settled promise");
            }
            return;
        }
        match outcome {
            Ok(Eventual::Value(value)) => self.complete(Ok(value)),
            Ok(Eventual::Promise(target)) => self.forward(target),
            Err(reason) => self.complete(Err(reason)),
        }
    }

    fn complete(&self, result: Result<T, E>) {
        let next = match &result {
            Ok(value) => State::Fulfilled(value.clone()),
            Err(reason) => State::Rejected(reason.clone()),
        };
        if let State::Pending { observers, wakers } = self.inner.state.replace(next) {
            for observer in observers {
                let result = result.clone();
                self.schedule(Box::new(move || observer(result)));
            }
            wakers.into_iter().for_each(Waker::wake);
        }
    }

    fn forward(&self, target: Promise<T, E>) {
        let target = target.chain_end();
        if target.ptr_eq(self) {
            return self.complete(Err(E::from(Error::SelfResolution)));
        }
        if let State::Pending { observers, wakers } =
            self.inner.state.replace(State::Forwarding(target.clone()))
        {
            for observer in observers {
                target.observe(observer);
            }
            wakers.into_iter().for_each(Waker::wake);
        }
    }

    /// The promise at the end of a forwarding chain.
    fn chain_end(&self) -> Promise<T, E> {
        self.follow().0
    }

    /// Answers `operator` the way this promise's current state allows.
    ///
    /// Pending promises hold the message until they settle, then pass it on
    /// to whatever they settled as.
    pub(crate) fn dispatch(&self, operator: Operator, args: Vec<T>) -> Promise<T, E> {
        self.inner.observed.set(true);
        let (end, peek) = self.follow();
        end.inner.observed.set(true);
        match peek {
            Peek::Settled(Ok(value)) => match operator {
                Operator::When => Promise::settled_in(end.scheduler(), Ok(value)),
                other => Promise::settled_in(
                    end.scheduler(),
                    Err(E::from(Error::UnsupportedOperator(other.to_string()))),
                ),
            },
            Peek::Settled(Err(reason)) => Promise::settled_in(end.scheduler(), Err(reason)),
            Peek::Pending => {
                let Deferred { promise, resolver } = Deferred::in_scheduler(end.scheduler());
                let this = end.clone();
                end.push_observer(Box::new(move |_| {
                    resolver.resolve(this.dispatch(operator, args));
                }));
                promise
            }
            Peek::Remote(descriptor) => {
                let Deferred { promise, resolver } = Deferred::in_scheduler(end.scheduler());
                tracing::trace!(%operator, "delivering message to remote promise");
                end.schedule(Box::new(move || {
                    resolver.settle(descriptor.answer(&operator, args));
                }));
                promise
            }
        }
    }

    /// The cached `when` answer a remote promise is awaited through.
    fn awaited(&self) -> Promise<T, E> {
        if let State::Remote {
            awaited: Some(answer),
            ..
        } = &*self.inner.state.borrow()
        {
            return answer.clone();
        }
        let answer = self.dispatch(Operator::When, Vec::new());
        if let State::Remote { awaited, .. } = &mut *self.inner.state.borrow_mut() {
            *awaited = Some(answer.clone());
        }
        answer
    }

    /// Observes this promise with both continuations.
    ///
    /// Exactly one of them runs, once, in a later turn. The returned promise
    /// settles with what the continuation returns, or rejects with the fault
    /// it raises.
    pub fn when<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Value,
        F: FnOnce(T) -> Outcome<U, E> + 'static,
        R: FnOnce(E) -> Outcome<U, E> + 'static,
    {
        let Deferred { promise, resolver } = Deferred::in_scheduler(self.scheduler());
        self.observe(Box::new(move |settled| {
            resolver.settle(match settled {
                Ok(value) => on_fulfilled(value),
                Err(reason) => on_rejected(reason),
            })
        }));
        promise
    }

    /// Observes fulfillment only; a rejection passes through unchanged.
    pub fn then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Value,
        F: FnOnce(T) -> Outcome<U, E> + 'static,
    {
        self.when(on_fulfilled, Err)
    }

    /// Observes rejection only; a value passes through unchanged.
    pub fn fail<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) -> Outcome<T, E> + 'static,
    {
        self.when(|value| Ok(Eventual::Value(value)), on_rejected)
    }

    pub fn map<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Value,
        F: FnOnce(T) -> U + 'static,
    {
        self.then(move |value| Ok(Eventual::Value(f(value))))
    }

    /// Terminates a chain. A rejection reaching this point is logged.
    pub fn end(&self)
    where
        E: Debug,
    {
        self.observe(Box::new(|settled| {
            if let Err(reason) = settled {
                tracing::error!(?reason, "unhandled rejection at the end of a promise chain");
            }
        }));
    }
}

impl<T: Value, E: Reason> Future for Promise<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.observed.set(true);
        let (end, peek) = self.follow();
        end.inner.observed.set(true);
        match peek {
            Peek::Settled(result) => Poll::Ready(result),
            Peek::Pending => {
                if let State::Pending { wakers, .. } = &mut *end.inner.state.borrow_mut() {
                    if !wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                        wakers.push(cx.waker().clone());
                    }
                }
                Poll::Pending
            }
            Peek::Remote(descriptor) => match descriptor.inspect() {
                PromiseState::Fulfilled(value) => Poll::Ready(Ok(value)),
                PromiseState::Rejected(reason) => Poll::Ready(Err(reason)),
                PromiseState::Pending => Pin::new(&mut end.awaited()).poll(cx),
            },
        }
    }
}

/// Write-once capability to settle one promise.
///
/// Clones share the capability; whichever settles first wins and every later
/// call is a no-op.
pub struct Resolver<T, E> {
    promise: Promise<T, E>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T, E> Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.promise)
            .finish()
    }
}

impl<T: Value, E: Reason> Resolver<T, E> {
    /// Fulfills with a value, or forwards to a promise.
    pub fn resolve(&self, value: impl Into<Eventual<T, E>>) {
        self.promise.settle(Ok(value.into()))
    }

    pub fn reject(&self, reason: E) {
        self.promise.settle(Err(reason))
    }

    pub fn settle(&self, outcome: Outcome<T, E>) {
        self.promise.settle(outcome)
    }

    /// True once resolve or reject has been called, even while forwarding.
    pub fn is_settled(&self) -> bool {
        !matches!(
            *self.promise.inner.state.borrow(),
            State::Pending { .. }
        )
    }
}

/// A fresh promise paired with its resolver.
///
/// # Examples
///
/// ```
/// use eventual::{defer, scheduler, Deferred};
///
/// let Deferred { promise, resolver } = defer::<String, String>();
/// let shouted = promise.map(|s| s.to_uppercase());
/// resolver.resolve("hi".to_string());
/// resolver.resolve("ignored".to_string());
/// scheduler::turns().run_until_idle().unwrap();
/// assert_eq!(shouted.state().fulfilled().as_deref(), Some("HI"));
/// ```
#[derive(Debug)]
pub struct Deferred<T, E> {
    pub promise: Promise<T, E>,
    pub resolver: Resolver<T, E>,
}

impl<T: Value, E: Reason> Default for Deferred<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Value, E: Reason> Deferred<T, E> {
    /// Creates a pending pair on the current scheduler.
    pub fn new() -> Self {
        Self::in_scheduler(scheduler::current())
    }

    pub fn in_scheduler(scheduler: Rc<dyn Scheduler>) -> Self {
        let promise = Promise::with_state(
            State::Pending {
                observers: Vec::new(),
                wakers: Vec::new(),
            },
            scheduler,
        );
        let resolver = Resolver {
            promise: promise.clone(),
        };
        Self { promise, resolver }
    }

    /// Splits the pair so each half can be handed out separately.
    pub fn split(self) -> (Resolver<T, E>, Promise<T, E>) {
        (self.resolver, self.promise)
    }
}

pub fn defer<T: Value, E: Reason>() -> Deferred<T, E> {
    Deferred::new()
}

/// Returns promises unchanged and wraps plain values in fulfilled promises.
pub fn resolve<T: Value, E: Reason>(value: impl Into<Eventual<T, E>>) -> Promise<T, E> {
    match value.into() {
        Eventual::Promise(promise) => promise,
        Eventual::Value(value) => fulfilled(value),
    }
}

pub fn fulfilled<T: Value, E: Reason>(value: T) -> Promise<T, E> {
    Promise::settled_in(scheduler::current(), Ok(value))
}

pub fn reject<T: Value, E: Reason>(reason: E) -> Promise<T, E> {
    Promise::settled_in(scheduler::current(), Err(reason))
}

/// Raises `reason` from inside a continuation instead of recovering.
pub fn error<T, E>(reason: E) -> Outcome<T, E> {
    Err(reason)
}

/// Observes a value or promise. Plain values count as already fulfilled.
pub fn when<T, E, U, F, R>(
    value: impl Into<Eventual<T, E>>,
    on_fulfilled: F,
    on_rejected: R,
) -> Promise<U, E>
where
    T: Value,
    E: Reason,
    U: Value,
    F: FnOnce(T) -> Outcome<U, E> + 'static,
    R: FnOnce(E) -> Outcome<U, E> + 'static,
{
    resolve(value).when(on_fulfilled, on_rejected)
}

pub fn is_promise<T: Value, E: Reason>(value: &Eventual<T, E>) -> bool {
    value.is_promise()
}

pub fn is_resolved<T: Value, E: Reason>(value: &Eventual<T, E>) -> bool {
    value.is_resolved()
}

pub fn is_rejected<T: Value, E: Reason>(value: &Eventual<T, E>) -> bool {
    value.is_rejected()
}
