//! An unbounded FIFO that decouples producers from consumers.
use crate::{
    promise::{Deferred, Eventual, Promise, Reason, Resolver, Value},
    scheduler::{self, Scheduler},
    Error,
};
use std::{cell::RefCell, collections::VecDeque, fmt, rc::Rc};

struct QueueState<T, E> {
    buffer: VecDeque<Eventual<T, E>>,
    waiting: VecDeque<Resolver<T, E>>,
    closed: Option<E>,
}

/// Values put in come out of `get` in the same order.
///
/// A `get` with nothing buffered returns a pending promise that the next
/// `put` fulfills. After [`Queue::close`], values already buffered are still
/// handed out; once they run out, every `get` is rejected with the close
/// reason.
///
/// # Examples
///
/// ```
/// use eventual::{scheduler, Queue};
///
/// let queue = Queue::<i32, String>::new();
/// queue.put(1);
/// queue.put(2);
/// queue.close(Some("done".to_string()));
/// let (first, second, third) = (queue.get(), queue.get(), queue.get());
/// scheduler::turns().run_until_idle().unwrap();
/// assert_eq!(first.state().fulfilled(), Some(1));
/// assert_eq!(second.state().fulfilled(), Some(2));
/// assert_eq!(third.state().rejected().as_deref(), Some("done"));
/// assert!(queue.closed().is_resolved());
/// ```
pub struct Queue<T, E> {
    state: Rc<RefCell<QueueState<T, E>>>,
    drained: Resolver<(), E>,
    closed: Promise<(), E>,
    scheduler: Rc<dyn Scheduler>,
}

impl<T, E> Clone for Queue<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            drained: self.drained.clone(),
            closed: self.closed.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Queue<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Queue")
            .field("buffered", &state.buffer.len())
            .field("waiting", &state.waiting.len())
            .field("closed", &state.closed.is_some())
            .finish()
    }
}

impl<T: Value, E: Reason> Default for Queue<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Value, E: Reason> Queue<T, E> {
    pub fn new() -> Self {
        Self::in_scheduler(scheduler::current())
    }

    pub fn in_scheduler(scheduler: Rc<dyn Scheduler>) -> Self {
        let (drained, closed) = Deferred::in_scheduler(scheduler.clone()).split();
        Self {
            state: Rc::new(RefCell::new(QueueState {
                buffer: VecDeque::new(),
                waiting: VecDeque::new(),
                closed: None,
            })),
            drained,
            closed,
            scheduler,
        }
    }

    /// Hands `value` to the oldest waiting `get`, or buffers it.
    ///
    /// Values put after [`Queue::close`] are dropped.
    pub fn put(&self, value: impl Into<Eventual<T, E>>) {
        let mut state = self.state.borrow_mut();
        if state.closed.is_some() {
            tracing::warn!("dropping a value put into a closed queue");
            return;
        }
        match state.waiting.pop_front() {
            Some(resolver) => {
                drop(state);
                resolver.resolve(value);
            }
            None => state.buffer.push_back(value.into()),
        }
    }

    /// A promise for the oldest value not yet taken.
    pub fn get(&self) -> Promise<T, E> {
        let mut state = self.state.borrow_mut();
        if let Some(value) = state.buffer.pop_front() {
            let drained = state.buffer.is_empty() && state.closed.is_some();
            drop(state);
            if drained {
                self.drained.resolve(());
            }
            return match value {
                Eventual::Promise(promise) => promise,
                Eventual::Value(value) => Promise::settled_in(self.scheduler.clone(), Ok(value)),
            };
        }
        if let Some(reason) = &state.closed {
            return Promise::settled_in(self.scheduler.clone(), Err(reason.clone()));
        }
        let Deferred { promise, resolver } = Deferred::in_scheduler(self.scheduler.clone());
        state.waiting.push_back(resolver);
        promise
    }

    /// Stops the queue. Outstanding `get`s are rejected with `reason`, or
    /// [`Error::QueueClosed`] when none is given. Closing twice does nothing.
    pub fn close(&self, reason: Option<E>) {
        let mut state = self.state.borrow_mut();
        if state.closed.is_some() {
            return;
        }
        let reason = reason.unwrap_or_else(|| E::from(Error::QueueClosed));
        state.closed = Some(reason.clone());
        let waiting = std::mem::take(&mut state.waiting);
        let buffered = state.buffer.len();
        drop(state);

        tracing::debug!(waiting = waiting.len(), buffered, "queue closed");
        for resolver in waiting {
            resolver.reject(reason.clone());
        }
        if buffered == 0 {
            self.drained.resolve(());
        }
    }

    /// Fulfilled once the queue is closed and everything put before the close
    /// has been taken.
    pub fn closed(&self) -> Promise<(), E> {
        self.closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed.is_some()
    }

    /// Number of buffered values.
    pub fn len(&self) -> usize {
        self.state.borrow().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `get` promises still waiting for a value.
    pub fn waiting(&self) -> usize {
        self.state.borrow().waiting.len()
    }
}
