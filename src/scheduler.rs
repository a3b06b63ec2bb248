//! Turn scheduling.
//!
//! Promises never call observers inline. Every delivery is handed to a
//! [`Scheduler`] which runs it in a later turn, after the current call stack has
//! unwound. The default scheduler is a per-thread [`TurnQueue`] that the host
//! pumps explicitly; an event loop can install its own implementation with
//! [`set_current`].
use crate::{Config, Error};
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt::Debug,
    rc::Rc,
};

/// A unit of work to run in a future turn.
pub type Task = Box<dyn FnOnce()>;

/// Host hook that runs tasks in later turns, in FIFO order.
pub trait Scheduler {
    /// Schedules `task` to run after the current turn has finished and after
    /// every task enqueued before it.
    fn enqueue(&self, task: Task);

    fn config(&self) -> &Config;
}

/// A manually pumped FIFO of turns.
///
/// # Examples
///
/// ```
/// use eventual::{fulfilled, scheduler::TurnQueue};
///
/// let turns = TurnQueue::install(Default::default());
/// let promise = fulfilled::<i32, String>(1).map(|x| x + 1);
/// assert!(promise.is_pending());
/// turns.run_until_idle().unwrap();
/// assert_eq!(promise.state().fulfilled(), Some(2));
/// # eventual::scheduler::reset();
/// ```
pub struct TurnQueue {
    tasks: RefCell<VecDeque<Task>>,
    turns_run: Cell<usize>,
    config: Config,
}

impl Debug for TurnQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnQueue")
            .field("queued", &self.len())
            .field("turns_run", &self.turns_run.get())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for TurnQueue {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl TurnQueue {
    pub fn new(config: Config) -> Self {
        Self {
            tasks: RefCell::new(VecDeque::new()),
            turns_run: Cell::new(0),
            config,
        }
    }

    /// Creates a queue and makes it the current scheduler of this thread.
    pub fn install(config: Config) -> Rc<TurnQueue> {
        let turns = Rc::new(Self::new(config));
        set_current(turns.clone());
        turns
    }

    /// Runs the oldest queued task. Returns `false` when nothing was queued.
    pub fn run_turn(&self) -> bool {
        // The borrow must end before the task runs; tasks enqueue more tasks.
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                let turn = self.turns_run.get() + 1;
                self.turns_run.set(turn);
                tracing::trace!(turn, "running turn");
                task();
                true
            }
            None => false,
        }
    }

    /// Runs turns until the queue is empty and returns how many ran.
    ///
    /// Fails with [`Error::TurnLimit`] when the configured limit is reached
    /// first, which usually means an unbounded retry loop.
    pub fn run_until_idle(&self) -> Result<usize, Error> {
        let mut ran = 0;
        loop {
            if let Some(limit) = self.config.turn_limit {
                if ran >= limit && !self.is_idle() {
                    return Err(Error::TurnLimit(limit));
                }
            }
            if !self.run_turn() {
                return Ok(ran);
            }
            ran += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Total turns run by this queue since it was created.
    pub fn turns_run(&self) -> usize {
        self.turns_run.get()
    }
}

impl Scheduler for TurnQueue {
    fn enqueue(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }

    fn config(&self) -> &Config {
        &self.config
    }
}

thread_local! {
    static DEFAULT_TURNS: Rc<TurnQueue> = Rc::new(TurnQueue::default());
    static CURRENT: RefCell<Option<Rc<dyn Scheduler>>> = const { RefCell::new(None) };
}

/// The default turn queue of this thread.
///
/// Promises use it unless another scheduler was installed with [`set_current`].
pub fn turns() -> Rc<TurnQueue> {
    DEFAULT_TURNS.with(Rc::clone)
}

/// The scheduler new promises on this thread will capture.
pub fn current() -> Rc<dyn Scheduler> {
    CURRENT
        .with(|current| current.borrow().clone())
        .unwrap_or_else(|| turns() as Rc<dyn Scheduler>)
}

/// Installs `scheduler` for promises created on this thread from now on.
///
/// Promises created earlier keep the scheduler they captured.
pub fn set_current(scheduler: Rc<dyn Scheduler>) {
    CURRENT.with(|current| *current.borrow_mut() = Some(scheduler));
}

/// Goes back to this thread's default [`TurnQueue`].
pub fn reset() {
    CURRENT.with(|current| *current.borrow_mut() = None);
}
