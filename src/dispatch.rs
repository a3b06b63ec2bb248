//! Message dispatch.
//!
//! Observation is one operator among several. A promise built with
//! [`make_promise`] answers operators through a [`Descriptor`]: a handler per
//! [`Operator`], a fallback for everything else, and an optional inspector that
//! reports its settled state synchronously.
use crate::{
    promise::{Outcome, Promise, PromiseState, Reason, Value},
    scheduler, Error,
};
use std::{collections::HashMap, fmt, rc::Rc};

/// Messages a promise can be sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Observation; answered with the promise's own value.
    When,
    Get,
    Put,
    Post,
    Del,
    Custom(String),
}

impl Operator {
    pub fn name(&self) -> &str {
        match self {
            Operator::When => "when",
            Operator::Get => "get",
            Operator::Put => "put",
            Operator::Post => "post",
            Operator::Del => "del",
            Operator::Custom(name) => name,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for Operator {
    fn from(name: &str) -> Self {
        match name {
            "when" => Operator::When,
            "get" => Operator::Get,
            "put" => Operator::Put,
            "post" => Operator::Post,
            "del" => Operator::Del,
            other => Operator::Custom(other.to_string()),
        }
    }
}

impl From<String> for Operator {
    fn from(name: String) -> Self {
        Operator::from(name.as_str())
    }
}

pub type Handler<T, E> = Rc<dyn Fn(Vec<T>) -> Outcome<T, E>>;
pub type Fallback<T, E> = Rc<dyn Fn(&Operator, Vec<T>) -> Outcome<T, E>>;
pub type Inspector<T, E> = Rc<dyn Fn() -> PromiseState<T, E>>;

/// The operators a made promise answers, and how it answers the rest.
///
/// # Examples
///
/// ```
/// use eventual::{make_promise, scheduler, Descriptor, Eventual, Operator};
///
/// let answer = make_promise(
///     Descriptor::<i32, String>::new()
///         .on(Operator::When, |_| Ok(Eventual::Value(42)))
///         .on("double", |args| Ok(Eventual::Value(args.iter().sum::<i32>() * 2))),
/// );
/// let doubled = answer.send("double", vec![1, 2]);
/// let unknown = answer.send(Operator::Del, vec![]);
/// scheduler::turns().run_until_idle().unwrap();
/// assert_eq!(doubled.state().fulfilled(), Some(6));
/// assert_eq!(unknown.state().rejected().as_deref(), Some("operator not supported: del"));
/// ```
pub struct Descriptor<T, E> {
    handlers: HashMap<Operator, Handler<T, E>>,
    fallback: Option<Fallback<T, E>>,
    value_of: Option<Inspector<T, E>>,
}

impl<T, E> fmt::Debug for Descriptor<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("operators", &self.handlers.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .field("value_of", &self.value_of.is_some())
            .finish()
    }
}

impl<T: Value, E: Reason> Default for Descriptor<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Value, E: Reason> Descriptor<T, E> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: None,
            value_of: None,
        }
    }

    pub fn on<F>(mut self, operator: impl Into<Operator>, handler: F) -> Self
    where
        F: Fn(Vec<T>) -> Outcome<T, E> + 'static,
    {
        self.handlers.insert(operator.into(), Rc::new(handler));
        self
    }

    /// Handles operators without a registered handler. Without one, they are
    /// rejected with [`Error::UnsupportedOperator`].
    pub fn fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&Operator, Vec<T>) -> Outcome<T, E> + 'static,
    {
        self.fallback = Some(Rc::new(fallback));
        self
    }

    /// Reports the promise's settled state without sending it a message.
    pub fn value_of<F>(mut self, inspector: F) -> Self
    where
        F: Fn() -> PromiseState<T, E> + 'static,
    {
        self.value_of = Some(Rc::new(inspector));
        self
    }

    pub fn answers(&self, operator: &Operator) -> bool {
        self.handlers.contains_key(operator)
    }

    pub(crate) fn answer(&self, operator: &Operator, args: Vec<T>) -> Outcome<T, E> {
        match (self.handlers.get(operator), &self.fallback) {
            (Some(handler), _) => handler(args),
            (None, Some(fallback)) => fallback(operator, args),
            (None, None) => Err(E::from(Error::UnsupportedOperator(operator.to_string()))),
        }
    }

    pub(crate) fn inspect(&self) -> PromiseState<T, E> {
        match &self.value_of {
            Some(inspector) => inspector(),
            None => PromiseState::Pending,
        }
    }
}

/// Creates a promise that answers messages through `descriptor`.
///
/// Handlers run in a later turn, like every other continuation. Observing the
/// promise sends it [`Operator::When`].
pub fn make_promise<T: Value, E: Reason>(descriptor: Descriptor<T, E>) -> Promise<T, E> {
    Promise::remote(descriptor, scheduler::current())
}

/// Sends `operator` with `args` and returns a promise for the answer.
pub fn send<T: Value, E: Reason>(
    promise: &Promise<T, E>,
    operator: impl Into<Operator>,
    args: Vec<T>,
) -> Promise<T, E> {
    promise.dispatch(operator.into(), args)
}

impl<T: Value, E: Reason> Promise<T, E> {
    pub fn send(&self, operator: impl Into<Operator>, args: Vec<T>) -> Promise<T, E> {
        send(self, operator, args)
    }

    pub fn get(&self, key: T) -> Promise<T, E> {
        self.send(Operator::Get, vec![key])
    }

    pub fn put(&self, key: T, value: T) -> Promise<T, E> {
        self.send(Operator::Put, vec![key, value])
    }

    pub fn post(&self, args: Vec<T>) -> Promise<T, E> {
        self.send(Operator::Post, args)
    }

    pub fn del(&self, key: T) -> Promise<T, E> {
        self.send(Operator::Del, vec![key])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{defer, fulfilled, reject, scheduler::turns, Eventual};
    use std::{cell::RefCell, collections::BTreeMap};

    fn run() {
        turns().run_until_idle().unwrap();
    }

    /// A remote key-value object backed by a shared map.
    fn store() -> (Promise<String, String>, Rc<RefCell<BTreeMap<String, String>>>) {
        let map: Rc<RefCell<BTreeMap<String, String>>> = Rc::new(RefCell::new(BTreeMap::new()));
        let (get_map, put_map, del_map) = (map.clone(), map.clone(), map.clone());
        let promise = make_promise(
            Descriptor::new()
                .on(Operator::Get, move |args: Vec<String>| {
                    let key = args.into_iter().next().unwrap_or_default();
                    match get_map.borrow().get(&key) {
                        Some(value) => Ok(Eventual::Value(value.clone())),
                        None => Err(format!("no such key: {key}")),
                    }
                })
                .on(Operator::Put, move |args: Vec<String>| {
                    let mut args = args.into_iter();
                    let key = args.next().unwrap_or_default();
                    let value = args.next().unwrap_or_default();
                    put_map.borrow_mut().insert(key, value.clone());
                    Ok(Eventual::Value(value))
                })
                .on(Operator::Del, move |args: Vec<String>| {
                    let key = args.into_iter().next().unwrap_or_default();
                    del_map.borrow_mut().remove(&key);
                    Ok(Eventual::Value(key))
                }),
        );
        (promise, map)
    }

    #[test]
    fn operator_names_round_trip() {
        for name in ["when", "get", "put", "post", "del", "custom"] {
            assert_eq!(Operator::from(name).name(), name);
        }
        assert_eq!(Operator::from("shout"), Operator::Custom("shout".into()));
    }

    #[test]
    fn descriptor_handlers_answer_messages() {
        let (remote, map) = store();
        let put = remote.put("a".into(), "1".into());
        assert!(map.borrow().is_empty());
        run();
        assert_eq!(put.state().fulfilled().as_deref(), Some("1"));
        let got = remote.get("a".into());
        let missing = remote.get("b".into());
        run();
        assert_eq!(got.state().fulfilled().as_deref(), Some("1"));
        assert_eq!(missing.state().rejected().as_deref(), Some("no such key: b"));
        let _ = remote.del("a".into());
        run();
        assert!(map.borrow().is_empty());
    }

    #[test]
    fn unknown_operators_reject_by_default() {
        let (remote, _) = store();
        let posted = remote.post(vec![]);
        let observed = remote.map(|value| value);
        run();
        assert_eq!(
            posted.state().rejected(),
            Some(Error::UnsupportedOperator("post".into()).to_string())
        );
        assert_eq!(
            observed.state().rejected().as_deref(),
            Some("operator not supported: when")
        );
    }

    #[test]
    fn fallback_handles_unknown_operators() {
        let remote = make_promise(
            Descriptor::<String, String>::new().fallback(|operator, args| {
                Ok(Eventual::Value(format!("{operator}/{}", args.len())))
            }),
        );
        let answer = remote.send("frobnicate", vec!["x".into()]);
        run();
        assert_eq!(answer.state().fulfilled().as_deref(), Some("frobnicate/1"));
    }

    #[test]
    fn value_of_overrides_inspection() {
        let plain = make_promise(
            Descriptor::<i32, String>::new().on(Operator::When, |_| Ok(Eventual::Value(1))),
        );
        let inspected = make_promise(
            Descriptor::<i32, String>::new()
                .on(Operator::When, |_| Ok(Eventual::Value(1)))
                .value_of(|| PromiseState::Fulfilled(1)),
        );
        let broken = make_promise(
            Descriptor::<i32, String>::new().value_of(|| PromiseState::Rejected("gone".into())),
        );
        assert!(plain.is_pending());
        assert!(inspected.is_resolved());
        assert!(broken.is_rejected());
        assert_eq!(futures::executor::block_on(inspected), Ok(1));
    }

    #[test]
    fn observing_a_remote_promise_sends_when() {
        let remote = make_promise(
            Descriptor::<i32, String>::new().on(Operator::When, |_| Ok(Eventual::Value(5))),
        );
        let plus_one = remote.map(|x| x + 1);
        run();
        assert_eq!(plus_one.state().fulfilled(), Some(6));
    }

    #[test]
    fn pending_promises_hold_messages_until_settled() {
        let (remote, _) = store();
        let (resolver, local) = defer::<String, String>().split();
        let put = local.put("k".into(), "v".into());
        let got = local.get("k".into());
        run();
        assert!(put.is_pending() && got.is_pending());
        resolver.resolve(remote);
        run();
        assert_eq!(got.state().fulfilled().as_deref(), Some("v"));
    }

    #[test]
    fn settled_local_promises_answer_what_they_can() {
        let value = fulfilled::<i32, String>(3);
        let failed = reject::<i32, String>("broken".into());
        let when = send(&value, Operator::When, vec![]);
        let get = value.get(0);
        let from_rejected = failed.send("anything", vec![]);
        run();
        assert_eq!(when.state().fulfilled(), Some(3));
        assert_eq!(get.state().rejected().as_deref(), Some("operator not supported: get"));
        assert_eq!(from_rejected.state().rejected().as_deref(), Some("broken"));
    }
}
