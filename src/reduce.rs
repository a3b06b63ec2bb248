//! Folding sequences of values and promises.
//!
//! [`reduce_left`] and [`reduce_right`] call the reducer in a total order,
//! each call waiting for the previous accumulation and the current element.
//! [`reduce`] combines adjacent pairs as soon as both sides are available and
//! so only suits reducers whose grouping does not matter.
use crate::{
    promise::{resolve, Eventual, Outcome, Promise, Reason, Value},
    structure::{deep, Resolved, Structure},
};
use std::{fmt, rc::Rc};

/// Folds from the first element to the last.
///
/// The first rejection met along the way, from the basis, an element or the
/// reducer, rejects the result and no further reducer calls are made.
///
/// # Examples
///
/// ```
/// use eventual::{defer, reduce_left, scheduler, Eventual};
///
/// let (resolver, late) = defer::<i32, String>().split();
/// let sum = reduce_left(
///     vec![Eventual::Value(1), Eventual::Promise(late), Eventual::Value(3)],
///     |acc: i32, x: i32| Ok(Eventual::Value(acc + x)),
///     0,
/// );
/// resolver.resolve(2);
/// scheduler::turns().run_until_idle().unwrap();
/// assert_eq!(sum.state().fulfilled(), Some(6));
/// ```
pub fn reduce_left<T, A, E, I, F>(
    items: I,
    reducer: F,
    basis: impl Into<Eventual<A, E>>,
) -> Promise<A, E>
where
    T: Value,
    A: Value,
    E: Reason,
    I: IntoIterator,
    I::Item: Into<Eventual<T, E>>,
    F: Fn(A, T) -> Outcome<A, E> + 'static,
{
    let reducer = Rc::new(reducer);
    items
        .into_iter()
        .fold(resolve(basis), |accumulated, item| {
            fold_step(accumulated, resolve(item), reducer.clone())
        })
}

/// Folds from the last element to the first.
pub fn reduce_right<T, A, E, I, F>(
    items: I,
    reducer: F,
    basis: impl Into<Eventual<A, E>>,
) -> Promise<A, E>
where
    T: Value,
    A: Value,
    E: Reason,
    I: IntoIterator,
    I::Item: Into<Eventual<T, E>>,
    F: Fn(A, T) -> Outcome<A, E> + 'static,
{
    let items: Vec<Eventual<T, E>> = items.into_iter().map(Into::into).collect();
    reduce_left(items.into_iter().rev(), reducer, basis)
}

/// Combines `accumulated` with `item` once both are available.
///
/// When `accumulated` rejects, `item` is never reduced; it is still observed
/// so that its own rejection does not count as unhandled.
fn fold_step<T, A, E, F>(
    accumulated: Promise<A, E>,
    item: Promise<T, E>,
    reducer: Rc<F>,
) -> Promise<A, E>
where
    T: Value,
    A: Value,
    E: Reason,
    F: Fn(A, T) -> Outcome<A, E> + 'static,
{
    let skipped = item.clone();
    accumulated.when(
        move |acc| {
            let reduced = item.then(move |element| reducer(acc, element));
            Ok(Eventual::Promise(reduced))
        },
        move |reason| {
            skipped.mark_handled();
            Err(reason)
        },
    )
}

/// Folds without a fixed traversal order.
///
/// The basis is placed before the elements and neighbours are combined
/// pairwise, level by level, like a balanced tree. Each pair is reduced as soon
/// as both of its sides are available, so calls from different pairs happen in
/// whatever order their inputs settle. The tree shape only depends on the
/// number of elements, which keeps results deterministic for associative
/// reducers.
pub fn reduce<T, E, I, F>(items: I, reducer: F, basis: impl Into<Eventual<T, E>>) -> Promise<T, E>
where
    T: Value,
    E: Reason,
    I: IntoIterator,
    I::Item: Into<Eventual<T, E>>,
    F: Fn(T, T) -> Outcome<T, E> + 'static,
{
    let reducer = Rc::new(reducer);
    let basis = resolve(basis);
    let mut level: Vec<Promise<T, E>> = std::iter::once(basis.clone())
        .chain(items.into_iter().map(|item| resolve(item)))
        .collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        let mut pairs = level.into_iter();
        while let Some(left) = pairs.next() {
            match pairs.next() {
                Some(right) => next.push(fold_step(left, right, reducer.clone())),
                None => next.push(left),
            }
        }
        level = next;
    }
    level.pop().unwrap_or(basis)
}

type StepFn<T, E> = Box<dyn FnOnce(Resolved<T>) -> Result<Structure<T, E>, E>>;
type SpreadFn<T, E> = Box<dyn FnOnce(Vec<Resolved<T>>) -> Result<Structure<T, E>, E>>;

/// One stage of a [`step`] pipeline.
pub enum Step<T, E> {
    /// Takes the previous result as a single argument.
    Unary(StepFn<T, E>),
    /// Takes the previous result spread across its arguments when it is a
    /// sequence, or as a lone argument otherwise.
    Spread(SpreadFn<T, E>),
}

impl<T, E> fmt::Debug for Step<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Unary(_) => f.write_str("Step::Unary"),
            Step::Spread(_) => f.write_str("Step::Spread"),
        }
    }
}

impl<T: Value, E: Reason> Step<T, E> {
    pub fn unary<F>(f: F) -> Self
    where
        F: FnOnce(Resolved<T>) -> Result<Structure<T, E>, E> + 'static,
    {
        Step::Unary(Box::new(f))
    }

    pub fn spread<F>(f: F) -> Self
    where
        F: FnOnce(Vec<Resolved<T>>) -> Result<Structure<T, E>, E> + 'static,
    {
        Step::Spread(Box::new(f))
    }

    fn call(self, input: Resolved<T>) -> Result<Structure<T, E>, E> {
        match self {
            Step::Unary(f) => f(input),
            Step::Spread(f) => match input {
                Resolved::Seq(args) => f(args),
                single => f(vec![single]),
            },
        }
    }
}

/// Runs `steps` one after another.
///
/// Each step's result is resolved with [`deep`] before the next step sees it.
/// The first step receives an empty argument list. The returned promise
/// settles with the last step's resolved result, or the first rejection.
pub fn step<T, E>(steps: impl IntoIterator<Item = Step<T, E>>) -> Promise<Resolved<T>, E>
where
    T: Value,
    E: Reason,
{
    steps.into_iter().fold(
        resolve(Resolved::Seq(Vec::new())),
        |previous: Promise<Resolved<T>, E>, next| {
            previous.then(move |input| Ok(Eventual::Promise(deep(next.call(input)?))))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{defer, fulfilled, reject, scheduler::turns, Error};
    use std::cell::RefCell;
    use tracing_test::traced_test;

    fn run() {
        turns().run_until_idle().unwrap();
    }

    fn recording_add(
        log: Rc<RefCell<Vec<(i32, i32)>>>,
    ) -> impl Fn(i32, i32) -> Outcome<i32, String> {
        move |acc, x| {
            log.borrow_mut().push((acc, x));
            Ok(Eventual::Value(acc + x))
        }
    }

    #[test]
    fn reduce_left_waits_for_each_element_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let deferreds: Vec<_> = (0..3).map(|_| defer::<i32, String>()).collect();
        let items: Vec<Promise<i32, String>> =
            deferreds.iter().map(|d| d.promise.clone()).collect();
        let sum = reduce_left(items, recording_add(log.clone()), 0);

        deferreds[2].resolver.resolve(3);
        run();
        assert!(log.borrow().is_empty());
        deferreds[0].resolver.resolve(1);
        run();
        assert_eq!(*log.borrow(), vec![(0, 1)]);
        deferreds[1].resolver.resolve(2);
        run();
        assert_eq!(*log.borrow(), vec![(0, 1), (1, 2), (3, 3)]);
        assert_eq!(sum.state().fulfilled(), Some(6));
    }

    #[test]
    fn reduce_right_folds_from_the_end() {
        let joined = reduce_right(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            |acc: String, x: String| Ok(Eventual::<String, String>::Value(acc + &x)),
            String::new(),
        );
        run();
        assert_eq!(joined.state().fulfilled().as_deref(), Some("cba"));
    }

    #[test]
    #[traced_test]
    fn skipped_rejections_are_not_reported_as_unhandled() {
        let items = vec![reject::<i32, String>("first".into()), reject("second".into())];
        let sum = reduce_left(items, |acc: i32, x: i32| Ok(Eventual::Value(acc + x)), 0);
        let recovered = sum.fail(|_| Ok(Eventual::Value(0)));
        run();
        assert_eq!(sum.state().rejected().as_deref(), Some("first"));
        assert_eq!(recovered.state().fulfilled(), Some(0));
        drop((sum, recovered));
        run();
        assert!(!logs_contain("rejected promise dropped without a rejection handler"));
    }

    #[test]
    fn reduce_left_short_circuits_on_rejection() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let items: Vec<Eventual<i32, String>> = vec![
            Eventual::Value(1),
            Eventual::Promise(reject("second".into())),
            Eventual::Value(3),
        ];
        let sum = reduce_left(items, recording_add(log.clone()), 0);
        run();
        assert_eq!(sum.state().rejected().as_deref(), Some("second"));
        assert_eq!(*log.borrow(), vec![(0, 1)]);
    }

    #[test]
    fn reducer_faults_reject_the_fold() {
        let sum = reduce_left(
            vec![1, 2, 3],
            |acc: i32, x: i32| {
                if x == 2 {
                    Err(format!("refused {x}"))
                } else {
                    Ok(Eventual::Value(acc + x))
                }
            },
            0,
        );
        run();
        assert_eq!(sum.state().rejected().as_deref(), Some("refused 2"));
    }

    #[test]
    fn reducer_may_return_promises() {
        let product = reduce_left(
            vec![2, 3, 4],
            |acc: i32, x: i32| Ok(Eventual::Promise(fulfilled::<i32, String>(acc * x))),
            1,
        );
        run();
        assert_eq!(product.state().fulfilled(), Some(24));
    }

    #[test]
    fn reduce_combines_pairs_as_they_become_ready() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let deferreds: Vec<_> = (0..4).map(|_| defer::<i32, String>()).collect();
        let items: Vec<Promise<i32, String>> =
            deferreds.iter().map(|d| d.promise.clone()).collect();
        // Tree: ((0, a), (b, c)), d
        let total = reduce(items, recording_add(log.clone()), 0);

        deferreds[1].resolver.resolve(20);
        deferreds[2].resolver.resolve(30);
        run();
        assert_eq!(*log.borrow(), vec![(20, 30)]);
        deferreds[0].resolver.resolve(10);
        deferreds[3].resolver.resolve(40);
        run();
        assert_eq!(*log.borrow(), vec![(20, 30), (0, 10), (10, 50), (60, 40)]);
        assert_eq!(total.state().fulfilled(), Some(100));
    }

    #[test]
    fn reduce_of_nothing_is_the_basis() {
        let total = reduce(Vec::<i32>::new(), |a: i32, b: i32| Ok(Eventual::<i32, String>::Value(a + b)), 7);
        run();
        assert_eq!(total.state().fulfilled(), Some(7));
    }

    #[test]
    fn step_deep_resolves_between_steps() {
        let result = step::<i32, String>(vec![
            Step::unary(|args| {
                assert_eq!(args, Resolved::Seq(vec![]));
                Ok(Structure::Seq(vec![
                    Structure::Promise(fulfilled(1)),
                    Structure::Seq(vec![Structure::Promise(fulfilled(2))]),
                ]))
            }),
            Step::unary(|input| {
                assert_eq!(
                    input,
                    Resolved::Seq(vec![Resolved::Value(1), Resolved::Seq(vec![Resolved::Value(2)])])
                );
                Ok(Structure::Value(3))
            }),
        ]);
        run();
        assert_eq!(result.state().fulfilled(), Some(Resolved::Value(3)));
    }

    #[test]
    fn step_spreads_sequences() {
        let result = step::<i32, String>(vec![
            Step::unary(|_| {
                Ok(Structure::Seq(vec![
                    Structure::Promise(fulfilled(4)),
                    Structure::Value(5),
                ]))
            }),
            Step::spread(|args| match args.as_slice() {
                [Resolved::Value(a), Resolved::Value(b)] => Ok(Structure::Value(a * b)),
                other => Err(format!("unexpected arguments: {other:?}")),
            }),
            Step::spread(|args| Ok(Structure::Value(args.len() as i32))),
        ]);
        run();
        assert_eq!(result.state().fulfilled(), Some(Resolved::Value(1)));
    }

    #[test]
    fn step_stops_at_the_first_rejection() {
        let ran = Rc::new(RefCell::new(false));
        let flag = ran.clone();
        let result = step::<i32, String>(vec![
            Step::unary(|_| Ok(Structure::Promise(reject("stage one".into())))),
            Step::unary(move |_| {
                *flag.borrow_mut() = true;
                Ok(Structure::Value(0))
            }),
        ]);
        run();
        assert_eq!(result.state().rejected().as_deref(), Some("stage one"));
        assert!(!*ran.borrow());
    }

    #[test]
    fn empty_step_resolves_to_no_arguments() {
        let result = step::<i32, Error>(Vec::new());
        run();
        assert_eq!(result.state().fulfilled(), Some(Resolved::Seq(vec![])));
    }
}
