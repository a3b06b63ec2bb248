//! Resolving promises nested inside sequences and maps.
//!
//! A [`Structure`] is an owned tree, so it cannot contain cycles. Traversal
//! is depth first, sequences in order and maps in key order. Any contained
//! rejection rejects the whole result as soon as it arrives, without waiting
//! for promises before it; among rejections arriving together, the first in
//! traversal order wins.
use crate::{
    join::all,
    promise::{fulfilled, Promise, Reason, Value},
};
use std::{collections::BTreeMap, fmt};

/// A tree of values and promises.
pub enum Structure<T, E> {
    Value(T),
    Promise(Promise<T, E>),
    Seq(Vec<Structure<T, E>>),
    Map(BTreeMap<String, Structure<T, E>>),
}

impl<T: Clone, E> Clone for Structure<T, E> {
    fn clone(&self) -> Self {
        match self {
            Structure::Value(value) => Structure::Value(value.clone()),
            Structure::Promise(promise) => Structure::Promise(promise.clone()),
            Structure::Seq(items) => Structure::Seq(items.clone()),
            Structure::Map(entries) => Structure::Map(entries.clone()),
        }
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Structure<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Structure::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Structure::Promise(promise) => f.debug_tuple("Promise").field(promise).finish(),
            Structure::Seq(items) => f.debug_list().entries(items).finish(),
            Structure::Map(entries) => f.debug_map().entries(entries).finish(),
        }
    }
}

impl<T, E> From<Promise<T, E>> for Structure<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Structure::Promise(promise)
    }
}

impl<T, E> Structure<T, E> {
    pub fn seq(items: impl IntoIterator<Item = Structure<T, E>>) -> Self {
        Structure::Seq(items.into_iter().collect())
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Structure<T, E>)>) -> Self {
        Structure::Map(entries.into_iter().map(|(key, value)| (key.into(), value)).collect())
    }
}

/// A [`Structure`] with every promise replaced by its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<T> {
    Value(T),
    Seq(Vec<Resolved<T>>),
    Map(BTreeMap<String, Resolved<T>>),
}

impl<T> Resolved<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Resolved::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Resolved<T>]> {
        match self {
            Resolved::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Resolved<T>>> {
        match self {
            Resolved::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

/// Resolves the promises directly inside a sequence or map.
///
/// Nested containers are kept as they are, promises included. A bare value
/// or promise resolves to itself.
pub fn shallow<T: Value, E: Reason>(structure: Structure<T, E>) -> Promise<Structure<T, E>, E> {
    fn direct<T: Value, E: Reason>(item: Structure<T, E>) -> Promise<Structure<T, E>, E> {
        match item {
            Structure::Promise(promise) => promise.map(Structure::Value),
            other => fulfilled(other),
        }
    }

    match structure {
        Structure::Seq(items) => {
            all::<Structure<T, E>, E, _>(items.into_iter().map(direct)).map(Structure::Seq)
        }
        Structure::Map(entries) => {
            let (keys, values): (Vec<String>, Vec<Structure<T, E>>) = entries.into_iter().unzip();
            all::<Structure<T, E>, E, _>(values.into_iter().map(direct))
                .map(move |values| Structure::Map(keys.into_iter().zip(values).collect()))
        }
        other => direct(other),
    }
}

/// Resolves every promise in the tree, at any depth.
///
/// # Examples
///
/// ```
/// use eventual::{deep, fulfilled, scheduler, Resolved, Structure};
/// use std::collections::BTreeMap;
///
/// let tree = Structure::<i32, String>::map([
///     ("a", Structure::Promise(fulfilled(1))),
///     ("b", Structure::seq([Structure::Promise(fulfilled(2)), Structure::Value(3)])),
/// ]);
/// let resolved = deep(tree);
/// scheduler::turns().run_until_idle().unwrap();
///
/// let expected = Resolved::Map(BTreeMap::from([
///     ("a".to_string(), Resolved::Value(1)),
///     ("b".to_string(), Resolved::Seq(vec![Resolved::Value(2), Resolved::Value(3)])),
/// ]));
/// assert_eq!(resolved.state().fulfilled(), Some(expected));
/// ```
pub fn deep<T: Value, E: Reason>(structure: Structure<T, E>) -> Promise<Resolved<T>, E> {
    match structure {
        Structure::Value(value) => fulfilled(Resolved::Value(value)),
        Structure::Promise(promise) => promise.map(Resolved::Value),
        Structure::Seq(items) => {
            all::<Resolved<T>, E, _>(items.into_iter().map(deep)).map(Resolved::Seq)
        }
        Structure::Map(entries) => {
            let (keys, values): (Vec<String>, Vec<Structure<T, E>>) = entries.into_iter().unzip();
            all::<Resolved<T>, E, _>(values.into_iter().map(deep))
                .map(move |values| Resolved::Map(keys.into_iter().zip(values).collect()))
        }
    }
}
