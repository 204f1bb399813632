//! Destination slots for deferred loads.
//!
//! A slot is a cheap, clonable handle over a shared cell. Records under
//! construction inside a resolver body embed slots as fields and hand clones
//! of them to [`Loader`](crate::Loader); the engine fills the cell once the
//! corresponding batch resolves, after the resolver body has returned. Every
//! clone of a slot observes the same contents.
//!
//! Four shapes cover the scalar/collection and by-value/shared axes:
//!
//! | | by value | shared |
//! |---|---|---|
//! | one record | [`One<T>`] | [`OneShared<T>`] |
//! | many records | [`Many<T>`] | [`ManyShared<T>`] |
//!
//! By-value slots clone records out of the engine's shared storage at write
//! time (and so require `T: Clone`); shared slots hand out the `Arc<T>`s
//! directly.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

mod sealed {
    pub trait Sealed {}
}

/// A scalar destination holding exactly one record by value.
pub struct One<T> {
    cell: Arc<Mutex<Option<T>>>,
}

/// A scalar destination holding exactly one record behind an `Arc`.
pub struct OneShared<T> {
    cell: Arc<Mutex<Option<Arc<T>>>>,
}

/// A collection destination holding records by value, in request-key order.
pub struct Many<T> {
    cell: Arc<Mutex<Option<Vec<T>>>>,
}

/// A collection destination holding records behind `Arc`s, in request-key order.
pub struct ManyShared<T> {
    cell: Arc<Mutex<Option<Vec<Arc<T>>>>>,
}

impl<T> One<T> {
    pub fn new() -> Self {
        One {
            cell: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether the engine has written this slot yet.
    pub fn is_loaded(&self) -> bool {
        self.cell.lock().is_some()
    }

    /// Moves the record out, leaving the slot pending.
    pub fn take(&self) -> Option<T> {
        self.cell.lock().take()
    }
}

impl<T: Clone> One<T> {
    /// Clones the record out, `None` while the slot is pending.
    pub fn get(&self) -> Option<T> {
        self.cell.lock().clone()
    }
}

impl<T> OneShared<T> {
    pub fn new() -> Self {
        OneShared {
            cell: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.lock().is_some()
    }

    pub fn take(&self) -> Option<Arc<T>> {
        self.cell.lock().take()
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.cell.lock().clone()
    }
}

impl<T> Many<T> {
    pub fn new() -> Self {
        Many {
            cell: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether the engine has written this slot yet. An empty result counts
    /// as loaded.
    pub fn is_loaded(&self) -> bool {
        self.cell.lock().is_some()
    }

    /// Moves the records out, leaving the slot pending.
    pub fn take(&self) -> Option<Vec<T>> {
        self.cell.lock().take()
    }
}

impl<T: Clone> Many<T> {
    /// Clones the records out; empty while the slot is pending.
    pub fn get(&self) -> Vec<T> {
        self.cell.lock().clone().unwrap_or_default()
    }
}

impl<T> ManyShared<T> {
    pub fn new() -> Self {
        ManyShared {
            cell: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.lock().is_some()
    }

    pub fn take(&self) -> Option<Vec<Arc<T>>> {
        self.cell.lock().take()
    }

    pub fn get(&self) -> Vec<Arc<T>> {
        self.cell.lock().clone().unwrap_or_default()
    }
}

/// Collection destinations accepted by [`Loader::load_many`] and
/// [`Loader::load_all`](crate::Loader::load_all).
///
/// [`Loader::load_many`]: crate::Loader::load_many
pub trait ManySlot<T>: sealed::Sealed + Clone + Send + Sync + 'static {
    #[doc(hidden)]
    fn fill(&self, values: Vec<Arc<T>>);
}

/// Scalar destinations accepted by [`Loader::load`](crate::Loader::load).
pub trait OneSlot<T>: sealed::Sealed + Clone + Send + Sync + 'static {
    #[doc(hidden)]
    fn fill(&self, value: Arc<T>);
}

impl<T> sealed::Sealed for One<T> {}
impl<T> sealed::Sealed for OneShared<T> {}
impl<T> sealed::Sealed for Many<T> {}
impl<T> sealed::Sealed for ManyShared<T> {}

impl<T> OneSlot<T> for One<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fill(&self, value: Arc<T>) {
        let value = Arc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone());
        *self.cell.lock() = Some(value);
    }
}

impl<T> OneSlot<T> for OneShared<T>
where
    T: Send + Sync + 'static,
{
    fn fill(&self, value: Arc<T>) {
        *self.cell.lock() = Some(value);
    }
}

impl<T> ManySlot<T> for Many<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fill(&self, values: Vec<Arc<T>>) {
        let values = values
            .into_iter()
            .map(|value| Arc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone()))
            .collect();
        *self.cell.lock() = Some(values);
    }
}

impl<T> ManySlot<T> for ManyShared<T>
where
    T: Send + Sync + 'static,
{
    fn fill(&self, values: Vec<Arc<T>>) {
        *self.cell.lock() = Some(values);
    }
}

impl<T> Clone for One<T> {
    fn clone(&self) -> Self {
        One {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> Clone for OneShared<T> {
    fn clone(&self) -> Self {
        OneShared {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> Clone for Many<T> {
    fn clone(&self) -> Self {
        Many {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> Clone for ManyShared<T> {
    fn clone(&self) -> Self {
        ManyShared {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> Default for One<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Default for OneShared<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Default for Many<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Default for ManyShared<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for One<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.cell.lock() {
            Some(value) => value.fmt(f),
            None => f.write_str("<pending>"),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for OneShared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.cell.lock() {
            Some(value) => value.fmt(f),
            None => f.write_str("<pending>"),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Many<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.cell.lock() {
            Some(values) => values.fmt(f),
            None => f.write_str("<pending>"),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ManyShared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.cell.lock() {
            Some(values) => values.fmt(f),
            None => f.write_str("<pending>"),
        }
    }
}

impl<T: PartialEq> PartialEq for One<T> {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.cell, &other.cell) {
            return true;
        }
        *self.cell.lock() == *other.cell.lock()
    }
}

impl<T: PartialEq> PartialEq for Many<T> {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.cell, &other.cell) {
            return true;
        }
        *self.cell.lock() == *other.cell.lock()
    }
}

impl<T: PartialEq> PartialEq for OneShared<T> {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.cell, &other.cell) {
            return true;
        }
        match (&*self.cell.lock(), &*other.cell.lock()) {
            (Some(left), Some(right)) => **left == **right,
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: PartialEq> PartialEq for ManyShared<T> {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.cell, &other.cell) {
            return true;
        }
        match (&*self.cell.lock(), &*other.cell.lock()) {
            (Some(left), Some(right)) => {
                left.len() == right.len()
                    && left.iter().zip(right.iter()).all(|(l, r)| **l == **r)
            }
            (None, None) => true,
            _ => false,
        }
    }
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    impl<T: Serialize> Serialize for One<T> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.cell.lock().serialize(serializer)
        }
    }

    impl<T: Serialize> Serialize for OneShared<T> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.cell.lock().as_deref().serialize(serializer)
        }
    }

    impl<T: Serialize> Serialize for Many<T> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.cell.lock().as_deref().unwrap_or(&[]).serialize(serializer)
        }
    }

    impl<T: Serialize> Serialize for ManyShared<T> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match &*self.cell.lock() {
                Some(values) => serializer.collect_seq(values.iter().map(Arc::as_ref)),
                None => serializer.collect_seq(std::iter::empty::<&T>()),
            }
        }
    }

    impl<'de, T: Deserialize<'de>> Deserialize<'de> for One<T> {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let value = Option::<T>::deserialize(deserializer)?;
            Ok(One {
                cell: Arc::new(Mutex::new(value)),
            })
        }
    }

    impl<'de, T: Deserialize<'de>> Deserialize<'de> for OneShared<T> {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let value = Option::<T>::deserialize(deserializer)?;
            Ok(OneShared {
                cell: Arc::new(Mutex::new(value.map(Arc::new))),
            })
        }
    }

    impl<'de, T: Deserialize<'de>> Deserialize<'de> for Many<T> {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let values = Vec::<T>::deserialize(deserializer)?;
            Ok(Many {
                cell: Arc::new(Mutex::new(Some(values))),
            })
        }
    }

    impl<'de, T: Deserialize<'de>> Deserialize<'de> for ManyShared<T> {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let values = Vec::<T>::deserialize(deserializer)?;
            Ok(ManyShared {
                cell: Arc::new(Mutex::new(Some(values.into_iter().map(Arc::new).collect()))),
            })
        }
    }
}
