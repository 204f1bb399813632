//! Fetcher classification and the uniform adapter every resolver is wrapped in.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BoxError, LoadError};
use crate::session::Loader;

/// Marker for record types resolvers can produce.
///
/// Opting a type in keeps value-arity classification unambiguous: `Vec<_>` and
/// `Arc<_>` never implement it, so a fetcher returning `HashMap<K, Vec<T>>`
/// always reads as "a group of `T` per key", never as "one `Vec<T>` entity".
pub trait Entity: Debug + Send + Sync + 'static {}

/// Requirements on key types. Blanket-implemented; any hashable, clonable,
/// printable value type qualifies.
pub trait Key: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<K> Key for K where K: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Canonical in-flight form every fetcher output is normalized to: one group
/// of shared records per requested key.
pub(crate) type Batch<K, T> = HashMap<K, Vec<Arc<T>>>;

pub(crate) type ErasedKeys = Box<dyn Any + Send>;
pub(crate) type ErasedBatch = Box<dyn Any + Send>;

/// The value position of a fetcher's result map: `T`, `Arc<T>`, `Vec<T>` or
/// `Vec<Arc<T>>`. Singular values become one-element groups.
pub trait EntityValue<T: Entity> {
    fn into_group(self) -> Vec<Arc<T>>;
}

impl<T: Entity> EntityValue<T> for T {
    fn into_group(self) -> Vec<Arc<T>> {
        vec![Arc::new(self)]
    }
}

impl<T: Entity> EntityValue<T> for Arc<T> {
    fn into_group(self) -> Vec<Arc<T>> {
        vec![self]
    }
}

impl<T: Entity> EntityValue<T> for Vec<T> {
    fn into_group(self) -> Vec<Arc<T>> {
        self.into_iter().map(Arc::new).collect()
    }
}

impl<T: Entity> EntityValue<T> for Vec<Arc<T>> {
    fn into_group(self) -> Vec<Arc<T>> {
        self
    }
}

/// The return position of a fetcher: a bare result map, or a fallible one
/// whose error is propagated verbatim.
pub trait ResolverOutput<K: Key, T: Entity> {
    fn into_batch(self) -> Result<Batch<K, T>, BoxError>;
}

impl<K, T, V> ResolverOutput<K, T> for HashMap<K, V>
where
    K: Key,
    T: Entity,
    V: EntityValue<T>,
{
    fn into_batch(self) -> Result<Batch<K, T>, BoxError> {
        Ok(self
            .into_iter()
            .map(|(key, value)| (key, value.into_group()))
            .collect())
    }
}

impl<K, T, V, E> ResolverOutput<K, T> for Result<HashMap<K, V>, E>
where
    K: Key,
    T: Entity,
    V: EntityValue<T>,
    E: Into<BoxError>,
{
    fn into_batch(self) -> Result<Batch<K, T>, BoxError> {
        match self {
            Ok(map) => map.into_batch(),
            Err(err) => Err(err.into()),
        }
    }
}

/// Uniform calling convention every accepted fetcher shape is adapted to:
/// `(ctx, child loader, erased keys) -> erased batch`.
#[async_trait]
pub(crate) trait ErasedResolver<C>: Send + Sync {
    async fn resolve(&self, ctx: C, loader: Loader, keys: ErasedKeys)
        -> Result<ErasedBatch, LoadError>;
}

pub(crate) struct ResolverEntry<C> {
    pub(crate) resolver: Box<dyn ErasedResolver<C>>,
    pub(crate) batch_len: fn(&(dyn Any + Send)) -> usize,
    pub(crate) entity: &'static str,
    pub(crate) key: &'static str,
}

struct Adapter<G, Fut, K, T> {
    fetch: G,
    _marker: PhantomData<fn() -> (Fut, K, T)>,
}

#[async_trait]
impl<C, G, Fut, K, T> ErasedResolver<C> for Adapter<G, Fut, K, T>
where
    C: Send + Sync + 'static,
    G: Fn(C, Loader, Vec<K>) -> Fut + Send + Sync,
    Fut: Future + Send + 'static,
    Fut::Output: ResolverOutput<K, T>,
    K: Key,
    T: Entity,
{
    async fn resolve(
        &self,
        ctx: C,
        loader: Loader,
        keys: ErasedKeys,
    ) -> Result<ErasedBatch, LoadError> {
        let keys = keys
            .downcast::<Vec<K>>()
            .map_err(|_| LoadError::KeyTypeMismatch {
                entity: type_name::<T>(),
                expected: type_name::<Vec<K>>(),
            })?;
        let batch = (self.fetch)(ctx, loader, *keys)
            .await
            .into_batch()
            .map_err(|source| LoadError::Resolver {
                entity: type_name::<T>(),
                source,
            })?;
        Ok(Box::new(batch) as ErasedBatch)
    }
}

/// A classified fetcher, ready for insertion into the registry.
#[doc(hidden)]
pub struct Registered<C> {
    pub(crate) entity_id: TypeId,
    pub(crate) key_id: TypeId,
    pub(crate) entry: ResolverEntry<C>,
}

fn classify<C, G, Fut, K, T>(fetch: G) -> Registered<C>
where
    C: Send + Sync + 'static,
    G: Fn(C, Loader, Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: ResolverOutput<K, T>,
    K: Key,
    T: Entity,
{
    Registered {
        entity_id: TypeId::of::<T>(),
        key_id: TypeId::of::<K>(),
        entry: ResolverEntry {
            resolver: Box::new(Adapter {
                fetch,
                _marker: PhantomData,
            }),
            batch_len: |batch| batch.downcast_ref::<Batch<K, T>>().map_or(0, HashMap::len),
            entity: type_name::<T>(),
            key: type_name::<K>(),
        },
    }
}

#[doc(hidden)]
pub struct Bare;
#[doc(hidden)]
pub struct WithCtx;
#[doc(hidden)]
pub struct WithLoader;
#[doc(hidden)]
pub struct WithCtxAndLoader;

/// An async batch fetcher in one of the accepted shapes.
///
/// A fetcher takes one to three arguments and returns a result map:
///
/// | arguments | returns |
/// |---|---|
/// | `(Vec<K>)` | `HashMap<K, V>` or `Result<HashMap<K, V>, E>` |
/// | `(ctx, Vec<K>)` | same |
/// | `(Loader, Vec<K>)` | same |
/// | `(ctx, Loader, Vec<K>)` | same |
///
/// where `ctx` is the registry's context type, [`Loader`] requests nested
/// loads, and `V` is `T`, `Arc<T>`, `Vec<T>` or `Vec<Arc<T>>` for some
/// [`Entity`] type `T` (see [`EntityValue`] and [`ResolverOutput`]).
///
/// The result map must contain an entry for every requested key; an empty
/// group counts as an entry. Returning fewer (or other) keys fails the load
/// with "not all items found".
pub trait IntoResolver<C, M>: Sized {
    #[doc(hidden)]
    fn into_registered(self) -> Registered<C>;
}

impl<C, F, Fut, K, T> IntoResolver<C, (Bare, Fut, K, T)> for F
where
    C: Send + Sync + 'static,
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: ResolverOutput<K, T>,
    K: Key,
    T: Entity,
{
    fn into_registered(self) -> Registered<C> {
        classify::<C, _, Fut, K, T>(move |_ctx: C, _loader: Loader, keys: Vec<K>| (self)(keys))
    }
}

impl<C, F, Fut, K, T> IntoResolver<C, (WithCtx, Fut, K, T)> for F
where
    C: Send + Sync + 'static,
    F: Fn(C, Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: ResolverOutput<K, T>,
    K: Key,
    T: Entity,
{
    fn into_registered(self) -> Registered<C> {
        classify::<C, _, Fut, K, T>(move |ctx: C, _loader: Loader, keys: Vec<K>| (self)(ctx, keys))
    }
}

impl<C, F, Fut, K, T> IntoResolver<C, (WithLoader, Fut, K, T)> for F
where
    C: Send + Sync + 'static,
    F: Fn(Loader, Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: ResolverOutput<K, T>,
    K: Key,
    T: Entity,
{
    fn into_registered(self) -> Registered<C> {
        classify::<C, _, Fut, K, T>(move |_ctx: C, loader: Loader, keys: Vec<K>| (self)(loader, keys))
    }
}

impl<C, F, Fut, K, T> IntoResolver<C, (WithCtxAndLoader, Fut, K, T)> for F
where
    C: Send + Sync + 'static,
    F: Fn(C, Loader, Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: ResolverOutput<K, T>,
    K: Key,
    T: Entity,
{
    fn into_registered(self) -> Registered<C> {
        classify::<C, F, Fut, K, T>(self)
    }
}
