use std::any::{type_name, TypeId};
use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::sync::Arc;

use crate::dest::{Many, ManyShared, One, OneShared};
use crate::error::LoadError;
use crate::resolver::{Entity, IntoResolver, Key, ResolverEntry};
use crate::session::{GroupKey, Invocation, Session};

/// Batch-loads object graphs from user-supplied resolvers, primarily intended
/// for mitigating the N+1 problem when hydrating nested records.
///
/// A `Registry` is the long-lived catalogue of batch resolvers, indexed by
/// the (entity type, key type) pair each resolver serves. Fetchers are added
/// with [`Registry::register`] in any accepted shape (see [`IntoResolver`]);
/// the same entity may be registered under several key types.
///
/// Each call in the `load` family runs one independent session: the requested
/// keys are resolved, and every nested load the resolvers enqueue through
/// their [`Loader`](crate::Loader) handle is collected, grouped by entity and
/// key type, deduplicated, and driven as one resolver call per group, level
/// by level, until the whole graph is resolved. Hydrating N users who
/// reference M addresses apiece therefore costs one user fetch plus one
/// address fetch, not 1 + N·M.
///
/// Sessions are strictly sequential and never shared; the registry itself is
/// read-only during loads and can be used from several tasks at once.
/// `C` is the context type passed through to resolvers that want one.
pub struct Registry<C = ()> {
    resolvers: HashMap<TypeId, HashMap<TypeId, ResolverEntry<C>>>,
    max_depth: Option<usize>,
}

impl<C> Registry<C> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Registry {
            resolvers: HashMap::new(),
            max_depth: None,
        }
    }

    /// Caps how deep nested loads may recurse.
    ///
    /// The engine does not detect cycles; a resolver graph that keeps
    /// requesting deeper entities recurses until this bound aborts the
    /// session. Unlimited by default.
    pub fn with_max_depth(mut self, limit: usize) -> Self {
        self.max_depth = Some(limit);
        self
    }

    pub(crate) fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    pub(crate) fn entry(&self, group: &GroupKey) -> Option<&ResolverEntry<C>> {
        self.resolvers.get(&group.entity)?.get(&group.key)
    }
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Registry<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// Registers a batch fetcher for the (entity, key) pair its signature
    /// declares.
    ///
    /// Fails with [`LoadError::DuplicateResolver`] if the pair is already
    /// taken. Registration requires exclusive access, so a registry cannot be
    /// mutated while loads are running.
    pub fn register<F, M>(&mut self, fetcher: F) -> Result<(), LoadError>
    where
        F: IntoResolver<C, M>,
    {
        let registered = fetcher.into_registered();
        let by_key = self.resolvers.entry(registered.entity_id).or_default();
        match by_key.entry(registered.key_id) {
            MapEntry::Occupied(occupied) => Err(LoadError::DuplicateResolver {
                entity: occupied.get().entity,
                key: occupied.get().key,
            }),
            MapEntry::Vacant(vacant) => {
                vacant.insert(registered.entry);
                Ok(())
            }
        }
    }

    /// Loads the records for `keys` in request order, duplicates included.
    ///
    /// An empty `keys` returns an empty collection without consulting any
    /// resolver.
    pub async fn load_with<K, T>(&self, ctx: C, keys: Vec<K>) -> Result<Vec<T>, LoadError>
    where
        K: Key,
        T: Entity + Clone,
    {
        let dest = Many::new();
        self.run(ctx, Invocation::many::<K, T, Many<T>>(keys, dest.clone()))
            .await?;
        Ok(dest.take().unwrap_or_default())
    }

    /// As [`Registry::load_with`], returning shared records.
    pub async fn load_shared_with<K, T>(
        &self,
        ctx: C,
        keys: Vec<K>,
    ) -> Result<Vec<Arc<T>>, LoadError>
    where
        K: Key,
        T: Entity,
    {
        let dest = ManyShared::new();
        self.run(ctx, Invocation::many::<K, T, ManyShared<T>>(keys, dest.clone()))
            .await?;
        Ok(dest.take().unwrap_or_default())
    }

    /// Loads the single record for `key`.
    ///
    /// Exactly one value must resolve: none fails with "no data found",
    /// several with "multiple data found".
    pub async fn load_one_with<K, T>(&self, ctx: C, key: K) -> Result<T, LoadError>
    where
        K: Key,
        T: Entity + Clone,
    {
        let shown = format!("{key:?}");
        let dest = One::new();
        self.run(ctx, Invocation::one::<K, T, One<T>>(key, dest.clone()))
            .await?;
        dest.take().ok_or_else(|| LoadError::NotFound {
            entity: type_name::<T>(),
            key: shown,
        })
    }

    /// As [`Registry::load_one_with`], returning a shared record.
    pub async fn load_one_shared_with<K, T>(&self, ctx: C, key: K) -> Result<Arc<T>, LoadError>
    where
        K: Key,
        T: Entity,
    {
        let shown = format!("{key:?}");
        let dest = OneShared::new();
        self.run(ctx, Invocation::one::<K, T, OneShared<T>>(key, dest.clone()))
            .await?;
        dest.take().ok_or_else(|| LoadError::NotFound {
            entity: type_name::<T>(),
            key: shown,
        })
    }

    async fn run(&self, ctx: C, invocation: Invocation) -> Result<(), LoadError> {
        let session = Session::root(self, ctx);
        session.push(invocation);
        session.execute().await
    }
}

impl<C> Registry<C>
where
    C: Clone + Default + Send + Sync + 'static,
{
    /// [`Registry::load_with`] with a default context.
    pub async fn load<K, T>(&self, keys: Vec<K>) -> Result<Vec<T>, LoadError>
    where
        K: Key,
        T: Entity + Clone,
    {
        self.load_with(C::default(), keys).await
    }

    /// [`Registry::load_shared_with`] with a default context.
    pub async fn load_shared<K, T>(&self, keys: Vec<K>) -> Result<Vec<Arc<T>>, LoadError>
    where
        K: Key,
        T: Entity,
    {
        self.load_shared_with(C::default(), keys).await
    }

    /// [`Registry::load_one_with`] with a default context.
    pub async fn load_one<K, T>(&self, key: K) -> Result<T, LoadError>
    where
        K: Key,
        T: Entity + Clone,
    {
        self.load_one_with(C::default(), key).await
    }

    /// [`Registry::load_one_shared_with`] with a default context.
    pub async fn load_one_shared<K, T>(&self, key: K) -> Result<Arc<T>, LoadError>
    where
        K: Key,
        T: Entity,
    {
        self.load_one_shared_with(C::default(), key).await
    }
}
