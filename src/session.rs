//! Per-load sessions: the invocation queue, the child-loader handle, and the
//! level-by-level batch planner.

use std::any::{type_name, Any, TypeId};
use std::mem;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use tracing::{span, Instrument, Level};

use crate::dest::{ManySlot, OneSlot};
use crate::error::LoadError;
use crate::registry::Registry;
use crate::resolver::{Batch, Entity, ErasedKeys, Key};
#[cfg(feature = "stats")]
use crate::session_stats::SessionStats;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct GroupKey {
    pub(crate) entity: TypeId,
    pub(crate) key: TypeId,
}

/// One deferred child load, recorded while a resolver body runs and consumed
/// by the planner one level later.
///
/// The two function pointers are monomorphized at the call site, where the
/// key, entity and destination types are still known; they are what lets the
/// planner work a type-erased queue without downcasting itself.
pub(crate) struct Invocation {
    group: GroupKey,
    entity: &'static str,
    key: &'static str,
    /// The caller's keys in original order, duplicates included.
    keys: ErasedKeys,
    dest: Box<dyn Any + Send>,
    gather: fn(&[Invocation]) -> Gathered,
    apply: fn(Invocation, Option<&(dyn Any + Send)>) -> Result<(), LoadError>,
}

/// The deduplicated key union of one bucket, in first-seen order.
struct Gathered {
    keys: ErasedKeys,
    unique: usize,
    requested: usize,
}

impl Invocation {
    pub(crate) fn many<K, T, D>(keys: Vec<K>, dest: D) -> Self
    where
        K: Key,
        T: Entity,
        D: ManySlot<T>,
    {
        Invocation {
            group: GroupKey {
                entity: TypeId::of::<T>(),
                key: TypeId::of::<K>(),
            },
            entity: type_name::<T>(),
            key: type_name::<K>(),
            keys: Box::new(keys),
            dest: Box::new(dest),
            gather: gather_keys::<K>,
            apply: apply_many::<K, T, D>,
        }
    }

    pub(crate) fn one<K, T, D>(key: K, dest: D) -> Self
    where
        K: Key,
        T: Entity,
        D: OneSlot<T>,
    {
        Invocation {
            group: GroupKey {
                entity: TypeId::of::<T>(),
                key: TypeId::of::<K>(),
            },
            entity: type_name::<T>(),
            key: type_name::<K>(),
            keys: Box::new(vec![key]),
            dest: Box::new(dest),
            gather: gather_keys::<K>,
            apply: apply_one::<K, T, D>,
        }
    }
}

fn gather_keys<K: Key>(invocations: &[Invocation]) -> Gathered {
    let mut union = IndexSet::new();
    let mut requested = 0;
    for invocation in invocations {
        let keys = invocation
            .keys
            .downcast_ref::<Vec<K>>()
            .expect("bucket holds a single key type");
        requested += keys.len();
        union.extend(keys.iter().cloned());
    }
    let keys: Vec<K> = union.into_iter().collect();
    Gathered {
        unique: keys.len(),
        requested,
        keys: Box::new(keys),
    }
}

fn apply_many<K, T, D>(
    invocation: Invocation,
    batch: Option<&(dyn Any + Send)>,
) -> Result<(), LoadError>
where
    K: Key,
    T: Entity,
    D: ManySlot<T>,
{
    let keys = invocation
        .keys
        .downcast::<Vec<K>>()
        .expect("invocation keys match its group");
    let dest = invocation
        .dest
        .downcast::<D>()
        .expect("invocation destination matches its group");
    let Some(batch) = batch else {
        dest.fill(Vec::new());
        return Ok(());
    };
    let batch = batch
        .downcast_ref::<Batch<K, T>>()
        .expect("batch resolved for this group");
    let mut values = Vec::new();
    for key in keys.iter() {
        let group = batch.get(key).ok_or_else(|| LoadError::NotFound {
            entity: type_name::<T>(),
            key: format!("{key:?}"),
        })?;
        values.extend(group.iter().cloned());
    }
    dest.fill(values);
    Ok(())
}

fn apply_one<K, T, D>(
    invocation: Invocation,
    batch: Option<&(dyn Any + Send)>,
) -> Result<(), LoadError>
where
    K: Key,
    T: Entity,
    D: OneSlot<T>,
{
    let keys = invocation
        .keys
        .downcast::<Vec<K>>()
        .expect("invocation keys match its group");
    let dest = invocation
        .dest
        .downcast::<D>()
        .expect("invocation destination matches its group");
    let key = keys
        .into_iter()
        .next()
        .expect("scalar invocation holds one key");
    let entity = type_name::<T>();
    let shown = format!("{key:?}");
    let group = batch
        .and_then(|batch| {
            batch
                .downcast_ref::<Batch<K, T>>()
                .expect("batch resolved for this group")
                .get(&key)
        })
        .ok_or_else(|| LoadError::NotFound {
            entity,
            key: shown.clone(),
        })?;
    match group.as_slice() {
        [] => Err(LoadError::NotFound { entity, key: shown }),
        [value] => {
            dest.fill(Arc::clone(value));
            Ok(())
        }
        values => Err(LoadError::Ambiguous {
            entity,
            key: shown,
            count: values.len(),
        }),
    }
}

/// Handle through which resolver bodies request nested loads.
///
/// A `Loader` performs no I/O. Every call records one invocation on the
/// current session's queue and returns immediately; the planner processes the
/// queue after the resolver body returns, fusing sibling requests for the
/// same entity and key type into a single batched resolver call. Failures
/// (unknown resolver, missing keys, arity violations) surface from the
/// top-level load, not from these methods.
#[derive(Clone)]
pub struct Loader {
    queue: Arc<Mutex<Vec<Invocation>>>,
}

impl Loader {
    /// Requests the single record for `key` into a scalar destination.
    ///
    /// Exactly one value must resolve for the key: none is "no data found",
    /// several is "multiple data found".
    pub fn load<K, T, D>(&self, key: K, dest: &D)
    where
        K: Key,
        T: Entity,
        D: OneSlot<T>,
    {
        self.queue
            .lock()
            .push(Invocation::one::<K, T, D>(key, dest.clone()));
    }

    /// Requests the records for `keys` into a collection destination.
    ///
    /// Key order (duplicates included) is preserved; each key's values are
    /// appended contiguously.
    pub fn load_many<K, T, D>(&self, keys: impl IntoIterator<Item = K>, dest: &D)
    where
        K: Key,
        T: Entity,
        D: ManySlot<T>,
    {
        self.queue
            .lock()
            .push(Invocation::many::<K, T, D>(keys.into_iter().collect(), dest.clone()));
    }

    /// Requests every record grouped under a single `key` into a collection
    /// destination, e.g. all roles of one user.
    pub fn load_all<K, T, D>(&self, key: K, dest: &D)
    where
        K: Key,
        T: Entity,
        D: ManySlot<T>,
    {
        self.queue
            .lock()
            .push(Invocation::many::<K, T, D>(vec![key], dest.clone()));
    }
}

/// Transient state of one load: a borrowed registry, the caller's context,
/// and the invocation queue for the current level. Child sessions share the
/// registry and context but own a fresh queue.
pub(crate) struct Session<'r, C> {
    registry: &'r Registry<C>,
    ctx: C,
    queue: Arc<Mutex<Vec<Invocation>>>,
    depth: usize,
    #[cfg(feature = "stats")]
    stats: Arc<Mutex<SessionStats>>,
}

impl<'r, C> Session<'r, C>
where
    C: Clone + Send + Sync + 'static,
{
    pub(crate) fn root(registry: &'r Registry<C>, ctx: C) -> Self {
        Session {
            registry,
            ctx,
            queue: Arc::new(Mutex::new(Vec::new())),
            depth: 0,
            #[cfg(feature = "stats")]
            stats: Arc::new(Mutex::new(SessionStats::default())),
        }
    }

    fn child(&self) -> Self {
        Session {
            registry: self.registry,
            ctx: self.ctx.clone(),
            queue: Arc::new(Mutex::new(Vec::new())),
            depth: self.depth + 1,
            #[cfg(feature = "stats")]
            stats: Arc::clone(&self.stats),
        }
    }

    pub(crate) fn loader(&self) -> Loader {
        Loader {
            queue: Arc::clone(&self.queue),
        }
    }

    pub(crate) fn push(&self, invocation: Invocation) {
        self.queue.lock().push(invocation);
    }

    /// Drives one level to completion: group, dedup, resolve (recursing into
    /// the nested loads each resolver enqueued), check totality, distribute.
    pub(crate) fn execute(&self) -> BoxFuture<'_, Result<(), LoadError>> {
        let span = span!(Level::TRACE, "load_level", depth = self.depth);
        async move {
            let invocations = mem::take(&mut *self.queue.lock());
            if invocations.is_empty() {
                return Ok(());
            }
            if let Some(limit) = self.registry.max_depth() {
                if self.depth > limit {
                    return Err(LoadError::DepthExceeded { limit });
                }
            }
            #[cfg(feature = "stats")]
            self.stats.lock().record_level(self.depth, invocations.len());

            let mut buckets: IndexMap<GroupKey, Vec<Invocation>> = IndexMap::new();
            for invocation in invocations {
                buckets.entry(invocation.group).or_default().push(invocation);
            }

            for (group, bucket) in buckets {
                let Gathered {
                    keys,
                    unique,
                    requested,
                } = (bucket[0].gather)(&bucket);
                tracing::debug!(
                    entity = bucket[0].entity,
                    key_type = bucket[0].key,
                    invocations = bucket.len(),
                    requested,
                    unique,
                    "executing batch"
                );
                #[cfg(feature = "stats")]
                self.stats.lock().record_bucket(requested, unique);

                let batch = if unique == 0 {
                    None
                } else {
                    let entry = self.registry.entry(&group).ok_or(LoadError::NoResolver {
                        entity: bucket[0].entity,
                        key: bucket[0].key,
                    })?;
                    #[cfg(feature = "stats")]
                    self.stats.lock().record_resolver_call();
                    let child = self.child();
                    let batch = entry
                        .resolver
                        .resolve(self.ctx.clone(), child.loader(), keys)
                        .await?;
                    child.execute().await?;
                    let returned = (entry.batch_len)(batch.as_ref());
                    if returned != unique {
                        return Err(LoadError::Incomplete {
                            entity: entry.entity,
                            key: entry.key,
                            requested: unique,
                            returned,
                        });
                    }
                    Some(batch)
                };

                for invocation in bucket {
                    let apply = invocation.apply;
                    apply(invocation, batch.as_deref())?;
                }
            }
            Ok(())
        }
        .instrument(span)
        .boxed()
    }
}
