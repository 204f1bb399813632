use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use nestload_rs::{Entity, Loader, Many, ManyShared, Registry};

/// Records every resolver call together with the keys it received.
#[derive(Clone, Default)]
struct Trace(Arc<Mutex<Vec<(&'static str, Vec<i64>)>>>);

impl Trace {
    fn record(&self, resolver: &'static str, keys: &[i64]) {
        self.0.lock().push((resolver, keys.to_vec()));
    }

    fn calls(&self) -> Vec<(&'static str, Vec<i64>)> {
        self.0.lock().clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: i64,
    campaigns: Many<Campaign>,
}
impl Entity for User {}

#[derive(Debug, Clone, PartialEq)]
struct Campaign {
    id: i64,
    flights: Many<Flight>,
}
impl Entity for Campaign {}

#[derive(Debug, Clone, PartialEq)]
struct Flight {
    id: i64,
    coupons: Many<Coupon>,
}
impl Entity for Flight {}

#[derive(Debug, Clone, PartialEq)]
struct Coupon {
    id: i64,
    clips: Many<Clip>,
}
impl Entity for Coupon {}

#[derive(Debug, Clone, PartialEq)]
struct Clip {
    id: i64,
    title: String,
}
impl Entity for Clip {}

fn clip(id: i64) -> Clip {
    let title = match id {
        1 => "klippity",
        2 => "klappity",
        _ => "untitled",
    };
    Clip {
        id,
        title: title.to_owned(),
    }
}

async fn load_clips(ids: Vec<i64>) -> HashMap<i64, Clip> {
    ids.iter().map(|id| (*id, clip(*id))).collect()
}

#[tokio::test]
async fn flat_load_preserves_request_order() {
    let mut registry: Registry = Registry::new();
    registry.register(load_clips).unwrap();

    let clips: Vec<Clip> = registry.load(vec![1_i64, 2]).await.unwrap();
    assert_eq!(clips, vec![clip(1), clip(2)]);

    let reversed: Vec<Clip> = registry.load(vec![2_i64, 1]).await.unwrap();
    assert_eq!(reversed, vec![clip(2), clip(1)]);
}

#[tokio::test]
async fn duplicate_keys_are_preserved_in_the_destination() {
    let mut registry: Registry = Registry::new();
    registry.register(load_clips).unwrap();

    let clips: Vec<Clip> = registry.load(vec![2_i64, 1, 2]).await.unwrap();
    assert_eq!(clips, vec![clip(2), clip(1), clip(2)]);
}

async fn load_users(trace: Trace, loader: Loader, ids: Vec<i64>) -> HashMap<i64, User> {
    trace.record("users", &ids);
    let memberships: HashMap<i64, Vec<i64>> = HashMap::from([(1, vec![1, 2]), (2, vec![2])]);
    ids.iter()
        .map(|id| {
            let user = User {
                id: *id,
                campaigns: Many::new(),
            };
            loader.load_many(
                memberships.get(id).cloned().unwrap_or_default(),
                &user.campaigns,
            );
            (*id, user)
        })
        .collect()
}

async fn load_campaigns(trace: Trace, ids: Vec<i64>) -> HashMap<i64, Campaign> {
    trace.record("campaigns", &ids);
    ids.iter()
        .map(|id| {
            (
                *id,
                Campaign {
                    id: *id,
                    flights: Many::new(),
                },
            )
        })
        .collect()
}

#[tokio::test]
async fn sibling_loads_coalesce_into_one_call_per_level() {
    let mut registry = Registry::new();
    registry.register(load_users).unwrap();
    registry.register(load_campaigns).unwrap();

    let trace = Trace::default();
    let users: Vec<User> = registry
        .load_with(trace.clone(), vec![1_i64, 2])
        .await
        .unwrap();

    assert_eq!(users[0].campaigns.get().len(), 2);
    assert_eq!(users[1].campaigns.get().len(), 1);
    assert_eq!(users[1].campaigns.get()[0].id, 2);

    let calls = trace.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], ("users", vec![1, 2]));
    assert_eq!(calls[1].0, "campaigns");
    // The campaign keys are the deduplicated union; their order is not part
    // of the contract.
    let mut campaign_keys = calls[1].1.clone();
    campaign_keys.sort_unstable();
    assert_eq!(campaign_keys, vec![1, 2]);
}

// Each chain resolver fans out to keys [id, id + 1], so every level overlaps
// with its siblings and exercises the per-level dedup.
async fn chain_users(trace: Trace, loader: Loader, ids: Vec<i64>) -> HashMap<i64, User> {
    trace.record("users", &ids);
    ids.iter()
        .map(|id| {
            let user = User {
                id: *id,
                campaigns: Many::new(),
            };
            loader.load_many(vec![*id, *id + 1], &user.campaigns);
            (*id, user)
        })
        .collect()
}

async fn chain_campaigns(trace: Trace, loader: Loader, ids: Vec<i64>) -> HashMap<i64, Campaign> {
    trace.record("campaigns", &ids);
    ids.iter()
        .map(|id| {
            let campaign = Campaign {
                id: *id,
                flights: Many::new(),
            };
            loader.load_many(vec![*id, *id + 1], &campaign.flights);
            (*id, campaign)
        })
        .collect()
}

async fn chain_flights(trace: Trace, loader: Loader, ids: Vec<i64>) -> HashMap<i64, Flight> {
    trace.record("flights", &ids);
    ids.iter()
        .map(|id| {
            let flight = Flight {
                id: *id,
                coupons: Many::new(),
            };
            loader.load_many(vec![*id, *id + 1], &flight.coupons);
            (*id, flight)
        })
        .collect()
}

async fn chain_coupons(trace: Trace, loader: Loader, ids: Vec<i64>) -> HashMap<i64, Coupon> {
    trace.record("coupons", &ids);
    ids.iter()
        .map(|id| {
            let coupon = Coupon {
                id: *id,
                clips: Many::new(),
            };
            loader.load_many(vec![*id, *id + 1], &coupon.clips);
            (*id, coupon)
        })
        .collect()
}

async fn chain_clips(trace: Trace, ids: Vec<i64>) -> HashMap<i64, Clip> {
    trace.record("clips", &ids);
    ids.iter().map(|id| (*id, clip(*id))).collect()
}

#[tokio::test]
async fn five_level_graph_costs_five_resolver_calls() {
    let mut registry = Registry::new();
    registry.register(chain_users).unwrap();
    registry.register(chain_campaigns).unwrap();
    registry.register(chain_flights).unwrap();
    registry.register(chain_coupons).unwrap();
    registry.register(chain_clips).unwrap();

    let trace = Trace::default();
    let users: Vec<User> = registry
        .load_with(trace.clone(), vec![1_i64, 2])
        .await
        .unwrap();

    let calls = trace.calls();
    assert_eq!(calls.len(), 5);
    assert_eq!(
        calls.iter().map(|call| call.0).collect::<Vec<_>>(),
        vec!["users", "campaigns", "flights", "coupons", "clips"]
    );

    // Every level receives the deduplicated union of the previous level's
    // child keys.
    let expected: [Vec<i64>; 5] = [
        vec![1, 2],
        vec![1, 2, 3],
        vec![1, 2, 3, 4],
        vec![1, 2, 3, 4, 5],
        vec![1, 2, 3, 4, 5, 6],
    ];
    for (call, expected) in calls.iter().zip(expected) {
        let mut keys = call.1.clone();
        keys.sort_unstable();
        assert_eq!(keys, expected);
    }

    let leaf: Vec<i64> = users[0].campaigns.get()[0].flights.get()[0].coupons.get()[0]
        .clips
        .get()
        .iter()
        .map(|clip| clip.id)
        .collect();
    assert_eq!(leaf, vec![1, 2]);
}

async fn grouped_clips(ids: Vec<i64>) -> HashMap<i64, Vec<Clip>> {
    ids.iter().map(|id| (*id, vec![clip(*id)])).collect()
}

async fn arc_clips(ids: Vec<i64>) -> HashMap<i64, Arc<Clip>> {
    ids.iter().map(|id| (*id, Arc::new(clip(*id)))).collect()
}

#[tokio::test]
async fn singular_and_grouped_outputs_are_indistinguishable() {
    let mut singular: Registry = Registry::new();
    singular.register(load_clips).unwrap();
    let mut grouped: Registry = Registry::new();
    grouped.register(grouped_clips).unwrap();
    let mut shared: Registry = Registry::new();
    shared.register(arc_clips).unwrap();

    let a: Vec<Clip> = singular.load(vec![3_i64, 1, 2]).await.unwrap();
    let b: Vec<Clip> = grouped.load(vec![3_i64, 1, 2]).await.unwrap();
    let c: Vec<Clip> = shared.load(vec![3_i64, 1, 2]).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a, c);
}

#[derive(Debug, Clone, PartialEq)]
struct Holder {
    owned: Many<Clip>,
    shared: ManyShared<Clip>,
}
impl Entity for Holder {}

async fn load_holders(trace: Trace, loader: Loader, ids: Vec<i64>) -> HashMap<i64, Holder> {
    trace.record("holders", &ids);
    ids.iter()
        .map(|id| {
            let holder = Holder {
                owned: Many::new(),
                shared: ManyShared::new(),
            };
            loader.load_many(vec![1_i64, 2], &holder.owned);
            loader.load_many(vec![2_i64, 1], &holder.shared);
            (*id, holder)
        })
        .collect()
}

async fn shared_clips(trace: Trace, ids: Vec<i64>) -> HashMap<i64, Vec<Arc<Clip>>> {
    trace.record("clips", &ids);
    ids.iter().map(|id| (*id, vec![Arc::new(clip(*id))])).collect()
}

#[tokio::test]
async fn value_and_shared_destinations_share_one_batch() {
    let mut registry = Registry::new();
    registry.register(load_holders).unwrap();
    registry.register(shared_clips).unwrap();

    let trace = Trace::default();
    let holders: Vec<Holder> = registry.load_with(trace.clone(), vec![1_i64]).await.unwrap();

    // One clips call serves both destinations.
    assert_eq!(
        trace.calls().iter().filter(|call| call.0 == "clips").count(),
        1
    );

    let holder = &holders[0];
    let owned = holder.owned.get();
    let shared = holder.shared.get();
    assert_eq!(owned.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(shared.iter().map(|c| c.id).collect::<Vec<_>>(), vec![2, 1]);
    for (owned, shared) in owned.iter().zip(shared.iter().rev()) {
        assert_eq!(owned, shared.as_ref());
    }
}

async fn counted_clips(trace: Trace, ids: Vec<i64>) -> HashMap<i64, Clip> {
    trace.record("clips", &ids);
    ids.iter().map(|id| (*id, clip(*id))).collect()
}

#[tokio::test]
async fn empty_key_collection_consults_no_resolver() {
    let mut registry = Registry::new();
    registry.register(counted_clips).unwrap();

    let trace = Trace::default();
    let clips: Vec<Clip> = registry
        .load_with(trace.clone(), Vec::<i64>::new())
        .await
        .unwrap();

    assert!(clips.is_empty());
    assert!(trace.calls().is_empty());
}

#[tokio::test]
async fn empty_key_collection_needs_no_resolver_at_all() {
    let registry: Registry = Registry::new();
    let clips: Vec<Clip> = registry.load(Vec::<i64>::new()).await.unwrap();
    assert!(clips.is_empty());
}
