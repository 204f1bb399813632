#![cfg(feature = "serde")]

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use nestload_rs::{Entity, Loader, Many, One, Registry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Track {
    id: i64,
    title: String,
    tags: Many<Tag>,
    primary: One<Tag>,
}
impl Entity for Track {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tag {
    name: String,
}
impl Entity for Tag {}

fn tag(name: &str) -> Tag {
    Tag {
        name: name.to_owned(),
    }
}

async fn load_tracks(loader: Loader, ids: Vec<i64>) -> HashMap<i64, Track> {
    ids.iter()
        .map(|id| {
            let track = Track {
                id: *id,
                title: "humoresque".to_owned(),
                tags: Many::new(),
                primary: One::new(),
            };
            loader.load_all(*id, &track.tags);
            loader.load(*id + 100, &track.primary);
            (*id, track)
        })
        .collect()
}

async fn load_tags(ids: Vec<i64>) -> HashMap<i64, Vec<Tag>> {
    let groups: HashMap<i64, Vec<Tag>> = HashMap::from([
        (1, vec![tag("rock"), tag("live")]),
        (101, vec![tag("studio")]),
    ]);
    ids.iter()
        .map(|id| (*id, groups.get(id).cloned().unwrap_or_default()))
        .collect()
}

#[tokio::test]
async fn loaded_graphs_round_trip_through_json() {
    let mut registry: Registry = Registry::new();
    registry.register(load_tracks).unwrap();
    registry.register(load_tags).unwrap();

    let tracks: Vec<Track> = registry.load(vec![1_i64]).await.unwrap();

    let value = serde_json::to_value(&tracks).unwrap();
    assert_eq!(
        value,
        json!([{
            "id": 1,
            "title": "humoresque",
            "tags": [{"name": "rock"}, {"name": "live"}],
            "primary": {"name": "studio"},
        }])
    );

    let restored: Vec<Track> = serde_json::from_value(value).unwrap();
    assert_eq!(restored, tracks);
}

#[tokio::test]
async fn pending_slots_serialize_as_empty() {
    let track = Track {
        id: 9,
        title: "untitled".to_owned(),
        tags: Many::new(),
        primary: One::new(),
    };

    let value = serde_json::to_value(&track).unwrap();
    assert_eq!(value["tags"], json!([]));
    assert_eq!(value["primary"], json!(null));
}
