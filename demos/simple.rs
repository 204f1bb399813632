use std::collections::HashMap;

use nestload_rs::{Entity, Loader, Many, Registry};

// Minimal two-level graph: films reference their cast, and the whole load
// costs one resolver call per level no matter how many films are requested.
#[derive(Debug, Clone)]
struct Film {
    title: String,
    cast: Many<Actor>,
}
impl Entity for Film {}

#[derive(Debug, Clone)]
struct Actor {
    name: String,
}
impl Entity for Actor {}

async fn load_films(loader: Loader, ids: Vec<i64>) -> HashMap<i64, Film> {
    let titles: HashMap<i64, &str> = HashMap::from([(7, "samurai"), (12, "angry men")]);
    let cast: HashMap<i64, Vec<i64>> = HashMap::from([(7, vec![1, 2]), (12, vec![2, 3])]);

    ids.into_iter()
        .map(|id| {
            let film = Film {
                title: titles.get(&id).copied().unwrap_or("unknown").to_owned(),
                cast: Many::new(),
            };
            loader.load_many(cast.get(&id).cloned().unwrap_or_default(), &film.cast);
            (id, film)
        })
        .collect()
}

async fn load_actors(ids: Vec<i64>) -> HashMap<i64, Actor> {
    let names: HashMap<i64, &str> = HashMap::from([(1, "mifune"), (2, "shimura"), (3, "fonda")]);
    ids.into_iter()
        .filter_map(|id| {
            names.get(&id).map(|name| {
                (
                    id,
                    Actor {
                        name: (*name).to_owned(),
                    },
                )
            })
        })
        .collect()
}

#[tokio::main]
async fn main() {
    let mut registry: Registry = Registry::new();
    registry.register(load_films).unwrap();
    registry.register(load_actors).unwrap();

    let films: Vec<Film> = registry.load(vec![7_i64, 12]).await.unwrap();
    for film in &films {
        let cast: Vec<String> = film
            .cast
            .get()
            .iter()
            .map(|actor| actor.name.clone())
            .collect();
        println!("{}: {}", film.title, cast.join(", "));
    }
}
