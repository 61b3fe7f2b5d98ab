//! Identity cache behaviour of `find`, `preload` and `invalidate_cache`
//!
//! Every test runs against a `MemoryAdapter`, whose call counters show when a
//! lookup went past the cache.

use std::sync::Arc;

use serde_json::{json, Value};

use record_mapper::{
    AdapterError, Error, FindQuery, MapperSettings, MemoryAdapter, Node, Operation, Registry,
};

// ── Test Infrastructure ──────────────────────────────────────────────────

fn setup(settings: MapperSettings) -> (Registry, Arc<MemoryAdapter>) {
    let registry = Registry::with_settings(settings);
    let adapter = Arc::new(MemoryAdapter::new());
    registry.define("Address", adapter.clone()).unwrap();
    registry
        .define("User", adapter.clone())
        .unwrap()
        .map("address", "Address");
    (registry, adapter)
}

fn users() -> Value {
    json!([
        {"id": 1, "name": "ada", "address": {"city": "X"}},
        {"id": 2, "name": "bob"}
    ])
}

// ── Cache hits ───────────────────────────────────────────────────────────

#[tokio::test]
async fn preloaded_record_is_served_without_fetch() {
    let (registry, adapter) = setup(MapperSettings::default());
    let user = registry.model("User").unwrap();
    user.preload(users());

    let found = user.find(json!(1)).await.unwrap().into_instance().unwrap();

    assert_eq!(found.value_at("name"), Some(json!("ada")));
    let Some(Node::Instance(address)) = found.get("address") else {
        panic!("address was not mapped");
    };
    assert!(address.is_model("Address"));
    assert_eq!(adapter.calls(Operation::FindRecord), 0);
}

#[tokio::test]
async fn each_hit_maps_a_fresh_instance() {
    let (registry, _adapter) = setup(MapperSettings::default());
    let user = registry.model("User").unwrap();
    user.preload(users());

    let first = user.find(json!(2)).await.unwrap().into_instance().unwrap();
    let second = user.find(json!(2)).await.unwrap().into_instance().unwrap();
    assert_ne!(first, second);
    assert_eq!(first.to_value(), second.to_value());
}

#[tokio::test]
async fn find_without_id_returns_first_cached_record() {
    let (registry, adapter) = setup(MapperSettings::default());
    let user = registry.model("User").unwrap();
    user.preload(users());

    let found = user
        .find_with(FindQuery::any())
        .await
        .unwrap()
        .into_instance()
        .unwrap();
    assert_eq!(found.id(), Some(json!(1)));
    assert_eq!(adapter.calls(Operation::FindRecord), 0);
}

#[tokio::test]
async fn preload_of_single_record_replaces_cache() {
    let (registry, adapter) = setup(MapperSettings::default());
    adapter.seed("User", json!({"id": 1, "name": "stored"}));
    let user = registry.model("User").unwrap();

    user.preload(users());
    user.preload(json!({"id": 2, "name": "only"}));
    assert_eq!(user.cached_len(), 1);

    let found = user.find(json!(1)).await.unwrap().into_instance().unwrap();
    assert_eq!(found.value_at("name"), Some(json!("stored")));
    assert_eq!(adapter.calls(Operation::FindRecord), 1);
}

// ── Cache misses ─────────────────────────────────────────────────────────

#[tokio::test]
async fn miss_fetches_once_and_maps_result() {
    let (registry, adapter) = setup(MapperSettings::default());
    adapter.seed("User", json!({"id": 3, "address": {"city": "Y"}}));
    let user = registry.model("User").unwrap();
    user.preload(users());

    let found = user.find(json!(3)).await.unwrap().into_instance().unwrap();

    assert_eq!(adapter.calls(Operation::FindRecord), 1);
    assert_eq!(found.value_at("address.city"), Some(json!("Y")));
    assert!(found
        .get("address")
        .and_then(|node| node.as_instance().cloned())
        .is_some_and(|address| address.is_model("Address")));
    // fetched records stay out of the cache unless configured otherwise
    assert_eq!(user.cached_len(), 2);
}

#[tokio::test]
async fn invalidate_forces_fetch() {
    let (registry, adapter) = setup(MapperSettings::default());
    adapter.seed("User", json!({"id": 1, "name": "fresh"}));
    let user = registry.model("User").unwrap();
    user.preload(users());

    user.invalidate_cache();
    assert_eq!(user.cached_len(), 0);

    let found = user.find(json!(1)).await.unwrap().into_instance().unwrap();
    assert_eq!(found.value_at("name"), Some(json!("fresh")));
    assert_eq!(adapter.calls(Operation::FindRecord), 1);
}

#[tokio::test]
async fn fetched_records_cached_when_enabled() {
    let (registry, adapter) = setup(MapperSettings {
        cache_fetched_records: true,
        ..MapperSettings::default()
    });
    adapter.seed("User", json!({"id": 5}));
    let user = registry.model("User").unwrap();

    user.find(json!(5)).await.unwrap();
    user.find(json!(5)).await.unwrap();

    assert_eq!(adapter.calls(Operation::FindRecord), 1);
    assert_eq!(user.cached_len(), 1);
}

#[tokio::test]
async fn query_without_id_maps_a_collection() {
    let (registry, adapter) = setup(MapperSettings::default());
    adapter.seed("User", json!([{"id": 1, "team": "a"}, {"id": 2, "team": "b"}]));
    let user = registry.model("User").unwrap();

    let mapped = user
        .find_with(FindQuery::any().param("team", "b"))
        .await
        .unwrap();
    let collection = mapped.into_collection().unwrap();

    assert_eq!(collection.len(), 1);
    assert_eq!(collection.get(0).unwrap().id(), Some(json!(2)));
}

// ── Failures ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn adapter_failure_propagates_and_leaves_cache_alone() {
    let (registry, adapter) = setup(MapperSettings {
        cache_fetched_records: true,
        ..MapperSettings::default()
    });
    adapter.seed("User", json!({"id": 9}));
    adapter.fail_next(Operation::FindRecord);
    let user = registry.model("User").unwrap();

    let err = user.find(json!(9)).await.unwrap_err();
    assert!(matches!(err, Error::Adapter(AdapterError::Rejected(_))));
    assert_eq!(user.cached_len(), 0);
}

#[tokio::test]
async fn missing_record_is_not_found() {
    let (registry, _adapter) = setup(MapperSettings::default());
    let err = registry.model("User").unwrap().find(json!(404)).await.unwrap_err();
    assert!(matches!(err, Error::Adapter(AdapterError::NotFound(_))));
}

// ── Concurrency ──────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_finds_share_the_registry() {
    let (registry, adapter) = setup(MapperSettings::default());
    adapter.seed("User", json!([{"id": 10}, {"id": 11}]));
    registry.model("User").unwrap().preload(users());
    let registry = Arc::new(registry);

    let mut handles = Vec::new();
    for id in [1, 2, 10, 11] {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let user = registry.model("User").unwrap();
            user.find(json!(id)).await.map(|mapped| mapped.to_value())
        }));
    }

    for (handle, id) in handles.into_iter().zip([1, 2, 10, 11]) {
        let record = handle.await.unwrap().unwrap();
        assert_eq!(record["id"], json!(id));
    }
    assert_eq!(adapter.calls(Operation::FindRecord), 2);
}
