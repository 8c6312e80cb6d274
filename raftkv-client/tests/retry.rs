//! The client retries against a multi-replica-style setup without ever
//! surfacing an error to the caller, and caches whichever server last
//! answered OK (§4.8).

use std::sync::Arc;

use raftkv_client::testing::GroupServerTransport;
use raftkv_client::Client;
use raftkv_consensus::testing::LocalEngine;
use raftkv_group::{Group, GroupConfigBuilder};
use raftkv_shardctl::testing::StaticController;
use raftkv_shardctl::{Config, NSHARDS};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn put_then_get_round_trips_through_a_real_group() {
    let controller = Arc::new(StaticController::new(Config::empty()));
    let router = raftkv_group::testing::GroupRouter::new();
    let transport = GroupServerTransport::new();

    let group_config = GroupConfigBuilder::default()
        .commit_wait(std::time::Duration::from_millis(500))
        .poll_interval(std::time::Duration::from_millis(10))
        .migration_retry_backoff(std::time::Duration::from_millis(10))
        .build()
        .unwrap();

    let (engine, apply_rx) = LocalEngine::start();
    let handle = Group::spawn(1, engine, apply_rx, controller.clone(), router.clone(), group_config);
    router.register("g1", handle.group.clone()).await;
    transport.register("g1", handle.group.clone()).await;

    controller
        .advance(Config {
            num: 1,
            shards: vec![1; NSHARDS],
            groups: [(1u64, vec!["g1".to_string()])].into_iter().collect(),
        })
        .await;
    handle.group.wait(std::time::Duration::from_secs(2)).config_at_least(1).await.expect("group reaches epoch 1");

    let client = Client::new(transport, vec!["g1".to_string()]);
    client.put("k".to_string(), "v1".to_string()).await;
    client.append("k".to_string(), "v2".to_string()).await;

    let value = client.get("k".to_string()).await;
    assert_eq!(value, "v1v2");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_servers_are_skipped_until_one_answers() {
    let controller = Arc::new(StaticController::new(Config::empty()));
    let router = raftkv_group::testing::GroupRouter::new();
    let transport = GroupServerTransport::new();

    let group_config = GroupConfigBuilder::default()
        .commit_wait(std::time::Duration::from_millis(500))
        .poll_interval(std::time::Duration::from_millis(10))
        .migration_retry_backoff(std::time::Duration::from_millis(10))
        .build()
        .unwrap();

    let (engine, apply_rx) = LocalEngine::start();
    let handle = Group::spawn(1, engine, apply_rx, controller.clone(), router.clone(), group_config);
    router.register("real", handle.group.clone()).await;
    transport.register("real", handle.group.clone()).await;

    controller
        .advance(Config {
            num: 1,
            shards: vec![1; NSHARDS],
            groups: [(1u64, vec!["real".to_string()])].into_iter().collect(),
        })
        .await;
    handle.group.wait(std::time::Duration::from_secs(2)).config_at_least(1).await.expect("group reaches epoch 1");

    // "ghost" and "also-ghost" are never registered with the transport, so
    // the client must rotate past both before reaching "real".
    let client = Client::new(transport, vec!["ghost".to_string(), "also-ghost".to_string(), "real".to_string()]);
    client.put("k".to_string(), "v".to_string()).await;
    let value = client.get("k".to_string()).await;
    assert_eq!(value, "v");
}
