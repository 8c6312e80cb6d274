//! A duplicate client request — the same `(client_id, req_num)` delivered
//! twice, as a retrying client would — must be applied at most once (§4.1).

use std::sync::Arc;

use raftkv_shardctl::testing::StaticController;
use raftkv_shardctl::{Config, NSHARDS};

mod support;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_append_is_applied_once() {
    let controller = Arc::new(StaticController::new(Config::empty()));
    let router = raftkv_group::testing::GroupRouter::new();

    let (handle, _engine) = support::spawn_group(1, "g1", controller.clone(), router.clone(), support::test_config()).await;

    controller
        .advance(Config {
            num: 1,
            shards: vec![1; NSHARDS],
            groups: [(1u64, vec!["g1".to_string()])].into_iter().collect(),
        })
        .await;
    handle.group.wait(support::WAIT).config_at_least(1).await.expect("group reaches epoch 1");

    let client_id = 7;
    handle.group.append(client_id, 1, "k".into(), "a".into()).await.expect("first append commits");
    handle.group.append(client_id, 1, "k".into(), "a".into()).await.expect("replay is idempotent, not an error");

    let value = handle.group.get(client_id, 2, "k".into()).await.expect("get commits");
    assert_eq!(value, "a", "a replayed req_num must not be applied twice");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn distinct_req_nums_both_apply() {
    let controller = Arc::new(StaticController::new(Config::empty()));
    let router = raftkv_group::testing::GroupRouter::new();

    let (handle, _engine) = support::spawn_group(1, "g1", controller.clone(), router.clone(), support::test_config()).await;

    controller
        .advance(Config {
            num: 1,
            shards: vec![1; NSHARDS],
            groups: [(1u64, vec!["g1".to_string()])].into_iter().collect(),
        })
        .await;
    handle.group.wait(support::WAIT).config_at_least(1).await.expect("group reaches epoch 1");

    let client_id = 9;
    handle.group.append(client_id, 1, "k".into(), "a".into()).await.expect("req 1 commits");
    handle.group.append(client_id, 2, "k".into(), "b".into()).await.expect("req 2 commits");

    let value = handle.group.get(client_id, 3, "k".into()).await.expect("get commits");
    assert_eq!(value, "ab");
}
