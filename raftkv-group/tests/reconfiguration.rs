//! Reconfiguration handoff (§4.7): a shard moving from one group to
//! another must become unreachable on its old owner and fully present,
//! including its prior value, on its new owner — without the controller or
//! either group being told to move data directly.

use std::sync::Arc;

use raftkv_group::Error;
use raftkv_shardctl::testing::StaticController;
use raftkv_shardctl::{key_shard, Config, NSHARDS};

mod support;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shard_migrates_with_its_data() {
    let controller = Arc::new(StaticController::new(Config::empty()));
    let router = raftkv_group::testing::GroupRouter::new();

    let (g1, _e1) = support::spawn_group(1, "g1", controller.clone(), router.clone(), support::test_config()).await;
    let (g2, _e2) = support::spawn_group(2, "g2", controller.clone(), router.clone(), support::test_config()).await;

    // Epoch 1: every shard on group 1.
    controller
        .advance(Config {
            num: 1,
            shards: vec![1; NSHARDS],
            groups: [(1u64, vec!["g1".to_string()]), (2u64, vec!["g2".to_string()])].into_iter().collect(),
        })
        .await;
    g1.group.wait(support::WAIT).config_at_least(1).await.expect("g1 reaches epoch 1");
    g2.group.wait(support::WAIT).config_at_least(1).await.expect("g2 reaches epoch 1");

    let key = "migrating-key".to_string();
    let shard = key_shard(&key);
    g1.group.put(100, 1, key.clone(), "before-move".into()).await.expect("put on owner commits");

    // Epoch 2: every shard moves to group 2.
    controller
        .advance(Config {
            num: 2,
            shards: vec![2; NSHARDS],
            groups: [(1u64, vec!["g1".to_string()]), (2u64, vec!["g2".to_string()])].into_iter().collect(),
        })
        .await;
    g1.group.wait(support::WAIT).config_at_least(2).await.expect("g1 reaches epoch 2");
    g2.group.wait(support::WAIT).config_at_least(2).await.expect("g2 pulls shards and reaches epoch 2");

    let err = g1.group.get(100, 2, key.clone()).await.expect_err("old owner must reject after handoff");
    assert_eq!(err, Error::WrongGroup, "shard {shard} no longer belongs to group 1");

    let value = g2.group.get(100, 3, key.clone()).await.expect("new owner serves migrated data");
    assert_eq!(value, "before-move");
}
