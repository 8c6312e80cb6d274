#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use raftkv_consensus::testing::LocalEngine;
use raftkv_group::testing::{GroupRouter, TestGroupHandle};
use raftkv_group::{Group, GroupConfig, GroupConfigBuilder};
use raftkv_shardctl::testing::StaticController;
use raftkv_shardctl::GroupId;

/// A short-interval [`GroupConfig`] suitable for tests, where waiting out
/// the real defaults would make the suite slow.
pub fn test_config() -> GroupConfig {
    GroupConfigBuilder::default()
        .commit_wait(Duration::from_millis(500))
        .poll_interval(Duration::from_millis(10))
        .migration_retry_backoff(Duration::from_millis(10))
        .build()
        .expect("test config is valid")
}

/// Spawn a group on a fresh [`LocalEngine`], registering it with `router`
/// under `server_name` so other groups can reach it.
pub async fn spawn_group(
    gid: GroupId,
    server_name: &str,
    controller: Arc<StaticController>,
    router: Arc<GroupRouter>,
    config: GroupConfig,
) -> (TestGroupHandle, Arc<LocalEngine>) {
    let (engine, apply_rx) = LocalEngine::start();
    let handle = Group::spawn(gid, engine.clone(), apply_rx, controller, router.clone(), config);
    router.register(server_name, handle.group.clone()).await;
    (handle, engine)
}

pub const WAIT: Duration = Duration::from_secs(2);
