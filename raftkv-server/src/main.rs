//! Process bootstrap (§4.11): parses CLI flags, installs logging, builds a
//! validated [`GroupConfig`], and wires one group's background tasks
//! together. This crate has no third-party consensus engine, shard
//! controller, or group transport to wire against, so it runs the
//! in-workspace [`raftkv_consensus::testing::LocalEngine`],
//! [`raftkv_shardctl::testing::StaticController`], and
//! [`raftkv_group::testing::GroupRouter`] test doubles — the point of this
//! binary is to make the crate runnable end to end in examples and manual
//! testing, not to stand in for a production deployment.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use raftkv_consensus::testing::LocalEngine;
use raftkv_group::testing::GroupRouter;
use raftkv_group::{Group, GroupConfigBuilder};
use raftkv_shardctl::testing::StaticController;
use raftkv_shardctl::{Config, GroupId, NSHARDS};

/// Runs a single replica group against in-process stand-ins for the
/// consensus engine, shard controller, and group transport this crate
/// treats as external collaborators (§6).
#[derive(Debug, Parser)]
#[clap(name = "raftkv-server", version)]
struct Args {
    /// This process's group id, as assigned by the shard controller.
    #[clap(long)]
    gid: GroupId,

    /// This server's own name within its group, e.g. "g1-a". Used only to
    /// label its entry in the demo single-group configuration below.
    #[clap(long, default_value = "g1")]
    server_name: String,

    /// Maximum time a client call waits for its proposal to commit before
    /// surfacing `COMMIT_TIMEOUT` (§4.3), in milliseconds.
    #[clap(long, default_value = "200")]
    commit_wait_ms: u64,

    /// How often the config poller asks the controller for the next
    /// configuration (§4.5), in milliseconds.
    #[clap(long, default_value = "100")]
    poll_interval_ms: u64,

    /// How long a migration round sleeps before retrying an unreachable or
    /// not-yet-advanced source group (§4.7), in milliseconds.
    #[clap(long, default_value = "100")]
    migration_retry_backoff_ms: u64,

    /// Bytes of persisted engine state past which a snapshot is taken
    /// (§4.4 step 6). Unset disables snapshotting.
    #[clap(long)]
    max_raft_state: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    tracing::info!(?args, "starting raftkv-server");

    let group_config = GroupConfigBuilder::default()
        .commit_wait(Duration::from_millis(args.commit_wait_ms))
        .poll_interval(Duration::from_millis(args.poll_interval_ms))
        .migration_retry_backoff(Duration::from_millis(args.migration_retry_backoff_ms))
        .max_raft_state(args.max_raft_state)
        .build()?;

    // A single-group, single-server configuration owning every shard: this
    // binary demonstrates one group end to end, not a multi-group cluster.
    let controller = Arc::new(StaticController::new(Config::empty()));
    let router = GroupRouter::new();

    let (engine, apply_rx) = LocalEngine::start();
    let mut handle = Group::spawn(args.gid, engine, apply_rx, controller.clone(), router.clone(), group_config);
    router.register(args.server_name.clone(), handle.group.clone()).await;

    controller
        .advance(Config {
            num: 1,
            shards: vec![args.gid; NSHARDS],
            groups: [(args.gid, vec![args.server_name.clone()])].into_iter().collect(),
        })
        .await;

    handle
        .group
        .wait(Duration::from_secs(5))
        .config_at_least(1)
        .await
        .map_err(|err| anyhow::anyhow!("group never reached its initial configuration: {err}"))?;
    tracing::info!(gid = args.gid, server = %args.server_name, "group serving all shards");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, stopping background tasks");
    handle.shutdown();
    let _ = handle.apply_task.await;
    let _ = handle.poller_task.await;

    Ok(())
}
