//! The config poller (§4.5): a background task that keeps a group's
//! configuration caught up with the controller, one epoch at a time.

use std::sync::Arc;

use raftkv_consensus::ConsensusEngine;
use raftkv_shardctl::ControllerClient;

use crate::group::{is_shutdown, Group, ShutdownSignal};
use crate::transport::GroupTransport;
use crate::types::Error;

/// Polls the controller every `poll_interval`, advancing the group's
/// configuration one epoch at a time until it matches the controller's
/// latest (§4.5): reconfiguration is never skipped ahead, since each
/// intermediate epoch may move different shards.
pub(crate) async fn run<E: ConsensusEngine, C: ControllerClient, T: GroupTransport>(
    group: Arc<Group<E, C, T>>,
    mut shutdown: ShutdownSignal,
) {
    let mut ticker = tokio::time::interval(group.config.poll_interval);
    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || is_shutdown(&shutdown) {
                    tracing::info!(gid = group.gid, "config poller shutting down");
                    return;
                }
            }
            _ = ticker.tick() => {
                advance_one_tick(&group).await;
            }
        }
    }
}

/// Holds `ck_mu` for the whole tick (§4.5, §5): a client RPC arriving
/// mid-advance waits rather than racing the poller's own `ChangeConfig`
/// proposals.
async fn advance_one_tick<E: ConsensusEngine, C: ControllerClient, T: GroupTransport>(group: &Arc<Group<E, C, T>>) {
    let _ck = group.client_mutex.lock().await;

    loop {
        let current = group.current_config_num();
        let next = match group.controller.query((current + 1) as i64).await {
            config if config.num == current + 1 => config,
            _ => return, // not yet published; try again next tick
        };

        match group.propose_change_config(next.clone()).await {
            Ok(()) => {
                tracing::info!(gid = group.gid, epoch = next.num, "advanced to new configuration");
                // loop again: there may be another epoch already published
            }
            Err(Error::WrongLeader) => return,
            Err(err) => {
                tracing::warn!(gid = group.gid, epoch = next.num, %err, "failed to advance configuration, retrying next tick");
                return;
            }
        }
    }
}
