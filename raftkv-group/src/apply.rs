//! The apply loop (§4.4): the single consumer of the consensus engine's
//! output stream, and the sole mutator of the state machine (§5).

use std::sync::Arc;

use raftkv_consensus::{ApplyMsg, ApplyReceiver, ConsensusEngine};
use raftkv_shardctl::ControllerClient;

use crate::group::{is_shutdown, Group, ShutdownSignal};
use crate::log_index::{gc_through, LogRecord};
use crate::metrics::GroupMetrics;
use crate::session::Session;
use crate::snapshot::Snapshot;
use crate::state::State;
use crate::transport::GroupTransport;
use crate::types::{LogIndex, Op, OpBody, Term};

/// Drains `apply_rx` until it is closed or `shutdown` fires, applying each
/// entry to the group's state machine in order.
pub(crate) async fn run<E: ConsensusEngine, C: ControllerClient, T: GroupTransport>(
    group: Arc<Group<E, C, T>>,
    mut apply_rx: ApplyReceiver,
    mut shutdown: ShutdownSignal,
) {
    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || is_shutdown(&shutdown) {
                    tracing::info!(gid = group.gid, "apply loop shutting down");
                    return;
                }
            }
            msg = apply_rx.recv() => {
                match msg {
                    None => {
                        tracing::info!(gid = group.gid, "apply channel closed, apply loop exiting");
                        return;
                    }
                    Some(ApplyMsg::Command { index, term, data }) => {
                        group.apply_command(index, term, data).await;
                    }
                    Some(ApplyMsg::Snapshot { index, data, .. }) => {
                        group.apply_snapshot(index, &data).await;
                    }
                }
            }
        }
    }
}

impl<E: ConsensusEngine, C: ControllerClient, T: GroupTransport> Group<E, C, T> {
    /// §4.4: apply one committed command entry.
    #[tracing::instrument(level = "debug", skip(self, data), fields(gid = self.gid, index))]
    pub(crate) async fn apply_command(&self, index: LogIndex, _term: Term, data: Vec<u8>) {
        let op: Op = match serde_json::from_slice(&data) {
            Ok(op) => op,
            Err(err) => {
                tracing::error!(gid = self.gid, %err, "apply loop received a corrupt log entry; aborting");
                std::process::abort();
            }
        };

        // Phase 1: under `mu`, do everything that doesn't require an
        // outbound RPC. A `ChangeConfig` that actually needs to pull
        // shards is deferred to phase 2 so `mu` is not held across
        // cross-group calls (§4.7, §5).
        enum Phase1 {
            Done,
            NeedsMigration { target: raftkv_shardctl::Config },
        }

        let phase1 = {
            let mut state = self.state.lock().await;

            if index != state.last_applied + 1 {
                tracing::warn!(
                    gid = self.gid,
                    expected = state.last_applied + 1,
                    got = index,
                    "apply loop observed a gap in log indices"
                );
            }
            state.last_applied = index;

            let key = (op.client_id, op.shard_num);
            let stale = state
                .sessions
                .get(&key)
                .map(|s| s.is_stale_replay(index, op.req_num))
                .unwrap_or(false);

            let result = if stale {
                if let Some(s) = state.sessions.get_mut(&key) {
                    s.last_op_index = index as i64;
                }
                state.log.insert(index, LogRecord { nonce: Some(op.nonce) });
                Phase1::Done
            } else {
                match &op.body {
                    OpBody::Get { .. } => {
                        let owned = self.owns(&state, op.shard_num);
                        finish_simple(&mut state, &op, index, owned);
                        Phase1::Done
                    }
                    OpBody::Put { key: k, value } => {
                        let owned = self.owns(&state, op.shard_num);
                        if owned {
                            state.kv.insert(k.clone(), value.clone());
                        }
                        finish_simple(&mut state, &op, index, owned);
                        Phase1::Done
                    }
                    OpBody::Append { key: k, value } => {
                        let owned = self.owns(&state, op.shard_num);
                        if owned {
                            state.kv.entry(k.clone()).or_default().push_str(value);
                        }
                        finish_simple(&mut state, &op, index, owned);
                        Phase1::Done
                    }
                    OpBody::ChangeConfig { config } => {
                        if config.num > state.config.num && state.config.num > 0 {
                            // §4.7: migration proper — pull newly owned
                            // shards from their previous real owners.
                            Phase1::NeedsMigration { target: config.clone() }
                        } else if config.num > state.config.num {
                            // state.config.num == 0: the epoch-0 config is
                            // empty and owns nothing, so there is no source
                            // to pull from — the group simply starts owning
                            // its epoch-1 shards with no prior data to merge.
                            state.config = config.clone();
                            finish_simple(&mut state, &op, index, true);
                            Phase1::Done
                        } else {
                            // A stale/duplicate ChangeConfig for an epoch
                            // already applied; leave the current config alone.
                            finish_simple(&mut state, &op, index, true);
                            Phase1::Done
                        }
                    }
                }
            };

            // A `ChangeConfig` awaiting migration has not yet written its
            // `L` entry: waking waiters now would tell the proposer its
            // slot was stolen, when really the config just hasn't taken
            // effect yet (§4.7). Everything else is final as of here.
            if matches!(result, Phase1::Done) {
                state.wake_waiters_at(index);
            }
            self.publish_metrics(&state);
            self.maybe_snapshot(&mut state, index).await;
            result
        };

        if let Phase1::NeedsMigration { target } = phase1 {
            self.advance_config(index, &op, target).await;
        }
    }

    /// §4.4: replace the whole state machine from a snapshot delivered
    /// in-band on the apply channel.
    #[tracing::instrument(level = "debug", skip(self, data), fields(gid = self.gid, index))]
    pub(crate) async fn apply_snapshot(&self, index: LogIndex, data: &[u8]) {
        let snapshot = match Snapshot::decode(data) {
            Ok(s) => s,
            Err(err) => {
                tracing::error!(gid = self.gid, %err, "received an undecodable snapshot; aborting");
                std::process::abort();
            }
        };

        let mut state = self.state.lock().await;
        state.kv = snapshot.kv;
        state.sessions = snapshot.sessions;
        state.config = snapshot.config;
        state.last_applied = index;
        // Waiters for indices at or below `i` that are not in `L` will
        // simply time out and be retried by the client (§4.4).
        state.log.clear();
        self.publish_metrics(&state);
    }

    pub(crate) fn owns(&self, state: &State, shard: raftkv_shardctl::ShardNum) -> bool {
        state.config.owner(shard) == self.gid
    }

    pub(crate) fn publish_metrics(&self, state: &State) {
        let metrics = GroupMetrics {
            gid: self.gid,
            last_applied: state.last_applied,
            config_num: state.config.num,
            owned_shard_count: (0..raftkv_shardctl::NSHARDS).filter(|&s| self.owns(state, s)).count(),
            session_count: state.sessions.len(),
        };
        let _ = self.metrics_tx.send(metrics);
    }

    /// §4.4 step 6: if snapshotting is enabled and the engine's persisted
    /// size has crossed the threshold, serialize state and hand it off,
    /// then drop `L` entries that can no longer be needed (§3).
    async fn maybe_snapshot(&self, state: &mut State, index: LogIndex) {
        let Some(threshold) = self.config.max_raft_state else {
            return;
        };
        if self.engine.persisted_size().await <= threshold {
            return;
        }
        let snapshot = Snapshot {
            kv: state.kv.clone(),
            sessions: state.sessions.clone(),
            config: state.config.clone(),
        };
        let bytes = match snapshot.encode() {
            Ok(b) => b,
            Err(err) => {
                tracing::error!(gid = self.gid, %err, "failed to encode snapshot");
                return;
            }
        };
        if let Err(err) = self.engine.snapshot(index, bytes).await {
            tracing::warn!(gid = self.gid, %err, "engine declined snapshot");
            return;
        }
        gc_through(&mut state.log, index);
    }
}

fn finish_simple(state: &mut State, op: &Op, index: LogIndex, owned: bool) {
    let key = (op.client_id, op.shard_num);
    if owned {
        state.sessions.insert(
            key,
            Session {
                last_req_num: op.req_num,
                last_op_index: index as i64,
                last_nonce: op.nonce,
                valid: true,
            },
        );
        state.log.insert(index, LogRecord { nonce: Some(op.nonce) });
    } else {
        // §4.4 step 5: sentinel nonce so the waiter fails with
        // `COMMIT_CONFLICT` and its client retries elsewhere. The session
        // itself is left untouched: a different group owns this shard and
        // will build the authoritative session for it.
        state.log.insert(index, LogRecord { nonce: None });
    }
}
