//! Shard migration (§4.7) — the hardest subsystem. Triggered from inside
//! the apply loop when applying a `ChangeConfig` that actually moves
//! shards into this group; releases `mu` for the duration of outbound
//! pulls and reacquires it once per merge (§5).

use std::collections::{HashMap, HashSet};

use raftkv_consensus::ConsensusEngine;
use raftkv_shardctl::{key_shard, Config, ControllerClient, GroupId, ShardNum};

use crate::group::Group;
use crate::log_index::LogRecord;
use crate::session::{Session, SessionKey};
use crate::transport::{GroupTransport, ShardPullRequest, TransportError};
use crate::types::{Error, LogIndex, Op, LOCAL};

impl<E: ConsensusEngine, C: ControllerClient, T: GroupTransport> Group<E, C, T> {
    /// Pull every shard this group is newly gaining under `target` from
    /// their previous owners, merge the results, then finalize the
    /// `ChangeConfig` application at `index` (§4.7).
    ///
    /// A `ChangeConfig(C')` command is considered applied only once every
    /// needed shard has been merged — nothing else writes `L[index]` or
    /// wakes this index's waiters until this function returns.
    pub(crate) async fn advance_config(&self, index: LogIndex, op: &Op, target: Config) {
        let old_config = self.state.lock().await.config.clone();

        let incoming = incoming_shards_by_source(&old_config, &target, self.gid);
        if !incoming.is_empty() {
            tracing::info!(
                gid = self.gid,
                epoch = target.num,
                sources = incoming.len(),
                "pulling shards for new configuration"
            );

            let pulls = incoming
                .into_iter()
                .map(|(src_gid, shards)| self.pull_from_group(&old_config, src_gid, shards, target.num));
            let merges = futures::future::join_all(pulls).await;

            let mut state = self.state.lock().await;
            for (kv, sessions) in merges {
                state.kv.extend(kv);
                for (key, mut session) in sessions {
                    // A session transferred in describes activity on
                    // another group's log; it must never match an entry
                    // of this group's own log-index tracker (§4.7 step 3).
                    session.last_op_index = -1;
                    state.sessions.insert(key, session);
                }
            }
        }

        let mut state = self.state.lock().await;
        state.config = target;
        state.sessions.insert(
            (op.client_id, op.shard_num),
            Session {
                last_req_num: op.req_num,
                last_op_index: index as i64,
                last_nonce: op.nonce,
                valid: true,
            },
        );
        state.log.insert(index, LogRecord { nonce: Some(op.nonce) });
        state.wake_waiters_at(index);
        self.publish_metrics(&state);
    }

    /// Round-robins the servers of `src_gid` as they were under
    /// `old_config`, retrying indefinitely on transport failure,
    /// `WRONG_LEADER`, or `LOWER_CONFIG_NUM` with a backoff between
    /// rounds (§4.7 step 4).
    async fn pull_from_group(
        &self,
        old_config: &Config,
        src_gid: GroupId,
        shards: HashSet<ShardNum>,
        config_num: u64,
    ) -> (HashMap<String, String>, Vec<(SessionKey, Session)>) {
        let servers = old_config.servers_of(src_gid).to_vec();
        let request = ShardPullRequest {
            requester_gid: self.gid,
            shards,
            config_num,
        };

        loop {
            for server in &servers {
                match self.transport.request_shard_state(server, request.clone()).await {
                    Ok(response) => return (response.kv, response.sessions),
                    Err(TransportError::Unreachable) => {}
                    Err(TransportError::Remote(Error::WrongLeader)) => {}
                    Err(TransportError::Remote(Error::LowerConfigNum)) => {}
                    Err(err) => {
                        tracing::warn!(gid = self.gid, src_gid, %err, "unexpected error pulling shard state, retrying");
                    }
                }
            }
            tokio::time::sleep(self.config.migration_retry_backoff).await;
        }
    }

    /// Source side of `RequestShardState` (§4.7, §6).
    #[tracing::instrument(level = "debug", skip(self), fields(gid = self.gid))]
    pub async fn request_shard_state(
        &self,
        requester_gid: GroupId,
        shards: HashSet<ShardNum>,
        config_num: u64,
    ) -> Result<(HashMap<String, String>, Vec<(SessionKey, Session)>), Error> {
        let engine_state = self.engine.get_state().await;
        if !engine_state.is_leader {
            return Err(Error::WrongLeader);
        }

        let state = self.state.lock().await;
        if state.config.num < config_num {
            return Err(Error::LowerConfigNum);
        }

        tracing::debug!(requester_gid, shards = shards.len(), "serving shard pull");

        // The source never deletes the served shards (§4.7): a key
        // belonging to a foreign shard simply becomes unreachable as
        // `apply` filters on current ownership.
        let kv = state
            .kv
            .iter()
            .filter(|(key, _)| shards.contains(&key_shard(key)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let sessions = state
            .sessions
            .iter()
            .filter(|((client_id, shard), _)| *client_id != LOCAL && shards.contains(shard))
            .map(|(k, v)| (*k, *v))
            .collect();

        Ok((kv, sessions))
    }
}

/// Groups, by previous owner, every shard this group is newly gaining
/// between `old` and `new` (§4.7).
fn incoming_shards_by_source(old: &Config, new: &Config, this_gid: GroupId) -> HashMap<GroupId, HashSet<ShardNum>> {
    let mut by_source: HashMap<GroupId, HashSet<ShardNum>> = HashMap::new();
    for shard in 0..raftkv_shardctl::NSHARDS {
        let was = old.owner(shard);
        let now = new.owner(shard);
        if now == this_gid && was != this_gid {
            by_source.entry(was).or_default().insert(shard);
        }
    }
    by_source
}
