//! The command submit path (§4.2) and wait-for-commit (§4.3).

use raftkv_consensus::ConsensusEngine;
use raftkv_shardctl::ControllerClient;
use tokio::sync::oneshot;

use crate::group::Group;
use crate::transport::GroupTransport;
use crate::types::{ClientId, Error, LogIndex, Nonce, OpBody, ReqNum, ShardNum};

pub(crate) enum AdmitOutcome {
    /// §4.2 step 3: the session already reflects this exact request, so
    /// the reply can be synthesized from current state without
    /// re-proposing.
    FastPath,
    /// §4.2 step 4: a fresh proposal was submitted and must be waited on.
    Proposed { index: LogIndex, nonce: Nonce },
}

impl<E: ConsensusEngine, C: ControllerClient, T: GroupTransport> Group<E, C, T> {
    /// §4.2 steps 1-4, all performed under `mu`. Step 5 (waiting) happens
    /// outside this function so `mu` is not held across the wait.
    pub(crate) async fn admit(
        &self,
        client_id: ClientId,
        req_num: ReqNum,
        shard_num: ShardNum,
        body: &OpBody,
    ) -> Result<AdmitOutcome, Error> {
        let mut state = self.state.lock().await;

        // Step 1.
        let engine_state = self.engine.get_state().await;
        if !engine_state.is_leader {
            return Err(Error::WrongLeader);
        }

        // Step 2: KV ops only, and only for real clients.
        if client_id != crate::types::LOCAL {
            if let Some(shard) = body.kv_shard() {
                if state.config.owner(shard) != self.gid {
                    return Err(Error::WrongGroup);
                }
            }
        }

        // Step 3: dedup fast path.
        let key = (client_id, shard_num);
        if let Some(session) = state.sessions.get(&key) {
            if session.matches_fast_path(req_num) && session.last_op_index >= 0 {
                if let Some(record) = state.log.get(&(session.last_op_index as LogIndex)) {
                    if record.nonce == Some(session.last_nonce) {
                        return Ok(AdmitOutcome::FastPath);
                    }
                }
            }
        }

        // Step 4.
        let nonce: Nonce = rand::random();
        let op = crate::types::Op {
            nonce,
            client_id,
            req_num,
            shard_num,
            body: body.clone(),
        };
        let data = serde_json::to_vec(&op).expect("Op serialization cannot fail");
        let start = self.engine.start(data).await;
        if !start.is_leader {
            return Err(Error::WrongLeader);
        }
        Ok(AdmitOutcome::Proposed {
            index: start.index,
            nonce,
        })
    }

    /// §4.3: wait for the proposed index to be applied, distinguishing
    /// "my command committed" from "my slot was stolen" via the nonce.
    pub(crate) async fn wait_for_commit(&self, index: LogIndex, nonce: Nonce) -> Result<(), Error> {
        let rx = {
            let mut state = self.state.lock().await;
            if state.last_applied >= index {
                return match state.log.get(&index) {
                    Some(record) if record.nonce == Some(nonce) => Ok(()),
                    _ => Err(Error::CommitConflict),
                };
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.entry(index).or_default().push((nonce, tx));
            rx
        };

        match tokio::time::timeout(self.config.commit_wait, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_recv_dropped)) => Err(Error::CommitTimeout),
            Err(_elapsed) => Err(Error::CommitTimeout),
        }
    }

    /// Glue for §4.2 + §4.3: admit the request, then wait if it was
    /// actually proposed. Reply shaping (§4.6) is left to the caller,
    /// which reads current state once this returns `Ok`.
    pub(crate) async fn admit_and_commit(
        &self,
        client_id: ClientId,
        req_num: ReqNum,
        shard_num: ShardNum,
        body: OpBody,
    ) -> Result<(), Error> {
        match self.admit(client_id, req_num, shard_num, &body).await? {
            AdmitOutcome::FastPath => Ok(()),
            AdmitOutcome::Proposed { index, nonce } => self.wait_for_commit(index, nonce).await,
        }
    }
}
