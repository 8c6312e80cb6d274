//! An in-memory [`ConsensusEngine`] stand-in for this workspace's own tests.
//!
//! `LocalEngine` is deliberately not a consensus algorithm: it always
//! believes itself to be the leader until a test tells it otherwise, and it
//! appends proposals to its log the moment `start` is called. What it *does*
//! model faithfully is the shape of the boundary a group relies on: a
//! monotonic log, an apply stream delivered in index order, and the ability
//! for "a different entry" to occupy an index a caller was promised — the
//! scenario the nonce machinery in `raftkv-group` exists to detect.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::{ApplyMsg, ApplyReceiver, ConsensusEngine, EngineError, EngineState, LogIndex, StartResult, Term};

struct Inner {
    term: Term,
    is_leader: bool,
    log: Vec<Vec<u8>>,
    last_snapshotted: LogIndex,
    last_snapshot_bytes: Vec<u8>,
}

/// A single-node, in-process test double for [`ConsensusEngine`].
pub struct LocalEngine {
    inner: Mutex<Inner>,
    tx: mpsc::Sender<ApplyMsg>,
}

impl LocalEngine {
    /// Build a new engine, already leader at term 1, returning it alongside
    /// the receiving half of its apply stream.
    pub fn start() -> (Arc<Self>, ApplyReceiver) {
        let (tx, rx) = mpsc::channel(1024);
        let engine = Arc::new(Self {
            inner: Mutex::new(Inner {
                term: 1,
                is_leader: true,
                log: vec![Vec::new()], // index 0 is unused, matching a 1-based log.
                last_snapshotted: 0,
                last_snapshot_bytes: Vec::new(),
            }),
            tx,
        });
        (engine, rx)
    }

    /// Test-only: make this engine stop believing it is the leader, the way
    /// a real engine would after losing an election.
    pub async fn force_step_down(&self) {
        let mut inner = self.inner.lock().await;
        inner.is_leader = false;
    }

    /// Test-only: become leader again in a new term, as if this node won a
    /// subsequent election.
    pub async fn force_become_leader(&self) {
        let mut inner = self.inner.lock().await;
        inner.term += 1;
        inner.is_leader = true;
    }

    /// Test-only: simulate a conflicting leader overwriting the entry at
    /// `index` with a different proposal before it could be delivered to
    /// the apply stream under the original data.
    pub async fn force_conflict_at(&self, index: LogIndex, data: Vec<u8>) {
        let mut inner = self.inner.lock().await;
        let term = inner.term;
        if let Some(slot) = inner.log.get_mut(index as usize) {
            *slot = data.clone();
        }
        self.tx
            .send(ApplyMsg::Command { index, term, data })
            .await
            .expect("test apply receiver dropped");
    }

    /// Deliver every entry appended so far as committed, in order. A real
    /// engine would only do this once a majority acknowledged replication;
    /// this test double treats every proposal as immediately committed.
    async fn deliver(&self, index: LogIndex, term: Term, data: Vec<u8>) {
        let _ = self.tx.send(ApplyMsg::Command { index, term, data }).await;
    }

    /// Test-only: inject a snapshot directly onto the apply stream, as if
    /// the engine decided this follower needed to catch up via install.
    pub async fn deliver_snapshot(&self, index: LogIndex, data: Vec<u8>) {
        let term = self.inner.lock().await.term;
        let _ = self.tx.send(ApplyMsg::Snapshot { index, term, data }).await;
    }

    /// Test-only: the bytes and index handed to the most recent successful
    /// call to `snapshot`, if any. Lets a test simulate handing a follower's
    /// engine the snapshot a leader's engine actually produced.
    pub async fn latest_snapshot(&self) -> Option<(LogIndex, Vec<u8>)> {
        let inner = self.inner.lock().await;
        if inner.last_snapshotted == 0 {
            None
        } else {
            Some((inner.last_snapshotted, inner.last_snapshot_bytes.clone()))
        }
    }
}

#[async_trait]
impl ConsensusEngine for LocalEngine {
    async fn start(&self, data: Vec<u8>) -> StartResult {
        let mut inner = self.inner.lock().await;
        if !inner.is_leader {
            return StartResult {
                index: 0,
                term: inner.term,
                is_leader: false,
            };
        }
        let index = inner.log.len() as LogIndex;
        let term = inner.term;
        inner.log.push(data.clone());
        drop(inner);
        self.deliver(index, term, data).await;
        StartResult {
            index,
            term,
            is_leader: true,
        }
    }

    async fn get_state(&self) -> EngineState {
        let inner = self.inner.lock().await;
        EngineState {
            term: inner.term,
            is_leader: inner.is_leader,
        }
    }

    async fn snapshot(&self, through_index: LogIndex, data: Vec<u8>) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let last_index = inner.log.len() as LogIndex - 1;
        if through_index > last_index {
            return Err(EngineError::SnapshotAheadOfApplied {
                requested: through_index,
                last_applied: last_index,
            });
        }
        inner.last_snapshotted = through_index;
        inner.last_snapshot_bytes = data;
        Ok(())
    }

    async fn persisted_size(&self) -> u64 {
        let inner = self.inner.lock().await;
        inner
            .log
            .iter()
            .skip(inner.last_snapshotted as usize + 1)
            .map(|entry| entry.len() as u64)
            .sum()
    }
}
