//! The consensus-engine trait boundary.
//!
//! A `raftkv` group is built *on top of* a replicated log: leader election,
//! log replication, and durability of the log and snapshot bytes are all
//! someone else's problem. This crate only defines the seam a group uses to
//! talk to whatever engine is actually running underneath it, mirroring the
//! way a Raft implementation itself depends on a `RaftStorage`/`RaftNetwork`
//! pair rather than reaching for a concrete disk or socket.
//!
//! Production code supplies a real implementation of [`ConsensusEngine`].
//! [`testing::LocalEngine`] supplies an in-memory stand-in good enough to
//! drive the group logic in this workspace's own tests; it is not itself a
//! consensus algorithm and must never be used outside of tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod testing;

/// Identifies a single server within a group.
pub type NodeId = u64;

/// Identifies a replica group.
pub type GroupId = u64;

/// A position in the consensus log.
pub type LogIndex = u64;

/// A consensus term, used only to detect that "the entry at this index was
/// proposed by someone else" — the term itself carries no meaning to a
/// group beyond that.
pub type Term = u64;

/// The result of proposing an entry to the engine (`Start` in §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartResult {
    /// The index the entry would occupy *if* this node remains leader and
    /// no other entry is chosen first. Not a promise of commitment.
    pub index: LogIndex,
    /// The term under which the entry was accepted.
    pub term: Term,
    /// Whether this node believed itself to be the leader at propose time.
    pub is_leader: bool,
}

/// The result of `GetState` (§6): a cheap, local read of role and term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineState {
    pub term: Term,
    pub is_leader: bool,
}

/// Errors surfaced synchronously by the engine boundary. Everything else
/// (conflicting commit, timeout) is a property of the apply stream, not of
/// these calls, and is handled by the caller watching `last_applied`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("consensus engine is shutting down")]
    ShuttingDown,
    #[error("snapshot index {requested} is ahead of the last known applied index {last_applied}")]
    SnapshotAheadOfApplied {
        requested: LogIndex,
        last_applied: LogIndex,
    },
}

/// One entry delivered on the engine's apply output stream, in index order.
///
/// A group's apply loop is the single consumer of this stream; see
/// `raftkv_group::apply`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApplyMsg {
    /// A committed log entry ready to be applied to the state machine.
    Command {
        index: LogIndex,
        term: Term,
        data: Vec<u8>,
    },
    /// A snapshot that must replace the state machine wholesale.
    Snapshot {
        index: LogIndex,
        term: Term,
        data: Vec<u8>,
    },
}

impl ApplyMsg {
    pub fn index(&self) -> LogIndex {
        match self {
            ApplyMsg::Command { index, .. } => *index,
            ApplyMsg::Snapshot { index, .. } => *index,
        }
    }
}

/// The receiving end of the apply output stream (§6).
pub type ApplyReceiver = tokio::sync::mpsc::Receiver<ApplyMsg>;
/// The sending end; only engine implementations (and test doubles) hold one.
pub type ApplySender = tokio::sync::mpsc::Sender<ApplyMsg>;

/// The consensus engine interface a group consumes (§6).
///
/// Implementations are expected to be cheap to clone-by-`Arc` and safe to
/// call concurrently from many tasks (submit path, apply loop, config
/// poller all hold a handle).
#[async_trait]
pub trait ConsensusEngine: Send + Sync + 'static {
    /// Propose `data` as the next log entry. Non-blocking with respect to
    /// commitment: returns as soon as the local engine has accepted (or
    /// rejected) the proposal, long before it is known to be committed.
    async fn start(&self, data: Vec<u8>) -> StartResult;

    /// A cheap, local read of this node's current term and leadership.
    async fn get_state(&self) -> EngineState;

    /// Hand a serialized state-machine snapshot to the engine, along with
    /// the highest log index it covers, so the engine may compact its log
    /// up to that point.
    async fn snapshot(&self, through_index: LogIndex, data: Vec<u8>) -> Result<(), EngineError>;

    /// Bytes of log currently persisted since the last compaction. A group
    /// compares this against its own `max_raft_state` tunable to decide
    /// whether to take a snapshot (§4.4 step 6); the engine, not the group,
    /// knows how big its own on-disk representation actually is.
    async fn persisted_size(&self) -> u64;
}
