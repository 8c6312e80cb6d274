//! Core data types shared by every part of the group (§3).

use raftkv_shardctl::Config;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use raftkv_shardctl::{key_shard, GroupId, ShardNum, NSHARDS};

/// A client's stable, random identity (§3).
pub type ClientId = u64;

/// Monotonically increasing per client, starting at 1 (§3).
pub type ReqNum = u64;

/// A fresh random value attached to every proposal, used to tell "my
/// command committed" apart from "a different command took my slot"
/// after a log conflict (§3, §4.2).
pub type Nonce = u64;

pub use raftkv_consensus::{LogIndex, Term};

/// Reserved client id for self-proposed `ChangeConfig` commands (§4.1).
/// Sessions keyed by `LOCAL` are never transferred during migration.
pub const LOCAL: ClientId = 0;

/// The polymorphic payload of a command descriptor (§3), reimplemented as
/// a tagged variant over the four argument shapes (§9).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpBody {
    Get { key: String },
    Put { key: String, value: String },
    Append { key: String, value: String },
    ChangeConfig { config: Config },
}

impl OpBody {
    /// The shard a KV operation touches, or `None` for `ChangeConfig`
    /// (which is not subject to the per-shard ownership check of §4.2).
    pub fn kv_shard(&self) -> Option<ShardNum> {
        match self {
            OpBody::Get { key } | OpBody::Put { key, .. } | OpBody::Append { key, .. } => Some(key_shard(key)),
            OpBody::ChangeConfig { .. } => None,
        }
    }
}

/// A command descriptor (§3): everything needed to apply an operation
/// exactly once and to let its proposer recognize its own outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    pub nonce: Nonce,
    pub client_id: ClientId,
    pub req_num: ReqNum,
    pub shard_num: ShardNum,
    pub body: OpBody,
}

/// The error code set of §6, carried as a typed enum rather than a bare
/// string or integer so callers can match on variants (§7, §10).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("not the current leader")]
    WrongLeader,
    #[error("this group does not currently own the shard for that key")]
    WrongGroup,
    #[error("caller's configuration number is ahead of this group's")]
    HigherConfigNum,
    #[error("caller's configuration number is behind this group's")]
    LowerConfigNum,
    #[error("a different command occupied the proposed log index")]
    CommitConflict,
    #[error("timed out waiting for the proposal to commit")]
    CommitTimeout,
}
