//! The group-to-group transport boundary (§6): `RequestShardState`, the
//! only RPC a group sends to another group. Network transport itself is
//! out of scope (§1); this trait is the seam production wiring fills in,
//! the same way migration pulls a source's servers round-robin without
//! this crate knowing or caring how bytes cross the wire.

use std::collections::HashSet;

use async_trait::async_trait;
use raftkv_shardctl::{GroupId, ShardNum};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{SessionKey, Session};
use crate::types::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardPullRequest {
    pub requester_gid: GroupId,
    pub shards: HashSet<ShardNum>,
    pub config_num: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardPullResponse {
    pub kv: std::collections::HashMap<String, String>,
    pub sessions: Vec<(SessionKey, Session)>,
}

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("could not reach any server of the target group")]
    Unreachable,
    #[error(transparent)]
    Remote(#[from] Error),
}

/// Sends a `RequestShardState` pull to one named server and returns its
/// answer. A group tries each server of the source group round-robin
/// (§4.7) until one returns `Ok`.
#[async_trait]
pub trait GroupTransport: Send + Sync + 'static {
    async fn request_shard_state(&self, server: &str, request: ShardPullRequest) -> Result<ShardPullResponse, TransportError>;
}
