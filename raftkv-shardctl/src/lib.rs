//! The shard-controller trait boundary and the `Config` type it publishes.
//!
//! The controller itself — the service that decides how shards are
//! assigned to groups and numbers the resulting configurations — lives
//! outside this crate (§1). This crate only defines the `Config` shape
//! and the client trait a group's config poller uses to ask for the
//! latest one.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod testing;

/// The number of shards the key space is partitioned into. Identical
/// across every group and the controller; changing it is out of scope
/// per the Non-goals in §1.
pub const NSHARDS: usize = 10;

/// Identifies a replica group, as assigned by the controller.
pub type GroupId = u64;

/// A shard index in `[0, NSHARDS)`.
pub type ShardNum = usize;

/// A numbered configuration: which group owns each shard, and which
/// servers make up each group.
///
/// Epoch 0 is the empty configuration: every shard maps to group 0, which
/// is never a real group, so no shard is meaningfully owned by anyone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub num: u64,
    pub shards: Vec<GroupId>,
    pub groups: HashMap<GroupId, Vec<String>>,
}

impl Config {
    /// The epoch-0 configuration: no shard is owned by any real group.
    pub fn empty() -> Self {
        Self {
            num: 0,
            shards: vec![0; NSHARDS],
            groups: HashMap::new(),
        }
    }

    /// The group that currently owns `shard`, if any real group does.
    pub fn owner(&self, shard: ShardNum) -> GroupId {
        self.shards[shard]
    }

    /// The server names of `gid` under this configuration, empty if `gid`
    /// is not a member group of this configuration.
    pub fn servers_of(&self, gid: GroupId) -> &[String] {
        self.groups.get(&gid).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Deterministic key-to-shard hash (§6). Identical across groups and the
/// controller: two processes hashing the same key must agree on its shard
/// without needing to communicate.
pub fn key_shard(key: &str) -> ShardNum {
    // A simple, stable, non-cryptographic hash is sufficient: shard
    // assignment only needs to be a consistent partition, not a secure one.
    let mut hash: u64 = 5381;
    for byte in key.as_bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(*byte as u64);
    }
    (hash % NSHARDS as u64) as ShardNum
}

/// The controller-facing interface a group's config poller consumes (§6).
#[async_trait]
pub trait ControllerClient: Send + Sync + 'static {
    /// Fetch configuration number `num`, or the latest one if `num == -1`.
    async fn query(&self, num: i64) -> Config;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shard_is_stable() {
        assert_eq!(key_shard("alpha"), key_shard("alpha"));
    }

    #[test]
    fn key_shard_in_range() {
        for key in ["a", "b", "some-long-key-name", ""] {
            assert!(key_shard(key) < NSHARDS);
        }
    }

    #[test]
    fn empty_config_has_no_real_owners() {
        let c = Config::empty();
        assert_eq!(c.num, 0);
        assert!(c.shards.iter().all(|&g| g == 0));
    }
}
