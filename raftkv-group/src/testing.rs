//! An in-memory [`GroupTransport`] for this workspace's own tests, in the
//! same spirit as the router fixture the consensus engine's own test suite
//! uses: a routing table of named servers, each a handle to a real `Group`
//! running on [`LocalEngine`], with the ability to isolate a server so
//! tests can exercise the retry path in `migration.rs`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use raftkv_consensus::testing::LocalEngine;
use raftkv_shardctl::testing::StaticController;
use tokio::sync::RwLock;

use crate::group::{Group, GroupHandle};
use crate::transport::{GroupTransport, ShardPullRequest, ShardPullResponse, TransportError};
use crate::types::Error;

/// The concrete group type every test in this crate drives: a single-node
/// [`LocalEngine`], a [`StaticController`] shared across the whole test
/// cluster, and the router itself as the transport.
pub type TestGroup = Group<LocalEngine, StaticController, GroupRouter>;
pub type TestGroupHandle = GroupHandle<LocalEngine, StaticController, GroupRouter>;

/// Routes `RequestShardState` calls between the groups registered under it,
/// entirely in-process.
pub struct GroupRouter {
    servers: RwLock<HashMap<String, Arc<TestGroup>>>,
    isolated: RwLock<std::collections::HashSet<String>>,
}

impl GroupRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            servers: RwLock::new(HashMap::new()),
            isolated: RwLock::new(std::collections::HashSet::new()),
        })
    }

    /// Register a server name as pointing at `group`. A group's servers in
    /// a test [`raftkv_shardctl::Config`] must match names registered here.
    pub async fn register(&self, server: impl Into<String>, group: Arc<TestGroup>) {
        self.servers.write().await.insert(server.into(), group);
    }

    /// Make `server` unreachable, as if partitioned from the rest of the
    /// cluster (§4.7's retry path is exercised by isolating a source).
    pub async fn isolate(&self, server: &str) {
        self.isolated.write().await.insert(server.to_string());
    }

    pub async fn restore(&self, server: &str) {
        self.isolated.write().await.remove(server);
    }
}

#[async_trait]
impl GroupTransport for GroupRouter {
    async fn request_shard_state(&self, server: &str, request: ShardPullRequest) -> Result<ShardPullResponse, TransportError> {
        if self.isolated.read().await.contains(server) {
            return Err(TransportError::Unreachable);
        }
        let group = {
            let servers = self.servers.read().await;
            servers.get(server).cloned().ok_or(TransportError::Unreachable)?
        };
        group
            .request_shard_state(request.requester_gid, request.shards, request.config_num)
            .await
            .map(|(kv, sessions)| ShardPullResponse { kv, sessions })
            .map_err(|err: Error| TransportError::Remote(err))
    }
}
