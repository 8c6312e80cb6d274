//! An in-memory [`ServerTransport`] for this workspace's own tests: calls
//! straight into registered [`raftkv_group::Group`] handles, the same way
//! [`raftkv_group::testing::GroupRouter`] stands in for group-to-group
//! transport on the other side of the same boundary.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use raftkv_group::testing::TestGroup;
use tokio::sync::RwLock;

use crate::{ClientError, ClientId, ServerTransport};

pub struct GroupServerTransport {
    servers: RwLock<HashMap<String, Arc<TestGroup>>>,
}

impl GroupServerTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            servers: RwLock::new(HashMap::new()),
        })
    }

    pub async fn register(&self, server: impl Into<String>, group: Arc<TestGroup>) {
        self.servers.write().await.insert(server.into(), group);
    }

    async fn lookup(&self, server: &str) -> Result<Arc<TestGroup>, ClientError> {
        self.servers.read().await.get(server).cloned().ok_or_else(|| ClientError::Unreachable(server.to_string()))
    }
}

#[async_trait]
impl ServerTransport for GroupServerTransport {
    async fn get(&self, server: &str, client_id: ClientId, req_num: u64, key: String) -> Result<String, ClientError> {
        Ok(self.lookup(server).await?.get(client_id, req_num, key).await?)
    }

    async fn put(&self, server: &str, client_id: ClientId, req_num: u64, key: String, value: String) -> Result<(), ClientError> {
        Ok(self.lookup(server).await?.put(client_id, req_num, key, value).await?)
    }

    async fn append(&self, server: &str, client_id: ClientId, req_num: u64, key: String, value: String) -> Result<(), ClientError> {
        Ok(self.lookup(server).await?.append(client_id, req_num, key, value).await?)
    }
}
