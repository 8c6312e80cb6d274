//! The linearizable client (§4.8): a server list, a cached leader, a
//! monotonic per-client request number, and a retry loop that rotates
//! through servers and never gives up.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod testing;

/// A client's stable identity, matching `raftkv_group::ClientId` (§3).
pub type ClientId = u64;

/// 62-bit mask: the spec reserves the top two bits, matching the way the
/// group itself treats client ids as an opaque, merely-unique value.
const CLIENT_ID_MASK: u64 = (1u64 << 62) - 1;

/// How long to sleep after a full sweep of every server comes up empty
/// before sweeping again (§4.8).
const SWEEP_BACKOFF: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not reach server {0}")]
    Unreachable(String),
    #[error(transparent)]
    Remote(#[from] raftkv_group::Error),
}

/// The transport seam a client uses to reach a named server (§1: network
/// transport itself is out of scope). Production wiring dials a real
/// connection; [`testing::GroupServerTransport`] calls directly into
/// in-process [`raftkv_group::Group`] handles for this workspace's own
/// tests.
#[async_trait]
pub trait ServerTransport: Send + Sync + 'static {
    async fn get(&self, server: &str, client_id: ClientId, req_num: u64, key: String) -> Result<String, ClientError>;
    async fn put(&self, server: &str, client_id: ClientId, req_num: u64, key: String, value: String) -> Result<(), ClientError>;
    async fn append(&self, server: &str, client_id: ClientId, req_num: u64, key: String, value: String) -> Result<(), ClientError>;
}

/// A linearizable client over a fixed server list (§4.8).
pub struct Client<T: ServerTransport> {
    transport: Arc<T>,
    servers: Vec<String>,
    id: ClientId,
    next_req_num: AtomicU64,
    /// Index into `servers` of the server most recently known to answer
    /// OK; tried first on the next request.
    leader_hint: AtomicUsize,
}

impl<T: ServerTransport> Client<T> {
    pub fn new(transport: Arc<T>, servers: Vec<String>) -> Self {
        assert!(!servers.is_empty(), "a client needs at least one server to talk to");
        Self {
            transport,
            servers,
            id: rand::random::<u64>() & CLIENT_ID_MASK,
            next_req_num: AtomicU64::new(1),
            leader_hint: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    #[tracing::instrument(level = "debug", skip(self), fields(client_id = self.id))]
    pub async fn get(&self, key: String) -> String {
        let req_num = self.next_req_num();
        self.retry(|server| {
            let transport = self.transport.clone();
            let key = key.clone();
            async move { transport.get(&server, self.id, req_num, key).await }
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self, value), fields(client_id = self.id))]
    pub async fn put(&self, key: String, value: String) {
        let req_num = self.next_req_num();
        self.retry(|server| {
            let transport = self.transport.clone();
            let key = key.clone();
            let value = value.clone();
            async move { transport.put(&server, self.id, req_num, key, value).await }
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self, value), fields(client_id = self.id))]
    pub async fn append(&self, key: String, value: String) {
        let req_num = self.next_req_num();
        self.retry(|server| {
            let transport = self.transport.clone();
            let key = key.clone();
            let value = value.clone();
            async move { transport.append(&server, self.id, req_num, key, value).await }
        })
        .await
    }

    fn next_req_num(&self) -> u64 {
        self.next_req_num.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends to the cached leader, rotating through every other server on
    /// failure or a non-OK reply; sleeps and repeats a full sweep if none
    /// of them work. Never returns an error to the caller (§4.8).
    async fn retry<F, Fut, R>(&self, mut call: F) -> R
    where
        F: FnMut(String) -> Fut,
        Fut: std::future::Future<Output = Result<R, ClientError>>,
    {
        loop {
            let start = self.leader_hint.load(Ordering::Relaxed);
            for offset in 0..self.servers.len() {
                let i = (start + offset) % self.servers.len();
                let server = self.servers[i].clone();
                match call(server).await {
                    Ok(value) => {
                        self.leader_hint.store(i, Ordering::Relaxed);
                        return value;
                    }
                    Err(err) => {
                        tracing::debug!(client_id = self.id, server = %self.servers[i], %err, "request failed, rotating");
                    }
                }
            }
            tokio::time::sleep(SWEEP_BACKOFF).await;
        }
    }
}
