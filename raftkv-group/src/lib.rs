//! The per-group replicated state machine (§2): dedup sessions, the
//! log-index tracker, the apply loop, snapshotting, shard migration, and
//! the config poller, all built on top of the `raftkv-consensus` and
//! `raftkv-shardctl` trait boundaries.

mod apply;
mod config;
mod group;
mod log_index;
mod metrics;
mod migration;
mod poller;
mod session;
mod snapshot;
mod state;
mod submit;
mod transport;
mod types;

pub mod testing;

pub use config::{GroupConfig, GroupConfigBuilder, GroupConfigError};
pub use group::{Group, GroupHandle};
pub use metrics::{GroupMetrics, Wait, WaitError};
pub use session::{Session, SessionKey};
pub use snapshot::{Snapshot, SnapshotError};
pub use transport::{GroupTransport, ShardPullRequest, ShardPullResponse, TransportError};
pub use types::{ClientId, Error, LogIndex, Nonce, OpBody, ReqNum, LOCAL};
