//! Ambient observability (§4.9): not a client-visible feature, carried
//! regardless of the Non-goals in §1. Shaped after the metrics channel of
//! the consensus engine this crate is built on top of — a `watch` channel
//! callers can either read from or block on via [`Wait`], instead of
//! polling.

use std::time::Duration;

use raftkv_shardctl::GroupId;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::types::LogIndex;

/// A point-in-time snapshot of what this group itself tracks about its own
/// progress. Leader/follower role and term are the consensus engine's
/// concern and are not duplicated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMetrics {
    pub gid: GroupId,
    pub last_applied: LogIndex,
    pub config_num: u64,
    pub owned_shard_count: usize,
    pub session_count: usize,
}

impl GroupMetrics {
    pub fn new_initial(gid: GroupId) -> Self {
        Self {
            gid,
            last_applied: 0,
            config_num: 0,
            owned_shard_count: 0,
            session_count: 0,
        }
    }
}

pub fn channel(gid: GroupId) -> (watch::Sender<GroupMetrics>, watch::Receiver<GroupMetrics>) {
    watch::channel(GroupMetrics::new_initial(gid))
}

/// Blocks on a condition of [`GroupMetrics`] becoming true, instead of
/// sleeping and re-polling — the same convenience the consensus engine
/// this crate depends on offers its own callers and tests.
pub struct Wait {
    pub rx: watch::Receiver<GroupMetrics>,
    pub timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("timed out after {0:?} waiting for the metrics condition")]
    TimedOut(Duration),
    #[error("the metrics channel was closed")]
    Closed,
}

impl Wait {
    /// Waits until `last_applied >= index`.
    pub async fn applied_at_least(mut self, index: LogIndex) -> Result<GroupMetrics, WaitError> {
        let wait_timeout = self.timeout;
        timeout(wait_timeout, async {
            loop {
                let metrics = *self.rx.borrow();
                if metrics.last_applied >= index {
                    return Ok(metrics);
                }
                self.rx.changed().await.map_err(|_| WaitError::Closed)?;
            }
        })
        .await
        .map_err(|_| WaitError::TimedOut(wait_timeout))?
    }

    /// Waits until `config_num >= num`.
    pub async fn config_at_least(mut self, num: u64) -> Result<GroupMetrics, WaitError> {
        let wait_timeout = self.timeout;
        timeout(wait_timeout, async {
            loop {
                let metrics = *self.rx.borrow();
                if metrics.config_num >= num {
                    return Ok(metrics);
                }
                self.rx.changed().await.map_err(|_| WaitError::Closed)?;
            }
        })
        .await
        .map_err(|_| WaitError::TimedOut(wait_timeout))?
    }
}
