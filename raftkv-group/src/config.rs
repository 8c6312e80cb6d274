//! Runtime-tunable parameters for a group (§4.10), built once and shared
//! behind an `Arc` by every task, the same shape the consensus engine this
//! crate sits on top of uses for its own election/heartbeat timeouts.

use std::time::Duration;

/// Validated, immutable tunables for a running group.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// How often the wait-for-commit poll... is, in this crate, instead a
    /// notification wakeup bound: the maximum time a submit path waits for
    /// its proposal to commit before surfacing `COMMIT_TIMEOUT` (§4.3).
    pub commit_wait: Duration,
    /// How often the config poller queries the controller (§4.5).
    pub poll_interval: Duration,
    /// How long a migration round waits before retrying a source group
    /// that was unreachable or not yet advanced (§4.7).
    pub migration_retry_backoff: Duration,
    /// `None` disables snapshotting; `Some(n)` triggers a snapshot once the
    /// engine reports more than `n` bytes of persisted state (§4.4 step 6).
    pub max_raft_state: Option<u64>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            commit_wait: Duration::from_millis(30),
            poll_interval: Duration::from_millis(100),
            migration_retry_backoff: Duration::from_millis(100),
            max_raft_state: None,
        }
    }
}

/// Builds and validates a [`GroupConfig`]. Constructed with
/// [`GroupConfigBuilder::default`] so callers only override what they need.
#[derive(Debug, Default)]
pub struct GroupConfigBuilder {
    inner: GroupConfig,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GroupConfigError {
    #[error("commit_wait must be greater than zero")]
    ZeroCommitWait,
    #[error("poll_interval must be greater than zero")]
    ZeroPollInterval,
    #[error("migration_retry_backoff must be greater than zero")]
    ZeroMigrationBackoff,
}

impl GroupConfigBuilder {
    pub fn commit_wait(mut self, d: Duration) -> Self {
        self.inner.commit_wait = d;
        self
    }

    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.inner.poll_interval = d;
        self
    }

    pub fn migration_retry_backoff(mut self, d: Duration) -> Self {
        self.inner.migration_retry_backoff = d;
        self
    }

    pub fn max_raft_state(mut self, bytes: Option<u64>) -> Self {
        self.inner.max_raft_state = bytes;
        self
    }

    pub fn build(self) -> Result<GroupConfig, GroupConfigError> {
        let cfg = self.inner;
        if cfg.commit_wait.is_zero() {
            return Err(GroupConfigError::ZeroCommitWait);
        }
        if cfg.poll_interval.is_zero() {
            return Err(GroupConfigError::ZeroPollInterval);
        }
        if cfg.migration_retry_backoff.is_zero() {
            return Err(GroupConfigError::ZeroMigrationBackoff);
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds() {
        GroupConfigBuilder::default().build().unwrap();
    }

    #[test]
    fn zero_commit_wait_rejected() {
        let err = GroupConfigBuilder::default().commit_wait(Duration::from_millis(0)).build().unwrap_err();
        assert_eq!(err, GroupConfigError::ZeroCommitWait);
    }
}
