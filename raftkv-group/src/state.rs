//! The state-machine mutex's contents (§3, §5): `M`, sessions, `L`, `C`,
//! and `last_applied` are owned exclusively by this struct's lock. The
//! per-index waiter table lives here too, rather than behind a second
//! lock, so a waiter's registration and the apply loop's wakeup can never
//! race each other (§4.3, §9).

use std::collections::HashMap;

use raftkv_shardctl::Config;
use tokio::sync::oneshot;

use crate::log_index::LogTable;
use crate::session::SessionTable;
use crate::types::{Error, LogIndex, Nonce};

/// One registered waiter for a proposed entry: the nonce it is looking
/// for, and the channel to notify once that index is applied.
pub type Waiter = (Nonce, oneshot::Sender<Result<(), Error>>);

pub struct State {
    pub kv: HashMap<String, String>,
    pub sessions: SessionTable,
    pub log: LogTable,
    pub config: Config,
    pub last_applied: LogIndex,
    pub waiters: HashMap<LogIndex, Vec<Waiter>>,
}

impl State {
    pub fn new() -> Self {
        Self {
            kv: HashMap::new(),
            sessions: SessionTable::new(),
            log: LogTable::new(),
            config: Config::empty(),
            last_applied: 0,
            waiters: HashMap::new(),
        }
    }

    /// Wake every waiter registered for `index` with the outcome implied
    /// by what the apply loop actually wrote to `L[index]` (§4.3, §4.4).
    pub fn wake_waiters_at(&mut self, index: LogIndex) {
        let applied_nonce = self.log.get(&index).and_then(|record| record.nonce);
        if let Some(waiters) = self.waiters.remove(&index) {
            for (waiter_nonce, tx) in waiters {
                let outcome = match applied_nonce {
                    Some(n) if n == waiter_nonce => Ok(()),
                    _ => Err(Error::CommitConflict),
                };
                let _ = tx.send(outcome);
            }
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}
