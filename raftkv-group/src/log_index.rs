//! The log-index tracker `L` (§3, §4.4): correlates pending RPCs to the
//! entries the apply loop has actually written, so a waiter can tell its
//! own command apart from one that merely landed at the same index.

use std::collections::BTreeMap;

use crate::types::{LogIndex, Nonce};

/// One entry of `L`. `nonce == None` is the sentinel the apply loop writes
/// when a command was chosen for this index but could not be applied
/// because this group no longer (or not yet) owns the relevant shard —
/// every waiter on this index must then fail with `COMMIT_CONFLICT` (§4.4
/// step 5), exactly as if a different proposal had won the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    pub nonce: Option<Nonce>,
}

pub type LogTable = BTreeMap<LogIndex, LogRecord>;

/// Drop every entry at or below `through_index`, the rule used on
/// snapshot creation (§3): by that point every waiter for those indices
/// has necessarily already been woken, since the apply loop woke them in
/// the same step it wrote the entry.
pub fn gc_through(log: &mut LogTable, through_index: LogIndex) {
    log.retain(|&index, _| index > through_index);
}
