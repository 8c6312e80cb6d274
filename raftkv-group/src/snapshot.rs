//! The snapshot codec (§3, §4.4): encodes and decodes the full state-machine
//! state so it can be handed to the consensus engine for compaction, or
//! installed wholesale on a follower catching up.

use std::collections::HashMap;

use raftkv_shardctl::Config;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionTable;

/// `{M, sessions, config}` (§3). Consensus metadata — which log index this
/// snapshot covers — belongs to the consensus engine, not to this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub kv: HashMap<String, String>,
    pub sessions: SessionTable,
    pub config: Config,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to encode snapshot: {0}")]
    Encode(serde_json::Error),
    #[error("failed to decode snapshot: {0}")]
    Decode(serde_json::Error),
}

impl Snapshot {
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        serde_json::to_vec(self).map_err(SnapshotError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        serde_json::from_slice(bytes).map_err(SnapshotError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trip_is_exact() {
        let mut kv = HashMap::new();
        kv.insert("x".to_string(), "1y".to_string());
        let mut sessions = SessionTable::new();
        sessions.insert(
            (42, 3),
            Session {
                last_req_num: 7,
                last_op_index: 12,
                last_nonce: 999,
                valid: true,
            },
        );
        let snap = Snapshot {
            kv,
            sessions,
            config: Config::empty(),
        };

        let bytes = snap.encode().unwrap();
        let decoded = Snapshot::decode(&bytes).unwrap();
        assert_eq!(snap, decoded);
    }
}
