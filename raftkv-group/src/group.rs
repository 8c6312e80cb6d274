//! The group itself: the type every other module in this crate is an
//! `impl` block or a free function operating on (§2).

use std::sync::Arc;

use raftkv_consensus::{ApplyReceiver, ConsensusEngine};
use raftkv_shardctl::{key_shard, Config, ControllerClient, GroupId};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::GroupConfig;
use crate::metrics::{self, GroupMetrics, Wait};
use crate::state::State;
use crate::transport::GroupTransport;
use crate::types::{ClientId, Error, OpBody, ReqNum, LOCAL};

/// The per-group replicated state machine (§2).
///
/// Generic over the three external collaborators this crate treats as
/// traits rather than concrete types (§6): the consensus engine, the
/// shard-controller client, and the group-to-group transport.
pub struct Group<E: ConsensusEngine, C: ControllerClient, T: GroupTransport> {
    pub(crate) gid: GroupId,
    pub(crate) engine: Arc<E>,
    pub(crate) controller: Arc<C>,
    pub(crate) transport: Arc<T>,
    pub(crate) config: GroupConfig,
    /// The state-machine mutex `mu` (§5).
    pub(crate) state: Mutex<State>,
    /// The client-admission mutex `ck_mu` (§5): always acquired before
    /// `mu`, held for the entirety of a client RPC or a reconfiguration
    /// advance tick.
    pub(crate) client_mutex: Mutex<()>,
    pub(crate) metrics_tx: watch::Sender<GroupMetrics>,
    metrics_rx: watch::Receiver<GroupMetrics>,
}

/// Handles returned by [`Group::spawn`]: the group itself plus the
/// background tasks and a way to stop them.
pub struct GroupHandle<E: ConsensusEngine, C: ControllerClient, T: GroupTransport> {
    pub group: Arc<Group<E, C, T>>,
    pub apply_task: JoinHandle<()>,
    pub poller_task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl<E: ConsensusEngine, C: ControllerClient, T: GroupTransport> GroupHandle<E, C, T> {
    /// Signal the apply loop and config poller to stop — each checks this
    /// flag at the head of its next loop iteration (§5).
    pub fn shutdown(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// A dead flag checked at the head of every long-lived task's loop (§5),
/// rather than a one-shot signal, so both the apply loop and the config
/// poller can observe the same shutdown request.
pub(crate) type ShutdownSignal = watch::Receiver<bool>;

pub(crate) fn is_shutdown(signal: &ShutdownSignal) -> bool {
    *signal.borrow()
}

impl<E: ConsensusEngine, C: ControllerClient, T: GroupTransport> Group<E, C, T> {
    /// Construct a group and spawn its apply loop and config poller.
    pub fn spawn(
        gid: GroupId,
        engine: Arc<E>,
        apply_rx: ApplyReceiver,
        controller: Arc<C>,
        transport: Arc<T>,
        config: GroupConfig,
    ) -> GroupHandle<E, C, T> {
        let (metrics_tx, metrics_rx) = metrics::channel(gid);
        let group = Arc::new(Self {
            gid,
            engine,
            controller,
            transport,
            config,
            state: Mutex::new(State::new()),
            client_mutex: Mutex::new(()),
            metrics_tx,
            metrics_rx,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let apply_task = {
            let group = group.clone();
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                crate::apply::run(group, apply_rx, shutdown_rx).await;
            })
        };
        let poller_task = {
            let group = group.clone();
            tokio::spawn(async move {
                crate::poller::run(group, shutdown_rx).await;
            })
        };

        GroupHandle {
            group,
            apply_task,
            poller_task,
            shutdown: shutdown_tx,
        }
    }

    pub fn gid(&self) -> GroupId {
        self.gid
    }

    pub fn metrics(&self) -> GroupMetrics {
        *self.metrics_rx.borrow()
    }

    pub fn wait(&self, timeout: std::time::Duration) -> Wait {
        Wait {
            rx: self.metrics_rx.clone(),
            timeout,
        }
    }

    /// `Get(key)` (§6). Holds `ck_mu` for the duration of the call (§4.5).
    #[tracing::instrument(level = "debug", skip(self), fields(gid = self.gid))]
    pub async fn get(&self, client_id: ClientId, req_num: ReqNum, key: String) -> Result<String, Error> {
        let _ck = self.client_mutex.lock().await;
        let shard = key_shard(&key);
        self.admit_and_commit(client_id, req_num, shard, OpBody::Get { key: key.clone() }).await?;
        let state = self.state.lock().await;
        Ok(state.kv.get(&key).cloned().unwrap_or_default())
    }

    /// `Put(key, value)` (§6).
    #[tracing::instrument(level = "debug", skip(self, value), fields(gid = self.gid))]
    pub async fn put(&self, client_id: ClientId, req_num: ReqNum, key: String, value: String) -> Result<(), Error> {
        let _ck = self.client_mutex.lock().await;
        let shard = key_shard(&key);
        self.admit_and_commit(client_id, req_num, shard, OpBody::Put { key, value }).await
    }

    /// `Append(key, value)` (§6).
    #[tracing::instrument(level = "debug", skip(self, value), fields(gid = self.gid))]
    pub async fn append(&self, client_id: ClientId, req_num: ReqNum, key: String, value: String) -> Result<(), Error> {
        let _ck = self.client_mutex.lock().await;
        let shard = key_shard(&key);
        self.admit_and_commit(client_id, req_num, shard, OpBody::Append { key, value }).await
    }

    /// Propose a `ChangeConfig` from the config poller (§4.5). Uses the
    /// reserved `LOCAL` client id and the target config's epoch as the
    /// request number, so a replayed poller tick for an already-applied
    /// epoch is deduped exactly like a client replay would be.
    pub(crate) async fn propose_change_config(&self, target: Config) -> Result<(), Error> {
        let req_num = target.num;
        self.admit_and_commit(LOCAL, req_num, 0, OpBody::ChangeConfig { config: target }).await
    }

    pub fn current_config_num(&self) -> u64 {
        self.metrics().config_num
    }
}
