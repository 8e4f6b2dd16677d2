use {
    crate::{
        KeyRange,
        node::{Node, NodeAddress, NodeState},
    },
    async_trait::async_trait,
    parking_lot::{Mutex, RwLock},
    std::sync::Arc,
    tokio::{runtime::Handle, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

/// Whether the state of a peer has been reported by anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    /// Placeholder, created from what the peer said about itself when it
    /// first contacted the local node.
    Provisional,

    /// State came from a cluster status report.
    Confirmed,
}

/// Background synchronization with a single peer.
///
/// Implementations run until `stop` is cancelled.
#[async_trait]
pub trait PeerSyncer: Send + Sync + 'static {
    async fn sync(&self, peer: Arc<Peer>, stop: CancellationToken);
}

struct PeerRecord {
    state: NodeState,
    status: PeerStatus,
}

struct Worker {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

/// Peer of the local server node.
pub struct Peer {
    address: NodeAddress,
    record: RwLock<PeerRecord>,
    worker: Mutex<Option<Worker>>,
}

impl Node for Peer {
    fn address(&self) -> &NodeAddress {
        &self.address
    }
}

impl Peer {
    pub(crate) fn new(state: NodeState, status: PeerStatus) -> Self {
        Self {
            address: state.address.clone(),
            record: RwLock::new(PeerRecord { state, status }),
            worker: Mutex::new(None),
        }
    }

    /// Last known state of the peer.
    pub fn state(&self) -> NodeState {
        self.record.read().state.clone()
    }

    pub fn status(&self) -> PeerStatus {
        self.record.read().status
    }

    pub fn active_range(&self) -> KeyRange {
        self.record.read().state.range_active
    }

    pub fn total_range(&self) -> KeyRange {
        self.record.read().state.total_range()
    }

    /// Whether a sync worker is running.
    pub fn is_syncing(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Applies a reported state.
    ///
    /// Reports older than (or as old as) the known state are ignored, except
    /// for provisional peers, for which any report is better than the
    /// placeholder. Returns `true` if the state changed.
    pub(crate) fn update(&self, state: &NodeState) -> bool {
        let mut record = self.record.write();
        if record.status == PeerStatus::Confirmed && state.last_updated <= record.state.last_updated {
            return false;
        }
        let changed = record.status == PeerStatus::Provisional || record.state != *state;
        record.state = state.clone();
        record.status = PeerStatus::Confirmed;
        changed
    }

    /// Starts the sync worker, unless already running.
    ///
    /// Requires a tokio runtime; returns `false` if none is available or the
    /// worker was already running.
    pub(crate) fn start_syncing<S: PeerSyncer>(self: &Arc<Self>, syncer: Arc<S>) -> bool {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return false;
        }
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(address = %self.address, error = %e, "cannot start peer sync without a runtime");
                return false;
            }
        };
        let stop = CancellationToken::new();
        let peer = Arc::clone(self);
        let token = stop.clone();
        let handle = runtime.spawn(async move { syncer.sync(peer, token).await });
        debug!(address = %self.address, "peer sync started");
        *worker = Some(Worker { stop, handle });
        true
    }

    /// Signals the sync worker to stop.
    pub(crate) fn stop(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.stop.cancel();
            debug!(address = %self.address, "peer sync stopped");
        }
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let record = self.record.read();
        f.debug_struct("Peer")
            .field("address", &self.address)
            .field("status", &record.status)
            .field("range_active", &record.state.range_active)
            .field("range_passive", &record.state.range_passive)
            .finish()
    }
}
