pub mod peer;


pub use peer::{Peer, PeerStatus, PeerSyncer};

use {
    crate::{
        KeyRange, KeySpace,
        hash::DefaultBuildHasher,
        node::{ClusterStatusMessage, NodeAddress, NodeState, Nodes},
    },
    auto_impl::auto_impl,
    parking_lot::Mutex,
    std::{
        hash::BuildHasher,
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicU64, Ordering},
        },
        time::{SystemTime, UNIX_EPOCH},
    },
    tracing::{info, warn},
};

/// Source of wall-clock time, in msecs since epoch.
#[auto_impl(&, Arc)]
pub trait TimeMaster: Send + Sync {
    fn current_time_millis(&self) -> u64;
}

/// System clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeMaster;

impl TimeMaster for SystemTimeMaster {
    fn current_time_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Server-side view of the cluster.
///
/// Tracks the peers of the local node (the local node itself is never a
/// peer) and merges cluster status reports received from them.
pub struct MembershipView<S: PeerSyncer, T: TimeMaster = SystemTimeMaster> {
    keyspace: KeySpace,
    local: NodeState,
    peers: Mutex<Nodes<Peer>>,
    syncer: Arc<S>,
    time: T,

    /// Timestamp of the last change to the aggregate state.
    last_updated: AtomicU64,

    running: AtomicBool,
}

impl<S: PeerSyncer, T: TimeMaster> MembershipView<S, T> {
    /// Creates a view with the given peers; sync workers are not started
    /// until [`MembershipView::start`].
    pub fn new<I>(
        keyspace: KeySpace,
        local: NodeState,
        remotes: I,
        syncer: S,
        time: T,
        update_time: u64,
    ) -> Self
    where
        I: IntoIterator<Item = NodeState>,
    {
        let mut peers = Nodes::new();
        for state in remotes {
            if state.address != local.address {
                peers.insert(Arc::new(Peer::new(state, PeerStatus::Confirmed)));
            }
        }
        Self {
            keyspace,
            local,
            peers: Mutex::new(peers),
            syncer: Arc::new(syncer),
            time,
            last_updated: AtomicU64::new(update_time),
            running: AtomicBool::new(false),
        }
    }

    /// Starts sync workers of all peers.
    pub fn start(&self) {
        let peers = self.peers.lock();
        self.running.store(true, Ordering::Release);
        info!(peers = peers.len(), "starting sync with peers");
        let started = peers
            .iter()
            .filter(|peer| peer.start_syncing(Arc::clone(&self.syncer)))
            .count();
        info!(started, peers = peers.len(), "started sync with peers");
    }

    /// Stops sync workers of all peers.
    pub fn stop(&self) {
        let peers = self.peers.lock();
        self.running.store(false, Ordering::Release);
        info!("stopping sync with peers");
        peers.iter().for_each(|peer| peer.stop());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn keyspace(&self) -> KeySpace {
        self.keyspace
    }

    pub fn local_state(&self) -> &NodeState {
        &self.local
    }

    /// Number of nodes in the cluster, local node included.
    pub fn size(&self) -> usize {
        1 + self.peers.lock().len()
    }

    pub fn peers(&self) -> Vec<Arc<Peer>> {
        self.peers.lock().snapshot()
    }

    /// Last known state of the peer at `address`.
    pub fn remote_state(&self, address: &NodeAddress) -> Option<NodeState> {
        self.peers.lock().get(address).map(|peer| peer.state())
    }

    pub fn remote_states(&self) -> Vec<NodeState> {
        self.peers().iter().map(|peer| peer.state()).collect()
    }

    pub fn last_updated(&self) -> u64 {
        self.last_updated.load(Ordering::Acquire)
    }

    /// Called when a node contacts the local node; unknown nodes get a
    /// provisional peer, using the range they reported as both active and
    /// passive range. Returns `true` if a peer was created.
    pub fn check_membership(&self, address: &NodeAddress, total_range: KeyRange) -> bool {
        if address == &self.local.address {
            warn!(%address, "membership check for local node; ignoring");
            return false;
        }
        let mut peers = self.peers.lock();
        if peers.get(address).is_some() {
            return false;
        }
        warn!(
            %address,
            range = %total_range,
            "new node making sync request; bootstrapping with its total range, unknown index"
        );
        let state = NodeState::new(
            address.clone(),
            None,
            total_range,
            total_range,
            self.time.current_time_millis(),
        );
        let peer = Arc::new(Peer::new(state, PeerStatus::Provisional));
        peers.insert(Arc::clone(&peer));
        if self.is_running() {
            peer.start_syncing(Arc::clone(&self.syncer));
        }
        true
    }

    /// Merges a cluster status report from a peer. Returns the number of
    /// peers created or updated.
    pub fn update_with(&self, msg: &ClusterStatusMessage) -> usize {
        let update_time = self.time.current_time_millis();
        let mods = std::iter::once(&msg.local)
            .chain(msg.remote.iter())
            .filter(|state| self.update_status(state))
            .count();
        if mods == 0 {
            return 0;
        }

        let previous = self.last_updated.fetch_max(update_time, Ordering::AcqRel);
        if update_time > previous {
            info!(mods, last_updated = update_time, "cluster state updated");
        } else {
            warn!(mods, last_updated = previous, "cluster state updated, but last update time unchanged");
        }
        mods
    }

    /// Number of key space slots covered by active ranges, local node
    /// included.
    pub fn active_coverage(&self) -> u32 {
        let mut ranges = vec![self.local.range_active];
        ranges.extend(self.peers().iter().map(|peer| peer.active_range()));
        self.keyspace.coverage(&ranges)
    }

    pub fn active_coverage_pct(&self) -> u32 {
        self.coverage_pct(self.active_coverage())
    }

    /// Number of key space slots covered by total ranges, local node
    /// included.
    pub fn total_coverage(&self) -> u32 {
        let mut ranges = vec![self.local.total_range()];
        ranges.extend(self.peers().iter().map(|peer| peer.total_range()));
        self.keyspace.coverage(&ranges)
    }

    pub fn total_coverage_pct(&self) -> u32 {
        self.coverage_pct(self.total_coverage())
    }

    /// Cheap fingerprint of the whole view; changes whenever any node state
    /// changes.
    pub fn hash_over_state(&self) -> u64 {
        let hasher = DefaultBuildHasher::default();
        let mut hash = hasher.hash_one(self.keyspace) ^ hasher.hash_one(&self.local);
        for peer in self.peers() {
            hash = hash.wrapping_add(hasher.hash_one(peer.state()));
        }
        hash
    }

    /// Status of the view, for sending to other nodes and clients.
    pub fn as_message(&self) -> ClusterStatusMessage {
        ClusterStatusMessage {
            creation_time: self.time.current_time_millis(),
            cluster_last_updated: self.last_updated(),
            local: self.local.clone(),
            remote: self.remote_states(),
        }
    }

    fn update_status(&self, state: &NodeState) -> bool {
        // Local state is only ever produced locally.
        if state.address == self.local.address {
            return false;
        }
        let mut peers = self.peers.lock();
        if let Some(peer) = peers.get(&state.address) {
            return peer.update(state);
        }
        warn!(address = %state.address, "status for new node received; creating peer");
        let peer = Arc::new(Peer::new(state.clone(), PeerStatus::Confirmed));
        peers.insert(Arc::clone(&peer));
        if self.is_running() {
            peer.start_syncing(Arc::clone(&self.syncer));
        }
        true
    }

    fn coverage_pct(&self, coverage: u32) -> u32 {
        let length = self.keyspace.length();
        if coverage == length {
            return 100;
        }
        (100 * u64::from(coverage) / u64::from(length)) as u32
    }
}

impl<S: PeerSyncer, T: TimeMaster> Drop for MembershipView<S, T> {
    fn drop(&mut self) {
        self.peers.get_mut().iter().for_each(|peer| peer.stop());
    }
}
