use {
    super::{ClusterError, ClusterResult, KeyHash, KeyRange},
    parking_lot::RwLock,
    serde::{Deserialize, Serialize},
    std::{
        collections::HashMap,
        fmt,
        net::IpAddr,
        str::FromStr,
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicU64, Ordering},
        },
    },
};

/// Network end point (host and port) of a server node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddress {
    host: String,
    port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the address refers to "this host", and so is only meaningful
    /// relative to the node that reported it.
    pub fn is_local_reference(&self) -> bool {
        if self.host.eq_ignore_ascii_case("localhost") {
            return true;
        }
        self.host
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback() || ip.is_unspecified())
            .unwrap_or(false)
    }

    /// Same host, different port.
    pub fn with_port(&self, port: u16) -> Self {
        Self::new(self.host.clone(), port)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = ClusterError;

    fn from_str(s: &str) -> ClusterResult<Self> {
        let (host, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| ClusterError::InvalidArgument(format!("missing port in '{s}'")))?;
        if host.is_empty() {
            return Err(ClusterError::InvalidArgument(format!("missing host in '{s}'")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ClusterError::InvalidArgument(format!("invalid port in '{s}'")))?;
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = ClusterError;

    fn try_from(s: String) -> ClusterResult<Self> {
        s.parse()
    }
}

impl From<NodeAddress> for String {
    fn from(address: NodeAddress) -> Self {
        address.to_string()
    }
}

/// State of a single node, as exchanged in cluster status messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeState {
    pub address: NodeAddress,

    /// Position of the node in the cluster layout; `None` when not (yet) known.
    pub index: Option<u32>,

    pub range_active: KeyRange,

    pub range_passive: KeyRange,

    pub disabled: bool,

    /// Timestamp (msecs since epoch) of the last change of this state.
    pub last_updated: u64,
}

impl NodeState {
    pub fn new(
        address: NodeAddress,
        index: Option<u32>,
        range_active: KeyRange,
        range_passive: KeyRange,
        last_updated: u64,
    ) -> Self {
        Self {
            address,
            index,
            range_active,
            range_passive,
            disabled: false,
            last_updated,
        }
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Union of active and passive ranges.
    pub fn total_range(&self) -> KeyRange {
        self.range_active.union(&self.range_passive)
    }
}

/// Cluster state as seen by one server node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatusMessage {
    /// Time (msecs since epoch) the message was created.
    pub creation_time: u64,

    /// Time (msecs since epoch) of the last change to the aggregate state.
    pub cluster_last_updated: u64,

    /// State of the node that sent the message.
    pub local: NodeState,

    /// States of the peers known to the sending node.
    pub remote: Vec<NodeState>,
}

/// Node of a cluster, identified by its network address.
pub trait Node: Send + Sync + 'static {
    /// Returns the node address.
    fn address(&self) -> &NodeAddress;
}

/// Key ranges of a server node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRanges {
    pub active: KeyRange,
    pub passive: KeyRange,
    pub total: KeyRange,
}

impl NodeRanges {
    fn new(active: KeyRange, passive: KeyRange) -> Self {
        Self {
            active,
            passive,
            total: active.union(&passive),
        }
    }
}

/// Server node as observed by a client.
///
/// Mutable to a degree: ranges, the disabled flag and freshness timestamps
/// are updated through the owning [`RoutingTable`], which invalidates its
/// routing information whenever ranges or the disabled flag change.
///
/// [`RoutingTable`]: crate::RoutingTable
#[derive(Debug)]
pub struct ServerNode {
    address: NodeAddress,
    ranges: RwLock<NodeRanges>,
    disabled: AtomicBool,

    /// Time when last request was sent directly to this node.
    last_request_sent: AtomicU64,

    /// Time when last response was received directly from this node.
    last_response_received: AtomicU64,

    /// Timestamp of the last node state information, direct or indirect.
    last_node_update_fetched: AtomicU64,

    /// Timestamp of the last cluster update fetched from this node.
    last_cluster_update_fetched: AtomicU64,

    /// Timestamp of the last cluster update this node is known to have,
    /// learnt from headers of regular entry operations.
    last_cluster_update_available: AtomicU64,
}

impl Node for ServerNode {
    fn address(&self) -> &NodeAddress {
        &self.address
    }
}

impl ServerNode {
    pub fn new(address: NodeAddress, active: KeyRange, passive: KeyRange) -> Self {
        Self {
            address,
            ranges: RwLock::new(NodeRanges::new(active, passive)),
            disabled: AtomicBool::new(false),
            last_request_sent: AtomicU64::new(0),
            last_response_received: AtomicU64::new(0),
            last_node_update_fetched: AtomicU64::new(0),
            last_cluster_update_fetched: AtomicU64::new(0),
            last_cluster_update_available: AtomicU64::new(1),
        }
    }

    pub fn ranges(&self) -> NodeRanges {
        *self.ranges.read()
    }

    pub fn active_range(&self) -> KeyRange {
        self.ranges.read().active
    }

    pub fn passive_range(&self) -> KeyRange {
        self.ranges.read().passive
    }

    pub fn total_range(&self) -> KeyRange {
        self.ranges.read().total
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub fn last_request_sent(&self) -> u64 {
        self.last_request_sent.load(Ordering::Acquire)
    }

    pub fn last_response_received(&self) -> u64 {
        self.last_response_received.load(Ordering::Acquire)
    }

    pub fn last_node_update_fetched(&self) -> u64 {
        self.last_node_update_fetched.load(Ordering::Acquire)
    }

    pub fn last_cluster_update_fetched(&self) -> u64 {
        self.last_cluster_update_fetched.load(Ordering::Acquire)
    }

    pub fn last_cluster_update_available(&self) -> u64 {
        self.last_cluster_update_available.load(Ordering::Acquire)
    }

    /// Distance used to order nodes for a key.
    ///
    /// Based on the active range only, even though nodes are selected by their
    /// total range: a node can catch up on a larger passive range before
    /// enabling it. Disabled nodes get the full key space length added, which
    /// places them after every enabled node.
    pub fn sorting_distance(&self, hash: KeyHash) -> u64 {
        let active = self.active_range();
        let distance = u64::from(active.clockwise_distance(hash));
        if self.is_disabled() {
            distance + u64::from(active.keyspace().length())
        } else {
            distance
        }
    }

    /// Returns `true` if ranges changed.
    pub(crate) fn update_ranges(&self, active: KeyRange, passive: KeyRange) -> bool {
        let mut ranges = self.ranges.write();
        if ranges.active == active && ranges.passive == passive {
            return false;
        }
        *ranges = NodeRanges::new(active, passive);
        true
    }

    /// Returns `true` if the flag changed.
    pub(crate) fn update_disabled(&self, disabled: bool) -> bool {
        self.disabled.swap(disabled, Ordering::AcqRel) != disabled
    }

    /// Records cluster update information piggybacked on a regular response.
    ///
    /// Only applied if the response is newer than the last one seen. Returns
    /// `true` if the known cluster update timestamp changed.
    pub(crate) fn update_last_cluster_update_available(
        &self,
        request_time: u64,
        response_time: u64,
        timestamp: u64,
    ) -> bool {
        if self.last_response_received() < response_time {
            self.last_request_sent.store(request_time, Ordering::Release);
            self.last_response_received
                .store(response_time, Ordering::Release);
            let old = self
                .last_cluster_update_available
                .swap(timestamp, Ordering::AcqRel);
            return old != timestamp;
        }
        false
    }

    pub(crate) fn set_last_request_sent(&self, timestamp: u64) {
        self.last_request_sent.store(timestamp, Ordering::Release);
    }

    pub(crate) fn set_last_response_received(&self, timestamp: u64) {
        self.last_response_received
            .store(timestamp, Ordering::Release);
    }

    pub(crate) fn set_last_node_update_fetched(&self, timestamp: u64) {
        self.last_node_update_fetched
            .store(timestamp, Ordering::Release);
    }

    pub(crate) fn set_last_cluster_update_fetched(&self, timestamp: u64) {
        self.last_cluster_update_fetched
            .store(timestamp, Ordering::Release);
    }
}

/// Nodes collection.
///
/// Nodes are keyed by address, and insertion order is preserved so that
/// snapshots taken of the collection are deterministic.
pub(crate) struct Nodes<N: Node> {
    nodes: HashMap<NodeAddress, Arc<N>>,
    ordered: Vec<Arc<N>>,
}

impl<N: Node> Default for Nodes<N> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            ordered: Vec::new(),
        }
    }
}

impl<N: Node> Nodes<N> {
    /// Creates a new empty nodes collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node to the collection, replacing any node with the same address.
    pub fn insert(&mut self, node: Arc<N>) {
        let address = node.address().clone();
        if self.nodes.insert(address.clone(), Arc::clone(&node)).is_some() {
            self.ordered.retain(|n| n.address() != &address);
        }
        self.ordered.push(node);
    }

    /// Removes and returns (if existed) a node from the collection.
    pub fn remove(&mut self, address: &NodeAddress) -> Option<Arc<N>> {
        self.nodes.remove(address).inspect(|_| {
            self.ordered.retain(|n| n.address() != address);
        })
    }

    /// Returns a reference to the node with given address.
    pub fn get(&self, address: &NodeAddress) -> Option<&Arc<N>> {
        self.nodes.get(address)
    }

    /// Number of nodes in the collection.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Iterator over the nodes, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<N>> {
        self.ordered.iter()
    }

    /// Copy of the nodes, in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<N>> {
        self.ordered.clone()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::KeySpace};

    fn node(port: u16) -> Arc<ServerNode> {
        let ks = KeySpace::default();
        let range = ks.range(u32::from(port) % 360, 90).unwrap();
        Arc::new(ServerNode::new(NodeAddress::new("node", port), range, range))
    }

    #[test]
    fn basic_ops() {
        let mut nodes = Nodes::new();

        (0..5).for_each(|i| nodes.insert(node(i)));
        assert_eq!(nodes.len(), 5);

        // Insertion order is preserved.
        let ports: Vec<_> = nodes.iter().map(|n| n.address().port()).collect();
        assert_eq!(ports, vec![0, 1, 2, 3, 4]);

        // Remove nodes and check that they are removed
        let removed = nodes.remove(&NodeAddress::new("node", 3)).unwrap();
        assert_eq!(removed.address().port(), 3);
        assert_eq!(nodes.len(), 4);
        assert!(nodes.get(&NodeAddress::new("node", 3)).is_none());
        assert!(nodes.remove(&NodeAddress::new("node", 3)).is_none());

        // Replacing moves the node to the end.
        nodes.insert(node(0));
        let ports: Vec<_> = nodes.snapshot().iter().map(|n| n.address().port()).collect();
        assert_eq!(ports, vec![1, 2, 4, 0]);
    }

    #[test]
    fn addresses() {
        let address: NodeAddress = "10.0.0.1:7070".parse().unwrap();
        assert_eq!(address.host(), "10.0.0.1");
        assert_eq!(address.port(), 7070);
        assert_eq!(address.to_string(), "10.0.0.1:7070");
        assert!(!address.is_local_reference());
        assert_eq!(address.with_port(80), NodeAddress::new("10.0.0.1", 80));

        assert!(NodeAddress::new("localhost", 1).is_local_reference());
        assert!(NodeAddress::new("127.0.0.1", 1).is_local_reference());
        assert!(NodeAddress::new("0.0.0.0", 1).is_local_reference());

        assert!("nohost".parse::<NodeAddress>().is_err());
        assert!(":80".parse::<NodeAddress>().is_err());
        assert!("host:99999".parse::<NodeAddress>().is_err());

        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, r#""10.0.0.1:7070""#);
        assert_eq!(serde_json::from_str::<NodeAddress>(&json).unwrap(), address);
    }

    #[test]
    fn server_node_updates() {
        let ks = KeySpace::default();
        let active = ks.range(0, 90).unwrap();
        let passive = ks.range(45, 90).unwrap();
        let node = ServerNode::new(NodeAddress::new("localhost", 1), active, passive);
        assert_eq!(node.total_range(), ks.range(0, 135).unwrap());

        assert!(!node.update_ranges(active, passive));
        assert!(node.update_ranges(active, active));
        assert_eq!(node.total_range(), active);

        assert!(!node.update_disabled(false));
        assert!(node.update_disabled(true));
        assert!(node.is_disabled());

        assert!(node.update_last_cluster_update_available(10, 20, 5));
        assert_eq!(node.last_request_sent(), 10);
        assert_eq!(node.last_response_received(), 20);
        // Older response is ignored.
        assert!(!node.update_last_cluster_update_available(5, 15, 7));
        assert_eq!(node.last_cluster_update_available(), 5);
    }

    #[test]
    fn sorting_distance() {
        let ks = KeySpace::default();
        let active = ks.range(100, 10).unwrap();
        let node = ServerNode::new(NodeAddress::new("localhost", 1), active, ks.full_range());
        assert_eq!(node.sorting_distance(ks.hash(95)), 5);
        assert_eq!(node.sorting_distance(ks.hash(105)), 0);

        node.update_disabled(true);
        assert_eq!(node.sorting_distance(ks.hash(95)), 365);
    }
}
