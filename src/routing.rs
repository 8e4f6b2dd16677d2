use {
    crate::{
        KeyHash, KeySpace,
        hash::{EntryKeyConverter, Utf8KeyConverter},
        node::{Node, NodeAddress, NodeState, Nodes, ServerNode},
    },
    arc_swap::{ArcSwap, ArcSwapOption},
    parking_lot::Mutex,
    std::{
        fmt,
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
    },
    tracing::debug,
};

/// Ordered list of server nodes applicable to a single key space slot.
///
/// Immutable once created; tagged with the routing version that was current
/// when it was computed.
#[derive(Debug)]
pub struct NodesForKey {
    version: u64,
    nodes: Vec<Arc<ServerNode>>,
}

impl NodesForKey {
    pub(crate) fn new(version: u64, nodes: Vec<Arc<ServerNode>>) -> Self {
        Self { version, nodes }
    }

    /// No nodes for the key.
    pub fn empty(version: u64) -> Self {
        Self::new(version, Vec::new())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> Option<&Arc<ServerNode>> {
        self.nodes.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ServerNode>> {
        self.nodes.iter()
    }

    pub fn as_slice(&self) -> &[Arc<ServerNode>] {
        &self.nodes
    }
}

impl fmt::Display for NodesForKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[v{}:", self.version)?;
        for (i, node) in self.nodes.iter().enumerate() {
            let sep = if i == 0 { "" } else { "," };
            write!(f, "{sep}{}", node.address())?;
        }
        write!(f, "]")
    }
}

/// Client-side view of the cluster.
///
/// Tracks known server nodes and resolves keys into ordered lists of nodes
/// to contact. Resolved lists are cached per key space slot and invalidated
/// wholesale by bumping a version counter whenever routing relevant node
/// state (ranges or the disabled flag) changes.
///
/// Mutations are serialized by a lock; lookups never block.
pub struct RoutingTable<C: EntryKeyConverter = Utf8KeyConverter> {
    keyspace: KeySpace,
    converter: C,

    /// Known nodes, only accessed by writers.
    nodes: Mutex<Nodes<ServerNode>>,

    /// Copy of the known nodes, replaced on every membership change.
    snapshot: ArcSwap<Vec<Arc<ServerNode>>>,

    /// Routing version, starts at 1 and only ever increases.
    version: AtomicU64,

    /// Lazily computed node lists, one slot per key space slot.
    routing: Box<[ArcSwapOption<NodesForKey>]>,
}

impl<C: EntryKeyConverter> RoutingTable<C> {
    pub fn new(keyspace: KeySpace, converter: C) -> Self {
        let routing = (0..keyspace.length())
            .map(|_| ArcSwapOption::empty())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            keyspace,
            converter,
            nodes: Mutex::new(Nodes::new()),
            snapshot: ArcSwap::from_pointee(Vec::new()),
            version: AtomicU64::new(1),
            routing,
        }
    }

    pub fn keyspace(&self) -> KeySpace {
        self.keyspace
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    /// Current routing version.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Number of known server nodes.
    pub fn server_count(&self) -> usize {
        self.snapshot.load().len()
    }

    /// Known server nodes, in order of discovery.
    pub fn nodes(&self) -> Vec<Arc<ServerNode>> {
        Vec::clone(&self.snapshot.load())
    }

    /// Known server node with given address.
    pub fn node(&self, address: &NodeAddress) -> Option<Arc<ServerNode>> {
        self.snapshot
            .load()
            .iter()
            .find(|n| n.address() == address)
            .cloned()
    }

    /// Hashes the key into the key space.
    pub fn hash(&self, key: &C::Key) -> KeyHash {
        self.keyspace.hash(self.converter.routing_hash(key))
    }

    /// Nodes to contact for the key, in order of preference.
    pub fn get_nodes_for(&self, key: &C::Key) -> Arc<NodesForKey> {
        self.get_nodes_for_hash(self.hash(key))
    }

    /// Nodes whose total range contains the hash, closest enabled nodes
    /// first, disabled nodes last.
    pub fn get_nodes_for_hash(&self, hash: KeyHash) -> Arc<NodesForKey> {
        // Version must be read before the nodes, so that a concurrent update
        // can only make the result look older than it is.
        let version = self.version();
        let slot = &self.routing[(hash.modulo_hash() % self.keyspace.length()) as usize];
        let current = slot.load_full();
        if let Some(nodes) = &current
            && nodes.version == version
        {
            return Arc::clone(nodes);
        }

        let fresh = Arc::new(self.compute_nodes(version, hash));
        // Losing the race is fine: the winner computed the same (or a fresher)
        // list.
        slot.compare_and_swap(&current, Some(Arc::clone(&fresh)));
        fresh
    }

    /// Records state received directly from the node at `address`.
    ///
    /// Creates the node if not yet known. Returns `true` if routing changed.
    pub fn update_direct_state(
        &self,
        address: &NodeAddress,
        state: &NodeState,
        request_time: u64,
        response_time: u64,
        cluster_update: u64,
    ) -> bool {
        let mut nodes = self.nodes.lock();
        let (node, changed) = match nodes.get(address) {
            Some(node) => {
                let node = Arc::clone(node);
                let changed = Self::apply_state(&node, state);
                (node, changed)
            }
            None => {
                let node = self.create_node(&mut nodes, address.clone(), state);
                (node, true)
            }
        };
        node.set_last_request_sent(request_time);
        node.set_last_response_received(response_time);
        node.set_last_node_update_fetched(state.last_updated);
        node.set_last_cluster_update_fetched(cluster_update);

        if changed {
            self.invalidate();
        }
        changed
    }

    /// Records state of a node, as reported by another node `by_node`.
    ///
    /// Local references (e.g. `localhost`) are resolved against the address
    /// of the reporting node. Stale reports, no newer than what is already
    /// known, are ignored. Returns `true` if routing changed.
    pub fn update_indirect_state(&self, by_node: &NodeAddress, state: &NodeState) -> bool {
        let address = if state.address.is_local_reference() {
            by_node.with_port(state.address.port())
        } else {
            state.address.clone()
        };

        let mut nodes = self.nodes.lock();
        let changed = match nodes.get(&address) {
            Some(node) => {
                if state.last_updated <= node.last_node_update_fetched() {
                    return false;
                }
                node.set_last_node_update_fetched(state.last_updated);
                Self::apply_state(node, state)
            }
            None => {
                let node = self.create_node(&mut nodes, address, state);
                node.set_last_node_update_fetched(state.last_updated);
                true
            }
        };

        if changed {
            self.invalidate();
        }
        changed
    }

    /// Records the cluster update timestamp a node advertised on a regular
    /// entry response. Returns `true` if the node's known timestamp changed.
    pub fn update_cluster_hint(
        &self,
        address: &NodeAddress,
        request_time: u64,
        response_time: u64,
        cluster_update: u64,
    ) -> bool {
        let nodes = self.nodes.lock();
        nodes.get(address).is_some_and(|node| {
            node.update_last_cluster_update_available(request_time, response_time, cluster_update)
        })
    }

    /// Forgets the node at `address`. Returns `true` if the node was known.
    pub fn remove_node(&self, address: &NodeAddress) -> bool {
        let mut nodes = self.nodes.lock();
        if nodes.remove(address).is_none() {
            return false;
        }
        self.snapshot.store(Arc::new(nodes.snapshot()));
        debug!(%address, "server node removed");
        self.invalidate();
        true
    }

    /// Number of key space slots covered by the total ranges of known nodes.
    pub fn coverage(&self) -> u32 {
        let ranges: Vec<_> = self.snapshot.load().iter().map(|n| n.total_range()).collect();
        self.keyspace.coverage(&ranges)
    }

    /// Whether every slot of the key space is covered by some node.
    pub fn is_fully_available(&self) -> bool {
        self.coverage() == self.keyspace.length()
    }

    fn compute_nodes(&self, version: u64, hash: KeyHash) -> NodesForKey {
        let snapshot = self.snapshot.load();
        let mut matching: Vec<_> = snapshot
            .iter()
            .filter(|n| n.total_range().contains(hash))
            .cloned()
            .collect();
        if matching.is_empty() {
            return NodesForKey::empty(version);
        }
        // Stable: ties keep discovery order.
        matching.sort_by_cached_key(|n| n.sorting_distance(hash));
        NodesForKey::new(version, matching)
    }

    fn create_node(
        &self,
        nodes: &mut Nodes<ServerNode>,
        address: NodeAddress,
        state: &NodeState,
    ) -> Arc<ServerNode> {
        let node = Arc::new(ServerNode::new(address, state.range_active, state.range_passive));
        node.update_disabled(state.disabled);
        nodes.insert(Arc::clone(&node));
        self.snapshot.store(Arc::new(nodes.snapshot()));
        debug!(address = %node.address(), ranges = ?node.ranges(), "server node added");
        node
    }

    /// Returns `true` if ranges or the disabled flag changed.
    fn apply_state(node: &ServerNode, state: &NodeState) -> bool {
        let ranges_changed = node.update_ranges(state.range_active, state.range_passive);
        let disabled_changed = node.update_disabled(state.disabled);
        ranges_changed || disabled_changed
    }

    fn invalidate(&self) {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(version, "routing invalidated");
    }
}

impl<C: EntryKeyConverter> fmt::Debug for RoutingTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingTable")
            .field("keyspace", &self.keyspace)
            .field("version", &self.version())
            .field("servers", &self.server_count())
            .finish()
    }
}
