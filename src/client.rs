use {
    crate::{
        ClusterError, ClusterResult, OperationError,
        call::{CallContext, CallResult},
        config::StoreClientConfig,
        hash::{EntryKeyConverter, RawKey, Utf8KeyConverter},
        lister::StoreEntryLister,
        node::{ClusterStatusMessage, NodeAddress, ServerNode},
        operation::{
            DeletePolicy, DeleteResult, OperationCoordinator, OperationLimits, OperationResult, Outcome,
            ReadPolicy, ReadResult,
        },
        routing::RoutingTable,
    },
    async_trait::async_trait,
    bytes::Bytes,
    serde::{Deserialize, Serialize},
    std::{fmt, sync::Arc},
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

/// Byte range of entry content, `[start, end)` over uncompressed content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ByteRangeRepr", into = "ByteRangeRepr")]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> ClusterResult<Self> {
        if end <= start {
            return Err(ClusterError::InvalidArgument(format!(
                "Invalid byte range [{start}, {end}): must not be empty"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes in the range; never zero.
    pub fn length(&self) -> u64 {
        self.end - self.start
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end - 1)
    }
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct ByteRangeRepr {
    start: u64,
    end: u64,
}

impl TryFrom<ByteRangeRepr> for ByteRange {
    type Error = ClusterError;

    fn try_from(repr: ByteRangeRepr) -> ClusterResult<Self> {
        Self::new(repr.start, repr.end)
    }
}

impl From<ByteRange> for ByteRangeRepr {
    fn from(range: ByteRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

/// Metadata of a stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: RawKey,
    pub content_length: u64,
    pub compressed: bool,
    /// Msecs since epoch.
    pub last_modified: u64,
}

/// Kind of items a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListItemType {
    Ids,
    Names,
    MinimalEntries,
    FullEntries,
}

/// Single item of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListItem {
    Id(RawKey),
    Name(String),
    Entry(EntryInfo),
}

/// Single page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListPage {
    pub items: Vec<ListItem>,

    /// Last entry the page covers; listing continues after it.
    pub last_seen: Option<RawKey>,
}

/// Single-node call primitives.
///
/// Implementations talk to exactly one server node and report what happened;
/// retries, failover and the time budget are handled by the caller.
#[async_trait]
pub trait EntryAccessor: Send + Sync {
    async fn try_get(
        &self,
        node: Arc<ServerNode>,
        ctx: CallContext,
        key: RawKey,
        range: Option<ByteRange>,
    ) -> CallResult<Bytes>;

    /// Content length of the entry.
    async fn try_head(&self, node: Arc<ServerNode>, ctx: CallContext, key: RawKey) -> CallResult<u64>;

    async fn try_info(&self, node: Arc<ServerNode>, ctx: CallContext, key: RawKey) -> CallResult<EntryInfo>;

    async fn try_list(
        &self,
        node: Arc<ServerNode>,
        ctx: CallContext,
        prefix: RawKey,
        item_type: ListItemType,
        max: usize,
        last_seen: Option<RawKey>,
    ) -> CallResult<ListPage>;

    async fn try_delete(&self, node: Arc<ServerNode>, ctx: CallContext, key: RawKey) -> CallResult<()>;
}

/// Client of a clustered content store.
///
/// Resolves keys into server nodes through its [`RoutingTable`], and runs
/// every operation over those nodes with an [`OperationCoordinator`].
pub struct StoreClient<A: EntryAccessor, C: EntryKeyConverter = Utf8KeyConverter> {
    config: StoreClientConfig,
    routing: Arc<RoutingTable<C>>,
    accessor: A,
    coordinator: OperationCoordinator,
}

impl<A: EntryAccessor, C: EntryKeyConverter> StoreClient<A, C> {
    pub fn new(config: StoreClientConfig, converter: C, accessor: A) -> ClusterResult<Self> {
        config.validate()?;
        let routing = Arc::new(RoutingTable::new(config.keyspace, converter));
        Ok(Self {
            config,
            routing,
            accessor,
            coordinator: OperationCoordinator::new(CancellationToken::new()),
        })
    }

    pub fn config(&self) -> &StoreClientConfig {
        &self.config
    }

    pub fn routing(&self) -> &Arc<RoutingTable<C>> {
        &self.routing
    }

    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    /// Aborts in-flight calls and retry delays; no new calls are made.
    pub fn stop(&self) {
        debug!("store client stopping");
        self.coordinator.stop_token().cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.coordinator.stop_token().is_cancelled()
    }

    /// Applies a cluster status report received from `from`.
    ///
    /// State of the sender is taken as direct information, states of its
    /// peers as indirect. Returns `true` if routing changed.
    pub fn handle_cluster_status(
        &self,
        from: &NodeAddress,
        msg: &ClusterStatusMessage,
        request_time: u64,
        response_time: u64,
    ) -> bool {
        let mut changed = self.routing.update_direct_state(
            from,
            &msg.local,
            request_time,
            response_time,
            msg.cluster_last_updated,
        );
        for state in &msg.remote {
            changed |= self.routing.update_indirect_state(from, state);
        }
        changed
    }

    /// Records the cluster update timestamp a node advertised on a regular
    /// entry response.
    pub fn handle_cluster_hint(
        &self,
        from: &NodeAddress,
        request_time: u64,
        response_time: u64,
        cluster_update: u64,
    ) -> bool {
        self.routing
            .update_cluster_hint(from, request_time, response_time, cluster_update)
    }

    /// GETs content, or part of it, from the first node that has it.
    pub async fn get_content(&self, key: &C::Key, range: Option<ByteRange>) -> ReadResult<Bytes> {
        let nodes = self.routing.get_nodes_for(key);
        let raw = self.routing.converter().to_raw(key);
        let limits = OperationLimits::for_reads(&self.config);
        self.coordinator
            .run(nodes.as_slice(), &limits, ReadPolicy::new(), |node, ctx| {
                self.accessor.try_get(node, ctx, raw.clone(), range)
            })
            .await
    }

    pub async fn head_content(&self, key: &C::Key) -> ReadResult<u64> {
        let nodes = self.routing.get_nodes_for(key);
        let raw = self.routing.converter().to_raw(key);
        let limits = OperationLimits::for_reads(&self.config);
        self.coordinator
            .run(nodes.as_slice(), &limits, ReadPolicy::new(), |node, ctx| {
                self.accessor.try_head(node, ctx, raw.clone())
            })
            .await
    }

    pub async fn find_info(&self, key: &C::Key) -> ReadResult<EntryInfo> {
        let nodes = self.routing.get_nodes_for(key);
        let raw = self.routing.converter().to_raw(key);
        let limits = OperationLimits::for_reads(&self.config);
        self.coordinator
            .run(nodes.as_slice(), &limits, ReadPolicy::new(), |node, ctx| {
                self.accessor.try_info(node, ctx, raw.clone())
            })
            .await
    }

    /// DELETEs content from the nodes holding it; see [`DeletePolicy`] for
    /// when the operation counts as done.
    pub async fn delete_content(&self, key: &C::Key) -> DeleteResult {
        let nodes = self.routing.get_nodes_for(key);
        let raw = self.routing.converter().to_raw(key);
        let limits = OperationLimits::for_deletes(&self.config);
        let op = &self.config.operation;
        let policy = DeletePolicy::new(op.minimal_oks, op.optimal_oks, op.maximal_oks);
        self.coordinator
            .run(nodes.as_slice(), &limits, policy, |node, ctx| {
                self.accessor.try_delete(node, ctx, raw.clone())
            })
            .await
    }

    /// Starts listing entries with the given key prefix; nothing is fetched
    /// until [`StoreEntryLister::list_more`] is called.
    pub fn list_content(&self, prefix: C::Key, item_type: ListItemType) -> StoreEntryLister<'_, A, C> {
        StoreEntryLister::new(self, prefix, item_type)
    }

    /// Fetches one page of a listing.
    pub(crate) async fn list_page(
        &self,
        prefix: &C::Key,
        item_type: ListItemType,
        max: usize,
        last_seen: Option<RawKey>,
    ) -> ReadResult<ListPage> {
        let nodes = self.routing.get_nodes_for(prefix);
        let raw = self.routing.converter().to_raw(prefix);
        let limits = OperationLimits::for_listing(&self.config);
        self.coordinator
            .run(nodes.as_slice(), &limits, ReadPolicy::new(), |node, ctx| {
                self.accessor
                    .try_list(node, ctx, raw.clone(), item_type, max, last_seen.clone())
            })
            .await
    }

    /// Content of the entry; `None` if no node has it.
    pub async fn get_content_as_bytes(&self, key: &C::Key) -> Result<Option<Bytes>, OperationError> {
        let result = self.get_content(key, None).await;
        Self::found_or_error("GET", key, result)
    }

    /// Part of the content of the entry; `None` if no node has it.
    pub async fn get_partial_content_as_bytes(
        &self,
        key: &C::Key,
        range: ByteRange,
    ) -> Result<Option<Bytes>, OperationError> {
        let result = self.get_content(key, Some(range)).await;
        Self::found_or_error("GET", key, result)
    }

    /// Length of the entry content; `None` if no node has it.
    pub async fn get_content_length(&self, key: &C::Key) -> Result<Option<u64>, OperationError> {
        let result = self.head_content(key).await;
        Self::found_or_error("HEAD", key, result)
    }

    fn found_or_error<T>(
        verb: &'static str,
        key: &C::Key,
        result: ReadResult<T>,
    ) -> Result<Option<T>, OperationError> {
        if result.candidates() == 0 {
            return Err(OperationError::NoServers {
                verb,
                key: key.to_string(),
            });
        }
        if result.failed() {
            return Err(operation_error(verb, key, &result));
        }
        Ok(result.into_outcome().map(|found| found.into_value()))
    }
}

/// Single error summarizing a failed operation.
pub(crate) fn operation_error<O: Outcome>(
    verb: &'static str,
    key: &impl fmt::Display,
    result: &OperationResult<O>,
) -> OperationError {
    let cause = result
        .first_fail()
        .map(|fail| fail.first_call_failure().cause().to_string())
        .unwrap_or_else(|| "no failure recorded".to_string());
    OperationError::Failed {
        verb,
        key: key.to_string(),
        tried: result.fail_count(),
        cause,
    }
}

impl<A: EntryAccessor, C: EntryKeyConverter> Drop for StoreClient<A, C> {
    fn drop(&mut self) {
        self.coordinator.stop_token().cancel();
    }
}
