use {
    crate::{
        ClusterError, ClusterResult,
        client::{EntryAccessor, ListItemType, ListPage, StoreClient},
        hash::EntryKeyConverter,
        operation::ReadResult,
    },
    tracing::debug,
};

/// Page size used by [`StoreEntryLister::list_more`].
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Incremental listing of entries sharing a key prefix.
///
/// Each call fetches the next page from whichever node answers first, and
/// remembers where the page ended so that the next call continues from there.
pub struct StoreEntryLister<'a, A: EntryAccessor, C: EntryKeyConverter> {
    client: &'a StoreClient<A, C>,
    prefix: C::Key,
    item_type: ListItemType,
    last_seen: Option<C::Key>,
}

impl<'a, A: EntryAccessor, C: EntryKeyConverter> StoreEntryLister<'a, A, C> {
    pub(crate) fn new(client: &'a StoreClient<A, C>, prefix: C::Key, item_type: ListItemType) -> Self {
        Self {
            client,
            prefix,
            item_type,
            last_seen: None,
        }
    }

    /// Continue listing after the given key.
    pub fn with_last_seen(mut self, last_seen: C::Key) -> Self {
        self.last_seen = Some(last_seen);
        self
    }

    pub fn prefix(&self) -> &C::Key {
        &self.prefix
    }

    pub fn item_type(&self) -> ListItemType {
        self.item_type
    }

    pub fn last_seen(&self) -> Option<&C::Key> {
        self.last_seen.as_ref()
    }

    /// Fetches up to [`DEFAULT_MAX_ENTRIES`] more entries.
    pub async fn list_more(&mut self) -> ClusterResult<ReadResult<ListPage>> {
        self.list_more_with(DEFAULT_MAX_ENTRIES).await
    }

    /// Fetches up to `max` more entries.
    ///
    /// Fails only if `max` is zero or the returned last-seen key cannot be
    /// decoded; node failures are reported through the result.
    pub async fn list_more_with(&mut self, max: usize) -> ClusterResult<ReadResult<ListPage>> {
        if max == 0 {
            return Err(ClusterError::InvalidArgument(
                "Number of entries to list must be positive".into(),
            ));
        }
        let client = self.client;
        let converter = client.routing().converter();
        let last_seen = self.last_seen.as_ref().map(|key| converter.to_raw(key));
        let result = client
            .list_page(&self.prefix, self.item_type, max, last_seen)
            .await;

        if let Some(raw) = result.found().and_then(|found| found.value().last_seen.as_ref()) {
            self.last_seen = Some(converter.from_raw(raw)?);
            debug!(prefix = %self.prefix, "listing advanced");
        }
        Ok(result)
    }
}
