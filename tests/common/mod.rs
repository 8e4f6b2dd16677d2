#![allow(dead_code)]

use {
    async_trait::async_trait,
    bytes::Bytes,
    clustermate::{
        ByteRange, CallContext, CallResult, EntryAccessor, EntryInfo, KeyRange, KeySpace, ListItemType,
        ListPage, Node, NodeAddress, NodeState, RawKey, ServerNode,
    },
    parking_lot::Mutex,
    std::{
        collections::{HashMap, VecDeque},
        sync::Arc,
    },
    tokio::time::Instant,
};

/// What a node does when called.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Has the content.
    Found,
    /// Does not have the content.
    Missing,
    /// Never answers.
    Hang,
    /// Connection level failure, retriable.
    Transport,
    /// Error response, not retriable.
    Server(u16),
}

/// Single call made through the accessor.
#[derive(Debug, Clone)]
pub struct Call {
    pub port: u16,
    pub verb: &'static str,
    pub at: Instant,
    pub range: Option<ByteRange>,
    pub last_seen: Option<RawKey>,
}

/// Accessor replaying scripted replies, per node port.
///
/// Replies are consumed in order; once a script runs out, its last reply
/// repeats. Nodes without a script reply with [`Reply::Missing`].
#[derive(Default)]
pub struct ScriptedAccessor {
    content: Bytes,
    scripts: Mutex<HashMap<u16, VecDeque<Reply>>>,
    pages: Mutex<VecDeque<ListPage>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedAccessor {
    pub fn new(content: &'static str) -> Self {
        Self {
            content: Bytes::from_static(content.as_bytes()),
            ..Default::default()
        }
    }

    pub fn script(self, port: u16, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.scripts.lock().insert(port, replies.into_iter().collect());
        self
    }

    /// Pages returned by successful LIST calls, in order.
    pub fn pages(self, pages: impl IntoIterator<Item = ListPage>) -> Self {
        self.pages.lock().extend(pages);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, port: u16) -> usize {
        self.calls.lock().iter().filter(|c| c.port == port).count()
    }

    fn next_reply(&self, node: &ServerNode, call: Call) -> Reply {
        let port = node.address().port();
        self.calls.lock().push(call);
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(&port) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap(),
            Some(script) => script.front().cloned().unwrap_or(Reply::Missing),
            None => Reply::Missing,
        }
    }

    async fn reply<T>(
        &self,
        node: &ServerNode,
        ctx: &CallContext,
        verb: &'static str,
        range: Option<ByteRange>,
        last_seen: Option<RawKey>,
        found: impl FnOnce() -> T,
    ) -> CallResult<T> {
        let call = Call {
            port: node.address().port(),
            verb,
            at: Instant::now(),
            range,
            last_seen,
        };
        match self.next_reply(node, call) {
            Reply::Found => CallResult::Success(found()),
            Reply::Missing => CallResult::NotFound,
            Reply::Hang => std::future::pending().await,
            Reply::Transport => CallResult::Failure(ctx.transport_failure("connection refused")),
            Reply::Server(status) => CallResult::Failure(ctx.server_failure(status, "internal error")),
        }
    }
}

#[async_trait]
impl EntryAccessor for ScriptedAccessor {
    async fn try_get(
        &self,
        node: Arc<ServerNode>,
        ctx: CallContext,
        _key: RawKey,
        range: Option<ByteRange>,
    ) -> CallResult<Bytes> {
        let content = self.content.clone();
        self.reply(&node, &ctx, "GET", range, None, || match range {
            Some(range) => content.slice(range.start() as usize..range.end() as usize),
            None => content,
        })
        .await
    }

    async fn try_head(&self, node: Arc<ServerNode>, ctx: CallContext, _key: RawKey) -> CallResult<u64> {
        let length = self.content.len() as u64;
        self.reply(&node, &ctx, "HEAD", None, None, || length).await
    }

    async fn try_info(&self, node: Arc<ServerNode>, ctx: CallContext, key: RawKey) -> CallResult<EntryInfo> {
        let content_length = self.content.len() as u64;
        self.reply(&node, &ctx, "INFO", None, None, || EntryInfo {
            key,
            content_length,
            compressed: false,
            last_modified: 1000,
        })
        .await
    }

    async fn try_list(
        &self,
        node: Arc<ServerNode>,
        ctx: CallContext,
        _prefix: RawKey,
        _item_type: ListItemType,
        _max: usize,
        last_seen: Option<RawKey>,
    ) -> CallResult<ListPage> {
        let page = self.pages.lock().pop_front().unwrap_or_default();
        self.reply(&node, &ctx, "LIST", None, last_seen, || page).await
    }

    async fn try_delete(&self, node: Arc<ServerNode>, ctx: CallContext, _key: RawKey) -> CallResult<()> {
        self.reply(&node, &ctx, "DELETE", None, None, || ()).await
    }
}

pub fn address(port: u16) -> NodeAddress {
    NodeAddress::new("10.0.0.1", port)
}

pub fn range(start: u32, length: u32) -> KeyRange {
    KeySpace::default().range(start, length).unwrap()
}

/// State of a node covering the whole key space.
pub fn full_state(port: u16) -> NodeState {
    let full = KeySpace::default().full_range();
    NodeState::new(address(port), Some(u32::from(port)), full, full, 100)
}

/// Server node covering the whole key space.
pub fn full_node(port: u16) -> Arc<ServerNode> {
    let full = KeySpace::default().full_range();
    Arc::new(ServerNode::new(address(port), full, full))
}
