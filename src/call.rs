use {
    crate::node::{Node, NodeAddress, ServerNode},
    std::{fmt, sync::Arc, time::Duration},
    tokio::time::Instant,
};

/// Reason a single-node call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureCause {
    #[error("timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("server failure (status {status}): {excerpt}")]
    Server { status: u16, excerpt: String },

    #[error("internal failure: {0}")]
    Internal(String),

    #[error("interrupted")]
    Interrupted,
}

impl FailureCause {
    /// Whether the condition is transient, so that the same node may be
    /// tried again within the same operation.
    pub fn is_retriable(&self) -> bool {
        matches!(self, FailureCause::Timeout | FailureCause::Transport(_))
    }
}

/// Failure of a single call to a single server node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    address: NodeAddress,
    started: Instant,
    ended: Instant,
    cause: FailureCause,
}

impl CallFailure {
    pub fn new(address: NodeAddress, started: Instant, ended: Instant, cause: FailureCause) -> Self {
        Self {
            address,
            started,
            ended,
            cause,
        }
    }

    pub fn timeout(address: NodeAddress, started: Instant, ended: Instant) -> Self {
        Self::new(address, started, ended, FailureCause::Timeout)
    }

    pub fn interrupted(address: NodeAddress, started: Instant, ended: Instant) -> Self {
        Self::new(address, started, ended, FailureCause::Interrupted)
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn ended(&self) -> Instant {
        self.ended
    }

    pub fn duration(&self) -> Duration {
        self.ended.saturating_duration_since(self.started)
    }

    pub fn cause(&self) -> &FailureCause {
        &self.cause
    }

    /// Status code of the server response, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match &self.cause {
            FailureCause::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.cause.is_retriable()
    }
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "call to {} failed after {} msecs: {}",
            self.address,
            self.duration().as_millis(),
            self.cause
        )
    }
}

/// All failed calls to a single server node during one operation.
#[derive(Debug, Clone)]
pub struct NodeFailure {
    node: Arc<ServerNode>,
    failures: Vec<CallFailure>,
}

impl NodeFailure {
    pub fn new(node: Arc<ServerNode>, first: CallFailure) -> Self {
        Self {
            node,
            failures: vec![first],
        }
    }

    pub fn node(&self) -> &Arc<ServerNode> {
        &self.node
    }

    pub fn address(&self) -> &NodeAddress {
        self.node.address()
    }

    pub fn failures(&self) -> &[CallFailure] {
        &self.failures
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn first_call_failure(&self) -> &CallFailure {
        &self.failures[0]
    }

    pub fn last_call_failure(&self) -> &CallFailure {
        &self.failures[self.failures.len() - 1]
    }

    /// Whether the node may still be retried; decided by the latest failure.
    pub fn is_retriable(&self) -> bool {
        self.last_call_failure().is_retriable()
    }

    pub(crate) fn add_failure(&mut self, failure: CallFailure) {
        self.failures.push(failure);
    }
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} failures, first: {})",
            self.address(),
            self.failures.len(),
            self.first_call_failure().cause()
        )
    }
}

/// Outcome of a single call to a single server node.
#[derive(Debug)]
pub enum CallResult<T> {
    /// Node returned the requested content.
    Success(T),

    /// Node responded, but does not have the content.
    NotFound,

    Failure(CallFailure),
}

impl<T> CallResult<T> {
    pub fn succeeded(&self) -> bool {
        !self.failed()
    }

    pub fn failed(&self) -> bool {
        matches!(self, CallResult::Failure(_))
    }

    pub fn failure(&self) -> Option<&CallFailure> {
        match self {
            CallResult::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Parameters of a single call, handed to the call primitive.
#[derive(Debug, Clone)]
pub struct CallContext {
    address: NodeAddress,
    started: Instant,
    timeout: Duration,
    max_excerpt_length: usize,
}

impl CallContext {
    pub fn new(address: NodeAddress, started: Instant, timeout: Duration, max_excerpt_length: usize) -> Self {
        Self {
            address,
            started,
            timeout,
            max_excerpt_length,
        }
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Time allotted to the call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Point in time the call must be completed by.
    pub fn deadline(&self) -> Instant {
        self.started + self.timeout
    }

    /// Failure for a well-formed error response, with the body cut down to
    /// the configured excerpt length.
    pub fn server_failure(&self, status: u16, body: &str) -> CallFailure {
        let excerpt = match body.char_indices().nth(self.max_excerpt_length) {
            Some((at, _)) => format!("{}[...]", &body[..at]),
            None => body.to_string(),
        };
        self.failure(FailureCause::Server { status, excerpt })
    }

    pub fn transport_failure(&self, message: impl Into<String>) -> CallFailure {
        self.failure(FailureCause::Transport(message.into()))
    }

    pub fn internal_failure(&self, message: impl Into<String>) -> CallFailure {
        self.failure(FailureCause::Internal(message.into()))
    }

    pub fn failure(&self, cause: FailureCause) -> CallFailure {
        CallFailure::new(self.address.clone(), self.started, Instant::now(), cause)
    }
}
