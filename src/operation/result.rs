use {
    super::{DeleteOutcome, Found, Outcome},
    crate::{call::NodeFailure, node::ServerNode},
    std::sync::Arc,
};

/// Aggregate result of a multi-node operation.
///
/// Always carries every per-node failure, even when the operation as a whole
/// succeeded.
#[derive(Debug)]
pub struct OperationResult<O> {
    outcome: O,
    candidates: usize,
    failures: Vec<NodeFailure>,
    missing: Vec<Arc<ServerNode>>,
}

/// Result of GET, HEAD, INFO and LIST.
pub type ReadResult<T> = OperationResult<Option<Found<T>>>;

/// Result of DELETE.
pub type DeleteResult = OperationResult<DeleteOutcome>;

impl<O: Outcome> OperationResult<O> {
    pub(crate) fn new(
        outcome: O,
        candidates: usize,
        failures: Vec<NodeFailure>,
        missing: Vec<Arc<ServerNode>>,
    ) -> Self {
        Self {
            outcome,
            candidates,
            failures,
            missing,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.succeeded()
    }

    /// Whether the operation did not succeed because of node failures, as
    /// opposed to having no nodes to try or content missing everywhere.
    pub fn failed(&self) -> bool {
        !self.succeeded() && !self.failures.is_empty()
    }

    pub fn outcome(&self) -> &O {
        &self.outcome
    }

    pub fn into_outcome(self) -> O {
        self.outcome
    }

    /// Number of nodes the operation could have contacted.
    pub fn candidates(&self) -> usize {
        self.candidates
    }

    pub fn failures(&self) -> &[NodeFailure] {
        &self.failures
    }

    pub fn fail_count(&self) -> usize {
        self.failures.len()
    }

    pub fn first_fail(&self) -> Option<&NodeFailure> {
        self.failures.first()
    }

    /// Nodes that responded without having the content.
    pub fn missing(&self) -> &[Arc<ServerNode>] {
        &self.missing
    }

    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }
}

impl<T> ReadResult<T> {
    pub fn found(&self) -> Option<&Found<T>> {
        self.outcome.as_ref()
    }

    /// Node that supplied the content, if any did.
    pub fn server(&self) -> Option<&Arc<ServerNode>> {
        self.outcome.as_ref().map(Found::node)
    }
}
