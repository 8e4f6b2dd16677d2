use {
    super::Phase,
    crate::node::ServerNode,
    std::sync::Arc,
};

/// Decides when a multi-node operation has achieved its goal.
///
/// The coordinator consults [`Policy::is_complete`] after every recorded
/// outcome and before every attempt; once it returns `true`, no more nodes
/// are contacted.
pub trait Policy<T> {
    /// Aggregate produced by the policy once the operation ends.
    type Outcome: Outcome;

    /// Operations with fewer candidate nodes are not attempted at all.
    fn min_candidates(&self) -> usize;

    /// Whether the primary round ends at the first disabled node, instead of
    /// skipping over it.
    fn stop_at_disabled(&self) -> bool;

    fn record_success(&mut self, node: &Arc<ServerNode>, value: T);

    fn record_missing(&mut self, node: &Arc<ServerNode>);

    fn is_complete(&self, phase: Phase) -> bool;

    fn into_outcome(self) -> Self::Outcome;
}

/// Result of an operation, as seen by the policy that produced it.
pub trait Outcome {
    fn succeeded(&self) -> bool;
}

/// Content returned by one of the nodes.
#[derive(Debug)]
pub struct Found<T> {
    node: Arc<ServerNode>,
    value: T,
}

impl<T> Found<T> {
    /// Node that supplied the content.
    pub fn node(&self) -> &Arc<ServerNode> {
        &self.node
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T> Outcome for Option<Found<T>> {
    fn succeeded(&self) -> bool {
        self.is_some()
    }
}

/// First success wins: used by GET, HEAD, INFO and LIST.
///
/// Missing content is not a failure, other nodes are tried.
#[derive(Debug)]
pub struct ReadPolicy<T> {
    found: Option<Found<T>>,
}

impl<T> ReadPolicy<T> {
    pub fn new() -> Self {
        Self { found: None }
    }
}

impl<T> Default for ReadPolicy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Policy<T> for ReadPolicy<T> {
    type Outcome = Option<Found<T>>;

    fn min_candidates(&self) -> usize {
        1
    }

    fn stop_at_disabled(&self) -> bool {
        false
    }

    fn record_success(&mut self, node: &Arc<ServerNode>, value: T) {
        self.found = Some(Found {
            node: Arc::clone(node),
            value,
        });
    }

    fn record_missing(&mut self, _node: &Arc<ServerNode>) {}

    fn is_complete(&self, _phase: Phase) -> bool {
        self.found.is_some()
    }

    fn into_outcome(self) -> Self::Outcome {
        self.found
    }
}

/// Counted successes against thresholds: used by DELETE.
///
/// During the primary round every enabled node is tried until `maximal`
/// deletes succeed; the first retry round runs only until `optimal` is
/// reached; the last resort rounds (disabled nodes, extra retries) only
/// until `minimal` is reached. Missing content counts as deleted.
#[derive(Debug)]
pub struct DeletePolicy {
    minimal: usize,
    optimal: usize,
    maximal: usize,
    succeeded: Vec<Arc<ServerNode>>,
}

impl DeletePolicy {
    pub fn new(minimal: usize, optimal: usize, maximal: usize) -> Self {
        Self {
            minimal,
            optimal,
            maximal,
            succeeded: Vec::new(),
        }
    }
}

impl Policy<()> for DeletePolicy {
    type Outcome = DeleteOutcome;

    fn min_candidates(&self) -> usize {
        self.minimal
    }

    fn stop_at_disabled(&self) -> bool {
        true
    }

    fn record_success(&mut self, node: &Arc<ServerNode>, _value: ()) {
        self.succeeded.push(Arc::clone(node));
    }

    fn record_missing(&mut self, node: &Arc<ServerNode>) {
        self.succeeded.push(Arc::clone(node));
    }

    fn is_complete(&self, phase: Phase) -> bool {
        let oks = self.succeeded.len();
        match phase {
            Phase::Primary => oks >= self.maximal,
            Phase::Retry => oks >= self.optimal,
            Phase::Disabled | Phase::ExtraRetry => oks >= self.minimal,
        }
    }

    fn into_outcome(self) -> DeleteOutcome {
        DeleteOutcome {
            minimal: self.minimal,
            optimal: self.optimal,
            succeeded: self.succeeded,
        }
    }
}

/// Nodes a delete succeeded on.
#[derive(Debug)]
pub struct DeleteOutcome {
    minimal: usize,
    optimal: usize,
    succeeded: Vec<Arc<ServerNode>>,
}

impl DeleteOutcome {
    pub fn ok_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn succeeded_nodes(&self) -> &[Arc<ServerNode>] {
        &self.succeeded
    }

    pub fn is_optimal(&self) -> bool {
        self.succeeded.len() >= self.optimal
    }
}

impl Outcome for DeleteOutcome {
    fn succeeded(&self) -> bool {
        self.succeeded.len() >= self.minimal
    }
}
