pub mod policy;
pub mod result;

pub use {
    policy::{DeleteOutcome, DeletePolicy, Found, Outcome, Policy, ReadPolicy},
    result::{DeleteResult, OperationResult, ReadResult},
};

use {
    crate::{
        call::{CallContext, CallFailure, CallResult, NodeFailure},
        config::StoreClientConfig,
        node::{Node, ServerNode},
    },
    std::{future::Future, sync::Arc, time::Duration},
    tokio::time::{Instant, sleep, timeout},
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

/// Rounds taking at least this long are followed by the next one without
/// delay.
const QUICK_ROUND: Duration = Duration::from_secs(1);

/// Round of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Every enabled node, in routing order.
    Primary,

    /// Nodes that failed the primary round with a retriable failure.
    Retry,

    /// Nodes skipped by the primary round because they were disabled.
    Disabled,

    /// Remaining retriable nodes, for a bounded number of rounds.
    ExtraRetry,
}

/// Time and retry budget of a single operation.
#[derive(Debug, Clone)]
pub struct OperationLimits {
    pub operation_timeout: Duration,
    pub call_timeout: Duration,
    pub minimum_timeout: Duration,
    pub allow_retries: bool,
    pub retry_delay: Duration,
    pub max_retry_rounds: u32,
    pub max_excerpt_length: usize,
}

impl OperationLimits {
    /// Limits of GET, HEAD and INFO.
    pub fn for_reads(config: &StoreClientConfig) -> Self {
        Self::read_like(config, config.call.get_call_timeout)
    }

    /// Limits of LIST.
    pub fn for_listing(config: &StoreClientConfig) -> Self {
        Self::read_like(config, config.call.list_call_timeout)
    }

    /// Limits of DELETE.
    pub fn for_deletes(config: &StoreClientConfig) -> Self {
        Self {
            operation_timeout: config.operation.delete_operation_timeout,
            call_timeout: config.call.delete_call_timeout,
            minimum_timeout: config.call.minimum_timeout,
            allow_retries: config.operation.allow_retries,
            retry_delay: config.operation.retry_delay,
            max_retry_rounds: config.operation.max_delete_retry_rounds,
            max_excerpt_length: config.call.max_excerpt_length,
        }
    }

    fn read_like(config: &StoreClientConfig, call_timeout: Duration) -> Self {
        Self {
            operation_timeout: config.operation.get_operation_timeout,
            call_timeout,
            minimum_timeout: config.call.minimum_timeout,
            allow_retries: config.operation.allow_retries,
            retry_delay: config.operation.retry_delay,
            max_retry_rounds: config.operation.max_get_retry_rounds,
            max_excerpt_length: config.call.max_excerpt_length,
        }
    }
}

/// Drives a single-node call primitive over an ordered list of nodes.
///
/// Operations run in rounds: all enabled nodes first, then the nodes that
/// failed with a retriable failure, then the disabled nodes, then a bounded
/// number of extra rounds over whatever is still retriable. The whole
/// operation is bounded by a single deadline, checked before every attempt,
/// and by the stop signal of the owning client.
#[derive(Debug, Clone, Default)]
pub struct OperationCoordinator {
    stop: CancellationToken,
}

impl OperationCoordinator {
    pub fn new(stop: CancellationToken) -> Self {
        Self { stop }
    }

    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Runs an operation.
    ///
    /// `call` performs a single call to a single node; the coordinator
    /// bounds it by the time left, so the primitive does not need to enforce
    /// [`CallContext::timeout`] itself.
    pub async fn run<T, P, F, Fut>(
        &self,
        nodes: &[Arc<ServerNode>],
        limits: &OperationLimits,
        policy: P,
        call: F,
    ) -> OperationResult<P::Outcome>
    where
        P: Policy<T>,
        F: Fn(Arc<ServerNode>, CallContext) -> Fut,
        Fut: Future<Output = CallResult<T>>,
    {
        let mut state = RunState::new(policy, nodes.len());
        if nodes.is_empty() || nodes.len() < state.policy.min_candidates() {
            debug!(candidates = nodes.len(), "not enough nodes to run operation");
            return state.into_result();
        }

        let start = Instant::now();
        let end = start + limits.operation_timeout;
        let run = Run {
            coordinator: self,
            limits,
            call: &call,
            end,
            last_valid: end
                .checked_sub(limits.minimum_timeout)
                .unwrap_or(start),
        };
        run.drive(&mut state, nodes, start).await;
        state.into_result()
    }
}

struct RunState<T, P: Policy<T>> {
    policy: P,
    candidates: usize,
    retries: Vec<NodeFailure>,
    failed: Vec<NodeFailure>,
    missing: Vec<Arc<ServerNode>>,
    _value: std::marker::PhantomData<fn(T)>,
}

impl<T, P: Policy<T>> RunState<T, P> {
    fn new(policy: P, candidates: usize) -> Self {
        Self {
            policy,
            candidates,
            retries: Vec::new(),
            failed: Vec::new(),
            missing: Vec::new(),
            _value: std::marker::PhantomData,
        }
    }

    fn into_result(self) -> OperationResult<P::Outcome> {
        let mut failures = self.failed;
        failures.extend(self.retries);
        OperationResult::new(self.policy.into_outcome(), self.candidates, failures, self.missing)
    }
}

/// Outcome of processing a single call result.
enum Step {
    Continue,
    Done,
}

struct Run<'a, F> {
    coordinator: &'a OperationCoordinator,
    limits: &'a OperationLimits,
    call: &'a F,
    end: Instant,
    last_valid: Instant,
}

impl<F> Run<'_, F> {
    async fn drive<T, P, Fut>(&self, state: &mut RunState<T, P>, nodes: &[Arc<ServerNode>], start: Instant)
    where
        P: Policy<T>,
        F: Fn(Arc<ServerNode>, CallContext) -> Fut,
        Fut: Future<Output = CallResult<T>>,
    {
        let retries_allowed = self.limits.allow_retries;

        // Primary round; with retries disabled, this is the only one.
        let mut skipped = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            if retries_allowed && node.is_disabled() {
                if state.policy.stop_at_disabled() {
                    skipped.extend(nodes[i..].iter().cloned());
                    break;
                }
                skipped.push(Arc::clone(node));
                continue;
            }
            if !self.may_attempt(state, Phase::Primary) {
                return;
            }
            let result = self.attempt(node).await;
            if let Step::Done = self.on_first_result(state, Phase::Primary, node, result) {
                return;
            }
        }

        if !retries_allowed {
            return;
        }
        if !self.may_attempt(state, Phase::Retry) {
            return;
        }

        let mut round_start = start;
        if !state.retries.is_empty() {
            debug!(nodes = state.retries.len(), "retrying failed nodes");
            if !self.delay(round_start).await {
                return;
            }
            round_start = Instant::now();
            if let Step::Done = self.retry_round(state, Phase::Retry).await {
                return;
            }
        }

        if !skipped.is_empty() {
            debug!(nodes = skipped.len(), "trying disabled nodes");
        }
        for node in &skipped {
            if !self.may_attempt(state, Phase::Disabled) {
                return;
            }
            let result = self.attempt(node).await;
            if let Step::Done = self.on_first_result(state, Phase::Disabled, node, result) {
                return;
            }
        }

        for round in 1..=self.limits.max_retry_rounds {
            if state.retries.is_empty() {
                break;
            }
            if !self.may_attempt(state, Phase::ExtraRetry) {
                return;
            }
            debug!(round, nodes = state.retries.len(), "extra retry round");
            if !self.delay(round_start).await {
                return;
            }
            round_start = Instant::now();
            if let Step::Done = self.retry_round(state, Phase::ExtraRetry).await {
                return;
            }
        }
    }

    /// Re-attempts every node in the retry queue once.
    async fn retry_round<T, P, Fut>(&self, state: &mut RunState<T, P>, phase: Phase) -> Step
    where
        P: Policy<T>,
        F: Fn(Arc<ServerNode>, CallContext) -> Fut,
        Fut: Future<Output = CallResult<T>>,
    {
        let mut i = 0;
        while i < state.retries.len() {
            if !self.may_attempt(state, phase) {
                return Step::Done;
            }
            let node = Arc::clone(state.retries[i].node());
            match self.attempt(&node).await {
                CallResult::Success(value) => {
                    state.retries.remove(i);
                    state.policy.record_success(&node, value);
                }
                CallResult::NotFound => {
                    state.retries.remove(i);
                    state.policy.record_missing(&node);
                    state.missing.push(node);
                }
                CallResult::Failure(failure) => {
                    let retriable = failure.is_retriable();
                    state.retries[i].add_failure(failure);
                    if retriable {
                        i += 1;
                    } else {
                        let failed = state.retries.remove(i);
                        state.failed.push(failed);
                    }
                }
            }
            if self.coordinator.stop.is_cancelled() || state.policy.is_complete(phase) {
                return Step::Done;
            }
        }
        Step::Continue
    }

    /// Handles the result of the first call to a node.
    fn on_first_result<T, P: Policy<T>>(
        &self,
        state: &mut RunState<T, P>,
        phase: Phase,
        node: &Arc<ServerNode>,
        result: CallResult<T>,
    ) -> Step {
        match result {
            CallResult::Success(value) => state.policy.record_success(node, value),
            CallResult::NotFound => {
                state.policy.record_missing(node);
                state.missing.push(Arc::clone(node));
            }
            CallResult::Failure(failure) => {
                let queue = self.limits.allow_retries && failure.is_retriable();
                let failure = NodeFailure::new(Arc::clone(node), failure);
                if queue {
                    state.retries.push(failure);
                } else {
                    state.failed.push(failure);
                }
            }
        }
        if self.coordinator.stop.is_cancelled() || state.policy.is_complete(phase) {
            Step::Done
        } else {
            Step::Continue
        }
    }

    /// Whether another call may be started.
    fn may_attempt<T, P: Policy<T>>(&self, state: &RunState<T, P>, phase: Phase) -> bool {
        if state.policy.is_complete(phase) || self.coordinator.stop.is_cancelled() {
            return false;
        }
        if Instant::now() >= self.last_valid {
            debug!(?phase, "operation deadline reached");
            return false;
        }
        true
    }

    /// Calls a single node, bounded by the time left and the stop signal.
    async fn attempt<T, Fut>(&self, node: &Arc<ServerNode>) -> CallResult<T>
    where
        F: Fn(Arc<ServerNode>, CallContext) -> Fut,
        Fut: Future<Output = CallResult<T>>,
    {
        let address = node.address().clone();
        let started = Instant::now();
        let allotted = self
            .end
            .saturating_duration_since(started)
            .min(self.limits.call_timeout);
        if allotted < self.limits.minimum_timeout {
            return CallResult::Failure(CallFailure::timeout(address, started, started));
        }

        let ctx = CallContext::new(address.clone(), started, allotted, self.limits.max_excerpt_length);
        tokio::select! {
            biased;
            _ = self.coordinator.stop.cancelled() => {
                CallResult::Failure(CallFailure::interrupted(address, started, Instant::now()))
            }
            result = timeout(allotted, (self.call)(Arc::clone(node), ctx)) => {
                result.unwrap_or_else(|_| {
                    CallResult::Failure(CallFailure::timeout(address, started, Instant::now()))
                })
            }
        }
    }

    /// Waits between rounds, unless the previous round was slow or too
    /// little time is left. Returns `false` if interrupted.
    async fn delay(&self, round_start: Instant) -> bool {
        let now = Instant::now();
        if now.saturating_duration_since(round_start) >= QUICK_ROUND {
            return true;
        }
        let delay = self.limits.retry_delay;
        if self.end.saturating_duration_since(now) < delay * 4 {
            return true;
        }
        tokio::select! {
            biased;
            _ = self.coordinator.stop.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }
}
