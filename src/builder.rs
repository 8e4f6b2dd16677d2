use {
    super::{CallConfig, ClusterResult, KeySpace, OperationConfig, StoreClientConfig},
    std::time::Duration,
};

/// Store client configuration builder.
///
/// Starts from defaults; `build()` validates the result.
#[derive(Debug, Clone, Default)]
pub struct StoreClientConfigBuilder(StoreClientConfig);

impl StoreClientConfigBuilder {
    /// Create new builder, with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a key space of given length.
    pub fn with_keyspace_length(mut self, length: u32) -> ClusterResult<Self> {
        self.0.keyspace = KeySpace::new(length)?;
        Ok(self)
    }

    /// Replace all call settings.
    pub fn with_call_config(mut self, call: CallConfig) -> Self {
        self.0.call = call;
        self
    }

    /// Replace all operation settings.
    pub fn with_operation_config(mut self, operation: OperationConfig) -> Self {
        self.0.operation = operation;
        self
    }

    /// Per-call timeouts for reads, deletes and listings.
    pub fn with_call_timeouts(mut self, get: Duration, delete: Duration, list: Duration) -> Self {
        self.0.call.get_call_timeout = get;
        self.0.call.delete_call_timeout = delete;
        self.0.call.list_call_timeout = list;
        self
    }

    /// Floor below which calls are not attempted.
    pub fn with_minimum_timeout(mut self, timeout: Duration) -> Self {
        self.0.call.minimum_timeout = timeout;
        self
    }

    /// Total time budgets of read and delete operations.
    pub fn with_operation_timeouts(mut self, get: Duration, delete: Duration) -> Self {
        self.0.operation.get_operation_timeout = get;
        self.0.operation.delete_operation_timeout = delete;
        self
    }

    /// Enable or disable retries altogether.
    pub fn with_retries(mut self, allow: bool) -> Self {
        self.0.operation.allow_retries = allow;
        self
    }

    /// Delay between retry rounds.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.0.operation.retry_delay = delay;
        self
    }

    /// Number of extra retry rounds, for reads and deletes.
    pub fn with_retry_rounds(mut self, get: u32, delete: u32) -> Self {
        self.0.operation.max_get_retry_rounds = get;
        self.0.operation.max_delete_retry_rounds = delete;
        self
    }

    /// Success thresholds of deletes.
    pub fn with_delete_thresholds(mut self, minimal: usize, optimal: usize, maximal: usize) -> Self {
        self.0.operation.minimal_oks = minimal;
        self.0.operation.optimal_oks = optimal;
        self.0.operation.maximal_oks = maximal;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClusterResult<StoreClientConfig> {
        self.0.validate()?;
        Ok(self.0)
    }
}
