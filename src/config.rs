use {
    crate::{ClusterError, ClusterResult, KeySpace, StoreClientConfigBuilder},
    serde::{Deserialize, Serialize},
    std::time::Duration,
};

/// Settings of individual calls to server nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Upper bound for a single GET, HEAD or INFO call.
    #[serde(with = "humantime_serde")]
    pub get_call_timeout: Duration,

    /// Upper bound for a single DELETE call.
    #[serde(with = "humantime_serde")]
    pub delete_call_timeout: Duration,

    /// Upper bound for a single LIST call.
    #[serde(with = "humantime_serde")]
    pub list_call_timeout: Duration,

    /// Calls that would get less time than this are not made at all, and
    /// count as timed out.
    #[serde(with = "humantime_serde")]
    pub minimum_timeout: Duration,

    /// Maximum length of error response excerpts kept in failures.
    pub max_excerpt_length: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            get_call_timeout: Duration::from_secs(3),
            delete_call_timeout: Duration::from_secs(3),
            list_call_timeout: Duration::from_secs(5),
            minimum_timeout: Duration::from_millis(10),
            max_excerpt_length: 500,
        }
    }
}

/// Settings of multi-node operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    /// Total time budget of GET, HEAD, INFO and LIST operations.
    #[serde(with = "humantime_serde")]
    pub get_operation_timeout: Duration,

    /// Total time budget of DELETE operations.
    #[serde(with = "humantime_serde")]
    pub delete_operation_timeout: Duration,

    /// When disabled, every node is tried exactly once, enabled or not.
    pub allow_retries: bool,

    /// Delay between retry rounds.
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Extra rounds after the disabled node sweep, for reads.
    pub max_get_retry_rounds: u32,

    /// Extra rounds after the disabled node sweep, for deletes.
    pub max_delete_retry_rounds: u32,

    /// Deletes succeeding on fewer nodes have failed.
    pub minimal_oks: usize,

    /// Deletes stop retrying once this many nodes succeeded.
    pub optimal_oks: usize,

    /// Deletes stop trying more nodes once this many nodes succeeded.
    pub maximal_oks: usize,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            get_operation_timeout: Duration::from_secs(10),
            delete_operation_timeout: Duration::from_secs(10),
            allow_retries: true,
            retry_delay: Duration::from_millis(250),
            max_get_retry_rounds: 3,
            max_delete_retry_rounds: 3,
            minimal_oks: 1,
            optimal_oks: 2,
            maximal_oks: 3,
        }
    }
}

/// Store client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreClientConfig {
    pub keyspace: KeySpace,
    pub call: CallConfig,
    pub operation: OperationConfig,
}

impl StoreClientConfig {
    pub fn builder() -> StoreClientConfigBuilder {
        StoreClientConfigBuilder::new()
    }

    /// Checks settings for consistency.
    pub fn validate(&self) -> ClusterResult<()> {
        let op = &self.operation;
        if op.minimal_oks == 0 {
            return Err(ClusterError::InvalidConfig(
                "minimal_oks must be positive".into(),
            ));
        }
        if op.minimal_oks > op.optimal_oks || op.optimal_oks > op.maximal_oks {
            return Err(ClusterError::InvalidConfig(format!(
                "expected minimal_oks <= optimal_oks <= maximal_oks, got {} / {} / {}",
                op.minimal_oks, op.optimal_oks, op.maximal_oks
            )));
        }
        let call = &self.call;
        if call.minimum_timeout > call.get_call_timeout
            || call.minimum_timeout > call.delete_call_timeout
            || call.minimum_timeout > call.list_call_timeout
        {
            return Err(ClusterError::InvalidConfig(format!(
                "minimum_timeout ({:?}) exceeds a per-call timeout",
                call.minimum_timeout
            )));
        }
        Ok(())
    }
}
