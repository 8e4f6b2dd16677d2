#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterError {
    /// Value outside of the accepted domain (ranges, segments, parsed references).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation is not valid in the current state.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Configuration values are inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type ClusterResult<T> = Result<T, ClusterError>;

/// Error surfaced by the convenience wrappers of the store client.
///
/// Low-level operations never fail with this error: they return an aggregated
/// result with per-node failures instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    /// No server node is known to cover the key.
    #[error("No server nodes available for {verb} of '{key}'")]
    NoServers { verb: &'static str, key: String },

    /// All candidate nodes were tried and none produced a usable answer.
    #[error(
        "Failed to {verb} resource '{key}': tried and failed to access {tried} server nodes; first failure due to: {cause}"
    )]
    Failed {
        verb: &'static str,
        key: String,
        tried: usize,
        cause: String,
    },
}
