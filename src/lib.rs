//! Routing and replica coordination for a clustered content store.
//!
//! Keys are hashed into a circular [`KeySpace`]; every server node covers one
//! or more contiguous [`KeyRange`]s of it. Clients keep a [`RoutingTable`]
//! that maps a key to an ordered list of candidate nodes, and run each
//! operation over those nodes with an [`OperationCoordinator`], which takes
//! care of retries, back-off, the time budget and the per-operation success
//! criteria. Servers keep a [`MembershipView`] of their peers, merged from
//! the cluster status reports they exchange.

mod builder;
pub mod call;
pub mod client;
pub mod config;
mod error;
pub mod hash;
pub mod keyspace;
pub mod lister;
pub mod membership;
pub mod node;
pub mod operation;
pub mod routing;

pub use {
    builder::StoreClientConfigBuilder,
    call::{CallContext, CallFailure, CallResult, FailureCause, NodeFailure},
    client::{ByteRange, EntryAccessor, EntryInfo, ListItem, ListItemType, ListPage, StoreClient},
    config::{CallConfig, OperationConfig, StoreClientConfig},
    error::{ClusterError, ClusterResult, OperationError},
    hash::{DefaultBuildHasher, DefaultHasher, EntryKeyConverter, KeyHash, RawKey, Utf8KeyConverter},
    keyspace::{KeyRange, KeySpace},
    lister::{DEFAULT_MAX_ENTRIES, StoreEntryLister},
    membership::{MembershipView, Peer, PeerStatus, PeerSyncer, SystemTimeMaster, TimeMaster},
    node::{ClusterStatusMessage, Node, NodeAddress, NodeRanges, NodeState, ServerNode},
    operation::{
        DeleteOutcome, DeletePolicy, DeleteResult, Found, OperationCoordinator, OperationLimits,
        OperationResult, Outcome, Phase, Policy, ReadPolicy, ReadResult,
    },
    routing::{NodesForKey, RoutingTable},
};
