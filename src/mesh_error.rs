//! MeshError: Unified error type for mesh-redistribute public APIs
//!
//! Every fallible operation in the crate returns this type. Transport,
//! protocol and schema failures are never recovered locally; they surface
//! to the caller of [`DistributedDataFilter::execute`](crate::algs::filter::DistributedDataFilter::execute).

use crate::partitioning::error::PartitionError;
use thiserror::Error;

/// Unified error type for redistribution operations.
#[derive(Debug, Error)]
pub enum MeshError {
    /// A point-to-point exchange with `neighbor` failed or delivered garbage.
    #[error("communication with rank {neighbor} failed: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Declared and actual payloads disagree, or a wire header is malformed.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// A merged dataset does not carry the same field arrays as the first one.
    #[error("field schema mismatch on array `{name}`: {reason}")]
    SchemaMismatch { name: String, reason: String },
    /// More points/cells were merged than the accumulator was sized for.
    #[error("{what} capacity exceeded: declared {declared}, got {actual}")]
    CapacityExceeded {
        what: &'static str,
        declared: usize,
        actual: usize,
    },
    /// The shared receive buffer could not be allocated.
    #[error("failed to allocate {bytes} bytes for the receive buffer")]
    Allocation { bytes: usize },
    /// The spatial decomposition could not be built.
    #[error(transparent)]
    Partition(#[from] PartitionError),
    /// Encoding or decoding a mesh failed.
    #[error("mesh serialization failed: {0}")]
    Serialization(String),
    /// The configured global-id array cannot be used as a point key.
    #[error("invalid global id array: {0}")]
    InvalidGlobalIds(String),
    /// An optional step was requested with an unusable configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Mesh storage is internally inconsistent.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
}

impl MeshError {
    pub(crate) fn comm(neighbor: usize, msg: impl Into<String>) -> Self {
        MeshError::CommError {
            neighbor,
            source: msg.into().into(),
        }
    }
}

impl From<bincode::Error> for MeshError {
    fn from(e: bincode::Error) -> Self {
        MeshError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for MeshError {
    fn from(e: serde_json::Error) -> Self {
        MeshError::Serialization(e.to_string())
    }
}
