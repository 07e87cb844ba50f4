//! Partitioning errors for mesh-redistribute

use thiserror::Error;

/// Errors from building or querying a spatial decomposition
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartitionError {
    /// The decomposition produced no regions at all
    #[error("spatial decomposition produced zero regions")]
    NoRegions,
    /// No rank holds any cell, so there is no domain to split
    #[error("global domain is empty: no rank holds any cells")]
    EmptyDomain,
    /// A region id outside `0..num_regions` was referenced
    #[error("region {0} is out of range")]
    RegionOutOfRange(usize),
    /// A region was assigned to a rank outside the communicator
    #[error("region {region} assigned to rank {rank}, but only {size} ranks exist")]
    OwnerOutOfRange {
        region: usize,
        rank: usize,
        size: usize,
    },
    /// Other inconsistencies in oracle output
    #[error("partition oracle error: {0}")]
    Other(String),
}
