#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-redistribute
//!
//! Moves the cells of an unstructured mesh, scattered arbitrarily across
//! cooperating ranks, to the rank that owns the spatial region each cell
//! falls in. Points shared by cells that cross rank boundaries are merged,
//! field arrays keep their identity and order, and boundary cells can
//! optionally be kept on every rank whose regions they touch.
//!
//! ## Pieces
//! - [`partitioning`]: the [`PartitionOracle`](partitioning::PartitionOracle)
//!   seam and a median-split k-d tree oracle.
//! - [`algs`]: transports, wire records, the cell extractor, the merge
//!   accumulator, the all-to-all and fan-in engines, box clipping and the
//!   [`DistributedDataFilter`](algs::filter::DistributedDataFilter) that
//!   ties them together.
//! - [`data`]: the mesh container and its field arrays.
//!
//! ## Transports
//! Engines talk through the [`Communicator`](algs::communicator::Communicator)
//! trait: `NoComm` for serial runs, `RayonComm` for in-process ranks on
//! threads (tests, benches), and `MpiComm` behind the `mpi-support` feature.
//! Any byte-only transport can be wrapped in
//! [`Serialized`](algs::communicator::Serialized) to move whole meshes.
//!
//! ## Determinism
//!
//! The decomposition is derived from gathered data with total orderings only,
//! so every rank computes the same regions. Local data is always merged
//! first, which pins the order of field arrays in the output.

pub mod algs;
pub mod config;
pub mod data;
pub mod mesh_error;
pub mod partitioning;
pub mod topology;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::clip::{BoxClipper, PlanarBoxClipper};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{
        CommTag, Communicator, MeshTransport, NoComm, RayonComm, Serialized, Wait,
    };
    pub use crate::algs::engine::{AllToAllEngine, FanInEngine, RedistributionEngine};
    pub use crate::algs::filter::DistributedDataFilter;
    pub use crate::algs::merge::MergeAccumulator;
    pub use crate::config::{RedistributeConfig, Strategy};
    pub use crate::data::field::{FieldArray, FieldData, FieldValues, UNASSIGNED_ID};
    pub use crate::data::mesh::UnstructuredMesh;
    pub use crate::mesh_error::MeshError;
    pub use crate::partitioning::{
        KdTreeOracle, PartitionError, PartitionOracle, Region, RegionPartition,
    };
    pub use crate::topology::bounds::Bounds;
    pub use crate::topology::cell_type::CellType;
}
