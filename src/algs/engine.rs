//! Common interface of the two redistribution engines.

use crate::algs::all_to_all::redistribute_all_to_all;
use crate::algs::communicator::MeshTransport;
use crate::algs::fan_in_merge::redistribute_fan_in;
use crate::config::{RedistributeConfig, Strategy};
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshError;
use crate::partitioning::RegionPartition;

/// Moves every cell to the rank owning its region.
pub trait RedistributionEngine<C: MeshTransport> {
    fn name(&self) -> &'static str;

    /// Collective: every rank of `comm` must call this with the same partition.
    fn redistribute(
        &self,
        mesh: &UnstructuredMesh,
        partition: &RegionPartition,
        comm: &C,
        cfg: &RedistributeConfig,
    ) -> Result<UnstructuredMesh, MeshError>;
}

/// Pairwise byte exchange with every rank.
#[derive(Copy, Clone, Debug, Default)]
pub struct AllToAllEngine;

/// Per-owner XOR-tree reduction of whole meshes.
#[derive(Copy, Clone, Debug, Default)]
pub struct FanInEngine;

impl<C: MeshTransport> RedistributionEngine<C> for AllToAllEngine {
    fn name(&self) -> &'static str {
        "all-to-all"
    }

    fn redistribute(
        &self,
        mesh: &UnstructuredMesh,
        partition: &RegionPartition,
        comm: &C,
        cfg: &RedistributeConfig,
    ) -> Result<UnstructuredMesh, MeshError> {
        redistribute_all_to_all(mesh, partition, comm, cfg)
    }
}

impl<C: MeshTransport> RedistributionEngine<C> for FanInEngine {
    fn name(&self) -> &'static str {
        "fan-in"
    }

    fn redistribute(
        &self,
        mesh: &UnstructuredMesh,
        partition: &RegionPartition,
        comm: &C,
        cfg: &RedistributeConfig,
    ) -> Result<UnstructuredMesh, MeshError> {
        redistribute_fan_in(mesh, partition, comm, cfg)
    }
}

/// Engine for `strategy` on a transport with the given capability.
pub fn select_engine<'a, C: MeshTransport + 'a>(
    strategy: Strategy,
    native_collectives: bool,
) -> &'a dyn RedistributionEngine<C> {
    match strategy.resolve(native_collectives) {
        Strategy::FanIn => &FanInEngine,
        _ => &AllToAllEngine,
    }
}
