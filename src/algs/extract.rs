//! Cell extraction for one destination rank.

use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshError;
use crate::partitioning::RegionPartition;
use itertools::Itertools;

/// Local cells destined for `rank`: the sorted, deduplicated union of the
/// cell lists (and boundary lists, if `include_boundary`) of every region
/// `rank` owns.
pub fn cells_for_process(
    partition: &RegionPartition,
    rank: usize,
    include_boundary: bool,
) -> Vec<usize> {
    let regions = partition.region_assignment_list(rank);
    let primary = regions.iter().map(|&r| partition.cell_list(r).iter().copied());
    let boundary = regions
        .iter()
        .filter(|_| include_boundary)
        .map(|&r| partition.boundary_cell_list(r).iter().copied());
    primary.chain(boundary).kmerge().dedup().collect()
}

/// Sub-mesh of `mesh` holding exactly the cells `rank` should receive.
///
/// Returns `None` when `rank` owns no regions. A rank that owns regions but
/// matches no local cells gets a zero-cell mesh carrying the field schema.
/// `mesh` itself is never modified.
pub fn extract_for_process(
    mesh: &UnstructuredMesh,
    partition: &RegionPartition,
    rank: usize,
    include_boundary: bool,
) -> Result<Option<UnstructuredMesh>, MeshError> {
    if partition.region_assignment_list(rank).is_empty() {
        return Ok(None);
    }
    let cells = cells_for_process(partition, rank, include_boundary);
    let sub = mesh.extract_cells(&cells)?;
    log::trace!(
        "extracted {} cells / {} points for rank {rank}",
        sub.num_cells(),
        sub.num_points()
    );
    Ok(Some(sub))
}
