//! Spatial decomposition consumed by the redistribution engines.
//!
//! A [`PartitionOracle`] turns a distributed mesh into a [`RegionPartition`]:
//! disjoint axis-aligned regions, a region → rank assignment, and for each
//! region the local cells that fall in it. Building is collective; every
//! rank must call the oracle and every rank receives the same regions,
//! owners and process lists. Cell lists are local to the calling rank.

pub mod error;
pub mod kd_tree;

pub use self::error::PartitionError;
pub use self::kd_tree::KdTreeOracle;

use crate::algs::communicator::Communicator;
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshError;
use crate::topology::bounds::Bounds;
use serde::{Deserialize, Serialize};

/// Index of a region within its partition.
pub type RegionId = usize;

/// One axis-aligned region of the decomposition.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub bounds: Bounds,
}

/// Regions, their owners and the local cell membership of each region.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionPartition {
    regions: Vec<Region>,
    owners: Vec<usize>,
    assignment: Vec<Vec<RegionId>>,
    cell_lists: Vec<Vec<usize>>,
    boundary_cell_lists: Vec<Vec<usize>>,
    process_lists: Vec<Vec<usize>>,
    cell_lists_released: bool,
}

impl RegionPartition {
    /// Assemble a partition. `owners[r]` is the rank owning region `r`;
    /// the per-region lists are indexed by region and sorted on the way in.
    ///
    /// `boundary_cell_lists` may be empty when boundary inclusion is off.
    pub fn new(
        regions: Vec<Region>,
        owners: Vec<usize>,
        n_ranks: usize,
        mut cell_lists: Vec<Vec<usize>>,
        mut boundary_cell_lists: Vec<Vec<usize>>,
        mut process_lists: Vec<Vec<usize>>,
    ) -> Result<Self, PartitionError> {
        let n = regions.len();
        if n == 0 {
            return Err(PartitionError::NoRegions);
        }
        if owners.len() != n || cell_lists.len() != n || process_lists.len() != n {
            return Err(PartitionError::Other(format!(
                "{n} regions but {} owners, {} cell lists, {} process lists",
                owners.len(),
                cell_lists.len(),
                process_lists.len()
            )));
        }
        if boundary_cell_lists.is_empty() {
            boundary_cell_lists = vec![Vec::new(); n];
        } else if boundary_cell_lists.len() != n {
            return Err(PartitionError::Other(format!(
                "{n} regions but {} boundary cell lists",
                boundary_cell_lists.len()
            )));
        }
        if let Some(bad) = regions.iter().enumerate().find(|(i, r)| r.id != *i) {
            return Err(PartitionError::RegionOutOfRange(bad.1.id));
        }

        let mut assignment = vec![Vec::new(); n_ranks];
        for (region, &rank) in owners.iter().enumerate() {
            let slot = assignment
                .get_mut(rank)
                .ok_or(PartitionError::OwnerOutOfRange {
                    region,
                    rank,
                    size: n_ranks,
                })?;
            slot.push(region);
        }
        for l in cell_lists
            .iter_mut()
            .chain(boundary_cell_lists.iter_mut())
            .chain(process_lists.iter_mut())
        {
            l.sort_unstable();
            l.dedup();
        }

        Ok(Self {
            regions,
            owners,
            assignment,
            cell_lists,
            boundary_cell_lists,
            process_lists,
            cell_lists_released: false,
        })
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn num_ranks(&self) -> usize {
        self.assignment.len()
    }

    pub fn region(&self, r: RegionId) -> Option<&Region> {
        self.regions.get(r)
    }

    /// Regions owned by `rank`, ascending. Empty when `rank` owns none.
    pub fn region_assignment_list(&self, rank: usize) -> &[RegionId] {
        self.assignment.get(rank).map_or(&[], Vec::as_slice)
    }

    pub fn owner(&self, r: RegionId) -> Option<usize> {
        self.owners.get(r).copied()
    }

    /// Local cells whose primary location is region `r`.
    pub fn cell_list(&self, r: RegionId) -> &[usize] {
        self.cell_lists.get(r).map_or(&[], Vec::as_slice)
    }

    /// Local cells that overlap region `r` without belonging to it.
    pub fn boundary_cell_list(&self, r: RegionId) -> &[usize] {
        self.boundary_cell_lists.get(r).map_or(&[], Vec::as_slice)
    }

    /// Ranks holding any cell for region `r`, ascending.
    pub fn process_list(&self, r: RegionId) -> &[usize] {
        self.process_lists.get(r).map_or(&[], Vec::as_slice)
    }

    /// Union of the bounds of every region owned by `rank`.
    pub fn owned_bounds(&self, rank: usize) -> Bounds {
        self.region_assignment_list(rank)
            .iter()
            .fold(Bounds::EMPTY, |acc, &r| acc.union(&self.regions[r].bounds))
    }

    /// Drop the per-pass cell lists; regions, owners and process lists stay.
    pub fn release_cell_lists(&mut self) {
        for l in self
            .cell_lists
            .iter_mut()
            .chain(self.boundary_cell_lists.iter_mut())
        {
            *l = Vec::new();
        }
        self.cell_lists_released = true;
    }

    pub fn cell_lists_released(&self) -> bool {
        self.cell_lists_released
    }
}

/// Collective service computing a spatial decomposition of a distributed mesh.
pub trait PartitionOracle {
    /// Build regions for `mesh` (this rank's share). Must be called by every
    /// rank of `comm`; all ranks get the same regions, owners and process
    /// lists. With `include_boundary` the boundary cell lists are filled in
    /// and process lists account for boundary cells too.
    fn build_partition<C: Communicator>(
        &mut self,
        mesh: &UnstructuredMesh,
        comm: &C,
        include_boundary: bool,
    ) -> Result<RegionPartition, MeshError>;
}
