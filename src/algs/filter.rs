//! `DistributedDataFilter`: decompose, redistribute, optionally clip.
//!
//! ```no_run
//! use mesh_redistribute::prelude::*;
//!
//! let world = RayonComm::world(2);
//! std::thread::scope(|s| {
//!     for comm in &world {
//!         s.spawn(move || {
//!             let local = UnstructuredMesh::new(); // this rank's share
//!             let mut filter = DistributedDataFilter::new(RedistributeConfig::default());
//!             filter.execute(&local, comm)
//!         });
//!     }
//! });
//! ```

use crate::algs::clip::{BoxClipper, PlanarBoxClipper};
use crate::algs::collective::all_gather_bytes;
use crate::algs::communicator::MeshTransport;
use crate::algs::engine::select_engine;
use crate::config::RedistributeConfig;
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshError;
use crate::partitioning::{KdTreeOracle, PartitionOracle, RegionPartition};
use crate::topology::bounds::Bounds;

/// What a retained partition was built for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct RetainedKey {
    fingerprint: u64,
    include_boundary: bool,
    ranks: usize,
}

/// Orchestrates one redistribution per call to [`execute`](Self::execute).
///
/// All state carried between calls (the retained partition, the last clip
/// error) lives in the filter instance.
#[derive(Debug)]
pub struct DistributedDataFilter<O = KdTreeOracle, K = PlanarBoxClipper> {
    config: RedistributeConfig,
    oracle: O,
    clipper: K,
    partition: Option<RegionPartition>,
    retained: Option<RetainedKey>,
    last_clip_error: Option<MeshError>,
}

impl DistributedDataFilter {
    /// Filter with the k-d oracle and planar clipper, configured from `config`.
    pub fn new(config: RedistributeConfig) -> Self {
        let oracle = KdTreeOracle::new(config.number_of_regions, config.oracle_tag());
        let clipper = PlanarBoxClipper::new(config.global_id());
        Self::with_parts(config, oracle, clipper)
    }
}

impl<O: PartitionOracle, K: BoxClipper> DistributedDataFilter<O, K> {
    pub fn with_parts(config: RedistributeConfig, oracle: O, clipper: K) -> Self {
        Self {
            config,
            oracle,
            clipper,
            partition: None,
            retained: None,
            last_clip_error: None,
        }
    }

    pub fn config(&self) -> &RedistributeConfig {
        &self.config
    }

    /// Partition used by the last call. Its cell lists are released unless
    /// partition state is retained.
    pub fn partition(&self) -> Option<&RegionPartition> {
        self.partition.as_ref()
    }

    /// Why the last clip request was not honored, if it was not.
    pub fn last_clip_error(&self) -> Option<&MeshError> {
        self.last_clip_error.as_ref()
    }

    /// Whether every rank can reuse its retained partition. Collective when
    /// retention is on.
    fn agree_on_reuse<C: MeshTransport>(
        &self,
        key: RetainedKey,
        comm: &C,
    ) -> Result<bool, MeshError> {
        if !self.config.retain_partition_state {
            return Ok(false);
        }
        let mine = self.retained == Some(key)
            && self
                .partition
                .as_ref()
                .is_some_and(|p| !p.cell_lists_released());
        let votes = all_gather_bytes(comm, self.config.reuse_tag(), &[u8::from(mine)])?;
        Ok(votes.iter().all(|v| *v == [1u8]))
    }

    /// Redistribute this rank's share of the dataset. Collective over `comm`.
    ///
    /// An inconsistent `mesh` is rejected with `InvalidMesh` before any
    /// message is exchanged.
    pub fn execute<C: MeshTransport>(
        &mut self,
        mesh: &UnstructuredMesh,
        comm: &C,
    ) -> Result<UnstructuredMesh, MeshError> {
        self.config.validate()?;
        mesh.validate()?;
        self.last_clip_error = None;
        let include_boundary = self.config.include_all_intersecting_cells;
        let key = RetainedKey {
            fingerprint: mesh.fingerprint(),
            include_boundary,
            ranks: comm.size(),
        };

        let reuse = self.agree_on_reuse(key, comm)?;
        let partition = match self.partition.take() {
            Some(p) if reuse => {
                log::debug!("reusing retained partition of {} regions", p.num_regions());
                p
            }
            _ => {
                self.retained = None;
                self.oracle.build_partition(mesh, comm, include_boundary)?
            }
        };

        let engine = select_engine::<C>(self.config.strategy, comm.native_collectives());
        let mut result = engine.redistribute(mesh, &partition, comm, &self.config);
        log::info!(
            "rank {}: {} engine moved {} local cells into {} cells",
            comm.rank(),
            engine.name(),
            mesh.num_cells(),
            result.as_ref().map_or(0, UnstructuredMesh::num_cells)
        );

        let mut partition = partition;
        if self.config.retain_partition_state {
            self.retained = Some(key);
        } else {
            partition.release_cell_lists();
        }
        self.partition = Some(partition);

        if self.config.clip_cells_to_region {
            if let Ok(out) = result.as_mut() {
                self.clip_in_place(out, comm.rank());
            }
        }
        result
    }

    /// Clip `out` to this rank's regions; failures leave `out` untouched
    /// and are recorded instead of returned.
    fn clip_in_place(&mut self, out: &mut UnstructuredMesh, rank: usize) {
        let Some(partition) = self.partition.as_ref() else {
            return;
        };
        let clipped = owned_box(partition, rank)
            .and_then(|b| b.map_or(Ok(None), |b| self.clipper.clip(out, &b).map(Some)));
        match clipped {
            Ok(Some(m)) => *out = m,
            Ok(None) => log::warn!("rank {rank}: owns no regions, nothing to clip to"),
            Err(e) => {
                log::error!("rank {rank}: clipping skipped: {e}");
                self.last_clip_error = Some(e);
            }
        }
    }
}

/// The single box formed by `rank`'s regions, `None` if it owns none.
///
/// Regions are disjoint, so they tile their bounding box exactly when their
/// measures add up to its measure.
pub fn owned_box(partition: &RegionPartition, rank: usize) -> Result<Option<Bounds>, MeshError> {
    let owned = partition.region_assignment_list(rank);
    if owned.is_empty() {
        return Ok(None);
    }
    let union = partition.owned_bounds(rank);
    let axes = union.spanned_axes();
    let total = union.measure(&axes);
    let sum: f64 = owned
        .iter()
        .filter_map(|&r| partition.region(r))
        .map(|r| r.bounds.measure(&axes))
        .sum();
    if (sum - total).abs() > 1e-9 * total.max(f64::MIN_POSITIVE) {
        return Err(MeshError::Config(format!(
            "regions {owned:?} of rank {rank} do not form a single box \
             (volume {sum} vs bounding volume {total})"
        )));
    }
    Ok(Some(union))
}
