//! Median-split k-d tree oracle.
//!
//! Every rank contributes one [`WireCellRecord`] per local cell (centroid and
//! bounding box). After an all-gather each rank holds the same record set
//! and builds the same tree, so regions, owners and process lists agree
//! everywhere without a coordinator.

use crate::algs::collective::all_gather_bytes;
use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::wire::{WireCellRecord, cast_slice, decode_records};
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshError;
use crate::partitioning::error::PartitionError;
use crate::partitioning::{PartitionOracle, Region, RegionId, RegionPartition};
use crate::topology::bounds::Bounds;
use serde::{Deserialize, Serialize};

/// Builds a balanced k-d decomposition over the global cell centroids.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KdTreeOracle {
    /// Leaf count; `None` means one region per rank.
    pub number_of_regions: Option<usize>,
    /// Base tag for the record gather (uses `tag` and `tag + 1`).
    pub tag: CommTag,
}

impl KdTreeOracle {
    pub fn new(number_of_regions: Option<usize>, tag: CommTag) -> Self {
        Self {
            number_of_regions,
            tag,
        }
    }
}

#[derive(Clone, Debug)]
enum KdNode {
    Leaf(RegionId),
    Split {
        axis: usize,
        value: f64,
        left: Box<KdNode>,
        right: Box<KdNode>,
    },
}

impl KdNode {
    fn locate(&self, p: [f64; 3]) -> RegionId {
        let mut node = self;
        loop {
            match node {
                KdNode::Leaf(r) => return *r,
                KdNode::Split {
                    axis,
                    value,
                    left,
                    right,
                } => node = if p[*axis] < *value { left } else { right },
            }
        }
    }
}

/// Recursively split `bounds` into `k` leaves, pushing leaf boxes in
/// depth-first, left-first order.
fn build(
    centroids: &[[f64; 3]],
    ids: &mut [usize],
    bounds: Bounds,
    k: usize,
    leaves: &mut Vec<Bounds>,
) -> KdNode {
    if k <= 1 {
        leaves.push(bounds);
        return KdNode::Leaf(leaves.len() - 1);
    }
    let axis = bounds.longest_axis();
    let k_left = k / 2;
    ids.sort_unstable_by(|&a, &b| {
        centroids[a][axis]
            .total_cmp(&centroids[b][axis])
            .then(a.cmp(&b))
    });
    let n_left = ids.len() * k_left / k;
    let lo = bounds.min[axis];
    let hi = bounds.max[axis];
    let raw = match (n_left, ids.len()) {
        (_, 0) => 0.5 * (lo + hi),
        (0, _) => 0.5 * (lo + centroids[ids[0]][axis]),
        (n, _) => 0.5 * (centroids[ids[n - 1]][axis] + centroids[ids[n]][axis]),
    };
    let value = raw.clamp(lo, hi);

    let cut = ids.partition_point(|&i| centroids[i][axis] < value);
    let (left_ids, right_ids) = ids.split_at_mut(cut);
    let mut left_box = bounds;
    left_box.max[axis] = value;
    let mut right_box = bounds;
    right_box.min[axis] = value;

    let left = build(centroids, left_ids, left_box, k_left, leaves);
    let right = build(centroids, right_ids, right_box, k - k_left, leaves);
    KdNode::Split {
        axis,
        value,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Region → rank map: contiguous blocks when regions outnumber ranks,
/// one region per low rank otherwise.
pub fn contiguous_owners(n_regions: usize, n_ranks: usize) -> Vec<usize> {
    if n_regions >= n_ranks {
        let mut owners = vec![0; n_regions];
        for p in 0..n_ranks {
            for o in &mut owners[p * n_regions / n_ranks..(p + 1) * n_regions / n_ranks] {
                *o = p;
            }
        }
        owners
    } else {
        (0..n_regions).collect()
    }
}

fn regions_overlapped<'a>(
    cell: &'a Bounds,
    primary: RegionId,
    leaves: &'a [Bounds],
) -> impl Iterator<Item = RegionId> + 'a {
    leaves
        .iter()
        .enumerate()
        .filter(move |(r, b)| *r != primary && cell.overlaps(b))
        .map(|(r, _)| r)
}

// ranks are visited in ascending order, so checking the tail is enough
fn push_rank(list: &mut Vec<usize>, rank: usize) {
    if list.last() != Some(&rank) {
        list.push(rank);
    }
}

impl PartitionOracle for KdTreeOracle {
    fn build_partition<C: Communicator>(
        &mut self,
        mesh: &UnstructuredMesh,
        comm: &C,
        include_boundary: bool,
    ) -> Result<RegionPartition, MeshError> {
        let n_ranks = comm.size();
        let k = self.number_of_regions.unwrap_or(n_ranks);

        let local: Vec<WireCellRecord> = (0..mesh.num_cells())
            .map(|c| {
                let b = mesh.cell_bounds(c);
                WireCellRecord::new(mesh.cell_centroid(c), b.min, b.max)
            })
            .collect();
        // every rank takes part in the gather, even with nothing to say
        let gathered = all_gather_bytes(comm, self.tag, cast_slice(&local))?;
        let per_rank = gathered
            .iter()
            .map(|buf| decode_records::<WireCellRecord>(buf))
            .collect::<Result<Vec<_>, _>>()
            .map_err(MeshError::Protocol)?;

        if k == 0 {
            return Err(PartitionError::NoRegions.into());
        }

        let mut centroids = Vec::new();
        let mut domain = Bounds::EMPTY;
        for rec in per_rank.iter().flatten() {
            centroids.push(rec.centroid());
            domain = domain.union(&Bounds::new(rec.min(), rec.max()));
        }
        if centroids.is_empty() || domain.is_empty() {
            return Err(PartitionError::EmptyDomain.into());
        }

        let mut ids: Vec<usize> = (0..centroids.len()).collect();
        let mut leaves = Vec::with_capacity(k);
        let tree = build(&centroids, &mut ids, domain, k, &mut leaves);
        log::debug!(
            "k-d tree over {} cells from {} ranks: {} regions, domain {:?}",
            centroids.len(),
            n_ranks,
            leaves.len(),
            domain.to_xyz()
        );

        let mut process_lists = vec![Vec::new(); k];
        for (rank, records) in per_rank.iter().enumerate() {
            for rec in records {
                let primary = tree.locate(rec.centroid());
                push_rank(&mut process_lists[primary], rank);
                if include_boundary {
                    let cb = Bounds::new(rec.min(), rec.max());
                    for r in regions_overlapped(&cb, primary, &leaves) {
                        push_rank(&mut process_lists[r], rank);
                    }
                }
            }
        }

        let mut cell_lists = vec![Vec::new(); k];
        let mut boundary_lists = if include_boundary {
            vec![Vec::new(); k]
        } else {
            Vec::new()
        };
        for c in 0..mesh.num_cells() {
            let primary = tree.locate(mesh.cell_centroid(c));
            cell_lists[primary].push(c);
            if include_boundary {
                let cb = mesh.cell_bounds(c);
                for r in regions_overlapped(&cb, primary, &leaves) {
                    boundary_lists[r].push(c);
                }
            }
        }

        let regions = leaves
            .into_iter()
            .enumerate()
            .map(|(id, bounds)| Region { id, bounds })
            .collect();
        let partition = RegionPartition::new(
            regions,
            contiguous_owners(k, n_ranks),
            n_ranks,
            cell_lists,
            boundary_lists,
            process_lists,
        )?;
        Ok(partition)
    }
}
