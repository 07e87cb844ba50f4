//! Incremental merge of sub-meshes into one output mesh.
//!
//! The accumulator is sized up front from declared totals, fed sub-meshes
//! one at a time (each consumed by the merge), and closed with
//! [`MergeAccumulator::finish`], which hands the finished mesh to the caller.
//!
//! Points shared between sub-meshes collapse to one output point. When a
//! global-id array is configured and present on a sub-mesh, its value is the
//! point key; otherwise the exact coordinates are. Points whose id is the
//! unassigned marker fall back to coordinates.
//!
//! The field schema is anchored by the first sub-mesh that carries points or
//! arrays. Engines merge locally extracted data first so that the output
//! order of arrays does not depend on message arrival order.

use crate::data::field::{FieldData, UNASSIGNED_ID};
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellType;
use hashbrown::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum PointKey {
    Id(u64),
    Coords([u64; 3]),
}

fn coord_key(p: [f64; 3]) -> PointKey {
    // -0.0 and 0.0 are the same location
    PointKey::Coords(p.map(|x| if x == 0.0 { 0.0f64 } else { x }.to_bits()))
}

/// Stateful merge target. After an error the accumulator must be discarded.
#[derive(Debug)]
pub struct MergeAccumulator {
    total_points: usize,
    total_cells: usize,
    dataset_bound: usize,
    datasets: usize,
    global_id: Option<String>,
    points: Vec<[f64; 3]>,
    cell_types: Vec<CellType>,
    offsets: Vec<usize>,
    connectivity: Vec<usize>,
    point_data: FieldData,
    cell_data: FieldData,
    anchored: bool,
    seen: HashMap<PointKey, usize>,
}

impl MergeAccumulator {
    /// `total_points` and `total_cells` are hard caps; `total_datasets` is
    /// only an upper bound used for sizing.
    pub fn new(
        total_points: usize,
        total_cells: usize,
        total_datasets: usize,
        global_id: Option<&str>,
    ) -> Self {
        let mut offsets = Vec::with_capacity(total_cells + 1);
        offsets.push(0);
        Self {
            total_points,
            total_cells,
            dataset_bound: total_datasets,
            datasets: 0,
            global_id: global_id.map(str::to_owned),
            points: Vec::with_capacity(total_points),
            cell_types: Vec::with_capacity(total_cells),
            offsets,
            connectivity: Vec::new(),
            point_data: FieldData::new(),
            cell_data: FieldData::new(),
            anchored: false,
            seen: HashMap::with_capacity(total_points),
        }
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cell_types.len()
    }

    /// Number of sub-meshes merged so far.
    pub fn datasets_merged(&self) -> usize {
        self.datasets
    }

    /// Per-point keys of `mesh`, by global id when possible.
    fn keys(&self, mesh: &UnstructuredMesh) -> Result<Vec<PointKey>, MeshError> {
        let ids = self
            .global_id
            .as_deref()
            .and_then(|name| mesh.point_data().get(name));
        match ids {
            Some(arr) => {
                if arr.components() != 1 || !arr.scalar_type().is_integral() {
                    return Err(MeshError::InvalidGlobalIds(format!(
                        "`{}` must be a single-component integer array, got {} x {}",
                        arr.name(),
                        arr.components(),
                        arr.scalar_type().as_str()
                    )));
                }
                (0..mesh.num_points())
                    .map(|p| match arr.global_id(p) {
                        Some(UNASSIGNED_ID) => Ok(coord_key(mesh.point(p))),
                        Some(id) => Ok(PointKey::Id(id)),
                        None => Err(MeshError::InvalidGlobalIds(format!(
                            "`{}` has no value for point {p}",
                            arr.name()
                        ))),
                    })
                    .collect()
            }
            None => Ok(mesh.points().iter().copied().map(coord_key).collect()),
        }
    }

    /// Append `mesh`, consuming it.
    pub fn merge_dataset(&mut self, mesh: UnstructuredMesh) -> Result<(), MeshError> {
        let carries_schema = !mesh.point_data().is_empty() || !mesh.cell_data().is_empty();
        if mesh.num_points() == 0 && mesh.num_cells() == 0 && !carries_schema {
            return Ok(());
        }

        let cells_after = self.num_cells() + mesh.num_cells();
        if cells_after > self.total_cells {
            return Err(MeshError::CapacityExceeded {
                what: "cell",
                declared: self.total_cells,
                actual: cells_after,
            });
        }

        if !self.anchored {
            self.point_data = mesh.point_data().empty_like();
            self.cell_data = mesh.cell_data().empty_like();
            self.point_data.reserve(self.total_points);
            self.cell_data.reserve(self.total_cells);
            self.anchored = true;
        }
        let pmap = self.point_data.match_schema(mesh.point_data())?;
        let cmap = self.cell_data.match_schema(mesh.cell_data())?;

        let keys = self.keys(&mesh)?;
        let mut remap = Vec::with_capacity(keys.len());
        let mut fresh = Vec::new();
        for (src, key) in keys.into_iter().enumerate() {
            let next = self.points.len() + fresh.len();
            let idx = *self.seen.entry(key).or_insert(next);
            if idx == next {
                fresh.push(src);
            }
            remap.push(idx);
        }
        let points_after = self.points.len() + fresh.len();
        if points_after > self.total_points {
            return Err(MeshError::CapacityExceeded {
                what: "point",
                declared: self.total_points,
                actual: points_after,
            });
        }

        for &src in &fresh {
            self.points.push(mesh.point(src));
            self.point_data
                .push_tuple_mapped(mesh.point_data(), &pmap, src)?;
        }
        for (ty, pts) in mesh.cells() {
            self.cell_types.push(ty);
            self.connectivity.extend(pts.iter().map(|&p| remap[p]));
            self.offsets.push(self.connectivity.len());
        }
        self.cell_data.extend_mapped(mesh.cell_data(), &cmap)?;

        self.datasets += 1;
        if self.datasets > self.dataset_bound {
            log::debug!(
                "merged {} datasets, more than the {} declared",
                self.datasets,
                self.dataset_bound
            );
        }
        log::trace!(
            "merged dataset: +{} points ({} shared), +{} cells",
            fresh.len(),
            remap.len() - fresh.len(),
            mesh.num_cells()
        );
        Ok(())
    }

    /// Trim storage and hand the merged mesh to the caller.
    ///
    /// Fails if fewer cells arrived than were declared.
    pub fn finish(self) -> Result<UnstructuredMesh, MeshError> {
        self.into_mesh(true)
    }

    /// Hand over the merged mesh without trimming, for a partial result that
    /// is forwarded and merged again elsewhere. Same count check as
    /// [`finish`](Self::finish).
    pub fn into_partial(self) -> Result<UnstructuredMesh, MeshError> {
        self.into_mesh(false)
    }

    fn into_mesh(self, trim: bool) -> Result<UnstructuredMesh, MeshError> {
        if self.num_cells() != self.total_cells {
            return Err(MeshError::Protocol(format!(
                "declared {} cells, merged {}",
                self.total_cells,
                self.num_cells()
            )));
        }
        let Self {
            mut points,
            mut cell_types,
            mut offsets,
            mut connectivity,
            mut point_data,
            mut cell_data,
            ..
        } = self;
        if trim {
            points.shrink_to_fit();
            cell_types.shrink_to_fit();
            offsets.shrink_to_fit();
            connectivity.shrink_to_fit();
            point_data.shrink_to_fit();
            cell_data.shrink_to_fit();
        }
        UnstructuredMesh::from_parts(
            points,
            cell_types,
            offsets,
            connectivity,
            point_data,
            cell_data,
        )
    }
}
