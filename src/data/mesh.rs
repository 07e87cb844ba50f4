//! Unstructured mesh container: points, cells and their field data.
//!
//! Cells are stored in compressed-row form (`offsets` + `connectivity`),
//! each with a [`CellType`]. Point and cell field arrays live in two
//! [`FieldData`] collections whose tuple counts always match the number of
//! points and cells respectively.

use crate::data::field::FieldData;
use crate::mesh_error::MeshError;
use crate::topology::bounds::Bounds;
use crate::topology::cell_type::CellType;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A self-contained unstructured mesh (or fragment of one).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnstructuredMesh {
    points: Vec<[f64; 3]>,
    cell_types: Vec<CellType>,
    offsets: Vec<usize>,
    connectivity: Vec<usize>,
    point_data: FieldData,
    cell_data: FieldData,
}

impl Default for UnstructuredMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl UnstructuredMesh {
    /// Empty mesh with no arrays.
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            cell_types: Vec::new(),
            offsets: vec![0],
            connectivity: Vec::new(),
            point_data: FieldData::new(),
            cell_data: FieldData::new(),
        }
    }

    pub fn with_capacity(points: usize, cells: usize, connectivity: usize) -> Self {
        let mut offsets = Vec::with_capacity(cells + 1);
        offsets.push(0);
        Self {
            points: Vec::with_capacity(points),
            cell_types: Vec::with_capacity(cells),
            offsets,
            connectivity: Vec::with_capacity(connectivity),
            point_data: FieldData::new(),
            cell_data: FieldData::new(),
        }
    }

    /// Assemble a mesh from raw parts, validating every invariant.
    pub fn from_parts(
        points: Vec<[f64; 3]>,
        cell_types: Vec<CellType>,
        offsets: Vec<usize>,
        connectivity: Vec<usize>,
        point_data: FieldData,
        cell_data: FieldData,
    ) -> Result<Self, MeshError> {
        let mesh = Self {
            points,
            cell_types,
            offsets,
            connectivity,
            point_data,
            cell_data,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Check CSR layout, point references and field tuple counts.
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.offsets.len() != self.cell_types.len() + 1 || self.offsets[0] != 0 {
            return Err(MeshError::InvalidMesh(format!(
                "{} offsets for {} cells",
                self.offsets.len(),
                self.cell_types.len()
            )));
        }
        if self.offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(MeshError::InvalidMesh("cell offsets are not monotone".into()));
        }
        if self.offsets.last().copied() != Some(self.connectivity.len()) {
            return Err(MeshError::InvalidMesh(
                "last offset does not match connectivity length".into(),
            ));
        }
        let n = self.points.len();
        if let Some(&bad) = self.connectivity.iter().find(|&&p| p >= n) {
            return Err(MeshError::InvalidMesh(format!(
                "cell references point {bad}, mesh has {n} points"
            )));
        }
        self.point_data.validate(n, "point")?;
        self.cell_data.validate(self.cell_types.len(), "cell")
    }

    /// Append a point and return its index.
    ///
    /// Point arrays are not extended; add them once geometry is complete.
    pub fn add_point(&mut self, p: [f64; 3]) -> usize {
        self.points.push(p);
        self.points.len() - 1
    }

    /// Append a cell over existing points and return its index.
    pub fn add_cell(&mut self, ty: CellType, points: &[usize]) -> Result<usize, MeshError> {
        if let Some(&bad) = points.iter().find(|&&p| p >= self.points.len()) {
            return Err(MeshError::InvalidMesh(format!(
                "cell references point {bad}, mesh has {} points",
                self.points.len()
            )));
        }
        if let Some(expected) = ty.num_points() {
            if expected != points.len() {
                return Err(MeshError::InvalidMesh(format!(
                    "{ty:?} needs {expected} points, got {}",
                    points.len()
                )));
            }
        }
        self.cell_types.push(ty);
        self.connectivity.extend_from_slice(points);
        self.offsets.push(self.connectivity.len());
        Ok(self.cell_types.len() - 1)
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cell_types.len()
    }

    #[inline]
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    #[inline]
    pub fn point(&self, i: usize) -> [f64; 3] {
        self.points[i]
    }

    #[inline]
    pub fn cell_types(&self) -> &[CellType] {
        &self.cell_types
    }

    #[inline]
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    #[inline]
    pub fn connectivity(&self) -> &[usize] {
        &self.connectivity
    }

    /// Point indices of cell `c`.
    #[inline]
    pub fn cell_points(&self, c: usize) -> &[usize] {
        &self.connectivity[self.offsets[c]..self.offsets[c + 1]]
    }

    /// `(type, point indices)` of cell `c`.
    #[inline]
    pub fn cell(&self, c: usize) -> (CellType, &[usize]) {
        (self.cell_types[c], self.cell_points(c))
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellType, &[usize])> + '_ {
        (0..self.num_cells()).map(move |c| self.cell(c))
    }

    #[inline]
    pub fn point_data(&self) -> &FieldData {
        &self.point_data
    }

    #[inline]
    pub fn point_data_mut(&mut self) -> &mut FieldData {
        &mut self.point_data
    }

    #[inline]
    pub fn cell_data(&self) -> &FieldData {
        &self.cell_data
    }

    #[inline]
    pub fn cell_data_mut(&mut self) -> &mut FieldData {
        &mut self.cell_data
    }

    /// Bounding box of all points.
    pub fn bounds(&self) -> Bounds {
        Bounds::from_points(&self.points)
    }

    /// Bounding box of the points of cell `c`.
    pub fn cell_bounds(&self, c: usize) -> Bounds {
        Bounds::from_points(self.cell_points(c).iter().map(|&p| &self.points[p]))
    }

    /// Arithmetic mean of the points of cell `c`.
    pub fn cell_centroid(&self, c: usize) -> [f64; 3] {
        let pts = self.cell_points(c);
        let mut acc = [0.0; 3];
        for &p in pts {
            for a in 0..3 {
                acc[a] += self.points[p][a];
            }
        }
        let n = pts.len().max(1) as f64;
        [acc[0] / n, acc[1] / n, acc[2] / n]
    }

    /// Zero points and cells, same field arrays.
    pub fn empty_like(&self) -> Self {
        Self {
            point_data: self.point_data.empty_like(),
            cell_data: self.cell_data.empty_like(),
            ..Self::new()
        }
    }

    /// Sub-mesh made of `cells` (ascending, unique), their incident points
    /// and all field arrays restricted to that subset.
    ///
    /// Points keep their relative order from `self`.
    pub fn extract_cells(&self, cells: &[usize]) -> Result<Self, MeshError> {
        if let Some(&bad) = cells.iter().find(|&&c| c >= self.num_cells()) {
            return Err(MeshError::InvalidMesh(format!(
                "cell {bad} out of range, mesh has {} cells",
                self.num_cells()
            )));
        }
        self.point_data.validate(self.points.len(), "point")?;
        self.cell_data.validate(self.num_cells(), "cell")?;
        let mut used = vec![false; self.points.len()];
        let mut conn_len = 0;
        for &c in cells {
            let pts = self.cell_points(c);
            conn_len += pts.len();
            for &p in pts {
                let Some(slot) = used.get_mut(p) else {
                    return Err(MeshError::InvalidMesh(format!(
                        "cell {c} references point {p}, mesh has {} points",
                        self.points.len()
                    )));
                };
                *slot = true;
            }
        }
        let mut remap = vec![usize::MAX; self.points.len()];
        let mut kept_points = Vec::new();
        for (p, _) in used.iter().enumerate().filter(|(_, u)| **u) {
            remap[p] = kept_points.len();
            kept_points.push(p);
        }

        let mut out = Self::with_capacity(kept_points.len(), cells.len(), conn_len);
        out.points.extend(kept_points.iter().map(|&p| self.points[p]));
        for &c in cells {
            out.cell_types.push(self.cell_types[c]);
            out.connectivity
                .extend(self.cell_points(c).iter().map(|&p| remap[p]));
            out.offsets.push(out.connectivity.len());
        }
        out.point_data = self.point_data.gather(&kept_points);
        out.cell_data = self.cell_data.gather(cells);
        Ok(out)
    }

    /// Order-sensitive hash of geometry and topology.
    ///
    /// Used to decide whether a retained decomposition still matches the
    /// dataset; field values do not participate.
    pub fn fingerprint(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.points.len().hash(&mut h);
        for p in &self.points {
            for x in p {
                x.to_bits().hash(&mut h);
            }
        }
        self.cell_types.hash(&mut h);
        self.offsets.hash(&mut h);
        self.connectivity.hash(&mut h);
        h.finish()
    }
}
