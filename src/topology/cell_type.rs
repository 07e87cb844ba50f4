//! Cell type metadata for mesh cells.

use serde::{Deserialize, Serialize};

/// Common cell types for mesh elements.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum CellType {
    /// 0D vertex.
    Vertex,
    /// 1D segment/edge.
    Segment,
    /// 2D simplex (triangle).
    Triangle,
    /// 2D tensor-product cell (quad).
    Quadrilateral,
    /// 3D simplex (tet).
    Tetrahedron,
    /// 3D tensor-product cell (hex).
    Hexahedron,
    /// 3D wedge/prism.
    Prism,
    /// 3D pyramid.
    Pyramid,
    /// 2D polygon with `n` vertices.
    Polygon(u8),
    /// Generic simplex with dimension `d`.
    Simplex(u8),
    /// Generic polyhedron.
    Polyhedron,
}

impl Default for CellType {
    fn default() -> Self {
        CellType::Vertex
    }
}

impl CellType {
    /// Returns the topological dimension of the cell, when well-defined.
    pub fn dimension(self) -> u8 {
        match self {
            CellType::Vertex => 0,
            CellType::Segment => 1,
            CellType::Triangle | CellType::Quadrilateral | CellType::Polygon(_) => 2,
            CellType::Tetrahedron
            | CellType::Hexahedron
            | CellType::Prism
            | CellType::Pyramid
            | CellType::Polyhedron => 3,
            CellType::Simplex(d) => d,
        }
    }

    /// Number of corner points the cell type requires, if fixed.
    ///
    /// Polyhedra carry an arbitrary point list and return `None`.
    pub fn num_points(self) -> Option<usize> {
        match self {
            CellType::Vertex => Some(1),
            CellType::Segment => Some(2),
            CellType::Triangle => Some(3),
            CellType::Quadrilateral | CellType::Tetrahedron => Some(4),
            CellType::Pyramid => Some(5),
            CellType::Prism => Some(6),
            CellType::Hexahedron => Some(8),
            CellType::Polygon(n) => Some(n as usize),
            CellType::Simplex(d) => Some(d as usize + 1),
            CellType::Polyhedron => None,
        }
    }

    /// Planar cell type for a polygon with `n` corners.
    pub fn polygon_of(n: usize) -> Option<CellType> {
        match n {
            3 => Some(CellType::Triangle),
            4 => Some(CellType::Quadrilateral),
            n => u8::try_from(n).ok().map(CellType::Polygon),
        }
    }
}
