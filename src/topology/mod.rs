//! Geometric and topological primitives shared by the mesh container and
//! the partitioning layer.

pub mod bounds;
pub mod cell_type;

pub use bounds::Bounds;
pub use cell_type::CellType;
