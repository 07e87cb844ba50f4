//! Mesh container and field data.
//!
//! The redistribution engines treat [`UnstructuredMesh`] as an opaque value:
//! they only extract subsets by cell index, query counts, serialize it and
//! feed it to the merge accumulator.

pub mod field;
pub mod mesh;

pub use field::{FieldArray, FieldData, FieldSchema, FieldValues, ScalarType, UNASSIGNED_ID};
pub use mesh::UnstructuredMesh;
