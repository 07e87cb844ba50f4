//! Mesh ⇄ byte buffer conversion for byte-only transports.
//!
//! Every buffer starts with a [`WireHdr`]. Meshes with cells use a compact
//! binary body (bincode); zero-cell meshes, which only carry their field
//! schema, use a JSON body.

use crate::algs::wire::{KIND_MESH_ASCII, KIND_MESH_BINARY, WIRE_VERSION, WireHdr, cast_slice};
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshError;
use bytemuck::Zeroable;

/// Encode `mesh` into a self-describing buffer.
pub fn serialize_mesh(mesh: &UnstructuredMesh) -> Result<Vec<u8>, MeshError> {
    let (kind, body) = if mesh.num_cells() > 0 {
        (KIND_MESH_BINARY, bincode::serialize(mesh)?)
    } else {
        (KIND_MESH_ASCII, serde_json::to_vec(mesh)?)
    };
    let hdr = WireHdr::new(kind);
    let mut out = Vec::with_capacity(WireHdr::SIZE + body.len());
    out.extend_from_slice(cast_slice(std::slice::from_ref(&hdr)));
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a buffer produced by [`serialize_mesh`] and validate the result.
pub fn deserialize_mesh(bytes: &[u8]) -> Result<UnstructuredMesh, MeshError> {
    if bytes.len() < WireHdr::SIZE {
        return Err(MeshError::Protocol(format!(
            "mesh buffer of {} bytes is shorter than its header",
            bytes.len()
        )));
    }
    let (head, body) = bytes.split_at(WireHdr::SIZE);
    let mut hdr = WireHdr::zeroed();
    bytemuck::bytes_of_mut(&mut hdr).copy_from_slice(head);
    if hdr.version() != WIRE_VERSION {
        return Err(MeshError::Protocol(format!(
            "wire version {} (expected {WIRE_VERSION})",
            hdr.version()
        )));
    }
    let mesh: UnstructuredMesh = match hdr.kind() {
        KIND_MESH_BINARY => bincode::deserialize(body)?,
        KIND_MESH_ASCII => serde_json::from_slice(body)?,
        other => {
            return Err(MeshError::Protocol(format!("unknown mesh encoding {other}")));
        }
    };
    mesh.validate()?;
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::wire::WireHdr;
    use crate::data::field::{FieldArray, FieldValues};
    use crate::topology::cell_type::CellType;

    fn triangle() -> UnstructuredMesh {
        let mut m = UnstructuredMesh::new();
        let a = m.add_point([0.0, 0.0, 0.0]);
        let b = m.add_point([1.0, 0.0, 0.0]);
        let c = m.add_point([0.0, 1.0, 0.25]);
        m.add_cell(CellType::Triangle, &[a, b, c]).unwrap();
        m.point_data_mut()
            .add(FieldArray::new("gid", 1, FieldValues::I64(vec![5, 6, 7])).unwrap())
            .unwrap();
        m
    }

    #[test]
    fn binary_for_cells_ascii_for_schema_only() {
        let m = triangle();
        let bin = serialize_mesh(&m).unwrap();
        assert_eq!(
            bytemuck::pod_read_unaligned::<WireHdr>(&bin[..WireHdr::SIZE]).kind(),
            KIND_MESH_BINARY
        );
        let empty = serialize_mesh(&m.empty_like()).unwrap();
        assert_eq!(
            bytemuck::pod_read_unaligned::<WireHdr>(&empty[..WireHdr::SIZE]).kind(),
            KIND_MESH_ASCII
        );
        assert_eq!(deserialize_mesh(&empty).unwrap(), m.empty_like());
    }

    #[test]
    fn truncated_buffer_is_protocol_error() {
        assert!(matches!(
            deserialize_mesh(&[1, 0, 1]),
            Err(MeshError::Protocol(_))
        ));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut buf = serialize_mesh(&triangle()).unwrap();
        buf[2] = 9;
        assert!(matches!(deserialize_mesh(&buf), Err(MeshError::Protocol(_))));
    }

    #[test]
    fn corrupt_body_fails_loudly() {
        let mut buf = serialize_mesh(&triangle()).unwrap();
        buf.truncate(buf.len() - 5);
        assert!(deserialize_mesh(&buf).is_err());
    }
}
