mod util;

use mesh_redistribute::algs::serialize::{deserialize_mesh, serialize_mesh};
use mesh_redistribute::algs::communicator::{recv_serialized, send_serialized};
use mesh_redistribute::prelude::*;
use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const TYPES: [CellType; 6] = [
    CellType::Vertex,
    CellType::Segment,
    CellType::Triangle,
    CellType::Quadrilateral,
    CellType::Tetrahedron,
    CellType::Polygon(6),
];

fn random_mesh(seed: u64, n_points: usize, n_cells: usize) -> UnstructuredMesh {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut m = UnstructuredMesh::new();
    for _ in 0..n_points {
        m.add_point([rng.gen_range(-1e3..1e3), rng.r#gen(), rng.gen_range(-1.0..0.0)]);
    }
    let mut sizes = Vec::with_capacity(n_cells);
    for _ in 0..n_cells {
        let ty = TYPES[rng.gen_range(0..TYPES.len())];
        let pts: Vec<usize> = (0..ty.num_points().unwrap())
            .map(|_| rng.gen_range(0..n_points))
            .collect();
        m.add_cell(ty, &pts).unwrap();
        sizes.push(pts.len() as u64);
    }
    let velocity: Vec<f64> = (0..3 * n_points).map(|_| rng.r#gen()).collect();
    let gid: Vec<i64> = (0..n_points as i64).map(|i| 1_000 + 3 * i).collect();
    let owner: Vec<i32> = (0..n_cells).map(|_| rng.gen_range(0..8)).collect();
    m.point_data_mut()
        .add(FieldArray::new("velocity", 3, FieldValues::F64(velocity)).unwrap())
        .unwrap();
    m.point_data_mut()
        .add(FieldArray::new("gid", 1, FieldValues::I64(gid)).unwrap())
        .unwrap();
    m.cell_data_mut()
        .add(FieldArray::new("owner", 1, FieldValues::I32(owner)).unwrap())
        .unwrap();
    m.cell_data_mut()
        .add(FieldArray::new("size", 1, FieldValues::U64(sizes)).unwrap())
        .unwrap();
    m
}

proptest! {
    #[test]
    fn decode_inverts_encode(
        seed in any::<u64>(),
        n_points in 1usize..64,
        n_cells in 0usize..48,
    ) {
        let mesh = random_mesh(seed, n_points, n_cells);
        let back = deserialize_mesh(&serialize_mesh(&mesh).unwrap()).unwrap();
        prop_assert_eq!(back.num_cells(), mesh.num_cells());
        prop_assert_eq!(back.points(), mesh.points());
        prop_assert_eq!(back.connectivity(), mesh.connectivity());
        prop_assert_eq!(back.point_data().names().collect::<Vec<_>>(), vec!["velocity", "gid"]);
        prop_assert_eq!(back, mesh);
    }
}

#[test]
fn schema_only_mesh_survives() {
    let mesh = random_mesh(9, 4, 3).empty_like();
    let bytes = serialize_mesh(&mesh).unwrap();
    let back = deserialize_mesh(&bytes).unwrap();
    assert_eq!(back.num_cells(), 0);
    assert_eq!(back.cell_data().names().collect::<Vec<_>>(), vec!["owner", "size"]);
    assert_eq!(back, mesh);
}

#[test]
fn truncated_buffer_is_an_error() {
    let bytes = serialize_mesh(&random_mesh(1, 8, 8)).unwrap();
    assert!(deserialize_mesh(&bytes[..bytes.len() / 2]).is_err());
    assert!(matches!(deserialize_mesh(&bytes[..3]), Err(MeshError::Protocol(_))));
}

#[test]
fn meshes_cross_a_byte_transport() {
    let world = RayonComm::world(2);
    let mesh = random_mesh(5, 16, 12);
    let got = util::run_world(&world, |comm| match comm.rank() {
        0 => {
            send_serialized(comm, 1, 77, &mesh).unwrap();
            None
        }
        _ => Some(recv_serialized(comm, 0, 77).unwrap()),
    });
    assert_eq!(got[1].as_ref(), Some(&mesh));
}
