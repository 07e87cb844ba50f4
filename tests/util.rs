#![allow(dead_code)]
use mesh_redistribute::prelude::*;
use rand::{Rng, SeedableRng, rngs::SmallRng};

/// Run `f` once per rank of an in-process world, each on its own thread.
pub fn run_world<C, T, F>(world: &[C], f: F) -> Vec<T>
where
    C: Sync,
    T: Send,
    F: Fn(&C) -> T + Sync,
{
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = world.iter().map(|c| s.spawn(move || f(c))).collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank panicked"))
            .collect()
    })
}

/// Byte-only view of a Rayon world, forcing meshes through the serializer.
pub fn serialized_world(n: usize) -> Vec<Serialized<RayonComm>> {
    RayonComm::world(n).into_iter().map(Serialized).collect()
}

/// `n` vertex cells scattered uniformly in the unit cube, with a `temp`
/// point field and an `origin` cell field holding `rank`.
pub fn point_cloud(rank: usize, n: usize, seed: u64) -> UnstructuredMesh {
    let mut rng = SmallRng::seed_from_u64(seed ^ (rank as u64).wrapping_mul(0x9E37_79B9));
    let mut m = UnstructuredMesh::new();
    let mut temp = Vec::with_capacity(n);
    for _ in 0..n {
        let p = [rng.r#gen(), rng.r#gen(), rng.r#gen::<f64>()];
        let id = m.add_point(p);
        m.add_cell(CellType::Vertex, &[id]).unwrap();
        temp.push(p[0] + p[1] + p[2]);
    }
    m.point_data_mut()
        .add(FieldArray::new("temp", 1, FieldValues::F64(temp)).unwrap())
        .unwrap();
    m.cell_data_mut()
        .add(FieldArray::new("origin", 1, FieldValues::I32(vec![rank as i32; n])).unwrap())
        .unwrap();
    m
}

/// Axis-aligned quads `[x0, x1] x [0, 1]` on a shared set of x stations.
///
/// Point `(xs[i], y)` gets global id `2 * i + y`, so meshes built from the
/// same `stations` agree on ids for coincident points.
pub fn quad_strip(stations: &[f64], cells: &[(usize, usize)]) -> UnstructuredMesh {
    let mut m = UnstructuredMesh::new();
    let mut ids = Vec::new();
    let mut local = std::collections::HashMap::new();
    let mut point = |m: &mut UnstructuredMesh, i: usize, y: usize| {
        *local.entry((i, y)).or_insert_with(|| {
            ids.push((2 * i + y) as i64);
            m.add_point([stations[i], y as f64, 0.0])
        })
    };
    let mut tags = Vec::new();
    for &(a, b) in cells {
        let p = [point(&mut m, a, 0), point(&mut m, b, 0), point(&mut m, b, 1), point(&mut m, a, 1)];
        m.add_cell(CellType::Quadrilateral, &p).unwrap();
        tags.push((10 * a + b) as i64);
    }
    m.point_data_mut()
        .add(FieldArray::new("gid", 1, FieldValues::I64(ids)).unwrap())
        .unwrap();
    m.cell_data_mut()
        .add(FieldArray::new("tag", 1, FieldValues::I64(tags)).unwrap())
        .unwrap();
    m
}

/// Values of the single-component `I64` array `name`.
pub fn i64_values<'a>(data: &'a FieldData, name: &str) -> &'a [i64] {
    match data.get(name).map(FieldArray::values) {
        Some(FieldValues::I64(v)) => v,
        other => panic!("`{name}` is not an i64 array: {other:?}"),
    }
}

/// Cell tags of `mesh`, sorted.
pub fn sorted_tags(mesh: &UnstructuredMesh) -> Vec<i64> {
    let mut t = i64_values(mesh.cell_data(), "tag").to_vec();
    t.sort_unstable();
    t
}
