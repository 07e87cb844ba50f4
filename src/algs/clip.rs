//! Clipping a mesh against an axis-aligned box.
//!
//! Used after redistribution to cut cells back to the exact extent of the
//! rank's regions. Points created on the box faces interpolate point data
//! from the endpoints they were cut from, except for the global-id array:
//! they get [`UNASSIGNED_ID`](crate::data::field::UNASSIGNED_ID) there.

use crate::data::field::FieldData;
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshError;
use crate::topology::bounds::Bounds;
use crate::topology::cell_type::CellType;
use hashbrown::HashMap;

/// Geometric clipping of a mesh to a box.
pub trait BoxClipper {
    fn clip(&self, mesh: &UnstructuredMesh, bounds: &Bounds) -> Result<UnstructuredMesh, MeshError>;
}

/// Exact clipping for 0D, 1D and planar 2D cells; volumetric cells are kept
/// whole when their centroid lies in the box and dropped otherwise.
#[derive(Clone, Debug, Default)]
pub struct PlanarBoxClipper {
    global_id: Option<String>,
}

impl PlanarBoxClipper {
    /// `global_id` names the point array that must not be interpolated.
    pub fn new(global_id: Option<&str>) -> Self {
        Self {
            global_id: global_id.map(str::to_owned),
        }
    }
}

/// A clipped vertex: position plus the source points it blends.
#[derive(Clone, Debug)]
struct Vertex {
    pos: [f64; 3],
    weights: Vec<(usize, f64)>,
}

impl Vertex {
    fn source(mesh: &UnstructuredMesh, p: usize) -> Self {
        Self {
            pos: mesh.point(p),
            weights: vec![(p, 1.0)],
        }
    }

    fn lerp(&self, other: &Vertex, t: f64) -> Vertex {
        let mut pos = [0.0; 3];
        for a in 0..3 {
            pos[a] = self.pos[a] + t * (other.pos[a] - self.pos[a]);
        }
        let mut weights: Vec<(usize, f64)> =
            self.weights.iter().map(|&(i, w)| (i, w * (1.0 - t))).collect();
        for &(i, w) in &other.weights {
            match weights.iter_mut().find(|(j, _)| *j == i) {
                Some(slot) => slot.1 += w * t,
                None => weights.push((i, w * t)),
            }
        }
        weights.retain(|&(_, w)| w > 0.0);
        Vertex { pos, weights }
    }
}

/// One of the six half-spaces bounding the box.
#[derive(Copy, Clone, Debug)]
struct Plane {
    axis: usize,
    value: f64,
    keep_above: bool,
}

impl Plane {
    fn all(b: &Bounds) -> [Plane; 6] {
        let mut out = [Plane {
            axis: 0,
            value: 0.0,
            keep_above: true,
        }; 6];
        for a in 0..3 {
            out[2 * a] = Plane {
                axis: a,
                value: b.min[a],
                keep_above: true,
            };
            out[2 * a + 1] = Plane {
                axis: a,
                value: b.max[a],
                keep_above: false,
            };
        }
        out
    }

    #[inline]
    fn inside(&self, p: [f64; 3]) -> bool {
        if self.keep_above {
            p[self.axis] >= self.value
        } else {
            p[self.axis] <= self.value
        }
    }

    fn cut(&self, s: &Vertex, e: &Vertex) -> Vertex {
        let ds = e.pos[self.axis] - s.pos[self.axis];
        let t = if ds == 0.0 {
            0.0
        } else {
            ((self.value - s.pos[self.axis]) / ds).clamp(0.0, 1.0)
        };
        let mut v = s.lerp(e, t);
        v.pos[self.axis] = self.value;
        v
    }
}

/// Sutherland–Hodgman against every plane of the box.
fn clip_polygon(mut poly: Vec<Vertex>, planes: &[Plane]) -> Vec<Vertex> {
    for plane in planes {
        if poly.is_empty() {
            break;
        }
        let mut next = Vec::with_capacity(poly.len() + 2);
        for i in 0..poly.len() {
            let cur = &poly[i];
            let prev = &poly[(i + poly.len() - 1) % poly.len()];
            match (plane.inside(prev.pos), plane.inside(cur.pos)) {
                (true, true) => next.push(cur.clone()),
                (true, false) => next.push(plane.cut(prev, cur)),
                (false, true) => {
                    next.push(plane.cut(prev, cur));
                    next.push(cur.clone());
                }
                (false, false) => {}
            }
        }
        poly = next;
    }
    poly
}

/// Parametric clip of a segment; `None` if it misses the box.
fn clip_segment(a: &Vertex, b: &Vertex, bounds: &Bounds) -> Option<(Vertex, Vertex)> {
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for axis in 0..3 {
        let d = b.pos[axis] - a.pos[axis];
        let (lo, hi) = (bounds.min[axis], bounds.max[axis]);
        if d == 0.0 {
            if a.pos[axis] < lo || a.pos[axis] > hi {
                return None;
            }
            continue;
        }
        let (mut ta, mut tb) = ((lo - a.pos[axis]) / d, (hi - a.pos[axis]) / d);
        if ta > tb {
            std::mem::swap(&mut ta, &mut tb);
        }
        t0 = t0.max(ta);
        t1 = t1.min(tb);
        if t0 > t1 {
            return None;
        }
    }
    Some((a.lerp(b, t0), a.lerp(b, t1)))
}

/// Output under construction.
struct Builder<'m> {
    src: &'m UnstructuredMesh,
    global_id: Option<&'m str>,
    point_map: Vec<usize>,
    cell_map: Vec<usize>,
    points: Vec<[f64; 3]>,
    by_position: HashMap<[u64; 3], usize>,
    cell_types: Vec<CellType>,
    offsets: Vec<usize>,
    connectivity: Vec<usize>,
    point_data: FieldData,
    cell_data: FieldData,
}

impl<'m> Builder<'m> {
    fn new(src: &'m UnstructuredMesh, global_id: Option<&'m str>) -> Self {
        Self {
            src,
            global_id,
            point_map: src.point_data().identity_map(),
            cell_map: src.cell_data().identity_map(),
            points: Vec::new(),
            by_position: HashMap::new(),
            cell_types: Vec::new(),
            offsets: vec![0],
            connectivity: Vec::new(),
            point_data: src.point_data().empty_like(),
            cell_data: src.cell_data().empty_like(),
        }
    }

    fn point(&mut self, v: &Vertex) -> Result<usize, MeshError> {
        let key = v.pos.map(|x| if x == 0.0 { 0.0f64 } else { x }.to_bits());
        if let Some(&idx) = self.by_position.get(&key) {
            return Ok(idx);
        }
        let idx = self.points.len();
        self.points.push(v.pos);
        match v.weights.as_slice() {
            [(p, w)] if *w == 1.0 => {
                self.point_data
                    .push_tuple_mapped(self.src.point_data(), &self.point_map, *p)?
            }
            weights => {
                self.point_data
                    .push_weighted_mapped(self.src.point_data(), &self.point_map, weights)?;
                if let Some(name) = self.global_id {
                    self.point_data.unassign_last(name);
                }
            }
        }
        self.by_position.insert(key, idx);
        Ok(idx)
    }

    fn cell(&mut self, ty: CellType, pts: &[usize], from: usize) -> Result<(), MeshError> {
        self.cell_types.push(ty);
        self.connectivity.extend_from_slice(pts);
        self.offsets.push(self.connectivity.len());
        self.cell_data
            .push_tuple_mapped(self.src.cell_data(), &self.cell_map, from)
    }

    fn polygon(&mut self, mut ids: Vec<usize>, from: usize) -> Result<(), MeshError> {
        ids.dedup();
        while ids.len() > 1 && ids.first() == ids.last() {
            ids.pop();
        }
        if ids.len() < 3 {
            return Ok(());
        }
        match CellType::polygon_of(ids.len()) {
            Some(ty) => self.cell(ty, &ids, from),
            None => {
                for w in 1..ids.len() - 1 {
                    self.cell(CellType::Triangle, &[ids[0], ids[w], ids[w + 1]], from)?;
                }
                Ok(())
            }
        }
    }

    fn finish(self) -> Result<UnstructuredMesh, MeshError> {
        UnstructuredMesh::from_parts(
            self.points,
            self.cell_types,
            self.offsets,
            self.connectivity,
            self.point_data,
            self.cell_data,
        )
    }
}

impl BoxClipper for PlanarBoxClipper {
    fn clip(&self, mesh: &UnstructuredMesh, bounds: &Bounds) -> Result<UnstructuredMesh, MeshError> {
        let planes = Plane::all(bounds);
        let mut out = Builder::new(mesh, self.global_id.as_deref());
        for c in 0..mesh.num_cells() {
            let (ty, pts) = mesh.cell(c);
            let verts: Vec<Vertex> = pts.iter().map(|&p| Vertex::source(mesh, p)).collect();
            match ty.dimension() {
                0 => {
                    if verts.iter().all(|v| bounds.contains(v.pos)) {
                        let ids = verts
                            .iter()
                            .map(|v| out.point(v))
                            .collect::<Result<Vec<_>, _>>()?;
                        out.cell(ty, &ids, c)?;
                    }
                }
                1 if verts.len() == 2 => {
                    if let Some((a, b)) = clip_segment(&verts[0], &verts[1], bounds) {
                        let ids = [out.point(&a)?, out.point(&b)?];
                        if ids[0] != ids[1] {
                            out.cell(ty, &ids, c)?;
                        }
                    }
                }
                2 => {
                    let clipped = clip_polygon(verts, &planes);
                    let ids = clipped
                        .iter()
                        .map(|v| out.point(v))
                        .collect::<Result<Vec<_>, _>>()?;
                    out.polygon(ids, c)?;
                }
                _ => {
                    if bounds.contains(mesh.cell_centroid(c)) {
                        let ids = verts
                            .iter()
                            .map(|v| out.point(v))
                            .collect::<Result<Vec<_>, _>>()?;
                        out.cell(ty, &ids, c)?;
                    }
                }
            }
        }
        let clipped = out.finish()?;
        log::debug!(
            "clipped {} cells to {} against {:?}",
            mesh.num_cells(),
            clipped.num_cells(),
            bounds.to_xyz()
        );
        Ok(clipped)
    }
}
