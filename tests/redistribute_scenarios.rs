mod util;

use mesh_redistribute::algs::extract::extract_for_process;
use mesh_redistribute::algs::fan_in_merge::{fan_in_participants, redistribute_fan_in};
use mesh_redistribute::algs::redistribute_all_to_all;
use mesh_redistribute::prelude::*;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use util::*;

fn config(strategy: Strategy, include_boundary: bool) -> RedistributeConfig {
    RedistributeConfig {
        include_all_intersecting_cells: include_boundary,
        strategy,
        ..RedistributeConfig::default()
    }
}

/// Every output cell lies in (or, with boundary inclusion, touches) a
/// region owned by the rank holding it.
fn assert_region_ownership(
    out: &UnstructuredMesh,
    partition: &RegionPartition,
    rank: usize,
    include_boundary: bool,
) {
    let owned: Vec<Bounds> = partition
        .region_assignment_list(rank)
        .iter()
        .map(|&r| partition.region(r).unwrap().bounds)
        .collect();
    for c in 0..out.num_cells() {
        let centroid = out.cell_centroid(c);
        let cb = out.cell_bounds(c);
        let ok = owned
            .iter()
            .any(|b| b.contains(centroid) || (include_boundary && cb.overlaps(b)));
        assert!(ok, "rank {rank}: cell {c} at {centroid:?} outside {owned:?}");
    }
}

fn scenario_a<C: MeshTransport + Sync>(world: &[C], strategy: Strategy) {
    const PER_RANK: usize = 200;
    let results = run_world(world, |comm| {
        let local = point_cloud(comm.rank(), PER_RANK, 42);
        let mut filter = DistributedDataFilter::new(config(strategy, false));
        let out = filter.execute(&local, comm).unwrap();
        (out, filter.partition().unwrap().clone())
    });

    let total: usize = results.iter().map(|(m, _)| m.num_cells()).sum();
    assert_eq!(total, PER_RANK * world.len());
    for (rank, (out, partition)) in results.iter().enumerate() {
        assert!(out.num_cells() > 0, "rank {rank} ended empty");
        assert_eq!(out.num_points(), out.num_cells());
        assert_eq!(out.point_data().names().collect::<Vec<_>>(), vec!["temp"]);
        assert_eq!(out.cell_data().names().collect::<Vec<_>>(), vec!["origin"]);
        assert_region_ownership(out, partition, rank, false);
        // one contiguous box per rank
        let owned = partition.owned_bounds(rank);
        assert!(out.points().iter().all(|p| owned.contains(*p)));
    }
}

#[test]
fn point_cloud_all_to_all() {
    scenario_a(&RayonComm::world(4), Strategy::AllToAll);
}

#[test]
fn point_cloud_fan_in() {
    scenario_a(&RayonComm::world(4), Strategy::FanIn);
}

#[test]
fn point_cloud_serialized_auto_picks_fan_in() {
    scenario_a(&serialized_world(4), Strategy::Auto);
}

#[test]
fn boundary_cells_never_lose_cells() {
    let world = RayonComm::world(3);
    let pre: usize = 3 * 60;
    let post: usize = run_world(&world, |comm| {
        // 2-point segments so some cells straddle region faces
        let cloud = point_cloud(comm.rank(), 60, 7);
        let mut m = UnstructuredMesh::new();
        for p in cloud.points() {
            let a = m.add_point(*p);
            let b = m.add_point([p[0] + 0.1, p[1], p[2]]);
            m.add_cell(CellType::Segment, &[a, b]).unwrap();
        }
        let mut filter = DistributedDataFilter::new(config(Strategy::AllToAll, true));
        let out = filter.execute(&m, comm).unwrap();
        assert_region_ownership(&out, filter.partition().unwrap(), comm.rank(), true);
        out.num_cells()
    })
    .into_iter()
    .sum();
    assert!(post >= pre, "post {post} < pre {pre}");
}

// quads [0,1], [1,3] and [3,4] in x; the k = 2 median split lands at 1.25,
// inside the middle quad
const STATIONS: [f64; 4] = [0.0, 1.0, 3.0, 4.0];

fn straddle_share(rank: usize) -> UnstructuredMesh {
    match rank {
        0 => quad_strip(&STATIONS, &[(0, 1), (2, 3)]),
        _ => quad_strip(&STATIONS, &[(1, 2)]),
    }
}

fn scenario_b<C: MeshTransport + Sync>(world: &[C], strategy: Strategy) {
    let mut cfg = config(strategy, true);
    cfg.global_id_array_name = Some("gid".into());
    let results = run_world(world, |comm| {
        let mut filter = DistributedDataFilter::new(cfg.clone());
        filter.execute(&straddle_share(comm.rank()), comm).unwrap()
    });
    let post: usize = results.iter().map(UnstructuredMesh::num_cells).sum();
    assert_eq!(post, 3 + 1);
    assert_eq!(sorted_tags(&results[0]), vec![1, 12]);
    assert_eq!(sorted_tags(&results[1]), vec![12, 23]);
    for out in &results {
        // the shared edge is merged, not duplicated
        assert_eq!(out.num_points(), 6);
        let mut gids = i64_values(out.point_data(), "gid").to_vec();
        gids.sort_unstable();
        gids.dedup();
        assert_eq!(gids.len(), 6);
    }
}

#[test]
fn straddling_cell_lands_on_both_ranks_all_to_all() {
    scenario_b(&RayonComm::world(2), Strategy::AllToAll);
}

#[test]
fn straddling_cell_lands_on_both_ranks_fan_in() {
    scenario_b(&serialized_world(2), Strategy::FanIn);
}

#[test]
fn straddling_cell_goes_to_one_rank_without_boundary_inclusion() {
    let results = run_world(&RayonComm::world(2), |comm| {
        let mut filter = DistributedDataFilter::new(config(Strategy::AllToAll, false));
        filter.execute(&straddle_share(comm.rank()), comm).unwrap()
    });
    assert_eq!(sorted_tags(&results[0]), vec![1]);
    assert_eq!(sorted_tags(&results[1]), vec![12, 23]);
}

/// Counts traffic, so a test can assert nothing was sent.
struct Counting<'a, C> {
    inner: &'a C,
    sent: AtomicUsize,
}

impl<C: MeshTransport> Communicator for Counting<'_, C> {
    type SendHandle = C::SendHandle;
    type RecvHandle = C::RecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.inner.isend(peer, tag, buf)
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        self.inner.irecv(peer, tag, buf)
    }

    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }
}

impl<C: MeshTransport> MeshTransport for Counting<'_, C> {
    fn send_mesh(&self, peer: usize, tag: u16, mesh: UnstructuredMesh) -> Result<(), MeshError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.inner.send_mesh(peer, tag, mesh)
    }

    fn recv_mesh(&self, peer: usize, tag: u16) -> Result<UnstructuredMesh, MeshError> {
        self.inner.recv_mesh(peer, tag)
    }
}

#[test]
fn single_rank_sends_nothing_and_keeps_its_extraction() {
    let world = RayonComm::world(1);
    let comm = Counting {
        inner: &world[0],
        sent: AtomicUsize::new(0),
    };
    let mesh = quad_strip(&STATIONS, &[(0, 1), (1, 2), (2, 3)]);
    let cfg = config(Strategy::FanIn, true);

    let mut oracle = KdTreeOracle::default();
    let partition = oracle.build_partition(&mesh, &comm, true).unwrap();
    let local = extract_for_process(&mesh, &partition, 0, true)
        .unwrap()
        .unwrap();
    let out = redistribute_fan_in(&mesh, &partition, &comm, &cfg).unwrap();

    assert_eq!(comm.sent.load(Ordering::SeqCst), 0);
    assert_eq!(out, local);
    assert_eq!(out.num_cells(), 3);
}

/// Logs `(from, to, tag)` of every message.
struct Recording<'a> {
    inner: &'a RayonComm,
    log: &'a Mutex<Vec<(usize, usize, u16)>>,
}

impl Recording<'_> {
    fn note(&self, peer: usize, tag: u16) {
        self.log.lock().unwrap().push((self.inner.rank(), peer, tag));
    }
}

impl Communicator for Recording<'_> {
    type SendHandle = ();
    type RecvHandle = <RayonComm as Communicator>::RecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        self.note(peer, tag);
        self.inner.isend(peer, tag, buf)
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        self.inner.irecv(peer, tag, buf)
    }

    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }
}

impl MeshTransport for Recording<'_> {
    fn send_mesh(&self, peer: usize, tag: u16, mesh: UnstructuredMesh) -> Result<(), MeshError> {
        self.note(peer, tag);
        self.inner.send_mesh(peer, tag, mesh)
    }

    fn recv_mesh(&self, peer: usize, tag: u16) -> Result<UnstructuredMesh, MeshError> {
        self.inner.recv_mesh(peer, tag)
    }
}

const HOLDERS: [usize; 5] = [0, 2, 3, 5, 7];

/// Eight one-region-per-rank regions. Region 0 has data on `HOLDERS`;
/// ranks 1, 4 and 6 hold one cell of their own region and nothing else.
fn subset_share(rank: usize) -> (UnstructuredMesh, RegionPartition) {
    let mut m = UnstructuredMesh::new();
    let mut gids = Vec::new();
    let mut cell_lists = vec![Vec::new(); 8];
    let n_cells = if HOLDERS.contains(&rank) { 2 } else { 1 };
    let region = if HOLDERS.contains(&rank) { 0 } else { rank };
    for j in 0..=n_cells {
        m.add_point([rank as f64, j as f64, 0.0]);
        gids.push((10 * rank + j) as i64);
    }
    for j in 0..n_cells {
        cell_lists[region].push(m.add_cell(CellType::Segment, &[j, j + 1]).unwrap());
    }
    m.point_data_mut()
        .add(FieldArray::new("gid", 1, FieldValues::I64(gids)).unwrap())
        .unwrap();

    let mut process_lists = vec![Vec::new(); 8];
    process_lists[0] = HOLDERS.to_vec();
    for r in [1, 4, 6] {
        process_lists[r] = vec![r];
    }
    let regions = (0..8)
        .map(|id| Region {
            id,
            bounds: Bounds::new([id as f64, 0.0, 0.0], [id as f64 + 1.0, 2.0, 0.0]),
        })
        .collect();
    let partition =
        RegionPartition::new(regions, (0..8).collect(), 8, cell_lists, vec![], process_lists)
            .unwrap();
    (m, partition)
}

#[test]
fn fan_in_only_involves_holders() {
    let world = RayonComm::world(8);
    let log = Mutex::new(Vec::new());
    let mut cfg = config(Strategy::FanIn, false);
    cfg.global_id_array_name = Some("gid".into());

    let results = run_world(&world, |inner| {
        let comm = Recording { inner, log: &log };
        let (mesh, partition) = subset_share(inner.rank());
        assert_eq!(fan_in_participants(&partition, 0), HOLDERS.to_vec());
        redistribute_fan_in(&mesh, &partition, &comm, &cfg).unwrap()
    });

    assert_eq!(results[0].num_cells(), 10);
    assert_eq!(results[0].num_points(), 15);
    for r in [1, 4, 6] {
        assert_eq!(results[r].num_cells(), 1);
    }
    for r in [2, 3, 5, 7] {
        assert_eq!(results[r].num_cells(), 0);
        assert_eq!(results[r].point_data().names().collect::<Vec<_>>(), vec!["gid"]);
    }

    let root_tags: HashSet<u16> = cfg.fan_in_tags(0).iter().map(|t| t.as_u16()).collect();
    let log = log.into_inner().unwrap();
    let root_traffic: Vec<_> = log.iter().filter(|(_, _, t)| root_tags.contains(t)).collect();
    assert!(!root_traffic.is_empty());
    for &&(from, to, _) in &root_traffic {
        assert!(HOLDERS.contains(&from) && HOLDERS.contains(&to), "{from} -> {to}");
    }
    // lone-participant fan-ins exchange nothing at all
    assert_eq!(log.len(), root_traffic.len());
}

fn shared_gid_share(rank: usize) -> UnstructuredMesh {
    // both quads carry the points at x = 1 (gids 2 and 3)
    let stations = [0.0, 1.0, 2.0];
    match rank {
        0 => quad_strip(&stations, &[(0, 1)]),
        _ => quad_strip(&stations, &[(1, 2)]),
    }
}

fn scenario_e<C: MeshTransport + Sync>(world: &[C], strategy: Strategy) {
    let cfg = RedistributeConfig {
        global_id_array_name: Some("gid".into()),
        number_of_regions: Some(1),
        strategy,
        ..RedistributeConfig::default()
    };
    let results = run_world(world, |comm| {
        let mut filter = DistributedDataFilter::new(cfg.clone());
        filter.execute(&shared_gid_share(comm.rank()), comm).unwrap()
    });
    let out = &results[0];
    assert_eq!(out.num_cells(), 2);
    assert_eq!(out.num_points(), 6);
    let gids = i64_values(out.point_data(), "gid");
    for shared in [2, 3] {
        let idx: Vec<usize> = (0..gids.len()).filter(|&i| gids[i] == shared).collect();
        assert_eq!(idx.len(), 1, "gid {shared} appears {} times", idx.len());
        // both cells reference the single merged point
        for c in 0..2 {
            assert!(out.cell_points(c).contains(&idx[0]), "cell {c} lost gid {shared}");
        }
        assert_eq!(out.point(idx[0])[0], 1.0);
    }
    assert_eq!(results[1].num_cells(), 0);
    assert_eq!(results[1].point_data().names().collect::<Vec<_>>(), vec!["gid"]);
}

#[test]
fn shared_global_id_merges_all_to_all() {
    scenario_e(&RayonComm::world(2), Strategy::AllToAll);
}

#[test]
fn shared_global_id_merges_fan_in() {
    scenario_e(&serialized_world(2), Strategy::FanIn);
}

#[test]
fn engines_agree() {
    let world = RayonComm::world(3);
    let run = |strategy| {
        run_world(&world, |comm| {
            let local = point_cloud(comm.rank(), 50, 3);
            let cfg = config(strategy, false);
            let partition = KdTreeOracle::default()
                .build_partition(&local, comm, false)
                .unwrap();
            let out = match strategy {
                Strategy::FanIn => redistribute_fan_in(&local, &partition, comm, &cfg),
                _ => redistribute_all_to_all(&local, &partition, comm, &cfg),
            };
            out.unwrap()
        })
    };
    let a = run(Strategy::AllToAll);
    let b = run(Strategy::FanIn);
    for (x, y) in a.iter().zip(&b) {
        let key = |m: &UnstructuredMesh| {
            let mut pts: Vec<[u64; 3]> = m
                .points()
                .iter()
                .map(|p| p.map(f64::to_bits))
                .collect();
            pts.sort_unstable();
            pts
        };
        assert_eq!(key(x), key(y));
    }
}
