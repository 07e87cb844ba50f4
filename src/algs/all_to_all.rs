//! All-to-all redistribution over raw byte buffers.
//!
//! Phases:
//! 1. extract one sub-mesh per destination rank and serialize the remote ones;
//! 2. ring-exchange `(cells, points, bytes)` records to size the merge and
//!    a single shared receive buffer;
//! 3. ring-exchange payloads, merging each received sub-mesh as it lands;
//! 4. finish the accumulator.
//!
//! This rank's own sub-mesh is merged before anything from the network.
//! Each outbound payload is dropped as soon as its send completes.

use crate::algs::collective::{ring_exchange, ring_peers};
use crate::algs::communicator::{Communicator, Wait, wait_exact};
use crate::algs::extract::extract_for_process;
use crate::algs::merge::MergeAccumulator;
use crate::algs::serialize::{deserialize_mesh, serialize_mesh};
use crate::algs::wire::WireSizes;
use crate::config::RedistributeConfig;
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshError;
use crate::partitioning::RegionPartition;

/// Outbound sub-mesh for one destination.
struct Outgoing {
    sizes: WireSizes,
    payload: Option<Vec<u8>>,
}

fn prepare(
    mesh: &UnstructuredMesh,
    partition: &RegionPartition,
    me: usize,
    dest: usize,
    include_boundary: bool,
) -> Result<Outgoing, MeshError> {
    let empty = Outgoing {
        sizes: WireSizes::default(),
        payload: None,
    };
    if dest == me {
        return Ok(empty);
    }
    match extract_for_process(mesh, partition, dest, include_boundary)? {
        Some(sub) if sub.num_cells() > 0 => {
            let bytes = serialize_mesh(&sub)?;
            Ok(Outgoing {
                sizes: WireSizes::new(sub.num_cells(), sub.num_points(), bytes.len()),
                payload: Some(bytes),
            })
        }
        _ => Ok(empty),
    }
}

#[cfg(feature = "rayon")]
fn prepare_remote(
    mesh: &UnstructuredMesh,
    partition: &RegionPartition,
    me: usize,
    n: usize,
    include_boundary: bool,
) -> Result<Vec<Outgoing>, MeshError> {
    use rayon::prelude::*;
    (0..n)
        .into_par_iter()
        .map(|p| prepare(mesh, partition, me, p, include_boundary))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn prepare_remote(
    mesh: &UnstructuredMesh,
    partition: &RegionPartition,
    me: usize,
    n: usize,
    include_boundary: bool,
) -> Result<Vec<Outgoing>, MeshError> {
    (0..n)
        .map(|p| prepare(mesh, partition, me, p, include_boundary))
        .collect()
}

/// Redistribute `mesh` so that each rank ends with the cells of its regions.
///
/// Collective over `comm`.
pub fn redistribute_all_to_all<C: Communicator>(
    mesh: &UnstructuredMesh,
    partition: &RegionPartition,
    comm: &C,
    cfg: &RedistributeConfig,
) -> Result<UnstructuredMesh, MeshError> {
    let (me, n) = (comm.rank(), comm.size());
    let include_boundary = cfg.include_all_intersecting_cells;

    // --- extract ---
    let own = extract_for_process(mesh, partition, me, include_boundary)?
        .unwrap_or_else(|| mesh.empty_like());
    let mut outgoing = prepare_remote(mesh, partition, me, n, include_boundary)?;
    outgoing[me].sizes = WireSizes::new(own.num_cells(), own.num_points(), 0);

    // --- sizes ---
    let out_sizes: Vec<WireSizes> = outgoing.iter().map(|o| o.sizes).collect();
    let incoming = ring_exchange(comm, cfg.size_tag(), &out_sizes)?;
    let mut total_cells = own.num_cells();
    let mut total_points = own.num_points();
    // self always counts: its sub-mesh anchors the schema
    let mut total_datasets = 1;
    let mut largest = 0;
    for (q, s) in incoming.iter().enumerate().filter(|&(q, _)| q != me) {
        if s.cells() == 0 {
            continue;
        }
        total_cells += s.cells();
        total_points += s.points();
        total_datasets += 1;
        largest = largest.max(s.bytes());
        log::trace!("rank {me}: rank {q} sends {} cells", s.cells());
    }
    log::debug!(
        "all-to-all rank {me}: expecting {total_cells} cells, {total_points} points \
         from {total_datasets} datasets, largest payload {largest} bytes"
    );

    let mut buf = Vec::new();
    buf.try_reserve_exact(largest)
        .map_err(|_| MeshError::Allocation { bytes: largest })?;
    buf.resize(largest, 0u8);

    // --- payloads ---
    let mut acc = MergeAccumulator::new(total_points, total_cells, total_datasets, cfg.global_id());
    acc.merge_dataset(own)?;

    let tag = cfg.payload_tag().as_u16();
    let mut maybe_err = None;
    for offset in 1..n {
        let (target, source) = ring_peers(me, n, offset);
        let expect = incoming[source];
        let len = if expect.cells() > 0 { expect.bytes() } else { 0 };
        let h = (len > 0).then(|| comm.irecv(source, tag, &mut buf[..len]));
        // the transport copies the payload, so it is released right here
        let s = outgoing[target]
            .payload
            .take()
            .map(|bytes| comm.isend(target, tag, &bytes));
        let received = h.map(|h| wait_exact(h, &mut buf[..len], source));
        if let Some(s) = s {
            let _ = s.wait();
        }
        match received {
            None => continue,
            Some(Err(e)) => {
                maybe_err.get_or_insert(e);
                continue;
            }
            // keep the ring moving for our peers, but stop merging
            Some(Ok(())) if maybe_err.is_some() => continue,
            Some(Ok(())) => {}
        }
        let slot = &buf[..len];
        let merged = deserialize_mesh(slot).and_then(|sub| {
            if sub.num_cells() != expect.cells() || sub.num_points() != expect.points() {
                return Err(MeshError::Protocol(format!(
                    "rank {source} declared {} cells / {} points, sent {} / {}",
                    expect.cells(),
                    expect.points(),
                    sub.num_cells(),
                    sub.num_points()
                )));
            }
            acc.merge_dataset(sub)
        });
        if let Err(e) = merged {
            maybe_err = Some(e);
        }
    }
    drop(buf);
    if let Some(e) = maybe_err {
        return Err(e);
    }

    acc.finish()
}
