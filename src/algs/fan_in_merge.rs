//! Fan-in redistribution over a mesh-capable transport.
//!
//! Destination ranks are handled one at a time, in rank order. For each
//! destination (the *root*) only the ranks holding cells of its regions take
//! part. They reduce their sub-meshes up an XOR tree (see
//! [`compute_fan_in`]) until the root holds the merged result.
//!
//! Per tree edge the sender announces `(points, cells)`, waits for a
//! one-word go-ahead from its target and then sends the mesh, so at most
//! one large payload is in flight per edge. Intermediate nodes forward their
//! untrimmed partial merge; only the root finishes its accumulator.

use crate::algs::communicator::MeshTransport;
use crate::algs::extract::extract_for_process;
use crate::algs::fan_in::{compute_fan_in, participants_for};
use crate::algs::merge::MergeAccumulator;
use crate::algs::wire::{WireCount, WireMeshCounts, cast_slice, cast_slice_mut};
use crate::config::RedistributeConfig;
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshError;
use crate::partitioning::RegionPartition;
use bytemuck::Zeroable;

const GO_AHEAD: usize = 1;

/// Ranks involved in the fan-in towards `root`, root first.
pub fn fan_in_participants(partition: &RegionPartition, root: usize) -> Vec<usize> {
    let holders = partition
        .region_assignment_list(root)
        .iter()
        .flat_map(|&r| partition.process_list(r).iter().copied());
    participants_for(root, holders)
}

/// Redistribute `mesh` so that each rank ends with the cells of its regions.
///
/// Collective over `comm`; ranks that own no regions get an empty mesh with
/// the input's field schema.
pub fn redistribute_fan_in<C: MeshTransport>(
    mesh: &UnstructuredMesh,
    partition: &RegionPartition,
    comm: &C,
    cfg: &RedistributeConfig,
) -> Result<UnstructuredMesh, MeshError> {
    let (me, n) = (comm.rank(), comm.size());
    let mut result = None;

    for root in 0..n {
        let Some(local) =
            extract_for_process(mesh, partition, root, cfg.include_all_intersecting_cells)?
        else {
            continue;
        };
        let participants = fan_in_participants(partition, root);
        let Some(my_local_rank) = participants.iter().position(|&r| r == me) else {
            debug_assert_eq!(local.num_cells(), 0);
            continue;
        };
        if participants.len() == 1 {
            // only the root itself holds data: nothing to exchange
            result = Some(local);
            continue;
        }

        let fan = compute_fan_in(&participants, my_local_rank, root);
        let [counts_tag, ack_tag, mesh_tag] = cfg.fan_in_tags(root).map(|t| t.as_u16());
        log::debug!(
            "fan-in to {root}: rank {me} of {:?}, sources {:?}, target {:?}",
            participants,
            fan.sources,
            fan.target
        );

        let mut total_points = local.num_points();
        let mut total_cells = local.num_cells();
        let mut declared = Vec::with_capacity(fan.sources.len());
        for &src in &fan.sources {
            let mut c = WireMeshCounts::zeroed();
            comm.recv_exact(src, counts_tag, cast_slice_mut(std::slice::from_mut(&mut c)))?;
            total_points += c.points();
            total_cells += c.cells();
            declared.push(c);
        }

        let mut acc = MergeAccumulator::new(
            total_points,
            total_cells,
            fan.sources.len() + 1,
            cfg.global_id(),
        );
        // the root always merges its own share first, even if it is empty,
        // so the output schema comes from local data
        if local.num_cells() > 0 || root == me {
            acc.merge_dataset(local)?;
        }
        for (&src, expect) in fan.sources.iter().zip(&declared) {
            let go = WireCount::new(GO_AHEAD);
            comm.send(src, ack_tag, cast_slice(std::slice::from_ref(&go)));
            let sub = comm.recv_mesh(src, mesh_tag)?;
            if sub.num_cells() != expect.cells() || sub.num_points() != expect.points() {
                return Err(MeshError::Protocol(format!(
                    "rank {src} announced {} points / {} cells, sent {} / {}",
                    expect.points(),
                    expect.cells(),
                    sub.num_points(),
                    sub.num_cells()
                )));
            }
            acc.merge_dataset(sub)?;
        }
        match fan.target {
            Some(target) => {
                let merged = acc.into_partial()?;
                let counts = WireMeshCounts::new(merged.num_points(), merged.num_cells());
                comm.send(target, counts_tag, cast_slice(std::slice::from_ref(&counts)));
                let mut go = WireCount::new(0);
                comm.recv_exact(target, ack_tag, cast_slice_mut(std::slice::from_mut(&mut go)))?;
                if go.get() != GO_AHEAD {
                    return Err(MeshError::Protocol(format!(
                        "rank {target} answered {} instead of a go-ahead",
                        go.get()
                    )));
                }
                comm.send_mesh(target, mesh_tag, merged)?;
            }
            None => result = Some(acc.finish()?),
        }
    }

    Ok(result.unwrap_or_else(|| mesh.empty_like()))
}
