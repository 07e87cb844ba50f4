//! Ring-scheduled collectives built from point-to-point messages.
//!
//! At step `offset = 1..size` rank `r` sends to `(r + offset) % size` and
//! receives from `(r - offset) % size`. The receive is posted before the
//! send in program order, so the ring never deadlocks even when the send
//! blocks. Every receive handle is drained before the function returns,
//! even if an earlier step failed.

use crate::algs::communicator::{CommTag, Communicator, Wait, wait_exact};
use crate::algs::wire::{WireLen, cast_slice, cast_slice_mut};
use crate::mesh_error::MeshError;
use bytemuck::Pod;

/// `(target, source)` for one ring step.
#[inline]
pub fn ring_peers(rank: usize, size: usize, offset: usize) -> (usize, usize) {
    ((rank + offset) % size, (rank + size - offset) % size)
}

/// Exchange one fixed-size record with every other rank.
///
/// `outgoing[p]` is what this rank sends to `p`; the result holds what `p`
/// sent here, with `result[rank] = outgoing[rank]`.
pub fn ring_exchange<C, T>(comm: &C, tag: CommTag, outgoing: &[T]) -> Result<Vec<T>, MeshError>
where
    C: Communicator,
    T: Pod,
{
    let (me, n) = (comm.rank(), comm.size());
    debug_assert_eq!(outgoing.len(), n);
    let mut incoming = outgoing.to_vec();
    let mut maybe_err = None;
    for offset in 1..n {
        let (target, source) = ring_peers(me, n, offset);
        let slot = cast_slice_mut(std::slice::from_mut(&mut incoming[source]));
        let h = comm.irecv(source, tag.as_u16(), slot);
        let s = comm.isend(
            target,
            tag.as_u16(),
            cast_slice(std::slice::from_ref(&outgoing[target])),
        );
        let slot = cast_slice_mut(std::slice::from_mut(&mut incoming[source]));
        if let Err(e) = wait_exact(h, slot, source) {
            maybe_err.get_or_insert(e);
        }
        let _ = s.wait();
    }
    match maybe_err {
        Some(e) => Err(e),
        None => Ok(incoming),
    }
}

/// Every rank contributes a byte buffer and receives everyone's, indexed by rank.
pub fn all_gather_bytes<C: Communicator>(
    comm: &C,
    tag: CommTag,
    local: &[u8],
) -> Result<Vec<Vec<u8>>, MeshError> {
    let (me, n) = (comm.rank(), comm.size());
    let lens = ring_exchange(comm, tag, &vec![WireLen::new(local.len()); n])?;
    let data_tag = tag.offset(1);
    let mut out: Vec<Vec<u8>> = lens.iter().map(|l| vec![0u8; l.get()]).collect();
    let mut maybe_err = None;
    for offset in 1..n {
        let (target, source) = ring_peers(me, n, offset);
        let expect = out[source].len();
        let h = (expect > 0).then(|| comm.irecv(source, data_tag.as_u16(), &mut out[source]));
        let s = (!local.is_empty()).then(|| comm.isend(target, data_tag.as_u16(), local));
        if let Some(h) = h {
            if let Err(e) = wait_exact(h, &mut out[source], source) {
                maybe_err.get_or_insert(e);
            }
        }
        if let Some(s) = s {
            let _ = s.wait();
        }
    }
    if let Some(e) = maybe_err {
        return Err(e);
    }
    out[me] = local.to_vec();
    Ok(out)
}
