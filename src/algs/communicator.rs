//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable** but non-blocking: engines call `.wait()`
//! before they trust that a buffer is ready.
//!
//! Transports that can move whole meshes without manual serialization also
//! implement [`MeshTransport`]. Any byte transport gains that capability
//! through the [`Serialized`] adapter.

use crate::algs::serialize::{deserialize_mesh, serialize_mesh};
use crate::algs::wire::{WireLen, cast_slice, cast_slice_mut};
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshError;
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use hashbrown::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Message tag; engines derive all of their tags from a configured base.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag `n` steps above this one (wrapping).
    pub const fn offset(self, n: u16) -> Self {
        Self(self.0.wrapping_add(n))
    }
}

impl Default for CommTag {
    fn default() -> Self {
        CommTag(0x4D00)
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Non-blocking point-to-point communication.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;

    /// Post a receive; `buf.len()` is the size the caller expects.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Whether point-to-point exchanges between every pair of ranks are cheap
    /// enough for the all-to-all engine.
    fn native_collectives(&self) -> bool {
        true
    }

    /// Blocking send.
    fn send(&self, peer: usize, tag: u16, buf: &[u8]) {
        let _ = self.isend(peer, tag, buf).wait();
    }

    /// Blocking receive of exactly `buf.len()` bytes.
    fn recv_exact(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Result<(), MeshError> {
        let h = self.irecv(peer, tag, buf);
        wait_exact(h, buf, peer)
    }
}

/// Wait on `h` and copy its payload into `buf`, which must match exactly.
pub fn wait_exact<H: Wait>(h: H, buf: &mut [u8], peer: usize) -> Result<(), MeshError> {
    match h.wait() {
        Some(data) if data.len() == buf.len() => {
            buf.copy_from_slice(&data);
            Ok(())
        }
        Some(data) => Err(MeshError::comm(
            peer,
            format!("expected {} bytes, got {}", buf.len(), data.len()),
        )),
        None => Err(MeshError::comm(
            peer,
            format!("failed to receive {} bytes from rank {peer}", buf.len()),
        )),
    }
}

/// Transports able to move a whole mesh between ranks.
pub trait MeshTransport: Communicator {
    /// Hand `mesh` to `peer`; ownership leaves this rank.
    fn send_mesh(&self, peer: usize, tag: u16, mesh: UnstructuredMesh) -> Result<(), MeshError>;

    fn recv_mesh(&self, peer: usize, tag: u16) -> Result<UnstructuredMesh, MeshError>;
}

/// Send a mesh as a length record followed by its serialized bytes.
pub fn send_serialized<C: Communicator + ?Sized>(
    comm: &C,
    peer: usize,
    tag: u16,
    mesh: &UnstructuredMesh,
) -> Result<(), MeshError> {
    let bytes = serialize_mesh(mesh)?;
    let len = WireLen::new(bytes.len());
    comm.send(peer, tag, cast_slice(std::slice::from_ref(&len)));
    comm.send(peer, tag, &bytes);
    Ok(())
}

/// Receive a mesh sent with [`send_serialized`].
pub fn recv_serialized<C: Communicator + ?Sized>(
    comm: &C,
    peer: usize,
    tag: u16,
) -> Result<UnstructuredMesh, MeshError> {
    let mut len = WireLen::new(0);
    comm.recv_exact(peer, tag, cast_slice_mut(std::slice::from_mut(&mut len)))?;
    let mut buf = vec![0u8; len.get()];
    comm.recv_exact(peer, tag, &mut buf)?;
    deserialize_mesh(&buf)
}

/// Compile-time no-op comm for pure serial runs.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }
}

impl MeshTransport for NoComm {
    fn send_mesh(&self, peer: usize, _tag: u16, _mesh: UnstructuredMesh) -> Result<(), MeshError> {
        Err(MeshError::comm(peer, "NoComm has no peers"))
    }

    fn recv_mesh(&self, peer: usize, _tag: u16) -> Result<UnstructuredMesh, MeshError> {
        Err(MeshError::comm(peer, "NoComm has no peers"))
    }
}

/// Gives any byte transport a [`MeshTransport`] by serializing meshes.
///
/// Reports no native collectives, so the filter's automatic strategy picks
/// the fan-in engine for it.
#[derive(Clone, Debug)]
pub struct Serialized<C>(pub C);

impl<C: Communicator> Communicator for Serialized<C> {
    type SendHandle = C::SendHandle;
    type RecvHandle = C::RecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        self.0.isend(peer, tag, buf)
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        self.0.irecv(peer, tag, buf)
    }

    fn rank(&self) -> usize {
        self.0.rank()
    }

    fn size(&self) -> usize {
        self.0.size()
    }

    fn native_collectives(&self) -> bool {
        false
    }
}

impl<C: Communicator> MeshTransport for Serialized<C> {
    fn send_mesh(&self, peer: usize, tag: u16, mesh: UnstructuredMesh) -> Result<(), MeshError> {
        send_serialized(&self.0, peer, tag, &mesh)
    }

    fn recv_mesh(&self, peer: usize, tag: u16) -> Result<UnstructuredMesh, MeshError> {
        recv_serialized(&self.0, peer, tag)
    }
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (usize, usize, u16); // (src, dst, tag)

enum Envelope {
    Bytes(Bytes),
    Mesh(Box<UnstructuredMesh>),
}

/// FIFO queues per (src, dst, tag), shared by every rank of one world.
/// Drained queues are dropped.
#[derive(Default)]
struct Mailbox {
    slots: Mutex<HashMap<Key, VecDeque<Envelope>>>,
    ready: Condvar,
}

impl Mailbox {
    fn post(&self, key: Key, env: Envelope) {
        let mut slots = self.slots.lock();
        slots.entry(key).or_default().push_back(env);
        self.ready.notify_all();
    }

    fn take(&self, key: Key) -> Envelope {
        let mut slots = self.slots.lock();
        loop {
            if let Some(queue) = slots.get_mut(&key) {
                if let Some(env) = queue.pop_front() {
                    if queue.is_empty() {
                        slots.remove(&key);
                    }
                    return env;
                }
            }
            self.ready.wait(&mut slots);
        }
    }

    #[cfg(test)]
    fn pending_queues(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Deferred receive: blocks in `wait` until the matching message arrives.
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        match self.mailbox.take(self.key) {
            Envelope::Bytes(b) => Some(b.to_vec()),
            Envelope::Mesh(_) => None,
        }
    }
}

/// In-process ranks exchanging messages through a shared mailbox.
///
/// Every rank of a world is a clone-free handle onto the same `Arc`'d
/// mailbox; run each rank on its own thread.
#[derive(Clone)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for RayonComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl RayonComm {
    /// Create `size` connected ranks, indexed by rank.
    pub fn world(size: usize) -> Vec<Self> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        self.mailbox
            .post(key, Envelope::Bytes(Bytes::copy_from_slice(buf)));
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

impl MeshTransport for RayonComm {
    fn send_mesh(&self, peer: usize, tag: u16, mesh: UnstructuredMesh) -> Result<(), MeshError> {
        self.mailbox
            .post((self.rank, peer, tag), Envelope::Mesh(Box::new(mesh)));
        Ok(())
    }

    fn recv_mesh(&self, peer: usize, tag: u16) -> Result<UnstructuredMesh, MeshError> {
        match self.mailbox.take((peer, self.rank, tag)) {
            Envelope::Mesh(mesh) => Ok(*mesh),
            Envelope::Bytes(b) => Err(MeshError::comm(
                peer,
                format!("expected a mesh on tag {tag}, got {} raw bytes", b.len()),
            )),
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use std::rc::Rc;

    pub struct MpiComm {
        world: Rc<SimpleCommunicator>,
        rank: usize,
        size: usize,
        _universe: Rc<Universe>,
    }

    impl MpiComm {
        /// Initialize MPI and wrap `MPI_COMM_WORLD`.
        pub fn new() -> Result<Self, MeshError> {
            let universe = mpi::initialize()
                .ok_or_else(|| MeshError::Config("MPI was already initialized".into()))?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world: Rc::new(world),
                rank,
                size,
                _universe: Rc::new(universe),
            })
        }
    }

    /// Pending `MPI_Isend`; the payload stays alive until `wait`.
    pub struct MpiSendHandle(Box<dyn FnOnce()>);

    impl Wait for MpiSendHandle {
        fn wait(self) -> Option<Vec<u8>> {
            (self.0)();
            None
        }
    }

    /// Deferred matching receive, performed on `wait`.
    pub struct MpiRecvHandle {
        world: Rc<SimpleCommunicator>,
        peer: i32,
        tag: i32,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (data, _status) = self
                .world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let raw: *mut [u8] = Box::into_raw(buf.to_vec().into_boxed_slice());
            // SAFETY: `raw` is reclaimed only after the request completes.
            let payload: &'static [u8] = unsafe { &*raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, payload, tag as i32);
            MpiSendHandle(Box::new(move || {
                req.wait();
                // SAFETY: the send completed, nothing else references `raw`.
                drop(unsafe { Box::from_raw(raw) });
            }))
        }

        fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> MpiRecvHandle {
            MpiRecvHandle {
                world: Rc::clone(&self.world),
                peer: peer as i32,
                tag: tag as i32,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }
    }

    impl MeshTransport for MpiComm {
        fn send_mesh(
            &self,
            peer: usize,
            tag: u16,
            mesh: UnstructuredMesh,
        ) -> Result<(), MeshError> {
            send_serialized(self, peer, tag, &mesh)
        }

        fn recv_mesh(&self, peer: usize, tag: u16) -> Result<UnstructuredMesh, MeshError> {
            recv_serialized(self, peer, tag)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rayon_roundtrip_two_ranks() {
        let world = RayonComm::world(2);
        let (comm0, comm1) = (&world[0], &world[1]);

        let mut recv_buf = [0u8; 4];
        let recv_handle = comm1.irecv(0, 7, &mut recv_buf);
        let send_handle = comm0.isend(1, 7, &[1, 2, 3, 4]);
        send_handle.wait();

        wait_exact(recv_handle, &mut recv_buf, 0).unwrap();
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let world = RayonComm::world(2);
        world[0].send(1, 3, &[1, 2, 3]);
        let mut buf = [0u8; 2];
        match world[1].recv_exact(0, 3, &mut buf) {
            Err(MeshError::CommError { neighbor, .. }) => assert_eq!(neighbor, 0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn worlds_do_not_share_mailboxes() {
        let a = RayonComm::world(2);
        let b = RayonComm::world(2);
        a[0].send(1, 1, &[9]);
        b[0].send(1, 1, &[5]);
        let mut buf = [0u8; 1];
        b[1].recv_exact(0, 1, &mut buf).unwrap();
        assert_eq!(buf, [5]);
        a[1].recv_exact(0, 1, &mut buf).unwrap();
        assert_eq!(buf, [9]);
    }

    #[test]
    fn mesh_moves_through_mailbox() {
        let world = RayonComm::world(2);
        let mut m = UnstructuredMesh::new();
        m.add_point([1.0, 2.0, 3.0]);
        world[1].send_mesh(0, 11, m.clone()).unwrap();
        assert_eq!(world[0].recv_mesh(1, 11).unwrap(), m);
    }

    #[test]
    fn serialized_adapter_roundtrip() {
        let world: Vec<_> = RayonComm::world(2).into_iter().map(Serialized).collect();
        let mut m = UnstructuredMesh::new();
        m.add_point([0.5, 0.0, 0.0]);
        world[0].send_mesh(1, 2, m.clone()).unwrap();
        assert_eq!(world[1].recv_mesh(0, 2).unwrap(), m);
        assert!(!world[0].native_collectives());
    }

    #[test]
    fn drained_queues_are_released() {
        let world = RayonComm::world(2);
        for tag in 0..16 {
            world[0].send(1, tag, &[tag as u8; 4]);
        }
        world[0].send(1, 3, &[9; 4]);
        assert_eq!(world[0].mailbox.pending_queues(), 16);
        let mut buf = [0u8; 4];
        for tag in 0..16 {
            world[1].recv_exact(0, tag, &mut buf).unwrap();
            assert_eq!(buf, [tag as u8; 4]);
        }
        assert_eq!(world[0].mailbox.pending_queues(), 1);
        world[1].recv_exact(0, 3, &mut buf).unwrap();
        assert_eq!(buf, [9; 4]);
        assert_eq!(world[0].mailbox.pending_queues(), 0);
    }

    #[test]
    fn commtag_offset_wraps() {
        let t = CommTag::new(u16::MAX);
        assert_eq!(t.offset(2).as_u16(), 1);
    }
}
