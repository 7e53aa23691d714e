//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable** but non-blocking: the exchange stages call
//! `.wait()` before they trust that a buffer is ready, and always drain every
//! handle they posted.

use std::collections::VecDeque;
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// This process's rank in the group.
    fn rank(&self) -> usize;
    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Block until every rank in the group reaches this call.
    fn barrier(&self) {}

    fn is_no_comm(&self) -> bool {
        false
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

/// Typed communication tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        CommTag(tag)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    pub const fn base(self) -> u16 {
        self.0
    }

    /// Derived tag `offset` steps above this one (wrapping).
    pub const fn offset(self, offset: u16) -> CommTag {
        CommTag(self.0.wrapping_add(offset))
    }
}

/// Tags used by one message manager's round exchange and collectives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RoundTags {
    pub sizes: CommTag,
    pub data: CommTag,
    pub gather: CommTag,
    pub bcast: CommTag,
}

impl RoundTags {
    pub const fn from_base(base: CommTag) -> Self {
        RoundTags {
            sizes: base,
            data: base.offset(1),
            gather: base.offset(2),
            bcast: base.offset(3),
        }
    }
}

impl Default for RoundTags {
    fn default() -> Self {
        RoundTags::from_base(CommTag::new(0xBE00))
    }
}

/// Compile-time no-op comm for single-fragment runs and serial unit tests.
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

    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- LocalComm: one fragment per thread inside a single process ---
type Key = (usize, usize, u16); // (src, dst, tag)

struct LocalHub {
    size: usize,
    mailbox: DashMap<Key, VecDeque<Bytes>>,
    lock: Mutex<()>,
    arrived: Condvar,
    barrier: Barrier,
    timeout: Option<Duration>,
}

/// In-process communicator; every member of a group shares one mailbox.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    hub: Arc<LocalHub>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.hub.size)
            .finish()
    }
}

impl LocalComm {
    /// Communicators for ranks `0..size`, blocking indefinitely on receives.
    pub fn group(size: usize) -> Vec<LocalComm> {
        Self::build_group(size, None)
    }

    /// Like [`group`](Self::group), but a receive gives up after `timeout`
    /// and its handle yields `None`.
    pub fn group_with_timeout(size: usize, timeout: Duration) -> Vec<LocalComm> {
        Self::build_group(size, Some(timeout))
    }

    fn build_group(size: usize, timeout: Option<Duration>) -> Vec<LocalComm> {
        let size = size.max(1);
        let hub = Arc::new(LocalHub {
            size,
            mailbox: DashMap::new(),
            lock: Mutex::new(()),
            arrived: Condvar::new(),
            barrier: Barrier::new(size),
            timeout,
        });
        (0..size)
            .map(|rank| LocalComm {
                rank,
                hub: Arc::clone(&hub),
            })
            .collect()
    }

    /// Messages posted but not yet received, across the whole group.
    pub fn pending_messages(&self) -> usize {
        self.hub.mailbox.iter().map(|e| e.value().len()).sum()
    }
}

/// Receive handle for [`LocalComm`].
pub struct LocalRecv {
    hub: Arc<LocalHub>,
    key: Key,
    len: usize,
}

impl LocalRecv {
    fn try_take(&self) -> Option<Bytes> {
        self.hub
            .mailbox
            .get_mut(&self.key)
            .and_then(|mut queue| queue.pop_front())
    }
}

impl Wait for LocalRecv {
    fn wait(self) -> Option<Vec<u8>> {
        let deadline = self.hub.timeout.map(|t| Instant::now() + t);
        let mut guard = self.hub.lock.lock();
        loop {
            if let Some(bytes) = self.try_take() {
                let n = bytes.len().min(self.len);
                return Some(bytes[..n].to_vec());
            }
            match deadline {
                Some(deadline) => {
                    if self.hub.arrived.wait_until(&mut guard, deadline).timed_out() {
                        return self.try_take().map(|b| b[..b.len().min(self.len)].to_vec());
                    }
                }
                None => self.hub.arrived.wait(&mut guard),
            }
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalRecv;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        let data = Bytes::copy_from_slice(buf);
        // publish under the lock so a waiting receiver cannot miss the wake-up
        let _guard = self.hub.lock.lock();
        self.hub.mailbox.entry(key).or_default().push_back(data);
        self.hub.arrived.notify_all();
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalRecv {
            hub: Arc::clone(&self.hub),
            key: (peer, self.rank, tag),
            len: buf.len(),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.hub.size
    }

    fn barrier(&self) {
        self.hub.barrier.wait();
    }
}

static_assertions::assert_impl_all!(LocalComm: Send, Sync, Clone);
static_assertions::assert_impl_all!(NoComm: Send, Sync);

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use mpi::Threading;

    /// Communicator over `MPI_COMM_WORLD`.
    pub struct MpiComm {
        universe: Arc<Universe>,
        pub world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    // SAFETY: MPI is initialized with `Threading::Multiple`, so the world
    // communicator handle may be used from any thread.
    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl MpiComm {
        pub fn new() -> Option<Self> {
            let (universe, _level) = mpi::initialize_with_threading(Threading::Multiple)?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(MpiComm {
                universe: Arc::new(universe),
                world,
                rank,
                size,
            })
        }
    }

    pub struct MpiSend {
        complete: Option<Box<dyn FnOnce()>>,
        // keeps the send buffer alive until the request completes
        _data: Box<[u8]>,
    }

    impl Wait for MpiSend {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(complete) = self.complete.take() {
                complete();
            }
            None
        }
    }

    pub struct MpiRecv {
        universe: Arc<Universe>,
        peer: i32,
        tag: i32,
        len: usize,
    }

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            let world = self.universe.world();
            let (mut data, _status) = world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            data.truncate(self.len);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSend;
        type RecvHandle = MpiRecv;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSend {
            let data: Box<[u8]> = buf.into();
            // SAFETY: `data` lives in the returned handle, which outlives the
            // request because `wait` completes the request before dropping it.
            let view: &'static [u8] = unsafe { std::slice::from_raw_parts(data.as_ptr(), data.len()) };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(mpi::request::StaticScope, view, tag as i32);
            MpiSend {
                complete: Some(Box::new(move || {
                    req.wait();
                })),
                _data: data,
            }
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecv {
            MpiRecv {
                universe: Arc::clone(&self.universe),
                peer: peer as i32,
                tag: tag as i32,
                len: buf.len(),
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
