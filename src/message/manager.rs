//! Round-scoped message buffering between fragments.
//!
//! The manager owns the communicator. During a round, registered sync
//! buffers accumulate updated vertices and the app may queue manual
//! messages. [`finish_a_round`](MessageManager::finish_a_round) turns both
//! into one payload per destination fragment, runs the all-to-all exchange,
//! merges incoming values into the registered buffers and queues incoming
//! manual messages for the next round. [`to_terminate`](MessageManager::to_terminate)
//! is the collective vote that ends the BSP loop.

use std::collections::{BTreeMap, VecDeque};
use std::mem::size_of;
use std::sync::Arc;

use bytemuck::Pod;
use bytes::{BufMut, Bytes, BytesMut};

use crate::bsp_error::BspError;
use crate::comm::collective;
use crate::comm::communicator::{Communicator, RoundTags};
use crate::comm::exchange::exchange_payloads;
use crate::comm::wire::{
    KIND_AUTO, KIND_FRAGMENT, KIND_VERTEX, SectionWriter, WireGid, WireVote, cast_slice,
    expect_exact_len, read_pod, read_sections,
};
use crate::data::sync_buffer::SyncBuffer;
use crate::fragment::vertex::{Fid, Vertex};
use crate::fragment::Fragment;
use crate::message::auto_sync::Registration;
use crate::message::strategy::MessageStrategy;

const GID_LEN: usize = size_of::<WireGid>();

/// Per-round traffic counters for one fragment.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RoundStats {
    pub round: u32,
    /// Records this fragment queued for delivery (itself included).
    pub sent: u64,
    /// Records delivered to this fragment.
    pub received: u64,
    /// Incoming sync-buffer values that changed a local value.
    pub merged: u64,
}

/// Why the last [`to_terminate`](MessageManager::to_terminate) vote ended the loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// No fragment sent anything and none asked to continue.
    Quiescent,
    /// At least `votes` fragments called `force_terminate`.
    Forced { votes: u64, reason: Option<String> },
}

pub struct MessageManager<F: Fragment, C: Communicator> {
    frag: Arc<F>,
    comm: C,
    tags: RoundTags,
    registrations: Vec<Registration>,
    /// destination fid -> (kind, record_len) -> records
    pending: Vec<BTreeMap<(u16, usize), BytesMut>>,
    vertex_in: VecDeque<(usize, Bytes)>,
    fragment_in: VecDeque<(Fid, usize, Bytes)>,
    round: u32,
    stats: RoundStats,
    total_sent: u64,
    force_continue: bool,
    force_terminate: Option<String>,
    termination: Option<Termination>,
}

impl<F: Fragment, C: Communicator> MessageManager<F, C> {
    /// Manager for `frag` over `comm`; the communicator's rank must be the fragment id.
    pub fn new(frag: Arc<F>, comm: C) -> Result<Self, BspError> {
        if comm.size() != frag.fnum() || comm.rank() != frag.fid() {
            return Err(BspError::InconsistentApp {
                reason: format!(
                    "communicator rank {} of {} does not match fragment {} of {}",
                    comm.rank(),
                    comm.size(),
                    frag.fid(),
                    frag.fnum()
                ),
            });
        }
        let fnum = frag.fnum();
        Ok(MessageManager {
            frag,
            comm,
            tags: RoundTags::default(),
            registrations: Vec::new(),
            pending: vec![BTreeMap::new(); fnum],
            vertex_in: VecDeque::new(),
            fragment_in: VecDeque::new(),
            round: 0,
            stats: RoundStats::default(),
            total_sent: 0,
            force_continue: false,
            force_terminate: None,
            termination: None,
        })
    }

    pub fn with_tags(mut self, tags: RoundTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn fragment(&self) -> &Arc<F> {
        &self.frag
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn fid(&self) -> Fid {
        self.frag.fid()
    }

    pub fn fnum(&self) -> usize {
        self.frag.fnum()
    }

    /// Current superstep; 0 during `PEval`.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Counters of the last finished round.
    pub fn last_round_stats(&self) -> RoundStats {
        self.stats
    }

    /// Records sent since [`start`](Self::start).
    pub fn messages_sent(&self) -> u64 {
        self.total_sent
    }

    pub fn registered_buffers(&self) -> usize {
        self.registrations.len()
    }

    /// Outcome of the last vote, once it ended the loop.
    pub fn termination_info(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    // ----- lifecycle -----

    /// Register `buffer` for automatic synchronization under `strategy`.
    ///
    /// The buffer must cover every local vertex. Registration order must be
    /// the same on every fragment.
    pub fn register_sync_buffer<T>(
        &mut self,
        buffer: &SyncBuffer<T>,
        strategy: MessageStrategy,
    ) -> Result<(), BspError>
    where
        T: Pod + Send + Sync,
    {
        if buffer.range() != self.frag.vertices() {
            return Err(BspError::InconsistentApp {
                reason: format!(
                    "sync buffer covers {:?} but the fragment's vertices are {:?}",
                    buffer.range(),
                    self.frag.vertices()
                ),
            });
        }
        self.frag.prepare_to_run_app(strategy, false)?;
        self.registrations.push(Registration {
            handle: buffer.downgrade(),
            strategy,
            value_size: size_of::<T>(),
        });
        Ok(())
    }

    /// Reset round state before the first superstep of a query.
    pub fn start(&mut self) {
        self.round = 0;
        self.total_sent = 0;
        self.stats = RoundStats::default();
        self.termination = None;
        self.clear_round_buffers();
    }

    pub fn start_a_round(&mut self) {
        self.force_continue = false;
        self.force_terminate = None;
    }

    /// Flush, exchange and merge. Incoming manual messages from the previous
    /// round that were not consumed are discarded.
    pub fn finish_a_round(&mut self) -> Result<RoundStats, BspError> {
        let fnum = self.fnum();
        let me = self.fid();
        let mut writers: Vec<SectionWriter> = (0..fnum).map(|_| SectionWriter::new()).collect();
        let mut sent = self.flush_auto(&mut writers);

        for (fid, sections) in self.pending.iter_mut().enumerate() {
            for ((kind, record_len), records) in std::mem::take(sections) {
                sent += (records.len() / record_len.max(1)) as u64;
                writers[fid].push_section(kind, 0, record_len, &records);
            }
        }

        let outgoing: Vec<Bytes> = writers.into_iter().map(SectionWriter::freeze).collect();
        let mut incoming = exchange_payloads(&self.comm, &self.tags, &outgoing)?;
        incoming[me] = outgoing[me].clone();

        self.vertex_in.clear();
        self.fragment_in.clear();
        let mut received = 0u64;
        let mut merged = 0u64;
        for (src, payload) in incoming.into_iter().enumerate() {
            if payload.is_empty() {
                continue;
            }
            let (r, m) = self.absorb(src, payload)?;
            received += r;
            merged += m;
        }

        self.stats = RoundStats {
            round: self.round,
            sent,
            received,
            merged,
        };
        self.total_sent += sent;
        log::trace!(
            "[frag {}] round {}: sent {}, received {}, merged {}",
            me,
            self.round,
            sent,
            received,
            merged
        );
        self.round += 1;
        Ok(self.stats)
    }

    /// Collective vote. Terminates iff some fragment forced termination, or
    /// no fragment sent anything in the round just finished and none forced
    /// continuation.
    pub fn to_terminate(&mut self) -> Result<bool, BspError> {
        let mine = WireVote::new(
            self.stats.sent,
            self.force_continue,
            self.force_terminate.is_some(),
        );
        let all = collective::all_reduce(&self.comm, &self.tags, mine, WireVote::sum)?;
        let done = if all.force_terminate() > 0 {
            self.termination = Some(Termination::Forced {
                votes: all.force_terminate(),
                reason: self.force_terminate.clone(),
            });
            true
        } else if all.sent() == 0 && all.force_continue() == 0 {
            self.termination = Some(Termination::Quiescent);
            true
        } else {
            false
        };
        Ok(done)
    }

    /// Release round buffers and registrations; the manager can run another query.
    pub fn finalize(&mut self) {
        self.registrations.clear();
        self.clear_round_buffers();
    }

    pub fn barrier(&self) {
        self.comm.barrier();
    }

    fn clear_round_buffers(&mut self) {
        for p in &mut self.pending {
            p.clear();
        }
        self.vertex_in.clear();
        self.fragment_in.clear();
        self.force_continue = false;
        self.force_terminate = None;
    }

    fn flush_auto(&mut self, writers: &mut [SectionWriter]) -> u64 {
        let frag = &self.frag;
        let mut sent = 0u64;
        for (slot, reg) in self.registrations.iter().enumerate() {
            let Some(handle) = reg.handle.upgrade() else {
                log::warn!("[frag {}] sync buffer in slot {slot} was dropped", frag.fid());
                continue;
            };
            let mut per_peer: Vec<BytesMut> = vec![BytesMut::new(); writers.len()];
            handle.drain_updated(&mut |v, value| {
                let gid = WireGid::of(frag.get_gid(v));
                let mut put = |fid: Fid| {
                    per_peer[fid].put_slice(cast_slice(std::slice::from_ref(&gid)));
                    per_peer[fid].put_slice(value);
                    sent += 1;
                };
                if frag.is_inner_vertex(v) {
                    for &fid in frag.mirror_fragments(v, reg.strategy) {
                        put(fid);
                    }
                } else if reg.strategy.ghost_reports_to_owner() {
                    put(frag.owner_of(v));
                }
            });
            let record_len = GID_LEN + reg.value_size;
            for (fid, records) in per_peer.into_iter().enumerate() {
                writers[fid].push_section(KIND_AUTO, slot as u32, record_len, &records);
            }
        }
        sent
    }

    /// Decode one peer's payload; returns `(records received, values merged)`.
    fn absorb(&mut self, src: Fid, payload: Bytes) -> Result<(u64, u64), BspError> {
        let mut received = 0u64;
        let mut merged = 0u64;
        for section in read_sections(payload)? {
            received += section.count() as u64;
            match section.kind {
                KIND_AUTO => {
                    let slot = section.slot as usize;
                    let reg = self.registrations.get(slot).ok_or_else(|| {
                        BspError::WireError(format!("no sync buffer registered in slot {slot}"))
                    })?;
                    if section.record_len != GID_LEN + reg.value_size {
                        return Err(BspError::WireError(format!(
                            "slot {slot} carries {}-byte records, expected {}",
                            section.record_len,
                            GID_LEN + reg.value_size
                        )));
                    }
                    let Some(handle) = reg.handle.upgrade() else {
                        continue;
                    };
                    let mut records = Vec::with_capacity(section.count());
                    for rec in section.iter() {
                        let v = self.resolve(rec)?;
                        records.push((v, &rec[GID_LEN..]));
                    }
                    merged += handle.merge_raw(&records)? as u64;
                }
                KIND_VERTEX => {
                    if section.record_len < GID_LEN {
                        return Err(BspError::WireError(format!(
                            "vertex message of {} bytes has no gid",
                            section.record_len
                        )));
                    }
                    self.vertex_in.push_back((section.record_len, section.records));
                }
                KIND_FRAGMENT => {
                    self.fragment_in
                        .push_back((src, section.record_len, section.records));
                }
                other => {
                    return Err(BspError::WireError(format!("unknown section kind {other}")));
                }
            }
        }
        Ok((received, merged))
    }

    fn resolve(&self, record: &[u8]) -> Result<Vertex, BspError> {
        let gid = read_pod::<WireGid>(record)?.get();
        self.frag.gid_to_vertex(gid).ok_or(BspError::UnknownVertex {
            fid: self.frag.fid(),
            gid,
        })
    }

    // ----- manual messaging -----

    fn queue(&mut self, fid: Fid, kind: u16, record: &[&[u8]]) {
        let record_len: usize = record.iter().map(|p| p.len()).sum();
        let buf = self.pending[fid].entry((kind, record_len)).or_default();
        for part in record {
            buf.put_slice(part);
        }
    }

    fn queue_vertex<T: Pod>(&mut self, fid: Fid, v: Vertex, msg: &T) {
        let gid = WireGid::of(self.frag.get_gid(v));
        self.queue(
            fid,
            KIND_VERTEX,
            &[cast_slice(std::slice::from_ref(&gid)), bytemuck::bytes_of(msg)],
        );
    }

    /// Fragment-addressed message; read with [`get_fragment_message`](Self::get_fragment_message).
    ///
    /// Zero-sized messages are rejected: a record with no bytes cannot be
    /// counted on the wire.
    pub fn send_to_fragment<T: Pod>(&mut self, fid: Fid, msg: T) -> Result<(), BspError> {
        if fid >= self.fnum() {
            return Err(BspError::InvalidFragmentId {
                fid,
                fnum: self.fnum(),
            });
        }
        if size_of::<T>() == 0 {
            return Err(BspError::WireError(format!(
                "fragment message type {} has no bytes to send",
                std::any::type_name::<T>()
            )));
        }
        self.queue(fid, KIND_FRAGMENT, &[bytemuck::bytes_of(&msg)]);
        Ok(())
    }

    /// Send `msg` about outer vertex `v` to its owner.
    pub fn sync_state_on_outer_vertex<T: Pod>(&mut self, v: Vertex, msg: T) -> Result<(), BspError> {
        if !self.frag.is_outer_vertex(v) {
            return Err(BspError::NotOuterVertex(v.index()));
        }
        let owner = self.frag.owner_of(v);
        self.queue_vertex(owner, v, &msg);
        Ok(())
    }

    fn send_along<T: Pod>(&mut self, v: Vertex, msg: T, strategy: MessageStrategy) -> Result<(), BspError> {
        if !self.frag.is_inner_vertex(v) {
            return Err(BspError::NotInnerVertex(v.index()));
        }
        if !strategy.supported_by(self.frag.load_strategy()) {
            return Err(BspError::InconsistentApp {
                reason: format!(
                    "{strategy:?} needs edges a {:?} fragment does not keep",
                    self.frag.load_strategy()
                ),
            });
        }
        let frag = Arc::clone(&self.frag);
        for &fid in frag.mirror_fragments(v, strategy) {
            self.queue_vertex(fid, v, &msg);
        }
        Ok(())
    }

    /// Send `msg` about inner vertex `v` to every fragment holding one of its
    /// outgoing neighbors.
    pub fn send_msg_through_oedges<T: Pod>(&mut self, v: Vertex, msg: T) -> Result<(), BspError> {
        self.send_along(v, msg, MessageStrategy::AlongOutgoingEdgeToOuterVertex)
    }

    /// Same as [`send_msg_through_oedges`](Self::send_msg_through_oedges) for incoming neighbors.
    pub fn send_msg_through_iedges<T: Pod>(&mut self, v: Vertex, msg: T) -> Result<(), BspError> {
        self.send_along(v, msg, MessageStrategy::AlongIncomingEdgeToOuterVertex)
    }

    pub fn send_msg_through_edges<T: Pod>(&mut self, v: Vertex, msg: T) -> Result<(), BspError> {
        self.send_along(v, msg, MessageStrategy::AlongEdgeToOuterVertex)
    }

    /// Next vertex-addressed message received in the last exchange.
    pub fn get_message<T: Pod>(&mut self) -> Result<Option<(Vertex, T)>, BspError> {
        let expected = GID_LEN + size_of::<T>();
        loop {
            let Some((record_len, records)) = self.vertex_in.front_mut() else {
                return Ok(None);
            };
            if records.is_empty() {
                self.vertex_in.pop_front();
                continue;
            }
            expect_exact_len(*record_len, expected)?;
            let rec = records.split_to(expected);
            let v = self.resolve(&rec)?;
            let msg = read_pod::<T>(&rec[GID_LEN..])?;
            return Ok(Some((v, msg)));
        }
    }

    /// Next fragment-addressed message as `(source fid, message)`.
    pub fn get_fragment_message<T: Pod>(&mut self) -> Result<Option<(Fid, T)>, BspError> {
        loop {
            let Some((src, record_len, records)) = self.fragment_in.front_mut() else {
                return Ok(None);
            };
            if records.is_empty() {
                self.fragment_in.pop_front();
                continue;
            }
            expect_exact_len(*record_len, size_of::<T>())?;
            let src = *src;
            let rec = records.split_to(size_of::<T>());
            return Ok(Some((src, read_pod::<T>(&rec)?)));
        }
    }

    // ----- votes and collectives -----

    /// Keep the loop running after this round even if nothing was sent.
    pub fn force_continue(&mut self) {
        self.force_continue = true;
    }

    /// End the loop after this round on every fragment.
    pub fn force_terminate(&mut self, reason: impl Into<String>) {
        self.force_terminate = Some(reason.into());
    }

    pub fn all_reduce_sum<T>(&self, value: T) -> Result<T, BspError>
    where
        T: Pod + std::ops::Add<Output = T>,
    {
        collective::all_reduce_sum(&self.comm, &self.tags, value)
    }

    pub fn all_reduce_min<T: Pod + PartialOrd>(&self, value: T) -> Result<T, BspError> {
        collective::all_reduce_min(&self.comm, &self.tags, value)
    }

    pub fn all_reduce_max<T: Pod + PartialOrd>(&self, value: T) -> Result<T, BspError> {
        collective::all_reduce_max(&self.comm, &self.tags, value)
    }

    pub fn all_gather<T: Pod>(&self, value: T) -> Result<Vec<T>, BspError> {
        collective::all_gather(&self.comm, &self.tags, value)
    }
}
