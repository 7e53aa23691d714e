//! `SyncBuffer`: per-vertex values kept consistent across fragments.
//!
//! A sync buffer covers every local vertex (`[inner | outer]`). Values are
//! changed in one of two ways:
//!
//! - [`set_value`](SyncBuffer::set_value) writes locally and schedules nothing.
//! - [`assign`](SyncBuffer::assign) and [`aggregate`](SyncBuffer::aggregate)
//!   mark the vertex *updated* when the stored value changes. Once the buffer
//!   is registered with a message manager, every updated vertex is sent to
//!   the fragments holding a copy at the end of the round and the flag is
//!   cleared.
//!
//! Incoming values are folded in with the buffer's merge operator. A change
//! marks the vertex updated again, so it propagates in the *next* round and
//! shows up in [`updated_vertices`](SyncBuffer::updated_vertices) during the
//! following `IncEval`.
//!
//! The buffer is owned by the context that created it; the message manager
//! only keeps a weak handle.

use std::mem::size_of;
use std::sync::{Arc, Weak};

use bytemuck::Pod;
use hashbrown::HashMap;
use hashbrown::hash_map::Entry;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use rayon::prelude::*;

use crate::bsp_error::BspError;
use crate::data::aggregate::Aggregator;
use crate::data::vertex_array::VertexArray;
use crate::debug_invariants::DebugInvariants;
use crate::fragment::vertex::{Vertex, VertexRange};
use crate::message::auto_sync::AutoSync;
use crate::parallel::ParallelEngine;

pub(crate) struct SyncState<T> {
    values: VertexArray<T>,
    updated: VertexArray<bool>,
    updated_num: usize,
    merge: Arc<dyn Aggregator<T>>,
}

impl<T: Pod> SyncState<T> {
    #[inline]
    fn mark(&mut self, v: Vertex) {
        let flag = &mut self.updated[v];
        if !*flag {
            *flag = true;
            self.updated_num += 1;
        }
    }

    #[inline]
    fn aggregate(&mut self, v: Vertex, incoming: T) -> bool {
        let changed = self.merge.merge(&mut self.values[v], incoming);
        if changed {
            self.mark(v);
        }
        changed
    }

    fn clear_updated(&mut self) {
        self.updated.fill(false);
        self.updated_num = 0;
    }
}

/// Per-vertex values with a merge operator and update tracking.
pub struct SyncBuffer<T: Pod> {
    state: Arc<RwLock<SyncState<T>>>,
}

impl<T: Pod> Clone for SyncBuffer<T> {
    /// Clones share storage.
    fn clone(&self) -> Self {
        SyncBuffer {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Pod + std::fmt::Debug> std::fmt::Debug for SyncBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.state.read();
        f.debug_struct("SyncBuffer")
            .field("range", &s.values.range())
            .field("updated", &s.updated_num)
            .finish()
    }
}

impl<T> SyncBuffer<T>
where
    T: Pod + Send + Sync,
{
    /// Buffer over `range`, every value set to `sentinel`.
    pub fn new<A: Aggregator<T>>(range: VertexRange, sentinel: T, merge: A) -> Self {
        SyncBuffer {
            state: Arc::new(RwLock::new(SyncState {
                values: VertexArray::new(range, sentinel),
                updated: VertexArray::new(range, false),
                updated_num: 0,
                merge: Arc::new(merge),
            })),
        }
    }

    /// Re-initialize in place, keeping any registration alive.
    pub fn init<A: Aggregator<T>>(&self, range: VertexRange, sentinel: T, merge: A) {
        let mut s = self.state.write();
        s.values.init(range, sentinel);
        s.updated.init(range, false);
        s.updated_num = 0;
        s.merge = Arc::new(merge);
    }

    pub fn range(&self) -> VertexRange {
        self.state.read().values.range()
    }

    pub fn len(&self) -> usize {
        self.state.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Panics
    /// If `v` is outside the buffer's range.
    #[inline]
    pub fn get_value(&self, v: Vertex) -> T {
        self.state.read().values[v]
    }

    pub fn try_get_value(&self, v: Vertex) -> Result<T, BspError> {
        self.state.read().values.try_get(v).copied()
    }

    /// Local write; nothing is scheduled for propagation.
    #[inline]
    pub fn set_value(&self, v: Vertex, value: T) {
        self.state.write().values[v] = value;
    }

    /// Overwrite and mark updated if the bytes differ.
    pub fn assign(&self, v: Vertex, value: T) -> bool {
        let mut s = self.state.write();
        let cur = &mut s.values[v];
        if bytemuck::bytes_of(cur) == bytemuck::bytes_of(&value) {
            return false;
        }
        *cur = value;
        s.mark(v);
        true
    }

    /// Merge `value` in; marks updated iff the merge changed the value.
    #[inline]
    pub fn aggregate(&self, v: Vertex, value: T) -> bool {
        self.state.write().aggregate(v, value)
    }

    /// Merge many values under one lock; returns how many vertices changed.
    pub fn aggregate_all<I>(&self, updates: I) -> usize
    where
        I: IntoIterator<Item = (Vertex, T)>,
    {
        let mut s = self.state.write();
        updates
            .into_iter()
            .filter(|&(v, x)| s.aggregate(v, x))
            .count()
    }

    /// Fold `updates` on the engine's threads, then apply the folded values
    /// serially. The result equals [`aggregate_all`](Self::aggregate_all).
    pub fn par_aggregate(&self, engine: &ParallelEngine, updates: Vec<(Vertex, T)>) -> usize {
        let merge = Arc::clone(&self.state.read().merge);
        let folded = engine.install(|| {
            updates
                .into_par_iter()
                .fold(HashMap::new, |mut acc: HashMap<Vertex, T>, (v, x)| {
                    match acc.entry(v) {
                        Entry::Occupied(mut e) => {
                            merge.merge(e.get_mut(), x);
                        }
                        Entry::Vacant(e) => {
                            e.insert(x);
                        }
                    }
                    acc
                })
                .reduce(HashMap::new, |mut a, b| {
                    for (v, x) in b {
                        match a.entry(v) {
                            Entry::Occupied(mut e) => {
                                merge.merge(e.get_mut(), x);
                            }
                            Entry::Vacant(e) => {
                                e.insert(x);
                            }
                        }
                    }
                    a
                })
        });
        let changed = self.aggregate_all(folded);
        self.debug_assert_invariants();
        changed
    }

    pub fn is_updated(&self, v: Vertex) -> bool {
        self.state.read().updated[v]
    }

    /// Mark `v` for propagation without changing its value.
    pub fn set_updated(&self, v: Vertex) {
        self.state.write().mark(v);
    }

    pub fn reset_updated(&self, v: Vertex) {
        let mut s = self.state.write();
        if std::mem::take(&mut s.updated[v]) {
            s.updated_num -= 1;
        }
    }

    pub fn clear_updated(&self) {
        self.state.write().clear_updated();
    }

    pub fn updated_count(&self) -> usize {
        self.state.read().updated_num
    }

    /// Vertices currently marked updated, in index order.
    pub fn updated_vertices(&self) -> Vec<Vertex> {
        let s = self.state.read();
        s.updated
            .iter()
            .filter(|&(_, &flag)| flag)
            .map(|(v, _)| v)
            .collect()
    }

    /// Read-only view of every value, in index order.
    pub fn values(&self) -> MappedRwLockReadGuard<'_, [T]> {
        RwLockReadGuard::map(self.state.read(), |s| s.values.as_slice())
    }

    pub fn snapshot(&self) -> VertexArray<T> {
        self.state.read().values.clone()
    }

    pub(crate) fn downgrade(&self) -> Weak<dyn AutoSync>
    where
        T: 'static,
    {
        let weak: Weak<RwLock<SyncState<T>>> = Arc::downgrade(&self.state);
        weak
    }
}

impl<T> AutoSync for RwLock<SyncState<T>>
where
    T: Pod + Send + Sync,
{
    fn value_size(&self) -> usize {
        size_of::<T>()
    }

    fn range(&self) -> VertexRange {
        self.read().values.range()
    }

    fn drain_updated(&self, visit: &mut dyn FnMut(Vertex, &[u8])) -> usize {
        let mut s = self.write();
        if s.updated_num == 0 {
            return 0;
        }
        let mut n = 0;
        for (v, &flag) in s.updated.iter() {
            if flag {
                visit(v, bytemuck::bytes_of(&s.values[v]));
                n += 1;
            }
        }
        s.clear_updated();
        n
    }

    fn merge_raw(&self, records: &[(Vertex, &[u8])]) -> Result<usize, BspError> {
        let mut s = self.write();
        let len = s.values.len();
        let mut changed = 0;
        for &(v, bytes) in records {
            if bytes.len() != size_of::<T>() {
                return Err(BspError::WireError(format!(
                    "value of {} bytes for a buffer of {}-byte values",
                    bytes.len(),
                    size_of::<T>()
                )));
            }
            if !s.values.range().contains(v) {
                return Err(BspError::VertexOutOfRange {
                    index: v.index(),
                    len,
                });
            }
            if s.aggregate(v, bytemuck::pod_read_unaligned(bytes)) {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

impl<T> DebugInvariants for SyncBuffer<T>
where
    T: Pod + Send + Sync,
{
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "SyncBuffer");
    }

    fn validate_invariants(&self) -> Result<(), BspError> {
        let s = self.state.read();
        if s.values.range() != s.updated.range() || s.values.len() != s.updated.len() {
            return Err(BspError::InvariantViolation(format!(
                "value range {:?} differs from update-flag range {:?}",
                s.values.range(),
                s.updated.range()
            )));
        }
        let counted = s.updated.as_slice().iter().filter(|&&f| f).count();
        if counted != s.updated_num {
            return Err(BspError::InvariantViolation(format!(
                "{} updated flags set but {} recorded",
                counted, s.updated_num
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::aggregate::MinAggregator;
    use crate::parallel::ParallelEngineSpec;

    fn buf(n: u32) -> SyncBuffer<u64> {
        SyncBuffer::new(VertexRange::new(0, n), u64::MAX, MinAggregator)
    }

    #[test]
    fn set_value_does_not_schedule() {
        let b = buf(3);
        b.set_value(Vertex::new(1), 4);
        assert_eq!(b.get_value(Vertex::new(1)), 4);
        assert_eq!(b.updated_count(), 0);
    }

    #[test]
    fn aggregate_marks_only_on_change() {
        let b = buf(3);
        assert!(b.aggregate(Vertex::new(2), 5));
        assert!(!b.aggregate(Vertex::new(2), 5));
        assert!(!b.aggregate(Vertex::new(2), 9));
        assert_eq!(b.updated_vertices(), vec![Vertex::new(2)]);
        b.reset_updated(Vertex::new(2));
        assert_eq!(b.updated_count(), 0);
        assert!(b.validate_invariants().is_ok());
    }

    #[test]
    fn assign_compares_bytes() {
        let b = buf(2);
        assert!(b.assign(Vertex::new(0), 3));
        assert!(!b.assign(Vertex::new(0), 3));
        // assign may increase, unlike the min merge
        assert!(b.assign(Vertex::new(0), 8));
        assert_eq!(b.get_value(Vertex::new(0)), 8);
    }

    #[test]
    fn drain_visits_and_clears() {
        let b = buf(4);
        b.aggregate(Vertex::new(0), 1);
        b.aggregate(Vertex::new(3), 2);
        let handle = b.downgrade().upgrade().unwrap();
        let mut seen = Vec::new();
        let n = handle.drain_updated(&mut |v, bytes| {
            seen.push((v.get(), u64::from_ne_bytes(bytes.try_into().unwrap())))
        });
        assert_eq!(n, 2);
        assert_eq!(seen, vec![(0, 1), (3, 2)]);
        assert_eq!(b.updated_count(), 0);
    }

    #[test]
    fn merge_raw_rejects_wrong_width() {
        let b = buf(1);
        let handle = b.downgrade().upgrade().unwrap();
        let err = handle.merge_raw(&[(Vertex::new(0), &[1, 2, 3][..])]).unwrap_err();
        assert!(matches!(err, BspError::WireError(_)));
        let ok = handle
            .merge_raw(&[(Vertex::new(0), &7u64.to_ne_bytes()[..])])
            .unwrap();
        assert_eq!(ok, 1);
        assert!(b.is_updated(Vertex::new(0)));
    }

    #[test]
    fn registration_does_not_keep_buffer_alive() {
        let b = buf(1);
        let weak = b.downgrade();
        drop(b);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn parallel_aggregate_matches_serial() {
        let engine = ParallelEngine::new(&ParallelEngineSpec::with_threads(3)).unwrap();
        let updates: Vec<(Vertex, u64)> = (0..200u64)
            .map(|i| (Vertex::new((i % 7) as u32), 1000 - i))
            .collect();
        let par = buf(7);
        let ser = buf(7);
        assert_eq!(par.par_aggregate(&engine, updates.clone()), 7);
        ser.aggregate_all(updates);
        assert_eq!(&*par.values(), &*ser.values());
    }
}
