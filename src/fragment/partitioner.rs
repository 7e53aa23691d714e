//! Vertex-to-fragment assignment used when building fragments.

use hashbrown::HashMap;

use crate::fragment::vertex::{Fid, Oid};

/// Decides which fragment owns a vertex.
pub trait Partitioner: Send + Sync {
    /// Number of fragments this partitioner assigns to.
    fn fnum(&self) -> usize;
    /// Owner of `oid`, or `None` if the partitioner has no opinion.
    fn partition(&self, oid: Oid) -> Option<Fid>;
}

/// `oid mod fnum`.
#[derive(Copy, Clone, Debug)]
pub struct HashPartitioner {
    fnum: usize,
}

impl HashPartitioner {
    pub fn new(fnum: usize) -> Self {
        HashPartitioner { fnum: fnum.max(1) }
    }
}

impl Partitioner for HashPartitioner {
    fn fnum(&self) -> usize {
        self.fnum
    }

    #[inline]
    fn partition(&self, oid: Oid) -> Option<Fid> {
        Some((oid % self.fnum as u64) as Fid)
    }
}

/// Explicit `oid -> fid` table.
#[derive(Clone, Debug, Default)]
pub struct MapPartitioner {
    fnum: usize,
    map: HashMap<Oid, Fid>,
}

impl MapPartitioner {
    pub fn new<I>(fnum: usize, entries: I) -> Self
    where
        I: IntoIterator<Item = (Oid, Fid)>,
    {
        MapPartitioner {
            fnum,
            map: entries.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, oid: Oid, fid: Fid) -> Option<Fid> {
        self.map.insert(oid, fid)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Partitioner for MapPartitioner {
    fn fnum(&self) -> usize {
        self.fnum
    }

    fn partition(&self, oid: Oid) -> Option<Fid> {
        self.map.get(&oid).copied()
    }
}
