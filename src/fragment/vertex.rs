//! `Vertex`: a strong, zero-cost handle for fragment-local vertices
//!
//! Every fragment numbers the vertices it knows about (inner first, then
//! outer) with dense local indices. `Vertex` wraps that index so that local
//! positions are never confused with global identifiers:
//!
//! - [`Oid`]: the user-facing global id read from the input graph.
//! - [`Gid`]: the internal global id, packing the owning fragment id and the
//!   vertex's inner offset on that fragment (see [`IdParser`]).
//!
//! Local indices are stable for the lifetime of a fragment, hence for every
//! query that runs over it.

use std::fmt;

/// Fragment id, `0..fnum`.
pub type Fid = usize;
/// User-facing global vertex id.
pub type Oid = u64;
/// Internal global vertex id (`fid` in the high bits, inner offset below).
pub type Gid = u64;

/// Dense, fragment-local vertex index.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct Vertex(u32);

impl Vertex {
    #[inline]
    pub const fn new(index: u32) -> Self {
        Vertex(index)
    }

    /// Raw local index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Vertex").field(&self.0).finish()
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open range `[begin, end)` of local vertices.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct VertexRange {
    begin: u32,
    end: u32,
}

impl VertexRange {
    pub const fn new(begin: u32, end: u32) -> Self {
        VertexRange { begin, end }
    }

    pub const fn begin(&self) -> u32 {
        self.begin
    }

    pub const fn end(&self) -> u32 {
        self.end
    }

    pub const fn len(&self) -> usize {
        (self.end - self.begin) as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.end <= self.begin
    }

    #[inline]
    pub const fn contains(&self, v: Vertex) -> bool {
        v.0 >= self.begin && v.0 < self.end
    }

    /// Position of `v` relative to the start of the range.
    #[inline]
    pub const fn offset_of(&self, v: Vertex) -> usize {
        (v.0 - self.begin) as usize
    }

    pub fn iter(&self) -> <Self as IntoIterator>::IntoIter {
        (*self).into_iter()
    }
}

impl IntoIterator for VertexRange {
    type Item = Vertex;
    type IntoIter = std::iter::Map<std::ops::Range<u32>, fn(u32) -> Vertex>;

    fn into_iter(self) -> Self::IntoIter {
        (self.begin..self.end).map(Vertex as fn(u32) -> Vertex)
    }
}

/// Packs and unpacks `(fid, inner offset)` into a [`Gid`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IdParser {
    fid_offset: u32,
    offset_mask: u64,
}

impl IdParser {
    /// Parser for a process group of `fnum` fragments.
    pub fn new(fnum: usize) -> Self {
        let mut bits = 1u32;
        while (1usize << bits) < fnum {
            bits += 1;
        }
        let fid_offset = 64 - bits;
        IdParser {
            fid_offset,
            offset_mask: (1u64 << fid_offset) - 1,
        }
    }

    #[inline]
    pub fn generate_id(&self, fid: Fid, offset: u64) -> Gid {
        ((fid as u64) << self.fid_offset) | (offset & self.offset_mask)
    }

    #[inline]
    pub fn get_fid(&self, gid: Gid) -> Fid {
        (gid >> self.fid_offset) as Fid
    }

    #[inline]
    pub fn get_offset(&self, gid: Gid) -> u64 {
        gid & self.offset_mask
    }
}

#[cfg(test)]
mod layout_tests {
    use super::*;
    use static_assertions::assert_eq_size;

    assert_eq_size!(Vertex, u32);
}
