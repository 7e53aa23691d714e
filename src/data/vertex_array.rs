//! Dense per-vertex storage over a [`VertexRange`].
//!
//! Indexing is by [`Vertex`], offset by the range's first index, so an array
//! over the inner range and one over the full `[inner | outer]` range are
//! addressed the same way.

use core::fmt::{self, Debug};
use std::ops::{Index, IndexMut};

use crate::bsp_error::BspError;
use crate::fragment::vertex::{Vertex, VertexRange};

#[derive(Clone, PartialEq)]
pub struct VertexArray<T> {
    range: VertexRange,
    data: Vec<T>,
}

impl<T> Debug for VertexArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexArray")
            .field("range", &self.range)
            .field("len", &self.data.len())
            .finish()
    }
}

impl<T> Default for VertexArray<T> {
    fn default() -> Self {
        VertexArray {
            range: VertexRange::default(),
            data: Vec::new(),
        }
    }
}

impl<T: Clone> VertexArray<T> {
    /// Array over `range` with every cell set to `fill`.
    pub fn new(range: VertexRange, fill: T) -> Self {
        VertexArray {
            range,
            data: vec![fill; range.len()],
        }
    }

    /// Reset to `range`, refilling every cell.
    pub fn init(&mut self, range: VertexRange, fill: T) {
        self.range = range;
        self.data.clear();
        self.data.resize(range.len(), fill);
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T> VertexArray<T> {
    pub fn range(&self) -> VertexRange {
        self.range
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, v: Vertex) -> Option<&T> {
        if self.range.contains(v) {
            self.data.get(self.range.offset_of(v))
        } else {
            None
        }
    }

    #[inline]
    pub fn get_mut(&mut self, v: Vertex) -> Option<&mut T> {
        if self.range.contains(v) {
            let i = self.range.offset_of(v);
            self.data.get_mut(i)
        } else {
            None
        }
    }

    /// Like [`get`](Self::get) but reports the offending index.
    pub fn try_get(&self, v: Vertex) -> Result<&T, BspError> {
        let len = self.data.len();
        self.get(v).ok_or(BspError::VertexOutOfRange {
            index: v.index(),
            len,
        })
    }

    pub fn try_get_mut(&mut self, v: Vertex) -> Result<&mut T, BspError> {
        let len = self.data.len();
        self.get_mut(v).ok_or(BspError::VertexOutOfRange {
            index: v.index(),
            len,
        })
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// `(vertex, value)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (Vertex, &T)> + '_ {
        self.range.iter().zip(self.data.iter())
    }
}

impl<T> Index<Vertex> for VertexArray<T> {
    type Output = T;

    #[inline]
    fn index(&self, v: Vertex) -> &T {
        &self.data[self.range.offset_of(v)]
    }
}

impl<T> IndexMut<Vertex> for VertexArray<T> {
    #[inline]
    fn index_mut(&mut self, v: Vertex) -> &mut T {
        let i = self.range.offset_of(v);
        &mut self.data[i]
    }
}
