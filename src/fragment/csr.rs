//! Compressed row storage used for adjacency and mirror tables.

#[derive(Clone, Debug, PartialEq)]
pub struct Csr<T> {
    offsets: Vec<usize>,
    items: Vec<T>,
}

impl<T> Default for Csr<T> {
    fn default() -> Self {
        Csr {
            offsets: vec![0],
            items: Vec::new(),
        }
    }
}

impl<T> Csr<T> {
    /// Build from per-row vectors, preserving row order.
    pub fn from_rows<I, R>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = T>,
    {
        let mut offsets = vec![0];
        let mut items = Vec::new();
        for row in rows {
            items.extend(row);
            offsets.push(items.len());
        }
        Csr { offsets, items }
    }

    pub fn num_rows(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    /// Row `i`, or an empty slice past the last row.
    #[inline]
    pub fn row(&self, i: usize) -> &[T] {
        match (self.offsets.get(i), self.offsets.get(i + 1)) {
            (Some(&b), Some(&e)) => &self.items[b..e],
            _ => &[],
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        self.offsets.windows(2).map(move |w| &self.items[w[0]..w[1]])
    }
}
