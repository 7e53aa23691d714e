//! In-memory edge-cut fragment.
//!
//! Cut edges are stored on both sides: an edge `(u, v)` with `u` owned by
//! fragment A and `v` owned by fragment B appears in A (with `v` as an outer
//! vertex) and in B (with `u` as an outer vertex). Adjacency rows exist only
//! for inner vertices and are sorted by local index, so inner neighbors always
//! precede outer ones.

use hashbrown::HashMap;
use itertools::Itertools;
use once_cell::sync::OnceCell;

use crate::bsp_error::BspError;
use crate::debug_invariants::DebugInvariants;
use crate::fragment::csr::Csr;
use crate::fragment::vertex::{Fid, Gid, IdParser, Oid, Vertex, VertexRange};
use crate::fragment::{Fragment, LoadStrategy, Nbr};
use crate::message::strategy::MessageStrategy;

/// Pieces assembled by [`FragmentBuilder`](crate::fragment::FragmentBuilder).
pub(crate) struct FragmentParts<E> {
    pub fid: Fid,
    pub fnum: usize,
    pub directed: bool,
    pub load_strategy: LoadStrategy,
    pub inner_oids: Vec<Oid>,
    pub outer_oids: Vec<Oid>,
    pub outer_gids: Vec<Gid>,
    pub oe: Csr<Nbr<E>>,
    pub ie: Option<Csr<Nbr<E>>>,
    pub ghost_holders: Csr<Fid>,
}

pub struct EdgecutFragment<E = ()> {
    fid: Fid,
    fnum: usize,
    directed: bool,
    load_strategy: LoadStrategy,
    id_parser: IdParser,
    ivnum: u32,
    tvnum: u32,
    oids: Vec<Oid>,
    outer_gids: Vec<Gid>,
    oid_index: HashMap<Oid, Vertex>,
    outer_gid_index: HashMap<Gid, Vertex>,
    oe: Csr<Nbr<E>>,
    /// `None` for undirected fragments, where incoming == outgoing.
    ie: Option<Csr<Nbr<E>>>,
    ghost_holders: Csr<Fid>,
    mirrors: [OnceCell<Csr<Fid>>; 4],
    oe_split: OnceCell<Vec<usize>>,
    ie_split: OnceCell<Vec<usize>>,
}

impl<E> EdgecutFragment<E>
where
    E: Copy + Send + Sync + 'static,
{
    pub(crate) fn from_parts(parts: FragmentParts<E>) -> Self {
        let ivnum = parts.inner_oids.len() as u32;
        let tvnum = ivnum + parts.outer_oids.len() as u32;
        let mut oids = parts.inner_oids;
        oids.extend_from_slice(&parts.outer_oids);
        let oid_index = oids
            .iter()
            .enumerate()
            .map(|(i, &oid)| (oid, Vertex::new(i as u32)))
            .collect();
        let outer_gid_index = parts
            .outer_gids
            .iter()
            .enumerate()
            .map(|(i, &gid)| (gid, Vertex::new(ivnum + i as u32)))
            .collect();
        EdgecutFragment {
            fid: parts.fid,
            fnum: parts.fnum,
            directed: parts.directed,
            load_strategy: parts.load_strategy,
            id_parser: IdParser::new(parts.fnum),
            ivnum,
            tvnum,
            oids,
            outer_gids: parts.outer_gids,
            oid_index,
            outer_gid_index,
            oe: parts.oe,
            ie: parts.ie,
            ghost_holders: parts.ghost_holders,
            mirrors: Default::default(),
            oe_split: OnceCell::new(),
            ie_split: OnceCell::new(),
        }
    }

    /// Number of inner vertices.
    pub fn inner_vertex_num(&self) -> usize {
        self.ivnum as usize
    }

    /// Number of stored adjacency entries (outgoing, plus incoming when directed).
    pub fn edge_num(&self) -> usize {
        self.oe.num_items() + self.ie.as_ref().map_or(0, Csr::num_items)
    }

    pub fn id_parser(&self) -> &IdParser {
        &self.id_parser
    }

    fn ie_csr(&self) -> &Csr<Nbr<E>> {
        self.ie.as_ref().unwrap_or(&self.oe)
    }

    fn inner_row<'a, T>(&self, csr: &'a Csr<T>, v: Vertex) -> &'a [T] {
        if v.get() < self.ivnum {
            csr.row(v.index())
        } else {
            &[]
        }
    }

    fn split_points(&self, csr: &Csr<Nbr<E>>) -> Vec<usize> {
        let ivnum = self.ivnum;
        csr.rows()
            .map(|row| row.partition_point(|n| n.neighbor.get() < ivnum))
            .collect()
    }

    fn oe_split(&self) -> &[usize] {
        self.oe_split.get_or_init(|| self.split_points(&self.oe))
    }

    fn ie_split(&self) -> &[usize] {
        if self.ie.is_none() {
            return self.oe_split();
        }
        self.ie_split.get_or_init(|| self.split_points(self.ie_csr()))
    }

    fn outer_owners<'a>(&'a self, row: &'a [Nbr<E>]) -> impl Iterator<Item = Fid> + 'a {
        row.iter()
            .filter(move |n| n.neighbor.get() >= self.ivnum)
            .map(move |n| self.owner_of(n.neighbor))
    }

    fn build_mirrors(&self, strategy: MessageStrategy) -> Csr<Fid> {
        let inner = self.inner_vertices();
        match strategy {
            MessageStrategy::SyncOnOuterVertex => self.ghost_holders.clone(),
            MessageStrategy::AlongOutgoingEdgeToOuterVertex => Csr::from_rows(
                inner
                    .iter()
                    .map(|v| self.outer_owners(self.outgoing_adj(v)).sorted().dedup().collect_vec()),
            ),
            MessageStrategy::AlongIncomingEdgeToOuterVertex => Csr::from_rows(
                inner
                    .iter()
                    .map(|v| self.outer_owners(self.incoming_adj(v)).sorted().dedup().collect_vec()),
            ),
            MessageStrategy::AlongEdgeToOuterVertex => Csr::from_rows(inner.iter().map(|v| {
                self.outer_owners(self.outgoing_adj(v))
                    .chain(self.outer_owners(self.incoming_adj(v)))
                    .sorted()
                    .dedup()
                    .collect_vec()
            })),
        }
    }

    fn mirror_table(&self, strategy: MessageStrategy) -> &Csr<Fid> {
        self.mirrors[strategy.index()].get_or_init(|| self.build_mirrors(strategy))
    }
}

impl<E> Fragment for EdgecutFragment<E>
where
    E: Copy + Send + Sync + 'static,
{
    type EData = E;

    fn fid(&self) -> Fid {
        self.fid
    }

    fn fnum(&self) -> usize {
        self.fnum
    }

    fn directed(&self) -> bool {
        self.directed
    }

    fn load_strategy(&self) -> LoadStrategy {
        self.load_strategy
    }

    fn vertices(&self) -> VertexRange {
        VertexRange::new(0, self.tvnum)
    }

    fn inner_vertices(&self) -> VertexRange {
        VertexRange::new(0, self.ivnum)
    }

    fn outer_vertices(&self) -> VertexRange {
        VertexRange::new(self.ivnum, self.tvnum)
    }

    #[inline]
    fn get_id(&self, v: Vertex) -> Oid {
        self.oids[v.index()]
    }

    #[inline]
    fn get_gid(&self, v: Vertex) -> Gid {
        if v.get() < self.ivnum {
            self.id_parser.generate_id(self.fid, v.get() as u64)
        } else {
            self.outer_gids[(v.get() - self.ivnum) as usize]
        }
    }

    fn gid_to_vertex(&self, gid: Gid) -> Option<Vertex> {
        if self.id_parser.get_fid(gid) == self.fid {
            let offset = self.id_parser.get_offset(gid);
            (offset < self.ivnum as u64).then(|| Vertex::new(offset as u32))
        } else {
            self.outer_gid_index.get(&gid).copied()
        }
    }

    fn oid_to_vertex(&self, oid: Oid) -> Option<Vertex> {
        self.oid_index.get(&oid).copied()
    }

    #[inline]
    fn owner_of(&self, v: Vertex) -> Fid {
        if v.get() < self.ivnum {
            self.fid
        } else {
            self.id_parser.get_fid(self.get_gid(v))
        }
    }

    fn outgoing_adj(&self, v: Vertex) -> &[Nbr<E>] {
        self.inner_row(&self.oe, v)
    }

    fn incoming_adj(&self, v: Vertex) -> &[Nbr<E>] {
        self.inner_row(self.ie_csr(), v)
    }

    fn inner_outgoing_adj(&self, v: Vertex) -> &[Nbr<E>] {
        let row = self.outgoing_adj(v);
        row.get(..self.oe_split().get(v.index()).copied().unwrap_or(0))
            .unwrap_or(&[])
    }

    fn outer_outgoing_adj(&self, v: Vertex) -> &[Nbr<E>] {
        let row = self.outgoing_adj(v);
        row.get(self.oe_split().get(v.index()).copied().unwrap_or(0)..)
            .unwrap_or(&[])
    }

    fn inner_incoming_adj(&self, v: Vertex) -> &[Nbr<E>] {
        let row = self.incoming_adj(v);
        row.get(..self.ie_split().get(v.index()).copied().unwrap_or(0))
            .unwrap_or(&[])
    }

    fn outer_incoming_adj(&self, v: Vertex) -> &[Nbr<E>] {
        let row = self.incoming_adj(v);
        row.get(self.ie_split().get(v.index()).copied().unwrap_or(0)..)
            .unwrap_or(&[])
    }

    fn mirror_fragments(&self, v: Vertex, strategy: MessageStrategy) -> &[Fid] {
        self.inner_row(self.mirror_table(strategy), v)
    }

    fn prepare_to_run_app(
        &self,
        strategy: MessageStrategy,
        need_split_edges: bool,
    ) -> Result<(), BspError> {
        if !strategy.supported_by(self.load_strategy) {
            return Err(BspError::InconsistentApp {
                reason: format!(
                    "message strategy {strategy:?} needs edges a {:?} fragment does not keep",
                    self.load_strategy
                ),
            });
        }
        self.mirror_table(strategy);
        if need_split_edges {
            self.oe_split();
            self.ie_split();
        }
        log::trace!(
            "fragment {} prepared for {:?} (split edges: {})",
            self.fid,
            strategy,
            need_split_edges
        );
        Ok(())
    }
}

impl<E> DebugInvariants for EdgecutFragment<E>
where
    E: Copy + Send + Sync + 'static,
{
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "EdgecutFragment");
    }

    fn validate_invariants(&self) -> Result<(), BspError> {
        let fail = |msg: String| Err(BspError::InvariantViolation(msg));
        if self.oids.len() != self.tvnum as usize {
            return fail(format!("{} oids for {} vertices", self.oids.len(), self.tvnum));
        }
        if self.outer_gids.len() != (self.tvnum - self.ivnum) as usize {
            return fail("outer gid table length mismatch".into());
        }
        for v in self.outer_vertices() {
            if self.owner_of(v) == self.fid {
                return fail(format!("outer vertex {} claims to be owned locally", self.get_id(v)));
            }
        }
        for csr in [Some(&self.oe), self.ie.as_ref()].into_iter().flatten() {
            if csr.num_rows() != self.ivnum as usize {
                return fail("adjacency rows must match inner vertex count".into());
            }
            for row in csr.rows() {
                if row.iter().any(|n| n.neighbor.get() >= self.tvnum) {
                    return fail("adjacency references an unknown vertex".into());
                }
                if !row.windows(2).all(|w| w[0].neighbor <= w[1].neighbor) {
                    return fail("adjacency row is not sorted".into());
                }
            }
        }
        if self.ghost_holders.rows().flatten().any(|&f| f == self.fid || f >= self.fnum) {
            return fail("ghost holder list contains the owner or an invalid fid".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::builder::FragmentBuilder;
    use crate::fragment::partitioner::MapPartitioner;

    fn two_fragments() -> Vec<EdgecutFragment<()>> {
        // 1-2 on fragment 0, 3 on fragment 1, cut edge 2-3
        let part = MapPartitioner::new(2, [(1, 0), (2, 0), (3, 1)]);
        let mut b = FragmentBuilder::<()>::new(2, false).with_partitioner(part);
        b.add_edge(1, 2, ());
        b.add_edge(2, 3, ());
        b.build_all().unwrap()
    }

    #[test]
    fn inner_then_outer_layout() {
        let frags = two_fragments();
        let a = &frags[0];
        assert_eq!(a.inner_vertices().len(), 2);
        assert_eq!(a.outer_vertices().len(), 1);
        let ghost = a.oid_to_vertex(3).unwrap();
        assert!(a.is_outer_vertex(ghost));
        assert_eq!(a.owner_of(ghost), 1);
        assert!(a.validate_invariants().is_ok());
        assert!(frags[1].validate_invariants().is_ok());
    }

    #[test]
    fn gids_agree_across_fragments() {
        let frags = two_fragments();
        let (a, b) = (&frags[0], &frags[1]);
        let v2_on_a = a.oid_to_vertex(2).unwrap();
        let v2_on_b = b.oid_to_vertex(2).unwrap();
        assert_eq!(a.get_gid(v2_on_a), b.get_gid(v2_on_b));
        assert_eq!(b.gid_to_vertex(a.get_gid(v2_on_a)), Some(v2_on_b));
    }

    #[test]
    fn split_edges_put_inner_neighbors_first() {
        let frags = two_fragments();
        let a = &frags[0];
        let v2 = a.oid_to_vertex(2).unwrap();
        a.prepare_to_run_app(MessageStrategy::SyncOnOuterVertex, true)
            .unwrap();
        let inner: Vec<_> = a.inner_outgoing_adj(v2).iter().map(|n| a.get_id(n.neighbor)).collect();
        let outer: Vec<_> = a.outer_outgoing_adj(v2).iter().map(|n| a.get_id(n.neighbor)).collect();
        assert_eq!(inner, vec![1]);
        assert_eq!(outer, vec![3]);
    }

    #[test]
    fn mirrors_follow_cut_edges() {
        let frags = two_fragments();
        let a = &frags[0];
        let v1 = a.oid_to_vertex(1).unwrap();
        let v2 = a.oid_to_vertex(2).unwrap();
        assert!(a.mirror_fragments(v1, MessageStrategy::AlongEdgeToOuterVertex).is_empty());
        assert_eq!(a.mirror_fragments(v2, MessageStrategy::AlongEdgeToOuterVertex), &[1]);
        assert_eq!(a.mirror_fragments(v2, MessageStrategy::SyncOnOuterVertex), &[1]);
        let ghost = a.oid_to_vertex(3).unwrap();
        assert!(a.mirror_fragments(ghost, MessageStrategy::SyncOnOuterVertex).is_empty());
    }
}
