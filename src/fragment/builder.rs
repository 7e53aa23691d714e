//! Assemble edge-cut fragments from a global vertex/edge description.
//!
//! The builder sees the whole graph, so it can hand every fragment
//! consistent gids for its outer vertices and the full list of remote ghost
//! holders for each of its inner vertices. Each process may build only its
//! own fragment with [`FragmentBuilder::build`].

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashMap;

use crate::bsp_error::BspError;
use crate::debug_invariants::DebugInvariants;
use crate::fragment::csr::Csr;
use crate::fragment::edgecut::{EdgecutFragment, FragmentParts};
use crate::fragment::partitioner::Partitioner;
use crate::fragment::vertex::{Fid, IdParser, Oid, Vertex};
use crate::fragment::{LoadStrategy, Nbr};

pub struct FragmentBuilder<E = ()> {
    fnum: usize,
    directed: bool,
    load_strategy: LoadStrategy,
    partitioner: Option<Box<dyn Partitioner>>,
    owners: HashMap<Oid, Fid>,
    edges: Vec<(Oid, Oid, E)>,
    ghosts: Vec<(Fid, Oid)>,
}

/// Global placement shared by every fragment built from one builder.
struct Plan {
    /// oid -> (owner, inner offset on owner)
    placement: HashMap<Oid, (Fid, u64)>,
    inner: Vec<Vec<Oid>>,
    outer: Vec<BTreeSet<Oid>>,
    holders: HashMap<Oid, BTreeSet<Fid>>,
}

impl<E> FragmentBuilder<E>
where
    E: Copy + Send + Sync + 'static,
{
    pub fn new(fnum: usize, directed: bool) -> Self {
        FragmentBuilder {
            fnum: fnum.max(1),
            directed,
            load_strategy: LoadStrategy::BothOutIn,
            partitioner: None,
            owners: HashMap::new(),
            edges: Vec::new(),
            ghosts: Vec::new(),
        }
    }

    /// Edge directions kept for directed graphs; undirected graphs always keep both.
    pub fn with_load_strategy(mut self, load_strategy: LoadStrategy) -> Self {
        self.load_strategy = load_strategy;
        self
    }

    /// Owner lookup for vertices without an explicit [`add_vertex`](Self::add_vertex).
    pub fn with_partitioner<P: Partitioner + 'static>(mut self, partitioner: P) -> Self {
        self.partitioner = Some(Box::new(partitioner));
        self
    }

    pub fn fnum(&self) -> usize {
        self.fnum
    }

    pub fn add_vertex(&mut self, oid: Oid, owner: Fid) -> &mut Self {
        self.owners.insert(oid, owner);
        self
    }

    pub fn add_edge(&mut self, src: Oid, dst: Oid, data: E) -> &mut Self {
        self.edges.push((src, dst, data));
        self
    }

    /// Keep a ghost copy of `oid` on `fid` even without a cut edge.
    pub fn add_ghost(&mut self, fid: Fid, oid: Oid) -> &mut Self {
        self.ghosts.push((fid, oid));
        self
    }

    fn effective_load_strategy(&self) -> LoadStrategy {
        if self.directed {
            self.load_strategy
        } else {
            LoadStrategy::BothOutIn
        }
    }

    fn owner(&self, oid: Oid) -> Result<Fid, BspError> {
        let fid = match self.owners.get(&oid) {
            Some(&fid) => fid,
            None => self
                .partitioner
                .as_ref()
                .and_then(|p| p.partition(oid))
                .ok_or_else(|| BspError::GraphLoad(format!("vertex {oid} has no owner")))?,
        };
        if fid >= self.fnum {
            return Err(BspError::InvalidFragmentId {
                fid,
                fnum: self.fnum,
            });
        }
        Ok(fid)
    }

    /// Whether fragment `fid` stores edge `(u -> v)` given the owners.
    fn keeps(&self, fid: Fid, fu: Fid, fv: Fid) -> bool {
        let load = self.effective_load_strategy();
        (fu == fid && load.keeps_out()) || (fv == fid && load.keeps_in())
    }

    fn plan(&self) -> Result<Plan, BspError> {
        let mut owner_of: BTreeMap<Oid, Fid> = BTreeMap::new();
        for &oid in self.owners.keys() {
            owner_of.insert(oid, self.owner(oid)?);
        }
        let endpoints = self
            .edges
            .iter()
            .flat_map(|&(u, v, _)| [u, v])
            .chain(self.ghosts.iter().map(|&(_, oid)| oid));
        for oid in endpoints {
            if !owner_of.contains_key(&oid) {
                owner_of.insert(oid, self.owner(oid)?);
            }
        }

        // BTreeMap iteration gives every fragment its inner oids in ascending order.
        let mut inner = vec![Vec::new(); self.fnum];
        let mut placement = HashMap::with_capacity(owner_of.len());
        for (&oid, &fid) in &owner_of {
            placement.insert(oid, (fid, inner[fid].len() as u64));
            inner[fid].push(oid);
        }

        let mut outer = vec![BTreeSet::new(); self.fnum];
        for &(u, v, _) in &self.edges {
            let (fu, fv) = (placement[&u].0, placement[&v].0);
            if fu == fv {
                continue;
            }
            if self.keeps(fu, fu, fv) {
                outer[fu].insert(v);
            }
            if self.keeps(fv, fu, fv) {
                outer[fv].insert(u);
            }
        }
        for &(fid, oid) in &self.ghosts {
            if fid >= self.fnum {
                return Err(BspError::InvalidFragmentId {
                    fid,
                    fnum: self.fnum,
                });
            }
            if placement[&oid].0 != fid {
                outer[fid].insert(oid);
            }
        }

        let mut holders: HashMap<Oid, BTreeSet<Fid>> = HashMap::new();
        for (fid, set) in outer.iter().enumerate() {
            for &oid in set {
                holders.entry(oid).or_default().insert(fid);
            }
        }

        Ok(Plan {
            placement,
            inner,
            outer,
            holders,
        })
    }

    fn materialize(&self, plan: &Plan, fid: Fid) -> EdgecutFragment<E> {
        let parser = IdParser::new(self.fnum);
        let load = self.effective_load_strategy();
        let inner_oids = plan.inner[fid].clone();
        let outer_oids: Vec<Oid> = plan.outer[fid].iter().copied().collect();
        let ivnum = inner_oids.len();

        let mut local: HashMap<Oid, Vertex> = HashMap::with_capacity(ivnum + outer_oids.len());
        for (i, &oid) in inner_oids.iter().chain(outer_oids.iter()).enumerate() {
            local.insert(oid, Vertex::new(i as u32));
        }
        let outer_gids = outer_oids
            .iter()
            .map(|oid| {
                let (owner, offset) = plan.placement[oid];
                parser.generate_id(owner, offset)
            })
            .collect();

        let mut oe: Vec<Vec<Nbr<E>>> = vec![Vec::new(); ivnum];
        let mut ie: Vec<Vec<Nbr<E>>> = vec![Vec::new(); ivnum];
        for &(u, v, data) in &self.edges {
            let (fu, fv) = (plan.placement[&u].0, plan.placement[&v].0);
            if fu != fid && fv != fid {
                continue;
            }
            let (Some(lu), Some(lv)) = (local.get(&u).copied(), local.get(&v).copied()) else {
                // the far endpoint is not kept on this fragment under the load strategy
                continue;
            };
            if self.directed {
                if fu == fid && load.keeps_out() {
                    oe[lu.index()].push(Nbr { neighbor: lv, data });
                }
                if fv == fid && load.keeps_in() {
                    ie[lv.index()].push(Nbr { neighbor: lu, data });
                }
            } else {
                if fu == fid {
                    oe[lu.index()].push(Nbr { neighbor: lv, data });
                }
                if fv == fid && u != v {
                    oe[lv.index()].push(Nbr { neighbor: lu, data });
                }
            }
        }
        for row in oe.iter_mut().chain(ie.iter_mut()) {
            row.sort_by_key(|n| n.neighbor);
        }

        let ghost_holders = Csr::from_rows(inner_oids.iter().map(|oid| {
            plan.holders
                .get(oid)
                .map(|set| set.iter().copied().collect::<Vec<_>>())
                .unwrap_or_default()
        }));

        let frag = EdgecutFragment::from_parts(FragmentParts {
            fid,
            fnum: self.fnum,
            directed: self.directed,
            load_strategy: load,
            inner_oids,
            outer_oids,
            outer_gids,
            oe: Csr::from_rows(oe),
            ie: self.directed.then(|| Csr::from_rows(ie)),
            ghost_holders,
        });
        frag.debug_assert_invariants();
        frag
    }

    /// Build the fragment owned by `fid`.
    pub fn build(&self, fid: Fid) -> Result<EdgecutFragment<E>, BspError> {
        if fid >= self.fnum {
            return Err(BspError::InvalidFragmentId {
                fid,
                fnum: self.fnum,
            });
        }
        let plan = self.plan()?;
        Ok(self.materialize(&plan, fid))
    }

    /// Build every fragment, indexed by fid.
    pub fn build_all(&self) -> Result<Vec<EdgecutFragment<E>>, BspError> {
        let plan = self.plan()?;
        Ok((0..self.fnum).map(|fid| self.materialize(&plan, fid)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragment;
    use crate::fragment::partitioner::HashPartitioner;

    #[test]
    fn missing_owner_is_a_load_error() {
        let mut b = FragmentBuilder::<()>::new(2, false);
        b.add_edge(1, 2, ());
        assert!(matches!(b.build(0), Err(BspError::GraphLoad(_))));
    }

    #[test]
    fn owner_out_of_range_is_rejected() {
        let mut b = FragmentBuilder::<()>::new(2, false);
        b.add_vertex(1, 5);
        assert!(matches!(
            b.build_all(),
            Err(BspError::InvalidFragmentId { fid: 5, fnum: 2 })
        ));
    }

    #[test]
    fn explicit_ghost_registers_holder() {
        let mut b = FragmentBuilder::<()>::new(2, false);
        b.add_vertex(1, 0).add_vertex(2, 1).add_ghost(1, 1);
        let frags = b.build_all().unwrap();
        let v1 = frags[0].oid_to_vertex(1).unwrap();
        assert_eq!(
            frags[0].mirror_fragments(v1, crate::message::strategy::MessageStrategy::SyncOnOuterVertex),
            &[1]
        );
        assert!(frags[1].oid_to_vertex(1).is_some_and(|v| frags[1].is_outer_vertex(v)));
    }

    #[test]
    fn directed_only_out_drops_incoming_ghosts() {
        // 1 -> 2, 1 on fragment 1, 2 on fragment 0
        let mut b = FragmentBuilder::<()>::new(2, true)
            .with_load_strategy(LoadStrategy::OnlyOut)
            .with_partitioner(HashPartitioner::new(2));
        b.add_edge(1, 2, ());
        let frags = b.build_all().unwrap();
        // fragment 1 keeps the out-edge and sees 2 as outer
        assert!(frags[1].oid_to_vertex(2).is_some());
        // fragment 0 keeps no in-edges, so 1 never becomes a ghost there
        assert!(frags[0].oid_to_vertex(1).is_none());
        for f in &frags {
            assert!(f.validate_invariants().is_ok());
        }
    }

    #[test]
    fn undirected_self_loop_is_stored_once() {
        let mut b = FragmentBuilder::<()>::new(1, false).with_partitioner(HashPartitioner::new(1));
        b.add_edge(4, 4, ());
        let f = b.build(0).unwrap();
        let v = f.oid_to_vertex(4).unwrap();
        assert_eq!(f.outgoing_adj(v).len(), 1);
    }
}
