//! Weakly connected components over the automatic sync protocol.
//!
//! `peval` labels the components of the local subgraph (inner vertices
//! joined by local edges, with their outer neighbors attached) and seeds
//! every member with the component's smallest id. Ghost copies carry those
//! labels to their owners and back. `inc_eval` re-reads each local
//! component's members and outer neighbors and lowers the whole component
//! whenever a smaller label arrived.

use std::collections::VecDeque;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::app::context::VertexDataContext;
use crate::app::{App, Context};
use crate::bsp_error::BspError;
use crate::comm::communicator::Communicator;
use crate::data::aggregate::MinAggregator;
use crate::data::vertex_array::VertexArray;
use crate::fragment::vertex::Vertex;
use crate::fragment::{Fragment, LoadStrategy};
use crate::message::manager::MessageManager;
use crate::message::strategy::MessageStrategy;
use crate::parallel::ParallelEngine;

/// Which id labels a component.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CidKind {
    /// Smallest original vertex id.
    #[default]
    Oid,
    /// Smallest internal gid.
    Gid,
}

const UNSET: u32 = u32::MAX;

pub struct WccAutoContext<F: Fragment> {
    cluster: VertexDataContext<F, u64>,
    local_comp_id: VertexArray<u32>,
    comp_members: Vec<Vec<Vertex>>,
    comp_outer: Vec<Vec<Vertex>>,
    global_comp_id: Vec<u64>,
}

impl<F: Fragment> WccAutoContext<F> {
    pub fn component_of(&self, v: Vertex) -> u64 {
        self.cluster.data().get_value(v)
    }

    pub fn local_component_num(&self) -> usize {
        self.comp_members.len()
    }
}

impl<F: Fragment> Context<F> for WccAutoContext<F> {
    type Args = ();

    fn new(fragment: Arc<F>) -> Self {
        let inner = fragment.inner_vertices();
        WccAutoContext {
            cluster: VertexDataContext::with_sentinel(fragment, u64::MAX, MinAggregator),
            local_comp_id: VertexArray::new(inner, UNSET),
            comp_members: Vec::new(),
            comp_outer: Vec::new(),
            global_comp_id: Vec::new(),
        }
    }

    fn init<C: Communicator>(
        &mut self,
        messages: &mut MessageManager<F, C>,
        _args: (),
    ) -> Result<(), BspError> {
        messages.register_sync_buffer(self.cluster.data(), MessageStrategy::SyncOnOuterVertex)
    }

    fn output<W: Write>(&self, sink: &mut W) -> Result<(), BspError> {
        self.cluster.write(sink)
    }
}

pub struct WccAuto<F> {
    cid_kind: CidKind,
    engine: RwLock<ParallelEngine>,
    _fragment: PhantomData<fn() -> F>,
}

impl<F> Default for WccAuto<F> {
    fn default() -> Self {
        Self::new(CidKind::Oid)
    }
}

impl<F> WccAuto<F> {
    pub fn new(cid_kind: CidKind) -> Self {
        WccAuto {
            cid_kind,
            engine: RwLock::new(ParallelEngine::default()),
            _fragment: PhantomData,
        }
    }

    pub fn cid_kind(&self) -> CidKind {
        self.cid_kind
    }

    /// Pool used to spread component labels; the worker's since the last init.
    pub fn parallel_engine(&self) -> ParallelEngine {
        self.engine.read().clone()
    }
}

impl<F: Fragment> WccAuto<F> {
    fn cid(&self, frag: &F, v: Vertex) -> u64 {
        match self.cid_kind {
            CidKind::Oid => frag.get_id(v),
            CidKind::Gid => frag.get_gid(v),
        }
    }

    fn spread(&self, ctx: &WccAutoContext<F>, comp: usize) -> usize {
        let cid = ctx.global_comp_id[comp];
        let updates: Vec<(Vertex, u64)> = ctx.comp_members[comp]
            .iter()
            .chain(&ctx.comp_outer[comp])
            .map(|&v| (v, cid))
            .collect();
        let engine = self.engine.read();
        if engine.thread_num() > 1 {
            ctx.cluster.data().par_aggregate(&engine, updates)
        } else {
            ctx.cluster.data().aggregate_all(updates)
        }
    }
}

impl<F: Fragment> App for WccAuto<F> {
    type Fragment = F;
    type Context = WccAutoContext<F>;

    const MESSAGE_STRATEGY: MessageStrategy = MessageStrategy::SyncOnOuterVertex;
    const LOAD_STRATEGY: LoadStrategy = LoadStrategy::BothOutIn;

    fn peval<C: Communicator>(
        &self,
        frag: &F,
        ctx: &mut WccAutoContext<F>,
        _messages: &mut MessageManager<F, C>,
    ) -> Result<(), BspError> {
        let mut queue = VecDeque::new();
        for root in frag.inner_vertices() {
            if ctx.local_comp_id[root] != UNSET {
                continue;
            }
            let comp = ctx.comp_members.len() as u32;
            ctx.local_comp_id[root] = comp;
            let mut members = vec![root];
            let mut outer = Vec::new();
            queue.push_back(root);
            while let Some(u) = queue.pop_front() {
                for nbr in frag.outgoing_adj(u).iter().chain(frag.incoming_adj(u)) {
                    let w = nbr.neighbor;
                    if frag.is_outer_vertex(w) {
                        outer.push(w);
                    } else if ctx.local_comp_id[w] == UNSET {
                        ctx.local_comp_id[w] = comp;
                        members.push(w);
                        queue.push_back(w);
                    }
                }
            }
            outer.sort_unstable();
            outer.dedup();
            let cid = members
                .iter()
                .chain(&outer)
                .map(|&v| self.cid(frag, v))
                .min()
                .unwrap_or(u64::MAX);
            ctx.comp_members.push(members);
            ctx.comp_outer.push(outer);
            ctx.global_comp_id.push(cid);
        }
        for comp in 0..ctx.comp_members.len() {
            self.spread(ctx, comp);
        }
        log::trace!(
            "[frag {}] {} local components",
            frag.fid(),
            ctx.comp_members.len()
        );
        Ok(())
    }

    fn inc_eval<C: Communicator>(
        &self,
        _frag: &F,
        ctx: &mut WccAutoContext<F>,
        _messages: &mut MessageManager<F, C>,
    ) -> Result<(), BspError> {
        for comp in 0..ctx.comp_members.len() {
            let best = {
                let values = ctx.cluster.data().values();
                ctx.comp_members[comp]
                    .iter()
                    .chain(&ctx.comp_outer[comp])
                    .map(|v| values[v.index()])
                    .min()
                    .unwrap_or(u64::MAX)
            };
            if best < ctx.global_comp_id[comp] {
                ctx.global_comp_id[comp] = best;
                self.spread(ctx, comp);
            }
        }
        Ok(())
    }

    fn init_parallel_engine(&self, engine: &ParallelEngine) -> Result<(), BspError> {
        log::debug!("wcc: spreading labels on {} thread(s)", engine.thread_num());
        *self.engine.write() = engine.clone();
        Ok(())
    }
}
