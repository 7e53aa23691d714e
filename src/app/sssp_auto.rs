//! Single-source shortest paths over the automatic sync protocol.
//!
//! Distances live in a min-merged sync buffer. Each superstep runs Dijkstra
//! on the local subgraph, starting from the source in `peval` and from the
//! inner vertices whose distance dropped in the last exchange in `inc_eval`.
//! Relaxed outer vertices report to their owners through the buffer.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::app::context::VertexDataContext;
use crate::app::{App, Context};
use crate::bsp_error::BspError;
use crate::comm::communicator::Communicator;
use crate::data::aggregate::MinAggregator;
use crate::fragment::vertex::{Oid, Vertex};
use crate::fragment::Fragment;
use crate::message::manager::MessageManager;
use crate::message::strategy::MessageStrategy;

pub struct SsspAutoContext<F: Fragment> {
    dist: VertexDataContext<F, f64>,
}

impl<F: Fragment> SsspAutoContext<F> {
    pub fn distance(&self, v: Vertex) -> f64 {
        self.dist.data().get_value(v)
    }
}

impl<F: Fragment> Context<F> for SsspAutoContext<F> {
    type Args = ();

    fn new(fragment: Arc<F>) -> Self {
        SsspAutoContext {
            dist: VertexDataContext::with_sentinel(fragment, f64::INFINITY, MinAggregator),
        }
    }

    fn init<C: Communicator>(
        &mut self,
        messages: &mut MessageManager<F, C>,
        _args: (),
    ) -> Result<(), BspError> {
        messages.register_sync_buffer(self.dist.data(), MessageStrategy::SyncOnOuterVertex)
    }

    fn output<W: Write>(&self, sink: &mut W) -> Result<(), BspError> {
        self.dist.write(sink)
    }
}

#[derive(Copy, Clone, PartialEq)]
struct Candidate {
    dist: f64,
    v: Vertex,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    // reversed: BinaryHeap pops the smallest distance first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.v.cmp(&self.v))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct SsspAuto<F> {
    source: Oid,
    _fragment: PhantomData<fn() -> F>,
}

impl<F> SsspAuto<F> {
    pub fn new(source: Oid) -> Self {
        SsspAuto {
            source,
            _fragment: PhantomData,
        }
    }

    pub fn source(&self) -> Oid {
        self.source
    }
}

impl<F: Fragment<EData = f64>> SsspAuto<F> {
    fn relax_from(frag: &F, ctx: &SsspAutoContext<F>, seeds: impl IntoIterator<Item = Vertex>) -> usize {
        let dist = ctx.dist.data();
        let mut heap: BinaryHeap<Candidate> = seeds
            .into_iter()
            .filter(|&v| frag.is_inner_vertex(v))
            .map(|v| Candidate {
                dist: dist.get_value(v),
                v,
            })
            .collect();
        let mut relaxed = 0;
        while let Some(Candidate { dist: d, v }) = heap.pop() {
            if d > dist.get_value(v) {
                continue;
            }
            for nbr in frag.outgoing_adj(v) {
                let nd = d + nbr.data;
                if dist.aggregate(nbr.neighbor, nd) {
                    relaxed += 1;
                    if frag.is_inner_vertex(nbr.neighbor) {
                        heap.push(Candidate {
                            dist: nd,
                            v: nbr.neighbor,
                        });
                    }
                }
            }
        }
        relaxed
    }
}

impl<F: Fragment<EData = f64>> App for SsspAuto<F> {
    type Fragment = F;
    type Context = SsspAutoContext<F>;

    const MESSAGE_STRATEGY: MessageStrategy = MessageStrategy::SyncOnOuterVertex;

    fn peval<C: Communicator>(
        &self,
        frag: &F,
        ctx: &mut SsspAutoContext<F>,
        _messages: &mut MessageManager<F, C>,
    ) -> Result<(), BspError> {
        let Some(source) = frag.oid_to_vertex(self.source) else {
            return Ok(());
        };
        if !frag.is_inner_vertex(source) {
            return Ok(());
        }
        ctx.dist.data().aggregate(source, 0.0);
        let relaxed = Self::relax_from(frag, ctx, [source]);
        log::trace!("[frag {}] source relaxed {} edges", frag.fid(), relaxed);
        Ok(())
    }

    fn inc_eval<C: Communicator>(
        &self,
        frag: &F,
        ctx: &mut SsspAutoContext<F>,
        _messages: &mut MessageManager<F, C>,
    ) -> Result<(), BspError> {
        let frontier = ctx.dist.data().updated_vertices();
        Self::relax_from(frag, ctx, frontier);
        Ok(())
    }
}
