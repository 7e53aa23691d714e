//! Algorithms and their per-query state.
//!
//! An [`App`] is a pair of supersteps: `peval` runs once on each fragment,
//! then `inc_eval` runs every following round until no fragment sends
//! anything. Mutable per-query state lives in the app's [`Context`], which
//! is created fresh for every query and registers its sync buffers with the
//! message manager in [`Context::init`].

pub mod context;
pub mod sssp_auto;
pub mod wcc_auto;

pub use context::{VertexDataContext, write_inner_values};
pub use sssp_auto::{SsspAuto, SsspAutoContext};
pub use wcc_auto::{CidKind, WccAuto, WccAutoContext};

use std::io::Write;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::bsp_error::BspError;
use crate::comm::communicator::Communicator;
use crate::fragment::{Fragment, LoadStrategy};
use crate::message::manager::MessageManager;
use crate::message::strategy::MessageStrategy;
use crate::parallel::ParallelEngine;
use crate::worker::comm_spec::CommSpec;

/// Per-query mutable state of an app.
pub trait Context<F: Fragment>: Send + Sized {
    /// Query arguments passed through [`Worker::query`](crate::worker::Worker::query).
    type Args;

    fn new(fragment: Arc<F>) -> Self;

    /// Create and register sync buffers; runs once per query before `peval`.
    fn init<C: Communicator>(
        &mut self,
        messages: &mut MessageManager<F, C>,
        args: Self::Args,
    ) -> Result<(), BspError>;

    /// Write `<oid> <value>` for every inner vertex, in inner-vertex order.
    fn output<W: Write>(&self, sink: &mut W) -> Result<(), BspError>;
}

/// A fragment-parallel algorithm.
pub trait App: Send + Sync + 'static {
    type Fragment: Fragment;
    type Context: Context<Self::Fragment>;

    /// How registered sync buffers propagate.
    const MESSAGE_STRATEGY: MessageStrategy;
    /// Whether adjacency must be split into inner and outer neighbors up front.
    const NEED_SPLIT_EDGES: bool = false;
    /// Edge directions the app reads.
    const LOAD_STRATEGY: LoadStrategy = Self::MESSAGE_STRATEGY.minimal_load_strategy();

    /// First superstep.
    fn peval<C: Communicator>(
        &self,
        frag: &Self::Fragment,
        ctx: &mut Self::Context,
        messages: &mut MessageManager<Self::Fragment, C>,
    ) -> Result<(), BspError>;

    /// Every superstep after the first.
    fn inc_eval<C: Communicator>(
        &self,
        frag: &Self::Fragment,
        ctx: &mut Self::Context,
        messages: &mut MessageManager<Self::Fragment, C>,
    ) -> Result<(), BspError>;

    /// Receives the worker's thread pool; called on every `Worker::init`.
    fn init_parallel_engine(&self, _engine: &ParallelEngine) -> Result<(), BspError> {
        Ok(())
    }

    fn init_communicator(&self, _spec: &CommSpec) -> Result<(), BspError> {
        Ok(())
    }
}

/// Query arguments of `A`'s context.
pub type ContextArgs<A> = <<A as App>::Context as Context<<A as App>::Fragment>>::Args;

/// Evaluated when a worker is instantiated for `A`; fails the build if the
/// app's strategy cannot run on the edge layout it declares.
pub(crate) struct AppCheck<A>(PhantomData<A>);

impl<A: App> AppCheck<A> {
    pub(crate) const VALID: () = assert!(
        A::MESSAGE_STRATEGY.supported_by(A::LOAD_STRATEGY),
        "the app's message strategy routes along edges its load strategy drops"
    );
}

/// Reject a fragment that lacks edges `A` reads or routes along.
pub fn check_app_fragment_consistency<A: App>(frag: &A::Fragment) -> Result<(), BspError> {
    let loaded = frag.load_strategy();
    if !loaded.satisfies(A::LOAD_STRATEGY) {
        return Err(BspError::InconsistentApp {
            reason: format!(
                "app reads {:?} edges but fragment {} was loaded with {:?}",
                A::LOAD_STRATEGY,
                frag.fid(),
                loaded
            ),
        });
    }
    if !A::MESSAGE_STRATEGY.supported_by(loaded) {
        return Err(BspError::InconsistentApp {
            reason: format!(
                "message strategy {:?} is not supported by a {:?} fragment",
                A::MESSAGE_STRATEGY,
                loaded
            ),
        });
    }
    Ok(())
}
