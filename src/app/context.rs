//! Output helpers and a ready-made single-buffer context.

use std::fmt::Display;
use std::io::Write;
use std::sync::Arc;

use bytemuck::Pod;
use num_traits::Bounded;

use crate::app::Context;
use crate::bsp_error::BspError;
use crate::comm::communicator::Communicator;
use crate::data::aggregate::{Aggregator, MinAggregator};
use crate::data::sync_buffer::SyncBuffer;
use crate::fragment::Fragment;
use crate::fragment::vertex::Vertex;
use crate::message::manager::MessageManager;
use crate::message::strategy::MessageStrategy;

/// Write `<oid> <value>` for every inner vertex of `frag`.
pub fn write_inner_values<F, W, T, FN>(frag: &F, sink: &mut W, value: FN) -> Result<(), BspError>
where
    F: Fragment + ?Sized,
    W: Write,
    T: Display,
    FN: Fn(Vertex) -> T,
{
    for v in frag.inner_vertices() {
        writeln!(sink, "{} {}", frag.get_id(v), value(v))?;
    }
    Ok(())
}

/// One sync buffer over every local vertex, output for inner vertices.
///
/// Values start at `T::max_value()` and merge by minimum unless another
/// aggregator is installed with [`reset`](Self::reset).
pub struct VertexDataContext<F: Fragment, T: Pod> {
    fragment: Arc<F>,
    data: SyncBuffer<T>,
}

impl<F, T> VertexDataContext<F, T>
where
    F: Fragment,
    T: Pod + Send + Sync,
{
    pub fn with_sentinel<A: Aggregator<T>>(fragment: Arc<F>, sentinel: T, merge: A) -> Self {
        let data = SyncBuffer::new(fragment.vertices(), sentinel, merge);
        VertexDataContext { fragment, data }
    }

    pub fn fragment(&self) -> &Arc<F> {
        &self.fragment
    }

    pub fn data(&self) -> &SyncBuffer<T> {
        &self.data
    }

    /// Refill with `sentinel` and switch the merge operator.
    pub fn reset<A: Aggregator<T>>(&self, sentinel: T, merge: A) {
        self.data.init(self.fragment.vertices(), sentinel, merge);
    }

    pub fn write<W: Write>(&self, sink: &mut W) -> Result<(), BspError>
    where
        T: Display,
    {
        let values = self.data.values();
        let all = self.fragment.vertices();
        write_inner_values(&*self.fragment, sink, |v| values[all.offset_of(v)])
    }
}

impl<F, T> Context<F> for VertexDataContext<F, T>
where
    F: Fragment,
    T: Pod + Send + Sync + Bounded + PartialOrd + Display,
{
    /// Strategy to register the buffer under; `None` keeps it local.
    type Args = Option<MessageStrategy>;

    fn new(fragment: Arc<F>) -> Self {
        Self::with_sentinel(fragment, T::max_value(), MinAggregator)
    }

    fn init<C: Communicator>(
        &mut self,
        messages: &mut MessageManager<F, C>,
        args: Self::Args,
    ) -> Result<(), BspError> {
        match args {
            Some(strategy) => messages.register_sync_buffer(&self.data, strategy),
            None => Ok(()),
        }
    }

    fn output<W: Write>(&self, sink: &mut W) -> Result<(), BspError> {
        self.write(sink)
    }
}
