//! Type-erased view of a registered sync buffer.

use std::sync::Weak;

use crate::bsp_error::BspError;
use crate::fragment::vertex::{Vertex, VertexRange};
use crate::message::strategy::MessageStrategy;

/// What the message manager needs from a buffer, independent of its value type.
pub(crate) trait AutoSync: Send + Sync {
    /// Bytes per value on the wire.
    fn value_size(&self) -> usize;
    fn range(&self) -> VertexRange;
    /// Visit every updated vertex with its value bytes, then clear the flags.
    fn drain_updated(&self, visit: &mut dyn FnMut(Vertex, &[u8])) -> usize;
    /// Merge incoming values; returns how many changed.
    fn merge_raw(&self, records: &[(Vertex, &[u8])]) -> Result<usize, BspError>;
}

/// One `register_sync_buffer` call. Its position in the manager's list is
/// the slot id carried on the wire, so every fragment must register the same
/// buffers in the same order.
pub(crate) struct Registration {
    pub(crate) handle: Weak<dyn AutoSync>,
    pub(crate) strategy: MessageStrategy,
    pub(crate) value_size: usize,
}
