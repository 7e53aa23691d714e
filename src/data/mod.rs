//! Per-vertex data: dense arrays, merge operators and sync buffers.

pub mod aggregate;
pub mod sync_buffer;
pub mod vertex_array;

pub use aggregate::{Aggregator, MaxAggregator, MinAggregator, OverwriteAggregator};
pub use sync_buffer::SyncBuffer;
pub use vertex_array::VertexArray;
