//! Stream adapters shared by the service and the relay.

mod pipe;
mod prefixed;

pub use pipe::{NoOpMetrics, PipeMetrics, pipe_bidirectional};
pub use prefixed::PrefixedStream;
