//! Association supervision and keepalive traffic for the receiver.

pub mod association;
pub mod liveness;
pub mod transport;

// Re-export commonly used types
pub use association::{AssociationManager, AssociationState, LinkError, RetryPolicy, Supervision};
pub use liveness::{LivenessSignal, KEEPALIVE_PAYLOAD};
pub use transport::{bind_udp, DatagramSink};
