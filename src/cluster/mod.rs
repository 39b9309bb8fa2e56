//! Star-topology process-group message relay.
//!
//! One [`Relay`](relay::Relay) process fans frames out; every other process
//! holds a [`ClusterTransport`](transport::ClusterTransport) that sends,
//! receives and dispatches topic-addressed messages. Members talk only to
//! the relay, never to each other.

pub mod message;
pub mod relay;
pub mod subscription;
pub mod transport;

/// Upper bound on one wire frame. Envelopes are small; anything larger is a
/// protocol violation.
pub(crate) const MAX_FRAME_LEN: usize = 1024 * 1024;
