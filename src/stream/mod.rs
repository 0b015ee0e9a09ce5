//! Event-stream capability seam
//!
//! The pinger and the inserter never talk to each other directly; their
//! only synchronization is an at-least-once, possibly reordered-across-
//! partitions event stream, consumed through these two narrow traits.
//!
//! A broker-backed transport (Kafka and friends) lives behind the same
//! traits in its own crate; this one ships only the in-process
//! [`channel`] transport for single-process deployments and tests.

pub mod channel;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

pub use channel::{ChannelConsumer, ChannelProducer, channel_stream};

/// Result type alias for stream operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur on the stream transport
#[derive(Debug)]
pub enum StreamError {
    /// The transport is closed and cannot accept more payloads
    Closed(String),

    /// Transport-specific failure
    TransportError(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Closed(msg) => write!(f, "stream closed: {}", msg),
            StreamError::TransportError(msg) => write!(f, "stream transport error: {}", msg),
        }
    }
}

impl std::error::Error for StreamError {}

/// Producer side of the event stream.
///
/// `send` is fire-and-forget from the pipeline's point of view; batching,
/// if any, is the transport's own business.
#[async_trait]
pub trait StreamProducer: Send + Sync {
    /// Publish one payload to a topic.
    async fn send(&self, topic: &str, payload: Vec<u8>) -> StreamResult<()>;

    /// Release the transport's resources.
    async fn close(&self);
}

/// Consumer side of the event stream.
#[async_trait]
pub trait StreamConsumer: Send + Sync {
    /// Return whatever payloads are currently available, keyed by
    /// partition, without blocking. An empty map is not an error.
    async fn poll(&self) -> HashMap<u32, Vec<Vec<u8>>>;

    /// Release the transport's resources.
    async fn close(&self);
}
