//! Stream identification and per-stream state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use xds_core::Node;

/// Unique identifier for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    /// Wrap a raw stream number.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the numeric value.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Hands out increasing stream ids.
///
/// Owned by whoever accepts streams, so independent servers never share a
/// counter.
#[derive(Debug)]
pub struct StreamIdAllocator {
    next: AtomicU64,
}

impl Default for StreamIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamIdAllocator {
    /// Allocator starting at 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Allocator whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Take the next id.
    pub fn allocate(&self) -> StreamId {
        StreamId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// State of one open stream.
///
/// Tracks:
/// - the node announced on the first request
/// - the nonce sequence for responses
/// - request and response counts
#[derive(Debug)]
pub struct StreamContext {
    id: StreamId,
    node: Option<Node>,
    created_at: Instant,
    nonce: u64,
    requests: u64,
    responses: u64,
}

impl StreamContext {
    /// Create a new stream context.
    pub fn new(id: StreamId) -> Self {
        Self {
            id,
            node: None,
            created_at: Instant::now(),
            nonce: 0,
            requests: 0,
            responses: 0,
        }
    }

    /// Get the stream ID.
    #[inline]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Node announced on this stream, if any.
    #[inline]
    pub fn node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    /// Remember `node` if it is the first one seen.
    pub fn observe_node(&mut self, node: Option<&Node>) {
        if self.node.is_none() {
            self.node = node.cloned();
        }
    }

    /// Get stream duration.
    #[inline]
    pub fn duration(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Next response nonce on this stream.
    pub fn next_nonce(&mut self) -> String {
        self.nonce += 1;
        self.nonce.to_string()
    }

    /// Record a request.
    pub fn record_request(&mut self) {
        self.requests += 1;
    }

    /// Record a response.
    pub fn record_response(&mut self) {
        self.responses += 1;
    }

    /// Get total requests.
    #[inline]
    pub fn request_count(&self) -> u64 {
        self.requests
    }

    /// Get total responses.
    #[inline]
    pub fn response_count(&self) -> u64 {
        self.responses
    }
}
