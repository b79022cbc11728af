//! Watch handles for cache update notifications.
//!
//! A watch is a single-shot subscription: the cache fills it at most once
//! with a [`Response`] and then forgets it. The pieces are:
//! - [`WatchId`] identifying a watch within its cache
//! - [`WatchReceiver`], the consumer end that awaits the response
//! - [`WatchCancel`], an idempotent handle that deregisters a pending watch

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;
use xds_core::{BoxResource, DiscoveryRequest, XdsError, XdsResult};

/// Unique identifier for a watch within one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

impl WatchId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the numeric value of this watch ID.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// Resources delivered to a watch or returned by a fetch.
#[derive(Debug, Clone)]
pub struct Response {
    /// The request this response answers.
    pub request: DiscoveryRequest,
    /// Version of the requested type in the snapshot that produced it.
    pub version: String,
    /// Every resource of the requested type, ordered by name.
    pub resources: Vec<BoxResource>,
}

impl Response {
    /// Type URL of the delivered resources.
    #[inline]
    pub fn type_url(&self) -> &str {
        &self.request.type_url
    }
}

/// Consumer end of a watch.
#[derive(Debug)]
pub struct WatchReceiver {
    id: WatchId,
    receiver: oneshot::Receiver<Response>,
}

impl WatchReceiver {
    pub(crate) fn new(id: WatchId, receiver: oneshot::Receiver<Response>) -> Self {
        Self { id, receiver }
    }

    /// Get the unique identifier for this watch.
    #[inline]
    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Wait for the response.
    ///
    /// Returns `None` if the watch was cancelled or its node cleared before
    /// a response was delivered.
    pub async fn recv(self) -> Option<Response> {
        self.receiver.await.ok()
    }

    /// Take the response without waiting.
    ///
    /// `Ok(None)` means the watch is still pending. A watch that was
    /// cancelled, cleared or already drained reports
    /// [`XdsError::WatchClosed`].
    pub fn try_recv(&mut self) -> XdsResult<Option<Response>> {
        match self.receiver.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(XdsError::WatchClosed {
                watch_id: self.id.0,
            }),
        }
    }
}

/// Handle that deregisters a pending watch.
///
/// Cloning shares the same registration. Cancelling twice, or cancelling a
/// watch that already fired, does nothing.
#[derive(Clone)]
pub struct WatchCancel {
    id: Option<WatchId>,
    cancel: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl WatchCancel {
    pub(crate) fn new(id: WatchId, cancel: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            id: Some(id),
            cancel: Some(Arc::new(cancel)),
        }
    }

    /// Handle for a watch that was answered immediately and never registered.
    pub fn noop() -> Self {
        Self {
            id: None,
            cancel: None,
        }
    }

    /// The watch this handle cancels, if it was registered.
    #[inline]
    pub fn id(&self) -> Option<WatchId> {
        self.id
    }

    /// Deregister the watch.
    pub fn cancel(&self) {
        if let Some(cancel) = &self.cancel {
            cancel();
        }
    }
}

impl fmt::Debug for WatchCancel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchCancel").field("id", &self.id).finish()
    }
}

/// Registered half of a watch, owned by the cache.
#[derive(Debug)]
pub(crate) struct PendingWatch {
    pub(crate) request: DiscoveryRequest,
    sender: oneshot::Sender<Response>,
}

impl PendingWatch {
    pub(crate) fn new(request: DiscoveryRequest, sender: oneshot::Sender<Response>) -> Self {
        Self { request, sender }
    }

    /// Fill the watch. Returns false if the receiver is already gone.
    pub(crate) fn deliver(self, version: String, resources: Vec<BoxResource>) -> bool {
        self.sender
            .send(Response {
                request: self.request,
                version,
                resources,
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn pending_watch_delivers_once() {
        let (tx, rx) = oneshot::channel();
        let pending = PendingWatch::new(DiscoveryRequest::new("t", ""), tx);
        let receiver = WatchReceiver::new(WatchId::new(7), rx);
        assert_eq!(receiver.id().to_string(), "watch-7");

        assert!(pending.deliver("v1".to_string(), Vec::new()));

        let response = receiver.recv().await.expect("response");
        assert_eq!(response.version, "v1");
        assert_eq!(response.type_url(), "t");
    }

    #[test]
    fn dropped_sender_closes_receiver() {
        let (tx, rx) = oneshot::channel::<Response>();
        let mut receiver = WatchReceiver::new(WatchId::new(1), rx);
        assert!(matches!(receiver.try_recv(), Ok(None)));

        drop(tx);
        assert!(matches!(
            receiver.try_recv(),
            Err(XdsError::WatchClosed { watch_id: 1 })
        ));
    }

    #[test]
    fn cancel_runs_closure_and_noop_does_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cancel = WatchCancel::new(WatchId::new(3), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        cancel.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cancel.id(), Some(WatchId::new(3)));

        let noop = WatchCancel::noop();
        noop.cancel();
        assert!(noop.id().is_none());
    }
}
