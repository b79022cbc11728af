//! State-of-the-World (SotW) stream processing.
//!
//! SotW is the original xDS protocol where the entire resource set of a
//! type is sent on each update. [`StreamProcessor`] drives one stream:
//! every request becomes a cache watch, every fired watch becomes a
//! response, and every event passes through the callback pipeline. It is
//! transport-agnostic: requests arrive as a [`Stream`] and responses leave
//! through an `mpsc` channel.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};
use xds_cache::{ConfigWatcher, Response, WatchCancel};
use xds_core::{DiscoveryRequest, DiscoveryResponse, XdsError, XdsResult};

use crate::callbacks::Callbacks;
use crate::stream::{StreamContext, StreamId, StreamIdAllocator};

/// Open watch for one type on a stream.
struct TypeWatch {
    generation: u64,
    cancel: WatchCancel,
}

type Fired = (String, u64, Option<Response>);

/// Watches owned by a stream; cancelled when the stream ends.
///
/// The last nonce sent per type outlives the watch that produced it: a
/// replacement watch keeps the type's nonce until the next response.
#[derive(Default)]
struct StreamWatches {
    by_type: HashMap<String, TypeWatch>,
    nonces: HashMap<String, String>,
    generation: u64,
}

impl StreamWatches {
    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// A request is stale when it answers a response other than the last
    /// one sent for its type.
    fn is_stale(&self, request: &DiscoveryRequest) -> bool {
        if request.response_nonce.is_empty() {
            return false;
        }
        match self.nonces.get(&request.type_url) {
            Some(sent) => *sent != request.response_nonce,
            None => false,
        }
    }
}

impl Drop for StreamWatches {
    fn drop(&mut self) {
        for watch in self.by_type.values() {
            watch.cancel.cancel();
        }
    }
}

/// Drives SotW streams against a [`ConfigWatcher`].
pub struct StreamProcessor {
    watcher: Arc<dyn ConfigWatcher>,
    callbacks: Arc<dyn Callbacks>,
    stream_ids: StreamIdAllocator,
    response_buffer_size: usize,
}

impl std::fmt::Debug for StreamProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamProcessor")
            .field("response_buffer_size", &self.response_buffer_size)
            .finish_non_exhaustive()
    }
}

impl StreamProcessor {
    /// Create a processor answering from `watcher` and reporting to
    /// `callbacks`.
    pub fn new(watcher: Arc<dyn ConfigWatcher>, callbacks: Arc<dyn Callbacks>) -> Self {
        Self {
            watcher,
            callbacks,
            stream_ids: StreamIdAllocator::new(),
            response_buffer_size: 16,
        }
    }

    /// Set the response buffer size used by [`spawn`](Self::spawn).
    pub fn with_response_buffer_size(mut self, size: usize) -> Self {
        self.response_buffer_size = size.max(1);
        self
    }

    /// Run a stream on a new task.
    ///
    /// Returns the response receiver and the task handle, which resolves to
    /// the stream's outcome.
    pub fn spawn<St>(
        self: &Arc<Self>,
        requests: St,
        default_type_url: impl Into<String>,
    ) -> (mpsc::Receiver<DiscoveryResponse>, JoinHandle<XdsResult<()>>)
    where
        St: Stream<Item = XdsResult<DiscoveryRequest>> + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(self.response_buffer_size);
        let processor = Arc::clone(self);
        let default_type_url = default_type_url.into();
        let handle = tokio::spawn(async move {
            let result = processor.process(requests, tx, &default_type_url).await;
            if let Err(e) = &result {
                warn!(error = %e, "stream terminated");
            }
            result
        });
        (rx, handle)
    }

    /// Serve one stream until the client goes away or an error occurs.
    ///
    /// `default_type_url` is empty for aggregated streams and names the
    /// single type otherwise. Close callbacks run exactly once, whatever
    /// the outcome.
    pub async fn process<St>(
        &self,
        requests: St,
        responses: mpsc::Sender<DiscoveryResponse>,
        default_type_url: &str,
    ) -> XdsResult<()>
    where
        St: Stream<Item = XdsResult<DiscoveryRequest>> + Send + Unpin,
    {
        let stream_id = self.stream_ids.allocate();
        let result = self
            .run(stream_id, requests, responses, default_type_url)
            .await;
        self.callbacks.on_stream_closed(stream_id);
        result
    }

    #[instrument(skip_all, fields(stream = %stream_id))]
    async fn run<St>(
        &self,
        stream_id: StreamId,
        mut requests: St,
        responses: mpsc::Sender<DiscoveryResponse>,
        default_type_url: &str,
    ) -> XdsResult<()>
    where
        St: Stream<Item = XdsResult<DiscoveryRequest>> + Send + Unpin,
    {
        self.callbacks.on_stream_open(stream_id, default_type_url)?;
        debug!("stream opened");

        let mut ctx = StreamContext::new(stream_id);
        let mut watches = StreamWatches::default();
        let mut fired: FuturesUnordered<BoxFuture<'static, Fired>> = FuturesUnordered::new();

        loop {
            tokio::select! {
                next = requests.next() => {
                    let Some(request) = next else {
                        debug!(
                            requests = ctx.request_count(),
                            responses = ctx.response_count(),
                            "client closed stream"
                        );
                        return Ok(());
                    };
                    let mut request = request?;

                    // Node is only required on the first request.
                    ctx.observe_node(request.node.as_ref());
                    if request.node.is_none() {
                        request.node = ctx.node().cloned();
                    }
                    if request.type_url.is_empty() {
                        if default_type_url.is_empty() {
                            return Err(XdsError::StreamClosed {
                                reason: "type URL is required on aggregated streams".to_string(),
                            });
                        }
                        request.type_url = default_type_url.to_string();
                    }

                    self.callbacks.on_stream_request(stream_id, &request)?;
                    ctx.record_request();

                    if watches.is_stale(&request) {
                        trace!(
                            type_url = %request.type_url,
                            nonce = %request.response_nonce,
                            "ignoring stale nonce"
                        );
                        continue;
                    }
                    if let Some(open) = watches.by_type.get(&request.type_url) {
                        open.cancel.cancel();
                    }

                    let generation = watches.next_generation();
                    let type_url = request.type_url.clone();
                    let (receiver, cancel) = self.watcher.create_watch(request);
                    watches.by_type.insert(
                        type_url.clone(),
                        TypeWatch { generation, cancel },
                    );
                    fired.push(
                        receiver
                            .recv()
                            .map(move |response| (type_url, generation, response))
                            .boxed(),
                    );
                }
                Some((type_url, generation, response)) = fired.next(), if !fired.is_empty() => {
                    let Some(response) = response else {
                        continue;
                    };
                    let current = watches
                        .by_type
                        .get(&type_url)
                        .map(|w| w.generation == generation)
                        .unwrap_or(false);
                    if !current {
                        trace!(type_url = %type_url, "dropping superseded response");
                        continue;
                    }

                    let mut discovery = encode(&mut ctx, &response)?;
                    self.callbacks
                        .on_stream_response(stream_id, &response.request, &mut discovery);

                    watches.nonces.insert(type_url.clone(), discovery.nonce.clone());
                    trace!(
                        type_url = %type_url,
                        version = %discovery.version_info,
                        nonce = %discovery.nonce,
                        count = discovery.resources.len(),
                        "sending response"
                    );
                    responses
                        .send(discovery)
                        .await
                        .map_err(|_| XdsError::StreamClosed {
                            reason: "response receiver dropped".to_string(),
                        })?;
                    ctx.record_response();
                }
            }
        }
    }
}

fn encode(ctx: &mut StreamContext, response: &Response) -> XdsResult<DiscoveryResponse> {
    let resources = response
        .resources
        .iter()
        .map(|r| {
            r.encode().map_err(|e| XdsError::EncodingError {
                type_url: response.type_url().to_string(),
                message: e.to_string(),
            })
        })
        .collect::<XdsResult<Vec<_>>>()?;

    Ok(DiscoveryResponse {
        version_info: response.version.clone(),
        resources,
        type_url: response.type_url().to_string(),
        nonce: ctx.next_nonce(),
        control_plane: None,
    })
}
