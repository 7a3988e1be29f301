//! In-memory transport for session tests.

use std::sync::Mutex;

use bytes::Bytes;
use envoy_types::pb::envoy::service::discovery::v3 as discovery;
use envoy_types::pb::google::protobuf::Any;
use prost::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportSink, TransportSource};

/// A transport whose single stream is wired to a [`MockServer`].
#[derive(Debug)]
pub(crate) struct MockTransport {
    halves: Mutex<Option<(MockSink, MockSource)>>,
}

/// The test's view of the stream: observes requests, injects responses.
#[derive(Debug)]
pub(crate) struct MockServer {
    requests: mpsc::UnboundedReceiver<Bytes>,
    responses: Option<mpsc::UnboundedSender<Result<Bytes>>>,
    closed: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendMode {
    Deliver,
    Fail,
    StallAfterFirst,
}

#[derive(Debug)]
pub(crate) struct MockSink {
    requests: mpsc::UnboundedSender<Bytes>,
    mode: SendMode,
    sent: usize,
    closed: CancellationToken,
}

/// Ends the response stream once the sink is closed and every queued
/// response was read, like a server finishing its half of the call.
#[derive(Debug)]
pub(crate) struct MockSource {
    responses: mpsc::UnboundedReceiver<Result<Bytes>>,
    closed: CancellationToken,
}

impl MockTransport {
    pub(crate) fn new() -> (Self, MockServer) {
        Self::build(SendMode::Deliver)
    }

    /// A transport whose sends always fail.
    pub(crate) fn failing_sends() -> (Self, MockServer) {
        Self::build(SendMode::Fail)
    }

    /// A transport that delivers the first request and then never
    /// completes another send.
    pub(crate) fn stalled_sends() -> (Self, MockServer) {
        Self::build(SendMode::StallAfterFirst)
    }

    fn build(mode: SendMode) -> (Self, MockServer) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();

        let sink = MockSink {
            requests: request_tx,
            mode,
            sent: 0,
            closed: closed.clone(),
        };
        let source = MockSource {
            responses: response_rx,
            closed: closed.clone(),
        };
        let server = MockServer {
            requests: request_rx,
            responses: Some(response_tx),
            closed,
        };

        (
            Self {
                halves: Mutex::new(Some((sink, source))),
            },
            server,
        )
    }
}

impl Transport for MockTransport {
    type Sink = MockSink;
    type Source = MockSource;

    async fn new_stream(&self) -> Result<(MockSink, MockSource)> {
        self.halves
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::Connection("mock stream already opened".to_string()))
    }
}

impl TransportSink for MockSink {
    async fn send(&mut self, request: Bytes) -> Result<()> {
        match self.mode {
            SendMode::Fail => return Err(Error::StreamSend("mock send failure".to_string())),
            SendMode::StallAfterFirst if self.sent > 0 => std::future::pending::<()>().await,
            _ => {}
        }
        self.sent += 1;
        self.requests
            .send(request)
            .map_err(|_| Error::StreamSend("mock server gone".to_string()))
    }

    async fn close(self) {
        self.closed.cancel();
    }
}

impl TransportSource for MockSource {
    async fn recv(&mut self) -> Result<Option<Bytes>> {
        tokio::select! {
            biased;
            item = self.responses.recv() => match item {
                Some(result) => result.map(Some),
                None => Ok(None),
            },
            _ = self.closed.cancelled() => Ok(None),
        }
    }
}

impl MockServer {
    /// Push a response carrying `resources` of `type_url`.
    pub(crate) fn respond(&self, version: &str, nonce: &str, type_url: &str, resources: Vec<Any>) {
        let response = discovery::DiscoveryResponse {
            version_info: version.to_string(),
            type_url: type_url.to_string(),
            nonce: nonce.to_string(),
            resources,
            ..Default::default()
        };
        self.push(Ok(response.encode_to_vec().into()));
    }

    /// Push raw bytes as the next response frame.
    pub(crate) fn respond_raw(&self, bytes: Bytes) {
        self.push(Ok(bytes));
    }

    /// Make the next read fail with `error`.
    pub(crate) fn fail(&self, error: Error) {
        self.push(Err(error));
    }

    /// Close the response stream; subsequent reads observe end-of-stream.
    pub(crate) fn hang_up(&mut self) {
        self.responses = None;
    }

    fn push(&self, item: Result<Bytes>) {
        if let Some(tx) = &self.responses {
            let _ = tx.send(item);
        }
    }

    /// Wait for the next request sent by the client.
    pub(crate) async fn next_request(&mut self) -> Option<discovery::DiscoveryRequest> {
        let bytes = self.requests.recv().await?;
        Some(discovery::DiscoveryRequest::decode(bytes).unwrap())
    }

    /// Drain every request sent so far, waiting for the sink to be dropped.
    pub(crate) async fn all_requests(&mut self) -> Vec<discovery::DiscoveryRequest> {
        let mut requests = Vec::new();
        while let Some(request) = self.next_request().await {
            requests.push(request);
        }
        requests
    }

    /// Whether the client closed its request stream.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
