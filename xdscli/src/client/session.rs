//! The ADS session: a sender task and a receiver task sharing one stream.
//!
//! The stream is full duplex, so the halves are driven independently: the
//! server may push the next response before our acknowledgment of the
//! previous one is flushed. The tasks only talk through three capacity-1
//! channels:
//! - responses: receiver -> coordinator, the decoded response to emit
//! - acks: receiver -> sender, the nonce to acknowledge
//! - errors: either task -> coordinator, first error wins
//!
//! A shared [`CancellationToken`] stops both tasks. Every blocking point
//! races it, and the coordinator joins both tasks before the stream is closed.
//!
//! Only the sender task publishes [`SessionState`] while the session runs;
//! the coordinator publishes `Closed` once both tasks are joined.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::client::config::ClientConfig;
use crate::codec::XdsCodec;
use crate::error::{Error, Result};
use crate::message::{DiscoveryRequest, DiscoveryResponse};
use crate::transport::{TransportSink, TransportSource};

/// How long a graceful close waits for the server to finish the stream
/// after the request side was half-closed.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Protocol state of an ADS session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The initial request has not been sent yet.
    Starting,
    /// Waiting for the server to push a response.
    AwaitingResponse,
    /// A response was received and its nonce is being acknowledged.
    Acknowledging,
    /// One-shot mode: the single acknowledgment was sent, nothing more will be.
    Draining,
    /// The stream was released.
    Closed,
}

type StateTx = Arc<watch::Sender<SessionState>>;

fn set_state(state: &StateTx, next: SessionState) {
    let prev = state.send_replace(next);
    if prev != next {
        tracing::debug!(from = ?prev, to = ?next, "session state");
    }
}

/// A running ADS session.
///
/// Created by [`AdsSession::start`], which spawns the sender and receiver
/// tasks. The owner polls [`responses`](Self::recv_response) and
/// [`errors`](Self::recv_error) and finishes the session with either
/// [`shutdown`](Self::shutdown) or [`drain`](Self::drain).
#[derive(Debug)]
pub struct AdsSession<K, S> {
    stop: CancellationToken,
    state: StateTx,
    sender: JoinHandle<K>,
    receiver: JoinHandle<S>,
    pub(crate) responses: mpsc::Receiver<DiscoveryResponse>,
    pub(crate) errors: mpsc::Receiver<Error>,
}

impl<K: TransportSink, S: TransportSource> AdsSession<K, S> {
    /// Start a session on an already opened stream.
    ///
    /// `stop` is the session's stop signal; cancelling it (or a parent
    /// token) makes both tasks exit at their next suspension point.
    pub fn start<C: XdsCodec>(
        sink: K,
        source: S,
        codec: C,
        config: ClientConfig,
        stop: CancellationToken,
    ) -> Self {
        let codec = Arc::new(codec);
        let config = Arc::new(config);
        let (state, _) = watch::channel(SessionState::Starting);
        let state = Arc::new(state);

        let (ack_tx, ack_rx) = mpsc::channel(1);
        let (response_tx, response_rx) = mpsc::channel(1);
        let (error_tx, error_rx) = mpsc::channel(1);

        let sender = SendLoop {
            sink,
            codec: Arc::clone(&codec),
            config: Arc::clone(&config),
            acks: ack_rx,
            errors: error_tx.clone(),
            stop: stop.clone(),
            state: Arc::clone(&state),
        };
        let receiver = RecvLoop {
            source,
            codec,
            watch: config.watch,
            read_timeout: config.read_timeout,
            responses: response_tx,
            acks: ack_tx,
            errors: error_tx,
            stop: stop.clone(),
        };

        let sender = tokio::spawn(sender.run().instrument(tracing::debug_span!("ads_send")));
        let receiver = tokio::spawn(receiver.run().instrument(tracing::debug_span!("ads_recv")));

        Self {
            stop,
            state,
            sender,
            receiver,
            responses: response_rx,
            errors: error_rx,
        }
    }

    /// The current protocol state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribe to protocol state changes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Wait for the next response handed off by the receiver.
    ///
    /// Returns `None` once the receiver has exited and no response is pending.
    pub async fn recv_response(&mut self) -> Option<DiscoveryResponse> {
        self.responses.recv().await
    }

    /// Wait for the first fatal error reported by either task.
    ///
    /// Returns `None` once both tasks have exited without error.
    pub async fn recv_error(&mut self) -> Option<Error> {
        self.errors.recv().await
    }

    /// Stop both tasks, wait for them to exit, then close the stream.
    pub async fn shutdown(self) {
        self.stop.cancel();
        self.join_and_close(false).await;
    }

    /// Wait for both tasks to finish on their own, then close the stream
    /// gracefully.
    ///
    /// Used in one-shot mode, where the tasks exit after a single exchange.
    /// The request side is half-closed and the response side is read until
    /// the server ends the stream, so every request already handed to the
    /// transport has reached the server when this returns. The wait is
    /// bounded by [`CLOSE_TIMEOUT`] and by the stop signal: cancelling it
    /// turns the drain into a [`shutdown`](Self::shutdown).
    pub async fn drain(self) {
        let stop = self.stop.clone();
        self.join_and_close(true).await;
        stop.cancel();
    }

    async fn join_and_close(mut self, graceful: bool) {
        let sink = match self.sender.await {
            Ok(sink) => Some(sink),
            Err(e) => {
                tracing::warn!("ADS sender task failed: {e}");
                None
            }
        };
        let source = match self.receiver.await {
            Ok(source) => Some(source),
            Err(e) => {
                tracing::warn!("ADS receiver task failed: {e}");
                None
            }
        };

        if let Some(sink) = sink {
            sink.close().await;
        }
        if let Some(source) = source.filter(|_| graceful) {
            wait_for_end(source, &self.stop).await;
        }
        set_state(&self.state, SessionState::Closed);

        // Errors raised while shutting down are not reported.
        while let Ok(e) = self.errors.try_recv() {
            tracing::debug!("discarding error after shutdown: {e}");
        }
    }
}

/// Read `source` until the server ends the stream, the stream fails, the
/// session is stopped or [`CLOSE_TIMEOUT`] passes. Responses read here are
/// discarded.
async fn wait_for_end<S: TransportSource>(mut source: S, stop: &CancellationToken) {
    let end_of_stream = async {
        loop {
            match source.recv().await {
                Ok(Some(_)) => tracing::debug!("discarding response received while closing"),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("stream ended with error while closing: {e}");
                    break;
                }
            }
        }
    };

    tokio::select! {
        biased;
        _ = stop.cancelled() => {}
        result = tokio::time::timeout(CLOSE_TIMEOUT, end_of_stream) => {
            if result.is_err() {
                tracing::debug!("server did not end the stream within {CLOSE_TIMEOUT:?}");
            }
        }
    }
}

/// Offer `error` to the coordinator. Only the first error is kept.
fn report(errors: &mpsc::Sender<Error>, error: Error) {
    if matches!(error, Error::Cancelled) {
        return;
    }
    tracing::debug!("session error: {error}");
    if let Err(mpsc::error::TrySendError::Full(error)) = errors.try_send(error) {
        tracing::debug!("dropping error, session already failing: {error}");
    }
}

async fn with_timeout<T>(
    limit: Option<Duration>,
    what: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(what))?,
        None => fut.await,
    }
}

/// Owns the request half of the stream.
struct SendLoop<K, C> {
    sink: K,
    codec: Arc<C>,
    config: Arc<ClientConfig>,
    acks: mpsc::Receiver<String>,
    errors: mpsc::Sender<Error>,
    stop: CancellationToken,
    state: StateTx,
}

impl<K: TransportSink, C: XdsCodec> SendLoop<K, C> {
    /// Runs until stopped, failed, or (one-shot) after the first ACK.
    /// Hands the sink back so the stream can be closed after the join.
    async fn run(mut self) -> K {
        // Only the first request declares the subscription.
        let config = Arc::clone(&self.config);
        if let Err(e) = self.send(&config.resource_names, "").await {
            report(&self.errors, e);
            return self.sink;
        }
        set_state(&self.state, SessionState::AwaitingResponse);

        loop {
            let nonce = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                nonce = self.acks.recv() => match nonce {
                    Some(nonce) => nonce,
                    None => break,
                },
            };

            set_state(&self.state, SessionState::Acknowledging);
            if let Err(e) = self.send(&[], &nonce).await {
                report(&self.errors, e);
                break;
            }
            tracing::debug!(%nonce, "acknowledged response");

            if !config.watch {
                set_state(&self.state, SessionState::Draining);
                break;
            }
            set_state(&self.state, SessionState::AwaitingResponse);
        }

        self.sink
    }

    async fn send(&mut self, resource_names: &[String], nonce: &str) -> Result<()> {
        let config = &self.config;
        let error_detail = if nonce.is_empty() {
            None
        } else {
            config.error_detail.as_ref()
        };
        let request = DiscoveryRequest::build(
            &config.node,
            config.resource_type,
            resource_names,
            &config.initial_version_info,
            nonce,
        )
        .with_error_detail(error_detail);
        let bytes = self.codec.encode_request(&request)?;

        tokio::select! {
            biased;
            _ = self.stop.cancelled() => Err(Error::Cancelled),
            result = with_timeout(config.send_timeout, "send", self.sink.send(bytes)) => result,
        }
    }
}

/// Owns the response half of the stream.
struct RecvLoop<S, C> {
    source: S,
    codec: Arc<C>,
    watch: bool,
    read_timeout: Option<Duration>,
    responses: mpsc::Sender<DiscoveryResponse>,
    acks: mpsc::Sender<String>,
    errors: mpsc::Sender<Error>,
    stop: CancellationToken,
}

impl<S: TransportSource, C: XdsCodec> RecvLoop<S, C> {
    /// Runs until stopped, failed, or (one-shot) after the first handoff.
    /// Hands the source back so a graceful close can read the stream to its end.
    async fn run(mut self) -> S {
        loop {
            let response = match self.recv().await {
                Ok(response) => response,
                Err(e) => {
                    report(&self.errors, e);
                    return self.source;
                }
            };
            tracing::debug!(
                version = %response.version_info,
                nonce = %response.nonce,
                resources = response.resources.len(),
                "received response"
            );
            let nonce = response.nonce.clone();
            if !hand_off(&self.stop, &self.responses, response).await
                || !hand_off(&self.stop, &self.acks, nonce).await
            {
                return self.source;
            }

            if !self.watch {
                return self.source;
            }
        }
    }

    async fn recv(&mut self) -> Result<DiscoveryResponse> {
        let bytes = tokio::select! {
            biased;
            _ = self.stop.cancelled() => return Err(Error::Cancelled),
            result = with_timeout(self.read_timeout, "read", self.source.recv()) => result?,
        };

        match bytes {
            Some(bytes) => self.codec.decode_response(bytes),
            None => Err(Error::StreamClosed),
        }
    }
}

/// Single-slot handoff. Returns false if the session is stopping.
async fn hand_off<T>(stop: &CancellationToken, tx: &mpsc::Sender<T>, value: T) -> bool {
    tokio::select! {
        biased;
        _ = stop.cancelled() => false,
        result = tx.send(value) => result.is_ok(),
    }
}
