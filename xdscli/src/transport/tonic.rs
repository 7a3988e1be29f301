//! `tonic` based transport implementation.
//!
//! This transport uses tonic's low-level `Grpc` client with a `BytesCodec`
//! to send and receive raw bytes, allowing the session layer to handle
//! serialization/deserialization independently.

use std::mem;

use crate::client::config::ServerConfig;
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportBuilder, TransportSink, TransportSource};
use bytes::{Buf, BufMut, Bytes};
use http::uri::PathAndQuery;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::client::Grpc;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::transport::{Channel, Endpoint};
use tonic::{Status, Streaming};

/// The gRPC path for the ADS StreamAggregatedResources RPC.
const ADS_PATH: &str =
    "/envoy.service.discovery.v3.AggregatedDiscoveryService/StreamAggregatedResources";

const ADS_CHANNEL_BUFFER_SIZE: usize = 16;

/// A codec that passes bytes through without serialization.
#[derive(Debug, Clone, Copy)]
struct BytesCodec;

impl Codec for BytesCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = BytesEncoder;
    type Decoder = BytesDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        BytesEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        BytesDecoder
    }
}

#[derive(Debug)]
struct BytesEncoder;

impl Encoder for BytesEncoder {
    type Item = Bytes;
    type Error = Status;

    fn encode(
        &mut self,
        item: Self::Item,
        dst: &mut EncodeBuf<'_>,
    ) -> std::result::Result<(), Self::Error> {
        dst.put_slice(&item);
        Ok(())
    }
}

#[derive(Debug)]
struct BytesDecoder;

impl Decoder for BytesDecoder {
    type Item = Bytes;
    type Error = Status;

    fn decode(
        &mut self,
        src: &mut DecodeBuf<'_>,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        Ok(Some(src.copy_to_bytes(src.remaining())))
    }
}

/// Factory for creating ADS streams using tonic.
#[derive(Clone, Debug)]
pub struct TonicTransport {
    channel: Channel,
    max_decoding_message_size: Option<usize>,
}

impl TonicTransport {
    /// Create a transport from an existing tonic [`Channel`].
    pub fn from_channel(channel: Channel) -> Self {
        Self {
            channel,
            max_decoding_message_size: None,
        }
    }

    /// Limit the size of a single decoded response message.
    pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
        self.max_decoding_message_size = Some(limit);
        self
    }

    /// Connect to an xDS server with default settings.
    pub async fn connect(uri: impl Into<String>) -> Result<Self> {
        let uri: String = uri.into();
        let channel = Channel::from_shared(uri)
            .map_err(|e| Error::Connection(e.to_string()))?
            .connect()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(Self::from_channel(channel))
    }
}

/// Builder for creating [`TonicTransport`] instances from a [`ServerConfig`].
///
/// Picks one endpoint at random and dials it with the configured connect
/// timeout, HTTP/2 keep-alive and message size limit.
#[derive(Debug, Clone, Default)]
pub struct TonicTransportBuilder {}

impl TonicTransportBuilder {
    /// Create a new transport builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransportBuilder for TonicTransportBuilder {
    type Transport = TonicTransport;

    async fn build(&self, server: &ServerConfig) -> Result<Self::Transport> {
        let addr = server.pick_endpoint().ok_or(Error::NoServers)?;
        let keepalive = &server.keepalive;

        tracing::info!(%addr, "connecting to xDS server");

        // TODO: TLS support, needs a --ca-cert option and a tonic tls feature.
        let channel = Endpoint::from_shared(format!("http://{addr}"))
            .map_err(|e| Error::Connection(e.to_string()))?
            .connect_timeout(server.dial_timeout)
            .http2_keep_alive_interval(keepalive.interval)
            .keep_alive_timeout(keepalive.timeout)
            .keep_alive_while_idle(keepalive.while_idle)
            .connect()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(TonicTransport::from_channel(channel)
            .max_decoding_message_size(server.max_recv_message_size))
    }
}

impl Transport for TonicTransport {
    type Sink = TonicAdsSink;
    type Source = TonicAdsSource;

    async fn new_stream(&self) -> Result<(Self::Sink, Self::Source)> {
        let mut grpc = Grpc::new(self.channel.clone());
        if let Some(limit) = self.max_decoding_message_size {
            grpc = grpc.max_decoding_message_size(limit);
        }

        grpc.ready()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let (tx, rx) = mpsc::channel::<Bytes>(ADS_CHANNEL_BUFFER_SIZE);

        // The call itself is started by the first recv(). Some servers do not
        // send response headers until they receive the first request, so the
        // request stream must be fed independently of waiting for headers.
        Ok((
            TonicAdsSink { sender: tx },
            TonicAdsSource {
                state: SourceState::Pending {
                    grpc,
                    requests: ReceiverStream::new(rx),
                },
            },
        ))
    }
}

/// The request half of an ADS stream backed by tonic.
///
/// `send` only queues the request for the call's body. Dropping the sink
/// ends the body once the queued requests are written.
#[derive(Debug)]
pub struct TonicAdsSink {
    sender: mpsc::Sender<Bytes>,
}

impl TransportSink for TonicAdsSink {
    async fn send(&mut self, request: Bytes) -> Result<()> {
        self.sender
            .send(request)
            .await
            .map_err(|_| Error::StreamSend("request stream closed".to_string()))
    }
}

/// The response half of an ADS stream backed by tonic.
#[derive(Debug)]
pub struct TonicAdsSource {
    state: SourceState,
}

#[derive(Debug)]
enum SourceState {
    Pending {
        grpc: Grpc<Channel>,
        requests: ReceiverStream<Bytes>,
    },
    Open(Streaming<Bytes>),
    Closed,
}

impl TransportSource for TonicAdsSource {
    async fn recv(&mut self) -> Result<Option<Bytes>> {
        self.state = match mem::replace(&mut self.state, SourceState::Closed) {
            SourceState::Pending { mut grpc, requests } => {
                let path = PathAndQuery::from_static(ADS_PATH);
                let response = grpc
                    .streaming(tonic::Request::new(requests), path, BytesCodec)
                    .await?;
                SourceState::Open(response.into_inner())
            }
            state => state,
        };

        match &mut self.state {
            SourceState::Open(stream) => Ok(stream.message().await?),
            _ => Ok(None),
        }
    }
}
