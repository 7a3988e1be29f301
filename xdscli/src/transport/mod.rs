//! Provides abstraction for transport layers.

use crate::client::config::ServerConfig;
use crate::error::Result;
use bytes::Bytes;
use std::future::Future;

pub mod tonic;

#[cfg(test)]
pub(crate) mod mock;

/// Builds a [`Transport`] connected to one of the configured servers.
pub trait TransportBuilder: Send + Sync + 'static {
    /// The transport type produced by this builder.
    type Transport: Transport;

    /// Dial a server from `server` and return a connected transport.
    fn build(&self, server: &ServerConfig) -> impl Future<Output = Result<Self::Transport>> + Send;
}

/// Factory for creating xDS transport streams.
///
/// This abstraction allows for different transport implementations:
/// - Tonic-based gRPC transport
/// - Mock transport for testing
pub trait Transport: Send + Sync + 'static {
    /// The request half of a stream.
    type Sink: TransportSink;
    /// The response half of a stream.
    type Source: TransportSource;

    /// Creates a new bidirectional ADS stream to the xDS server, split into
    /// its request and response halves.
    ///
    /// The halves are driven by separate tasks, so a pending read never
    /// blocks a send and vice versa.
    fn new_stream(&self) -> impl Future<Output = Result<(Self::Sink, Self::Source)>> + Send;
}

/// The request half of an ADS stream.
///
/// Raw byte transport: the bytes are serialized DiscoveryRequests, encoding
/// is handled by the session's codec.
pub trait TransportSink: Send + 'static {
    /// Send serialized DiscoveryRequest bytes to the server.
    fn send(&mut self, request: Bytes) -> impl Future<Output = Result<()>> + Send;

    /// Close the request side of the stream. Requests already sent are
    /// still delivered, then the server observes the end of the stream.
    fn close(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized,
    {
        async move { drop(self) }
    }
}

/// The response half of an ADS stream.
pub trait TransportSource: Send + 'static {
    /// Receive serialized DiscoveryResponse bytes from the server.
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` - Received a response.
    /// - `Ok(None)` - Stream closed normally.
    /// - `Err(_)` - Stream error (connection dropped, etc.)
    fn recv(&mut self) -> impl Future<Output = Result<Option<Bytes>>> + Send;
}
