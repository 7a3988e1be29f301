//! Error types for the xDS CLI.

use thiserror::Error;

/// Broad classification of an [`Error`], used to pick the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad command-line input or configuration, detected before any stream is opened.
    Usage,
    /// A transport or protocol failure that ended the ADS session.
    Session,
}

/// Error type for the xDS CLI.
#[derive(Debug, Error)]
pub enum Error {
    /// A node metadata pair was not of the form `key=value`.
    #[error("invalid --node-metadata value: {0:?}")]
    InvalidMetadataFormat(String),

    /// An explicit node id did not follow `role~address~id~domain`.
    #[error("invalid --node value: {0:?}")]
    InvalidNodeId(String),

    /// The discovery service tag is not one of the supported resource types.
    #[error("unknown discovery service: {0}")]
    UnknownResourceType(String),

    /// The requested xDS API version is not supported.
    #[error("bad api version: {0}")]
    UnsupportedApiVersion(String),

    /// No management server address was given.
    #[error("no servers")]
    NoServers,

    /// A server address could not be parsed as `host:port`.
    #[error("invalid server address {0:?}")]
    InvalidServerAddress(String),

    /// A server host name could not be resolved.
    #[error("failed to resolve {host}: {source}")]
    ResolveServer {
        /// The host that failed to resolve.
        host: String,
        /// The underlying resolver error.
        #[source]
        source: std::io::Error,
    },

    /// The maximum receive message size must be positive.
    #[error("invalid --grpc-max-call-recv-size value")]
    InvalidMaxRecvSize,

    /// Failed to establish a connection to the management server.
    #[error("connection error: {0}")]
    Connection(String),

    /// Connection establishment exceeded the dial timeout.
    #[error("dial timed out after {0:?}")]
    DialTimeout(std::time::Duration),

    /// The operation was cancelled before it completed.
    #[error("cancelled")]
    Cancelled,

    /// Sending a discovery request on the stream failed.
    #[error("failed to send discovery request: {0}")]
    StreamSend(String),

    /// Receiving from the stream failed.
    #[error("stream error: {0}")]
    StreamRecv(#[from] tonic::Status),

    /// The server closed the stream.
    #[error("stream closed by server")]
    StreamClosed,

    /// A send or read on the stream exceeded its timeout.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// A message or resource could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The server sent a resource whose type is not supported.
    #[error("server sent unknown resource type url: {0}")]
    UnknownTypeUrl(String),

    /// A response could not be rendered in the selected output format.
    #[error("render error: {0}")]
    Render(String),

    /// Writing rendered output failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidMetadataFormat(_)
            | Error::InvalidNodeId(_)
            | Error::UnknownResourceType(_)
            | Error::UnsupportedApiVersion(_)
            | Error::NoServers
            | Error::InvalidServerAddress(_)
            | Error::ResolveServer { .. }
            | Error::InvalidMaxRecvSize => ErrorKind::Usage,
            _ => ErrorKind::Session,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Render(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Render(e.to_string())
    }
}

/// Result type alias for xDS CLI operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_usage_errors() {
        assert_eq!(Error::NoServers.kind(), ErrorKind::Usage);
        assert_eq!(
            Error::UnknownResourceType("xds".into()).kind(),
            ErrorKind::Usage
        );
        assert_eq!(
            Error::InvalidMetadataFormat("a".into()).kind(),
            ErrorKind::Usage
        );
    }

    #[test]
    fn stream_errors_are_session_errors() {
        assert_eq!(Error::StreamClosed.kind(), ErrorKind::Session);
        assert_eq!(
            Error::StreamRecv(tonic::Status::unavailable("gone")).kind(),
            ErrorKind::Session
        );
        assert_eq!(
            Error::UnknownTypeUrl("type.googleapis.com/x".into()).kind(),
            ErrorKind::Session
        );
    }
}
