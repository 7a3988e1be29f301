//! Crate-owned xDS message types.
//!
//! These types are codegen-agnostic and serve as the interface between
//! the ADS session and the codec layer. The codec converts these
//! to/from the wire format (prost/envoy-types).

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::resource::ResourceType;

/// A discovery request to send to the xDS server.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryRequest<'a> {
    /// The version_info of the most recent successfully processed response,
    /// or the configured initial version.
    pub version_info: &'a str,
    /// The node making the request.
    pub node: &'a Node,
    /// List of resource names to subscribe to. Only populated on the first
    /// request of a stream.
    pub resource_names: &'a [String],
    /// Type URL of the resource being requested.
    pub type_url: &'a str,
    /// The nonce being acknowledged, or empty for the first request.
    pub response_nonce: &'a str,
    /// Error details if this is a NACK (negative acknowledgment).
    pub error_detail: Option<&'a ErrorDetail>,
}

impl<'a> DiscoveryRequest<'a> {
    /// Build a request for `resource_type`.
    ///
    /// Callers pass the subscription's resource names on the first request
    /// and an empty slice afterwards; the server remembers the subscription
    /// for the lifetime of the stream.
    pub fn build(
        node: &'a Node,
        resource_type: ResourceType,
        resource_names: &'a [String],
        version_info: &'a str,
        response_nonce: &'a str,
    ) -> Self {
        Self {
            version_info,
            node,
            resource_names,
            type_url: resource_type.type_url(),
            response_nonce,
            error_detail: None,
        }
    }

    /// Attach error details, turning this request into a NACK.
    pub fn with_error_detail(mut self, error_detail: Option<&'a ErrorDetail>) -> Self {
        self.error_detail = error_detail;
        self
    }
}

/// A discovery response from the xDS server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryResponse {
    /// The version of the response data.
    pub version_info: String,
    /// The response resources wrapped as Any protos.
    pub resources: Vec<ResourceAny>,
    /// Whether the response is a canary.
    pub canary: bool,
    /// Type URL of the resources.
    pub type_url: String,
    /// Nonce for this response, to be echoed back in the next request.
    pub nonce: String,
    /// Identifier of the control plane instance that sent the response.
    pub control_plane: Option<String>,
}

/// A resource wrapped as google.protobuf.Any.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceAny {
    /// Type URL of the resource.
    pub type_url: String,
    /// Serialized resource bytes.
    pub value: Bytes,
}

/// Node identification for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// An opaque node identifier.
    pub id: String,
    /// Free-form string metadata.
    pub metadata: BTreeMap<String, String>,
    /// Free-form string identifying the client type.
    pub user_agent_name: String,
    /// Version of the client.
    pub user_agent_version: String,
}

impl Node {
    /// Create a new Node with the given id and this client's user agent.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: BTreeMap::new(),
            user_agent_name: USER_AGENT_NAME.to_string(),
            user_agent_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Set the node metadata.
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// User agent name sent with every request.
pub const USER_AGENT_NAME: &str = "xdscli";

/// Error details for NACK requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    /// gRPC status code.
    pub code: i32,
    /// Error message.
    pub message: String,
}

impl ErrorDetail {
    /// An INVALID_ARGUMENT error detail with the given message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            code: 3,
            message: message.into(),
        }
    }
}
