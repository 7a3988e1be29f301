//! Prost-based codec using envoy-types.

use crate::codec::XdsCodec;
use crate::error::{Error, Result};
use crate::message::{DiscoveryRequest, DiscoveryResponse, ResourceAny};
use bytes::Bytes;
use prost::Message;

/// A codec that uses prost/envoy-types for serialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProstCodec;

impl XdsCodec for ProstCodec {
    fn encode_request(&self, request: &DiscoveryRequest<'_>) -> Result<Bytes> {
        use envoy_types::pb::envoy::config::core::v3 as core;
        use envoy_types::pb::envoy::service::discovery::v3 as discovery;
        use envoy_types::pb::google::protobuf::{Struct, Value, value::Kind};
        use envoy_types::pb::google::rpc::Status;

        let metadata = (!request.node.metadata.is_empty()).then(|| Struct {
            fields: request
                .node
                .metadata
                .iter()
                .map(|(key, value)| {
                    (
                        key.clone(),
                        Value {
                            kind: Some(Kind::StringValue(value.clone())),
                        },
                    )
                })
                .collect(),
        });

        let proto_request = discovery::DiscoveryRequest {
            version_info: request.version_info.to_owned(),
            node: Some(core::Node {
                id: request.node.id.clone(),
                metadata,
                user_agent_name: request.node.user_agent_name.clone(),
                user_agent_version_type: Some(core::node::UserAgentVersionType::UserAgentVersion(
                    request.node.user_agent_version.clone(),
                )),
                ..Default::default()
            }),
            resource_names: request.resource_names.to_vec(),
            type_url: request.type_url.to_owned(),
            response_nonce: request.response_nonce.to_owned(),
            error_detail: request.error_detail.map(|e| Status {
                code: e.code,
                message: e.message.clone(),
                details: vec![],
            }),
            ..Default::default()
        };

        Ok(proto_request.encode_to_vec().into())
    }

    fn decode_response(&self, bytes: Bytes) -> Result<DiscoveryResponse> {
        use envoy_types::pb::envoy::service::discovery::v3 as discovery;

        let proto_response = discovery::DiscoveryResponse::decode(bytes).map_err(Error::Decode)?;

        Ok(DiscoveryResponse {
            version_info: proto_response.version_info,
            resources: proto_response
                .resources
                .into_iter()
                .map(|any| ResourceAny {
                    type_url: any.type_url,
                    value: any.value.into(),
                })
                .collect(),
            canary: proto_response.canary,
            type_url: proto_response.type_url,
            nonce: proto_response.nonce,
            control_plane: proto_response.control_plane.map(|cp| cp.identifier),
        })
    }
}
