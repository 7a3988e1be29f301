//! Resource decoding using envoy-types.

use bytes::Bytes;
use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
use prost::Message;

use crate::error::{Error, Result};
use crate::message::ResourceAny;
use crate::resource::ResourceType;

/// Trait for xDS resources the client knows how to decode.
pub trait Resource: Message + Default + Sized {
    /// The resource type this message is delivered as.
    const TYPE: ResourceType;

    /// Decode a resource from its serialized bytes.
    fn decode_resource(bytes: Bytes) -> Result<Self> {
        Self::decode(bytes).map_err(Error::Decode)
    }

    /// Returns the resource name.
    ///
    /// The resource name combined with the type URL uniquely identifies a resource.
    fn name(&self) -> &str;
}

impl Resource for ClusterLoadAssignment {
    const TYPE: ResourceType = ResourceType::Eds;

    fn name(&self) -> &str {
        &self.cluster_name
    }
}

impl Resource for Cluster {
    const TYPE: ResourceType = ResourceType::Cds;

    fn name(&self) -> &str {
        &self.name
    }
}

impl Resource for Listener {
    const TYPE: ResourceType = ResourceType::Lds;

    fn name(&self) -> &str {
        &self.name
    }
}

impl Resource for RouteConfiguration {
    const TYPE: ResourceType = ResourceType::Rds;

    fn name(&self) -> &str {
        &self.name
    }
}

/// A resource decoded into its envoy message.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedResource {
    /// An endpoint assignment for a cluster.
    Endpoints(ClusterLoadAssignment),
    /// A cluster.
    Cluster(Cluster),
    /// A listener.
    Listener(Listener),
    /// A route configuration.
    Route(RouteConfiguration),
}

impl DecodedResource {
    /// Decode a resource according to its embedded type URL.
    ///
    /// A type URL outside the supported set is an error; there is no way to
    /// skip a single resource of a response.
    pub fn decode(any: &ResourceAny) -> Result<Self> {
        let resource_type = ResourceType::from_type_url(&any.type_url)
            .ok_or_else(|| Error::UnknownTypeUrl(any.type_url.clone()))?;
        let bytes = any.value.clone();

        Ok(match resource_type {
            ResourceType::Eds => Self::Endpoints(ClusterLoadAssignment::decode_resource(bytes)?),
            ResourceType::Cds => Self::Cluster(Cluster::decode_resource(bytes)?),
            ResourceType::Lds => Self::Listener(Listener::decode_resource(bytes)?),
            ResourceType::Rds => Self::Route(RouteConfiguration::decode_resource(bytes)?),
        })
    }

    /// The resource type.
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::Endpoints(_) => ClusterLoadAssignment::TYPE,
            Self::Cluster(_) => Cluster::TYPE,
            Self::Listener(_) => Listener::TYPE,
            Self::Route(_) => RouteConfiguration::TYPE,
        }
    }

    /// The resource name.
    pub fn name(&self) -> &str {
        match self {
            Self::Endpoints(r) => r.name(),
            Self::Cluster(r) => r.name(),
            Self::Listener(r) => r.name(),
            Self::Route(r) => r.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn any_of<R: Resource>(resource: &R) -> ResourceAny {
        ResourceAny {
            type_url: R::TYPE.type_url().to_string(),
            value: resource.encode_to_vec().into(),
        }
    }

    #[test]
    fn decodes_cluster_load_assignment() {
        let cla = ClusterLoadAssignment {
            cluster_name: "cluster-A".to_string(),
            ..Default::default()
        };

        let decoded = DecodedResource::decode(&any_of(&cla)).unwrap();
        assert_eq!(decoded.resource_type(), ResourceType::Eds);
        assert_eq!(decoded.name(), "cluster-A");
        assert_eq!(decoded, DecodedResource::Endpoints(cla));
    }

    #[test]
    fn decodes_listener() {
        let listener = Listener {
            name: "listener-1".to_string(),
            ..Default::default()
        };

        let decoded = DecodedResource::decode(&any_of(&listener)).unwrap();
        assert_eq!(decoded.resource_type(), ResourceType::Lds);
        assert_eq!(decoded.name(), "listener-1");
    }

    #[test]
    fn unknown_type_url_is_an_error() {
        let any = ResourceAny {
            type_url: "type.googleapis.com/envoy.api.v2.ClusterLoadAssignment".to_string(),
            value: Bytes::new(),
        };

        let err = DecodedResource::decode(&any).unwrap_err();
        assert!(matches!(err, Error::UnknownTypeUrl(_)));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let any = ResourceAny {
            type_url: ResourceType::Cds.type_url().to_string(),
            value: Bytes::from_static(&[0xff, 0xff, 0xff]),
        };

        let err = DecodedResource::decode(&any).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
