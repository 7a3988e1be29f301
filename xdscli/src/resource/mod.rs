//! Supported xDS resource types.
//!
//! A [`ResourceType`] ties the short discovery-service tag accepted on the
//! command line (`eds`, `cds`, ...) to the type URL used on the wire.
//! [`DecodedResource`] holds a resource decoded into its envoy message.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

mod prost;

pub use self::prost::{DecodedResource, Resource};

/// The only supported xDS transport API version.
pub const API_VERSION_V3: &str = "v3";

/// Validate the xDS API version requested on the command line.
pub fn validate_api_version(version: &str) -> Result<()> {
    match version {
        API_VERSION_V3 => Ok(()),
        other => Err(Error::UnsupportedApiVersion(other.to_string())),
    }
}

/// A discovery service the client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// Endpoint discovery (`ClusterLoadAssignment`).
    Eds,
    /// Cluster discovery.
    Cds,
    /// Listener discovery.
    Lds,
    /// Route configuration discovery.
    Rds,
}

impl ResourceType {
    /// All supported resource types.
    pub const ALL: [ResourceType; 4] = [Self::Eds, Self::Cds, Self::Lds, Self::Rds];

    /// Look up a resource type by its discovery-service tag.
    pub fn from_tag(tag: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.tag() == tag)
            .ok_or_else(|| Error::UnknownResourceType(tag.to_string()))
    }

    /// Look up a resource type by its type URL.
    pub fn from_type_url(type_url: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.type_url() == type_url)
    }

    /// The short discovery-service tag.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Eds => "eds",
            Self::Cds => "cds",
            Self::Lds => "lds",
            Self::Rds => "rds",
        }
    }

    /// The xDS type URL.
    pub fn type_url(self) -> &'static str {
        match self {
            Self::Eds => "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment",
            Self::Cds => "type.googleapis.com/envoy.config.cluster.v3.Cluster",
            Self::Lds => "type.googleapis.com/envoy.config.listener.v3.Listener",
            Self::Rds => "type.googleapis.com/envoy.config.route.v3.RouteConfiguration",
        }
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_tag(s)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for t in ResourceType::ALL {
            assert_eq!(ResourceType::from_tag(t.tag()).unwrap(), t);
            assert_eq!(ResourceType::from_type_url(t.type_url()), Some(t));
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        for tag in ["", "xds", "EDS", "sds", "eds "] {
            let err = ResourceType::from_tag(tag).unwrap_err();
            assert!(matches!(err, Error::UnknownResourceType(t) if t == tag));
        }
    }

    #[test]
    fn only_v3_is_supported() {
        assert!(validate_api_version("v3").is_ok());
        assert!(matches!(
            validate_api_version("v2"),
            Err(Error::UnsupportedApiVersion(v)) if v == "v2"
        ));
    }

    #[test]
    fn unknown_type_url() {
        assert_eq!(
            ResourceType::from_type_url("type.googleapis.com/envoy.api.v2.ClusterLoadAssignment"),
            None
        );
    }
}
