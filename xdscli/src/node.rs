//! Construction of the node identity sent with every discovery request.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use crate::error::{Error, Result};
use crate::message::Node;

/// Separator between the parts of a service node id.
const SERVICE_NODE_SEPARATOR: char = '~';

/// Role used for generated node ids.
const DEFAULT_ROLE: &str = "sidecar";

const KNOWN_ROLES: &[&str] = &["sidecar", "router"];

/// Builds a [`Node`] from command-line style inputs.
#[derive(Debug, Default, Clone)]
pub struct NodeBuilder {
    id: Option<String>,
    metadata: Option<String>,
}

impl NodeBuilder {
    /// Create a builder with no explicit id and no metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit node id instead of generating one.
    ///
    /// An empty id is treated as absent.
    pub fn id(mut self, id: Option<String>) -> Self {
        self.id = id.filter(|id| !id.is_empty());
        self
    }

    /// Raw metadata in the form `k1=v1,k2=v2`.
    pub fn metadata(mut self, metadata: Option<String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Validate the inputs and build the node.
    pub fn build(self) -> Result<Node> {
        let metadata = match self.metadata.as_deref() {
            Some(raw) => parse_metadata(raw)?,
            None => BTreeMap::new(),
        };

        let id = match self.id {
            Some(id) => {
                validate_node_id(&id)?;
                id
            }
            None => generate_node_id()?,
        };

        Ok(Node::new(id).with_metadata(metadata))
    }
}

/// Parse comma separated `key=value` pairs into node metadata.
///
/// Every pair must contain exactly one `=`. An empty string yields no metadata.
pub fn parse_metadata(raw: &str) -> Result<BTreeMap<String, String>> {
    if raw.is_empty() {
        return Ok(BTreeMap::new());
    }

    raw.split(',')
        .map(|pair| {
            let mut parts = pair.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => Ok((key.to_string(), value.to_string())),
                _ => Err(Error::InvalidMetadataFormat(pair.to_string())),
            }
        })
        .collect()
}

/// Check that an explicit node id looks like `role~address~id~domain`.
pub fn validate_node_id(id: &str) -> Result<()> {
    let parts: Vec<&str> = id.split(SERVICE_NODE_SEPARATOR).collect();
    if parts.len() != 4 || !KNOWN_ROLES.contains(&parts[0]) {
        return Err(Error::InvalidNodeId(id.to_string()));
    }
    Ok(())
}

/// Generate a node id of the form `sidecar~<address>~<random>~<hostname>`.
pub fn generate_node_id() -> Result<String> {
    let hostname = hostname::get()?.to_string_lossy().into_owned();
    Ok(format_node_id(local_address(), fastrand::u64(..), &hostname))
}

fn format_node_id(address: IpAddr, random: u64, hostname: &str) -> String {
    let sep = SERVICE_NODE_SEPARATOR;
    format!("{DEFAULT_ROLE}{sep}{address}{sep}{random}{sep}{hostname}")
}

/// The first address of a non-loopback interface, or `0.0.0.0`.
fn local_address() -> IpAddr {
    match local_ip_address::list_afinet_netifas() {
        Ok(interfaces) => interfaces
            .into_iter()
            .map(|(_name, ip)| ip)
            .find(|ip| !ip.is_loopback())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        Err(e) => {
            tracing::debug!("failed to list network interfaces: {e}");
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_pairs_are_parsed() {
        let metadata = parse_metadata("ISTIO_VERSION=1.5,CLUSTER_ID=Kubernetes").unwrap();
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata["ISTIO_VERSION"], "1.5");
        assert_eq!(metadata["CLUSTER_ID"], "Kubernetes");
    }

    #[test]
    fn metadata_is_order_independent() {
        let a = parse_metadata("k1=v1,k2=v2,k3=v3").unwrap();
        let b = parse_metadata("k3=v3,k1=v1,k2=v2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn metadata_allows_empty_values() {
        let metadata = parse_metadata("k=").unwrap();
        assert_eq!(metadata["k"], "");
    }

    #[test]
    fn empty_metadata_is_empty_map() {
        assert!(parse_metadata("").unwrap().is_empty());
    }

    #[test]
    fn metadata_pair_without_separator_fails() {
        let err = parse_metadata("k1=v1,k2").unwrap_err();
        assert!(matches!(err, Error::InvalidMetadataFormat(pair) if pair == "k2"));
    }

    #[test]
    fn metadata_pair_with_two_separators_fails() {
        let err = parse_metadata("k1=v1=x").unwrap_err();
        assert!(matches!(err, Error::InvalidMetadataFormat(_)));
    }

    #[test]
    fn metadata_trailing_comma_fails() {
        assert!(parse_metadata("k1=v1,").is_err());
    }

    #[test]
    fn explicit_node_ids_are_validated() {
        assert!(validate_node_id("sidecar~10.0.0.1~pod.ns~ns.svc.cluster.local").is_ok());
        assert!(validate_node_id("router~10.0.0.1~gw~ns.svc.cluster.local").is_ok());
        assert!(validate_node_id("proxy~10.0.0.1~gw~ns").is_err());
        assert!(validate_node_id("sidecar~10.0.0.1~gw").is_err());
    }

    #[test]
    fn node_id_format() {
        let id = format_node_id("10.1.2.3".parse().unwrap(), 42, "box");
        assert_eq!(id, "sidecar~10.1.2.3~42~box");
        assert!(validate_node_id(&id).is_ok());
    }

    #[test]
    fn builder_generates_valid_id() {
        let node = NodeBuilder::new()
            .metadata(Some("a=b".to_string()))
            .build()
            .unwrap();
        assert!(node.id.starts_with("sidecar~"));
        assert_eq!(node.id.split('~').count(), 4);
        assert_eq!(node.metadata["a"], "b");
    }

    #[test]
    fn builder_rejects_bad_metadata_before_id() {
        let err = NodeBuilder::new()
            .id(Some("sidecar~1.1.1.1~x~y".to_string()))
            .metadata(Some("novalue".to_string()))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMetadataFormat(_)));
    }
}
