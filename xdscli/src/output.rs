//! Rendering of received responses.

use std::io::{self, Write};

use clap::ValueEnum;
use envoy_types::pb::envoy::config::cluster::v3::{Cluster, cluster};
use envoy_types::pb::envoy::config::core::v3::{Address, HealthStatus, address, socket_address};
use envoy_types::pb::envoy::config::endpoint::v3::{ClusterLoadAssignment, lb_endpoint};
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
use serde::Serialize;

use crate::error::Result;
use crate::message::DiscoveryResponse;
use crate::resource::DecodedResource;

/// Receives every response the session accepted, in arrival order.
pub trait Emitter {
    /// Render one response. An error ends the session.
    fn emit(&mut self, response: &DiscoveryResponse) -> Result<()>;
}

/// How responses are written out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Response header followed by the decoded envoy messages.
    #[default]
    Simple,
    /// Pretty-printed JSON summary, one document per response.
    Json,
    /// YAML summary, one document per response.
    Yaml,
}

/// Writes responses to `W` in the selected [`OutputFormat`].
#[derive(Debug)]
pub struct WriterEmitter<W> {
    out: W,
    format: OutputFormat,
}

impl WriterEmitter<io::Stdout> {
    /// An emitter writing to standard output.
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write> WriterEmitter<W> {
    /// An emitter writing to `out`.
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    /// Consume the emitter, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_simple(&mut self, response: &DiscoveryResponse) -> Result<()> {
        let out = &mut self.out;
        writeln!(out, "version_info: {}", response.version_info)?;
        writeln!(out, "type_url: {}", response.type_url)?;
        writeln!(out, "nonce: {}", response.nonce)?;
        if response.canary {
            writeln!(out, "canary: true")?;
        }
        if let Some(control_plane) = &response.control_plane {
            writeln!(out, "control_plane: {control_plane}")?;
        }
        writeln!(out, "resources: {}", response.resources.len())?;
        for any in &response.resources {
            let resource = DecodedResource::decode(any)?;
            writeln!(out, "{resource:#?}")?;
        }
        Ok(())
    }
}

impl<W: Write> Emitter for WriterEmitter<W> {
    fn emit(&mut self, response: &DiscoveryResponse) -> Result<()> {
        match self.format {
            OutputFormat::Simple => self.write_simple(response)?,
            OutputFormat::Json => {
                let summary = ResponseSummary::new(response)?;
                serde_json::to_writer_pretty(&mut self.out, &summary)?;
                writeln!(self.out)?;
            }
            OutputFormat::Yaml => {
                let summary = ResponseSummary::new(response)?;
                writeln!(self.out, "---")?;
                serde_yaml::to_writer(&mut self.out, &summary)?;
            }
        }
        self.out.flush()?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ResponseSummary<'a> {
    version_info: &'a str,
    type_url: &'a str,
    nonce: &'a str,
    canary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    control_plane: Option<&'a str>,
    resources: Vec<ResourceSummary>,
}

impl<'a> ResponseSummary<'a> {
    fn new(response: &'a DiscoveryResponse) -> Result<Self> {
        let resources = response
            .resources
            .iter()
            .map(|any| DecodedResource::decode(any).map(|r| ResourceSummary::from(&r)))
            .collect::<Result<_>>()?;

        Ok(Self {
            version_info: &response.version_info,
            type_url: &response.type_url,
            nonce: &response.nonce,
            canary: response.canary,
            control_plane: response.control_plane.as_deref(),
            resources,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ResourceSummary {
    Endpoints {
        cluster_name: String,
        localities: Vec<LocalitySummary>,
    },
    Cluster {
        name: String,
        discovery_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        eds_service_name: Option<String>,
        lb_policy: String,
    },
    Listener {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        address: Option<String>,
        filter_chains: usize,
    },
    Route {
        name: String,
        virtual_hosts: Vec<VirtualHostSummary>,
    },
}

#[derive(Debug, Serialize)]
struct LocalitySummary {
    region: String,
    zone: String,
    sub_zone: String,
    priority: u32,
    endpoints: Vec<EndpointSummary>,
}

#[derive(Debug, Serialize)]
struct EndpointSummary {
    address: String,
    health_status: String,
}

#[derive(Debug, Serialize)]
struct VirtualHostSummary {
    name: String,
    domains: Vec<String>,
    routes: usize,
}

impl From<&DecodedResource> for ResourceSummary {
    fn from(resource: &DecodedResource) -> Self {
        match resource {
            DecodedResource::Endpoints(cla) => endpoints_summary(cla),
            DecodedResource::Cluster(cluster) => cluster_summary(cluster),
            DecodedResource::Listener(listener) => listener_summary(listener),
            DecodedResource::Route(route) => route_summary(route),
        }
    }
}

fn endpoints_summary(cla: &ClusterLoadAssignment) -> ResourceSummary {
    let localities = cla
        .endpoints
        .iter()
        .map(|group| {
            let locality = group.locality.clone().unwrap_or_default();
            let endpoints = group
                .lb_endpoints
                .iter()
                .map(|lb| {
                    let address = match &lb.host_identifier {
                        Some(lb_endpoint::HostIdentifier::Endpoint(endpoint)) => {
                            endpoint.address.as_ref().map(format_address)
                        }
                        Some(lb_endpoint::HostIdentifier::EndpointName(name)) => Some(name.clone()),
                        None => None,
                    };
                    EndpointSummary {
                        address: address.unwrap_or_default(),
                        health_status: enum_name(HealthStatus::try_from(lb.health_status).ok(), |s| {
                            s.as_str_name()
                        }),
                    }
                })
                .collect();
            LocalitySummary {
                region: locality.region,
                zone: locality.zone,
                sub_zone: locality.sub_zone,
                priority: group.priority,
                endpoints,
            }
        })
        .collect();

    ResourceSummary::Endpoints {
        cluster_name: cla.cluster_name.clone(),
        localities,
    }
}

fn cluster_summary(cluster: &Cluster) -> ResourceSummary {
    let discovery_type = match &cluster.cluster_discovery_type {
        Some(cluster::ClusterDiscoveryType::Type(t)) => {
            enum_name(cluster::DiscoveryType::try_from(*t).ok(), |t| t.as_str_name())
        }
        Some(cluster::ClusterDiscoveryType::ClusterType(custom)) => custom.name.clone(),
        None => cluster::DiscoveryType::Static.as_str_name().to_string(),
    };
    let eds_service_name = cluster
        .eds_cluster_config
        .as_ref()
        .map(|eds| eds.service_name.clone())
        .filter(|name| !name.is_empty());

    ResourceSummary::Cluster {
        name: cluster.name.clone(),
        discovery_type,
        eds_service_name,
        lb_policy: enum_name(cluster::LbPolicy::try_from(cluster.lb_policy).ok(), |p| {
            p.as_str_name()
        }),
    }
}

fn listener_summary(listener: &Listener) -> ResourceSummary {
    ResourceSummary::Listener {
        name: listener.name.clone(),
        address: listener.address.as_ref().map(format_address),
        filter_chains: listener.filter_chains.len(),
    }
}

fn route_summary(route: &RouteConfiguration) -> ResourceSummary {
    ResourceSummary::Route {
        name: route.name.clone(),
        virtual_hosts: route
            .virtual_hosts
            .iter()
            .map(|vh| VirtualHostSummary {
                name: vh.name.clone(),
                domains: vh.domains.clone(),
                routes: vh.routes.len(),
            })
            .collect(),
    }
}

fn enum_name<T>(value: Option<T>, name: impl FnOnce(T) -> &'static str) -> String {
    value.map(name).unwrap_or("UNKNOWN").to_string()
}

fn format_address(address: &Address) -> String {
    match &address.address {
        Some(address::Address::SocketAddress(socket)) => {
            let port = match &socket.port_specifier {
                Some(socket_address::PortSpecifier::PortValue(port)) => port.to_string(),
                Some(socket_address::PortSpecifier::NamedPort(name)) => name.clone(),
                None => return socket.address.clone(),
            };
            if socket.address.contains(':') {
                format!("[{}]:{port}", socket.address)
            } else {
                format!("{}:{port}", socket.address)
            }
        }
        Some(address::Address::Pipe(pipe)) => format!("unix:{}", pipe.path),
        Some(other) => format!("{other:?}"),
        None => String::new(),
    }
}
