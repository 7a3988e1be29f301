//! Configuration for the xDS client.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::message::{ErrorDetail, Node};
use crate::resource::ResourceType;

/// Default timeout for establishing the connection.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Default limit for a single received message.
pub const DEFAULT_MAX_RECV_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// HTTP/2 keep-alive settings for the management server connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Interval between keep-alive pings.
    pub interval: Duration,
    /// How long to wait for a ping acknowledgment.
    pub timeout: Duration,
    /// Send pings even when no stream is active.
    pub while_idle: bool,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(2),
            while_idle: true,
        }
    }
}

/// Connection settings for the management servers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Resolved server addresses. One is chosen at random per connection.
    pub endpoints: Vec<SocketAddr>,
    /// Upper bound on connection establishment.
    pub dial_timeout: Duration,
    /// Keep-alive settings.
    pub keepalive: KeepaliveConfig,
    /// Maximum size of a decoded response message.
    pub max_recv_message_size: usize,
}

impl ServerConfig {
    /// Create a configuration for the given endpoints with default settings.
    pub fn new(endpoints: Vec<SocketAddr>) -> Self {
        Self {
            endpoints,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            keepalive: KeepaliveConfig::default(),
            max_recv_message_size: DEFAULT_MAX_RECV_MESSAGE_SIZE,
        }
    }

    /// Set the dial timeout.
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Set the maximum received message size. Must be positive.
    pub fn with_max_recv_message_size(mut self, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidMaxRecvSize);
        }
        self.max_recv_message_size = size;
        Ok(self)
    }

    /// Choose one endpoint at random.
    pub fn pick_endpoint(&self) -> Option<SocketAddr> {
        if self.endpoints.is_empty() {
            return None;
        }
        Some(self.endpoints[fastrand::usize(..self.endpoints.len())])
    }
}

/// Resolve `host:port` server addresses.
///
/// IP literals are used as given; host names are resolved and every
/// returned address is kept.
pub fn resolve_servers<S: AsRef<str>>(servers: &[S]) -> Result<Vec<SocketAddr>> {
    if servers.is_empty() {
        return Err(Error::NoServers);
    }

    let mut endpoints = Vec::new();
    for server in servers {
        let server = server.as_ref();
        let (host, port) = split_host_port(server)?;

        if let Ok(ip) = host.parse::<IpAddr>() {
            endpoints.push(SocketAddr::new(ip, port));
            continue;
        }

        let resolved = (host, port)
            .to_socket_addrs()
            .map_err(|source| Error::ResolveServer {
                host: host.to_string(),
                source,
            })?;
        endpoints.extend(resolved);
    }

    Ok(endpoints)
}

fn split_host_port(server: &str) -> Result<(&str, u16)> {
    let invalid = || Error::InvalidServerAddress(server.to_string());

    let (host, port) = server.rsplit_once(':').ok_or_else(invalid)?;
    let host = match host.strip_prefix('[') {
        Some(bracketed) => bracketed.strip_suffix(']').ok_or_else(invalid)?,
        None if host.contains(':') => return Err(invalid()),
        None => host,
    };
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;

    Ok((host, port))
}

/// Configuration for one ADS session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Node identification sent to the xDS server.
    pub node: Node,
    /// The resource type to subscribe to.
    pub resource_type: ResourceType,
    /// Explicit resource names; empty subscribes to all resources.
    pub resource_names: Vec<String>,
    /// Version info sent with every request.
    pub initial_version_info: String,
    /// Keep the stream open and print every update instead of exiting after
    /// the first response.
    pub watch: bool,
    /// When set, every acknowledgment is sent as a NACK with this detail.
    pub error_detail: Option<ErrorDetail>,
    /// Upper bound for a single send on the stream.
    pub send_timeout: Option<Duration>,
    /// Upper bound for a single read on the stream.
    pub read_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Create a one-shot wildcard subscription for `resource_type`.
    ///
    /// # Example
    ///
    /// ```
    /// use xdscli::{ClientConfig, Node, ResourceType};
    ///
    /// let node = Node::new("sidecar~10.0.0.1~pod~ns.svc.cluster.local");
    /// let config = ClientConfig::new(node, ResourceType::Eds)
    ///     .with_resource_names(vec!["outbound|80||web.ns.svc.cluster.local".into()])
    ///     .with_watch(true);
    /// assert!(config.watch);
    /// ```
    pub fn new(node: Node, resource_type: ResourceType) -> Self {
        Self {
            node,
            resource_type,
            resource_names: Vec::new(),
            initial_version_info: String::new(),
            watch: false,
            error_detail: None,
            send_timeout: None,
            read_timeout: None,
        }
    }

    /// Subscribe to the given resource names only.
    pub fn with_resource_names(mut self, names: Vec<String>) -> Self {
        self.resource_names = names;
        self
    }

    /// Set the version info sent with each request.
    pub fn with_initial_version_info(mut self, version: impl Into<String>) -> Self {
        self.initial_version_info = version.into();
        self
    }

    /// Enable or disable watch mode.
    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    /// Reject every response with the given error detail.
    pub fn with_error_detail(mut self, detail: Option<ErrorDetail>) -> Self {
        self.error_detail = detail;
        self
    }

    /// Bound individual sends and reads on the stream.
    pub fn with_timeouts(mut self, send: Option<Duration>, read: Option<Duration>) -> Self {
        self.send_timeout = send;
        self.read_timeout = read;
        self
    }
}
