//! A command-line [xDS](https://www.envoyproxy.io/docs/envoy/latest/api-docs/xds_protocol)
//! client speaking the Aggregated Discovery Service protocol.
//!
//! The client subscribes to one resource type on a management server,
//! acknowledges every response it receives and renders the received
//! resources. It handles:
//! - dialing one of the configured servers
//! - the request/acknowledgment exchange over a single ADS stream
//! - the session lifecycle (one-shot, watch, signal and error shutdown)
//!
//! # Example
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use xdscli::client::{connect, run_discovery};
//! use xdscli::codec::prost::ProstCodec;
//! use xdscli::output::{OutputFormat, WriterEmitter};
//! use xdscli::transport::tonic::TonicTransportBuilder;
//! use xdscli::{ClientConfig, NodeBuilder, ResourceType, ServerConfig, resolve_servers};
//!
//! # async fn example() -> xdscli::Result<()> {
//! let server = ServerConfig::new(resolve_servers(&["istiod.istio-system:15010"])?);
//! let node = NodeBuilder::new().metadata(Some("ISTIO_VERSION=1.20".into())).build()?;
//! let config = ClientConfig::new(node, ResourceType::Cds).with_watch(true);
//!
//! let root = CancellationToken::new();
//! let transport = connect(&TonicTransportBuilder::new(), &server, &root).await?;
//! let mut emitter = WriterEmitter::stdout(OutputFormat::Json);
//! run_discovery(
//!     &transport,
//!     ProstCodec,
//!     config,
//!     &mut emitter,
//!     async { tokio::signal::ctrl_c().await.unwrap_or_default() },
//!     root,
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod message;
pub mod node;
pub mod output;
pub mod resource;
pub mod transport;

pub use client::config::{ClientConfig, KeepaliveConfig, ServerConfig, resolve_servers};
pub use client::session::{AdsSession, SessionState};
pub use error::{Error, ErrorKind, Result};
pub use message::{DiscoveryRequest, DiscoveryResponse, ErrorDetail, Node, ResourceAny};
pub use node::NodeBuilder;
pub use resource::ResourceType;
