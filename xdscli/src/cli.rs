//! Command-line arguments and their conversion into client configuration.

use std::time::Duration;

use clap::Parser;
use xdscli::client::config::DEFAULT_MAX_RECV_MESSAGE_SIZE;
use xdscli::output::OutputFormat;
use xdscli::resource::{API_VERSION_V3, validate_api_version};
use xdscli::{ClientConfig, ErrorDetail, NodeBuilder, ResourceType, Result, ServerConfig};

/// Query an xDS management server over the Aggregated Discovery Service.
#[derive(Debug, Parser)]
#[command(name = "xdscli", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Discovery service to query: eds, cds, lds or rds.
    #[arg(value_name = "XDS")]
    pub(crate) xds: String,

    /// Comma-separated list of management servers (host:port).
    #[arg(long, value_delimiter = ',', required = true)]
    pub(crate) servers: Vec<String>,

    /// Timeout for establishing the connection (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s", value_parser = parse_duration)]
    pub(crate) dial_timeout: Duration,

    /// Timeout for each read on the stream. Unbounded when unset.
    #[arg(long, value_parser = parse_duration)]
    pub(crate) read_timeout: Option<Duration>,

    /// Timeout for each send on the stream. Unbounded when unset.
    #[arg(long, value_parser = parse_duration)]
    pub(crate) send_timeout: Option<Duration>,

    /// Maximum size in bytes of a received message.
    #[arg(long, default_value_t = DEFAULT_MAX_RECV_MESSAGE_SIZE)]
    pub(crate) grpc_max_call_recv_size: usize,

    /// Output format.
    #[arg(long, short = 'w', value_enum, default_value = "simple")]
    pub(crate) write_out: OutputFormat,

    /// Node id (role~address~id~domain). Generated from the host when unset.
    #[arg(long)]
    pub(crate) node: Option<String>,

    /// Node metadata as comma-separated key=value pairs.
    #[arg(long, default_value = "")]
    pub(crate) node_metadata: String,

    /// Version info sent with every request.
    #[arg(long, default_value = "")]
    pub(crate) initial_version_info: String,

    /// Comma-separated resource names to subscribe to. All resources when unset.
    #[arg(long, value_delimiter = ',')]
    pub(crate) resource_names: Vec<String>,

    /// Reject every response (NACK) with this error message.
    #[arg(long)]
    pub(crate) error_detail: Option<String>,

    /// xDS API version.
    #[arg(long, default_value = API_VERSION_V3)]
    pub(crate) api_version: String,

    /// Keep the stream open and print every update.
    #[arg(long)]
    pub(crate) watch: bool,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "warn")]
    pub(crate) log_level: String,
}

/// Validated configuration for one run.
#[derive(Debug)]
pub(crate) struct Config {
    pub(crate) server: ServerConfig,
    pub(crate) client: ClientConfig,
    pub(crate) output: OutputFormat,
}

impl Cli {
    /// Validate the arguments. Nothing here touches the network except
    /// host name resolution of the servers.
    pub(crate) fn into_config(self) -> Result<Config> {
        validate_api_version(&self.api_version)?;
        let resource_type = ResourceType::from_tag(&self.xds)?;

        let node = NodeBuilder::new()
            .id(self.node)
            .metadata(Some(self.node_metadata))
            .build()?;

        let endpoints = xdscli::resolve_servers(self.servers.as_slice())?;
        let server = ServerConfig::new(endpoints)
            .with_dial_timeout(self.dial_timeout)
            .with_max_recv_message_size(self.grpc_max_call_recv_size)?;

        let resource_names = self
            .resource_names
            .into_iter()
            .filter(|name| !name.is_empty())
            .collect();
        let client = ClientConfig::new(node, resource_type)
            .with_resource_names(resource_names)
            .with_initial_version_info(self.initial_version_info)
            .with_watch(self.watch)
            .with_error_detail(self.error_detail.map(ErrorDetail::invalid_argument))
            .with_timeouts(self.send_timeout, self.read_timeout);

        Ok(Config {
            server,
            client,
            output: self.write_out,
        })
    }
}

/// Parse a duration such as `2s`, `500ms`, `1m` or `1h`. A bare number is seconds.
pub(crate) fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (value, unit) = s.split_at(split);
    let value: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration {s:?}"))?;

    let secs = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("invalid duration {s:?}"))
    };
    match unit {
        "" | "s" => Ok(Duration::from_secs(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "m" => secs(60),
        "h" => secs(3600),
        _ => Err(format!("invalid duration unit {unit:?} in {s:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xdscli::Error;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("xdscli").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let cli = parse(&["eds", "--servers", "127.0.0.1:15010"]);
        assert_eq!(cli.dial_timeout, Duration::from_secs(2));
        assert_eq!(cli.write_out, OutputFormat::Simple);
        assert_eq!(cli.api_version, "v3");
        assert!(!cli.watch);

        let config = cli.into_config().unwrap();
        assert_eq!(config.client.resource_type, ResourceType::Eds);
        assert!(config.client.resource_names.is_empty());
        assert!(config.client.error_detail.is_none());
        assert_eq!(config.server.endpoints.len(), 1);
        assert!(config.client.node.id.starts_with("sidecar~"));
    }

    #[test]
    fn full_command_line() {
        let cli = parse(&[
            "cds",
            "--servers",
            "127.0.0.1:15010,127.0.0.2:15010",
            "--dial-timeout",
            "500ms",
            "--read-timeout",
            "30s",
            "-w",
            "json",
            "--node",
            "router~10.0.0.1~gw~ns.svc.cluster.local",
            "--node-metadata",
            "ISTIO_VERSION=1.20,CLUSTER_ID=k8s",
            "--resource-names",
            "a,b",
            "--error-detail",
            "rejected",
            "--watch",
        ]);
        let config = cli.into_config().unwrap();

        assert_eq!(config.output, OutputFormat::Json);
        assert_eq!(config.server.endpoints.len(), 2);
        assert_eq!(config.server.dial_timeout, Duration::from_millis(500));
        assert_eq!(config.client.read_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.client.send_timeout, None);
        assert_eq!(config.client.node.id, "router~10.0.0.1~gw~ns.svc.cluster.local");
        assert_eq!(config.client.node.metadata["CLUSTER_ID"], "k8s");
        assert_eq!(config.client.resource_names, vec!["a", "b"]);
        assert_eq!(config.client.error_detail.as_ref().unwrap().code, 3);
        assert!(config.client.watch);
    }

    #[test]
    fn configuration_errors() {
        let cases: [(&[&str], fn(&Error) -> bool); 5] = [
            (&["xds", "--servers", "127.0.0.1:1"], |e| {
                matches!(e, Error::UnknownResourceType(_))
            }),
            (&["eds", "--servers", "127.0.0.1:1", "--api-version", "v2"], |e| {
                matches!(e, Error::UnsupportedApiVersion(_))
            }),
            (&["eds", "--servers", "127.0.0.1:1", "--node-metadata", "a=b,c"], |e| {
                matches!(e, Error::InvalidMetadataFormat(_))
            }),
            (&["eds", "--servers", "istiod"], |e| {
                matches!(e, Error::InvalidServerAddress(_))
            }),
            (
                &["eds", "--servers", "127.0.0.1:1", "--grpc-max-call-recv-size", "0"],
                |e| matches!(e, Error::InvalidMaxRecvSize),
            ),
        ];

        for (args, check) in cases {
            let err = parse(args).into_config().unwrap_err();
            assert!(check(&err), "{args:?} gave {err:?}");
            assert_eq!(err.kind(), xdscli::ErrorKind::Usage);
        }
    }

    #[test]
    fn servers_are_required() {
        let err = Cli::try_parse_from(["xdscli", "eds"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("2s"), Ok(Duration::from_secs(2)));
        assert_eq!(parse_duration("15"), Ok(Duration::from_secs(15)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("3 days").is_err());
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let max = u64::MAX;
        assert_eq!(parse_duration(&format!("{max}s")), Ok(Duration::from_secs(max)));
        assert!(parse_duration(&format!("{max}m")).is_err());
        assert!(parse_duration(&format!("{}h", max / 60)).is_err());
        assert_eq!(
            parse_duration(&format!("{}h", max / 3600)),
            Ok(Duration::from_secs(max / 3600 * 3600))
        );

        let timeout = format!("{max}m");
        let err = Cli::try_parse_from([
            "xdscli",
            "eds",
            "--servers",
            "127.0.0.1:1",
            "--dial-timeout",
            timeout.as_str(),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
