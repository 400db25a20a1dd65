use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "klog-oomkill-exporter")]
#[command(about = "Count OOM kills from the kernel log per Kubernetes pod and container")]
pub struct Cli {
    /// Address to serve /metrics on (":9102" listens on all interfaces)
    #[arg(long, default_value = ":9102", value_parser = parse_listen_address)]
    pub listen_address: SocketAddr,

    /// Name of the node this agent runs on
    #[arg(long, env = "NODE_NAME", value_parser = NonEmptyStringValueParser::new())]
    pub node_name: String,

    /// Kernel log device to read
    #[arg(long, default_value = "/dev/kmsg")]
    pub kmsg_path: PathBuf,

    /// Deadline in seconds for each pod lookup against the API server
    #[arg(long, default_value_t = 10)]
    pub resolve_timeout: u64,

    /// Verbose output (debug logging)
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parse a listen address, accepting the `:PORT` shorthand for all interfaces.
pub fn parse_listen_address(addr: &str) -> Result<SocketAddr, String> {
    let addr = addr.trim();
    let full = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };
    full.to_socket_addrs()
        .map_err(|e| format!("invalid listen address '{}': {}", addr, e))?
        .next()
        .ok_or_else(|| format!("listen address '{}' did not resolve", addr))
}
