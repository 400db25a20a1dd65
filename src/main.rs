mod cli;
mod extract;
mod kmsg;
mod kubernetes;
mod metrics;
mod pipeline;
mod server;
mod types;

use clap::Parser;
use kube::{Client, config};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use cli::Cli;
use kubernetes::{KubePodSource, Resolver};
use metrics::Aggregator;
use pipeline::Pipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = config::Config::infer()
        .await
        .map_err(|e| anyhow::anyhow!("Could not load cluster credentials: {}", e))?;
    let client = Client::try_from(config)?;
    info!("[{}] Connected to cluster", cli.node_name);

    let aggregator = Arc::new(Aggregator::new()?);

    let listener = tokio::net::TcpListener::bind(cli.listen_address)
        .await
        .map_err(|e| anyhow::anyhow!("Could not listen on {}: {}", cli.listen_address, e))?;
    tokio::spawn(server::serve(listener, aggregator.clone()));

    let lines = kmsg::watch(&cli.kmsg_path).await?;
    info!(
        "[{}] Watching {} for OOM kills",
        cli.node_name,
        cli.kmsg_path.display()
    );

    let resolver = Resolver::new(
        KubePodSource::new(client),
        Duration::from_secs(cli.resolve_timeout),
    );
    let pipeline = Pipeline::new(resolver, aggregator, cli.node_name.clone());

    if let Err(e) = pipeline.run(lines).await {
        error!("[{}] Kernel log watcher failed: {:#}", cli.node_name, e);
        return Err(e);
    }
    Ok(())
}
