//! Development storage node binary

use clap::Parser;
use ringproxy::common::Config;
use ringproxy::NodeServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ringproxy-node")]
#[command(about = "In-memory account server for ringproxy development clusters")]
struct Cli {
    /// Bind address for the internal account API
    #[arg(long)]
    bind: Option<String>,

    /// Device name served by this node
    #[arg(long)]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(bind) = cli.bind {
        config.node.bind_addr = bind.parse()?;
    }
    if let Some(device) = cli.device {
        config.node.device = device;
    }

    NodeServer::new(config.node).serve().await?;
    Ok(())
}
