//! Proxy binary

use clap::{Parser, Subcommand};
use ringproxy::common::{parse_millis, Config, NodeDescriptor};
use ringproxy::proxy::{HashRing, Partitioner};
use ringproxy::ProxyServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ringproxy")]
#[command(about = "ringproxy account proxy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the proxy server
    Serve {
        /// Bind address for the client API
        #[arg(long)]
        bind: Option<String>,

        /// Allow account PUT and DELETE
        #[arg(long)]
        allow_account_management: bool,

        /// Answer for missing accounts and create them on POST
        #[arg(long)]
        account_autocreate: bool,

        /// Per-node timeout, e.g. 500ms or 10s
        #[arg(long)]
        node_timeout: Option<String>,

        /// Storage nodes as ID=HOST:PORT[/DEVICE] (comma-separated)
        #[arg(long, value_delimiter = ',')]
        nodes: Vec<String>,

        /// Replication factor
        #[arg(long)]
        replicas: Option<usize>,
    },

    /// Print the partition and replica nodes of an account
    Locate {
        account: String,
    },
}

/// Parse `ID=HOST:PORT[/DEVICE]`
fn parse_node(spec: &str) -> anyhow::Result<NodeDescriptor> {
    let (id, rest) = spec
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("node {} is not ID=HOST:PORT", spec))?;
    let (address, device) = match rest.split_once('/') {
        Some((address, device)) => (address, device),
        None => (rest, "sda1"),
    };
    Ok(NodeDescriptor {
        id: id.parse()?,
        address: address.to_string(),
        device: device.to_string(),
    })
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

    match cli.command {
        Commands::Serve {
            bind,
            allow_account_management,
            account_autocreate,
            node_timeout,
            nodes,
            replicas,
        } => {
            // CLI flags override file and environment values
            if let Some(bind) = bind {
                config.proxy.bind_addr = bind.parse()?;
            }
            if allow_account_management {
                config.proxy.allow_account_management = true;
            }
            if account_autocreate {
                config.proxy.account_autocreate = true;
            }
            if let Some(timeout) = node_timeout {
                config.proxy.node_timeout_ms = parse_millis(&timeout)?;
            }
            if !nodes.is_empty() {
                config.ring.nodes = nodes
                    .iter()
                    .map(|spec| parse_node(spec))
                    .collect::<anyhow::Result<_>>()?;
            }
            if let Some(replicas) = replicas {
                config.ring.replicas = replicas;
            }
            config.validate()?;

            ProxyServer::new(config).serve().await?;
        }
        Commands::Locate { account } => {
            let ring = HashRing::new(&config.ring)?;
            let (partition, nodes) = ring.resolve(&account)?;
            println!("Account:   {}", account);
            println!("Partition: {}", partition);
            for node in nodes {
                println!("  node {} http://{}/{}/{}", node.id, node.address, node.device, partition);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_without_config() {
        let help = Cli::try_parse_from(["ringproxy", "--help"]).unwrap_err();
        assert_eq!(help.kind(), clap::error::ErrorKind::DisplayHelp);

        let cli = Cli::try_parse_from(["ringproxy", "locate", "AUTH_test"]).unwrap();
        assert!(matches!(cli.command, Commands::Locate { account } if account == "AUTH_test"));
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::try_parse_from([
            "ringproxy",
            "serve",
            "--node-timeout",
            "750ms",
            "--nodes",
            "1=127.0.0.1:6002,2=127.0.0.1:6003/sdb1",
            "--account-autocreate",
        ])
        .unwrap();
        let Commands::Serve {
            node_timeout,
            nodes,
            account_autocreate,
            allow_account_management,
            ..
        } = cli.command
        else {
            panic!("expected serve");
        };
        assert_eq!(parse_millis(&node_timeout.unwrap()).unwrap(), 750);
        assert_eq!(nodes.len(), 2);
        assert!(account_autocreate);
        assert!(!allow_account_management);
    }

    #[test]
    fn test_parse_node() {
        let node = parse_node("7=10.0.0.7:6002/sdc1").unwrap();
        assert_eq!(node.id, 7);
        assert_eq!(node.address, "10.0.0.7:6002");
        assert_eq!(node.device, "sdc1");

        assert_eq!(parse_node("3=10.0.0.3:6002").unwrap().device, "sda1");
        assert!(parse_node("10.0.0.3:6002").is_err());
        assert!(parse_node("x=10.0.0.3:6002").is_err());
    }
}
