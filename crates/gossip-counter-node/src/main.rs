use std::net::IpAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gossip_counter::membership::Membership;
use gossip_counter::prelude::*;
use gossip_counter_membership::{Memberlist, TransportConfig};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// counter-node: one replica of a gossip-replicated grow-only counter.
///
/// Serves the counter over HTTP and keeps it in sync with the peers it
/// learns about through the seed list.
#[derive(Parser, Debug)]
#[command(name = "counter-node", version, about, long_about = None)]
struct Cli {
    /// Comma-separated `host:port` gossip addresses of existing members.
    #[arg(long, env = "COUNTER_MEMBERS", value_delimiter = ',')]
    members: Vec<String>,

    /// HTTP port.
    #[arg(long, env = "COUNTER_PORT", default_value = "4001")]
    port: u16,

    /// Gossip port for UDP and TCP (0 = auto select).
    #[arg(long, env = "COUNTER_RPC_PORT", default_value = "0")]
    rpc_port: u16,

    /// Address to bind the gossip and HTTP sockets to.
    #[arg(long, env = "COUNTER_BIND_ADDR", default_value = "0.0.0.0")]
    bind_addr: IpAddr,

    /// Seconds between full-state push/pull exchanges.
    #[arg(long, default_value = "5")]
    push_pull_interval: u64,

    /// Milliseconds between gossip rounds.
    #[arg(long, default_value = "200")]
    gossip_interval: u64,

    /// Retransmission multiplier for queued broadcasts.
    #[arg(long, default_value = "3")]
    retransmit_mult: usize,

    /// When push/pull responses are merged: `join-only` or `always`.
    #[arg(long, env = "COUNTER_MERGE_POLICY", default_value = "join-only")]
    merge_policy: MergePolicy,
}

impl Cli {
    fn transport_config(&self, name: &str) -> TransportConfig {
        TransportConfig {
            bind_addr: self.bind_addr,
            bind_port: self.rpc_port,
            push_pull_interval: Duration::from_secs(self.push_pull_interval.max(1)),
            gossip_interval: Duration::from_millis(self.gossip_interval.max(1)),
            retransmit_mult: self.retransmit_mult.max(1),
            ..TransportConfig::new(name)
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let identity = NodeIdentity::generate();
    let coordinator = Arc::new(SyncCoordinator::for_node(&identity));
    let delegate = Arc::new(MergeDelegate::with_policy(
        coordinator.clone(),
        cli.merge_policy,
    ));

    let memberlist =
        Arc::new(Memberlist::create(cli.transport_config(identity.as_str()), delegate).await?);
    let _dispatcher = DeltaBroadcaster::new(memberlist.broadcasts()).attach(&coordinator);

    let local = memberlist.local_member();
    info!(name = %local.name, addr = %local.addr, policy = %cli.merge_policy, "local member");

    if !cli.members.is_empty() {
        // A node that cannot reach its seeds still serves; peers may join it.
        match memberlist.join(&cli.members).await {
            Ok(n) => info!(seeds = n, members = memberlist.num_members(), "joined cluster"),
            Err(e) => warn!(error = %e, "running without a cluster"),
        }
    }

    let listener = tokio::net::TcpListener::bind((cli.bind_addr, cli.port)).await?;
    gossip_counter_http::serve(
        listener,
        coordinator,
        memberlist.clone(),
        shutdown_signal(),
    )
    .await?;

    memberlist.shutdown();
    info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_surface() {
        let cli = Cli::try_parse_from(["counter-node"]).unwrap();
        assert!(cli.members.is_empty());
        assert_eq!(cli.port, 4001);
        assert_eq!(cli.rpc_port, 0);
        assert_eq!(cli.merge_policy, MergePolicy::JoinOnly);

        let config = cli.transport_config("n");
        assert_eq!(config.bind_port, 0);
        assert_eq!(config.push_pull_interval, Duration::from_secs(5));
        assert_eq!(config.gossip_interval, Duration::from_millis(200));
    }

    #[test]
    fn members_split_on_commas() {
        let cli = Cli::try_parse_from([
            "counter-node",
            "--members",
            "10.0.0.1:7946,10.0.0.2:7946",
            "--merge-policy",
            "always",
        ])
        .unwrap();
        assert_eq!(cli.members, vec!["10.0.0.1:7946", "10.0.0.2:7946"]);
        assert_eq!(cli.merge_policy, MergePolicy::Always);
    }

    #[test]
    fn unknown_merge_policy_is_rejected() {
        assert!(Cli::try_parse_from(["counter-node", "--merge-policy", "sometimes"]).is_err());
    }
}
