use clap::Parser;
use lan_address::Ipv4Address;

/// A simulated host on the Ethernet/ARP LAN.
#[derive(Parser)]
#[command(name = "lan-host", about = "Connects to a router and resolves/sends frames over a simulated LAN")]
struct Cli {
    /// This host's IPv4 address on the simulated LAN.
    ip: Ipv4Address,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    lan_host::run(cli.ip)
}
