use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lanprov::{Config, DhcpServer, DnsServer, Error, Result, bootstrap, http};

#[derive(Parser)]
#[command(name = "lanprov")]
#[command(author, version, about = "DHCP, DNS and HTTP provisioning for one LAN segment", long_about = None)]
struct Cli {
    /// Interface to serve, e.g. eth0
    interface: String,

    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Run,
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = Config::load_or_create(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&cli.interface, config).await,
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run(interface: &str, config: Config) -> Result<()> {
    let found = bootstrap::ensure_ipv4(interface, &config).await?;
    info!(
        "Using interface {}: IP={} Mask={}",
        interface, found.address, found.netmask
    );

    let config = config.with_interface_address(found.address, found.netmask);
    config.validate()?;
    let config = Arc::new(config);

    let dhcp = DhcpServer::new(Arc::clone(&config), interface)?;

    let dns_socket = UdpSocket::bind(config.dns_listen).await.map_err(|error| {
        Error::Socket(format!("Failed to bind DNS on {}: {}", config.dns_listen, error))
    })?;
    let dns = DnsServer::new(dns_socket, config.server_ip, config.dns_ttl_seconds);

    let http_listener = TcpListener::bind(config.http_listen).await.map_err(|error| {
        Error::Socket(format!("Failed to bind HTTP on {}: {}", config.http_listen, error))
    })?;

    let (stop_tx, stop_rx) = watch::channel(false);

    let http_task = tokio::spawn(http::serve(http_listener, stopped(stop_rx.clone())));

    let servers = async {
        let (dhcp_result, dns_result) = tokio::join!(
            dhcp.run(stopped(stop_rx.clone())),
            dns.run(stopped(stop_rx.clone()))
        );

        if let Err(error) = dhcp_result {
            error!("DHCP server error: {}", error);
        }
        if let Err(error) = dns_result {
            error!("DNS server error: {}", error);
        }
    };

    let signal = async {
        wait_for_signal().await;
        info!("Received shutdown signal, stopping servers...");
        let _ = stop_tx.send(true);
    };

    tokio::join!(servers, signal);

    match http_task.await {
        Ok(Err(error)) => error!("HTTP server error: {}", error),
        Err(error) => error!("HTTP server task failed: {}", error),
        Ok(Ok(())) => {}
    }

    dhcp.log_leases().await;
    info!("Shutdown complete");
    Ok(())
}

async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(error) => {
            error!("Failed to install SIGTERM handler: {}", error);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
