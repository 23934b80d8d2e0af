use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hoard::error::ProxyError;
use hoard::proxy::{self, ProxyConfig};

#[derive(Parser)]
#[command(name = "hoard")]
#[command(about = "Caching DNS forwarder", long_about = None)]
struct Args {
    /// Local port to listen on
    #[arg(short, long, default_value = "53")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Upstream DNS server (host:port, port defaults to 53)
    #[arg(short, long, default_value = "8.8.8.8:53")]
    upstream: String,

    /// Cache snapshot file, restored at startup and written at shutdown
    #[arg(short, long, default_value = "cache.snapshot.json")]
    snapshot: PathBuf,

    /// Seconds between sweeps of expired records
    #[arg(long, default_value = "10")]
    sweep_interval: u64,

    /// Milliseconds to wait for an upstream answer before dropping the query
    #[arg(long, default_value = "1000")]
    upstream_timeout: u64,

    /// Seconds between stats lines (0 disables)
    #[arg(long, default_value = "60")]
    stats_interval: u64,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Result<ProxyConfig, ProxyError> {
        let bind_ip: IpAddr = self
            .bind
            .parse()
            .map_err(|_| ProxyError::InvalidAddress(self.bind.clone()))?;

        Ok(ProxyConfig {
            bind_addr: SocketAddr::new(bind_ip, self.port),
            upstream_addr: proxy::parse_endpoint(&self.upstream)?,
            snapshot_path: self.snapshot,
            sweep_interval: Duration::from_secs(self.sweep_interval.max(1)),
            upstream_timeout: Duration::from_millis(self.upstream_timeout.max(1)),
            stats_interval: (self.stats_interval > 0)
                .then(|| Duration::from_secs(self.stats_interval)),
        })
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn wait_for_signal(shutdown: CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Interrupt received, shutting down"),
                Err(e) => {
                    warn!(error = %e, "Could not listen for interrupt");
                    return;
                }
            }
            shutdown.cancel();
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let result = rt.block_on(async {
        let console = hoard::console::run(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            shutdown.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = console.await {
                warn!(error = %e, "Console stopped");
            }
        });
        tokio::spawn(wait_for_signal(shutdown.clone()));

        proxy::run(config, shutdown).await
    });

    // The console may still be parked on a blocking stdin read.
    rt.shutdown_background();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "DNS cache stopped");
            ExitCode::FAILURE
        }
    }
}
