//! Caching forwarder orchestration.
//!
//! Restores the cache, binds the transport, runs the background jobs and
//! persists the cache again once shutdown is requested.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{Cache, Sweeper, snapshot};
use crate::error::ProxyError;
use crate::resolver::Resolver;
use crate::stats::Stats;
use crate::transport::udp::UdpTransport;

const DNS_PORT: u16 = 53;

/// Configuration for the caching forwarder.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Local address to bind (e.g., 127.0.0.1:53)
    pub bind_addr: SocketAddr,
    /// The single upstream resolver consulted on cache misses
    pub upstream_addr: SocketAddr,
    /// Where the cache is restored from and saved to
    pub snapshot_path: PathBuf,
    pub sweep_interval: Duration,
    pub upstream_timeout: Duration,
    /// `None` disables the periodic stats line
    pub stats_interval: Option<Duration>,
}

/// Parse `host:port`, or a bare IP address with the DNS port implied.
pub fn parse_endpoint(value: &str) -> Result<SocketAddr, ProxyError> {
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Ok(addr);
    }
    value
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| ProxyError::InvalidAddress(value.to_string()))
}

/// Run the caching forwarder until `shutdown` is cancelled.
///
/// Startup failures (listener bind, upstream connect) are returned before
/// anything is served. Snapshot failures are logged and never fatal.
pub async fn run(config: ProxyConfig, shutdown: CancellationToken) -> Result<(), ProxyError> {
    let cache = match snapshot::load(&config.snapshot_path).await {
        Ok(cache) => {
            info!(
                entries = cache.len(),
                path = %config.snapshot_path.display(),
                "Cache restored"
            );
            cache
        }
        Err(e) => {
            warn!(
                error = %e,
                path = %config.snapshot_path.display(),
                "Could not load cache snapshot, starting empty"
            );
            Cache::new()
        }
    };
    let cache = Arc::new(cache);

    let transport = UdpTransport::bind(config.bind_addr, config.upstream_addr).await?;
    info!(
        listen = %transport.local_addr()?,
        upstream = %config.upstream_addr,
        "DNS cache listening"
    );

    let resolver = Arc::new(Resolver::new(cache.clone()));
    let stats = Arc::new(Stats::new());

    let sweeper = Sweeper::new(cache.clone())
        .with_interval(config.sweep_interval)
        .with_cancellation(shutdown.clone())
        .start();

    if let Some(period) = config.stats_interval {
        tokio::spawn(report_stats(
            stats.clone(),
            resolver.clone(),
            period,
            shutdown.clone(),
        ));
    }

    transport
        .run(resolver, stats, config.upstream_timeout, shutdown.clone())
        .await;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Cache sweeper task failed");
    }

    match snapshot::save(&cache, &config.snapshot_path).await {
        Ok(entries) => info!(
            entries,
            path = %config.snapshot_path.display(),
            "Cache saved"
        ),
        Err(e) => warn!(
            error = %e,
            path = %config.snapshot_path.display(),
            "Could not save cache snapshot"
        ),
    }

    Ok(())
}

/// Log a stats line every `period`.
async fn report_stats(
    stats: Arc<Stats>,
    resolver: Arc<Resolver>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip first immediate tick
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let stats = stats.snapshot_and_reset();
                info!(
                    "[stats] uptime={}s cache={} requests={} forwarded={} cached={} timed_out={} malformed={} avg_response={:.2}ms",
                    stats.uptime_secs,
                    resolver.cache_len(),
                    stats.requests,
                    stats.forwarded,
                    stats.cached,
                    stats.timed_out,
                    stats.malformed,
                    stats.avg_response_ms
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_endpoint_accepts_host_and_port() {
        assert_eq!(
            parse_endpoint("9.9.9.9:5353").unwrap(),
            "9.9.9.9:5353".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_endpoint("[2001:db8::1]:53").unwrap(),
            "[2001:db8::1]:53".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn parse_endpoint_defaults_to_dns_port() {
        assert_eq!(parse_endpoint("1.1.1.1").unwrap().port(), 53);
        assert_eq!(parse_endpoint("::1").unwrap().port(), 53);
    }

    #[test]
    fn parse_endpoint_rejects_garbage() {
        assert!(matches!(
            parse_endpoint("dns.example:53"),
            Err(ProxyError::InvalidAddress(_))
        ));
    }
}
