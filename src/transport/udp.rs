//! UDP transport for DNS queries.
//!
//! Handles connectionless DNS queries over UDP. Since UDP is stateless,
//! we track forwarded queries by their 16-bit query ID and question to
//! route upstream responses back to the correct client.

use rustc_hash::FxHashMap;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::dns::DnsQuery;
use crate::error::ProxyError;
use crate::resolver::{QueryAction, Resolver};
use crate::stats::Stats;

use super::{MAX_DNS_PACKET_SIZE, MIN_DNS_PACKET_SIZE};

const MIN_EXPIRY_TICK: Duration = Duration::from_millis(10);

/// UDP transport for the caching forwarder.
///
/// Owns the client-facing listener and a socket connected to the upstream.
pub struct UdpTransport {
    socket: UdpSocket,
    upstream: UdpSocket,
}

impl UdpTransport {
    /// Bind the listener on `addr` and connect a socket to `upstream_addr`.
    ///
    /// Either failure is fatal to the service, so they are reported as
    /// distinct errors.
    pub async fn bind(addr: SocketAddr, upstream_addr: SocketAddr) -> Result<Self, ProxyError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ProxyError::Bind { addr, source })?;

        let connect_err = |source| ProxyError::UpstreamConnect {
            addr: upstream_addr,
            source,
        };
        let local: SocketAddr = if upstream_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let upstream = UdpSocket::bind(local).await.map_err(connect_err)?;
        upstream.connect(upstream_addr).await.map_err(connect_err)?;

        Ok(Self { socket, upstream })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serve queries until `shutdown` fires.
    ///
    /// Forwarded queries that see no upstream reply within `upstream_timeout`
    /// are abandoned; the client's own retry takes over.
    pub async fn run(
        self,
        resolver: Arc<Resolver>,
        stats: Arc<Stats>,
        upstream_timeout: Duration,
        shutdown: CancellationToken,
    ) {
        let socket = self.socket;
        let upstream = self.upstream;

        let mut pending: FxHashMap<PendingKey, PendingQuery> = FxHashMap::default();
        let mut client_buf = [0u8; MAX_DNS_PACKET_SIZE];
        let mut upstream_buf = [0u8; MAX_DNS_PACKET_SIZE];

        let mut expiry = tokio::time::interval((upstream_timeout / 4).max(MIN_EXPIRY_TICK));
        expiry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(pending = pending.len(), "UDP transport shutting down");
                    break;
                }
                result = socket.recv_from(&mut client_buf) => {
                    let (len, src) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            debug!(error = %e, "UDP recv error");
                            continue;
                        }
                    };

                    if len < MIN_DNS_PACKET_SIZE {
                        continue;
                    }

                    let start_time = Instant::now();
                    let query = &client_buf[..len];

                    // Ask resolver what to do with this query
                    match resolver.process_query(query) {
                        Ok(QueryAction::Cached { response, domain }) => {
                            if let Err(e) = socket.send_to(&response, src).await {
                                warn!(error = %e, client = %src, "UDP response error");
                                continue;
                            }
                            let elapsed_ms = elapsed_ms(start_time);
                            stats.record_cached(elapsed_ms);
                            debug!(domain = %domain, total_ms = elapsed_ms, "CACHED");
                        }
                        Ok(QueryAction::Forward { id, domain, qtype }) => {
                            if let Err(e) = upstream.send(query).await {
                                warn!(error = %e, domain = %domain, "UDP forward error");
                                continue;
                            }
                            let key = PendingKey { id, domain, qtype };
                            let entry = PendingQuery {
                                client_addr: src,
                                start_time,
                            };
                            if let Some(older) = pending.insert(key, entry) {
                                stats.record_timed_out();
                                debug!(id, client = %older.client_addr, "Replaced pending query");
                            }
                        }
                        Err(e) => {
                            stats.record_malformed();
                            warn!(error = %e, client = %src, "Dropping malformed query");
                        }
                    }
                }
                result = upstream.recv(&mut upstream_buf) => {
                    let len = match result {
                        Ok(len) => len,
                        Err(e) => {
                            debug!(error = %e, "UDP upstream recv error");
                            continue;
                        }
                    };

                    if len < MIN_DNS_PACKET_SIZE {
                        continue;
                    }

                    let response = &upstream_buf[..len];
                    let key = match DnsQuery::parse_message(response) {
                        Ok(header) => PendingKey {
                            id: header.id,
                            domain: header.domain,
                            qtype: header.qtype,
                        },
                        Err(e) => {
                            trace!(error = %e, "Discarding unreadable upstream response");
                            continue;
                        }
                    };
                    let Some(pq) = pending.remove(&key) else {
                        trace!(
                            id = key.id,
                            domain = %key.domain,
                            "Discarding unsolicited upstream response"
                        );
                        continue;
                    };

                    // Relay first, cache after
                    if let Err(e) = socket.send_to(response, pq.client_addr).await {
                        warn!(error = %e, client = %pq.client_addr, "UDP response error");
                    }

                    let total_ms = elapsed_ms(pq.start_time);
                    stats.record_forwarded(total_ms);

                    match resolver.process_response(response) {
                        Ok(folded) => {
                            debug!(domain = %key.domain, total_ms, folded, "FORWARDED");
                        }
                        Err(e) => {
                            stats.record_malformed();
                            warn!(error = %e, domain = %key.domain, "Upstream response not cached");
                        }
                    }
                }
                _ = expiry.tick() => {
                    pending.retain(|key, pq| {
                        if pq.start_time.elapsed() < upstream_timeout {
                            return true;
                        }
                        stats.record_timed_out();
                        debug!(
                            domain = %key.domain,
                            id = key.id,
                            client = %pq.client_addr,
                            "TIMEOUT"
                        );
                        false
                    });
                }
            }
        }
    }
}

/// A forwarded query is matched to its reply by ID and question together;
/// IDs alone collide across clients.
#[derive(Debug, PartialEq, Eq, Hash)]
struct PendingKey {
    id: u16,
    domain: String,
    qtype: u16,
}

struct PendingQuery {
    client_addr: SocketAddr,
    start_time: Instant,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
