//! Transport layer for the caching forwarder.
//!
//! Receives DNS queries from clients over UDP, answers hits from the cache
//! and relays misses to the single upstream server.

pub mod udp;

/// Maximum size of a DNS packet (with some headroom).
pub const MAX_DNS_PACKET_SIZE: usize = 4096;

/// Anything shorter cannot carry a DNS header.
pub const MIN_DNS_PACKET_SIZE: usize = 12;
