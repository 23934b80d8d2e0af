//! Hoard - a caching DNS forwarder.
//!
//! Answers repeat A, AAAA, NS and PTR lookups from a per-name cache with
//! independent TTLs per record type, forwarding everything else upstream.

pub mod cache;
pub mod console;
pub mod dns;
pub mod error;
pub mod proxy;
pub mod resolver;
pub mod stats;
pub mod transport;
