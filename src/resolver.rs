//! DNS query resolution logic.
//!
//! Handles the cache side of the query pipeline:
//! 1. Parse the question
//! 2. Cache lookup, pruning stale slots first
//! 3. Decide whether to answer from cache or forward upstream
//! 4. Fold upstream responses back into the cache
//!
//! Transports handle the actual I/O, resolver handles decisions.

use std::sync::Arc;

use tracing::trace;

use crate::cache::{Cache, now_millis};
use crate::dns::{DnsError, DnsQuery, DnsResponse};

/// Action to take for a DNS query.
#[derive(Debug)]
pub enum QueryAction {
    /// Answered from cache, send this response immediately.
    Cached { response: Vec<u8>, domain: String },
    /// Query should be forwarded to upstream unchanged.
    Forward { id: u16, domain: String, qtype: u16 },
}

/// Resolver handles DNS query processing decisions.
///
/// Owns a handle to the shared cache; the transport calls this for every
/// query it reads and every response it relays.
pub struct Resolver {
    cache: Arc<Cache>,
}

impl Resolver {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }

    /// Process a DNS query and decide what action to take.
    ///
    /// The cache lock is held only while checking the slot and building the
    /// reply. Unsupported query types are always forwarded.
    pub fn process_query(&self, query: &[u8]) -> Result<QueryAction, DnsError> {
        let parsed = DnsQuery::parse(query)?;

        let forward = |parsed: DnsQuery| QueryAction::Forward {
            id: parsed.id,
            domain: parsed.domain,
            qtype: parsed.qtype,
        };

        let Some(kind) = parsed.record_type() else {
            return Ok(forward(parsed));
        };

        let now = now_millis();
        let response = {
            let mut cache = self.cache.lock();
            let Some(container) = cache.lookup(&parsed.domain) else {
                return Ok(forward(parsed));
            };

            container.prune_expired_at(now);
            let answer = container
                .get_slot(kind)
                .map(|slot| parsed.answer(slot.remaining_ttl_at(now), &slot.answers()));

            if container.is_empty() {
                cache.remove_if_empty(&parsed.domain);
            }
            answer
        };

        match response {
            Some(response) => Ok(QueryAction::Cached {
                response,
                domain: parsed.domain,
            }),
            None => Ok(forward(parsed)),
        }
    }

    /// Called with every upstream response after it has been relayed.
    ///
    /// Folds each supported answer and additional record into the cache under
    /// its own name. Returns the number of records folded.
    pub fn process_response(&self, response: &[u8]) -> Result<usize, DnsError> {
        let records = DnsResponse::parse_records(response)?;
        if records.is_empty() {
            return Ok(0);
        }

        let folded = records.len();
        let now = now_millis();
        let mut cache = self.cache.lock();
        for record in records {
            trace!(name = %record.name, ttl = record.ttl, data = ?record.data, "Caching record");
            cache
                .get_or_create(&record.name)
                .upsert_at(record.ttl, record.data, now);
        }

        Ok(folded)
    }

    /// Returns the number of names in the cache.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}
