//! Lifetime of a single cached fact.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the Unix epoch.
///
/// Records carry absolute timestamps so a restored snapshot keeps its
/// original expiry.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Creation time plus a TTL fixed at construction.
///
/// Only the passage of time changes whether a record is expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    created_at: u64,
    ttl: u32,
}

impl Record {
    pub fn new(ttl: u32) -> Self {
        Self::with_created_at(ttl, now_millis())
    }

    pub fn with_created_at(ttl: u32, created_at: u64) -> Self {
        Self { created_at, ttl }
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Seconds left before expiry, never below zero.
    pub fn remaining_ttl(&self) -> u32 {
        self.remaining_ttl_at(now_millis())
    }

    /// Whole elapsed seconds are subtracted, so a record with `ttl = n`
    /// reports `n` for its entire first second.
    pub fn remaining_ttl_at(&self, now: u64) -> u32 {
        let elapsed_secs = now.saturating_sub(self.created_at) / 1000;
        u64::from(self.ttl).saturating_sub(elapsed_secs) as u32
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        self.remaining_ttl_at(now) == 0
    }
}
