//! Typed payloads stored in a container slot.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};

use super::record::Record;

/// Anything that embeds a [`Record`] and expires with it.
pub trait Expiring {
    fn record(&self) -> &Record;

    fn remaining_ttl_at(&self, now: u64) -> u32 {
        self.record().remaining_ttl_at(now)
    }

    fn is_expired_at(&self, now: u64) -> bool {
        self.record().is_expired_at(now)
    }
}

/// Addresses for one name, in the order upstream answers delivered them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSet<A> {
    record: Record,
    addresses: Vec<A>,
}

pub type AddressSetV4 = AddressSet<Ipv4Addr>;
pub type AddressSetV6 = AddressSet<Ipv6Addr>;

impl<A: PartialEq> AddressSet<A> {
    pub fn new(record: Record) -> Self {
        Self {
            record,
            addresses: Vec::new(),
        }
    }

    /// Append an address. Returns `false` if it was already present.
    pub fn push(&mut self, addr: A) -> bool {
        if self.addresses.contains(&addr) {
            return false;
        }
        self.addresses.push(addr);
        true
    }

    pub fn addresses(&self) -> &[A] {
        &self.addresses
    }
}

impl<A> Expiring for AddressSet<A> {
    fn record(&self) -> &Record {
        &self.record
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameServerSet {
    record: Record,
    servers: Vec<String>,
}

impl NameServerSet {
    pub fn new(record: Record) -> Self {
        Self {
            record,
            servers: Vec::new(),
        }
    }

    /// Append a server name. Returns `false` if it was already present.
    pub fn push(&mut self, server: String) -> bool {
        if self.servers.contains(&server) {
            return false;
        }
        self.servers.push(server);
        true
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }
}

impl Expiring for NameServerSet {
    fn record(&self) -> &Record {
        &self.record
    }
}

/// Target of a reverse lookup. Set once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseName {
    record: Record,
    target: String,
}

impl ReverseName {
    pub fn new(record: Record, target: String) -> Self {
        Self { record, target }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Expiring for ReverseName {
    fn record(&self) -> &Record {
        &self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_set_keeps_arrival_order_and_skips_duplicates() {
        let mut set = AddressSetV4::new(Record::new(30));

        assert!(set.push(Ipv4Addr::new(10, 0, 0, 2)));
        assert!(set.push(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(!set.push(Ipv4Addr::new(10, 0, 0, 2)));

        assert_eq!(
            set.addresses(),
            &[Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1)]
        );
    }

    #[test]
    fn appending_does_not_touch_the_record() {
        let record = Record::with_created_at(30, 1_000);
        let mut set = NameServerSet::new(record);

        set.push("a.ns.example".into());
        set.push("b.ns.example".into());

        assert_eq!(set.record(), &record);
        assert_eq!(set.servers().len(), 2);
    }

    #[test]
    fn expiry_follows_embedded_record() {
        let set = ReverseName::new(Record::with_created_at(1, 0), "host.example".into());

        assert!(!set.is_expired_at(999));
        assert!(set.is_expired_at(1_000));
        assert_eq!(set.target(), "host.example");
    }
}
