//! Per-name holder of the four cacheable record types.

use serde::{Deserialize, Serialize};

use super::record::{Record, now_millis};
use super::sets::{AddressSetV4, AddressSetV6, Expiring, NameServerSet, ReverseName};
use crate::dns::{RecordData, RecordType};

/// Borrowed view of one occupied slot.
#[derive(Debug, Clone, Copy)]
pub enum Slot<'a> {
    A(&'a AddressSetV4),
    Aaaa(&'a AddressSetV6),
    Ns(&'a NameServerSet),
    Ptr(&'a ReverseName),
}

impl Slot<'_> {
    pub fn remaining_ttl_at(&self, now: u64) -> u32 {
        match self {
            Slot::A(set) => set.remaining_ttl_at(now),
            Slot::Aaaa(set) => set.remaining_ttl_at(now),
            Slot::Ns(set) => set.remaining_ttl_at(now),
            Slot::Ptr(name) => name.remaining_ttl_at(now),
        }
    }

    /// One answer per stored item; a reverse name always yields exactly one.
    pub fn answers(&self) -> Vec<RecordData> {
        match self {
            Slot::A(set) => set.addresses().iter().copied().map(RecordData::A).collect(),
            Slot::Aaaa(set) => set.addresses().iter().copied().map(RecordData::Aaaa).collect(),
            Slot::Ns(set) => set.servers().iter().cloned().map(RecordData::Ns).collect(),
            Slot::Ptr(name) => vec![RecordData::Ptr(name.target().to_string())],
        }
    }
}

/// Everything cached for a single name, one optional slot per record type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordsContainer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    a: Option<AddressSetV4>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aaaa: Option<AddressSetV6>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ns: Option<NameServerSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ptr: Option<ReverseName>,
}

impl RecordsContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `kind`, if occupied.
    ///
    /// Expired slots are still returned until pruned, so callers deciding
    /// hit or miss should call [`prune_expired`](Self::prune_expired) first.
    pub fn get_slot(&self, kind: RecordType) -> Option<Slot<'_>> {
        match kind {
            RecordType::A => self.a.as_ref().map(Slot::A),
            RecordType::Aaaa => self.aaaa.as_ref().map(Slot::Aaaa),
            RecordType::Ns => self.ns.as_ref().map(Slot::Ns),
            RecordType::Ptr => self.ptr.as_ref().map(Slot::Ptr),
        }
    }

    /// Clear every expired slot. Returns how many were cleared.
    pub fn prune_expired(&mut self) -> usize {
        self.prune_expired_at(now_millis())
    }

    pub fn prune_expired_at(&mut self, now: u64) -> usize {
        [
            clear_if_expired(&mut self.a, now),
            clear_if_expired(&mut self.aaaa, now),
            clear_if_expired(&mut self.ns, now),
            clear_if_expired(&mut self.ptr, now),
        ]
        .into_iter()
        .filter(|cleared| *cleared)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_none() && self.aaaa.is_none() && self.ns.is_none() && self.ptr.is_none()
    }

    /// Fold one upstream answer into its slot.
    ///
    /// An absent or expired slot is created with `ttl`; a live slot keeps its
    /// original TTL and only gains the new data. Reverse names are
    /// first-write-wins.
    pub fn upsert(&mut self, ttl: u32, data: RecordData) {
        self.upsert_at(ttl, data, now_millis());
    }

    pub fn upsert_at(&mut self, ttl: u32, data: RecordData, now: u64) {
        let record = Record::with_created_at(ttl, now);
        match data {
            RecordData::A(addr) => {
                live_slot(&mut self.a, now, || AddressSetV4::new(record)).push(addr);
            }
            RecordData::Aaaa(addr) => {
                live_slot(&mut self.aaaa, now, || AddressSetV6::new(record)).push(addr);
            }
            RecordData::Ns(server) => {
                live_slot(&mut self.ns, now, || NameServerSet::new(record)).push(server);
            }
            RecordData::Ptr(target) => {
                live_slot(&mut self.ptr, now, || ReverseName::new(record, target));
            }
        }
    }
}

fn clear_if_expired<T: Expiring>(slot: &mut Option<T>, now: u64) -> bool {
    if slot.as_ref().is_some_and(|set| set.is_expired_at(now)) {
        *slot = None;
        return true;
    }
    false
}

fn live_slot<T: Expiring>(slot: &mut Option<T>, now: u64, create: impl FnOnce() -> T) -> &mut T {
    clear_if_expired(slot, now);
    slot.get_or_insert_with(create)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    const T0: u64 = 1_700_000_000_000;

    fn a(last: u8) -> RecordData {
        RecordData::A(Ipv4Addr::new(192, 0, 2, last))
    }

    fn slot_ttl(container: &RecordsContainer, kind: RecordType, now: u64) -> Option<u32> {
        container.get_slot(kind).map(|slot| slot.remaining_ttl_at(now))
    }

    #[test]
    fn new_container_is_empty() {
        let container = RecordsContainer::new();

        assert!(container.is_empty());
        assert!(RecordType::ALL.iter().all(|kind| container.get_slot(*kind).is_none()));
    }

    #[test]
    fn is_empty_matches_slot_accessors() {
        let mut container = RecordsContainer::new();

        for (ttl, data) in [
            (10, a(1)),
            (20, RecordData::Aaaa(Ipv6Addr::LOCALHOST)),
            (30, RecordData::Ns("ns.example".into())),
            (40, RecordData::Ptr("host.example".into())),
        ] {
            container.upsert_at(ttl, data, T0);
            let any_present = RecordType::ALL.iter().any(|k| container.get_slot(*k).is_some());
            assert_eq!(container.is_empty(), !any_present);
        }

        container.prune_expired_at(T0 + 100_000);
        assert!(container.is_empty());
        assert!(RecordType::ALL.iter().all(|k| container.get_slot(*k).is_none()));
    }

    #[test]
    fn upsert_appends_without_resetting_ttl() {
        let mut container = RecordsContainer::new();

        container.upsert_at(30, a(1), T0);
        container.upsert_at(300, a(2), T0 + 10_000);

        let slot = container.get_slot(RecordType::A).unwrap();
        assert_eq!(slot.answers(), vec![a(1), a(2)]);
        assert_eq!(slot.remaining_ttl_at(T0 + 10_000), 20);
    }

    #[test]
    fn upsert_into_expired_slot_starts_fresh() {
        let mut container = RecordsContainer::new();

        container.upsert_at(1, a(1), T0);
        container.upsert_at(60, a(2), T0 + 5_000);

        let slot = container.get_slot(RecordType::A).unwrap();
        assert_eq!(slot.answers(), vec![a(2)]);
        assert_eq!(slot.remaining_ttl_at(T0 + 5_000), 60);
    }

    #[test]
    fn reverse_name_is_first_write_wins() {
        let mut container = RecordsContainer::new();

        container.upsert_at(60, RecordData::Ptr("first.example".into()), T0);
        container.upsert_at(600, RecordData::Ptr("second.example".into()), T0 + 1_000);

        let slot = container.get_slot(RecordType::Ptr).unwrap();
        assert_eq!(slot.answers(), vec![RecordData::Ptr("first.example".into())]);
        assert_eq!(slot.remaining_ttl_at(T0 + 1_000), 59);
    }

    #[test]
    fn prune_clears_only_expired_slots() {
        let mut container = RecordsContainer::new();
        container.upsert_at(1, a(1), T0);
        container.upsert_at(60, RecordData::Ns("ns.example".into()), T0);

        let cleared = container.prune_expired_at(T0 + 2_000);

        assert_eq!(cleared, 1);
        assert!(container.get_slot(RecordType::A).is_none());
        assert_eq!(slot_ttl(&container, RecordType::Ns, T0 + 2_000), Some(58));
        assert!(!container.is_empty());
    }

    #[test]
    fn prune_is_idempotent() {
        let mut container = RecordsContainer::new();
        container.upsert_at(1, a(1), T0);
        container.upsert_at(5, RecordData::Aaaa(Ipv6Addr::LOCALHOST), T0);
        container.upsert_at(60, RecordData::Ptr("host.example".into()), T0);

        container.prune_expired_at(T0 + 3_000);
        let once = container.clone();
        let cleared_again = container.prune_expired_at(T0 + 3_000);

        assert_eq!(cleared_again, 0);
        assert_eq!(container, once);
    }

    #[test]
    fn slot_types_are_independent() {
        let mut container = RecordsContainer::new();
        container.upsert_at(30, RecordData::Aaaa(Ipv6Addr::LOCALHOST), T0);

        assert!(container.get_slot(RecordType::A).is_none());
        assert_eq!(
            container.get_slot(RecordType::Aaaa).unwrap().answers(),
            vec![RecordData::Aaaa(Ipv6Addr::LOCALHOST)]
        );
    }
}
