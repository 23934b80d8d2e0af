//! Shared per-name record cache.
//!
//! One mutex guards the whole map. Callers take it for the full
//! lookup → prune → read-or-upsert span and never hold it across an
//! `.await`.

mod container;
mod record;
mod sets;
pub mod snapshot;
pub mod sweeper;

pub use container::{RecordsContainer, Slot};
pub use record::{Record, now_millis};
pub use sets::{AddressSet, AddressSetV4, AddressSetV6, Expiring, NameServerSet, ReverseName};
pub use sweeper::Sweeper;

use rustc_hash::FxHashMap;
use std::borrow::Cow;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lowercase a name and drop its trailing dot, borrowing when already clean.
pub fn normalize_name(name: &str) -> Cow<'_, str> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.bytes().any(|b| b.is_ascii_uppercase()) {
        Cow::Owned(trimmed.to_ascii_lowercase())
    } else {
        Cow::Borrowed(trimmed)
    }
}

/// Result of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub slots_pruned: usize,
    pub entries_removed: usize,
    pub entries_remaining: usize,
}

/// The name → container map behind the cache lock.
#[derive(Debug, Default)]
pub struct CacheMap {
    containers: FxHashMap<String, RecordsContainer>,
}

impl CacheMap {
    /// Existing container for `name`. Never creates one.
    pub fn lookup(&mut self, name: &str) -> Option<&mut RecordsContainer> {
        self.containers.get_mut(normalize_name(name).as_ref())
    }

    pub fn get_or_create(&mut self, name: &str) -> &mut RecordsContainer {
        self.containers
            .entry(normalize_name(name).into_owned())
            .or_default()
    }

    /// Drop the mapping for `name` if its container holds nothing.
    pub fn remove_if_empty(&mut self, name: &str) -> bool {
        let key = normalize_name(name);
        if self.containers.get(key.as_ref()).is_some_and(RecordsContainer::is_empty) {
            self.containers.remove(key.as_ref());
            return true;
        }
        false
    }

    pub fn for_each_entry(&mut self, mut visitor: impl FnMut(&str, &mut RecordsContainer)) {
        for (name, container) in self.containers.iter_mut() {
            visitor(name, container);
        }
    }

    /// Prune every container, then remove the ones left empty.
    pub fn sweep_at(&mut self, now: u64) -> SweepOutcome {
        let mut slots_pruned = 0;
        let mut emptied = Vec::new();

        self.for_each_entry(|name, container| {
            slots_pruned += container.prune_expired_at(now);
            if container.is_empty() {
                emptied.push(name.to_string());
            }
        });

        let entries_removed = emptied
            .iter()
            .filter(|name| self.remove_if_empty(name))
            .count();

        SweepOutcome {
            slots_pruned,
            entries_removed,
            entries_remaining: self.containers.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&String, &RecordsContainer)> {
        self.containers.iter()
    }

    pub(crate) fn insert(&mut self, name: &str, container: RecordsContainer) {
        self.containers
            .insert(normalize_name(name).into_owned(), container);
    }
}

/// Concurrency-safe record cache shared by the resolver and the sweeper.
#[derive(Debug, Default)]
pub struct Cache {
    entries: Mutex<CacheMap>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: CacheMap) -> Self {
        Self {
            entries: Mutex::new(map),
        }
    }

    /// Take the cache lock.
    ///
    /// A panic while holding the lock leaves at worst a partially appended
    /// set, so a poisoned lock is recovered rather than propagated.
    pub fn lock(&self) -> MutexGuard<'_, CacheMap> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sweep(&self) -> SweepOutcome {
        self.lock().sweep_at(now_millis())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{RecordData, RecordType};
    use std::net::Ipv4Addr;

    const T0: u64 = 1_700_000_000_000;

    fn addr(last: u8) -> RecordData {
        RecordData::A(Ipv4Addr::new(198, 51, 100, last))
    }

    #[test]
    fn normalize_name_lowercases_and_trims_root_dot() {
        assert_eq!(normalize_name("Example.COM."), "example.com");
        assert!(matches!(normalize_name("example.com"), Cow::Borrowed(_)));
        assert_eq!(normalize_name("."), "");
    }

    #[test]
    fn lookup_does_not_create() {
        let cache = Cache::new();

        assert!(cache.lock().lookup("example.com").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn get_or_create_is_case_insensitive() {
        let cache = Cache::new();
        let mut map = cache.lock();

        map.get_or_create("Example.com").upsert_at(30, addr(1), T0);
        map.get_or_create("example.com.").upsert_at(30, addr(2), T0);

        assert_eq!(map.len(), 1);
        let container = map.lookup("EXAMPLE.COM").unwrap();
        assert_eq!(
            container.get_slot(RecordType::A).unwrap().answers(),
            vec![addr(1), addr(2)]
        );
    }

    #[test]
    fn remove_if_empty_keeps_populated_containers() {
        let mut map = CacheMap::default();
        map.get_or_create("empty.example");
        map.get_or_create("full.example").upsert_at(30, addr(1), T0);

        assert!(map.remove_if_empty("empty.example"));
        assert!(!map.remove_if_empty("full.example"));
        assert!(!map.remove_if_empty("missing.example"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let mut map = CacheMap::default();
        for name in ["a.example", "b.example", "c.example"] {
            map.get_or_create(name).upsert_at(1, addr(1), T0);
        }
        map.get_or_create("d.example").upsert_at(60, addr(4), T0);

        let outcome = map.sweep_at(T0 + 2_000);

        assert_eq!(
            outcome,
            SweepOutcome {
                slots_pruned: 3,
                entries_removed: 3,
                entries_remaining: 1,
            }
        );
        assert!(map.lookup("d.example").is_some());
    }

    #[test]
    fn sweep_of_empty_cache_is_noop() {
        let mut map = CacheMap::default();

        assert_eq!(map.sweep_at(T0), SweepOutcome::default());
    }

    #[test]
    fn for_each_entry_visits_every_container() {
        let mut map = CacheMap::default();
        map.get_or_create("a.example").upsert_at(30, addr(1), T0);
        map.get_or_create("b.example").upsert_at(30, addr(2), T0);

        let mut seen = Vec::new();
        map.for_each_entry(|name, _| seen.push(name.to_string()));
        seen.sort();

        assert_eq!(seen, ["a.example", "b.example"]);
    }
}
