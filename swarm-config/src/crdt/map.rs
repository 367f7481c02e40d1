/// Keyed map of mergeable entries with removal tombstones.
///
/// Each entry carries the stamp of its latest (re)creation and, once removed,
/// a tombstone. An entry is live while its creation stamp is newer than its
/// tombstone, so a concurrent insert and remove resolve by stamp order on
/// every replica. Removing an entry forgets every field written before the
/// removal; a later re-add starts empty instead of resurrecting old fields.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crdt::{Crdt, Stamp};

/// Removal marker. `at_ms` is only used for retention pruning.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tombstone {
    pub stamp: Stamp,
    pub at_ms: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
struct MapEntry<V> {
    value: V,
    created: Stamp,
    removed: Option<Tombstone>,
}

impl<V> MapEntry<V> {
    fn is_live(&self) -> bool {
        !self.created.is_zero() && self.removed.map_or(true, |t| self.created > t.stamp)
    }
}

impl<V: Crdt> MapEntry<V> {
    fn settle(&mut self) {
        if let Some(t) = self.removed {
            self.value.forget_before(&t.stamp);
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(bound(
    serialize = "K: Serialize + Ord, V: Serialize",
    deserialize = "K: Deserialize<'de> + Ord, V: Deserialize<'de>"
))]
pub struct LwwMap<K, V> {
    entries: BTreeMap<K, MapEntry<V>>,
}

impl<K: Ord, V> Default for LwwMap<K, V> {
    fn default() -> Self {
        LwwMap {
            entries: BTreeMap::new(),
        }
    }
}

impl<K, V> LwwMap<K, V>
where
    K: Ord + Clone,
    V: Crdt + Default + Clone,
{
    /// Live value for `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|e| e.is_live())
            .map(|e| &e.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Live entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.is_live())
            .map(|(k, e)| (k, &e.value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| e.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutable access to a live entry, creating (or reviving) it with
    /// `stamp` if needed. Returns the value and whether the entry was created.
    pub fn upsert(&mut self, key: K, stamp: Stamp) -> (&mut V, bool) {
        let entry = self.entries.entry(key).or_insert_with(|| MapEntry {
            value: V::default(),
            created: Stamp::ZERO,
            removed: None,
        });
        let created = !entry.is_live();
        if created {
            entry.created = stamp;
        }
        (&mut entry.value, created)
    }

    /// Mutable access to a live entry without creating it.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries
            .get_mut(key)
            .filter(|e| e.is_live())
            .map(|e| &mut e.value)
    }

    /// Every stored value, live or not. Used for nested pruning.
    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.values_mut().map(|e| &mut e.value)
    }

    /// Remove a live entry, leaving a tombstone. Returns false if absent.
    pub fn remove(&mut self, key: &K, tombstone: Tombstone) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.is_live() => {
                entry.removed = Some(tombstone);
                entry.settle();
                true
            }
            _ => false,
        }
    }

    /// Drop dead entries whose tombstone is older than `retention_ms`.
    /// Returns the number of tombstones dropped.
    pub fn prune_tombstones(&mut self, now_ms: i64, retention_ms: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| {
            e.is_live()
                || e
                    .removed
                    .map_or(true, |t| now_ms.saturating_sub(t.at_ms) <= retention_ms)
        });
        before - self.entries.len()
    }
}

impl<K, V> Crdt for LwwMap<K, V>
where
    K: Ord + Clone,
    V: Crdt + Default + Clone,
{
    fn merge(&mut self, other: &Self) {
        for (key, theirs) in &other.entries {
            match self.entries.get_mut(key) {
                Some(ours) => {
                    ours.created = ours.created.max(theirs.created);
                    ours.removed = ours.removed.max(theirs.removed);
                    ours.value.merge(&theirs.value);
                    ours.settle();
                }
                None => {
                    let mut entry = theirs.clone();
                    entry.settle();
                    self.entries.insert(key.clone(), entry);
                }
            }
        }
    }

    fn max_lamport(&self) -> u64 {
        self.entries
            .values()
            .map(|e| {
                e.created
                    .lamport
                    .max(e.removed.map_or(0, |t| t.stamp.lamport))
                    .max(e.value.max_lamport())
            })
            .max()
            .unwrap_or(0)
    }

    fn forget_before(&mut self, cutoff: &Stamp) {
        for entry in self.entries.values_mut() {
            entry.value.forget_before(cutoff);
            if entry.created <= *cutoff {
                entry.created = Stamp::ZERO;
            }
            if entry.removed.map_or(false, |t| t.stamp <= *cutoff) {
                entry.removed = None;
            }
        }
        self.entries
            .retain(|_, e| !e.created.is_zero() || e.removed.is_some());
    }
}
