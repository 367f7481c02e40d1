/// Field-level merge primitives for config documents.
///
/// Every config document is a tree of these types, so merging two documents
/// is a join that is commutative, associative and idempotent: any set of
/// replicas converges to the same bytes regardless of delivery order.
///
/// - `Lww<T>`: last-writer-wins register keyed by `Stamp`
/// - `MaxRegister<T>`: larger value wins (read markers, delete-before times)
/// - `Flag`: sticky boolean, once set stays set
/// - `LwwMap<K, V>`: keyed entries with removal tombstones
use serde::{Deserialize, Serialize};

use crate::ids::DeviceID;

pub mod map;
pub mod register;

pub use map::{LwwMap, Tombstone};
pub use register::{Flag, Lww, MaxRegister};

// ---------------------------------------------------------------------------
// Stamp
// ---------------------------------------------------------------------------

/// Writer stamp: Lamport clock plus writer identity.
///
/// Ordered by lamport first, then device. The all-zero stamp means
/// "never written".
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Stamp {
    pub lamport: u64,
    pub device: DeviceID,
}

impl Stamp {
    pub const ZERO: Stamp = Stamp {
        lamport: 0,
        device: DeviceID([0u8; 16]),
    };

    pub fn is_zero(&self) -> bool {
        self.lamport == 0
    }
}

// ---------------------------------------------------------------------------
// Crdt
// ---------------------------------------------------------------------------

/// A state-based replicated value.
pub trait Crdt {
    /// Join `other` into `self`. Must be commutative, associative and
    /// idempotent.
    fn merge(&mut self, other: &Self);

    /// Highest Lamport value carried by any stamp inside.
    fn max_lamport(&self) -> u64;

    /// Reset everything written at or before `cutoff`. Used when a map entry
    /// is removed so that a later re-add starts from a clean slate.
    fn forget_before(&mut self, cutoff: &Stamp);
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Hands out strictly increasing stamps for one local edit.
#[derive(Debug)]
pub struct Writer {
    clock: u64,
    device: DeviceID,
    now_ms: i64,
}

impl Writer {
    pub fn new(clock: u64, device: DeviceID, now_ms: i64) -> Self {
        Writer {
            clock,
            device,
            now_ms,
        }
    }

    /// Next stamp; every call is greater than the previous one.
    pub fn stamp(&mut self) -> Stamp {
        self.clock += 1;
        Stamp {
            lamport: self.clock,
            device: self.device,
        }
    }

    /// Removal tombstone stamped now.
    pub fn tombstone(&mut self) -> Tombstone {
        Tombstone {
            stamp: self.stamp(),
            at_ms: self.now_ms,
        }
    }

    /// Wall-clock time of this edit.
    pub fn now_ms(&self) -> i64 {
        self.now_ms
    }

    /// Clock value after the last stamp handed out.
    pub fn clock(&self) -> u64 {
        self.clock
    }
}

/// Implement [`Crdt`] for a struct whose fields are all `Crdt`, field by field.
macro_rules! crdt_fields {
    ($ty:ident { $($field:ident),+ $(,)? }) => {
        impl $crate::crdt::Crdt for $ty {
            fn merge(&mut self, other: &Self) {
                $( $crate::crdt::Crdt::merge(&mut self.$field, &other.$field); )+
            }

            fn max_lamport(&self) -> u64 {
                [$( $crate::crdt::Crdt::max_lamport(&self.$field) ),+]
                    .into_iter()
                    .max()
                    .unwrap_or(0)
            }

            fn forget_before(&mut self, cutoff: &$crate::crdt::Stamp) {
                $( $crate::crdt::Crdt::forget_before(&mut self.$field, cutoff); )+
            }
        }
    };
}
pub(crate) use crdt_fields;

/// Canonical CBOR encoding, used for value tie-breaks and document bodies.
pub(crate) fn cbor_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    if ciborium::into_writer(value, &mut buf).is_err() {
        buf.clear();
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_order() {
        let a = DeviceID([1; 16]);
        let b = DeviceID([2; 16]);
        let s1 = Stamp { lamport: 1, device: b };
        let s2 = Stamp { lamport: 2, device: a };
        let s3 = Stamp { lamport: 2, device: b };
        assert!(s1 < s2);
        assert!(s2 < s3);
        assert!(Stamp::ZERO < s1);
        assert!(Stamp::ZERO.is_zero());
    }

    #[test]
    fn test_writer_monotonic() {
        let mut w = Writer::new(5, DeviceID([9; 16]), 1_000);
        let a = w.stamp();
        let b = w.stamp();
        let t = w.tombstone();
        assert_eq!(a.lamport, 6);
        assert!(a < b && b < t.stamp);
        assert_eq!(t.at_ms, 1_000);
        assert_eq!(w.clock(), 8);
    }
}
