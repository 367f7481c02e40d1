use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::crdt::{cbor_bytes, Crdt, Stamp};

// ---------------------------------------------------------------------------
// Lww
// ---------------------------------------------------------------------------

/// Last-writer-wins register.
///
/// The larger stamp wins. Equal stamps (two replicas restored from one dump
/// and writing the same field) fall back to comparing the CBOR encoding of
/// the values, larger bytes win.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Lww<T> {
    value: T,
    stamp: Stamp,
}

impl<T> Lww<T>
where
    T: Serialize + Clone + PartialEq + Default,
{
    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn stamp(&self) -> Stamp {
        self.stamp
    }

    /// Local write. Returns false (and keeps the old stamp) when the value is
    /// unchanged, so no-op writes never dirty a document.
    pub fn set(&mut self, value: T, stamp: Stamp) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.stamp = stamp;
        true
    }

    fn beats(&self, other: &Self) -> bool {
        match self.stamp.cmp(&other.stamp) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => cbor_bytes(&self.value) > cbor_bytes(&other.value),
        }
    }
}

impl<T> Crdt for Lww<T>
where
    T: Serialize + Clone + PartialEq + Default,
{
    fn merge(&mut self, other: &Self) {
        if other.beats(self) {
            self.value = other.value.clone();
            self.stamp = other.stamp;
        }
    }

    fn max_lamport(&self) -> u64 {
        self.stamp.lamport
    }

    fn forget_before(&mut self, cutoff: &Stamp) {
        if !self.stamp.is_zero() && self.stamp <= *cutoff {
            self.value = T::default();
            self.stamp = Stamp::ZERO;
        }
    }
}

// ---------------------------------------------------------------------------
// MaxRegister
// ---------------------------------------------------------------------------

/// Register whose value only moves up. The value is its own priority.
///
/// Removal of an enclosing map entry does not reset it: `forget_before` is a
/// no-op, so a revived entry resumes from the highest value ever merged.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaxRegister<T>(T);

impl<T: Ord + Copy + Default> MaxRegister<T> {
    pub fn get(&self) -> T {
        self.0
    }

    /// Raise to `value`. Lower values are ignored; returns whether it moved.
    pub fn raise(&mut self, value: T) -> bool {
        if value > self.0 {
            self.0 = value;
            true
        } else {
            false
        }
    }
}

impl<T: Ord + Copy + Default> Crdt for MaxRegister<T> {
    fn merge(&mut self, other: &Self) {
        self.raise(other.0);
    }

    fn max_lamport(&self) -> u64 {
        0
    }

    fn forget_before(&mut self, _cutoff: &Stamp) {}
}

// ---------------------------------------------------------------------------
// Flag
// ---------------------------------------------------------------------------

/// Sticky boolean: once any replica sets it, it stays set.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flag(bool);

impl Flag {
    pub fn get(&self) -> bool {
        self.0
    }

    /// Returns true if this call flipped the flag.
    pub fn set(&mut self) -> bool {
        let changed = !self.0;
        self.0 = true;
        changed
    }
}

impl Crdt for Flag {
    fn merge(&mut self, other: &Self) {
        self.0 |= other.0;
    }

    fn max_lamport(&self) -> u64 {
        0
    }

    fn forget_before(&mut self, _cutoff: &Stamp) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::DeviceID;

    fn stamp(lamport: u64, device: u8) -> Stamp {
        Stamp {
            lamport,
            device: DeviceID([device; 16]),
        }
    }

    #[test]
    fn test_lww_higher_stamp_wins_both_orders() {
        let mut a = Lww::<String>::default();
        a.set("old".into(), stamp(1, 1));
        let mut b = Lww::<String>::default();
        b.set("new".into(), stamp(2, 1));

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.get(), "new");
    }

    #[test]
    fn test_lww_equal_stamp_tie_break_is_symmetric() {
        let mut a = Lww::<String>::default();
        a.set("Raz".into(), stamp(3, 7));
        let mut b = Lww::<String>::default();
        b.set("Nibbler".into(), stamp(3, 7));

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_lww_noop_write_keeps_stamp() {
        let mut a = Lww::<i64>::default();
        assert!(a.set(5, stamp(1, 1)));
        assert!(!a.set(5, stamp(9, 1)));
        assert_eq!(a.stamp(), stamp(1, 1));
    }

    #[test]
    fn test_lww_forget_before() {
        let mut a = Lww::<i64>::default();
        a.set(5, stamp(4, 1));
        a.forget_before(&stamp(3, 9));
        assert_eq!(*a.get(), 5);
        a.forget_before(&stamp(4, 1));
        assert_eq!(*a.get(), 0);
        assert!(a.stamp().is_zero());
    }

    #[test]
    fn test_max_register_and_flag() {
        let mut m = MaxRegister::<i64>::default();
        assert!(m.raise(10));
        assert!(!m.raise(3));
        let mut other = MaxRegister::default();
        other.raise(20);
        m.merge(&other);
        assert_eq!(m.get(), 20);

        let mut f = Flag::default();
        let mut g = Flag::default();
        assert!(g.set());
        assert!(!g.set());
        f.merge(&g);
        assert!(f.get());
    }
}
