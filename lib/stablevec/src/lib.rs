//! A slot arena with stable, generation-checked keys.
#![allow(
    unsafe_code,
    // reason = "slot storage is MaybeUninit, with initialization tracked in a bit vector"
)]

use std::{
    marker::PhantomData,
    mem::MaybeUninit,
    ops::{Index, IndexMut},
};

use armature_common::ArrayIndex;
use bitvec::vec::BitVec;

mod conv;
mod debug;

/// A handle to a value within a [StableVec].
///
/// A key stays valid until the value it refers to is removed. Once removed, the slot may be
/// reused by a later insertion, but the slot's generation is bumped first, so the stale key
/// never resolves to the new value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key<Idx: ArrayIndex = u32> {
    index: Idx,
    generation: u32,
}

impl<Idx: ArrayIndex> Key<Idx> {
    #[inline]
    pub fn index(&self) -> Idx {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    fn slot(&self) -> usize {
        self.index.as_()
    }
}

impl<Idx: ArrayIndex + std::fmt::Display> std::fmt::Display for Key<Idx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// A vector type with indices stable across removals & insertions, and which reuses deleted
/// indices; comparable to `Vec<Option<T>>`, but with generation-checked [Keys](Key).
///
/// # Invariants
///
/// * `flags.len()` == `data.len()` == `generations.len()`
/// * `data[i]` is initialized ⟺ `flags[i] == true`
/// * `count` == number of set bits in `flags`
pub struct StableVec<T, Idx: ArrayIndex = u32> {
    /// Slot storage.
    data: Vec<MaybeUninit<T>>,
    /// Flags indicating whether a data entry is initialized.
    flags: BitVec<usize, bitvec::order::Lsb0>,
    /// Per-slot generation, bumped every time a slot is vacated.
    generations: Vec<u32>,
    /// Number of initialized values.
    count: usize,
    _idx: PhantomData<Idx>,
}

impl<T, Idx: ArrayIndex> Default for StableVec<T, Idx> {
    fn default() -> Self {
        Self::new()
    }
}

fn capacity_overflow() -> ! {
    panic!("capacity overflow")
}

impl<T, Idx: ArrayIndex> StableVec<T, Idx> {
    /// Create a new, empty [`StableVec`].
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            flags: BitVec::EMPTY,
            generations: Vec::new(),
            count: 0,
            _idx: PhantomData,
        }
    }

    /// Create a new [`StableVec`] with room for `cap` values before reallocating.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            data: Vec::with_capacity(cap),
            flags: BitVec::with_capacity(cap),
            generations: Vec::with_capacity(cap),
            count: 0,
            _idx: PhantomData,
        }
    }

    /// The number of slots, occupied or not.
    #[inline(always)]
    pub fn slots(&self) -> usize {
        self.data.len()
    }

    /// The number of initialized values.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The number of vacant slots that will be reused before the storage grows.
    #[inline(always)]
    pub fn vacant(&self) -> usize {
        self.slots() - self.count
    }

    /// Ensure that at least `additional` more values can be inserted without reallocation.
    pub fn reserve(&mut self, additional: usize) {
        if let Some(amt) = additional.checked_sub(self.vacant()) {
            self.data.reserve(amt);
            self.flags.reserve(amt);
            self.generations.reserve(amt);
        }
    }

    /// Whether `key` refers to a value currently stored in `self`.
    #[inline]
    pub fn contains(&self, key: Key<Idx>) -> bool {
        let slot = key.slot();
        slot < self.slots() && self.flags[slot] && self.generations[slot] == key.generation
    }

    /// The key of the value currently occupying `slot`, if any.
    pub fn key_at(&self, slot: usize) -> Option<Key<Idx>> {
        if self.is_init(slot) {
            Some(Key {
                index: Idx::from_usize(slot)?,
                generation: self.generations[slot],
            })
        } else {
            None
        }
    }

    #[inline]
    pub fn is_init(&self, slot: usize) -> bool {
        self.flags.get(slot).map(|b| *b).unwrap_or(false)
    }

    /// Insert a value, reusing the lowest vacant slot, and return its key.
    ///
    /// # Panics
    ///
    /// * The slot index does not fit within `Idx`.
    pub fn insert(&mut self, value: T) -> Key<Idx> {
        let slot = match self.flags.first_zero() {
            Some(i) => i,
            None => {
                self.data.push(MaybeUninit::uninit());
                self.flags.push(false);
                self.generations.push(0);
                self.slots() - 1
            }
        };
        let index = match Idx::from_usize(slot) {
            Some(i) => i,
            None => capacity_overflow(),
        };
        self.data[slot].write(value);
        self.flags.set(slot, true);
        self.count += 1;
        Key {
            index,
            generation: self.generations[slot],
        }
    }

    /// Remove the value referred to by `key`, if extant.
    pub fn remove(&mut self, key: Key<Idx>) -> Option<T> {
        if !self.contains(key) {
            return None;
        }
        let slot = key.slot();
        self.flags.set(slot, false);
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.count -= 1;
        // the flag was set, so the slot is initialized; clearing the flag hands ownership out
        Some(unsafe { self.data[slot].assume_init_read() })
    }

    /// Get the value at `key`, if extant.
    #[inline]
    pub fn get(&self, key: Key<Idx>) -> Option<&T> {
        if self.contains(key) {
            Some(unsafe { self.get_unchecked(key.slot()) })
        } else {
            None
        }
    }

    /// Get the value at `key`, if extant.
    #[inline]
    pub fn get_mut(&mut self, key: Key<Idx>) -> Option<&mut T> {
        if self.contains(key) {
            Some(unsafe { self.get_unchecked_mut(key.slot()) })
        } else {
            None
        }
    }

    /// Get mutable references to two distinct values at once.
    ///
    /// Returns `None` if either key is stale or both keys name the same slot.
    pub fn get2_mut(&mut self, a: Key<Idx>, b: Key<Idx>) -> Option<(&mut T, &mut T)> {
        if a.slot() == b.slot() || !self.contains(a) || !self.contains(b) {
            return None;
        }
        let (sa, sb) = (a.slot(), b.slot());
        let base = self.data.as_mut_ptr();
        // distinct, in-bounds, initialized slots
        unsafe {
            Some((
                (*base.add(sa)).assume_init_mut(),
                (*base.add(sb)).assume_init_mut(),
            ))
        }
    }

    /// Get the value at a raw slot.
    ///
    /// # Panics
    ///
    /// * `slot` >= `self.slots()`
    ///
    /// # Safety
    ///
    /// * `self.data[slot]` must already be initialized
    #[inline]
    pub unsafe fn get_unchecked(&self, slot: usize) -> &T {
        unsafe { self.data[slot].assume_init_ref() }
    }

    /// Get the value at a raw slot.
    ///
    /// # Panics
    ///
    /// * `slot` >= `self.slots()`
    ///
    /// # Safety
    ///
    /// * `self.data[slot]` must already be initialized
    #[inline]
    pub unsafe fn get_unchecked_mut(&mut self, slot: usize) -> &mut T {
        unsafe { self.data[slot].assume_init_mut() }
    }

    /// Drop everything. Outstanding keys become stale.
    pub fn clear(&mut self) {
        let occupied: Vec<usize> = self.flags.iter_ones().collect();
        for slot in occupied {
            self.flags.set(slot, false);
            self.generations[slot] = self.generations[slot].wrapping_add(1);
            unsafe { self.data[slot].assume_init_drop() };
        }
        self.count = 0;
    }

    /// Iterate over every stored value along with its key, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Key<Idx>, &T)> + '_ {
        self.flags.iter_ones().filter_map(move |slot| {
            let key = self.key_at(slot)?;
            Some((key, unsafe { self.get_unchecked(slot) }))
        })
    }

    /// Iterate over the keys of every stored value, in slot order.
    pub fn keys(&self) -> impl Iterator<Item = Key<Idx>> + '_ {
        self.flags.iter_ones().filter_map(move |slot| self.key_at(slot))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.flags
            .iter_ones()
            .map(move |slot| unsafe { self.get_unchecked(slot) })
    }
}

impl<T, Idx: ArrayIndex> Drop for StableVec<T, Idx> {
    fn drop(&mut self) {
        for slot in self.flags.iter_ones() {
            unsafe { self.data[slot].assume_init_drop() };
        }
    }
}

impl<T: Clone, Idx: ArrayIndex> Clone for StableVec<T, Idx> {
    fn clone(&self) -> Self {
        let mut data = Vec::with_capacity(self.slots());
        for slot in 0..self.slots() {
            if self.flags[slot] {
                data.push(MaybeUninit::new(unsafe { self.get_unchecked(slot) }.clone()));
            } else {
                data.push(MaybeUninit::uninit());
            }
        }
        Self {
            data,
            flags: self.flags.clone(),
            generations: self.generations.clone(),
            count: self.count,
            _idx: PhantomData,
        }
    }
}

impl<T, Idx: ArrayIndex> Index<Key<Idx>> for StableVec<T, Idx> {
    type Output = T;

    /// # Panics
    ///
    /// * `key` is stale
    fn index(&self, key: Key<Idx>) -> &Self::Output {
        match self.get(key) {
            Some(v) => v,
            None => panic!("stale key: {key:?}"),
        }
    }
}

impl<T, Idx: ArrayIndex> IndexMut<Key<Idx>> for StableVec<T, Idx> {
    /// # Panics
    ///
    /// * `key` is stale
    fn index_mut(&mut self, key: Key<Idx>) -> &mut Self::Output {
        match self.get_mut(key) {
            Some(v) => v,
            None => panic!("stale key: {key:?}"),
        }
    }
}
