//! The public associative container: a generic wrapper around
//! [`crate::raw::RawTable`] that owns the [`std::hash::BuildHasher`] and the
//! iterator lock.

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};

use crate::builder::TableBuilder;
use crate::error::{Error, Result};
use crate::iter::{Iter, IterMut, LockCell};
use crate::raw::{InsertOutcome, RawTable};

/// Point-in-time counters exposed for diagnostics and tuning; see
/// [`Table::stats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableStats {
    /// The maximum PSL currently held by any occupied bucket. Insertion can
    /// only ever raise it by one; deletion recomputes it, since removing or
    /// backshifting the bucket(s) at the current peak can lower it.
    pub peak_psl: u8,
    /// Sum of every occupied bucket's current PSL; `psl_sum as f64 / len as
    /// f64` is the mean probe length.
    pub psl_sum: u64,
    /// Number of buckets currently pinned at the configured `psl_limit`.
    pub psl_limit_hits: usize,
    /// `len / capacity`, as a fraction in `[0, 1]`.
    pub load_factor: f64,
}

/// An associative container over caller-defined keys, backed by an open
/// addressing table with Robin Hood linear probing.
///
/// `Table` is single-threaded by construction: the iterator lock is a plain
/// `Cell`, not an atomic. Sharing across threads requires an external
/// `Mutex<Table<..>>`.
///
/// Entries are not pointer-stable: growth and deletion both relocate
/// entries within the backing storage, so references returned by `get`/
/// `get_mut`/iteration borrow `Table` itself and cannot outlive the borrow
/// that produced them.
pub struct Table<K, V, S = RandomState> {
    raw: RawTable<K, V>,
    hash_builder: S,
    lock: LockCell,
}

impl<K, V> Table<K, V, RandomState> {
    /// Creates an empty table with a small built-in starting capacity.
    pub fn new() -> Self {
        TableBuilder::new().build().expect("default capacity never exceeds the bucket cap")
    }

    /// Creates an empty table with room for at least `capacity` entries
    /// before the first growth.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        TableBuilder::new().capacity(capacity).build()
    }
}

impl<K, V> Default for Table<K, V, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Table<K, V, S>
where
    S: BuildHasher,
{
    /// Creates an empty table using `hash_builder` in place of the default
    /// `RandomState`.
    pub fn with_hasher(hash_builder: S) -> Self {
        TableBuilder::with_hasher(hash_builder)
            .build()
            .expect("default capacity never exceeds the bucket cap")
    }

    /// Creates an empty table with room for at least `capacity` entries,
    /// using `hash_builder`.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Result<Self> {
        TableBuilder::with_hasher(hash_builder).capacity(capacity).build()
    }

    pub(crate) fn from_parts(capacity: usize, load_factor_threshold: u8, psl_limit: u8, hash_builder: S) -> Result<Self> {
        Ok(Self {
            raw: RawTable::with_capacity(capacity, load_factor_threshold, psl_limit)?,
            hash_builder,
            lock: LockCell::new(),
        })
    }

    fn hash_of<Q>(hash_builder: &S, key: &Q) -> u64
    where
        Q: Hash + ?Sized,
    {
        let mut hasher = hash_builder.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            peak_psl: self.raw.peak_psl(),
            psl_sum: self.raw.psl_sum(),
            psl_limit_hits: self.raw.psl_limit_hits(),
            load_factor: self.raw.len() as f64 / self.raw.capacity() as f64,
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = Self::hash_of(&self.hash_builder, key);
        self.raw.find(hash, key).map(|idx| &self.raw.get_at(idx).1)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = Self::hash_of(&self.hash_builder, key);
        let idx = self.raw.find(hash, key)?;
        Some(&mut self.raw.get_at_mut(idx).1)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Inserts `key`/`value` only if `key` is not already present. Returns
    /// `Ok(true)` if it was inserted, `Ok(false)` if an equal key was
    /// already present (the table is left unchanged in that case).
    pub fn try_insert(&mut self, key: K, value: V) -> Result<bool>
    where
        K: Hash + Eq,
    {
        self.lock.assert_unlocked_for_mutation();
        match self.insert_or_grow(key, value)? {
            InsertOutcome::Found(_, _) => Ok(false),
            InsertOutcome::Inserted(_) => Ok(true),
            InsertOutcome::NeedsGrow(_, _) | InsertOutcome::PslLimitReached(_, _) => {
                unreachable!("insert_or_grow resolves both before returning")
            }
        }
    }

    /// Inserts `key`/`value`, replacing and returning any previously stored
    /// value for an equal key. The stored key itself is left untouched when
    /// replacing (matching `std::collections::HashMap::insert`).
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>>
    where
        K: Hash + Eq,
    {
        self.lock.assert_unlocked_for_mutation();
        match self.insert_or_grow(key, value)? {
            InsertOutcome::Found(idx, new_value) => {
                let (_, slot) = self.raw.get_at_mut(idx);
                Ok(Some(std::mem::replace(slot, new_value)))
            }
            InsertOutcome::Inserted(_) => Ok(None),
            InsertOutcome::NeedsGrow(_, _) | InsertOutcome::PslLimitReached(_, _) => {
                unreachable!("insert_or_grow resolves both before returning")
            }
        }
    }

    /// Alias for [`Table::insert`] under the name this operation is commonly
    /// known by ("swap"/"replace").
    pub fn swap(&mut self, key: K, value: V) -> Result<Option<V>>
    where
        K: Hash + Eq,
    {
        self.insert(key, value)
    }

    fn insert_or_grow(&mut self, key: K, value: V) -> Result<InsertOutcome<K, V>>
    where
        K: Hash + Eq,
    {
        let hash = Self::hash_of(&self.hash_builder, &key);
        match self.raw.probe_and_insert(hash, key, value, false) {
            InsertOutcome::PslLimitReached(_, _) => Err(Error::TooManyCollisions),
            InsertOutcome::NeedsGrow(key, value) => {
                let hash_builder = &self.hash_builder;
                self.raw.grow(|k| Self::hash_of(hash_builder, k))?;
                match self.raw.probe_and_insert(hash, key, value, true) {
                    outcome @ InsertOutcome::Inserted(_) => Ok(outcome),
                    _ => unreachable!("a freshly grown table always has room for one more entry"),
                }
            }
            outcome => Ok(outcome),
        }
    }

    /// Removes and returns the value stored for `key`, if present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock.assert_unlocked_for_mutation();
        let hash = Self::hash_of(&self.hash_builder, key);
        let idx = self.raw.find(hash, key)?;
        let (_, v) = self.raw.erase_at(idx);
        Some(v)
    }

    /// Drops every entry and resets growth/PSL bookkeeping, keeping the
    /// current backing allocation (no shrinking below it).
    pub fn clear(&mut self) {
        self.lock.assert_unlocked_for_mutation();
        self.raw.clear();
    }

    pub fn iter(&self) -> Result<Iter<'_, K, V>> {
        Iter::new(&self.raw, &self.lock)
    }

    pub fn iter_mut(&mut self) -> Result<IterMut<'_, K, V>> {
        IterMut::new(&mut self.raw, &self.lock)
    }

    /// Recomputes every structural invariant spec §8 requires hold at every
    /// quiescent point — each occupied bucket's PSL matches its distance
    /// from its ideal position, `stats().psl_sum`/`psl_limit_hits`/
    /// `peak_psl` all agree with a from-scratch scan of the bucket array —
    /// and panics on the first mismatch. Meant for property-based tests
    /// driving a sequence of operations, not for use on a hot path.
    pub fn debug_assert_invariants(&self)
    where
        K: Hash,
    {
        self.raw.debug_assert_invariants(|k| Self::hash_of(&self.hash_builder, k));
    }
}
