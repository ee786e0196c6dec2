//! The unsafe, hash-agnostic core: storage arrays, the probe engine, the
//! growth manager and the deletion engine.
//!
//! `RawTable` never hashes a key itself — callers (here, only
//! `crate::table::Table`) pass in the already-computed 64-bit hash instead
//! of holding a `BuildHasher` of its own. That keeps this module generic
//! over `K`/`V` without needing a hasher type parameter threaded through
//! every method.

use crate::bucket::{truncate_hash, Bucket, MAX_PSL};
use crate::error::{Error, Result};
use std::mem::MaybeUninit;

/// Default capacity used when a caller asks for `with_capacity(0)`.
const DEFAULT_CAPACITY: usize = 6;
const MAX_BUCKETS: usize = 1 << 24;

/// Outcome of a single `probe_and_insert` call.
pub(crate) enum InsertOutcome<K, V> {
    /// An equal key was already present at this index; nothing was written.
    /// The candidate value is handed back so the caller can decide whether
    /// to use it to replace the stored value (`Table::insert`) or discard it
    /// (`Table::try_insert`). The candidate key is dropped.
    Found(usize, V),
    /// The key/value pair now lives at this index.
    Inserted(usize),
    /// No available slot could be claimed without the table growing first.
    /// The candidate is handed back unchanged so the caller can retry after
    /// `grow()`.
    NeedsGrow(K, V),
    /// The PSL-limit guard refused this genuinely-new key: some bucket is
    /// already pinned at `psl_limit` and growing would not be attempted
    /// for this key. The candidate is handed back unchanged.
    PslLimitReached(K, V),
}

pub(crate) struct RawTable<K, V> {
    meta: Box<[Bucket]>,
    entries: Box<[MaybeUninit<(K, V)>]>,
    mask: usize,
    len: usize,
    threshold: usize,
    psl_sum: u64,
    peak_psl: u8,
    /// `psl_hist[d]` counts occupied buckets currently at PSL `d`. Lets
    /// `peak_psl` be recomputed in O(peak drop) whenever an occupant at the
    /// current peak is removed or backshifted down, instead of only ever
    /// tracking a historical high-water mark (spec §8(e) requires the live
    /// maximum, not a mark that survives the entry that set it).
    psl_hist: Box<[u32]>,
    psl_limit: u8,
    psl_limit_ct: usize,
    load_factor_threshold: u8,
}

/// Smallest power of two `tsize` such that `tsize * lft / 100 >= capacity`,
/// i.e. `tsize >= ceil(capacity * 100 / lft)`.
fn buckets_for(capacity: usize, lft: u8) -> Result<usize> {
    let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
    let lft = lft as u128;
    let need = (capacity as u128 * 100 + (lft - 1)) / lft;
    let mut tsize: u128 = 1;
    while tsize < need {
        tsize <<= 1;
    }
    if tsize > MAX_BUCKETS as u128 {
        return Err(Error::TooBig);
    }
    Ok(tsize as usize)
}

fn alloc_uninit_entries<K, V>(tsize: usize) -> Box<[MaybeUninit<(K, V)>]> {
    let mut entries = Vec::with_capacity(tsize);
    entries.resize_with(tsize, MaybeUninit::uninit);
    entries.into_boxed_slice()
}

fn new_psl_hist() -> Box<[u32]> {
    vec![0u32; MAX_PSL as usize + 1].into_boxed_slice()
}

impl<K, V> RawTable<K, V> {
    pub(crate) fn with_capacity(capacity: usize, load_factor_threshold: u8, psl_limit: u8) -> Result<Self> {
        debug_assert!(psl_limit <= MAX_PSL, "psl_limit must fit the 7-bit PSL field");
        let tsize = buckets_for(capacity, load_factor_threshold)?;
        Ok(Self {
            meta: vec![Bucket::EMPTY; tsize].into_boxed_slice(),
            entries: alloc_uninit_entries(tsize),
            mask: tsize - 1,
            len: 0,
            threshold: tsize * load_factor_threshold as usize / 100,
            psl_sum: 0,
            peak_psl: 0,
            psl_hist: new_psl_hist(),
            psl_limit,
            psl_limit_ct: 0,
            load_factor_threshold,
        })
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.mask + 1
    }

    #[inline]
    pub(crate) fn psl_limit_hits(&self) -> usize {
        self.psl_limit_ct
    }

    #[inline]
    pub(crate) fn peak_psl(&self) -> u8 {
        self.peak_psl
    }

    #[inline]
    pub(crate) fn psl_sum(&self) -> u64 {
        self.psl_sum
    }

    /// Returns the index of the occupied bucket at or after `from`, scanning
    /// the bucket array linearly; used by `Iter`/`IterMut`, which bypass the
    /// probe engine entirely.
    pub(crate) fn next_occupied(&self, from: usize) -> Option<usize> {
        (from..self.capacity()).find(|&i| self.meta[i].is_occupied())
    }

    #[inline]
    pub(crate) fn get_at(&self, index: usize) -> &(K, V) {
        // SAFETY: callers only pass indices returned by `find`/`next_occupied`,
        // which only ever point at occupied slots.
        unsafe { self.entries[index].assume_init_ref() }
    }

    #[inline]
    pub(crate) fn get_at_mut(&mut self, index: usize) -> &mut (K, V) {
        unsafe { self.entries[index].assume_init_mut() }
    }

    /// Searches for `key` without mutating the table ("search" mode).
    pub(crate) fn find<Q>(&self, hash: u64, key: &Q) -> Option<usize>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let hash24 = truncate_hash(hash);
        let mut p = (hash as usize) & self.mask;
        let mut psl: u8 = 0;
        loop {
            let b = self.meta[p];
            if b.is_empty() {
                return None;
            }
            if b.fingerprint_eq(Bucket::occupied(hash24, psl)) {
                let (k, _) = self.get_at(p);
                if k.borrow() == key {
                    return Some(p);
                }
            }
            if psl > b.psl() {
                return None;
            }
            p = (p + 1) & self.mask;
            psl += 1;
        }
    }

    /// The shared Robin Hood walk behind both "insert" and "rehash" modes.
    ///
    /// `unique` asserts the key is known absent (set by the caller for
    /// rehash, and internally once a displaced occupant becomes the new
    /// candidate, since an occupant already in the table cannot equal the
    /// key being inserted). The PSL-limit guard and the load-factor growth
    /// check both apply only while `!unique`, i.e. exactly up to the point
    /// the key is conclusively proven absent — rehash skips both, since a
    /// caller doubling the table has already arranged enough headroom.
    pub(crate) fn probe_and_insert(&mut self, hash: u64, mut key: K, mut value: V, mut unique: bool) -> InsertOutcome<K, V>
    where
        K: Eq,
    {
        let mut hash24 = truncate_hash(hash);
        let mut p = (hash as usize) & self.mask;
        let mut psl: u8 = 0;

        loop {
            let b = self.meta[p];

            if b.is_empty() {
                // Step 1: the key is conclusively absent (an occupied ideal
                // slot would have surfaced a match or a miss already). This
                // is the first point at which we know we're about to admit
                // a genuinely new key, so both pre-emptive checks apply.
                if !unique && self.psl_limit_ct > 0 {
                    log::warn!("refusing insert: {} bucket(s) already pinned at psl_limit {}", self.psl_limit_ct, self.psl_limit);
                    return InsertOutcome::PslLimitReached(key, value);
                }
                if self.len == self.threshold {
                    return InsertOutcome::NeedsGrow(key, value);
                }
                self.write_new(p, hash24, psl, key, value);
                return InsertOutcome::Inserted(p);
            } else if !unique && b.fingerprint_eq(Bucket::occupied(hash24, psl)) {
                // Step 2: fingerprint match gates the (possibly expensive) key comparison.
                let (existing_key, _) = self.get_at(p);
                if existing_key == &key {
                    return InsertOutcome::Found(p, value);
                }
                // Fingerprint matched but keys differ: psl == b.psl(), so the
                // step-3 check below can never trigger here; we fall through
                // to the common advance at the loop's tail.
            } else if psl > b.psl() {
                // Step 3: candidate has probed further than this occupant is
                // displaced from its own ideal position — Robin Hood swap.
                // `!unique` is true here only on the cascade's first
                // displacement (this branch sets `unique = true` below and
                // it never reverts), which is exactly the other point at
                // which the key is conclusively proven absent — the
                // `psl > b.psl()` test is the same miss condition `find`
                // uses to stop searching.
                if !unique {
                    if self.psl_limit_ct > 0 {
                        log::warn!("refusing insert: {} bucket(s) already pinned at psl_limit {}", self.psl_limit_ct, self.psl_limit);
                        return InsertOutcome::PslLimitReached(key, value);
                    }
                    if self.len == self.threshold {
                        return InsertOutcome::NeedsGrow(key, value);
                    }
                }
                let (disp_key, disp_value) = self.overwrite(p, hash24, psl, key, value);
                hash24 = b.hash24();
                key = disp_key;
                value = disp_value;
                psl = b.psl();
                unique = true;
            }

            // Step 4: advance the probe by one slot.
            p = (p + 1) & self.mask;
            psl += 1;
            log::trace!("probe advance: p={p} psl={psl}");
        }
    }

    fn write_new(&mut self, p: usize, hash24: u32, psl: u8, key: K, value: V) {
        // The PSL-limit guard refuses any new key before this point is
        // reached (§4.2), but only when it's about to place a genuinely new
        // key — the probe walk discovering a refused key's *absence* is
        // allowed to step one slot past a bucket already pinned at the
        // limit (see `psl_limit_refusal_scenario`), so this can't be a
        // blanket `psl <= psl_limit` check at every advance.
        debug_assert!(psl <= self.psl_limit, "a newly written bucket must not exceed the PSL-limit guard's ceiling");
        self.meta[p] = Bucket::occupied(hash24, psl);
        self.entries[p] = MaybeUninit::new((key, value));
        self.len += 1;
        self.psl_sum += psl as u64;
        self.psl_hist[psl as usize] += 1;
        self.peak_psl = self.peak_psl.max(psl);
        if psl == self.psl_limit {
            self.psl_limit_ct += 1;
        }
    }

    /// Displaces the occupant currently at `p`, installing the candidate in
    /// its place, and hands the displaced (key, value) back to the caller to
    /// continue the cascade as the new candidate.
    fn overwrite(&mut self, p: usize, hash24: u32, psl: u8, key: K, value: V) -> (K, V) {
        let old_bucket = self.meta[p];
        debug_assert!(old_bucket.is_occupied());
        debug_assert!(psl <= self.psl_limit, "a displaced bucket must not exceed the PSL-limit guard's ceiling");
        self.psl_sum = self.psl_sum - old_bucket.psl() as u64 + psl as u64;
        self.psl_hist[old_bucket.psl() as usize] -= 1;
        self.psl_hist[psl as usize] += 1;
        if old_bucket.psl() == self.psl_limit {
            self.psl_limit_ct -= 1;
        }
        if psl == self.psl_limit {
            self.psl_limit_ct += 1;
        }
        // The displaced occupant's old PSL is removed from the histogram
        // here but not finalized until whichever `write_new`/`overwrite`
        // call places it next in the cascade; `peak_psl` only needs the
        // monotonic `max` during an insert (§4.2's proof: a single insertion
        // raises the peak by at most one), never a downward recompute.
        self.peak_psl = self.peak_psl.max(psl);
        self.meta[p] = Bucket::occupied(hash24, psl);
        // SAFETY: old_bucket.is_occupied() means entries[p] is initialized.
        let old = unsafe { self.entries[p].assume_init_read() };
        self.entries[p] = MaybeUninit::new((key, value));
        old
    }

    /// Remove-and-backshift. `p` must be an occupied index,
    /// typically returned by `find`.
    pub(crate) fn erase_at(&mut self, p: usize) -> (K, V) {
        let victim = self.meta[p];
        debug_assert!(victim.is_occupied());
        let victim_psl = victim.psl();
        // SAFETY: victim.is_occupied() means entries[p] is initialized.
        let kv = unsafe { self.entries[p].assume_init_read() };
        self.len -= 1;
        self.psl_hist[victim_psl as usize] -= 1;
        if victim_psl == self.psl_limit {
            self.psl_limit_ct -= 1;
        }

        let mut run_len: u64 = 0;
        let mut cur = p;
        loop {
            let next = (cur + 1) & self.mask;
            let next_bucket = self.meta[next];
            if next_bucket.is_empty() || next_bucket.psl() == 0 {
                self.meta[cur] = Bucket::EMPTY;
                break;
            }
            let new_psl = next_bucket.psl() - 1;
            self.psl_hist[next_bucket.psl() as usize] -= 1;
            self.psl_hist[new_psl as usize] += 1;
            if next_bucket.psl() == self.psl_limit {
                self.psl_limit_ct -= 1;
            }
            self.meta[cur] = next_bucket.with_psl(new_psl);
            // SAFETY: next_bucket.is_occupied() means entries[next] is initialized;
            // `cur`'s old entry was already moved out (or is about to be overwritten).
            let moved = unsafe { self.entries[next].assume_init_read() };
            self.entries[cur] = MaybeUninit::new(moved);
            run_len += 1;
            cur = next;
        }
        self.psl_sum -= victim_psl as u64 + run_len;
        // Unlike insert, deletion can lower the true maximum PSL (the
        // removed/backshifted entries may have been the only occupants at
        // `peak_psl`), so recompute it from the histogram rather than
        // leaving it as a historical high-water mark (spec §8(e)).
        self.recompute_peak();

        // Sanity-check the shifted run forms a single contiguous modular
        // range, split into at most the two wrap-around pieces `wrap_range`
        // models — i.e. the backshift never touches a bucket twice or skips
        // one inside its own run.
        #[cfg(debug_assertions)]
        {
            let (first, second) = crate::wrap::wrap_range((p + 1) & self.mask, run_len as usize, self.capacity());
            let touched = first.len() + second.map_or(0, |r| r.len());
            debug_assert_eq!(touched, run_len as usize);
        }

        kv
    }

    /// Restores `peak_psl` to the true maximum PSL across occupants after a
    /// deletion, by walking the histogram down from the previous peak until
    /// a nonempty level is found (or `0`, if the table is now empty of any
    /// PSL at or below the old peak).
    fn recompute_peak(&mut self) {
        while self.peak_psl > 0 && self.psl_hist[self.peak_psl as usize] == 0 {
            self.peak_psl -= 1;
        }
    }

    /// Doubles the table, re-populating via `probe_and_insert` in rehash
    /// mode. `hash_of` is supplied by the caller (`Table`, which owns the
    /// `BuildHasher`) for each surviving key.
    pub(crate) fn grow(&mut self, hash_of: impl Fn(&K) -> u64) -> Result<()>
    where
        K: Eq,
    {
        let old_tsize = self.capacity();
        let new_tsize = old_tsize.checked_mul(2).filter(|&n| n <= MAX_BUCKETS).ok_or(Error::TooBig)?;

        log::debug!("growing table from {old_tsize} to {new_tsize} buckets ({} entries)", self.len);

        let mut new_table = RawTable {
            meta: vec![Bucket::EMPTY; new_tsize].into_boxed_slice(),
            entries: alloc_uninit_entries(new_tsize),
            mask: new_tsize - 1,
            len: 0,
            threshold: new_tsize * self.load_factor_threshold as usize / 100,
            psl_sum: 0,
            peak_psl: 0,
            psl_hist: new_psl_hist(),
            psl_limit: self.psl_limit,
            psl_limit_ct: 0,
            load_factor_threshold: self.load_factor_threshold,
        };

        for p in 0..old_tsize {
            if self.meta[p].is_occupied() {
                // SAFETY: occupied slot, initialized entry; `meta[p]` is
                // marked empty immediately below so `self`'s own `Drop`
                // impl (run when `*self = new_table` drops the old value)
                // skips this slot instead of re-dropping an entry that now
                // also lives in `new_table`.
                let (k, v) = unsafe { self.entries[p].assume_init_read() };
                self.meta[p] = Bucket::EMPTY;
                let hash = hash_of(&k);
                match new_table.probe_and_insert(hash, k, v, true) {
                    InsertOutcome::Inserted(_) => {}
                    InsertOutcome::Found(_, _) | InsertOutcome::NeedsGrow(_, _) | InsertOutcome::PslLimitReached(_, _) => {
                        unreachable!("rehash never finds a duplicate key, runs out of room, or hits the PSL limit")
                    }
                }
            }
        }

        *self = new_table;
        Ok(())
    }

    /// Recomputes every structural invariant from spec §8 from scratch and
    /// panics with a descriptive message on the first mismatch. `hash_of`
    /// recomputes each stored key's hash the same way `Table` does, so this
    /// is independent of whatever incremental bookkeeping got the table
    /// into its current state. Not on the hot path of any normal operation;
    /// exposed for property-based tests.
    pub(crate) fn debug_assert_invariants(&self, hash_of: impl Fn(&K) -> u64) {
        let tsize = self.capacity();
        let mut occupied = 0usize;
        let mut psl_sum = 0u64;
        let mut limit_ct = 0usize;
        let mut max_psl = 0u8;
        for idx in 0..tsize {
            let b = self.meta[idx];
            if !b.is_occupied() {
                continue;
            }
            occupied += 1;
            let (k, _) = self.get_at(idx);
            let ideal = (hash_of(k) as usize) & self.mask;
            let expected_psl = ((idx + tsize - ideal) % tsize) as u8;
            assert_eq!(b.psl(), expected_psl, "bucket {idx} PSL does not match its ideal position");
            psl_sum += b.psl() as u64;
            if b.psl() == self.psl_limit {
                limit_ct += 1;
            }
            max_psl = max_psl.max(b.psl());
        }
        assert_eq!(occupied, self.len, "occupied bucket count does not match `len`");
        assert_eq!(psl_sum, self.psl_sum, "recomputed psl_sum does not match the maintained running sum");
        assert_eq!(limit_ct, self.psl_limit_ct, "recomputed psl_limit_ct does not match the maintained counter");
        assert_eq!(max_psl, self.peak_psl, "recomputed peak PSL does not match `peak_psl`");
    }

    pub(crate) fn clear(&mut self) {
        for (b, e) in self.meta.iter().copied().zip(self.entries.iter_mut()) {
            if b.is_occupied() {
                // SAFETY: occupied slot holds an initialized entry.
                unsafe { e.assume_init_drop() };
            }
        }
        self.meta.fill(Bucket::EMPTY);
        self.len = 0;
        self.psl_sum = 0;
        self.peak_psl = 0;
        self.psl_hist.fill(0);
        self.psl_limit_ct = 0;
    }
}

impl<K, V> Drop for RawTable<K, V> {
    fn drop(&mut self) {
        for (b, e) in self.meta.iter().copied().zip(self.entries.iter_mut()) {
            if b.is_occupied() {
                unsafe { e.assume_init_drop() };
            }
        }
    }
}
