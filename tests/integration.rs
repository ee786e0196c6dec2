//! End-to-end scenarios against the public `Table` API, mirroring concrete scenarios that exercise literal
//! insertion orders (integer keys, a hash function supplied by the test).

use robin_table::{Error, Table, TableBuilder};
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{BuildHasher, Hash, Hasher};
use std::rc::Rc;

/// A `BuildHasher` whose output is entirely determined by the closure it
/// wraps, so tests can force specific collision patterns
/// ("a hash fn that forces three distinct keys into the same ideal bucket").
#[derive(Clone)]
struct FnHasher<F>(F);

struct FnHasherImpl<F>(u64, F);

impl<F: Fn(u64) -> u64> Hasher for FnHasherImpl<F> {
    fn finish(&self) -> u64 {
        (self.1)(self.0)
    }
    fn write(&mut self, bytes: &[u8]) {
        // Keys in these tests are always a single u64/u32 written as bytes.
        let mut buf = [0u8; 8];
        buf[..bytes.len().min(8)].copy_from_slice(&bytes[..bytes.len().min(8)]);
        self.0 = u64::from_ne_bytes(buf);
    }
}

impl<F: Fn(u64) -> u64 + Clone> BuildHasher for FnHasher<F> {
    type Hasher = FnHasherImpl<F>;
    fn build_hasher(&self) -> Self::Hasher {
        FnHasherImpl(0, self.0.clone())
    }
}

fn fn_hasher<F: Fn(u64) -> u64 + Clone>(f: F) -> FnHasher<F> {
    FnHasher(f)
}

/// Lets `RUST_LOG=robin_table=trace cargo test -- --nocapture` surface the
/// crate's `trace!`/`debug!`/`warn!` calls while exercising growth and the
/// PSL-limit guard below; a no-op if a logger is already installed.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Integer-set scenario.
#[test]
fn integer_set_scenario() {
    let mut t: Table<u32, (), _> = Table::with_hasher(fn_hasher(|k: u64| (k as u32).wrapping_mul(0x9E3779B1) as u64));
    t.try_insert(1, ()).unwrap();
    t.try_insert(2, ()).unwrap();
    t.try_insert(3, ()).unwrap();
    assert_eq!(t.len(), 3);
    assert!(t.get(&1).is_some());
    assert!(t.get(&2).is_some());
    assert!(t.get(&3).is_some());

    assert!(t.remove(&2).is_some());
    assert_eq!(t.len(), 2);
    assert!(t.get(&2).is_none());
    assert!(t.get(&1).is_some());
    assert!(t.get(&3).is_some());
}

/// Resize scenario. Default `lft = 85`,
/// `capacity = 0` sizes `tsize = 8`, `thold = 6`; the 7th insert must grow
/// the table to 16 buckets without disturbing the first six.
#[test]
fn resize_scenario() {
    init_logging();
    let mut t: Table<u32, (), _> = Table::with_hasher(fn_hasher(|k: u64| (k as u32).wrapping_mul(0x9E3779B1) as u64));
    assert_eq!(t.capacity(), 8);
    for k in 1..=6u32 {
        t.try_insert(k, ()).unwrap();
    }
    assert_eq!(t.capacity(), 8);
    for k in 1..=6u32 {
        assert!(t.get(&k).is_some());
    }
    t.try_insert(7, ()).unwrap();
    assert_eq!(t.capacity(), 16);
    assert_eq!(t.len(), 7);
    for k in 1..=7u32 {
        assert!(t.get(&k).is_some());
    }
    assert!(t.stats().peak_psl <= 2);
}

/// Robin Hood ordering scenario. A hash fn that
/// forces keys 1, 2, 3 to the same ideal bucket (0), and a fourth key (4)
/// whose own ideal bucket (3) is the slot immediately after where key 3 ends
/// up once its own cascade settles: after inserting all four in order, the
/// PSL sequence read along the probe path (buckets 0..3) must be 0, 1, 2, 0
/// -- key 4 displaces no one and starts its own group.
#[test]
fn robin_hood_ordering_scenario() {
    // tsize defaults to 8 at capacity=0 (threshold 6), plenty of headroom
    // for this four-key scenario.
    let mut t: Table<u32, u32, _> = Table::with_hasher(fn_hasher(|k: u64| match k {
        1 | 2 | 3 => 0,
        4 => 3,
        other => other,
    }));
    t.try_insert(1, 100).unwrap();
    t.try_insert(2, 200).unwrap();
    t.try_insert(3, 300).unwrap();
    t.try_insert(4, 400).unwrap();

    assert_eq!(t.get(&1), Some(&100));
    assert_eq!(t.get(&2), Some(&200));
    assert_eq!(t.get(&3), Some(&300));
    assert_eq!(t.get(&4), Some(&400));

    // Keys 1, 2, 3 occupy buckets 0, 1, 2 with PSLs 0, 1, 2 (each pushed one
    // slot further by the equal-PSL tie-break that always skips forward
    // rather than swapping); key 4 lands directly in its own empty ideal
    // bucket (3) at PSL 0, displacing nothing. Sum = 0+1+2+0 = 3, peak = 2.
    let stats = t.stats();
    assert_eq!(stats.psl_sum, 3);
    assert_eq!(stats.peak_psl, 2);
    assert_eq!(stats.psl_limit_hits, 0);

    let mut seen = std::collections::HashSet::new();
    for (k, _) in t.iter().unwrap() {
        assert!(seen.insert(*k));
    }
    assert_eq!(seen.len(), 4);
}

/// PSL-limit refusal scenario. Five distinct keys share a
/// fingerprint and bucket; the fifth insert is refused once `psl_limit = 3`
/// is saturated, while the first four remain retrievable.
#[test]
fn psl_limit_refusal_scenario() {
    init_logging();
    let mut t: Table<u32, u32, _> = TableBuilder::with_hasher(fn_hasher(|_k: u64| 0u64)).psl_limit(3).build().unwrap();

    for k in 1..=4u32 {
        assert_eq!(t.try_insert(k, k * 10), Ok(true));
    }
    assert_eq!(t.stats().psl_limit_hits, 1);

    assert_eq!(t.try_insert(5, 50), Err(Error::TooManyCollisions));

    for k in 1..=4u32 {
        assert_eq!(t.get(&k), Some(&(k * 10)));
    }
    assert_eq!(t.get(&5), None);
}

/// Iterator delete scenario. Populate three keys,
/// delete the entry a read/write iterator is parked on, and confirm
/// backshifted successors are revisited rather than skipped.
#[test]
fn iterator_delete_scenario() {
    let drops = Rc::new(RefCell::new(0u32));

    struct Counted(Rc<RefCell<u32>>);
    impl Drop for Counted {
        fn drop(&mut self) {
            *self.0.borrow_mut() += 1;
        }
    }

    let mut t: Table<u32, Counted> = Table::new();
    for k in 1..=3u32 {
        t.try_insert(k, Counted(Rc::clone(&drops))).unwrap();
    }

    {
        let mut it = t.iter_mut().unwrap();
        assert!(it.next().is_some());
        it.delete_current();
        assert!(it.next().is_some());
        assert!(it.next().is_some());
        assert!(it.next().is_none());
    }

    assert_eq!(t.len(), 2);
    assert_eq!(*drops.borrow(), 1);
}

/// Iterator lock scenario: mutating while iterators are outstanding is a
/// panic (a contract violation, see DESIGN.md), while opening a conflicting
/// iterator while one is outstanding is a recoverable `Error::IterLocked`.
#[test]
#[should_panic(expected = "outstanding")]
fn iterator_lock_scenario_ro_ro_then_add_panics() {
    let mut t: Table<u32, u32> = Table::new();
    t.try_insert(1, 1).unwrap();
    let ro1 = t.iter().unwrap();
    let ro2 = t.iter().unwrap();
    // `Iter` releases its share of the lock on `Drop`; holding `ro1`/`ro2`
    // alive across the `&mut t` call below would otherwise be rejected by
    // the borrow checker at compile time (the same way a live `MutexGuard`
    // binding blocks a later `&mut` use of the guarded data through normal
    // aliasing rules, not through `Mutex`'s own runtime state). Forgetting
    // both -- the same trick as leaking a lock guard -- is the one safe-code
    // path that reaches the runtime contract check at all.
    std::mem::forget(ro1);
    std::mem::forget(ro2);
    t.clear();
}

#[test]
fn iterator_lock_scenario_rw_blocks_ro() {
    let mut t: Table<u32, u32> = Table::new();
    t.try_insert(1, 1).unwrap();
    let rw = t.iter_mut().unwrap();
    // Same reasoning as above: `rw`'s exclusive borrow of `t` would make the
    // `t.iter()` call below a compile error while `rw` is live in the normal
    // way, so leak it to exercise the runtime `IterLocked` path instead.
    std::mem::forget(rw);
    assert_eq!(t.iter().err(), Some(Error::IterLocked));
}

/// Growth monotonicity property: capacity never decreases
/// after growth, and every previously present key survives it.
#[test]
fn growth_monotonicity() {
    let mut t: Table<u32, u32> = Table::with_capacity(4).unwrap();
    let mut last_capacity = t.capacity();
    for k in 0..500u32 {
        t.try_insert(k, k).unwrap();
        assert!(t.capacity() >= last_capacity);
        last_capacity = t.capacity();
    }
    for k in 0..500u32 {
        assert_eq!(t.get(&k), Some(&k));
    }
}

/// Idempotence property: `try_insert` twice with the same key
/// behaves like a single call and reports "already present" the second
/// time.
#[test]
fn try_insert_is_idempotent() {
    let mut t: Table<&str, i32> = Table::new();
    assert_eq!(t.try_insert("k", 1), Ok(true));
    assert_eq!(t.try_insert("k", 2), Ok(false));
    assert_eq!(t.get("k"), Some(&1));
}

/// Boundary: `capacity == 2^24` initializes; `2^24 + 1` is too-big. Pinned
/// to `load_factor_threshold = 100` so `tsize` equals `capacity` exactly
/// (otherwise the default 85% headroom alone would push `tsize` past the
/// 2^24 bucket cap before `capacity` itself reaches it).
#[test]
fn capacity_boundary() {
    let ok: Table<u8, (), _> = TableBuilder::new().load_factor_threshold(100).capacity(1 << 24).build().unwrap();
    assert_eq!(ok.capacity(), 1 << 24);

    let err = TableBuilder::new().load_factor_threshold(100).capacity((1 << 24) + 1).build::<u8, ()>();
    assert_eq!(err.err(), Some(Error::TooBig));
}

#[test]
fn round_trip_insert_get_pop() {
    let mut t: Table<String, Vec<u8>> = Table::new();
    let value = vec![1, 2, 3, 4];
    t.try_insert("key".to_string(), value.clone()).unwrap();
    assert_eq!(t.get("key"), Some(&value));
    assert_eq!(t.remove("key"), Some(value));
    assert_eq!(t.get("key"), None);
}

#[test]
fn deletion_never_raises_peak_psl() {
    let mut t: Table<u32, u32, _> = Table::with_hasher(fn_hasher(|k: u64| k % 4));
    for k in 0..40u32 {
        t.try_insert(k, k).unwrap();
    }
    let peak_before = t.stats().peak_psl;
    for k in (0..40u32).step_by(2) {
        t.remove(&k);
    }
    assert!(t.stats().peak_psl <= peak_before);
}

/// Sanity check the custom test-only hasher actually drives keys to the
/// buckets the scenarios expect, independent of `Table`.
#[test]
fn fn_hasher_sanity() {
    let hb = fn_hasher(|k: u64| k * 2);
    let mut h = hb.build_hasher();
    7u64.hash(&mut h);
    assert_eq!(h.finish(), 14);
    let mut default_hasher_sanity = DefaultHasher::new();
    7u64.hash(&mut default_hasher_sanity);
    let _ = default_hasher_sanity.finish(); // just exercising the import
}
