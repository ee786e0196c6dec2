//! Builder for [`crate::table::Table`], collecting every pre-allocation
//! setting (capacity, load-factor threshold, PSL limit, hasher) behind one
//! builder instead of a growing parameter list.
//!
//! Setters are only reachable before `build()` consumes `self` by value —
//! "setter after initialization" is a state the type system cannot express,
//! which is the idiomatic Rust stand-in for the C API's runtime check that
//! rejected setter calls on an already-initialized table.

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;

use crate::bucket::MAX_PSL;
use crate::error::Result;
use crate::table::Table;

const DEFAULT_LOAD_FACTOR_THRESHOLD: u8 = 85;

pub struct TableBuilder<S = RandomState> {
    capacity: usize,
    load_factor_threshold: u8,
    psl_limit: u8,
    hash_builder: S,
}

impl Default for TableBuilder<RandomState> {
    fn default() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl TableBuilder<RandomState> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> TableBuilder<S> {
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            capacity: 0,
            load_factor_threshold: DEFAULT_LOAD_FACTOR_THRESHOLD,
            psl_limit: MAX_PSL,
            hash_builder,
        }
    }

    /// Minimum number of entries the table should hold before it must grow.
    /// `0` (the default) selects a small built-in starting capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Percent occupancy, in `1..=100`, above which growth is triggered.
    /// Panics outside that range: an invalid threshold is a programming
    /// error, not a runtime condition to recover from.
    pub fn load_factor_threshold(mut self, percent: u8) -> Self {
        assert!(
            (1..=100).contains(&percent),
            "load_factor_threshold must be in 1..=100, got {percent}"
        );
        self.load_factor_threshold = percent;
        self
    }

    /// Maximum probe sequence length a bucket may reach, in `1..=127` (the
    /// 7-bit metadata field's full range). Once any bucket sits at this
    /// limit, further distinct-key insertions are refused with
    /// [`crate::error::Error::TooManyCollisions`] rather than growing
    /// without bound.
    pub fn psl_limit(mut self, limit: u8) -> Self {
        assert!(
            (1..=MAX_PSL).contains(&limit),
            "psl_limit must be in 1..={MAX_PSL}, got {limit}"
        );
        self.psl_limit = limit;
        self
    }

    pub fn build<K, V>(self) -> Result<Table<K, V, S>>
    where
        S: BuildHasher,
    {
        Table::from_parts(self.capacity, self.load_factor_threshold, self.psl_limit, self.hash_builder)
    }
}
