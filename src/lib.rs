//! An associative container over caller-defined keys, backed by an open
//! addressing hash table with Robin Hood linear probing.
//!
//! Bucket metadata is bit-packed into a single `u32` (24-bit truncated
//! hash, 7-bit probe sequence length, 1-bit occupancy), a pre-emptive PSL
//! budget bounds worst-case probe length instead of letting collision
//! chains grow unchecked, and growth re-populates into a doubled table
//! incrementally rather than rehashing in place. A single `Cell`-based
//! iterator lock allows either one exclusive read/write iterator or many
//! concurrent read-only iterators, with no thread-safety guarantees beyond
//! that: `Table` is single-threaded by construction.

mod builder;
mod bucket;
mod error;
mod iter;
mod raw;
mod table;
mod wrap;

pub use crate::builder::TableBuilder;
pub use crate::error::{Error, Result};
pub use crate::iter::{Iter, IterMut};
pub use crate::table::{Table, TableStats};
