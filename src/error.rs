use thiserror::Error;

/// Recoverable failures surfaced by [`crate::table::Table`] and its
/// iterators.
///
/// Contract violations (an out-of-range `psl_limit`/load-factor passed to
/// [`crate::builder::TableBuilder`], mutating through a stale iterator,
/// opening a conflicting iterator while one is outstanding) are not part of
/// this enum — those panic, since a Rust caller cannot continue past a
/// broken invariant the way the C original's installable abort hook let it
/// print-and-terminate at its own pace.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Backing allocation failed while growing the table. Kept for parity
    /// with the source's error taxonomy; `Box`/`Vec` abort the process on
    /// allocation failure rather than returning a `Result`, so this variant
    /// is unreachable through the safe `std` allocator and exists for
    /// callers who swap in a fallible-allocation path of their own.
    #[error("allocation failed while growing the table")]
    Alloc,
    /// Growth would need more than 2^24 buckets.
    #[error("table cannot grow past 2^24 buckets")]
    TooBig,
    /// The PSL-limit guard has at least one occupant pinned at `psl_limit`;
    /// no further distinct keys can be inserted until one is removed.
    #[error("too many hash collisions at the configured PSL limit")]
    TooManyCollisions,
    /// A read-only iterator was requested while a read/write iterator (or
    /// the maximum reader count) made it unavailable.
    #[error("table is exclusively locked by another iterator")]
    IterLocked,
    /// 32767 read-only iterators are already outstanding.
    #[error("maximum number of concurrent iterators reached")]
    IterLimit,
}

pub type Result<T> = std::result::Result<T, Error>;
