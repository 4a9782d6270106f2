//! Multi-dimensional reading cache.
//!
//! Keys canonicalize the non-entity parameters of a read request, entries
//! track the fetch lifecycle per (entity, key), and the store holds one
//! independent table per chart family.

mod entry;
mod key;
mod store;

pub use entry::{CacheEntry, Populated};
pub use key::{
  BarKey, CanonicalDuration, CompareKey, LineKey, ReadingKey, ThreeDKey, TimeInterval,
};
pub use store::{FamilyCache, ReadingsStore};
