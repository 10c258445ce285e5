//! Deduplication of harvested rows by identity key
//!
//! Every store declares which fields make two rows "the same" through a
//! [`KeySpec`]. A [`KeyIndex`] is seeded from the rows already on disk and
//! then consulted before any new row is accepted, so a key is accepted at
//! most once per store no matter how many runs touch it.

mod index;
mod key;

pub use index::KeyIndex;
pub use key::{IdentityKey, KeySpec, Keyed};
