//! Node-local state: the shard table and the per-key write locks.

pub mod local;
pub mod locks;

pub use local::{LocalEntry, LocalShardStore};
pub use locks::{KeyLockTable, LOCK_SLOTS};
