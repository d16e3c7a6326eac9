//! Durable state primitives: the KV store, the Redlock lease lock, and the
//! journal/snapshot writers the order store persists through.

pub mod kv;
pub mod redlock;
pub mod snapshot;

pub use kv::MemoryKv;
pub use redlock::Redlock;
pub use snapshot::{replay_journal, write_full_snapshot, JournalWriter};
