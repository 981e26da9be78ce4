//! Sharded dispatch.
//!
//! Admitted batches become projection tasks on a fixed worker pool. Each task
//! is tied to a shard picked by hashing `kind + project`; shards are FIFO
//! ticket locks, so batches for the same pair apply in the order they
//! arrived while unrelated pairs proceed in parallel.

pub mod pool;
pub mod shard;

pub use pool::{DispatchSettings, Dispatcher, Submission};
pub use shard::{fnv1a, ShardSet, TicketLock};
