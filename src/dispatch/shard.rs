//! FIFO ticket locks, one per shard.
//!
//! A ticket is drawn when a job is submitted and the lock serves tickets in
//! strictly increasing order, so jobs on one shard run in submission order
//! no matter which worker dequeues them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

const FNV_OFFSET: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// 32-bit FNV-1a over the concatenation of `parts`.
pub fn fnv1a(parts: &[&str]) -> u32 {
    let mut hash = FNV_OFFSET;
    for part in parts {
        for byte in part.bytes() {
            hash ^= u32::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

#[derive(Default)]
pub struct TicketLock {
    // Held while drawing a ticket and enqueueing its job
    submit: Mutex<()>,
    next: AtomicU64,
    serving: AtomicU64,
    turn: Notify,
}

impl TicketLock {
    /// Serialize submissions to this shard. While the guard is held, draw a
    /// ticket with [`TicketLock::draw`] and enqueue the job.
    pub fn submission(&self) -> MutexGuard<'_, ()> {
        match self.submit.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn draw(&self, _submission: &MutexGuard<'_, ()>) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Wait until `ticket` is being served.
    pub async fn acquire(&self, ticket: u64) -> TicketGuard<'_> {
        loop {
            let notified = self.turn.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the check and
            // the await is not missed
            notified.as_mut().enable();
            if self.serving.load(Ordering::Acquire) == ticket {
                return TicketGuard { lock: self };
            }
            notified.await;
        }
    }

    pub fn serving(&self) -> u64 {
        self.serving.load(Ordering::Acquire)
    }
}

/// Releases the shard to the next ticket on drop, including during unwinding.
pub struct TicketGuard<'a> {
    lock: &'a TicketLock,
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        self.lock.serving.fetch_add(1, Ordering::Release);
        self.lock.turn.notify_waiters();
    }
}

pub struct ShardSet {
    shards: Box<[TicketLock]>,
    mask: usize,
}

impl ShardSet {
    /// `count` must be a non-zero power of two.
    pub fn new(count: usize) -> Self {
        debug_assert!(count.is_power_of_two());
        let shards = (0..count).map(|_| TicketLock::default()).collect();
        Self {
            shards,
            mask: count - 1,
        }
    }

    pub fn index(&self, kind: &str, project: &str) -> usize {
        fnv1a(&[kind, project]) as usize & self.mask
    }

    pub fn get(&self, index: usize) -> &TicketLock {
        &self.shards[index & self.mask]
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_fnv1a_known_values() {
        assert_eq!(fnv1a(&[""]), 0x811c_9dc5);
        assert_eq!(fnv1a(&["a"]), 0xe40c_292c);
        assert_eq!(fnv1a(&["foobar"]), 0xbf9c_f968);
        assert_eq!(fnv1a(&["foo", "bar"]), fnv1a(&["foobar"]));
    }

    #[test]
    fn test_index_is_stable_and_masked() {
        let set = ShardSet::new(256);
        let i = set.index("hard", "svc-a");
        assert_eq!(i, set.index("hard", "svc-a"));
        assert!(i < 256);
        assert_eq!(ShardSet::new(1).index("nginx", "anything"), 0);
    }

    #[tokio::test]
    async fn test_tickets_are_served_in_order() {
        let lock = Arc::new(TicketLock::default());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let tickets: Vec<u64> = {
            let g = lock.submission();
            (0..5).map(|_| lock.draw(&g)).collect()
        };

        // Start waiters in reverse so arrival order differs from ticket order
        let mut handles = Vec::new();
        for ticket in tickets.into_iter().rev() {
            let lock = lock.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _g = lock.acquire(ticket).await;
                order.lock().unwrap().push(ticket);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(lock.serving(), 5);
    }
}
