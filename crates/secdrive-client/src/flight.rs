//! Per-key in-flight locks
//!
//! A caller materializing a key holds the lock for that key's flight id.
//! Concurrent callers for the same id wait on the lock, then re-check the
//! cache and find the first caller's result instead of repeating the KMS
//! round trip. Entries are dropped from the table once nobody holds or
//! waits on them.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Table of async locks keyed by flight id
#[derive(Default)]
pub(crate) struct FlightLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FlightLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `flight`
    pub(crate) async fn acquire(&self, flight: &str) -> FlightGuard<'_> {
        let lock = self
            .locks
            .entry(flight.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = lock.lock_owned().await;
        FlightGuard {
            table: self,
            flight: flight.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of flights with a live lock entry
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Held while a flight is in progress
pub(crate) struct FlightGuard<'a> {
    table: &'a FlightLocks,
    flight: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        // Release first so the table holds the only reference when idle
        self.guard.take();
        self.table
            .locks
            .remove_if(&self.flight, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Flight id for materializing a user's active encryption key
pub(crate) fn encrypt_flight(user_id: &str) -> String {
    format!("encrypt:{}", user_id)
}

/// Flight id for unwrapping one wrapped key for one user
pub(crate) fn decrypt_flight(user_id: &str, storage_key: &str) -> String {
    format!("decrypt:{}:{}", user_id, storage_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_table_empties_after_release() {
        let locks = FlightLocks::new();
        {
            let _guard = locks.acquire("encrypt:u1").await;
            assert_eq!(locks.len(), 1);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_same_flight_is_exclusive() {
        let locks = Arc::new(FlightLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("encrypt:u1").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_different_flights_do_not_block() {
        let locks = FlightLocks::new();
        let _a = locks.acquire("encrypt:u1").await;
        let acquired = tokio::time::timeout(Duration::from_secs(1), locks.acquire("encrypt:u2")).await;
        assert!(acquired.is_ok());
    }
}
