// Concurrency limiter for moderation model calls.
//
// Caps how many moderation calls are in flight at once so a large batch
// doesn't swamp the inference service. Built on tokio's Semaphore: waiters
// are woken in order, a released slot always reaches a waiter, and a
// waiter that is cancelled (its future dropped) simply leaves the queue.
//
// A slot is held as a SlotPermit value. Releasing consumes the permit, so
// the same slot can't be handed back twice, and dropping a permit (for
// example when a task is cancelled mid-pipeline) returns the slot too.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::errors::ModerationError;

/// Default number of concurrent moderation calls.
pub const DEFAULT_CAPACITY: usize = 5;

/// A bounded-concurrency gate, cheap to clone and share between tasks.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One held slot. Returned to the limiter on `release()` or drop.
#[must_use = "dropping the permit immediately releases the slot"]
pub struct SlotPermit {
    _permit: OwnedSemaphorePermit,
}

impl SlotPermit {
    /// Give the slot back.
    pub fn release(self) {}
}

impl ConcurrencyLimiter {
    /// Create a limiter with `capacity` slots. A capacity of 0 is bumped to 1
    /// so acquire can never deadlock.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot.
    ///
    /// Fails only after `close()`, so callers shutting down don't hang.
    pub async fn acquire(&self) -> Result<SlotPermit, ModerationError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ModerationError::Shutdown)?;
        debug!(in_flight = self.in_flight(), "Moderation slot acquired");
        Ok(SlotPermit { _permit: permit })
    }

    /// Run a future while holding a slot.
    pub async fn run<F, T>(&self, future: F) -> Result<T, ModerationError>
    where
        F: Future<Output = T>,
    {
        let permit = self.acquire().await?;
        let output = future.await;
        permit.release();
        Ok(output)
    }

    /// Stop handing out slots. Current waiters and later callers get `Shutdown`;
    /// permits already held stay valid until released.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_and_release_restore_capacity() {
        let limiter = ConcurrencyLimiter::new(2);
        let a = limiter.acquire().await.unwrap();
        let b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available(), 0);
        assert_eq!(limiter.in_flight(), 2);

        a.release();
        drop(b);
        assert_eq!(limiter.available(), 2);
    }

    #[test]
    fn test_zero_capacity_is_bumped_to_one() {
        assert_eq!(ConcurrencyLimiter::new(0).capacity(), 1);
    }

    #[tokio::test]
    async fn test_never_exceeds_capacity() {
        let limiter = ConcurrencyLimiter::new(2);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = limiter.clone();
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                limiter
                    .run(async {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }));
        }

        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_leak_a_slot() {
        let limiter = ConcurrencyLimiter::new(1);
        let held = limiter.acquire().await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let _permit = limiter.acquire().await.unwrap();
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
        };

        // Let the waiter park on the semaphore, then cancel it
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        let _ = waiter.await;

        held.release();
        assert_eq!(limiter.available(), 1);

        // The slot is still usable
        let again = tokio::time::timeout(Duration::from_millis(100), limiter.acquire()).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_is_woken_on_release() {
        let limiter = ConcurrencyLimiter::new(1);
        let held = limiter.acquire().await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await.map(|p| p.release()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        held.release();
        let woke = tokio::time::timeout(Duration::from_millis(200), waiter).await;
        assert!(woke.is_ok(), "Waiter should be granted the released slot");
    }

    #[tokio::test]
    async fn test_close_fails_pending_acquire() {
        let limiter = ConcurrencyLimiter::new(1);
        let _held = limiter.acquire().await.unwrap();
        limiter.close();
        assert_eq!(
            limiter.acquire().await.err(),
            Some(ModerationError::Shutdown)
        );
    }
}
