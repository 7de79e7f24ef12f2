//! Bounded buffer pool.
//!
//! A fixed number of equally sized buffers shared by every connection of a
//! listener. The receive pool is leased once per connection at accept time;
//! the send pool is leased per outgoing item.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              BufferPool                 │
//! │  Semaphore (capacity permits)           │
//! │  ┌─────────────────────────────────┐    │
//! │  │ free: [buf] [buf] [buf] ...     │    │
//! │  └─────────────────────────────────┘    │
//! └───────────┬─────────────────▲───────────┘
//!             │ lease           │ Drop
//!             ▼                 │
//!        PooledBuffer ──────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::error::{Error, Result};

// ============================================================================
// BufferPool
// ============================================================================

/// Fixed-capacity pool of byte buffers.
///
/// Cloning yields another handle to the same pool.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    /// Buffers returned by finished leases.
    free: Mutex<Vec<Box<[u8]>>>,
    /// One permit per buffer.
    permits: Arc<Semaphore>,
    capacity: usize,
    buffer_size: usize,
}

impl BufferPool {
    /// Creates a pool of `capacity` buffers of `buffer_size` bytes each.
    ///
    /// Buffers are allocated on first lease and reused afterwards.
    #[must_use]
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::with_capacity(capacity)),
                permits: Arc::new(Semaphore::new(capacity)),
                capacity,
                buffer_size,
            }),
        }
    }

    /// Leases a buffer without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if every buffer is leased.
    pub fn try_acquire(&self) -> Result<PooledBuffer> {
        let permit = Arc::clone(&self.inner.permits)
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::NoPermits => Error::pool_exhausted(self.inner.capacity),
                TryAcquireError::Closed => Error::ConnectionClosed,
            })?;
        Ok(self.lease(permit))
    }

    /// Leases a buffer, waiting until one is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the pool was closed.
    pub async fn acquire(&self) -> Result<PooledBuffer> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(self.lease(permit))
    }

    /// Total number of buffers.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Size of each buffer in bytes.
    #[inline]
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Number of buffers not currently leased.
    #[inline]
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    fn lease(&self, permit: OwnedSemaphorePermit) -> PooledBuffer {
        let buffer = self
            .inner
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.inner.buffer_size].into_boxed_slice());

        PooledBuffer {
            buffer: Some(buffer),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        }
    }
}

// ============================================================================
// PooledBuffer
// ============================================================================

/// A leased buffer, returned to its pool on drop.
///
/// The buffer goes back to the free list before the permit is released, so
/// the next lease reuses it.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Option<Box<[u8]>>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buffer.as_deref().unwrap_or_default()
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buffer.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.free.lock().push(buffer);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::time::timeout;

    #[test]
    fn test_lease_has_configured_size() {
        let pool = BufferPool::new(2, 64);
        let buffer = pool.try_acquire().expect("free buffer");
        assert_eq!(buffer.len(), 64);
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.buffer_size(), 64);
    }

    #[test]
    fn test_try_acquire_exhaustion() {
        let pool = BufferPool::new(2, 8);
        let first = pool.try_acquire().expect("first");
        let _second = pool.try_acquire().expect("second");
        assert_eq!(pool.available(), 0);

        let err = pool.try_acquire().unwrap_err();
        assert!(matches!(err, Error::PoolExhausted { capacity: 2 }));

        drop(first);
        assert_eq!(pool.available(), 1);
        assert!(pool.try_acquire().is_ok());
    }

    #[test]
    fn test_buffers_are_reused() {
        let pool = BufferPool::new(1, 4);
        {
            let mut buffer = pool.try_acquire().expect("lease");
            buffer.copy_from_slice(b"abcd");
        }
        let buffer = pool.try_acquire().expect("lease");
        assert_eq!(&buffer[..], b"abcd");
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let pool = BufferPool::new(1, 8);
        let held = pool.try_acquire().expect("lease");

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|b| b.len()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        let len = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter finished")
            .expect("task joined")
            .expect("lease");
        assert_eq!(len, 8);
    }
}
