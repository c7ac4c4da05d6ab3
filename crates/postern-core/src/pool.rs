//! Per-account connection pool and folder locks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{OwnedMutexGuard, Semaphore, SemaphorePermit};
use tracing::debug;

use crate::{Error, Result};

/// A connection the pool can hand out again.
pub trait Reusable: Send {
    /// Returns false once the connection has failed or timed out.
    fn is_reusable(&self) -> bool;
}

/// Bounded set of live connections to one server.
///
/// At most `size` connections exist at once, each used by one operation at
/// a time. Connections that are still healthy when their [`Lease`] ends go
/// back to an idle list; broken ones are dropped.
#[derive(Debug)]
pub struct ConnectionPool<C> {
    permits: Semaphore,
    idle: Mutex<Vec<C>>,
    size: usize,
}

impl<C: Reusable> ConnectionPool<C> {
    /// Creates a pool of at most `size` connections (at least one).
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Semaphore::new(size),
            idle: Mutex::new(Vec::with_capacity(size)),
            size,
        }
    }

    /// Maximum number of connections.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Number of idle connections.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle().len()
    }

    /// Waits for a free slot and leases an idle connection, or opens one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolClosed`] after [`Self::close`], or the error from
    /// `open`.
    pub async fn acquire<F, Fut>(&self, open: F) -> Result<Lease<'_, C>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C>>,
    {
        let permit = self.permits.acquire().await.map_err(|_| Error::PoolClosed)?;

        let reused = {
            let mut idle = self.idle();
            loop {
                match idle.pop() {
                    Some(conn) if conn.is_reusable() => break Some(conn),
                    Some(_) => debug!("Discarding stale idle connection"),
                    None => break None,
                }
            }
        };

        let connection = match reused {
            Some(conn) => conn,
            None => {
                debug!(size = self.size, "Opening pooled connection");
                open().await?
            }
        };

        Ok(Lease {
            pool: self,
            connection: Some(connection),
            _permit: permit,
        })
    }

    /// Refuses further leases and drops idle connections.
    pub fn close(&self) {
        self.permits.close();
        self.idle().clear();
    }

    fn idle(&self) -> MutexGuard<'_, Vec<C>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive use of one pooled connection.
///
/// Typestate clients consume themselves on state changes, so callers
/// [`take`](Self::take) the connection out, run their operation and
/// [`restore`](Self::restore) the result. A lease dropped empty frees the
/// slot without returning anything.
#[derive(Debug)]
pub struct Lease<'a, C: Reusable> {
    pool: &'a ConnectionPool<C>,
    connection: Option<C>,
    _permit: SemaphorePermit<'a>,
}

impl<C: Reusable> Lease<'_, C> {
    /// Moves the connection out of the lease.
    pub const fn take(&mut self) -> Option<C> {
        self.connection.take()
    }

    /// Puts a connection back into the lease.
    pub fn restore(&mut self, connection: C) {
        self.connection = Some(connection);
    }

    /// Borrows the connection.
    pub const fn connection(&mut self) -> Option<&mut C> {
        self.connection.as_mut()
    }
}

impl<C: Reusable> Drop for Lease<'_, C> {
    fn drop(&mut self) {
        match self.connection.take() {
            Some(conn) if conn.is_reusable() => self.pool.idle().push(conn),
            Some(_) => debug!("Dropping broken connection"),
            None => {}
        }
    }
}

/// One async mutex per folder, so two syncs of the same folder never overlap.
#[derive(Debug, Default)]
pub struct FolderLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FolderLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no one else holds `folder`.
    pub async fn lock(&self, folder: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(folder.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Debug)]
    struct Conn {
        id: usize,
        healthy: bool,
    }

    impl Reusable for Conn {
        fn is_reusable(&self) -> bool {
            self.healthy
        }
    }

    async fn open(counter: &AtomicUsize) -> Result<Conn> {
        let id = counter.fetch_add(1, Ordering::SeqCst);
        Ok(Conn { id, healthy: true })
    }

    #[tokio::test]
    async fn test_healthy_connection_is_reused() {
        let pool = ConnectionPool::new(2);
        let opened = AtomicUsize::new(0);

        let lease = pool.acquire(|| open(&opened)).await.unwrap();
        drop(lease);
        assert_eq!(pool.idle_count(), 1);

        let mut lease = pool.acquire(|| open(&opened)).await.unwrap();
        assert_eq!(lease.connection().unwrap().id, 0);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broken_connection_is_dropped() {
        let pool = ConnectionPool::new(1);
        let opened = AtomicUsize::new(0);

        let mut lease = pool.acquire(|| open(&opened)).await.unwrap();
        lease.connection().unwrap().healthy = false;
        drop(lease);
        assert_eq!(pool.idle_count(), 0);

        let mut lease = pool.acquire(|| open(&opened)).await.unwrap();
        assert_eq!(lease.connection().unwrap().id, 1);
    }

    #[tokio::test]
    async fn test_taken_connection_is_not_returned() {
        let pool = ConnectionPool::new(1);
        let opened = AtomicUsize::new(0);

        let mut lease = pool.acquire(|| open(&opened)).await.unwrap();
        let conn = lease.take().unwrap();
        drop(lease);
        drop(conn);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_bounds_concurrent_leases() {
        let pool = ConnectionPool::new(1);
        let opened = AtomicUsize::new(0);

        let first = pool.acquire(|| open(&opened)).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), pool.acquire(|| open(&opened))).await;
        assert!(second.is_err());

        drop(first);
        assert!(pool.acquire(|| open(&opened)).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_pool() {
        let pool: ConnectionPool<Conn> = ConnectionPool::new(1);
        let opened = AtomicUsize::new(0);
        pool.close();
        assert!(matches!(pool.acquire(|| open(&opened)).await, Err(Error::PoolClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_folder_locks_serialize_same_folder() {
        let locks = FolderLocks::new();
        let guard = locks.lock("INBOX").await;

        assert!(tokio::time::timeout(Duration::from_secs(1), locks.lock("Sent")).await.is_ok());
        assert!(tokio::time::timeout(Duration::from_secs(1), locks.lock("INBOX")).await.is_err());

        drop(guard);
        assert!(tokio::time::timeout(Duration::from_secs(1), locks.lock("INBOX")).await.is_ok());
    }
}
