use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::{Arc, OnceLock},
};

use sheaf_platform::Mutex;

/// Types that can be cleared and handed out again.
pub trait Reuse {
    /// Clear the value and shrink it to at most `trim` capacity.
    ///
    /// Returns `false` when nothing worth keeping is left.
    fn reuse(&mut self, trim: usize) -> bool;
}

impl<T> Reuse for Vec<T> {
    fn reuse(&mut self, trim: usize) -> bool {
        self.clear();
        self.shrink_to(trim);
        self.capacity() > 0
    }
}

struct Inner<T> {
    free: Mutex<Vec<T>>,
    max_buffers: usize,
    trim_capacity: usize,
}

impl<T: Reuse> Inner<T> {
    fn put(&self, mut value: T) {
        let mut free = self.free.lock();
        if free.len() < self.max_buffers && value.reuse(self.trim_capacity) {
            free.push(value);
        }
    }
}

/// Arc-backed pool; clones share the same free list.
pub struct SharedPool<T: Reuse> {
    inner: Arc<Inner<T>>,
}

impl<T: Reuse + Default> SharedPool<T> {
    /// Create a pool keeping at most `max_buffers` idle values, each trimmed
    /// to `trim_capacity` on return.
    #[must_use]
    pub fn new(max_buffers: usize, trim_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                free: Mutex::new(Vec::new()),
                max_buffers,
                trim_capacity,
            }),
        }
    }

    /// Take a value, reusing an idle one when possible.
    #[must_use]
    pub fn get(&self) -> PooledOwned<T> {
        self.get_with(|_| {})
    }

    /// Take a value and run `init` on it before handing it out.
    pub fn get_with<F>(&self, init: F) -> PooledOwned<T>
    where
        F: FnOnce(&mut T),
    {
        let mut value = self.inner.free.lock().pop().unwrap_or_default();
        init(&mut value);
        PooledOwned {
            value: Some(value),
            pool: Arc::clone(&self.inner),
        }
    }
}

impl<T: Reuse> SharedPool<T> {
    /// Number of idle values currently held.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.free.lock().len()
    }

    /// Return a value obtained via [`PooledOwned::into_inner`].
    pub fn recycle(&self, value: T) {
        self.inner.put(value);
    }
}

impl<T: Reuse> Clone for SharedPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Reuse> fmt::Debug for SharedPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPool")
            .field("available", &self.available())
            .field("max_buffers", &self.inner.max_buffers)
            .field("trim_capacity", &self.inner.trim_capacity)
            .finish()
    }
}

/// Owned guard that returns its value to the pool on drop.
pub struct PooledOwned<T: Reuse> {
    value: Option<T>,
    pool: Arc<Inner<T>>,
}

impl<T: Reuse> PooledOwned<T> {
    /// Detach the value from the pool.
    ///
    /// # Panics
    ///
    /// Panics if the value was already taken.
    pub fn into_inner(mut self) -> T {
        self.value.take().expect("pooled value already taken")
    }
}

impl<T: Reuse> Drop for PooledOwned<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.put(value);
        }
    }
}

impl<T: Reuse> Deref for PooledOwned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("pooled value already taken")
    }
}

impl<T: Reuse> DerefMut for PooledOwned<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("pooled value already taken")
    }
}

impl<T: Reuse + fmt::Debug> fmt::Debug for PooledOwned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => fmt::Debug::fmt(v, f),
            None => f.write_str("<taken>"),
        }
    }
}

impl<T: Reuse + PartialEq> PartialEq for PooledOwned<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

/// Pool of byte buffers holding demuxed sample payloads.
pub type BytePool = SharedPool<Vec<u8>>;

/// One pooled sample payload.
pub type PooledBytes = PooledOwned<Vec<u8>>;

static GLOBAL_BYTE_POOL: OnceLock<BytePool> = OnceLock::new();

/// Process-wide byte pool (512 idle buffers, trimmed to 256 KiB).
pub fn byte_pool() -> &'static BytePool {
    GLOBAL_BYTE_POOL.get_or_init(|| BytePool::new(512, 256 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_buffer_returns_to_pool() {
        let pool = BytePool::new(4, 1024);
        {
            let mut buf = pool.get();
            buf.extend_from_slice(&[1, 2, 3]);
        }
        assert_eq!(pool.available(), 1);

        let buf = pool.get();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 3);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn pool_never_holds_more_than_max() {
        let pool = BytePool::new(2, 1024);
        let bufs: Vec<_> = (0..5).map(|_| pool.get_with(|b| b.push(0))).collect();
        drop(bufs);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn empty_buffers_are_not_kept() {
        let pool = BytePool::new(4, 1024);
        drop(pool.get());
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn oversized_buffers_are_trimmed() {
        let pool = BytePool::new(4, 16);
        drop(pool.get_with(|b| b.resize(4096, 7)));
        let buf = pool.get();
        assert!(buf.capacity() < 4096);
    }

    #[test]
    fn into_inner_detaches_and_recycle_reattaches() {
        let pool = BytePool::new(4, 1024);
        let raw = pool.get_with(|b| b.extend_from_slice(b"abc")).into_inner();
        assert_eq!(raw, b"abc");
        assert_eq!(pool.available(), 0);

        pool.recycle(raw);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn clones_share_free_list() {
        let pool = BytePool::new(4, 1024);
        let clone = pool.clone();
        drop(clone.get_with(|b| b.push(1)));
        assert_eq!(pool.available(), 1);
    }
}
