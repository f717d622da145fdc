//! Shared thread pool for blocking segment work (transfer and demux).
//!
//! Wraps [`rayon::ThreadPool`]. By default the global rayon pool is used;
//! bundles that should not compete with other rayon users can be given a
//! dedicated pool through [`ThreadPool::with_num_threads`].

use std::{fmt, sync::Arc};

/// Cheaply clonable handle to a rayon pool.
///
/// When `inner` is `None` work goes to the global rayon pool.
///
/// ```
/// use sheaf_platform::ThreadPool;
///
/// let pool = ThreadPool::with_num_threads(2).unwrap();
/// pool.spawn(|| { /* load a segment */ });
/// ```
#[derive(Clone)]
pub struct ThreadPool {
    inner: Option<Arc<rayon::ThreadPool>>,
}

impl ThreadPool {
    /// Use the global rayon thread pool. This is the default.
    #[must_use]
    pub fn global() -> Self {
        Self { inner: None }
    }

    /// Wrap an existing [`rayon::ThreadPool`].
    #[must_use]
    pub fn custom(pool: rayon::ThreadPool) -> Self {
        Self {
            inner: Some(Arc::new(pool)),
        }
    }

    /// Create a dedicated pool with `n` threads.
    ///
    /// # Errors
    ///
    /// Returns an error if the rayon pool cannot be created.
    pub fn with_num_threads(n: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("sheaf-load-{i}"))
            .build()?;
        Ok(Self::custom(pool))
    }

    /// Run `f` on a pool thread (fire-and-forget).
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self.inner {
            Some(ref pool) => pool.spawn(f),
            None => rayon::spawn(f),
        }
    }

    /// Number of worker threads backing this handle.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        match self.inner {
            Some(ref pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.inner.is_some() { "custom" } else { "global" };
        f.debug_struct("ThreadPool")
            .field("kind", &kind)
            .field("num_threads", &self.num_threads())
            .finish()
    }
}
