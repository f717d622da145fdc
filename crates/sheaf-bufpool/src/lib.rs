//! Recycled sample memory.
//!
//! Sample queues copy every demuxed access unit into a buffer taken from a
//! [`SharedPool`]. The buffer goes back to the pool when the consumer drops
//! the sample, so steady-state playback does not allocate per sample.
//!
//! ```
//! use sheaf_bufpool::BytePool;
//!
//! let pool = BytePool::new(8, 4096);
//! let mut buf = pool.get();
//! buf.extend_from_slice(b"nal unit");
//! drop(buf);
//! assert_eq!(pool.available(), 1);
//! ```

#![forbid(unsafe_code)]

mod pool;

pub use pool::{BytePool, PooledBytes, PooledOwned, Reuse, SharedPool, byte_pool};
