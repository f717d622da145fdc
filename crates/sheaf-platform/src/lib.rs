//! Platform primitives shared by the sheaf crates.
//!
//! Lock types are re-exported from [`parking_lot`] so every crate agrees on
//! one mutex flavour. [`ThreadPool`] is where blocking segment loads run.

#![forbid(unsafe_code)]

mod pool;

pub use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use pool::ThreadPool;
