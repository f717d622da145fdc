#![forbid(unsafe_code)]

//! Single-slot background loader.
//!
//! A [`Loader`] runs at most one [`Loadable`] at a time on a
//! [`ThreadPool`](sheaf_platform::ThreadPool). Outcomes come back over a
//! channel and are handed to the owner by [`Loader::poll`] or
//! [`Loader::wait`], so every state change happens on the owner's thread.
//!
//! Failed attempts are either dropped by the owner or handed back through
//! [`Loader::retry`], which re-runs them after a [`RetryPolicy`] delay until
//! the minimum retry count given to [`Loader::start_load`] is used up. From
//! then on the loader is fatal and [`Loader::maybe_throw_error`] reports it.

mod error;
mod loader;
mod retry;

pub use error::{LoadError, LoaderError, LoaderResult};
pub use loader::{Loadable, Loader, LoaderEvent};
pub use retry::RetryPolicy;
pub use tokio_util::sync::CancellationToken;
