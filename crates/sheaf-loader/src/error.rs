use std::{io, sync::Arc};

use thiserror::Error;

/// Why a single load attempt failed.
#[derive(Debug, Error, Clone)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("malformed media data: {0}")]
    Malformed(String),

    #[error("load canceled")]
    Canceled,
}

impl From<io::Error> for LoadError {
    fn from(e: io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

/// Terminal loader failure.
#[derive(Debug, Error, Clone)]
pub enum LoaderError {
    #[error("load failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: LoadError,
    },
}

pub type LoaderResult<T> = Result<T, LoaderError>;
