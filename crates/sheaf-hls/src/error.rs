use thiserror::Error;

/// Errors a [`SegmentSource`](crate::SegmentSource) reports from
/// `maybe_throw_error`.
#[derive(Debug, Error, Clone)]
pub enum SourceError {
    #[error("Playlist error: {0}")]
    Playlist(String),

    #[error("Variant {0} unavailable")]
    VariantUnavailable(usize),

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced to the consumer by a track bundle.
#[derive(Debug, Error, Clone)]
pub enum BundleError {
    #[error("Loader error: {0}")]
    Loader(#[from] sheaf_loader::LoaderError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

pub type BundleResult<T> = Result<T, BundleError>;
