#![forbid(unsafe_code)]

//! Buffering core for one HLS track bundle.
//!
//! A [`TrackBundle`] pulls units from a [`SegmentSource`], runs them one at
//! a time on a [`Loader`](sheaf_loader::Loader), and lets the demuxing
//! payload write samples into per-stream [`SampleQueue`]s through
//! [`TrackOutputs`]. Once every stream the demuxer declared has a format the
//! bundle derives its [`TrackGroupArray`](sheaf_core::TrackGroupArray) and
//! becomes prepared. Consumers then select groups and read samples through
//! per-group [`SampleStream`] handles.
//!
//! The driver owns the pace: it calls [`TrackBundle::continue_loading`]
//! between reads and pumps loader outcomes with
//! [`TrackBundle::handle_loader_events`].

mod bundle;
mod callback;
mod config;
mod error;
mod outputs;
mod sample_queue;
mod segment;
mod source;
mod stream;
mod tracks;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;


pub use bundle::{BufferedPosition, StreamToken, TrackBundle};
#[cfg(any(test, feature = "test-utils"))]
pub use callback::BundleCallbackMock;
pub use callback::{BundleCallback, NoopCallback};
pub use config::BundleConfig;
pub use error::{BundleError, BundleResult, SourceError};
pub use outputs::{SharedQueue, TrackOutputs};
pub use sample_queue::{
    DefaultSampleQueue, MediaSample, QueueFactory, ReadResult, SampleFlags, SampleQueue,
};
pub use segment::{AuxUnit, LoadContext, LoadState, MediaSegment, SegmentMeta, Unit, UnitPayload};
pub use source::{NextUnit, SegmentSource};
pub use stream::{SampleStream, SharedTrackBundle};
pub use tracks::{DerivedTracks, EnabledGroups, PrimaryType, derive_track_groups};
