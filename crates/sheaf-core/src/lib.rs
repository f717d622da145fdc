//! Core value types for the sheaf HLS buffering stack.
//!
//! - [`Format`]: immutable description of one elementary or container stream.
//! - [`TrackGroup`] / [`TrackGroupArray`]: what a consumer can select.
//! - [`TrackSelection`]: a consumer's choice inside one group.
//! - [`mime`]: MIME constants and category helpers.

#![forbid(unsafe_code)]

mod format;
pub mod mime;
mod track_group;
mod types;

pub use format::{Format, SelectionFlags};
pub use track_group::{TrackGroup, TrackGroupArray, TrackSelection};
pub use types::{SelectionReason, TrackType, UnitKind};
