#![forbid(unsafe_code)]

//! Fire-and-forget telemetry for track bundles.
//!
//! Bundles publish [`LoadEvent`]s and [`TrackEvent`]s on an [`EventBus`].
//! Nothing in the buffering logic depends on anyone listening.

mod bus;
mod event;
mod load;
mod track;

pub use bus::EventBus;
pub use event::Event;
pub use load::{LoadEvent, LoadInfo};
pub use track::TrackEvent;
