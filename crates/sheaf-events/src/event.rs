use crate::{LoadEvent, TrackEvent};

/// Everything a bundle publishes.
#[derive(Clone, Debug)]
pub enum Event {
    Load(LoadEvent),
    Track(TrackEvent),
}

impl From<LoadEvent> for Event {
    fn from(e: LoadEvent) -> Self {
        Self::Load(e)
    }
}

impl From<TrackEvent> for Event {
    fn from(e: TrackEvent) -> Self {
        Self::Track(e)
    }
}
