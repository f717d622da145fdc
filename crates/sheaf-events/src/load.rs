use std::time::{Duration, Instant};

use sheaf_core::{Format, SelectionReason, TrackType, UnitKind};

/// What was loaded. Timestamps are present only for media segments.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadInfo {
    pub kind: UnitKind,
    pub track_type: TrackType,
    pub format: Option<Format>,
    pub selection_reason: SelectionReason,
    pub start_us: Option<i64>,
    pub end_us: Option<i64>,
}

/// Lifecycle of one loadable unit.
#[derive(Clone, Debug)]
pub enum LoadEvent {
    Started {
        info: LoadInfo,
        started_at: Instant,
    },
    Completed {
        info: LoadInfo,
        load_duration: Duration,
        bytes_loaded: u64,
    },
    Canceled {
        info: LoadInfo,
        bytes_loaded: u64,
    },
    /// A failed attempt. `canceled` is true when the unit was abandoned
    /// instead of retried.
    Error {
        info: LoadInfo,
        error: String,
        canceled: bool,
    },
}

impl LoadEvent {
    #[must_use]
    pub fn info(&self) -> &LoadInfo {
        match self {
            Self::Started { info, .. }
            | Self::Completed { info, .. }
            | Self::Canceled { info, .. }
            | Self::Error { info, .. } => info,
        }
    }
}
