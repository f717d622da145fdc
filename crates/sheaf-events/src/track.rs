use sheaf_core::{Format, SelectionReason, TrackType};

/// Consumer-facing track changes.
#[derive(Clone, Debug)]
pub enum TrackEvent {
    /// Samples about to be read come from a segment with a different format
    /// than the last one read.
    DownstreamFormatChanged {
        track_type: TrackType,
        format: Format,
        selection_reason: SelectionReason,
        media_time_us: i64,
    },
}
