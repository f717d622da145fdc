use sheaf_core::TrackGroup;
use sheaf_loader::LoadError;

use crate::{
    error::SourceError,
    segment::{SegmentMeta, Unit},
};

/// What to load next.
pub enum NextUnit {
    Unit(Unit),
    /// No more segments; loading is finished.
    EndOfStream,
    /// Nothing can be requested yet (e.g. a live playlist needs a refresh).
    Pending,
}

/// Segment-selection policy for one bundle: playlist, variant choice and
/// per-source error policy live behind this trait.
pub trait SegmentSource: Send {
    /// The unit to load after `previous` (the newest buffered segment, if
    /// any) so that playback can continue from `position_us`.
    fn next_unit(&mut self, previous: Option<&SegmentMeta>, position_us: i64) -> NextUnit;

    /// One container format per variant.
    fn source_track_group(&self) -> TrackGroup;

    /// Restrict adaptation to these indices of [`Self::source_track_group`].
    fn select_source_tracks(&mut self, tracks: &[usize]);

    /// Forget adaptive state (estimates, the last chosen variant).
    fn reset(&mut self);

    fn on_unit_load_completed(&mut self, unit: &Unit);

    /// Decide whether to abandon a failed unit. `cancelable` is false when
    /// abandoning would lose media already written to the queues.
    fn on_unit_load_error(&mut self, unit: &Unit, cancelable: bool, error: &LoadError) -> bool;

    /// # Errors
    ///
    /// Returns a pending source failure (e.g. an unreachable playlist).
    fn maybe_throw_error(&self) -> Result<(), SourceError>;

    /// `None` for live or unknown durations.
    fn duration_us(&self) -> Option<i64>;

    fn is_live(&self) -> bool;

    /// Drop resources. Called once by the owning bundle.
    fn release(&mut self) {}
}
