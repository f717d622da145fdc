use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use sheaf_core::{Format, SelectionReason, UnitKind};
use sheaf_loader::{CancellationToken, LoadError, Loadable};

use crate::outputs::TrackOutputs;

/// Load state of a media segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Loaded,
    Canceled,
}

impl LoadState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Loaded,
            2 => Self::Canceled,
            _ => Self::Pending,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Loaded => 1,
            Self::Canceled => 2,
        }
    }
}

/// Bookkeeping for one media segment, shared between the bundle's segment
/// list and the unit that loads it.
pub struct SegmentMeta {
    pub uid: u64,
    pub start_us: i64,
    pub end_us: i64,
    /// Variant format the segment was selected under.
    pub format: Format,
    pub selection_reason: SelectionReason,
    /// Free-form context from the adaptive policy, for diagnostics.
    pub selection_data: Option<String>,
    /// Samples should continue the queued ones instead of cutting.
    pub splice_in: bool,
    state: AtomicU8,
}

impl SegmentMeta {
    #[must_use]
    pub fn new(uid: u64, start_us: i64, end_us: i64, format: Format) -> Self {
        Self {
            uid,
            start_us,
            end_us,
            format,
            selection_reason: SelectionReason::Unknown,
            selection_data: None,
            splice_in: false,
            state: AtomicU8::new(LoadState::Pending.as_u8()),
        }
    }

    #[must_use]
    pub fn with_selection(mut self, reason: SelectionReason, data: Option<String>) -> Self {
        self.selection_reason = reason;
        self.selection_data = data;
        self
    }

    #[must_use]
    pub fn with_splice_in(mut self, splice_in: bool) -> Self {
        self.splice_in = splice_in;
        self
    }

    #[must_use]
    pub fn load_state(&self) -> LoadState {
        LoadState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_load_completed(&self) -> bool {
        self.load_state() == LoadState::Loaded
    }

    pub(crate) fn set_load_state(&self, state: LoadState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    #[must_use]
    pub fn duration_us(&self) -> i64 {
        self.end_us - self.start_us
    }
}

impl fmt::Debug for SegmentMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentMeta")
            .field("uid", &self.uid)
            .field("start_us", &self.start_us)
            .field("end_us", &self.end_us)
            .field("format_id", &self.format.id)
            .field("state", &self.load_state())
            .finish_non_exhaustive()
    }
}

/// What a payload sees while loading.
pub struct LoadContext<'a> {
    pub cancel: &'a CancellationToken,
    output: Option<&'a TrackOutputs>,
}

impl<'a> LoadContext<'a> {
    #[must_use]
    pub fn new(cancel: &'a CancellationToken, output: Option<&'a TrackOutputs>) -> Self {
        Self { cancel, output }
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sample sink. Only media segments have one.
    ///
    /// # Errors
    ///
    /// Fails with [`LoadError::Malformed`] for units without a sink.
    pub fn output(&self) -> Result<&'a TrackOutputs, LoadError> {
        self.output
            .ok_or_else(|| LoadError::Malformed("unit has no sample output".into()))
    }
}

/// The transfer-and-demux work behind a unit.
///
/// Media payloads write into [`LoadContext::output`]: `track(id)` per
/// stream, `format` before samples, then `end_tracks()` once every stream
/// is declared.
pub trait UnitPayload: Send {
    fn load(&mut self, ctx: &LoadContext<'_>) -> Result<(), LoadError>;

    /// Bytes consumed so far, including earlier failed attempts' progress.
    fn bytes_loaded(&self) -> u64;
}

/// A media segment ready to be handed to the loader.
pub struct MediaSegment {
    meta: Arc<SegmentMeta>,
    payload: Box<dyn UnitPayload>,
    output: Option<Arc<TrackOutputs>>,
}

impl MediaSegment {
    #[must_use]
    pub fn new(meta: SegmentMeta, payload: Box<dyn UnitPayload>) -> Self {
        Self {
            meta: Arc::new(meta),
            payload,
            output: None,
        }
    }

    #[must_use]
    pub fn meta(&self) -> &Arc<SegmentMeta> {
        &self.meta
    }

    pub(crate) fn attach(&mut self, output: Arc<TrackOutputs>) {
        self.output = Some(output);
    }
}

/// A non-media load (key, playlist, ...). Nothing is demuxed.
pub struct AuxUnit {
    pub kind: UnitKind,
    pub format: Option<Format>,
    payload: Box<dyn UnitPayload>,
}

impl AuxUnit {
    #[must_use]
    pub fn new(kind: UnitKind, format: Option<Format>, payload: Box<dyn UnitPayload>) -> Self {
        Self {
            kind,
            format,
            payload,
        }
    }
}

/// Anything a [`SegmentSource`](crate::SegmentSource) asks the bundle to load.
pub enum Unit {
    Media(MediaSegment),
    Aux(AuxUnit),
}

impl Unit {
    #[must_use]
    pub fn kind(&self) -> UnitKind {
        match self {
            Self::Media(_) => UnitKind::Media,
            Self::Aux(aux) => aux.kind,
        }
    }

    #[must_use]
    pub fn is_media(&self) -> bool {
        matches!(self, Self::Media(_))
    }

    /// Segment bookkeeping for media units.
    #[must_use]
    pub fn meta(&self) -> Option<&Arc<SegmentMeta>> {
        match self {
            Self::Media(segment) => Some(&segment.meta),
            Self::Aux(_) => None,
        }
    }

    #[must_use]
    pub fn format(&self) -> Option<&Format> {
        match self {
            Self::Media(segment) => Some(&segment.meta.format),
            Self::Aux(aux) => aux.format.as_ref(),
        }
    }

    #[must_use]
    pub fn bytes_loaded(&self) -> u64 {
        match self {
            Self::Media(segment) => segment.payload.bytes_loaded(),
            Self::Aux(aux) => aux.payload.bytes_loaded(),
        }
    }
}

impl From<MediaSegment> for Unit {
    fn from(segment: MediaSegment) -> Self {
        Self::Media(segment)
    }
}

impl From<AuxUnit> for Unit {
    fn from(aux: AuxUnit) -> Self {
        Self::Aux(aux)
    }
}

impl Loadable for Unit {
    fn load(&mut self, cancel: &CancellationToken) -> Result<(), LoadError> {
        match self {
            Self::Media(segment) => {
                let Some(output) = segment.output.as_deref() else {
                    return Err(LoadError::Malformed(
                        "media segment started without a sample output".into(),
                    ));
                };
                let result = segment
                    .payload
                    .load(&LoadContext::new(cancel, Some(output)));
                if cancel.is_cancelled() || matches!(result, Err(LoadError::Canceled)) {
                    segment.meta.set_load_state(LoadState::Canceled);
                } else if result.is_ok() {
                    segment.meta.set_load_state(LoadState::Loaded);
                }
                result
            }
            Self::Aux(aux) => aux.payload.load(&LoadContext::new(cancel, None)),
        }
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Media(segment) => f.debug_tuple("Media").field(&segment.meta).finish(),
            Self::Aux(aux) => f.debug_tuple("Aux").field(&aux.kind).finish(),
        }
    }
}
