//! Scripted fakes for driving a [`TrackBundle`](crate::TrackBundle) without
//! network or demuxer.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use sheaf_core::{Format, TrackGroup, UnitKind, mime};
use sheaf_loader::LoadError;
use sheaf_platform::Mutex;

use crate::{
    callback::BundleCallback,
    error::SourceError,
    sample_queue::SampleFlags,
    segment::{AuxUnit, LoadContext, MediaSegment, SegmentMeta, Unit, UnitPayload},
    source::{NextUnit, SegmentSource},
};

/// Video variant `i` of a ladder: id `v{i}`, rising bitrate and size.
#[must_use]
pub fn variant(i: u32) -> Format {
    Format::new()
        .with_id(format!("v{i}"))
        .with_container_mime_type(mime::VIDEO_MP2T)
        .with_bitrate(800_000 * (i + 1))
        .with_size(640 * (i + 1), 360 * (i + 1))
}

#[must_use]
pub fn variants(n: u32) -> TrackGroup {
    TrackGroup::new((0..n).map(variant).collect())
}

#[must_use]
pub fn video_sample_format() -> Format {
    Format::new()
        .with_sample_mime_type(mime::VIDEO_H264)
        .with_codecs("avc1.64001f")
}

#[must_use]
pub fn audio_sample_format() -> Format {
    Format::new()
        .with_sample_mime_type(mime::AUDIO_AAC)
        .with_codecs("mp4a.40.2")
        .with_audio(2, 48_000)
}

#[must_use]
pub fn id3_sample_format() -> Format {
    Format::new().with_sample_mime_type(mime::APPLICATION_ID3)
}

/// A media unit for segment `uid` covering `[start_us, end_us)`.
#[must_use]
pub fn media(
    uid: u64,
    start_us: i64,
    end_us: i64,
    format: Format,
    payload: ScriptedPayload,
) -> Unit {
    MediaSegment::new(SegmentMeta::new(uid, start_us, end_us, format), Box::new(payload)).into()
}

/// Like [`media`], but the segment is spliced into what is already queued.
#[must_use]
pub fn spliced_media(
    uid: u64,
    start_us: i64,
    end_us: i64,
    format: Format,
    payload: ScriptedPayload,
) -> Unit {
    let meta = SegmentMeta::new(uid, start_us, end_us, format).with_splice_in(true);
    MediaSegment::new(meta, Box::new(payload)).into()
}

/// A key load.
#[must_use]
pub fn key(payload: ScriptedPayload) -> Unit {
    AuxUnit::new(UnitKind::EncryptionKey, None, Box::new(payload)).into()
}

/// What a [`ScriptedSource`] saw.
#[derive(Debug, Default)]
pub struct SourceLog {
    /// `position_us` of every `next_unit` call.
    pub positions: Vec<i64>,
    /// Uid of the `previous` segment of every `next_unit` call.
    pub previous: Vec<Option<u64>>,
    pub selected_tracks: Vec<Vec<usize>>,
    pub resets: usize,
    pub completed: Vec<UnitKind>,
    /// `(kind, cancelable)` of every reported failure.
    pub errors: Vec<(UnitKind, bool)>,
    pub released: bool,
}

/// Hands out a fixed list of units, then reports end of stream.
pub struct ScriptedSource {
    script: VecDeque<NextUnit>,
    tracks: TrackGroup,
    duration_us: Option<i64>,
    live: bool,
    abandon_on_error: bool,
    error: Option<SourceError>,
    log: Arc<Mutex<SourceLog>>,
}

impl ScriptedSource {
    #[must_use]
    pub fn new(tracks: TrackGroup) -> Self {
        Self {
            script: VecDeque::new(),
            tracks,
            duration_us: None,
            live: false,
            abandon_on_error: false,
            error: None,
            log: Arc::new(Mutex::new(SourceLog::default())),
        }
    }

    #[must_use]
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.script.push_back(NextUnit::Unit(unit));
        self
    }

    /// One `next_unit` call that yields nothing.
    #[must_use]
    pub fn with_pending(mut self) -> Self {
        self.script.push_back(NextUnit::Pending);
        self
    }

    #[must_use]
    pub fn with_duration_us(mut self, duration_us: i64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    #[must_use]
    pub fn with_live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    /// Abandon every cancelable failed unit instead of retrying it.
    #[must_use]
    pub fn with_abandon_on_error(mut self, abandon: bool) -> Self {
        self.abandon_on_error = abandon;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: SourceError) -> Self {
        self.error = Some(error);
        self
    }

    /// Shared view of the calls made so far.
    #[must_use]
    pub fn log(&self) -> Arc<Mutex<SourceLog>> {
        Arc::clone(&self.log)
    }

    pub fn push_unit(&mut self, unit: Unit) {
        self.script.push_back(NextUnit::Unit(unit));
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl SegmentSource for ScriptedSource {
    fn next_unit(&mut self, previous: Option<&SegmentMeta>, position_us: i64) -> NextUnit {
        {
            let mut log = self.log.lock();
            log.positions.push(position_us);
            log.previous.push(previous.map(|p| p.uid));
        }
        self.script.pop_front().unwrap_or(NextUnit::EndOfStream)
    }

    fn source_track_group(&self) -> TrackGroup {
        self.tracks.clone()
    }

    fn select_source_tracks(&mut self, tracks: &[usize]) {
        self.log.lock().selected_tracks.push(tracks.to_vec());
    }

    fn reset(&mut self) {
        self.log.lock().resets += 1;
    }

    fn on_unit_load_completed(&mut self, unit: &Unit) {
        self.log.lock().completed.push(unit.kind());
    }

    fn on_unit_load_error(&mut self, unit: &Unit, cancelable: bool, _error: &LoadError) -> bool {
        self.log.lock().errors.push((unit.kind(), cancelable));
        cancelable && self.abandon_on_error
    }

    fn maybe_throw_error(&self) -> Result<(), SourceError> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn duration_us(&self) -> Option<i64> {
        self.duration_us
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn release(&mut self) {
        self.log.lock().released = true;
    }
}

struct ScriptedSample {
    track_id: u32,
    time_us: i64,
    flags: SampleFlags,
    data: Vec<u8>,
}

/// Payload that declares streams and writes samples as a demuxer would.
#[derive(Default)]
pub struct ScriptedPayload {
    tracks: Vec<(u32, Format)>,
    samples: Vec<ScriptedSample>,
    end_tracks: bool,
    failures: VecDeque<LoadError>,
    bytes_before_failure: u64,
    hold: Option<Arc<AtomicBool>>,
    bytes_loaded: u64,
    attempts: Arc<AtomicUsize>,
}

impl ScriptedPayload {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare stream `id` with `format` and finish the stream list.
    #[must_use]
    pub fn with_track(mut self, id: u32, format: Format) -> Self {
        self.tracks.push((id, format));
        self.end_tracks = true;
        self
    }

    /// Keyframe sample on stream `id`.
    #[must_use]
    pub fn with_sample(self, id: u32, time_us: i64, data: &[u8]) -> Self {
        self.with_flagged_sample(id, time_us, SampleFlags::KEYFRAME, data)
    }

    #[must_use]
    pub fn with_flagged_sample(
        mut self,
        id: u32,
        time_us: i64,
        flags: SampleFlags,
        data: &[u8],
    ) -> Self {
        self.samples.push(ScriptedSample {
            track_id: id,
            time_us,
            flags,
            data: data.to_vec(),
        });
        self
    }

    /// Leave the stream list open (no `end_tracks`).
    #[must_use]
    pub fn without_end_tracks(mut self) -> Self {
        self.end_tracks = false;
        self
    }

    /// Fail the next attempt with `error`; repeatable.
    #[must_use]
    pub fn with_failure(mut self, error: LoadError) -> Self {
        self.failures.push_back(error);
        self
    }

    /// Count `bytes` as consumed by every failing attempt.
    #[must_use]
    pub fn with_bytes_before_failure(mut self, bytes: u64) -> Self {
        self.bytes_before_failure = bytes;
        self
    }

    /// Block while `hold` is set, until canceled.
    #[must_use]
    pub fn with_hold(mut self, hold: Arc<AtomicBool>) -> Self {
        self.hold = Some(hold);
        self
    }

    /// Counter of `load` calls, shared with the test.
    #[must_use]
    pub fn attempts(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempts)
    }
}

impl UnitPayload for ScriptedPayload {
    fn load(&mut self, ctx: &LoadContext<'_>) -> Result<(), LoadError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(hold) = &self.hold {
            while hold.load(Ordering::Acquire) {
                if ctx.is_canceled() {
                    return Err(LoadError::Canceled);
                }
                thread::sleep(Duration::from_millis(1));
            }
        }
        if let Some(error) = self.failures.pop_front() {
            self.bytes_loaded += self.bytes_before_failure;
            return Err(error);
        }
        if self.tracks.is_empty() && self.samples.is_empty() {
            return Ok(());
        }

        let output = ctx.output()?;
        for (id, format) in &self.tracks {
            output.track(*id).lock().format(format.clone());
        }
        if self.end_tracks {
            output.end_tracks();
        }
        for sample in &self.samples {
            if ctx.is_canceled() {
                return Err(LoadError::Canceled);
            }
            output
                .track(sample.track_id)
                .lock()
                .append(sample.time_us, sample.flags, &sample.data);
            self.bytes_loaded += sample.data.len() as u64;
        }
        Ok(())
    }

    fn bytes_loaded(&self) -> u64 {
        self.bytes_loaded
    }
}

/// Counts callback invocations.
#[derive(Debug, Default)]
pub struct RecordingCallback {
    prepared: AtomicUsize,
    continue_requests: AtomicUsize,
}

impl RecordingCallback {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn prepared(&self) -> usize {
        self.prepared.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn continue_requests(&self) -> usize {
        self.continue_requests.load(Ordering::SeqCst)
    }
}

impl BundleCallback for RecordingCallback {
    fn on_prepared(&self) {
        self.prepared.fetch_add(1, Ordering::SeqCst);
    }

    fn on_continue_loading_requested(&self) {
        self.continue_requests.fetch_add(1, Ordering::SeqCst);
    }
}
