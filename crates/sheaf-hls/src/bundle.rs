use std::{
    collections::VecDeque,
    sync::Arc,
    time::Duration,
};

use sheaf_bufpool::byte_pool;
use sheaf_core::{Format, SelectionReason, TrackGroupArray, TrackSelection, TrackType};
use sheaf_events::{EventBus, LoadEvent, LoadInfo, TrackEvent};
use sheaf_loader::{LoadError, Loader, LoaderEvent};
use tracing::{debug, info, trace, warn};

use crate::{
    callback::BundleCallback,
    config::BundleConfig,
    error::BundleResult,
    outputs::{SharedQueue, TrackOutputs},
    sample_queue::{DefaultSampleQueue, ReadResult},
    segment::{SegmentMeta, Unit},
    source::{NextUnit, SegmentSource},
    tracks::{EnabledGroups, derive_track_groups},
};

/// How far media is buffered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferedPosition {
    Us(i64),
    /// Everything up to the end of the stream is loaded.
    EndOfSource,
}

/// Grant for one enabled track group, returned by
/// [`TrackBundle::select_tracks`] and handed back to disable it.
#[derive(Debug, PartialEq, Eq)]
pub struct StreamToken {
    group: usize,
}

impl StreamToken {
    #[must_use]
    pub fn group(&self) -> usize {
        self.group
    }
}

/// Callback notification raised while pumping, delivered once the pump
/// returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Notification {
    Prepared,
    ContinueLoadingRequested,
}

struct Prepared {
    groups: TrackGroupArray,
    primary_group: Option<usize>,
    enabled: EnabledGroups,
}

/// Buffering core for one HLS track bundle.
///
/// All methods run on the consuming thread. The only work done elsewhere is
/// the loading unit's payload writing into [`TrackOutputs`], and at most
/// one unit is loading at any time.
pub struct TrackBundle<S: SegmentSource> {
    name: String,
    track_type: TrackType,
    source: S,
    callback: Arc<dyn BundleCallback>,
    loader: Loader<Unit>,
    outputs: Arc<TrackOutputs>,
    events: EventBus,
    min_retry_count: u32,
    muxed_audio_format: Option<Format>,
    muxed_caption_format: Option<Format>,
    /// Buffered and loading media segments, oldest first.
    segments: VecDeque<Arc<SegmentMeta>>,
    prepared: Option<Prepared>,
    downstream_format: Option<Format>,
    last_seek_position_us: i64,
    pending_reset_position_us: Option<i64>,
    loading_finished: bool,
    released: bool,
    notifications: Vec<Notification>,
}

impl<S: SegmentSource> TrackBundle<S> {
    pub fn new(source: S, callback: Arc<dyn BundleCallback>, config: BundleConfig) -> Self {
        let name = config
            .name
            .unwrap_or_else(|| config.track_type.to_string());
        let factory = config.queue_factory.unwrap_or_else(|| {
            DefaultSampleQueue::factory(config.pool.unwrap_or_else(|| byte_pool().clone()))
        });
        let events = config
            .events
            .unwrap_or_else(|| EventBus::new(config.events_channel_capacity));
        let loader = Loader::new(name.clone(), config.thread_pool, config.retry);

        Self {
            name,
            track_type: config.track_type,
            source,
            callback,
            loader,
            outputs: Arc::new(TrackOutputs::new(factory)),
            events,
            min_retry_count: config.min_retry_count,
            muxed_audio_format: config.muxed_audio_format,
            muxed_caption_format: config.muxed_caption_format,
            segments: VecDeque::new(),
            prepared: None,
            downstream_format: None,
            last_seek_position_us: config.start_position_us,
            pending_reset_position_us: Some(config.start_position_us),
            loading_finished: false,
            released: false,
            notifications: Vec::new(),
        }
    }

    /// Start loading from the initial position until the streams are known.
    pub fn prepare(&mut self) {
        if self.prepared.is_none() {
            self.continue_loading(self.last_seek_position_us);
        }
    }

    /// # Errors
    ///
    /// Returns a fatal loader or source error.
    pub fn maybe_throw_prepare_error(&self) -> BundleResult<()> {
        self.maybe_throw_error()
    }

    /// # Errors
    ///
    /// Returns [`BundleError::Loader`](crate::BundleError::Loader) once retries
    /// are exhausted, or a pending [`SourceError`](crate::SourceError).
    pub fn maybe_throw_error(&self) -> BundleResult<()> {
        self.loader.maybe_throw_error()?;
        self.source.maybe_throw_error()?;
        Ok(())
    }

    #[must_use]
    pub fn duration_us(&self) -> Option<i64> {
        self.source.duration_us()
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.source.is_live()
    }

    #[must_use]
    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    /// Exposed groups; `None` until prepared.
    #[must_use]
    pub fn track_groups(&self) -> Option<&TrackGroupArray> {
        self.prepared.as_ref().map(|p| &p.groups)
    }

    /// Index of the adaptive group, if any.
    #[must_use]
    pub fn primary_group(&self) -> Option<usize> {
        self.prepared.as_ref().and_then(|p| p.primary_group)
    }

    #[must_use]
    pub fn enabled_track_count(&self) -> usize {
        self.prepared.as_ref().map_or(0, |p| p.enabled.count())
    }

    #[must_use]
    pub fn is_group_enabled(&self, group: usize) -> bool {
        self.group_enabled(group)
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn outputs(&self) -> &Arc<TrackOutputs> {
        &self.outputs
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    #[must_use]
    pub fn is_loading_finished(&self) -> bool {
        self.loading_finished
    }

    #[must_use]
    pub fn last_seek_position_us(&self) -> i64 {
        self.last_seek_position_us
    }

    #[must_use]
    pub fn pending_reset_position_us(&self) -> Option<i64> {
        self.pending_reset_position_us
    }

    /// Buffered and loading segments, oldest first.
    pub fn buffered_segments(&self) -> impl ExactSizeIterator<Item = &SegmentMeta> {
        self.segments.iter().map(|s| &**s)
    }

    /// Replace the enabled groups.
    ///
    /// Tokens in `old` are disabled, every selection is enabled and gets a
    /// new token. The adaptive group forwards its chosen variants to the
    /// source. The first call also disables every stream it did not select.
    /// When nothing stays enabled, buffered segments are dropped, loading is
    /// canceled and the next load restarts from the last seek position.
    ///
    /// # Panics
    ///
    /// Panics if the bundle is not prepared, a selection names a group this
    /// bundle does not expose, or a group is toggled to its current state.
    pub fn select_tracks(
        &mut self,
        old: Vec<StreamToken>,
        selections: &[TrackSelection],
        is_first_selection: bool,
    ) -> Vec<StreamToken> {
        let Some(prepared) = self.prepared.as_mut() else {
            panic!("bundle {}: track selection before prepare", self.name);
        };

        for token in old {
            prepared.enabled.set(token.group, false);
            if let Some(queue) = self.outputs.queue_at(token.group) {
                queue.lock().disable();
            }
        }

        let mut streams = Vec::with_capacity(selections.len());
        for selection in selections {
            let Some(group) = prepared.groups.index_of(&selection.group) else {
                panic!("bundle {}: selected group is not exposed here", self.name);
            };
            prepared.enabled.set(group, true);
            if let Some(queue) = self.outputs.queue_at(group) {
                queue.lock().enable();
            }
            if prepared.primary_group == Some(group) {
                self.source.select_source_tracks(&selection.tracks);
            }
            streams.push(StreamToken { group });
        }

        if is_first_selection {
            for (i, queue) in self.outputs.queues().iter().enumerate() {
                if !prepared.enabled.is_enabled(i) {
                    queue.lock().disable();
                }
            }
        }

        let enabled = prepared.enabled.count();
        debug!(
            bundle = %self.name,
            enabled,
            first = is_first_selection,
            "bundle: tracks selected"
        );
        if enabled == 0 {
            self.source.reset();
            self.downstream_format = None;
            self.segments.clear();
            self.pending_reset_position_us = Some(self.last_seek_position_us);
            if self.loader.is_loading() {
                self.loader.cancel_load();
            }
        }
        streams
    }

    /// Drop everything buffered and restart loading at `position_us`.
    pub fn seek_to(&mut self, position_us: i64) {
        debug!(bundle = %self.name, position_us, "bundle: seek");
        self.last_seek_position_us = position_us;
        self.pending_reset_position_us = Some(position_us);
        self.loading_finished = false;
        self.segments.clear();
        if self.loader.is_loading() {
            self.loader.cancel_load();
        } else {
            self.reset_queues();
        }
    }

    #[must_use]
    pub fn buffered_position(&self) -> BufferedPosition {
        if self.loading_finished {
            return BufferedPosition::EndOfSource;
        }
        if let Some(position_us) = self.pending_reset_position_us {
            return BufferedPosition::Us(position_us);
        }

        let mut buffered_us = self.last_seek_position_us;
        let last_completed = match self.segments.back() {
            Some(last) if last.is_load_completed() => Some(last),
            _ if self.segments.len() > 1 => self.segments.get(self.segments.len() - 2),
            _ => None,
        };
        if let Some(segment) = last_completed {
            buffered_us = buffered_us.max(segment.end_us);
        }
        if let Some(queued_us) = self.largest_queued_timestamp_us() {
            buffered_us = buffered_us.max(queued_us);
        }
        BufferedPosition::Us(buffered_us)
    }

    /// Where the next load would start.
    #[must_use]
    pub fn next_load_position(&self) -> BufferedPosition {
        if let Some(position_us) = self.pending_reset_position_us {
            return BufferedPosition::Us(position_us);
        }
        if self.loading_finished {
            return BufferedPosition::EndOfSource;
        }
        BufferedPosition::Us(
            self.segments
                .back()
                .map_or(self.last_seek_position_us, |s| s.end_us),
        )
    }

    #[must_use]
    pub fn largest_queued_timestamp_us(&self) -> Option<i64> {
        self.outputs
            .queues()
            .iter()
            .filter_map(|q| q.lock().largest_queued_timestamp_us())
            .max()
    }

    /// Stop loading and discard all samples. The bundle is unusable after.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.source.release();
        for queue in self.outputs.queues() {
            queue.lock().disable();
        }
        self.loader.release();
        debug!(bundle = %self.name, "bundle: released");
    }

    /// Unknown groups are never ready.
    #[must_use]
    pub fn is_ready(&self, group: usize) -> bool {
        if self.loading_finished {
            return true;
        }
        if self.pending_reset_position_us.is_some() {
            return false;
        }
        self.outputs
            .queue_at(group)
            .is_some_and(|queue| !queue.lock().is_empty())
    }

    /// Read the next item for `group`.
    pub fn read_data(&mut self, group: usize) -> ReadResult {
        if self.pending_reset_position_us.is_some() {
            return ReadResult::Nothing;
        }

        self.discard_consumed_segments();
        if let Some(current) = self.segments.front() {
            if self.downstream_format.as_ref() != Some(&current.format) {
                debug!(
                    bundle = %self.name,
                    uid = current.uid,
                    format_id = ?current.format.id,
                    "bundle: downstream format changed"
                );
                self.events.publish(TrackEvent::DownstreamFormatChanged {
                    track_type: self.track_type,
                    format: current.format.clone(),
                    selection_reason: current.selection_reason,
                    media_time_us: current.start_us,
                });
                self.downstream_format = Some(current.format.clone());
            }
        }

        self.group_queue(group)
            .lock()
            .read(self.loading_finished, self.last_seek_position_us)
    }

    pub fn skip_to_keyframe_before(&mut self, group: usize, time_us: i64) -> bool {
        self.group_queue(group).lock().skip_to_keyframe_before(time_us)
    }

    /// Start the next load if none is running.
    ///
    /// Returns `true` when a load was started or the stream ended, `false`
    /// when a load is already running or the source has nothing yet.
    pub fn continue_loading(&mut self, position_us: i64) -> bool {
        if self.released || self.loader.is_loading() {
            return false;
        }

        let target_us = self.pending_reset_position_us.unwrap_or(position_us);
        let previous = self.segments.back().cloned();
        let mut unit = match self.source.next_unit(previous.as_deref(), target_us) {
            NextUnit::EndOfStream => {
                debug!(bundle = %self.name, "bundle: end of stream");
                self.loading_finished = true;
                return true;
            }
            NextUnit::Pending => return false,
            NextUnit::Unit(unit) => unit,
        };

        if let Unit::Media(segment) = &mut unit {
            let meta = Arc::clone(segment.meta());
            self.pending_reset_position_us = None;
            self.outputs.init(meta.uid, meta.splice_in);
            segment.attach(Arc::clone(&self.outputs));
            self.segments.push_back(meta);
        }

        let info = load_info(self.track_type, &unit);
        let started_at = self.loader.start_load(unit, self.min_retry_count);
        debug!(
            bundle = %self.name,
            kind = ?info.kind,
            start_us = ?info.start_us,
            target_us,
            "bundle: load started"
        );
        self.events.publish(LoadEvent::Started { info, started_at });
        true
    }

    /// Dispatch every loader outcome that has arrived, then notify the
    /// callback. Returns how many were handled.
    pub fn handle_loader_events(&mut self) -> usize {
        let handled = self.poll_loader_events();
        let notifications = self.take_notifications();
        deliver(self.callback.as_ref(), notifications);
        handled
    }

    /// Block up to `timeout` for one loader outcome, dispatch it, then
    /// notify the callback.
    pub fn await_loader_event(&mut self, timeout: Duration) -> bool {
        let handled = self.wait_loader_event(timeout);
        let notifications = self.take_notifications();
        deliver(self.callback.as_ref(), notifications);
        handled
    }

    pub(crate) fn poll_loader_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.loader.poll() {
            self.dispatch(event);
            handled += 1;
        }
        // A running load may already have declared every stream.
        self.maybe_finish_prepare();
        handled
    }

    pub(crate) fn wait_loader_event(&mut self, timeout: Duration) -> bool {
        match self.loader.wait(timeout) {
            Some(event) => {
                self.dispatch(event);
                true
            }
            None => {
                self.maybe_finish_prepare();
                false
            }
        }
    }

    pub(crate) fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub(crate) fn callback(&self) -> Arc<dyn BundleCallback> {
        Arc::clone(&self.callback)
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    fn dispatch(&mut self, event: LoaderEvent<Unit>) {
        // Streams are declared before the outcome is sent.
        self.maybe_finish_prepare();
        match event {
            LoaderEvent::Completed {
                task,
                load_duration,
            } => self.on_load_completed(task, load_duration),
            LoaderEvent::Canceled { task, .. } => self.on_load_canceled(task),
            LoaderEvent::Failed {
                task,
                error,
                error_count,
                ..
            } => self.on_load_error(task, &error, error_count),
        }
        self.maybe_finish_prepare();
    }

    pub(crate) fn on_load_completed(&mut self, unit: Unit, load_duration: Duration) {
        self.source.on_unit_load_completed(&unit);
        let bytes_loaded = unit.bytes_loaded();
        debug!(
            bundle = %self.name,
            kind = ?unit.kind(),
            bytes_loaded,
            load_ms = load_duration.as_millis() as u64,
            "bundle: load completed"
        );
        self.events.publish(LoadEvent::Completed {
            info: load_info(self.track_type, &unit),
            load_duration,
            bytes_loaded,
        });
        self.request_continue_loading();
    }

    pub(crate) fn on_load_canceled(&mut self, unit: Unit) {
        debug!(bundle = %self.name, kind = ?unit.kind(), "bundle: load canceled");
        self.events.publish(LoadEvent::Canceled {
            info: load_info(self.track_type, &unit),
            bytes_loaded: unit.bytes_loaded(),
        });
        if self.released {
            return;
        }
        self.reset_queues();
        self.notify(Notification::ContinueLoadingRequested);
    }

    /// Classify a failed attempt: abandon it (rolling the segment list back)
    /// or hand it back to the loader for a retry.
    ///
    /// # Panics
    ///
    /// Panics if an abandoned media segment is not the newest one buffered.
    pub(crate) fn on_load_error(&mut self, unit: Unit, error: &LoadError, error_count: u32) {
        let bytes_loaded = unit.bytes_loaded();
        let cancelable = !unit.is_media() || bytes_loaded == 0;

        let abandoned = self.source.on_unit_load_error(&unit, cancelable, error);
        if abandoned {
            if let Some(meta) = unit.meta() {
                let removed = self.segments.pop_back();
                assert!(
                    removed.as_ref().is_some_and(|r| Arc::ptr_eq(r, meta)),
                    "bundle {}: abandoned segment {} is not the newest buffered segment",
                    self.name,
                    meta.uid
                );
                if self.segments.is_empty() {
                    self.pending_reset_position_us = Some(self.last_seek_position_us);
                }
            }
        }

        warn!(
            bundle = %self.name,
            kind = ?unit.kind(),
            bytes_loaded,
            cancelable,
            abandoned,
            error_count,
            %error,
            "bundle: load error"
        );
        self.events.publish(LoadEvent::Error {
            info: load_info(self.track_type, &unit),
            error: error.to_string(),
            canceled: abandoned,
        });

        if abandoned {
            drop(unit);
            self.request_continue_loading();
        } else {
            self.loader.retry(unit);
        }
    }

    fn request_continue_loading(&mut self) {
        if self.prepared.is_some() {
            self.notify(Notification::ContinueLoadingRequested);
        } else {
            self.continue_loading(self.last_seek_position_us);
        }
    }

    fn maybe_finish_prepare(&mut self) {
        if self.prepared.is_some() || !self.outputs.is_built() {
            return;
        }
        let Some(stream_formats) = self.outputs.upstream_formats() else {
            return;
        };

        let derived = derive_track_groups(
            &stream_formats,
            &self.source.source_track_group(),
            self.muxed_audio_format.as_ref(),
            self.muxed_caption_format.as_ref(),
        );
        info!(
            bundle = %self.name,
            groups = derived.groups.len(),
            primary_group = ?derived.primary_group,
            primary_type = ?derived.primary_type,
            "bundle: prepared"
        );
        self.prepared = Some(Prepared {
            enabled: EnabledGroups::new(derived.groups.len()),
            groups: derived.groups,
            primary_group: derived.primary_group,
        });
        self.notify(Notification::Prepared);
    }

    /// Drop consumed segments from the front, keeping at least one.
    fn discard_consumed_segments(&mut self) {
        while self.segments.len() > 1 && self.finished_reading(self.segments[0].uid) {
            if let Some(segment) = self.segments.pop_front() {
                trace!(bundle = %self.name, uid = segment.uid, "bundle: segment consumed");
            }
        }
    }

    /// No enabled queue still has unread samples from segment `uid`.
    fn finished_reading(&self, uid: u64) -> bool {
        self.outputs
            .queues()
            .iter()
            .enumerate()
            .all(|(i, queue)| !self.group_enabled(i) || queue.lock().peek_source_id() != uid)
    }

    /// Before preparation every stream counts as enabled.
    fn group_enabled(&self, group: usize) -> bool {
        match &self.prepared {
            Some(prepared) => prepared.enabled.is_enabled(group),
            None => true,
        }
    }

    fn reset_queues(&self) {
        for (i, queue) in self.outputs.queues().iter().enumerate() {
            queue.lock().reset(self.group_enabled(i));
        }
    }

    fn group_queue(&self, group: usize) -> SharedQueue {
        match self.outputs.queue_at(group) {
            Some(queue) => queue,
            None => panic!("bundle {}: no sample queue for group {group}", self.name),
        }
    }
}

impl<S: SegmentSource> Drop for TrackBundle<S> {
    fn drop(&mut self) {
        self.release();
    }
}

pub(crate) fn deliver(callback: &dyn BundleCallback, notifications: Vec<Notification>) {
    for notification in notifications {
        match notification {
            Notification::Prepared => callback.on_prepared(),
            Notification::ContinueLoadingRequested => callback.on_continue_loading_requested(),
        }
    }
}

fn load_info(track_type: TrackType, unit: &Unit) -> LoadInfo {
    let meta = unit.meta();
    LoadInfo {
        kind: unit.kind(),
        track_type,
        format: unit.format().cloned(),
        selection_reason: meta.map_or(SelectionReason::Unknown, |m| m.selection_reason),
        start_us: meta.map(|m| m.start_us),
        end_us: meta.map(|m| m.end_us),
    }
}
