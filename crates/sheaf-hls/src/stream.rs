use std::{sync::Arc, time::Duration};

use sheaf_core::TrackSelection;
use sheaf_platform::{Mutex, MutexGuard};

use crate::{
    bundle::{StreamToken, TrackBundle, deliver},
    error::BundleResult,
    sample_queue::ReadResult,
    source::SegmentSource,
};

/// A [`TrackBundle`] shared between its driver and the streams it hands
/// out.
pub struct SharedTrackBundle<S: SegmentSource> {
    inner: Arc<Mutex<TrackBundle<S>>>,
}

impl<S: SegmentSource> Clone for SharedTrackBundle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SegmentSource> SharedTrackBundle<S> {
    #[must_use]
    pub fn new(bundle: TrackBundle<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bundle)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, TrackBundle<S>> {
        self.inner.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, TrackBundle<S>>> {
        self.inner.try_lock()
    }

    /// [`TrackBundle::handle_loader_events`], with the callback notified
    /// after the bundle is unlocked.
    pub fn handle_loader_events(&self) -> usize {
        let (handled, callback, notifications) = {
            let mut bundle = self.inner.lock();
            let handled = bundle.poll_loader_events();
            (handled, bundle.callback(), bundle.take_notifications())
        };
        deliver(callback.as_ref(), notifications);
        handled
    }

    /// [`TrackBundle::await_loader_event`], with the callback notified
    /// after the bundle is unlocked.
    pub fn await_loader_event(&self, timeout: Duration) -> bool {
        let (handled, callback, notifications) = {
            let mut bundle = self.inner.lock();
            let handled = bundle.wait_loader_event(timeout);
            (handled, bundle.callback(), bundle.take_notifications())
        };
        deliver(callback.as_ref(), notifications);
        handled
    }

    /// [`TrackBundle::select_tracks`] returning readable streams.
    ///
    /// # Panics
    ///
    /// See [`TrackBundle::select_tracks`].
    pub fn select_tracks(
        &self,
        old: Vec<SampleStream<S>>,
        selections: &[TrackSelection],
        is_first_selection: bool,
    ) -> Vec<SampleStream<S>> {
        let old = old.into_iter().map(|s| s.token).collect();
        let tokens = self
            .inner
            .lock()
            .select_tracks(old, selections, is_first_selection);
        tokens
            .into_iter()
            .map(|token| SampleStream {
                bundle: self.clone(),
                token,
            })
            .collect()
    }
}

/// Read handle for one enabled track group.
///
/// Give it back through [`SharedTrackBundle::select_tracks`] to disable
/// the group.
pub struct SampleStream<S: SegmentSource> {
    bundle: SharedTrackBundle<S>,
    token: StreamToken,
}

impl<S: SegmentSource> SampleStream<S> {
    #[must_use]
    pub fn group(&self) -> usize {
        self.token.group()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.bundle.lock().is_ready(self.group())
    }

    /// # Errors
    ///
    /// Returns the bundle's fatal error, if any.
    pub fn maybe_throw_error(&self) -> BundleResult<()> {
        self.bundle.lock().maybe_throw_error()
    }

    pub fn read(&self) -> ReadResult {
        self.bundle.lock().read_data(self.group())
    }

    pub fn skip_to_keyframe_before(&self, time_us: i64) -> bool {
        self.bundle
            .lock()
            .skip_to_keyframe_before(self.group(), time_us)
    }
}

impl<S: SegmentSource> std::fmt::Debug for SampleStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleStream")
            .field("group", &self.group())
            .finish_non_exhaustive()
    }
}
