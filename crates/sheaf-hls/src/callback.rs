#[cfg(any(test, feature = "test-utils"))]
use unimock::unimock;

/// Notifications from a bundle to whoever drives it.
///
/// Delivered by the thread that pumps loader events, after the pump has
/// dispatched. Through [`SharedTrackBundle`](crate::SharedTrackBundle) no
/// bundle lock is held, so implementations may lock the bundle again.
#[cfg_attr(any(test, feature = "test-utils"), unimock(api = BundleCallbackMock))]
pub trait BundleCallback: Send + Sync {
    /// Track groups are known; `track_groups()` is now valid.
    fn on_prepared(&self);

    /// The bundle can take another `continue_loading` call.
    fn on_continue_loading_requested(&self);
}

/// Callback that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCallback;

impl BundleCallback for NoopCallback {
    fn on_prepared(&self) {}

    fn on_continue_loading_requested(&self) {}
}
