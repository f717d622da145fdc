
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use fixture::{FRAMES_PER_SEGMENT, SEGMENT_US, VodSource, init_tracing};
use sheaf_core::{TrackSelection, TrackType};
use sheaf_events::{Event, TrackEvent};
use sheaf_hls::{
    BufferedPosition, BundleCallback, BundleConfig, NoopCallback, ReadResult, SampleStream,
    SharedTrackBundle, TrackBundle,
};
use sheaf_platform::Mutex;

const TICK: Duration = Duration::from_millis(10);

fn shared(segments: u64) -> SharedTrackBundle<VodSource> {
    init_tracing();
    let bundle = TrackBundle::new(
        VodSource::new(segments),
        Arc::new(NoopCallback),
        BundleConfig::new(TrackType::Default).with_name("vod"),
    );
    SharedTrackBundle::new(bundle)
}

fn prepare(bundle: &SharedTrackBundle<VodSource>) {
    bundle.lock().prepare();
    for _ in 0..500 {
        bundle.await_loader_event(TICK);
        if bundle.lock().is_prepared() {
            return;
        }
    }
    panic!("bundle did not prepare");
}

fn select_all(bundle: &SharedTrackBundle<VodSource>) -> Vec<SampleStream<VodSource>> {
    let groups: Vec<_> = {
        let guard = bundle.lock();
        guard.track_groups().unwrap().iter().cloned().collect()
    };
    let selections: Vec<_> = groups.into_iter().map(TrackSelection::all).collect();
    bundle.select_tracks(Vec::new(), &selections, true)
}

/// Keep loading until every stream reports end of stream. Returns each
/// stream's sample times.
fn play_out(
    bundle: &SharedTrackBundle<VodSource>,
    streams: &[SampleStream<VodSource>],
) -> Vec<Vec<(i64, bool)>> {
    let mut times = vec![Vec::new(); streams.len()];
    let mut ended = vec![false; streams.len()];
    for _ in 0..2_000 {
        bundle.lock().continue_loading(0);
        bundle.await_loader_event(TICK);
        for (i, stream) in streams.iter().enumerate() {
            loop {
                match stream.read() {
                    ReadResult::Format(_) => {}
                    ReadResult::Sample(sample) => {
                        times[i].push((sample.time_us, sample.is_decode_only()));
                    }
                    ReadResult::EndOfStream => {
                        ended[i] = true;
                        break;
                    }
                    ReadResult::Nothing => break,
                }
            }
        }
        if ended.iter().all(|e| *e) {
            return times;
        }
    }
    panic!("playback did not reach end of stream");
}

#[test]
fn vod_plays_to_end_and_switches_up() {
    let bundle = shared(3);
    let mut rx = bundle.lock().events().subscribe();
    prepare(&bundle);

    {
        let guard = bundle.lock();
        let groups = guard.track_groups().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(guard.primary_group(), Some(0));
        assert_eq!(groups.get(0).unwrap().len(), 2);
        assert_eq!(guard.duration_us(), Some(3 * SEGMENT_US));
    }

    let streams = select_all(&bundle);
    assert_eq!(streams.len(), 2);
    assert!(streams.iter().all(|s| s.maybe_throw_error().is_ok()));

    let times = play_out(&bundle, &streams);
    let expected = (3 * FRAMES_PER_SEGMENT) as usize;
    assert_eq!(times[0].len(), expected);
    assert_eq!(times[1].len(), expected);
    assert!(times[0].windows(2).all(|w| w[0].0 < w[1].0));
    assert!(streams.iter().all(|s| s.is_ready()));
    assert_eq!(bundle.lock().buffered_position(), BufferedPosition::EndOfSource);

    // Segment 1 was requested before selection; later ones use the top variant.
    let mut ids = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Event::Track(TrackEvent::DownstreamFormatChanged { format, .. }) = event {
            ids.push(format.id.unwrap_or_default());
        }
    }
    assert_eq!(ids, vec!["480p".to_string(), "720p".to_string()]);
}

#[test]
fn seek_marks_samples_before_target_decode_only() {
    let bundle = shared(3);
    prepare(&bundle);
    let streams = select_all(&bundle);

    bundle.lock().seek_to(3_000_000);
    assert_eq!(
        bundle.lock().buffered_position(),
        BufferedPosition::Us(3_000_000)
    );

    let times = play_out(&bundle, &streams);
    let video = &times[0];
    assert_eq!(video.first(), Some(&(2_000_000, true)));
    assert!(
        video
            .iter()
            .all(|&(t, decode_only)| decode_only == (t < 3_000_000))
    );
    assert_eq!(video.len(), (2 * FRAMES_PER_SEGMENT) as usize);
}

#[test]
fn dropping_streams_disables_groups() {
    let bundle = shared(2);
    prepare(&bundle);
    let streams = select_all(&bundle);
    assert_eq!(bundle.lock().enabled_track_count(), 2);

    let remaining = bundle.select_tracks(streams, &[], false);
    assert!(remaining.is_empty());
    let guard = bundle.lock();
    assert_eq!(guard.enabled_track_count(), 0);
    assert_eq!(guard.buffered_segments().len(), 0);
}

/// Drives loading from inside the callback, as a player loop would.
#[derive(Default)]
struct ReentrantCallback {
    bundle: Mutex<Option<SharedTrackBundle<VodSource>>>,
    prepared: AtomicUsize,
    reentered: AtomicUsize,
    blocked: AtomicUsize,
}

impl ReentrantCallback {
    fn with_bundle(&self, f: impl FnOnce(&mut TrackBundle<VodSource>)) {
        let Some(shared) = self.bundle.lock().clone() else {
            return;
        };
        match shared.try_lock() {
            Some(mut guard) => {
                f(&mut guard);
                self.reentered.fetch_add(1, Ordering::SeqCst);
            }
            None => {
                self.blocked.fetch_add(1, Ordering::SeqCst);
            }
        };
    }
}

impl BundleCallback for ReentrantCallback {
    fn on_prepared(&self) {
        self.prepared.fetch_add(1, Ordering::SeqCst);
        self.with_bundle(|bundle| assert!(bundle.is_prepared()));
    }

    fn on_continue_loading_requested(&self) {
        self.with_bundle(|bundle| {
            if bundle.enabled_track_count() > 0 {
                bundle.continue_loading(0);
            }
        });
    }
}

#[test]
fn callback_can_lock_the_bundle_it_was_called_from() {
    init_tracing();
    let callback = Arc::new(ReentrantCallback::default());
    let bundle = SharedTrackBundle::new(TrackBundle::new(
        VodSource::new(2),
        Arc::clone(&callback) as Arc<dyn BundleCallback>,
        BundleConfig::new(TrackType::Default).with_name("reentrant"),
    ));
    *callback.bundle.lock() = Some(bundle.clone());

    prepare(&bundle);
    let streams = select_all(&bundle);
    let times = play_out(&bundle, &streams);
    assert_eq!(times[0].len(), (2 * FRAMES_PER_SEGMENT) as usize);

    assert_eq!(callback.prepared.load(Ordering::SeqCst), 1);
    assert!(callback.reentered.load(Ordering::SeqCst) >= 2);
    assert_eq!(callback.blocked.load(Ordering::SeqCst), 0);

    drop(streams);
    callback.bundle.lock().take();
}
