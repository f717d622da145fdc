use std::{collections::VecDeque, fmt, sync::Arc};

use bitflags::bitflags;
use sheaf_bufpool::{BytePool, PooledBytes};
use sheaf_core::Format;
use tracing::trace;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SampleFlags: u8 {
        /// Sync sample; decoding can start here.
        const KEYFRAME = 1;
        /// Decode but do not render (before the seek target).
        const DECODE_ONLY = 1 << 1;
    }
}

/// One access unit handed to the consumer. Its memory returns to the pool
/// on drop.
pub struct MediaSample {
    pub time_us: i64,
    pub flags: SampleFlags,
    pub data: PooledBytes,
}

impl MediaSample {
    #[must_use]
    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(SampleFlags::KEYFRAME)
    }

    #[must_use]
    pub fn is_decode_only(&self) -> bool {
        self.flags.contains(SampleFlags::DECODE_ONLY)
    }
}

impl fmt::Debug for MediaSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSample")
            .field("time_us", &self.time_us)
            .field("flags", &self.flags)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Result of one consuming read.
#[derive(Debug)]
pub enum ReadResult {
    /// Nothing buffered yet.
    Nothing,
    /// The next samples use a new format.
    Format(Format),
    Sample(MediaSample),
    /// Queue drained and loading finished.
    EndOfStream,
}

/// Per-stream FIFO of timestamped samples.
///
/// The loading side calls `format`/`append` while a load is in flight; the
/// consuming side uses everything else. The owning bundle never lets the
/// two overlap on the write side.
pub trait SampleQueue: Send {
    /// Declare the format of samples appended from now on.
    fn format(&mut self, format: Format);

    /// Copy one sample into the queue.
    fn append(&mut self, time_us: i64, flags: SampleFlags, data: &[u8]);

    /// Consume the next item. Samples earlier than `decode_only_until_us`
    /// come out flagged [`SampleFlags::DECODE_ONLY`].
    fn read(&mut self, loading_finished: bool, decode_only_until_us: i64) -> ReadResult;

    /// Drop unread samples up to the last keyframe at or before `time_us`.
    /// Returns `false` (and drops nothing) if `time_us` is not buffered.
    fn skip_to_keyframe_before(&mut self, time_us: i64) -> bool;

    /// No unread samples.
    fn is_empty(&self) -> bool;

    /// Largest timestamp appended since the last reset.
    fn largest_queued_timestamp_us(&self) -> Option<i64>;

    fn enable(&mut self);

    /// Discard everything and drop future writes.
    fn disable(&mut self);

    fn is_enabled(&self) -> bool;

    /// Discard all samples and switch to `enable`.
    fn reset(&mut self, enable: bool);

    /// Treat the next keyframe as a continuation of what is queued.
    fn splice(&mut self);

    /// Tag samples appended from now on with segment `id`.
    fn set_source_id(&mut self, id: u64);

    /// Segment id of the next unread sample, or of the segment currently
    /// being written when drained.
    fn peek_source_id(&self) -> u64;

    /// Format last declared by the writer.
    fn upstream_format(&self) -> Option<Format>;
}

/// Builds a fresh queue for every stream the demuxer declares.
pub type QueueFactory = Arc<dyn Fn() -> Box<dyn SampleQueue> + Send + Sync>;

struct QueuedSample {
    time_us: i64,
    flags: SampleFlags,
    source_id: u64,
    format: Arc<Format>,
    data: PooledBytes,
}

/// [`SampleQueue`] copying sample payloads into pooled buffers.
pub struct DefaultSampleQueue {
    pool: BytePool,
    samples: VecDeque<QueuedSample>,
    upstream_format: Option<Arc<Format>>,
    downstream_format: Option<Arc<Format>>,
    source_id: u64,
    enabled: bool,
    pending_splice: bool,
    need_keyframe: bool,
    largest_queued_us: Option<i64>,
    largest_read_us: Option<i64>,
}

impl DefaultSampleQueue {
    #[must_use]
    pub fn new(pool: BytePool) -> Self {
        Self {
            pool,
            samples: VecDeque::new(),
            upstream_format: None,
            downstream_format: None,
            source_id: 0,
            enabled: true,
            pending_splice: false,
            need_keyframe: true,
            largest_queued_us: None,
            largest_read_us: None,
        }
    }

    /// Factory producing queues on `pool`.
    #[must_use]
    pub fn factory(pool: BytePool) -> QueueFactory {
        Arc::new(move || Box::new(DefaultSampleQueue::new(pool.clone())) as Box<dyn SampleQueue>)
    }

    /// Number of unread samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.pending_splice = false;
        self.need_keyframe = true;
        self.largest_queued_us = None;
        self.largest_read_us = None;
    }

    /// Drop the unread tail at or after `time_us`. Fails if the consumer
    /// has already read past it.
    fn attempt_splice(&mut self, time_us: i64) -> bool {
        if self.largest_read_us.is_some_and(|read| read >= time_us) {
            return false;
        }
        let mut discarded = 0usize;
        while self.samples.back().is_some_and(|s| s.time_us >= time_us) {
            self.samples.pop_back();
            discarded += 1;
        }
        if discarded > 0 {
            self.largest_queued_us = self
                .samples
                .iter()
                .map(|s| s.time_us)
                .max()
                .max(self.largest_read_us);
            trace!(time_us, discarded, "sample_queue: spliced");
        }
        true
    }
}

impl SampleQueue for DefaultSampleQueue {
    fn format(&mut self, format: Format) {
        if self.upstream_format.as_deref() != Some(&format) {
            self.upstream_format = Some(Arc::new(format));
        }
    }

    fn append(&mut self, time_us: i64, flags: SampleFlags, data: &[u8]) {
        if !self.enabled {
            return;
        }
        let Some(format) = self.upstream_format.clone() else {
            trace!(time_us, "sample_queue: sample before format dropped");
            return;
        };
        let keyframe = flags.contains(SampleFlags::KEYFRAME);
        if self.pending_splice {
            if !keyframe || !self.attempt_splice(time_us) {
                return;
            }
            self.pending_splice = false;
        }
        if self.need_keyframe {
            if !keyframe {
                return;
            }
            self.need_keyframe = false;
        }

        let data = self.pool.get_with(|buf| buf.extend_from_slice(data));
        self.samples.push_back(QueuedSample {
            time_us,
            flags: flags - SampleFlags::DECODE_ONLY,
            source_id: self.source_id,
            format,
            data,
        });
        self.largest_queued_us = Some(self.largest_queued_us.map_or(time_us, |t| t.max(time_us)));
    }

    fn read(&mut self, loading_finished: bool, decode_only_until_us: i64) -> ReadResult {
        if !self.enabled {
            return ReadResult::Nothing;
        }
        let Some(next) = self.samples.front() else {
            return if loading_finished {
                ReadResult::EndOfStream
            } else {
                ReadResult::Nothing
            };
        };
        if self.downstream_format.as_deref() != Some(&*next.format) {
            let format = Arc::clone(&next.format);
            self.downstream_format = Some(Arc::clone(&format));
            return ReadResult::Format((*format).clone());
        }

        let Some(sample) = self.samples.pop_front() else {
            return ReadResult::Nothing;
        };
        self.largest_read_us = Some(
            self.largest_read_us
                .map_or(sample.time_us, |t| t.max(sample.time_us)),
        );
        let mut flags = sample.flags;
        if sample.time_us < decode_only_until_us {
            flags |= SampleFlags::DECODE_ONLY;
        }
        ReadResult::Sample(MediaSample {
            time_us: sample.time_us,
            flags,
            data: sample.data,
        })
    }

    fn skip_to_keyframe_before(&mut self, time_us: i64) -> bool {
        let Some(front) = self.samples.front() else {
            return false;
        };
        if time_us < front.time_us || self.largest_queued_us.is_some_and(|t| time_us > t) {
            return false;
        }
        let Some(keyframe) = self
            .samples
            .iter()
            .rposition(|s| s.time_us <= time_us && s.flags.contains(SampleFlags::KEYFRAME))
        else {
            return false;
        };
        for skipped in self.samples.drain(..keyframe) {
            self.largest_read_us = Some(
                self.largest_read_us
                    .map_or(skipped.time_us, |t| t.max(skipped.time_us)),
            );
        }
        true
    }

    fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn largest_queued_timestamp_us(&self) -> Option<i64> {
        self.largest_queued_us
    }

    fn enable(&mut self) {
        if !self.enabled {
            self.downstream_format = None;
            self.enabled = true;
        }
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.clear();
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn reset(&mut self, enable: bool) {
        if !self.enabled {
            self.downstream_format = None;
        }
        self.enabled = enable;
        self.clear();
    }

    fn splice(&mut self) {
        self.pending_splice = true;
    }

    fn set_source_id(&mut self, id: u64) {
        self.source_id = id;
    }

    fn peek_source_id(&self) -> u64 {
        self.samples.front().map_or(self.source_id, |s| s.source_id)
    }

    fn upstream_format(&self) -> Option<Format> {
        self.upstream_format.as_deref().cloned()
    }
}

impl fmt::Debug for DefaultSampleQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultSampleQueue")
            .field("samples", &self.samples.len())
            .field("source_id", &self.source_id)
            .field("enabled", &self.enabled)
            .field("largest_queued_us", &self.largest_queued_us)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use sheaf_core::mime;

    use super::*;

    const KEY: SampleFlags = SampleFlags::KEYFRAME;
    const DELTA: SampleFlags = SampleFlags::empty();

    #[fixture]
    fn queue() -> DefaultSampleQueue {
        let mut queue = DefaultSampleQueue::new(BytePool::new(16, 1024));
        queue.format(Format::new().with_sample_mime_type(mime::VIDEO_H264));
        queue
    }

    fn read_sample(queue: &mut DefaultSampleQueue, decode_only_until_us: i64) -> MediaSample {
        loop {
            match queue.read(false, decode_only_until_us) {
                ReadResult::Format(_) => continue,
                ReadResult::Sample(sample) => return sample,
                other => panic!("expected sample, got {other:?}"),
            }
        }
    }

    #[rstest]
    fn format_precedes_first_sample(mut queue: DefaultSampleQueue) {
        queue.append(0, KEY, b"idr");

        assert!(matches!(
            queue.read(false, 0),
            ReadResult::Format(f) if f.sample_mime_type.as_deref() == Some(mime::VIDEO_H264)
        ));
        let ReadResult::Sample(sample) = queue.read(false, 0) else {
            panic!("expected sample");
        };
        assert_eq!(&sample.data[..], b"idr");
        assert!(sample.is_keyframe());
        assert!(queue.is_empty());
    }

    #[rstest]
    fn empty_queue_waits_or_ends(mut queue: DefaultSampleQueue) {
        assert!(matches!(queue.read(false, 0), ReadResult::Nothing));
        assert!(matches!(queue.read(true, 0), ReadResult::EndOfStream));
    }

    #[rstest]
    fn samples_before_anchor_are_decode_only(mut queue: DefaultSampleQueue) {
        queue.append(0, KEY, b"a");
        queue.append(40_000, DELTA, b"b");

        assert!(read_sample(&mut queue, 40_000).is_decode_only());
        assert!(!read_sample(&mut queue, 40_000).is_decode_only());
    }

    #[rstest]
    fn leading_non_keyframes_are_dropped(mut queue: DefaultSampleQueue) {
        queue.append(0, DELTA, b"orphan");
        queue.append(40_000, KEY, b"idr");

        assert_eq!(read_sample(&mut queue, 0).time_us, 40_000);
    }

    #[rstest]
    fn format_change_is_reported_between_samples(mut queue: DefaultSampleQueue) {
        queue.append(0, KEY, b"a");
        queue.format(Format::new().with_sample_mime_type(mime::VIDEO_H265));
        queue.append(40_000, KEY, b"b");

        read_sample(&mut queue, 0);
        assert!(matches!(
            queue.read(false, 0),
            ReadResult::Format(f) if f.sample_mime_type.as_deref() == Some(mime::VIDEO_H265)
        ));
    }

    #[rstest]
    fn source_id_follows_unread_samples(mut queue: DefaultSampleQueue) {
        queue.set_source_id(1);
        queue.append(0, KEY, b"a");
        queue.set_source_id(2);
        queue.append(5_000_000, KEY, b"b");

        assert_eq!(queue.peek_source_id(), 1);
        read_sample(&mut queue, 0);
        assert_eq!(queue.peek_source_id(), 2);
        read_sample(&mut queue, 0);
        // Drained: reports the segment being written.
        assert_eq!(queue.peek_source_id(), 2);
    }

    #[rstest]
    fn disabled_queue_drops_everything(mut queue: DefaultSampleQueue) {
        queue.append(0, KEY, b"a");
        queue.disable();
        assert!(queue.is_empty());

        queue.append(40_000, KEY, b"b");
        assert!(queue.is_empty());
        assert_eq!(queue.largest_queued_timestamp_us(), None);

        queue.enable();
        queue.append(80_000, KEY, b"c");
        assert_eq!(queue.largest_queued_timestamp_us(), Some(80_000));
    }

    #[rstest]
    fn reset_clears_but_keeps_upstream_format(mut queue: DefaultSampleQueue) {
        queue.append(0, KEY, b"a");
        queue.reset(true);

        assert!(queue.is_empty());
        assert_eq!(queue.largest_queued_timestamp_us(), None);
        assert!(queue.upstream_format().is_some());
        assert!(queue.is_enabled());

        queue.reset(false);
        assert!(!queue.is_enabled());
    }

    #[rstest]
    fn splice_replaces_unread_overlap(mut queue: DefaultSampleQueue) {
        for (i, t) in [0, 1_000_000, 2_000_000, 3_000_000].into_iter().enumerate() {
            let flags = if i == 0 { KEY } else { DELTA };
            queue.append(t, flags, b"old");
        }
        queue.splice();
        // Non-keyframes are ignored while a splice is pending.
        queue.append(1_500_000, DELTA, b"new");
        queue.append(2_000_000, KEY, b"new");

        let times: Vec<_> = std::iter::from_fn(|| match queue.read(false, 0) {
            ReadResult::Format(_) => Some(None),
            ReadResult::Sample(s) => Some(Some((s.time_us, s.data.to_vec()))),
            _ => None,
        })
        .flatten()
        .collect();
        assert_eq!(
            times,
            vec![
                (0, b"old".to_vec()),
                (1_000_000, b"old".to_vec()),
                (2_000_000, b"new".to_vec()),
            ]
        );
    }

    #[rstest]
    fn splice_waits_for_keyframe_after_read_position(mut queue: DefaultSampleQueue) {
        queue.append(0, KEY, b"a");
        queue.append(1_000_000, DELTA, b"b");
        read_sample(&mut queue, 0);
        read_sample(&mut queue, 0);

        queue.splice();
        queue.append(500_000, KEY, b"too-early");
        assert!(queue.is_empty());
        queue.append(2_000_000, KEY, b"ok");
        assert_eq!(read_sample(&mut queue, 0).time_us, 2_000_000);
    }

    #[rstest]
    #[case(1_500_000, true, 1_000_000)]
    #[case(999_999, true, 0)]
    #[case(-1, false, 0)]
    #[case(9_000_000, false, 0)]
    fn skip_to_keyframe_before(
        mut queue: DefaultSampleQueue,
        #[case] target_us: i64,
        #[case] skipped: bool,
        #[case] next_us: i64,
    ) {
        queue.append(0, KEY, b"k0");
        queue.append(500_000, DELTA, b"d");
        queue.append(1_000_000, KEY, b"k1");
        queue.append(2_000_000, DELTA, b"d");

        assert_eq!(queue.skip_to_keyframe_before(target_us), skipped);
        assert_eq!(read_sample(&mut queue, 0).time_us, next_us);
    }

    #[rstest]
    fn sample_memory_returns_to_pool() {
        let pool = BytePool::new(4, 1024);
        let mut queue = DefaultSampleQueue::new(pool.clone());
        queue.format(Format::new());
        queue.append(0, KEY, b"payload");

        let sample = read_sample(&mut queue, 0);
        assert_eq!(pool.available(), 0);
        drop(sample);
        assert_eq!(pool.available(), 1);
    }
}
