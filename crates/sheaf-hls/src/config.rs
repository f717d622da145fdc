use std::fmt;

use sheaf_bufpool::BytePool;
use sheaf_core::{Format, TrackType};
use sheaf_events::EventBus;
use sheaf_loader::RetryPolicy;
use sheaf_platform::ThreadPool;

use crate::sample_queue::QueueFactory;

/// Configuration for one [`TrackBundle`](crate::TrackBundle).
#[derive(Clone)]
pub struct BundleConfig {
    /// Reported with every event.
    pub track_type: TrackType,
    /// Initial seek anchor; loading starts here.
    pub start_position_us: i64,
    /// Consecutive failures of one unit tolerated before the loader turns
    /// fatal. Default: 3.
    pub min_retry_count: u32,
    /// Delay between retries of one unit.
    pub retry: RetryPolicy,
    /// Container info for audio muxed into every variant.
    pub muxed_audio_format: Option<Format>,
    /// Container info for CEA-608 captions muxed into every variant.
    pub muxed_caption_format: Option<Format>,
    /// Event bus (created internally if not provided).
    pub events: Option<EventBus>,
    /// Capacity of the internally created bus.
    pub events_channel_capacity: usize,
    /// Sample memory (global pool if not provided).
    pub pool: Option<BytePool>,
    /// Queue constructor (pooled [`DefaultSampleQueue`](crate::DefaultSampleQueue)
    /// if not provided).
    pub queue_factory: Option<QueueFactory>,
    /// Where loads run. Defaults to the global rayon pool.
    pub thread_pool: ThreadPool,
    /// Name used in logs.
    pub name: Option<String>,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            track_type: TrackType::Default,
            start_position_us: 0,
            min_retry_count: 3,
            retry: RetryPolicy::default(),
            muxed_audio_format: None,
            muxed_caption_format: None,
            events: None,
            events_channel_capacity: 64,
            pool: None,
            queue_factory: None,
            thread_pool: ThreadPool::default(),
            name: None,
        }
    }
}

impl fmt::Debug for BundleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleConfig")
            .field("track_type", &self.track_type)
            .field("start_position_us", &self.start_position_us)
            .field("min_retry_count", &self.min_retry_count)
            .field("retry", &self.retry)
            .field("muxed_audio_format", &self.muxed_audio_format)
            .field("muxed_caption_format", &self.muxed_caption_format)
            .field("events", &self.events.as_ref().map(|_| "EventBus"))
            .field("events_channel_capacity", &self.events_channel_capacity)
            .field("pool", &self.pool)
            .field("queue_factory", &self.queue_factory.as_ref().map(|_| "QueueFactory"))
            .field("thread_pool", &self.thread_pool)
            .field("name", &self.name)
            .finish()
    }
}

impl BundleConfig {
    #[must_use]
    pub fn new(track_type: TrackType) -> Self {
        Self {
            track_type,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_start_position_us(mut self, position_us: i64) -> Self {
        self.start_position_us = position_us;
        self
    }

    #[must_use]
    pub fn with_min_retry_count(mut self, count: u32) -> Self {
        self.min_retry_count = count;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_muxed_audio_format(mut self, format: Format) -> Self {
        self.muxed_audio_format = Some(format);
        self
    }

    #[must_use]
    pub fn with_muxed_caption_format(mut self, format: Format) -> Self {
        self.muxed_caption_format = Some(format);
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn with_pool(mut self, pool: BytePool) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn with_queue_factory(mut self, factory: QueueFactory) -> Self {
        self.queue_factory = Some(factory);
        self
    }

    #[must_use]
    pub fn with_thread_pool(mut self, pool: ThreadPool) -> Self {
        self.thread_pool = pool;
        self
    }

    #[must_use]
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }
}
