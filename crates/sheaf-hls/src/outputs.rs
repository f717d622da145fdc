use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use sheaf_core::Format;
use sheaf_platform::{Mutex, RwLock};
use tracing::debug;

use crate::sample_queue::{QueueFactory, SampleQueue};

/// One stream's queue, shared between the loading and consuming sides.
pub type SharedQueue = Arc<Mutex<Box<dyn SampleQueue>>>;

struct Slot {
    id: u32,
    queue: SharedQueue,
}

/// Sample sink handed to media payloads: the per-stream queues of one
/// bundle, keyed by the demuxer's stream id.
///
/// Streams are created on first reference and kept in discovery order,
/// which is also the order track groups are derived in.
pub struct TrackOutputs {
    slots: RwLock<Vec<Slot>>,
    factory: QueueFactory,
    upstream_id: AtomicU64,
    built: AtomicBool,
}

impl TrackOutputs {
    #[must_use]
    pub fn new(factory: QueueFactory) -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            factory,
            upstream_id: AtomicU64::new(0),
            built: AtomicBool::new(false),
        }
    }

    /// Queue for stream `id`, created on first use and tagged with the
    /// segment currently being loaded.
    pub fn track(&self, id: u32) -> SharedQueue {
        if let Some(slot) = self.slots.read().iter().find(|s| s.id == id) {
            return Arc::clone(&slot.queue);
        }
        let mut slots = self.slots.write();
        if let Some(slot) = slots.iter().find(|s| s.id == id) {
            return Arc::clone(&slot.queue);
        }
        let mut queue = (self.factory)();
        queue.set_source_id(self.upstream_id.load(Ordering::Acquire));
        let queue: SharedQueue = Arc::new(Mutex::new(queue));
        slots.push(Slot {
            id,
            queue: Arc::clone(&queue),
        });
        debug!(track_id = id, index = slots.len() - 1, "outputs: stream discovered");
        queue
    }

    /// The demuxer has declared every stream it will produce.
    pub fn end_tracks(&self) {
        if !self.built.swap(true, Ordering::AcqRel) {
            debug!(streams = self.len(), "outputs: streams complete");
        }
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        self.built.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Queue at discovery position `index`.
    #[must_use]
    pub fn queue_at(&self, index: usize) -> Option<SharedQueue> {
        self.slots.read().get(index).map(|s| Arc::clone(&s.queue))
    }

    /// Snapshot of all queues in discovery order.
    #[must_use]
    pub fn queues(&self) -> Vec<SharedQueue> {
        self.slots
            .read()
            .iter()
            .map(|s| Arc::clone(&s.queue))
            .collect()
    }

    /// Stream ids in discovery order.
    #[must_use]
    pub fn track_ids(&self) -> Vec<u32> {
        self.slots.read().iter().map(|s| s.id).collect()
    }

    /// Every stream's declared format, or `None` while any is unknown.
    #[must_use]
    pub fn upstream_formats(&self) -> Option<Vec<Format>> {
        self.queues()
            .iter()
            .map(|queue| queue.lock().upstream_format())
            .collect()
    }

    /// Start feeding segment `uid`: tag every queue with it and, for a
    /// splice-in segment, mark a splice point.
    pub(crate) fn init(&self, uid: u64, splice_in: bool) {
        self.upstream_id.store(uid, Ordering::Release);
        for queue in self.queues() {
            let mut queue = queue.lock();
            queue.set_source_id(uid);
            if splice_in {
                queue.splice();
            }
        }
    }
}

impl fmt::Debug for TrackOutputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackOutputs")
            .field("track_ids", &self.track_ids())
            .field("built", &self.is_built())
            .field("upstream_id", &self.upstream_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
