use std::{
    fmt, thread,
    time::{Duration, Instant},
};

use kanal::{Receiver, Sender};
use sheaf_platform::ThreadPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{LoadError, LoaderError, LoaderResult, RetryPolicy};

/// Granularity of the cancellable back-off sleep.
const BACKOFF_TICK: Duration = Duration::from_millis(5);

/// Work the loader can run on a pool thread.
///
/// `load` should check `cancel` between blocking steps and return
/// [`LoadError::Canceled`] (or just return) once it is tripped.
pub trait Loadable: Send + 'static {
    fn load(&mut self, cancel: &CancellationToken) -> Result<(), LoadError>;
}

/// Outcome of one attempt, handed back with the task.
pub enum LoaderEvent<T> {
    Completed {
        task: T,
        load_duration: Duration,
    },
    Canceled {
        task: T,
        load_duration: Duration,
    },
    /// The attempt failed. The loader is idle again; the owner either drops
    /// `task` or passes it to [`Loader::retry`].
    Failed {
        task: T,
        error: LoadError,
        load_duration: Duration,
        error_count: u32,
    },
}

impl<T> fmt::Debug for LoaderEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { load_duration, .. } => f
                .debug_struct("Completed")
                .field("load_duration", load_duration)
                .finish_non_exhaustive(),
            Self::Canceled { load_duration, .. } => f
                .debug_struct("Canceled")
                .field("load_duration", load_duration)
                .finish_non_exhaustive(),
            Self::Failed {
                error,
                error_count,
                ..
            } => f
                .debug_struct("Failed")
                .field("error", error)
                .field("error_count", error_count)
                .finish_non_exhaustive(),
        }
    }
}

struct Outcome<T> {
    attempt: u64,
    task: T,
    result: Result<(), LoadError>,
    canceled: bool,
    finished_at: Instant,
}

struct InFlight {
    attempt: u64,
    cancel: CancellationToken,
    started_at: Instant,
    min_retry_count: u32,
    /// Retries exhausted: nothing runs, the slot stays taken.
    parked: bool,
}

struct ErrorState {
    count: u32,
    min_retry_count: u32,
    last: LoadError,
}

/// Runs one [`Loadable`] at a time.
///
/// Driven from one owner thread through `&mut self`. Loads run on the pool
/// and report back through a channel drained by [`poll`](Self::poll) or
/// [`wait`](Self::wait).
pub struct Loader<T: Loadable> {
    name: String,
    pool: ThreadPool,
    policy: RetryPolicy,
    tx: Sender<Outcome<T>>,
    rx: Receiver<Outcome<T>>,
    next_attempt: u64,
    in_flight: Option<InFlight>,
    errors: Option<ErrorState>,
    fatal: Option<LoaderError>,
    released: bool,
}

impl<T: Loadable> Loader<T> {
    pub fn new(name: impl Into<String>, pool: ThreadPool, policy: RetryPolicy) -> Self {
        let (tx, rx) = kanal::unbounded();
        Self {
            name: name.into(),
            pool,
            policy,
            tx,
            rx,
            next_attempt: 0,
            in_flight: None,
            errors: None,
            fatal: None,
            released: false,
        }
    }

    /// True from [`start_load`](Self::start_load) until its outcome has been
    /// taken, and forever once retries are exhausted.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start `task`. `min_retry_count` bounds [`retry`](Self::retry).
    ///
    /// # Panics
    ///
    /// Panics if a load is already in flight or the loader was released.
    pub fn start_load(&mut self, task: T, min_retry_count: u32) -> Instant {
        assert!(!self.released, "loader {} used after release", self.name);
        assert!(
            self.in_flight.is_none(),
            "loader {} already has a load in flight",
            self.name
        );
        self.errors = None;
        self.spawn(task, Duration::ZERO, min_retry_count)
    }

    /// Ask the running load to stop. The outcome still arrives as an event.
    pub fn cancel_load(&mut self) {
        if let Some(in_flight) = &self.in_flight {
            debug!(loader = %self.name, attempt = in_flight.attempt, "loader: cancel requested");
            in_flight.cancel.cancel();
        }
    }

    /// Re-run a task that came back as [`LoaderEvent::Failed`].
    ///
    /// Once the consecutive failure count exceeds the minimum retry count
    /// the loader turns fatal instead: the task is dropped, the slot stays
    /// busy and [`maybe_throw_error`](Self::maybe_throw_error) returns the
    /// error.
    ///
    /// # Panics
    ///
    /// Panics if no failed load is pending or another load is in flight.
    pub fn retry(&mut self, task: T) {
        assert!(
            self.in_flight.is_none(),
            "loader {} asked to retry while loading",
            self.name
        );
        let Some(errors) = &self.errors else {
            panic!("loader {} asked to retry without a failed load", self.name);
        };
        let count = errors.count;
        let min_retry_count = errors.min_retry_count;

        if count > min_retry_count {
            warn!(
                loader = %self.name,
                attempts = count,
                error = %errors.last,
                "loader: retries exhausted"
            );
            self.fatal = Some(LoaderError::RetriesExhausted {
                attempts: count,
                source: errors.last.clone(),
            });
            self.next_attempt += 1;
            self.in_flight = Some(InFlight {
                attempt: self.next_attempt,
                cancel: CancellationToken::new(),
                started_at: Instant::now(),
                min_retry_count,
                parked: true,
            });
            return;
        }

        let delay = self.policy.delay_for(count);
        debug!(
            loader = %self.name,
            error_count = count,
            delay_ms = delay.as_millis() as u64,
            "loader: retrying"
        );
        self.spawn(task, delay, min_retry_count);
    }

    /// The fatal error, once retries have been exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::RetriesExhausted`] after the last allowed
    /// attempt failed.
    pub fn maybe_throw_error(&self) -> LoaderResult<()> {
        match &self.fatal {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Cancel whatever runs and ignore every outcome from now on.
    pub fn release(&mut self) {
        self.cancel_load();
        self.released = true;
        self.in_flight = None;
        self.errors = None;
        debug!(loader = %self.name, "loader: released");
    }

    /// Take the next outcome if one has arrived.
    pub fn poll(&mut self) -> Option<LoaderEvent<T>> {
        while let Ok(Some(outcome)) = self.rx.try_recv() {
            if let Some(event) = self.accept(outcome) {
                return Some(event);
            }
        }
        None
    }

    /// Block up to `timeout` for the next outcome.
    ///
    /// Returns immediately with `None` when nothing can arrive.
    pub fn wait(&mut self, timeout: Duration) -> Option<LoaderEvent<T>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.poll() {
                return Some(event);
            }
            match &self.in_flight {
                Some(in_flight) if !in_flight.parked => {}
                _ => return None,
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match self.rx.recv_timeout(remaining) {
                Ok(outcome) => {
                    if let Some(event) = self.accept(outcome) {
                        return Some(event);
                    }
                }
                Err(_) => return None,
            }
        }
    }

    fn spawn(&mut self, task: T, delay: Duration, min_retry_count: u32) -> Instant {
        self.next_attempt += 1;
        let attempt = self.next_attempt;
        let cancel = CancellationToken::new();
        let started_at = Instant::now();
        self.in_flight = Some(InFlight {
            attempt,
            cancel: cancel.clone(),
            started_at,
            min_retry_count,
            parked: false,
        });

        trace!(loader = %self.name, attempt, "loader: spawning");
        let tx = self.tx.clone();
        self.pool.spawn(move || {
            let mut task = task;
            if !delay.is_zero() {
                sleep_cancellable(delay, &cancel);
            }
            let result = if cancel.is_cancelled() {
                Err(LoadError::Canceled)
            } else {
                task.load(&cancel)
            };
            let canceled = cancel.is_cancelled() || matches!(result, Err(LoadError::Canceled));
            let _ = tx.send(Outcome {
                attempt,
                task,
                result,
                canceled,
                finished_at: Instant::now(),
            });
        });
        started_at
    }

    fn accept(&mut self, outcome: Outcome<T>) -> Option<LoaderEvent<T>> {
        if self.released {
            return None;
        }
        let in_flight = match self.in_flight.take() {
            Some(in_flight) if in_flight.attempt == outcome.attempt => in_flight,
            other => {
                trace!(
                    loader = %self.name,
                    attempt = outcome.attempt,
                    "loader: stale outcome dropped"
                );
                self.in_flight = other;
                return None;
            }
        };
        let load_duration = outcome
            .finished_at
            .saturating_duration_since(in_flight.started_at);
        let task = outcome.task;

        // A cancel requested before the outcome is taken wins over it.
        if outcome.canceled || in_flight.cancel.is_cancelled() {
            self.errors = None;
            return Some(LoaderEvent::Canceled {
                task,
                load_duration,
            });
        }
        match outcome.result {
            Ok(()) => {
                self.errors = None;
                Some(LoaderEvent::Completed {
                    task,
                    load_duration,
                })
            }
            Err(error) => {
                let error_count = self.errors.as_ref().map_or(0, |e| e.count) + 1;
                self.errors = Some(ErrorState {
                    count: error_count,
                    min_retry_count: in_flight.min_retry_count,
                    last: error.clone(),
                });
                Some(LoaderEvent::Failed {
                    task,
                    error,
                    load_duration,
                    error_count,
                })
            }
        }
    }
}

impl<T: Loadable> Drop for Loader<T> {
    fn drop(&mut self) {
        if let Some(in_flight) = &self.in_flight {
            in_flight.cancel.cancel();
        }
    }
}

impl<T: Loadable> fmt::Debug for Loader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("name", &self.name)
            .field("loading", &self.is_loading())
            .field("fatal", &self.fatal)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

fn sleep_cancellable(delay: Duration, cancel: &CancellationToken) {
    let deadline = Instant::now() + delay;
    while !cancel.is_cancelled() {
        let Some(left) = deadline.checked_duration_since(Instant::now()) else {
            return;
        };
        if left.is_zero() {
            return;
        }
        thread::sleep(left.min(BACKOFF_TICK));
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering},
        },
    };

    use rstest::rstest;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    struct ScriptedTask {
        script: VecDeque<Result<(), LoadError>>,
        runs: Arc<AtomicU32>,
        block_until_cancel: bool,
    }

    impl ScriptedTask {
        fn new(script: Vec<Result<(), LoadError>>) -> (Self, Arc<AtomicU32>) {
            let runs = Arc::new(AtomicU32::new(0));
            let task = Self {
                script: script.into(),
                runs: Arc::clone(&runs),
                block_until_cancel: false,
            };
            (task, runs)
        }

        fn blocking() -> Self {
            Self {
                script: VecDeque::new(),
                runs: Arc::new(AtomicU32::new(0)),
                block_until_cancel: true,
            }
        }
    }

    impl Loadable for ScriptedTask {
        fn load(&mut self, cancel: &CancellationToken) -> Result<(), LoadError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.block_until_cancel {
                while !cancel.is_cancelled() {
                    thread::sleep(Duration::from_millis(1));
                }
                return Err(LoadError::Canceled);
            }
            self.script.pop_front().unwrap_or(Ok(()))
        }
    }

    fn loader() -> Loader<ScriptedTask> {
        Loader::new(
            "test",
            ThreadPool::with_num_threads(2).unwrap(),
            RetryPolicy::immediate(),
        )
    }

    fn fail() -> Result<(), LoadError> {
        Err(LoadError::HttpStatus(503))
    }

    #[rstest]
    #[timeout(Duration::from_secs(10))]
    fn completed_load_frees_the_slot() {
        let mut loader = loader();
        let (task, runs) = ScriptedTask::new(vec![Ok(())]);

        loader.start_load(task, 3);
        assert!(loader.is_loading());

        let event = loader.wait(WAIT).unwrap();
        assert!(matches!(event, LoaderEvent::Completed { .. }));
        assert!(!loader.is_loading());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(loader.maybe_throw_error().is_ok());
    }

    #[test]
    #[should_panic(expected = "already has a load in flight")]
    fn second_start_while_loading_panics() {
        let mut loader = loader();
        loader.start_load(ScriptedTask::blocking(), 0);
        loader.start_load(ScriptedTask::blocking(), 0);
    }

    #[rstest]
    #[timeout(Duration::from_secs(10))]
    fn cancel_is_observed_through_event() {
        let mut loader = loader();
        loader.start_load(ScriptedTask::blocking(), 0);
        loader.cancel_load();

        // Still busy until the event is taken.
        assert!(loader.is_loading());
        let event = loader.wait(WAIT).unwrap();
        assert!(matches!(event, LoaderEvent::Canceled { .. }));
        assert!(!loader.is_loading());
    }

    #[rstest]
    #[timeout(Duration::from_secs(10))]
    fn failed_load_can_be_retried() {
        let mut loader = loader();
        let (task, runs) = ScriptedTask::new(vec![fail(), Ok(())]);
        loader.start_load(task, 3);

        let LoaderEvent::Failed {
            task, error_count, ..
        } = loader.wait(WAIT).unwrap()
        else {
            panic!("expected failure");
        };
        assert_eq!(error_count, 1);
        assert!(!loader.is_loading());

        loader.retry(task);
        assert!(loader.is_loading());
        assert!(matches!(
            loader.wait(WAIT).unwrap(),
            LoaderEvent::Completed { .. }
        ));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[rstest]
    #[timeout(Duration::from_secs(10))]
    fn retries_exhausted_turns_fatal() {
        let mut loader = loader();
        let (task, runs) = ScriptedTask::new(vec![fail(), fail(), fail()]);
        loader.start_load(task, 1);

        // Test 1: first failure is retried.
        let LoaderEvent::Failed { task, .. } = loader.wait(WAIT).unwrap() else {
            panic!("expected failure");
        };
        loader.retry(task);
        assert!(loader.maybe_throw_error().is_ok());

        // Test 2: second failure exceeds the minimum retry count.
        let LoaderEvent::Failed {
            task, error_count, ..
        } = loader.wait(WAIT).unwrap()
        else {
            panic!("expected failure");
        };
        assert_eq!(error_count, 2);
        loader.retry(task);

        // Test 3: loader is fatal and stays busy.
        assert!(matches!(
            loader.maybe_throw_error(),
            Err(LoaderError::RetriesExhausted { attempts: 2, .. })
        ));
        assert!(loader.is_loading());
        assert!(loader.wait(Duration::from_millis(10)).is_none());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[rstest]
    #[timeout(Duration::from_secs(10))]
    fn backoff_delay_is_cancellable() {
        let mut loader = Loader::new(
            "slow-retry",
            ThreadPool::with_num_threads(1).unwrap(),
            RetryPolicy::new(Duration::from_secs(60), Duration::from_secs(60)),
        );
        let (task, runs) = ScriptedTask::new(vec![fail(), fail()]);
        loader.start_load(task, 5);
        let LoaderEvent::Failed { task, .. } = loader.wait(WAIT).unwrap() else {
            panic!("expected failure");
        };

        // Second failure would wait 60s; the first retry is immediate.
        loader.retry(task);
        let LoaderEvent::Failed { task, .. } = loader.wait(WAIT).unwrap() else {
            panic!("expected failure");
        };
        loader.retry(task);
        loader.cancel_load();

        assert!(matches!(
            loader.wait(WAIT).unwrap(),
            LoaderEvent::Canceled { .. }
        ));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[rstest]
    #[timeout(Duration::from_secs(10))]
    fn cancel_before_outcome_is_taken_wins() {
        let mut loader = loader();
        let (task, _runs) = ScriptedTask::new(vec![fail()]);
        loader.start_load(task, 3);
        // Let the attempt finish, then cancel before draining.
        while loader.rx.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        loader.cancel_load();

        assert!(matches!(
            loader.wait(WAIT).unwrap(),
            LoaderEvent::Canceled { .. }
        ));
    }

    #[rstest]
    #[timeout(Duration::from_secs(10))]
    fn release_discards_outcomes() {
        let mut loader = loader();
        loader.start_load(ScriptedTask::blocking(), 0);
        loader.release();

        assert!(!loader.is_loading());
        assert!(loader.wait(Duration::from_millis(50)).is_none());
    }
}
