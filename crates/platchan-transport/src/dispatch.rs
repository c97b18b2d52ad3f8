//! Bounded worker pool for inbound dispatch.
//!
//! The boundary thread only enqueues; handlers run on pool workers. The
//! queue is bounded, so a flood of slow handlers either gets rejected
//! ([`Overflow::Reject`]) or pushes back on the boundary thread
//! ([`Overflow::Block`]).
//!
//! Each channel gets its own lane. At most `max_per_channel` dispatches of
//! one channel run at a time; the rest wait in that channel's backlog and are
//! picked up by the worker that finishes the channel's previous dispatch. The
//! cap defaults to one less than the worker count, so a channel whose
//! handlers all block can never take the last worker away from the others.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace};

/// Default number of dispatch workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default number of dispatches that may wait for a free worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// What to do when the dispatch queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    /// Refuse the message; a reply-expecting message gets the handler's
    /// overload reply.
    #[default]
    Reject,
    /// Block the delivering thread until a slot frees up.
    Block,
}

/// Configuration for the inbound dispatch pool.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Number of worker threads. Clamped to at least 1.
    pub workers: usize,
    /// Bounded queue length in front of the workers. Clamped to at least 1.
    pub queue_capacity: usize,
    /// Behavior when the queue is full.
    pub overflow: Overflow,
    /// Dispatches of a single channel allowed to run at once. `None` means
    /// `workers - 1`. Clamped to `1..=workers`.
    pub max_per_channel: Option<usize>,
    /// Log a warning when a single dispatch runs longer than this.
    pub slow_handler_warning: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: Overflow::Reject,
            max_per_channel: None,
            slow_handler_warning: Some(Duration::from_secs(5)),
        }
    }
}

impl DispatchConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_overflow(mut self, overflow: Overflow) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_max_per_channel(mut self, max: usize) -> Self {
        self.max_per_channel = Some(max);
        self
    }

    fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    /// Effective per-channel in-flight cap.
    pub fn channel_limit(&self) -> usize {
        let workers = self.worker_count();
        self.max_per_channel
            .unwrap_or(workers - 1)
            .clamp(1, workers)
    }
}

/// Point-in-time dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Accepted but not yet picked up by a worker.
    pub queued: usize,
    /// Currently executing on a worker.
    pub in_flight: usize,
    /// Finished, successfully or not.
    pub completed: u64,
    /// Refused because the queue was full or the pool was closed.
    pub rejected: u64,
    /// Finished with a channel-level failure.
    pub failed: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            queued: self.queued.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// A job that belongs to a lane.
pub(crate) trait Keyed {
    fn key(&self) -> &str;
}

/// Why a job did not make it into the queue. Carries the job back.
pub(crate) enum SubmitError<T> {
    Full(T),
    Closed(T),
}

struct Lane<T> {
    running: usize,
    backlog: VecDeque<T>,
}

impl<T> Default for Lane<T> {
    fn default() -> Self {
        Self {
            running: 0,
            backlog: VecDeque::new(),
        }
    }
}

struct State<T> {
    ready: Option<Sender<T>>,
    /// Accepted jobs not yet started, in the ready queue or a backlog.
    pending: usize,
    lanes: HashMap<String, Lane<T>>,
}

struct Lanes<T> {
    state: Mutex<State<T>>,
    slot_freed: Condvar,
    capacity: usize,
    channel_limit: usize,
    counters: Counters,
}

impl<T> Lanes<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A job is leaving the queue for a worker.
    fn started(&self, state: &mut State<T>) {
        state.pending -= 1;
        self.counters.queued.fetch_sub(1, Ordering::Relaxed);
        self.counters.in_flight.fetch_add(1, Ordering::Relaxed);
        self.slot_freed.notify_one();
    }
}

pub(crate) struct DispatchPool<T> {
    lanes: Arc<Lanes<T>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    overflow: Overflow,
}

impl<T: Keyed + Send + 'static> DispatchPool<T> {
    pub(crate) fn start(
        config: &DispatchConfig,
        run: Arc<dyn Fn(T) -> bool + Send + Sync>,
    ) -> std::io::Result<Self> {
        let capacity = config.queue_capacity.max(1);
        // Every job in the ready queue is also counted in `pending`, so the
        // ready queue never fills before admission refuses.
        let (tx, rx) = crossbeam_channel::bounded::<T>(capacity);
        let lanes = Arc::new(Lanes {
            state: Mutex::new(State {
                ready: Some(tx),
                pending: 0,
                lanes: HashMap::new(),
            }),
            slot_freed: Condvar::new(),
            capacity,
            channel_limit: config.channel_limit(),
            counters: Counters::default(),
        });

        let mut workers = Vec::with_capacity(config.worker_count());
        for index in 0..config.worker_count() {
            let rx = rx.clone();
            let run = Arc::clone(&run);
            let lanes = Arc::clone(&lanes);
            let handle = thread::Builder::new()
                .name(format!("platchan-dispatch-{index}"))
                .spawn(move || worker_loop(&rx, run.as_ref(), &lanes))?;
            workers.push(handle);
        }
        debug!(
            workers = workers.len(),
            channel_limit = lanes.channel_limit,
            "dispatch pool started"
        );

        Ok(Self {
            lanes,
            workers: Mutex::new(workers),
            overflow: config.overflow,
        })
    }

    pub(crate) fn submit(&self, job: T) -> Result<(), SubmitError<T>> {
        let lanes = &self.lanes;
        let mut state = lanes.lock();

        loop {
            if state.ready.is_none() {
                lanes.counters.record_rejected();
                return Err(SubmitError::Closed(job));
            }
            if state.pending < lanes.capacity {
                break;
            }
            match self.overflow {
                Overflow::Reject => {
                    lanes.counters.record_rejected();
                    return Err(SubmitError::Full(job));
                }
                Overflow::Block => {
                    state = lanes
                        .slot_freed
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }

        let state = &mut *state;
        let lane = state.lanes.entry(job.key().to_owned()).or_default();
        if lane.running >= lanes.channel_limit {
            trace!(channel = job.key(), backlog = lane.backlog.len() + 1, "channel at limit; holding dispatch");
            lane.backlog.push_back(job);
        } else {
            let Some(ready) = &state.ready else {
                lanes.counters.record_rejected();
                return Err(SubmitError::Closed(job));
            };
            if let Err(err) = ready.try_send(job) {
                // Only reachable when every worker is gone.
                lanes.counters.record_rejected();
                return Err(SubmitError::Closed(err.into_inner()));
            }
            lane.running += 1;
        }
        state.pending += 1;
        lanes.counters.queued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.lanes.counters
    }

    /// Stop accepting work, let queued jobs drain, and join the workers.
    ///
    /// Safe to call from a worker thread; that worker is simply not joined.
    pub(crate) fn close(&self) {
        self.lanes.lock().ready.take();
        self.lanes.slot_freed.notify_all();
        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() != current {
                let _ = worker.join();
            }
        }
    }
}

impl<T> Drop for DispatchPool<T> {
    /// Lets idle workers exit once the queue drains, without joining them.
    fn drop(&mut self) {
        self.lanes.lock().ready.take();
        self.lanes.slot_freed.notify_all();
    }
}

fn worker_loop<T: Keyed>(
    rx: &Receiver<T>,
    run: &(dyn Fn(T) -> bool + Send + Sync),
    lanes: &Lanes<T>,
) {
    while let Ok(first) = rx.recv() {
        lanes.started(&mut lanes.lock());
        let mut job = first;
        loop {
            let key = job.key().to_owned();
            if !run(job) {
                lanes.counters.record_failed();
            }
            lanes.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
            lanes.counters.completed.fetch_add(1, Ordering::Relaxed);

            // Keep the lane slot and take the channel's next held dispatch,
            // or give the slot back.
            let mut state = lanes.lock();
            let Some(lane) = state.lanes.get_mut(&key) else {
                break;
            };
            match lane.backlog.pop_front() {
                Some(next) => {
                    job = next;
                    lanes.started(&mut state);
                }
                None => {
                    lane.running -= 1;
                    if lane.running == 0 {
                        state.lanes.remove(&key);
                    }
                    break;
                }
            }
        }
    }
    debug!("dispatch worker exiting");
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::channel;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Job {
        channel: &'static str,
        n: u32,
    }

    impl Job {
        fn on(channel: &'static str, n: u32) -> Self {
            Self { channel, n }
        }
    }

    impl Keyed for Job {
        fn key(&self) -> &str {
            self.channel
        }
    }

    #[test]
    fn runs_jobs_on_workers() {
        let (tx, rx) = channel();
        let tx = Mutex::new(tx);
        let pool = DispatchPool::<Job>::start(
            &DispatchConfig::default().with_workers(2),
            Arc::new(move |job: Job| tx.lock().unwrap().send(job.n * 2).is_ok()),
        )
        .unwrap();

        for n in 0..10 {
            let channel = if n % 2 == 0 { "even" } else { "odd" };
            assert!(pool.submit(Job::on(channel, n)).is_ok());
        }
        let mut results: Vec<u32> = (0..10).map(|_| rx.recv().unwrap()).collect();
        results.sort_unstable();
        assert_eq!(results, (0..10).map(|n| n * 2).collect::<Vec<_>>());

        pool.close();
        assert_eq!(pool.counters().snapshot().completed, 10);
    }

    #[test]
    fn channel_limit_defaults_below_worker_count() {
        assert_eq!(DispatchConfig::default().channel_limit(), DEFAULT_WORKERS - 1);
        assert_eq!(DispatchConfig::default().with_workers(1).channel_limit(), 1);
        assert_eq!(DispatchConfig::default().with_workers(0).channel_limit(), 1);
        assert_eq!(
            DispatchConfig::default().with_workers(2).with_max_per_channel(8).channel_limit(),
            2
        );
        assert_eq!(
            DispatchConfig::default().with_max_per_channel(0).channel_limit(),
            1
        );
    }

    #[test]
    fn reject_when_queue_full() {
        let (release_tx, release_rx) = channel::<()>();
        let (started_tx, started_rx) = channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let started_tx = Mutex::new(started_tx);
        let pool = DispatchPool::<Job>::start(
            &DispatchConfig::default()
                .with_workers(1)
                .with_queue_capacity(1),
            Arc::new(move |_: Job| {
                started_tx.lock().unwrap().send(()).unwrap();
                release_rx.lock().unwrap().recv().is_ok()
            }),
        )
        .unwrap();

        assert!(pool.submit(Job::on("a", 1)).is_ok());
        started_rx.recv().unwrap();
        assert!(pool.submit(Job::on("a", 2)).is_ok());
        match pool.submit(Job::on("b", 3)) {
            Err(SubmitError::Full(job)) => assert_eq!(job, Job::on("b", 3)),
            _ => panic!("expected full queue"),
        }
        assert_eq!(pool.counters().snapshot().rejected, 1);
        assert_eq!(pool.counters().snapshot().in_flight, 1);
        assert_eq!(pool.counters().snapshot().queued, 1);

        release_tx.send(()).unwrap();
        started_rx.recv().unwrap();
        release_tx.send(()).unwrap();
        pool.close();
        assert_eq!(pool.counters().snapshot().completed, 2);
    }

    #[test]
    fn blocked_channel_leaves_a_worker_free() {
        let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();
        let (done_tx, done_rx) = channel::<Job>();
        let done_tx = Mutex::new(done_tx);
        let pool = DispatchPool::<Job>::start(
            &DispatchConfig::default().with_workers(3),
            Arc::new(move |job: Job| {
                if job.channel == "stuck" {
                    let _ = release_rx.recv();
                }
                done_tx.lock().unwrap().send(job).is_ok()
            }),
        )
        .unwrap();

        for n in 0..6 {
            assert!(pool.submit(Job::on("stuck", n)).is_ok());
        }
        assert!(pool.submit(Job::on("free", 99)).is_ok());
        let done = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(done, Job::on("free", 99));
        assert!(done_rx.try_recv().is_err());

        for _ in 0..6 {
            release_tx.send(()).unwrap();
        }
        pool.close();
        assert_eq!(pool.counters().snapshot().completed, 7);
    }

    #[test]
    fn blocking_submit_waits_for_a_slot() {
        let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();
        let (started_tx, started_rx) = crossbeam_channel::unbounded::<u32>();
        let pool = Arc::new(
            DispatchPool::<Job>::start(
                &DispatchConfig::default()
                    .with_workers(1)
                    .with_queue_capacity(1)
                    .with_overflow(Overflow::Block),
                Arc::new(move |job: Job| {
                    let _ = started_tx.send(job.n);
                    release_rx.recv().is_ok()
                }),
            )
            .unwrap(),
        );

        assert!(pool.submit(Job::on("a", 1)).is_ok());
        assert_eq!(started_rx.recv().unwrap(), 1);
        assert!(pool.submit(Job::on("a", 2)).is_ok());

        let blocked = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.submit(Job::on("a", 3)).is_ok())
        };
        assert!(started_rx.recv_timeout(Duration::from_millis(100)).is_err());

        release_tx.send(()).unwrap();
        assert_eq!(started_rx.recv().unwrap(), 2);
        assert!(blocked.join().unwrap());

        release_tx.send(()).unwrap();
        assert_eq!(started_rx.recv().unwrap(), 3);
        release_tx.send(()).unwrap();
        pool.close();
        assert_eq!(pool.counters().snapshot().completed, 3);
    }

    #[test]
    fn submit_after_close_returns_job() {
        let pool = DispatchPool::<Job>::start(&DispatchConfig::default(), Arc::new(|_: Job| true)).unwrap();
        pool.close();
        assert!(matches!(pool.submit(Job::on("a", 7)), Err(SubmitError::Closed(Job { n: 7, .. }))));
    }
}
