//! Notification-driven background workers.
//!
//! A [`Worker`] owns a tokio task that sleeps until notified, then runs its
//! [`WorkHandler`] on the blocking pool. Notifications that arrive while a run
//! is in progress coalesce into exactly one further run.

use std::sync::Arc;

use consensus_core::errors::{ConsensusError, ConsensusResult};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::WorkerConfig;

const EVENT_CAPACITY: usize = 64;

/// Shared cancellation flag, checked between units of work.
#[derive(Clone, Debug)]
pub struct CancelToken {
    flag: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self { flag: Arc::new(flag) }
    }

    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        // the sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Latch shared by cooperating workers. The first fatal error is kept and
/// halts every worker holding the flag.
#[derive(Clone, Debug, Default)]
pub struct FailureFlag {
    error: Arc<Mutex<Option<ConsensusError>>>,
    halt: CancelToken,
}

impl FailureFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `err` unless an earlier failure is already recorded.
    pub fn fail(&self, err: ConsensusError) {
        self.error.lock().get_or_insert(err);
        self.halt.cancel();
    }

    pub fn is_failed(&self) -> bool {
        self.halt.is_cancelled()
    }

    pub fn error(&self) -> Option<ConsensusError> {
        self.error.lock().clone()
    }

    /// Resolves once a failure has been recorded.
    pub async fn failed(&self) {
        self.halt.cancelled().await
    }
}

/// A unit of repeatable work run by a [`Worker`].
pub trait WorkHandler: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Runs once. Non-fatal errors are logged and the worker keeps going;
    /// fatal ones trip the [`FailureFlag`] and panic the worker task.
    fn work(&self, cancel: &CancelToken) -> ConsensusResult<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerEvent {
    WorkStarted { worker: &'static str },
    WorkStopped { worker: &'static str },
}

pub struct Worker {
    name: &'static str,
    notify: Arc<Notify>,
    cancel: CancelToken,
    failure: FailureFlag,
    events: broadcast::Sender<WorkerEvent>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Spawns the worker loop on the current tokio runtime.
    pub fn start<H: WorkHandler>(handler: Arc<H>, config: WorkerConfig) -> Self {
        Self::start_with(handler, config, Arc::new(Notify::new()), FailureFlag::new())
    }

    /// Like [`Worker::start`], waking on an existing `notify` and sharing
    /// `failure` with other workers.
    pub fn start_with<H: WorkHandler>(
        handler: Arc<H>,
        config: WorkerConfig,
        notify: Arc<Notify>,
        failure: FailureFlag,
    ) -> Self {
        let name = handler.name();
        let cancel = CancelToken::new();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        if config.initial_notify {
            notify.notify_one();
        }
        let handle = tokio::spawn(run(handler, config, notify.clone(), cancel.clone(), failure.clone(), events.clone()));
        debug!("Worker {} started", name);

        Self { name, notify, cancel, failure, events, handle: Mutex::new(Some(handle)) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Requests a run. Repeated requests before the run starts collapse into one.
    pub fn notify_work(&self) {
        self.notify.notify_one();
    }

    /// A cheap handle that observer callbacks can use to wake this worker.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The fatal error that halted this worker or one sharing its flag.
    pub fn failure(&self) -> Option<ConsensusError> {
        self.failure.error()
    }

    /// True once the worker loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.lock().as_ref().map_or(true, |handle| handle.is_finished())
    }

    /// Cancels any run in progress and waits for the loop to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!("Worker {} terminated abnormally: {}", self.name, err);
            }
        }
        debug!("Worker {} stopped", self.name);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<H: WorkHandler>(
    handler: Arc<H>,
    config: WorkerConfig,
    notify: Arc<Notify>,
    cancel: CancelToken,
    failure: FailureFlag,
    events: broadcast::Sender<WorkerEvent>,
) {
    let name = handler.name();
    let min_idle = config.min_idle_time();
    let max_idle = config.max_idle_time();

    loop {
        let woken = match max_idle {
            Some(max_idle) => tokio::select! {
                _ = notify.notified() => true,
                _ = tokio::time::sleep(max_idle) => true,
                _ = cancel.cancelled() => false,
                _ = failure.failed() => false,
            },
            None => tokio::select! {
                _ = notify.notified() => true,
                _ = cancel.cancelled() => false,
                _ = failure.failed() => false,
            },
        };
        if !woken || cancel.is_cancelled() || failure.is_failed() {
            break;
        }

        let _ = events.send(WorkerEvent::WorkStarted { worker: name });
        let work_handler = handler.clone();
        let work_cancel = cancel.clone();
        let result = tokio::task::spawn_blocking(move || work_handler.work(&work_cancel)).await;
        let _ = events.send(WorkerEvent::WorkStopped { worker: name });

        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.is_fatal() => {
                error!("Worker {} hit a fatal error: {}", name, err);
                failure.fail(err.clone());
                panic!("worker {name} failed: {err}");
            }
            Ok(Err(err)) => warn!("Worker {} run failed: {}", name, err),
            Err(join_err) => match join_err.try_into_panic() {
                Ok(payload) => {
                    error!("Worker {} panicked", name);
                    failure.fail(ConsensusError::Internal(format!("worker {name} panicked")));
                    std::panic::resume_unwind(payload)
                }
                Err(join_err) => {
                    error!("Worker {} run was aborted: {}", name, join_err);
                    break;
                }
            },
        }

        if !min_idle.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(min_idle) => {}
                _ = cancel.cancelled() => break,
                _ = failure.failed() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consensus_core::errors::ConsensusError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingHandler {
        runs: AtomicUsize,
        fail: bool,
    }

    impl WorkHandler for CountingHandler {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn work(&self, _cancel: &CancelToken) -> ConsensusResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ConsensusError::MissingData(consensus_core::Hash::from_u64_word(1)));
            }
            Ok(())
        }
    }

    struct BrokenHandler;

    impl WorkHandler for BrokenHandler {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn work(&self, _cancel: &CancelToken) -> ConsensusResult<()> {
            Err(ConsensusError::Internal("undo record vanished".into()))
        }
    }

    fn create_test_handler(fail: bool) -> Arc<CountingHandler> {
        Arc::new(CountingHandler { runs: AtomicUsize::new(0), fail })
    }

    fn idle_config(initial_notify: bool) -> WorkerConfig {
        WorkerConfig { initial_notify, min_idle_time_ms: 0, max_idle_time_ms: None }
    }

    async fn next_stop(events: &mut broadcast::Receiver<WorkerEvent>) {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
            if matches!(event, WorkerEvent::WorkStopped { .. }) {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let waiter = token.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_runs_on_notify() {
        let handler = create_test_handler(false);
        let worker = Worker::start(handler.clone(), idle_config(false));
        let mut events = worker.subscribe();

        worker.notify_work();
        next_stop(&mut events).await;
        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);

        worker.stop().await;
    }

    #[tokio::test]
    async fn test_initial_notify_runs_once() {
        let handler = create_test_handler(false);
        let worker = Worker::start(handler.clone(), idle_config(true));
        let mut events = worker.subscribe();
        next_stop(&mut events).await;
        worker.stop().await;
        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_notifications_coalesce() {
        let handler = create_test_handler(false);
        let worker = Worker::start(handler.clone(), idle_config(false));
        let mut events = worker.subscribe();

        for _ in 0..10 {
            worker.notify_work();
        }
        next_stop(&mut events).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        worker.stop().await;

        let runs = handler.runs.load(Ordering::SeqCst);
        assert!((1..=2).contains(&runs), "ran {runs} times");
    }

    #[tokio::test]
    async fn test_max_idle_time_reruns_without_notify() {
        let handler = create_test_handler(false);
        let config = WorkerConfig { initial_notify: false, min_idle_time_ms: 0, max_idle_time_ms: Some(10) };
        let worker = Worker::start(handler.clone(), config);
        let mut events = worker.subscribe();

        next_stop(&mut events).await;
        next_stop(&mut events).await;
        worker.stop().await;
        assert!(handler.runs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_non_fatal_error_keeps_worker_alive() {
        let handler = create_test_handler(true);
        let worker = Worker::start(handler.clone(), idle_config(true));
        let mut events = worker.subscribe();
        next_stop(&mut events).await;

        worker.notify_work();
        next_stop(&mut events).await;
        worker.stop().await;
        assert_eq!(handler.runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_flag_keeps_first_error() {
        let flag = FailureFlag::new();
        assert!(!flag.is_failed());
        assert_eq!(flag.error(), None);

        flag.fail(ConsensusError::Internal("first".into()));
        flag.fail(ConsensusError::Internal("second".into()));
        assert!(flag.is_failed());
        assert_eq!(flag.error(), Some(ConsensusError::Internal("first".into())));
    }

    #[tokio::test]
    async fn test_fatal_error_halts_sharing_workers() {
        let failure = FailureFlag::new();
        let healthy = create_test_handler(false);
        let bystander = Worker::start_with(healthy.clone(), idle_config(false), Arc::new(Notify::new()), failure.clone());
        let broken = Worker::start_with(Arc::new(BrokenHandler), idle_config(true), Arc::new(Notify::new()), failure.clone());

        tokio::time::timeout(Duration::from_secs(5), failure.failed()).await.unwrap();
        assert!(matches!(broken.failure(), Some(ConsensusError::Internal(_))));
        assert_eq!(bystander.failure(), broken.failure());

        tokio::time::timeout(Duration::from_secs(5), async {
            while !(bystander.is_finished() && broken.is_finished()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        bystander.notify_work();
        bystander.stop().await;
        broken.stop().await;
        assert_eq!(healthy.runs.load(Ordering::SeqCst), 0);
    }
}
