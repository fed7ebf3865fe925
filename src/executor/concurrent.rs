//! Concurrent fan-out/join executor
//!
//! Runs a handful of registered callables on their own OS threads, released
//! together by a shared start gate, and surfaces their failure on the calling
//! thread. Used to simulate several users hitting one device at once.
//!
//! Without a deadline the join waits forever: a worker stuck on an
//! unresponsive device hangs the executor. With a deadline, unfinished
//! workers are cancelled, reported as timeouts and detached.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::harness::{HarnessResult, TestError, WorkerFailure};

type Task = Box<dyn FnOnce(&WorkerContext) -> HarnessResult<()> + Send + 'static>;

/// How failures from several workers are reported
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AggregationPolicy {
    /// Return the failure of the earliest registered failing worker and
    /// discard the others
    #[default]
    FirstError,
    /// Return every failure, in registration order
    CollectAll,
}

/// Cooperative cancellation flag shared with every worker
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One-shot gate every worker waits on before running its task
#[derive(Debug, Default)]
struct StartGate {
    open: Mutex<bool>,
    cvar: Condvar,
}

impl StartGate {
    fn new() -> Self {
        Self::default()
    }

    fn open(&self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        *open = true;
        self.cvar.notify_all();
    }

    /// Block until the gate is opened
    fn wait(&self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        while !*open {
            open = self
                .cvar
                .wait(open)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Handed to each task when it starts
#[derive(Clone, Debug)]
pub struct WorkerContext {
    pub name: String,
    pub index: usize,
    pub cancel: CancelToken,
}

impl WorkerContext {
    /// Error out if the executor cancelled this worker
    pub fn check_cancelled(&self) -> HarnessResult<()> {
        if self.cancel.is_cancelled() {
            Err(TestError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Registered unit of work
pub struct Registration {
    name: String,
    delay: Option<Duration>,
    stack_size: Option<usize>,
    task: Task,
}

/// What happened to one worker
#[derive(Debug)]
pub struct WorkerOutcome {
    pub name: String,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub result: HarnessResult<()>,
}

impl WorkerOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcome of a successful run
#[derive(Debug)]
pub struct ExecutionReport {
    /// Taken before the gate was opened; no worker started earlier
    pub gate_opened_at: Instant,
    pub outcomes: Vec<WorkerOutcome>,
}

impl ExecutionReport {
    /// Largest difference between two worker start instants
    pub fn start_skew(&self) -> Duration {
        let starts: Vec<Instant> = self.outcomes.iter().filter_map(|o| o.started_at).collect();
        match (starts.iter().min(), starts.iter().max()) {
            (Some(first), Some(last)) => last.duration_since(*first),
            _ => Duration::ZERO,
        }
    }
}

struct Finished {
    index: usize,
    started_at: Option<Instant>,
    finished_at: Instant,
    result: HarnessResult<()>,
}

/// Fan-out/join executor gated by a shared start signal
pub struct ConcurrentExecutor {
    registrations: Vec<Registration>,
    policy: AggregationPolicy,
    deadline: Option<Duration>,
    cancel: CancelToken,
}

impl ConcurrentExecutor {
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            policy: AggregationPolicy::default(),
            deadline: None,
            cancel: CancelToken::new(),
        }
    }

    /// Register a task that starts as soon as the gate opens
    pub fn add<F>(self, name: impl Into<String>, task: F) -> Self
    where
        F: FnOnce(&WorkerContext) -> HarnessResult<()> + Send + 'static,
    {
        self.register(name.into(), None, None, Box::new(task))
    }

    /// Register a task whose thread gets `stack_size` bytes of stack
    pub fn add_with_stack<F>(self, name: impl Into<String>, stack_size: usize, task: F) -> Self
    where
        F: FnOnce(&WorkerContext) -> HarnessResult<()> + Send + 'static,
    {
        self.register(name.into(), None, Some(stack_size), Box::new(task))
    }

    /// Register a task that sleeps `delay` after the gate opens
    pub fn add_delayed<F>(self, name: impl Into<String>, delay: Duration, task: F) -> Self
    where
        F: FnOnce(&WorkerContext) -> HarnessResult<()> + Send + 'static,
    {
        self.register(name.into(), Some(delay), None, Box::new(task))
    }

    /// Register an async task driven on `handle` from the worker thread.
    ///
    /// The handle must belong to a multi-threaded runtime, and the executor
    /// must not itself run on a runtime worker thread (use `spawn_run`).
    pub fn add_async<F, Fut>(self, name: impl Into<String>, handle: Handle, task: F) -> Self
    where
        F: FnOnce(WorkerContext) -> Fut + Send + 'static,
        Fut: Future<Output = HarnessResult<()>> + Send + 'static,
    {
        self.register(
            name.into(),
            None,
            None,
            Box::new(move |ctx: &WorkerContext| handle.block_on(task(ctx.clone()))),
        )
    }

    fn register(
        mut self,
        name: String,
        delay: Option<Duration>,
        stack_size: Option<usize>,
        task: Task,
    ) -> Self {
        self.registrations.push(Registration {
            name,
            delay,
            stack_size,
            task,
        });
        self
    }

    pub fn policy(mut self, policy: AggregationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bound the join phase; unset means wait indefinitely
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Start every worker, wait for all of them and report the first failure
    pub fn run_threads(self) -> HarnessResult<()> {
        self.run().map(|_| ())
    }

    /// Run on tokio's blocking pool so async callers don't stall a worker
    pub async fn spawn_run(self) -> HarnessResult<ExecutionReport> {
        tokio::task::spawn_blocking(move || self.run())
            .await
            .map_err(|e| TestError::error(format!("executor thread failed: {e}")))?
    }

    /// Start every worker, wait for all of them and apply the aggregation
    /// policy
    pub fn run(self) -> HarnessResult<ExecutionReport> {
        let ConcurrentExecutor {
            registrations,
            policy,
            deadline,
            cancel,
        } = self;

        let total = registrations.len();
        let mut outcomes: Vec<WorkerOutcome> = registrations
            .iter()
            .map(|r| WorkerOutcome {
                name: r.name.clone(),
                started_at: None,
                finished_at: None,
                result: Err(TestError::Cancelled),
            })
            .collect();

        if total == 0 {
            return Ok(ExecutionReport {
                gate_opened_at: Instant::now(),
                outcomes,
            });
        }

        info!("Starting {} concurrent workers", total);

        let gate = Arc::new(StartGate::new());
        let (tx, rx) = mpsc::channel::<Finished>();
        let mut handles = Vec::with_capacity(total);

        for (index, registration) in registrations.into_iter().enumerate() {
            let worker_gate = gate.clone();
            let tx = tx.clone();
            let ctx = WorkerContext {
                name: registration.name.clone(),
                index,
                cancel: cancel.clone(),
            };

            // Worker names are user input and may contain NUL
            let mut builder = thread::Builder::new().name(format!("nasqa-worker-{index}"));
            if let Some(size) = registration.stack_size {
                builder = builder.stack_size(size);
            }

            let spawned = builder.spawn(move || {
                let Registration { delay, task, .. } = registration;
                worker_gate.wait();

                if let Some(delay) = delay {
                    thread::sleep(delay);
                }

                let (started_at, result) = if ctx.cancel.is_cancelled() {
                    (None, Err(TestError::Cancelled))
                } else {
                    let started_at = Instant::now();
                    debug!("Worker '{}' started", ctx.name);
                    let result = panic::catch_unwind(AssertUnwindSafe(|| task(&ctx)))
                        .unwrap_or_else(|payload| {
                            Err(TestError::Panicked {
                                worker: ctx.name.clone(),
                                message: panic_message(payload.as_ref()),
                            })
                        });
                    (Some(started_at), result)
                };

                // The receiver is gone once the executor gave up on us
                let _ = tx.send(Finished {
                    index,
                    started_at,
                    finished_at: Instant::now(),
                    result,
                });
            });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!("Failed to spawn worker thread: {}", e);
                    // Release the threads already waiting; they see the
                    // cancellation and exit without running their task
                    cancel.cancel();
                    gate.open();
                    return Err(TestError::Other(anyhow::Error::new(e).context(format!(
                        "failed to spawn worker '{}'",
                        outcomes[index].name
                    ))));
                }
            }
        }
        drop(tx);

        let gate_opened_at = Instant::now();
        gate.open();

        let mut received = 0;
        let wait_start = Instant::now();
        let mut timed_out = false;

        while received < total {
            let next = match deadline {
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                Some(limit) => match limit.checked_sub(wait_start.elapsed()) {
                    Some(remaining) => rx.recv_timeout(remaining),
                    None => Err(RecvTimeoutError::Timeout),
                },
            };

            match next {
                Ok(finished) => {
                    let outcome = &mut outcomes[finished.index];
                    outcome.started_at = finished.started_at;
                    outcome.finished_at = Some(finished.finished_at);
                    outcome.result = finished.result;
                    received += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    timed_out = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if timed_out {
            let elapsed = wait_start.elapsed();
            warn!(
                "Deadline of {:?} reached with {} of {} workers unfinished",
                deadline.unwrap_or_default(),
                total - received,
                total
            );
            cancel.cancel();
            for outcome in outcomes.iter_mut().filter(|o| o.finished_at.is_none()) {
                outcome.result = Err(TestError::timeout(
                    format!("worker '{}'", outcome.name),
                    elapsed,
                ));
            }
            // Unfinished threads are detached
            drop(handles);
        } else {
            for handle in handles {
                let _ = handle.join();
            }
        }

        aggregate(policy, gate_opened_at, outcomes)
    }
}

impl Default for ConcurrentExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn aggregate(
    policy: AggregationPolicy,
    gate_opened_at: Instant,
    outcomes: Vec<WorkerOutcome>,
) -> HarnessResult<ExecutionReport> {
    if outcomes.iter().all(|o| o.is_ok()) {
        info!("All {} workers finished", outcomes.len());
        return Ok(ExecutionReport {
            gate_opened_at,
            outcomes,
        });
    }

    let mut failures: Vec<WorkerFailure> = outcomes
        .into_iter()
        .filter_map(|o| match o.result {
            Err(error) => Some(WorkerFailure {
                worker: o.name,
                error,
            }),
            Ok(()) => None,
        })
        .collect();

    match policy {
        AggregationPolicy::FirstError => {
            if failures.len() > 1 {
                debug!("Discarding {} additional worker failures", failures.len() - 1);
            }
            let first = failures.remove(0);
            warn!("Worker '{}' failed: {}", first.worker, first.error);
            Err(first.error)
        }
        AggregationPolicy::CollectAll => {
            warn!("{} workers failed", failures.len());
            Err(TestError::Multiple(failures))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    #[test]
    fn test_all_workers_succeed() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut executor = ConcurrentExecutor::new();
        for i in 0..4 {
            let counter = counter.clone();
            executor = executor.add(format!("user{i}"), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let report = executor.run().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(report.outcomes.len(), 4);
        assert!(report.outcomes.iter().all(|o| o.is_ok()));
    }

    #[test]
    fn test_empty_executor() {
        let executor = ConcurrentExecutor::new();
        assert!(executor.is_empty());
        let report = executor.run().unwrap();
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn test_single_failure_is_reraised() {
        let result = ConcurrentExecutor::new()
            .add("admin", |_| Ok(()))
            .add("user2", |_| Err(TestError::failure("app not installed")))
            .add("user3", |_| Ok(()))
            .run_threads();

        match result {
            Err(TestError::Failure(msg)) => assert_eq!(msg, "app not installed"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_first_error_in_registration_order() {
        // The later-registered worker fails first in wall-clock time
        let result = ConcurrentExecutor::new()
            .add_delayed("slow", Duration::from_millis(50), |_| {
                Err(TestError::failure("slow"))
            })
            .add("fast", |_| Err(TestError::error("fast")))
            .run_threads();

        assert!(matches!(result, Err(TestError::Failure(msg)) if msg == "slow"));
    }

    #[test]
    fn test_collect_all_failures() {
        let result = ConcurrentExecutor::new()
            .policy(AggregationPolicy::CollectAll)
            .add("a", |_| Err(TestError::failure("a")))
            .add("b", |_| Ok(()))
            .add("c", |_| Err(TestError::failure("c")))
            .run();

        match result {
            Err(TestError::Multiple(failures)) => {
                let names: Vec<_> = failures.iter().map(|f| f.worker.as_str()).collect();
                assert_eq!(names, vec!["a", "c"]);
            }
            other => panic!("expected multiple failures, got {other:?}"),
        }
    }

    #[test]
    fn test_panic_is_captured() {
        let result = ConcurrentExecutor::new()
            .add("boom", |_| panic!("serial port vanished"))
            .run_threads();

        match result {
            Err(TestError::Panicked { worker, message }) => {
                assert_eq!(worker, "boom");
                assert_eq!(message, "serial port vanished");
            }
            other => panic!("expected panic capture, got {other:?}"),
        }
    }

    #[test]
    fn test_workers_start_after_gate() {
        let report = ConcurrentExecutor::new()
            .add("a", |_| Ok(()))
            .add("b", |_| Ok(()))
            .run()
            .unwrap();

        for outcome in &report.outcomes {
            let started = outcome.started_at.unwrap();
            assert!(started >= report.gate_opened_at);
        }
    }

    #[test]
    fn test_workers_overlap() {
        // Each worker waits until both have started; only possible if they
        // run at the same time
        let arrived = Arc::new(AtomicUsize::new(0));
        let mut executor = ConcurrentExecutor::new().deadline(Duration::from_secs(5));
        for name in ["admin", "user2"] {
            let arrived = arrived.clone();
            executor = executor.add(name, move |_| {
                arrived.fetch_add(1, Ordering::SeqCst);
                let start = Instant::now();
                while arrived.load(Ordering::SeqCst) < 2 {
                    if start.elapsed() > Duration::from_secs(2) {
                        return Err(TestError::failure("peer never started"));
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                Ok(())
            });
        }

        assert!(executor.run_threads().is_ok());
    }

    #[test]
    fn test_delay_applies_after_gate() {
        let report = ConcurrentExecutor::new()
            .add_delayed("late", Duration::from_millis(30), |_| Ok(()))
            .run()
            .unwrap();

        let started = report.outcomes[0].started_at.unwrap();
        assert!(started.duration_since(report.gate_opened_at) >= Duration::from_millis(30));
    }

    #[test]
    fn test_deadline_times_out_hung_worker() {
        let executor = ConcurrentExecutor::new()
            .deadline(Duration::from_millis(100))
            .add("ok", |_| Ok(()))
            .add("hung", |ctx| {
                while !ctx.cancel.is_cancelled() {
                    thread::sleep(Duration::from_millis(5));
                }
                ctx.check_cancelled()
            });
        let token = executor.cancel_token();

        let result = executor.run_threads();
        assert!(matches!(result, Err(TestError::Timeout { what, .. }) if what == "worker 'hung'"));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_start_gate() {
        let gate = Arc::new(StartGate::new());
        let passed = Arc::new(AtomicBool::new(false));

        let waiter = {
            let gate = gate.clone();
            let passed = passed.clone();
            thread::spawn(move || {
                gate.wait();
                passed.store(true, Ordering::SeqCst);
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!passed.load(Ordering::SeqCst));

        gate.open();
        waiter.join().unwrap();
        assert!(passed.load(Ordering::SeqCst));

        // Already open: returns immediately
        gate.wait();
    }

    #[test]
    fn test_worker_name_with_nul() {
        let result = ConcurrentExecutor::new()
            .add("user\0two", |ctx| {
                assert_eq!(ctx.name, "user\0two");
                assert_eq!(thread::current().name(), Some("nasqa-worker-0"));
                Ok(())
            })
            .run_threads();

        assert!(result.is_ok());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_spawn_failure_releases_waiting_workers() {
        let held = Arc::new(());
        let ran = Arc::new(AtomicBool::new(false));
        let executor = {
            let held = held.clone();
            let ran = ran.clone();
            ConcurrentExecutor::new()
                .add("admin", move |_| {
                    let _held = &held;
                    ran.store(true, Ordering::SeqCst);
                    Ok(())
                })
                // No address space for a 1 PiB stack
                .add_with_stack("huge", 1 << 50, |_| Ok(()))
        };
        let token = executor.cancel_token();

        match executor.run() {
            Err(TestError::Other(e)) => {
                assert!(e.to_string().contains("failed to spawn worker 'huge'"))
            }
            other => panic!("expected spawn failure, got {other:?}"),
        }
        assert!(token.is_cancelled());

        // The admin thread must leave the gate and drop its task
        let start = Instant::now();
        while Arc::strong_count(&held) > 1 {
            assert!(
                start.elapsed() < Duration::from_secs(2),
                "worker still blocked on the start gate"
            );
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_async_tasks_via_spawn_run() {
        let handle = Handle::current();
        let report = ConcurrentExecutor::new()
            .add_async("admin", handle.clone(), |_ctx| async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(())
            })
            .add_async("user2", handle, |ctx| async move {
                ctx.check_cancelled()?;
                Err(TestError::failure(format!("{} denied", ctx.name)))
            })
            .spawn_run()
            .await;

        assert!(matches!(report, Err(TestError::Failure(msg)) if msg == "user2 denied"));
    }
}
