/// Fixed-size pool of background workers pulling from one FIFO queue.
///
/// Key properties:
/// - Tasks start in dispatch order; each worker runs at most one task at a time.
/// - Workers self-schedule: finishing a task immediately pulls the next one.
/// - A failing or panicking task resolves its own handle with an error and the
///   worker keeps serving.
/// - Abort signals reach the worker that is running the task. Queued tasks are
///   never pruned: a signal that fires before a worker attaches the task is not
///   seen by that task.
///
/// ```text
///   dispatch() ──► [ FIFO queue ] ──► worker 0 ─┐
///                                 ├─► worker 1 ─┼─► oneshot ──► TaskHandle
///                                 └─► worker 2 ─┘
/// ```
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_POOL_SIZE: usize = 3;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("{task} failed on {worker}")]
    Task {
        task: TaskId,
        worker: WorkerId,
        #[source]
        source: BoxError,
    },
    #[error("{task} panicked on {worker}: {message}")]
    Panicked {
        task: TaskId,
        worker: WorkerId,
        message: String,
    },
    #[error("worker pool shut down before the task completed")]
    Closed,
    #[error("worker pool needs at least one worker")]
    NoWorkers,
    #[error("failed to spawn worker thread")]
    Spawn(#[from] std::io::Error),
}

/// The closed set of actions a pool can run, and how to run them.
///
/// `handle` runs on a worker thread. Long-running actions should poll
/// `ctx.signal()` and bail out once it is cancelled.
pub trait Reducer: Send + Sync + 'static {
    type Action: Send + 'static;
    type Reply: Send + 'static;
    type Error: Into<BoxError>;

    fn handle(&self, action: Self::Action, ctx: &TaskContext) -> Result<Self::Reply, Self::Error>;
}

/// What a running task knows about where it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    worker: WorkerId,
    task: TaskId,
    signal: CancellationToken,
}

impl TaskContext {
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Cancelled when the dispatcher's abort signal fires after attach.
    pub fn signal(&self) -> &CancellationToken {
        &self.signal
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_cancelled()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub signal: Option<CancellationToken>,
}

impl DispatchOptions {
    pub fn with_signal(signal: CancellationToken) -> Self {
        Self {
            signal: Some(signal),
        }
    }
}

/// Completion of one dispatched task.
///
/// Await it from async code, or call [`TaskHandle::wait`] from a plain thread.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    rx: oneshot::Receiver<Result<T, PoolError>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Block the current thread until the task settles.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> Result<T, PoolError> {
        self.rx.blocking_recv().unwrap_or(Err(PoolError::Closed))
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(PoolError::Closed)))
    }
}

struct QueuedTask<A, T> {
    id: TaskId,
    action: A,
    signal: Option<CancellationToken>,
    reply: oneshot::Sender<Result<T, PoolError>>,
}

struct PoolState<A, T> {
    queue: VecDeque<QueuedTask<A, T>>,
    busy: Vec<bool>,
    next_task: u64,
    shutdown: bool,
}

struct Shared<R: Reducer> {
    reducer: R,
    state: Mutex<PoolState<R::Action, R::Reply>>,
    available: Condvar,
}

pub struct WorkerPool<R: Reducer> {
    shared: Arc<Shared<R>>,
    threads: Vec<JoinHandle<()>>,
}

impl<R: Reducer> WorkerPool<R> {
    pub fn new(reducer: R, size: usize) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::NoWorkers);
        }

        let shared = Arc::new(Shared {
            reducer,
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                busy: vec![false; size],
                next_task: 0,
                shutdown: false,
            }),
            available: Condvar::new(),
        });

        let mut pool = Self {
            shared,
            threads: Vec::with_capacity(size),
        };
        for index in 0..size {
            let shared = Arc::clone(&pool.shared);
            let worker = WorkerId(index);
            // On error the partially built pool is dropped, which joins the
            // workers spawned so far.
            let handle = thread::Builder::new()
                .name(format!("map-worker-{index}"))
                .spawn(move || worker_loop(&shared, worker))?;
            pool.threads.push(handle);
        }
        debug!(size, "worker pool started");
        Ok(pool)
    }

    pub fn with_default_size(reducer: R) -> Result<Self, PoolError> {
        Self::new(reducer, DEFAULT_POOL_SIZE)
    }

    pub fn dispatch(&self, action: R::Action, options: DispatchOptions) -> TaskHandle<R::Reply> {
        let (reply, rx) = oneshot::channel();
        let id = {
            let mut state = self.shared.state.lock();
            let id = TaskId(state.next_task);
            state.next_task += 1;
            state.queue.push_back(QueuedTask {
                id,
                action,
                signal: options.signal,
                reply,
            });
            id
        };
        self.shared.available.notify_one();
        TaskHandle { id, rx }
    }

    pub fn size(&self) -> usize {
        self.threads.len()
    }

    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn busy(&self) -> usize {
        self.shared.state.lock().busy.iter().filter(|b| **b).count()
    }

    pub fn reducer(&self) -> &R {
        &self.shared.reducer
    }
}

impl<R: Reducer> Drop for WorkerPool<R> {
    fn drop(&mut self) {
        let abandoned = {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            std::mem::take(&mut state.queue)
        };
        if !abandoned.is_empty() {
            debug!(tasks = abandoned.len(), "dropping queued tasks on shutdown");
        }
        // Dropping the reply senders resolves the handles with `Closed`.
        drop(abandoned);

        self.shared.available.notify_all();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("worker thread exited by panic");
            }
        }
    }
}

fn worker_loop<R: Reducer>(shared: &Shared<R>, worker: WorkerId) {
    while let Some(task) = next_task(shared, worker) {
        let QueuedTask {
            id,
            action,
            signal,
            reply,
        } = task;

        let ctx = TaskContext {
            worker,
            task: id,
            signal: attach_signal(signal),
        };
        debug!(%worker, task = %id, "task attached");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| shared.reducer.handle(action, &ctx)));
        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                let source: BoxError = err.into();
                warn!(%worker, task = %id, error = %source, "task failed");
                Err(PoolError::Task {
                    task: id,
                    worker,
                    source,
                })
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(%worker, task = %id, %message, "task panicked");
                Err(PoolError::Panicked {
                    task: id,
                    worker,
                    message,
                })
            }
        };

        if reply.send(result).is_err() {
            debug!(%worker, task = %id, "task handle dropped before completion");
        }
        shared.state.lock().busy[worker.0] = false;
    }
    debug!(%worker, "worker stopped");
}

fn next_task<R: Reducer>(
    shared: &Shared<R>,
    worker: WorkerId,
) -> Option<QueuedTask<R::Action, R::Reply>> {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            return None;
        }
        if let Some(task) = state.queue.pop_front() {
            state.busy[worker.0] = true;
            return Some(task);
        }
        shared.available.wait(&mut state);
    }
}

/// Operation signal for a task that is being attached to a worker.
///
/// The caller's token only reaches the task if it has not fired yet.
fn attach_signal(caller: Option<CancellationToken>) -> CancellationToken {
    match caller {
        Some(token) if !token.is_cancelled() => token.child_token(),
        _ => CancellationToken::new(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
