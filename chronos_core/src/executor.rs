//! Single-consumer serializer for the shared low-speed bus.
//!
//! Spawns one worker thread that owns the bus and runs submitted operations
//! strictly in FIFO order. Every other component reaches the bus through a
//! cloneable [`BusHandle`], so no two callers ever race on it.
//!
//! Safety: Each `BusExecutor` spawns exactly one worker that is shut down and
//! joined when the executor is dropped. Requests still queued at that point
//! are answered with `BusError::Disconnected`.
use crossbeam_channel as xch;
use chronos_traits::clock::Clock;
use chronos_traits::{BoxError, ExpanderBus, PinDirection};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use crate::config::ExecutorCfg;
use crate::error::BusError;
use crate::hw_error::map_hw_error;

/// How often an idle worker re-checks the shutdown flag.
const IDLE_POLL: Duration = Duration::from_millis(20);

/// What a completed operation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    Done,
    Levels(u32),
    Bytes(Vec<u8>),
}

/// Typed expander operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpanderOp {
    ReadLevels { mask: u32 },
    SetDirection { mask: u32, dir: PinDirection },
    WriteLevel { mask: u32, high: bool },
}

impl ExpanderOp {
    fn execute<B: ExpanderBus>(self, bus: &mut B) -> Result<OpOutcome, BoxError> {
        match self {
            ExpanderOp::ReadLevels { mask } => bus.read_levels(mask).map(OpOutcome::Levels),
            ExpanderOp::SetDirection { mask, dir } => {
                bus.set_direction(mask, dir).map(|()| OpOutcome::Done)
            }
            ExpanderOp::WriteLevel { mask, high } => {
                bus.write_level(mask, high).map(|()| OpOutcome::Done)
            }
        }
    }
}

type Job<B> = Box<dyn FnOnce(&mut B) -> Result<OpOutcome, BoxError> + Send>;
type Callback = Box<dyn FnOnce(Result<OpOutcome, BusError>) + Send>;

enum Reply {
    Sync(xch::Sender<Result<OpOutcome, BusError>>),
    Async(Callback),
}

impl Reply {
    fn deliver(self, res: Result<OpOutcome, BusError>) {
        match self {
            // The caller may have timed out already; nobody is listening then.
            Reply::Sync(tx) => {
                let _ = tx.send(res);
            }
            Reply::Async(cb) => cb(res),
        }
    }
}

struct Request<B> {
    job: Job<B>,
    reply: Reply,
}

struct Shared {
    worker: OnceLock<ThreadId>,
    epoch: Instant,
    clock: Box<dyn Clock + Send + Sync>,
    /// ms since epoch (+1) when the running op started; 0 while idle
    busy_since: AtomicU64,
    completed: AtomicU64,
    high_water: AtomicUsize,
}

impl Shared {
    fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }
}

/// Owner of the bus worker thread.
pub struct BusExecutor<B> {
    handle: BusHandle<B>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl<B: ExpanderBus + Send + 'static> BusExecutor<B> {
    pub fn spawn<C: Clock + Send + Sync + 'static>(mut bus: B, cfg: ExecutorCfg, clock: C) -> Self {
        let (tx, rx) = xch::bounded::<Request<B>>(cfg.queue_len.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let epoch = clock.now();
        let shared = Arc::new(Shared {
            worker: OnceLock::new(),
            epoch,
            clock: Box::new(clock),
            busy_since: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            high_water: AtomicUsize::new(0),
        });
        let shared_worker = shared.clone();

        let join_handle = std::thread::Builder::new()
            .name("bus-exec".into())
            .spawn(move || {
                loop {
                    if shutdown_clone.load(Ordering::Relaxed) {
                        tracing::debug!("bus worker received shutdown signal");
                        break;
                    }
                    match rx.recv_timeout(IDLE_POLL) {
                        Ok(req) => run_request(&mut bus, req, &shared_worker),
                        Err(xch::RecvTimeoutError::Timeout) => continue,
                        Err(xch::RecvTimeoutError::Disconnected) => break,
                    }
                }
                let mut dropped = 0usize;
                for req in rx.try_iter() {
                    req.reply.deliver(Err(BusError::Disconnected));
                    dropped += 1;
                }
                tracing::trace!(dropped, "bus worker exiting cleanly");
            });

        let join_handle = match join_handle {
            Ok(h) => {
                let _ = shared.worker.set(h.thread().id());
                tracing::info!(queue_len = cfg.queue_len, "bus executor started");
                Some(h)
            }
            Err(e) => {
                // Handles will report Disconnected on every submit.
                tracing::error!(error = %e, "failed to spawn bus worker");
                None
            }
        };

        Self {
            handle: BusHandle { tx, shared, cfg },
            shutdown,
            join_handle,
        }
    }
}

impl<B> BusExecutor<B> {
    pub fn handle(&self) -> BusHandle<B> {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

fn run_request<B>(bus: &mut B, req: Request<B>, shared: &Shared) {
    let Request { job, reply } = req;
    shared
        .busy_since
        .store(shared.now_ms().saturating_add(1), Ordering::Relaxed);
    let res = match std::panic::catch_unwind(AssertUnwindSafe(|| job(bus))) {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(e)) => Err(map_hw_error(&*e)),
        Err(_) => {
            tracing::error!("bus operation panicked; worker continues");
            Err(BusError::Device("operation panicked".into()))
        }
    };
    shared.busy_since.store(0, Ordering::Relaxed);
    shared.completed.fetch_add(1, Ordering::Relaxed);
    reply.deliver(res);
}

impl<B> Drop for BusExecutor<B> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        // The worker exits after the op in flight (bounded by the bus driver's
        // own timeouts) or within one idle poll.
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("bus worker joined"),
                Err(e) => tracing::warn!(?e, "bus worker panicked during shutdown"),
            }
        }
    }
}

/// Cloneable submission side of the serializer.
pub struct BusHandle<B> {
    tx: xch::Sender<Request<B>>,
    shared: Arc<Shared>,
    cfg: ExecutorCfg,
}

impl<B> Clone for BusHandle<B> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: self.shared.clone(),
            cfg: self.cfg.clone(),
        }
    }
}

impl<B: ExpanderBus + 'static> BusHandle<B> {
    /// Enqueue a typed expander operation and wait up to `timeout` for it.
    pub fn submit_sync(&self, op: ExpanderOp, timeout: Duration) -> Result<OpOutcome, BusError> {
        self.call_sync(move |bus: &mut B| op.execute(bus), timeout)
    }

    /// Non-blocking enqueue; `false` when the queue is full.
    pub fn submit_async<CB>(&self, op: ExpanderOp, callback: CB) -> bool
    where
        CB: FnOnce(Result<OpOutcome, BusError>) + Send + 'static,
    {
        self.call_async(move |bus: &mut B| op.execute(bus), callback)
    }

    /// Read every pin in `mask` in a single transaction.
    pub fn read_levels(&self, mask: u32, timeout: Duration) -> Result<u32, BusError> {
        match self.submit_sync(ExpanderOp::ReadLevels { mask }, timeout)? {
            OpOutcome::Levels(levels) => Ok(levels),
            other => Err(BusError::Device(format!(
                "unexpected outcome for level read: {other:?}"
            ))),
        }
    }
}

impl<B: 'static> BusHandle<B> {
    /// Run an arbitrary closure on the worker with exclusive bus access.
    ///
    /// Blocks at most `enqueue_wait + timeout`. On `Timeout` the operation
    /// may still run later; re-query instead of assuming its effect.
    pub fn call_sync<F>(&self, f: F, timeout: Duration) -> Result<OpOutcome, BusError>
    where
        F: FnOnce(&mut B) -> Result<OpOutcome, BoxError> + Send + 'static,
    {
        if self.shared.worker.get() == Some(&std::thread::current().id()) {
            tracing::error!("synchronous bus call from inside the bus worker rejected");
            return Err(BusError::Reentrant);
        }

        let (done_tx, done_rx) = xch::bounded(1);
        let req = Request {
            job: Box::new(f),
            reply: Reply::Sync(done_tx),
        };
        let sent = if self.cfg.enqueue_wait.is_zero() {
            self.tx.try_send(req).map_err(|e| match e {
                xch::TrySendError::Full(_) => BusError::QueueFull,
                xch::TrySendError::Disconnected(_) => BusError::Disconnected,
            })
        } else {
            self.tx
                .send_timeout(req, self.cfg.enqueue_wait)
                .map_err(|e| match e {
                    xch::SendTimeoutError::Timeout(_) => BusError::QueueFull,
                    xch::SendTimeoutError::Disconnected(_) => BusError::Disconnected,
                })
        };
        if let Err(e) = sent {
            tracing::warn!(error = %e, "bus sync submit rejected");
            return Err(e);
        }
        self.note_depth();

        match done_rx.recv_timeout(timeout) {
            Ok(res) => res,
            Err(xch::RecvTimeoutError::Timeout) => {
                let stalled = self.stalled_for_ms();
                if stalled >= self.cfg.stall_warn.as_millis() as u64 {
                    tracing::error!(
                        stalled_ms = stalled,
                        depth = self.depth(),
                        "bus worker appears stuck on one operation"
                    );
                } else {
                    tracing::warn!(timeout_ms = timeout.as_millis() as u64, "bus sync timeout");
                }
                Err(BusError::Timeout)
            }
            Err(xch::RecvTimeoutError::Disconnected) => Err(BusError::Disconnected),
        }
    }

    /// Non-blocking closure submit. `callback` runs on the worker and must not block.
    pub fn call_async<F, CB>(&self, f: F, callback: CB) -> bool
    where
        F: FnOnce(&mut B) -> Result<OpOutcome, BoxError> + Send + 'static,
        CB: FnOnce(Result<OpOutcome, BusError>) + Send + 'static,
    {
        let req = Request {
            job: Box::new(f),
            reply: Reply::Async(Box::new(callback)),
        };
        match self.tx.try_send(req) {
            Ok(()) => {
                self.note_depth();
                true
            }
            Err(xch::TrySendError::Full(_)) => {
                tracing::warn!("bus async submit: queue full");
                false
            }
            Err(xch::TrySendError::Disconnected(_)) => {
                tracing::warn!("bus async submit: worker gone");
                false
            }
        }
    }

    fn note_depth(&self) {
        let depth = self.tx.len();
        let prev = self.shared.high_water.fetch_max(depth, Ordering::Relaxed);
        let cap = self.cfg.queue_len.max(1);
        if depth > prev && depth * 5 >= cap * 4 {
            tracing::warn!(depth, capacity = cap, "bus queue depth high");
        }
    }
}

impl<B> BusHandle<B> {
    /// Requests waiting in the queue (excludes the one running).
    pub fn depth(&self) -> usize {
        self.tx.len()
    }

    pub fn high_water(&self) -> usize {
        self.shared.high_water.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// How long the operation currently on the worker has been running (0 when idle).
    pub fn stalled_for_ms(&self) -> u64 {
        let since = self.shared.busy_since.load(Ordering::Relaxed);
        if since == 0 {
            return 0;
        }
        self.shared.now_ms().saturating_sub(since - 1)
    }

    /// Default synchronous timeout from the executor configuration.
    pub fn sync_timeout(&self) -> Duration {
        self.cfg.sync_timeout
    }
}
