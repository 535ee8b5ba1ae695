//! Shared periodic tick with per-consumer throttle intervals.
//!
//! Consumers register once with the interval they need; the scheduler runs
//! each on its own cadence from a single base tick. [`TickScheduler::spawn`]
//! drives it from a background thread.
//!
//! Safety: the spawned thread is shut down and joined when the returned
//! [`SchedulerThread`] is dropped.
use chronos_traits::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

type Task = Box<dyn FnMut(u64) + Send>;

struct Entry {
    name: &'static str,
    interval_ms: u64,
    last_ms: Option<u64>,
    task: Task,
}

#[derive(Default)]
pub struct TickScheduler {
    entries: Vec<Entry>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `task` receives the scheduler time in ms. An interval of 0 runs every tick.
    pub fn register<F>(&mut self, name: &'static str, interval: Duration, task: F)
    where
        F: FnMut(u64) + Send + 'static,
    {
        let interval_ms = interval.as_millis() as u64;
        tracing::debug!(name, interval_ms, "tick consumer registered");
        self.entries.push(Entry {
            name,
            interval_ms,
            last_ms: None,
            task: Box::new(task),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every consumer whose interval has elapsed. Returns how many ran.
    pub fn run_due(&mut self, now_ms: u64) -> usize {
        let mut ran = 0;
        for e in &mut self.entries {
            let due = match e.last_ms {
                None => true,
                Some(last) => now_ms.saturating_sub(last) >= e.interval_ms,
            };
            if due {
                e.last_ms = Some(now_ms);
                (e.task)(now_ms);
                ran += 1;
            } else {
                tracing::trace!(name = e.name, "tick consumer throttled");
            }
        }
        ran
    }

    /// Drive the scheduler every `base` from a background thread.
    pub fn spawn<C: Clock + Send + Sync + 'static>(
        mut self,
        base: Duration,
        clock: C,
    ) -> std::io::Result<SchedulerThread> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let epoch: Instant = clock.now();

        let join_handle = std::thread::Builder::new()
            .name("gate-tick".into())
            .spawn(move || {
                loop {
                    if shutdown_clone.load(Ordering::Relaxed) {
                        tracing::debug!("tick thread received shutdown signal");
                        break;
                    }
                    self.run_due(clock.ms_since(epoch));
                    if shutdown_clone.load(Ordering::Relaxed) {
                        break;
                    }
                    clock.sleep(base);
                }
                tracing::trace!("tick thread exiting cleanly");
            })?;

        Ok(SchedulerThread {
            shutdown,
            join_handle: Some(join_handle),
        })
    }
}

pub struct SchedulerThread {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl SchedulerThread {
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("tick thread joined"),
                Err(e) => tracing::warn!(?e, "tick thread panicked during shutdown"),
            }
        }
    }
}

impl Drop for SchedulerThread {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
