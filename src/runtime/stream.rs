//! In-order execution streams
//!
//! A [`Stream`] owns a worker thread draining a FIFO of kernel launches.
//! Enqueueing never blocks the caller. The worker executes every block of a
//! launch on the device's rayon pool, and each block runs its execution units
//! one after another. Work on one stream is totally ordered; nothing orders
//! work across streams.
//!
//! Faults are sticky until observed: a kernel body that panics, or a launch
//! whose geometry the device rejects, records an error that the next
//! [`Stream::check_last_error`] or [`Stream::synchronize`] returns.

use super::{DeviceConfig, LaunchConfig, ThreadIdx};
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use rayon::prelude::*;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(0);

/// Kernel body executed once per execution unit
pub type KernelBody = Arc<dyn Fn(ThreadIdx) + Send + Sync>;

struct KernelLaunch {
    name: &'static str,
    config: LaunchConfig,
    body: KernelBody,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<KernelLaunch>,
    running: bool,
    shutdown: bool,
    last_error: Option<Error>,
    completed: u64,
}

struct Shared {
    id: u64,
    device_id: usize,
    config: DeviceConfig,
    pool: Arc<rayon::ThreadPool>,
    state: Mutex<QueueState>,
    work_ready: Condvar,
    idle: Condvar,
}

struct StreamInner {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to an in-order work queue on a device.
///
/// Cloning is cheap and yields a handle to the same queue. The worker thread
/// drains any pending work and exits when the last handle is dropped.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

impl Stream {
    pub(crate) fn new(
        device_id: usize,
        config: DeviceConfig,
        pool: Arc<rayon::ThreadPool>,
    ) -> Result<Self> {
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(Shared {
            id,
            device_id,
            config,
            pool,
            state: Mutex::new(QueueState::default()),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name(format!("tensorloop-stream-{id}"))
            .spawn(move || worker_loop(&worker_shared))
            .map_err(|e| Error::Internal(format!("failed to spawn stream worker: {e}")))?;

        tracing::debug!(stream = id, device = device_id, "stream created");

        Ok(Self {
            inner: Arc::new(StreamInner {
                shared,
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    /// Process-unique stream id
    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.shared.id
    }

    /// Id of the device this stream executes on
    #[inline]
    pub fn device_id(&self) -> usize {
        self.inner.shared.device_id
    }

    /// Enqueue a kernel without waiting for it.
    ///
    /// Geometry that violates the device limits is recorded as the stream's
    /// last error and nothing is enqueued; the caller observes it through the
    /// deferred error check.
    pub fn launch<F>(&self, name: &'static str, config: LaunchConfig, body: F)
    where
        F: Fn(ThreadIdx) + Send + Sync + 'static,
    {
        let shared = &self.inner.shared;
        let mut state = shared.state.lock();

        if let Err(e) = config.validate(name, &shared.config) {
            tracing::warn!(stream = shared.id, kernel = name, error = %e, "launch rejected");
            record_error(&mut state, e);
            return;
        }

        tracing::trace!(
            stream = shared.id,
            kernel = name,
            grid = config.grid_dim,
            block = config.block_dim,
            elems_per_thread = config.elems_per_thread,
            "enqueue"
        );
        state.queue.push_back(KernelLaunch {
            name,
            config,
            body: Arc::new(body),
        });
        shared.work_ready.notify_one();
    }

    /// Take the error recorded by a previous launch, if any.
    ///
    /// Does not wait for pending work; a fault in a kernel that has not run
    /// yet is reported by a later check.
    pub fn check_last_error(&self) -> Result<()> {
        match self.inner.shared.state.lock().last_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Block until every enqueued kernel has finished, then report any
    /// recorded error.
    pub fn synchronize(&self) -> Result<()> {
        let shared = &self.inner.shared;
        let mut state = shared.state.lock();
        while !state.queue.is_empty() || state.running {
            shared.idle.wait(&mut state);
        }
        match state.last_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Number of kernels that have finished executing on this stream
    pub fn completed_launches(&self) -> u64 {
        self.inner.shared.state.lock().completed
    }
}

impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Stream {}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.inner.shared.id)
            .field("device", &self.inner.shared.device_id)
            .finish()
    }
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.work_ready.notify_all();
        }
        if let Some(handle) = self.worker.lock().take() {
            // A kernel can hold the last handle; its worker then exits on its own.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
        tracing::debug!(stream = self.shared.id, "stream destroyed");
    }
}

// The first unobserved error wins, like a sticky device error.
fn record_error(state: &mut QueueState, error: Error) {
    if state.last_error.is_none() {
        state.last_error = Some(error);
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let launch = {
            let mut state = shared.state.lock();
            loop {
                if let Some(launch) = state.queue.pop_front() {
                    state.running = true;
                    break launch;
                }
                if state.shutdown {
                    return;
                }
                shared.work_ready.wait(&mut state);
            }
        };

        let fault = execute(shared, &launch).err();

        let mut state = shared.state.lock();
        state.running = false;
        state.completed += 1;
        if let Some(message) = fault {
            tracing::warn!(stream = shared.id, kernel = launch.name, %message, "kernel fault");
            record_error(
                &mut state,
                Error::DeviceFault {
                    stream: shared.id,
                    message,
                },
            );
        }
        if state.queue.is_empty() {
            shared.idle.notify_all();
        }
    }
}

/// Run every block of the grid on the pool; a panic in any unit is a fault
fn execute(shared: &Shared, launch: &KernelLaunch) -> std::result::Result<(), String> {
    let LaunchConfig {
        grid_dim,
        block_dim,
        ..
    } = launch.config;
    let body = &launch.body;

    catch_unwind(AssertUnwindSafe(|| {
        shared.pool.install(|| {
            (0..grid_dim).into_par_iter().for_each(|block| {
                for thread in 0..block_dim {
                    body(ThreadIdx {
                        block,
                        thread,
                        block_dim,
                    });
                }
            });
        });
    }))
    .map_err(|payload| format!("kernel '{}' panicked: {}", launch.name, panic_message(&payload)))
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::BLOCK_SIZE;
    use std::sync::atomic::AtomicUsize;

    fn test_stream() -> Stream {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap();
        Stream::new(0, DeviceConfig::default(), Arc::new(pool)).unwrap()
    }

    #[test]
    fn test_every_unit_runs_once() {
        let stream = test_stream();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let config = LaunchConfig {
            grid_dim: 3,
            block_dim: BLOCK_SIZE,
            elems_per_thread: 1,
        };
        stream.launch("count", config, move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        stream.synchronize().unwrap();
        assert_eq!(hits.load(Ordering::Relaxed), 3 * BLOCK_SIZE as usize);
        assert_eq!(stream.completed_launches(), 1);
    }

    #[test]
    fn test_launches_run_in_order() {
        let stream = test_stream();
        let log = Arc::new(Mutex::new(Vec::new()));
        let config = LaunchConfig {
            grid_dim: 1,
            block_dim: 1,
            elems_per_thread: 1,
        };
        for i in 0..8 {
            let log = Arc::clone(&log);
            stream.launch("append", config, move |_| log.lock().push(i));
        }
        stream.synchronize().unwrap();
        assert_eq!(*log.lock(), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_panic_becomes_fault() {
        let stream = test_stream();
        let config = LaunchConfig {
            grid_dim: 1,
            block_dim: 1,
            elems_per_thread: 1,
        };
        stream.launch("boom", config, |_| panic!("bad element"));
        let err = stream.synchronize().unwrap_err();
        assert!(matches!(err, Error::DeviceFault { .. }));
        assert!(err.to_string().contains("bad element"));
        // the fault is consumed by the check that reported it
        assert!(stream.check_last_error().is_ok());
    }

    #[test]
    fn test_invalid_geometry_is_deferred() {
        let stream = test_stream();
        let config = LaunchConfig {
            grid_dim: 1,
            block_dim: 4096,
            elems_per_thread: 1,
        };
        stream.launch("too_wide", config, |_| {});
        assert!(matches!(
            stream.check_last_error(),
            Err(Error::InvalidLaunch { kernel: "too_wide", .. })
        ));
        assert_eq!(stream.completed_launches(), 0);
    }

    #[test]
    fn test_drop_drains_pending_work() {
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let stream = test_stream();
            let config = LaunchConfig {
                grid_dim: 4,
                block_dim: 8,
                elems_per_thread: 1,
            };
            for _ in 0..4 {
                let counter = Arc::clone(&hits);
                stream.launch("late", config, move |_| {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
        }
        assert_eq!(hits.load(Ordering::Relaxed), 4 * 4 * 8);
    }
}
