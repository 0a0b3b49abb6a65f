//! Simulated parallel device

use super::{DeviceConfig, Stream};
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A throughput-oriented execution device.
///
/// A device owns a rayon thread pool that executes kernel blocks, the set of
/// streams created on it, and a current stream that dispatch enqueues onto.
/// Handles are cheap to clone and compare equal when they refer to the same
/// device instance.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    id: usize,
    config: DeviceConfig,
    pool: Arc<rayon::ThreadPool>,
    current: RwLock<Stream>,
    streams: Mutex<Vec<Stream>>,
    allocated: AtomicUsize,
}

impl Device {
    /// Create device `id` with the default configuration
    pub fn new(id: usize) -> Result<Self> {
        Self::with_config(id, DeviceConfig::default())
    }

    /// Create device `id` with explicit limits
    pub fn with_config(id: usize, config: DeviceConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads.max(1))
            .thread_name(move |i| format!("tensorloop-dev{id}-{i}"))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build device pool: {e}")))?;
        let pool = Arc::new(pool);

        let default_stream = Stream::new(id, config.clone(), Arc::clone(&pool))?;
        tracing::debug!(
            device = id,
            workers = config.worker_threads,
            index_width_limit = config.index_width_limit,
            "device created"
        );

        Ok(Self {
            inner: Arc::new(DeviceInner {
                id,
                config,
                pool,
                current: RwLock::new(default_stream.clone()),
                streams: Mutex::new(vec![default_stream]),
                allocated: AtomicUsize::new(0),
            }),
        })
    }

    /// Device ordinal
    #[inline]
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// Execution limits of this device
    #[inline]
    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// Stream that dispatch enqueues onto
    pub fn current_stream(&self) -> Stream {
        self.inner.current.read().clone()
    }

    /// Create an additional stream on this device
    pub fn new_stream(&self) -> Result<Stream> {
        let stream = Stream::new(
            self.inner.id,
            self.inner.config.clone(),
            Arc::clone(&self.inner.pool),
        )?;
        self.inner.streams.lock().push(stream.clone());
        Ok(stream)
    }

    /// Make `stream` the target of subsequent dispatches
    pub fn set_current_stream(&self, stream: &Stream) -> Result<()> {
        if !self.inner.streams.lock().contains(stream) {
            return Err(Error::invalid_argument(
                "stream",
                format!(
                    "stream {} does not belong to device {}",
                    stream.id(),
                    self.inner.id
                ),
            ));
        }
        *self.inner.current.write() = stream.clone();
        Ok(())
    }

    /// Wait for every stream on the device and report the first recorded
    /// error.
    pub fn synchronize(&self) -> Result<()> {
        let streams = self.inner.streams.lock().clone();
        let mut first = Ok(());
        for stream in &streams {
            let result = stream.synchronize();
            if first.is_ok() {
                first = result;
            }
        }
        first
    }

    /// Bytes currently held by device storage
    #[inline]
    pub fn allocated_bytes(&self) -> usize {
        self.inner.allocated.load(Ordering::Relaxed)
    }

    pub(crate) fn track_alloc(&self, bytes: usize) {
        self.inner.allocated.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn track_free(&self, bytes: usize) {
        self.inner.allocated.fetch_sub(bytes, Ordering::Relaxed);
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Device {}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.inner.id)
            .field("workers", &self.inner.config.worker_threads)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_stream_switch() {
        let device = Device::with_config(0, DeviceConfig::default().with_worker_threads(2)).unwrap();
        let default = device.current_stream();
        let side = device.new_stream().unwrap();
        assert_ne!(default, side);

        device.set_current_stream(&side).unwrap();
        assert_eq!(device.current_stream(), side);
    }

    #[test]
    fn test_foreign_stream_rejected() {
        let a = Device::with_config(0, DeviceConfig::default().with_worker_threads(1)).unwrap();
        let b = Device::with_config(1, DeviceConfig::default().with_worker_threads(1)).unwrap();
        let err = a.set_current_stream(&b.current_stream()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "stream", .. }));
    }

    #[test]
    fn test_handles_compare_by_instance() {
        let a = Device::with_config(0, DeviceConfig::default().with_worker_threads(1)).unwrap();
        let b = Device::with_config(0, DeviceConfig::default().with_worker_threads(1)).unwrap();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
