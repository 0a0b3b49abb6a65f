//! Device configuration

/// Largest element index the native 32-bit signed index can address
pub const NATIVE_INDEX_MAX: u64 = i32::MAX as u64;

/// Execution limits of a simulated parallel device.
///
/// Read by [`Device`](super::Device) when it builds its thread pool, by
/// [`Stream::launch`](super::Stream::launch) when it validates launch
/// geometry, and by iterator descriptors when they decide whether an
/// iteration space must be split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Number of worker threads executing kernel blocks
    pub worker_threads: usize,
    /// Maximum execution units per block
    pub max_threads_per_block: u32,
    /// Maximum number of blocks in one grid
    pub max_grid_dim: u32,
    /// Largest element count or byte offset a single launch may address
    pub index_width_limit: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_threads_per_block: 1024,
            max_grid_dim: i32::MAX as u32,
            index_width_limit: NATIVE_INDEX_MAX,
        }
    }
}

impl DeviceConfig {
    /// Set the pool size (at least one thread)
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }

    /// Set the per-block thread limit
    pub fn with_max_threads_per_block(mut self, threads: u32) -> Self {
        self.max_threads_per_block = threads;
        self
    }

    /// Set the grid size limit
    pub fn with_max_grid_dim(mut self, blocks: u32) -> Self {
        self.max_grid_dim = blocks;
        self
    }

    /// Lower the addressable index range.
    ///
    /// The value is clamped to `1..=NATIVE_INDEX_MAX`; a device can never
    /// address more than the native index allows.
    pub fn with_index_width_limit(mut self, limit: u64) -> Self {
        self.index_width_limit = limit.clamp(1, NATIVE_INDEX_MAX);
        self
    }
}
