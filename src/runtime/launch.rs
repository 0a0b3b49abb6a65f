//! Launch geometry for elementwise kernels

use super::DeviceConfig;
use crate::error::{Error, Result};

/// Execution units per block for elementwise kernels
pub const BLOCK_SIZE: u32 = 128;

/// Elements processed by one execution unit of the strided kernel
pub const THREAD_WORK_SIZE: u32 = 4;

/// Consecutive elements owned by one execution unit of the vectorized kernel
pub const VEC_SIZE: u32 = 4;

/// Grid geometry of a single kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Number of blocks
    pub grid_dim: u32,
    /// Execution units per block
    pub block_dim: u32,
    /// Elements handled by each execution unit
    pub elems_per_thread: u32,
}

impl LaunchConfig {
    /// Geometry covering `numel` elements with `BLOCK_SIZE` units per block,
    /// each unit handling `elems_per_thread` elements.
    ///
    /// `numel` must fit the native index; the dispatcher splits larger spaces
    /// before computing geometry.
    pub fn for_elements(numel: usize, elems_per_thread: u32) -> Self {
        let per_block = (BLOCK_SIZE as u64) * (elems_per_thread.max(1) as u64);
        let grid = (numel as u64).div_ceil(per_block);
        Self {
            grid_dim: grid.min(u32::MAX as u64) as u32,
            block_dim: BLOCK_SIZE,
            elems_per_thread,
        }
    }

    /// Total number of execution units in the grid
    #[inline]
    pub fn total_threads(&self) -> u64 {
        self.grid_dim as u64 * self.block_dim as u64
    }

    /// Check the geometry against device limits
    pub fn validate(&self, kernel: &'static str, config: &DeviceConfig) -> Result<()> {
        if self.block_dim == 0 || self.block_dim > config.max_threads_per_block {
            return Err(Error::InvalidLaunch {
                kernel,
                reason: format!(
                    "block_dim {} outside 1..={}",
                    self.block_dim, config.max_threads_per_block
                ),
            });
        }
        if self.grid_dim == 0 || self.grid_dim > config.max_grid_dim {
            return Err(Error::InvalidLaunch {
                kernel,
                reason: format!(
                    "grid_dim {} outside 1..={}",
                    self.grid_dim, config.max_grid_dim
                ),
            });
        }
        if self.elems_per_thread == 0 {
            return Err(Error::InvalidLaunch {
                kernel,
                reason: "elems_per_thread must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Position of one execution unit within the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadIdx {
    /// Block index within the grid
    pub block: u32,
    /// Thread index within the block
    pub thread: u32,
    /// Threads per block
    pub block_dim: u32,
}

impl ThreadIdx {
    /// Flat index of this unit across the grid
    #[inline]
    pub fn global(&self) -> u64 {
        self.block as u64 * self.block_dim as u64 + self.thread as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_covers_all_elements() {
        let cfg = LaunchConfig::for_elements(1000, VEC_SIZE);
        assert_eq!(cfg.block_dim, BLOCK_SIZE);
        // 512 elements per block
        assert_eq!(cfg.grid_dim, 2);

        let cfg = LaunchConfig::for_elements(512, THREAD_WORK_SIZE);
        assert_eq!(cfg.grid_dim, 1);

        let cfg = LaunchConfig::for_elements(1, 1);
        assert_eq!(cfg.grid_dim, 1);
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        let device = DeviceConfig::default();
        let mut cfg = LaunchConfig::for_elements(10, 4);
        assert!(cfg.validate("k", &device).is_ok());

        cfg.block_dim = 2048;
        assert!(matches!(
            cfg.validate("k", &device),
            Err(Error::InvalidLaunch { kernel: "k", .. })
        ));

        cfg.block_dim = 128;
        cfg.grid_dim = 0;
        assert!(cfg.validate("k", &device).is_err());
    }

    #[test]
    fn test_thread_global_index() {
        let idx = ThreadIdx {
            block: 3,
            thread: 5,
            block_dim: 128,
        };
        assert_eq!(idx.global(), 389);
    }
}
