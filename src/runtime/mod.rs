//! Simulated parallel device runtime
//!
//! # Architecture
//!
//! ```text
//! Device (ordinal, DeviceConfig, rayon pool, allocation counter)
//! ├── Stream (in-order queue + worker thread, sticky last error)
//! │   └── launch(name, LaunchConfig, body) -> grid of blocks on the pool
//! └── current stream (target of every dispatch)
//! ```
//!
//! Kernels are closures invoked once per execution unit with a
//! [`ThreadIdx`]. Blocks of a grid run in parallel on the device pool; units
//! within a block run in order. Launches are asynchronous: errors surface
//! through [`Stream::check_last_error`] or a synchronization.

mod config;
mod device;
mod launch;
mod stream;

pub use config::{DeviceConfig, NATIVE_INDEX_MAX};
pub use device::Device;
pub use launch::{BLOCK_SIZE, LaunchConfig, THREAD_WORK_SIZE, ThreadIdx, VEC_SIZE};
pub use stream::{KernelBody, Stream};
