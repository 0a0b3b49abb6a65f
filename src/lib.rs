//! # tensorloop
//!
//! **Elementwise kernel dispatch for strided, broadcast and mixed-dtype tensors.**
//!
//! tensorloop takes a scalar function and an iteration-space descriptor over
//! one output and any number of inputs, and runs the function once per
//! element on a parallel device.
//!
//! ## Features
//!
//! - **Three kernels**: packed vectorized, strided 1-D, strided N-D through an
//!   offset calculator; all produce identical results
//! - **Dynamic casting**: operands stored in a different dtype than the
//!   function expects are converted per element
//! - **Broadcasting**: zero-stride dimensions and host-resident scalars
//! - **Large spaces**: iteration spaces past the 32-bit index range are split
//!   into addressable subspaces
//! - **Streams**: kernels are enqueued on in-order streams with deferred,
//!   sticky error reporting
//! - **Pickle codec**: structured values and tensors cross the serialization
//!   boundary in Python's pickle format
//!
//! ## Quick Start
//!
//! ```
//! use tensorloop::prelude::*;
//!
//! # fn main() -> tensorloop::error::Result<()> {
//! let device = Device::new(0)?;
//! let x = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0], &[2, 2], &device)?;
//! let y = Tensor::from_slice(&[10.0f32, 20.0], &[2], &device)?;
//! let out = Tensor::empty(&[2, 2], DType::F32, &device)?;
//!
//! let iter = TensorIterConfig::new()
//!     .add_output(&out)
//!     .add_input(&x)
//!     .add_input(&y)
//!     .build()?;
//! launch_elementwise(&iter, |a: f32, b: f32| a * b)?;
//!
//! assert_eq!(out.to_vec::<f32>()?, vec![10.0, 40.0, 30.0, 80.0]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dtype;
pub mod error;
pub mod iter;
pub mod loops;
pub mod pickle;
pub mod runtime;
pub mod tensor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dtype::{DType, Element};
    pub use crate::error::{Error, Result};
    pub use crate::iter::{ElementwiseIter, TensorIter, TensorIterConfig};
    pub use crate::loops::{
        DeviceFn, IndexedDeviceFn, Signature, launch_elementwise, launch_elementwise_with_index,
        launch_elementwise_with_scalars,
    };
    pub use crate::runtime::{Device, DeviceConfig, Stream};
    pub use crate::tensor::{Layout, Tensor};
}
