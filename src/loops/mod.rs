//! Elementwise kernel dispatch
//!
//! Given a pointwise function and an [`ElementwiseIter`](crate::iter::ElementwiseIter)
//! describing its operands, these entry points run the function once per
//! element on the operands' device:
//!
//! - [`launch_elementwise`]: value-returning, output is operand 0
//! - [`launch_elementwise_with_scalars`]: binary, lifts a host scalar input
//! - [`launch_elementwise_with_index`]: also passes the linear index
//!
//! Packed operands with exact types take the vectorized kernel; everything
//! else takes the strided kernel, converting per element when operand dtypes
//! differ from the function's types. Both produce identical results.

mod dispatch;
mod function;
mod invoke;
mod offset;
mod scalar;
mod strided;
mod vectorized;

pub use dispatch::{KernelPath, launch_elementwise, launch_elementwise_with_index, select_path};
pub use function::{ArgTuple, ArgTypes, DeviceFn, IndexedDeviceFn, Signature};
pub use offset::{OffsetCalculator, Offsets};
pub use scalar::launch_elementwise_with_scalars;
