//! Tensor types
//!
//! This module provides the `Tensor` type, an n-dimensional view over
//! reference-counted memory that lives either on the host or on a parallel
//! device. Tensors are the operands that iterator descriptors are built from.

mod core;
mod layout;
mod storage;

pub use core::Tensor;
pub use layout::{Layout, Shape, Strides, broadcast_shapes, checked_elem_count};
pub use storage::{Residency, Storage};
