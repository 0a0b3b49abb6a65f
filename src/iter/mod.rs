//! Iteration-space descriptors
//!
//! The dispatch engine never inspects tensors directly. It consumes an
//! [`ElementwiseIter`]: N operands (output first, inputs after) sharing one
//! iteration shape, each with a base address, byte strides and a dtype.
//!
//! [`TensorIter`] is the reference implementation built from tensors by
//! [`TensorIterConfig`]. It broadcasts inputs, coalesces dimensions and knows
//! how to split itself into subspaces the native 32-bit index can address.
//!
//! Dimensions are stored row-major: the last dimension varies fastest.

mod split;
mod tensor_iter;

pub use split::SubspaceSplits;
pub use tensor_iter::{TensorIter, TensorIterConfig};

use crate::dtype::{DType, Scalar};
use crate::loops::Signature;
use crate::runtime::{Device, NATIVE_INDEX_MAX};
use crate::tensor::Storage;

/// Base address of one operand.
///
/// Holds a reference to the operand's storage so an enqueued kernel keeps the
/// buffer alive until it has run.
#[derive(Clone, Debug)]
pub struct DataPtr {
    storage: Storage,
    byte_offset: usize,
}

impl DataPtr {
    /// Point `byte_offset` bytes into `storage`
    pub fn new(storage: Storage, byte_offset: usize) -> Self {
        Self {
            storage,
            byte_offset,
        }
    }

    /// Raw address of the operand's first element
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.storage.as_ptr().wrapping_add(self.byte_offset)
    }

    /// Byte offset from the start of the storage
    #[inline]
    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Storage the pointer refers into
    #[inline]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

/// Query surface of an iteration-space descriptor.
///
/// Operand 0 is the output; inputs follow in argument order.
pub trait ElementwiseIter: Sized {
    /// Iterator over range-limited subspaces
    type Splits: Iterator<Item = Self> + Clone;

    /// Number of operands, output included
    fn operand_count(&self) -> usize;

    /// Number of dimensions of the iteration space
    fn rank(&self) -> usize;

    /// Extent of every dimension, row-major
    fn shape(&self) -> &[usize];

    /// Byte strides of operand `op`, one per dimension
    fn stride(&self, op: usize) -> &[isize];

    /// Address of the first element of operand `op`
    fn data_pointer(&self, op: usize) -> DataPtr;

    /// Element type of operand `op`
    fn element_type(&self, op: usize) -> DType;

    /// Number of logical elements in the iteration space
    fn total_elements(&self) -> usize;

    /// Device holding operand `op`, `None` for host memory
    fn device(&self, op: usize) -> Option<Device>;

    /// True when the space has collapsed to a single dimension
    fn is_one_dimensional(&self) -> bool {
        self.rank() == 1
    }

    /// True when every operand is packed along the fastest dimension
    fn has_contiguous_first_dimension(&self) -> bool {
        let Some(inner) = self.rank().checked_sub(1) else {
            return false;
        };
        (0..self.operand_count())
            .all(|op| self.stride(op)[inner] == self.element_type(op).size_in_bytes() as isize)
    }

    /// True when some operand's dtype differs from the type the function
    /// reads or writes at that slot
    fn requires_dynamic_casting(&self, signature: &Signature) -> bool {
        if self.element_type(0) != signature.output {
            return true;
        }
        signature
            .args
            .iter()
            .enumerate()
            .any(|(i, &dt)| i + 1 < self.operand_count() && self.element_type(i + 1) != dt)
    }

    /// Largest element count or byte offset a single launch may address
    fn index_width_limit(&self) -> u64 {
        NATIVE_INDEX_MAX
    }

    /// True when the space is addressable with the native 32-bit index
    fn fits_native_index_width(&self) -> bool;

    /// Split into subspaces that each fit the native index width.
    ///
    /// The returned iterator is finite and can be cloned to restart.
    fn split_into_range_limited_subspaces(&self) -> Self::Splits;

    /// True when operand `op` is a single element in host memory
    fn is_host_resident_scalar(&self, op: usize) -> bool;

    /// Read the value of a host-resident scalar operand.
    ///
    /// Panics if operand `op` holds no element.
    fn read_scalar_value(&self, op: usize) -> Scalar;

    /// Remove operand `op`; later operands shift down by one
    fn drop_operand(&mut self, op: usize);
}
