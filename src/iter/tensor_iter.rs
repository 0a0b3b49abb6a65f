//! Tensor-backed iteration space

use super::{DataPtr, ElementwiseIter, SubspaceSplits};
use crate::dtype::{DType, Scalar};
use crate::error::{Error, Result};
use crate::runtime::{Device, NATIVE_INDEX_MAX};
use crate::tensor::{Shape, Storage, Tensor, broadcast_shapes};
use smallvec::{SmallVec, smallvec};

/// Byte-level view of one operand within an iteration space
#[derive(Clone, Debug)]
pub struct OperandView {
    storage: Storage,
    byte_offset: usize,
    dtype: DType,
    strides: SmallVec<[isize; 4]>,
    host_scalar: bool,
}

impl OperandView {
    /// Element type
    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Byte strides, one per iteration dimension
    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// Byte offset of the first element within the storage
    #[inline]
    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Underlying storage
    #[inline]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

/// Builder for [`TensorIter`].
///
/// ```
/// use tensorloop::prelude::*;
///
/// # fn main() -> tensorloop::error::Result<()> {
/// let device = Device::new(0)?;
/// let a = Tensor::from_slice(&[1.0f32, 2.0, 3.0], &[3], &device)?;
/// let out = Tensor::empty(&[2, 3], DType::F32, &device)?;
/// let iter = TensorIterConfig::new()
///     .add_output(&out)
///     .add_input(&a)
///     .build()?;
/// assert_eq!(iter.total_elements(), 6);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default, Clone)]
pub struct TensorIterConfig {
    outputs: Vec<Tensor>,
    inputs: Vec<Tensor>,
    index_width_limit: Option<u64>,
}

impl TensorIterConfig {
    /// Empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the output operand
    pub fn add_output(mut self, tensor: &Tensor) -> Self {
        self.outputs.push(tensor.clone());
        self
    }

    /// Register the next input operand
    pub fn add_input(mut self, tensor: &Tensor) -> Self {
        self.inputs.push(tensor.clone());
        self
    }

    /// Override the device's index width limit (clamped to the native range)
    pub fn index_width_limit(mut self, limit: u64) -> Self {
        self.index_width_limit = Some(limit);
        self
    }

    /// Broadcast, convert to byte strides and coalesce
    pub fn build(self) -> Result<TensorIter> {
        let output = match self.outputs.as_slice() {
            [output] => output,
            [] => {
                return Err(Error::invalid_argument(
                    "output",
                    "an output operand is required",
                ));
            }
            many => {
                return Err(Error::invalid_argument(
                    "output",
                    format!("exactly one output is supported, got {}", many.len()),
                ));
            }
        };

        // Inputs broadcast to the output; the output itself is never expanded.
        let mut shape: Shape = output.shape().iter().copied().collect();
        for input in &self.inputs {
            shape = broadcast_shapes(&shape, input.shape())
                .ok_or_else(|| Error::broadcast(&shape, input.shape()))?;
        }
        if shape.as_slice() != output.shape() {
            return Err(Error::shape_mismatch(&shape, output.shape()));
        }
        // Execution units write their elements without synchronization.
        if output.layout().has_internal_overlap() {
            return Err(Error::invalid_argument(
                "output",
                format!(
                    "output view {:?} writes some elements more than once",
                    output.layout()
                ),
            ));
        }

        let mut operands: SmallVec<[OperandView; 4]> = SmallVec::new();
        for tensor in std::iter::once(output).chain(&self.inputs) {
            operands.push(operand_view(tensor, &shape)?);
        }

        let limit = self
            .index_width_limit
            .or_else(|| output.device().map(|d| d.config().index_width_limit))
            .unwrap_or(NATIVE_INDEX_MAX)
            .clamp(1, NATIVE_INDEX_MAX);

        coalesce_dimensions(&mut shape, &mut operands);

        tracing::trace!(
            shape = ?shape.as_slice(),
            operands = operands.len(),
            index_width_limit = limit,
            "built tensor iterator"
        );

        Ok(TensorIter {
            shape,
            operands,
            index_width_limit: limit,
        })
    }
}

fn operand_view(tensor: &Tensor, shape: &[usize]) -> Result<OperandView> {
    let elem = tensor.dtype().size_in_bytes() as isize;
    let host_scalar = tensor.is_host_scalar();

    let strides = if host_scalar {
        smallvec![0; shape.len()]
    } else {
        let layout = tensor
            .layout()
            .broadcast_to(shape)
            .ok_or_else(|| Error::broadcast(tensor.shape(), shape))?;
        layout.strides().iter().map(|&s| s * elem).collect()
    };

    Ok(OperandView {
        storage: tensor.storage().clone(),
        byte_offset: tensor.layout().offset() * elem as usize,
        dtype: tensor.dtype(),
        strides,
        host_scalar,
    })
}

/// Merge adjacent dimensions that every operand walks as one.
///
/// Dimensions `outer` and `inner` merge when either has extent 1, or when
/// `stride[outer] == stride[inner] * shape[inner]` holds for all operands.
/// A space with no dimensions left becomes `[1]` with element-size strides.
fn coalesce_dimensions(shape: &mut Shape, operands: &mut [OperandView]) {
    if shape.is_empty() {
        shape.push(1);
        for op in operands.iter_mut() {
            op.strides = smallvec![op.dtype.size_in_bytes() as isize];
        }
        return;
    }

    let rank = shape.len();
    let mut merged: Shape = smallvec![shape[rank - 1]];
    let mut merged_strides: SmallVec<[SmallVec<[isize; 4]>; 4]> = operands
        .iter()
        .map(|op| smallvec![op.strides[rank - 1]])
        .collect();

    for dim in (0..rank - 1).rev() {
        let last = merged.len() - 1;
        let inner = merged[last];
        let outer = shape[dim];
        let mergeable = operands.iter().zip(&merged_strides).all(|(op, st)| {
            inner == 1 || outer == 1 || op.strides[dim] == st[last] * inner as isize
        });

        if mergeable {
            if inner == 1 {
                for (op, st) in operands.iter().zip(merged_strides.iter_mut()) {
                    st[last] = op.strides[dim];
                }
            }
            merged[last] = inner * outer;
        } else {
            merged.push(outer);
            for (op, st) in operands.iter().zip(merged_strides.iter_mut()) {
                st.push(op.strides[dim]);
            }
        }
    }

    merged.reverse();
    *shape = merged;
    for (op, mut st) in operands.iter_mut().zip(merged_strides) {
        st.reverse();
        op.strides = st;
    }

    // A single element: strides never contribute, report packed operands.
    if shape.as_slice() == [1] {
        for op in operands.iter_mut() {
            op.strides[0] = op.dtype.size_in_bytes() as isize;
        }
    }
}

/// Iteration space over tensors.
///
/// Built by [`TensorIterConfig`]. Operand 0 is the output.
#[derive(Clone, Debug)]
pub struct TensorIter {
    shape: Shape,
    operands: SmallVec<[OperandView; 4]>,
    index_width_limit: u64,
}

impl TensorIter {
    /// View of operand `op`
    pub fn operand(&self, op: usize) -> &OperandView {
        &self.operands[op]
    }

    /// Largest byte offset operand `op` reaches from its base address
    fn max_byte_offset(&self, op: usize) -> u64 {
        self.shape
            .iter()
            .zip(&self.operands[op].strides)
            .map(|(&n, &st)| (n.saturating_sub(1) as u64) * st.unsigned_abs() as u64)
            .sum()
    }

    /// Halve the dimension with the largest byte extent.
    ///
    /// Requires at least one dimension with extent > 1.
    pub(crate) fn split_largest_dim(&self) -> (Self, Self) {
        let extent = |d: usize| -> u64 {
            self.operands
                .iter()
                .map(|op| (self.shape[d].saturating_sub(1) as u64) * op.strides[d].unsigned_abs() as u64)
                .max()
                .unwrap_or(0)
        };

        let mut dim = 0;
        let mut best = (0u64, 0usize);
        for d in 0..self.shape.len() {
            let key = (extent(d), self.shape[d]);
            if self.shape[d] > 1 && key > best {
                best = key;
                dim = d;
            }
        }

        let n = self.shape[dim];
        let half = n / 2;

        let mut first = self.clone();
        first.shape[dim] = half;

        let mut second = self.clone();
        second.shape[dim] = n - half;
        for op in second.operands.iter_mut() {
            let advanced = op.byte_offset as isize + half as isize * op.strides[dim];
            op.byte_offset = advanced as usize;
        }

        tracing::trace!(dim, extent = n, half, "split iteration space");
        (first, second)
    }
}

impl ElementwiseIter for TensorIter {
    type Splits = SubspaceSplits;

    fn operand_count(&self) -> usize {
        self.operands.len()
    }

    fn rank(&self) -> usize {
        self.shape.len()
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn stride(&self, op: usize) -> &[isize] {
        &self.operands[op].strides
    }

    fn data_pointer(&self, op: usize) -> DataPtr {
        let view = &self.operands[op];
        DataPtr::new(view.storage.clone(), view.byte_offset)
    }

    fn element_type(&self, op: usize) -> DType {
        self.operands[op].dtype
    }

    fn total_elements(&self) -> usize {
        self.shape.iter().product()
    }

    fn device(&self, op: usize) -> Option<Device> {
        self.operands[op].storage.device().cloned()
    }

    fn index_width_limit(&self) -> u64 {
        self.index_width_limit
    }

    fn fits_native_index_width(&self) -> bool {
        let limit = self.index_width_limit;
        if self.total_elements() as u64 > limit {
            return false;
        }
        (0..self.operands.len()).all(|op| self.max_byte_offset(op) <= limit)
    }

    fn split_into_range_limited_subspaces(&self) -> SubspaceSplits {
        SubspaceSplits::new(self.clone())
    }

    fn is_host_resident_scalar(&self, op: usize) -> bool {
        self.operands.get(op).is_some_and(|view| view.host_scalar)
    }

    fn read_scalar_value(&self, op: usize) -> Scalar {
        let view = &self.operands[op];
        assert!(
            view.byte_offset + view.dtype.size_in_bytes() <= view.storage.size_in_bytes(),
            "operand {op} has no element to read"
        );
        // SAFETY: bounds checked above; host memory needs no synchronization
        unsafe { Scalar::load(view.dtype, view.storage.as_ptr().add(view.byte_offset)) }
    }

    fn drop_operand(&mut self, op: usize) {
        if op < self.operands.len() {
            self.operands.remove(op);
        }
    }
}
