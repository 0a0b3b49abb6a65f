//! Dispatch policy for elementwise kernels
//!
//! Every public entry point walks the same states:
//!
//! 1. arity and device-residency checks (fatal, nothing is enqueued)
//! 2. empty iteration space returns immediately
//! 3. spaces the native 32-bit index cannot address are split and each
//!    subspace is dispatched in turn (the indexed variant rejects them)
//! 4. path selection: vectorized, strided 1-D, or strided N-D
//! 5. launch on the device's current stream and the deferred error check

use super::function::{ArgTuple, DeviceFn, ElementOp, Indexed, IndexedDeviceFn, Plain, Signature};
use super::invoke::{Casting, Exact};
use super::offset::OffsetCalculator;
use super::strided::{Addressing, launch_strided};
use super::vectorized::launch_vectorized;
use crate::error::{Error, Result};
use crate::iter::{DataPtr, ElementwiseIter};
use crate::runtime::Device;
use smallvec::SmallVec;

/// Kernel a dispatch will run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelPath {
    /// Packed one-dimensional operands with exact types
    Vectorized,
    /// One-dimensional, strided or casting
    StridedCollapsed {
        /// Operands are converted per element
        casting: bool,
    },
    /// Multi-dimensional through the offset calculator
    StridedNd {
        /// Operands are converted per element
        casting: bool,
    },
}

/// Choose the kernel for an iteration space that fits the native index.
pub fn select_path<I: ElementwiseIter>(iter: &I, signature: &Signature) -> KernelPath {
    let casting = iter.requires_dynamic_casting(signature);
    if iter.is_one_dimensional() {
        if casting {
            KernelPath::StridedCollapsed { casting: true }
        } else if iter.has_contiguous_first_dimension() {
            KernelPath::Vectorized
        } else {
            KernelPath::StridedCollapsed { casting: false }
        }
    } else {
        KernelPath::StridedNd { casting }
    }
}

/// Apply `f` to every element and write the result into operand 0.
///
/// The iterator must hold one output plus one input per argument of `f`, all
/// on the same device. Returns once the kernel is enqueued; read the output
/// through a synchronizing call such as [`Tensor::to_vec`].
///
/// [`Tensor::to_vec`]: crate::tensor::Tensor::to_vec
///
/// ```
/// use tensorloop::prelude::*;
///
/// # fn main() -> tensorloop::error::Result<()> {
/// let device = Device::new(0)?;
/// let a = Tensor::from_slice(&[1.0f32, 2.0, 3.0], &[3], &device)?;
/// let b = Tensor::from_slice(&[10.0f32, 20.0, 30.0], &[3], &device)?;
/// let out = Tensor::empty(&[3], DType::F32, &device)?;
/// let iter = TensorIterConfig::new()
///     .add_output(&out)
///     .add_input(&a)
///     .add_input(&b)
///     .build()?;
/// launch_elementwise(&iter, |x: f32, y: f32| x + y)?;
/// assert_eq!(out.to_vec::<f32>()?, vec![11.0, 22.0, 33.0]);
/// # Ok(())
/// # }
/// ```
pub fn launch_elementwise<I, Args, F>(iter: &I, f: F) -> Result<()>
where
    I: ElementwiseIter,
    Args: ArgTuple,
    F: DeviceFn<Args>,
{
    let signature = F::signature();
    dispatch(iter, Plain::new(f), &signature, "launch_elementwise")
}

/// Like [`launch_elementwise`], passing each element's linear index as the
/// final argument of `f`.
///
/// The iterator holds one operand per parameter of `f` (the output takes the
/// index's slot). Spaces the native index cannot address are rejected with
/// [`Error::IndexWidthExceeded`] rather than split, since splitting would
/// renumber the elements.
pub fn launch_elementwise_with_index<I, Args, F>(iter: &I, f: F) -> Result<()>
where
    I: ElementwiseIter,
    Args: ArgTuple,
    F: IndexedDeviceFn<Args>,
{
    const ENTRY: &str = "launch_elementwise_with_index";
    let signature = F::signature();
    let device = check_operands(iter, Args::ARITY + 1, ENTRY)?;

    let numel = iter.total_elements();
    if numel == 0 {
        tracing::trace!(entry = ENTRY, "empty iteration space, nothing to launch");
        return Ok(());
    }
    if !iter.fits_native_index_width() {
        return Err(Error::IndexWidthExceeded {
            numel,
            limit: iter.index_width_limit(),
        });
    }

    launch_fitted(iter, Indexed::new(f), &signature, &device)
}

pub(crate) fn dispatch<I, Op>(iter: &I, op: Op, signature: &Signature, entry: &'static str) -> Result<()>
where
    I: ElementwiseIter,
    Op: ElementOp,
{
    let device = check_operands(iter, signature.arity() + 1, entry)?;

    if iter.total_elements() == 0 {
        tracing::trace!(entry, "empty iteration space, nothing to launch");
        return Ok(());
    }

    if !iter.fits_native_index_width() {
        tracing::debug!(
            entry,
            numel = iter.total_elements(),
            limit = iter.index_width_limit(),
            "splitting iteration space"
        );
        for sub in iter.split_into_range_limited_subspaces() {
            dispatch(&sub, op, signature, entry)?;
        }
        return Ok(());
    }

    launch_fitted(iter, op, signature, &device)
}

/// Check the operand count, then that every operand lives on operand 0's
/// device. Returns that device.
fn check_operands<I: ElementwiseIter>(iter: &I, expected: usize, entry: &'static str) -> Result<Device> {
    let got = iter.operand_count();
    if got != expected {
        return Err(Error::ArityMismatch {
            op: entry,
            expected,
            got,
        });
    }

    let device = iter.device(0).ok_or(Error::NotOnDevice { operand: 0 })?;
    for operand in 1..got {
        match iter.device(operand) {
            None => return Err(Error::NotOnDevice { operand }),
            Some(other) if other != device => {
                return Err(Error::DeviceMismatch {
                    operand,
                    expected: device.id(),
                    got: other.id(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(device)
}

fn launch_fitted<I, Op>(iter: &I, op: Op, signature: &Signature, device: &Device) -> Result<()>
where
    I: ElementwiseIter,
    Op: ElementOp,
{
    let numel = iter.total_elements();
    let path = select_path(iter, signature);
    let stream = device.current_stream();
    let operands: SmallVec<[DataPtr; 4]> = (0..iter.operand_count())
        .map(|k| iter.data_pointer(k))
        .collect();

    tracing::trace!(
        ?path,
        numel,
        rank = iter.rank(),
        device = device.id(),
        stream = stream.id(),
        "dispatch elementwise"
    );

    match path {
        KernelPath::Vectorized => launch_vectorized(&stream, op, operands, numel),
        KernelPath::StridedCollapsed { casting } => {
            let strides = (0..iter.operand_count()).map(|k| iter.stride(k)[0]).collect();
            let addressing = Addressing::Collapsed(strides);
            if casting {
                launch_strided(&stream, op, Casting::from_iter(iter), operands, addressing, numel);
            } else {
                launch_strided(&stream, op, Exact, operands, addressing, numel);
            }
        }
        KernelPath::StridedNd { casting } => {
            let addressing = Addressing::Nd(OffsetCalculator::from_iter(iter)?);
            if casting {
                launch_strided(&stream, op, Casting::from_iter(iter), operands, addressing, numel);
            } else {
                launch_strided(&stream, op, Exact, operands, addressing, numel);
            }
        }
    }

    stream.check_last_error()
}
