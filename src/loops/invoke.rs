//! Invocation adapters: bind a function's arguments to operand memory

use super::function::{ArgTuple, ElementOp};
use crate::dtype::{DType, Element};
use crate::iter::ElementwiseIter;
use smallvec::SmallVec;

/// Reads the inputs of one element, applies the function, writes the result.
pub(crate) trait Invoker: Clone + Send + Sync + 'static {
    /// # Safety
    /// `out` and every `inputs[i]` must address one valid element of the
    /// operand's dtype.
    unsafe fn invoke<Op: ElementOp>(&self, op: &Op, out: *mut u8, inputs: &[*const u8], index: i64);
}

/// Operands hold exactly the function's argument and result types
#[derive(Clone, Copy, Debug)]
pub(crate) struct Exact;

impl Invoker for Exact {
    #[inline]
    unsafe fn invoke<Op: ElementOp>(&self, op: &Op, out: *mut u8, inputs: &[*const u8], index: i64) {
        let args = unsafe { Op::Args::load(inputs) };
        let result = op.apply(args, index);
        unsafe { result.store(out) }
    }
}

/// Operands are converted from and to their own dtypes per element
#[derive(Clone, Debug)]
pub(crate) struct Casting {
    output: DType,
    inputs: SmallVec<[DType; 4]>,
}

impl Casting {
    pub(crate) fn from_iter<I: ElementwiseIter>(iter: &I) -> Self {
        Self {
            output: iter.element_type(0),
            inputs: (1..iter.operand_count())
                .map(|op| iter.element_type(op))
                .collect(),
        }
    }
}

impl Invoker for Casting {
    #[inline]
    unsafe fn invoke<Op: ElementOp>(&self, op: &Op, out: *mut u8, inputs: &[*const u8], index: i64) {
        let args = unsafe { Op::Args::load_cast(inputs, &self.inputs) };
        let result = op.apply(args, index);
        unsafe { result.into_scalar().store(self.output, out) }
    }
}
