//! Linear index to per-operand byte offsets

use crate::error::{Error, Result};
use crate::iter::ElementwiseIter;
use smallvec::SmallVec;

/// Per-operand byte offsets of one element
pub type Offsets = SmallVec<[isize; 4]>;

/// Translates a row-major linear index into byte offsets for every operand.
///
/// The last dimension varies fastest. A zero stride broadcasts: the
/// coordinate along that dimension is computed but contributes nothing.
#[derive(Clone, Debug)]
pub struct OffsetCalculator {
    sizes: SmallVec<[usize; 4]>,
    /// `strides[dim][op]`, laid out per dimension for the decomposition loop
    strides: SmallVec<[SmallVec<[isize; 4]>; 4]>,
    operands: usize,
}

impl OffsetCalculator {
    /// Build from extents and one byte-stride vector per operand.
    ///
    /// Fails with [`Error::InvalidArgument`] when any stride vector's length
    /// differs from the rank.
    pub fn new(sizes: &[usize], operand_strides: &[&[isize]]) -> Result<Self> {
        let rank = sizes.len();
        if let Some((op, bad)) = operand_strides
            .iter()
            .enumerate()
            .find(|(_, s)| s.len() != rank)
        {
            return Err(Error::invalid_argument(
                "strides",
                format!(
                    "operand {op} has {} strides for rank {rank}",
                    bad.len()
                ),
            ));
        }

        let strides = (0..rank)
            .map(|dim| operand_strides.iter().map(|s| s[dim]).collect())
            .collect();

        Ok(Self {
            sizes: sizes.iter().copied().collect(),
            strides,
            operands: operand_strides.len(),
        })
    }

    /// Build from an iterator descriptor's shape and strides
    pub fn from_iter<I: ElementwiseIter>(iter: &I) -> Result<Self> {
        let strides: SmallVec<[&[isize]; 4]> =
            (0..iter.operand_count()).map(|op| iter.stride(op)).collect();
        Self::new(iter.shape(), &strides)
    }

    /// Number of operands
    #[inline]
    pub fn operand_count(&self) -> usize {
        self.operands
    }

    /// Byte offsets of element `linear` for every operand
    #[inline]
    pub fn offsets(&self, linear: usize) -> Offsets {
        let mut out: Offsets = SmallVec::from_elem(0, self.operands);
        let mut remaining = linear;

        for dim in (0..self.sizes.len()).rev() {
            let size = self.sizes[dim];
            let coord = remaining % size;
            remaining /= size;
            for (acc, &stride) in out.iter_mut().zip(&self.strides[dim]) {
                *acc += coord as isize * stride;
            }
        }

        out
    }
}
