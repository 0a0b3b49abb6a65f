//! General strided kernel

use super::function::ElementOp;
use super::invoke::Invoker;
use super::offset::{OffsetCalculator, Offsets};
use crate::iter::DataPtr;
use crate::runtime::{LaunchConfig, Stream, THREAD_WORK_SIZE, ThreadIdx};
use smallvec::SmallVec;

/// How the strided kernel turns a linear index into operand offsets
#[derive(Clone, Debug)]
pub(crate) enum Addressing {
    /// One dimension: offset is `index * stride` per operand
    Collapsed(SmallVec<[isize; 4]>),
    /// Any rank, through the offset calculator
    Nd(OffsetCalculator),
}

impl Addressing {
    #[inline]
    fn offsets(&self, index: usize) -> Offsets {
        match self {
            Self::Collapsed(strides) => strides.iter().map(|&s| index as isize * s).collect(),
            Self::Nd(calc) => calc.offsets(index),
        }
    }

    fn kernel_name(&self) -> &'static str {
        match self {
            Self::Collapsed(_) => "elementwise_strided_1d",
            Self::Nd(_) => "elementwise_strided_nd",
        }
    }
}

/// Enqueue the universal fallback.
///
/// Each unit handles `THREAD_WORK_SIZE` elements spaced one block apart:
/// unit `t` of block `b` visits `b * block_dim * THREAD_WORK_SIZE + t`, then
/// steps by `block_dim`. Elements at or past `numel` are skipped.
pub(crate) fn launch_strided<Op: ElementOp, V: Invoker>(
    stream: &Stream,
    op: Op,
    invoker: V,
    operands: SmallVec<[DataPtr; 4]>,
    addressing: Addressing,
    numel: usize,
) {
    let config = LaunchConfig::for_elements(numel, THREAD_WORK_SIZE);
    let name = addressing.kernel_name();

    stream.launch(name, config, move |t: ThreadIdx| {
        let bases: SmallVec<[*mut u8; 4]> = operands.iter().map(DataPtr::as_ptr).collect();
        let step = t.block_dim as usize;
        let mut index = t.block as usize * step * THREAD_WORK_SIZE as usize + t.thread as usize;

        for _ in 0..THREAD_WORK_SIZE {
            if index < numel {
                let offsets = addressing.offsets(index);
                let out = bases[0].wrapping_offset(offsets[0]);
                let inputs: SmallVec<[*const u8; 4]> = bases[1..]
                    .iter()
                    .zip(&offsets[1..])
                    .map(|(&base, &off)| base.wrapping_offset(off) as *const u8)
                    .collect();
                // SAFETY: the iterator's strides keep every offset in bounds
                unsafe { invoker.invoke(&op, out, &inputs, index as i64) };
            }
            index += step;
        }
    });
}
