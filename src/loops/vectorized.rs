//! Contiguous vectorized kernel

use super::function::{ArgTuple, ElementOp};
use crate::dtype::Element;
use crate::iter::DataPtr;
use crate::runtime::{LaunchConfig, Stream, ThreadIdx, VEC_SIZE};
use smallvec::SmallVec;

const VEC: usize = VEC_SIZE as usize;

/// Enqueue the packed fast path.
///
/// Every operand must be packed with its exact static type. Unit `u` owns
/// elements `u * VEC_SIZE .. (u + 1) * VEC_SIZE`; it gathers all inputs of its
/// run, computes the results, then scatters them. Elements at or past
/// `numel` are neither read nor written.
pub(crate) fn launch_vectorized<Op: ElementOp>(
    stream: &Stream,
    op: Op,
    operands: SmallVec<[DataPtr; 4]>,
    numel: usize,
) {
    let config = LaunchConfig::for_elements(numel, VEC_SIZE);

    stream.launch("elementwise_vectorized", config, move |t: ThreadIdx| {
        let base = t.global() as usize * VEC;
        if base >= numel {
            return;
        }
        let count = (numel - base).min(VEC);

        let out = operands[0].as_ptr();
        let inputs: SmallVec<[*const u8; 4]> = operands[1..]
            .iter()
            .map(|p| p.as_ptr() as *const u8)
            .collect();

        let mut args: SmallVec<[Op::Args; VEC]> = SmallVec::new();
        for i in 0..count {
            // SAFETY: base + i < numel and every input is packed
            args.push(unsafe { Op::Args::load_packed(&inputs, base + i) });
        }

        let results: SmallVec<[Op::Output; VEC]> = args
            .into_iter()
            .enumerate()
            .map(|(i, a)| op.apply(a, (base + i) as i64))
            .collect();

        let width = size_of::<Op::Output>();
        for (i, value) in results.into_iter().enumerate() {
            // SAFETY: the output is packed and base + i < numel
            unsafe { value.store(out.add((base + i) * width)) };
        }
    });
}
