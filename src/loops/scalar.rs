//! Host-scalar lifting for binary functions

use super::dispatch::launch_elementwise;
use super::function::DeviceFn;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::iter::ElementwiseIter;

/// Dispatch a binary function, lifting a host-resident scalar input into the
/// kernel as a constant.
///
/// If input 1 (or else input 2) is a single host element, its value is read,
/// converted to the matching argument type of `f`, and that operand is
/// removed from `iter`; the remaining unary function runs over the other
/// input. Otherwise `f` is dispatched unchanged.
///
/// ```
/// use tensorloop::prelude::*;
///
/// # fn main() -> tensorloop::error::Result<()> {
/// let device = Device::new(0)?;
/// let x = Tensor::from_slice(&[1.0f32, 2.0, 3.0], &[3], &device)?;
/// let five = Tensor::scalar_host(5.0f32)?;
/// let out = Tensor::empty(&[3], DType::F32, &device)?;
/// let mut iter = TensorIterConfig::new()
///     .add_output(&out)
///     .add_input(&x)
///     .add_input(&five)
///     .build()?;
/// launch_elementwise_with_scalars(&mut iter, |a: f32, b: f32| a + b)?;
/// assert_eq!(out.to_vec::<f32>()?, vec![6.0, 7.0, 8.0]);
/// # Ok(())
/// # }
/// ```
pub fn launch_elementwise_with_scalars<I, A, B, F>(iter: &mut I, f: F) -> Result<()>
where
    I: ElementwiseIter,
    A: Element,
    B: Element,
    F: DeviceFn<(A, B)>,
{
    let got = iter.operand_count();
    if got != 3 {
        return Err(Error::ArityMismatch {
            op: "launch_elementwise_with_scalars",
            expected: 3,
            got,
        });
    }

    if iter.is_host_resident_scalar(1) {
        let a: A = iter.read_scalar_value(1).cast();
        tracing::trace!(operand = 1, value = ?a, "lifting host scalar");
        iter.drop_operand(1);
        launch_elementwise(iter, move |b: B| f.invoke((a, b)))
    } else if iter.is_host_resident_scalar(2) {
        let b: B = iter.read_scalar_value(2).cast();
        tracing::trace!(operand = 2, value = ?b, "lifting host scalar");
        iter.drop_operand(2);
        launch_elementwise(iter, move |a: A| f.invoke((a, b)))
    } else {
        launch_elementwise(iter, f)
    }
}
