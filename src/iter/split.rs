//! Range-limited subspace splitting

use super::{ElementwiseIter, TensorIter};

/// Depth-first sequence of subspaces that each fit the native index width.
///
/// Subspaces come out in memory order of the split dimension: the lower half
/// of a split is yielded before the upper half. Cloning the iterator restarts
/// from the clone's position.
#[derive(Clone, Debug)]
pub struct SubspaceSplits {
    pending: Vec<TensorIter>,
}

impl SubspaceSplits {
    pub(crate) fn new(root: TensorIter) -> Self {
        Self {
            pending: vec![root],
        }
    }
}

impl Iterator for SubspaceSplits {
    type Item = TensorIter;

    fn next(&mut self) -> Option<TensorIter> {
        loop {
            let iter = self.pending.pop()?;
            if iter.total_elements() == 0 || iter.fits_native_index_width() {
                return Some(iter);
            }
            let (lower, upper) = iter.split_largest_dim();
            self.pending.push(upper);
            self.pending.push(lower);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::iter::TensorIterConfig;
    use crate::runtime::{Device, DeviceConfig};
    use crate::tensor::Tensor;

    #[test]
    fn test_splits_cover_space_and_fit() {
        let device = Device::with_config(0, DeviceConfig::default().with_worker_threads(1)).unwrap();
        let a = Tensor::zeros(&[6, 50], DType::F32, &device).unwrap();
        let out = Tensor::empty(&[6, 50], DType::F32, &device).unwrap();
        let iter = TensorIterConfig::new()
            .add_output(&out)
            .add_input(&a)
            .index_width_limit(256)
            .build()
            .unwrap();
        assert!(!iter.fits_native_index_width());

        let splits: Vec<_> = iter.split_into_range_limited_subspaces().collect();
        assert!(splits.len() > 1);
        assert!(splits.iter().all(|s| s.fits_native_index_width()));
        let covered: usize = splits.iter().map(|s| s.total_elements()).sum();
        assert_eq!(covered, 300);

        // output base offsets are increasing and start at the original base
        let offsets: Vec<_> = splits.iter().map(|s| s.data_pointer(0).byte_offset()).collect();
        assert_eq!(offsets[0], 0);
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_splits_restart_from_clone() {
        let device = Device::with_config(0, DeviceConfig::default().with_worker_threads(1)).unwrap();
        let out = Tensor::empty(&[20], DType::U8, &device).unwrap();
        let iter = TensorIterConfig::new()
            .add_output(&out)
            .index_width_limit(4)
            .build()
            .unwrap();
        let splits = iter.split_into_range_limited_subspaces();
        let first: Vec<usize> = splits.clone().map(|s| s.total_elements()).collect();
        let second: Vec<usize> = splits.map(|s| s.total_elements()).collect();
        assert_eq!(first, second);
        assert_eq!(first.iter().sum::<usize>(), 20);
    }
}
