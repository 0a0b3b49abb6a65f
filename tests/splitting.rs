//! Integration tests for iteration spaces past the index-width limit
//!
//! The limit is lowered through the device config or the iterator builder so
//! splits can be exercised with small tensors.

mod common;

use common::{assert_bitwise_eq, create_device, create_device_with_limit, iota, read};
use tensorloop::prelude::*;

fn run_binary(device: &Device, limit: Option<u64>, a: &Tensor, b: &Tensor, out: &Tensor) {
    let mut config = TensorIterConfig::new().add_output(out).add_input(a).add_input(b);
    if let Some(limit) = limit {
        config = config.index_width_limit(limit);
    }
    let iter = config.build().unwrap();
    launch_elementwise(&iter, |x: f32, y: f32| x * 3.0 - y).unwrap();
    device.synchronize().unwrap();
}

#[test]
fn test_split_result_equals_unsplit() {
    let device = create_device();
    let a = Tensor::from_slice(&iota::<f32>(300), &[10, 30], &device).unwrap();
    let b = Tensor::from_slice(&iota::<f32>(30), &[30], &device).unwrap();

    let whole = Tensor::empty(&[10, 30], DType::F32, &device).unwrap();
    run_binary(&device, None, &a, &b, &whole);
    let launches_unsplit = device.current_stream().completed_launches();
    assert_eq!(launches_unsplit, 1);

    // 64 bytes is 16 f32 elements per launch at most
    let split = Tensor::empty(&[10, 30], DType::F32, &device).unwrap();
    run_binary(&device, Some(64), &a, &b, &split);
    let launches_split = device.current_stream().completed_launches() - launches_unsplit;
    assert!(launches_split > 1, "expected several launches, got {launches_split}");

    assert_bitwise_eq(&read::<f32>(&split), &read::<f32>(&whole), "split vs unsplit");
}

#[test]
fn test_device_config_limit_applies_to_iterators() {
    let device = create_device_with_limit(40);
    let a = Tensor::from_slice(&iota::<f32>(100), &[100], &device).unwrap();
    let out = Tensor::empty(&[100], DType::F32, &device).unwrap();
    let iter = TensorIterConfig::new()
        .add_output(&out)
        .add_input(&a)
        .build()
        .unwrap();

    assert_eq!(iter.index_width_limit(), 40);
    assert!(!iter.fits_native_index_width());
    for sub in iter.split_into_range_limited_subspaces() {
        assert!(sub.fits_native_index_width());
    }

    launch_elementwise(&iter, |v: f32| -v).unwrap();
    let expected: Vec<f32> = iota::<f32>(100).iter().map(|v| -v).collect();
    assert_bitwise_eq(&read::<f32>(&out), &expected, "negate");
}

#[test]
fn test_split_subspaces_cover_every_element_once() {
    let device = create_device();
    let out = Tensor::zeros(&[7, 9, 5], DType::I32, &device).unwrap();
    let iter = TensorIterConfig::new()
        .add_output(&out)
        .index_width_limit(24)
        .build()
        .unwrap();

    let total: usize = iter
        .split_into_range_limited_subspaces()
        .map(|sub| sub.total_elements())
        .sum();
    assert_eq!(total, 7 * 9 * 5);

    launch_elementwise(&iter, || 1i32).unwrap();
    assert!(read::<i32>(&out).iter().all(|&v| v == 1));
}

#[test]
fn test_broadcast_input_survives_split() {
    let device = create_device();
    let row = Tensor::from_slice(&iota::<f32>(8), &[8], &device).unwrap();
    let scale = Tensor::from_slice(&[1.0f32, 10.0, 100.0, 1000.0], &[4, 1], &device).unwrap();
    let out = Tensor::empty(&[4, 8], DType::F32, &device).unwrap();
    let iter = TensorIterConfig::new()
        .add_output(&out)
        .add_input(&row)
        .add_input(&scale)
        .index_width_limit(16)
        .build()
        .unwrap();

    launch_elementwise(&iter, |r: f32, s: f32| r * s).unwrap();

    let mut expected = Vec::new();
    for s in [1.0f32, 10.0, 100.0, 1000.0] {
        expected.extend((0..8).map(|r| r as f32 * s));
    }
    assert_bitwise_eq(&read::<f32>(&out), &expected, "broadcast split");
}
