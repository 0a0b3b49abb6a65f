//! Integration tests for dispatch preconditions and deferred device errors

mod common;

use common::{create_device, iota, read};
use tensorloop::prelude::*;

// ============================================================================
// Preconditions
// ============================================================================

#[test]
fn test_arity_mismatch_is_rejected_before_launch() {
    let device = create_device();
    let a = Tensor::from_slice(&[1.0f32, 2.0], &[2], &device).unwrap();
    let out = Tensor::empty(&[2], DType::F32, &device).unwrap();
    let iter = TensorIterConfig::new()
        .add_output(&out)
        .add_input(&a)
        .build()
        .unwrap();

    let err = launch_elementwise(&iter, |x: f32, y: f32| x + y).unwrap_err();
    assert!(matches!(
        err,
        Error::ArityMismatch {
            expected: 3,
            got: 2,
            ..
        }
    ));

    // the indexed variant counts the index as one of the function's slots
    let err = launch_elementwise_with_index(&iter, |i: i64| i as f32).unwrap_err();
    assert!(matches!(
        err,
        Error::ArityMismatch {
            expected: 1,
            got: 2,
            ..
        }
    ));
    device.synchronize().unwrap();
    assert_eq!(device.current_stream().completed_launches(), 0);
}

#[test]
fn test_host_tensor_is_not_on_device() {
    let device = create_device();
    let host = Tensor::from_slice_host(&[1.0f32, 2.0, 3.0], &[3]).unwrap();
    let out = Tensor::empty(&[3], DType::F32, &device).unwrap();
    let iter = TensorIterConfig::new()
        .add_output(&out)
        .add_input(&host)
        .build()
        .unwrap();

    let err = launch_elementwise(&iter, |x: f32| x).unwrap_err();
    assert!(matches!(err, Error::NotOnDevice { operand: 1 }));
}

#[test]
fn test_host_scalar_without_lifting_is_not_on_device() {
    let device = create_device();
    let x = Tensor::from_slice(&[1.0f32, 2.0], &[2], &device).unwrap();
    let s = Tensor::scalar_host(1.0f32).unwrap();
    let out = Tensor::empty(&[2], DType::F32, &device).unwrap();
    let iter = TensorIterConfig::new()
        .add_output(&out)
        .add_input(&x)
        .add_input(&s)
        .build()
        .unwrap();

    let err = launch_elementwise(&iter, |a: f32, b: f32| a + b).unwrap_err();
    assert!(matches!(err, Error::NotOnDevice { operand: 2 }));
}

#[test]
fn test_operands_on_different_devices() {
    let dev0 = create_device();
    let dev1 = Device::new(1).unwrap();
    let a = Tensor::from_slice(&[1i32, 2], &[2], &dev0).unwrap();
    let b = Tensor::from_slice(&[3i32, 4], &[2], &dev1).unwrap();
    let out = Tensor::empty(&[2], DType::I32, &dev0).unwrap();
    let iter = TensorIterConfig::new()
        .add_output(&out)
        .add_input(&a)
        .add_input(&b)
        .build()
        .unwrap();

    let err = launch_elementwise(&iter, |x: i32, y: i32| x + y).unwrap_err();
    assert!(matches!(
        err,
        Error::DeviceMismatch {
            operand: 2,
            expected: 0,
            got: 1
        }
    ));
}

#[test]
fn test_output_shape_must_match_broadcast() {
    let device = create_device();
    let a = Tensor::from_slice(&iota::<f32>(6), &[2, 3], &device).unwrap();
    let out = Tensor::empty(&[3], DType::F32, &device).unwrap();
    let result = TensorIterConfig::new().add_output(&out).add_input(&a).build();
    assert!(matches!(result, Err(Error::ShapeMismatch { .. })));

    let b = Tensor::from_slice(&iota::<f32>(4), &[4], &device).unwrap();
    let out = Tensor::empty(&[2, 3], DType::F32, &device).unwrap();
    let result = TensorIterConfig::new().add_output(&out).add_input(&b).build();
    assert!(matches!(result, Err(Error::BroadcastError { .. })));
}

#[test]
fn test_output_aliasing_itself_is_rejected() {
    let device = create_device();
    let row = Tensor::zeros(&[4], DType::I64, &device).unwrap();
    // three rows sharing one buffer row
    let shared = row.broadcast_to(&[3, 4]).unwrap();
    let result = TensorIterConfig::new().add_output(&shared).build();
    assert!(matches!(result, Err(Error::InvalidArgument { arg: "output", .. })));

    // the same storage through a disjoint view is fine
    let iter = TensorIterConfig::new().add_output(&row).build().unwrap();
    launch_elementwise_with_index(&iter, |i: i64| i).unwrap();
    assert_eq!(read::<i64>(&row), vec![0, 1, 2, 3]);
}

#[test]
fn test_zero_element_dispatch_enqueues_nothing() {
    let device = create_device();
    let a = Tensor::from_slice::<f32>(&[], &[0], &device).unwrap();
    let out = Tensor::empty(&[0], DType::F32, &device).unwrap();
    let iter = TensorIterConfig::new()
        .add_output(&out)
        .add_input(&a)
        .build()
        .unwrap();

    let stream = device.current_stream();
    let before = stream.completed_launches();
    launch_elementwise(&iter, |_: f32| -> f32 { panic!("must not run") }).unwrap();
    device.synchronize().unwrap();
    assert_eq!(stream.completed_launches(), before);
    assert!(read::<f32>(&out).is_empty());
}

// ============================================================================
// Deferred Errors
// ============================================================================

#[test]
fn test_kernel_panic_surfaces_as_device_fault() {
    let device = create_device();
    let a = Tensor::from_slice(&iota::<i32>(64), &[64], &device).unwrap();
    let out = Tensor::empty(&[64], DType::I32, &device).unwrap();
    let iter = TensorIterConfig::new()
        .add_output(&out)
        .add_input(&a)
        .build()
        .unwrap();

    let launched = launch_elementwise(&iter, |x: i32| {
        if x == 17 {
            panic!("bad element");
        }
        x
    });
    let synced = device.synchronize();

    // reported exactly once, either by the launch's check or at synchronize
    let faults: Vec<Error> = [launched, synced].into_iter().filter_map(Result::err).collect();
    assert_eq!(faults.len(), 1, "{faults:?}");
    assert!(faults[0].is_device_fault());
    assert!(matches!(faults[0], Error::DeviceFault { .. }));

    // the stream keeps working after the fault was observed
    launch_elementwise(&iter, |x: i32| x + 1).unwrap();
    assert_eq!(read::<i32>(&out), (1..=64).collect::<Vec<i32>>());
}

#[test]
fn test_fault_is_reported_by_to_vec() {
    let device = create_device();
    let out = Tensor::empty(&[8], DType::F64, &device).unwrap();
    let iter = TensorIterConfig::new().add_output(&out).build().unwrap();

    // give the worker something slow first so the fault lands after the check
    let stream = device.current_stream();
    stream.launch(
        "sleep",
        tensorloop::runtime::LaunchConfig::for_elements(1, 1),
        |_| std::thread::sleep(std::time::Duration::from_millis(50)),
    );
    launch_elementwise(&iter, || -> f64 { panic!("always") }).unwrap();

    let err = out.to_vec::<f64>().unwrap_err();
    assert!(matches!(err, Error::DeviceFault { .. }));
    // the fault was consumed
    assert!(device.synchronize().is_ok());
}

#[test]
fn test_invalid_geometry_is_recorded_not_enqueued() {
    let config = DeviceConfig::default()
        .with_worker_threads(2)
        .with_max_grid_dim(1);
    let device = Device::with_config(0, config).unwrap();
    // 4096 elements need more than one block on every path
    let out = Tensor::empty(&[4096], DType::U8, &device).unwrap();
    let iter = TensorIterConfig::new().add_output(&out).build().unwrap();

    let err = launch_elementwise(&iter, || 1u8).unwrap_err();
    assert!(matches!(err, Error::InvalidLaunch { .. }));
    assert_eq!(device.current_stream().completed_launches(), 0);
    assert!(read::<u8>(&out).iter().all(|&v| v == 0));
}

// ============================================================================
// Streams
// ============================================================================

#[test]
fn test_dispatch_follows_current_stream() {
    let device = create_device();
    let default_stream = device.current_stream();
    let side = device.new_stream().unwrap();
    device.set_current_stream(&side).unwrap();

    let out = Tensor::empty(&[16], DType::I16, &device).unwrap();
    let iter = TensorIterConfig::new().add_output(&out).build().unwrap();
    launch_elementwise(&iter, || 3i16).unwrap();
    device.synchronize().unwrap();

    assert_eq!(side.completed_launches(), 1);
    assert_eq!(default_stream.completed_launches(), 0);
    assert_eq!(read::<i16>(&out), vec![3; 16]);
}

#[test]
fn test_foreign_stream_is_rejected() {
    let dev0 = create_device();
    let dev1 = Device::new(1).unwrap();
    let foreign = dev1.new_stream().unwrap();
    assert!(matches!(
        dev0.set_current_stream(&foreign),
        Err(Error::InvalidArgument { .. })
    ));
}

#[test]
fn test_device_tracks_allocated_bytes() {
    let device = create_device();
    let before = device.allocated_bytes();
    {
        let _t = Tensor::empty(&[10, 10], DType::F64, &device).unwrap();
        assert_eq!(device.allocated_bytes(), before + 800);
    }
    assert_eq!(device.allocated_bytes(), before);
}
