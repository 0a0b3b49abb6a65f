//! Common test utilities
#![allow(dead_code)]

use approx::relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tensorloop::dtype::Element;
use tensorloop::runtime::{Device, DeviceConfig};
use tensorloop::tensor::Tensor;

/// Install a fmt subscriber honoring `RUST_LOG`; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Create a device with a small worker pool for testing
pub fn create_device() -> Device {
    init_tracing();
    Device::with_config(0, DeviceConfig::default().with_worker_threads(4))
        .expect("device creation")
}

/// Create a device whose launches address at most `limit` elements or bytes
pub fn create_device_with_limit(limit: u64) -> Device {
    init_tracing();
    let config = DeviceConfig::default()
        .with_worker_threads(4)
        .with_index_width_limit(limit);
    Device::with_config(0, config).expect("device creation")
}

/// `0, 1, 2, ...` converted to `T`
pub fn iota<T: Element>(n: usize) -> Vec<T> {
    (0..n).map(|i| T::from_scalar((i as f64).into())).collect()
}

/// Deterministic uniform samples in `[-1, 1)`
pub fn random_f32(n: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

/// Read a tensor back, panicking on device errors
pub fn read<T: Element>(t: &Tensor) -> Vec<T> {
    t.to_vec::<T>().expect("to_vec")
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Assert two f32 slices are relatively equal element by element
pub fn assert_allclose_f32(a: &[f32], b: &[f32], rtol: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        assert!(
            relative_eq!(*x, *y, max_relative = rtol),
            "{}: element {} differs: {} vs {}",
            msg,
            i,
            x,
            y
        );
    }
}

/// Assert two f32 slices hold the same bit patterns
pub fn assert_bitwise_eq(a: &[f32], b: &[f32], msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        assert_eq!(x.to_bits(), y.to_bits(), "{}: element {} differs: {} vs {}", msg, i, x, y);
    }
}
