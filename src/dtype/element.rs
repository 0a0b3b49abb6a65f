//! Element trait for mapping Rust types to DType

use super::{DType, Scalar};
use bytemuck::{NoUninit, Zeroable};
use half::{bf16, f16};
use std::fmt::Debug;

/// Trait for types that can be elements of an operand
///
/// This trait connects Rust's type system to the runtime dtype system.
/// It's implemented for every type a [`DType`] names.
///
/// # Bounds
/// - `Copy + Send + Sync + 'static` - values are captured by device kernels
/// - `NoUninit + Zeroable` - host slices can be viewed as bytes (bytemuck)
/// - `PartialEq + Debug` - comparisons and diagnostics in tests
///
/// # Conversion semantics
///
/// [`Element::from_scalar`] is a static cast from the scalar's native type:
/// Rust `as` for primitive pairs (float to int truncates toward zero and
/// saturates, NaN becomes 0), half-precision values convert through `f32`,
/// conversion to `bool` is `value != 0`, and `bool` converts to 0 or 1.
pub trait Element:
    Copy + Send + Sync + NoUninit + Zeroable + PartialEq + Debug + 'static
{
    /// The corresponding DType for this Rust type
    const DTYPE: DType;

    /// Convert a tagged scalar into this type with static-cast semantics
    fn from_scalar(value: Scalar) -> Self;

    /// Wrap this value in its tagged scalar
    fn into_scalar(self) -> Scalar;

    /// Read one element from possibly unaligned memory.
    ///
    /// # Safety
    /// `ptr` must be valid for reading `size_of::<Self>()` bytes that hold a
    /// valid value of `Self`.
    #[inline]
    unsafe fn load(ptr: *const u8) -> Self {
        unsafe { ptr.cast::<Self>().read_unaligned() }
    }

    /// Write one element to possibly unaligned memory.
    ///
    /// # Safety
    /// `ptr` must be valid for writing `size_of::<Self>()` bytes.
    #[inline]
    unsafe fn store(self, ptr: *mut u8) {
        unsafe { ptr.cast::<Self>().write_unaligned(self) }
    }
}

macro_rules! impl_primitive_element {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DTYPE: DType = DType::$variant;

                #[inline]
                fn from_scalar(value: Scalar) -> Self {
                    match value {
                        Scalar::F64(v) => v as $t,
                        Scalar::F32(v) => v as $t,
                        Scalar::F16(v) => v.to_f32() as $t,
                        Scalar::BF16(v) => v.to_f32() as $t,
                        Scalar::I64(v) => v as $t,
                        Scalar::I32(v) => v as $t,
                        Scalar::I16(v) => v as $t,
                        Scalar::I8(v) => v as $t,
                        Scalar::U64(v) => v as $t,
                        Scalar::U32(v) => v as $t,
                        Scalar::U16(v) => v as $t,
                        Scalar::U8(v) => v as $t,
                        Scalar::Bool(v) => v as u8 as $t,
                    }
                }

                #[inline]
                fn into_scalar(self) -> Scalar {
                    Scalar::$variant(self)
                }
            }
        )*
    };
}

impl_primitive_element!(
    f64 => F64,
    f32 => F32,
    i64 => I64,
    i32 => I32,
    i16 => I16,
    i8 => I8,
    u64 => U64,
    u32 => U32,
    u16 => U16,
    u8 => U8,
);

// ============================================================================
// Half-precision floating point types
//
// Every conversion into or out of a half type goes through f32, so a double
// is first rounded to single precision and then to half.
// ============================================================================

macro_rules! impl_half_element {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DTYPE: DType = DType::$variant;

                #[inline]
                fn from_scalar(value: Scalar) -> Self {
                    let v: f32 = match value {
                        Scalar::F64(v) => v as f32,
                        Scalar::F32(v) => v,
                        Scalar::F16(v) => v.to_f32(),
                        Scalar::BF16(v) => v.to_f32(),
                        Scalar::I64(v) => v as f32,
                        Scalar::I32(v) => v as f32,
                        Scalar::I16(v) => v as f32,
                        Scalar::I8(v) => v as f32,
                        Scalar::U64(v) => v as f32,
                        Scalar::U32(v) => v as f32,
                        Scalar::U16(v) => v as f32,
                        Scalar::U8(v) => v as f32,
                        Scalar::Bool(v) => v as u8 as f32,
                    };
                    <$t>::from_f32(v)
                }

                #[inline]
                fn into_scalar(self) -> Scalar {
                    Scalar::$variant(self)
                }
            }
        )*
    };
}

impl_half_element!(f16 => F16, bf16 => BF16);

// Booleans occupy one byte. Loads treat any nonzero byte as true so memory
// written by other producers never yields an invalid bool.
impl Element for bool {
    const DTYPE: DType = DType::Bool;

    #[inline]
    fn from_scalar(value: Scalar) -> Self {
        match value {
            Scalar::F64(v) => v != 0.0,
            Scalar::F32(v) => v != 0.0,
            Scalar::F16(v) => v.to_f32() != 0.0,
            Scalar::BF16(v) => v.to_f32() != 0.0,
            Scalar::I64(v) => v != 0,
            Scalar::I32(v) => v != 0,
            Scalar::I16(v) => v != 0,
            Scalar::I8(v) => v != 0,
            Scalar::U64(v) => v != 0,
            Scalar::U32(v) => v != 0,
            Scalar::U16(v) => v != 0,
            Scalar::U8(v) => v != 0,
            Scalar::Bool(v) => v,
        }
    }

    #[inline]
    fn into_scalar(self) -> Scalar {
        Scalar::Bool(self)
    }

    #[inline]
    unsafe fn load(ptr: *const u8) -> Self {
        unsafe { ptr.read() != 0 }
    }

    #[inline]
    unsafe fn store(self, ptr: *mut u8) {
        unsafe { ptr.write(self as u8) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_dtype() {
        assert_eq!(f64::DTYPE, DType::F64);
        assert_eq!(f32::DTYPE, DType::F32);
        assert_eq!(i32::DTYPE, DType::I32);
        assert_eq!(u8::DTYPE, DType::U8);
        assert_eq!(f16::DTYPE, DType::F16);
        assert_eq!(bool::DTYPE, DType::Bool);
    }

    #[test]
    fn test_float_to_int_truncates_and_saturates() {
        assert_eq!(i32::from_scalar(Scalar::F64(-3.9)), -3);
        assert_eq!(u8::from_scalar(Scalar::F32(300.0)), 255);
        assert_eq!(u8::from_scalar(Scalar::F32(-1.0)), 0);
        assert_eq!(i8::from_scalar(Scalar::F64(f64::NAN)), 0);
    }

    #[test]
    fn test_int_to_int_wraps() {
        assert_eq!(u8::from_scalar(Scalar::I32(257)), 1);
        assert_eq!(i8::from_scalar(Scalar::U8(200)), -56);
        assert_eq!(u32::from_scalar(Scalar::I64(-1)), u32::MAX);
    }

    #[test]
    fn test_bool_conversions() {
        assert!(bool::from_scalar(Scalar::F32(0.5)));
        assert!(!bool::from_scalar(Scalar::I64(0)));
        assert!(bool::from_scalar(Scalar::F64(f64::NAN)));
        assert_eq!(f32::from_scalar(Scalar::Bool(true)), 1.0);
        assert_eq!(i64::from_scalar(Scalar::Bool(false)), 0);
    }

    #[test]
    fn test_half_goes_through_f32() {
        let v = 1.0f64 + f64::EPSILON;
        let direct = f16::from_scalar(Scalar::F64(v));
        assert_eq!(direct, f16::from_f32(v as f32));
        assert_eq!(i32::from_scalar(Scalar::BF16(bf16::from_f32(-7.5))), -7);
        assert_eq!(f16::from_scalar(Scalar::BF16(bf16::ONE)), f16::ONE);
    }

    #[test]
    fn test_load_store_unaligned() {
        let mut buf = [0u8; 9];
        unsafe {
            1.25f64.store(buf.as_mut_ptr().add(1));
            assert_eq!(f64::load(buf.as_ptr().add(1)), 1.25);
            true.store(buf.as_mut_ptr());
            assert!(bool::load(buf.as_ptr()));
        }
    }
}
