//! Tagged scalar values
//!
//! A `Scalar` holds one element in its native type together with its dtype
//! tag. The dynamic-casting path loads a source element into a `Scalar` and
//! converts it with [`Element::from_scalar`], so every conversion is a single
//! static cast between two concrete types.

use super::{DType, Element};
use half::{bf16, f16};

/// One element value tagged with its dtype
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Scalar {
    /// 64-bit float
    F64(f64),
    /// 32-bit float
    F32(f32),
    /// IEEE half
    F16(f16),
    /// Brain float
    BF16(bf16),
    /// 64-bit signed integer
    I64(i64),
    /// 32-bit signed integer
    I32(i32),
    /// 16-bit signed integer
    I16(i16),
    /// 8-bit signed integer
    I8(i8),
    /// 64-bit unsigned integer
    U64(u64),
    /// 32-bit unsigned integer
    U32(u32),
    /// 16-bit unsigned integer
    U16(u16),
    /// 8-bit unsigned integer
    U8(u8),
    /// Boolean
    Bool(bool),
}

impl Scalar {
    /// The dtype tag of the held value
    pub const fn dtype(&self) -> DType {
        match self {
            Self::F64(_) => DType::F64,
            Self::F32(_) => DType::F32,
            Self::F16(_) => DType::F16,
            Self::BF16(_) => DType::BF16,
            Self::I64(_) => DType::I64,
            Self::I32(_) => DType::I32,
            Self::I16(_) => DType::I16,
            Self::I8(_) => DType::I8,
            Self::U64(_) => DType::U64,
            Self::U32(_) => DType::U32,
            Self::U16(_) => DType::U16,
            Self::U8(_) => DType::U8,
            Self::Bool(_) => DType::Bool,
        }
    }

    /// Convert to `T` with static-cast semantics
    #[inline]
    pub fn cast<T: Element>(self) -> T {
        T::from_scalar(self)
    }

    /// Load the element of type `dtype` stored at `ptr`.
    ///
    /// # Safety
    /// `ptr` must be valid for reading `dtype.size_in_bytes()` bytes holding a
    /// value of that dtype. No alignment is required.
    #[inline]
    pub unsafe fn load(dtype: DType, ptr: *const u8) -> Self {
        crate::dispatch_dtype!(dtype, T => { unsafe { T::load(ptr) }.into_scalar() })
    }

    /// Store this value converted to `dtype` at `ptr`.
    ///
    /// # Safety
    /// `ptr` must be valid for writing `dtype.size_in_bytes()` bytes.
    #[inline]
    pub unsafe fn store(self, dtype: DType, ptr: *mut u8) {
        crate::dispatch_dtype!(dtype, T => { unsafe { T::from_scalar(self).store(ptr) } })
    }
}

macro_rules! impl_from_native {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Scalar {
                #[inline]
                fn from(value: $t) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_native!(
    f64 => F64,
    f32 => F32,
    f16 => F16,
    bf16 => BF16,
    i64 => I64,
    i32 => I32,
    i16 => I16,
    i8 => I8,
    u64 => U64,
    u32 => U32,
    u16 => U16,
    u8 => U8,
    bool => Bool,
);
